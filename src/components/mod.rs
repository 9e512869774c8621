// Export components
pub mod cleanup;
pub mod destination;
pub mod source;
pub mod store;
pub mod sync;

// Re-export the engines and the store handle
pub use cleanup::CleanupEngine;
pub use store::StoreActorHandle;
pub use sync::SyncEngine;
