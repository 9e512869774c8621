use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Periodic background task runner.
///
/// Owns its own task map; an instance is constructed by the caller and
/// passed where it is needed, never reached through global state.
pub struct RefreshScheduler {
    tasks: HashMap<String, JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    /// Run `task` every `interval`, replacing any task scheduled under the
    /// same name
    pub fn schedule<F, Fut>(&mut self, name: &str, interval: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        self.cancel(name);
        info!("Scheduling '{}' every {:?}", name, interval);

        let handle = tokio::spawn(async move {
            loop {
                task().await;
                tokio::time::sleep(interval).await;
            }
        });

        self.tasks.insert(name.to_string(), handle);
    }

    /// Cancel a scheduled task. Returns whether one existed.
    pub fn cancel(&mut self, name: &str) -> bool {
        match self.tasks.remove(name) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every scheduled task
    pub fn shutdown(&mut self) {
        for (name, handle) in self.tasks.drain() {
            info!("Stopping scheduled task '{}'", name);
            handle.abort();
        }
    }
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
