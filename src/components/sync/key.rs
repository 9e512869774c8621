use crate::components::source::SourceOccurrence;
use crate::error::{data_error, BridgeResult};
use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Literal marker linking a destination event back to its source occurrence
pub const BACKLINK_MARKER: &str = "Original UID: ";

/// Resolve a floating local time to the one canonical UTC instant.
///
/// This is the only place a "final" instant is produced. Every key written
/// and every key looked up must come through here, or matching silently
/// breaks.
pub fn canonical_instant(
    local: NaiveDateTime,
    tzid: Option<&str>,
    default_tz: Tz,
) -> BridgeResult<DateTime<Utc>> {
    let tz: Tz = match tzid {
        Some(name) => name
            .parse()
            .map_err(|_| data_error(&format!("Unknown TZID: {}", name)))?,
        None => default_tz,
    };

    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        // DST fold: always take the earlier offset so write and lookup agree
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(data_error(&format!(
            "Local time {} does not exist in {}",
            local, tz
        ))),
    }
}

/// Resolve both instants of an occurrence with its own TZID
pub fn canonical_span(
    occurrence: &SourceOccurrence,
    default_tz: Tz,
) -> BridgeResult<(DateTime<Utc>, DateTime<Utc>)> {
    let tzid = occurrence.source_timezone.as_deref();
    let start = canonical_instant(occurrence.start, tzid, default_tz)?;
    let end = canonical_instant(occurrence.end, tzid, default_tz)?;
    Ok((start, end))
}

/// Deterministic matching key for one (series uid, occurrence instant) pair
pub fn build_key(uid: &str, start: DateTime<Utc>) -> String {
    format!("{}:{}", uid, start.timestamp_millis())
}

/// Append the backlink marker to a description.
///
/// Idempotent: a description that already carries the marker for this uid
/// is returned unchanged, and a stale marker for another uid is replaced
/// rather than duplicated.
pub fn embed_backlink(description: Option<&str>, uid: &str) -> String {
    let marker_line = format!("{}{}", BACKLINK_MARKER, uid);

    let Some(text) = description.filter(|t| !t.is_empty()) else {
        return marker_line;
    };

    match extract_backlink(text) {
        Some(existing) if existing == uid => text.to_string(),
        Some(_) => text
            .lines()
            .map(|line| {
                if line.starts_with(BACKLINK_MARKER) {
                    marker_line.clone()
                } else {
                    line.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
        None => format!("{}\n{}", text, marker_line),
    }
}

/// Parse the backlink marker out of a destination description
pub fn extract_backlink(description: &str) -> Option<String> {
    description
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(BACKLINK_MARKER))
        .map(|uid| uid.trim().to_string())
        .filter(|uid| !uid.is_empty())
}

/// UID prefix before a recurrence-instance suffix.
///
/// Expanded instances arrive as `<series>_<instance stamp>`; occurrences of
/// the same series share the prefix.
pub fn base_uid(uid: &str) -> &str {
    match uid.rsplit_once('_') {
        Some((base, suffix))
            if !suffix.is_empty()
                && suffix
                    .chars()
                    .all(|c| c.is_ascii_digit() || c == 'T' || c == 'Z') =>
        {
            base
        }
        _ => uid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn local(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 8, 15)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn build_key_is_pure_and_millisecond_precise() {
        let start = canonical_instant(local(10, 0), None, chrono_tz::UTC).unwrap();
        let first = build_key("m1", start);
        let second = build_key("m1", start);
        assert_eq!(first, second);
        assert_eq!(first, format!("m1:{}", start.timestamp_millis()));
    }

    #[test]
    fn canonical_instant_resolves_tzid() {
        let helsinki = canonical_instant(local(13, 0), Some("Europe/Helsinki"), chrono_tz::UTC)
            .unwrap();
        let utc = canonical_instant(local(10, 0), None, chrono_tz::UTC).unwrap();
        assert_eq!(helsinki, utc);
    }

    #[test]
    fn unknown_tzid_is_a_data_error() {
        let result = canonical_instant(local(10, 0), Some("Mars/Olympus"), chrono_tz::UTC);
        assert!(result.is_err());
    }

    #[test]
    fn embed_is_idempotent() {
        let once = embed_backlink(Some("Weekly planning"), "m1");
        let twice = embed_backlink(Some(&once), "m1");
        assert_eq!(once, twice);
        assert_eq!(once, "Weekly planning\nOriginal UID: m1");
    }

    #[test]
    fn embed_replaces_stale_marker() {
        let stale = "Weekly planning\nOriginal UID: old";
        let fixed = embed_backlink(Some(stale), "m1");
        assert_eq!(fixed, "Weekly planning\nOriginal UID: m1");
    }

    #[test]
    fn embed_into_empty_description() {
        assert_eq!(embed_backlink(None, "m1"), "Original UID: m1");
        assert_eq!(embed_backlink(Some(""), "m1"), "Original UID: m1");
    }

    #[test]
    fn extract_roundtrips() {
        let description = embed_backlink(Some("Notes here"), "m1_20240815T100000Z");
        assert_eq!(
            extract_backlink(&description).as_deref(),
            Some("m1_20240815T100000Z")
        );
        assert_eq!(extract_backlink("no marker"), None);
    }

    #[test]
    fn base_uid_strips_instance_suffix() {
        assert_eq!(base_uid("series_20240815T100000Z"), "series");
        assert_eq!(base_uid("plain-uid"), "plain-uid");
        assert_eq!(base_uid("not_a_stamp"), "not_a_stamp");
    }
}
