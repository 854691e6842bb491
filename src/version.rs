//! Version and timestamp comparison.
//!
//! Mod versions and runtime (game) versions are dot-separated integers.
//! Release timestamps are fixed-width RFC 3339 strings in UTC.

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{ModwatchError, Result};

/// Compare two dot-separated version strings segment by segment.
///
/// Segments are compared numerically, so `1.2` sorts before `1.10`. The shorter
/// version is padded with zeros on the right, making `1.0` equal to `1.0.0`.
/// A segment that is not a number counts as zero.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use modwatch::version::compare_versions;
///
/// assert_eq!(compare_versions("1.2", "1.10"), Ordering::Less);
/// assert_eq!(compare_versions("2.0", "2.0.0"), Ordering::Equal);
/// ```
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left: Vec<u64> = a.split('.').map(|s| s.trim().parse().unwrap_or(0)).collect();
    let right: Vec<u64> = b.split('.').map(|s| s.trim().parse().unwrap_or(0)).collect();

    for i in 0..left.len().max(right.len()) {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Normalize a runtime version string such as `"01.1"` into `"1.1"`.
///
/// Returns `None` for an empty string or when any segment is not an
/// unsigned integer; such items are treated as version-less.
pub fn normalize_runtime_version(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let mut parts = Vec::new();
    for segment in raw.split('.') {
        let n: u64 = segment.parse().ok()?;
        parts.push(n.to_string());
    }
    Some(parts.join("."))
}

/// Parse an RFC 3339 timestamp, reporting failures as [`ModwatchError::InvalidTimestamp`].
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ModwatchError::InvalidTimestamp(raw.to_string()))
}

/// Render a timestamp in the fixed-width form used for persisted watermarks.
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Whether a release at `candidate` falls inside the window starting at `watermark`.
///
/// A release exactly at the watermark counts as newer. Both strings must be
/// valid RFC 3339; a parse failure is an error, never a silent `false`.
/// Same-width strings are compared lexically (the portal format is
/// zero-padded UTC); otherwise the parsed instants are compared.
///
/// # Errors
///
/// Returns [`ModwatchError::InvalidTimestamp`] if either string does not parse.
pub fn is_release_newer(candidate: &str, watermark: &str) -> Result<bool> {
    let candidate_time = parse_timestamp(candidate)?;
    let watermark_time = parse_timestamp(watermark)?;

    if candidate.len() == watermark.len() {
        Ok(candidate >= watermark)
    } else {
        Ok(candidate_time >= watermark_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_versions_numeric_segments() {
        assert_eq!(compare_versions("1.2", "1.10"), Ordering::Less);
        assert_eq!(compare_versions("1.10", "1.2"), Ordering::Greater);
        assert_eq!(compare_versions("0.18.3", "0.18.3"), Ordering::Equal);
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.0.1", "1.0"), Ordering::Greater);
        assert_eq!(compare_versions("2", "10"), Ordering::Less);
    }

    #[test]
    fn test_compare_versions_antisymmetric_and_transitive() {
        let versions = ["0.1.0", "0.1.9", "0.1.10", "0.2", "1.0.0", "1.1", "1.10.2", "2.0"];
        for a in &versions {
            for b in &versions {
                assert_eq!(compare_versions(a, b), compare_versions(b, a).reverse());
                for c in &versions {
                    if compare_versions(a, b) == Ordering::Less && compare_versions(b, c) == Ordering::Less {
                        assert_eq!(compare_versions(a, c), Ordering::Less, "{} < {} < {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_normalize_runtime_version() {
        assert_eq!(normalize_runtime_version("2.0"), Some("2.0".to_string()));
        assert_eq!(normalize_runtime_version("01.01"), Some("1.1".to_string()));
        assert_eq!(normalize_runtime_version("0.18"), Some("0.18".to_string()));
        assert_eq!(normalize_runtime_version(""), None);
        assert_eq!(normalize_runtime_version("1.x"), None);
        assert_eq!(normalize_runtime_version("1..1"), None);
        assert_eq!(normalize_runtime_version("-1.0"), None);
    }

    #[test]
    fn test_is_release_newer() {
        let watermark = "2024-03-01T12:00:00.000000Z";
        assert!(is_release_newer("2024-03-01T12:00:00.000001Z", watermark).unwrap());
        assert!(is_release_newer(watermark, watermark).unwrap());
        assert!(!is_release_newer("2024-02-29T23:59:59.999999Z", watermark).unwrap());
    }

    #[test]
    fn test_is_release_newer_mixed_width() {
        // Second precision against micro precision falls back to parsed comparison
        assert!(is_release_newer("2024-03-01T12:00:01Z", "2024-03-01T12:00:00.500000Z").unwrap());
        assert!(!is_release_newer("2024-03-01T12:00:00Z", "2024-03-01T12:00:00.500000Z").unwrap());
    }

    #[test]
    fn test_is_release_newer_rejects_garbage() {
        let err = is_release_newer("not a time", "2024-03-01T12:00:00.000000Z").unwrap_err();
        assert!(matches!(err, ModwatchError::InvalidTimestamp(ref s) if s == "not a time"));
        assert!(is_release_newer("2024-03-01T12:00:00.000000Z", "").is_err());
    }

    #[test]
    fn test_format_timestamp_round_trips_through_parse() {
        let parsed = parse_timestamp("2024-03-01T12:00:00.123456Z").unwrap();
        assert_eq!(format_timestamp(parsed), "2024-03-01T12:00:00.123456Z");
    }
}
