//! Invalidation manifest document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::EpochMs;

/// An externally published invalidation manifest.
///
/// `version` is opaque; any change from the last-seen value triggers an
/// invalidation pass. `patterns` maps rule match expressions to ISO-8601
/// timestamps: records matching the pattern that were cached before the
/// timestamp are invalid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDocument {
    /// Opaque manifest version.
    #[serde(default)]
    pub version: Option<String>,
    /// Pattern to ISO-8601 cutoff timestamp.
    #[serde(default)]
    pub patterns: BTreeMap<String, String>,
}

/// Parses an ISO-8601 timestamp to epoch milliseconds.
///
/// Unparsable timestamps yield `None` and the pattern entry is skipped.
pub fn parse_cutoff(timestamp: &str) -> Option<EpochMs> {
    chrono::DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|date| date.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_manifest() {
        let doc: ManifestDocument = serde_json::from_str(
            r#"{
                "version": "42",
                "patterns": { ".*\\.json$": "2024-06-01T12:00:00Z" }
            }"#,
        )
        .unwrap();
        assert_eq!(doc.version.as_deref(), Some("42"));
        assert_eq!(
            doc.patterns.get(r".*\.json$").map(String::as_str),
            Some("2024-06-01T12:00:00Z")
        );
    }

    #[test]
    fn missing_fields_default() {
        let doc: ManifestDocument = serde_json::from_str("{}").unwrap();
        assert_eq!(doc.version, None);
        assert!(doc.patterns.is_empty());
    }

    #[test]
    fn cutoff_parses_rfc3339() {
        assert_eq!(parse_cutoff("1970-01-01T00:00:01Z"), Some(1_000));
        assert_eq!(parse_cutoff("yesterday-ish"), None);
    }
}
