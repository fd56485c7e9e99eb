//! Feature Layout - Centralized Feature Definition
//!
//! **This file controls the feature schema shared by the scaler, the
//! detector and every artifact written by `sensor-train`.**
//!
//! ## Rules:
//! 1. Add feature → increment FEATURE_VERSION
//! 2. Change order → increment FEATURE_VERSION
//! 3. Remove feature → increment FEATURE_VERSION
//!
//! Artifacts carry the layout hash, so a model trained against a different
//! layout is refused at load time instead of producing garbage scores.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

// ============================================================================
// FEATURE VERSION
// ============================================================================

/// Current feature layout version
pub const FEATURE_VERSION: u8 = 1;

// ============================================================================
// FEATURE LAYOUT (Authoritative source)
// ============================================================================

/// Feature names in the exact column order of the feature matrix
pub const FEATURE_LAYOUT: &[&str] = &[
    "temperature", // 0: Ambient temperature
    "humidity",    // 1: Relative humidity
    "gas",         // 2: Gas sensor level
];

/// Total number of features
/// Must match FEATURE_LAYOUT.len()
pub const FEATURE_COUNT: usize = 3;

/// Source column aliases, applied after name normalization
pub const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("temp", "temperature"),
    ("gas_level", "gas"),
];

/// Column carrying the reading timestamp
pub const TIME_COLUMN: &str = "time";

/// Textual cells treated as a missing value
const NULL_MARKERS: &[&str] = &["", "nan", "na", "n/a", "null", "none"];

// ============================================================================
// LAYOUT HASH
// ============================================================================

/// CRC32 of the layout version and the ordered feature names
pub fn layout_hash() -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[FEATURE_VERSION]);

    for name in FEATURE_LAYOUT {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }

    hasher.finalize()
}

/// Layout stamp embedded in every model artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutInfo {
    pub version: u8,
    pub hash: u32,
    pub feature_names: Vec<String>,
}

impl LayoutInfo {
    pub fn current() -> Self {
        Self {
            version: FEATURE_VERSION,
            hash: layout_hash(),
            feature_names: FEATURE_LAYOUT.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Whether an artifact stamped with this layout can be used as-is
    pub fn is_compatible(&self) -> bool {
        self.version == FEATURE_VERSION
            && self.hash == layout_hash()
            && self.feature_names.len() == FEATURE_COUNT
    }
}

// ============================================================================
// COLUMN NAMES
// ============================================================================

/// Lower-case and trim a source column name
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Normalize a source column name and resolve its alias
pub fn canonical_column_name(name: &str) -> String {
    let normalized = normalize_column_name(name);
    COLUMN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(normalized)
}

/// Whether a text cell should be imputed as missing
pub fn is_null_marker(text: &str) -> bool {
    let trimmed = text.trim();
    NULL_MARKERS.iter().any(|m| trimmed.eq_ignore_ascii_case(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_count() {
        assert_eq!(FEATURE_LAYOUT.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_layout_hash_stable() {
        assert_eq!(layout_hash(), layout_hash());
        assert_eq!(LayoutInfo::current().hash, layout_hash());
    }

    #[test]
    fn test_canonical_names() {
        assert_eq!(canonical_column_name("  Temp "), "temperature");
        assert_eq!(canonical_column_name("GAS_LEVEL"), "gas");
        assert_eq!(canonical_column_name("Humidity"), "humidity");
        assert_eq!(canonical_column_name("Device ID"), "device id");
    }

    #[test]
    fn test_null_markers() {
        assert!(is_null_marker(""));
        assert!(is_null_marker(" NaN "));
        assert!(is_null_marker("N/A"));
        assert!(!is_null_marker("0"));
    }
}
