use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Tunables for header scanning, disambiguation and reference formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Rows scanned from the top of a sheet when looking for a header (default: 10).
    pub header_scan_rows: u32,
    /// Columns scanned from `A` when looking for a header (default: 702, i.e. `A..ZZ`).
    pub header_scan_columns: u32,
    /// 0-based column holding row labels (default: 0, column `A`).
    pub label_column: u32,
    /// Sample values collected below each candidate header (default: 5).
    pub max_sample_values: usize,
    /// Lifetime of a pending disambiguation request in seconds (default: 24h).
    pub disambiguation_ttl_secs: u64,
    /// 1-based row used for cross-sheet references (default: 2, first row under the header).
    pub cross_sheet_row: u32,
    /// Fuzzy score a live header must exceed to show up in a preview (default: 0.5).
    pub preview_threshold: f64,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            header_scan_rows: 10,
            header_scan_columns: 702,
            label_column: 0,
            max_sample_values: 5,
            disambiguation_ttl_secs: 24 * 60 * 60,
            cross_sheet_row: 2,
            preview_threshold: 0.5,
        }
    }
}

impl MappingConfig {
    pub fn disambiguation_ttl(&self) -> Duration {
        i64::try_from(self.disambiguation_ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
