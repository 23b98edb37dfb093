use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mapping::{MappingId, MappingKind, MappingStatus};

/// Health of one cached mapping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingAuditEntry {
    pub mapping_id: Option<MappingId>,
    pub kind: MappingKind,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub header_text: String,
    pub row_label: Option<String>,
    /// Column letter (columns) or A1 address (cells) as cached.
    pub cached_address: String,
    /// Where the mapping points in the live sheet, when it can be located.
    pub current_address: Option<String>,
    pub status: MappingStatus,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub needs_action: bool,
}

/// Read-only health report over every mapping of one spreadsheet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingAuditReport {
    pub spreadsheet_id: String,
    pub spreadsheet_title: Option<String>,
    pub total_mappings: usize,
    pub valid_count: usize,
    pub moved_count: usize,
    pub missing_count: usize,
    pub ambiguous_count: usize,
    pub entries: Vec<MappingAuditEntry>,
    pub generated_at: DateTime<Utc>,
}

impl MappingAuditReport {
    pub fn new(
        spreadsheet_id: &str,
        spreadsheet_title: Option<String>,
        entries: Vec<MappingAuditEntry>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let count = |status: MappingStatus| entries.iter().filter(|e| e.status == status).count();
        Self {
            spreadsheet_id: spreadsheet_id.to_string(),
            spreadsheet_title,
            total_mappings: entries.len(),
            valid_count: count(MappingStatus::Valid),
            moved_count: count(MappingStatus::Moved),
            missing_count: count(MappingStatus::Missing),
            ambiguous_count: count(MappingStatus::Ambiguous),
            entries,
            generated_at,
        }
    }

    /// Entries whose status is anything but VALID.
    pub fn needing_action(&self) -> impl Iterator<Item = &MappingAuditEntry> {
        self.entries.iter().filter(|e| e.needs_action)
    }
}
