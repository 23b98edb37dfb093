use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::{column_letter, CellRef};

/// Row id assigned by the mapping store.
pub type MappingId = i64;

/// Which of the two mapping tables a record lives in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingKind {
    Column,
    Cell,
}

impl fmt::Display for MappingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MappingKind::Column => "column",
            MappingKind::Cell => "cell",
        })
    }
}

impl FromStr for MappingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "column" => Ok(MappingKind::Column),
            "cell" => Ok(MappingKind::Cell),
            other => Err(format!("unknown mapping kind `{other}` (expected `column` or `cell`)")),
        }
    }
}

/// How an ambiguous header was settled by a human.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisambiguationContext {
    pub disambiguated_at: DateTime<Utc>,
    pub selected_index: usize,
    pub user_label: Option<String>,
    pub total_candidates: usize,
}

/// Cached resolution of `(spreadsheet, sheet, header_text)` to a column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Assigned by the store on first write.
    pub id: Option<MappingId>,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub header_text: String,
    pub column_letter: String,
    /// 0-based.
    pub column_index: u32,
    /// 0-based row the header was found on.
    pub header_row: u32,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub disambiguation_context: Option<DisambiguationContext>,
}

impl ColumnMapping {
    /// A fresh, unsaved mapping for a live candidate, validated as of `now`.
    pub fn from_candidate(
        spreadsheet_id: &str,
        sheet_name: &str,
        header_text: &str,
        candidate: &ColumnCandidate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_name: sheet_name.to_string(),
            header_text: header_text.to_string(),
            column_letter: candidate.column_letter.clone(),
            column_index: candidate.column_index,
            header_row: candidate.header_row,
            last_validated_at: Some(now),
            created_at: now,
            disambiguation_context: None,
        }
    }

    /// Point the mapping at a different column.
    pub fn relocate(&mut self, column_index: u32) {
        self.column_index = column_index;
        self.column_letter = column_letter(column_index);
    }
}

/// Cached resolution of `(spreadsheet, sheet, column_header, row_label)` to one cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellMapping {
    pub id: Option<MappingId>,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub column_header: String,
    pub row_label: String,
    /// Relative A1 address, e.g. `B5`.
    pub cell_address: String,
    /// 0-based row the label was found on.
    pub row_index: u32,
    pub column_letter: String,
    pub column_index: u32,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub disambiguation_context: Option<DisambiguationContext>,
}

impl CellMapping {
    /// A fresh, unsaved mapping at the intersection of `column` and `row_index`.
    ///
    /// The column's disambiguation context carries over so the cell stays pinned to the
    /// same human choice.
    pub fn at_intersection(
        column: &ColumnMapping,
        row_label: &str,
        row_index: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let cell = CellRef::new(row_index, column.column_index);
        Self {
            id: None,
            spreadsheet_id: column.spreadsheet_id.clone(),
            sheet_name: column.sheet_name.clone(),
            column_header: column.header_text.clone(),
            row_label: row_label.to_string(),
            cell_address: cell.to_a1(),
            row_index,
            column_letter: column.column_letter.clone(),
            column_index: column.column_index,
            last_validated_at: Some(now),
            created_at: now,
            disambiguation_context: column.disambiguation_context.clone(),
        }
    }

    pub fn cell(&self) -> CellRef {
        CellRef::new(self.row_index, self.column_index)
    }

    /// Point the mapping at a different cell, keeping address and letters in sync.
    pub fn relocate(&mut self, column_index: u32, row_index: u32) {
        let cell = CellRef::new(row_index, column_index);
        self.column_index = column_index;
        self.column_letter = cell.column_letter();
        self.row_index = row_index;
        self.cell_address = cell.to_a1();
    }
}

/// Neighbouring header texts of a candidate column.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjacentHeaders {
    pub left: Option<String>,
    pub right: Option<String>,
}

/// One live header match found while scanning a sheet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCandidate {
    pub column_letter: String,
    pub column_index: u32,
    /// 0-based.
    pub header_row: u32,
    /// Non-empty values below the header, top to bottom.
    pub sample_values: Vec<String>,
    pub adjacent_headers: AdjacentHeaders,
}

/// Current accuracy of a mapping against live sheet content.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingStatus {
    /// Header exists where the mapping says.
    Valid,
    /// Header exists exactly once, somewhere else.
    Moved,
    /// Header (or row label) is gone.
    Missing,
    /// Header exists more than once.
    Ambiguous,
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MappingStatus::Valid => "valid",
            MappingStatus::Moved => "moved",
            MappingStatus::Missing => "missing",
            MappingStatus::Ambiguous => "ambiguous",
        })
    }
}

/// Outcome of checking one mapping against live content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: MappingStatus,
    pub message: String,
    pub old_column_letter: Option<String>,
    pub new_column_letter: Option<String>,
    /// Live 0-based column when MOVED, or when a cell's header was found but its row label was not.
    pub new_column_index: Option<u32>,
    /// Cell mappings only: new 0-based row when MOVED.
    pub new_row_index: Option<u32>,
    /// Cell mappings only: new A1 address when MOVED.
    pub new_cell_address: Option<String>,
    /// Populated when AMBIGUOUS.
    pub candidates: Vec<ColumnCandidate>,
}

impl ValidationResult {
    fn with_status(status: MappingStatus, message: String) -> Self {
        Self {
            status,
            message,
            old_column_letter: None,
            new_column_letter: None,
            new_column_index: None,
            new_row_index: None,
            new_cell_address: None,
            candidates: Vec::new(),
        }
    }

    pub fn valid(message: impl Into<String>) -> Self {
        Self::with_status(MappingStatus::Valid, message.into())
    }

    pub fn moved(old_letter: &str, new_column_index: u32, message: impl Into<String>) -> Self {
        Self {
            old_column_letter: Some(old_letter.to_string()),
            new_column_letter: Some(column_letter(new_column_index)),
            new_column_index: Some(new_column_index),
            ..Self::with_status(MappingStatus::Moved, message.into())
        }
    }

    pub fn missing(old_letter: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            old_column_letter: old_letter.map(str::to_string),
            ..Self::with_status(MappingStatus::Missing, message.into())
        }
    }

    pub fn ambiguous(candidates: Vec<ColumnCandidate>, message: impl Into<String>) -> Self {
        Self {
            candidates,
            ..Self::with_status(MappingStatus::Ambiguous, message.into())
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == MappingStatus::Valid
    }

    pub fn requires_disambiguation(&self) -> bool {
        self.status == MappingStatus::Ambiguous
    }
}

/// A pending "header matched N columns; pick one" question.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisambiguationRequest {
    pub request_id: Uuid,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub header_text: String,
    pub candidates: Vec<ColumnCandidate>,
    pub created_at: DateTime<Utc>,
}

/// A human's answer to a [`DisambiguationRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisambiguationResponse {
    pub request_id: Uuid,
    /// Index into the request's `candidates`.
    pub selected_column_index: usize,
    #[serde(default)]
    pub user_label: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(col: u32) -> ColumnCandidate {
        ColumnCandidate {
            column_letter: column_letter(col),
            column_index: col,
            header_row: 0,
            sample_values: vec![],
            adjacent_headers: AdjacentHeaders::default(),
        }
    }

    #[test]
    fn relocating_keeps_letters_in_sync() {
        let now = Utc::now();
        let mut column = ColumnMapping::from_candidate("s", "Sheet1", "Level", &candidate(1), now);
        assert_eq!(column.column_letter, "B");
        column.relocate(3);
        assert_eq!((column.column_letter.as_str(), column.column_index), ("D", 3));

        let mut cell = CellMapping::at_intersection(&column, "Jane", 4, now);
        assert_eq!(cell.cell_address, "D5");
        cell.relocate(6, 9);
        assert_eq!(cell.cell_address, "G10");
        assert_eq!(cell.column_letter, "G");
        assert_eq!(cell.cell(), CellRef::new(9, 6));
    }

    #[test]
    fn mapping_kind_parses_case_insensitively() {
        assert_eq!("Cell".parse::<MappingKind>(), Ok(MappingKind::Cell));
        assert_eq!("column".parse::<MappingKind>(), Ok(MappingKind::Column));
        assert!("row".parse::<MappingKind>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MappingStatus::Ambiguous).unwrap(),
            "\"ambiguous\""
        );
    }
}
