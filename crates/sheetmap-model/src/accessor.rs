use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::{CellRef, SheetRange};
use crate::value::CellValue;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("spreadsheet not found: {0}")]
    SpreadsheetNotFound(String),
    #[error("sheet `{sheet}` not found in spreadsheet {spreadsheet_id}")]
    SheetNotFound { spreadsheet_id: String, sheet: String },
    #[error("sheet backend error: {0}")]
    Backend(String),
}

/// Dimensions of one sheet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetInfo {
    pub title: String,
    pub row_count: u32,
    pub col_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadsheetInfo {
    pub id: String,
    pub title: String,
    pub sheets: Vec<SheetInfo>,
}

/// One non-empty cell returned by [`SheetAccessor::read_range`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellData {
    pub sheet: String,
    pub cell: CellRef,
    pub value: CellValue,
    /// Present only when formulas were requested and the cell has one.
    pub formula: Option<String>,
}

impl CellData {
    /// Trimmed display text of the value, `None` for blanks.
    pub fn text(&self) -> Option<String> {
        self.value.as_text().map(|s| s.trim().to_string())
    }
}

/// Read-only view of an externally owned spreadsheet.
///
/// Implementations return cells in row-major order and may omit blank cells.
#[async_trait]
pub trait SheetAccessor: Send + Sync {
    async fn get_info(&self, spreadsheet_id: &str) -> Result<SpreadsheetInfo, AccessError>;

    async fn read_range(
        &self,
        spreadsheet_id: &str,
        range: &SheetRange,
        include_formulas: bool,
    ) -> Result<Vec<CellData>, AccessError>;
}

#[async_trait]
impl<T: SheetAccessor + ?Sized> SheetAccessor for Arc<T> {
    async fn get_info(&self, spreadsheet_id: &str) -> Result<SpreadsheetInfo, AccessError> {
        (**self).get_info(spreadsheet_id).await
    }

    async fn read_range(
        &self,
        spreadsheet_id: &str,
        range: &SheetRange,
        include_formulas: bool,
    ) -> Result<Vec<CellData>, AccessError> {
        (**self)
            .read_range(spreadsheet_id, range, include_formulas)
            .await
    }
}
