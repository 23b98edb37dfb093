//! `sheetmap-model` defines the data structures shared by the mapping crates:
//! - A1 addressing (column letters, cell references, sheet ranges)
//! - cached mapping records and their validation outcomes
//! - the read-only [`SheetAccessor`] seam to the externally owned spreadsheet
//! - an in-memory workbook implementing that seam

mod accessor;
mod address;
mod audit;
mod mapping;
mod value;
pub mod workbook;

pub use accessor::{AccessError, CellData, SheetAccessor, SheetInfo, SpreadsheetInfo};
pub use address::{
    column_index, column_letter, quote_sheet_name, A1ParseError, CellRef, SheetRange, MAX_COLS,
    MAX_ROWS,
};
pub use audit::{MappingAuditEntry, MappingAuditReport};
pub use mapping::{
    AdjacentHeaders, CellMapping, ColumnCandidate, ColumnMapping, DisambiguationContext,
    DisambiguationRequest, DisambiguationResponse, MappingId, MappingKind, MappingStatus,
    ValidationResult,
};
pub use value::CellValue;
pub use workbook::{InMemoryWorkbook, WorkbookError};
