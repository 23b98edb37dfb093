//! An in-process [`SheetAccessor`] over a JSON workbook snapshot.
//!
//! Snapshot format:
//!
//! ```json
//! {
//!   "id": "sheet-123",
//!   "title": "Balance",
//!   "sheets": [
//!     { "name": "Base", "cells": { "A1": { "value": "Name" }, "B2": { "value": 5, "formula": "=2+3" } } }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::accessor::{AccessError, CellData, SheetAccessor, SheetInfo, SpreadsheetInfo};
use crate::address::{A1ParseError, CellRef, SheetRange, MAX_COLS};
use crate::value::CellValue;

const DEFAULT_ROW_COUNT: u32 = 1000;
const DEFAULT_COL_COUNT: u32 = 26;

#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("invalid workbook json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid cell address `{address}` in sheet `{sheet}`: {source}")]
    Address {
        sheet: String,
        address: String,
        #[source]
        source: A1ParseError,
    },
    #[error("column {0} is out of range")]
    ColumnOutOfRange(u32),
    #[error("unknown sheet `{0}`")]
    UnknownSheet(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkbookSnapshot {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    sheets: Vec<SheetSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetSnapshot {
    name: String,
    #[serde(default)]
    cells: BTreeMap<String, CellSnapshot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CellSnapshot {
    #[serde(default)]
    value: CellValue,
    #[serde(default)]
    formula: Option<String>,
}

#[derive(Debug, Default)]
struct SheetGrid {
    name: String,
    cells: BTreeMap<CellRef, CellSnapshot>,
}

/// A mutable, in-memory spreadsheet.
///
/// Reads go through [`SheetAccessor`]; the mutators exist so callers (tests, the CLI)
/// can stage content and simulate layout drift between reads.
#[derive(Debug)]
pub struct InMemoryWorkbook {
    id: String,
    title: String,
    sheets: RwLock<Vec<SheetGrid>>,
}

impl InMemoryWorkbook {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            sheets: RwLock::new(Vec::new()),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, WorkbookError> {
        let snapshot: WorkbookSnapshot = serde_json::from_str(json)?;
        let mut sheets = Vec::with_capacity(snapshot.sheets.len());
        for sheet in snapshot.sheets {
            let mut cells = BTreeMap::new();
            for (address, cell) in sheet.cells {
                let cell_ref = CellRef::from_a1(&address).map_err(|source| WorkbookError::Address {
                    sheet: sheet.name.clone(),
                    address: address.clone(),
                    source,
                })?;
                cells.insert(cell_ref, cell);
            }
            sheets.push(SheetGrid {
                name: sheet.name,
                cells,
            });
        }

        Ok(Self {
            title: snapshot.title.unwrap_or_else(|| snapshot.id.clone()),
            id: snapshot.id,
            sheets: RwLock::new(sheets),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Add an empty sheet (no-op if it already exists).
    pub fn add_sheet(&self, name: &str) {
        let mut sheets = self.sheets.write().expect("workbook lock poisoned");
        if !sheets.iter().any(|s| s.name == name) {
            sheets.push(SheetGrid {
                name: name.to_string(),
                cells: BTreeMap::new(),
            });
        }
    }

    /// Set one cell's value, creating the sheet when it does not exist yet.
    pub fn set_value(
        &self,
        sheet: &str,
        address: &str,
        value: impl Into<CellValue>,
    ) -> Result<(), WorkbookError> {
        let cell = parse_address(sheet, address)?;
        self.add_sheet(sheet);
        let mut sheets = self.sheets.write().expect("workbook lock poisoned");
        let grid = find_mut(&mut sheets, sheet)?;
        let value = value.into();
        if value.is_empty() {
            grid.cells.remove(&cell);
        } else {
            grid.cells.entry(cell).or_default().value = value;
        }
        Ok(())
    }

    /// Write a row of values starting at `address` and moving right.
    pub fn set_row<V: Into<CellValue>>(
        &self,
        sheet: &str,
        address: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<(), WorkbookError> {
        let start = parse_address(sheet, address)?;
        for (offset, value) in values.into_iter().enumerate() {
            let cell = CellRef::new(start.row, start.col + offset as u32);
            self.set_value(sheet, &cell.to_a1(), value)?;
        }
        Ok(())
    }

    pub fn set_formula(
        &self,
        sheet: &str,
        address: &str,
        formula: impl Into<String>,
    ) -> Result<(), WorkbookError> {
        let cell = parse_address(sheet, address)?;
        self.add_sheet(sheet);
        let mut sheets = self.sheets.write().expect("workbook lock poisoned");
        let grid = find_mut(&mut sheets, sheet)?;
        grid.cells.entry(cell).or_default().formula = Some(formula.into());
        Ok(())
    }

    pub fn clear_cell(&self, sheet: &str, address: &str) -> Result<(), WorkbookError> {
        let cell = parse_address(sheet, address)?;
        let mut sheets = self.sheets.write().expect("workbook lock poisoned");
        find_mut(&mut sheets, sheet)?.cells.remove(&cell);
        Ok(())
    }

    /// Insert an empty column before `col`, shifting everything at or right of it by one.
    pub fn insert_column(&self, sheet: &str, col: u32) -> Result<(), WorkbookError> {
        let mut sheets = self.sheets.write().expect("workbook lock poisoned");
        let grid = find_mut(&mut sheets, sheet)?;
        if grid.cells.keys().any(|c| c.col >= col && c.col + 1 >= MAX_COLS) {
            return Err(WorkbookError::ColumnOutOfRange(col));
        }
        let cells = std::mem::take(&mut grid.cells);
        grid.cells = cells
            .into_iter()
            .map(|(c, v)| {
                let shifted = if c.col >= col { CellRef::new(c.row, c.col + 1) } else { c };
                (shifted, v)
            })
            .collect();
        Ok(())
    }

    /// Remove column `col`, shifting everything right of it left by one.
    pub fn delete_column(&self, sheet: &str, col: u32) -> Result<(), WorkbookError> {
        let mut sheets = self.sheets.write().expect("workbook lock poisoned");
        let grid = find_mut(&mut sheets, sheet)?;
        let cells = std::mem::take(&mut grid.cells);
        grid.cells = cells
            .into_iter()
            .filter(|(c, _)| c.col != col)
            .map(|(c, v)| {
                let shifted = if c.col > col { CellRef::new(c.row, c.col - 1) } else { c };
                (shifted, v)
            })
            .collect();
        Ok(())
    }

    fn check_id(&self, spreadsheet_id: &str) -> Result<(), AccessError> {
        if spreadsheet_id == self.id {
            Ok(())
        } else {
            Err(AccessError::SpreadsheetNotFound(spreadsheet_id.to_string()))
        }
    }
}

fn parse_address(sheet: &str, address: &str) -> Result<CellRef, WorkbookError> {
    CellRef::from_a1(address).map_err(|source| WorkbookError::Address {
        sheet: sheet.to_string(),
        address: address.to_string(),
        source,
    })
}

fn find_mut<'a>(sheets: &'a mut [SheetGrid], name: &str) -> Result<&'a mut SheetGrid, WorkbookError> {
    sheets
        .iter_mut()
        .find(|s| s.name == name)
        .ok_or_else(|| WorkbookError::UnknownSheet(name.to_string()))
}

#[async_trait]
impl SheetAccessor for InMemoryWorkbook {
    async fn get_info(&self, spreadsheet_id: &str) -> Result<SpreadsheetInfo, AccessError> {
        self.check_id(spreadsheet_id)?;
        let sheets = self.sheets.read().expect("workbook lock poisoned");
        let sheets = sheets
            .iter()
            .map(|grid| {
                let used_rows = grid.cells.keys().map(|c| c.row + 1).max().unwrap_or(0);
                let used_cols = grid.cells.keys().map(|c| c.col + 1).max().unwrap_or(0);
                SheetInfo {
                    title: grid.name.clone(),
                    row_count: used_rows.max(DEFAULT_ROW_COUNT),
                    col_count: used_cols.max(DEFAULT_COL_COUNT),
                }
            })
            .collect();
        Ok(SpreadsheetInfo {
            id: self.id.clone(),
            title: self.title.clone(),
            sheets,
        })
    }

    async fn read_range(
        &self,
        spreadsheet_id: &str,
        range: &SheetRange,
        include_formulas: bool,
    ) -> Result<Vec<CellData>, AccessError> {
        self.check_id(spreadsheet_id)?;
        let sheets = self.sheets.read().expect("workbook lock poisoned");
        let grid = sheets
            .iter()
            .find(|s| s.name == range.sheet)
            .ok_or_else(|| AccessError::SheetNotFound {
                spreadsheet_id: spreadsheet_id.to_string(),
                sheet: range.sheet.clone(),
            })?;

        // BTreeMap iteration over `CellRef` is already row-major.
        Ok(grid
            .cells
            .range(range.start..=range.end)
            .filter(|(cell, _)| range.contains(**cell))
            .filter(|(_, snap)| !snap.value.is_empty() || (include_formulas && snap.formula.is_some()))
            .map(|(cell, snap)| CellData {
                sheet: grid.name.clone(),
                cell: *cell,
                value: snap.value.clone(),
                formula: if include_formulas { snap.formula.clone() } else { None },
            })
            .collect())
    }
}
