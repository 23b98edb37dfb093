use sheetmap_model::{CellMapping, ColumnMapping, MappingId};

use crate::storage::Result;

/// Durable keyed store for column and cell mappings.
///
/// Column mappings are keyed by `(spreadsheet_id, sheet_name, header_text)` and cell
/// mappings by `(spreadsheet_id, sheet_name, column_header, row_label)`. Writes are upserts
/// on that key: the last write wins and the row id of the first write is kept. Nothing
/// spans calls, so check-then-write sequences built on top are not atomic.
pub trait MappingStore: Send + Sync {
    fn get_column(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        header_text: &str,
    ) -> Result<Option<ColumnMapping>>;

    fn get_column_by_id(&self, id: MappingId) -> Result<Option<ColumnMapping>>;

    /// Upsert; returns the mapping with its id and original `created_at` filled in.
    fn put_column(&self, mapping: ColumnMapping) -> Result<ColumnMapping>;

    fn list_columns(&self, spreadsheet_id: &str, sheet_name: Option<&str>) -> Result<Vec<ColumnMapping>>;

    fn delete_column(&self, id: MappingId) -> Result<bool>;

    fn get_cell(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        column_header: &str,
        row_label: &str,
    ) -> Result<Option<CellMapping>>;

    fn get_cell_by_id(&self, id: MappingId) -> Result<Option<CellMapping>>;

    fn put_cell(&self, mapping: CellMapping) -> Result<CellMapping>;

    fn list_cells(&self, spreadsheet_id: &str, sheet_name: Option<&str>) -> Result<Vec<CellMapping>>;

    fn delete_cell(&self, id: MappingId) -> Result<bool>;

    /// Remove every mapping of both kinds for a spreadsheet (optionally one sheet).
    fn delete_all(&self, spreadsheet_id: &str, sheet_name: Option<&str>) -> Result<usize>;
}
