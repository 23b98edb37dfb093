use std::collections::HashMap;

use sheetmap_model::{
    AdjacentHeaders, CellData, CellMapping, CellRef, ColumnCandidate, ColumnMapping,
    SheetAccessor, SheetRange, ValidationResult,
};

use crate::config::MappingConfig;
use crate::error::Result;

/// Checks cached mappings against live sheet content.
///
/// Header matching is exact: a cell matches when its trimmed text equals the header text.
/// Fuzzy matching only happens in the resolver's preview path.
pub struct MappingValidator<A> {
    accessor: A,
    config: MappingConfig,
}

/// Outcome of looking for a header relative to a cached column.
enum ColumnLookup {
    Missing,
    Found(ColumnCandidate),
    Ambiguous(Vec<ColumnCandidate>),
}

impl<A: SheetAccessor> MappingValidator<A> {
    pub fn new(accessor: A, config: MappingConfig) -> Self {
        Self { accessor, config }
    }

    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    /// Every live column whose header cell matches `header_text`, in row-major order.
    ///
    /// `expected_row` is informational; the whole header window is always scanned.
    pub async fn find_header(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        header_text: &str,
        expected_row: u32,
    ) -> Result<Vec<ColumnCandidate>> {
        let cells = self.header_window(spreadsheet_id, sheet_name).await?;
        let candidates = header_candidates(&cells, header_text.trim(), self.config.max_sample_values);
        log::debug!(
            "header '{header_text}' in '{sheet_name}' (expected row {expected_row}): {} candidate(s)",
            candidates.len()
        );
        Ok(candidates)
    }

    /// 0-based row of the first cell in the label column whose trimmed text is `row_label`.
    pub async fn find_row_label(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        row_label: &str,
    ) -> Result<Option<u32>> {
        let range = SheetRange::column(sheet_name, self.config.label_column);
        let mut cells = self.accessor.read_range(spreadsheet_id, &range, false).await?;
        cells.sort_by_key(|c| c.cell);

        let target = row_label.trim();
        Ok(cells
            .iter()
            .find(|c| c.text().as_deref() == Some(target))
            .map(|c| c.cell.row))
    }

    pub async fn validate_column(&self, mapping: &ColumnMapping) -> Result<ValidationResult> {
        let candidates = self
            .find_header(
                &mapping.spreadsheet_id,
                &mapping.sheet_name,
                &mapping.header_text,
                mapping.header_row,
            )
            .await?;

        let result = match lookup_column(candidates, mapping.column_index, mapping.disambiguation_context.is_some()) {
            ColumnLookup::Missing => ValidationResult::missing(
                Some(&mapping.column_letter),
                format!(
                    "Header '{}' not found in sheet '{}'",
                    mapping.header_text, mapping.sheet_name
                ),
            ),
            ColumnLookup::Ambiguous(candidates) => ValidationResult::ambiguous(
                candidates,
                format!("Multiple columns found with header '{}'", mapping.header_text),
            ),
            ColumnLookup::Found(candidate) if candidate.column_index == mapping.column_index => {
                ValidationResult::valid(format!(
                    "Header '{}' is valid at column {}",
                    mapping.header_text, mapping.column_letter
                ))
            }
            ColumnLookup::Found(candidate) => ValidationResult::moved(
                &mapping.column_letter,
                candidate.column_index,
                format!(
                    "Header '{}' moved from column {} to {}",
                    mapping.header_text, mapping.column_letter, candidate.column_letter
                ),
            ),
        };
        log::debug!("column mapping {:?}: {}", mapping.id, result.status);
        Ok(result)
    }

    pub async fn validate_cell(&self, mapping: &CellMapping) -> Result<ValidationResult> {
        let candidates = self
            .find_header(&mapping.spreadsheet_id, &mapping.sheet_name, &mapping.column_header, 0)
            .await?;

        let column = match lookup_column(candidates, mapping.column_index, mapping.disambiguation_context.is_some()) {
            ColumnLookup::Missing => {
                return Ok(ValidationResult::missing(
                    Some(&mapping.column_letter),
                    format!("Column header '{}' not found", mapping.column_header),
                ))
            }
            ColumnLookup::Ambiguous(candidates) => {
                return Ok(ValidationResult::ambiguous(
                    candidates,
                    format!("Multiple columns found with header '{}'", mapping.column_header),
                ))
            }
            ColumnLookup::Found(candidate) => candidate,
        };

        let Some(row_index) = self
            .find_row_label(&mapping.spreadsheet_id, &mapping.sheet_name, &mapping.row_label)
            .await?
        else {
            // The header is still there; only the row is gone.
            return Ok(ValidationResult {
                new_column_letter: Some(column.column_letter),
                new_column_index: Some(column.column_index),
                ..ValidationResult::missing(
                    Some(&mapping.column_letter),
                    format!("Row label '{}' not found", mapping.row_label),
                )
            });
        };

        let address = CellRef::new(row_index, column.column_index).to_a1();
        let result = if address == mapping.cell_address {
            ValidationResult::valid(format!(
                "Cell mapping '{} x {}' is valid at {}",
                mapping.column_header, mapping.row_label, mapping.cell_address
            ))
        } else {
            ValidationResult {
                new_row_index: Some(row_index),
                new_cell_address: Some(address.clone()),
                ..ValidationResult::moved(
                    &mapping.column_letter,
                    column.column_index,
                    format!("Cell mapping moved from {} to {}", mapping.cell_address, address),
                )
            }
        };
        log::debug!("cell mapping {:?}: {}", mapping.id, result.status);
        Ok(result)
    }

    /// Distinct non-empty header texts in the scan window, first occurrence order.
    pub async fn header_texts(&self, spreadsheet_id: &str, sheet_name: &str) -> Result<Vec<String>> {
        let cells = self.header_window(spreadsheet_id, sheet_name).await?;
        let mut texts: Vec<String> = Vec::new();
        for text in cells.iter().filter_map(CellData::text) {
            if !text.is_empty() && !texts.contains(&text) {
                texts.push(text);
            }
        }
        Ok(texts)
    }

    /// Non-empty texts of the first row, left to right.
    pub async fn first_row_headers(&self, spreadsheet_id: &str, sheet_name: &str) -> Result<Vec<String>> {
        let range = SheetRange::top_left(sheet_name, 1, self.config.header_scan_columns);
        let mut cells = self.accessor.read_range(spreadsheet_id, &range, false).await?;
        cells.sort_by_key(|c| c.cell);
        Ok(cells
            .iter()
            .filter_map(CellData::text)
            .filter(|t| !t.is_empty())
            .collect())
    }

    async fn header_window(&self, spreadsheet_id: &str, sheet_name: &str) -> Result<Vec<CellData>> {
        let range = SheetRange::top_left(
            sheet_name,
            self.config.header_scan_rows,
            self.config.header_scan_columns,
        );
        let mut cells = self.accessor.read_range(spreadsheet_id, &range, false).await?;
        // Accessors promise row-major order; candidate order must not depend on it.
        cells.sort_by_key(|c| c.cell);
        Ok(cells)
    }
}

/// Classify live candidates against the column a mapping currently points at.
///
/// With `pinned` set (an earlier human choice), several candidates still resolve to the
/// cached column as long as one of them sits there.
fn lookup_column(mut candidates: Vec<ColumnCandidate>, cached_column: u32, pinned: bool) -> ColumnLookup {
    match candidates.len() {
        0 => ColumnLookup::Missing,
        1 => ColumnLookup::Found(candidates.remove(0)),
        _ if pinned => match candidates.iter().position(|c| c.column_index == cached_column) {
            Some(pos) => ColumnLookup::Found(candidates.swap_remove(pos)),
            None => ColumnLookup::Ambiguous(candidates),
        },
        _ => ColumnLookup::Ambiguous(candidates),
    }
}

/// `cells` must be sorted row-major.
fn header_candidates(cells: &[CellData], target: &str, max_samples: usize) -> Vec<ColumnCandidate> {
    let texts: HashMap<CellRef, String> = cells
        .iter()
        .filter_map(|c| c.text().filter(|t| !t.is_empty()).map(|t| (c.cell, t)))
        .collect();

    cells
        .iter()
        .filter(|c| c.text().as_deref() == Some(target))
        .map(|header| {
            let at = header.cell;
            let sample_values = cells
                .iter()
                .filter(|c| c.cell.col == at.col && c.cell.row > at.row)
                .filter_map(|c| texts.get(&c.cell).cloned())
                .take(max_samples)
                .collect();
            let left = at
                .col
                .checked_sub(1)
                .and_then(|col| texts.get(&CellRef::new(at.row, col)).cloned());
            let right = texts.get(&CellRef::new(at.row, at.col + 1)).cloned();
            ColumnCandidate {
                column_letter: at.column_letter(),
                column_index: at.col,
                header_row: at.row,
                sample_values,
                adjacent_headers: AdjacentHeaders { left, right },
            }
        })
        .collect()
}
