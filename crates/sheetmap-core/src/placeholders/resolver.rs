use std::cmp::Ordering;
use std::collections::BTreeMap;

use sheetmap_model::{CellMapping, ColumnMapping, SheetAccessor};
use sheetmap_storage::{MappingStorage, MappingStore};

use super::parser::extract_placeholders;
use super::syntax::{fuzzy_match_score, normalize_name};
use super::types::{
    HeaderMatch, MappingPreview, Placeholder, PlaceholderMapping, PlaceholderType,
    ResolutionContext, ResolvedFormula,
};
use crate::error::{MappingError, ResolveError};
use crate::manager::MappingManager;

/// Turns placeholder formulas into plain A1 formulas through a [`MappingManager`].
pub struct PlaceholderResolver<A, S = MappingStorage> {
    manager: MappingManager<A, S>,
}

impl<A: SheetAccessor, S: MappingStore> PlaceholderResolver<A, S> {
    pub fn new(manager: MappingManager<A, S>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &MappingManager<A, S> {
        &self.manager
    }

    /// Resolve one placeholder.
    ///
    /// Header references follow `context`; intersections are always absolute; cross-sheet
    /// references point at the configured representative row of the other sheet.
    pub async fn resolve(
        &self,
        placeholder: &Placeholder,
        spreadsheet_id: &str,
        context: &ResolutionContext,
    ) -> Result<PlaceholderMapping, ResolveError> {
        match placeholder.kind {
            PlaceholderType::Header => {
                if context.current_row == 0 {
                    return Err(ResolveError::InvalidRow {
                        syntax: placeholder.syntax.clone(),
                        row: context.current_row,
                    });
                }
                let (column, confidence) = self
                    .column(spreadsheet_id, &context.current_sheet, &placeholder.name)
                    .await?;
                let row = context.current_row;
                let resolved_to = if context.absolute_references {
                    format!("${}${row}", column.column_letter)
                } else {
                    format!("{}{row}", column.column_letter)
                };
                Ok(PlaceholderMapping {
                    placeholder: placeholder.syntax.clone(),
                    resolved_to,
                    header: column.header_text,
                    column: column.column_letter,
                    row: Some(row),
                    confidence,
                    sheet_name: None,
                })
            }
            PlaceholderType::Intersection => {
                let row_label = placeholder.row_label.as_deref().unwrap_or_default();
                let (cell, confidence) = self
                    .cell(spreadsheet_id, &context.current_sheet, &placeholder.name, row_label)
                    .await?;
                let row = cell.row_index + 1;
                Ok(PlaceholderMapping {
                    placeholder: placeholder.syntax.clone(),
                    resolved_to: cell.cell().to_absolute_a1(),
                    header: cell.column_header,
                    column: cell.column_letter,
                    row: Some(row),
                    confidence,
                    sheet_name: None,
                })
            }
            PlaceholderType::CrossSheet => {
                let sheet = placeholder.sheet.as_deref().unwrap_or(&context.current_sheet);
                let (column, confidence) = self.column(spreadsheet_id, sheet, &placeholder.name).await?;
                let row = self.manager.config().cross_sheet_row;
                Ok(PlaceholderMapping {
                    placeholder: placeholder.syntax.clone(),
                    resolved_to: format!("'{}'!${}${row}", sheet.replace('\'', "''"), column.column_letter),
                    header: column.header_text,
                    column: column.column_letter,
                    row: Some(row),
                    confidence,
                    sheet_name: Some(sheet.to_string()),
                })
            }
            PlaceholderType::Variable => Err(ResolveError::Unimplemented {
                syntax: placeholder.syntax.clone(),
            }),
        }
    }

    /// Resolve every placeholder and substitute the results into the formula.
    ///
    /// Unimplemented placeholders stay in the text and produce a warning; any other
    /// failure aborts the whole formula.
    pub async fn resolve_all(
        &self,
        formula: &str,
        spreadsheet_id: &str,
        context: &ResolutionContext,
    ) -> Result<ResolvedFormula, ResolveError> {
        let placeholders = extract_placeholders(formula);
        if placeholders.is_empty() {
            return Ok(ResolvedFormula {
                original: formula.to_string(),
                resolved: formula.to_string(),
                mappings: Vec::new(),
                warnings: vec!["No placeholders found in formula".to_string()],
            });
        }

        let mut mappings = Vec::new();
        let mut warnings = Vec::new();
        let mut replacements = Vec::new();
        for placeholder in &placeholders {
            match self.resolve(placeholder, spreadsheet_id, context).await {
                Ok(mapping) => {
                    replacements.push((placeholder.span.clone(), mapping.resolved_to.clone()));
                    mappings.push(mapping);
                }
                Err(err @ ResolveError::Unimplemented { .. }) => warnings.push(err.to_string()),
                Err(err) => {
                    log::debug!("could not resolve placeholder {}: {err}", placeholder.syntax);
                    return Err(err);
                }
            }
        }

        // Back to front, so earlier spans stay valid.
        let mut resolved = formula.to_string();
        for (span, text) in replacements.iter().rev() {
            resolved.replace_range(span.clone(), text);
        }

        Ok(ResolvedFormula {
            original: formula.to_string(),
            resolved,
            mappings,
            warnings,
        })
    }

    /// Score header and cross-sheet placeholders against the first row of their sheet.
    ///
    /// Never touches the mapping store.
    pub async fn preview_mappings(
        &self,
        formula: &str,
        spreadsheet_id: &str,
        sheet_name: &str,
    ) -> MappingPreview {
        let placeholders = extract_placeholders(formula);
        let threshold = self.manager.config().preview_threshold;
        let mut potential_mappings = BTreeMap::new();
        let mut requires_disambiguation = Vec::new();

        for placeholder in &placeholders {
            if !matches!(placeholder.kind, PlaceholderType::Header | PlaceholderType::CrossSheet) {
                continue;
            }
            let target = placeholder.sheet.as_deref().unwrap_or(sheet_name);
            let matches = match self
                .manager
                .validator()
                .first_row_headers(spreadsheet_id, target)
                .await
            {
                Ok(headers) => score_headers(&placeholder.name, headers, threshold),
                Err(err) => {
                    log::warn!("error finding matches for {}: {err}", placeholder.syntax);
                    Vec::new()
                }
            };
            if matches.len() > 1 && !requires_disambiguation.contains(&placeholder.syntax) {
                requires_disambiguation.push(placeholder.syntax.clone());
            }
            potential_mappings.insert(placeholder.syntax.clone(), matches);
        }

        MappingPreview {
            formula: formula.to_string(),
            placeholders,
            potential_mappings,
            requires_disambiguation,
        }
    }

    /// Column lookup with the normalized-name fallback; returns the match confidence.
    async fn column(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        name: &str,
    ) -> Result<(ColumnMapping, f64), MappingError> {
        match self.manager.get_column_by_header(spreadsheet_id, sheet_name, name, true).await {
            Err(err) if err.is_missing_header() => {
                let Some(header) = self.normalized_header(spreadsheet_id, sheet_name, name).await? else {
                    return Err(err);
                };
                let column = self
                    .manager
                    .get_column_by_header(spreadsheet_id, sheet_name, &header, true)
                    .await?;
                Ok((column, fuzzy_match_score(name, &header)))
            }
            other => other.map(|column| (column, 1.0)),
        }
    }

    async fn cell(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        name: &str,
        row_label: &str,
    ) -> Result<(CellMapping, f64), MappingError> {
        match self
            .manager
            .get_concept_cell(spreadsheet_id, sheet_name, name, row_label, true)
            .await
        {
            Err(err) if err.is_missing_header() => {
                let Some(header) = self.normalized_header(spreadsheet_id, sheet_name, name).await? else {
                    return Err(err);
                };
                let cell = self
                    .manager
                    .get_concept_cell(spreadsheet_id, sheet_name, &header, row_label, true)
                    .await?;
                Ok((cell, fuzzy_match_score(name, &header)))
            }
            other => other.map(|cell| (cell, 1.0)),
        }
    }

    /// The single live header that normalizes like `name` but is spelled differently.
    async fn normalized_header(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        name: &str,
    ) -> Result<Option<String>, MappingError> {
        let wanted = normalize_name(name);
        let mut found = self
            .manager
            .validator()
            .header_texts(spreadsheet_id, sheet_name)
            .await?
            .into_iter()
            .filter(|h| h != name.trim() && normalize_name(h) == wanted);
        Ok(match (found.next(), found.next()) {
            (Some(header), None) => {
                log::debug!("placeholder '{name}' matched header '{header}' after normalization");
                Some(header)
            }
            _ => None,
        })
    }
}

/// Headers scoring strictly above `threshold`, best first, ties by header text.
fn score_headers(name: &str, mut headers: Vec<String>, threshold: f64) -> Vec<HeaderMatch> {
    headers.sort();
    headers.dedup();
    let mut matches: Vec<HeaderMatch> = headers
        .into_iter()
        .map(|header| HeaderMatch {
            score: fuzzy_match_score(name, &header),
            header,
        })
        .filter(|m| m.score > threshold)
        .collect();
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.header.cmp(&b.header))
    });
    matches
}
