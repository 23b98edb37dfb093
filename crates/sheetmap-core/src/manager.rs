use chrono::Utc;
use sheetmap_model::{
    AccessError, CellMapping, ColumnMapping, DisambiguationResponse, MappingAuditEntry,
    MappingAuditReport, MappingId, MappingKind, MappingStatus, SheetAccessor, ValidationResult,
};
use sheetmap_storage::{MappingStorage, MappingStore};

use crate::config::MappingConfig;
use crate::disambiguation::DisambiguationHandler;
use crate::error::{MappingError, Result};
use crate::validator::MappingValidator;

/// Cache-check, validate, then repair, create or ask a human.
///
/// The check-then-write sequence is not atomic. Two racing lookups of the same uncached
/// header both scan and both upsert; the store's unique key keeps that to one row.
pub struct MappingManager<A, S = MappingStorage> {
    validator: MappingValidator<A>,
    store: S,
    disambiguator: DisambiguationHandler,
}

impl<A: SheetAccessor, S: MappingStore> MappingManager<A, S> {
    pub fn new(accessor: A, store: S, config: MappingConfig) -> Self {
        let disambiguator = DisambiguationHandler::new(config.disambiguation_ttl());
        Self {
            validator: MappingValidator::new(accessor, config),
            store,
            disambiguator,
        }
    }

    pub fn validator(&self) -> &MappingValidator<A> {
        &self.validator
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn disambiguator(&self) -> &DisambiguationHandler {
        &self.disambiguator
    }

    pub fn config(&self) -> &MappingConfig {
        self.validator.config()
    }

    /// Resolve a header to its column.
    ///
    /// A cached mapping that moved is repaired in place. One whose header disappeared is
    /// deleted before `HeaderNotFound` is returned. Several live matches produce
    /// `DisambiguationRequired` and leave the store untouched.
    pub async fn get_column_by_header(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        header_text: &str,
        auto_create: bool,
    ) -> Result<ColumnMapping> {
        if let Some(mut cached) = self.store.get_column(spreadsheet_id, sheet_name, header_text)? {
            let validation = self.validator.validate_column(&cached).await?;
            match validation.status {
                MappingStatus::Valid => {
                    cached.last_validated_at = Some(Utc::now());
                    return Ok(self.store.put_column(cached)?);
                }
                MappingStatus::Moved => {
                    log::info!(
                        "header '{header_text}' moved from {} to {}",
                        cached.column_letter,
                        validation.new_column_letter.as_deref().unwrap_or("?")
                    );
                    if let Some(col) = validation.new_column_index {
                        cached.relocate(col);
                    }
                    cached.last_validated_at = Some(Utc::now());
                    return Ok(self.store.put_column(cached)?);
                }
                MappingStatus::Ambiguous => {
                    return Err(self.disambiguation_required(
                        spreadsheet_id,
                        sheet_name,
                        header_text,
                        validation,
                    ))
                }
                MappingStatus::Missing => {
                    log::warn!("header '{header_text}' no longer found in '{sheet_name}', deleting mapping");
                    if let Some(id) = cached.id {
                        self.store.delete_column(id)?;
                    }
                    return Err(MappingError::header_not_found(sheet_name, header_text));
                }
            }
        }

        if !auto_create {
            return Err(MappingError::MappingNotFound {
                kind: MappingKind::Column,
                key: format!("header '{header_text}' in sheet '{sheet_name}'"),
            });
        }

        let mut candidates = self
            .validator
            .find_header(spreadsheet_id, sheet_name, header_text, 0)
            .await?;
        match candidates.len() {
            0 => Err(MappingError::header_not_found(sheet_name, header_text)),
            1 => {
                let candidate = candidates.remove(0);
                let mapping = ColumnMapping::from_candidate(
                    spreadsheet_id,
                    sheet_name,
                    header_text,
                    &candidate,
                    Utc::now(),
                );
                let stored = self.store.put_column(mapping)?;
                log::info!(
                    "created column mapping: {sheet_name}/{header_text} -> {}",
                    stored.column_letter
                );
                Ok(stored)
            }
            _ => {
                let request = self.disambiguator.create_request(
                    spreadsheet_id,
                    sheet_name,
                    header_text,
                    candidates,
                );
                Err(MappingError::DisambiguationRequired(Box::new(request)))
            }
        }
    }

    /// Resolve the cell where `column_header` meets `row_label`.
    ///
    /// The column half goes through [`Self::get_column_by_header`], so a new cell mapping
    /// reuses (and creates) the column mapping and inherits its disambiguation context.
    pub async fn get_concept_cell(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        column_header: &str,
        row_label: &str,
        auto_create: bool,
    ) -> Result<CellMapping> {
        if let Some(mut cached) =
            self.store
                .get_cell(spreadsheet_id, sheet_name, column_header, row_label)?
        {
            let validation = self.validator.validate_cell(&cached).await?;
            match validation.status {
                MappingStatus::Valid => {
                    cached.last_validated_at = Some(Utc::now());
                    return Ok(self.store.put_cell(cached)?);
                }
                MappingStatus::Moved => {
                    let col = validation.new_column_index.unwrap_or(cached.column_index);
                    let row = validation.new_row_index.unwrap_or(cached.row_index);
                    let old = cached.cell_address.clone();
                    cached.relocate(col, row);
                    log::info!(
                        "cell '{column_header} x {row_label}' moved from {old} to {}",
                        cached.cell_address
                    );
                    cached.last_validated_at = Some(Utc::now());
                    return Ok(self.store.put_cell(cached)?);
                }
                MappingStatus::Ambiguous => {
                    return Err(self.disambiguation_required(
                        spreadsheet_id,
                        sheet_name,
                        column_header,
                        validation,
                    ))
                }
                MappingStatus::Missing => {
                    log::warn!(
                        "cell '{column_header} x {row_label}' no longer found in '{sheet_name}', deleting mapping"
                    );
                    if let Some(id) = cached.id {
                        self.store.delete_cell(id)?;
                    }
                    // A located column means the row label is what went missing.
                    return Err(if validation.new_column_index.is_some() {
                        MappingError::row_label_not_found(sheet_name, row_label)
                    } else {
                        MappingError::header_not_found(sheet_name, column_header)
                    });
                }
            }
        }

        if !auto_create {
            return Err(MappingError::MappingNotFound {
                kind: MappingKind::Cell,
                key: format!("cell '{column_header} x {row_label}' in sheet '{sheet_name}'"),
            });
        }

        let column = self
            .get_column_by_header(spreadsheet_id, sheet_name, column_header, true)
            .await?;
        let Some(row_index) = self
            .validator
            .find_row_label(spreadsheet_id, sheet_name, row_label)
            .await?
        else {
            return Err(MappingError::row_label_not_found(sheet_name, row_label));
        };

        let mapping = CellMapping::at_intersection(&column, row_label, row_index, Utc::now());
        let stored = self.store.put_cell(mapping)?;
        log::info!(
            "created cell mapping: {sheet_name}/{column_header} x {row_label} -> {}",
            stored.cell_address
        );
        Ok(stored)
    }

    /// Turn a human's answer into a persisted column mapping.
    ///
    /// Cached cells under the same header are moved to the chosen column and pinned to the
    /// same choice, so their next lookup settles instead of asking again.
    pub async fn store_disambiguation(&self, response: &DisambiguationResponse) -> Result<ColumnMapping> {
        let (request, candidate) = self.disambiguator.resolve(response)?;
        let mapping =
            self.disambiguator
                .build_mapping_from_resolution(&request, response, &candidate, Utc::now());
        let stored = self.store.put_column(mapping)?;
        log::info!(
            "stored disambiguation result: {}/{} -> {}",
            stored.sheet_name,
            stored.header_text,
            stored.column_letter
        );

        let cells = self
            .store
            .list_cells(&stored.spreadsheet_id, Some(&stored.sheet_name))?
            .into_iter()
            .filter(|cell| cell.column_header == stored.header_text);
        for mut cell in cells {
            let row = cell.row_index;
            cell.relocate(stored.column_index, row);
            cell.disambiguation_context = stored.disambiguation_context.clone();
            let cell = self.store.put_cell(cell)?;
            log::info!(
                "pinned cell '{} x {}' to {}",
                cell.column_header,
                cell.row_label,
                cell.cell_address
            );
        }
        Ok(stored)
    }

    /// Validate every stored mapping of a spreadsheet. Never writes.
    ///
    /// Mappings on a sheet that no longer exists are reported MISSING.
    pub async fn audit_mappings(&self, spreadsheet_id: &str) -> Result<MappingAuditReport> {
        let title = match self.validator.accessor().get_info(spreadsheet_id).await {
            Ok(info) => Some(info.title),
            Err(err) => {
                log::warn!("could not read spreadsheet info for {spreadsheet_id}: {err}");
                None
            }
        };

        let mut entries = Vec::new();
        for mapping in self.store.list_columns(spreadsheet_id, None)? {
            let validation = audit_validation(self.validator.validate_column(&mapping).await)?;
            let current_address = match validation.status {
                MappingStatus::Valid => Some(mapping.column_letter.clone()),
                MappingStatus::Moved => validation.new_column_letter.clone(),
                MappingStatus::Missing | MappingStatus::Ambiguous => None,
            };
            entries.push(MappingAuditEntry {
                mapping_id: mapping.id,
                kind: MappingKind::Column,
                spreadsheet_id: mapping.spreadsheet_id,
                sheet_name: mapping.sheet_name,
                header_text: mapping.header_text,
                row_label: None,
                cached_address: mapping.column_letter,
                current_address,
                status: validation.status,
                last_validated_at: mapping.last_validated_at,
                created_at: mapping.created_at,
                needs_action: validation.status != MappingStatus::Valid,
            });
        }

        for mapping in self.store.list_cells(spreadsheet_id, None)? {
            let validation = audit_validation(self.validator.validate_cell(&mapping).await)?;
            let current_address = match validation.status {
                MappingStatus::Valid => Some(mapping.cell_address.clone()),
                MappingStatus::Moved => validation.new_cell_address.clone(),
                MappingStatus::Missing | MappingStatus::Ambiguous => None,
            };
            entries.push(MappingAuditEntry {
                mapping_id: mapping.id,
                kind: MappingKind::Cell,
                spreadsheet_id: mapping.spreadsheet_id,
                sheet_name: mapping.sheet_name,
                header_text: mapping.column_header,
                row_label: Some(mapping.row_label),
                cached_address: mapping.cell_address,
                current_address,
                status: validation.status,
                last_validated_at: mapping.last_validated_at,
                created_at: mapping.created_at,
                needs_action: validation.status != MappingStatus::Valid,
            });
        }

        let report = MappingAuditReport::new(spreadsheet_id, title, entries, Utc::now());
        log::info!(
            "audit complete for {spreadsheet_id}: {} valid, {} moved, {} missing, {} ambiguous",
            report.valid_count,
            report.moved_count,
            report.missing_count,
            report.ambiguous_count
        );
        Ok(report)
    }

    /// Validate one stored mapping by id without repairing it.
    pub async fn validate_mapping(&self, id: MappingId, kind: MappingKind) -> Result<ValidationResult> {
        let not_found = || MappingError::MappingNotFound {
            kind,
            key: format!("id {id}"),
        };
        match kind {
            MappingKind::Column => {
                let mapping = self.store.get_column_by_id(id)?.ok_or_else(not_found)?;
                self.validator.validate_column(&mapping).await
            }
            MappingKind::Cell => {
                let mapping = self.store.get_cell_by_id(id)?.ok_or_else(not_found)?;
                self.validator.validate_cell(&mapping).await
            }
        }
    }

    pub fn delete_mapping(&self, id: MappingId, kind: MappingKind) -> Result<bool> {
        Ok(match kind {
            MappingKind::Column => self.store.delete_column(id)?,
            MappingKind::Cell => self.store.delete_cell(id)?,
        })
    }

    /// Drop every mapping of a spreadsheet, or of one of its sheets.
    pub fn clear_mappings(&self, spreadsheet_id: &str, sheet_name: Option<&str>) -> Result<usize> {
        Ok(self.store.delete_all(spreadsheet_id, sheet_name)?)
    }

    pub fn list_column_mappings(
        &self,
        spreadsheet_id: &str,
        sheet_name: Option<&str>,
    ) -> Result<Vec<ColumnMapping>> {
        Ok(self.store.list_columns(spreadsheet_id, sheet_name)?)
    }

    pub fn list_cell_mappings(&self, spreadsheet_id: &str, sheet_name: Option<&str>) -> Result<Vec<CellMapping>> {
        Ok(self.store.list_cells(spreadsheet_id, sheet_name)?)
    }

    pub fn cleanup_expired_requests(&self) -> usize {
        self.disambiguator.cleanup_expired()
    }

    fn disambiguation_required(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        header_text: &str,
        validation: ValidationResult,
    ) -> MappingError {
        let request = self.disambiguator.create_request(
            spreadsheet_id,
            sheet_name,
            header_text,
            validation.candidates,
        );
        MappingError::DisambiguationRequired(Box::new(request))
    }
}

fn audit_validation(result: Result<ValidationResult>) -> Result<ValidationResult> {
    match result {
        Err(MappingError::Sheet(AccessError::SheetNotFound { sheet, .. })) => {
            Ok(ValidationResult::missing(None, format!("Sheet '{sheet}' not found")))
        }
        other => other,
    }
}
