use std::sync::Arc;

use pretty_assertions::assert_eq;
use sheetmap_core::{MappingConfig, MappingError, MappingManager, MissingTarget};
use sheetmap_model::{
    AccessError, DisambiguationResponse, InMemoryWorkbook, MappingKind, MappingStatus,
};
use sheetmap_storage::{MappingStorage, MappingStore};

const BOOK: &str = "book-1";

fn workbook() -> Arc<InMemoryWorkbook> {
    let book = InMemoryWorkbook::new(BOOK, "Balance");
    book.set_row("Sheet1", "A1", ["Name", "Level", "Speed", "Old"]).unwrap();
    book.set_row("Sheet1", "A2", ["Bob", "3", "10", "x"]).unwrap();
    book.set_row("Sheet1", "A3", ["Jane", "5", "12", "y"]).unwrap();
    Arc::new(book)
}

fn manager(book: &Arc<InMemoryWorkbook>) -> MappingManager<Arc<InMemoryWorkbook>> {
    let storage = MappingStorage::open_in_memory().expect("open storage");
    MappingManager::new(Arc::clone(book), storage, MappingConfig::default())
}

#[tokio::test(flavor = "current_thread")]
async fn first_lookup_creates_a_mapping() {
    let book = workbook();
    let manager = manager(&book);

    let level = manager
        .get_column_by_header(BOOK, "Sheet1", "Level", true)
        .await
        .unwrap();
    assert_eq!(level.column_letter, "B");
    assert_eq!(level.column_index, 1);
    assert_eq!(level.header_row, 0);
    assert!(level.id.is_some());
    assert!(level.last_validated_at.is_some());

    let stored = manager.list_column_mappings(BOOK, None).unwrap();
    assert_eq!(stored, vec![level]);
}

#[tokio::test(flavor = "current_thread")]
async fn moved_header_is_repaired_in_place() {
    let book = workbook();
    let manager = manager(&book);
    let before = manager
        .get_column_by_header(BOOK, "Sheet1", "Level", true)
        .await
        .unwrap();

    book.insert_column("Sheet1", 1).unwrap();
    book.insert_column("Sheet1", 1).unwrap();

    let after = manager
        .get_column_by_header(BOOK, "Sheet1", "Level", true)
        .await
        .unwrap();
    assert_eq!(after.column_letter, "D");
    assert_eq!(after.column_index, 3);
    assert_eq!(after.id, before.id);
    assert_eq!(after.created_at, before.created_at);

    let stored = manager.list_column_mappings(BOOK, Some("Sheet1")).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].column_letter, "D");
}

#[tokio::test(flavor = "current_thread")]
async fn vanished_header_purges_the_mapping() {
    let book = workbook();
    let manager = manager(&book);
    manager
        .get_column_by_header(BOOK, "Sheet1", "Old", true)
        .await
        .unwrap();

    book.clear_cell("Sheet1", "D1").unwrap();

    let err = manager
        .get_column_by_header(BOOK, "Sheet1", "Old", true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MappingError::HeaderNotFound { ref sheet, target: MissingTarget::Header(ref h) }
            if sheet == "Sheet1" && h == "Old"
    ));
    assert!(manager.list_column_mappings(BOOK, None).unwrap().is_empty());

    // A retry scans again instead of tripping over a dangling record.
    let err = manager
        .get_column_by_header(BOOK, "Sheet1", "Old", true)
        .await
        .unwrap_err();
    assert!(err.is_missing_header());
}

#[tokio::test(flavor = "current_thread")]
async fn cache_miss_without_auto_create() {
    let book = workbook();
    let manager = manager(&book);
    let err = manager
        .get_column_by_header(BOOK, "Sheet1", "Level", false)
        .await
        .unwrap_err();
    assert!(matches!(err, MappingError::MappingNotFound { kind: MappingKind::Column, .. }));

    let err = manager
        .get_concept_cell(BOOK, "Sheet1", "Level", "Jane", false)
        .await
        .unwrap_err();
    assert!(matches!(err, MappingError::MappingNotFound { kind: MappingKind::Cell, .. }));
    assert!(manager.list_column_mappings(BOOK, None).unwrap().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn duplicate_header_requires_disambiguation() {
    let book = workbook();
    book.set_value("Sheet1", "B1", "Damage").unwrap();
    book.set_value("Sheet1", "E1", "Damage").unwrap();
    book.set_value("Sheet1", "E2", "99").unwrap();
    let manager = manager(&book);

    let err = manager
        .get_column_by_header(BOOK, "Sheet1", "Damage", true)
        .await
        .unwrap_err();
    let request = err.disambiguation_request().expect("disambiguation request").clone();
    assert_eq!(request.header_text, "Damage");
    assert_eq!(request.candidates.len(), 2);
    assert_eq!(request.candidates[0].column_letter, "B");
    assert_eq!(request.candidates[1].column_letter, "E");
    assert_eq!(request.candidates[1].sample_values, vec!["99".to_string()]);
    assert_eq!(request.candidates[1].adjacent_headers.left.as_deref(), Some("Old"));
    // Nothing was written while ambiguous.
    assert!(manager.list_column_mappings(BOOK, None).unwrap().is_empty());

    let response = DisambiguationResponse {
        request_id: request.request_id,
        selected_column_index: 1,
        user_label: Some("crit damage".to_string()),
    };
    let chosen = manager.store_disambiguation(&response).await.unwrap();
    assert_eq!(chosen.column_letter, "E");
    let context = chosen.disambiguation_context.clone().expect("context");
    assert_eq!(context.user_label.as_deref(), Some("crit damage"));
    assert_eq!(context.selected_index, 1);
    assert_eq!(context.total_candidates, 2);

    // The human's choice sticks even though both columns are still there.
    let again = manager
        .get_column_by_header(BOOK, "Sheet1", "Damage", true)
        .await
        .unwrap();
    assert_eq!(again.id, chosen.id);
    assert_eq!(again.column_letter, "E");

    let err = manager.store_disambiguation(&response).await.unwrap_err();
    assert!(matches!(err, MappingError::RequestNotFound(id) if id == request.request_id));
}

#[tokio::test(flavor = "current_thread")]
async fn duplicate_appearing_later_keeps_the_cached_mapping() {
    let book = workbook();
    let manager = manager(&book);
    let level = manager
        .get_column_by_header(BOOK, "Sheet1", "Level", true)
        .await
        .unwrap();

    book.set_value("Sheet1", "F1", "Level").unwrap();
    let err = manager
        .get_column_by_header(BOOK, "Sheet1", "Level", true)
        .await
        .unwrap_err();
    assert!(matches!(err, MappingError::DisambiguationRequired(_)));
    assert_eq!(manager.disambiguator().pending_count(), 1);
    assert_eq!(manager.list_column_mappings(BOOK, None).unwrap(), vec![level]);
}

#[tokio::test(flavor = "current_thread")]
async fn invalid_selection_leaves_the_request_pending() {
    let book = workbook();
    book.set_value("Sheet1", "E1", "Level").unwrap();
    let manager = manager(&book);
    let err = manager
        .get_column_by_header(BOOK, "Sheet1", "Level", true)
        .await
        .unwrap_err();
    let request_id = err.disambiguation_request().unwrap().request_id;

    let err = manager
        .store_disambiguation(&DisambiguationResponse {
            request_id,
            selected_column_index: 5,
            user_label: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, MappingError::InvalidSelection { selected: 5, candidates: 2 }));
    assert!(manager.disambiguator().get_request(request_id).is_some());
}

#[tokio::test(flavor = "current_thread")]
async fn concept_cell_resolves_the_intersection() {
    let book = workbook();
    let manager = manager(&book);

    let cell = manager
        .get_concept_cell(BOOK, "Sheet1", "Speed", "Jane", true)
        .await
        .unwrap();
    assert_eq!(cell.cell_address, "C3");
    assert_eq!(cell.row_index, 2);
    assert_eq!(cell.column_letter, "C");

    // The column half was cached along the way.
    let columns = manager.list_column_mappings(BOOK, None).unwrap();
    assert_eq!(columns.len(), 1);
    assert_eq!(columns[0].header_text, "Speed");

    // Jane moves down two rows.
    book.set_row("Sheet1", "A3", ["Ann"]).unwrap();
    book.set_row("Sheet1", "A5", ["Jane"]).unwrap();
    let moved = manager
        .get_concept_cell(BOOK, "Sheet1", "Speed", "Jane", true)
        .await
        .unwrap();
    assert_eq!(moved.id, cell.id);
    assert_eq!(moved.cell_address, "C5");
    assert_eq!(moved.row_index, 4);
    assert_eq!(manager.list_cell_mappings(BOOK, None).unwrap().len(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn cached_cell_settles_after_its_header_is_disambiguated() {
    let book = workbook();
    let manager = manager(&book);
    let cell = manager
        .get_concept_cell(BOOK, "Sheet1", "Speed", "Jane", true)
        .await
        .unwrap();

    book.set_value("Sheet1", "E1", "Speed").unwrap();
    let err = manager
        .get_concept_cell(BOOK, "Sheet1", "Speed", "Jane", true)
        .await
        .unwrap_err();
    let request = err.disambiguation_request().expect("disambiguation request").clone();
    assert_eq!(request.candidates.len(), 2);
    // Nothing was written while ambiguous.
    assert_eq!(manager.list_cell_mappings(BOOK, None).unwrap(), vec![cell.clone()]);

    manager
        .store_disambiguation(&DisambiguationResponse {
            request_id: request.request_id,
            selected_column_index: 0,
            user_label: None,
        })
        .await
        .unwrap();
    let settled = manager
        .get_concept_cell(BOOK, "Sheet1", "Speed", "Jane", true)
        .await
        .unwrap();
    assert_eq!(settled.id, cell.id);
    assert_eq!(settled.cell_address, "C3");
    assert!(settled.disambiguation_context.is_some());
    assert_eq!(manager.disambiguator().pending_count(), 0);

    // Repeated lookups keep answering without a new question.
    for _ in 0..3 {
        let again = manager
            .get_concept_cell(BOOK, "Sheet1", "Speed", "Jane", true)
            .await
            .unwrap();
        assert_eq!(again.cell_address, "C3");
    }
    assert_eq!(manager.disambiguator().pending_count(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn choosing_the_other_column_moves_cached_cells() {
    let book = workbook();
    let manager = manager(&book);
    let cell = manager
        .get_concept_cell(BOOK, "Sheet1", "Speed", "Jane", true)
        .await
        .unwrap();

    book.set_value("Sheet1", "E1", "Speed").unwrap();
    let err = manager
        .get_concept_cell(BOOK, "Sheet1", "Speed", "Jane", true)
        .await
        .unwrap_err();
    let request_id = err.disambiguation_request().expect("disambiguation request").request_id;

    let column = manager
        .store_disambiguation(&DisambiguationResponse {
            request_id,
            selected_column_index: 1,
            user_label: Some("new speed".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(column.column_letter, "E");

    let settled = manager
        .get_concept_cell(BOOK, "Sheet1", "Speed", "Jane", true)
        .await
        .unwrap();
    assert_eq!(settled.id, cell.id);
    assert_eq!(settled.cell_address, "E3");
    assert_eq!(settled.column_letter, "E");
    assert_eq!(
        settled.disambiguation_context.and_then(|c| c.user_label).as_deref(),
        Some("new speed")
    );
}

#[tokio::test(flavor = "current_thread")]
async fn missing_row_label_is_reported_as_such() {
    let book = workbook();
    let manager = manager(&book);
    let err = manager
        .get_concept_cell(BOOK, "Sheet1", "Speed", "Nobody", true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MappingError::HeaderNotFound { target: MissingTarget::RowLabel(ref l), .. } if l == "Nobody"
    ));
    assert!(!err.is_missing_header());

    manager
        .get_concept_cell(BOOK, "Sheet1", "Speed", "Bob", true)
        .await
        .unwrap();
    book.clear_cell("Sheet1", "A2").unwrap();
    let err = manager
        .get_concept_cell(BOOK, "Sheet1", "Speed", "Bob", true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MappingError::HeaderNotFound { target: MissingTarget::RowLabel(_), .. }
    ));
    assert!(manager.list_cell_mappings(BOOK, None).unwrap().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn audit_reports_without_repairing() {
    let book = workbook();
    let manager = manager(&book);
    for header in ["Level", "Speed", "Old"] {
        manager
            .get_column_by_header(BOOK, "Sheet1", header, true)
            .await
            .unwrap();
    }
    manager
        .get_concept_cell(BOOK, "Sheet1", "Level", "Jane", true)
        .await
        .unwrap();

    // Speed moves to F, Old disappears.
    book.clear_cell("Sheet1", "C1").unwrap();
    book.set_value("Sheet1", "F1", "Speed").unwrap();
    book.clear_cell("Sheet1", "D1").unwrap();

    let report = manager.audit_mappings(BOOK).await.unwrap();
    assert_eq!(report.spreadsheet_title.as_deref(), Some("Balance"));
    assert_eq!(report.total_mappings, 4);
    assert_eq!(report.valid_count, 2);
    assert_eq!(report.moved_count, 1);
    assert_eq!(report.missing_count, 1);
    assert_eq!(report.ambiguous_count, 0);

    let speed = report
        .entries
        .iter()
        .find(|e| e.header_text == "Speed")
        .unwrap();
    assert_eq!(speed.status, MappingStatus::Moved);
    assert_eq!(speed.cached_address, "C");
    assert_eq!(speed.current_address.as_deref(), Some("F"));
    assert!(speed.needs_action);

    let cell = report
        .entries
        .iter()
        .find(|e| e.kind == MappingKind::Cell)
        .unwrap();
    assert_eq!(cell.row_label.as_deref(), Some("Jane"));
    assert_eq!(cell.current_address.as_deref(), Some("B3"));
    assert!(!cell.needs_action);
    assert_eq!(report.needing_action().count(), 2);

    // Read-only: the stale and moved records are untouched.
    let columns = manager.list_column_mappings(BOOK, None).unwrap();
    assert_eq!(columns.len(), 3);
    assert!(columns.iter().any(|c| c.header_text == "Speed" && c.column_letter == "C"));
}

#[tokio::test(flavor = "current_thread")]
async fn audit_treats_a_deleted_sheet_as_missing() {
    let book = workbook();
    book.set_row("Items", "A1", ["Item", "Cost"]).unwrap();
    let storage = MappingStorage::open_in_memory().unwrap();
    let manager = MappingManager::new(Arc::clone(&book), storage.clone(), MappingConfig::default());
    manager
        .get_column_by_header(BOOK, "Items", "Cost", true)
        .await
        .unwrap();

    // Same store, a workbook that no longer has the sheet.
    let trimmed = workbook();
    let manager = MappingManager::new(trimmed, storage, MappingConfig::default());
    let report = manager.audit_mappings(BOOK).await.unwrap();
    assert_eq!(report.missing_count, 1);
}

#[tokio::test(flavor = "current_thread")]
async fn validate_delete_and_clear_by_id() {
    let book = workbook();
    let manager = manager(&book);
    let level = manager
        .get_column_by_header(BOOK, "Sheet1", "Level", true)
        .await
        .unwrap();
    let cell = manager
        .get_concept_cell(BOOK, "Sheet1", "Speed", "Bob", true)
        .await
        .unwrap();
    let id = level.id.unwrap();

    book.insert_column("Sheet1", 0).unwrap();
    let result = manager.validate_mapping(id, MappingKind::Column).await.unwrap();
    assert_eq!(result.status, MappingStatus::Moved);
    assert_eq!(result.new_column_letter.as_deref(), Some("C"));
    // Validation alone does not repair.
    let stored = manager.store().get_column_by_id(id).unwrap().unwrap();
    assert_eq!(stored.column_letter, "B");

    let err = manager
        .validate_mapping(9_999, MappingKind::Cell)
        .await
        .unwrap_err();
    assert!(matches!(err, MappingError::MappingNotFound { kind: MappingKind::Cell, .. }));

    assert!(manager.delete_mapping(cell.id.unwrap(), MappingKind::Cell).unwrap());
    assert!(!manager.delete_mapping(cell.id.unwrap(), MappingKind::Cell).unwrap());
    // Speed's column mapping was created by the cell lookup.
    assert_eq!(manager.clear_mappings(BOOK, Some("Sheet1")).unwrap(), 2);
    assert!(manager.list_column_mappings(BOOK, None).unwrap().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn concurrent_first_lookups_leave_one_row() {
    let book = workbook();
    let manager = manager(&book);
    let (a, b) = tokio::join!(
        manager.get_column_by_header(BOOK, "Sheet1", "Speed", true),
        manager.get_column_by_header(BOOK, "Sheet1", "Speed", true),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.id, b.id);
    assert_eq!(a.column_letter, "C");
    assert_eq!(manager.list_column_mappings(BOOK, None).unwrap().len(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn sheet_read_failures_propagate() {
    let book = workbook();
    let manager = manager(&book);
    let err = manager
        .get_column_by_header(BOOK, "Missing", "Level", true)
        .await
        .unwrap_err();
    assert!(matches!(err, MappingError::Sheet(AccessError::SheetNotFound { .. })));

    let err = manager
        .get_column_by_header("other-book", "Sheet1", "Level", true)
        .await
        .unwrap_err();
    assert!(matches!(err, MappingError::Sheet(AccessError::SpreadsheetNotFound(_))));
}

#[tokio::test(flavor = "current_thread")]
async fn expired_requests_are_swept() {
    let book = workbook();
    book.set_value("Sheet1", "E1", "Level").unwrap();
    let storage = MappingStorage::open_in_memory().unwrap();
    let config = MappingConfig {
        disambiguation_ttl_secs: 0,
        ..MappingConfig::default()
    };
    let manager = MappingManager::new(Arc::clone(&book), storage, config);

    let err = manager
        .get_column_by_header(BOOK, "Sheet1", "Level", true)
        .await
        .unwrap_err();
    let request = err.disambiguation_request().unwrap();
    let later = request.created_at + chrono::Duration::seconds(1);
    assert_eq!(manager.disambiguator().cleanup_expired_at(later), 1);
    assert_eq!(manager.cleanup_expired_requests(), 0);
}
