use std::sync::Arc;

use pretty_assertions::assert_eq;
use sheetmap_core::{
    extract_placeholders, HeaderMatch, MappingConfig, MappingError, MappingManager,
    PlaceholderResolver, ResolutionContext, ResolveError,
};
use sheetmap_model::{CellValue, InMemoryWorkbook};
use sheetmap_storage::MappingStorage;

const BOOK: &str = "book-1";

fn workbook() -> Arc<InMemoryWorkbook> {
    let book = InMemoryWorkbook::new(BOOK, "Balance");
    book.set_row(
        "Sheet1",
        "A1",
        ["Name", "Level", "Class", "Speed", "HP", "Base Damage", "Multiplier"],
    )
    .unwrap();
    for (row, name) in ["Bob", "Ann", "Max", "Jane"].into_iter().enumerate() {
        let address = format!("A{}", row + 2);
        book.set_value("Sheet1", &address, name).unwrap();
    }
    book.set_value("Sheet1", "G5", CellValue::Number(1.5)).unwrap();
    book.set_row("Items", "A1", ["Item", "Cost", "Level"]).unwrap();
    book.set_row("Other Sheet", "A1", ["Key", "Value"]).unwrap();
    Arc::new(book)
}

fn resolver(book: &Arc<InMemoryWorkbook>) -> PlaceholderResolver<Arc<InMemoryWorkbook>> {
    let storage = MappingStorage::open_in_memory().expect("open storage");
    PlaceholderResolver::new(MappingManager::new(
        Arc::clone(book),
        storage,
        MappingConfig::default(),
    ))
}

#[tokio::test(flavor = "current_thread")]
async fn header_placeholder_uses_the_current_row() {
    let book = workbook();
    let resolver = resolver(&book);
    let resolved = resolver
        .resolve_all("={{base_damage}} * 1.5", BOOK, &ResolutionContext::new("Sheet1", 2))
        .await
        .unwrap();

    assert_eq!(resolved.original, "={{base_damage}} * 1.5");
    assert_eq!(resolved.resolved, "=F2 * 1.5");
    assert!(resolved.warnings.is_empty());
    let mapping = &resolved.mappings[0];
    assert_eq!(mapping.placeholder, "{{base_damage}}");
    assert_eq!(mapping.header, "Base Damage");
    assert_eq!(mapping.column, "F");
    assert_eq!(mapping.row, Some(2));
    assert_eq!(mapping.confidence, 1.0);
}

#[tokio::test(flavor = "current_thread")]
async fn absolute_references_on_request() {
    let book = workbook();
    let resolver = resolver(&book);
    let context = ResolutionContext::new("Sheet1", 7).absolute();
    let resolved = resolver
        .resolve_all("={{Level}} + {{Speed}}", BOOK, &context)
        .await
        .unwrap();
    assert_eq!(resolved.resolved, "=$B$7 + $D$7");
}

#[tokio::test(flavor = "current_thread")]
async fn intersection_is_always_absolute() {
    let book = workbook();
    let resolver = resolver(&book);
    let resolved = resolver
        .resolve_all("={{Multiplier:Jane}}", BOOK, &ResolutionContext::new("Sheet1", 2))
        .await
        .unwrap();
    assert_eq!(resolved.resolved, "=$G$5");
    assert_eq!(resolved.mappings[0].row, Some(5));
}

#[tokio::test(flavor = "current_thread")]
async fn cross_sheet_points_at_the_first_data_row() {
    let book = workbook();
    let resolver = resolver(&book);
    let resolved = resolver
        .resolve_all(
            "={{Level}} * Items!{{Cost}} + 'Other Sheet'!{{Key}}",
            BOOK,
            &ResolutionContext::new("Sheet1", 4),
        )
        .await
        .unwrap();
    assert_eq!(resolved.resolved, "=B4 * 'Items'!$B$2 + 'Other Sheet'!$A$2");
    assert_eq!(resolved.mappings[1].sheet_name.as_deref(), Some("Items"));
    assert_eq!(resolved.mappings[2].sheet_name.as_deref(), Some("Other Sheet"));
}

#[tokio::test(flavor = "current_thread")]
async fn variables_degrade_to_warnings() {
    let book = workbook();
    let resolver = resolver(&book);
    let resolved = resolver
        .resolve_all("={{Level}} * ${rate}", BOOK, &ResolutionContext::new("Sheet1", 2))
        .await
        .unwrap();
    assert_eq!(resolved.resolved, "=B2 * ${rate}");
    assert_eq!(resolved.mappings.len(), 1);
    assert_eq!(resolved.warnings.len(), 1);
    assert!(resolved.warnings[0].contains("${rate}"), "{}", resolved.warnings[0]);
}

#[tokio::test(flavor = "current_thread")]
async fn formula_without_placeholders_passes_through() {
    let book = workbook();
    let resolver = resolver(&book);
    let resolved = resolver
        .resolve_all("=SUM(A1:A3)", BOOK, &ResolutionContext::new("Sheet1", 2))
        .await
        .unwrap();
    assert_eq!(resolved.resolved, "=SUM(A1:A3)");
    assert_eq!(resolved.warnings, vec!["No placeholders found in formula".to_string()]);
}

#[tokio::test(flavor = "current_thread")]
async fn substitution_handles_length_changes_and_multibyte_text() {
    let book = workbook();
    let resolver = resolver(&book);
    let formula = "=IF(\"d\u{00e9}g\u{00e2}ts\"=\"x\", {{Multiplier:Jane}}, {{Level}}) & {{HP}}";
    let resolved = resolver
        .resolve_all(formula, BOOK, &ResolutionContext::new("Sheet1", 12))
        .await
        .unwrap();
    assert_eq!(
        resolved.resolved,
        "=IF(\"d\u{00e9}g\u{00e2}ts\"=\"x\", $G$5, B12) & E12"
    );
    assert!(extract_placeholders(&resolved.resolved).is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn resolution_is_deterministic() {
    let book = workbook();
    let resolver = resolver(&book);
    let context = ResolutionContext::new("Sheet1", 3);
    let formula = "={{Level}} + {{Speed:Ann}} + Items!{{Level}}";
    let first = resolver.resolve_all(formula, BOOK, &context).await.unwrap();
    let second = resolver.resolve_all(formula, BOOK, &context).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.resolved, "=B3 + $D$3 + 'Items'!$C$2");
}

#[tokio::test(flavor = "current_thread")]
async fn header_placeholder_rejects_row_zero() {
    let book = workbook();
    let resolver = resolver(&book);
    let err = resolver
        .resolve_all("={{Level}} * 2", BOOK, &ResolutionContext::new("Sheet1", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::InvalidRow { row: 0, ref syntax } if syntax == "{{Level}}"));
    assert!(resolver.manager().list_column_mappings(BOOK, None).unwrap().is_empty());

    // Intersections do not depend on the current row.
    let resolved = resolver
        .resolve_all("={{Multiplier:Jane}}", BOOK, &ResolutionContext::new("Sheet1", 0))
        .await
        .unwrap();
    assert_eq!(resolved.resolved, "=$G$5");
}

#[tokio::test(flavor = "current_thread")]
async fn unknown_header_aborts_the_formula() {
    let book = workbook();
    let resolver = resolver(&book);
    let err = resolver
        .resolve_all("={{Level}} + {{Mana}}", BOOK, &ResolutionContext::new("Sheet1", 2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ResolveError::Mapping(ref e) if e.is_missing_header()
    ));
}

#[tokio::test(flavor = "current_thread")]
async fn ambiguous_normalized_match_is_not_guessed() {
    let book = workbook();
    book.set_value("Sheet1", "H1", "base_damage ").unwrap();
    book.set_value("Sheet1", "I1", "BaseDamage").unwrap();
    let resolver = resolver(&book);
    let err = resolver
        .resolve_all("={{base damage}}", BOOK, &ResolutionContext::new("Sheet1", 2))
        .await
        .unwrap_err();
    assert!(err.as_mapping().is_some_and(MappingError::is_missing_header));
}

#[tokio::test(flavor = "current_thread")]
async fn duplicate_header_surfaces_a_disambiguation_request() {
    let book = workbook();
    book.set_value("Sheet1", "H1", "Level").unwrap();
    let resolver = resolver(&book);
    let err = resolver
        .resolve_all("={{Level}}", BOOK, &ResolutionContext::new("Sheet1", 2))
        .await
        .unwrap_err();
    let request = err
        .as_mapping()
        .and_then(MappingError::disambiguation_request)
        .expect("disambiguation request");
    assert_eq!(request.candidates.len(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn preview_scores_live_headers_without_writing() {
    let book = workbook();
    book.set_value("Sheet1", "H1", "Damage").unwrap();
    let resolver = resolver(&book);

    let preview = resolver
        .preview_mappings("={{damage}} + {{Speed}} + {{Level:Bob}} + 'Nope'!{{X}}", BOOK, "Sheet1")
        .await;
    assert_eq!(preview.placeholders.len(), 4);
    assert_eq!(
        preview.potential_mappings["{{damage}}"],
        vec![
            HeaderMatch {
                header: "Damage".to_string(),
                score: 1.0,
            },
            HeaderMatch {
                header: "Base Damage".to_string(),
                score: 0.9,
            },
        ]
    );
    assert_eq!(preview.potential_mappings["{{Speed}}"][0].header, "Speed");
    assert!(preview.potential_mappings["'Nope'!{{X}}"].is_empty());
    // Intersections are not previewed.
    assert!(!preview.potential_mappings.contains_key("{{Level:Bob}}"));
    assert_eq!(preview.requires_disambiguation, vec!["{{damage}}".to_string()]);

    let manager = resolver.manager();
    assert!(manager.list_column_mappings(BOOK, None).unwrap().is_empty());
    assert!(manager.list_cell_mappings(BOOK, None).unwrap().is_empty());
}
