use rusqlite::Connection;

/// Bumped whenever `init` changes the table layout.
pub(crate) const SCHEMA_VERSION: i64 = 1;

pub(crate) fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS column_mappings (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          spreadsheet_id TEXT NOT NULL,
          sheet_name TEXT NOT NULL,
          header_text TEXT NOT NULL,
          column_letter TEXT NOT NULL,
          column_index INTEGER NOT NULL,
          header_row INTEGER NOT NULL DEFAULT 0,
          disambiguation_context JSON,
          last_validated_at TEXT,
          created_at TEXT NOT NULL,
          UNIQUE (spreadsheet_id, sheet_name, header_text)
        );

        CREATE INDEX IF NOT EXISTS idx_column_mappings_sheet
          ON column_mappings(spreadsheet_id, sheet_name);

        -- Kept separate from column_mappings so the unique key never involves a
        -- nullable row_label (NULLs are distinct under SQLite UNIQUE).
        CREATE TABLE IF NOT EXISTS cell_mappings (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          spreadsheet_id TEXT NOT NULL,
          sheet_name TEXT NOT NULL,
          column_header TEXT NOT NULL,
          row_label TEXT NOT NULL,
          cell_address TEXT NOT NULL,
          row_index INTEGER NOT NULL,
          column_letter TEXT NOT NULL,
          column_index INTEGER NOT NULL,
          disambiguation_context JSON,
          last_validated_at TEXT,
          created_at TEXT NOT NULL,
          UNIQUE (spreadsheet_id, sheet_name, column_header, row_label)
        );

        CREATE INDEX IF NOT EXISTS idx_cell_mappings_sheet
          ON cell_mappings(spreadsheet_id, sheet_name);
        "#,
    )?;

    let version: i64 = conn.pragma_query_value(None, "user_version", |r| r.get(0))?;
    if version < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }

    Ok(())
}
