use crate::schema;
use crate::store::MappingStore;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use sheetmap_model::{CellMapping, ColumnMapping, DisambiguationContext, MappingId};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to create storage directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// SQLite-backed [`MappingStore`].
///
/// Cloning is cheap and every clone shares one connection, so a manager and an operator
/// tool can look at the same records.
#[derive(Debug, Clone)]
pub struct MappingStorage {
    conn: Arc<Mutex<Connection>>,
}

const COLUMN_FIELDS: &str = "id, spreadsheet_id, sheet_name, header_text, column_letter, \
     column_index, header_row, disambiguation_context, last_validated_at, created_at";

const CELL_FIELDS: &str = "id, spreadsheet_id, sheet_name, column_header, row_label, \
     cell_address, row_index, column_letter, column_index, disambiguation_context, \
     last_validated_at, created_at";

impl MappingStorage {
    /// Open (creating if needed) a database file, including its parent directory.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn open_uri(uri: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI;
        Self::from_connection(Connection::open_with_flags(uri, flags)?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl MappingStore for MappingStorage {
    fn get_column(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        header_text: &str,
    ) -> Result<Option<ColumnMapping>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let row = conn
            .query_row(
                &format!(
                    "SELECT {COLUMN_FIELDS} FROM column_mappings \
                     WHERE spreadsheet_id = ?1 AND sheet_name = ?2 AND header_text = ?3"
                ),
                params![spreadsheet_id, sheet_name, header_text],
                column_from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn get_column_by_id(&self, id: MappingId) -> Result<Option<ColumnMapping>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let row = conn
            .query_row(
                &format!("SELECT {COLUMN_FIELDS} FROM column_mappings WHERE id = ?1"),
                params![id],
                column_from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn put_column(&self, mut mapping: ColumnMapping) -> Result<ColumnMapping> {
        let context = context_to_json(mapping.disambiguation_context.as_ref())?;
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let (id, created_at): (MappingId, String) = conn.query_row(
            r#"
            INSERT INTO column_mappings (
              spreadsheet_id, sheet_name, header_text, column_letter, column_index,
              header_row, disambiguation_context, last_validated_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(spreadsheet_id, sheet_name, header_text) DO UPDATE SET
              column_letter = excluded.column_letter,
              column_index = excluded.column_index,
              header_row = excluded.header_row,
              disambiguation_context = excluded.disambiguation_context,
              last_validated_at = excluded.last_validated_at
            RETURNING id, created_at
            "#,
            params![
                &mapping.spreadsheet_id,
                &mapping.sheet_name,
                &mapping.header_text,
                &mapping.column_letter,
                mapping.column_index,
                mapping.header_row,
                context,
                mapping.last_validated_at.map(|t| t.to_rfc3339()),
                mapping.created_at.to_rfc3339(),
            ],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        mapping.id = Some(id);
        mapping.created_at = parse_timestamp(&created_at, 1)?;
        log::info!(
            "stored column mapping {}/{}/{} -> {}",
            mapping.spreadsheet_id,
            mapping.sheet_name,
            mapping.header_text,
            mapping.column_letter
        );
        Ok(mapping)
    }

    fn list_columns(&self, spreadsheet_id: &str, sheet_name: Option<&str>) -> Result<Vec<ColumnMapping>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMN_FIELDS} FROM column_mappings \
             WHERE spreadsheet_id = ?1 AND (?2 IS NULL OR sheet_name = ?2) \
             ORDER BY id"
        ))?;

        let rows = stmt.query_map(params![spreadsheet_id, sheet_name], column_from_row)?;
        let mut out = Vec::new();
        for mapping in rows {
            out.push(mapping?);
        }
        Ok(out)
    }

    fn delete_column(&self, id: MappingId) -> Result<bool> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let deleted = conn.execute("DELETE FROM column_mappings WHERE id = ?1", params![id])? > 0;
        if deleted {
            log::info!("deleted column mapping {id}");
        }
        Ok(deleted)
    }

    fn get_cell(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        column_header: &str,
        row_label: &str,
    ) -> Result<Option<CellMapping>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let row = conn
            .query_row(
                &format!(
                    "SELECT {CELL_FIELDS} FROM cell_mappings \
                     WHERE spreadsheet_id = ?1 AND sheet_name = ?2 \
                       AND column_header = ?3 AND row_label = ?4"
                ),
                params![spreadsheet_id, sheet_name, column_header, row_label],
                cell_from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn get_cell_by_id(&self, id: MappingId) -> Result<Option<CellMapping>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let row = conn
            .query_row(
                &format!("SELECT {CELL_FIELDS} FROM cell_mappings WHERE id = ?1"),
                params![id],
                cell_from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn put_cell(&self, mut mapping: CellMapping) -> Result<CellMapping> {
        let context = context_to_json(mapping.disambiguation_context.as_ref())?;
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let (id, created_at): (MappingId, String) = conn.query_row(
            r#"
            INSERT INTO cell_mappings (
              spreadsheet_id, sheet_name, column_header, row_label, cell_address,
              row_index, column_letter, column_index, disambiguation_context,
              last_validated_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(spreadsheet_id, sheet_name, column_header, row_label) DO UPDATE SET
              cell_address = excluded.cell_address,
              row_index = excluded.row_index,
              column_letter = excluded.column_letter,
              column_index = excluded.column_index,
              disambiguation_context = excluded.disambiguation_context,
              last_validated_at = excluded.last_validated_at
            RETURNING id, created_at
            "#,
            params![
                &mapping.spreadsheet_id,
                &mapping.sheet_name,
                &mapping.column_header,
                &mapping.row_label,
                &mapping.cell_address,
                mapping.row_index,
                &mapping.column_letter,
                mapping.column_index,
                context,
                mapping.last_validated_at.map(|t| t.to_rfc3339()),
                mapping.created_at.to_rfc3339(),
            ],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        mapping.id = Some(id);
        mapping.created_at = parse_timestamp(&created_at, 1)?;
        log::info!(
            "stored cell mapping {}/{}/{} x {} -> {}",
            mapping.spreadsheet_id,
            mapping.sheet_name,
            mapping.column_header,
            mapping.row_label,
            mapping.cell_address
        );
        Ok(mapping)
    }

    fn list_cells(&self, spreadsheet_id: &str, sheet_name: Option<&str>) -> Result<Vec<CellMapping>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {CELL_FIELDS} FROM cell_mappings \
             WHERE spreadsheet_id = ?1 AND (?2 IS NULL OR sheet_name = ?2) \
             ORDER BY id"
        ))?;

        let rows = stmt.query_map(params![spreadsheet_id, sheet_name], cell_from_row)?;
        let mut out = Vec::new();
        for mapping in rows {
            out.push(mapping?);
        }
        Ok(out)
    }

    fn delete_cell(&self, id: MappingId) -> Result<bool> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let deleted = conn.execute("DELETE FROM cell_mappings WHERE id = ?1", params![id])? > 0;
        if deleted {
            log::info!("deleted cell mapping {id}");
        }
        Ok(deleted)
    }

    fn delete_all(&self, spreadsheet_id: &str, sheet_name: Option<&str>) -> Result<usize> {
        let mut conn = self.conn.lock().expect("storage mutex poisoned");
        let tx = conn.transaction()?;
        let mut count = 0;
        for table in ["column_mappings", "cell_mappings"] {
            count += tx.execute(
                &format!(
                    "DELETE FROM {table} WHERE spreadsheet_id = ?1 AND (?2 IS NULL OR sheet_name = ?2)"
                ),
                params![spreadsheet_id, sheet_name],
            )?;
        }
        tx.commit()?;

        log::info!(
            "deleted {count} mappings for {spreadsheet_id}{}",
            sheet_name.map(|s| format!("/{s}")).unwrap_or_default()
        );
        Ok(count)
    }
}

fn context_to_json(context: Option<&DisambiguationContext>) -> Result<Option<serde_json::Value>> {
    Ok(context.map(serde_json::to_value).transpose()?)
}

fn context_from_json(
    value: Option<serde_json::Value>,
    idx: usize,
) -> rusqlite::Result<Option<DisambiguationContext>> {
    value
        .map(|v| {
            serde_json::from_value(v)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        })
        .transpose()
}

fn parse_timestamp(raw: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_timestamp(raw: Option<String>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_timestamp(&s, idx)).transpose()
}

fn column_from_row(r: &Row<'_>) -> rusqlite::Result<ColumnMapping> {
    Ok(ColumnMapping {
        id: Some(r.get(0)?),
        spreadsheet_id: r.get(1)?,
        sheet_name: r.get(2)?,
        header_text: r.get(3)?,
        column_letter: r.get(4)?,
        column_index: r.get(5)?,
        header_row: r.get(6)?,
        disambiguation_context: context_from_json(r.get(7)?, 7)?,
        last_validated_at: optional_timestamp(r.get(8)?, 8)?,
        created_at: parse_timestamp(&r.get::<_, String>(9)?, 9)?,
    })
}

fn cell_from_row(r: &Row<'_>) -> rusqlite::Result<CellMapping> {
    Ok(CellMapping {
        id: Some(r.get(0)?),
        spreadsheet_id: r.get(1)?,
        sheet_name: r.get(2)?,
        column_header: r.get(3)?,
        row_label: r.get(4)?,
        cell_address: r.get(5)?,
        row_index: r.get(6)?,
        column_letter: r.get(7)?,
        column_index: r.get(8)?,
        disambiguation_context: context_from_json(r.get(9)?, 9)?,
        last_validated_at: optional_timestamp(r.get(10)?, 10)?,
        created_at: parse_timestamp(&r.get::<_, String>(11)?, 11)?,
    })
}
