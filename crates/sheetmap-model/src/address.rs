use core::fmt;

use serde::{Deserialize, Serialize};

/// Maximum rows per worksheet (1,048,576).
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum columns per worksheet (16,384, column `XFD`).
pub const MAX_COLS: u32 = 16_384;

/// A reference to a single cell within a worksheet.
///
/// Rows and columns are **0-indexed**:
/// - `row = 0` is sheet row `1`
/// - `col = 0` is column `A`
///
/// Ordering is row-major, which is the order cells come back from a range read.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    /// 0-indexed row.
    pub row: u32,
    /// 0-indexed column.
    pub col: u32,
}

impl CellRef {
    #[inline]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Convert to A1 notation (e.g. `A1`, `BC32`).
    pub fn to_a1(self) -> String {
        format!("{}{}", column_letter(self.col), self.row + 1)
    }

    /// Convert to absolute A1 notation (e.g. `$G$5`).
    pub fn to_absolute_a1(self) -> String {
        format!("${}${}", column_letter(self.col), self.row + 1)
    }

    /// Column letters of this cell (e.g. `F`).
    pub fn column_letter(self) -> String {
        column_letter(self.col)
    }

    /// Parse an A1-style reference (e.g. `A1`, `$B$2`).
    pub fn from_a1(a1: &str) -> Result<Self, A1ParseError> {
        let s = a1.trim();
        if s.is_empty() {
            return Err(A1ParseError::Empty);
        }

        // Accept optional `$` markers.
        let mut idx = 0usize;
        let bytes = s.as_bytes();
        if bytes.get(idx) == Some(&b'$') {
            idx += 1;
        }

        let col_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_alphabetic() {
            idx += 1;
        }

        if idx == col_start {
            return Err(A1ParseError::MissingColumn);
        }

        let col_str = &s[col_start..idx];
        if bytes.get(idx) == Some(&b'$') {
            idx += 1;
        }

        let row_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }

        if idx == row_start {
            return Err(A1ParseError::MissingRow);
        }
        if idx != bytes.len() {
            return Err(A1ParseError::TrailingCharacters);
        }

        let col = column_index(col_str)?;
        let row_1_based: u32 = s[row_start..idx]
            .parse()
            .map_err(|_| A1ParseError::InvalidRow)?;
        if row_1_based == 0 || row_1_based > MAX_ROWS {
            return Err(A1ParseError::InvalidRow);
        }

        Ok(Self {
            row: row_1_based - 1,
            col,
        })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// A rectangular, inclusive region of one named sheet.
///
/// This is the unit of work for [`crate::SheetAccessor::read_range`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SheetRange {
    pub sheet: String,
    pub start: CellRef,
    pub end: CellRef,
}

impl SheetRange {
    /// Construct a new range, normalizing coordinates if needed.
    pub fn new(sheet: impl Into<String>, a: CellRef, b: CellRef) -> Self {
        Self {
            sheet: sheet.into(),
            start: CellRef::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellRef::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    /// The top-left `rows x cols` block of a sheet (`A1:ZZ10` for 10 rows, 702 columns).
    pub fn top_left(sheet: impl Into<String>, rows: u32, cols: u32) -> Self {
        Self::new(
            sheet,
            CellRef::new(0, 0),
            CellRef::new(rows.clamp(1, MAX_ROWS) - 1, cols.clamp(1, MAX_COLS) - 1),
        )
    }

    /// Every cell of one column (`A:A`).
    pub fn column(sheet: impl Into<String>, col: u32) -> Self {
        Self::new(sheet, CellRef::new(0, col), CellRef::new(MAX_ROWS - 1, col))
    }

    /// Every cell of the rows `first..=last` (`1:10`).
    pub fn rows(sheet: impl Into<String>, first: u32, last: u32) -> Self {
        Self::new(sheet, CellRef::new(first, 0), CellRef::new(last, MAX_COLS - 1))
    }

    /// Returns true if `cell` lies within this range.
    #[inline]
    pub const fn contains(&self, cell: CellRef) -> bool {
        cell.row >= self.start.row
            && cell.row <= self.end.row
            && cell.col >= self.start.col
            && cell.col <= self.end.col
    }
}

impl fmt::Display for SheetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}:{}", quote_sheet_name(&self.sheet), self.start, self.end)
    }
}

/// Quote a sheet name for use in a reference (`'My Sheet'!A1`) when it is not a bare identifier.
///
/// Embedded single quotes are doubled.
pub fn quote_sheet_name(name: &str) -> String {
    let bare = !name.is_empty()
        && !name.as_bytes()[0].is_ascii_digit()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if bare {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

/// Errors that can occur when parsing an A1 cell reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum A1ParseError {
    Empty,
    MissingColumn,
    MissingRow,
    InvalidColumn,
    InvalidRow,
    TrailingCharacters,
}

impl fmt::Display for A1ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            A1ParseError::Empty => "empty A1 reference",
            A1ParseError::MissingColumn => "missing column in A1 reference",
            A1ParseError::MissingRow => "missing row in A1 reference",
            A1ParseError::InvalidColumn => "invalid column in A1 reference",
            A1ParseError::InvalidRow => "invalid row in A1 reference",
            A1ParseError::TrailingCharacters => "trailing characters in A1 reference",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for A1ParseError {}

/// Convert a 0-based column index into its letters (`0 -> A`, `27 -> AB`).
pub fn column_letter(col: u32) -> String {
    // Columns are 1-based in A1 notation. We store 0-based internally.
    let mut n = col + 1;
    let mut out = Vec::<u8>::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.iter().rev().map(|&b| b as char).collect()
}

/// Convert column letters into a 0-based index (`A -> 0`, `ZZ -> 701`). Case-insensitive.
pub fn column_index(letters: &str) -> Result<u32, A1ParseError> {
    let mut col: u32 = 0;
    for b in letters.bytes() {
        if !b.is_ascii_alphabetic() {
            return Err(A1ParseError::InvalidColumn);
        }
        let v = (b.to_ascii_uppercase() - b'A') as u32 + 1;
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(v))
            .ok_or(A1ParseError::InvalidColumn)?;
    }
    if col == 0 || col > MAX_COLS {
        return Err(A1ParseError::InvalidColumn);
    }
    Ok(col - 1)
}
