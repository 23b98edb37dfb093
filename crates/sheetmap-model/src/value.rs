use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The value held by one cell as reported by a sheet accessor.
///
/// Serialized untagged so snapshot JSON can use plain literals (`"Level"`, `5`, `true`,
/// `null`); errors are written as `{"error": "#REF!"}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Boolean(bool),
    Number(f64),
    Text(String),
    Error { error: String },
}

impl CellValue {
    /// True for blank cells and empty strings.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Render the value the way a sheet displays it, or `None` for blank cells.
    ///
    /// Integral numbers render without a fractional part (`5`, not `5.0`).
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) if s.is_empty() => None,
            CellValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            CellValue::Number(n) => Some(Cow::Owned(format_number(*n))),
            CellValue::Boolean(true) => Some(Cow::Borrowed("TRUE")),
            CellValue::Boolean(false) => Some(Cow::Borrowed("FALSE")),
            CellValue::Error { error } => Some(Cow::Borrowed(error.as_str())),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_text().as_deref().unwrap_or(""))
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}
