use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The four recognised placeholder syntaxes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderType {
    /// `{{header}}`: the header's column at the current row.
    Header,
    /// `{{header:row_label}}`: one fixed cell.
    Intersection,
    /// `'Sheet'!{{header}}` or `Sheet!{{header}}`.
    CrossSheet,
    /// `${name}`.
    Variable,
}

impl fmt::Display for PlaceholderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlaceholderType::Header => "header",
            PlaceholderType::Intersection => "intersection",
            PlaceholderType::CrossSheet => "cross_sheet",
            PlaceholderType::Variable => "variable",
        })
    }
}

/// One symbolic reference found in formula text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    /// Header or variable name, trimmed.
    pub name: String,
    pub kind: PlaceholderType,
    /// The exact matched substring.
    pub syntax: String,
    pub sheet: Option<String>,
    pub row_label: Option<String>,
    /// Byte span `[start, end)` of `syntax` in the source formula.
    pub span: Range<usize>,
}

/// How one placeholder was resolved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderMapping {
    pub placeholder: String,
    /// The reference substituted into the formula, e.g. `F2` or `$G$5`.
    pub resolved_to: String,
    pub header: String,
    pub column: String,
    /// 1-based.
    pub row: Option<u32>,
    /// 1.0 for a verbatim header match, lower when a normalized match was used.
    pub confidence: f64,
    pub sheet_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFormula {
    pub original: String,
    pub resolved: String,
    pub mappings: Vec<PlaceholderMapping>,
    pub warnings: Vec<String>,
}

/// Where a formula is being written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionContext {
    pub current_sheet: String,
    /// 1-based row the formula lives on.
    pub current_row: u32,
    /// Emit `$F$2` instead of `F2` for header placeholders.
    #[serde(default)]
    pub absolute_references: bool,
}

impl ResolutionContext {
    pub fn new(current_sheet: impl Into<String>, current_row: u32) -> Self {
        Self {
            current_sheet: current_sheet.into(),
            current_row,
            absolute_references: false,
        }
    }

    pub fn absolute(mut self) -> Self {
        self.absolute_references = true;
        self
    }
}

/// A live header scored against a placeholder name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeaderMatch {
    pub header: String,
    pub score: f64,
}

/// Non-committing view of what a formula's placeholders could map to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MappingPreview {
    pub formula: String,
    pub placeholders: Vec<Placeholder>,
    /// Keyed by placeholder syntax, best match first.
    pub potential_mappings: BTreeMap<String, Vec<HeaderMatch>>,
    /// Syntaxes with more than one header above the threshold.
    pub requires_disambiguation: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SyntaxError {
    #[error("mismatched placeholder brackets: {open} opening, {close} closing")]
    MismatchedBrackets { open: usize, close: usize },
    #[error("empty placeholders are not allowed")]
    EmptyPlaceholder,
    #[error("invalid placeholder name '{0}': must start with a letter and contain only letters, digits, underscores and spaces")]
    InvalidName(String),
}

/// Result of the strict syntax pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxReport {
    pub valid: bool,
    pub errors: Vec<SyntaxError>,
    pub warnings: Vec<String>,
}
