use std::fmt;

use sheetmap_model::{AccessError, DisambiguationRequest, MappingKind};
use sheetmap_storage::StorageError;
use thiserror::Error;
use uuid::Uuid;

/// What a lookup failed to find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingTarget {
    Header(String),
    RowLabel(String),
}

impl fmt::Display for MissingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingTarget::Header(h) => write!(f, "header '{h}'"),
            MissingTarget::RowLabel(l) => write!(f, "row label '{l}'"),
        }
    }
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("{target} not found in sheet '{sheet}'")]
    HeaderNotFound { sheet: String, target: MissingTarget },

    /// Control flow rather than failure: the request carries every candidate and an id a
    /// human can answer through `MappingManager::store_disambiguation`.
    #[error(
        "multiple columns found with header '{}' - disambiguation required (request_id: {})",
        .0.header_text,
        .0.request_id
    )]
    DisambiguationRequired(Box<DisambiguationRequest>),

    #[error("no {kind} mapping found for {key}")]
    MappingNotFound { kind: MappingKind, key: String },

    #[error("disambiguation request {0} not found or expired")]
    RequestNotFound(Uuid),

    #[error("invalid column index {selected}: must be between 0 and {}", .candidates.saturating_sub(1))]
    InvalidSelection { selected: usize, candidates: usize },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sheet(#[from] AccessError),
}

impl MappingError {
    pub(crate) fn header_not_found(sheet: &str, header: &str) -> Self {
        MappingError::HeaderNotFound {
            sheet: sheet.to_string(),
            target: MissingTarget::Header(header.to_string()),
        }
    }

    pub(crate) fn row_label_not_found(sheet: &str, row_label: &str) -> Self {
        MappingError::HeaderNotFound {
            sheet: sheet.to_string(),
            target: MissingTarget::RowLabel(row_label.to_string()),
        }
    }

    /// The pending request when this is `DisambiguationRequired`.
    pub fn disambiguation_request(&self) -> Option<&DisambiguationRequest> {
        match self {
            MappingError::DisambiguationRequired(request) => Some(request),
            _ => None,
        }
    }

    /// True when a column header (not a row label) was not found.
    pub fn is_missing_header(&self) -> bool {
        matches!(
            self,
            MappingError::HeaderNotFound {
                target: MissingTarget::Header(_),
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, MappingError>;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// `resolve_all` turns this into a warning and leaves the placeholder untouched.
    #[error("variable placeholders ({syntax}) are not yet implemented; use header placeholders instead")]
    Unimplemented { syntax: String },

    /// Rows are 1-based; a header placeholder cannot point at row 0.
    #[error("invalid row {row} for {syntax}: rows start at 1")]
    InvalidRow { syntax: String, row: u32 },
}

impl ResolveError {
    pub fn as_mapping(&self) -> Option<&MappingError> {
        match self {
            ResolveError::Mapping(e) => Some(e),
            ResolveError::Unimplemented { .. } | ResolveError::InvalidRow { .. } => None,
        }
    }
}
