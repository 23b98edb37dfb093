//! Header-based reference resolution over spreadsheets whose layout drifts.
//!
//! [`MappingManager`] caches header -> column and (header, row label) -> cell lookups in a
//! [`sheetmap_storage::MappingStore`], revalidating them against the live sheet on every
//! use. [`PlaceholderResolver`] drives it to rewrite placeholder formulas such as
//! `={{Base Damage}} * 1.5` into `=F2 * 1.5`.

mod config;
mod disambiguation;
mod error;
mod manager;
pub mod placeholders;
mod validator;

pub use config::MappingConfig;
pub use disambiguation::DisambiguationHandler;
pub use error::{MappingError, MissingTarget, ResolveError, Result};
pub use manager::MappingManager;
pub use placeholders::{
    extract_placeholders, get_placeholder_types, validate_syntax, HeaderMatch, MappingPreview,
    Placeholder, PlaceholderMapping, PlaceholderResolver, PlaceholderType, ResolutionContext,
    ResolvedFormula, SyntaxError, SyntaxReport,
};
pub use validator::MappingValidator;
