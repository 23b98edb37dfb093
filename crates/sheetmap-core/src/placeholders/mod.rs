//! Placeholder syntax in formula text and its resolution to A1 references.
//!
//! ```text
//! {{Base Damage}}          column "Base Damage", current row       -> F2
//! {{Multiplier:Jane}}      column "Multiplier", row labelled Jane  -> $G$5
//! 'Other Sheet'!{{Level}}  column "Level" on another sheet         -> 'Other Sheet'!$C$2
//! ${rate}                  variable (not implemented)
//! ```

mod parser;
mod resolver;
pub mod syntax;
mod types;

pub use parser::{extract_placeholders, get_placeholder_types, validate_syntax};
pub use resolver::PlaceholderResolver;
pub use types::{
    HeaderMatch, MappingPreview, Placeholder, PlaceholderMapping, PlaceholderType,
    ResolutionContext, ResolvedFormula, SyntaxError, SyntaxReport,
};
