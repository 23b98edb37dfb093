use std::collections::BTreeMap;
use std::ops::Range;

use super::syntax::{any_placeholder, cross_sheet, header, intersection, is_valid_placeholder_name, variable};
use super::types::{Placeholder, PlaceholderType, SyntaxError, SyntaxReport};

/// Every well-formed placeholder in `formula`, in source order.
///
/// Matches whose header name is invalid are dropped; [`validate_syntax`] reports them.
pub fn extract_placeholders(formula: &str) -> Vec<Placeholder> {
    any_placeholder()
        .find_iter(formula)
        .filter_map(|m| {
            let placeholder = classify(m.as_str(), m.range());
            match &placeholder {
                Some(p) => log::debug!("found placeholder {} ({})", p.syntax, p.kind),
                None => log::debug!("skipping malformed placeholder {}", m.as_str()),
            }
            placeholder
        })
        .collect()
}

/// Strict pass: bracket balance, empty placeholders and invalid names are errors; a
/// formula not starting with `=` only warns.
pub fn validate_syntax(formula: &str) -> SyntaxReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let open = formula.matches("{{").count();
    let close = formula.matches("}}").count();
    if open != close {
        errors.push(SyntaxError::MismatchedBrackets { open, close });
    }

    if has_empty_placeholder(formula) {
        errors.push(SyntaxError::EmptyPlaceholder);
    }

    for m in any_placeholder().find_iter(formula) {
        if let Some(name) = header_name(m.as_str()) {
            // Blank names are already reported as empty placeholders.
            if !name.trim().is_empty() && !is_valid_placeholder_name(name) {
                errors.push(SyntaxError::InvalidName(name.trim().to_string()));
            }
        }
    }

    let trimmed = formula.trim();
    if !trimmed.is_empty() && !trimmed.starts_with('=') {
        warnings.push("Formula does not start with '=' - this may not be a valid formula".to_string());
    }

    SyntaxReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// Placeholder syntax to kind; repeated syntaxes collapse to one entry.
pub fn get_placeholder_types(formula: &str) -> BTreeMap<String, PlaceholderType> {
    extract_placeholders(formula)
        .into_iter()
        .map(|p| (p.syntax, p.kind))
        .collect()
}

/// Precedence: cross-sheet, intersection, header, variable.
fn classify(text: &str, span: Range<usize>) -> Option<Placeholder> {
    let placeholder = |name: &str, kind, sheet: Option<&str>, row_label: Option<&str>| Placeholder {
        name: name.trim().to_string(),
        kind,
        syntax: text.to_string(),
        sheet: sheet.map(str::to_string),
        row_label: row_label.map(|l| l.trim().to_string()),
        span: span.clone(),
    };

    if let Some(caps) = cross_sheet().captures(text) {
        let sheet = caps.get(1).or_else(|| caps.get(2))?.as_str();
        let name = caps.get(3)?.as_str();
        return is_valid_placeholder_name(name)
            .then(|| placeholder(name, PlaceholderType::CrossSheet, Some(sheet), None));
    }
    if let Some(caps) = intersection().captures(text) {
        let name = caps.get(1)?.as_str();
        let row_label = caps.get(2)?.as_str();
        return (is_valid_placeholder_name(name) && !row_label.trim().is_empty())
            .then(|| placeholder(name, PlaceholderType::Intersection, None, Some(row_label)));
    }
    if let Some(caps) = header().captures(text) {
        let name = caps.get(1)?.as_str();
        return is_valid_placeholder_name(name).then(|| placeholder(name, PlaceholderType::Header, None, None));
    }
    if let Some(caps) = variable().captures(text) {
        let name = caps.get(1)?.as_str();
        return Some(placeholder(name, PlaceholderType::Variable, None, None));
    }
    None
}

/// The header name a `{{...}}` match would be resolved by, `None` for variables.
fn header_name(text: &str) -> Option<&str> {
    let name = cross_sheet()
        .captures(text)
        .map(|caps| caps.get(3))
        .or_else(|| intersection().captures(text).map(|caps| caps.get(1)))
        .or_else(|| header().captures(text).map(|caps| caps.get(1)))??;
    Some(name.as_str())
}

fn has_empty_placeholder(formula: &str) -> bool {
    let mut rest = formula;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        // `{{Level:}}` and `{{:Jane}}` count as empty too.
        if after[..end].split(':').any(|part| part.trim().is_empty()) {
            return true;
        }
        rest = &after[end..];
    }
    false
}
