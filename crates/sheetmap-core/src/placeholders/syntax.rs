//! Placeholder patterns and name matching.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid regex"))
}

/// Any of the four syntaxes; classification happens afterwards.
pub fn any_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"(?:'[^']+'!|\w+!)?\{\{[^{}:]+(?::[^{}:]+)?\}\}|\$\{[^{}]+\}")
}

/// `'Sheet'!{{header}}` (group 1) or `Sheet!{{header}}` (group 2); header in group 3.
pub fn cross_sheet() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"^(?:'([^']+)'!|([A-Za-z0-9_]+)!)\{\{([^{}]+)\}\}$")
}

pub fn intersection() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"^\{\{([^{}:]+):([^{}:]+)\}\}$")
}

pub fn header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"^\{\{([^{}:]+)\}\}$")
}

pub fn variable() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"^\$\{([^{}]+)\}$")
}

/// Lower-case with spaces and underscores removed, so `base_damage` meets `Base Damage`.
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Similarity in `0.0..=1.0` between a placeholder name and a live header.
pub fn fuzzy_match_score(placeholder_name: &str, header_text: &str) -> f64 {
    let name = normalize_name(placeholder_name);
    let header = normalize_name(header_text);

    if name == header {
        return 1.0;
    }
    if header.contains(&name) {
        return 0.9;
    }
    if name.contains(&header) {
        return 0.85;
    }

    let max_len = name.chars().count().max(header.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    let name_chars: HashSet<char> = name.chars().collect();
    let header_chars: HashSet<char> = header.chars().collect();
    let common = name_chars.intersection(&header_chars).count();
    common as f64 / max_len as f64 * 0.7
}

/// Starts with an ASCII letter, then letters, digits, underscores or whitespace.
pub fn is_valid_placeholder_name(name: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let name = name.trim();
    !name.is_empty() && compiled(&RE, r"^[A-Za-z][A-Za-z0-9_\s]*$").is_match(name)
}
