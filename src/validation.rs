//! Input validation for Basic Memory
//!
//! Validates identifiers (project names) to prevent path traversal
//! attacks and ensure filesystem safety, and provides the normalization
//! helpers the link resolver and permalink derivation depend on.

use thiserror::Error;

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid identifier '{0}': {1}")]
    InvalidIdentifier(String, &'static str),

    #[error("Identifier '{0}' is too long (max {1} characters)")]
    TooLong(String, usize),

    #[error("Identifier cannot be empty")]
    Empty,

    #[error("Reserved name: '{0}'")]
    Reserved(String),
}

/// Maximum length for identifiers
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Reserved names that cannot be used
const RESERVED_NAMES: &[&str] = &[
    ".", "..", "con", "prn", "aux", "nul",
    "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8", "com9",
    "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Validate a project name.
///
/// Rules:
/// - Must be 1-255 characters
/// - Only alphanumeric, underscore, and hyphen allowed
/// - Cannot start with a hyphen or underscore
/// - Cannot be a reserved name (case-insensitive)
pub fn validate_project_name(name: &str) -> Result<(), ValidationError> {
    validate_identifier(name)
}

/// Core identifier validation
fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Empty);
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong(name.to_string(), MAX_IDENTIFIER_LENGTH));
    }

    // Check each character
    for (i, c) in name.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
            return Err(ValidationError::InvalidIdentifier(
                name.to_string(),
                "contains invalid characters (only alphanumeric, underscore, and hyphen allowed)",
            ));
        }
        // Cannot start with hyphen or underscore
        if i == 0 && (c == '-' || c == '_') {
            return Err(ValidationError::InvalidIdentifier(
                name.to_string(),
                "cannot start with hyphen or underscore",
            ));
        }
    }

    // Check reserved names (case-insensitive)
    if RESERVED_NAMES.contains(&name.to_lowercase().as_str()) {
        return Err(ValidationError::Reserved(name.to_string()));
    }

    Ok(())
}

/// Sanitize an identifier by replacing invalid characters.
/// Returns None if the result would be empty or invalid.
pub fn sanitize_identifier(input: &str) -> Option<String> {
    if input.is_empty() {
        return None;
    }

    let mut result = String::with_capacity(input.len());

    for (i, c) in input.chars().enumerate() {
        if c.is_ascii_alphanumeric() {
            result.push(c);
        } else if (c == '_' || c == '-') && i > 0 {
            result.push(c);
        } else if !result.is_empty() && result.chars().last() != Some('_') {
            result.push('_');
        }
    }

    let result = result.trim_end_matches('_').to_string();

    if result.is_empty() || validate_identifier(&result).is_err() {
        None
    } else {
        Some(result)
    }
}

/// Lowercases, replaces non-alphanumeric runs with a single hyphen, and
/// trims leading/trailing hyphens — one path segment of a permalink.
pub fn slugify_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut last_was_hyphen = false;
    for c in segment.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen && !out.is_empty() {
            out.push('-');
            last_was_hyphen = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

/// Normalizes a relation type string: underscores are treated as
/// equivalent to hyphens (`part_of` becomes `part-of`), lowercased.
pub fn normalize_relation_type(relation_type: &str) -> String {
    relation_type.to_lowercase().replace('_', "-")
}

/// Normalizes an `entity_type` to snake_case: lowercase, non-alphanumeric
/// runs collapsed to a single underscore, leading/trailing underscores
/// trimmed.
pub fn normalize_entity_type(entity_type: &str) -> String {
    let mut out = String::with_capacity(entity_type.len());
    let mut last_was_underscore = false;
    for c in entity_type.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_underscore = false;
        } else if !last_was_underscore && !out.is_empty() {
            out.push('_');
            last_was_underscore = true;
        }
    }
    out.trim_end_matches('_').to_string()
}
