//! Checks notes of a declared entity type against its Picoschema:
//! presence of required fields and cardinality (scalar vs array) against
//! what actually got written.

use std::collections::HashMap;

use super::inference::NoteData;
use super::picoschema::{SchemaField, ValidationMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub identifier: String,
    pub field: String,
    pub severity: IssueSeverity,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub entity_type: String,
    pub total_notes: usize,
    pub valid_count: usize,
    pub warning_count: usize,
    pub error_count: usize,
    pub issues: Vec<ValidationIssue>,
}

fn severity_for(mode: &ValidationMode) -> IssueSeverity {
    match mode {
        ValidationMode::Strict => IssueSeverity::Error,
        _ => IssueSeverity::Warning,
    }
}

/// Checks each note's observation categories and outgoing relation types
/// against `fields`' declared presence/cardinality. `Off` mode short
/// circuits to an all-valid report with no issues recorded — validation
/// is opted out of entirely, not merely downgraded to warnings.
pub fn validate_notes(
    entity_type: &str,
    fields: &[SchemaField],
    notes: &[NoteData],
    mode: &ValidationMode,
) -> ValidationReport {
    let total = notes.len();
    if matches!(mode, ValidationMode::Off) {
        return ValidationReport {
            entity_type: entity_type.to_string(),
            total_notes: total,
            valid_count: total,
            warning_count: 0,
            error_count: 0,
            issues: Vec::new(),
        };
    }

    let mut issues = Vec::new();
    let mut valid_count = 0;

    for note in notes {
        let mut present: HashMap<&str, usize> = HashMap::new();
        for (category, _) in &note.observations {
            *present.entry(category.as_str()).or_insert(0) += 1;
        }
        for (rel_type, _) in &note.relations {
            *present.entry(rel_type.as_str()).or_insert(0) += 1;
        }

        let mut note_is_valid = true;
        for field in fields {
            let count = present.get(field.name.as_str()).copied().unwrap_or(0);
            if field.required && count == 0 {
                note_is_valid = false;
                issues.push(ValidationIssue {
                    identifier: note.identifier.clone(),
                    field: field.name.clone(),
                    severity: severity_for(mode),
                    message: format!("required field '{}' is missing", field.name),
                });
            } else if count > 1 && !field.is_array {
                note_is_valid = false;
                issues.push(ValidationIssue {
                    identifier: note.identifier.clone(),
                    field: field.name.clone(),
                    severity: severity_for(mode),
                    message: format!(
                        "field '{}' appears {} times but the schema declares it scalar",
                        field.name, count
                    ),
                });
            }
        }

        if note_is_valid {
            valid_count += 1;
        }
    }

    let error_count = issues.iter().filter(|i| i.severity == IssueSeverity::Error).count();
    let warning_count = issues.len() - error_count;

    ValidationReport { entity_type: entity_type.to_string(), total_notes: total, valid_count, warning_count, error_count, issues }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, required: bool, is_array: bool) -> SchemaField {
        SchemaField {
            name: name.to_string(),
            field_type: "string".to_string(),
            required,
            is_array,
            is_enum: false,
            enum_values: Vec::new(),
            description: None,
            is_entity_ref: false,
            children: Vec::new(),
        }
    }

    fn note(id: &str, categories: &[&str]) -> NoteData {
        NoteData {
            identifier: id.to_string(),
            observations: categories.iter().map(|c| (c.to_string(), "x".to_string())).collect(),
            relations: Vec::new(),
            entity_type: None,
        }
    }

    #[test]
    fn missing_required_field_is_flagged_as_warning_by_default() {
        let fields = vec![field("role", true, false)];
        let notes = vec![note("a", &["role"]), note("b", &[])];
        let report = validate_notes("person", &fields, &notes, &ValidationMode::Warn);
        assert_eq!(report.valid_count, 1);
        assert_eq!(report.warning_count, 1);
        assert_eq!(report.error_count, 0);
    }

    #[test]
    fn missing_required_field_is_an_error_in_strict_mode() {
        let fields = vec![field("role", true, false)];
        let notes = vec![note("a", &[])];
        let report = validate_notes("person", &fields, &notes, &ValidationMode::Strict);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.warning_count, 0);
    }

    #[test]
    fn off_mode_never_reports_issues() {
        let fields = vec![field("role", true, false)];
        let notes = vec![note("a", &[])];
        let report = validate_notes("person", &fields, &notes, &ValidationMode::Off);
        assert!(report.issues.is_empty());
        assert_eq!(report.valid_count, 1);
    }

    #[test]
    fn multiple_occurrences_of_scalar_field_is_flagged() {
        let fields = vec![field("role", true, false)];
        let notes = vec![note("a", &["role", "role"])];
        let report = validate_notes("person", &fields, &notes, &ValidationMode::Warn);
        assert_eq!(report.warning_count, 1);
    }

    #[test]
    fn array_field_tolerates_multiple_occurrences() {
        let fields = vec![field("tag", true, true)];
        let notes = vec![note("a", &["tag", "tag"])];
        let report = validate_notes("person", &fields, &notes, &ValidationMode::Warn);
        assert!(report.issues.is_empty());
        assert_eq!(report.valid_count, 1);
    }
}
