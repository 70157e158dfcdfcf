//! Picoschema: a compact schema notation embedded in a schema note's YAML
//! frontmatter. Field keys carry an optional-marker and a modifier suffix;
//! field values are `type[, description]` pairs, a YAML list (enum), or a
//! nested dict (object). Grounded directly on
//! `original_source/schema/parser.py`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::Value as Yaml;

use crate::error::{Error, Result};

/// Scalar types that are never entity references, regardless of case.
const SCALAR_TYPES: &[&str] = &["string", "integer", "number", "boolean", "any"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    /// `string`, `integer`, `number`, `boolean`, `any`, `enum`, `object`,
    /// or a capitalized entity type name.
    pub field_type: String,
    pub required: bool,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub is_enum: bool,
    #[serde(default)]
    pub enum_values: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_entity_ref: bool,
    #[serde(default)]
    pub children: Vec<SchemaField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationMode {
    Warn,
    Strict,
    Off,
}

impl ValidationMode {
    pub fn parse(text: &str) -> Self {
        match text {
            "strict" => ValidationMode::Strict,
            "off" => ValidationMode::Off,
            _ => ValidationMode::Warn,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchemaDefinition {
    pub entity: String,
    pub version: i64,
    pub fields: Vec<SchemaField>,
    pub validation_mode: ValidationMode,
    pub frontmatter_fields: Vec<SchemaField>,
}

/// Splits a Picoschema field key into `(name, required, is_array, is_enum,
/// is_object)`. The key format is `name[?][(array|enum|object)]`.
fn parse_field_key(key: &str) -> (String, bool, bool, bool, bool) {
    let mut key = key;
    let mut is_array = false;
    let mut is_enum = false;
    let mut is_object = false;

    if let Some(stripped) = key.strip_suffix("(array)") {
        is_array = true;
        key = stripped;
    } else if let Some(stripped) = key.strip_suffix("(enum)") {
        is_enum = true;
        key = stripped;
    } else if let Some(stripped) = key.strip_suffix("(object)") {
        is_object = true;
        key = stripped;
    }

    let required = !key.ends_with('?');
    let name = key.strip_suffix('?').unwrap_or(key).to_string();

    (name, required, is_array, is_enum, is_object)
}

/// Splits a `"type, description"` value string on the first comma.
fn parse_type_and_description(value: &str) -> (String, Option<String>) {
    match value.split_once(',') {
        Some((type_str, desc)) => (type_str.trim().to_string(), Some(desc.trim().to_string())),
        None => (value.trim().to_string(), None),
    }
}

/// A capitalized type name outside the scalar set denotes an entity
/// reference field.
fn is_entity_ref_type(type_str: &str) -> bool {
    if SCALAR_TYPES.contains(&type_str) {
        return false;
    }
    type_str.chars().next().is_some_and(|c| c.is_uppercase())
}

fn yaml_to_string(value: &Yaml) -> String {
    match value {
        Yaml::String(s) => s.clone(),
        Yaml::Bool(b) => b.to_string(),
        Yaml::Number(n) => n.to_string(),
        Yaml::Null => String::new(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
    }
}

/// Parses a Picoschema YAML mapping into a list of [`SchemaField`]s.
/// Recurses into `(object)` fields; `(enum)` fields take their allowed
/// values straight from a YAML list (or a single scalar, coerced).
pub fn parse_picoschema(yaml_map: &BTreeMap<String, Yaml>) -> Vec<SchemaField> {
    let mut fields = Vec::with_capacity(yaml_map.len());

    for (key, value) in yaml_map {
        let (name, required, is_array, is_enum, is_object) = parse_field_key(key);

        if is_enum {
            let enum_values = match value {
                Yaml::Sequence(items) => items.iter().map(yaml_to_string).collect(),
                other => vec![yaml_to_string(other)],
            };
            fields.push(SchemaField {
                name,
                field_type: "enum".to_string(),
                required,
                is_array: false,
                is_enum: true,
                enum_values,
                description: None,
                is_entity_ref: false,
                children: Vec::new(),
            });
            continue;
        }

        let is_mapping = matches!(value, Yaml::Mapping(_));
        if is_object || is_mapping {
            let children = as_str_map(value).map(|m| parse_picoschema(&m)).unwrap_or_default();
            fields.push(SchemaField {
                name,
                field_type: "object".to_string(),
                required,
                is_array: false,
                is_enum: false,
                enum_values: Vec::new(),
                description: None,
                is_entity_ref: false,
                children,
            });
            continue;
        }

        let raw = yaml_to_string(value);
        let (type_str, description) = parse_type_and_description(&raw);
        let is_entity_ref = is_entity_ref_type(&type_str);
        fields.push(SchemaField {
            name,
            field_type: type_str,
            required,
            is_array,
            is_enum: false,
            enum_values: Vec::new(),
            description,
            is_entity_ref,
            children: Vec::new(),
        });
    }

    fields
}

/// Converts a `serde_yaml::Mapping` (string-keyed) into a `BTreeMap` for
/// deterministic iteration order, the shape [`parse_picoschema`] expects.
fn as_str_map(value: &Yaml) -> Option<BTreeMap<String, Yaml>> {
    let mapping = value.as_mapping()?;
    let mut map = BTreeMap::new();
    for (k, v) in mapping {
        if let Some(key) = k.as_str() {
            map.insert(key.to_string(), v.clone());
        }
    }
    Some(map)
}

/// Parses a full schema note's frontmatter (already decoded to a YAML
/// mapping) into a [`SchemaDefinition`]. Requires `entity` and `schema`
/// keys; `version` defaults to 1, `settings.validation` to `warn`.
pub fn parse_schema_note(frontmatter: &Yaml) -> Result<SchemaDefinition> {
    let map = frontmatter.as_mapping().ok_or_else(|| Error::SchemaValidation {
        entity_type: String::new(),
        message: "schema note frontmatter is not a mapping".to_string(),
    })?;

    let entity = map
        .get(Yaml::String("entity".to_string()))
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::SchemaValidation {
            entity_type: String::new(),
            message: "schema note missing required 'entity' field in frontmatter".to_string(),
        })?
        .to_string();

    let schema_dict = map
        .get(Yaml::String("schema".to_string()))
        .and_then(as_str_map)
        .ok_or_else(|| Error::SchemaValidation {
            entity_type: entity.clone(),
            message: "schema note missing required 'schema' dict in frontmatter".to_string(),
        })?;

    let version = map.get(Yaml::String("version".to_string())).and_then(|v| v.as_i64()).unwrap_or(1);

    let settings = map.get(Yaml::String("settings".to_string())).and_then(|v| v.as_mapping());
    let validation_mode = settings
        .and_then(|s| s.get(Yaml::String("validation".to_string())))
        .and_then(|v| v.as_str())
        .map(ValidationMode::parse)
        .unwrap_or(ValidationMode::Warn);

    let frontmatter_fields = settings
        .and_then(|s| s.get(Yaml::String("frontmatter".to_string())))
        .and_then(as_str_map)
        .map(|m| parse_picoschema(&m))
        .unwrap_or_default();

    let fields = parse_picoschema(&schema_dict);

    Ok(SchemaDefinition { entity, version, fields, validation_mode, frontmatter_fields })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml_map(text: &str) -> BTreeMap<String, Yaml> {
        let value: Yaml = serde_yaml::from_str(text).unwrap();
        as_str_map(&value).unwrap()
    }

    #[test]
    fn parses_required_and_optional_scalar_fields() {
        let fields = parse_picoschema(&yaml_map("name: string, full name\nrole?: string\n"));
        let name = fields.iter().find(|f| f.name == "name").unwrap();
        assert!(name.required);
        assert_eq!(name.field_type, "string");
        assert_eq!(name.description.as_deref(), Some("full name"));

        let role = fields.iter().find(|f| f.name == "role").unwrap();
        assert!(!role.required);
    }

    #[test]
    fn parses_array_modifier() {
        let fields = parse_picoschema(&yaml_map("tags?(array): string\n"));
        let tags = &fields[0];
        assert_eq!(tags.name, "tags");
        assert!(!tags.required);
        assert!(tags.is_array);
    }

    #[test]
    fn parses_enum_modifier_from_list() {
        let fields = parse_picoschema(&yaml_map("status?(enum): [active, inactive]\n"));
        let status = &fields[0];
        assert!(status.is_enum);
        assert_eq!(status.enum_values, vec!["active".to_string(), "inactive".to_string()]);
    }

    #[test]
    fn parses_object_with_nested_children() {
        let fields = parse_picoschema(&yaml_map("metadata?(object):\n  sub_field: string\n"));
        let metadata = &fields[0];
        assert_eq!(metadata.field_type, "object");
        assert_eq!(metadata.children.len(), 1);
        assert_eq!(metadata.children[0].name, "sub_field");
    }

    #[test]
    fn capitalized_type_is_entity_reference() {
        let fields = parse_picoschema(&yaml_map("employer: Organization, current employer\n"));
        let employer = &fields[0];
        assert!(employer.is_entity_ref);
        assert_eq!(employer.field_type, "Organization");
    }

    #[test]
    fn scalar_types_are_never_entity_refs() {
        for f in ["string", "integer", "number", "boolean", "any"] {
            assert!(!is_entity_ref_type(f));
        }
    }

    #[test]
    fn parse_schema_note_requires_entity_and_schema() {
        let frontmatter: Yaml = serde_yaml::from_str("type: schema\n").unwrap();
        assert!(parse_schema_note(&frontmatter).is_err());
    }

    #[test]
    fn parse_schema_note_extracts_settings() {
        let frontmatter: Yaml = serde_yaml::from_str(
            "entity: person\nversion: 2\nschema:\n  name: string\nsettings:\n  validation: strict\n  frontmatter:\n    tags?(array): string\n",
        )
        .unwrap();
        let def = parse_schema_note(&frontmatter).unwrap();
        assert_eq!(def.entity, "person");
        assert_eq!(def.version, 2);
        assert_eq!(def.validation_mode, ValidationMode::Strict);
        assert_eq!(def.frontmatter_fields.len(), 1);
    }

    #[test]
    fn parse_schema_note_defaults_version_and_validation() {
        let frontmatter: Yaml = serde_yaml::from_str("entity: person\nschema:\n  name: string\n").unwrap();
        let def = parse_schema_note(&frontmatter).unwrap();
        assert_eq!(def.version, 1);
        assert_eq!(def.validation_mode, ValidationMode::Warn);
    }
}
