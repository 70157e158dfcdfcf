//! Infers a Picoschema from actual usage rather than requiring one be
//! declared upfront: write notes freely, patterns emerge, then
//! crystallize into a schema. Grounded directly on
//! `original_source/schema/inference.py`.

use std::collections::HashMap;

const REQUIRED_THRESHOLD: f64 = 0.95;
const OPTIONAL_THRESHOLD: f64 = 0.25;
const MAX_SAMPLE_VALUES: usize = 5;

/// Decoupled from the graph store so inference can run over any data
/// source, per `original_source/schema/inference.py::NoteData`.
#[derive(Debug, Clone)]
pub struct NoteData {
    pub identifier: String,
    pub observations: Vec<(String, String)>,
    pub relations: Vec<(String, String)>,
    pub entity_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldSource {
    Observation,
    Relation,
}

#[derive(Debug, Clone)]
pub struct FieldFrequency {
    pub name: String,
    pub source: FieldSource,
    pub count: usize,
    pub total: usize,
    pub percentage: f64,
    pub sample_values: Vec<String>,
    pub is_array: bool,
    pub target_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InferenceResult {
    pub entity_type: String,
    pub notes_analyzed: usize,
    pub field_frequencies: Vec<FieldFrequency>,
    /// Ready-to-use Picoschema entries, in descending-frequency order (a
    /// plain `Vec` of pairs rather than a map, since Picoschema keys
    /// carry modifier suffixes and insertion order is the only order
    /// that matters here).
    pub suggested_schema: Vec<(String, String)>,
    pub suggested_required: Vec<String>,
    pub suggested_optional: Vec<String>,
    pub excluded: Vec<String>,
}

/// Counts how many notes contain each category at least once (presence,
/// not occurrence count), flags array fields (multiple occurrences in
/// more than half the notes that have the field at all), and collects up
/// to `MAX_SAMPLE_VALUES` deduplicated sample values.
fn analyze_observations(notes: &[NoteData], total: usize) -> Vec<FieldFrequency> {
    let mut note_count: HashMap<&str, usize> = HashMap::new();
    let mut multi_count: HashMap<&str, usize> = HashMap::new();
    let mut samples: HashMap<&str, Vec<String>> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for note in notes {
        let mut per_note: HashMap<&str, Vec<&str>> = HashMap::new();
        for (category, content) in &note.observations {
            per_note.entry(category.as_str()).or_default().push(content.as_str());
        }
        for (category, values) in per_note {
            if !note_count.contains_key(category) {
                order.push(category);
            }
            *note_count.entry(category).or_insert(0) += 1;
            if values.len() > 1 {
                *multi_count.entry(category).or_insert(0) += 1;
            }
            let bucket = samples.entry(category).or_default();
            for v in values {
                if !bucket.iter().any(|s| s == v) && bucket.len() < MAX_SAMPLE_VALUES {
                    bucket.push(v.to_string());
                }
            }
        }
    }

    let mut entries: Vec<(&str, usize)> = order.into_iter().map(|c| (c, note_count[c])).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));

    entries
        .into_iter()
        .map(|(category, count)| {
            let multi = multi_count.get(category).copied().unwrap_or(0);
            let is_array = (multi as f64) > (count as f64 / 2.0);
            FieldFrequency {
                name: category.to_string(),
                source: FieldSource::Observation,
                count,
                total,
                percentage: count as f64 / total as f64,
                sample_values: samples.remove(category).unwrap_or_default(),
                is_array,
                target_type: None,
            }
        })
        .collect()
}

/// Same presence/array-detection logic as [`analyze_observations`], plus
/// a majority vote over `note.entity_type` to suggest the relation's
/// target entity type in the generated schema.
fn analyze_relations(notes: &[NoteData], total: usize) -> Vec<FieldFrequency> {
    let mut note_count: HashMap<&str, usize> = HashMap::new();
    let mut multi_count: HashMap<&str, usize> = HashMap::new();
    let mut samples: HashMap<&str, Vec<String>> = HashMap::new();
    let mut target_types: HashMap<&str, HashMap<&str, usize>> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for note in notes {
        let mut per_note: HashMap<&str, Vec<&str>> = HashMap::new();
        for (rel_type, target) in &note.relations {
            per_note.entry(rel_type.as_str()).or_default().push(target.as_str());
        }
        for (rel_type, targets) in per_note {
            if !note_count.contains_key(rel_type) {
                order.push(rel_type);
            }
            *note_count.entry(rel_type).or_insert(0) += 1;
            if targets.len() > 1 {
                *multi_count.entry(rel_type).or_insert(0) += 1;
            }
            let bucket = samples.entry(rel_type).or_default();
            for t in targets {
                if !bucket.iter().any(|s| s == t) && bucket.len() < MAX_SAMPLE_VALUES {
                    bucket.push(t.to_string());
                }
            }
            if let Some(entity_type) = note.entity_type.as_deref() {
                *target_types.entry(rel_type).or_default().entry(entity_type).or_insert(0) += 1;
            }
        }
    }

    let mut entries: Vec<(&str, usize)> = order.into_iter().map(|c| (c, note_count[c])).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));

    entries
        .into_iter()
        .map(|(rel_type, count)| {
            let multi = multi_count.get(rel_type).copied().unwrap_or(0);
            let is_array = (multi as f64) > (count as f64 / 2.0);
            let target_type = target_types
                .get(rel_type)
                .and_then(|counts| counts.iter().max_by_key(|(_, n)| **n))
                .map(|(t, _)| t.to_string());
            FieldFrequency {
                name: rel_type.to_string(),
                source: FieldSource::Relation,
                count,
                total,
                percentage: count as f64 / total as f64,
                sample_values: samples.remove(rel_type).unwrap_or_default(),
                is_array,
                target_type,
            }
        })
        .collect()
}

fn build_picoschema_dict(frequencies: &[FieldFrequency]) -> Vec<(String, String)> {
    let mut schema = Vec::new();
    for freq in frequencies {
        if freq.percentage < OPTIONAL_THRESHOLD {
            continue;
        }
        let is_required = freq.percentage >= REQUIRED_THRESHOLD;

        let mut key = freq.name.clone();
        if !is_required {
            key.push('?');
        }
        if freq.is_array {
            key.push_str("(array)");
        }

        let value = match freq.source {
            FieldSource::Relation => {
                let target = freq.target_type.clone().unwrap_or_else(|| "string".to_string());
                if target == "string" {
                    target
                } else {
                    capitalize(&target)
                }
            }
            FieldSource::Observation => "string".to_string(),
        };

        schema.push((key, value));
    }
    schema
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Analyzes `notes` (all of entity type `entity_type`) and suggests a
/// Picoschema. Field (observation category or relation type) thresholds:
/// ≥95% required, ≥25% optional, below excluded from the suggestion.
pub fn infer_schema(entity_type: &str, notes: &[NoteData]) -> InferenceResult {
    let total = notes.len();
    if total == 0 {
        return InferenceResult {
            entity_type: entity_type.to_string(),
            notes_analyzed: 0,
            field_frequencies: Vec::new(),
            suggested_schema: Vec::new(),
            suggested_required: Vec::new(),
            suggested_optional: Vec::new(),
            excluded: Vec::new(),
        };
    }

    let mut all_frequencies = analyze_observations(notes, total);
    all_frequencies.extend(analyze_relations(notes, total));

    let mut suggested_required = Vec::new();
    let mut suggested_optional = Vec::new();
    let mut excluded = Vec::new();
    for freq in &all_frequencies {
        if freq.percentage >= REQUIRED_THRESHOLD {
            suggested_required.push(freq.name.clone());
        } else if freq.percentage >= OPTIONAL_THRESHOLD {
            suggested_optional.push(freq.name.clone());
        } else {
            excluded.push(freq.name.clone());
        }
    }

    let suggested_schema = build_picoschema_dict(&all_frequencies);

    InferenceResult {
        entity_type: entity_type.to_string(),
        notes_analyzed: total,
        field_frequencies: all_frequencies,
        suggested_schema,
        suggested_required,
        suggested_optional,
        excluded,
    }
}
