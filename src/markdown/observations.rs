//! Scans a note body for observation bullets: `- [category] content #tag (context)`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::Observation;

static OBSERVATION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*-\s*\[([A-Za-z][A-Za-z0-9_-]*)\]\s*(.*)$").unwrap());
static TAG_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"#([A-Za-z0-9_-]+)").unwrap());
static TRAILING_CONTEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^()]*)\)\s*$").unwrap());

/// Matches a single line against the observation bullet grammar. Returns
/// `None` for any line that isn't an observation bullet (including a
/// relation bullet, which looks similar but has an identifier instead of
/// `[category]` right after the dash).
pub fn match_observation_line(line: &str) -> Option<Observation> {
    let caps = OBSERVATION_LINE.captures(line)?;
    let category = caps.get(1)?.as_str().to_lowercase();
    let mut rest = caps.get(2)?.as_str().to_string();

    let context = TRAILING_CONTEXT.captures(&rest).map(|c| c.get(1).unwrap().as_str().trim().to_string());
    if context.is_some() {
        let end = TRAILING_CONTEXT.find(&rest).unwrap().start();
        rest.truncate(end);
    }

    let mut tags = Vec::new();
    for cap in TAG_TOKEN.captures_iter(&rest.clone()) {
        tags.push(cap.get(1).unwrap().as_str().to_string());
    }
    let content = TAG_TOKEN.replace_all(&rest, "").trim().to_string();

    let mut obs = Observation::new(category, content);
    obs.tags = tags;
    obs.context = context.filter(|c| !c.is_empty());
    Some(obs)
}

/// Scans every line of a body for observation bullets.
pub fn scan(body: &str) -> Vec<Observation> {
    body.lines().filter_map(match_observation_line).collect()
}
