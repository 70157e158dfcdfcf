//! Executes Dataview blocks found in a note and persists the links they
//! discover as `dataview_link` relations — the only path allowed to touch
//! that relation type. Impact analysis and debouncing are grounded
//! directly on `original_source/sync/dataview_refresh_manager.py`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;
use crate::markdown::dataview_blocks::{self, BlockKind};
use crate::model::{Entity, Relation, Value as ModelValue, DATAVIEW_LINK};
use crate::resolver::ResolverIndex;
use crate::store::GraphStore;
use dataview::{DiscoveredLink, FileInfo, NoteRecord};

static FROM_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)FROM\s+["']([^"']+)["']"#).unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    Success,
    Error,
}

/// One entry of the `process_note` integration contract: `{query_id,
/// line_number, query_type, status, result_count, result_markdown,
/// discovered_links, error?, execution_time_ms}`.
#[derive(Debug, Clone)]
pub struct DataviewQueryResult {
    pub query_id: String,
    pub line_number: usize,
    pub query_type: String,
    pub status: QueryStatus,
    pub result_count: usize,
    pub result_markdown: String,
    pub discovered_links: Vec<DiscoveredLink>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

fn model_value_to_dataview(value: &ModelValue) -> dataview::Value {
    match value {
        ModelValue::Null => dataview::Value::Null,
        ModelValue::Bool(b) => dataview::Value::Bool(*b),
        ModelValue::Int(i) => dataview::Value::Int(*i),
        ModelValue::Float(f) => dataview::Value::Float(*f),
        ModelValue::String(s) => dataview::Value::String(s.clone()),
        ModelValue::Array(items) => dataview::Value::Array(items.iter().map(model_value_to_dataview).collect()),
        ModelValue::Object(map) => {
            dataview::Value::Object(map.iter().map(|(k, v)| (k.clone(), model_value_to_dataview(v))).collect())
        }
    }
}

/// Builds the record the executor sees for one entity.
pub fn entity_to_note_record(
    entity: &Entity,
    body: &str,
    tags: &[String],
    mtime: Option<String>,
) -> NoteRecord {
    let folder = Path::new(&entity.file_path)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    let file = FileInfo { path: entity.file_path.clone(), folder, link: format!("[[{}]]", entity.title), mtime };
    let fields: BTreeMap<String, dataview::Value> =
        entity.entity_metadata.iter().map(|(k, v)| (k.clone(), model_value_to_dataview(v))).collect();
    NoteRecord::Flat { file, title: entity.title.clone(), tags: tags.to_vec(), body: body.to_string(), fields }
}

/// Strips a leading `this.` from an inline span (`` `= this.status` ``)
/// and wraps the remainder as a one-column `TABLE` query, per the
/// `dataview` crate's documented contract for inline spans.
fn normalize_inline_expr(expr: &str) -> String {
    let expr = expr.strip_prefix("this.").unwrap_or(expr);
    format!("TABLE {expr}")
}

fn query_type_label(query_type: &dataview::QueryType) -> String {
    match query_type {
        dataview::QueryType::List => "list".to_string(),
        dataview::QueryType::Table => "table".to_string(),
        dataview::QueryType::Task => "task".to_string(),
    }
}

/// Runs every Dataview block/span in `body` against `notes` (the block
/// form) or against just the host note (the inline form). Never panics:
/// a parse error becomes a `QueryStatus::Error` entry, not a propagated
/// `Result::Err`.
pub fn process_note(host: &NoteRecord, body: &str, notes: &[NoteRecord]) -> Vec<DataviewQueryResult> {
    let blocks = dataview_blocks::scan(body);
    let mut results = Vec::with_capacity(blocks.len());

    for block in blocks {
        let started = Instant::now();
        let (query_text, corpus): (String, &[NoteRecord]) = match block.kind {
            BlockKind::Block => (block.source.clone(), notes),
            BlockKind::Inline => (normalize_inline_expr(&block.source), std::slice::from_ref(host)),
        };

        match dataview::parse(&query_text) {
            Ok(query) => {
                let query_type = query_type_label(&query.query_type);
                let result = dataview::execute(&query, corpus);
                results.push(DataviewQueryResult {
                    query_id: block.query_id,
                    line_number: block.line_number,
                    query_type,
                    status: QueryStatus::Success,
                    result_count: result.result_count,
                    result_markdown: result.markdown,
                    discovered_links: result.discovered_links,
                    error: None,
                    execution_time_ms: started.elapsed().as_millis() as u64,
                });
            }
            Err(e) => {
                results.push(DataviewQueryResult {
                    query_id: block.query_id,
                    line_number: block.line_number,
                    query_type: "unknown".to_string(),
                    status: QueryStatus::Error,
                    result_count: 0,
                    result_markdown: String::new(),
                    discovered_links: Vec::new(),
                    error: Some(e.to_string()),
                    execution_time_ms: started.elapsed().as_millis() as u64,
                });
            }
        }
    }

    results
}

/// Per-`from_id` lock preventing two overlapping refreshes from racing
/// on the same `from_id`. A single `SyncEngine::sync` call never races
/// itself (refreshes run one entity at a time), but a
/// concurrently-running watch-triggered sync and a directly-invoked
/// `refresh_dataview_relations` could otherwise both replace the same
/// entity's `dataview_link` rows out of order.
#[derive(Default)]
pub struct RefreshLocks {
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl RefreshLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, from_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.lock().expect("refresh locks poisoned").entry(from_id).or_default().clone()
    }
}

/// Executes every block in `body` and replaces `from_id`'s set of
/// `dataview_link` relations with the discovered targets, resolved
/// against `index`. This is the only code path allowed to write
/// `dataview_link` rows. Serializes against any other in-flight refresh
/// of the same `from_id` via `locks`.
pub async fn refresh_entity(
    store: &GraphStore,
    locks: &RefreshLocks,
    from_id: i64,
    host: &NoteRecord,
    body: &str,
    notes: &[NoteRecord],
    index: &ResolverIndex,
) -> Result<usize> {
    let guard = locks.handle(from_id);
    let _permit = guard.lock().await;
    let results = process_note(host, body, notes);
    let mut relations = Vec::new();
    for result in &results {
        if result.status != QueryStatus::Success {
            continue;
        }
        for link in &result.discovered_links {
            let mut relation = Relation::new(from_id, link.target.clone(), DATAVIEW_LINK);
            relation.to_id = index.resolve(&link.target);
            relations.push(relation);
        }
    }
    let count = relations.len();
    store.replace_dataview_links(from_id, relations).await?;
    Ok(count)
}

// ---------------------------------------------------------------------
// Impact analysis
// ---------------------------------------------------------------------

fn extract_from_clauses(body: &str) -> HashSet<String> {
    FROM_CLAUSE.captures_iter(body).map(|c| c[1].to_string()).collect()
}

/// Cache of `entity_id -> from_clauses` for every entity with Dataview
/// blocks, invalidated whenever an entity gains or loses one.
pub struct ImpactCache {
    entries: Mutex<Option<HashMap<i64, HashSet<String>>>>,
}

impl Default for ImpactCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ImpactCache {
    pub fn new() -> Self {
        Self { entries: Mutex::new(None) }
    }

    pub fn invalidate(&self) {
        *self.entries.lock().expect("impact cache poisoned") = None;
    }

    /// Rebuilds the cache from `(entity_id, body)` pairs if invalid, then
    /// returns the set of entities impacted by `changed_paths`/
    /// `changed_folders`. An entity with no `FROM` clause at all is
    /// conservatively always impacted.
    pub fn impacted<'a>(
        &self,
        bodies: impl Iterator<Item = (i64, &'a str)>,
        changed_paths: &[String],
        changed_folders: &[String],
    ) -> HashSet<i64> {
        let mut guard = self.entries.lock().expect("impact cache poisoned");
        if guard.is_none() {
            let mut built = HashMap::new();
            for (id, body) in bodies {
                if dataview_blocks::has_dataview_blocks(body) {
                    built.insert(id, extract_from_clauses(body));
                }
            }
            *guard = Some(built);
        }
        let cache = guard.as_ref().unwrap();

        let mut impacted = HashSet::new();
        for (entity_id, from_clauses) in cache {
            if from_clauses.is_empty() {
                impacted.insert(*entity_id);
                continue;
            }
            'outer: for from_clause in from_clauses {
                for folder in changed_folders {
                    if from_clause.contains(folder.as_str()) || folder.contains(from_clause.as_str()) {
                        impacted.insert(*entity_id);
                        break 'outer;
                    }
                }
                for path in changed_paths {
                    if path.contains(from_clause.as_str()) {
                        impacted.insert(*entity_id);
                        break 'outer;
                    }
                }
            }
        }
        impacted
    }

    pub fn all_dataview_entities<'a>(&self, bodies: impl Iterator<Item = (i64, &'a str)>) -> HashSet<i64> {
        self.invalidate();
        self.impacted(bodies, &[], &[])
    }
}

// ---------------------------------------------------------------------
// Debounce
// ---------------------------------------------------------------------

/// Cancel-and-restart debounce gate: a change arriving while a timer is
/// pending bumps a generation counter, so the in-flight sleep recognizes
/// it has been superseded and gives up without firing.
pub struct DebounceGate {
    debounce: Duration,
    generation: AtomicU64,
    pending: Mutex<HashSet<String>>,
}

impl DebounceGate {
    pub fn new(debounce_ms: u64) -> Self {
        Self { debounce: Duration::from_millis(debounce_ms), generation: AtomicU64::new(0), pending: Mutex::new(HashSet::new()) }
    }

    /// Records `path` as pending, waits out the debounce window, and
    /// returns the accumulated pending set only if no newer call arrived
    /// during the wait. Callers spawn this and act on `Some(_)`.
    pub async fn debounce_and_collect(&self, path: String) -> Option<Vec<String>> {
        self.pending.lock().expect("debounce gate poisoned").insert(path);
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::time::sleep(self.debounce).await;

        if self.generation.load(Ordering::SeqCst) != my_generation {
            return None;
        }
        let mut pending = self.pending.lock().expect("debounce gate poisoned");
        if pending.is_empty() {
            return None;
        }
        Some(pending.drain().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_clauses_case_insensitively() {
        let body = "```dataview\nlist from \"projects\"\n```";
        let clauses = extract_from_clauses(body);
        assert!(clauses.contains("projects"));
    }

    #[test]
    fn impact_cache_flags_no_from_clause_as_always_impacted() {
        let cache = ImpactCache::new();
        let bodies = vec![(1i64, "```dataview\nLIST\n```".to_string())];
        let impacted = cache.impacted(bodies.iter().map(|(id, b)| (*id, b.as_str())), &[], &[]);
        assert!(impacted.contains(&1));
    }

    #[test]
    fn impact_cache_matches_changed_folder() {
        let cache = ImpactCache::new();
        let bodies = vec![(1i64, "```dataview\nLIST FROM \"projects\"\n```".to_string())];
        let impacted = cache.impacted(
            bodies.iter().map(|(id, b)| (*id, b.as_str())),
            &[],
            &["projects/active".to_string()],
        );
        assert!(impacted.contains(&1));
    }

    #[test]
    fn normalize_inline_strips_this_prefix() {
        assert_eq!(normalize_inline_expr("this.status"), "TABLE status");
        assert_eq!(normalize_inline_expr("status"), "TABLE status");
    }

    #[test]
    fn refresh_locks_hand_out_the_same_handle_per_from_id() {
        let locks = RefreshLocks::new();
        let a = locks.handle(1);
        let b = locks.handle(1);
        let c = locks.handle(2);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn refresh_locks_serialize_access_to_the_same_from_id() {
        let locks = Arc::new(RefreshLocks::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let l1 = locks.clone();
        let o1 = order.clone();
        let first = tokio::spawn(async move {
            let guard = l1.handle(7);
            let _permit = guard.lock().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            o1.lock().unwrap().push("first");
        });

        tokio::time::sleep(Duration::from_millis(5)).await;

        let l2 = locks.clone();
        let o2 = order.clone();
        let second = tokio::spawn(async move {
            let guard = l2.handle(7);
            let _permit = guard.lock().await;
            o2.lock().unwrap().push("second");
        });

        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn debounce_only_the_last_call_fires() {
        let gate = std::sync::Arc::new(DebounceGate::new(30));
        let g2 = gate.clone();
        let first = tokio::spawn(async move { g2.debounce_and_collect("a.md".to_string()).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = gate.debounce_and_collect("b.md".to_string()).await;
        let first = first.await.unwrap();
        assert!(first.is_none());
        let mut collected = second.unwrap();
        collected.sort();
        assert_eq!(collected, vec!["a.md".to_string(), "b.md".to_string()]);
    }
}
