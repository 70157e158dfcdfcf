//! Composite FTS + vector search index. Shares the graph store's SQLite
//! connection (the `search_index` FTS5 table and `embeddings` table live
//! in the same schema). Grounded on
//! `original_source/repository/search_repository.py` (BM25 ranking via
//! FTS5, delete-then-insert upsert, special-character term quoting, and
//! a one-row-per-searchable-unit index shape).

pub mod chunk;
pub mod embedding;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::model::{Entity, Observation, Relation};
use crate::store::{run_blocking, GraphStore};
use embedding::{cosine_similarity, EmbeddingProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Fts,
    Vector,
    Hybrid,
}

/// Discriminates a search index row's searchable unit: one row per
/// entity, observation, or relation, not one row per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowType {
    Entity,
    Observation,
    Relation,
}

impl RowType {
    fn as_str(self) -> &'static str {
        match self {
            RowType::Entity => "entity",
            RowType::Observation => "observation",
            RowType::Relation => "relation",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "observation" => RowType::Observation,
            "relation" => RowType::Relation,
            _ => RowType::Entity,
        }
    }
}

/// `type`/`entity_type`/date-range filters applied over an FTS query,
/// grouped into one closed struct rather than threaded as separate
/// optional arguments.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub row_type: Option<RowType>,
    pub entity_type: Option<String>,
    pub updated_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
}

/// One unit to index: an entity, one of its observations, or one of its
/// relations. `source_id` is this unit's own id (the observation or
/// relation id, or the entity id for an entity row) — `index_row`
/// deletes-then-inserts keyed on `(row_type, source_id)`, so re-indexing
/// one observation never touches its siblings.
pub struct SearchRow {
    pub row_type: RowType,
    pub source_id: i64,
    pub project_id: i64,
    pub entity_id: i64,
    pub permalink: String,
    pub title: String,
    pub content: String,
    pub entity_type: String,
    pub category: Option<String>,
    pub relation_type: Option<String>,
    pub from_id: Option<i64>,
    pub to_id: Option<i64>,
    pub metadata: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub entity_id: i64,
    pub permalink: String,
    pub title: String,
    pub snippet: String,
    pub score: f32,
}

pub struct SearchIndex {
    conn: Arc<Mutex<Connection>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl SearchIndex {
    /// Shares `store`'s connection — both subsystems write to the same
    /// database file.
    pub fn new(store: &GraphStore) -> Self {
        Self { conn: store.conn_handle(), embedder: None }
    }

    pub fn with_embedder(store: &GraphStore, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { conn: store.conn_handle(), embedder: Some(embedder) }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        run_blocking(self.conn.clone(), f).await
    }

    /// Upserts one row, keyed on `(row_type, source_id)`.
    pub async fn index_row(&self, row: SearchRow) -> Result<()> {
        self.with_conn(move |conn| {
            let type_str = row.row_type.as_str();
            conn.execute(
                "DELETE FROM search_index WHERE row_type = ?1 AND source_id = ?2",
                params![type_str, row.source_id],
            )
            .map_err(|e| Error::SearchError { message: e.to_string() })?;
            conn.execute(
                "INSERT INTO search_index
                    (permalink, project_id, entity_id, row_type, source_id, title, content,
                     entity_type, category, relation_type, from_id, to_id, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    row.permalink,
                    row.project_id,
                    row.entity_id,
                    type_str,
                    row.source_id,
                    row.title,
                    row.content,
                    row.entity_type,
                    row.category,
                    row.relation_type,
                    row.from_id,
                    row.to_id,
                    row.metadata,
                    row.created_at.to_rfc3339(),
                    row.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| Error::SearchError { message: e.to_string() })?;
            Ok(())
        })
        .await
    }

    /// Re-indexes the full set of rows (entity + observations + relations)
    /// for one entity: deletes every existing row for its `entity_id`
    /// first, since `replace_child_rows`-style updates can drop an
    /// observation or relation that no longer exists in the reparsed body.
    pub async fn index_entity(
        &self,
        entity: &Entity,
        body: &str,
        observations: &[Observation],
        relations: &[Relation],
    ) -> Result<()> {
        let entity_id = entity.id;
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM search_index WHERE entity_id = ?1", params![entity_id])
                .map_err(|e| Error::SearchError { message: e.to_string() })?;
            Ok(())
        })
        .await?;

        let metadata = serde_json::json!({ "entity_type": entity.entity_type }).to_string();
        let entity_content = compose_source_text(&entity.title, &entity.permalink, None, body);
        self.index_row(SearchRow {
            row_type: RowType::Entity,
            source_id: entity.id,
            project_id: entity.project_id,
            entity_id: entity.id,
            permalink: entity.permalink.clone(),
            title: entity.title.clone(),
            content: entity_content,
            entity_type: entity.entity_type.clone(),
            category: None,
            relation_type: None,
            from_id: None,
            to_id: None,
            metadata: metadata.clone(),
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
        .await?;

        for obs in observations {
            let content = compose_source_text(&entity.title, &entity.permalink, Some(&obs.category), &obs.content);
            self.index_row(SearchRow {
                row_type: RowType::Observation,
                source_id: obs.id,
                project_id: entity.project_id,
                entity_id: entity.id,
                permalink: entity.permalink.clone(),
                title: entity.title.clone(),
                content,
                entity_type: entity.entity_type.clone(),
                category: Some(obs.category.clone()),
                relation_type: None,
                from_id: None,
                to_id: None,
                metadata: metadata.clone(),
                created_at: entity.created_at,
                updated_at: entity.updated_at,
            })
            .await?;
        }

        for rel in relations {
            let snippet = rel.context.clone().unwrap_or_else(|| rel.to_name.clone());
            let content =
                compose_source_text(&entity.title, &entity.permalink, Some(&rel.relation_type), &snippet);
            self.index_row(SearchRow {
                row_type: RowType::Relation,
                source_id: rel.id,
                project_id: entity.project_id,
                entity_id: entity.id,
                permalink: entity.permalink.clone(),
                title: entity.title.clone(),
                content,
                entity_type: entity.entity_type.clone(),
                category: None,
                relation_type: Some(rel.relation_type.clone()),
                from_id: Some(rel.from_id),
                to_id: rel.to_id,
                metadata: metadata.clone(),
                created_at: entity.created_at,
                updated_at: entity.updated_at,
            })
            .await?;
        }

        Ok(())
    }

    pub async fn delete_by_permalink(&self, project_id: i64, permalink: String) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM search_index WHERE project_id = ?1 AND permalink = ?2",
                params![project_id, permalink],
            )
            .map_err(|e| Error::SearchError { message: e.to_string() })?;
            Ok(())
        })
        .await
    }

    pub async fn replace_embeddings(&self, entity_id: i64, chunks: Vec<(chunk::Chunk, Vec<f32>)>) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM embeddings WHERE entity_id = ?1", params![entity_id])
                .map_err(|e| Error::SearchError { message: e.to_string() })?;
            for (index, (c, vector)) in chunks.into_iter().enumerate() {
                let heading_path = c.heading_path.join(" > ");
                let vector_json = serde_json::to_string(&vector)?;
                conn.execute(
                    "INSERT INTO embeddings (entity_id, chunk_index, heading_path, chunk_text, vector)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![entity_id, index as i64, heading_path, c.text, vector_json],
                )
                .map_err(|e| Error::SearchError { message: e.to_string() })?;
            }
            Ok(())
        })
        .await
    }

    pub async fn search(
        &self,
        project_id: i64,
        query: &str,
        mode: SearchMode,
        semantic_search_enabled: bool,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>> {
        self.search_filtered(project_id, query, mode, &SearchFilters::default(), semantic_search_enabled, limit, offset)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn search_filtered(
        &self,
        project_id: i64,
        query: &str,
        mode: SearchMode,
        filters: &SearchFilters,
        semantic_search_enabled: bool,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>> {
        match mode {
            SearchMode::Fts => self.search_fts(project_id, query, filters, limit, offset).await,
            SearchMode::Vector => {
                self.require_semantic(semantic_search_enabled)?;
                self.search_vector(project_id, query, limit, offset).await
            }
            SearchMode::Hybrid => {
                self.require_semantic(semantic_search_enabled)?;
                let fts = self.search_fts(project_id, query, filters, limit + offset, 0).await?;
                let vector = self.search_vector(project_id, query, limit + offset, 0).await?;
                Ok(fuse(fts, vector, limit, offset))
            }
        }
    }

    fn require_semantic(&self, semantic_search_enabled: bool) -> Result<()> {
        if !semantic_search_enabled {
            return Err(Error::SemanticSearchDisabled);
        }
        if self.embedder.is_none() {
            return Err(Error::SemanticDependenciesMissing {
                message: "no embedding provider configured".to_string(),
            });
        }
        Ok(())
    }

    async fn search_fts(
        &self,
        project_id: i64,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>> {
        let match_query = format!("{}*", quote_search_term(&query.to_lowercase()));
        let filters = filters.clone();
        self.with_conn(move |conn| {
            let mut sql = String::from(
                "SELECT entity_id, permalink, title,
                        snippet(search_index, 6, '', '', '...', 12) AS snip,
                        bm25(search_index) AS rank
                 FROM search_index
                 WHERE project_id = ?1 AND search_index MATCH ?2",
            );
            let mut bound: Vec<Box<dyn rusqlite::ToSql>> =
                vec![Box::new(project_id), Box::new(match_query.clone())];

            if let Some(row_type) = filters.row_type {
                sql.push_str(&format!(" AND row_type = ?{}", bound.len() + 1));
                bound.push(Box::new(row_type.as_str().to_string()));
            }
            if let Some(entity_type) = &filters.entity_type {
                sql.push_str(&format!(" AND entity_type = ?{}", bound.len() + 1));
                bound.push(Box::new(entity_type.clone()));
            }
            if let Some(after) = filters.updated_after {
                sql.push_str(&format!(" AND updated_at >= ?{}", bound.len() + 1));
                bound.push(Box::new(after.to_rfc3339()));
            }
            if let Some(before) = filters.updated_before {
                sql.push_str(&format!(" AND updated_at <= ?{}", bound.len() + 1));
                bound.push(Box::new(before.to_rfc3339()));
            }
            sql.push_str(&format!(" ORDER BY rank LIMIT ?{} OFFSET ?{}", bound.len() + 1, bound.len() + 2));
            bound.push(Box::new(limit as i64));
            bound.push(Box::new(offset as i64));

            let mut stmt = conn.prepare(&sql).map_err(|e| Error::SearchError { message: e.to_string() })?;
            let params_refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
            let rows = stmt
                .query_map(params_refs.as_slice(), |row| {
                    let rank: f64 = row.get("rank")?;
                    Ok(SearchResult {
                        entity_id: row.get("entity_id")?,
                        permalink: row.get("permalink")?,
                        title: row.get("title")?,
                        snippet: row.get("snip")?,
                        // bm25() is lower-is-better; invert so higher score always means "more relevant".
                        score: -(rank as f32),
                    })
                })
                .map_err(|e| Error::SearchError { message: e.to_string() })?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|e| Error::SearchError { message: e.to_string() })
        })
        .await
    }

    async fn search_vector(&self, project_id: i64, query: &str, limit: usize, offset: usize) -> Result<Vec<SearchResult>> {
        let embedder = self.embedder.clone().expect("checked by require_semantic");
        let query_vector = embedder.embed(query).await?;

        #[derive(Clone)]
        struct Candidate {
            entity_id: i64,
            chunk_text: String,
            vector: Vec<f32>,
        }

        let candidates: Vec<Candidate> = self
            .with_conn(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT e.entity_id, e.chunk_text, e.vector
                         FROM embeddings e
                         JOIN entities ent ON ent.id = e.entity_id
                         WHERE ent.project_id = ?1",
                    )
                    .map_err(|err| Error::SearchError { message: err.to_string() })?;
                let rows = stmt
                    .query_map(params![project_id], |row| {
                        let vector_json: String = row.get("vector")?;
                        Ok((row.get::<_, i64>("entity_id")?, row.get::<_, String>("chunk_text")?, vector_json))
                    })
                    .map_err(|err| Error::SearchError { message: err.to_string() })?;
                let mut out = Vec::new();
                for row in rows {
                    let (entity_id, chunk_text, vector_json) =
                        row.map_err(|err| Error::SearchError { message: err.to_string() })?;
                    let vector: Vec<f32> = serde_json::from_str(&vector_json).unwrap_or_default();
                    out.push(Candidate { entity_id, chunk_text, vector });
                }
                Ok(out)
            })
            .await?;

        let mut best_per_entity: std::collections::HashMap<i64, (f32, String)> = std::collections::HashMap::new();
        for c in candidates {
            let score = cosine_similarity(&query_vector, &c.vector);
            best_per_entity
                .entry(c.entity_id)
                .and_modify(|(best, text)| {
                    if score > *best {
                        *best = score;
                        *text = c.chunk_text.clone();
                    }
                })
                .or_insert((score, c.chunk_text));
        }

        let mut entity_ids: Vec<i64> = best_per_entity.keys().copied().collect();
        entity_ids.sort_by(|a, b| {
            best_per_entity[b].0.partial_cmp(&best_per_entity[a].0).unwrap_or(std::cmp::Ordering::Equal)
        });

        let page: Vec<i64> = entity_ids.into_iter().skip(offset).take(limit).collect();
        let page_for_lookup = page.clone();
        let entities = self
            .with_conn(move |conn| {
                let mut map = std::collections::HashMap::new();
                for id in &page_for_lookup {
                    if let Some(e) = crate::store::entities::get_by_id(conn, *id)? {
                        map.insert(*id, e);
                    }
                }
                Ok(map)
            })
            .await?;

        let mut results = Vec::new();
        for entity_id in page {
            let (score, snippet) = best_per_entity.remove(&entity_id).unwrap();
            if let Some(entity) = entities.get(&entity_id) {
                results.push(SearchResult {
                    entity_id,
                    permalink: entity.permalink.clone(),
                    title: entity.title.clone(),
                    snippet,
                    score,
                });
            }
        }
        Ok(results)
    }
}

/// Composes each row's indexed content: title + permalink +
/// category/relation_type + snippet. Chunking (for vector search) runs
/// over this composed text, not the raw body, so observations and
/// relations stay retrievable by their surrounding context rather than
/// only by their own short string.
fn compose_source_text(title: &str, permalink: &str, category_or_relation: Option<&str>, snippet: &str) -> String {
    let mut parts = vec![title.to_string(), permalink.to_string()];
    if let Some(c) = category_or_relation {
        parts.push(c.to_string());
    }
    parts.push(snippet.to_string());
    parts.join("\n")
}

/// Adds quotes around a term containing FTS5 special characters so it is
/// matched as a single token rather than parsed as query syntax.
fn quote_search_term(term: &str) -> String {
    const SPECIAL: &[char] = &['/', '*', '-', '.', ' ', '(', ')', '[', ']', '"', '\''];
    if term.chars().any(|c| SPECIAL.contains(&c)) {
        format!("\"{}\"", term.replace('"', "\"\""))
    } else {
        term.to_string()
    }
}

/// Combines FTS and vector rankings by summing normalized per-list rank
/// weights (reciprocal rank fusion), breaking ties toward the higher raw
/// score, then paginates.
fn fuse(fts: Vec<SearchResult>, vector: Vec<SearchResult>, limit: usize, offset: usize) -> Vec<SearchResult> {
    use std::collections::HashMap;

    const K: f32 = 60.0;
    let mut fused: HashMap<i64, (SearchResult, f32)> = HashMap::new();

    for (rank, result) in fts.into_iter().enumerate() {
        let weight = 1.0 / (K + rank as f32 + 1.0);
        fused.entry(result.entity_id).or_insert_with(|| (result.clone(), 0.0)).1 += weight;
    }
    for (rank, result) in vector.into_iter().enumerate() {
        let weight = 1.0 / (K + rank as f32 + 1.0);
        fused.entry(result.entity_id).or_insert_with(|| (result.clone(), 0.0)).1 += weight;
    }

    let mut combined: Vec<SearchResult> = fused
        .into_values()
        .map(|(mut result, fused_score)| {
            result.score = fused_score;
            result
        })
        .collect();
    combined.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    combined.into_iter().skip(offset).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Fields;

    async fn seeded_store() -> GraphStore {
        let store = GraphStore::in_memory().unwrap();
        let e1 = store
            .apply_note(crate::store::AppliedNote {
                project_id: 1,
                file_path: "a.md".into(),
                permalink: "a".into(),
                checksum: "sum".into(),
                title: "Apples".into(),
                entity_type: "note".into(),
                entity_metadata: Fields::new(),
                observations: vec![Observation::new("design", "grow on trees")],
                relations: vec![],
                now: Utc::now(),
            })
            .await
            .unwrap();
        let e2 = store
            .apply_note(crate::store::AppliedNote {
                project_id: 1,
                file_path: "b.md".into(),
                permalink: "b".into(),
                checksum: "sum".into(),
                title: "Oranges".into(),
                entity_type: "note".into(),
                entity_metadata: Fields::new(),
                observations: vec![],
                relations: vec![],
                now: Utc::now(),
            })
            .await
            .unwrap();

        let index = SearchIndex::new(&store);
        let obs1 = store.list_observations(e1.id).await.unwrap();
        index.index_entity(&e1, "Crisp red apples grow on trees.", &obs1, &[]).await.unwrap();
        index.index_entity(&e2, "Juicy oranges are citrus fruit.", &[], &[]).await.unwrap();
        store
    }

    #[tokio::test]
    async fn fts_search_finds_matching_entity() {
        let store = seeded_store().await;
        let index = SearchIndex::new(&store);
        let results = index.search(1, "apples", SearchMode::Fts, false, 10, 0).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Apples");
    }

    #[tokio::test]
    async fn fts_search_indexes_observations_as_separate_rows() {
        let store = seeded_store().await;
        let index = SearchIndex::new(&store);
        let results = index
            .search_filtered(1, "grow", SearchMode::Fts, &SearchFilters::default(), false, 10, 0)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Apples");
    }

    #[tokio::test]
    async fn row_type_filter_excludes_observation_rows() {
        let store = seeded_store().await;
        let index = SearchIndex::new(&store);
        let filters = SearchFilters { row_type: Some(RowType::Observation), ..Default::default() };
        let results = index.search_filtered(1, "apples", SearchMode::Fts, &filters, false, 10, 0).await.unwrap();
        assert!(results.is_empty());

        let filters = SearchFilters { row_type: Some(RowType::Entity), ..Default::default() };
        let results = index.search_filtered(1, "apples", SearchMode::Fts, &filters, false, 10, 0).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn delete_by_permalink_removes_entity_and_observation_rows() {
        let store = seeded_store().await;
        let index = SearchIndex::new(&store);
        index.delete_by_permalink(1, "a".into()).await.unwrap();
        let results = index.search(1, "apples", SearchMode::Fts, false, 10, 0).await.unwrap();
        assert!(results.is_empty());
        let results = index.search(1, "grow", SearchMode::Fts, false, 10, 0).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn vector_mode_without_config_flag_is_disabled() {
        let store = seeded_store().await;
        let index = SearchIndex::new(&store);
        let err = index.search(1, "apples", SearchMode::Vector, false, 10, 0).await.unwrap_err();
        assert!(matches!(err, Error::SemanticSearchDisabled));
    }

    #[tokio::test]
    async fn vector_mode_enabled_without_provider_is_missing_deps() {
        let store = seeded_store().await;
        let index = SearchIndex::new(&store);
        let err = index.search(1, "apples", SearchMode::Vector, true, 10, 0).await.unwrap_err();
        assert!(matches!(err, Error::SemanticDependenciesMissing { .. }));
    }

    #[test]
    fn quoting_wraps_terms_with_special_characters() {
        assert_eq!(quote_search_term("hello"), "hello");
        assert_eq!(quote_search_term("a/b"), "\"a/b\"");
    }

    #[test]
    fn row_type_round_trips_through_its_string_form() {
        assert_eq!(RowType::parse("observation").as_str(), "observation");
        assert_eq!(RowType::parse("relation").as_str(), "relation");
        assert_eq!(RowType::parse("entity").as_str(), "entity");
        assert_eq!(RowType::parse("anything-else").as_str(), "entity");
    }
}
