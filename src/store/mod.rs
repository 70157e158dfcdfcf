//! The derived graph store: one `rusqlite` database per project, holding
//! entities, observations, and relations. Generalizes a git-backed
//! `Repository`/`Transaction` and a document `Collection` type into a
//! single embedded SQL store — there is no remote to push/pull and no
//! concurrent writer to merge against, so the transactional *shape* is
//! kept but re-targeted from git commits to SQL transactions.
//!
//! `rusqlite::Connection` is `!Sync`, so every operation runs on the
//! blocking thread pool via `tokio::task::spawn_blocking`, the same
//! suspension-point discipline the rest of the crate uses for `tokio::fs`.

pub mod entities;
pub mod observations;
pub mod relations;
mod transaction;

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::task;

use crate::error::{Error, Result};
use crate::model::{Entity, Fields, Observation, Relation};

#[derive(Clone)]
pub struct GraphStore {
    conn: Arc<Mutex<Connection>>,
}

/// Runs `f` against a shared connection on the blocking thread pool.
/// Shared by [`GraphStore`] and `crate::search::SearchIndex`, which hold
/// handles to the same underlying database.
pub(crate) async fn run_blocking<T, F>(conn: Arc<Mutex<Connection>>, f: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(move || {
        let guard = conn.lock().expect("graph store mutex poisoned");
        f(&guard)
    })
    .await
    .map_err(|e| Error::StoreError { message: e.to_string() })?
}

impl GraphStore {
    /// Opens (creating if absent) the SQLite database at `db_path` and
    /// applies the schema. Safe to call repeatedly; DDL is idempotent.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let path = db_path.to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|source| Error::FileError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::open(&path).map_err(|e| Error::StoreError { message: e.to_string() })?;
            conn.execute_batch(include_str!("schema.sql"))
                .map_err(|e| Error::StoreError { message: e.to_string() })?;
            Ok(conn)
        })
        .await
        .map_err(|e| Error::StoreError { message: e.to_string() })??;

        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::StoreError { message: e.to_string() })?;
        conn.execute_batch(include_str!("schema.sql")).map_err(|e| Error::StoreError { message: e.to_string() })?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        run_blocking(self.conn.clone(), f).await
    }

    /// Shares this store's connection with another subsystem backed by the
    /// same database file (the search index lives in the same schema).
    pub(crate) fn conn_handle(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    async fn with_txn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let mut guard = conn.lock().expect("graph store mutex poisoned");
            transaction::run(&mut guard, f)
        })
        .await
        .map_err(|e| Error::StoreError { message: e.to_string() })?
    }

    pub async fn list_entities(&self, project_id: i64) -> Result<Vec<Entity>> {
        self.with_conn(move |c| entities::list_entities(c, project_id)).await
    }

    pub async fn get_entity_types(&self, project_id: i64) -> Result<Vec<String>> {
        self.with_conn(move |c| entities::get_entity_types(c, project_id)).await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Entity>> {
        self.with_conn(move |c| entities::get_by_id(c, id)).await
    }

    pub async fn get_by_permalink(&self, project_id: i64, permalink: String) -> Result<Option<Entity>> {
        self.with_conn(move |c| entities::get_by_permalink(c, project_id, &permalink)).await
    }

    pub async fn get_by_title(&self, project_id: i64, title: String) -> Result<Option<Entity>> {
        self.with_conn(move |c| entities::get_by_title(c, project_id, &title)).await
    }

    pub async fn get_by_file_path(&self, project_id: i64, file_path: String) -> Result<Option<Entity>> {
        self.with_conn(move |c| entities::get_by_file_path(c, project_id, &file_path)).await
    }

    pub async fn list_observations(&self, entity_id: i64) -> Result<Vec<Observation>> {
        self.with_conn(move |c| observations::list_for_entity(c, entity_id)).await
    }

    pub async fn list_outgoing_relations(&self, from_id: i64) -> Result<Vec<Relation>> {
        self.with_conn(move |c| relations::list_outgoing(c, from_id)).await
    }

    pub async fn list_incoming_relations(&self, to_id: i64) -> Result<Vec<Relation>> {
        self.with_conn(move |c| relations::list_incoming(c, to_id)).await
    }

    pub async fn list_unresolved_relations(&self, project_id: i64) -> Result<Vec<Relation>> {
        self.with_conn(move |c| relations::list_unresolved(c, project_id)).await
    }

    pub async fn resolve_relation(&self, relation_id: i64, to_id: i64) -> Result<()> {
        self.with_conn(move |c| relations::set_to_id(c, relation_id, to_id)).await
    }

    /// Replaces `from_id`'s set of `dataview_link` relations. The only
    /// caller is `crate::sync::dataview_refresh`.
    pub async fn replace_dataview_links(&self, from_id: i64, relations: Vec<Relation>) -> Result<()> {
        self.with_conn(move |c| relations::replace_dataview_links(c, from_id, &relations)).await
    }

    pub async fn delete_entity(&self, id: i64) -> Result<()> {
        self.with_conn(move |c| entities::delete_entity(c, id)).await
    }

    pub async fn delete_by_permalinks(&self, project_id: i64, permalinks: Vec<String>) -> Result<Vec<Entity>> {
        self.with_conn(move |c| entities::delete_by_permalinks(c, project_id, &permalinks)).await
    }

    pub async fn find_by_file_paths(&self, project_id: i64, file_paths: Vec<String>) -> Result<Vec<Entity>> {
        self.with_conn(move |c| entities::find_by_file_paths(c, project_id, &file_paths)).await
    }

    pub async fn delete_by_file_paths(&self, project_id: i64, file_paths: Vec<String>) -> Result<Vec<Entity>> {
        self.with_conn(move |c| entities::delete_by_file_paths(c, project_id, &file_paths)).await
    }

    pub async fn rename_entity(&self, entity_id: i64, new_file_path: String, new_permalink: String) -> Result<Entity> {
        self.with_conn(move |c| entities::rename_entity(c, entity_id, &new_file_path, &new_permalink)).await
    }

    /// Applies one parsed note in a single transaction: upserts the
    /// entity (by `file_path`, disambiguating `permalink` on collision),
    /// then replaces its observations and authored relations. Relations
    /// are inserted with `to_id: None`; a later pass over
    /// [`list_unresolved_relations`] resolves them once the whole project
    /// has been scanned.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_note(&self, note: AppliedNote) -> Result<Entity> {
        self.with_txn(move |txn| {
            let existing = entities::get_by_file_path(txn, note.project_id, &note.file_path)?;
            let entity = match existing {
                Some(existing) => {
                    let updated = Entity {
                        id: existing.id,
                        project_id: note.project_id,
                        title: note.title,
                        entity_type: note.entity_type,
                        content_type: "text/markdown".to_string(),
                        file_path: note.file_path,
                        permalink: note.permalink,
                        checksum: note.checksum,
                        created_at: existing.created_at,
                        updated_at: note.now,
                        entity_metadata: note.entity_metadata,
                    };
                    entities::update_entity(txn, existing.id, updated)?
                }
                None => {
                    let new_entity = Entity::new(
                        note.project_id,
                        note.title,
                        note.entity_type,
                        note.file_path,
                        note.permalink,
                        note.checksum,
                        note.entity_metadata,
                        note.now,
                    );
                    entities::insert_entity(txn, new_entity)?
                }
            };
            observations::replace_for_entity(txn, entity.id, &note.observations)?;
            let mut relations = note.relations;
            for r in &mut relations {
                r.from_id = entity.id;
            }
            relations::replace_authored(txn, entity.id, &relations)?;
            Ok(entity)
        })
        .await
    }
}

/// Input to [`GraphStore::apply_note`] — the output of `markdown::parse`
/// plus the facts only the sync engine knows (project id, checksum,
/// permalink, timestamp).
pub struct AppliedNote {
    pub project_id: i64,
    pub file_path: String,
    pub permalink: String,
    pub checksum: String,
    pub title: String,
    pub entity_type: String,
    pub entity_metadata: Fields,
    pub observations: Vec<Observation>,
    pub relations: Vec<Relation>,
    pub now: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Fields;

    fn sample_note(path: &str, permalink: &str) -> AppliedNote {
        AppliedNote {
            project_id: 1,
            file_path: path.to_string(),
            permalink: permalink.to_string(),
            checksum: "sum".to_string(),
            title: "Title".to_string(),
            entity_type: "note".to_string(),
            entity_metadata: Fields::new(),
            observations: vec![Observation::new("note", "hi")],
            relations: vec![Relation::new(0, "Other", "links_to")],
            now: Utc::now(),
        }
    }

    #[tokio::test]
    async fn apply_note_inserts_then_updates_in_place() {
        let store = GraphStore::in_memory().unwrap();
        let first = store.apply_note(sample_note("a.md", "a")).await.unwrap();
        assert_eq!(first.title, "Title");
        assert_eq!(store.list_observations(first.id).await.unwrap().len(), 1);
        assert_eq!(store.list_outgoing_relations(first.id).await.unwrap().len(), 1);

        let mut second = sample_note("a.md", "a");
        second.title = "Renamed".to_string();
        let updated = store.apply_note(second).await.unwrap();
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.title, "Renamed");
        assert_eq!(store.list_entities(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn apply_note_disambiguates_permalink_across_files() {
        let store = GraphStore::in_memory().unwrap();
        let a = store.apply_note(sample_note("a.md", "dup")).await.unwrap();
        let b = store.apply_note(sample_note("b.md", "dup")).await.unwrap();
        assert_eq!(a.permalink, "dup");
        assert_eq!(b.permalink, "dup-2");
    }
}
