//! Basic Memory: a local-first knowledge system that treats a directory
//! tree of Markdown notes as the single source of truth, deriving a
//! queryable knowledge graph, a full-text-plus-vector search index, and
//! an embedded Dataview query language from it — kept in agreement with
//! disk by a bidirectional sync engine and a debounced file watcher.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Basic Memory Engine                        │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐    │
//! │  │  Dataview   │  │   Watch     │  │   Schema Engine          │    │
//! │  │  Query Lang │  │   Service   │  │   (Picoschema)           │    │
//! │  └──────┬──────┘  └──────┬──────┘  └───────────┬──────────────┘    │
//! │         │                │                     │                  │
//! │         ▼                ▼                     ▼                  │
//! │  ┌─────────────────────────────────────────────────────────────┐  │
//! │  │                      Sync Engine                             │  │
//! │  │  (scan, diff, apply create/update/move/delete, resolve)      │  │
//! │  └──────────────────────────┬──────────────────────────────────┘  │
//! │                             │                                     │
//! │                             ▼                                     │
//! │  ┌─────────────────────────────────────────────────────────────┐  │
//! │  │                       Storage Layer                          │  │
//! │  │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │  │
//! │  │  │ Graph Store │  │  Search     │  │  Link Resolver      │  │  │
//! │  │  │ (entities)  │  │  Index      │  │  (wikilinks)        │  │  │
//! │  │  └──────┬──────┘  └──────┬──────┘  └──────────┬──────────┘  │  │
//! │  └─────────┼────────────────┼────────────────────┼─────────────┘  │
//! │            │                │                    │                │
//! │            ▼                ▼                    ▼                │
//! │  ┌─────────────────────────────────────────────────────────────┐  │
//! │  │             File System (Markdown + Canvas files)             │  │
//! │  │  project_root/**/*.md   project_root/**/*.canvas              │  │
//! │  └─────────────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

pub mod canvas;
pub mod config;
pub mod error;
pub mod fileio;
pub mod markdown;
pub mod memory_url;
pub mod model;
pub mod resolver;
pub mod schema;
pub mod search;
pub mod store;
pub mod sync;
pub mod validation;
pub mod watch;

pub use error::{Error, Result};

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use config::Config;
use model::ProjectConfig;
use schema::SchemaEngine;
use search::SearchIndex;
use store::GraphStore;
use sync::SyncEngine;
use watch::WatchService;

/// One project's live handles, opened once and reused across CLI
/// invocations or watch-loop iterations: the graph store, a search
/// index sharing its connection, and the schema engine built on both.
pub struct Project {
    pub id: i64,
    pub config: ProjectConfig,
    pub store: GraphStore,
    pub search: SearchIndex,
    pub schema: SchemaEngine,
}

impl Project {
    async fn open(id: i64, config: ProjectConfig, database_path: &std::path::Path) -> Result<Self> {
        let store = GraphStore::open(database_path).await?;
        let search = SearchIndex::new(&store);
        let schema = SchemaEngine::new(store.clone());
        Ok(Self { id, config, store, search, schema })
    }

    /// A fresh sync engine bound to this project's handles and the
    /// project's own ignore-file name. Cheap to construct — callers
    /// build one per `sync` call or watch-loop restart rather than
    /// holding it across a config reload.
    pub fn sync_engine(&self, ignore_file_name: impl Into<String>) -> SyncEngine {
        SyncEngine::new(self.store.clone(), SearchIndex::new(&self.store), self.id, self.config.path.clone(), ignore_file_name)
    }

    pub fn watch_service(&self, debounce_ms: u64) -> WatchService {
        WatchService::new(self.config.path.clone(), debounce_ms)
    }
}

/// Derives a stable project id from its name: deterministic across
/// process restarts, unlike a per-run counter, which matters once
/// `database_url` points several projects at one shared SQLite file
/// (the normal case of one database file per project never revisits
/// this id once opened, so any stable mapping would do).
fn stable_project_id(name: &str) -> i64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    name.hash(&mut hasher);
    (hasher.finish() & 0x7fff_ffff_ffff_ffff) as i64
}

/// Aggregates every project named in the loaded config behind one entry
/// point. Projects are opened lazily on first access and cached for the
/// life of the `Engine`.
pub struct Engine {
    config: Config,
    projects: Mutex<HashMap<String, Arc<Project>>>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self { config, projects: Mutex::new(HashMap::new()) }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn project_names(&self) -> Vec<String> {
        self.config.projects.keys().cloned().collect()
    }

    /// Registers a new project in the in-memory config (callers persist
    /// it with [`Engine::save_config`] to survive a restart).
    pub fn register_project(&mut self, name: impl Into<String>, path: PathBuf, is_default: bool) {
        self.config.projects.insert(
            name.into(),
            config::ProjectEntry { path, mode: model::ProjectMode::Local, is_default },
        );
    }

    /// Writes the current config back out as TOML.
    pub async fn save_config(&self, path: &std::path::Path) -> Result<()> {
        let text = toml::to_string_pretty(&self.config).map_err(|e| Error::ConfigError { message: e.to_string() })?;
        fileio::write_atomic(path, &text).await?;
        Ok(())
    }

    /// Resolves `name` (or the configured default project when `None`)
    /// and returns its opened handles, opening them on first use.
    pub async fn project(&self, name: Option<&str>) -> Result<Arc<Project>> {
        let name = match name {
            Some(n) => n.to_string(),
            None => self
                .config
                .default_project_name()
                .map(|s| s.to_string())
                .ok_or_else(|| Error::ProjectNotFound { name: "<no default configured>".to_string() })?,
        };

        let mut projects = self.projects.lock().await;
        if let Some(project) = projects.get(&name) {
            return Ok(project.clone());
        }

        let project_config = self.config.project(&name)?;
        let database_path = self.config.database_path(&project_config);
        let id = stable_project_id(&name);
        let project = Arc::new(Project::open(id, project_config, &database_path).await?);
        projects.insert(name, project.clone());
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_project_id_is_deterministic() {
        assert_eq!(stable_project_id("work"), stable_project_id("work"));
        assert_ne!(stable_project_id("work"), stable_project_id("personal"));
    }

    #[tokio::test]
    async fn opening_an_unregistered_project_is_not_found() {
        let engine = Engine::new(Config::default());
        let result = engine.project(Some("missing")).await;
        assert!(matches!(result, Err(Error::ProjectNotFound { .. })));
    }

    #[tokio::test]
    async fn opening_the_same_project_twice_returns_the_cached_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(Config::default());
        engine.register_project("work", dir.path().to_path_buf(), true);

        let first = engine.project(None).await.unwrap();
        let second = engine.project(Some("work")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(Arc::ptr_eq(&first, &second));
    }
}
