//! The sync engine: reconciles a project's directory tree with its graph
//! store and search index. Generalizes the mutate-then-commit pattern of
//! a git-backed `executor` module, minus the git commit — there is no
//! remote to push/pull and no concurrent writer to merge against, so
//! each file is applied in one SQL transaction instead of one git
//! commit.
//!
//! Move detection is best-effort: it only catches a delete and a new
//! file sharing a checksum within the *same* scan. A rename with a
//! simultaneous edit is not detected as a move and appears as
//! delete+create. This is a documented limitation, not a bug to work
//! around with content-diffing heuristics.

pub mod dataview_refresh;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::fileio;
use crate::markdown;
use crate::model::Entity;
use crate::resolver::ResolverIndex;
use crate::search::embedding::EmbeddingProvider;
use crate::search::{chunk, SearchIndex};
use crate::store::{AppliedNote, GraphStore};
use dataview_refresh::{ImpactCache, RefreshLocks};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Ignore the normal incremental change set and re-scan/re-derive
    /// everything, including forcing a Dataview refresh of every
    /// Dataview-bearing entity (`force_refresh_all`).
    pub force_full: bool,
    pub include_dataview: bool,
}

#[derive(Debug, Clone)]
pub struct SyncFileError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub moved: usize,
    pub dataview_refreshed: usize,
    pub errors: Vec<SyncFileError>,
}

/// One project's sync context: the graph store, the search index sharing
/// its connection, and the filesystem root they're kept in agreement
/// with. Owns the Dataview impact-analysis cache across calls to `sync`.
pub struct SyncEngine {
    store: GraphStore,
    search: SearchIndex,
    project_id: i64,
    project_root: PathBuf,
    ignore_file_name: String,
    impact_cache: ImpactCache,
    refresh_locks: RefreshLocks,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl SyncEngine {
    pub fn new(
        store: GraphStore,
        search: SearchIndex,
        project_id: i64,
        project_root: PathBuf,
        ignore_file_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            search,
            project_id,
            project_root,
            ignore_file_name: ignore_file_name.into(),
            impact_cache: ImpactCache::new(),
            refresh_locks: RefreshLocks::new(),
            embedder: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Full scan: walks the project directory, diffs against the graph
    /// store, and applies deletes, then new files, then modified files,
    /// within one transaction per file — that ordering is safe to replay
    /// a move as delete+add.
    #[tracing::instrument(name = "sync_batch", skip(self, options), fields(project_id = self.project_id, force_full = options.force_full))]
    pub async fn sync(&mut self, options: SyncOptions) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        let fs_state = self.scan_filesystem().await?;
        let db_state = self.load_db_state().await?;

        let fs_paths: HashSet<&String> = fs_state.keys().collect();
        let db_paths: HashSet<&String> = db_state.keys().collect();

        let mut new_paths: Vec<String> = fs_paths.difference(&db_paths).map(|s| (*s).clone()).collect();
        let mut deleted_paths: Vec<String> = db_paths.difference(&fs_paths).map(|s| (*s).clone()).collect();
        let modified_paths: Vec<String> = fs_paths
            .intersection(&db_paths)
            .filter(|p| fs_state[**p] != db_state[**p].checksum)
            .map(|s| (*s).clone())
            .collect();

        let moves = detect_moves(&fs_state, &db_state, &new_paths, &deleted_paths);
        let moved_new: HashSet<&String> = moves.iter().map(|m| &m.new_path).collect();
        let moved_deleted: HashSet<&String> = moves.iter().map(|m| &m.old_path).collect();
        new_paths.retain(|p| !moved_new.contains(p));
        deleted_paths.retain(|p| !moved_deleted.contains(p));

        let mut changed_paths = Vec::new();
        let mut changed_folders = Vec::new();

        for mv in &moves {
            let entity_id = db_state[&mv.old_path].entity_id;
            let old_permalink = db_state[&mv.old_path].permalink.clone();
            let new_permalink = markdown::derive_permalink(&mv.new_path);
            match self.store.rename_entity(entity_id, mv.new_path.clone(), new_permalink.clone()).await {
                Ok(entity) => {
                    let _ = self.search.delete_by_permalink(self.project_id, old_permalink).await;
                    if let Err(e) = self.reindex_entity(&entity).await {
                        report.errors.push(SyncFileError { path: mv.new_path.clone(), message: e.to_string() });
                    }
                    report.moved += 1;
                    changed_paths.push(mv.new_path.clone());
                    note_folder(&mv.new_path, &mut changed_folders);
                }
                Err(e) => report.errors.push(SyncFileError { path: mv.new_path.clone(), message: e.to_string() }),
            }
        }

        for path in &deleted_paths {
            let permalink = db_state[path].permalink.clone();
            match self.store.delete_by_file_paths(self.project_id, vec![path.clone()]).await {
                Ok(_) => {
                    let _ = self.search.delete_by_permalink(self.project_id, permalink).await;
                    debug!(path = %path, "entity deleted");
                    report.deleted += 1;
                    changed_paths.push(path.clone());
                    note_folder(path, &mut changed_folders);
                }
                Err(e) => report.errors.push(SyncFileError { path: path.clone(), message: e.to_string() }),
            }
        }

        for path in new_paths.iter().chain(modified_paths.iter()) {
            match self.apply_file(path).await {
                Ok(()) => {
                    if db_state.contains_key(path) {
                        report.updated += 1;
                    } else {
                        report.created += 1;
                    }
                    debug!(path = %path, "file applied");
                    changed_paths.push(path.clone());
                    note_folder(path, &mut changed_folders);
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "failed to apply file");
                    report.errors.push(SyncFileError { path: path.clone(), message: e.to_string() });
                }
            }
        }

        self.resolve_unresolved_relations().await?;

        if options.include_dataview {
            report.dataview_refreshed =
                self.refresh_dataview(&options, &changed_paths, &changed_folders).await?;
        }

        info!(
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            moved = report.moved,
            dataview_refreshed = report.dataview_refreshed,
            errors = report.errors.len(),
            "sync batch complete"
        );

        Ok(report)
    }

    /// Walks the tree on the blocking thread pool — directory walking and
    /// checksumming are CPU/IO-bound and must not occupy an async worker
    /// thread, the same suspension-point discipline `fileio`/`store` use.
    async fn scan_filesystem(&self) -> Result<HashMap<String, String>> {
        let project_root = self.project_root.clone();
        let ignore_file_name = self.ignore_file_name.clone();
        tokio::task::spawn_blocking(move || -> Result<HashMap<String, String>> {
            let matcher = fileio::load_ignore_file(&project_root, &ignore_file_name)?;
            let mut fs_state = HashMap::new();

            for entry in walkdir::WalkDir::new(&project_root).into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();
                let is_dir = entry.file_type().is_dir();
                if fileio::should_ignore(&matcher, path, is_dir) {
                    continue;
                }
                if is_dir || path.extension().map(|e| e != "md").unwrap_or(true) {
                    continue;
                }
                let rel = path.strip_prefix(&project_root).unwrap_or(path);
                let rel_path = fileio::normalize_path(&rel.to_string_lossy());
                let bytes = std::fs::read(path).map_err(|source| crate::error::Error::FileError {
                    path: path.to_path_buf(),
                    source,
                })?;
                fs_state.insert(rel_path, fileio::checksum(&bytes));
            }
            Ok(fs_state)
        })
        .await
        .map_err(|e| crate::error::Error::SyncError { path: self.project_root.clone(), message: e.to_string() })?
    }

    async fn load_db_state(&self) -> Result<HashMap<String, DbEntity>> {
        let entities = self.store.list_entities(self.project_id).await?;
        Ok(entities
            .into_iter()
            .map(|e| {
                (
                    e.file_path.clone(),
                    DbEntity { entity_id: e.id, checksum: e.checksum, permalink: e.permalink },
                )
            })
            .collect())
    }

    async fn apply_file(&self, rel_path: &str) -> Result<()> {
        let full_path = self.project_root.join(rel_path);
        let (bytes, checksum) = fileio::read(&full_path).await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let parsed = markdown::parse(&text, Path::new(rel_path))?;
        let permalink = parsed.permalink.unwrap_or_else(|| markdown::derive_permalink(rel_path));

        let note = AppliedNote {
            project_id: self.project_id,
            file_path: rel_path.to_string(),
            permalink,
            checksum,
            title: parsed.title,
            entity_type: parsed.entity_type,
            entity_metadata: parsed.entity_metadata(),
            observations: parsed.observations,
            relations: parsed.relations,
            now: chrono::Utc::now(),
        };
        let entity = self.store.apply_note(note).await?;

        let observations = self.store.list_observations(entity.id).await?;
        let relations = self.store.list_outgoing_relations(entity.id).await?;
        self.search.index_entity(&entity, &parsed.body, &observations, &relations).await?;

        if let Some(embedder) = &self.embedder {
            let chunks = chunk::chunk_body(&parsed.body);
            let mut embedded = Vec::with_capacity(chunks.len());
            for c in chunks {
                let vector = embedder.embed(&c.text).await?;
                embedded.push((c, vector));
            }
            self.search.replace_embeddings(entity.id, embedded).await?;
        }

        Ok(())
    }

    async fn reindex_entity(&self, entity: &Entity) -> Result<()> {
        let full_path = self.project_root.join(&entity.file_path);
        let (bytes, _) = fileio::read(&full_path).await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let parsed = markdown::parse(&text, Path::new(&entity.file_path))?;
        let observations = self.store.list_observations(entity.id).await?;
        let relations = self.store.list_outgoing_relations(entity.id).await?;
        self.search.index_entity(entity, &parsed.body, &observations, &relations).await
    }

    /// Re-resolves every unresolved relation in the project against the
    /// current entity set, run once per batch rather than once per
    /// applied file.
    async fn resolve_unresolved_relations(&self) -> Result<()> {
        let unresolved = self.store.list_unresolved_relations(self.project_id).await?;
        if unresolved.is_empty() {
            return Ok(());
        }
        let entities = self.store.list_entities(self.project_id).await?;
        let index = ResolverIndex::build(&entities);
        for relation in unresolved {
            if let Some(to_id) = index.resolve(&relation.to_name) {
                self.store.resolve_relation(relation.id, to_id).await?;
                debug!(relation_id = relation.id, to_id, target = %relation.to_name, "relation resolved");
            }
        }
        Ok(())
    }

    /// Reads every current entity's body to build the note corpus
    /// Dataview blocks execute against, then refreshes only the
    /// impacted subset.
    #[tracing::instrument(name = "dataview_refresh", skip(self, options, changed_paths, changed_folders), fields(project_id = self.project_id))]
    async fn refresh_dataview(
        &mut self,
        options: &SyncOptions,
        changed_paths: &[String],
        changed_folders: &[String],
    ) -> Result<usize> {
        let entities = self.store.list_entities(self.project_id).await?;
        let mut bodies = Vec::with_capacity(entities.len());
        for entity in &entities {
            let full_path = self.project_root.join(&entity.file_path);
            let body = match fileio::read(&full_path).await {
                Ok((bytes, _)) => markdown::parse(&String::from_utf8_lossy(&bytes), Path::new(&entity.file_path))
                    .map(|p| p.body)
                    .unwrap_or_default(),
                Err(_) => String::new(),
            };
            bodies.push((entity.id, body));
        }

        let impacted = if options.force_full {
            self.impact_cache.all_dataview_entities(bodies.iter().map(|(id, b)| (*id, b.as_str())))
        } else {
            self.impact_cache.impacted(bodies.iter().map(|(id, b)| (*id, b.as_str())), changed_paths, changed_folders)
        };
        if impacted.is_empty() {
            return Ok(0);
        }

        let index = ResolverIndex::build(&entities);
        let body_by_id: HashMap<i64, &str> = bodies.iter().map(|(id, b)| (*id, b.as_str())).collect();
        let notes: Vec<dataview::NoteRecord> = entities
            .iter()
            .map(|e| {
                let body = body_by_id.get(&e.id).copied().unwrap_or_default();
                dataview_refresh::entity_to_note_record(e, body, &[], None)
            })
            .collect();

        let mut refreshed = 0;
        for entity in entities.iter().filter(|e| impacted.contains(&e.id)) {
            let body = body_by_id.get(&entity.id).copied().unwrap_or_default();
            let host = dataview_refresh::entity_to_note_record(entity, body, &[], None);
            dataview_refresh::refresh_entity(
                &self.store,
                &self.refresh_locks,
                entity.id,
                &host,
                body,
                &notes,
                &index,
            )
            .await?;
            refreshed += 1;
        }
        Ok(refreshed)
    }
}

struct DbEntity {
    entity_id: i64,
    checksum: String,
    permalink: String,
}

struct Move {
    old_path: String,
    new_path: String,
}

/// Matches a deleted path against a new path sharing the same checksum
/// within this scan. Best-effort move detection.
fn detect_moves(
    fs_state: &HashMap<String, String>,
    db_state: &HashMap<String, DbEntity>,
    new_paths: &[String],
    deleted_paths: &[String],
) -> Vec<Move> {
    let mut moves = Vec::new();
    let mut used_new = HashSet::new();

    for old_path in deleted_paths {
        let old_checksum = &db_state[old_path].checksum;
        if let Some(new_path) = new_paths
            .iter()
            .find(|p| !used_new.contains(*p) && &fs_state[p.as_str()] == old_checksum)
        {
            used_new.insert(new_path.clone());
            moves.push(Move { old_path: old_path.clone(), new_path: new_path.clone() });
        }
    }
    moves
}

fn note_folder(path: &str, folders: &mut Vec<String>) {
    if let Some(parent) = Path::new(path).parent() {
        let folder = parent.to_string_lossy().into_owned();
        if !folder.is_empty() && !folders.contains(&folder) {
            folders.push(folder);
        }
    }
}
