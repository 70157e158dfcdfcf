//! End-to-end tests driving the public `Engine`/`Project` surface: a
//! project registered against a real directory on disk, synced, searched,
//! and re-synced, the way the (out-of-scope) RPC layer would use it.

use basic_memory::config::Config;
use basic_memory::search::SearchMode;
use basic_memory::sync::SyncOptions;
use basic_memory::Engine;
use tempfile::TempDir;

async fn engine_for(dir: &TempDir) -> (Engine, i64) {
    let mut engine = Engine::new(Config::default());
    engine.register_project("notes", dir.path().to_path_buf(), true);
    let project = engine.project(None).await.unwrap();
    (engine, project.id)
}

#[tokio::test]
async fn round_trip_scenario() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("X.md"),
        "---\ntitle: X\n---\n# X\n\n- [note] hi #tag (ctx)\n- rel [[Y]]\n",
    )
    .unwrap();

    let (engine, project_id) = engine_for(&dir).await;
    let project = engine.project(None).await.unwrap();
    let mut sync = project.sync_engine(".bmignore");
    let report = sync.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(report.created, 1);
    assert!(report.errors.is_empty());

    let entities = project.store.list_entities(project_id).await.unwrap();
    assert_eq!(entities.len(), 1);
    let x = &entities[0];
    assert_eq!(x.permalink, "x");

    let observations = project.store.list_observations(x.id).await.unwrap();
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0].category, "note");
    assert_eq!(observations[0].content, "hi");
    assert_eq!(observations[0].tags, vec!["tag".to_string()]);
    assert_eq!(observations[0].context.as_deref(), Some("ctx"));

    let relations = project.store.list_outgoing_relations(x.id).await.unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].relation_type, "rel");
    assert_eq!(relations[0].to_name, "Y");
    assert!(relations[0].to_id.is_none());
}

#[tokio::test]
async fn late_resolution_scenario() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("X.md"), "---\ntitle: X\n---\n- rel [[Y]]\n").unwrap();

    let (engine, project_id) = engine_for(&dir).await;
    let project = engine.project(None).await.unwrap();
    let mut sync = project.sync_engine(".bmignore");
    sync.sync(SyncOptions::default()).await.unwrap();

    std::fs::write(dir.path().join("Y.md"), "---\ntitle: Y\n---\nbody\n").unwrap();
    sync.sync(SyncOptions::default()).await.unwrap();

    let entities = project.store.list_entities(project_id).await.unwrap();
    let x = entities.iter().find(|e| e.title == "X").unwrap();
    let y = entities.iter().find(|e| e.title == "Y").unwrap();
    let relations = project.store.list_outgoing_relations(x.id).await.unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].to_id, Some(y.id));
}

#[tokio::test]
async fn dataview_persistence_scenario() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("projects")).unwrap();
    for name in ["project-a", "project-b", "project-c"] {
        std::fs::write(
            dir.path().join(format!("projects/{name}.md")),
            format!("---\ntitle: {name}\ntype: project\n---\nbody\n"),
        )
        .unwrap();
    }
    std::fs::write(
        dir.path().join("index.md"),
        "---\ntitle: Index\n---\n```dataview\nLIST FROM \"projects\"\n```\n",
    )
    .unwrap();

    let (engine, project_id) = engine_for(&dir).await;
    let project = engine.project(None).await.unwrap();
    let mut sync = project.sync_engine(".bmignore");
    sync.sync(SyncOptions { force_full: true, include_dataview: true }).await.unwrap();

    let entities = project.store.list_entities(project_id).await.unwrap();
    let index = entities.iter().find(|e| e.title == "Index").unwrap();
    let links = project.store.list_outgoing_relations(index.id).await.unwrap();
    let dataview_links: Vec<_> = links.iter().filter(|r| r.is_dataview_link()).collect();
    assert_eq!(dataview_links.len(), 3);

    std::fs::write(
        dir.path().join("index.md"),
        "---\ntitle: Index\n---\n```dataview\nLIST FROM \"projects\" WHERE file.name = \"project-a.md\"\n```\n",
    )
    .unwrap();
    sync.sync(SyncOptions { force_full: true, include_dataview: true }).await.unwrap();

    let entities = project.store.list_entities(project_id).await.unwrap();
    let index = entities.iter().find(|e| e.title == "Index").unwrap();
    let links = project.store.list_outgoing_relations(index.id).await.unwrap();
    let dataview_links: Vec<_> = links.iter().filter(|r| r.is_dataview_link()).collect();
    assert_eq!(dataview_links.len(), 1);
}

#[tokio::test]
async fn move_scenario_preserves_id_and_relations() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("notes")).unwrap();
    std::fs::write(
        dir.path().join("notes/X.md"),
        "---\ntitle: X\n---\n- [note] hi\n- rel [[Y]]\n",
    )
    .unwrap();

    let (engine, project_id) = engine_for(&dir).await;
    let project = engine.project(None).await.unwrap();
    let mut sync = project.sync_engine(".bmignore");
    sync.sync(SyncOptions::default()).await.unwrap();

    let before = project.store.list_entities(project_id).await.unwrap();
    let id = before[0].id;

    std::fs::create_dir_all(dir.path().join("archive")).unwrap();
    std::fs::rename(dir.path().join("notes/X.md"), dir.path().join("archive/X.md")).unwrap();
    let report = sync.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(report.moved, 1);

    let after = project.store.list_entities(project_id).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, id);
    assert_eq!(after[0].file_path, "archive/X.md");
    assert_eq!(after[0].permalink, "archive/x");

    let observations = project.store.list_observations(id).await.unwrap();
    assert_eq!(observations.len(), 1);
    let relations = project.store.list_outgoing_relations(id).await.unwrap();
    assert_eq!(relations.len(), 1);
}

#[tokio::test]
async fn pagination_disjointness_scenario() {
    let dir = TempDir::new().unwrap();
    for i in 0..6 {
        std::fs::write(
            dir.path().join(format!("note-{i}.md")),
            format!("---\ntitle: Note {i}\n---\nsearchable payload {i}\n"),
        )
        .unwrap();
    }

    let (engine, project_id) = engine_for(&dir).await;
    let project = engine.project(None).await.unwrap();
    let mut sync = project.sync_engine(".bmignore");
    sync.sync(SyncOptions::default()).await.unwrap();

    let page1 = project.search.search(project_id, "payload", SearchMode::Fts, false, 3, 0).await.unwrap();
    let page2 = project.search.search(project_id, "payload", SearchMode::Fts, false, 3, 3).await.unwrap();
    assert_eq!(page1.len(), 3);
    assert_eq!(page2.len(), 3);

    let mut ids: Vec<i64> = page1.iter().chain(page2.iter()).map(|r| r.entity_id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 6);
}

#[tokio::test]
async fn resync_with_no_changes_reports_nothing() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("X.md"), "---\ntitle: X\n---\nbody\n").unwrap();

    let (engine, _project_id) = engine_for(&dir).await;
    let project = engine.project(None).await.unwrap();
    let mut sync = project.sync_engine(".bmignore");
    sync.sync(SyncOptions::default()).await.unwrap();

    let second = sync.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.deleted, 0);
    assert_eq!(second.moved, 0);
}

#[tokio::test]
async fn wsl_path_scenario_uses_forward_slashes_only() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("legal-research")).unwrap();
    std::fs::write(
        dir.path().join("legal-research/Legal Research.md"),
        "---\ntitle: Legal Research\n---\nbody\n",
    )
    .unwrap();

    let (engine, project_id) = engine_for(&dir).await;
    let project = engine.project(None).await.unwrap();
    let mut sync = project.sync_engine(".bmignore");
    sync.sync(SyncOptions::default()).await.unwrap();

    let entities = project.store.list_entities(project_id).await.unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].file_path, "legal-research/Legal Research.md");
    assert!(!entities[0].file_path.contains('\\'));
    assert!(!entities[0].file_path.starts_with('/'));
}

#[tokio::test]
async fn deleting_then_recreating_a_file_re_resolves_incoming_relations() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("X.md"), "---\ntitle: X\n---\n- rel [[Y]]\n").unwrap();
    std::fs::write(dir.path().join("Y.md"), "---\ntitle: Y\n---\nbody\n").unwrap();

    let (engine, project_id) = engine_for(&dir).await;
    let project = engine.project(None).await.unwrap();
    let mut sync = project.sync_engine(".bmignore");
    sync.sync(SyncOptions::default()).await.unwrap();

    std::fs::remove_file(dir.path().join("Y.md")).unwrap();
    sync.sync(SyncOptions::default()).await.unwrap();

    let entities = project.store.list_entities(project_id).await.unwrap();
    let x = entities.iter().find(|e| e.title == "X").unwrap();
    let relations = project.store.list_outgoing_relations(x.id).await.unwrap();
    assert_eq!(relations.len(), 1);
    assert!(relations[0].to_id.is_none());
    assert_eq!(relations[0].to_name, "Y");

    std::fs::write(dir.path().join("Y.md"), "---\ntitle: Y\n---\nbody\n").unwrap();
    sync.sync(SyncOptions::default()).await.unwrap();

    let entities = project.store.list_entities(project_id).await.unwrap();
    let x = entities.iter().find(|e| e.title == "X").unwrap();
    let y = entities.iter().find(|e| e.title == "Y").unwrap();
    let relations = project.store.list_outgoing_relations(x.id).await.unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].to_id, Some(y.id));
}
