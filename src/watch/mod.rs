//! The watch service: a debounced `notify` watcher that coalesces
//! filesystem bursts into a single sync trigger per project. Grounded on
//! the cancel-and-restart debounce idiom already used by
//! `sync::dataview_refresh::DebounceGate`, adapted here to a
//! long-running event loop rather than a per-call gate.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::sync::{SyncEngine, SyncOptions};

const EVENT_LOG_CAPACITY: usize = 200;
const POLL_INTERVAL_MS: u64 = 50;

/// One coalesced batch of filesystem changes. `sync::SyncEngine::sync`
/// re-derives this set itself via a full diff, so nothing here is fed
/// back into it directly — it exists for status introspection and as
/// the shape a future incremental-sync path would consume.
#[derive(Debug, Clone, Default)]
pub struct Changes {
    pub created: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub moved: Vec<(String, String)>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty() && self.moved.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: String,
    pub kind: String,
    pub observed_at: DateTime<Utc>,
}

/// A rolling, bounded log of raw FS events for `status` introspection.
/// Oldest entries fall off once `capacity` is exceeded.
struct EventLog {
    capacity: usize,
    entries: Mutex<VecDeque<WatchEvent>>,
}

impl EventLog {
    fn new(capacity: usize) -> Self {
        Self { capacity, entries: Mutex::new(VecDeque::with_capacity(capacity)) }
    }

    fn record(&self, event: WatchEvent) {
        let mut entries = self.entries.lock().expect("event log poisoned");
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(event);
    }

    fn recent(&self) -> Vec<WatchEvent> {
        self.entries.lock().expect("event log poisoned").iter().cloned().collect()
    }
}

#[derive(Debug, Clone)]
pub struct WatchStatus {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub recent_events: Vec<WatchEvent>,
}

/// Owns one project's filesystem subscription. `pid`/`started_at` are
/// captured in `new`, not at some shared default, so two instances in
/// the same process never report each other's uptime.
pub struct WatchService {
    project_root: PathBuf,
    debounce: Duration,
    pid: u32,
    started_at: DateTime<Utc>,
    event_log: Arc<EventLog>,
}

fn event_kind_label(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::Create(_) => "create",
        EventKind::Modify(_) => "modify",
        EventKind::Remove(_) => "remove",
        EventKind::Access(_) => "access",
        _ => "other",
    }
}

impl WatchService {
    pub fn new(project_root: PathBuf, debounce_ms: u64) -> Self {
        Self {
            project_root,
            debounce: Duration::from_millis(debounce_ms),
            pid: std::process::id(),
            started_at: Utc::now(),
            event_log: Arc::new(EventLog::new(EVENT_LOG_CAPACITY)),
        }
    }

    pub fn status(&self) -> WatchStatus {
        WatchStatus { pid: self.pid, started_at: self.started_at, recent_events: self.event_log.recent() }
    }

    fn start_watcher(&self) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<notify::Result<Event>>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| Error::WatchError { message: e.to_string() })?;
        watcher
            .watch(&self.project_root, RecursiveMode::Recursive)
            .map_err(|e| Error::WatchError { message: e.to_string() })?;
        Ok((watcher, rx))
    }

    /// Runs until `shutdown` fires, debouncing raw FS events into sync
    /// triggers. A transient watch error (the backend races ENOENT/EACCES
    /// against a rapid create-then-delete) re-establishes the watch on
    /// the project root rather than terminating the loop.
    pub async fn run(
        &self,
        sync_engine: Arc<tokio::sync::Mutex<SyncEngine>>,
        mut shutdown: tokio::sync::oneshot::Receiver<()>,
    ) -> Result<()> {
        let (mut watcher, mut rx) = self.start_watcher()?;
        let mut pending_since: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(project = %self.project_root.display(), "watch service shutting down");
                    break;
                }
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(Ok(event)) => {
                            for path in &event.paths {
                                self.event_log.record(WatchEvent {
                                    path: path.to_string_lossy().into_owned(),
                                    kind: event_kind_label(&event.kind).to_string(),
                                    observed_at: Utc::now(),
                                });
                            }
                            pending_since.get_or_insert_with(Instant::now);
                        }
                        Some(Err(err)) => {
                            warn!(error = %err, "watch backend error, re-scanning subtree");
                            match self.start_watcher() {
                                Ok((new_watcher, new_rx)) => {
                                    watcher = new_watcher;
                                    rx = new_rx;
                                    pending_since.get_or_insert_with(Instant::now);
                                }
                                Err(e) => error!(error = %e, "failed to re-establish watch"),
                            }
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)), if pending_since.is_some() => {
                    if pending_since.map(|t| t.elapsed() >= self.debounce).unwrap_or(false) {
                        pending_since = None;
                        self.trigger_sync(&sync_engine).await;
                    }
                }
            }
        }

        drop(watcher);
        Ok(())
    }

    async fn trigger_sync(&self, sync_engine: &Arc<tokio::sync::Mutex<SyncEngine>>) {
        let mut engine = sync_engine.lock().await;
        match engine.sync(SyncOptions { force_full: false, include_dataview: true }).await {
            Ok(report) => debug!(
                created = report.created,
                updated = report.updated,
                deleted = report.deleted,
                moved = report.moved,
                "watch-triggered sync completed"
            ),
            Err(e) => error!(error = %e, "watch-triggered sync failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_instances_do_not_share_start_time() {
        let a = WatchService::new(PathBuf::from("/tmp/a"), 1000);
        std::thread::sleep(Duration::from_millis(5));
        let b = WatchService::new(PathBuf::from("/tmp/b"), 1000);
        assert!(b.started_at >= a.started_at);
        assert_eq!(a.pid, b.pid);
    }

    #[test]
    fn event_log_is_bounded() {
        let log = EventLog::new(3);
        for i in 0..5 {
            log.record(WatchEvent { path: format!("f{i}.md"), kind: "modify".to_string(), observed_at: Utc::now() });
        }
        let recent = log.recent();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].path, "f2.md");
        assert_eq!(recent[2].path, "f4.md");
    }

    #[test]
    fn changes_is_empty_when_no_paths_recorded() {
        assert!(Changes::default().is_empty());
    }

    #[tokio::test]
    async fn status_reports_recorded_events() {
        let service = WatchService::new(PathBuf::from("/tmp/proj"), 1000);
        service.event_log.record(WatchEvent {
            path: "note.md".to_string(),
            kind: "create".to_string(),
            observed_at: Utc::now(),
        });
        let status = service.status();
        assert_eq!(status.recent_events.len(), 1);
        assert_eq!(status.pid, std::process::id());
    }
}
