//! Intake watcher.
//!
//! Bridges the external upload mechanism and the queue: every new
//! `owner/query_id` directory under the intake root becomes exactly one
//! status record plus one queued job descriptor. The watcher never inspects
//! the directory's contents — an upload missing its image or caption is the
//! pipeline's stage-1 problem, so a malformed upload can never block or
//! crash the watcher.
//!
//! The watcher and worker share no in-memory state; either can restart
//! independently, and `scan()` catches up on directories that appeared
//! while the watcher was down.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use notify::{Config as NotifyConfig, PollWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer_opt, Config as DebouncerConfig, DebouncedEventKind};
use walkdir::WalkDir;

use crate::error::WatchError;
use crate::queue::{JobQueue, JobTicket};
use crate::store::{query_repo, Database};

pub struct QueryWatcher {
    queries_dir: PathBuf,
    db: Database,
    queue: JobQueue,
}

impl QueryWatcher {
    pub fn new<P: AsRef<Path>>(queries_dir: P, db: Database, queue: JobQueue) -> Self {
        Self {
            queries_dir: queries_dir.as_ref().to_path_buf(),
            db,
            queue,
        }
    }

    pub fn queries_dir(&self) -> &Path {
        &self.queries_dir
    }

    /// Decides whether a created path is a query unit and, if so, registers
    /// it and enqueues a job descriptor.
    ///
    /// A query unit is a directory at depth exactly two under the intake
    /// root (`owner/query_id`); depth-one directories are owner namespaces.
    /// All failures are logged and swallowed — the watcher must survive
    /// anything the upload side throws at it.
    pub fn handle_created(&self, path: &Path) -> Option<JobTicket> {
        if !path.is_dir() {
            return None;
        }

        let rel = path.strip_prefix(&self.queries_dir).ok()?;
        let parts: Vec<&str> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();

        if parts.len() != 2 {
            return None;
        }
        let ticket = JobTicket::new(Some(parts[0].to_string()), parts[1]);

        info!(
            "Detected new query directory: {} for owner {}",
            ticket.query_id,
            parts[0]
        );

        if let Err(e) = query_repo::insert(&self.db, &ticket.query_id, ticket.owner.as_deref()) {
            error!("Failed to register query '{}': {}", ticket.query_id, e);
            return None;
        }
        if let Err(e) = self.queue.enqueue(&ticket) {
            error!("Failed to enqueue query '{}': {}", ticket.query_id, e);
            return None;
        }

        Some(ticket)
    }

    /// Catch-up pass over the intake root: registers and enqueues query
    /// directories that appeared while the watcher was not running.
    /// Directories already known to the store are left alone.
    pub fn scan(&self) -> Result<usize, WatchError> {
        let mut registered = 0;

        for entry in WalkDir::new(&self.queries_dir)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
        {
            let entry = entry.map_err(|e| WatchError::ScanFailed {
                path: self.queries_dir.clone(),
                source: e,
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }

            let query_id = entry.file_name().to_string_lossy().into_owned();
            match query_repo::get(&self.db, &query_id) {
                Ok(Some(_)) => continue,
                Ok(None) => {
                    if self.handle_created(entry.path()).is_some() {
                        registered += 1;
                    }
                }
                Err(e) => {
                    error!("Scan could not check query '{}': {}", query_id, e);
                }
            }
        }

        info!(
            "Scanned {} new queries in {}",
            registered,
            self.queries_dir.display()
        );
        Ok(registered)
    }

    /// Watches the intake root until the shutdown flag is set.
    ///
    /// Uses a poll-based watcher for Docker/NFS compatibility, debounced so
    /// a directory being populated produces a single event burst.
    pub fn watch(&self, shutdown: Arc<AtomicBool>) -> Result<(), WatchError> {
        // Use PollWatcher for Docker/NFS compatibility
        let poll_config = NotifyConfig::default().with_poll_interval(Duration::from_secs(2));

        let debouncer_config = DebouncerConfig::default()
            .with_timeout(Duration::from_millis(500))
            .with_notify_config(poll_config);

        let (tx, rx) = std::sync::mpsc::channel();

        let mut debouncer = new_debouncer_opt::<_, PollWatcher>(debouncer_config, tx)
            .map_err(|e| WatchError::Watch(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&self.queries_dir, RecursiveMode::Recursive)
            .map_err(|e| WatchError::Watch(e.to_string()))?;

        info!("--- Starting query watcher ---");
        info!("Monitoring directory: {}", self.queries_dir.display());

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Watcher shutting down...");
                break;
            }

            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(Ok(events)) => {
                    for event in events {
                        if matches!(event.kind, DebouncedEventKind::Any) {
                            if let Some(ticket) = self.handle_created(&event.path) {
                                debug!("Queued job for '{}'", ticket.reference());
                            }
                        }
                    }
                }
                Ok(Err(errors)) => {
                    warn!("Watch error: {:?}", errors);
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    continue;
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Watch channel disconnected");
                    break;
                }
            }
        }

        Ok(())
    }
}
