//! Filesystem job queue.
//!
//! One descriptor file = one unit of work. A descriptor lives in exactly one
//! of three sibling directories (queued, completed, failed) and moves between
//! them with a single `rename`, so a crash leaves it in exactly one area.
//! The three areas share a parent directory, which keeps every relocation on
//! the same filesystem — rename is atomic there, and no copy-then-delete
//! fallback is permitted.
//!
//! Filenames deterministically encode the job reference
//! (`owner__query_id.job`), so duplicates coalesce in the queued area and the
//! queue state is debuggable with `ls` alone.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::QueueError;

const DESCRIPTOR_EXT: &str = "job";

/// Reference to one query ready for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTicket {
    pub owner: Option<String>,
    pub query_id: String,
}

impl JobTicket {
    pub fn new(owner: Option<String>, query_id: impl Into<String>) -> Self {
        Self {
            owner,
            query_id: query_id.into(),
        }
    }

    /// Opaque reference string: `owner/query_id`, or bare `query_id`.
    pub fn reference(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}/{}", owner, self.query_id),
            None => self.query_id.clone(),
        }
    }

    /// Descriptor filename: `owner__query_id.job`, or `query_id.job`.
    pub fn file_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}__{}.{}", owner, self.query_id, DESCRIPTOR_EXT),
            None => format!("{}.{}", self.query_id, DESCRIPTOR_EXT),
        }
    }

    /// Relative workspace path for this query: `owner/query_id` or `query_id`.
    pub fn rel_path(&self) -> PathBuf {
        match &self.owner {
            Some(owner) => Path::new(owner).join(&self.query_id),
            None => PathBuf::from(&self.query_id),
        }
    }

    /// Parses a reference string (`owner/query_id` or `query_id`).
    pub fn parse_reference(reference: &str) -> Self {
        match reference.split_once('/') {
            Some((owner, query_id)) => Self::new(Some(owner.to_string()), query_id),
            None => Self::new(None, reference),
        }
    }

    /// Recovers a ticket from a descriptor file stem (`owner__query_id`).
    /// Fallback for descriptors with empty content.
    fn parse_file_stem(stem: &str) -> Self {
        match stem.split_once("__") {
            Some((owner, query_id)) => Self::new(Some(owner.to_string()), query_id),
            None => Self::new(None, stem),
        }
    }
}

/// A descriptor claimed from the queued area. Holds the on-disk path so the
/// worker can relocate exactly the file it processed.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub ticket: JobTicket,
    path: PathBuf,
}

impl ClaimedJob {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Directory-based FIFO handoff between the watcher and the worker.
pub struct JobQueue {
    queued_dir: PathBuf,
    completed_dir: PathBuf,
    failed_dir: PathBuf,
}

impl JobQueue {
    /// Opens the queue under the given system directory, creating the three
    /// descriptor areas if needed.
    pub fn open(system_dir: &Path) -> Result<Self, QueueError> {
        let queue = Self {
            queued_dir: system_dir.join("job_queue"),
            completed_dir: system_dir.join("job_completed"),
            failed_dir: system_dir.join("job_failed"),
        };
        for dir in [&queue.queued_dir, &queue.completed_dir, &queue.failed_dir] {
            std::fs::create_dir_all(dir).map_err(|e| QueueError::ReadDir {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(queue)
    }

    pub fn queued_dir(&self) -> &Path {
        &self.queued_dir
    }

    pub fn completed_dir(&self) -> &Path {
        &self.completed_dir
    }

    pub fn failed_dir(&self) -> &Path {
        &self.failed_dir
    }

    /// Creates one descriptor in the queued area.
    ///
    /// The deterministic filename means enqueueing a query that is already
    /// queued overwrites its descriptor instead of duplicating it — the
    /// best-effort single-flight property.
    pub fn enqueue(&self, ticket: &JobTicket) -> Result<PathBuf, QueueError> {
        let path = self.queued_dir.join(ticket.file_name());
        if path.exists() {
            log::debug!(
                "Descriptor for '{}' already queued, overwriting",
                ticket.reference()
            );
        }
        std::fs::write(&path, ticket.reference()).map_err(|e| QueueError::WriteDescriptor {
            path: path.clone(),
            source: e,
        })?;
        log::info!(
            "Queued job for '{}' at {}",
            ticket.reference(),
            path.display()
        );
        Ok(path)
    }

    /// Returns the oldest descriptor in the queued area, or `None`.
    ///
    /// "Oldest" is modification time with filename as tie-break — good
    /// enough for the best-effort FIFO contract, since the worker processes
    /// one job at a time and every queued job is eventually claimed.
    pub fn peek_next(&self) -> Result<Option<ClaimedJob>, QueueError> {
        let entries = std::fs::read_dir(&self.queued_dir).map_err(|e| QueueError::ReadDir {
            path: self.queued_dir.clone(),
            source: e,
        })?;

        let mut descriptors: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DESCRIPTOR_EXT) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            descriptors.push((modified, path));
        }

        descriptors.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let Some((_, path)) = descriptors.into_iter().next() else {
            return Ok(None);
        };

        let ticket = Self::read_descriptor(&path)?;
        Ok(Some(ClaimedJob { ticket, path }))
    }

    /// Relocates a processed descriptor into the completed area.
    pub fn complete(&self, job: &ClaimedJob) -> Result<PathBuf, QueueError> {
        self.relocate(job, &self.completed_dir)
    }

    /// Relocates a failed descriptor into the failed area.
    pub fn fail(&self, job: &ClaimedJob) -> Result<PathBuf, QueueError> {
        self.relocate(job, &self.failed_dir)
    }

    fn relocate(&self, job: &ClaimedJob, area: &Path) -> Result<PathBuf, QueueError> {
        let destination = area.join(job.ticket.file_name());
        std::fs::rename(&job.path, &destination).map_err(|e| QueueError::Relocate {
            from: job.path.clone(),
            to: destination.clone(),
            source: e,
        })?;
        log::info!("Moved job descriptor to {}", destination.display());
        Ok(destination)
    }

    fn read_descriptor(path: &Path) -> Result<JobTicket, QueueError> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| QueueError::InvalidDescriptor(path.to_path_buf()))?;
        let reference = content.trim();

        if !reference.is_empty() {
            return Ok(JobTicket::parse_reference(reference));
        }

        // Empty descriptor (e.g. touched by an operator): fall back to the
        // filename encoding.
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| QueueError::InvalidDescriptor(path.to_path_buf()))?;
        Ok(JobTicket::parse_file_stem(stem))
    }
}
