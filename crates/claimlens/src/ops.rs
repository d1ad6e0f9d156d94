//! Operator actions: rerun, trash, restore, purge.
//!
//! Thin compositions of store + queue + filesystem moves. Trash is
//! reversible (artifacts are relocated into quarantine and the record is
//! marked, stage data untouched); purge is not (quarantined artifacts and
//! the record are gone for good). That distinction is the contract here.

use std::path::Path;

use crate::error::OpsError;
use crate::queue::{JobQueue, JobTicket};
use crate::store::{query_repo, Database, QueryRecord, StoreError};
use crate::workspace::WorkspaceLayout;

pub struct QueryOps {
    db: Database,
    queue: JobQueue,
    layout: WorkspaceLayout,
}

impl QueryOps {
    pub fn new(db: Database, queue: JobQueue, layout: WorkspaceLayout) -> Self {
        Self { db, queue, layout }
    }

    /// Materializes a new query from an image and caption, registers it,
    /// and queues it for processing. Returns the generated query id.
    ///
    /// This is the programmatic ingest path — unlike uploads observed by
    /// the watcher, it supports the ownerless flat namespace and registers
    /// the query explicitly instead of relying on a creation event.
    pub fn submit(
        &self,
        owner: Option<&str>,
        image: &Path,
        caption: &str,
    ) -> Result<String, OpsError> {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        let query_id = format!("query_{}", &hex[..8]);
        let ticket = JobTicket::new(owner.map(str::to_string), query_id.clone());

        let intake_dir = self.layout.intake_dir(&ticket.rel_path());
        std::fs::create_dir_all(&intake_dir).map_err(|e| OpsError::Write {
            path: intake_dir.clone(),
            source: e,
        })?;

        let extension = image
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        let image_dest = intake_dir.join(format!("query_img.{}", extension));
        std::fs::copy(image, &image_dest).map_err(|e| OpsError::Write {
            path: image_dest,
            source: e,
        })?;

        let caption_dest = intake_dir.join("query_cap.txt");
        std::fs::write(&caption_dest, caption.trim()).map_err(|e| OpsError::Write {
            path: caption_dest,
            source: e,
        })?;

        query_repo::insert(&self.db, &query_id, owner)?;
        self.queue.enqueue(&ticket)?;

        log::info!("Query '{}' submitted (owner: {:?})", query_id, owner);
        Ok(query_id)
    }

    /// Resets a query and enqueues a fresh descriptor. The worker treats the
    /// next pass as a brand-new run with no memory of the prior failure.
    pub fn rerun(&self, query_id: &str) -> Result<(), OpsError> {
        let record = self.require(query_id)?;
        let rel = record.rel_path();

        let intake_dir = self.layout.intake_dir(&rel);
        if !intake_dir.is_dir() {
            return Err(OpsError::IntakeMissing(intake_dir));
        }

        query_repo::reset(&self.db, query_id)?;
        self.queue
            .enqueue(&JobTicket::new(record.owner.clone(), query_id))?;

        log::info!("Query '{}' queued for rerun", query_id);
        Ok(())
    }

    /// Relocates the query's processing output and result artifacts into
    /// quarantine and marks the record trashed.
    pub fn trash(&self, query_id: &str) -> Result<(), OpsError> {
        let record = self.require(query_id)?;
        let rel = record.rel_path();

        move_if_present(
            &self.layout.processed_dir_for(&rel),
            &self.layout.trash_processed_dir(&rel),
        )?;
        move_if_present(
            &self.layout.results_dir_for(&rel),
            &self.layout.trash_results_dir(&rel),
        )?;

        query_repo::mark_trashed(&self.db, query_id)?;
        log::info!("Query '{}' moved to trash", query_id);
        Ok(())
    }

    /// Relocates quarantined artifacts back to their original locations,
    /// resets the record, and queues a fresh descriptor.
    pub fn restore(&self, query_id: &str) -> Result<(), OpsError> {
        let record = self.require(query_id)?;
        let rel = record.rel_path();

        move_if_present(
            &self.layout.trash_processed_dir(&rel),
            &self.layout.processed_dir_for(&rel),
        )?;
        move_if_present(
            &self.layout.trash_results_dir(&rel),
            &self.layout.results_dir_for(&rel),
        )?;

        query_repo::reset(&self.db, query_id)?;
        self.queue
            .enqueue(&JobTicket::new(record.owner.clone(), query_id))?;

        log::info!("Query '{}' restored and queued for processing", query_id);
        Ok(())
    }

    /// Permanently deletes quarantined artifacts and the status record.
    pub fn purge(&self, query_id: &str) -> Result<(), OpsError> {
        let record = self.require(query_id)?;
        let rel = record.rel_path();

        remove_if_present(&self.layout.trash_processed_dir(&rel))?;
        remove_if_present(&self.layout.trash_results_dir(&rel))?;

        query_repo::delete(&self.db, query_id)?;
        log::warn!("Query '{}' has been permanently deleted", query_id);
        Ok(())
    }

    fn require(&self, query_id: &str) -> Result<QueryRecord, OpsError> {
        query_repo::get(&self.db, query_id)?
            .ok_or_else(|| OpsError::Store(StoreError::QueryNotFound(query_id.to_string())))
    }
}

/// Moves a directory if it exists; absent sources are skipped, since a query
/// that failed in stage 1 has no result artifacts to quarantine.
fn move_if_present(from: &Path, to: &Path) -> Result<(), OpsError> {
    if !from.exists() {
        return Ok(());
    }
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(|e| OpsError::Move {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::rename(from, to).map_err(|e| OpsError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    })
}

fn remove_if_present(path: &Path) -> Result<(), OpsError> {
    if !path.exists() {
        return Ok(());
    }
    std::fs::remove_dir_all(path).map_err(|e| OpsError::Delete {
        path: path.to_path_buf(),
        source: e,
    })
}
