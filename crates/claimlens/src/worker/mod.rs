//! Single-consumer worker loop.
//!
//! One job fully completes (or fails) before the next is claimed: pipeline
//! stages mutate shared on-disk state, and serializing the loop avoids a
//! locking protocol for per-query directories. The loop blocks (sleeps, does
//! not spin) when the queue is empty, in short slices so shutdown stays
//! responsive.
//!
//! Pipeline failures are contained per job — the descriptor moves to the
//! failed area and the loop continues. Only queue relocation errors
//! terminate the loop; on restart, descriptors still in the queued area are
//! simply reprocessed, which stage idempotency makes safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::QueueError;
use crate::pipeline::QueryPipeline;
use crate::queue::JobQueue;

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

pub struct Worker {
    queue: JobQueue,
    pipeline: QueryPipeline,
    sleep_interval: Duration,
}

impl Worker {
    pub fn new(queue: JobQueue, pipeline: QueryPipeline, sleep_interval: Duration) -> Self {
        Self {
            queue,
            pipeline,
            sleep_interval,
        }
    }

    /// Claims and processes at most one queued job.
    ///
    /// Returns `Ok(true)` if a job was processed (successfully or not),
    /// `Ok(false)` if the queue was empty. Errors only on queue failures,
    /// which are fatal for the worker process.
    pub fn run_once(&self) -> Result<bool, QueueError> {
        let Some(job) = self.queue.peek_next()? else {
            return Ok(false);
        };

        log::info!(
            "--- Processing job for query: {} (owner: {}) ---",
            job.ticket.query_id,
            job.ticket.owner.as_deref().unwrap_or("-")
        );

        match self.pipeline.process(&job.ticket) {
            Ok(_) => {
                self.queue.complete(&job)?;
            }
            Err(e) => {
                log::error!("Job for '{}' failed: {}", job.ticket.query_id, e);
                self.queue.fail(&job)?;
            }
        }

        Ok(true)
    }

    /// Runs the consumer loop until the shutdown flag is set.
    pub fn run(&self, shutdown: &AtomicBool) -> Result<(), QueueError> {
        log::info!("--- Starting worker ---");
        log::info!("Polling for jobs in: {}", self.queue.queued_dir().display());

        while !shutdown.load(Ordering::Relaxed) {
            if self.run_once()? {
                continue;
            }
            self.idle_wait(shutdown);
        }

        log::info!("Worker shutting down...");
        Ok(())
    }

    fn idle_wait(&self, shutdown: &AtomicBool) {
        let mut remaining = self.sleep_interval;
        while !remaining.is_zero() && !shutdown.load(Ordering::Relaxed) {
            let slice = remaining.min(SHUTDOWN_POLL);
            std::thread::sleep(slice);
            remaining -= slice;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolate::IsolatedCall;
    use crate::pipeline::collaborators::{
        CollaboratorError, Collaborators, EvidenceHit, EvidenceSearcher, InferenceEngine,
        ReportRenderer,
    };
    use crate::queue::JobTicket;
    use crate::store::{query_repo, Database, QueryStatus};
    use crate::workspace::WorkspaceLayout;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct OkSearcher;
    impl EvidenceSearcher for OkSearcher {
        fn search(&self, _: &Path, _: &str) -> Result<Vec<EvidenceHit>, CollaboratorError> {
            Ok(vec![])
        }
    }

    struct OkInference;
    impl InferenceEngine for OkInference {
        fn infer(&self, metadata: &Path) -> Result<PathBuf, CollaboratorError> {
            let artifact = metadata.with_file_name("inference_results.json");
            std::fs::write(
                &artifact,
                r#"{"stage2_outputs":{"final_response":"**Final Classification**: TRUE"}}"#,
            )
            .map_err(|e| CollaboratorError(e.to_string()))?;
            Ok(artifact)
        }
    }

    struct OkRenderer;
    impl ReportRenderer for OkRenderer {
        fn render(&self, metadata: &Path, _: &Path) -> Result<PathBuf, CollaboratorError> {
            let artifact = metadata.with_file_name("report.pdf");
            std::fs::write(&artifact, b"%PDF").map_err(|e| CollaboratorError(e.to_string()))?;
            Ok(artifact)
        }
    }

    fn setup() -> (TempDir, Database, WorkspaceLayout, Worker) {
        let tmp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(tmp.path());
        layout.ensure().unwrap();
        let db = Database::open_in_memory().unwrap();

        let collaborators = Collaborators::new(
            Arc::new(OkSearcher),
            Arc::new(OkInference),
            Arc::new(OkRenderer),
        );
        let pipeline = QueryPipeline::new(
            db.clone(),
            layout.clone(),
            collaborators,
            IsolatedCall::new(Duration::from_secs(5), 1, Duration::from_millis(1)),
        );
        let worker = Worker::new(
            JobQueue::open(&layout.system_dir).unwrap(),
            pipeline,
            Duration::from_millis(10),
        );

        (tmp, db, layout, worker)
    }

    fn seed(db: &Database, layout: &WorkspaceLayout, ticket: &JobTicket, with_caption: bool) {
        let intake = layout.intake_dir(&ticket.rel_path());
        std::fs::create_dir_all(&intake).unwrap();
        std::fs::write(intake.join("img.jpg"), b"jpeg").unwrap();
        if with_caption {
            std::fs::write(intake.join("cap.txt"), "caption").unwrap();
        }
        query_repo::insert(db, &ticket.query_id, ticket.owner.as_deref()).unwrap();
    }

    #[test]
    fn test_run_once_empty_queue() {
        let (_tmp, _db, _layout, worker) = setup();
        assert!(!worker.run_once().unwrap());
    }

    #[test]
    fn test_run_once_completes_job_and_relocates_descriptor() {
        let (_tmp, db, layout, worker) = setup();
        let ticket = JobTicket::new(None, "q1");
        seed(&db, &layout, &ticket, true);
        worker.queue.enqueue(&ticket).unwrap();

        assert!(worker.run_once().unwrap());

        let record = query_repo::get(&db, "q1").unwrap().unwrap();
        assert_eq!(record.status, QueryStatus::Completed);
        assert!(worker
            .queue
            .completed_dir()
            .join(ticket.file_name())
            .exists());
        assert!(!worker.queue.queued_dir().join(ticket.file_name()).exists());
    }

    #[test]
    fn test_run_once_failed_job_goes_to_failed_area() {
        let (_tmp, db, layout, worker) = setup();
        let ticket = JobTicket::new(None, "q2");
        // No caption: stage 1 fails.
        seed(&db, &layout, &ticket, false);
        worker.queue.enqueue(&ticket).unwrap();

        assert!(worker.run_once().unwrap());

        let record = query_repo::get(&db, "q2").unwrap().unwrap();
        assert_eq!(record.status, QueryStatus::Failed);
        assert!(worker.queue.failed_dir().join(ticket.file_name()).exists());
    }

    #[test]
    fn test_run_stops_on_shutdown() {
        let (_tmp, _db, _layout, worker) = setup();
        let shutdown = AtomicBool::new(true);
        // Flag already set: returns without processing.
        worker.run(&shutdown).unwrap();
    }

    #[test]
    fn test_run_drains_queue_in_order() {
        let (_tmp, db, layout, worker) = setup();

        for id in ["a", "b", "c"] {
            let ticket = JobTicket::new(None, id);
            seed(&db, &layout, &ticket, true);
            worker.queue.enqueue(&ticket).unwrap();
        }

        while worker.run_once().unwrap() {}

        for id in ["a", "b", "c"] {
            let record = query_repo::get(&db, id).unwrap().unwrap();
            assert_eq!(record.status, QueryStatus::Completed, "query {}", id);
        }
    }
}
