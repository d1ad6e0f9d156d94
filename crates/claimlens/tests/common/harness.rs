//! Test harness for isolated end-to-end execution.
//!
//! The `TestHarness` struct provides a complete isolated environment for
//! exercising the orchestration core: a temporary workspace tree, a
//! file-backed status store, the job queue, and mock collaborators that
//! stand in for the evidence searcher, inference engine, and report
//! renderer.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use assert_fs::TempDir;

use claimlens::pipeline::collaborators::{
    CollaboratorError, Collaborators, EvidenceHit, EvidenceSearcher, InferenceEngine,
    ReportRenderer,
};
use claimlens::store::{query_repo, QueryRecord};
use claimlens::{
    Database, IsolatedCall, JobQueue, JobTicket, QueryOps, QueryPipeline, QueryWatcher, Worker,
    WorkspaceLayout,
};

/// Searcher stub returning a fixed hit list (or a fixed failure).
pub struct StubSearcher {
    pub hits: Vec<EvidenceHit>,
    pub fail_with: Option<String>,
}

impl EvidenceSearcher for StubSearcher {
    fn search(&self, _image: &Path, _caption: &str) -> Result<Vec<EvidenceHit>, CollaboratorError> {
        match &self.fail_with {
            Some(msg) => Err(CollaboratorError(msg.clone())),
            None => Ok(self.hits.clone()),
        }
    }
}

/// Inference stub writing `inference_results.json` next to the metadata
/// record, the way the real collaborator does.
pub struct StubInference {
    pub final_response: String,
}

impl InferenceEngine for StubInference {
    fn infer(&self, metadata: &Path) -> Result<PathBuf, CollaboratorError> {
        let artifact = metadata.with_file_name("inference_results.json");
        let body = serde_json::json!({
            "stage2_outputs": { "final_response": self.final_response }
        });
        std::fs::write(&artifact, body.to_string())
            .map_err(|e| CollaboratorError(e.to_string()))?;
        Ok(artifact)
    }
}

/// Renderer stub writing `results/<rel>/report.pdf`, mirroring the intake
/// partitioning.
pub struct StubRenderer {
    pub layout: WorkspaceLayout,
}

impl ReportRenderer for StubRenderer {
    fn render(&self, metadata: &Path, _inference: &Path) -> Result<PathBuf, CollaboratorError> {
        let processed_dir = metadata
            .parent()
            .expect("metadata lives in the processed dir");
        let rel = processed_dir
            .strip_prefix(&self.layout.processed_dir)
            .expect("metadata under processed root")
            .to_path_buf();
        let out_dir = self.layout.results_dir_for(&rel);
        std::fs::create_dir_all(&out_dir).map_err(|e| CollaboratorError(e.to_string()))?;
        let artifact = out_dir.join("report.pdf");
        std::fs::write(&artifact, b"%PDF-1.4 stub report")
            .map_err(|e| CollaboratorError(e.to_string()))?;
        Ok(artifact)
    }
}

/// Isolated execution environment for one test.
pub struct TestHarness {
    pub temp: TempDir,
    pub layout: WorkspaceLayout,
    pub db: Database,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp workspace");
        let layout = WorkspaceLayout::new(temp.path());
        layout.ensure().expect("Failed to create workspace tree");
        let db = Database::open(&layout.db_path).expect("Failed to open status store");
        Self { temp, layout, db }
    }

    pub fn queue(&self) -> JobQueue {
        JobQueue::open(&self.layout.system_dir).expect("Failed to open job queue")
    }

    pub fn watcher(&self) -> QueryWatcher {
        QueryWatcher::new(&self.layout.queries_dir, self.db.clone(), self.queue())
    }

    pub fn ops(&self) -> QueryOps {
        QueryOps::new(self.db.clone(), self.queue(), self.layout.clone())
    }

    /// Worker wired with stub collaborators and a short retry policy.
    pub fn worker(&self, searcher: StubSearcher, final_response: &str) -> Worker {
        let collaborators = Collaborators::new(
            Arc::new(searcher),
            Arc::new(StubInference {
                final_response: final_response.to_string(),
            }),
            Arc::new(StubRenderer {
                layout: self.layout.clone(),
            }),
        );
        let pipeline = QueryPipeline::new(
            self.db.clone(),
            self.layout.clone(),
            collaborators,
            IsolatedCall::new(Duration::from_secs(5), 2, Duration::from_millis(1)),
        );
        Worker::new(self.queue(), pipeline, Duration::from_millis(10))
    }

    /// Materializes an intake directory the way the upload API would.
    pub fn upload_query(
        &self,
        owner: &str,
        query_id: &str,
        with_image: bool,
        with_caption: bool,
    ) -> PathBuf {
        let dir = self.layout.queries_dir.join(owner).join(query_id);
        std::fs::create_dir_all(&dir).expect("Failed to create query dir");
        if with_image {
            std::fs::write(dir.join("query_img.jpg"), b"jpeg bytes").expect("write image");
        }
        if with_caption {
            std::fs::write(dir.join("query_cap.txt"), "a dubious claim about a photo")
                .expect("write caption");
        }
        dir
    }

    /// Seeds one evidence item and returns a hit referencing it with
    /// workspace-relative paths.
    pub fn seed_evidence(&self, item: &str) -> EvidenceHit {
        let item_dir = self.layout.evidence_dir.join(item);
        std::fs::create_dir_all(&item_dir).expect("create evidence dir");
        std::fs::write(item_dir.join("photo.jpg"), b"evidence jpeg").expect("write evidence");
        std::fs::write(item_dir.join("caption.txt"), "evidence caption").expect("write caption");
        EvidenceHit {
            rank: 1,
            similarity_score: 0.9112,
            image_path: Path::new("evidence").join(item).join("photo.jpg"),
            caption_path: Path::new("evidence").join(item).join("caption.txt"),
        }
    }

    pub fn record(&self, query_id: &str) -> Option<QueryRecord> {
        query_repo::get(&self.db, query_id).expect("store read failed")
    }

    pub fn list_records(&self) -> Vec<QueryRecord> {
        query_repo::list(&self.db, None).expect("store list failed")
    }

    pub fn queued_descriptors(&self) -> Vec<String> {
        self.descriptors_in(self.queue().queued_dir())
    }

    pub fn completed_descriptors(&self) -> Vec<String> {
        self.descriptors_in(self.queue().completed_dir())
    }

    pub fn failed_descriptors(&self) -> Vec<String> {
        self.descriptors_in(self.queue().failed_dir())
    }

    fn descriptors_in(&self, dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .expect("read descriptor area")
            .flatten()
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("job"))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// How many descriptor areas currently hold a descriptor for the ticket.
    pub fn areas_holding(&self, ticket: &JobTicket) -> usize {
        let queue = self.queue();
        [
            queue.queued_dir().join(ticket.file_name()),
            queue.completed_dir().join(ticket.file_name()),
            queue.failed_dir().join(ticket.file_name()),
        ]
        .iter()
        .filter(|p| p.exists())
        .count()
    }
}
