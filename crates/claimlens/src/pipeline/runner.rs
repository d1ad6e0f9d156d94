//! The pipeline state machine.
//!
//! Stages execute strictly in declared order for one query; the first
//! failure halts the run, is recorded against the failing stage, and leaves
//! later stages pending. Every transition goes through the status store, so
//! status consumers always see the run exactly as far as it got.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info_span;

use crate::isolate::IsolatedCall;
use crate::queue::JobTicket;
use crate::store::{self, Database, Stage, StageState};
use crate::workspace::WorkspaceLayout;

use super::collaborators::{Collaborators, EvidenceHit};
use super::context::PipelineContext;
use super::error::PipelineError;
use super::verdict;

/// Recognized query image extensions, in discovery priority order.
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "gif", "bmp"];

const METADATA_FILE: &str = "evidence_metadata.json";
const BEST_EVIDENCE_FILE: &str = "best_evidence.jpg";

/// Metadata record persisted after evidence extraction, consumed by the
/// inference and rendering collaborators. File names and evidence paths are
/// relative to the workspace root.
#[derive(Debug, Serialize, Deserialize)]
pub struct EvidenceMetadata {
    pub query_id: String,
    pub owner: Option<String>,
    pub query_image_path: String,
    pub query_caption_path: String,
    pub evidences: Vec<EvidenceHit>,
}

pub struct QueryPipeline {
    db: Database,
    layout: WorkspaceLayout,
    collaborators: Collaborators,
    isolate: IsolatedCall,
}

impl QueryPipeline {
    pub fn new(
        db: Database,
        layout: WorkspaceLayout,
        collaborators: Collaborators,
        isolate: IsolatedCall,
    ) -> Self {
        Self {
            db,
            layout,
            collaborators,
            isolate,
        }
    }

    /// Runs all three stages for one query.
    ///
    /// Each stage is bracketed by `advance_stage` processing/completed
    /// transitions; a stage error is recorded as that stage's failure and
    /// halts the run. Store errors from the bracketing calls themselves
    /// propagate — an unknown query id is a race or programming error, not
    /// a stage failure.
    pub fn process(&self, ticket: &JobTicket) -> Result<PipelineContext, PipelineError> {
        let _pipeline_span = info_span!(
            "pipeline",
            query_id = %ticket.query_id,
            owner = ticket.owner.as_deref().unwrap_or(""),
        )
        .entered();

        let mut ctx = PipelineContext::new(ticket.clone());

        {
            let _step = info_span!("evidence_extraction").entered();
            log::info!(
                "[Stage 1/3] Starting evidence extraction for '{}'",
                ticket.query_id
            );
            self.begin_stage(&ctx, Stage::EvidenceExtraction)?;
            if let Err(e) = self.step_evidence_extraction(&mut ctx) {
                return Err(self.record_failure(&ctx, Stage::EvidenceExtraction, e));
            }
            self.finish_stage(&ctx, Stage::EvidenceExtraction)?;
        }

        {
            let _step = info_span!("model_inference").entered();
            log::info!(
                "[Stage 2/3] Starting model inference for '{}'",
                ticket.query_id
            );
            self.begin_stage(&ctx, Stage::ModelInference)?;
            if let Err(e) = self.step_model_inference(&mut ctx) {
                return Err(self.record_failure(&ctx, Stage::ModelInference, e));
            }
            self.finish_stage(&ctx, Stage::ModelInference)?;
        }

        {
            let _step = info_span!("pdf_generation").entered();
            log::info!(
                "[Stage 3/3] Starting report generation for '{}'",
                ticket.query_id
            );
            self.begin_stage(&ctx, Stage::PdfGeneration)?;
            if let Err(e) = self.step_pdf_generation(&mut ctx) {
                return Err(self.record_failure(&ctx, Stage::PdfGeneration, e));
            }
            self.finish_stage(&ctx, Stage::PdfGeneration)?;
        }

        log::info!("Job for '{}' completed successfully", ticket.query_id);
        Ok(ctx)
    }

    fn begin_stage(&self, ctx: &PipelineContext, stage: Stage) -> Result<(), PipelineError> {
        store::query_repo::advance_stage(
            &self.db,
            &ctx.ticket.query_id,
            stage,
            StageState::Processing,
            None,
        )?;
        Ok(())
    }

    fn finish_stage(&self, ctx: &PipelineContext, stage: Stage) -> Result<(), PipelineError> {
        store::query_repo::advance_stage(
            &self.db,
            &ctx.ticket.query_id,
            stage,
            StageState::Completed,
            None,
        )?;
        Ok(())
    }

    fn record_failure(
        &self,
        ctx: &PipelineContext,
        stage: Stage,
        error: PipelineError,
    ) -> PipelineError {
        log::error!(
            "Job for '{}' failed at stage '{}': {}",
            ctx.ticket.query_id,
            stage,
            error
        );
        if let Err(store_err) = store::query_repo::advance_stage(
            &self.db,
            &ctx.ticket.query_id,
            stage,
            StageState::Failed,
            Some(&error.to_string()),
        ) {
            log::error!(
                "Could not record failure for '{}': {}",
                ctx.ticket.query_id,
                store_err
            );
        }
        error
    }

    /// Stage 1: locate the query's input files, retrieve evidence through
    /// the isolated searcher, and materialize the working copy + metadata
    /// record in the processing-output directory.
    fn step_evidence_extraction(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let rel = ctx.ticket.rel_path();
        let intake_dir = self.layout.intake_dir(&rel);
        if !intake_dir.is_dir() {
            return Err(PipelineError::QueryDirMissing(intake_dir));
        }

        // The validation the watcher deferred: an upload without a
        // recognizable image or caption fails here, cleanly and visibly.
        let (image_path, caption_path) = find_query_files(&intake_dir)?;
        let caption = std::fs::read_to_string(&caption_path)
            .map_err(|e| PipelineError::Io {
                path: caption_path.clone(),
                source: e,
            })?
            .trim()
            .to_string();

        let searcher = Arc::clone(&self.collaborators.searcher);
        let search_image = image_path.clone();
        let search_caption = caption.clone();
        let evidence = self
            .isolate
            .run(move || searcher.search(&search_image, &search_caption))
            .map_err(|e| PipelineError::Search(e.to_string()))?;

        let processed_dir = self.layout.processed_dir_for(&rel);
        std::fs::create_dir_all(&processed_dir).map_err(|e| PipelineError::Io {
            path: processed_dir.clone(),
            source: e,
        })?;

        copy_into(&image_path, &processed_dir)?;
        copy_into(&caption_path, &processed_dir)?;

        if let Some(top) = evidence.first() {
            let source = self.layout.root().join(&top.image_path);
            let destination = processed_dir.join(BEST_EVIDENCE_FILE);
            std::fs::copy(&source, &destination).map_err(|e| PipelineError::Io {
                path: source,
                source: e,
            })?;
        }

        let metadata = EvidenceMetadata {
            query_id: ctx.ticket.query_id.clone(),
            owner: ctx.ticket.owner.clone(),
            query_image_path: file_name_of(&image_path),
            query_caption_path: file_name_of(&caption_path),
            evidences: evidence.clone(),
        };
        let metadata_path = processed_dir.join(METADATA_FILE);
        let metadata_json = serde_json::to_string_pretty(&metadata)?;
        std::fs::write(&metadata_path, metadata_json).map_err(|e| PipelineError::Io {
            path: metadata_path.clone(),
            source: e,
        })?;

        log::info!(
            "Evidence extraction complete, metadata saved to {}",
            metadata_path.display()
        );

        ctx.image_path = Some(image_path);
        ctx.caption_path = Some(caption_path);
        ctx.caption = Some(caption);
        ctx.evidence = evidence;
        ctx.metadata_path = Some(metadata_path);
        Ok(())
    }

    /// Stage 2: run inference over the metadata record and attach a
    /// best-effort verdict to the query.
    fn step_model_inference(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let metadata_path = ctx.metadata_path.as_ref().expect("stage 1 completed");

        let artifact = self.collaborators.inference.infer(metadata_path)?;
        let artifact = self.resolve(artifact);

        let verdict = verdict::verdict_from_artifact(&artifact);
        store::query_repo::set_verdict(&self.db, &ctx.ticket.query_id, &verdict)?;
        log::info!(
            "Verdict '{}' saved for query '{}'",
            verdict,
            ctx.ticket.query_id
        );

        ctx.inference_path = Some(artifact);
        ctx.verdict = Some(verdict);
        Ok(())
    }

    /// Stage 3: render the report and record its workspace-relative path.
    fn step_pdf_generation(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let metadata_path = ctx.metadata_path.as_ref().expect("stage 1 completed");
        let inference_path = ctx.inference_path.as_ref().expect("stage 2 completed");

        let artifact = self
            .collaborators
            .renderer
            .render(metadata_path, inference_path)?;
        let artifact = self.resolve(artifact);

        let relative = self.layout.relativize(&artifact);
        store::query_repo::set_result_path(
            &self.db,
            &ctx.ticket.query_id,
            &relative.to_string_lossy(),
        )?;

        ctx.report_path = Some(artifact);
        Ok(())
    }

    /// Collaborators may report artifacts relative to the workspace root.
    fn resolve(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            self.layout.root().join(path)
        }
    }
}

/// Finds the query image (by extension priority) and caption file in an
/// intake directory.
fn find_query_files(dir: &Path) -> Result<(PathBuf, PathBuf), PipelineError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| PipelineError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let extension_of = |path: &Path| {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    };

    let image = IMAGE_EXTENSIONS
        .iter()
        .find_map(|wanted| {
            files
                .iter()
                .find(|path| extension_of(path).as_deref() == Some(*wanted))
        })
        .cloned()
        .ok_or_else(|| PipelineError::MissingImage(dir.to_path_buf()))?;

    let caption = files
        .iter()
        .find(|path| extension_of(path).as_deref() == Some("txt"))
        .cloned()
        .ok_or_else(|| PipelineError::MissingCaption(dir.to_path_buf()))?;

    Ok((image, caption))
}

fn copy_into(source: &Path, directory: &Path) -> Result<PathBuf, PipelineError> {
    let destination = directory.join(file_name_of(source));
    std::fs::copy(source, &destination).map_err(|e| PipelineError::Io {
        path: source.to_path_buf(),
        source: e,
    })?;
    Ok(destination)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
