use std::path::PathBuf;

use crate::queue::JobTicket;

use super::collaborators::EvidenceHit;

/// Accumulated products of one pipeline run.
#[derive(Debug)]
pub struct PipelineContext {
    // Input
    pub ticket: JobTicket,

    // Stage 1 results — guaranteed Some after evidence extraction
    pub image_path: Option<PathBuf>,
    pub caption_path: Option<PathBuf>,
    pub caption: Option<String>,
    pub evidence: Vec<EvidenceHit>,
    pub metadata_path: Option<PathBuf>,

    // Stage 2 result
    pub inference_path: Option<PathBuf>,
    pub verdict: Option<String>,

    // Stage 3 result
    pub report_path: Option<PathBuf>,
}

impl PipelineContext {
    pub fn new(ticket: JobTicket) -> Self {
        Self {
            ticket,
            image_path: None,
            caption_path: None,
            caption: None,
            evidence: Vec::new(),
            metadata_path: None,
            inference_path: None,
            verdict: None,
            report_path: None,
        }
    }
}
