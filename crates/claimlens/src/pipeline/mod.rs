pub mod collaborators;
pub mod context;
pub mod error;
pub mod runner;
pub mod verdict;

pub use collaborators::{
    CollaboratorError, Collaborators, EvidenceHit, EvidenceSearcher, InferenceEngine,
    ReportRenderer,
};
pub use context::PipelineContext;
pub use error::PipelineError;
pub use runner::{EvidenceMetadata, QueryPipeline};
pub use verdict::extract_verdict;
