//! External collaborator contracts for the three pipeline stages.
//!
//! The worker never knows what a stage actually computes — each collaborator
//! is an opaque callable that succeeds with an artifact or fails. They are
//! injected through [`Collaborators`], one service object built at startup,
//! so the stages carry no process-global state.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CollaboratorsConfig;
use crate::error::ConfigError;

/// One ranked evidence item returned by the searcher. Paths are
/// workspace-root-relative; absolute paths in persisted records are the bug
/// class this field layout exists to prevent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceHit {
    pub rank: u32,
    pub similarity_score: f64,
    pub image_path: PathBuf,
    pub caption_path: PathBuf,
}

/// Failure reported by a collaborator.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

/// Evidence retrieval against the embedding index. Known to hang and leak —
/// always invoked through `IsolatedCall`.
pub trait EvidenceSearcher: Send + Sync {
    fn search(&self, image: &Path, caption: &str) -> Result<Vec<EvidenceHit>, CollaboratorError>;
}

/// Model inference over the evidence metadata record. Returns the path of
/// the JSON result artifact it wrote.
pub trait InferenceEngine: Send + Sync {
    fn infer(&self, metadata: &Path) -> Result<PathBuf, CollaboratorError>;
}

/// Report rendering. Returns the path of the PDF artifact it wrote.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, metadata: &Path, inference: &Path) -> Result<PathBuf, CollaboratorError>;
}

/// The injected stage callables, constructed once at startup.
#[derive(Clone)]
pub struct Collaborators {
    pub searcher: Arc<dyn EvidenceSearcher>,
    pub inference: Arc<dyn InferenceEngine>,
    pub renderer: Arc<dyn ReportRenderer>,
}

impl Collaborators {
    pub fn new(
        searcher: Arc<dyn EvidenceSearcher>,
        inference: Arc<dyn InferenceEngine>,
        renderer: Arc<dyn ReportRenderer>,
    ) -> Self {
        Self {
            searcher,
            inference,
            renderer,
        }
    }

    /// Builds command-backed collaborators from configuration. Every command
    /// must be configured for the worker to run.
    pub fn from_config(config: &CollaboratorsConfig) -> Result<Self, ConfigError> {
        for (name, command) in [
            ("search_command", &config.search_command),
            ("inference_command", &config.inference_command),
            ("report_command", &config.report_command),
        ] {
            if command.is_empty() {
                return Err(ConfigError::Validation {
                    message: format!("collaborators.{} is required for the worker", name),
                });
            }
        }

        Ok(Self::new(
            Arc::new(CommandSearcher {
                argv: config.search_command.clone(),
            }),
            Arc::new(CommandInference {
                argv: config.inference_command.clone(),
            }),
            Arc::new(CommandRenderer {
                argv: config.report_command.clone(),
            }),
        ))
    }
}

/// Runs a collaborator argv with stage arguments appended and returns its
/// stdout. Non-zero exit becomes a collaborator failure carrying stderr.
fn run_command(argv: &[String], args: &[&str]) -> Result<String, CollaboratorError> {
    let program = argv
        .first()
        .ok_or_else(|| CollaboratorError("empty collaborator command".to_string()))?;

    let output = Command::new(program)
        .args(&argv[1..])
        .args(args)
        .output()
        .map_err(|e| CollaboratorError(format!("failed to spawn '{}': {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CollaboratorError(format!(
            "'{}' exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// The produced artifact path is the last non-empty stdout line, so
/// collaborators are free to log progress on earlier lines.
fn artifact_path_from_stdout(stdout: &str, program: &str) -> Result<PathBuf, CollaboratorError> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| {
            CollaboratorError(format!("'{}' produced no artifact path on stdout", program))
        })
}

/// Evidence search via an external command:
/// `search_command <image_path> <caption>` → JSON array of hits on stdout.
pub struct CommandSearcher {
    argv: Vec<String>,
}

impl EvidenceSearcher for CommandSearcher {
    fn search(&self, image: &Path, caption: &str) -> Result<Vec<EvidenceHit>, CollaboratorError> {
        let stdout = run_command(&self.argv, &[&image.to_string_lossy(), caption])?;
        serde_json::from_str(&stdout)
            .map_err(|e| CollaboratorError(format!("unparsable search output: {}", e)))
    }
}

/// Model inference via an external command:
/// `inference_command <metadata_path>` → artifact path on stdout.
pub struct CommandInference {
    argv: Vec<String>,
}

impl InferenceEngine for CommandInference {
    fn infer(&self, metadata: &Path) -> Result<PathBuf, CollaboratorError> {
        let stdout = run_command(&self.argv, &[&metadata.to_string_lossy()])?;
        artifact_path_from_stdout(&stdout, &self.argv[0])
    }
}

/// Report rendering via an external command:
/// `report_command <metadata_path> <inference_path>` → artifact path on stdout.
pub struct CommandRenderer {
    argv: Vec<String>,
}

impl ReportRenderer for CommandRenderer {
    fn render(&self, metadata: &Path, inference: &Path) -> Result<PathBuf, CollaboratorError> {
        let stdout = run_command(
            &self.argv,
            &[&metadata.to_string_lossy(), &inference.to_string_lossy()],
        )?;
        artifact_path_from_stdout(&stdout, &self.argv[0])
    }
}
