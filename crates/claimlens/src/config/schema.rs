use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration, loaded from JSON and validated against the
/// embedded schema before deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Config format version. Only "1.0" is supported.
    pub version: String,

    /// Root of the workspace directory tree.
    pub workspace_root: PathBuf,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub collaborators: CollaboratorsConfig,
}

/// Worker loop tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Seconds to sleep when the queue is empty.
    #[serde(default = "default_sleep_interval_secs")]
    pub sleep_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sleep_interval_secs: default_sleep_interval_secs(),
        }
    }
}

impl WorkerConfig {
    pub fn sleep_interval(&self) -> Duration {
        Duration::from_secs(self.sleep_interval_secs)
    }
}

/// Isolated evidence-search tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Deadline for one isolated search attempt, in seconds.
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts before the search error surfaces as a stage failure.
    #[serde(default = "default_search_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts, in seconds.
    #[serde(default = "default_search_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_search_timeout_secs(),
            max_attempts: default_search_max_attempts(),
            retry_delay_secs: default_search_retry_delay_secs(),
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// External collaborator commands. Each is an argv vector; the stage
/// arguments are appended when the command is invoked (see
/// `pipeline::collaborators` for the per-stage protocol).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollaboratorsConfig {
    #[serde(default)]
    pub search_command: Vec<String>,

    #[serde(default)]
    pub inference_command: Vec<String>,

    #[serde(default)]
    pub report_command: Vec<String>,
}

fn default_sleep_interval_secs() -> u64 {
    5
}

fn default_search_timeout_secs() -> u64 {
    60
}

fn default_search_max_attempts() -> u32 {
    2
}

fn default_search_retry_delay_secs() -> u64 {
    5
}
