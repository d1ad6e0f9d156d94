use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClaimlensError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Status store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Job queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Watcher error: {0}")]
    Watch(#[from] WatchError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Operator action error: {0}")]
    Ops(#[from] OpsError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to read queue directory '{path}': {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write job descriptor '{path}': {source}")]
    WriteDescriptor {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to relocate job descriptor from '{from}' to '{to}': {source}")]
    Relocate {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unreadable job descriptor: {0}")]
    InvalidDescriptor(PathBuf),
}

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Directory scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

#[derive(Error, Debug)]
pub enum OpsError {
    #[error("Status store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Job queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Query intake directory not found: {0}")]
    IntakeMissing(PathBuf),

    #[error("Failed to move '{from}' to '{to}': {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete '{path}': {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ClaimlensError>;
