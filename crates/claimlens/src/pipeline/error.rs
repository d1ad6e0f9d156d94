use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

use super::collaborators::CollaboratorError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Status update failed: {0}")]
    Store(#[from] StoreError),

    #[error("Query directory not found: {0}")]
    QueryDirMissing(PathBuf),

    #[error("No valid image file (.jpg, .png, etc.) found in '{0}'")]
    MissingImage(PathBuf),

    #[error("No caption file (.txt) found in '{0}'")]
    MissingCaption(PathBuf),

    #[error("Evidence search failed: {0}")]
    Search(String),

    #[error("Collaborator failed: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata serialization failed: {0}")]
    Metadata(#[from] serde_json::Error),
}
