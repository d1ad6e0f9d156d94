//! Workspace directory layout.
//!
//! Every component communicates through this tree; the watcher and worker
//! share no memory, only these directories and the status store, which is
//! what makes them independently restartable.
//!
//! ```text
//! <root>/
//!   queries/      intake: [owner/]query_id/ with one image + one caption
//!   evidence/     evidence database referenced by search results
//!   processed/    per-query working copies + metadata, mirrors intake
//!   results/      rendered report artifacts, mirrors intake
//!   trash/        quarantine for trashed queries (processed/ and results/)
//!   .system/      job_queue/ job_completed/ job_failed/ status.db
//! ```

use std::path::{Path, PathBuf};

/// Resolved directory tree for one workspace root.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
    pub queries_dir: PathBuf,
    pub evidence_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub results_dir: PathBuf,
    pub trash_dir: PathBuf,
    pub system_dir: PathBuf,
    pub db_path: PathBuf,
}

impl WorkspaceLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        let system_dir = root.join(".system");
        Self {
            queries_dir: root.join("queries"),
            evidence_dir: root.join("evidence"),
            processed_dir: root.join("processed"),
            results_dir: root.join("results"),
            trash_dir: root.join("trash"),
            db_path: system_dir.join("status.db"),
            system_dir,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates every workspace directory. Idempotent.
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [
            &self.queries_dir,
            &self.evidence_dir,
            &self.processed_dir,
            &self.results_dir,
            &self.trash_dir,
            &self.system_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Intake directory for one query (`queries/[owner/]query_id`).
    pub fn intake_dir(&self, rel: &Path) -> PathBuf {
        self.queries_dir.join(rel)
    }

    /// Processing-output directory for one query.
    pub fn processed_dir_for(&self, rel: &Path) -> PathBuf {
        self.processed_dir.join(rel)
    }

    /// Result-artifact directory for one query.
    pub fn results_dir_for(&self, rel: &Path) -> PathBuf {
        self.results_dir.join(rel)
    }

    /// Quarantine location of a query's processing output.
    pub fn trash_processed_dir(&self, rel: &Path) -> PathBuf {
        self.trash_dir.join("processed").join(rel)
    }

    /// Quarantine location of a query's result artifacts.
    pub fn trash_results_dir(&self, rel: &Path) -> PathBuf {
        self.trash_dir.join("results").join(rel)
    }

    /// Rewrites an absolute path under the workspace root into the
    /// root-relative form used everywhere in persisted records. Paths
    /// outside the root are returned unchanged.
    pub fn relativize(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_creates_tree() {
        let tmp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(tmp.path().join("workspace"));
        layout.ensure().unwrap();

        assert!(layout.queries_dir.is_dir());
        assert!(layout.evidence_dir.is_dir());
        assert!(layout.processed_dir.is_dir());
        assert!(layout.results_dir.is_dir());
        assert!(layout.trash_dir.is_dir());
        assert!(layout.system_dir.is_dir());

        // Idempotent.
        layout.ensure().unwrap();
    }

    #[test]
    fn test_per_query_paths() {
        let layout = WorkspaceLayout::new("/ws");
        let rel = Path::new("alice").join("q1");

        assert_eq!(layout.intake_dir(&rel), Path::new("/ws/queries/alice/q1"));
        assert_eq!(
            layout.processed_dir_for(&rel),
            Path::new("/ws/processed/alice/q1")
        );
        assert_eq!(
            layout.trash_processed_dir(&rel),
            Path::new("/ws/trash/processed/alice/q1")
        );
        assert_eq!(
            layout.trash_results_dir(&rel),
            Path::new("/ws/trash/results/alice/q1")
        );
    }

    #[test]
    fn test_relativize() {
        let layout = WorkspaceLayout::new("/ws");
        assert_eq!(
            layout.relativize(Path::new("/ws/results/q1/report.pdf")),
            Path::new("results/q1/report.pdf")
        );
        // Paths outside the root pass through unchanged.
        assert_eq!(
            layout.relativize(Path::new("/elsewhere/file")),
            Path::new("/elsewhere/file")
        );
    }
}
