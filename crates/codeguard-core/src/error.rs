use std::path::PathBuf;

use thiserror::Error;

/// Conditions that stop a run before an [`AnalysisRun`](crate::run::AnalysisRun)
/// can be produced.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("analysis aborted after {processed} of {total} files")]
    Aborted { processed: usize, total: usize },

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}

impl PipelineError {
    /// Errors caused by how the tool was invoked rather than by the run.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, PipelineError::PathNotFound(_))
    }
}
