use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unsupported accelerator '{requested}'; this build supports: {supported}")]
    UnsupportedAccelerator { requested: String, supported: String },

    #[error("model artifact not found at {path:?}")]
    ArtifactMissing { path: PathBuf },

    #[error("run '{name}' has no persisted model under {experiments:?}")]
    RunNotFound { name: String, experiments: PathBuf },
}
