// src/pipeline/mod.rs
//! Contract with the external media-analysis pipeline (transcription,
//! subtitle burn-in, volume analysis).

use crate::models::AnalysisResult;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod command;
pub mod progress;

pub use command::CommandPipeline;
pub use progress::{ProgressChannel, ProgressSink, ProgressUpdate};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to start pipeline '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Pipeline I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Pipeline exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("Pipeline finished without producing a result")]
    MissingResult,
    #[error("Pipeline produced invalid output: {0}")]
    InvalidOutput(#[from] serde_json::Error),
    #[error("Pipeline timed out after {0:?}")]
    Timeout(Duration),
    #[error("Pipeline run was cancelled")]
    Cancelled,
    #[error("Pipeline task aborted: {0}")]
    Aborted(String),
}

#[async_trait]
pub trait AnalysisPipeline: Send + Sync {
    /// Analyze the video at `video`. Implementations report progress through
    /// `progress` and stop promptly once `cancel` fires.
    async fn run(
        &self,
        run_id: &str,
        video: &Path,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<AnalysisResult, PipelineError>;
}
