// src/services/analysis.rs
use crate::models::{AnalysisResult, UploadedFile};
use crate::pipeline::{AnalysisPipeline, PipelineError, ProgressSink};
use crate::session::Session;
use std::sync::Arc;

pub struct AnalysisService;

impl AnalysisService {
    /// Return the session's cached analysis of `file`, running the pipeline
    /// only if this (session, file) pair has never been analyzed successfully.
    ///
    /// The run happens on its own task, so a caller that goes away does not
    /// stop it. Only session teardown cancels a run.
    pub async fn analyze(
        session: Arc<Session>,
        file: UploadedFile,
        pipeline: Arc<dyn AnalysisPipeline>,
    ) -> Result<Arc<AnalysisResult>, PipelineError> {
        if let Some(cached) = session.cached_analysis(&file.id).await {
            return Ok(cached);
        }

        let task = tokio::spawn(async move {
            session
                .compute_or_fetch(&file.id, || run_pipeline(&session, &file, pipeline.as_ref()))
                .await
        });

        task.await.map_err(|e| {
            tracing::error!("Analysis task failed: {}", e);
            PipelineError::Aborted(e.to_string())
        })?
    }
}

async fn run_pipeline(
    session: &Session,
    file: &UploadedFile,
    pipeline: &dyn AnalysisPipeline,
) -> Result<AnalysisResult, PipelineError> {
    let progress = session.progress_sink(&file.unique_id);
    progress.report("queued", 0.0, &format!("Analyzing {}", file.original_name));
    let guard = RunGuard::new(progress.clone());

    tracing::info!(
        session_id = %session.id(),
        file = %file.original_name,
        run_id = %file.unique_id,
        "🎬 Running analysis pipeline"
    );

    let outcome = pipeline
        .run(
            &file.unique_id,
            &file.stored_path,
            progress.clone(),
            session.cancellation(),
        )
        .await;

    match &outcome {
        Ok(_) => progress.finish(),
        Err(e) => {
            tracing::error!(session_id = %session.id(), "Analysis failed: {}", e);
            progress.fail(&e.to_string());
        }
    }
    guard.disarm();
    outcome
}

/// Reports the run as failed if it ends without reaching a verdict.
struct RunGuard {
    progress: Option<ProgressSink>,
}

impl RunGuard {
    fn new(progress: ProgressSink) -> Self {
        Self {
            progress: Some(progress),
        }
    }

    fn disarm(mut self) {
        self.progress = None;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Some(progress) = self.progress.take() {
            tracing::warn!("Analysis run interrupted");
            progress.fail("Analysis was interrupted");
        }
    }
}
