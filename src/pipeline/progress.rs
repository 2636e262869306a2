// src/pipeline/progress.rs
//! Progress reporting from a pipeline run back to the session that started it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Progress update shown in the UI progress bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub run_id: String,
    pub stage: String,
    /// 0.0 ..= 1.0
    pub fraction: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Latest-value channel owned by a session. Listeners see the newest update;
/// intermediate values may be skipped if they lag.
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    tx: Arc<watch::Sender<Option<ProgressUpdate>>>,
}

impl ProgressChannel {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn latest(&self) -> Option<ProgressUpdate> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ProgressUpdate>> {
        self.tx.subscribe()
    }

    pub fn sink(&self, run_id: impl Into<String>) -> ProgressSink {
        ProgressSink {
            run_id: run_id.into(),
            tx: self.tx.clone(),
        }
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Handed to [`AnalysisPipeline::run`](super::AnalysisPipeline::run). Reporting never blocks.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    run_id: String,
    tx: Arc<watch::Sender<Option<ProgressUpdate>>>,
}

impl ProgressSink {
    pub fn report(&self, stage: &str, fraction: f64, message: &str) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let update = ProgressUpdate {
            run_id: self.run_id.clone(),
            stage: stage.to_string(),
            fraction,
            message: message.to_string(),
            timestamp: Utc::now(),
        };
        tracing::debug!(
            run_id = %self.run_id,
            stage = %stage,
            fraction,
            "pipeline progress"
        );
        self.tx.send_replace(Some(update));
    }

    pub fn finish(&self) {
        self.report("done", 1.0, "Analysis complete");
    }

    pub fn fail(&self, message: &str) {
        let fraction = self
            .tx
            .borrow()
            .as_ref()
            .filter(|u| u.run_id == self.run_id)
            .map(|u| u.fraction)
            .unwrap_or(0.0);
        self.report("failed", fraction, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_clamps_fraction() {
        let channel = ProgressChannel::new();
        let sink = channel.sink("run-1");

        sink.report("transcription", 1.7, "");
        assert_eq!(channel.latest().unwrap().fraction, 1.0);

        sink.report("transcription", -0.2, "");
        assert_eq!(channel.latest().unwrap().fraction, 0.0);

        sink.report("transcription", f64::NAN, "");
        assert_eq!(channel.latest().unwrap().fraction, 0.0);
    }

    #[test]
    fn test_report_without_listeners_keeps_latest() {
        let channel = ProgressChannel::new();
        assert!(channel.latest().is_none());

        let sink = channel.sink("run-1");
        sink.report("volume", 0.4, "Analyzing volume");
        sink.finish();

        let latest = channel.latest().unwrap();
        assert_eq!(latest.stage, "done");
        assert_eq!(latest.fraction, 1.0);
        assert_eq!(latest.run_id, "run-1");
    }

    #[test]
    fn test_fail_keeps_last_fraction() {
        let channel = ProgressChannel::new();
        let sink = channel.sink("run-1");
        sink.report("subtitles", 0.6, "");
        sink.fail("ffmpeg crashed");

        let latest = channel.latest().unwrap();
        assert_eq!(latest.stage, "failed");
        assert_eq!(latest.fraction, 0.6);
        assert_eq!(latest.message, "ffmpeg crashed");
    }

    #[tokio::test]
    async fn test_subscriber_sees_updates() {
        let channel = ProgressChannel::new();
        let mut rx = channel.subscribe();
        let sink = channel.sink("run-1");

        sink.report("transcription", 0.25, "Transcribing");
        rx.changed().await.unwrap();
        let seen = rx.borrow_and_update().clone().unwrap();
        assert_eq!(seen.stage, "transcription");
    }
}
