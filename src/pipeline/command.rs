// src/pipeline/command.rs
//! Runs the analysis pipeline as a child process.
//!
//! The process is started as `<program> <args..> --run-id <id> <video>` and
//! speaks JSON lines on stdout:
//!
//! ```text
//! {"event": "progress", "stage": "transcription", "fraction": 0.4, "message": "..."}
//! {"event": "result", "output": { ...AnalysisResult... }}
//! ```
//!
//! Anything else on stdout is treated as log noise.

use super::{AnalysisPipeline, PipelineError, ProgressSink};
use crate::config::PipelineConfig;
use crate::models::AnalysisResult;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const STDERR_TAIL_LINES: usize = 20;
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct CommandPipeline {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum PipelineEvent {
    Progress {
        #[serde(default)]
        stage: String,
        #[serde(default)]
        fraction: f64,
        #[serde(default)]
        message: String,
    },
    Result {
        output: AnalysisResult,
    },
}

impl CommandPipeline {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone(), config.timeout)
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl AnalysisPipeline for CommandPipeline {
    async fn run(
        &self,
        run_id: &str,
        video: &Path,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<AnalysisResult, PipelineError> {
        tracing::info!(
            run_id = %run_id,
            program = %self.program,
            video = %video.display(),
            "starting analysis pipeline"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--run-id")
            .arg(run_id)
            .arg(video)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "pipeline stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "pipeline stderr not captured"))?;

        let mut stderr_task = tokio::spawn(collect_stderr(run_id.to_string(), stderr));

        let work = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut result = None;

            while let Some(line) = lines.next_line().await? {
                match parse_event(&line)? {
                    Some(PipelineEvent::Progress {
                        stage,
                        fraction,
                        message,
                    }) => progress.report(&stage, fraction, &message),
                    Some(PipelineEvent::Result { output }) => result = Some(output),
                    None => tracing::debug!(run_id = %run_id, "pipeline: {}", line),
                }
            }

            let status = child.wait().await?;
            Ok::<_, PipelineError>((status, result))
        };

        let outcome = tokio::select! {
            finished = tokio::time::timeout(self.timeout, work) => match finished {
                Ok(outcome) => outcome,
                Err(_) => Err(PipelineError::Timeout(self.timeout)),
            },
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        };

        if outcome.is_err() {
            if let Err(e) = child.start_kill() {
                tracing::debug!(run_id = %run_id, "pipeline already exited: {}", e);
            }
        }

        // Grandchildren can hold stderr open after a kill.
        let stderr_tail = match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut stderr_task).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => {
                stderr_task.abort();
                String::new()
            }
        };

        let (status, result) = outcome?;
        if !status.success() {
            tracing::error!(run_id = %run_id, %status, "analysis pipeline failed");
            return Err(PipelineError::Failed {
                status: status.to_string(),
                stderr: stderr_tail,
            });
        }

        let result = result.ok_or(PipelineError::MissingResult)?;
        tracing::info!(run_id = %run_id, "analysis pipeline finished");
        Ok(result)
    }
}

/// `Ok(None)` for lines that aren't pipeline events.
fn parse_event(line: &str) -> Result<Option<PipelineEvent>, PipelineError> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return Ok(None);
    }

    let value: serde_json::Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };

    match value.get("event").and_then(|e| e.as_str()) {
        Some("progress") | Some("result") => Ok(Some(serde_json::from_value(value)?)),
        _ => Ok(None),
    }
}

async fn collect_stderr<R>(run_id: String, stderr: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut lines = BufReader::new(stderr).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(run_id = %run_id, "pipeline stderr: {}", line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    Vec::from(tail).join("\n")
}
