// src/llm/mod.rs
//! LLM backend for answering follow-up questions about an analysis.

use crate::models::AnalysisResult;
use async_trait::async_trait;
use thiserror::Error;

pub mod openai_client;

pub use openai_client::OpenAiClient;

pub const SYSTEM_PROMPT: &str = "You are SpeechMaster, an assistant that evaluates the quality of public \
speeches. You are given the automatic analysis of a recorded talk: a volume assessment, the plain \
transcript and the SRT transcript with timings. Answer the user's questions about the recording using \
only this analysis. Be concrete, quote the transcript where it helps, and give practical advice for \
improving the delivery. If the analysis does not contain the answer, say so.";

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("No LLM backend configured (set OPENAI_API_KEY)")]
    NotConfigured,
    #[error("LLM request failed: {0}")]
    Request(String),
    #[error("LLM API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Failed to parse LLM response: {0}")]
    Parse(String),
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

#[async_trait]
pub trait AnalysisAssistant: Send + Sync {
    /// Answer `question` with the full analysis as context.
    async fn ask(&self, question: &str, analysis: &AnalysisResult) -> Result<String, LlmError>;
}

/// The analysis dump sent alongside every question.
pub fn analysis_context(analysis: &AnalysisResult) -> String {
    let dump = serde_json::to_string_pretty(analysis).unwrap_or_else(|_| format!("{:?}", analysis));
    format!("Analysis of the uploaded recording (JSON):\n{}", dump)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AudioVolume;

    #[test]
    fn test_analysis_context_includes_every_field() {
        let analysis = AnalysisResult {
            audio_volume: AudioVolume {
                volume_interpretation: "Too quiet".to_string(),
            },
            transcription: "Hello world".to_string(),
            transcription_srt: "1\n00:00:00,000 --> 00:00:01,000\nHello world\n".to_string(),
            mp4_path: "/tmp/talk.mp4".to_string(),
        };

        let context = analysis_context(&analysis);
        assert!(context.contains("\"volume_interpretation\": \"Too quiet\""));
        assert!(context.contains("\"transcription\": \"Hello world\""));
        assert!(context.contains("00:00:00,000 --> 00:00:01,000"));
        assert!(context.contains("/tmp/talk.mp4"));
    }
}
