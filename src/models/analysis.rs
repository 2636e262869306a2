// src/models/analysis.rs
use serde::{Deserialize, Serialize};

/// Output of the media-analysis pipeline for one uploaded video.
///
/// Every field defaults to empty so a partially filled pipeline payload still
/// deserializes and renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub audio_volume: AudioVolume,
    #[serde(default)]
    pub transcription: String,
    #[serde(default)]
    pub transcription_srt: String,
    #[serde(default)]
    pub mp4_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioVolume {
    #[serde(default)]
    pub volume_interpretation: String,
}
