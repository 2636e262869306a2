// src/render.rs
//! Turns an [`AnalysisResult`] into what the UI shows. Missing fields render
//! as empty values rather than errors.

use crate::models::AnalysisResult;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};

const SUBTITLED_SUFFIX: &str = "_with_subtitles";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedAnalysis {
    pub volume_metric: String,
    pub transcription: String,
    pub transcription_srt: String,
    pub subtitle_cues: usize,
    pub source_video: Option<PathBuf>,
    pub subtitled_video: Option<PathBuf>,
}

pub fn render(result: &AnalysisResult) -> RenderedAnalysis {
    let source_video = non_empty_path(&result.mp4_path);
    RenderedAnalysis {
        volume_metric: result.audio_volume.volume_interpretation.trim().to_string(),
        transcription: result.transcription.clone(),
        transcription_srt: result.transcription_srt.clone(),
        subtitle_cues: count_srt_cues(&result.transcription_srt),
        subtitled_video: source_video.as_deref().map(subtitled_video_path),
        source_video,
    }
}

/// `/tmp/talk.mp4` -> `/tmp/talk_with_subtitles.mp4`
pub fn subtitled_video_path(mp4_path: &Path) -> PathBuf {
    let stem = mp4_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match mp4_path.extension() {
        Some(ext) => format!("{}{}.{}", stem, SUBTITLED_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, SUBTITLED_SUFFIX),
    };
    mp4_path.with_file_name(file_name)
}

lazy_static::lazy_static! {
    // `00:00:01,000 --> 00:00:02,500`, optionally followed by position settings.
    static ref SRT_TIMING_LINE: Regex =
        Regex::new(r"^\s*\d+:\d{2}:\d{2}[,.]\d{3} --> \d+:\d{2}:\d{2}[,.]\d{3}(\s.*)?$")
            .expect("valid SRT timing pattern");
}

/// Number of cues in an SRT document, counted by their timing lines.
pub fn count_srt_cues(srt: &str) -> usize {
    srt.lines().filter(|line| SRT_TIMING_LINE.is_match(line)).count()
}

fn non_empty_path(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AudioVolume;

    #[test]
    fn test_render_talk_example() {
        let result = AnalysisResult {
            audio_volume: AudioVolume {
                volume_interpretation: "Too quiet".to_string(),
            },
            transcription: "Hello world".to_string(),
            transcription_srt: "1\n00:00:00,000 --> 00:00:01,000\nHello world\n".to_string(),
            mp4_path: "/tmp/talk.mp4".to_string(),
        };

        let rendered = render(&result);
        assert_eq!(rendered.volume_metric, "Too quiet");
        assert_eq!(rendered.transcription, "Hello world");
        assert_eq!(
            rendered.transcription_srt,
            "1\n00:00:00,000 --> 00:00:01,000\nHello world\n"
        );
        assert_eq!(rendered.subtitle_cues, 1);
        assert_eq!(rendered.source_video, Some(PathBuf::from("/tmp/talk.mp4")));
        assert_eq!(
            rendered.subtitled_video,
            Some(PathBuf::from("/tmp/talk_with_subtitles.mp4"))
        );
    }

    #[test]
    fn test_render_empty_result() {
        let rendered = render(&AnalysisResult::default());
        assert_eq!(rendered.volume_metric, "");
        assert_eq!(rendered.transcription, "");
        assert_eq!(rendered.subtitle_cues, 0);
        assert!(rendered.source_video.is_none());
        assert!(rendered.subtitled_video.is_none());
    }

    #[test]
    fn test_subtitled_video_path_variants() {
        assert_eq!(
            subtitled_video_path(Path::new("/data/out/talk_ab12.mp4")),
            PathBuf::from("/data/out/talk_ab12_with_subtitles.mp4")
        );
        // Only the file name changes, never a directory that happens to contain ".mp4".
        assert_eq!(
            subtitled_video_path(Path::new("/videos.mp4/talk.mp4")),
            PathBuf::from("/videos.mp4/talk_with_subtitles.mp4")
        );
        assert_eq!(
            subtitled_video_path(Path::new("talk")),
            PathBuf::from("talk_with_subtitles")
        );
    }

    #[test]
    fn test_count_srt_cues() {
        let srt = "1\n00:00:00,000 --> 00:00:01,000\nHello\n\n2\n00:00:01,000 --> 00:00:02,500\nworld\n";
        assert_eq!(count_srt_cues(srt), 2);
        assert_eq!(count_srt_cues(""), 0);
    }

    #[test]
    fn test_arrow_in_subtitle_text_is_not_a_cue() {
        let srt = "1\n00:00:00,000 --> 00:00:01,000\nslide one --> slide two\n\n\
                   2\n00:00:01,000 --> 00:00:02,500 X1:10 X2:20\nA --> B\n";
        assert_eq!(count_srt_cues(srt), 2);
        assert_eq!(count_srt_cues("00:00 --> 00:01\n"), 0);
        assert_eq!(count_srt_cues("1:02:03.004 --> 1:02:04.000\n"), 1);
    }
}
