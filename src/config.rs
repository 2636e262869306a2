// src/config.rs
//! Runtime settings read from the environment (after `.env` is loaded).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub allowed_extensions: Vec<String>,
    pub max_upload_bytes: usize,
    pub pipeline: PipelineConfig,
    pub openai: Option<OpenAiConfig>,
    pub session_ttl: Duration,
    pub session_sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests don't touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8501".to_string());

        let upload_dir = get("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        let allowed_extensions = get("ALLOWED_EXTENSIONS")
            .map(|raw| parse_list(&raw, ','))
            .unwrap_or_else(|| vec!["mp4".to_string(), "mpeg4".to_string()])
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();

        let max_upload_mb = parse_number("MAX_UPLOAD_MB", get("MAX_UPLOAD_MB"), 500)?;

        let pipeline = PipelineConfig {
            program: get("PIPELINE_PROGRAM").unwrap_or_else(|| "speechmaster-pipeline".to_string()),
            args: get("PIPELINE_ARGS")
                .map(|raw| parse_list(&raw, ' '))
                .unwrap_or_default(),
            timeout: Duration::from_secs(parse_number(
                "PIPELINE_TIMEOUT_SECS",
                get("PIPELINE_TIMEOUT_SECS"),
                1800,
            )?),
        };

        let openai = match get("OPENAI_API_KEY") {
            Some(api_key) => Some(OpenAiConfig {
                api_key,
                base_url: get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
                timeout: Duration::from_secs(parse_number(
                    "OPENAI_TIMEOUT_SECS",
                    get("OPENAI_TIMEOUT_SECS"),
                    60,
                )?),
            }),
            None => None,
        };

        let session_ttl = Duration::from_secs(
            60 * parse_number("SESSION_TTL_MINUTES", get("SESSION_TTL_MINUTES"), 120)?,
        );
        let session_sweep_interval = Duration::from_secs(parse_number(
            "SESSION_SWEEP_SECS",
            get("SESSION_SWEEP_SECS"),
            300,
        )?);

        Ok(Self {
            bind_addr,
            upload_dir,
            allowed_extensions,
            max_upload_bytes: (max_upload_mb as usize) * 1024 * 1024,
            pipeline,
            openai,
            session_ttl,
            session_sweep_interval,
        })
    }
}

fn parse_list(raw: &str, sep: char) -> Vec<String> {
    raw.split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number(key: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8501");
        assert_eq!(config.allowed_extensions, vec!["mp4", "mpeg4"]);
        assert_eq!(config.max_upload_bytes, 500 * 1024 * 1024);
        assert_eq!(config.pipeline.timeout, Duration::from_secs(1800));
        assert!(config.openai.is_none());
        assert_eq!(config.session_ttl, Duration::from_secs(120 * 60));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("ALLOWED_EXTENSIONS", ".MP4, mov"),
            ("PIPELINE_ARGS", "-m  speech.pipeline"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:9000/v1/"),
        ])
        .unwrap();
        assert_eq!(config.allowed_extensions, vec!["mp4", "mov"]);
        assert_eq!(config.pipeline.args, vec!["-m", "speech.pipeline"]);
        let openai = config.openai.unwrap();
        assert_eq!(openai.base_url, "http://localhost:9000/v1");
        assert_eq!(openai.model, "gpt-4o-mini");
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = config_from(&[("PIPELINE_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("PIPELINE_TIMEOUT_SECS"));
    }

    #[test]
    fn test_blank_api_key_disables_llm() {
        let config = config_from(&[("OPENAI_API_KEY", "  ")]).unwrap();
        assert!(config.openai.is_none());
    }
}
