// src/upload.rs
//! Persisting uploaded videos under the configured temp directory.

use crate::models::UploadedFile;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Unsupported file type '{extension}' (allowed: {allowed})")]
    UnsupportedExtension { extension: String, allowed: String },
    #[error("File '{0}' has no extension")]
    MissingExtension(String),
    #[error("Uploaded file '{0}' is empty")]
    EmptyFile(String),
    #[error("No file field in upload")]
    MissingFile,
    #[error("Malformed upload: {0}")]
    Malformed(String),
    #[error("Upload exceeds the size limit")]
    TooLarge,
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    allowed_extensions: Vec<String>,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, allowed_extensions: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            allowed_extensions,
        }
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Validate, name and write an uploaded video. The returned file's `id`
    /// is the SHA-256 of `data`.
    pub async fn persist(&self, original_name: &str, data: &[u8]) -> Result<UploadedFile, UploadError> {
        validate_extension(original_name, &self.allowed_extensions)?;
        if data.is_empty() {
            return Err(UploadError::EmptyFile(original_name.to_string()));
        }

        fs::create_dir_all(&self.dir).await.map_err(|source| UploadError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let unique_id = Uuid::new_v4().simple().to_string();
        let stored_name = unique_stored_name(original_name, &unique_id);
        let stored_path = self.dir.join(&stored_name);

        write_new_file(&stored_path, data)
            .await
            .map_err(|source| UploadError::Io {
                path: stored_path.clone(),
                source,
            })?;

        tracing::info!(
            original_name = %original_name,
            stored_path = %stored_path.display(),
            size_bytes = data.len(),
            "stored uploaded video"
        );

        Ok(UploadedFile {
            id: content_key(data),
            original_name: original_name.to_string(),
            unique_id,
            stored_name,
            stored_path,
            size_bytes: data.len() as u64,
            uploaded_at: chrono::Utc::now(),
        })
    }

    /// Best-effort removal used when a session is torn down.
    pub async fn remove(&self, file: &UploadedFile) {
        match fs::remove_file(&file.stored_path).await {
            Ok(()) => tracing::debug!("Removed upload {}", file.stored_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove upload {}: {}", file.stored_path.display(), e),
        }
    }
}

async fn write_new_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await
}

pub fn content_key(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn validate_extension(filename: &str, allowed: &[String]) -> Result<String, UploadError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .ok_or_else(|| UploadError::MissingExtension(filename.to_string()))?;

    if allowed.iter().any(|a| a.eq_ignore_ascii_case(&extension)) {
        Ok(extension)
    } else {
        Err(UploadError::UnsupportedExtension {
            extension,
            allowed: allowed.join(", "),
        })
    }
}

/// `{basename}_{unique_id}{.ext}`, with any client-supplied directories dropped.
pub fn unique_stored_name(original_name: &str, unique_id: &str) -> String {
    // Browsers on Windows may send backslash-separated paths.
    let file_name = original_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(original_name);
    let path = Path::new(file_name);

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("upload");

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_{}.{}", stem, unique_id, ext),
        None => format!("{}_{}", stem, unique_id),
    }
}
