// src/models/file.rs
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A video persisted by the upload handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// SHA-256 of the bytes; keys the analysis cache within a session.
    pub id: String,
    pub original_name: String,
    pub unique_id: String,
    pub stored_name: String,
    pub stored_path: PathBuf,
    pub size_bytes: u64,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileUploadResponse {
    pub id: String,
    pub original_name: String,
    pub stored_name: String,
    pub file_size: u64,
    pub reused: bool,
}

impl FileUploadResponse {
    pub fn from_file(file: &UploadedFile, reused: bool) -> Self {
        Self {
            id: file.id.clone(),
            original_name: file.original_name.clone(),
            stored_name: file.stored_name.clone(),
            file_size: file.size_bytes,
            reused,
        }
    }
}
