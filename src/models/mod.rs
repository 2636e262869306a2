// src/models/mod.rs
pub mod analysis;
pub mod chat;
pub mod file;

pub use analysis::{AnalysisResult, AudioVolume};
pub use chat::{ChatMessage, ChatRole, ChatState};
pub use file::UploadedFile;
