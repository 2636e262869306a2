// src/services/mod.rs
pub mod analysis;

pub use analysis::AnalysisService;
