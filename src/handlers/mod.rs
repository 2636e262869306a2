// src/handlers/mod.rs
pub mod chat;
pub mod session;
pub mod status;
pub mod ui;
pub mod upload;
pub mod video;
