//! webforge: chat-driven generator for small static web projects
//!
//! This library provides:
//! - Attachment classification (images, text/code, unsupported files)
//! - Generation backends for a hosted multimodal model and self-hosted endpoints
//! - A project store with pluggable persistence
//! - Sandboxed live preview composition
//! - HTTP API and CLI front ends

pub mod attachments;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod llm;
pub mod preview;
pub mod project;
pub mod server;
pub mod store;

pub use config::Config;
pub use conversation::{ChatError, ChatService};
pub use project::{Project, ProjectFile};
pub use store::ProjectStore;
