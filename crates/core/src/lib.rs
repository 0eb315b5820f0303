//! Concierge Core Library
//!
//! This crate provides the foundational utilities shared by every Concierge crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management (backends, orchestration, classifier, sessions)

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, BackendConfig};
pub use error::{AppError, AppResult};
