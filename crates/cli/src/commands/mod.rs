//! Command handlers for the Concierge CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod backends;
pub mod chat;
pub mod classify;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use backends::BackendsCommand;
pub use chat::ChatCommand;
pub use classify::ClassifyCommand;
