//! Search backend crate for Concierge.
//!
//! This crate provides the backend side of the fan-out: a trait for
//! search/answer backends, the Discovery Engine client, a scripted mock, and
//! the bearer credential cache shared by every backend.
//!
//! # Example
//! ```no_run
//! use concierge_search::{search_and_answer, MockBackend, SessionHint};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = MockBackend::canned("faq");
//! let outcome = search_and_answer(&backend, "요금제 알려줘", &SessionHint::default()).await?;
//! println!("{}", outcome.answer.text);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod combined;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use auth::{AccessToken, Credential, CredentialCache, TokenSource};
pub use client::SearchBackend;
pub use combined::{search_and_answer, truncate_graphemes};
pub use factory::{create_backend, create_backends, create_credential_cache};
pub use providers::{DiscoveryBackend, MockBackend};
pub use types::{
    AnswerResult, AnswerSource, BackendAnswer, Citation, SearchPage, SearchResult, SessionHint,
};
