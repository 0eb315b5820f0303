//! Search backend implementations.

pub mod discovery;
pub mod mock;

pub use discovery::DiscoveryBackend;
pub use mock::MockBackend;
