//! Backend factory.
//!
//! Builds backend clients from application configuration. All discovery
//! backends share one credential cache.

use crate::auth::{create_token_source, CredentialCache};
use crate::client::SearchBackend;
use crate::providers::{DiscoveryBackend, MockBackend};
use concierge_core::{AppConfig, AppError, AppResult, BackendConfig};
use std::sync::Arc;
use std::time::Duration;

/// Create the process-wide credential cache from the auth settings.
pub fn create_credential_cache(config: &AppConfig) -> CredentialCache {
    CredentialCache::new(
        create_token_source(&config.auth),
        Duration::from_secs(config.auth.refresh_margin_secs),
    )
}

/// Create one backend client.
///
/// # Errors
/// Returns error if:
/// - The backend kind is unknown
/// - A discovery backend has no project id
/// - The configured preamble file cannot be read
pub fn create_backend(
    config: &AppConfig,
    backend: &BackendConfig,
    credentials: &CredentialCache,
) -> AppResult<Arc<dyn SearchBackend>> {
    match backend.kind.to_lowercase().as_str() {
        "discovery" => {
            let project_id = config.project_for(backend).ok_or_else(|| {
                AppError::Config(format!("Backend '{}' has no projectId", backend.id))
            })?;

            let mut client = DiscoveryBackend::new(
                backend.clone(),
                project_id,
                config.discovery.clone(),
                credentials.clone(),
            );

            if let Some(path) = &config.discovery.preamble_path {
                let path = config.resolve_path(path);
                let preamble = std::fs::read_to_string(&path).map_err(|e| {
                    AppError::Config(format!("Failed to read preamble {:?}: {}", path, e))
                })?;
                client = client.with_preamble(preamble);
            }

            Ok(Arc::new(client))
        }
        "mock" => Ok(Arc::new(MockBackend::canned(backend.id.clone()))),
        other => Err(AppError::Config(format!(
            "Unknown backend kind '{}' for backend '{}'",
            other, backend.id
        ))),
    }
}

/// Create clients for every enabled backend, in configuration order.
pub fn create_backends(
    config: &AppConfig,
    credentials: &CredentialCache,
) -> AppResult<Vec<(BackendConfig, Arc<dyn SearchBackend>)>> {
    config
        .enabled_backends()
        .into_iter()
        .map(|backend| {
            let client = create_backend(config, &backend, credentials)?;
            tracing::debug!("Created {} backend '{}'", client.kind(), backend.id);
            Ok((backend, client))
        })
        .collect()
}
