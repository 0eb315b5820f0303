//! Identity providers that issue access tokens.

use concierge_core::config::{AuthConfig, TokenSourceKind};
use concierge_core::{AppError, AppResult};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// A token as issued, with its remaining lifetime.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_in: Duration,
}

/// Something that can mint a new access token.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> AppResult<AccessToken>;
}

/// Token read from an environment variable on every fetch.
pub struct StaticTokenSource {
    env_var: String,
    ttl: Duration,
}

impl StaticTokenSource {
    pub fn new(env_var: impl Into<String>, ttl: Duration) -> Self {
        Self {
            env_var: env_var.into(),
            ttl,
        }
    }
}

#[async_trait::async_trait]
impl TokenSource for StaticTokenSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> AppResult<AccessToken> {
        let token = std::env::var(&self.env_var)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AppError::AuthUnavailable(format!("{} is not set", self.env_var))
            })?;

        Ok(AccessToken {
            token,
            expires_in: self.ttl,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Token from the instance metadata server (Cloud Run, GCE, GKE).
pub struct MetadataTokenSource {
    url: String,
    client: reqwest::Client,
}

impl MetadataTokenSource {
    pub fn new() -> Self {
        Self::with_url(METADATA_TOKEN_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl Default for MetadataTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TokenSource for MetadataTokenSource {
    fn name(&self) -> &str {
        "metadata"
    }

    async fn fetch(&self) -> AppResult<AccessToken> {
        let response = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| {
                AppError::AuthUnavailable(format!("Metadata server unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::AuthUnavailable(format!(
                "Metadata server returned {}",
                response.status()
            )));
        }

        let body: MetadataTokenResponse = response.json().await.map_err(|e| {
            AppError::AuthUnavailable(format!("Invalid metadata token response: {}", e))
        })?;

        Ok(AccessToken {
            token: body.access_token,
            expires_in: Duration::from_secs(body.expires_in),
        })
    }
}

/// Token printed by the gcloud CLI for local development.
pub struct GcloudTokenSource {
    program: String,
    ttl: Duration,
}

impl GcloudTokenSource {
    pub fn new(ttl: Duration) -> Self {
        Self {
            program: "gcloud".to_string(),
            ttl,
        }
    }
}

#[async_trait::async_trait]
impl TokenSource for GcloudTokenSource {
    fn name(&self) -> &str {
        "gcloud"
    }

    async fn fetch(&self) -> AppResult<AccessToken> {
        let output = tokio::process::Command::new(&self.program)
            .args(["auth", "application-default", "print-access-token"])
            .output()
            .await
            .map_err(|e| AppError::AuthUnavailable(format!("Failed to run gcloud: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::AuthUnavailable(format!(
                "gcloud exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(AppError::AuthUnavailable(
                "gcloud printed an empty token".to_string(),
            ));
        }

        Ok(AccessToken {
            token,
            expires_in: self.ttl,
        })
    }
}

/// Build the token source named in the auth configuration.
pub fn create_token_source(config: &AuthConfig) -> Arc<dyn TokenSource> {
    let ttl = Duration::from_secs(config.token_ttl_secs);
    match config.source {
        TokenSourceKind::Static => Arc::new(StaticTokenSource::new(config.token_env.clone(), ttl)),
        TokenSourceKind::Metadata => Arc::new(MetadataTokenSource::new()),
        TokenSourceKind::Gcloud => Arc::new(GcloudTokenSource::new(ttl)),
    }
}
