//! Bearer credential cache.
//!
//! Every backend request needs an access token. Tokens are cached until they
//! are about to expire; when several requests find the cache stale at the
//! same time only one of them contacts the identity provider and the others
//! wait for its result.

mod sources;

pub use sources::{
    create_token_source, AccessToken, GcloudTokenSource, MetadataTokenSource, StaticTokenSource,
    TokenSource,
};

use concierge_core::{AppError, AppResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// A cached bearer token.
#[derive(Clone)]
pub struct Credential {
    token: String,
    expires_at: Instant,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: Instant) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Fresh while expiry is strictly later than now plus the margin.
    pub fn is_fresh(&self, margin: Duration) -> bool {
        self.expires_at > Instant::now() + margin
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<Credential, String>>>;

#[derive(Default)]
struct CacheState {
    current: Option<Credential>,
    inflight: Option<RefreshFuture>,
}

/// Process-wide token cache with single-flight refresh.
///
/// Cheap to clone; clones share the same cached token.
#[derive(Clone)]
pub struct CredentialCache {
    source: Arc<dyn TokenSource>,
    margin: Duration,
    state: Arc<Mutex<CacheState>>,
    refreshes: Arc<AtomicU64>,
}

impl CredentialCache {
    /// Create an empty cache over a token source.
    pub fn new(source: Arc<dyn TokenSource>, margin: Duration) -> Self {
        Self {
            source,
            margin,
            state: Arc::new(Mutex::new(CacheState::default())),
            refreshes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return a fresh credential, refreshing it at most once concurrently.
    ///
    /// A failed refresh is not cached: the next caller tries again.
    pub async fn get_credential(&self) -> AppResult<Credential> {
        let pending = {
            let mut state = self.state.lock().await;

            if let Some(current) = state.current.as_ref() {
                if current.is_fresh(self.margin) {
                    return Ok(current.clone());
                }
            }

            match state.inflight.as_ref() {
                Some(inflight) => inflight.clone(),
                None => {
                    let refresh = self.start_refresh();
                    state.inflight = Some(refresh.clone());
                    refresh
                }
            }
        };

        pending.await.map_err(AppError::AuthUnavailable)
    }

    /// Drop the cached credential so the next call refreshes.
    ///
    /// Called after a backend rejects a token as unauthorized.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        if state.current.take().is_some() {
            tracing::debug!("Invalidated cached credential from '{}'", self.source.name());
        }
    }

    /// Number of refreshes started since creation.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Name of the underlying token source.
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    fn start_refresh(&self) -> RefreshFuture {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let refreshes = Arc::clone(&self.refreshes);

        async move {
            refreshes.fetch_add(1, Ordering::SeqCst);
            tracing::debug!("Refreshing access token from '{}'", source.name());

            let fetched = source.fetch().await;

            let mut state = state.lock().await;
            state.inflight = None;

            match fetched {
                Ok(token) => {
                    let credential =
                        Credential::new(token.token, Instant::now() + token.expires_in);
                    state.current = Some(credential.clone());
                    tracing::info!(
                        "Access token refreshed from '{}' (valid for {}s)",
                        source.name(),
                        token.expires_in.as_secs()
                    );
                    Ok(credential)
                }
                Err(e) => {
                    tracing::warn!("Access token refresh from '{}' failed: {}", source.name(), e);
                    match e {
                        AppError::AuthUnavailable(message) => Err(message),
                        other => Err(other.to_string()),
                    }
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("source", &self.source.name())
            .field("margin", &self.margin)
            .field("refreshes", &self.refresh_count())
            .finish()
    }
}
