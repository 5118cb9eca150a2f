//! Shared application state and HTTP-facing configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{nonce::DEFAULT_NONCE_TTL, IdentityResolver, NonceRegistry, TokenService};
use crate::identity::IdentityStore;

const DEFAULT_SESSION_TTL_SECONDS: u64 = 3 * 24 * 60 * 60;
const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    base_url: String,
    session_ttl_seconds: u64,
    nonce_ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL.to_string())
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            // Endpoints are joined onto the base URL.
            base_url: base_url.trim_end_matches('/').to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            nonce_ttl_seconds: DEFAULT_NONCE_TTL.as_secs(),
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_nonce_ttl_seconds(mut self, seconds: u64) -> Self {
        self.nonce_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> u64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    #[must_use]
    pub fn nonce_ttl(&self) -> Duration {
        Duration::from_secs(self.nonce_ttl_seconds)
    }

    /// Cookies carry `Secure` only when the service is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

/// Context bound to an account deletion nonce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeletionContext {
    pub user_id: i64,
}

pub struct AppState {
    config: AuthConfig,
    tokens: Arc<TokenService>,
    resolver: IdentityResolver,
    store: Arc<dyn IdentityStore>,
    deletion_nonces: NonceRegistry<DeletionContext>,
}

impl AppState {
    /// Must be called inside a tokio runtime; the nonce registry spawns its sweeper.
    #[must_use]
    pub fn new(config: AuthConfig, tokens: Arc<TokenService>, store: Arc<dyn IdentityStore>) -> Self {
        let resolver = IdentityResolver::new(Arc::clone(&tokens), Arc::clone(&store));
        let deletion_nonces = NonceRegistry::new(config.nonce_ttl());
        Self {
            config,
            tokens,
            resolver,
            store,
            deletion_nonces,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    #[must_use]
    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    #[must_use]
    pub fn store(&self) -> &dyn IdentityStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn deletion_nonces(&self) -> &NonceRegistry<DeletionContext> {
        &self.deletion_nonces
    }

    /// Stop background work owned by the state.
    pub fn shutdown(&self) {
        self.deletion_nonces.shutdown();
    }
}
