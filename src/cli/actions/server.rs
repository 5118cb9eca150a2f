use crate::{
    api::{
        self,
        state::{AppState, AuthConfig},
    },
    auth::{keys, TokenService},
    identity::{IdentityStore, MemoryStore, PgStore, SettingStore},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<SecretString>,
    pub base_url: String,
    pub session_ttl_seconds: u64,
    pub nonce_ttl_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store is unreachable, the signing keys cannot be
/// loaded, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = AuthConfig::new(args.base_url)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_nonce_ttl_seconds(args.nonce_ttl_seconds);

    if let Some(dsn) = args.dsn {
        let store = PgStore::connect(dsn.expose_secret()).await?;
        info!("Connected to database");
        serve(args.port, config, Arc::new(store)).await
    } else {
        warn!("No DSN configured, identities and signing keys are kept in memory only");
        serve(args.port, config, Arc::new(MemoryStore::new())).await
    }
}

async fn serve<S>(port: u16, config: AuthConfig, store: Arc<S>) -> Result<()>
where
    S: IdentityStore + SettingStore + 'static,
{
    let key_pair = keys::load_or_generate(store.as_ref())
        .await
        .context("Failed to load signing key pair")?;
    let tokens = Arc::new(TokenService::new(key_pair)?);
    info!(kid = tokens.kid(), "Token service ready");

    let state = Arc::new(AppState::new(config, tokens, store));
    api::new(port, state).await
}
