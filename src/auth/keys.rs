//! Signing key bootstrap.
//!
//! The key pair is persisted as two PEM settings. The first boot generates and
//! stores a pair; every later boot reloads it so issued sessions survive
//! restarts.

use anyhow::{anyhow, Context, Result};
use secrecy::ExposeSecret;
use tracing::info;

use crate::identity::SettingStore;

use super::token::{KeyPair, TokenService};

pub const PRIVATE_KEY_SETTING: &str = "jwt.private";
pub const PUBLIC_KEY_SETTING: &str = "jwt.public";

/// Load the persisted key pair, or generate and persist one if none exists.
///
/// # Errors
/// Returns an error if only one half is persisted, the stored pair is invalid,
/// or the store fails. Any of these is fatal at boot.
pub async fn load_or_generate(settings: &dyn SettingStore) -> Result<KeyPair> {
    let private_pem = settings.get_setting(PRIVATE_KEY_SETTING).await?;
    let public_pem = settings.get_setting(PUBLIC_KEY_SETTING).await?;

    match (private_pem, public_pem) {
        (Some(private_pem), Some(public_pem)) => {
            let pair = KeyPair::from_pem(&private_pem, &public_pem)
                .context("persisted signing key pair is invalid")?;
            info!("Loaded signing key pair from settings");
            Ok(pair)
        }
        (None, None) => {
            info!("No signing key pair found, generating a new one");
            let pair = TokenService::generate_key_pair().context("failed to generate key pair")?;
            let private_pem = pair.private_key_pem()?;
            let public_pem = pair.public_key_pem()?;

            settings
                .put_setting(PRIVATE_KEY_SETTING, private_pem.expose_secret())
                .await?;
            settings.put_setting(PUBLIC_KEY_SETTING, &public_pem).await?;
            Ok(pair)
        }
        (Some(_), None) => Err(anyhow!("setting {PUBLIC_KEY_SETTING} is missing")),
        (None, Some(_)) => Err(anyhow!("setting {PRIVATE_KEY_SETTING} is missing")),
    }
}
