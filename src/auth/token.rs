//! RS256 session tokens.
//!
//! Tokens are compact JWTs (`header.claims.signature`, base64url without
//! padding) signed with PKCS#1 v1.5 over SHA-256. Verification only needs the
//! public half of the key, which is also published as a JWKS.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

use super::jwks::{Jwk, Jwks};

/// Fixed `iss` claim of every token this service issues.
pub const ISSUER: &str = "Asashio";

/// Audience of browser session tokens.
pub const USER_AUDIENCE: &str = "user-token";

/// RSA modulus size for generated keys.
pub const KEY_BITS: usize = 2048;

const ALGORITHM: &str = "RS256";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("failed to parse RSA key")]
    KeyParse,
    #[error("failed to encode RSA key")]
    KeyEncode,
    #[error("private and public key do not match")]
    KeyMismatch,
    #[error("rsa error")]
    Rsa(#[from] rsa::Error),
    #[error("signing failed")]
    Signing,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid audience")]
    InvalidAudience,
}

/// Claims asserted by a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
    kid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenBody {
    #[serde(flatten)]
    claims: SessionClaims,
    iss: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// RSA key pair used for signing. The two halves are checked to match.
#[derive(Clone)]
pub struct KeyPair {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl KeyPair {
    /// # Errors
    /// Returns `KeyMismatch` if `public_key` is not the public half of `private_key`.
    pub fn new(private_key: RsaPrivateKey, public_key: RsaPublicKey) -> Result<Self, TokenError> {
        if RsaPublicKey::from(&private_key) != public_key {
            return Err(TokenError::KeyMismatch);
        }
        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Generate a fresh 2048-bit key pair.
    ///
    /// # Errors
    /// Returns an error if the RNG or key generation fails.
    pub fn generate() -> Result<Self, TokenError> {
        let private_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, KEY_BITS)?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Load a key pair from PEM. PKCS#8 and PKCS#1 encodings are both accepted.
    ///
    /// # Errors
    /// Returns an error if either key fails to parse or the halves do not match.
    pub fn from_pem(private_pem: &str, public_pem: &str) -> Result<Self, TokenError> {
        let private_key = decode_private_key(private_pem)?;
        let public_key = decode_public_key(public_pem)?;
        Self::new(private_key, public_key)
    }

    /// Load a key pair from the private PEM alone, deriving the public half.
    ///
    /// # Errors
    /// Returns an error if the key fails to parse.
    pub fn from_private_pem(private_pem: &str) -> Result<Self, TokenError> {
        let private_key = decode_private_key(private_pem)?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// PKCS#8 PEM of the private key.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn private_key_pem(&self) -> Result<SecretString, TokenError> {
        let pem = self
            .private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|_| TokenError::KeyEncode)?;
        Ok(SecretString::from(pem.as_str().to_owned()))
    }

    /// SPKI PEM of the public key.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn public_key_pem(&self) -> Result<String, TokenError> {
        self.public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|_| TokenError::KeyEncode)
    }

    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"***")
            .field("public_key", &self.public_key)
            .finish()
    }
}

fn decode_private_key(pem: &str) -> Result<RsaPrivateKey, TokenError> {
    if let Ok(k) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(k);
    }
    if let Ok(k) = RsaPrivateKey::from_pkcs1_pem(pem) {
        return Ok(k);
    }
    Err(TokenError::KeyParse)
}

fn decode_public_key(pem: &str) -> Result<RsaPublicKey, TokenError> {
    if let Ok(k) = RsaPublicKey::from_public_key_pem(pem) {
        return Ok(k);
    }
    if let Ok(k) = RsaPublicKey::from_pkcs1_pem(pem) {
        return Ok(k);
    }
    Err(TokenError::KeyParse)
}

/// Key id: first 16 hex chars of SHA-256 over the SPKI DER encoding.
fn key_id(public_key: &RsaPublicKey) -> Result<String, TokenError> {
    let der = public_key
        .to_public_key_der()
        .map_err(|_| TokenError::KeyEncode)?;
    let digest = Sha256::digest(der.as_bytes());
    Ok(hex::encode(&digest[..8]))
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Current unix time in seconds.
#[must_use]
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
        })
}

/// Issues and verifies session tokens. Immutable once built; share it behind an `Arc`.
pub struct TokenService {
    signing_key: SigningKey<Sha256>,
    verifying_key: VerifyingKey<Sha256>,
    public_key: RsaPublicKey,
    kid: String,
}

impl TokenService {
    /// # Errors
    /// Returns an error if the key id cannot be derived from the public key.
    pub fn new(key_pair: KeyPair) -> Result<Self, TokenError> {
        let kid = key_id(&key_pair.public_key)?;
        Ok(Self {
            signing_key: SigningKey::<Sha256>::new(key_pair.private_key),
            verifying_key: VerifyingKey::<Sha256>::new(key_pair.public_key.clone()),
            public_key: key_pair.public_key,
            kid,
        })
    }

    /// Fresh key pair, used at first boot when nothing is persisted yet.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_key_pair() -> Result<KeyPair, TokenError> {
        KeyPair::generate()
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    #[must_use]
    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: vec![Jwk::rs256(&self.public_key, self.kid.clone())],
        }
    }

    /// Sign `claims` for `audience`, valid for `ttl` from now.
    ///
    /// # Errors
    /// Returns an error if encoding or signing fails.
    pub fn issue(
        &self,
        claims: &SessionClaims,
        audience: &str,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        self.issue_at(claims, audience, ttl, now_unix())
    }

    /// Same as [`TokenService::issue`] with an explicit clock.
    ///
    /// # Errors
    /// Returns an error if encoding or signing fails.
    pub fn issue_at(
        &self,
        claims: &SessionClaims,
        audience: &str,
        ttl: Duration,
        now: i64,
    ) -> Result<String, TokenError> {
        let ttl_seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        self.sign(&TokenBody {
            claims: *claims,
            iss: ISSUER.to_string(),
            aud: audience.to_string(),
            iat: now,
            exp: now.saturating_add(ttl_seconds),
        })
    }

    /// Claims of a valid token, or `None`.
    ///
    /// Every rejection reason collapses into `None`; the reason is only logged.
    #[must_use]
    pub fn verify(&self, token: Option<&str>, expected_audience: &str) -> Option<SessionClaims> {
        self.verify_at(token, expected_audience, now_unix())
    }

    /// Same as [`TokenService::verify`] with an explicit clock.
    #[must_use]
    pub fn verify_at(
        &self,
        token: Option<&str>,
        expected_audience: &str,
        now: i64,
    ) -> Option<SessionClaims> {
        let token = token.filter(|token| !token.is_empty())?;

        match self.decode(token, expected_audience, now) {
            Ok(claims) => Some(claims),
            Err(TokenError::Expired) => {
                debug!("session token expired");
                None
            }
            Err(err) => {
                warn!(reason = %err, "session token rejected");
                None
            }
        }
    }

    fn sign(&self, body: &TokenBody) -> Result<String, TokenError> {
        let header = TokenHeader {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
            kid: self.kid.clone(),
        };
        let signing_input = format!("{}.{}", b64e_json(&header)?, b64e_json(body)?);

        let signature: Signature = self
            .signing_key
            .try_sign(signing_input.as_bytes())
            .map_err(|_| TokenError::Signing)?;
        let signature_b64 = Base64UrlUnpadded::encode_string(&signature.to_vec());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    fn decode(
        &self,
        token: &str,
        expected_audience: &str,
        now: i64,
    ) -> Result<SessionClaims, TokenError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let body_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        if parts.next().is_some() {
            return Err(TokenError::TokenFormat);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlg(header.alg));
        }
        if header.kid != self.kid {
            return Err(TokenError::UnknownKid(header.kid));
        }

        let signing_input = format!("{header_b64}.{body_b64}");
        let signature_bytes =
            Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Base64)?;
        let signature = Signature::try_from(signature_bytes.as_slice())
            .map_err(|_| TokenError::InvalidSignature)?;
        self.verifying_key
            .verify(signing_input.as_bytes(), &signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let body: TokenBody = b64d_json(body_b64)?;
        if body.iss != ISSUER {
            return Err(TokenError::InvalidIssuer);
        }
        if body.aud != expected_audience {
            return Err(TokenError::InvalidAudience);
        }
        if body.exp <= now {
            return Err(TokenError::Expired);
        }

        Ok(body.claims)
    }
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}
