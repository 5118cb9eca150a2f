use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

/// Account role. Ordering is defined by [`Role::rank`], not by declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    User,
    Admin,
}

impl Role {
    /// Rank table used for minimum-role checks.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Guest => 0,
            Self::User => 1,
            Self::Admin => 2,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(Self::Guest),
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(anyhow!("unknown role: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Normal,
    Deleted,
    Banned,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Deleted => "deleted",
            Self::Banned => "banned",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "deleted" => Ok(Self::Deleted),
            "banned" => Ok(Self::Banned),
            other => Err(anyhow!("unknown status: {other}")),
        }
    }
}

/// Second-factor settings. Persisted, never enforced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoFactor {
    pub enabled: bool,
    pub secret_totp: String,
    pub secret_webauthn: String,
}

/// A registered account.
///
/// `id == 0` marks a record that has not been saved yet; stores assign the
/// real id on first save.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub avatar: String,
    pub role: Role,
    pub status: Status,
    pub two_factor: TwoFactor,
    pub pwd_hash: String,
}

impl Identity {
    /// New, unsaved account with the default `user` role.
    #[must_use]
    pub fn new(username: String, email: String, pwd_hash: String) -> Self {
        Self {
            id: 0,
            username,
            email,
            avatar: String::new(),
            role: Role::User,
            status: Status::Normal,
            two_factor: TwoFactor::default(),
            pwd_hash,
        }
    }

    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }
}

// Keep credential material out of logs and span fields.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("status", &self.status)
            .field("two_factor_enabled", &self.two_factor.enabled)
            .field("pwd_hash", &"***")
            .finish_non_exhaustive()
    }
}
