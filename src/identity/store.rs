use anyhow::Result;
use std::{future::Future, pin::Pin};
use thiserror::Error;

use super::model::Identity;

/// Boxed future returned by store methods so the traits stay object safe.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A save collided with an existing username or email.
///
/// Stores return it inside their `anyhow::Error`, so callers detect it with
/// [`is_duplicate`] rather than by message.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("username or email already registered")]
pub struct DuplicateIdentity;

/// Whether `err` is (or wraps) a [`DuplicateIdentity`].
#[must_use]
pub fn is_duplicate(err: &anyhow::Error) -> bool {
    err.downcast_ref::<DuplicateIdentity>().is_some()
}

/// Persistence for identity records.
///
/// Implementations must keep usernames and emails unique and never reuse ids.
pub trait IdentityStore: Send + Sync {
    fn find_by_id(&self, id: i64) -> StoreFuture<'_, Option<Identity>>;

    fn find_by_username<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<Identity>>;

    fn exists_by_username_or_email<'a>(
        &'a self,
        username: &'a str,
        email: &'a str,
    ) -> StoreFuture<'a, bool>;

    /// Insert when `identity.id == 0`, update otherwise. Returns the stored record.
    ///
    /// Fails with [`DuplicateIdentity`] when the username or email is taken.
    fn save<'a>(&'a self, identity: &'a Identity) -> StoreFuture<'a, Identity>;
}

/// String-valued key/value settings, used for persisting the signing key pair.
pub trait SettingStore: Send + Sync {
    fn get_setting<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    fn put_setting<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()>;
}
