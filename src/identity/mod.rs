//! Identity records and the stores that persist them.
//!
//! The session core only ever reads identities by id; everything else
//! (registration, login, status changes) goes through the same
//! [`IdentityStore`] seam so the HTTP layer can run against `PostgreSQL`
//! or a process-local map.

mod memory;
mod model;
mod postgres;
mod store;

pub use memory::MemoryStore;
pub use model::{Identity, Role, Status, TwoFactor};
pub use postgres::PgStore;
pub use store::{is_duplicate, DuplicateIdentity, IdentityStore, SettingStore, StoreFuture};
