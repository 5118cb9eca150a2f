//! `PostgreSQL` backed stores.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Row};
use std::time::Duration;
use tracing::Instrument;

use super::model::{Identity, TwoFactor};
use super::store::{DuplicateIdentity, IdentityStore, SettingStore, StoreFuture};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const SELECT_USER: &str = r"
    SELECT id, username, email, avatar, role, status, two_factor, pwd_hash
    FROM users
";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the schema exists.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable or the schema cannot be applied.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        let store = Self::new(pool);
        store.apply_schema().await?;
        Ok(store)
    }

    /// Apply `sql/schema.sql`; every statement is idempotent.
    ///
    /// # Errors
    /// Returns an error if any statement fails.
    pub async fn apply_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .context("failed to apply schema")?;
        Ok(())
    }

    async fn fetch_one_by(&self, query: &str, value: QueryValue<'_>) -> Result<Option<Identity>> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let query = sqlx::query(query);
        let query = match value {
            QueryValue::Id(id) => query.bind(id),
            QueryValue::Text(text) => query.bind(text),
        };
        let row = query
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user")?;

        row.map(|row| identity_from_row(&row)).transpose()
    }

    async fn insert(&self, identity: &Identity) -> Result<Identity> {
        let query = r"
            INSERT INTO users
                (username, email, avatar, role, status, two_factor, pwd_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&identity.username)
            .bind(&identity.email)
            .bind(&identity.avatar)
            .bind(identity.role.as_str())
            .bind(identity.status.as_str())
            .bind(Json(&identity.two_factor))
            .bind(&identity.pwd_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(unique_violation_context)?;

        let mut stored = identity.clone();
        stored.id = row.get("id");
        Ok(stored)
    }

    async fn update(&self, identity: &Identity) -> Result<Identity> {
        let query = r"
            UPDATE users
            SET username = $2, email = $3, avatar = $4, role = $5, status = $6,
                two_factor = $7, pwd_hash = $8
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(identity.id)
            .bind(&identity.username)
            .bind(&identity.email)
            .bind(&identity.avatar)
            .bind(identity.role.as_str())
            .bind(identity.status.as_str())
            .bind(Json(&identity.two_factor))
            .bind(&identity.pwd_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(unique_violation_context)?;

        if result.rows_affected() == 0 {
            anyhow::bail!("identity {} does not exist", identity.id);
        }
        Ok(identity.clone())
    }
}

enum QueryValue<'a> {
    Id(i64),
    Text(&'a str),
}

fn identity_from_row(row: &sqlx::postgres::PgRow) -> Result<Identity> {
    let role: String = row.get("role");
    let status: String = row.get("status");
    let two_factor: Json<TwoFactor> = row.get("two_factor");

    Ok(Identity {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        avatar: row.get("avatar"),
        role: role.parse()?,
        status: status.parse()?,
        two_factor: two_factor.0,
        pwd_hash: row.get("pwd_hash"),
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn unique_violation_context(err: sqlx::Error) -> anyhow::Error {
    if is_unique_violation(&err) {
        anyhow::Error::new(err).context(DuplicateIdentity)
    } else {
        anyhow::Error::new(err).context("failed to save user")
    }
}

impl IdentityStore for PgStore {
    fn find_by_id(&self, id: i64) -> StoreFuture<'_, Option<Identity>> {
        Box::pin(async move {
            self.fetch_one_by(&format!("{SELECT_USER} WHERE id = $1"), QueryValue::Id(id))
                .await
        })
    }

    fn find_by_username<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<Identity>> {
        Box::pin(async move {
            self.fetch_one_by(
                &format!("{SELECT_USER} WHERE username = $1"),
                QueryValue::Text(username),
            )
            .await
        })
    }

    fn exists_by_username_or_email<'a>(
        &'a self,
        username: &'a str,
        email: &'a str,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let query = "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1 OR email = $2)";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            let row = sqlx::query(query)
                .bind(username)
                .bind(email)
                .fetch_one(&self.pool)
                .instrument(span)
                .await
                .context("failed to check username/email uniqueness")?;
            Ok(row.get::<bool, _>(0))
        })
    }

    fn save<'a>(&'a self, identity: &'a Identity) -> StoreFuture<'a, Identity> {
        Box::pin(async move {
            if identity.is_persisted() {
                self.update(identity).await
            } else {
                self.insert(identity).await
            }
        })
    }
}

impl SettingStore for PgStore {
    fn get_setting<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let query = "SELECT value FROM settings WHERE key = $1";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            let row = sqlx::query(query)
                .bind(key)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .with_context(|| format!("failed to read setting {key}"))?;
            Ok(row.map(|row| row.get("value")))
        })
    }

    fn put_setting<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let query = r"
                INSERT INTO settings (key, value) VALUES ($1, $2)
                ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            sqlx::query(query)
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .instrument(span)
                .await
                .with_context(|| format!("failed to write setting {key}"))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_declares_both_tables() {
        assert!(SCHEMA_SQL.contains("CREATE TABLE IF NOT EXISTS users"));
        assert!(SCHEMA_SQL.contains("CREATE TABLE IF NOT EXISTS settings"));
        assert!(SCHEMA_SQL.contains("username TEXT NOT NULL UNIQUE"));
        assert!(SCHEMA_SQL.contains("email TEXT NOT NULL UNIQUE"));
    }

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        let err = unique_violation_context(sqlx::Error::RowNotFound);
        assert!(!crate::identity::is_duplicate(&err));
    }
}
