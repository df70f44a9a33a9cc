//! Postgres implementation of [`Database`].
//!
//! Schema lives in `sql/schema.sql`. Event ids are ULIDs, so "newer than"
//! queries compare ids lexicographically. Passwords are stored as Argon2 PHC
//! strings; password reset keys are only stored as SHA-256 hashes.

use anyhow::{anyhow, Context};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use sqlx::{postgres::PgPoolOptions, Connection, PgPool, Row};
use std::{collections::HashSet, time::Duration};
use tracing::{debug, instrument};
use ulid::Ulid;
use uuid::Uuid;

use super::{Account, AccountUser, Database, Event, PersistenceError, Result};

const ONE_TIME_KEY_TTL_MINUTES: i32 = 60;

#[derive(Clone, Debug)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool for `dsn`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached.
    pub async fn connect(dsn: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    async fn hashed_password(&self, account_user_id: Uuid) -> Result<String> {
        let row = sqlx::query("SELECT hashed_password FROM account_users WHERE account_user_id = $1")
            .bind(account_user_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load account user")?
            .ok_or(PersistenceError::NotFound)?;
        Ok(row
            .try_get("hashed_password")
            .context("failed to read hashed password")?)
    }

    async fn events_where(
        &self,
        column: &str,
        value: &str,
        since: Option<&str>,
    ) -> Result<Vec<Event>> {
        let query = format!(
            "SELECT event_id, account_id, user_id, payload FROM events \
             WHERE {column} = $1 AND ($2::text IS NULL OR event_id > $2) \
             ORDER BY event_id"
        );
        let rows = sqlx::query(&query)
            .bind(value)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .context("failed to query events")?;

        rows.iter()
            .map(|row| {
                Ok(Event {
                    event_id: row.try_get("event_id")?,
                    account_id: row.try_get("account_id")?,
                    user_id: row.try_get("user_id")?,
                    payload: row.try_get("payload")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .context("failed to decode events")
            .map_err(PersistenceError::from)
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn check_health(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire database connection")?;
        conn.ping().await.context("Failed to ping database")?;
        Ok(())
    }

    async fn get_public_key(&self, account_id: &str) -> Result<String> {
        let row = sqlx::query("SELECT public_key FROM accounts WHERE account_id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to look up account public key")?
            .ok_or(PersistenceError::NotFound)?;
        Ok(row
            .try_get("public_key")
            .context("failed to read public key")?)
    }

    #[instrument(skip(self, encrypted_user_secret))]
    async fn associate_user_secret(
        &self,
        account_id: &str,
        user_id: &str,
        encrypted_user_secret: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO user_secrets (user_id, account_id, encrypted_user_secret) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, account_id) \
             DO UPDATE SET encrypted_user_secret = EXCLUDED.encrypted_user_secret",
        )
        .bind(user_id)
        .bind(account_id)
        .bind(encrypted_user_secret)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_foreign_key_violation(&err) => Err(PersistenceError::NotFound),
            Err(err) => Err(anyhow!(err).context("failed to store user secret").into()),
        }
    }

    #[instrument(skip(self, payload))]
    async fn insert_event(
        &self,
        account_id: &str,
        user_id: Option<&str>,
        payload: &str,
    ) -> Result<String> {
        let event_id = Ulid::new().to_string();
        let result = sqlx::query(
            "INSERT INTO events (event_id, account_id, user_id, payload) VALUES ($1, $2, $3, $4)",
        )
        .bind(&event_id)
        .bind(account_id)
        .bind(user_id)
        .bind(payload)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(event_id),
            Err(err) if is_foreign_key_violation(&err) => Err(PersistenceError::NotFound),
            Err(err) => Err(anyhow!(err).context("failed to insert event").into()),
        }
    }

    async fn query_events(&self, user_id: &str, since: Option<&str>) -> Result<Vec<Event>> {
        self.events_where("user_id", user_id, since).await
    }

    async fn get_deleted_events(
        &self,
        event_ids: &[String],
        user_id: Option<&str>,
    ) -> Result<Vec<String>> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT event_id FROM events \
             WHERE event_id = ANY($1) AND ($2::text IS NULL OR user_id = $2)",
        )
        .bind(event_ids)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to look up events")?;

        let present = rows
            .iter()
            .map(|row| row.try_get::<String, _>("event_id"))
            .collect::<std::result::Result<HashSet<_>, _>>()
            .context("failed to decode event ids")?;

        Ok(event_ids
            .iter()
            .filter(|event_id| !present.contains(*event_id))
            .cloned()
            .collect())
    }

    #[instrument(skip(self))]
    async fn purge_events(&self, user_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM events WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("failed to purge events")?;
        debug!(rows = result.rows_affected(), "purged events");
        Ok(())
    }

    async fn get_account(&self, account_id: &str, since: Option<&str>) -> Result<Account> {
        let row = sqlx::query("SELECT account_id, name, public_key FROM accounts WHERE account_id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load account")?
            .ok_or(PersistenceError::NotFound)?;

        let events = self.events_where("account_id", account_id, since).await?;

        Ok(Account {
            account_id: row.try_get("account_id").context("failed to read account")?,
            name: row.try_get("name").context("failed to read account")?,
            public_key: row.try_get("public_key").context("failed to read account")?,
            events,
        })
    }

    async fn lookup_account_user(&self, account_user_id: &str) -> Result<AccountUser> {
        let id = Uuid::parse_str(account_user_id).map_err(|_| PersistenceError::NotFound)?;

        let row = sqlx::query("SELECT email FROM account_users WHERE account_user_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load account user")?
            .ok_or(PersistenceError::NotFound)?;

        let account_ids = sqlx::query(
            "SELECT account_id FROM account_memberships WHERE account_user_id = $1 ORDER BY account_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load account memberships")?
        .iter()
        .map(|row| row.try_get::<String, _>("account_id"))
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to decode account memberships")?;

        Ok(AccountUser {
            account_user_id: id.to_string(),
            email: row.try_get("email").context("failed to read email")?,
            account_ids,
        })
    }

    #[instrument(skip(self, password))]
    async fn login(&self, email: &str, password: &str) -> Result<AccountUser> {
        let row = sqlx::query(
            "SELECT account_user_id, hashed_password FROM account_users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("failed to look up account user")?
        .ok_or(PersistenceError::Unauthorized)?;

        let hashed: String = row
            .try_get("hashed_password")
            .context("failed to read hashed password")?;
        if !verify_password(password, &hashed) {
            return Err(PersistenceError::Unauthorized);
        }

        let id: Uuid = row
            .try_get("account_user_id")
            .context("failed to read account user id")?;
        self.lookup_account_user(&id.to_string()).await
    }

    #[instrument(skip(self, current_password, changed_password))]
    async fn change_password(
        &self,
        account_user_id: &str,
        current_password: &str,
        changed_password: &str,
    ) -> Result<()> {
        let id = Uuid::parse_str(account_user_id).map_err(|_| PersistenceError::NotFound)?;
        if !verify_password(current_password, &self.hashed_password(id).await?) {
            return Err(PersistenceError::Unauthorized);
        }

        sqlx::query("UPDATE account_users SET hashed_password = $1 WHERE account_user_id = $2")
            .bind(hash_password(changed_password)?)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("failed to update password")?;
        Ok(())
    }

    #[instrument(skip(self, password))]
    async fn change_email(
        &self,
        account_user_id: &str,
        email: &str,
        password: &str,
    ) -> Result<()> {
        let id = Uuid::parse_str(account_user_id).map_err(|_| PersistenceError::NotFound)?;
        if !verify_password(password, &self.hashed_password(id).await?) {
            return Err(PersistenceError::Unauthorized);
        }

        let result = sqlx::query("UPDATE account_users SET email = $1 WHERE account_user_id = $2")
            .bind(email)
            .bind(id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(PersistenceError::Conflict),
            Err(err) => Err(anyhow::Error::new(err).context("failed to update email").into()),
        }
    }

    #[instrument(skip(self))]
    async fn generate_one_time_key(&self, email: &str) -> Result<String> {
        let key = generate_one_time_key()?;
        let result = sqlx::query(
            "UPDATE account_users \
             SET one_time_key_hash = $1, \
                 one_time_key_expires_at = now() + make_interval(mins => $2) \
             WHERE email = $3",
        )
        .bind(hash_one_time_key(&key))
        .bind(ONE_TIME_KEY_TTL_MINUTES)
        .bind(email)
        .execute(&self.pool)
        .await
        .context("failed to store one-time key")?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound);
        }
        Ok(key)
    }

    #[instrument(skip(self, password, one_time_key))]
    async fn reset_password(&self, email: &str, password: &str, one_time_key: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE account_users \
             SET hashed_password = $1, one_time_key_hash = NULL, one_time_key_expires_at = NULL \
             WHERE email = $2 AND one_time_key_hash = $3 AND one_time_key_expires_at > now()",
        )
        .bind(hash_password(password)?)
        .bind(email)
        .bind(hash_one_time_key(one_time_key))
        .execute(&self.pool)
        .await
        .context("failed to reset password")?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::Unauthorized);
        }
        Ok(())
    }
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

fn verify_password(password: &str, hashed: &str) -> bool {
    PasswordHash::new(hashed).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// The raw key is only mailed to the user; the database keeps its hash.
fn generate_one_time_key() -> anyhow::Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate one-time key")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn hash_one_time_key(key: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.finalize().to_vec()
}

fn has_sqlstate(err: &sqlx::Error, sqlstate: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == sqlstate),
        _ => false,
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    has_sqlstate(err, "23503")
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_sqlstate(err, "23505")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::{borrow::Cow, error::Error as StdError, fmt};

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn db_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(TestDbError { code: Some(code) }))
    }

    #[test]
    fn password_hash_verifies_only_the_same_password() {
        let hashed = hash_password("correct horse").unwrap();
        assert!(hashed.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hashed));
        assert!(!verify_password("battery staple", &hashed));
    }

    #[test]
    fn verify_password_rejects_garbage_hash() {
        assert!(!verify_password("secret", "not-a-phc-string"));
    }

    #[test]
    fn one_time_keys_are_random_32_bytes() {
        let first = generate_one_time_key().unwrap();
        let second = generate_one_time_key().unwrap();
        assert_ne!(first, second);
        assert_eq!(URL_SAFE_NO_PAD.decode(first.as_bytes()).unwrap().len(), 32);
    }

    #[test]
    fn one_time_key_hash_is_stable() {
        assert_eq!(hash_one_time_key("key"), hash_one_time_key("key"));
        assert_ne!(hash_one_time_key("key"), hash_one_time_key("other"));
    }

    #[test]
    fn foreign_key_violation_only_for_database_errors() {
        assert!(!is_foreign_key_violation(&sqlx::Error::RowNotFound));
        assert!(is_foreign_key_violation(&db_error("23503")));
        assert!(!is_foreign_key_violation(&db_error("23505")));
    }

    #[test]
    fn unique_violation_matches_sqlstate() {
        assert!(is_unique_violation(&db_error("23505")));
        assert!(!is_unique_violation(&db_error("23503")));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
