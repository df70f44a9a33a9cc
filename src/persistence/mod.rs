//! Persistence collaborator.
//!
//! Handlers only talk to storage through [`Database`]. Everything is addressed
//! by opaque identifiers; how events, secrets and credentials are stored is up
//! to the implementation. [`postgres::PgDatabase`] is the one the server runs
//! with.

pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("not found")]
    NotFound,
    #[error("invalid credentials")]
    Unauthorized,
    #[error("already in use")]
    Conflict,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type Result<T, E = PersistenceError> = std::result::Result<T, E>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Event {
    pub event_id: String,
    pub account_id: String,
    pub user_id: Option<String>,
    /// Encrypted by the client; never inspected here.
    pub payload: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Account {
    pub account_id: String,
    pub name: String,
    pub public_key: String,
    pub events: Vec<Event>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccountUser {
    pub account_user_id: String,
    pub email: String,
    pub account_ids: Vec<String>,
}

#[async_trait]
pub trait Database: Send + Sync {
    async fn check_health(&self) -> Result<()>;

    async fn get_public_key(&self, account_id: &str) -> Result<String>;

    async fn associate_user_secret(
        &self,
        account_id: &str,
        user_id: &str,
        encrypted_user_secret: &str,
    ) -> Result<()>;

    /// Store an event and return its id. `user_id` is `None` for anonymous events.
    async fn insert_event(
        &self,
        account_id: &str,
        user_id: Option<&str>,
        payload: &str,
    ) -> Result<String>;

    /// Events of a user, newer than `since` when given.
    async fn query_events(&self, user_id: &str, since: Option<&str>) -> Result<Vec<Event>>;

    /// Which of the given event ids no longer exist.
    ///
    /// With a `user_id`, ids are only considered present when they belong to
    /// that user.
    async fn get_deleted_events(
        &self,
        event_ids: &[String],
        user_id: Option<&str>,
    ) -> Result<Vec<String>>;

    async fn purge_events(&self, user_id: &str) -> Result<()>;

    async fn get_account(&self, account_id: &str, since: Option<&str>) -> Result<Account>;

    async fn lookup_account_user(&self, account_user_id: &str) -> Result<AccountUser>;

    /// Returns [`PersistenceError::Unauthorized`] on unknown email or wrong password.
    async fn login(&self, email: &str, password: &str) -> Result<AccountUser>;

    async fn change_password(
        &self,
        account_user_id: &str,
        current_password: &str,
        changed_password: &str,
    ) -> Result<()>;

    async fn change_email(&self, account_user_id: &str, email: &str, password: &str)
        -> Result<()>;

    /// Create a single-use password reset key for the account user with `email`.
    async fn generate_one_time_key(&self, email: &str) -> Result<String>;

    async fn reset_password(&self, email: &str, password: &str, one_time_key: &str) -> Result<()>;
}
