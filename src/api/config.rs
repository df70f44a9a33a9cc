//! Router configuration and the shared request state derived from it.

use chrono::TimeDelta;
use secrecy::SecretString;
use std::{fmt, sync::Arc};

use super::cookies::CookieCodec;
use crate::{mailer::Mailer, persistence::Database};

pub const DEFAULT_RETENTION_DAYS: i64 = 186;
pub const MAX_RETENTION_DAYS: i64 = 36_500;
pub const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:8080";

/// Everything the router needs, assembled once before it is built.
#[derive(Clone)]
pub struct AppConfig {
    db: Arc<dyn Database>,
    mailer: Arc<dyn Mailer>,
    cookie_secret: SecretString,
    secure_cookie: bool,
    retention_period: TimeDelta,
    frontend_base_url: String,
}

impl AppConfig {
    #[must_use]
    pub fn new(db: Arc<dyn Database>, mailer: Arc<dyn Mailer>, cookie_secret: SecretString) -> Self {
        Self {
            db,
            mailer,
            cookie_secret,
            secure_cookie: false,
            retention_period: TimeDelta::days(DEFAULT_RETENTION_DAYS),
            frontend_base_url: DEFAULT_FRONTEND_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_secure_cookie(mut self, secure_cookie: bool) -> Self {
        self.secure_cookie = secure_cookie;
        self
    }

    #[must_use]
    pub fn with_retention_period(mut self, retention_period: TimeDelta) -> Self {
        self.retention_period = retention_period;
        self
    }

    #[must_use]
    pub fn with_frontend_base_url(mut self, frontend_base_url: String) -> Self {
        self.frontend_base_url = frontend_base_url;
        self
    }

    #[must_use]
    pub fn secure_cookie(&self) -> bool {
        self.secure_cookie
    }

    #[must_use]
    pub fn retention_period(&self) -> TimeDelta {
        self.retention_period
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn into_state(self) -> AppState {
        AppState {
            cookies: CookieCodec::new(
                self.secure_cookie,
                self.retention_period,
                self.cookie_secret,
            ),
            db: self.db,
            mailer: self.mailer,
            frontend_base_url: self.frontend_base_url,
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("secure_cookie", &self.secure_cookie)
            .field("retention_period", &self.retention_period)
            .field("frontend_base_url", &self.frontend_base_url)
            .finish_non_exhaustive()
    }
}

/// Immutable state shared by all handlers.
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub mailer: Arc<dyn Mailer>,
    pub cookies: CookieCodec,
    pub frontend_base_url: String,
}
