use crate::{
    api::{self, AppConfig},
    mailer::LogMailer,
    persistence::postgres::PgDatabase,
};
use anyhow::{Context, Result};
use chrono::TimeDelta;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub cookie_secret: SecretString,
    pub secure_cookie: bool,
    pub retention_days: i64,
    pub frontend_base_url: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!(
        secure_cookie = args.secure_cookie,
        retention_days = args.retention_days,
        frontend_base_url = %args.frontend_base_url,
        "starting server"
    );

    let retention = TimeDelta::try_days(args.retention_days)
        .context("retention period is out of range")?;

    let db = PgDatabase::connect(&args.dsn).await?;

    let config = AppConfig::new(Arc::new(db), Arc::new(LogMailer), args.cookie_secret)
        .with_secure_cookie(args.secure_cookie)
        .with_retention_period(retention)
        .with_frontend_base_url(args.frontend_base_url);

    api::serve(args.port, config).await
}
