use crate::api::config::{DEFAULT_FRONTEND_BASE_URL, DEFAULT_RETENTION_DAYS, MAX_RETENTION_DAYS};
use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_COOKIE_SECRET: &str = "cookie-secret";
pub const ARG_SECURE_COOKIE: &str = "secure-cookie";
pub const ARG_RETENTION_DAYS: &str = "retention-days";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

#[derive(Debug)]
pub struct Options {
    pub cookie_secret: SecretString,
    pub secure_cookie: bool,
    pub retention_days: i64,
    pub frontend_base_url: String,
}

impl Options {
    /// # Errors
    /// Returns an error if the cookie secret is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let cookie_secret = matches
            .get_one::<String>(ARG_COOKIE_SECRET)
            .cloned()
            .context("missing required argument: --cookie-secret")?;
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .unwrap_or_else(|| DEFAULT_FRONTEND_BASE_URL.to_string());

        // Cookies sent to an HTTPS frontend are always marked secure.
        let secure_cookie =
            matches.get_flag(ARG_SECURE_COOKIE) || frontend_base_url.starts_with("https://");

        Ok(Self {
            cookie_secret: SecretString::from(cookie_secret),
            secure_cookie,
            retention_days: matches
                .get_one::<i64>(ARG_RETENTION_DAYS)
                .copied()
                .unwrap_or(DEFAULT_RETENTION_DAYS),
            frontend_base_url,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_COOKIE_SECRET)
                .long(ARG_COOKIE_SECRET)
                .help("Secret used to sign account session cookies")
                .env("UMBRA_COOKIE_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SECURE_COOKIE)
                .long(ARG_SECURE_COOKIE)
                .help("Only send identity and session cookies over HTTPS")
                .env("UMBRA_SECURE_COOKIE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_RETENTION_DAYS)
                .long(ARG_RETENTION_DAYS)
                .help("Lifetime of the user identity cookie in days")
                .env("UMBRA_RETENTION_DAYS")
                .default_value("186")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_RETENTION_DAYS)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used in mailed links")
                .env("UMBRA_FRONTEND_BASE_URL")
                .default_value(DEFAULT_FRONTEND_BASE_URL),
        )
}
