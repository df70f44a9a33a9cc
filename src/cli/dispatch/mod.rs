//! Map parsed command-line arguments to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::cookies;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let cookie_opts = cookies::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        cookie_secret: cookie_opts.cookie_secret,
        secure_cookie: cookie_opts.secure_cookie,
        retention_days: cookie_opts.retention_days,
        frontend_base_url: cookie_opts.frontend_base_url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn action(args: &[&str]) -> Result<Action> {
        temp_env::with_vars(
            [
                ("UMBRA_SECURE_COOKIE", None::<&str>),
                ("UMBRA_FRONTEND_BASE_URL", None),
                ("UMBRA_RETENTION_DAYS", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(args.iter().copied());
                handler(&matches)
            },
        )
    }

    #[test]
    fn server_args_from_matches() -> Result<()> {
        let Action::Server(args) = action(&[
            "umbra",
            "--dsn",
            "postgres://localhost/umbra",
            "--cookie-secret",
            "s3cr3t",
            "--retention-days",
            "30",
        ])?;
        assert_eq!(args.port, 8080);
        assert_eq!(args.dsn, "postgres://localhost/umbra");
        assert_eq!(args.cookie_secret.expose_secret(), "s3cr3t");
        assert!(!args.secure_cookie);
        assert_eq!(args.retention_days, 30);
        Ok(())
    }

    #[test]
    fn https_frontend_forces_secure_cookies() -> Result<()> {
        let Action::Server(args) = action(&[
            "umbra",
            "--dsn",
            "postgres://localhost/umbra",
            "--cookie-secret",
            "s3cr3t",
            "--frontend-base-url",
            "https://umbra.dev",
        ])?;
        assert!(args.secure_cookie);
        assert_eq!(args.frontend_base_url, "https://umbra.dev");
        Ok(())
    }
}
