//! # Umbra (cookie and session boundary)
//!
//! `umbra` decides, per incoming request, which identity applies to an
//! analytics client and issues the cookies that carry it.
//!
//! ## Cookies
//!
//! - **`user`:** pseudonymous identity, unsigned and `HttpOnly`, expires after
//!   the configured retention period.
//! - **`optout`:** presence means "do not collect". Readable by scripts so the
//!   client can stop before sending anything. Lives for ~100 years.
//! - **`auth`:** signed account session. Valid for 24 hours from signing; there
//!   is no server-side revocation, logging out only clears the cookie.
//!
//! ## Gates
//!
//! Routes are protected by ordered gate chains (see [`api::gates`]). The first
//! gate that halts wins; handlers never run on a halted request.

pub mod api;
pub mod cli;
pub mod mailer;
pub mod persistence;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
