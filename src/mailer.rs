//! Outbound mail collaborator.
//!
//! Handlers compose the message; delivery is left to the [`Mailer`]. Senders
//! may block on network I/O, so handlers go through [`deliver`], which runs
//! them on the blocking pool. Failures are reported back to the caller, which
//! logs them. Nothing here retries.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub trait Mailer: Send + Sync {
    /// Deliver a message or return an error describing why it failed.
    fn send(&self, message: &Message) -> Result<()>;
}

/// Logs messages instead of delivering them.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: &Message) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "mail send stub"
        );
        Ok(())
    }
}

/// Send `message` without holding up the async runtime.
///
/// # Errors
/// Returns the sender's error, or an error if the send task panicked.
pub async fn deliver(mailer: Arc<dyn Mailer>, message: Message) -> Result<()> {
    tokio::task::spawn_blocking(move || mailer.send(&message))
        .await
        .context("mail send task failed")?
}
