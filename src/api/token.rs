//! Signed, time-bounded tokens carried by the session cookie.
//!
//! A token is `base64url(value) "." issued_at "." base64url(mac)` where the MAC
//! is HMAC-SHA256 over the cookie name, the issue timestamp and the value.
//! Verification is a single pass over the token and the current time; every
//! failure is final and callers treat it as "no session".

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

use super::error::EncodingError;

type HmacSha256 = Hmac<Sha256>;

/// Sessions stay valid for 24 hours after signing, whatever the cookie says.
pub const SESSION_MAX_AGE_SECONDS: i64 = 24 * 60 * 60;

/// Why a token did not verify. Only ever logged, never sent to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is missing")]
    Missing,
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    SignatureMismatch,
    #[error("token is older than its maximum age")]
    Expired,
}

#[derive(Clone)]
pub struct TokenSigner {
    name: &'static str,
    secret: SecretString,
    max_age: TimeDelta,
}

impl TokenSigner {
    /// `name` binds tokens to one cookie so they cannot be replayed in another.
    #[must_use]
    pub fn new(name: &'static str, secret: SecretString) -> Self {
        Self {
            name,
            secret,
            max_age: TimeDelta::seconds(SESSION_MAX_AGE_SECONDS),
        }
    }

    #[must_use]
    pub fn max_age(&self) -> TimeDelta {
        self.max_age
    }

    /// Sign `value` as issued at `now`.
    ///
    /// # Errors
    /// Returns [`EncodingError::MissingSecret`] when no signing secret is configured.
    pub fn sign(&self, value: &str, now: DateTime<Utc>) -> Result<String, EncodingError> {
        let issued_at = now.timestamp();
        let signature = self.mac(issued_at, value.as_bytes())?.finalize().into_bytes();
        Ok(format!(
            "{}.{issued_at}.{}",
            URL_SAFE_NO_PAD.encode(value),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Verify a token read from a cookie, returning the signed value.
    ///
    /// # Errors
    /// Returns the [`TokenError`] describing why the token is not valid at `now`.
    pub fn verify(&self, token: Option<&str>, now: DateTime<Utc>) -> Result<String, TokenError> {
        let token = token
            .filter(|token| !token.is_empty())
            .ok_or(TokenError::Missing)?;

        let mut parts = token.split('.');
        let (Some(value), Some(issued_at), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let value = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|_| TokenError::Malformed)?;
        let issued_at: i64 = issued_at.parse().map_err(|_| TokenError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;

        self.mac(issued_at, &value)
            .map_err(|_| TokenError::SignatureMismatch)?
            .verify_slice(&signature)
            .map_err(|_| TokenError::SignatureMismatch)?;

        if now.timestamp().saturating_sub(issued_at) > self.max_age.num_seconds() {
            return Err(TokenError::Expired);
        }

        String::from_utf8(value).map_err(|_| TokenError::Malformed)
    }

    fn mac(&self, issued_at: i64, value: &[u8]) -> Result<HmacSha256, EncodingError> {
        let secret = self.secret.expose_secret();
        if secret.is_empty() {
            return Err(EncodingError::MissingSecret);
        }
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| EncodingError::MissingSecret)?;
        mac.update(self.name.as_bytes());
        mac.update(b"|");
        mac.update(issued_at.to_string().as_bytes());
        mac.update(b"|");
        mac.update(value);
        Ok(mac)
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("name", &self.name)
            .field("secret", &"***")
            .field("max_age", &self.max_age)
            .finish()
    }
}
