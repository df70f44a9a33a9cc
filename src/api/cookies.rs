//! Cookie codec for the identity, opt-out and session cookies.
//!
//! Builders are pure: the output depends only on the input, `now` and the
//! codec configuration. Attributes per cookie:
//!
//! | cookie   | HttpOnly | Secure | expires                              |
//! |----------|----------|--------|--------------------------------------|
//! | `user`   | yes      | config | now + retention                      |
//! | `optout` | no       | no     | now + 100 years, epoch when cleared  |
//! | `auth`   | yes      | config | browser session, epoch on logout     |
//!
//! No `SameSite` attribute is written, so browsers apply their default (lax).

use axum::{
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    response::{IntoResponseParts, ResponseParts},
};
use chrono::{DateTime, TimeDelta, Utc};
use secrecy::SecretString;
use std::fmt;

use super::{
    error::{ApiError, EncodingError},
    token::{TokenError, TokenSigner},
};

pub const IDENTITY_COOKIE: &str = "user";
pub const OPTOUT_COOKIE: &str = "optout";
pub const SESSION_COOKIE: &str = "auth";

const OPTOUT_LIFETIME_DAYS: i64 = 365 * 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub name: &'static str,
    pub value: String,
    /// `None` leaves the lifetime to the browser session.
    pub expires: Option<DateTime<Utc>>,
    pub http_only: bool,
    pub secure: bool,
    pub path: &'static str,
}

impl Cookie {
    /// True once the browser would have dropped this cookie.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    /// The `name=value` pair a client sends back in its `Cookie` header.
    #[must_use]
    pub fn pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }

    /// Render as a `Set-Cookie` header value.
    ///
    /// # Errors
    /// Fails when the value contains bytes not allowed in a header.
    pub fn to_header_value(&self) -> Result<HeaderValue, EncodingError> {
        Ok(HeaderValue::from_str(&self.to_string())?)
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; Path={}", self.name, self.value, self.path)?;
        if let Some(expires) = self.expires {
            write!(f, "; Expires={}", expires.format("%a, %d %b %Y %H:%M:%S GMT"))?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        Ok(())
    }
}

impl IntoResponseParts for Cookie {
    type Error = ApiError;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        let value = self.to_header_value()?;
        res.headers_mut().append(SET_COOKIE, value);
        Ok(res)
    }
}

/// Builds outbound cookies and reads the session cookie back.
#[derive(Clone, Debug)]
pub struct CookieCodec {
    secure: bool,
    retention: TimeDelta,
    signer: TokenSigner,
}

impl CookieCodec {
    #[must_use]
    pub fn new(secure: bool, retention: TimeDelta, secret: SecretString) -> Self {
        Self {
            secure,
            retention,
            signer: TokenSigner::new(SESSION_COOKIE, secret),
        }
    }

    #[must_use]
    pub fn retention(&self) -> TimeDelta {
        self.retention
    }

    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Pseudonymous identity cookie, valid for the retention period.
    ///
    /// # Errors
    /// Returns [`EncodingError::ExpiryOutOfRange`] when `now` plus the
    /// retention period is not a representable date.
    pub fn identity_cookie(&self, user_id: &str, now: DateTime<Utc>) -> Result<Cookie, EncodingError> {
        let expires = now
            .checked_add_signed(self.retention)
            .ok_or(EncodingError::ExpiryOutOfRange)?;
        Ok(Cookie {
            name: IDENTITY_COOKIE,
            value: user_id.to_string(),
            expires: Some(expires),
            http_only: true,
            secure: self.secure,
            path: "/",
        })
    }

    /// Opt-out flag. Client scripts read it to stop before sending requests.
    #[must_use]
    pub fn optout_cookie(&self, opted_out: bool, now: DateTime<Utc>) -> Cookie {
        let expires = if opted_out {
            now + TimeDelta::days(OPTOUT_LIFETIME_DAYS)
        } else {
            DateTime::<Utc>::UNIX_EPOCH
        };
        Cookie {
            name: OPTOUT_COOKIE,
            value: "1".to_string(),
            expires: Some(expires),
            http_only: false,
            secure: false,
            path: "/",
        }
    }

    /// Account session cookie. An empty `account_user_id` logs out.
    ///
    /// # Errors
    /// Returns [`EncodingError`] when the session value cannot be signed.
    pub fn session_cookie(
        &self,
        account_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Cookie, EncodingError> {
        let (value, expires) = if account_user_id.is_empty() {
            (String::new(), Some(DateTime::<Utc>::UNIX_EPOCH))
        } else {
            (self.signer.sign(account_user_id, now)?, None)
        };
        Ok(Cookie {
            name: SESSION_COOKIE,
            value,
            expires,
            http_only: true,
            secure: self.secure,
            path: "/",
        })
    }

    /// Verify the session cookie carried by a request.
    ///
    /// # Errors
    /// Returns the [`TokenError`] for a missing or invalid session.
    pub fn verify_session(
        &self,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        self.signer
            .verify(read_cookie(headers, SESSION_COOKIE).as_deref(), now)
    }
}

/// Read a cookie value from every `Cookie` header on the request.
#[must_use]
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| value.trim().trim_matches('"').to_string())
        })
}
