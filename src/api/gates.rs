//! Gates: ordered middleware links in front of each route.
//!
//! A gate inspects the request and either lets it continue (possibly after
//! attaching context to its extensions) or halts it with a final response.
//! Gates in a [`Chain`] run in registration order and the first halt wins, so
//! neither later gates nor the handler run.
//!
//! Context values are stored under private extension types and read back
//! only through the [`UserIdentity`] and [`AccountSession`] extractors.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::{fmt, ops::ControlFlow, sync::Arc};
use tracing::debug;

use super::{
    cookies::{read_cookie, CookieCodec, IDENTITY_COOKIE, OPTOUT_COOKIE},
    error::{ApiError, GateFailure},
};

pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Continue` lets the next gate run, `Break` answers the request.
    fn inspect(&self, request: &mut Request) -> ControlFlow<Response>;
}

#[derive(Clone, Default)]
pub struct Chain {
    gates: Vec<Arc<dyn Gate>>,
}

impl Chain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a gate; it runs after every gate already in the chain.
    #[must_use]
    pub fn then(mut self, gate: Arc<dyn Gate>) -> Self {
        self.gates.push(gate);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.gates.iter().map(|gate| gate.name()).collect()
    }

    pub fn run(&self, request: &mut Request) -> ControlFlow<Response> {
        for gate in &self.gates {
            gate.inspect(request)?;
        }
        ControlFlow::Continue(())
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// axum middleware running a chain before the wrapped handler.
pub async fn enforce(State(chain): State<Chain>, mut request: Request, next: Next) -> Response {
    match chain.run(&mut request) {
        ControlFlow::Continue(()) => next.run(request).await,
        ControlFlow::Break(response) => response,
    }
}

/// Drops requests from opted-out clients with an empty success, so the
/// opt-out status never shows up as an error code.
#[derive(Clone, Copy, Debug, Default)]
pub struct OptOutGate;

impl Gate for OptOutGate {
    fn name(&self) -> &'static str {
        "opt-out"
    }

    fn inspect(&self, request: &mut Request) -> ControlFlow<Response> {
        if read_cookie(request.headers(), OPTOUT_COOKIE).is_some() {
            debug!("opt-out cookie present, dropping request");
            return ControlFlow::Break(StatusCode::NO_CONTENT.into_response());
        }
        ControlFlow::Continue(())
    }
}

#[derive(Clone, Debug)]
struct IdentityValue(String);

#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityGate;

impl Gate for IdentityGate {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn inspect(&self, request: &mut Request) -> ControlFlow<Response> {
        match read_cookie(request.headers(), IDENTITY_COOKIE).filter(|value| !value.is_empty()) {
            Some(user_id) => {
                request.extensions_mut().insert(IdentityValue(user_id));
                ControlFlow::Continue(())
            }
            None => ControlFlow::Break(ApiError::from(GateFailure::MissingIdentity).into_response()),
        }
    }
}

#[derive(Clone, Debug)]
struct SessionValue(String);

#[derive(Clone, Debug)]
pub struct AccountSessionGate {
    codec: CookieCodec,
}

impl AccountSessionGate {
    #[must_use]
    pub fn new(codec: CookieCodec) -> Self {
        Self { codec }
    }
}

impl Gate for AccountSessionGate {
    fn name(&self) -> &'static str {
        "account-session"
    }

    fn inspect(&self, request: &mut Request) -> ControlFlow<Response> {
        match self.codec.verify_session(request.headers(), Utc::now()) {
            Ok(account_user_id) => {
                request
                    .extensions_mut()
                    .insert(SessionValue(account_user_id));
                ControlFlow::Continue(())
            }
            Err(reason) => {
                debug!(%reason, "rejecting account session");
                ControlFlow::Break(ApiError::from(GateFailure::Unauthenticated).into_response())
            }
        }
    }
}

/// Pseudonymous user id placed by [`IdentityGate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for UserIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<IdentityValue>()
            .map(|value| Self(value.0.clone()))
            .ok_or(ApiError::Gate(GateFailure::MissingIdentity))
    }
}

/// Account user id placed by [`AccountSessionGate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountSession(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AccountSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionValue>()
            .map(|value| Self(value.0.clone()))
            .ok_or(ApiError::Gate(GateFailure::Unauthenticated))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::header::COOKIE,
        routing::get,
        Router,
    };
    use chrono::TimeDelta;
    use secrecy::SecretString;
    use tower::ServiceExt;

    fn codec() -> CookieCodec {
        CookieCodec::new(false, TimeDelta::days(30), SecretString::from("gate-secret"))
    }

    fn request(cookie: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn error_of(response: Response) -> (StatusCode, String) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, value["error"].as_str().unwrap_or_default().to_string())
    }

    #[test]
    fn optout_gate_halts_with_no_content() {
        let mut req = request(Some("optout=1"));
        match OptOutGate.inspect(&mut req) {
            ControlFlow::Break(response) => assert_eq!(response.status(), StatusCode::NO_CONTENT),
            ControlFlow::Continue(()) => panic!("opt-out gate let the request through"),
        }
        assert!(OptOutGate.inspect(&mut request(None)).is_continue());
    }

    #[tokio::test]
    async fn identity_gate_rejects_missing_cookie() {
        let mut req = request(Some("user="));
        let ControlFlow::Break(response) = IdentityGate.inspect(&mut req) else {
            panic!("identity gate let an empty cookie through");
        };
        let (status, message) = error_of(response).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(message, GateFailure::MissingIdentity.to_string());
    }

    #[test]
    fn identity_gate_stores_value_under_private_key() {
        let mut req = request(Some("user=abc"));
        assert!(IdentityGate.inspect(&mut req).is_continue());
        assert_eq!(
            req.extensions().get::<IdentityValue>().map(|v| v.0.as_str()),
            Some("abc")
        );
        assert!(req.extensions().get::<String>().is_none());
    }

    #[tokio::test]
    async fn session_gate_accepts_signed_cookie() {
        let codec = codec();
        let cookie = codec.session_cookie("account-user-1", Utc::now()).unwrap();
        let mut req = request(Some(&cookie.pair()));
        assert!(AccountSessionGate::new(codec).inspect(&mut req).is_continue());
        assert_eq!(
            req.extensions().get::<SessionValue>().map(|v| v.0.as_str()),
            Some("account-user-1")
        );
    }

    #[tokio::test]
    async fn session_gate_rejects_aged_out_cookie() {
        let codec = codec();
        let issued = Utc::now() - TimeDelta::hours(25);
        let token = codec.signer().sign("account-user-1", issued).unwrap();
        let mut req = request(Some(&format!("auth={token}")));
        let ControlFlow::Break(response) = AccountSessionGate::new(codec).inspect(&mut req) else {
            panic!("expired session accepted");
        };
        let (status, message) = error_of(response).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(message, GateFailure::Unauthenticated.to_string());
    }

    #[tokio::test]
    async fn session_gate_rejects_identity_value() {
        let mut req = request(Some("auth=abc"));
        assert!(AccountSessionGate::new(codec()).inspect(&mut req).is_break());
    }

    #[test]
    fn first_halting_gate_wins() {
        let chain = Chain::new()
            .then(Arc::new(OptOutGate))
            .then(Arc::new(IdentityGate));
        assert_eq!(chain.names(), vec!["opt-out", "identity"]);

        let mut req = request(Some("optout=1"));
        let ControlFlow::Break(response) = chain.run(&mut req) else {
            panic!("chain let an opted-out request through");
        };
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(req.extensions().get::<IdentityValue>().is_none());
    }

    #[tokio::test]
    async fn enforce_skips_handler_on_halt() {
        let chain = Chain::new().then(Arc::new(IdentityGate));
        let app = Router::new()
            .route(
                "/",
                get(|UserIdentity(user): UserIdentity| async move { user }),
            )
            .route_layer(axum::middleware::from_fn_with_state(chain, enforce));

        let response = app.clone().oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(request(Some("user=abc"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"abc");
    }

    #[tokio::test]
    async fn extractor_without_gate_is_rejected() {
        let app = Router::new().route(
            "/",
            get(|AccountSession(id): AccountSession| async move { id }),
        );
        let response = app.oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
