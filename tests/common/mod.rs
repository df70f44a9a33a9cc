//! In-memory collaborators for driving the router without Postgres.
//!
//! Every call is recorded by name so tests can assert that a gate stopped a
//! request before any persistence happened.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        Method, Request, Response, StatusCode,
    },
    Router,
};
use secrecy::SecretString;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use tower::ServiceExt;
use umbra::{
    api::{self, AppConfig},
    mailer::{Mailer, Message},
    persistence::{self, Account, AccountUser, Database, Event, PersistenceError},
};

pub const ACCOUNT_ID: &str = "account-1";
pub const OTHER_ACCOUNT_ID: &str = "account-2";
pub const ACCOUNT_USER_ID: &str = "2d1f3c4e-5a6b-4c7d-8e9f-0a1b2c3d4e5f";
pub const EMAIL: &str = "develop@umbra.dev";
pub const PASSWORD: &str = "develop";
/// Belongs to another account user.
pub const TAKEN_EMAIL: &str = "taken@umbra.dev";

#[derive(Default)]
struct State {
    calls: Vec<&'static str>,
    events: Vec<Event>,
    secrets: HashMap<(String, String), String>,
    password: String,
    email: String,
    one_time_key: Option<String>,
}

pub struct MockDb {
    state: Mutex<State>,
}

impl MockDb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                password: PASSWORD.to_string(),
                email: EMAIL.to_string(),
                ..State::default()
            }),
        })
    }

    fn record(&self, call: &'static str) -> MutexGuard<'_, State> {
        let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());
        state.calls.push(call);
        state
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn calls(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == call).count()
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.len()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    pub fn secret(&self, account_id: &str, user_id: &str) -> Option<String> {
        self.state()
            .secrets
            .get(&(account_id.to_string(), user_id.to_string()))
            .cloned()
    }

    pub fn add_event(&self, event_id: &str, user_id: Option<&str>) {
        self.state().events.push(Event {
            event_id: event_id.to_string(),
            account_id: ACCOUNT_ID.to_string(),
            user_id: user_id.map(ToString::to_string),
            payload: "encrypted".to_string(),
        });
    }

    fn account_user(email: &str) -> AccountUser {
        AccountUser {
            account_user_id: ACCOUNT_USER_ID.to_string(),
            email: email.to_string(),
            account_ids: vec![ACCOUNT_ID.to_string()],
        }
    }
}

fn newer(event: &Event, since: Option<&str>) -> bool {
    since.map_or(true, |since| event.event_id.as_str() > since)
}

#[async_trait]
impl Database for MockDb {
    async fn check_health(&self) -> persistence::Result<()> {
        self.record("check_health");
        Ok(())
    }

    async fn get_public_key(&self, account_id: &str) -> persistence::Result<String> {
        self.record("get_public_key");
        if account_id == ACCOUNT_ID {
            Ok("public-key".to_string())
        } else {
            Err(PersistenceError::NotFound)
        }
    }

    async fn associate_user_secret(
        &self,
        account_id: &str,
        user_id: &str,
        encrypted_user_secret: &str,
    ) -> persistence::Result<()> {
        let mut state = self.record("associate_user_secret");
        if account_id != ACCOUNT_ID {
            return Err(PersistenceError::NotFound);
        }
        state.secrets.insert(
            (account_id.to_string(), user_id.to_string()),
            encrypted_user_secret.to_string(),
        );
        Ok(())
    }

    async fn insert_event(
        &self,
        account_id: &str,
        user_id: Option<&str>,
        payload: &str,
    ) -> persistence::Result<String> {
        let mut state = self.record("insert_event");
        let event_id = format!("event-{:04}", state.events.len() + 1);
        state.events.push(Event {
            event_id: event_id.clone(),
            account_id: account_id.to_string(),
            user_id: user_id.map(ToString::to_string),
            payload: payload.to_string(),
        });
        Ok(event_id)
    }

    async fn query_events(
        &self,
        user_id: &str,
        since: Option<&str>,
    ) -> persistence::Result<Vec<Event>> {
        let state = self.record("query_events");
        Ok(state
            .events
            .iter()
            .filter(|event| event.user_id.as_deref() == Some(user_id) && newer(event, since))
            .cloned()
            .collect())
    }

    async fn get_deleted_events(
        &self,
        event_ids: &[String],
        user_id: Option<&str>,
    ) -> persistence::Result<Vec<String>> {
        let state = self.record("get_deleted_events");
        Ok(event_ids
            .iter()
            .filter(|id| {
                !state.events.iter().any(|event| {
                    &event.event_id == *id
                        && user_id.map_or(true, |user| event.user_id.as_deref() == Some(user))
                })
            })
            .cloned()
            .collect())
    }

    async fn purge_events(&self, user_id: &str) -> persistence::Result<()> {
        let mut state = self.record("purge_events");
        state
            .events
            .retain(|event| event.user_id.as_deref() != Some(user_id));
        Ok(())
    }

    async fn get_account(
        &self,
        account_id: &str,
        since: Option<&str>,
    ) -> persistence::Result<Account> {
        let state = self.record("get_account");
        if account_id != ACCOUNT_ID && account_id != OTHER_ACCOUNT_ID {
            return Err(PersistenceError::NotFound);
        }
        Ok(Account {
            account_id: account_id.to_string(),
            name: "Develop".to_string(),
            public_key: "public-key".to_string(),
            events: state
                .events
                .iter()
                .filter(|event| event.account_id == account_id && newer(event, since))
                .cloned()
                .collect(),
        })
    }

    async fn lookup_account_user(&self, account_user_id: &str) -> persistence::Result<AccountUser> {
        let state = self.record("lookup_account_user");
        if account_user_id == ACCOUNT_USER_ID {
            Ok(Self::account_user(&state.email))
        } else {
            Err(PersistenceError::NotFound)
        }
    }

    async fn login(&self, email: &str, password: &str) -> persistence::Result<AccountUser> {
        let state = self.record("login");
        if email == state.email && password == state.password {
            Ok(Self::account_user(&state.email))
        } else {
            Err(PersistenceError::Unauthorized)
        }
    }

    async fn change_password(
        &self,
        account_user_id: &str,
        current_password: &str,
        changed_password: &str,
    ) -> persistence::Result<()> {
        let mut state = self.record("change_password");
        if account_user_id != ACCOUNT_USER_ID {
            return Err(PersistenceError::NotFound);
        }
        if current_password != state.password {
            return Err(PersistenceError::Unauthorized);
        }
        state.password = changed_password.to_string();
        Ok(())
    }

    async fn change_email(
        &self,
        account_user_id: &str,
        email: &str,
        password: &str,
    ) -> persistence::Result<()> {
        let mut state = self.record("change_email");
        if account_user_id != ACCOUNT_USER_ID {
            return Err(PersistenceError::NotFound);
        }
        if password != state.password {
            return Err(PersistenceError::Unauthorized);
        }
        if email == TAKEN_EMAIL {
            return Err(PersistenceError::Conflict);
        }
        state.email = email.to_string();
        Ok(())
    }

    async fn generate_one_time_key(&self, email: &str) -> persistence::Result<String> {
        let mut state = self.record("generate_one_time_key");
        if email != state.email {
            return Err(PersistenceError::NotFound);
        }
        let key = "one-time-key".to_string();
        state.one_time_key = Some(key.clone());
        Ok(key)
    }

    async fn reset_password(
        &self,
        email: &str,
        password: &str,
        one_time_key: &str,
    ) -> persistence::Result<()> {
        let mut state = self.record("reset_password");
        if email != state.email || state.one_time_key.as_deref() != Some(one_time_key) {
            return Err(PersistenceError::Unauthorized);
        }
        state.password = password.to_string();
        state.one_time_key = None;
        Ok(())
    }
}

#[derive(Default)]
pub struct MockMailer {
    sent: Mutex<Vec<Message>>,
    fail: bool,
}

impl MockMailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }
}

impl Mailer for MockMailer {
    fn send(&self, message: &Message) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(message.clone());
        if self.fail {
            return Err(anyhow!("smtp unavailable"));
        }
        Ok(())
    }
}

pub fn app(db: &Arc<MockDb>, mailer: &Arc<MockMailer>) -> Router {
    api::router(
        AppConfig::new(
            db.clone(),
            mailer.clone(),
            SecretString::from("integration-test-secret"),
        )
        .with_frontend_base_url("https://umbra.dev".to_string()),
    )
}

pub struct TestResponse {
    pub status: StatusCode,
    pub set_cookies: Vec<String>,
    pub body: Vec<u8>,
}

impl TestResponse {
    async fn from_response(response: Response<Body>) -> Result<Self> {
        let status = response.status();
        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(ToString::to_string)
            .collect();
        let body = to_bytes(response.into_body(), usize::MAX).await?.to_vec();
        Ok(Self {
            status,
            set_cookies,
            body,
        })
    }

    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// The `Set-Cookie` header written for `name`, if any.
    pub fn set_cookie(&self, name: &str) -> Option<&str> {
        let prefix = format!("{name}=");
        self.set_cookies
            .iter()
            .find(|cookie| cookie.starts_with(&prefix))
            .map(String::as_str)
    }

    /// The `name=value` pair of a written cookie, ready to send back.
    pub fn cookie_pair(&self, name: &str) -> Option<String> {
        self.set_cookie(name)
            .and_then(|cookie| cookie.split(';').next())
            .map(ToString::to_string)
    }
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<serde_json::Value>,
) -> Result<TestResponse> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json)?)
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body)?).await?;
    TestResponse::from_response(response).await
}
