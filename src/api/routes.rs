//! Route table.
//!
//! Every endpoint is registered with the gate chain that guards it. The table
//! is built once and turned into an axum [`Router`]; it cannot change
//! afterwards. Unmatched paths and methods answer with the JSON 404 body.

use axum::{
    handler::Handler,
    http::Method,
    middleware::from_fn_with_state,
    routing::{self, MethodRouter},
    Router,
};
use std::{collections::BTreeMap, fmt, sync::Arc};

use super::{
    config::AppState,
    error::not_found,
    gates::{enforce, AccountSessionGate, Chain, Gate, IdentityGate, OptOutGate},
    handlers::{accounts, deleted, events, exchange, health, login, optout},
};

struct Route {
    method: Method,
    path: &'static str,
    chain: Chain,
    endpoint: MethodRouter,
}

#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get<H, T>(self, path: &'static str, chain: Chain, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.push(Method::GET, path, chain, routing::get(handler))
    }

    #[must_use]
    pub fn post<H, T>(self, path: &'static str, chain: Chain, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.push(Method::POST, path, chain, routing::post(handler))
    }

    fn push(mut self, method: Method, path: &'static str, chain: Chain, endpoint: MethodRouter) -> Self {
        let endpoint = if chain.is_empty() {
            endpoint
        } else {
            endpoint.route_layer(from_fn_with_state(chain.clone(), enforce))
        };
        self.routes.push(Route {
            method,
            path,
            chain,
            endpoint,
        });
        self
    }

    /// `(method, path, gate names)` for every registered route, in
    /// registration order.
    #[must_use]
    pub fn routes(&self) -> Vec<(Method, &'static str, Vec<&'static str>)> {
        self.routes
            .iter()
            .map(|route| (route.method.clone(), route.path, route.chain.names()))
            .collect()
    }

    #[must_use]
    pub fn into_router(self) -> Router {
        // Methods sharing a path have to live in one MethodRouter.
        let mut by_path: BTreeMap<&'static str, MethodRouter> = BTreeMap::new();
        for route in self.routes {
            let endpoint = match by_path.remove(route.path) {
                Some(existing) => existing.merge(route.endpoint),
                None => route.endpoint,
            };
            by_path.insert(route.path, endpoint);
        }

        by_path
            .into_iter()
            .fold(Router::new(), |router, (path, endpoint)| {
                router.route(path, endpoint.fallback(not_found))
            })
            .fallback(not_found)
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for route in &self.routes {
            list.entry(&format_args!("{} {} {:?}", route.method, route.path, route.chain));
        }
        list.finish()
    }
}

/// The routes served by the API, each behind its gate chain.
#[must_use]
pub fn route_table(state: &AppState) -> RouteTable {
    let optout: Arc<dyn Gate> = Arc::new(OptOutGate);
    let identity: Arc<dyn Gate> = Arc::new(IdentityGate);
    let session: Arc<dyn Gate> = Arc::new(AccountSessionGate::new(state.cookies.clone()));

    let open = Chain::new;
    let user = || Chain::new().then(identity.clone());
    let account = || Chain::new().then(session.clone());
    let tracked = || Chain::new().then(optout.clone()).then(identity.clone());

    RouteTable::new()
        .get("/healthz", open(), health::health)
        .get("/opt-out", open(), optout::opt_out)
        .post("/opt-out", open(), optout::opt_out)
        .get("/opt-in", open(), optout::opt_in)
        .post("/opt-in", open(), optout::opt_in)
        .get("/exchange", open(), exchange::get_public_key)
        .post("/exchange", open(), exchange::post_user_secret)
        .get("/accounts/:account_id", account(), accounts::get_account)
        .post("/deleted", open(), deleted::get_deleted_events)
        .post("/deleted/user", user(), deleted::get_deleted_user_events)
        .post("/purge", user(), deleted::purge_events)
        .get("/login", account(), login::get_login)
        .post("/login", open(), login::post_login)
        .post("/logout", open(), login::post_logout)
        .post("/change-password", account(), login::post_change_password)
        .post("/change-email", account(), login::post_change_email)
        .post("/forgot-password", open(), login::post_forgot_password)
        .post("/reset-password", open(), login::post_reset_password)
        .get("/events", tracked(), events::get_events)
        .post("/events", tracked(), events::post_event)
        .post(
            "/events/anonymous",
            Chain::new().then(optout.clone()),
            events::post_anonymous_event,
        )
}
