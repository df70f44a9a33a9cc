use utoipa::OpenApi;

use super::{
    error::ErrorBody,
    handlers::{accounts, deleted, events, exchange, health, login, optout},
};
use crate::persistence::{Account, AccountUser, Event};

// Info (title, version, description, license) comes from Cargo.toml.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        optout::opt_out,
        optout::opt_in,
        exchange::get_public_key,
        exchange::post_user_secret,
        accounts::get_account,
        deleted::get_deleted_events,
        deleted::get_deleted_user_events,
        deleted::purge_events,
        login::get_login,
        login::post_login,
        login::post_logout,
        login::post_change_password,
        login::post_change_email,
        login::post_forgot_password,
        login::post_reset_password,
        events::get_events,
        events::post_event,
        events::post_anonymous_event,
    ),
    components(schemas(ErrorBody, Event, Account, AccountUser)),
    tags(
        (name = "health", description = "Service health"),
        (name = "optout", description = "Opt-out cookie management"),
        (name = "exchange", description = "Key exchange and identity issuance"),
        (name = "accounts", description = "Account data for logged in users"),
        (name = "events", description = "Event ingestion, retrieval and deletion"),
        (name = "login", description = "Account sessions and credentials"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
