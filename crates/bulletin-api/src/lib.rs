pub mod acl;
pub mod auth;
pub mod error;
pub mod forms;
pub mod language;
pub mod messages;
pub mod middleware;
pub mod public;
pub mod render;
pub mod session;
pub mod state;
pub mod users;
pub mod websites;

use std::any::Any;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer};
use tracing::error;

use crate::render::found;
use crate::state::AppState;

const HOME_PATH: &str = "/messages";

/// Build the application router. `/api` is open to any origin; everything
/// outside the public group redirects anonymous callers to the login page.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/signup", get(auth::signup_page).post(auth::signup))
        .route("/email/verify", get(auth::verify_email))
        .route("/set-language", get(language::set_language));

    let api = Router::new()
        .route("/api/messages", get(public::get_messages))
        .layer(CorsLayer::permissive());

    let protected = Router::new()
        .route("/", get(|| async { found(HOME_PATH) }))
        .route("/messages", get(messages::list_messages))
        .route(
            "/message",
            get(|| async { found(HOME_PATH) }).post(messages::create_message),
        )
        .route(
            "/message/{id}",
            get(messages::get_message)
                .patch(messages::update_message)
                .delete(messages::delete_message),
        )
        .route("/websites", get(websites::list_websites))
        .route("/website", post(websites::create_website))
        .route(
            "/website/{id}",
            get(websites::get_website)
                .patch(websites::update_website)
                .delete(websites::delete_website),
        )
        .route("/users", get(users::list_users))
        .route("/user/{id}", delete(users::delete_user))
        .route("/invitation", post(users::create_invitation))
        .route("/invitation/{id}", delete(users::delete_invitation))
        .route("/profile", get(auth::profile_show).put(auth::profile_update))
        .route_layer(axum::middleware::from_fn(middleware::require_login));

    Router::new()
        .merge(public)
        .merge(api)
        .merge(protected)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::resolve_identity,
        ))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}
