use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use tracing::error;

use bulletin_types::models::Identity;

use crate::state::AppState;

pub const SESSION_COOKIE: &str = "user-session";
pub const LOGIN_PATH: &str = "/login";

/// Resolve the session cookie into an [`Identity`] and attach it to the
/// request. Never rejects: requests without a live session carry the
/// anonymous identity.
pub async fn resolve_identity(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let identity = match jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        Some(token) if !token.is_empty() => {
            let auth_state = state.clone();
            tokio::task::spawn_blocking(move || auth_state.auth.authenticate(&token, Utc::now()))
                .await
                .unwrap_or_else(|e| {
                    error!("spawn_blocking join error: {}", e);
                    Identity::anonymous()
                })
        }
        _ => Identity::anonymous(),
    };

    req.extensions_mut().insert(identity);
    next.run(req).await
}

/// Redirect to the login page unless the request carries a logged-in identity.
pub async fn require_login(req: Request, next: Next) -> Response {
    let logged_in = req
        .extensions()
        .get::<Identity>()
        .is_some_and(|identity| identity.logged_in);

    if !logged_in {
        return Redirect::to(LOGIN_PATH).into_response();
    }

    next.run(req).await
}
