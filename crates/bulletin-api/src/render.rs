//! Response shapes shared by the web handlers. Pages are handed to the
//! rendering layer as serialized view models.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

pub fn page<T: Serialize>(view: T) -> Response {
    Json(view).into_response()
}

/// Redirect for in-page form submissions: a 200 carrying `HX-Redirect`, so
/// the page script navigates instead of swapping the fragment.
pub fn hx_redirect(to: &'static str) -> Response {
    let mut response = StatusCode::OK.into_response();
    response
        .headers_mut()
        .insert("HX-Redirect", HeaderValue::from_static(to));
    response
}

/// Plain `302 Found`.
pub fn found(to: &'static str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, to)]).into_response()
}
