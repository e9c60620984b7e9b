use axum::{
    extract::Query,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::debug;

use bulletin_types::api::SetLanguageQuery;
use bulletin_types::models::Language;

/// Preferred content language, read as the default for new messages.
pub const LANG_COOKIE: &str = "lang";

/// GET /set-language?lang=
///
/// Unknown tags fall back to the default language.
pub async fn set_language(jar: CookieJar, Query(query): Query<SetLanguageQuery>) -> Response {
    let language = query.lang.parse::<Language>().unwrap_or_else(|_| {
        debug!("Unknown language tag {:?}, using default", query.lang);
        Language::default()
    });

    let cookie = Cookie::build((LANG_COOKIE, language.as_str()))
        .path("/")
        .same_site(SameSite::Lax);

    (jar.add(cookie), Redirect::to("/")).into_response()
}
