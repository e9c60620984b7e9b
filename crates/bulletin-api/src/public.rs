//! Public read API consumed by partner websites.

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use bulletin_db::Database;
use bulletin_types::api::{PublicMessage, PublicMessagesQuery, PublicMessagesResponse};
use bulletin_types::models::Language;

use crate::forms::is_valid_domain;
use crate::state::AppState;

/// Prepended to the body of messages a staging site sees before their window opens.
pub const PREVIEW_PREFIX: &str = "[Preview] ";

#[derive(Debug, Error)]
pub enum PublicQueryError {
    #[error("Unknown domain")]
    UnknownDomain,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Host part of an `Origin` value: scheme, port and any path are dropped.
pub fn extract_domain(origin: &str) -> String {
    let rest = origin
        .split_once("://")
        .map_or(origin, |(_, rest)| rest);
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = host.rsplit_once(':').map_or(host, |(host, _)| host);
    host.trim().to_ascii_lowercase()
}

/// Messages `domain` should display in `language` at `now`.
pub fn query_messages(
    db: &Database,
    domain: &str,
    language: Language,
    now: DateTime<Utc>,
) -> Result<Vec<PublicMessage>, PublicQueryError> {
    let website = db
        .get_website_by_url(domain)?
        .ok_or(PublicQueryError::UnknownDomain)?;

    let rows = db.visible_messages(website.id, language, now, website.staging)?;
    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        let message = row.into_message()?;
        let body = if website.staging && message.display_from > now {
            format!("{}{}", PREVIEW_PREFIX, message.body)
        } else {
            message.body
        };
        messages.push(PublicMessage {
            title: message.title,
            message: body,
        });
    }
    Ok(messages)
}

fn bad_request(response: PublicMessagesResponse, error: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(response.with_error(error))).into_response()
}

/// GET /api/messages?language=
pub async fn get_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PublicMessagesQuery>,
) -> Response {
    let domain = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(extract_domain)
        .unwrap_or_default();
    let response = PublicMessagesResponse::new(domain.clone());

    if !is_valid_domain(&domain) {
        return bad_request(response, "Invalid domain");
    }

    let Ok(language) = query.language.parse::<Language>() else {
        return bad_request(response, "Invalid language");
    };

    let db = state.db.clone();
    let lookup_domain = domain.clone();
    let result = tokio::task::spawn_blocking(move || {
        query_messages(&db, &lookup_domain, language, Utc::now())
    })
    .await
    .unwrap_or_else(|e| Err(PublicQueryError::Internal(anyhow::anyhow!("join error: {}", e))));

    match result {
        Ok(messages) => {
            debug!("Serving {} messages to {}", messages.len(), domain);
            Json(PublicMessagesResponse { messages, ..response }).into_response()
        }
        Err(PublicQueryError::UnknownDomain) => bad_request(response, "Unknown domain"),
        Err(PublicQueryError::Internal(e)) => {
            warn!("Public message query for {} failed: {:#}", domain, e);
            Json(response).into_response()
        }
    }
}
