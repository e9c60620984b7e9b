use std::collections::BTreeMap;

use axum::{
    Extension, Form,
    extract::{Path, State},
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use bulletin_db::Database;
use bulletin_db::models::MessageDraft;
use bulletin_types::models::{Identity, Language, Message, MessageKind};
use bulletin_types::views::{
    FieldErrors, MessageEditPage, MessageFormSettings, MessageFormValues, MessageListItem,
    MessagesIndexPage,
};

use crate::error::AppError;
use crate::forms::{self, BindError, Bound, Field, FormData, FromForm, Rule, Schema};
use crate::language::LANG_COOKIE;
use crate::render::{hx_redirect, page};
use crate::state::{AppState, blocking};

const MESSAGES_PATH: &str = "/messages";

#[derive(Debug)]
pub struct MessageForm {
    pub title: String,
    pub message: String,
    pub kind: String,
    pub language: String,
    pub date_range_from: String,
    pub date_range_to: String,
    pub websites: Vec<String>,
}

impl FromForm for MessageForm {
    const SCHEMA: Schema = Schema::new(&[
        Field::text("dateRangeFrom", &[Rule::Required]),
        Field::text("dateRangeTo", &[Rule::Required]),
        Field::text("message", &[Rule::Required]),
        Field::text("title", &[Rule::Required, Rule::MaxLen(255)]),
        Field::text("type", &[Rule::Required, Rule::OneOf(MessageKind::TAGS)]),
        Field::text("language", &[Rule::Required, Rule::OneOf(Language::TAGS)]),
        Field::list("websites", &[]),
    ]);

    fn from_bound(bound: &Bound) -> Result<Self, BindError> {
        Ok(Self {
            title: bound.text("title")?,
            message: bound.text("message")?,
            kind: bound.text("type")?,
            language: bound.text("language")?,
            date_range_from: bound.text("dateRangeFrom")?,
            date_range_to: bound.text("dateRangeTo")?,
            websites: bound.strings("websites")?,
        })
    }
}

impl MessageForm {
    /// Parses the display window and website ids. Unparseable timestamps and
    /// inverted or empty windows are reported against the offending field.
    pub fn into_draft(self) -> Result<(MessageDraft, Vec<i64>), FieldErrors> {
        let mut errors = FieldErrors::new();

        let display_from = parse_timestamp(&self.date_range_from);
        let display_to = parse_timestamp(&self.date_range_to);
        if display_from.is_none() {
            errors.add("dateRangeFrom", "Invalid date");
        }
        if display_to.is_none() {
            errors.add("dateRangeTo", "Invalid date");
        }
        if let (Some(from), Some(to)) = (display_from, display_to) {
            if from >= to {
                errors.add("dateRangeTo", "End date must be after start date");
            }
        }

        let mut website_ids = Vec::with_capacity(self.websites.len());
        for raw in &self.websites {
            match raw.trim().parse::<i64>() {
                Ok(id) => website_ids.push(id),
                Err(_) => errors.add("websites", "Invalid website"),
            }
        }

        let kind = match self.kind.parse::<MessageKind>() {
            Ok(kind) => Some(kind),
            Err(_) => {
                errors.add("type", "Invalid message type");
                None
            }
        };
        let language = match self.language.parse::<Language>() {
            Ok(language) => Some(language),
            Err(_) => {
                errors.add("language", "Invalid language");
                None
            }
        };

        match (display_from, display_to, kind, language) {
            (Some(display_from), Some(display_to), Some(kind), Some(language)) if errors.is_empty() => {
                let draft = MessageDraft {
                    title: self.title,
                    body: self.message,
                    kind,
                    language,
                    display_from,
                    display_to,
                };
                Ok((draft, website_ids))
            }
            _ => Err(errors),
        }
    }
}

/// RFC 3339, truncated to whole seconds: the store keeps unix seconds, so
/// the window is compared at that precision.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .and_then(|dt| DateTime::from_timestamp(dt.timestamp(), 0))
}

/// Choices and bounds shown next to the message form.
fn form_settings(db: &Database, now: DateTime<Utc>) -> MessageFormSettings {
    let websites = match db.list_websites() {
        Ok(rows) => rows
            .into_iter()
            .map(|w| (w.id.to_string(), format!("{} ({})", w.name, w.url)))
            .collect(),
        Err(e) => {
            warn!("Failed to load websites for message form: {}", e);
            BTreeMap::new()
        }
    };

    MessageFormSettings {
        date_min: now,
        date_max: now + Duration::days(365),
        websites,
        kinds: MessageKind::TAGS,
        languages: Language::TAGS,
    }
}

/// Every submitted id must name an existing website.
fn check_websites(db: &Database, ids: &[i64]) -> Result<(), AppError> {
    let existing = db.existing_website_ids(ids)?;
    if ids.iter().all(|id| existing.contains(id)) {
        Ok(())
    } else {
        Err(AppError::field("websites", "Unknown website"))
    }
}

// -- Handlers --

/// GET /messages
pub async fn list_messages(State(state): State<AppState>, jar: CookieJar) -> Result<Response, AppError> {
    let language = jar
        .get(LANG_COOKIE)
        .and_then(|c| c.value().parse::<Language>().ok())
        .unwrap_or_default();

    let view = blocking(&state, move |s| {
        let now = Utc::now();
        let messages = s
            .db
            .list_messages()?
            .into_iter()
            .map(|row| row.into_message().map(|m| list_item(m, now)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(MessagesIndexPage {
            messages,
            form_values: MessageFormValues {
                language: language.as_str().to_string(),
                ..Default::default()
            },
            form_settings: form_settings(&s.db, now),
        })
    })
    .await?;

    Ok(page(view))
}

fn list_item(message: Message, now: DateTime<Utc>) -> MessageListItem {
    MessageListItem {
        status: message.status(now),
        id: message.id,
        title: message.title,
        display_from: message.display_from,
        display_to: message.display_to,
        kind: message.kind,
        language: message.language,
    }
}

/// GET /message/{id}
pub async fn get_message(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Response, AppError> {
    let view = blocking(&state, move |s| {
        let message = s.db.get_message(id)?.ok_or(AppError::NotFound)?.into_message()?;
        let websites = s
            .db
            .website_ids_for_message(id)?
            .into_iter()
            .map(|w| w.to_string())
            .collect();

        Ok(MessageEditPage {
            form_values: MessageFormValues {
                id: Some(message.id),
                title: message.title,
                message: message.body,
                kind: message.kind.as_str().to_string(),
                language: message.language.as_str().to_string(),
                date_range_from: message.display_from.to_rfc3339(),
                date_range_to: message.display_to.to_rfc3339(),
                websites,
            },
            form_settings: form_settings(&s.db, Utc::now()),
        })
    })
    .await?;

    Ok(page(view))
}

/// POST /message
pub async fn create_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let form: MessageForm = forms::parse(&FormData::from(fields))?;
    let (draft, website_ids) = form.into_draft()?;

    let author_id = identity.user_id;
    let id = blocking(&state, move |s| {
        check_websites(&s.db, &website_ids)?;
        Ok(s.db.create_message(author_id, &draft, &website_ids)?)
    })
    .await?;

    info!("Message {} created by user {}", id, author_id);
    Ok(hx_redirect(MESSAGES_PATH))
}

/// PATCH /message/{id}
pub async fn update_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let form: MessageForm = forms::parse(&FormData::from(fields))?;
    let (draft, website_ids) = form.into_draft()?;

    blocking(&state, move |s| {
        check_websites(&s.db, &website_ids)?;
        if s.db.update_message(id, &draft, &website_ids)? {
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    })
    .await?;

    info!("Message {} updated", id);
    Ok(hx_redirect(MESSAGES_PATH))
}

/// DELETE /message/{id}
pub async fn delete_message(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Response, AppError> {
    blocking(&state, move |s| {
        if s.db.delete_message(id)? {
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    })
    .await?;

    info!("Message {} deleted", id);
    Ok(hx_redirect(MESSAGES_PATH))
}
