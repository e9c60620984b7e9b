//! Page data handed to the rendering layer. Field names follow the form
//! field names the pages submit back.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Language, MessageKind, MessageStatus, Role};

/// Field name -> message of the first rule that failed for that field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` for `field` unless the field already has one.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }
}

// -- Auth --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPage {
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupPage {
    pub invite_only: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmEmailPage {
    pub email: String,
    pub verification_required: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePage {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<String>,
}

// -- Messages --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageListItem {
    pub id: i64,
    pub title: String,
    pub display_from: DateTime<Utc>,
    pub display_to: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub language: Language,
    pub status: MessageStatus,
}

/// Values shared by the create form and the edit page.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFormValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub language: String,
    pub date_range_from: String,
    pub date_range_to: String,
    pub websites: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFormSettings {
    pub date_min: DateTime<Utc>,
    pub date_max: DateTime<Utc>,
    /// Website id -> "name (url)".
    pub websites: BTreeMap<String, String>,
    pub kinds: &'static [&'static str],
    pub languages: &'static [&'static str],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesIndexPage {
    pub messages: Vec<MessageListItem>,
    pub form_values: MessageFormValues,
    pub form_settings: MessageFormSettings,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEditPage {
    pub form_values: MessageFormValues,
    pub form_settings: MessageFormSettings,
}

// -- Websites --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteListItem {
    pub id: i64,
    pub name: String,
    pub domain: String,
    pub staging: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsitesIndexPage {
    pub websites: Vec<WebsiteListItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteEditPage {
    pub id: i64,
    pub name: String,
    pub domain: String,
    pub staging: bool,
}

// -- Users --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListItem {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationListItem {
    pub id: i64,
    pub email: String,
    pub invited_by: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersIndexPage {
    pub users: Vec<UserListItem>,
    pub invitations: Vec<InvitationListItem>,
    pub roles: Vec<Role>,
}
