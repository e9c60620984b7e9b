//! Database row types. These map directly to SQLite rows; conversion into the
//! shared domain types happens here so callers never see raw tags.

use anyhow::{Result, anyhow};
use bulletin_types::models::{Identity, Message, Role, Website};
use chrono::{DateTime, Utc};

pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: String,
    pub email_verified_at: Option<i64>,
    pub created_at: String,
}

impl UserRow {
    pub fn role(&self) -> Result<Role> {
        self.role
            .parse()
            .map_err(|e| anyhow!("Corrupt role on user {}: {}", self.id, e))
    }

    pub fn is_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// Fields needed to insert a new user.
pub struct NewUser<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
}

/// A live session joined with the user it belongs to.
pub struct SessionUserRow {
    pub user_id: i64,
    pub email: String,
    pub role: String,
}

impl SessionUserRow {
    pub fn into_identity(self) -> Result<Identity> {
        let role = self
            .role
            .parse()
            .map_err(|e| anyhow!("Corrupt role on user {}: {}", self.user_id, e))?;
        Ok(Identity::user(self.user_id, self.email, role))
    }
}

pub struct InvitationRow {
    pub id: i64,
    pub email: String,
    pub invited_by: Option<i64>,
    /// "first last" of the inviter, absent once the inviter is deleted.
    pub inviter_name: Option<String>,
}

pub struct WebsiteRow {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub staging: bool,
}

impl From<WebsiteRow> for Website {
    fn from(row: WebsiteRow) -> Self {
        Website {
            id: row.id,
            name: row.name,
            url: row.url,
            staging: row.staging,
        }
    }
}

pub struct MessageRow {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub kind: String,
    pub language: String,
    pub display_from: i64,
    pub display_to: i64,
    pub user_id: Option<i64>,
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        Ok(Message {
            kind: self
                .kind
                .parse()
                .map_err(|e| anyhow!("Corrupt kind on message {}: {}", self.id, e))?,
            language: self
                .language
                .parse()
                .map_err(|e| anyhow!("Corrupt language on message {}: {}", self.id, e))?,
            display_from: from_unix(self.display_from)?,
            display_to: from_unix(self.display_to)?,
            id: self.id,
            title: self.title,
            body: self.body,
            author_id: self.user_id,
        })
    }
}

/// Mutable fields of a message, already validated.
#[derive(Debug)]
pub struct MessageDraft {
    pub title: String,
    pub body: String,
    pub kind: bulletin_types::models::MessageKind,
    pub language: bulletin_types::models::Language,
    pub display_from: DateTime<Utc>,
    pub display_to: DateTime<Utc>,
}

pub fn from_unix(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("Timestamp out of range: {}", secs))
}
