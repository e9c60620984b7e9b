use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Returned by the `FromStr` impls below when a stored or submitted tag is
/// not one of the known values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

// -- Roles --

/// Two-level role model: `Admin` satisfies every requirement, `User` only `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::User, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    pub fn satisfies(&self, required: Role) -> bool {
        match self {
            Self::Admin => true,
            Self::User => required == Role::User,
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- Messages --

/// Category tag shown alongside a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Info,
    Warning,
    Danger,
}

impl MessageKind {
    pub const TAGS: &'static [&'static str] = &["info", "warning", "danger"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}

impl FromStr for MessageKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "danger" => Ok(Self::Danger),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Languages a message can be written in and the public API can be asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Fr,
}

impl Language {
    pub const TAGS: &'static [&'static str] = &["en", "fr"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Fr => "fr",
        }
    }
}

impl FromStr for Language {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" => Ok(Self::En),
            "fr" => Ok(Self::Fr),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Displayed status of a message. Never stored, recomputed from the display
/// window on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Scheduled,
    Active,
    Expired,
}

impl MessageStatus {
    pub fn at(display_from: DateTime<Utc>, display_to: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now < display_from {
            Self::Scheduled
        } else if now > display_to {
            Self::Expired
        } else {
            Self::Active
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub kind: MessageKind,
    pub language: Language,
    pub display_from: DateTime<Utc>,
    pub display_to: DateTime<Utc>,
    pub author_id: Option<i64>,
}

impl Message {
    pub fn status(&self, now: DateTime<Utc>) -> MessageStatus {
        MessageStatus::at(self.display_from, self.display_to, now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Website {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub staging: bool,
}

// -- Identity --

/// Who is making the current request. Resolved once per request by the
/// session middleware and passed to handlers as an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
    pub logged_in: bool,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            user_id: 0,
            email: String::new(),
            role: Role::User,
            logged_in: false,
        }
    }

    pub fn user(user_id: i64, email: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            email: email.into(),
            role,
            logged_in: true,
        }
    }
}
