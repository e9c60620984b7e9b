use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

/// Longest session lifetime accepted from the environment: ten years.
const MAX_SESSION_EXPIRY_HOURS: i64 = 24 * 365 * 10;

/// Server settings read from `BULLETIN_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub session_expiry_hours: i64,
    pub invite_only: bool,
    pub skip_verify: bool,
    pub redirect_after_login: String,
    pub secure_cookies: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable values fall back to their default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            host: text("BULLETIN_HOST", "0.0.0.0"),
            port: parsed(&lookup, "BULLETIN_PORT", 3000),
            db_path: text("BULLETIN_DB_PATH", "bulletin.db").into(),
            session_expiry_hours: bounded(&lookup, "BULLETIN_SESSION_EXPIRY_HOURS", 1..=MAX_SESSION_EXPIRY_HOURS, 48),
            invite_only: flag(&lookup, "BULLETIN_INVITE_ONLY", true),
            skip_verify: flag(&lookup, "BULLETIN_SKIP_VERIFY", false),
            redirect_after_login: text("BULLETIN_REDIRECT_AFTER_LOGIN", "/messages"),
            secure_cookies: flag(&lookup, "BULLETIN_SECURE_COOKIES", false),
        }
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{}={:?} is not valid, using {}", key, raw, default);
            default
        }),
    }
}

/// Like [`parsed`], but values outside `range` also fall back to `default`.
fn bounded(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    range: RangeInclusive<i64>,
    default: i64,
) -> i64 {
    let value = parsed(lookup, key, default);
    if range.contains(&value) {
        value
    } else {
        warn!(
            "{}={} is outside {}..={}, using {}",
            key,
            value,
            range.start(),
            range.end(),
            default
        );
        default
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => default,
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        Some(v) => {
            warn!("{}={:?} is not a boolean, using {}", key, v, default);
            default
        }
    }
}
