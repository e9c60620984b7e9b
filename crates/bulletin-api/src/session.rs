use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{self, SaltString, rand_core::OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use chrono::{DateTime, Duration, Utc};
use rand_core::RngCore;
use thiserror::Error;
use tracing::{debug, info, warn};

use bulletin_db::Database;
use bulletin_db::models::NewUser;
use bulletin_types::models::{Identity, Role};

use crate::error::AppError;

const EMAIL_IN_USE: &str = "email already in use";

/// Verification links stay valid for an hour.
const VERIFICATION_TTL_HOURS: i64 = 1;

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub session_ttl: Duration,
    /// Signup requires an invitation (except for the very first user).
    pub invite_only: bool,
    /// Let unverified users log in.
    pub skip_verify: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            session_ttl: Duration::hours(48),
            invite_only: true,
            skip_verify: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown user")]
    UnknownUser,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("please verify your email")]
    NotVerified,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::UnknownUser | AuthError::InvalidCredentials => {
                AppError::field("credentials", &e.to_string())
            }
            AuthError::NotVerified => AppError::field("verified", &e.to_string()),
            AuthError::Internal(e) => AppError::Internal(e),
        }
    }
}

/// Account details collected by the signup form.
pub struct NewAccount<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub password: &'a str,
}

#[derive(Debug)]
pub struct SignupOutcome {
    pub user_id: i64,
    pub role: Role,
    /// Present when the account has to be verified before logging in.
    pub verification_token: Option<String>,
}

/// Issues and resolves session tokens against the credential and session stores.
pub struct Authenticator {
    db: Arc<Database>,
    settings: AuthSettings,
}

impl Authenticator {
    pub fn new(db: Arc<Database>, settings: AuthSettings) -> Self {
        Self { db, settings }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Checks credentials and opens a new session. Earlier sessions of the
    /// same user stay valid.
    pub fn login(&self, email: &str, password: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        let user = self.db.get_user_by_email(email)?.ok_or(AuthError::UnknownUser)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        if !self.settings.skip_verify && !user.is_verified() {
            return Err(AuthError::NotVerified);
        }

        let expires_at = now
            .checked_add_signed(self.settings.session_ttl)
            .ok_or_else(|| anyhow::anyhow!("Session lifetime {} overflows", self.settings.session_ttl))?;

        let token = generate_token();
        self.db.create_session(user.id, &token, expires_at)?;

        info!("User {} logged in", user.id);
        Ok(token)
    }

    /// Resolves a session token. Anything short of a live session, including
    /// store failures, yields the anonymous identity.
    pub fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Identity {
        match self.db.find_live_session(token, now) {
            Ok(Some(row)) => row.into_identity().unwrap_or_else(|e| {
                warn!("Session lookup: {}", e);
                Identity::anonymous()
            }),
            Ok(None) => Identity::anonymous(),
            Err(e) => {
                warn!("Session lookup failed: {}", e);
                Identity::anonymous()
            }
        }
    }

    /// Deletes the session; unknown tokens are not an error.
    pub fn logout(&self, token: &str) -> anyhow::Result<()> {
        self.db.delete_session(token)?;
        Ok(())
    }

    /// Creates an account. The first account on an empty store becomes admin;
    /// under invite-only every later one needs a pending invitation, which is
    /// consumed together with the insert.
    pub fn signup(&self, account: &NewAccount<'_>, now: DateTime<Utc>) -> Result<SignupOutcome, AppError> {
        if self.db.user_exists(account.email)? {
            return Err(AppError::field("email", EMAIL_IN_USE));
        }

        let role = if self.db.count_users()? == 0 {
            Role::Admin
        } else {
            Role::User
        };

        if self.settings.invite_only
            && role != Role::Admin
            && !self.db.invitation_exists(account.email)?
        {
            return Err(AppError::field("email", "you need an invite to sign up"));
        }

        let password_hash = hash_password(account.password)?;
        let user_id = self.db.create_user_from_invitation(&NewUser {
            email: account.email,
            first_name: account.first_name,
            last_name: account.last_name,
            password_hash: &password_hash,
            role,
        })
        .map_err(|e| AppError::unique_or_internal(e, "email", EMAIL_IN_USE))?;
        info!("User {} signed up with role {}", user_id, role);

        let verification_token = if self.settings.skip_verify {
            None
        } else {
            let token = generate_token();
            self.db.create_verification(
                user_id,
                &token,
                now + Duration::hours(VERIFICATION_TTL_HOURS),
            )?;
            debug!("Verification token issued for user {}", user_id);
            Some(token)
        };

        Ok(SignupOutcome {
            user_id,
            role,
            verification_token,
        })
    }

    pub fn verify_email(&self, token: &str, now: DateTime<Utc>) -> Result<i64, AppError> {
        let user_id = self
            .db
            .consume_verification(token, now)?
            .ok_or(AppError::NotFound)?;
        info!("User {} verified their email", user_id);
        Ok(user_id)
    }
}

/// Hash password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_password(password: &str, stored_hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| anyhow::anyhow!("Corrupt password hash: {}", e))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e)),
    }
}

/// 256 random bits, URL-safe base64.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    B64.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    fn authenticator(settings: AuthSettings) -> Authenticator {
        Authenticator::new(Arc::new(Database::open_in_memory().unwrap()), settings)
    }

    fn account<'a>(email: &'a str) -> NewAccount<'a> {
        NewAccount {
            email,
            first_name: "Jo",
            last_name: "Doe",
            password: "Secret!1",
        }
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("Secret!1").unwrap();
        assert!(verify_password("Secret!1", &hash).unwrap());
        assert!(!verify_password("secret!1", &hash).unwrap());
        assert!(verify_password("x", "not-a-phc-string").is_err());
    }

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn login_distinguishes_unknown_user_and_bad_password() {
        let auth = authenticator(AuthSettings { skip_verify: true, ..Default::default() });
        auth.signup(&account("jo@example.com"), now()).unwrap();

        assert!(matches!(
            auth.login("nobody@example.com", "Secret!1", now()),
            Err(AuthError::UnknownUser)
        ));
        assert!(matches!(
            auth.login("jo@example.com", "wrong", now()),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(auth.login("jo@example.com", "Secret!1", now()).is_ok());
    }

    #[test]
    fn unverified_users_cannot_log_in_until_verified() {
        let auth = authenticator(AuthSettings::default());
        let outcome = auth.signup(&account("jo@example.com"), now()).unwrap();

        assert!(matches!(
            auth.login("jo@example.com", "Secret!1", now()),
            Err(AuthError::NotVerified)
        ));

        let token = outcome.verification_token.unwrap();
        assert_eq!(auth.verify_email(&token, now()).unwrap(), outcome.user_id);
        assert!(auth.login("jo@example.com", "Secret!1", now()).is_ok());
        assert!(matches!(auth.verify_email(&token, now()), Err(AppError::NotFound)));
    }

    #[test]
    fn sessions_resolve_until_expiry_and_after_logout_do_not() {
        let auth = authenticator(AuthSettings { skip_verify: true, ..Default::default() });
        let outcome = auth.signup(&account("jo@example.com"), now()).unwrap();
        let token = auth.login("jo@example.com", "Secret!1", now()).unwrap();

        let identity = auth.authenticate(&token, now() + Duration::hours(47));
        assert!(identity.logged_in);
        assert_eq!(identity.user_id, outcome.user_id);
        assert_eq!(identity.role, Role::Admin);

        assert!(!auth.authenticate(&token, now() + Duration::hours(49)).logged_in);
        assert!(!auth.authenticate("bogus", now()).logged_in);

        auth.logout(&token).unwrap();
        auth.logout(&token).unwrap();
        assert!(!auth.authenticate(&token, now()).logged_in);
    }

    #[test]
    fn oversized_session_lifetime_is_an_error_not_a_panic() {
        let auth = authenticator(AuthSettings {
            session_ttl: Duration::MAX,
            skip_verify: true,
            ..Default::default()
        });
        auth.signup(&account("jo@example.com"), now()).unwrap();

        assert!(matches!(
            auth.login("jo@example.com", "Secret!1", now()),
            Err(AuthError::Internal(_))
        ));
    }

    #[test]
    fn concurrent_sessions_are_allowed() {
        let auth = authenticator(AuthSettings { skip_verify: true, ..Default::default() });
        auth.signup(&account("jo@example.com"), now()).unwrap();
        let first = auth.login("jo@example.com", "Secret!1", now()).unwrap();
        let second = auth.login("jo@example.com", "Secret!1", now()).unwrap();

        assert!(auth.authenticate(&first, now()).logged_in);
        assert!(auth.authenticate(&second, now()).logged_in);
    }

    #[test]
    fn invite_only_signup() {
        let auth = authenticator(AuthSettings { skip_verify: true, ..Default::default() });

        let first = auth.signup(&account("admin@example.com"), now()).unwrap();
        assert_eq!(first.role, Role::Admin);

        let refused = auth.signup(&account("jo@example.com"), now()).unwrap_err();
        assert!(matches!(refused, AppError::Validation(ref e) if e.get("email").is_some()));

        auth.db.create_invitation("jo@example.com", first.user_id).unwrap();
        let invited = auth.signup(&account("jo@example.com"), now()).unwrap();
        assert_eq!(invited.role, Role::User);
        assert!(!auth.db.invitation_exists("jo@example.com").unwrap());

        let again = auth.signup(&account("jo@example.com"), now()).unwrap_err();
        assert!(matches!(again, AppError::Validation(ref e) if e.get("email") == Some("email already in use")));
    }

    #[test]
    fn open_signup_needs_no_invitation() {
        let auth = authenticator(AuthSettings {
            invite_only: false,
            skip_verify: true,
            ..Default::default()
        });
        auth.signup(&account("admin@example.com"), now()).unwrap();
        let outcome = auth.signup(&account("jo@example.com"), now()).unwrap();
        assert_eq!(outcome.role, Role::User);
        assert!(outcome.verification_token.is_none());
    }
}
