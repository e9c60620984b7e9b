use bulletin_types::models::{Identity, Role};

use crate::error::AppError;

const DEFAULT_NOTICE: &str = "You are not allowed to perform this action";

/// Admin satisfies any requirement, user only a user requirement, and an
/// anonymous identity satisfies nothing.
pub fn has_role(identity: &Identity, required: Role) -> bool {
    identity.logged_in && identity.role.satisfies(required)
}

pub fn require_role(identity: &Identity, required: Role) -> Result<(), AppError> {
    ensure_role(identity, required, DEFAULT_NOTICE)
}

/// Like [`require_role`], with the notice shown to the caller on refusal.
pub fn ensure_role(identity: &Identity, required: Role, notice: &str) -> Result<(), AppError> {
    if has_role(identity, required) {
        Ok(())
    } else {
        Err(AppError::Forbidden(notice.to_string()))
    }
}
