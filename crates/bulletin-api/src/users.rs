use axum::{
    Extension, Form,
    extract::{Path, State},
    response::Response,
};
use tracing::info;

use bulletin_types::models::{Identity, Role};
use bulletin_types::views::{InvitationListItem, UserListItem, UsersIndexPage};

use crate::acl::ensure_role;
use crate::error::AppError;
use crate::forms::{self, BindError, Bound, Field, FormData, FromForm, Rule, Schema, normalize_email};
use crate::render::{hx_redirect, page};
use crate::state::{AppState, blocking};

const USERS_PATH: &str = "/users";

#[derive(Debug)]
pub struct InvitationForm {
    pub email: String,
}

impl FromForm for InvitationForm {
    const SCHEMA: Schema = Schema::new(&[Field::text("email", &[Rule::Required, Rule::Email])]);

    fn from_bound(bound: &Bound) -> Result<Self, BindError> {
        Ok(Self {
            email: normalize_email(&bound.text("email")?),
        })
    }
}

/// GET /users
///
/// Users and pending invitations on one page.
pub async fn list_users(State(state): State<AppState>) -> Result<Response, AppError> {
    let view = blocking(&state, |s| {
        let users = s
            .db
            .list_users()?
            .into_iter()
            .map(|u| -> anyhow::Result<UserListItem> {
                Ok(UserListItem {
                    role: u.role()?,
                    id: u.id,
                    first_name: u.first_name,
                    last_name: u.last_name,
                    email: u.email,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let invitations = s
            .db
            .list_invitations()?
            .into_iter()
            .map(|i| InvitationListItem {
                id: i.id,
                email: i.email,
                invited_by: i.inviter_name,
            })
            .collect();

        Ok(UsersIndexPage {
            users,
            invitations,
            roles: Role::ALL.to_vec(),
        })
    })
    .await?;

    Ok(page(view))
}

/// DELETE /user/{id}
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    ensure_role(&identity, Role::Admin, "You do not have permission to delete users")?;
    if id == identity.user_id {
        return Err(AppError::Forbidden("You cannot delete yourself".into()));
    }

    blocking(&state, move |s| {
        if s.db.delete_user(id)? {
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    })
    .await?;

    info!("User {} deleted by user {}", id, identity.user_id);
    Ok(hx_redirect(USERS_PATH))
}

/// POST /invitation
pub async fn create_invitation(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    ensure_role(&identity, Role::Admin, "You do not have permission to invite users")?;
    let form: InvitationForm = forms::parse(&FormData::from(fields))?;

    let inviter = identity.user_id;
    let id = blocking(&state, move |s| {
        if s.db.user_exists(&form.email)? {
            return Err(AppError::field("form", "User already exists"));
        }
        if s.db.invitation_exists(&form.email)? {
            return Err(AppError::field("form", "User already invited"));
        }
        s.db.create_invitation(&form.email, inviter)
            .map_err(|e| AppError::unique_or_internal(e, "form", "User already invited"))
    })
    .await?;

    info!("Invitation {} created by user {}", id, inviter);
    Ok(hx_redirect(USERS_PATH))
}

/// DELETE /invitation/{id}
pub async fn delete_invitation(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    ensure_role(&identity, Role::Admin, "You do not have permission to delete invitations")?;

    blocking(&state, move |s| {
        if s.db.delete_invitation(id)? {
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    })
    .await?;

    info!("Invitation {} revoked", id);
    Ok(hx_redirect(USERS_PATH))
}
