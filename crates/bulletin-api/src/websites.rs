use axum::{
    Extension, Form,
    extract::{Path, State},
    response::Response,
};
use tracing::info;

use bulletin_types::models::{Identity, Role};
use bulletin_types::views::{WebsiteEditPage, WebsiteListItem, WebsitesIndexPage};

use crate::acl::ensure_role;
use crate::error::AppError;
use crate::forms::{self, BindError, Bound, Field, FormData, FromForm, Rule, Schema};
use crate::render::{hx_redirect, page};
use crate::state::{AppState, blocking};

const WEBSITES_PATH: &str = "/websites";
const DOMAIN_TAKEN: &str = "Domain is already registered";

#[derive(Debug)]
pub struct WebsiteForm {
    pub name: String,
    pub domain: String,
    pub staging: bool,
}

impl FromForm for WebsiteForm {
    const SCHEMA: Schema = Schema::new(&[
        Field::text("name", &[Rule::Required, Rule::MaxLen(255)]),
        Field::text("domain", &[Rule::Required, Rule::Domain]),
        Field::flag("staging"),
    ]);

    fn from_bound(bound: &Bound) -> Result<Self, BindError> {
        Ok(Self {
            name: bound.text("name")?,
            domain: bound.text("domain")?,
            staging: bound.flag("staging")?,
        })
    }
}

/// GET /websites
pub async fn list_websites(State(state): State<AppState>) -> Result<Response, AppError> {
    let websites = blocking(&state, |s| Ok(s.db.list_websites()?)).await?;

    Ok(page(WebsitesIndexPage {
        websites: websites
            .into_iter()
            .map(|w| WebsiteListItem {
                id: w.id,
                name: w.name,
                domain: w.url,
                staging: w.staging,
            })
            .collect(),
    }))
}

/// GET /website/{id}
pub async fn get_website(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Response, AppError> {
    let website = blocking(&state, move |s| s.db.get_website(id)?.ok_or(AppError::NotFound)).await?;

    Ok(page(WebsiteEditPage {
        id: website.id,
        name: website.name,
        domain: website.url,
        staging: website.staging,
    }))
}

/// POST /website
pub async fn create_website(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    ensure_role(&identity, Role::Admin, "You are not allowed to create websites")?;
    let form: WebsiteForm = forms::parse(&FormData::from(fields))?;

    let id = blocking(&state, move |s| {
        if s.db.website_url_taken(&form.domain, None)? {
            return Err(AppError::field("domain", DOMAIN_TAKEN));
        }
        s.db.create_website(&form.name, &form.domain, form.staging)
            .map_err(|e| AppError::unique_or_internal(e, "domain", DOMAIN_TAKEN))
    })
    .await?;

    info!("Website {} created by user {}", id, identity.user_id);
    Ok(hx_redirect(WEBSITES_PATH))
}

/// PATCH /website/{id}
pub async fn update_website(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    ensure_role(&identity, Role::Admin, "You are not allowed to update websites")?;
    let form: WebsiteForm = forms::parse(&FormData::from(fields))?;

    blocking(&state, move |s| {
        if s.db.get_website(id)?.is_none() {
            return Err(AppError::NotFound);
        }
        if s.db.website_url_taken(&form.domain, Some(id))? {
            return Err(AppError::field("domain", DOMAIN_TAKEN));
        }
        s.db.update_website(id, &form.name, &form.domain, form.staging)
            .map_err(|e| AppError::unique_or_internal(e, "domain", DOMAIN_TAKEN))?;
        Ok(())
    })
    .await?;

    info!("Website {} updated", id);
    Ok(hx_redirect(WEBSITES_PATH))
}

/// DELETE /website/{id}
///
/// Linked messages stay, only the links go.
pub async fn delete_website(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    ensure_role(&identity, Role::Admin, "You are not allowed to delete websites")?;

    blocking(&state, move |s| {
        if s.db.delete_website(id)? {
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    })
    .await?;

    info!("Website {} deleted", id);
    Ok(hx_redirect(WEBSITES_PATH))
}
