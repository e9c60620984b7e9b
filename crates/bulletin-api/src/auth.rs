use axum::{
    Extension, Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;

use bulletin_types::api::VerifyEmailQuery;
use bulletin_types::models::Identity;
use bulletin_types::views::{ConfirmEmailPage, FieldErrors, LoginPage, ProfilePage, SignupPage};

use crate::error::AppError;
use crate::forms::{self, Bound, BindError, Field, FormData, FromForm, Rule, Schema, normalize_email};
use crate::middleware::{LOGIN_PATH, SESSION_COOKIE};
use crate::render::page;
use crate::session::NewAccount;
use crate::state::{AppState, blocking};

// -- Forms --

#[derive(Debug)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl FromForm for LoginForm {
    const SCHEMA: Schema = Schema::new(&[
        Field::text("email", &[Rule::Email]),
        Field::text("password", &[Rule::Required]),
    ]);

    fn from_bound(bound: &Bound) -> Result<Self, BindError> {
        Ok(Self {
            email: normalize_email(&bound.text("email")?),
            password: bound.text("password")?,
        })
    }
}

#[derive(Debug)]
pub struct SignupForm {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub password_confirm: String,
}

impl FromForm for SignupForm {
    const SCHEMA: Schema = Schema::new(&[
        Field::text("email", &[Rule::Email]),
        Field::text(
            "password",
            &[Rule::ContainsSpecial, Rule::ContainsUpper, Rule::MinLen(7), Rule::MaxLen(50)],
        ),
        Field::text("passwordConfirm", &[Rule::Required]),
        Field::text("firstName", &[Rule::MinLen(2), Rule::MaxLen(50)]),
        Field::text("lastName", &[Rule::MinLen(2), Rule::MaxLen(50)]),
    ]);

    fn from_bound(bound: &Bound) -> Result<Self, BindError> {
        Ok(Self {
            email: normalize_email(&bound.text("email")?),
            first_name: bound.text("firstName")?,
            last_name: bound.text("lastName")?,
            password: bound.text("password")?,
            password_confirm: bound.text("passwordConfirm")?,
        })
    }
}

#[derive(Debug)]
pub struct ProfileForm {
    pub id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
}

impl FromForm for ProfileForm {
    const SCHEMA: Schema = Schema::new(&[
        Field::number("id", &[Rule::Required]),
        Field::text("firstName", &[Rule::MinLen(3), Rule::MaxLen(50)]),
        Field::text("lastName", &[Rule::MinLen(3), Rule::MaxLen(50)]),
    ]);

    fn from_bound(bound: &Bound) -> Result<Self, BindError> {
        Ok(Self {
            id: bound.number("id")?,
            first_name: bound.text("firstName")?,
            last_name: bound.text("lastName")?,
        })
    }
}

// -- Login / logout --

/// GET /login
///
/// Logged-in users are sent on to the landing page.
pub async fn login_page(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Response {
    if identity.logged_in {
        return Redirect::to(&state.web.redirect_after_login).into_response();
    }
    page(LoginPage { email: String::new() })
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let form: LoginForm = forms::parse(&FormData::from(fields))?;

    let token = blocking(&state, move |s| {
        Ok(s.auth.login(&form.email, &form.password, Utc::now())?)
    })
    .await?;

    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.web.secure_cookies);

    Ok((jar.add(cookie), Redirect::to(&state.web.redirect_after_login)).into_response())
}

/// POST /logout
///
/// The cookie is cleared even if the session was already gone.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Result<Response, AppError> {
    if let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        blocking(&state, move |s| Ok(s.auth.logout(&token)?)).await?;
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, Redirect::to("/")).into_response())
}

// -- Signup / verification --

/// GET /signup
pub async fn signup_page(State(state): State<AppState>) -> Response {
    page(SignupPage {
        invite_only: state.auth.settings().invite_only,
    })
}

/// POST /signup
pub async fn signup(
    State(state): State<AppState>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let form: SignupForm = forms::parse(&FormData::from(fields))?;

    if form.password != form.password_confirm {
        return Err(FieldErrors::single("passwordConfirm", "passwords do not match").into());
    }

    let email = form.email.clone();
    let outcome = blocking(&state, move |s| {
        s.auth.signup(
            &NewAccount {
                email: &form.email,
                first_name: &form.first_name,
                last_name: &form.last_name,
                password: &form.password,
            },
            Utc::now(),
        )
    })
    .await?;

    Ok(page(ConfirmEmailPage {
        email,
        verification_required: outcome.verification_token.is_some(),
    }))
}

/// GET /email/verify?token=
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Response, AppError> {
    if query.token.is_empty() {
        return Err(AppError::NotFound);
    }

    blocking(&state, move |s| s.auth.verify_email(&query.token, Utc::now())).await?;
    Ok(Redirect::to(LOGIN_PATH).into_response())
}

// -- Profile --

/// GET /profile
pub async fn profile_show(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response, AppError> {
    let user = blocking(&state, move |s| {
        s.db.get_user_by_id(identity.user_id)?.ok_or(AppError::NotFound)
    })
    .await?;

    Ok(page(ProfilePage {
        id: user.id,
        first_name: user.first_name,
        last_name: user.last_name,
        email: user.email,
        success: None,
    }))
}

/// PUT /profile
///
/// Users can only edit their own names.
pub async fn profile_update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let form: ProfileForm = forms::parse(&FormData::from(fields))?;

    if form.id != Some(identity.user_id) {
        return Err(AppError::Forbidden("You can only update your own profile".into()));
    }

    let user_id = identity.user_id;
    let (first_name, last_name) = (form.first_name.clone(), form.last_name.clone());
    blocking(&state, move |s| {
        if s.db.update_user_names(user_id, &first_name, &last_name)? {
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    })
    .await?;

    Ok(page(ProfilePage {
        id: identity.user_id,
        first_name: form.first_name,
        last_name: form.last_name,
        email: identity.email,
        success: Some("Profile successfully updated!".into()),
    }))
}
