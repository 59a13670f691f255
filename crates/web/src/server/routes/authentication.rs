//! `/authentication`: sign-up, sign-in and sign-out.
//!
//! Successful sign-up and sign-in move the session to a fresh identifier and
//! store the user's id under `user_id`; the identity stage picks it up on the
//! next request. Sign-out destroys the session.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Router,
};
use common::{view::USER_ID_KEY, Identity, ServiceError, ViewContext};
use tracing::info;

use super::{render, render_with_status};
use crate::db::blocking;
use crate::identity::{NewUser, SignUpError};
use crate::server::{context::RequestContext, errors::AppError, state::AppState};

/// Where anonymous visitors are sent when a page needs a user.
pub const SIGN_IN_PATH: &str = "/authentication/sign-in";

const SIGN_IN_VIEW: &str = "authentication/sign-in";
const SIGN_UP_VIEW: &str = "authentication/sign-up";

/// Shortest password accepted at sign-up.
const MIN_PASSWORD_LEN: usize = 8;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sign-up", get(sign_up_form).post(sign_up))
        .route("/sign-in", get(sign_in_form).post(sign_in))
        .route("/sign-out", post(sign_out))
}

/// `GET /authentication/sign-up`
async fn sign_up_form(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Html<String>, AppError> {
    render(&state, &ctx, SIGN_UP_VIEW, ViewContext::new())
}

/// `POST /authentication/sign-up`
async fn sign_up(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Response, AppError> {
    let user = NewUser {
        name: ctx.form.trimmed("name").to_owned(),
        email: ctx.form.trimmed("email").to_owned(),
        password: ctx.form.get("password").unwrap_or_default().to_owned(),
    };
    let form_again = |status: StatusCode, error: &str| {
        let locals = ViewContext::new()
            .with("name", user.name.as_str())
            .with("email", user.email.as_str())
            .with("error", error);
        render_with_status(&state, &ctx, status, SIGN_UP_VIEW, locals)
    };

    if user.name.is_empty() || user.email.is_empty() || user.password.is_empty() {
        return form_again(
            StatusCode::BAD_REQUEST,
            "Name, email and password are required.",
        );
    }
    if user.password.chars().count() < MIN_PASSWORD_LEN {
        return form_again(
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters.",
        );
    }

    let store = Arc::clone(&state.identities);
    let submitted = user.clone();
    let created = blocking(move || Ok(store.create(&submitted)))
        .await
        .map_err(|e| ServiceError::upstream(format!("user store unavailable: {e}")))?;

    match created {
        Ok(identity) => {
            info!(user_id = %identity.id, "user signed up");
            sign_in_as(&ctx, &identity)
        }
        Err(SignUpError::EmailTaken) => form_again(
            StatusCode::CONFLICT,
            "That email address is already registered.",
        ),
        Err(e @ (SignUpError::Store(_) | SignUpError::Hashing(_))) => {
            Err(ServiceError::upstream(format!("failed to create user: {e}")).into())
        }
    }
}

/// `GET /authentication/sign-in`
async fn sign_in_form(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Html<String>, AppError> {
    render(&state, &ctx, SIGN_IN_VIEW, ViewContext::new())
}

/// `POST /authentication/sign-in`
async fn sign_in(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Response, AppError> {
    let email = ctx.form.trimmed("email").to_owned();
    let password = ctx.form.get("password").unwrap_or_default().to_owned();
    let form_again = |status: StatusCode, error: &str| {
        let locals = ViewContext::new()
            .with("email", email.as_str())
            .with("error", error);
        render_with_status(&state, &ctx, status, SIGN_IN_VIEW, locals)
    };

    if email.is_empty() || password.is_empty() {
        return form_again(StatusCode::BAD_REQUEST, "Email and password are required.");
    }

    let store = Arc::clone(&state.identities);
    let lookup_email = email.clone();
    let found = blocking(move || store.find_by_credentials(&lookup_email, &password))
        .await
        .map_err(|e| ServiceError::upstream(format!("credential lookup failed: {e}")))?;

    match found {
        Some(identity) => {
            info!(user_id = %identity.id, "user signed in");
            sign_in_as(&ctx, &identity)
        }
        None => form_again(StatusCode::UNAUTHORIZED, "Incorrect email or password."),
    }
}

/// `POST /authentication/sign-out`
async fn sign_out(Extension(ctx): Extension<RequestContext>) -> Redirect {
    if let Some(user) = ctx.identity() {
        info!(user_id = %user.id, "user signed out");
    }
    ctx.session.destroy();
    Redirect::to("/")
}

fn sign_in_as(ctx: &RequestContext, identity: &Identity) -> Result<Response, AppError> {
    ctx.session.regenerate();
    ctx.session
        .insert(USER_ID_KEY, &identity.id)
        .map_err(|e| ServiceError::upstream(format!("failed to store user in session: {e}")))?;
    Ok(Redirect::to("/").into_response())
}
