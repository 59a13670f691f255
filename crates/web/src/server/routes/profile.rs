//! `/profile`: the signed-in user's page.

use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Extension, Router,
};
use common::ViewContext;

use super::{authentication::SIGN_IN_PATH, render};
use crate::server::{context::RequestContext, errors::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(show))
}

/// `GET /profile`; anonymous requests are sent to the sign-in form.
async fn show(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Response, AppError> {
    if ctx.identity().is_none() {
        return Ok(Redirect::to(SIGN_IN_PATH).into_response());
    }
    Ok(render(&state, &ctx, "profile", ViewContext::new())?.into_response())
}
