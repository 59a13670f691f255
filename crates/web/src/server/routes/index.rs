//! `/`: the landing page.

use axum::{extract::State, response::Html, routing::get, Extension, Router};
use common::ViewContext;

use super::render;
use crate::server::{context::RequestContext, errors::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(index))
}

/// `GET /`
async fn index(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Html<String>, AppError> {
    render(&state, &ctx, "index", ViewContext::new())
}
