//! `/channel`: channel listing and single-channel pages.

use axum::{
    extract::{Path, State},
    response::Html,
    routing::get,
    Extension, Router,
};
use common::ViewContext;

use super::render;
use crate::server::{context::RequestContext, errors::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/:name", get(show))
}

/// `GET /channel`
async fn index(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Html<String>, AppError> {
    render(&state, &ctx, "channel/index", ViewContext::new())
}

/// `GET /channel/:name`
async fn show(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(name): Path<String>,
) -> Result<Html<String>, AppError> {
    render(&state, &ctx, "channel/show", ViewContext::new().with("name", name))
}
