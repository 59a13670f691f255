//! Route groups mounted by the pipeline.
//!
//! Each group is a `Router<AppState>` nested under its prefix by
//! [`super::router::build`]. Handlers read the per-request state with
//! `Extension<RequestContext>` and report failures as [`AppError`].

pub mod authentication;
pub mod channel;
pub mod index;
pub mod profile;

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Router,
};
use common::ViewContext;

use super::context::RequestContext;
use super::errors::AppError;
use super::state::AppState;

/// The route groups, in dispatch order.
pub struct RouteGroups {
    /// Mounted at `/`.
    pub index: Router<AppState>,
    /// Mounted at `/channel`.
    pub channel: Router<AppState>,
    /// Mounted at `/profile`.
    pub profile: Router<AppState>,
    /// Mounted at `/authentication`.
    pub authentication: Router<AppState>,
}

impl Default for RouteGroups {
    fn default() -> Self {
        Self {
            index: index::routes(),
            channel: channel::routes(),
            profile: profile::routes(),
            authentication: authentication::routes(),
        }
    }
}

/// Render `view` with the request's view context plus `locals`.
pub(crate) fn render(
    state: &AppState,
    ctx: &RequestContext,
    view: &str,
    locals: ViewContext,
) -> Result<Html<String>, AppError> {
    Ok(state.views.render(view, &ctx.view_with(locals))?)
}

/// Like [`render`], answering with `status` instead of 200.
pub(crate) fn render_with_status(
    state: &AppState,
    ctx: &RequestContext,
    status: StatusCode,
    view: &str,
    locals: ViewContext,
) -> Result<Response, AppError> {
    render(state, ctx, view, locals).map(|html| (status, html).into_response())
}
