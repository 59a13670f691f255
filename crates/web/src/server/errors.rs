//! Not-found fallback and the error terminal stage.
//!
//! Any stage or handler signals failure by returning an [`AppError`]. Its
//! response is a bare status tagged with the [`ServiceError`] in the response
//! extensions; [`render_errors`], the outermost pipeline stage, turns every
//! tagged response into the `error` view. Failure statuses produced without a
//! tag (extractor rejections, method mismatches) are classified there too, so
//! nothing else formats failures.

use axum::{
    body::to_bytes,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use common::{ServiceError, ViewContext};
use serde_json::json;
use tracing::{debug, error};

use super::state::AppState;
use crate::config::Environment;
use crate::views::{Views, ERROR_VIEW};

/// Error returned by stages and handlers; rendered by [`render_errors`].
#[derive(Debug)]
pub struct AppError(pub ServiceError);

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = status_of(&self.0).into_response();
        response.extensions_mut().insert(self.0);
        response
    }
}

fn status_of(error: &ServiceError) -> StatusCode {
    StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Fallback installed after every route group.
pub async fn not_found() -> AppError {
    AppError(ServiceError::NotFound)
}

/// Terminal stage: render the error page for any response tagged by an
/// [`AppError`] and for any other 4xx/5xx response. Successful and redirect
/// responses pass through untouched.
pub async fn render_errors(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let mut response = next.run(req).await;

    let error = match response.extensions_mut().remove::<ServiceError>() {
        Some(error) => error,
        None if response.status().is_client_error() || response.status().is_server_error() => {
            untagged_failure(response).await
        }
        None => return response,
    };

    let status = status_of(&error);
    if status.is_server_error() {
        error!(%method, %path, status = status.as_u16(), detail = error.detail(), "request failed");
    } else {
        debug!(%method, %path, status = status.as_u16(), message = %error, "request rejected");
    }
    error_page(&state.views, state.environment, &error)
}

/// Largest rejection body kept as error detail.
const REJECTION_DETAIL_LIMIT: usize = 4 * 1024;

/// Classify a failure response produced without an [`AppError`], such as an
/// extractor rejection or a method mismatch.
///
/// A method mismatch counts as no route matched. Anything else keeps its
/// status, uses the canonical reason as message and its body as detail.
async fn untagged_failure(response: Response) -> ServiceError {
    let status = response.status();
    if status == StatusCode::METHOD_NOT_ALLOWED {
        return ServiceError::NotFound;
    }
    let detail = to_bytes(response.into_body(), REJECTION_DETAIL_LIMIT)
        .await
        .ok()
        .map(|body| String::from_utf8_lossy(&body).trim().to_owned())
        .filter(|body| !body.is_empty());
    ServiceError::Status {
        status: status.as_u16(),
        message: status.canonical_reason().unwrap_or("Error").to_owned(),
        detail,
    }
}

/// Render the `error` view for `error`.
///
/// The view receives `message` and `error`; `error` carries the status and
/// detail only in development and is an empty object otherwise. If the view
/// itself cannot be rendered the status is kept and the message is sent as
/// plain text.
pub fn error_page(views: &Views, environment: Environment, error: &ServiceError) -> Response {
    let status = status_of(error);
    let detail = if environment.is_development() {
        json!({
            "status": status.as_u16(),
            "detail": error.detail().unwrap_or_default(),
        })
    } else {
        json!({})
    };
    let view = ViewContext::new()
        .with("message", error.to_string())
        .with("error", detail);

    match views.render(ERROR_VIEW, &view) {
        Ok(html) => (status, html).into_response(),
        Err(render_err) => {
            error!(detail = render_err.detail(), "failed to render error view");
            (status, error.to_string()).into_response()
        }
    }
}
