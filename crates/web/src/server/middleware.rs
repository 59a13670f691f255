//! Pipeline stages between the static file server and route dispatch.
//!
//! Installed by [`super::router::build`] in this order: session resolution,
//! identity deserialization, view-context enrichment, access logging, body
//! decoding.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use common::{view::USER_ID_KEY, Identity, ServiceError};
use tracing::{debug, warn};

use super::context::{FormBody, RequestContext};
use super::errors::AppError;
use super::state::AppState;
use crate::db::blocking;

/// Largest form-encoded body the decoding stage accepts.
pub const FORM_BODY_LIMIT: usize = 100 * 1024;

/// Session resolution: attach a [`RequestContext`] carrying the session, run
/// the rest of the pipeline, then persist the session and set its cookie.
///
/// A request that already carries a context passes straight through, so the
/// stage is idempotent within one request.
pub async fn resolve_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if req.extensions().get::<RequestContext>().is_some() {
        return next.run(req).await;
    }

    let session = match state.sessions.resolve(req.headers()).await {
        Ok(session) => session,
        Err(e) => return AppError(e).into_response(),
    };
    req.extensions_mut()
        .insert(RequestContext::new(session.clone()));

    let mut response = next.run(req).await;

    match state.sessions.commit(&session).await {
        Ok(Some(cookie)) => {
            response.headers_mut().append(header::SET_COOKIE, cookie);
            response
        }
        Ok(None) => response,
        Err(e) => AppError(e).into_response(),
    }
}

/// Identity deserialization: resolve the session's `user_id` to an
/// [`Identity`]. Any failure leaves the request anonymous.
pub async fn deserialize_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let pending = req
        .extensions()
        .get::<RequestContext>()
        .filter(|ctx| !ctx.identity_resolved())
        .map(|ctx| ctx.session.get::<String>(USER_ID_KEY));

    if let Some(user_id) = pending {
        let identity = match user_id {
            Some(id) => lookup_identity(&state, id).await,
            None => None,
        };
        if let Some(ctx) = req.extensions_mut().get_mut::<RequestContext>() {
            ctx.resolve_identity(identity);
        }
    }

    next.run(req).await
}

async fn lookup_identity(state: &AppState, id: String) -> Option<Identity> {
    let store = Arc::clone(&state.identities);
    match blocking(move || store.find_by_id(&id)).await {
        Ok(Some(identity)) => Some(identity),
        Ok(None) => {
            debug!("session references an unknown user; continuing anonymously");
            None
        }
        Err(e) => {
            warn!(error = %e, "identity lookup failed; continuing anonymously");
            None
        }
    }
}

/// View-context enrichment: expose the identity to templates as `user`.
pub async fn provide_user_to_views(mut req: Request, next: Next) -> Response {
    if let Some(ctx) = req.extensions_mut().get_mut::<RequestContext>() {
        ctx.publish_user();
    }
    next.run(req).await
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}

/// Body decoding: parse form-encoded bodies into the request context.
///
/// The raw bytes are put back on the request so handlers may still extract
/// the body themselves.
pub async fn decode_form_body(req: Request, next: Next) -> Response {
    if !is_form(req.headers()) {
        return next.run(req).await;
    }

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, FORM_BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(e) => return bad_request(format!("failed to read form body: {e}")),
    };
    let fields: Vec<(String, String)> = match serde_urlencoded::from_bytes(&bytes) {
        Ok(fields) => fields,
        Err(e) => return bad_request(format!("malformed form body: {e}")),
    };

    let mut req = Request::from_parts(parts, Body::from(bytes));
    if let Some(ctx) = req.extensions_mut().get_mut::<RequestContext>() {
        ctx.form = FormBody::from(fields);
    }
    next.run(req).await
}

fn bad_request(detail: String) -> Response {
    AppError(ServiceError::Status {
        status: 400,
        message: "Bad Request".into(),
        detail: Some(detail),
    })
    .into_response()
}
