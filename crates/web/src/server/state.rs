//! Shared application state injected into every stage and handler.

use std::sync::Arc;
use std::time::Duration;

use crate::assets::StaticAssets;
use crate::config::Environment;
use crate::identity::IdentityStore;
use crate::session::SessionManager;
use crate::views::Views;

/// Application state shared across all requests.
///
/// All fields are cheaply cloneable (`Arc`-wrapped or already `Arc`-backed) so
/// that Axum can clone the state for each request without copying expensive data.
/// Everything the pipeline depends on arrives here at construction time.
#[derive(Clone)]
pub struct AppState {
    /// Session loading and persistence.
    pub sessions: SessionManager,
    /// User lookups for the identity stage and the authentication routes.
    pub identities: Arc<dyn IdentityStore>,
    /// Template registry.
    pub views: Views,
    /// Decides whether error detail reaches clients.
    pub environment: Environment,
    /// Favicon, public directory and style-sheet compiler.
    pub assets: StaticAssets,
    /// Upper bound on the time spent serving one request.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(
        sessions: SessionManager,
        identities: Arc<dyn IdentityStore>,
        views: Views,
        environment: Environment,
        assets: StaticAssets,
        request_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            identities,
            views,
            environment,
            assets,
            request_timeout,
        }
    }
}
