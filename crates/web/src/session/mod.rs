//! Server-side sessions keyed by a signed cookie.
//!
//! # Lifecycle
//!
//! 1. [`SessionManager::resolve`] reads the signed cookie and loads the record
//!    from the [`SessionStore`]. A missing, forged, unknown or expired cookie
//!    yields a fresh, empty [`Session`].
//! 2. Handlers read and mutate the [`Session`] through the request context.
//! 3. [`SessionManager::commit`] runs after the handler. Fresh sessions that
//!    are still empty are never written and get no cookie. Everything else is
//!    re-persisted with a renewed store expiry and the cookie is re-issued, so
//!    both the client window and the server window slide on every request.
//! 4. [`prune_task`] deletes expired rows in the background.
//!
//! Concurrent requests sharing one session race on the last write.

pub mod cookie;
pub mod store;

pub use cookie::{CookieSettings, CookieSigner};
pub use store::{SessionRecord, SessionStore, SqliteSessionStore};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use common::ServiceError;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tokio::time;
use tracing::{debug, info, warn};

use crate::db::{blocking, unix_now};

// ---------------------------------------------------------------------------
// Session handle
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SessionState {
    id: String,
    payload: Map<String, Value>,
    /// Identifier of the record currently in the store, if any.
    persisted_id: Option<String>,
    destroyed: bool,
}

/// Handle to the current request's session.
///
/// Clones share the same state, so mutations made by a handler are visible to
/// [`SessionManager::commit`] once the handler returns.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

impl Session {
    /// A fresh session that has never been persisted.
    pub fn new() -> Self {
        Self::from_state(SessionState {
            id: new_session_id(),
            payload: Map::new(),
            persisted_id: None,
            destroyed: false,
        })
    }

    /// A session restored from the store.
    pub fn from_record(record: SessionRecord) -> Self {
        Self::from_state(SessionState {
            persisted_id: Some(record.id.clone()),
            id: record.id,
            payload: record.payload,
            destroyed: false,
        })
    }

    fn from_state(state: SessionState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> String {
        self.state().id.clone()
    }

    /// Whether this session was loaded from (or already written to) the store.
    pub fn is_persisted(&self) -> bool {
        self.state().persisted_id.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.state().payload.is_empty()
    }

    /// Deserialise the payload value under `key`. Missing or mistyped values
    /// read as `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.state().payload.get(key).cloned()?;
        serde_json::from_value(value).ok()
    }

    /// Store `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON.
    pub fn insert<T: Serialize>(&self, key: &str, value: T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.state().payload.insert(key.to_owned(), value);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.state().payload.remove(key)
    }

    /// Move the payload to a fresh identifier. The old record is deleted on
    /// commit.
    pub fn regenerate(&self) {
        self.state().id = new_session_id();
    }

    /// Drop the payload and delete the stored record on commit.
    pub fn destroy(&self) {
        let mut state = self.state();
        state.payload.clear();
        state.destroyed = true;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Loads sessions for incoming requests and persists them afterwards.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    signer: CookieSigner,
    cookie: CookieSettings,
    store_ttl: Duration,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        signer: CookieSigner,
        cookie: CookieSettings,
        store_ttl: Duration,
    ) -> Self {
        Self {
            store,
            signer,
            cookie,
            store_ttl,
        }
    }

    /// Resolve the session for a request from its `Cookie` headers.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Upstream`] if the store cannot be read. An
    /// unreachable store never degrades to an anonymous session.
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<Session, ServiceError> {
        let Some(id) = cookie::find_cookie(headers, &self.cookie.name)
            .and_then(|value| self.signer.verify(&value))
        else {
            return Ok(Session::new());
        };

        let store = Arc::clone(&self.store);
        let now = unix_now();
        match blocking(move || store.load(&id, now)).await {
            Ok(Some(record)) => Ok(Session::from_record(record)),
            Ok(None) => {
                debug!("session cookie has no live record; starting a new session");
                Ok(Session::new())
            }
            Err(e) => Err(ServiceError::upstream(format!("session store load failed: {e}"))),
        }
    }

    /// Persist `session` after the handler ran and return the `Set-Cookie`
    /// value to attach, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Upstream`] if the store cannot be written.
    pub async fn commit(&self, session: &Session) -> Result<Option<HeaderValue>, ServiceError> {
        let (id, payload, persisted_id, destroyed) = {
            let state = session.state();
            (
                state.id.clone(),
                state.payload.clone(),
                state.persisted_id.clone(),
                state.destroyed,
            )
        };

        if destroyed {
            let Some(old) = persisted_id else {
                return Ok(None);
            };
            self.destroy(old).await?;
            session.state().persisted_id = None;
            return self.header(cookie::format_clear_cookie(&self.cookie)).map(Some);
        }

        if persisted_id.is_none() && payload.is_empty() {
            return Ok(None);
        }

        if let Some(old) = persisted_id.filter(|old| *old != id) {
            self.destroy(old).await?;
        }

        let ttl = i64::try_from(self.store_ttl.as_secs()).unwrap_or(i64::MAX);
        let record = SessionRecord {
            id: id.clone(),
            payload,
            expires_at: unix_now().saturating_add(ttl),
        };
        let store = Arc::clone(&self.store);
        blocking(move || store.save(&record))
            .await
            .map_err(|e| ServiceError::upstream(format!("session store save failed: {e}")))?;
        session.state().persisted_id = Some(id.clone());

        let value = cookie::format_set_cookie(&self.cookie, &self.signer.sign(&id));
        self.header(value).map(Some)
    }

    async fn destroy(&self, id: String) -> Result<(), ServiceError> {
        let store = Arc::clone(&self.store);
        blocking(move || store.destroy(&id))
            .await
            .map_err(|e| ServiceError::upstream(format!("session store delete failed: {e}")))
    }

    fn header(&self, value: String) -> Result<HeaderValue, ServiceError> {
        HeaderValue::try_from(value)
            .map_err(|e| ServiceError::upstream(format!("invalid session cookie header: {e}")))
    }
}

/// Spawn a background task that periodically deletes expired session records.
///
/// The first sweep fires after one full interval. Failures are logged and the
/// next sweep proceeds as scheduled.
pub fn prune_task(store: Arc<dyn SessionStore>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let store = Arc::clone(&store);
            match blocking(move || store.prune_expired(unix_now())).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "pruned expired sessions"),
                Err(e) => warn!(error = %e, "session prune failed"),
            }
        }
    })
}
