//! Shared fixtures for pipeline tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::to_bytes, response::Response};
use common::{view::USER_ID_KEY, Identity};
use serde_json::{Map, Value};

use super::state::AppState;
use crate::assets::StaticAssets;
use crate::config::Environment;
use crate::db::{unix_now, Database};
use crate::identity::{IdentityStore, NewUser, SqliteIdentityStore};
use crate::session::{
    CookieSettings, CookieSigner, SessionManager, SessionRecord, SessionStore, SqliteSessionStore,
};
use crate::views::Views;

/// Minimal views that echo what they were rendered with.
pub const TEMPLATES: [(&str, &str); 7] = [
    (
        "error",
        "view=error|status={{error.status}}|message={{message}}|detail={{error.detail}}",
    ),
    (
        "index",
        "view=index|user={{#if user}}{{user.name}}{{else}}none{{/if}}",
    ),
    ("profile", "view=profile|user={{user.name}}"),
    ("channel/index", "view=channel/index"),
    ("channel/show", "view=channel/show|name={{name}}"),
    (
        "authentication/sign-in",
        "view=authentication/sign-in|email={{email}}|error={{error}}",
    ),
    (
        "authentication/sign-up",
        "view=authentication/sign-up|name={{name}}|email={{email}}|error={{error}}",
    ),
];

pub const SECRET: &str = "keyboard cat";
pub const STATIC_HELLO: &str = "hello from the public directory\n";
pub const FAVICON: &str = "not really an icon";

pub struct TestApp {
    pub state: AppState,
    pub sessions: Arc<dyn SessionStore>,
    pub public_dir: PathBuf,
}

impl TestApp {
    /// Persist a session holding `user_id` and return a `Cookie` header value
    /// naming it.
    pub fn signed_in_cookie(&self, user_id: &str) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let mut payload = Map::new();
        payload.insert(USER_ID_KEY.to_owned(), Value::from(user_id));
        self.sessions
            .save(&SessionRecord {
                id: id.clone(),
                payload,
                expires_at: unix_now() + 3600,
            })
            .unwrap();
        signed_cookie(&id)
    }

    pub fn create_user(&self, name: &str, email: &str, password: &str) -> Identity {
        self.state
            .identities
            .create(&NewUser {
                name: name.into(),
                email: email.into(),
                password: password.into(),
            })
            .unwrap()
    }
}

/// `sid=<signed id>` for a session id.
pub fn signed_cookie(id: &str) -> String {
    format!("sid={}", CookieSigner::new(SECRET).unwrap().sign(id))
}

/// App backed by an in-memory database.
pub fn app(environment: Environment) -> TestApp {
    let db = Database::open_in_memory().unwrap();
    build(
        environment,
        Arc::new(SqliteSessionStore::new(db.clone())),
        Arc::new(SqliteIdentityStore::new(db)),
    )
}

/// In-memory sessions with the given identity store.
pub fn app_with_identities(
    environment: Environment,
    identities: impl IdentityStore + 'static,
) -> TestApp {
    let db = Database::open_in_memory().unwrap();
    build(
        environment,
        Arc::new(SqliteSessionStore::new(db)),
        Arc::new(identities),
    )
}

pub fn app_with_stores(
    environment: Environment,
    sessions: impl SessionStore + 'static,
    identities: impl IdentityStore + 'static,
) -> TestApp {
    build(environment, Arc::new(sessions), Arc::new(identities))
}

fn build(
    environment: Environment,
    sessions: Arc<dyn SessionStore>,
    identities: Arc<dyn IdentityStore>,
) -> TestApp {
    let public_dir = std::env::temp_dir().join(format!("public-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&public_dir).unwrap();
    std::fs::write(public_dir.join("hello.txt"), STATIC_HELLO).unwrap();
    let favicon = public_dir.join("favicon.ico");
    std::fs::write(&favicon, FAVICON).unwrap();

    let manager = SessionManager::new(
        Arc::clone(&sessions),
        CookieSigner::new(SECRET).unwrap(),
        CookieSettings {
            name: "sid".into(),
            max_age: Duration::from_secs(1_296_000),
            secure: false,
        },
        Duration::from_secs(3600),
    );
    let state = AppState::new(
        manager,
        identities,
        Views::from_templates(TEMPLATES).unwrap(),
        environment,
        StaticAssets::new(public_dir.clone(), favicon, environment),
        Duration::from_secs(30),
    );

    TestApp {
        state,
        sessions,
        public_dir,
    }
}

pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
