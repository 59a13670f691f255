//! Request pipeline assembly.
//!
//! Stage order for every request:
//!
//! 1. favicon, style-sheet compilation, public files (short-circuit on hit)
//! 2. session resolution
//! 3. identity deserialization
//! 4. view-context enrichment
//! 5. access logging
//! 6. form body decoding
//! 7. route dispatch: `/`, `/channel`, `/profile`, `/authentication`
//! 8. not-found fallback
//! 9. error page rendering
//!
//! Axum applies the last `.layer` call outermost, so layers below are listed
//! innermost first.

use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    services::{ServeDir, ServeFile},
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use super::{errors, middleware, routes::RouteGroups, state::AppState};
use crate::assets::compile_stylesheets;

/// Build the application [`Router`] with every stage attached.
pub fn build(state: AppState, routes: RouteGroups) -> Router {
    let pipeline = Router::new()
        .merge(routes.index)
        .nest("/channel", routes.channel)
        .nest("/profile", routes.profile)
        .nest("/authentication", routes.authentication)
        .fallback(errors::not_found)
        .layer(from_fn(middleware::decode_form_body))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(from_fn(middleware::provide_user_to_views))
        .layer(from_fn_with_state(state.clone(), middleware::deserialize_identity))
        .layer(from_fn_with_state(state.clone(), middleware::resolve_session))
        .with_state(state.clone());

    let public_files = ServeDir::new(&state.assets.public_dir)
        .call_fallback_on_method_not_allowed(true)
        .fallback(pipeline);

    Router::new()
        .route_service("/favicon.ico", ServeFile::new(&state.assets.favicon))
        .fallback_service(public_files)
        .layer(from_fn_with_state(
            Arc::clone(&state.assets.stylesheets),
            compile_stylesheets,
        ))
        .layer(from_fn_with_state(state.clone(), errors::render_errors))
        .layer(TimeoutLayer::new(state.request_timeout))
        .layer(CompressionLayer::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use axum_test::TestServer;
    use tower::ServiceExt;

    use crate::config::Environment;
    use crate::db::StoreError;
    use crate::identity::MockIdentityStore;
    use crate::server::testing::{self, TestApp};
    use crate::session::store::MockSessionStore;

    fn router(app: &TestApp) -> Router {
        build(app.state.clone(), RouteGroups::default())
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_owned())).unwrap()
    }

    fn set_cookie(resp: &axum::response::Response) -> Option<String> {
        resp.headers()
            .get(header::SET_COOKIE)
            .map(|v| v.to_str().unwrap().to_owned())
    }

    /// `sid=<value>` from a `Set-Cookie` header, ready for a `Cookie` header.
    fn cookie_pair(set_cookie: &str) -> String {
        set_cookie.split(';').next().unwrap().to_owned()
    }

    #[tokio::test]
    async fn unknown_route_renders_404_error_view() {
        let app = testing::app(Environment::Production);
        let server = TestServer::new(router(&app)).unwrap();

        let response = server.get("/nonexistent").await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(
            response.text(),
            "view=error|status=|message=Not Found|detail="
        );
    }

    #[tokio::test]
    async fn unknown_post_is_404_too() {
        let app = testing::app(Environment::Production);
        let resp = router(&app)
            .oneshot(form("/no/such/form", "a=b", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(testing::body_text(resp).await.starts_with("view=error|"));
    }

    #[tokio::test]
    async fn method_mismatch_renders_404_error_view() {
        let app = testing::app(Environment::Production);
        let resp = router(&app)
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            testing::body_text(resp).await,
            "view=error|status=|message=Not Found|detail="
        );
    }

    #[tokio::test]
    async fn extractor_rejection_renders_error_view() {
        let app = testing::app(Environment::Production);
        let resp = router(&app)
            .oneshot(get("/channel/%FF", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            testing::body_text(resp).await,
            "view=error|status=|message=Bad Request|detail="
        );

        let app = testing::app(Environment::Development);
        let resp = router(&app)
            .oneshot(get("/channel/%FF", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = testing::body_text(resp).await;
        assert!(body.starts_with("view=error|status=400|message=Bad Request|"), "{body}");
        assert!(body.contains("Invalid UTF-8"), "{body}");
    }

    #[tokio::test]
    async fn root_without_cookie_is_anonymous_and_cookieless() {
        let app = testing::app(Environment::Production);
        let resp = router(&app).oneshot(get("/", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(set_cookie(&resp).is_none());
        assert_eq!(testing::body_text(resp).await, "view=index|user=none");
    }

    #[tokio::test]
    async fn static_files_bypass_the_pipeline() {
        // Mocks without expectations panic if any later stage touches them.
        let app = testing::app_with_stores(
            Environment::Production,
            MockSessionStore::new(),
            MockIdentityStore::new(),
        );
        let cookie = testing::signed_cookie("some-session");

        let resp = router(&app)
            .oneshot(get("/hello.txt", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(set_cookie(&resp).is_none());
        assert_eq!(testing::body_text(resp).await, testing::STATIC_HELLO);

        let resp = router(&app)
            .oneshot(get("/favicon.ico", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(testing::body_text(resp).await, testing::FAVICON);
    }

    #[tokio::test]
    async fn compiled_stylesheets_are_served() {
        let app = testing::app(Environment::Production);
        std::fs::create_dir_all(app.public_dir.join("styles")).unwrap();
        std::fs::write(
            app.public_dir.join("styles/site.scss"),
            "$pad: 4px;\nmain { padding: $pad * 2; }\n",
        )
        .unwrap();

        let resp = router(&app)
            .oneshot(get("/styles/site.css", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(testing::body_text(resp).await.contains("padding:8px"));
    }

    #[tokio::test]
    async fn sign_up_sets_cookie_and_user_follows_session() {
        let app = testing::app(Environment::Production);
        let resp = router(&app)
            .oneshot(form(
                "/authentication/sign-up",
                "name=Alice&email=alice%40example.com&password=hunter22",
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let cookie = cookie_pair(&set_cookie(&resp).expect("session cookie"));

        let resp = router(&app).oneshot(get("/", Some(&cookie))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(set_cookie(&resp).unwrap().contains("Max-Age=1296000"));
        assert_eq!(testing::body_text(resp).await, "view=index|user=Alice");

        let resp = router(&app)
            .oneshot(get("/profile", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(testing::body_text(resp).await, "view=profile|user=Alice");
    }

    #[tokio::test]
    async fn sign_in_regenerates_session() {
        let app = testing::app(Environment::Production);
        app.create_user("Bob", "bob@example.com", "correct horse");

        let resp = router(&app)
            .oneshot(form(
                "/authentication/sign-in",
                "email=bob%40example.com&password=wrong",
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(set_cookie(&resp).is_none());
        assert!(testing::body_text(resp).await.contains("Incorrect email or password."));

        let resp = router(&app)
            .oneshot(form(
                "/authentication/sign-in",
                "email=bob%40example.com&password=correct+horse",
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/");
        let cookie = cookie_pair(&set_cookie(&resp).unwrap());

        let resp = router(&app).oneshot(get("/", Some(&cookie))).await.unwrap();
        assert_eq!(testing::body_text(resp).await, "view=index|user=Bob");
    }

    #[tokio::test]
    async fn sign_out_destroys_session() {
        let app = testing::app(Environment::Production);
        let user = app.create_user("Carol", "carol@example.com", "s3cret-pass");
        let cookie = app.signed_in_cookie(&user.id);

        let resp = router(&app)
            .oneshot(form("/authentication/sign-out", "", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert!(set_cookie(&resp).unwrap().contains("Max-Age=0"));

        let resp = router(&app).oneshot(get("/", Some(&cookie))).await.unwrap();
        assert!(set_cookie(&resp).is_none());
        assert_eq!(testing::body_text(resp).await, "view=index|user=none");
    }

    #[tokio::test]
    async fn profile_redirects_anonymous_users() {
        let app = testing::app(Environment::Production);
        let resp = router(&app).oneshot(get("/profile", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/authentication/sign-in");
    }

    #[tokio::test]
    async fn channel_group_is_mounted() {
        let app = testing::app(Environment::Production);
        let server = TestServer::new(router(&app)).unwrap();

        let response = server.get("/channel").await;
        response.assert_status_ok();
        assert_eq!(response.text(), "view=channel/index");

        let response = server.get("/channel/rustaceans").await;
        response.assert_status_ok();
        assert_eq!(response.text(), "view=channel/show|name=rustaceans");
    }

    #[tokio::test]
    async fn unknown_user_in_session_is_anonymous() {
        let app = testing::app(Environment::Production);
        let cookie = app.signed_in_cookie("deleted-user");
        let resp = router(&app).oneshot(get("/", Some(&cookie))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(testing::body_text(resp).await, "view=index|user=none");
    }

    #[tokio::test]
    async fn session_store_outage_is_a_500_without_detail() {
        let mut sessions = MockSessionStore::new();
        sessions
            .expect_load()
            .returning(|_, _| Err(StoreError::Task("connection refused".into())));
        let app = testing::app_with_stores(
            Environment::Production,
            sessions,
            MockIdentityStore::new(),
        );
        let cookie = testing::signed_cookie("s1");

        let resp = router(&app).oneshot(get("/", Some(&cookie))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            testing::body_text(resp).await,
            "view=error|status=|message=Internal Server Error|detail="
        );
    }

    #[tokio::test]
    async fn development_error_page_carries_detail() {
        let mut sessions = MockSessionStore::new();
        sessions
            .expect_load()
            .returning(|_, _| Err(StoreError::Task("connection refused".into())));
        let app = testing::app_with_stores(
            Environment::Development,
            sessions,
            MockIdentityStore::new(),
        );
        let cookie = testing::signed_cookie("s1");

        let resp = router(&app).oneshot(get("/", Some(&cookie))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = testing::body_text(resp).await;
        assert!(body.starts_with("view=error|status=500|"), "{body}");
        assert!(body.contains("connection refused"), "{body}");
    }
}
