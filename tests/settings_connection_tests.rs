use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use quill::auth::GITHUB_PROVIDER;
use quill::server::router::{QuillState, quill_router};
use std::{
    fs,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tower::ServiceExt;

fn unique_sqlite_path(prefix: &str) -> std::path::PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();

    let mut temp_path = std::env::temp_dir();
    temp_path.push(format!(
        "quill-{prefix}-{}-{}.sqlite",
        std::process::id(),
        nanos
    ));
    temp_path
}

async fn build_app(prefix: &str) -> (axum::Router, quill::db::Db, std::path::PathBuf) {
    let temp_path = unique_sqlite_path(prefix);
    let database_url = format!("sqlite:{}", temp_path.display());
    let db = quill::db::Db::connect(&database_url)
        .await
        .expect("database initializes");

    let mut cfg = quill::config::Config::default();
    cfg.basic.insecure_cookie = true;

    let state = QuillState::new(db.clone(), Arc::new(cfg));
    (quill_router(state), db, temp_path)
}

async fn login(app: &axum::Router, username: &str, password: &str) -> String {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(format!("username={username}&password={password}")))
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());

    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|s| s.split(';').next())
        .find(|pair| pair.starts_with("qn_session="))
        .expect("session cookie committed")
        .to_string()
}

fn cleanup(temp_path: &std::path::Path) {
    let wal = format!("{}-wal", temp_path.display());
    let shm = format!("{}-shm", temp_path.display());
    let _ = fs::remove_file(wal);
    let _ = fs::remove_file(shm);
    let _ = fs::remove_file(temp_path);
}

#[tokio::test]
async fn connection_deletion_requires_another_way_in() {
    let (app, db, temp_path) = build_app("connections").await;

    // Password-holder with a single connection: deletable.
    let hash = quill::auth::password::hash_password("supersecret").expect("hashes");
    let kody = db
        .create_user_with_password("kody@example.com", "kody", None, &hash)
        .await
        .expect("user created");
    let connection = db
        .create_connection(&kody.id, GITHUB_PROVIDER, "gh-1001")
        .await
        .expect("connection created");

    let cookie = login(&app, "kody", "supersecret").await;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/settings/profile/connections")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body reads");
    let body: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(body["canDelete"], true);
    assert_eq!(body["connections"][0]["providerName"], "github");

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!(
                    "/settings/profile/connections/{}/delete",
                    connection.id
                ))
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    assert!(
        db.connections_for_user(&kody.id)
            .await
            .expect("query succeeds")
            .is_empty()
    );

    cleanup(&temp_path);
}

#[tokio::test]
async fn oauth_only_accounts_report_their_last_connection_as_undeletable() {
    let (app, db, temp_path) = build_app("connections-last").await;

    // OAuth-only account: the sole connection is the only way in.
    let marty = db
        .create_user_with_connection(
            "marty@example.com",
            "marty",
            None,
            GITHUB_PROVIDER,
            "gh-2002",
            None,
        )
        .await
        .expect("user created");
    assert!(
        !db.user_has_password(&marty.id).await.expect("query succeeds"),
        "account has no password credential"
    );

    // Once a password exists the sole connection stops being load-bearing:
    // the listing reports it deletable and the delete goes through.
    let hash = quill::auth::password::hash_password("supersecret").expect("hashes");
    db.set_password_hash(&marty.id, &hash)
        .await
        .expect("password set");

    let cookie = login(&app, "marty", "supersecret").await;
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/settings/profile/connections")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body reads");
    let body: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(body["canDelete"], true);

    let connections = db
        .connections_for_user(&marty.id)
        .await
        .expect("query succeeds");
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!(
                    "/settings/profile/connections/{}/delete",
                    connections[0].id
                ))
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    assert!(
        db.connections_for_user(&marty.id)
            .await
            .expect("query succeeds")
            .is_empty()
    );

    cleanup(&temp_path);
}
