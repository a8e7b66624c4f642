use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
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

async fn build_app(
    prefix: &str,
    session_ttl_days: i64,
) -> (axum::Router, quill::db::Db, std::path::PathBuf) {
    let temp_path = unique_sqlite_path(prefix);
    let database_url = format!("sqlite:{}", temp_path.display());
    let db = quill::db::Db::connect(&database_url)
        .await
        .expect("database initializes");

    let mut cfg = quill::config::Config::default();
    cfg.basic.insecure_cookie = true;
    cfg.auth.session_ttl_days = session_ttl_days;

    let state = QuillState::new(db.clone(), Arc::new(cfg));
    (quill_router(state), db, temp_path)
}

async fn create_user(db: &quill::db::Db, username: &str, password: &str) -> String {
    let hash = quill::auth::password::hash_password(password).expect("hashes");
    let user = db
        .create_user_with_password(
            &format!("{username}@example.com"),
            username,
            None,
            &hash,
        )
        .await
        .expect("user created");
    user.id
}

fn login_request(username: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("username={username}&password={password}")))
        .expect("failed to build request")
}

fn session_cookie_pair(headers: &axum::http::HeaderMap) -> String {
    headers
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

fn assert_logged_out_response(resp: &axum::http::Response<Body>) {
    assert!(resp.status().is_redirection());
    assert_eq!(resp.headers()[header::LOCATION], "/");
    let cleared = resp
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|c| c.starts_with("qn_session=;") || c.starts_with("qn_session=\"\""));
    assert!(cleared, "invalid session must clear the cookie");
}

#[tokio::test]
async fn expired_session_behaves_like_a_missing_one() {
    // TTL of zero days: the session row is already expired when the next
    // request reads it.
    let (app, db, temp_path) = build_app("session-expired", 0).await;
    let user_id = create_user(&db, "kody", "supersecret").await;

    let resp = app
        .clone()
        .oneshot(login_request("kody", "supersecret"))
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    let cookie = session_cookie_pair(resp.headers());
    assert_eq!(
        db.count_sessions_for_user(&user_id)
            .await
            .expect("count loads"),
        1
    );

    // The expired cookie is treated as logged out and cleared.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_logged_out_response(&resp);

    cleanup(&temp_path);
}

#[tokio::test]
async fn dangling_session_id_behaves_like_a_missing_one() {
    let (app, db, temp_path) = build_app("session-dangling", 30).await;
    let user_id = create_user(&db, "kody", "supersecret").await;

    let resp = app
        .clone()
        .oneshot(login_request("kody", "supersecret"))
        .await
        .expect("request failed");
    let cookie = session_cookie_pair(resp.headers());

    // Delete the row out from under the cookie.
    let sessions = db.sessions_for_user(&user_id).await.expect("sessions load");
    assert_eq!(sessions.len(), 1);
    db.delete_session(&sessions[0].id)
        .await
        .expect("session deleted");

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_logged_out_response(&resp);

    cleanup(&temp_path);
}

#[tokio::test]
async fn anonymous_callers_are_sent_to_login_with_their_destination() {
    let (app, _db, temp_path) = build_app("session-anon", 30).await;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/settings/profile/connections")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    let location = resp.headers()[header::LOCATION]
        .to_str()
        .expect("location header");
    assert_eq!(
        location,
        "/login?redirectTo=%2Fsettings%2Fprofile%2Fconnections"
    );

    cleanup(&temp_path);
}

#[tokio::test]
async fn logout_deletes_the_session_row() {
    let (app, db, temp_path) = build_app("session-logout", 30).await;
    let user_id = create_user(&db, "kody", "supersecret").await;

    let resp = app
        .clone()
        .oneshot(login_request("kody", "supersecret"))
        .await
        .expect("request failed");
    let cookie = session_cookie_pair(resp.headers());

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    assert_eq!(resp.headers()[header::LOCATION], "/");
    assert_eq!(
        db.count_sessions_for_user(&user_id)
            .await
            .expect("count loads"),
        0
    );

    cleanup(&temp_path);
}
