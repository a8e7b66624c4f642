use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use chrono::Utc;
use quill::auth::{TYPE_RESET_PASSWORD, totp};
use quill::server::router::{QuillState, quill_router};
use std::collections::BTreeMap;
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

fn update_cookies(store: &mut BTreeMap<String, String>, headers: &HeaderMap) {
    for v in headers.get_all(header::SET_COOKIE) {
        let s = v.to_str().expect("set-cookie header was not valid utf-8");
        let first = s.split(';').next().unwrap_or("");
        let (name, value) = first.split_once('=').unwrap_or((first, ""));
        if value.is_empty() {
            store.remove(name);
        } else {
            store.insert(name.to_string(), value.to_string());
        }
    }
}

fn cookie_line(store: &BTreeMap<String, String>) -> String {
    store
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

fn form_request(uri: &str, cookies: &BTreeMap<String, String>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if !cookies.is_empty() {
        builder = builder.header(header::COOKIE, cookie_line(cookies));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("failed to build request")
}

fn cleanup(temp_path: &std::path::Path) {
    let wal = format!("{}-wal", temp_path.display());
    let shm = format!("{}-shm", temp_path.display());
    let _ = fs::remove_file(wal);
    let _ = fs::remove_file(shm);
    let _ = fs::remove_file(temp_path);
}

#[tokio::test]
async fn forgot_password_flow_replaces_the_credential() {
    let (app, db, temp_path) = build_app("pw-reset").await;

    let hash = quill::auth::password::hash_password("old-password").expect("hashes");
    db.create_user_with_password("kody@example.com", "kody", None, &hash)
        .await
        .expect("user created");

    // 1) Request a reset by username.
    let mut cookies = BTreeMap::new();
    let resp = app
        .clone()
        .oneshot(form_request(
            "/forgot-password",
            &cookies,
            "usernameOrEmail=kody",
        ))
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    let location = resp.headers()[header::LOCATION]
        .to_str()
        .expect("location header");
    assert!(location.starts_with("/verify?type=reset-password"));

    // 2) Submit the emailed code.
    let verification = db
        .find_verification(TYPE_RESET_PASSWORD, "kody")
        .await
        .expect("query succeeds")
        .expect("verification row exists");
    let code = totp::code_at(
        &verification.secret,
        Utc::now().timestamp(),
        u64::try_from(verification.period).expect("positive period"),
        u32::try_from(verification.digits).expect("small digit count"),
    )
    .expect("code");

    let resp = app
        .clone()
        .oneshot(form_request(
            "/verify",
            &cookies,
            &format!("type=reset-password&target=kody&code={code}"),
        ))
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    assert_eq!(resp.headers()[header::LOCATION], "/reset-password");
    update_cookies(&mut cookies, resp.headers());

    // 3) Set the new password.
    let resp = app
        .clone()
        .oneshot(form_request(
            "/reset-password",
            &cookies,
            "password=new-password&confirmPassword=new-password",
        ))
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    assert_eq!(resp.headers()[header::LOCATION], "/login");

    // 4) Old credential is dead, the new one works.
    let resp = app
        .clone()
        .oneshot(form_request(
            "/login",
            &BTreeMap::new(),
            "username=kody&password=old-password",
        ))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(form_request(
            "/login",
            &BTreeMap::new(),
            "username=kody&password=new-password",
        ))
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    assert_eq!(resp.headers()[header::LOCATION], "/");

    cleanup(&temp_path);
}

#[tokio::test]
async fn forgot_password_does_not_disclose_unknown_accounts() {
    let (app, _db, temp_path) = build_app("pw-reset-unknown").await;

    let resp = app
        .clone()
        .oneshot(form_request(
            "/forgot-password",
            &BTreeMap::new(),
            "usernameOrEmail=nobody",
        ))
        .await
        .expect("request failed");
    // Same shape as the known-account answer.
    assert!(resp.status().is_redirection());
    let location = resp.headers()[header::LOCATION]
        .to_str()
        .expect("location header");
    assert!(location.starts_with("/verify?type=reset-password"));

    cleanup(&temp_path);
}

#[tokio::test]
async fn reset_password_without_a_verified_code_bounces_to_login() {
    let (app, _db, temp_path) = build_app("pw-reset-guard").await;

    let resp = app
        .clone()
        .oneshot(form_request(
            "/reset-password",
            &BTreeMap::new(),
            "password=whatever1&confirmPassword=whatever1",
        ))
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    assert_eq!(resp.headers()[header::LOCATION], "/login");

    cleanup(&temp_path);
}
