use axum::{
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode, header},
};
use chrono::Utc;
use quill::auth::{TYPE_TWO_FA, totp};
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
async fn two_factor_gates_login_until_the_code_is_submitted() {
    let (app, db, temp_path) = build_app("two-factor").await;

    let hash = quill::auth::password::hash_password("supersecret").expect("hashes");
    let user = db
        .create_user_with_password("kody@example.com", "kody", Some("Kody"), &hash)
        .await
        .expect("user created");

    // Log in and enroll in 2FA.
    let mut cookies = BTreeMap::new();
    let resp = app
        .clone()
        .oneshot(form_request(
            "/login",
            &cookies,
            "username=kody&password=supersecret",
        ))
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    update_cookies(&mut cookies, resp.headers());

    let resp = app
        .clone()
        .oneshot(form_request("/settings/profile/two-factor", &cookies, ""))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body reads");
    let body: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    let otpauth = &body["otpauth"];
    let secret = otpauth["secret"].as_str().expect("secret present");
    let period = otpauth["period"].as_u64().expect("period present");
    let digits = u32::try_from(otpauth["digits"].as_u64().expect("digits present"))
        .expect("small digit count");

    let code = totp::code_at(secret, Utc::now().timestamp(), period, digits).expect("code");
    let resp = app
        .clone()
        .oneshot(form_request(
            "/settings/profile/two-factor/verify",
            &cookies,
            &format!("code={code}"),
        ))
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    assert!(
        db.find_verification(TYPE_TWO_FA, &user.id)
            .await
            .expect("query succeeds")
            .is_some(),
        "2fa record should be active after verification"
    );

    let sessions_before = db
        .count_sessions_for_user(&user.id)
        .await
        .expect("count loads");

    // A fresh login now parks the session behind the challenge: a Session
    // row exists but no session cookie is committed.
    let mut fresh = BTreeMap::new();
    let resp = app
        .clone()
        .oneshot(form_request(
            "/login",
            &fresh,
            "username=kody&password=supersecret&remember=on",
        ))
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    let location = resp.headers()[header::LOCATION]
        .to_str()
        .expect("location header");
    assert!(location.starts_with("/verify?type=2fa&target="));

    let set_cookies: Vec<String> = resp
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap_or("").to_string())
        .collect();
    assert!(
        !set_cookies.iter().any(|c| c.starts_with("qn_session=")),
        "no session cookie before the challenge passes: {set_cookies:?}"
    );
    assert!(
        set_cookies.iter().any(|c| c.starts_with("qn_verification=")),
        "pending session id must be stashed: {set_cookies:?}"
    );
    update_cookies(&mut fresh, resp.headers());

    assert_eq!(
        db.count_sessions_for_user(&user.id)
            .await
            .expect("count loads"),
        sessions_before + 1
    );

    // A wrong code is rejected inline.
    let resp = app
        .clone()
        .oneshot(form_request(
            "/verify",
            &fresh,
            &format!("type=2fa&target={}&code=000000", user.id),
        ))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // The right code promotes the pending session into the cookie.
    let verification = db
        .find_verification(TYPE_TWO_FA, &user.id)
        .await
        .expect("query succeeds")
        .expect("2fa record exists");
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
            &fresh,
            &format!("type=2fa&target={}&code={code}", user.id),
        ))
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    assert_eq!(resp.headers()[header::LOCATION], "/");
    let set_cookies: Vec<String> = resp
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap_or("").to_string())
        .collect();
    let session_cookie = set_cookies
        .iter()
        .find(|c| c.starts_with("qn_session="))
        .expect("session cookie committed after the challenge");
    assert!(
        session_cookie.contains("Expires="),
        "remember flag survives the challenge hop: {session_cookie}"
    );
    update_cookies(&mut fresh, resp.headers());

    // The promoted cookie works.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/")
                .header(header::COOKIE, cookie_line(&fresh))
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body reads");
    let body = std::str::from_utf8(&body).expect("utf-8 body");
    assert!(body.contains("\"username\":\"kody\""));

    // The challenge just passed, so disabling 2FA proceeds without another
    // round trip and removes the record.
    let resp = app
        .clone()
        .oneshot(form_request(
            "/settings/profile/two-factor/disable",
            &fresh,
            "",
        ))
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    assert_eq!(
        resp.headers()[header::LOCATION],
        "/settings/profile/two-factor"
    );
    assert!(
        db.find_verification(TYPE_TWO_FA, &user.id)
            .await
            .expect("query succeeds")
            .is_none()
    );

    cleanup(&temp_path);
}

#[tokio::test]
async fn disabling_two_factor_demands_a_fresh_verification() {
    // A zero-hour staleness window makes every prior verification stale by
    // the time the next request lands.
    let temp_path = unique_sqlite_path("two-factor-stale");
    let database_url = format!("sqlite:{}", temp_path.display());
    let db = quill::db::Db::connect(&database_url)
        .await
        .expect("database initializes");
    let mut cfg = quill::config::Config::default();
    cfg.basic.insecure_cookie = true;
    cfg.auth.two_factor_reverify_hours = 0;
    let app = quill_router(QuillState::new(db.clone(), Arc::new(cfg)));

    let hash = quill::auth::password::hash_password("supersecret").expect("hashes");
    let user = db
        .create_user_with_password("kody@example.com", "kody", None, &hash)
        .await
        .expect("user created");

    // Enroll through the settings flow.
    let mut cookies = BTreeMap::new();
    let resp = app
        .clone()
        .oneshot(form_request(
            "/login",
            &cookies,
            "username=kody&password=supersecret",
        ))
        .await
        .expect("request failed");
    update_cookies(&mut cookies, resp.headers());

    let resp = app
        .clone()
        .oneshot(form_request("/settings/profile/two-factor", &cookies, ""))
        .await
        .expect("request failed");
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body reads");
    let body: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    let secret = body["otpauth"]["secret"].as_str().expect("secret");
    let period = body["otpauth"]["period"].as_u64().expect("period");
    let digits =
        u32::try_from(body["otpauth"]["digits"].as_u64().expect("digits")).expect("digits fit");
    let code = totp::code_at(secret, Utc::now().timestamp(), period, digits).expect("code");

    let resp = app
        .clone()
        .oneshot(form_request(
            "/settings/profile/two-factor/verify",
            &cookies,
            &format!("code={code}"),
        ))
        .await
        .expect("request failed");
    update_cookies(&mut cookies, resp.headers());

    // With the window already elapsed, disabling redirects to a challenge
    // instead of acting, and the 2FA record survives.
    let resp = app
        .clone()
        .oneshot(form_request(
            "/settings/profile/two-factor/disable",
            &cookies,
            "",
        ))
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    let location = resp.headers()[header::LOCATION]
        .to_str()
        .expect("location header");
    assert!(location.starts_with("/verify?type=2fa&target="));
    assert!(
        db.find_verification(TYPE_TWO_FA, &user.id)
            .await
            .expect("query succeeds")
            .is_some()
    );

    cleanup(&temp_path);
}
