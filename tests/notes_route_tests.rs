use axum::{
    body::{Body, to_bytes},
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

async fn login(app: &axum::Router, db: &quill::db::Db, username: &str) -> String {
    let hash = quill::auth::password::hash_password("supersecret").expect("hashes");
    if db
        .find_user_by_username(username)
        .await
        .expect("query succeeds")
        .is_none()
    {
        db.create_user_with_password(
            &format!("{username}@example.com"),
            username,
            None,
            &hash,
        )
        .await
        .expect("user created");
    }

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(format!(
                    "username={username}&password=supersecret"
                )))
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

const BOUNDARY: &str = "X-QUILL-TEST-BOUNDARY";

fn text_part(name: &str, value: &str) -> String {
    format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
    )
}

fn file_part(name: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut part = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    part.extend_from_slice(bytes);
    part.extend_from_slice(b"\r\n");
    part
}

fn multipart_request(uri: &str, cookie: &str, parts: Vec<Vec<u8>>) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(&part);
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::COOKIE, cookie)
        .body(Body::from(body))
        .expect("failed to build request")
}

fn cleanup(temp_path: &std::path::Path) {
    let wal = format!("{}-wal", temp_path.display());
    let shm = format!("{}-shm", temp_path.display());
    let _ = fs::remove_file(wal);
    let _ = fs::remove_file(shm);
    let _ = fs::remove_file(temp_path);
}

const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3, 4];

#[tokio::test]
async fn note_lifecycle_with_images() {
    let (app, db, temp_path) = build_app("notes").await;
    let cookie = login(&app, &db, "kody").await;

    // Create a note with one image.
    let resp = app
        .clone()
        .oneshot(multipart_request(
            "/users/kody/notes/new",
            &cookie,
            vec![
                text_part("title", "Koala facts").into_bytes(),
                text_part("content", "Koalas are fuzzy.").into_bytes(),
                text_part("images[0].altText", "a cute koala").into_bytes(),
                file_part("images[0].file", "koala.png", "image/png", PNG_BYTES),
            ],
        ))
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    let location = resp.headers()[header::LOCATION]
        .to_str()
        .expect("location header")
        .to_string();
    assert!(location.starts_with("/users/kody/notes/"));
    let note_id = location.rsplit('/').next().expect("note id").to_string();

    // The detail view shows the note, its image and edit rights.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(&location)
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
    assert_eq!(body["note"]["title"], "Koala facts");
    assert_eq!(body["canModify"], true);
    let image_id = body["note"]["images"][0]["id"]
        .as_str()
        .expect("image id")
        .to_string();

    // The image blob is served with its content type.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/resources/note-images/{image_id}"))
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    let blob = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body reads");
    assert_eq!(&blob[..], PNG_BYTES);

    // Editing with the image omitted deletes it; the new title sticks.
    let resp = app
        .clone()
        .oneshot(multipart_request(
            &format!("/users/kody/notes/{note_id}/edit"),
            &cookie,
            vec![
                text_part("title", "Koala facts, revised").into_bytes(),
                text_part("content", "Koalas are very fuzzy.").into_bytes(),
            ],
        ))
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());

    let note = db
        .note_by_id(&note_id)
        .await
        .expect("query succeeds")
        .expect("note exists");
    assert_eq!(note.title, "Koala facts, revised");
    assert!(
        db.note_images_meta(&note_id)
            .await
            .expect("query succeeds")
            .is_empty(),
        "unsubmitted images are removed on edit"
    );

    // The notes index lists it.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/users/kody/notes")
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
    assert!(body.contains("Koala facts, revised"));

    cleanup(&temp_path);
}

#[tokio::test]
async fn note_mutation_is_owner_gated_with_an_admin_override() {
    let (app, db, temp_path) = build_app("notes-perm").await;
    let kody_cookie = login(&app, &db, "kody").await;

    let resp = app
        .clone()
        .oneshot(multipart_request(
            "/users/kody/notes/new",
            &kody_cookie,
            vec![
                text_part("title", "Private thoughts").into_bytes(),
                text_part("content", "secret").into_bytes(),
            ],
        ))
        .await
        .expect("request failed");
    let location = resp.headers()[header::LOCATION]
        .to_str()
        .expect("location header")
        .to_string();
    let note_id = location.rsplit('/').next().expect("note id").to_string();

    // Another user may neither edit nor delete.
    let marty_cookie = login(&app, &db, "marty").await;
    let resp = app
        .clone()
        .oneshot(multipart_request(
            &format!("/users/kody/notes/{note_id}/edit"),
            &marty_cookie,
            vec![
                text_part("title", "Hijacked").into_bytes(),
                text_part("content", "gotcha").into_bytes(),
            ],
        ))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/users/kody/notes/{note_id}/delete"))
                .header(header::COOKIE, &marty_cookie)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Creating under someone else's profile is refused too.
    let resp = app
        .clone()
        .oneshot(multipart_request(
            "/users/kody/notes/new",
            &marty_cookie,
            vec![
                text_part("title", "Not mine").into_bytes(),
                text_part("content", "nope").into_bytes(),
            ],
        ))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // An admin may delete any note.
    let marty = db
        .find_user_by_username("marty")
        .await
        .expect("query succeeds")
        .expect("user exists");
    db.assign_role(&marty.id, "admin").await.expect("role granted");

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/users/kody/notes/{note_id}/delete"))
                .header(header::COOKIE, &marty_cookie)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());
    assert!(
        db.note_by_id(&note_id)
            .await
            .expect("query succeeds")
            .is_none(),
        "admin delete removes the note"
    );

    cleanup(&temp_path);
}

#[tokio::test]
async fn note_editor_validates_title_and_content() {
    let (app, db, temp_path) = build_app("notes-validation").await;
    let cookie = login(&app, &db, "kody").await;

    let resp = app
        .clone()
        .oneshot(multipart_request(
            "/users/kody/notes/new",
            &cookie,
            vec![
                text_part("title", "").into_bytes(),
                text_part("content", &"x".repeat(10_001)).into_bytes(),
            ],
        ))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body reads");
    let body = std::str::from_utf8(&body).expect("utf-8 body");
    assert!(body.contains("Title is required"));
    assert!(body.contains("Content is too long"));

    cleanup(&temp_path);
}
