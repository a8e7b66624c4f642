pub mod editor;
pub mod handlers;

use crate::server::router::QuillState;
use axum::{
    Router,
    routing::{get, post},
};

pub fn router() -> Router<QuillState> {
    Router::new()
        .route("/users/{username}/notes", get(handlers::notes_index))
        .route("/users/{username}/notes/new", post(handlers::note_create))
        .route(
            "/users/{username}/notes/{note_id}",
            get(handlers::note_detail),
        )
        .route(
            "/users/{username}/notes/{note_id}/edit",
            post(handlers::note_edit),
        )
        .route(
            "/users/{username}/notes/{note_id}/delete",
            post(handlers::note_delete),
        )
}
