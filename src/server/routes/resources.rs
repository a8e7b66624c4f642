use crate::error::QuillError;
use crate::server::router::QuillState;
use axum::{
    Router,
    extract::{Path, State},
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::get,
};

pub fn router() -> Router<QuillState> {
    Router::new()
        .route("/resources/note-images/{image_id}", get(note_image))
        .route("/resources/user-images/{image_id}", get(user_image))
}

/// Images are content-addressed by row id, so they may be cached forever.
const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";

/// GET /resources/note-images/{image_id}
pub async fn note_image(
    State(state): State<QuillState>,
    Path(image_id): Path<String>,
) -> Result<Response, QuillError> {
    let image = state
        .db
        .note_image_blob(&image_id)
        .await?
        .ok_or(QuillError::NotFound("image"))?;
    Ok(blob_response(image.content_type, image.blob))
}

/// GET /resources/user-images/{image_id}
pub async fn user_image(
    State(state): State<QuillState>,
    Path(image_id): Path<String>,
) -> Result<Response, QuillError> {
    let image = state
        .db
        .user_image_blob(&image_id)
        .await?
        .ok_or(QuillError::NotFound("image"))?;
    Ok(blob_response(image.content_type, image.blob))
}

fn blob_response(content_type: String, blob: Vec<u8>) -> Response {
    (
        [
            (CONTENT_TYPE, content_type),
            (CACHE_CONTROL, IMMUTABLE_CACHE.to_string()),
        ],
        blob,
    )
        .into_response()
}
