use crate::error::QuillError;
use crate::server::guards::auth::MaybeUser;
use crate::server::router::QuillState;
use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;

pub fn router() -> axum::Router<QuillState> {
    axum::Router::new().route("/users/{username}", get(user_profile))
}

/// GET /users/{username}: public profile.
pub async fn user_profile(
    State(state): State<QuillState>,
    MaybeUser(viewer): MaybeUser,
    Path(username): Path<String>,
) -> Result<Response, QuillError> {
    let user = state
        .db
        .find_user_by_username(&username)
        .await?
        .ok_or(QuillError::NotFound("user"))?;

    let image = state.db.user_image_meta(&user.id).await?;
    let is_self = viewer.as_deref() == Some(user.id.as_str());

    Ok(Json(json!({
        "user": {
            "username": user.username,
            "name": user.name,
            "joinedAt": user.created_at,
            "imageId": image.map(|i| i.id),
        },
        "isSelf": is_self,
    }))
    .into_response())
}
