use crate::error::QuillError;
use crate::server::cookies::take_toast;
use crate::server::guards::auth::MaybeUser;
use crate::server::router::QuillState;
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use serde_json::json;

pub fn router() -> axum::Router<QuillState> {
    axum::Router::new().route("/", get(root_handler))
}

/// GET /. Returns the shell's data: the current viewer (if any) and the pending
/// flash toast, which is consumed by this read.
pub async fn root_handler(
    State(state): State<QuillState>,
    MaybeUser(user_id): MaybeUser,
    jar: PrivateCookieJar,
) -> Result<Response, QuillError> {
    let user = match user_id {
        Some(user_id) => match state.db.find_user_by_id(&user_id).await? {
            Some(user) => {
                let roles = state.db.role_names_for_user(&user.id).await?;
                Some(json!({
                    "id": user.id,
                    "username": user.username,
                    "name": user.name,
                    "roles": roles,
                }))
            }
            None => None,
        },
        None => None,
    };

    let (jar, toast) = take_toast(jar);
    Ok((jar, Json(json!({ "user": user, "toast": toast }))).into_response())
}
