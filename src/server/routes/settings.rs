use crate::auth::{TYPE_TWO_FA, TYPE_TWO_FA_SETUP, password, session, totp};
use crate::error::{FieldErrors, QuillError};
use crate::server::cookies::{
    Toast, commit_session_cookie, read_session_cookie, set_toast,
};
use crate::server::guards::auth::{RequireUser, RequireUserId};
use crate::server::router::QuillState;
use crate::server::routes::auth::login::should_request_two_fa;
use crate::server::routes::auth::signup::validate_password;
use crate::server::routes::auth::verify::{is_setup_code_valid, two_fa_challenge_redirect};
use crate::server::routes::notes::editor::MAX_UPLOAD_SIZE;
use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::PrivateCookieJar;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

pub fn router() -> Router<QuillState> {
    Router::new()
        .route("/settings/profile/connections", get(connections_index))
        .route(
            "/settings/profile/connections/{connection_id}/delete",
            post(connection_delete),
        )
        .route("/settings/profile/photo", post(photo_upload))
        .route("/settings/profile/password", post(password_change))
        .route(
            "/settings/profile/two-factor",
            get(two_factor_status).post(two_factor_enroll),
        )
        .route("/settings/profile/two-factor/verify", post(two_factor_verify))
        .route(
            "/settings/profile/two-factor/disable",
            post(two_factor_disable),
        )
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// GET /settings/profile/connections
pub async fn connections_index(
    State(state): State<QuillState>,
    RequireUserId(user_id): RequireUserId,
) -> Result<Response, QuillError> {
    let connections = state.db.connections_for_user(&user_id).await?;
    let can_delete = can_delete_connections(&state, &user_id, connections.len()).await?;

    let connections: Vec<_> = connections
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "providerName": c.provider_name,
                "providerId": c.provider_id,
                "createdAt": c.created_at,
            })
        })
        .collect();

    Ok(Json(json!({ "connections": connections, "canDelete": can_delete })).into_response())
}

/// POST /settings/profile/connections/{connection_id}/delete
///
/// Refused when removing the connection would leave the account with no way
/// to log in.
pub async fn connection_delete(
    State(state): State<QuillState>,
    RequireUserId(user_id): RequireUserId,
    Path(connection_id): Path<String>,
    jar: PrivateCookieJar,
) -> Result<Response, QuillError> {
    let connections = state.db.connections_for_user(&user_id).await?;
    if !can_delete_connections(&state, &user_id, connections.len()).await? {
        return Err(FieldErrors::new()
            .form("You can't delete your last connection unless you have a password")
            .into());
    }

    if !state.db.delete_connection(&connection_id, &user_id).await? {
        return Err(QuillError::NotFound("connection"));
    }

    let jar = set_toast(
        jar,
        &Toast::success("Deleted", "Your connection has been deleted."),
        !state.config.basic.insecure_cookie,
    );
    Ok((jar, Redirect::to("/settings/profile/connections")).into_response())
}

async fn can_delete_connections(
    state: &QuillState,
    user_id: &str,
    connection_count: usize,
) -> Result<bool, QuillError> {
    Ok(state.db.user_has_password(user_id).await? || connection_count > 1)
}

// ---------------------------------------------------------------------------
// Profile photo
// ---------------------------------------------------------------------------

/// POST /settings/profile/photo: multipart `photoFile` (+ optional
/// `altText`), replacing the profile image.
pub async fn photo_upload(
    State(state): State<QuillState>,
    RequireUser(user): RequireUser,
    mut multipart: Multipart,
) -> Result<Response, QuillError> {
    let mut photo: Option<(String, Vec<u8>)> = None;
    let mut alt_text: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| QuillError::Unexpected(format!("multipart read failed: {e}")))?
    {
        match field.name() {
            Some("photoFile") => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| QuillError::Unexpected(format!("upload read failed: {e}")))?;
                if bytes.len() > MAX_UPLOAD_SIZE {
                    return Err(FieldErrors::single(
                        "photoFile",
                        "File size must be less than 3MB",
                    )
                    .into());
                }
                if !bytes.is_empty() {
                    photo = Some((content_type, bytes.to_vec()));
                }
            }
            Some("altText") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| QuillError::Unexpected(format!("multipart read failed: {e}")))?;
                if !text.is_empty() {
                    alt_text = Some(text);
                }
            }
            _ => {}
        }
    }

    let Some((content_type, blob)) = photo else {
        return Err(FieldErrors::single("photoFile", "A photo is required").into());
    };

    state
        .db
        .replace_user_image(&user.id, &content_type, blob, alt_text.as_deref())
        .await?;

    Ok(Redirect::to(&format!("/users/{}", user.username)).into_response())
}

// ---------------------------------------------------------------------------
// Password
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PasswordChangeForm {
    #[serde(rename = "currentPassword")]
    pub current_password: Option<String>,
    #[serde(rename = "newPassword")]
    pub new_password: String,
    #[serde(rename = "confirmNewPassword")]
    pub confirm_new_password: String,
}

/// POST /settings/profile/password
///
/// Users with an existing password must present it; OAuth-only accounts may
/// set their first password directly.
pub async fn password_change(
    State(state): State<QuillState>,
    RequireUserId(user_id): RequireUserId,
    jar: PrivateCookieJar,
    axum::Form(form): axum::Form<PasswordChangeForm>,
) -> Result<Response, QuillError> {
    let mut errors = validate_password(FieldErrors::new(), "newPassword", &form.new_password);
    if form.confirm_new_password != form.new_password {
        errors = errors.field("confirmNewPassword", "The passwords must match");
    }
    if !errors.is_empty() {
        return Err(errors.into());
    }

    if state.db.user_has_password(&user_id).await? {
        let current = form.current_password.as_deref().unwrap_or_default();
        if current.is_empty() {
            return Err(
                FieldErrors::single("currentPassword", "Current password is required").into(),
            );
        }
        if !session::verify_user_password(&state.db, &user_id, current).await? {
            return Err(FieldErrors::single("currentPassword", "Incorrect password").into());
        }
    }

    let hash = password::hash_password(&form.new_password)?;
    state.db.set_password_hash(&user_id, &hash).await?;

    let jar = set_toast(
        jar,
        &Toast::success("Password updated", "Your password has been changed."),
        !state.config.basic.insecure_cookie,
    );
    Ok((jar, Redirect::to("/")).into_response())
}

// ---------------------------------------------------------------------------
// Two-factor
// ---------------------------------------------------------------------------

/// GET /settings/profile/two-factor
pub async fn two_factor_status(
    State(state): State<QuillState>,
    RequireUserId(user_id): RequireUserId,
) -> Result<Response, QuillError> {
    let enabled = state
        .db
        .find_verification(TYPE_TWO_FA, &user_id)
        .await?
        .is_some();
    Ok(Json(json!({ "isEnabled": enabled })).into_response())
}

/// POST /settings/profile/two-factor
///
/// Stages a `2fa-setup` secret and returns the otpauth parameters for the
/// authenticator app. Nothing is enforced until the code is verified.
pub async fn two_factor_enroll(
    State(state): State<QuillState>,
    RequireUser(user): RequireUser,
) -> Result<Response, QuillError> {
    let cfg = &state.config.auth;
    let secret = totp::generate_secret();
    let verification = state
        .db
        .upsert_verification(
            TYPE_TWO_FA_SETUP,
            &user.id,
            &secret,
            totp::ALGORITHM,
            cfg.totp_digits,
            cfg.totp_period_secs,
            None,
        )
        .await?;

    Ok(Json(json!({
        "otpauth": {
            "issuer": "Quill Notes",
            "account": user.email,
            "secret": verification.secret,
            "algorithm": verification.algorithm,
            "digits": verification.digits,
            "period": verification.period,
        }
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorVerifyForm {
    pub code: String,
}

/// POST /settings/profile/two-factor/verify. A valid code flips the staged
/// secret live and counts as a fresh verification.
pub async fn two_factor_verify(
    State(state): State<QuillState>,
    RequireUserId(user_id): RequireUserId,
    jar: PrivateCookieJar,
    axum::Form(form): axum::Form<TwoFactorVerifyForm>,
) -> Result<Response, QuillError> {
    if !is_setup_code_valid(&state, &form.code, &user_id).await? {
        return Err(FieldErrors::single("code", "Invalid code").into());
    }
    if !state.db.promote_two_factor(&user_id).await? {
        return Err(QuillError::NotFound("verification"));
    }

    let mut data = read_session_cookie(&jar);
    data.verified_time = Some(Utc::now());
    let jar = commit_session_cookie(jar, &data, None, !state.config.basic.insecure_cookie);

    let jar = set_toast(
        jar,
        &Toast::success("Enabled", "Two-factor authentication is now enabled."),
        !state.config.basic.insecure_cookie,
    );
    Ok((jar, Redirect::to("/settings/profile/two-factor")).into_response())
}

/// POST /settings/profile/two-factor/disable
///
/// Dangerous enough to demand a fresh 2FA confirmation first.
pub async fn two_factor_disable(
    State(state): State<QuillState>,
    RequireUserId(user_id): RequireUserId,
    jar: PrivateCookieJar,
) -> Result<Response, QuillError> {
    if should_request_two_fa(&state, &jar, &user_id).await? {
        // Come back and re-POST once the challenge is passed.
        let target = two_fa_challenge_redirect(&user_id, "/settings/profile/two-factor");
        return Ok((jar, Redirect::to(&target)).into_response());
    }

    state.db.delete_verification(TYPE_TWO_FA, &user_id).await?;

    let jar = set_toast(
        jar,
        &Toast::success("Disabled", "Two-factor authentication has been disabled."),
        !state.config.basic.insecure_cookie,
    );
    Ok((jar, Redirect::to("/settings/profile/two-factor")).into_response())
}
