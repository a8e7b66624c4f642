use crate::auth::{TYPE_RESET_PASSWORD, password};
use crate::error::{FieldErrors, QuillError};
use crate::mailer::Email;
use crate::server::cookies::{self, read_verify_cookie};
use crate::server::guards::auth::RequireAnonymous;
use crate::server::router::QuillState;
use crate::server::routes::auth::signup::validate_password;
use crate::server::routes::auth::verify::prepare_verification;
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::PrivateCookieJar;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordForm {
    #[serde(rename = "usernameOrEmail")]
    pub username_or_email: String,
}

/// POST /forgot-password
///
/// Always answers with the verify redirect, whether or not an account
/// matched; the response must not disclose which usernames exist.
pub async fn forgot_password_handler(
    State(state): State<QuillState>,
    _anon: RequireAnonymous,
    axum::Form(form): axum::Form<ForgotPasswordForm>,
) -> Result<Response, QuillError> {
    let target = form.username_or_email.trim().to_lowercase();
    if target.is_empty() {
        return Err(FieldErrors::single("usernameOrEmail", "Username or email is required").into());
    }

    let user = match state.db.find_user_by_email(&target).await? {
        Some(user) => Some(user),
        None => state.db.find_user_by_username(&target).await?,
    };

    let prepared = prepare_verification(&state, TYPE_RESET_PASSWORD, &target, None).await?;

    if let Some(user) = user {
        state
            .mailer
            .send(Email {
                to: user.email,
                subject: "Quill Notes password reset".to_string(),
                text: format!(
                    "Here's your verification code: {}\n\nOr open this link: {}\n",
                    prepared.otp, prepared.verify_url
                ),
            })
            .await?;
    } else {
        info!("password reset requested for unknown account");
    }

    Ok(Redirect::to(&prepared.redirect_to).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    pub password: String,
    #[serde(rename = "confirmPassword")]
    pub confirm_password: String,
}

fn require_reset_username(jar: &PrivateCookieJar) -> Option<String> {
    read_verify_cookie(jar).reset_username
}

/// GET /reset-password
pub async fn reset_password_form(
    _anon: RequireAnonymous,
    jar: PrivateCookieJar,
) -> Response {
    match require_reset_username(&jar) {
        Some(username) => Json(json!({ "username": username })).into_response(),
        None => Redirect::to("/login").into_response(),
    }
}

/// POST /reset-password
pub async fn reset_password_handler(
    State(state): State<QuillState>,
    _anon: RequireAnonymous,
    jar: PrivateCookieJar,
    axum::Form(form): axum::Form<ResetPasswordForm>,
) -> Result<Response, QuillError> {
    let Some(username) = require_reset_username(&jar) else {
        return Ok(Redirect::to("/login").into_response());
    };

    let mut errors = validate_password(FieldErrors::new(), "password", &form.password);
    if form.confirm_password != form.password {
        errors = errors.field("confirmPassword", "The passwords must match");
    }
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let Some(user) = state.db.find_user_by_username(&username).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    let hash = password::hash_password(&form.password)?;
    state.db.set_password_hash(&user.id, &hash).await?;

    let jar = cookies::clear_verify_cookie(jar);
    Ok((jar, Redirect::to("/login")).into_response())
}
