use crate::auth::{GITHUB_PROVIDER, TYPE_ONBOARDING, session};
use crate::error::{FieldErrors, QuillError};
use crate::github;
use crate::mailer::Email;
use crate::server::cookies::{
    self, commit_session_cookie, read_session_cookie, read_verify_cookie, safe_redirect,
};
use crate::server::guards::auth::RequireAnonymous;
use crate::server::router::QuillState;
use crate::server::routes::auth::login::checkbox;
use crate::server::routes::auth::verify::prepare_verification;
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::PrivateCookieJar;
use serde::Deserialize;
use serde_json::json;

// ---------------------------------------------------------------------------
// Field validation
// ---------------------------------------------------------------------------

pub(crate) fn validate_email(errors: FieldErrors, email: &str) -> FieldErrors {
    let email = email.trim();
    if email.len() < 3 || !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        errors.field("email", "Email is invalid")
    } else {
        errors
    }
}

pub(crate) fn validate_username(errors: FieldErrors, username: &str) -> FieldErrors {
    let username = username.trim();
    if username.len() < 3 {
        return errors.field("username", "Username is too short");
    }
    if username.len() > 20 {
        return errors.field("username", "Username is too long");
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return errors.field(
            "username",
            "Username can only include letters, numbers, and underscores",
        );
    }
    errors
}

pub(crate) fn validate_password(errors: FieldErrors, field: &str, password: &str) -> FieldErrors {
    if password.len() < 6 {
        return errors.field(field, "Password is too short");
    }
    if password.len() > 100 {
        return errors.field(field, "Password is too long");
    }
    errors
}

/// Map a unique-constraint race on signup back to a field-level error, per
/// the error tiers: constraint violations on identity columns are
/// validation failures, not 500s.
pub(crate) fn unique_violation_to_field_error(err: QuillError) -> QuillError {
    if let QuillError::Database(sqlx::Error::Database(db_err)) = &err {
        let message = db_err.message();
        if message.contains("user.email") {
            return FieldErrors::single("email", "A user already exists with this email").into();
        }
        if message.contains("user.username") {
            return FieldErrors::single("username", "A user already exists with this username")
                .into();
        }
    }
    err
}

// ---------------------------------------------------------------------------
// /signup: request an onboarding code by email
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SignupForm {
    pub email: String,
    #[serde(rename = "redirectTo")]
    pub redirect_to: Option<String>,
}

/// GET /signup
pub async fn signup_form(_anon: RequireAnonymous) -> Json<serde_json::Value> {
    Json(json!({}))
}

/// POST /signup
pub async fn signup_handler(
    State(state): State<QuillState>,
    _anon: RequireAnonymous,
    axum::Form(form): axum::Form<SignupForm>,
) -> Result<Response, QuillError> {
    let errors = validate_email(FieldErrors::new(), &form.email);
    if !errors.is_empty() {
        return Err(errors.into());
    }
    let email = form.email.trim().to_lowercase();

    if state.db.find_user_by_email(&email).await?.is_some() {
        return Err(
            FieldErrors::single("email", "A user already exists with this email").into(),
        );
    }

    let prepared = prepare_verification(
        &state,
        TYPE_ONBOARDING,
        &email,
        form.redirect_to.as_deref(),
    )
    .await?;

    state
        .mailer
        .send(Email {
            to: email,
            subject: "Welcome to Quill Notes!".to_string(),
            text: format!(
                "Here's your verification code: {}\n\nOr open this link to get started: {}\n",
                prepared.otp, prepared.verify_url
            ),
        })
        .await?;

    Ok(Redirect::to(&prepared.redirect_to).into_response())
}

// ---------------------------------------------------------------------------
// /onboarding: finish signup with username + password
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OnboardingForm {
    pub username: String,
    pub name: Option<String>,
    pub password: String,
    #[serde(rename = "confirmPassword")]
    pub confirm_password: String,
    #[serde(rename = "agreeToTermsOfServiceAndPrivacyPolicy")]
    pub agree_to_terms: Option<String>,
    pub remember: Option<String>,
    #[serde(rename = "redirectTo")]
    pub redirect_to: Option<String>,
}

fn require_onboarding_email(jar: &PrivateCookieJar) -> Result<String, Response> {
    match read_verify_cookie(jar).onboarding_email {
        Some(email) => Ok(email),
        None => Err(Redirect::to("/signup").into_response()),
    }
}

/// GET /onboarding
pub async fn onboarding_form(
    _anon: RequireAnonymous,
    jar: PrivateCookieJar,
) -> Result<Response, QuillError> {
    match require_onboarding_email(&jar) {
        Ok(email) => Ok(Json(json!({ "email": email })).into_response()),
        Err(redirect) => Ok(redirect),
    }
}

/// POST /onboarding
pub async fn onboarding_handler(
    State(state): State<QuillState>,
    _anon: RequireAnonymous,
    jar: PrivateCookieJar,
    axum::Form(form): axum::Form<OnboardingForm>,
) -> Result<Response, QuillError> {
    let email = match require_onboarding_email(&jar) {
        Ok(email) => email,
        Err(redirect) => return Ok(redirect),
    };

    let mut errors = validate_username(FieldErrors::new(), &form.username);
    errors = validate_password(errors, "password", &form.password);
    if form.confirm_password != form.password {
        errors = errors.field("confirmPassword", "The passwords must match");
    }
    if !checkbox(form.agree_to_terms.as_deref()) {
        errors = errors.field(
            "agreeToTermsOfServiceAndPrivacyPolicy",
            "You must agree to the terms of service and privacy policy",
        );
    }
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let username = form.username.trim().to_lowercase();
    if state.db.find_user_by_username(&username).await?.is_some() {
        return Err(
            FieldErrors::single("username", "A user already exists with this username").into(),
        );
    }

    let session = session::signup(
        &state.db,
        &state.config.auth,
        &email,
        &username,
        form.name.as_deref().map(str::trim).filter(|n| !n.is_empty()),
        &form.password,
    )
    .await
    .map_err(unique_violation_to_field_error)?;

    let remember = checkbox(form.remember.as_deref());
    let mut data = read_session_cookie(&jar);
    data.session_id = Some(session.id.clone());
    let expires = remember.then_some(session.expiration_date);
    let jar = commit_session_cookie(jar, &data, expires, !state.config.basic.insecure_cookie);
    let jar = cookies::clear_verify_cookie(jar);

    Ok((jar, Redirect::to(&safe_redirect(form.redirect_to.as_deref()))).into_response())
}

// ---------------------------------------------------------------------------
// /onboarding/github: finish signup from a stashed OAuth profile
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ProviderOnboardingForm {
    pub username: String,
    pub name: Option<String>,
    #[serde(rename = "agreeToTermsOfServiceAndPrivacyPolicy")]
    pub agree_to_terms: Option<String>,
    pub remember: Option<String>,
    #[serde(rename = "redirectTo")]
    pub redirect_to: Option<String>,
}

/// GET /onboarding/github
pub async fn provider_onboarding_form(
    _anon: RequireAnonymous,
    jar: PrivateCookieJar,
) -> Result<Response, QuillError> {
    let verify = read_verify_cookie(&jar);
    match (verify.onboarding_email, verify.prefilled) {
        (Some(email), prefilled) => {
            Ok(Json(json!({ "email": email, "prefilled": prefilled })).into_response())
        }
        (None, _) => Ok(Redirect::to("/signup").into_response()),
    }
}

/// POST /onboarding/github
pub async fn provider_onboarding_handler(
    State(state): State<QuillState>,
    _anon: RequireAnonymous,
    jar: PrivateCookieJar,
    axum::Form(form): axum::Form<ProviderOnboardingForm>,
) -> Result<Response, QuillError> {
    let verify = read_verify_cookie(&jar);
    let (Some(email), Some(provider_id)) =
        (verify.onboarding_email.clone(), verify.provider_id.clone())
    else {
        return Ok(Redirect::to("/signup").into_response());
    };

    let mut errors = validate_username(FieldErrors::new(), &form.username);
    if !checkbox(form.agree_to_terms.as_deref()) {
        errors = errors.field(
            "agreeToTermsOfServiceAndPrivacyPolicy",
            "You must agree to the terms of service and privacy policy",
        );
    }
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let username = form.username.trim().to_lowercase();
    if state.db.find_user_by_username(&username).await?.is_some() {
        return Err(
            FieldErrors::single("username", "A user already exists with this username").into(),
        );
    }

    let avatar = match verify.prefilled.as_ref().and_then(|p| p.image_url.as_ref()) {
        Some(url) => github::download_avatar(&state.client, url).await,
        None => None,
    };

    let name = form
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| verify.prefilled.as_ref().and_then(|p| p.name.clone()));

    let session = session::signup_with_connection(
        &state.db,
        &state.config.auth,
        &email,
        &username,
        name.as_deref(),
        GITHUB_PROVIDER,
        &provider_id,
        avatar,
    )
    .await
    .map_err(unique_violation_to_field_error)?;

    let remember = checkbox(form.remember.as_deref());
    let mut data = read_session_cookie(&jar);
    data.session_id = Some(session.id.clone());
    let expires = remember.then_some(session.expiration_date);
    let jar = commit_session_cookie(jar, &data, expires, !state.config.basic.insecure_cookie);
    let jar = cookies::clear_verify_cookie(jar);

    Ok((jar, Redirect::to(&safe_redirect(form.redirect_to.as_deref()))).into_response())
}
