use crate::auth::{TYPE_ONBOARDING, TYPE_RESET_PASSWORD, TYPE_TWO_FA, TYPE_TWO_FA_SETUP, totp};
use crate::error::{FieldErrors, QuillError};
use crate::server::cookies::{
    self, Toast, commit_verify_cookie, read_session_cookie, read_verify_cookie, safe_redirect,
    set_toast,
};
use crate::server::router::QuillState;
use crate::server::routes::auth::login::commit_verified_session;
use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::PrivateCookieJar;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use url::Url;

/// Everything the signup/reset flows need to challenge a target out of band:
/// where to send the browser, the code to email and the clickable link.
pub struct PreparedVerification {
    pub otp: String,
    pub redirect_to: String,
    pub verify_url: Url,
}

/// Mint (or replace) the verification row for (target, type) and derive the
/// current one-time code from its secret.
pub async fn prepare_verification(
    state: &QuillState,
    r#type: &str,
    target: &str,
    redirect_to: Option<&str>,
) -> Result<PreparedVerification, QuillError> {
    let cfg = &state.config.auth;
    let secret = totp::generate_secret();
    let period = cfg.verification_ttl_secs;
    let expires_at = Utc::now() + Duration::seconds(i64::try_from(period).unwrap_or(600));

    let verification = state
        .db
        .upsert_verification(
            r#type,
            target,
            &secret,
            totp::ALGORITHM,
            cfg.totp_digits,
            period,
            Some(expires_at),
        )
        .await?;

    let otp = totp::code_at(
        &verification.secret,
        Utc::now().timestamp(),
        period,
        cfg.totp_digits,
    )?;

    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("type", r#type);
    query.append_pair("target", target);
    if let Some(redirect_to) = redirect_to {
        query.append_pair("redirectTo", redirect_to);
    }
    let query = query.finish();

    let redirect = format!("/verify?{query}");
    let mut verify_url = state.config.basic.base_url.join("/verify")?;
    verify_url.set_query(Some(&format!("{query}&code={otp}")));

    Ok(PreparedVerification {
        otp,
        redirect_to: redirect,
        verify_url,
    })
}

/// Check a submitted code against the stored (target, type) record.
pub async fn is_code_valid(
    state: &QuillState,
    code: &str,
    r#type: &str,
    target: &str,
) -> Result<bool, QuillError> {
    let Some(verification) = state.db.find_verification(r#type, target).await? else {
        return Ok(false);
    };
    totp::verify_code(
        &verification.secret,
        code.trim(),
        Utc::now().timestamp(),
        u64::try_from(verification.period).unwrap_or(30),
        u32::try_from(verification.digits).unwrap_or(6),
    )
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    pub r#type: String,
    pub target: String,
    pub code: Option<String>,
    #[serde(rename = "redirectTo")]
    pub redirect_to: Option<String>,
}

/// GET /verify. With a `code` query param (magic link) the submission is
/// processed as if posted; otherwise the challenge parameters echo back for
/// the client to render a code form.
pub async fn verify_page(
    State(state): State<QuillState>,
    Query(params): Query<VerifyParams>,
    jar: PrivateCookieJar,
) -> Result<Response, QuillError> {
    if params.code.is_some() {
        return process_submission(&state, jar, params).await;
    }
    Ok(Json(json!({ "type": params.r#type, "target": params.target })).into_response())
}

/// POST /verify
pub async fn verify_handler(
    State(state): State<QuillState>,
    jar: PrivateCookieJar,
    axum::Form(params): axum::Form<VerifyParams>,
) -> Result<Response, QuillError> {
    process_submission(&state, jar, params).await
}

async fn process_submission(
    state: &QuillState,
    jar: PrivateCookieJar,
    params: VerifyParams,
) -> Result<Response, QuillError> {
    let code = params.code.as_deref().unwrap_or_default();
    if code.is_empty() {
        return Err(FieldErrors::single("code", "Code is required").into());
    }
    if !is_code_valid(state, code, &params.r#type, &params.target).await? {
        return Err(FieldErrors::single("code", "Invalid code").into());
    }

    match params.r#type.as_str() {
        TYPE_ONBOARDING => {
            // One-shot: the code cannot be replayed.
            state
                .db
                .delete_verification(TYPE_ONBOARDING, &params.target)
                .await?;
            let mut verify = read_verify_cookie(&jar);
            verify.onboarding_email = Some(params.target.clone());
            let jar = commit_verify_cookie(
                jar,
                &verify,
                &state.config.auth,
                !state.config.basic.insecure_cookie,
            );
            Ok((jar, Redirect::to(&onboarding_redirect(params.redirect_to.as_deref()))).into_response())
        }

        TYPE_RESET_PASSWORD => {
            state
                .db
                .delete_verification(TYPE_RESET_PASSWORD, &params.target)
                .await?;
            // Target may be a username or an email; store the username.
            let user = match state.db.find_user_by_email(&params.target).await? {
                Some(user) => Some(user),
                None => state.db.find_user_by_username(&params.target).await?,
            };
            let Some(user) = user else {
                let jar = set_toast(
                    jar,
                    &Toast::error("Unknown account", "No account matches this reset request."),
                    !state.config.basic.insecure_cookie,
                );
                return Ok((jar, Redirect::to("/login")).into_response());
            };
            let mut verify = read_verify_cookie(&jar);
            verify.reset_username = Some(user.username);
            let jar = commit_verify_cookie(
                jar,
                &verify,
                &state.config.auth,
                !state.config.basic.insecure_cookie,
            );
            Ok((jar, Redirect::to("/reset-password")).into_response())
        }

        TYPE_TWO_FA => handle_two_fa_verification(state, jar, &params).await,

        other => Err(QuillError::Unexpected(format!(
            "unsupported verification type submitted: {other}"
        ))),
    }
}

/// Successful 2FA submission: stamp the verification time and promote the
/// pending session id (if any) into the real session cookie.
async fn handle_two_fa_verification(
    state: &QuillState,
    jar: PrivateCookieJar,
    params: &VerifyParams,
) -> Result<Response, QuillError> {
    let verify = read_verify_cookie(&jar);
    let mut data = read_session_cookie(&jar);

    let session_expiration = match &verify.unverified_session_id {
        Some(pending_id) => {
            let Some(session) = state.db.get_session(pending_id).await? else {
                let jar = cookies::clear_verify_cookie(jar);
                let jar = set_toast(
                    jar,
                    &Toast::error(
                        "Invalid session",
                        "Could not find session to verify. Please try again.",
                    ),
                    !state.config.basic.insecure_cookie,
                );
                return Ok((jar, Redirect::to("/login")).into_response());
            };
            data.session_id = Some(session.id);
            Some(session.expiration_date)
        }
        // Re-verification of an already committed session (e.g. before
        // disabling 2FA): only the timestamp changes.
        None => None,
    };

    let jar = commit_verified_session(state, jar, data, session_expiration, verify.remember);
    let jar = cookies::clear_verify_cookie(jar);
    Ok((jar, Redirect::to(&safe_redirect(params.redirect_to.as_deref()))).into_response())
}

fn onboarding_redirect(redirect_to: Option<&str>) -> String {
    match redirect_to {
        Some(to) => {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("redirectTo", to)
                .finish();
            format!("/onboarding?{query}")
        }
        None => "/onboarding".to_string(),
    }
}

/// Build the challenge redirect used by settings flows that demand a fresh
/// 2FA confirmation.
pub fn two_fa_challenge_redirect(user_id: &str, redirect_to: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("type", TYPE_TWO_FA)
        .append_pair("target", user_id)
        .append_pair("redirectTo", redirect_to)
        .finish();
    format!("/verify?{query}")
}

/// Shared with the settings 2FA enrollment flow, which verifies codes
/// against the staged `2fa-setup` record before flipping it live.
pub async fn is_setup_code_valid(
    state: &QuillState,
    code: &str,
    user_id: &str,
) -> Result<bool, QuillError> {
    is_code_valid(state, code, TYPE_TWO_FA_SETUP, user_id).await
}
