use crate::auth::{TYPE_TWO_FA, session};
use crate::db::DbSession;
use crate::error::{FieldErrors, QuillError};
use crate::server::cookies::{
    self, SessionCookie, VerifyCookie, commit_session_cookie, commit_verify_cookie,
    read_session_cookie, read_verify_cookie, safe_redirect,
};
use crate::server::guards::auth::RequireAnonymous;
use crate::server::router::QuillState;
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::PrivateCookieJar;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    #[serde(rename = "redirectTo")]
    pub redirect_to: Option<String>,
    pub remember: Option<String>,
}

/// Checkbox-style form fields arrive as "on"/"true" when checked and are
/// absent otherwise.
pub(crate) fn checkbox(value: Option<&str>) -> bool {
    value.is_some_and(|v| v == "on" || v == "true")
}

/// GET /login
pub async fn login_form(_anon: RequireAnonymous) -> Json<serde_json::Value> {
    Json(json!({}))
}

/// POST /login
pub async fn login_handler(
    State(state): State<QuillState>,
    _anon: RequireAnonymous,
    jar: PrivateCookieJar,
    axum::Form(form): axum::Form<LoginForm>,
) -> Result<Response, QuillError> {
    let username = form.username.trim();
    let mut errors = FieldErrors::new();
    if username.is_empty() {
        errors = errors.field("username", "Username is required");
    }
    if form.password.is_empty() {
        errors = errors.field("password", "Password is required");
    }
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let Some(session) =
        session::login(&state.db, &state.config.auth, username, &form.password).await?
    else {
        return Err(FieldErrors::new()
            .form("Invalid username or password")
            .into());
    };

    handle_new_session(
        &state,
        jar,
        &session,
        form.redirect_to.as_deref(),
        checkbox(form.remember.as_deref()),
    )
    .await
}

/// POST /logout
pub async fn logout_handler(
    State(state): State<QuillState>,
    jar: PrivateCookieJar,
) -> impl IntoResponse {
    if let Some(session_id) = read_session_cookie(&jar).session_id {
        // Best effort; an orphaned row expires on its own.
        if let Err(err) = state.db.delete_session(&session_id).await {
            warn!(error = %err, "failed to delete session on logout");
        }
    }
    (cookies::clear_session_cookie(jar), Redirect::to("/"))
}

/// Decide what a freshly created Session row becomes: a committed session
/// cookie, or a pending id parked in the verify-session cookie behind a 2FA
/// challenge.
pub async fn handle_new_session(
    state: &QuillState,
    jar: PrivateCookieJar,
    session: &DbSession,
    redirect_to: Option<&str>,
    remember: bool,
) -> Result<Response, QuillError> {
    if should_request_two_fa(state, &jar, &session.user_id).await? {
        let verify = VerifyCookie {
            unverified_session_id: Some(session.id.clone()),
            remember,
            ..VerifyCookie::default()
        };
        let jar = commit_verify_cookie(
            jar,
            &verify,
            &state.config.auth,
            !state.config.basic.insecure_cookie,
        );

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("type", TYPE_TWO_FA);
        query.append_pair("target", &session.user_id);
        if let Some(redirect_to) = redirect_to {
            query.append_pair("redirectTo", redirect_to);
        }
        let target = format!("/verify?{}", query.finish());
        Ok((jar, Redirect::to(&target)).into_response())
    } else {
        let mut data = read_session_cookie(&jar);
        data.session_id = Some(session.id.clone());
        let expires = remember.then_some(session.expiration_date);
        let jar = commit_session_cookie(
            jar,
            &data,
            expires,
            !state.config.basic.insecure_cookie,
        );
        Ok((jar, Redirect::to(&safe_redirect(redirect_to))).into_response())
    }
}

/// A login needs a 2FA challenge when one is already in flight, or when the
/// user has an active 2FA secret and the cookie's last verification is
/// older than the staleness window.
pub async fn should_request_two_fa(
    state: &QuillState,
    jar: &PrivateCookieJar,
    user_id: &str,
) -> Result<bool, QuillError> {
    if read_verify_cookie(jar).unverified_session_id.is_some() {
        return Ok(true);
    }
    let has_two_fa = state
        .db
        .find_verification(TYPE_TWO_FA, user_id)
        .await?
        .is_some();
    if !has_two_fa {
        return Ok(false);
    }

    let verified_time = read_session_cookie(jar)
        .verified_time
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let window = Duration::hours(state.config.auth.two_factor_reverify_hours);
    Ok(Utc::now() - verified_time > window)
}

/// Promote the cookie after a successful 2FA challenge; shared with the
/// verify route.
pub fn commit_verified_session(
    state: &QuillState,
    jar: PrivateCookieJar,
    mut data: SessionCookie,
    session_expiration: Option<DateTime<Utc>>,
    remember: bool,
) -> PrivateCookieJar {
    data.verified_time = Some(Utc::now());
    let expires = if remember { session_expiration } else { None };
    commit_session_cookie(jar, &data, expires, !state.config.basic.insecure_cookie)
}
