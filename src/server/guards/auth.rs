use crate::db::DbUser;
use crate::error::QuillError;
use crate::server::cookies;
use crate::server::router::QuillState;
use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::PrivateCookieJar;
use tracing::warn;

/// The optional viewer: `None` for anonymous requests. Rejects only when the
/// cookie references a missing or expired session, which is treated as
/// logged out (cookie cleared, redirect to `/`).
pub struct MaybeUser(pub Option<String>);

/// Requires a logged-in user; anonymous callers are redirected to `/login`
/// with the original destination preserved in `redirectTo`.
pub struct RequireUserId(pub String);

/// Like [`RequireUserId`] but resolves the full user row. A session whose
/// user vanished is logged out on the spot.
pub struct RequireUser(pub DbUser);

/// Login, signup and onboarding are for anonymous callers only.
pub struct RequireAnonymous;

pub enum AuthRejection {
    /// Expired and unknown session ids are indistinguishable: clear the
    /// cookie and land on `/`.
    InvalidSession(PrivateCookieJar),
    LoginRequired { redirect_to: Option<String> },
    AlreadyAuthenticated,
    Failure(QuillError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            AuthRejection::InvalidSession(jar) => (jar, Redirect::to("/")).into_response(),
            AuthRejection::LoginRequired { redirect_to } => {
                let target = match redirect_to {
                    Some(to) => {
                        let query = url::form_urlencoded::Serializer::new(String::new())
                            .append_pair("redirectTo", &to)
                            .finish();
                        format!("/login?{query}")
                    }
                    None => "/login".to_string(),
                };
                Redirect::to(&target).into_response()
            }
            AuthRejection::AlreadyAuthenticated => Redirect::to("/").into_response(),
            AuthRejection::Failure(err) => err.into_response(),
        }
    }
}

async fn resolve_user_id(
    parts: &mut Parts,
    state: &QuillState,
) -> Result<(PrivateCookieJar, Option<String>), AuthRejection> {
    let jar = PrivateCookieJar::from_request_parts(parts, state)
        .await
        .map_err(|e| match e {})?;

    let data = cookies::read_session_cookie(&jar);
    let Some(session_id) = data.session_id else {
        return Ok((jar, None));
    };

    match state.db.active_session_user(&session_id).await {
        Ok(Some(user_id)) => Ok((jar, Some(user_id))),
        Ok(None) => Err(AuthRejection::InvalidSession(cookies::clear_session_cookie(
            jar,
        ))),
        Err(err) => Err(AuthRejection::Failure(err)),
    }
}

fn original_destination(parts: &Parts) -> Option<String> {
    let path = parts.uri.path();
    match parts.uri.query() {
        Some(query) => Some(format!("{path}?{query}")),
        None if path != "/" => Some(path.to_string()),
        None => Some("/".to_string()),
    }
}

impl FromRequestParts<QuillState> for MaybeUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &QuillState,
    ) -> Result<Self, Self::Rejection> {
        let (_jar, user_id) = resolve_user_id(parts, state).await?;
        Ok(MaybeUser(user_id))
    }
}

impl FromRequestParts<QuillState> for RequireUserId {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &QuillState,
    ) -> Result<Self, Self::Rejection> {
        let (_jar, user_id) = resolve_user_id(parts, state).await?;
        match user_id {
            Some(user_id) => Ok(RequireUserId(user_id)),
            None => Err(AuthRejection::LoginRequired {
                redirect_to: original_destination(parts),
            }),
        }
    }
}

impl FromRequestParts<QuillState> for RequireUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &QuillState,
    ) -> Result<Self, Self::Rejection> {
        let (jar, user_id) = resolve_user_id(parts, state).await?;
        let Some(user_id) = user_id else {
            return Err(AuthRejection::LoginRequired {
                redirect_to: original_destination(parts),
            });
        };

        match state.db.find_user_by_id(&user_id).await {
            Ok(Some(user)) => Ok(RequireUser(user)),
            Ok(None) => {
                // Session points at a deleted user: log the caller out.
                let data = cookies::read_session_cookie(&jar);
                if let Some(session_id) = data.session_id
                    && let Err(err) = state.db.delete_session(&session_id).await
                {
                    warn!(error = %err, "failed to delete dangling session");
                }
                Err(AuthRejection::InvalidSession(
                    cookies::clear_session_cookie(jar),
                ))
            }
            Err(err) => Err(AuthRejection::Failure(err)),
        }
    }
}

impl FromRequestParts<QuillState> for RequireAnonymous {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &QuillState,
    ) -> Result<Self, Self::Rejection> {
        let (_jar, user_id) = resolve_user_id(parts, state).await?;
        match user_id {
            Some(_) => Err(AuthRejection::AlreadyAuthenticated),
            None => Ok(RequireAnonymous),
        }
    }
}
