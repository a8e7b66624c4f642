use crate::auth::GITHUB_PROVIDER;
use crate::config::AuthPolicyConfig;
use crate::db::{Db, DbSession};
use crate::error::QuillError;
use crate::github::{self, GithubOauthEndpoints, ProviderProfile};
use crate::server::cookies::{
    OnboardingProfile, Toast, commit_verify_cookie, destroy_redirect_cookie,
    read_redirect_cookie, read_verify_cookie, redirect_cookie, set_toast,
};
use crate::server::guards::auth::MaybeUser;
use crate::server::router::QuillState;
use crate::server::routes::auth::login::handle_new_session;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, header::REFERER},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, PrivateCookieJar, SameSite};
use oauth2::{AuthorizationCode, PkceCodeChallenge, PkceCodeVerifier, TokenResponse};
use serde::Deserialize;
use time::Duration;
use tracing::{error, info};

const CSRF_COOKIE: &str = "github_oauth_csrf_token";
const PKCE_COOKIE: &str = "github_oauth_pkce_verifier";

const CONNECTIONS_PATH: &str = "/settings/profile/connections";

#[derive(Debug, Deserialize)]
pub struct GithubEntryForm {
    #[serde(rename = "redirectTo")]
    pub redirect_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// POST /auth/github
///
/// Starts the GitHub OAuth2 PKCE flow. The caller's intended destination is
/// parked in the `redirectTo` cookie so it survives the provider hop.
pub async fn github_entry(
    State(state): State<QuillState>,
    plain_jar: CookieJar,
    jar: PrivateCookieJar,
    headers: HeaderMap,
    axum::Form(form): axum::Form<GithubEntryForm>,
) -> Response {
    let secure = !state.config.basic.insecure_cookie;
    if !state.config.github.is_configured() {
        let jar = set_toast(
            jar,
            &Toast::error("Auth unavailable", "GitHub login is not configured."),
            secure,
        );
        return (jar, Redirect::to("/login")).into_response();
    }

    let redirect_to = form
        .redirect_to
        .or_else(|| referrer_route(&headers));

    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
    let (auth_url, csrf_token) = match GithubOauthEndpoints::build_authorize_url(
        &state.config.github,
        &state.config.basic.base_url,
        challenge,
    ) {
        Ok(parts) => parts,
        Err(err) => {
            error!(error = %err, "failed to build GitHub authorize url");
            let jar = set_toast(
                jar,
                &Toast::error("Auth Failed", "There was an error authenticating with GitHub."),
                secure,
            );
            return (jar, Redirect::to("/login")).into_response();
        }
    };

    let ttl = Duration::minutes(state.config.auth.oauth_state_ttl_mins);
    let jar = jar
        .add(build_state_cookie(
            CSRF_COOKIE,
            csrf_token.secret().to_string(),
            ttl,
            secure,
        ))
        .add(build_state_cookie(
            PKCE_COOKIE,
            verifier.secret().to_string(),
            ttl,
            secure,
        ));

    let plain_jar = match redirect_cookie(redirect_to.as_deref()) {
        Some(cookie) => plain_jar.add(cookie),
        None => plain_jar,
    };

    info!("dispatching GitHub OAuth redirect");
    (plain_jar, jar, Redirect::temporary(auth_url.as_ref())).into_response()
}

/// GET /auth/github/callback
pub async fn github_callback(
    State(state): State<QuillState>,
    MaybeUser(user_id): MaybeUser,
    plain_jar: CookieJar,
    jar: PrivateCookieJar,
    Query(query): Query<AuthCallbackQuery>,
) -> Result<Response, QuillError> {
    let redirect_to = read_redirect_cookie(&plain_jar);
    // One-shot: whatever happens next, the redirect cookie is spent.
    let plain_jar = plain_jar.add(destroy_redirect_cookie());

    let (jar, oauth_session) = take_oauth_cookies(jar);

    let profile =
        match authenticate(&state, &query, oauth_session).await {
            Ok(profile) => profile,
            Err(err) => {
                error!(error = %err, "GitHub authentication failed");
                let secure = !state.config.basic.insecure_cookie;
                let jar = set_toast(
                    jar,
                    &Toast::error(
                        "Auth Failed",
                        "There was an error authenticating with GitHub.",
                    ),
                    secure,
                );
                let target = login_redirect(redirect_to.as_deref());
                return Ok((plain_jar, jar, Redirect::to(&target)).into_response());
            }
        };

    let outcome = resolve_provider_callback(
        &state.db,
        &state.config.auth,
        user_id.as_deref(),
        &profile,
    )
    .await?;

    let secure = !state.config.basic.insecure_cookie;
    let response = match outcome {
        ProviderCallbackOutcome::AlreadyConnectedSelf => {
            let jar = set_toast(
                jar,
                &Toast::info(
                    "Already Connected",
                    format!(
                        "Your \"{}\" GitHub account is already connected.",
                        profile.username
                    ),
                ),
                secure,
            );
            (jar, Redirect::to(CONNECTIONS_PATH)).into_response()
        }

        ProviderCallbackOutcome::AlreadyConnectedOther => {
            let jar = set_toast(
                jar,
                &Toast::error(
                    "Already Connected",
                    format!(
                        "The \"{}\" GitHub account is already connected to another account.",
                        profile.username
                    ),
                ),
                secure,
            );
            (jar, Redirect::to(CONNECTIONS_PATH)).into_response()
        }

        ProviderCallbackOutcome::ConnectionCreated => {
            let jar = set_toast(
                jar,
                &Toast::success(
                    "Connected",
                    format!(
                        "Your \"{}\" GitHub account has been connected.",
                        profile.username
                    ),
                ),
                secure,
            );
            (jar, Redirect::to(CONNECTIONS_PATH)).into_response()
        }

        ProviderCallbackOutcome::SessionCreated(session) => {
            handle_new_session(&state, jar, &session, redirect_to.as_deref(), true).await?
        }

        ProviderCallbackOutcome::EmailLinked(session) => {
            let jar = set_toast(
                jar,
                &Toast::success(
                    "Connected",
                    format!(
                        "Your \"{}\" GitHub account has been connected.",
                        profile.username
                    ),
                ),
                secure,
            );
            // Land on the connections page so the new link is visible.
            let target = redirect_to.as_deref().unwrap_or(CONNECTIONS_PATH);
            handle_new_session(&state, jar, &session, Some(target), true).await?
        }

        ProviderCallbackOutcome::NewUserOnboarding => {
            let mut verify = read_verify_cookie(&jar);
            verify.onboarding_email = Some(profile.email.clone());
            verify.provider_id = Some(profile.id.clone());
            verify.prefilled = Some(OnboardingProfile {
                email: profile.email.clone(),
                username: github::prefill_username(&profile.username),
                name: profile.name.clone(),
                image_url: profile.image_url.clone(),
            });
            let jar = commit_verify_cookie(jar, &verify, &state.config.auth, secure);
            let target = onboarding_redirect(redirect_to.as_deref());
            (jar, Redirect::to(&target)).into_response()
        }
    };

    Ok((plain_jar, response).into_response())
}

/// Outcome of the fixed-order decision tree over (existing connection,
/// logged-in caller). DB side effects happen here; cookies and redirects
/// stay in the handler.
#[derive(Debug)]
pub enum ProviderCallbackOutcome {
    AlreadyConnectedSelf,
    AlreadyConnectedOther,
    ConnectionCreated,
    SessionCreated(DbSession),
    EmailLinked(DbSession),
    NewUserOnboarding,
}

pub async fn resolve_provider_callback(
    db: &Db,
    cfg: &AuthPolicyConfig,
    user_id: Option<&str>,
    profile: &ProviderProfile,
) -> Result<ProviderCallbackOutcome, QuillError> {
    let existing = db.find_connection(GITHUB_PROVIDER, &profile.id).await?;

    // (i) Connected and logged in: report, change nothing.
    if let (Some(connection), Some(user_id)) = (&existing, user_id) {
        return Ok(if connection.user_id == user_id {
            ProviderCallbackOutcome::AlreadyConnectedSelf
        } else {
            ProviderCallbackOutcome::AlreadyConnectedOther
        });
    }

    // (ii) Logged in without a connection: link this account.
    if let Some(user_id) = user_id {
        return match db
            .create_connection(user_id, GITHUB_PROVIDER, &profile.id)
            .await
        {
            Ok(_) => Ok(ProviderCallbackOutcome::ConnectionCreated),
            // Raced another linker for the same provider identity.
            Err(err) if is_connection_unique_violation(&err) => {
                Ok(ProviderCallbackOutcome::AlreadyConnectedOther)
            }
            Err(err) => Err(err),
        };
    }

    let expiration = crate::auth::session::session_expiration_date(cfg);

    // (iii) Known connection, anonymous caller: log its owner in.
    if let Some(connection) = existing {
        let session = db.create_session(&connection.user_id, expiration).await?;
        return Ok(ProviderCallbackOutcome::SessionCreated(session));
    }

    // (iv) The verified provider email already belongs to a local user:
    // link and log in without duplicating the User row.
    if let Some(user) = db.find_user_by_email(&profile.email).await? {
        db.create_connection(&user.id, GITHUB_PROVIDER, &profile.id)
            .await?;
        let session = db.create_session(&user.id, expiration).await?;
        return Ok(ProviderCallbackOutcome::EmailLinked(session));
    }

    // (v) Entirely new identity: onboard.
    Ok(ProviderCallbackOutcome::NewUserOnboarding)
}

fn is_connection_unique_violation(err: &QuillError) -> bool {
    matches!(
        err,
        QuillError::Database(sqlx::Error::Database(db_err))
            if db_err.message().contains("connection.provider_name")
    )
}

async fn authenticate(
    state: &QuillState,
    query: &AuthCallbackQuery,
    oauth_session: Option<(String, String)>,
) -> Result<ProviderProfile, QuillError> {
    if let Some(error) = &query.error {
        return Err(QuillError::oauth_flow(
            "PROVIDER_DENIED",
            format!("Provider returned an error: {error}"),
        ));
    }

    let (pkce_verifier, csrf_token) = oauth_session.ok_or_else(|| {
        QuillError::oauth_flow("OAUTH_SESSION_MISSING", "Missing OAuth session cookies")
    })?;

    if query.state.as_deref() != Some(csrf_token.as_str()) {
        return Err(QuillError::oauth_flow("CSRF_MISMATCH", "CSRF token mismatch"));
    }

    let code = query.code.clone().ok_or_else(|| {
        QuillError::oauth_flow("MISSING_CODE", "Missing authorization code")
    })?;

    let token_response = GithubOauthEndpoints::exchange_authorization_code(
        &state.config.github,
        &state.config.basic.base_url,
        AuthorizationCode::new(code),
        PkceCodeVerifier::new(pkce_verifier),
        state.client.clone(),
    )
    .await?;

    github::fetch_profile(
        &state.config.github,
        token_response.access_token().secret(),
        &state.client,
    )
    .await
}

fn take_oauth_cookies(jar: PrivateCookieJar) -> (PrivateCookieJar, Option<(String, String)>) {
    let csrf = jar.get(CSRF_COOKIE).map(|c| c.value().to_string());
    let pkce = jar.get(PKCE_COOKIE).map(|c| c.value().to_string());

    let jar = jar
        .remove(Cookie::from(CSRF_COOKIE))
        .remove(Cookie::from(PKCE_COOKIE));

    match (pkce, csrf) {
        (Some(p), Some(c)) => (jar, Some((p, c))),
        _ => (jar, None),
    }
}

fn build_state_cookie(
    name: &'static str,
    value: String,
    ttl: Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(ttl)
        .build()
}

fn referrer_route(headers: &HeaderMap) -> Option<String> {
    let referer = headers.get(REFERER)?.to_str().ok()?;
    let url = url::Url::parse(referer).ok()?;
    let mut route = url.path().to_string();
    if let Some(query) = url.query() {
        route.push('?');
        route.push_str(query);
    }
    Some(route)
}

fn login_redirect(redirect_to: Option<&str>) -> String {
    match redirect_to {
        Some(to) => {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("redirectTo", to)
                .finish();
            format!("/login?{query}")
        }
        None => "/login".to_string(),
    }
}

fn onboarding_redirect(redirect_to: Option<&str>) -> String {
    match redirect_to {
        Some(to) => {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("redirectTo", to)
                .finish();
            format!("/onboarding/github?{query}")
        }
        None => "/onboarding/github".to_string(),
    }
}
