//! Cookie plumbing: the persisted session cookie, the short-lived
//! verify-session cookie that spans 2FA/onboarding hops, the plain
//! `redirectTo` cookie and flash toasts.
//!
//! All but `redirectTo` ride the `PrivateCookieJar` (signed + encrypted).
//! `redirectTo` stays a plain cookie: it only holds a same-origin path and
//! must survive the provider redirect hop unmodified.

use crate::config::AuthPolicyConfig;
use axum_extra::extract::cookie::{Cookie, CookieJar, PrivateCookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use url::Url;

pub const SESSION_COOKIE: &str = "qn_session";
pub const VERIFY_COOKIE: &str = "qn_verification";
pub const TOAST_COOKIE: &str = "qn_toast";
pub const REDIRECT_COOKIE: &str = "redirectTo";

/// Contents of the persisted session cookie.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionCookie {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// When the user last passed a 2FA challenge; gates re-challenge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_time: Option<DateTime<Utc>>,
}

impl SessionCookie {
    pub fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.verified_time.is_none()
    }
}

/// Profile data stashed for the provider onboarding form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingProfile {
    pub email: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<Url>,
}

/// Contents of the short-lived verify-session cookie.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyCookie {
    /// Session awaiting a 2FA code before cookie commitment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unverified_session_id: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub remember: bool,

    /// Email that passed (or is about to pass) onboarding verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding_email: Option<String>,

    /// OAuth profile prefill for `/onboarding/github`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefilled: Option<OnboardingProfile>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Username that passed a reset-password verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_username: Option<String>,
}

/// Flash message shown by the shell on the next page load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toast {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub variant: ToastVariant,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToastVariant {
    Info,
    Success,
    Error,
}

impl Toast {
    pub fn info(title: &str, description: impl Into<String>) -> Self {
        Self::with(ToastVariant::Info, title, description)
    }

    pub fn success(title: &str, description: impl Into<String>) -> Self {
        Self::with(ToastVariant::Success, title, description)
    }

    pub fn error(title: &str, description: impl Into<String>) -> Self {
        Self::with(ToastVariant::Error, title, description)
    }

    fn with(variant: ToastVariant, title: &str, description: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            description: description.into(),
            variant,
        }
    }
}

fn build_cookie(
    name: &'static str,
    value: String,
    max_age: Option<Duration>,
    secure: bool,
) -> Cookie<'static> {
    let mut builder = Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax);
    if let Some(max_age) = max_age {
        builder = builder.max_age(max_age);
    }
    builder.build()
}

// ---------------------------------------------------------------------------
// Session cookie
// ---------------------------------------------------------------------------

pub fn read_session_cookie(jar: &PrivateCookieJar) -> SessionCookie {
    jar.get(SESSION_COOKIE)
        .and_then(|c| serde_json::from_str(c.value()).ok())
        .unwrap_or_default()
}

/// Commit the session cookie. With `expires` it becomes persistent (the
/// "remember me" path, bound to the Session row's expiration); without it
/// the cookie lives only for the browser session.
pub fn commit_session_cookie(
    jar: PrivateCookieJar,
    data: &SessionCookie,
    expires: Option<DateTime<Utc>>,
    secure: bool,
) -> PrivateCookieJar {
    let value = serde_json::to_string(data).unwrap_or_default();
    let mut cookie = build_cookie(SESSION_COOKIE, value, None, secure);
    if let Some(expires) = expires
        && let Ok(at) = OffsetDateTime::from_unix_timestamp(expires.timestamp())
    {
        cookie.set_expires(at);
    }
    jar.add(cookie)
}

pub fn clear_session_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build())
}

// ---------------------------------------------------------------------------
// Verify-session cookie
// ---------------------------------------------------------------------------

pub fn read_verify_cookie(jar: &PrivateCookieJar) -> VerifyCookie {
    jar.get(VERIFY_COOKIE)
        .and_then(|c| serde_json::from_str(c.value()).ok())
        .unwrap_or_default()
}

pub fn commit_verify_cookie(
    jar: PrivateCookieJar,
    data: &VerifyCookie,
    cfg: &AuthPolicyConfig,
    secure: bool,
) -> PrivateCookieJar {
    let value = serde_json::to_string(data).unwrap_or_default();
    let max_age = Duration::seconds(i64::try_from(cfg.verification_ttl_secs).unwrap_or(600));
    jar.add(build_cookie(VERIFY_COOKIE, value, Some(max_age), secure))
}

pub fn clear_verify_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::build((VERIFY_COOKIE, "")).path("/").build())
}

// ---------------------------------------------------------------------------
// Toasts
// ---------------------------------------------------------------------------

pub fn set_toast(jar: PrivateCookieJar, toast: &Toast, secure: bool) -> PrivateCookieJar {
    let value = serde_json::to_string(toast).unwrap_or_default();
    jar.add(build_cookie(TOAST_COOKIE, value, None, secure))
}

/// Read and clear the pending toast, if any.
pub fn take_toast(jar: PrivateCookieJar) -> (PrivateCookieJar, Option<Toast>) {
    let Some(cookie) = jar.get(TOAST_COOKIE) else {
        return (jar, None);
    };
    let toast = serde_json::from_str(cookie.value()).ok();
    let jar = jar.remove(Cookie::build((TOAST_COOKIE, "")).path("/").build());
    (jar, toast)
}

// ---------------------------------------------------------------------------
// redirectTo cookie
// ---------------------------------------------------------------------------

/// Cookie preserving the caller's destination across the OAuth redirect
/// hop. `/` means "no redirect needed" and is never persisted.
pub fn redirect_cookie(redirect_to: Option<&str>) -> Option<Cookie<'static>> {
    let redirect_to = redirect_to.filter(|r| !r.is_empty() && *r != "/")?;
    Some(
        Cookie::build((REDIRECT_COOKIE, redirect_to.to_string()))
            .path("/")
            .build(),
    )
}

/// Expire the `redirectTo` cookie on the client.
pub fn destroy_redirect_cookie() -> Cookie<'static> {
    Cookie::build((REDIRECT_COOKIE, ""))
        .path("/")
        .max_age(Duration::seconds(-1))
        .build()
}

pub fn read_redirect_cookie(jar: &CookieJar) -> Option<String> {
    jar.get(REDIRECT_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Clamp a caller-supplied destination to a same-origin path. Anything else
/// (absolute URLs, protocol-relative `//...`) falls back to `/`.
pub fn safe_redirect(redirect_to: Option<&str>) -> String {
    match redirect_to {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        _ => "/".to_string(),
    }
}
