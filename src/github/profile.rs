use crate::config::GithubConfig;
use crate::error::QuillError;
use serde::Deserialize;
use tracing::warn;
use url::Url;

/// GitHub user info from the REST API.
#[derive(Debug, Deserialize)]
struct GithubUser {
    id: i64,
    login: String,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<Url>,
}

/// GitHub email info from the REST API.
#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// Normalized provider identity consumed by the callback decision tree.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// Provider-scoped stable id (`Connection.provider_id`).
    pub id: String,
    /// Verified email, lowercased.
    pub email: String,
    pub username: String,
    pub name: Option<String>,
    pub image_url: Option<Url>,
}

/// Fetch `/user`, falling back to `/user/emails` for the primary verified
/// address when the profile email is hidden.
pub async fn fetch_profile(
    cfg: &GithubConfig,
    access_token: &str,
    http_client: &reqwest::Client,
) -> Result<ProviderProfile, QuillError> {
    let user_url = cfg.api_base.join("/user")?;
    let resp = http_client
        .get(user_url)
        .bearer_auth(access_token)
        .send()
        .await?;
    if !resp.status().is_success() {
        return Err(QuillError::UpstreamStatus(resp.status()));
    }
    let user: GithubUser = resp.json().await?;

    let email = match user.email {
        Some(email) => email,
        None => {
            let emails_url = cfg.api_base.join("/user/emails")?;
            let resp = http_client
                .get(emails_url)
                .bearer_auth(access_token)
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(QuillError::UpstreamStatus(resp.status()));
            }
            let emails: Vec<GithubEmail> = resp.json().await?;
            emails
                .into_iter()
                .find(|e| e.primary && e.verified)
                .map(|e| e.email)
                .ok_or_else(|| {
                    QuillError::oauth_flow(
                        "NO_VERIFIED_EMAIL",
                        "No verified primary email on the GitHub account",
                    )
                })?
        }
    };

    Ok(ProviderProfile {
        id: user.id.to_string(),
        email: email.trim().to_lowercase(),
        username: user.login,
        name: user.name,
        image_url: user.avatar_url,
    })
}

/// Download an avatar for use as the initial profile image. Failures are
/// logged and ignored; an avatar is never worth failing signup over.
pub async fn download_avatar(
    http_client: &reqwest::Client,
    url: &Url,
) -> Option<(String, Vec<u8>)> {
    let resp = match http_client.get(url.clone()).send().await {
        Ok(resp) if resp.status().is_success() => resp,
        Ok(resp) => {
            warn!(status = %resp.status(), %url, "avatar download rejected");
            return None;
        }
        Err(e) => {
            warn!(error = %e, %url, "avatar download failed");
            return None;
        }
    };

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();

    match resp.bytes().await {
        Ok(bytes) => Some((content_type, bytes.to_vec())),
        Err(e) => {
            warn!(error = %e, %url, "avatar body read failed");
            None
        }
    }
}

/// Turn a provider login into a username prefill: alphanumerics and
/// underscores only, lowercased, truncated to 20 and padded to 3.
pub fn prefill_username(login: &str) -> String {
    let mut username: String = login
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect::<String>()
        .to_lowercase()
        .chars()
        .take(20)
        .collect();
    while username.len() < 3 {
        username.push('_');
    }
    username
}
