use serde::{Deserialize, Serialize};
use url::Url;

/// GitHub OAuth application settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubConfig {
    /// TOML: `github.client_id`. Must be provided for OAuth login.
    #[serde(default)]
    pub client_id: String,

    /// TOML: `github.client_secret`. Must be provided for OAuth login.
    #[serde(default)]
    pub client_secret: String,

    /// TOML: `github.auth_url`. Default: GitHub's authorize endpoint.
    #[serde(default = "default_auth_url")]
    pub auth_url: Url,

    /// TOML: `github.token_url`. Default: GitHub's token endpoint.
    #[serde(default = "default_token_url")]
    pub token_url: Url,

    /// REST API base, overridable for tests against a local stand-in.
    /// TOML: `github.api_base`. Default: `https://api.github.com`.
    #[serde(default = "default_api_base")]
    pub api_base: Url,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            api_base: default_api_base(),
        }
    }
}

impl GithubConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

fn default_auth_url() -> Url {
    Url::parse("https://github.com/login/oauth/authorize").expect("valid github auth url")
}

fn default_token_url() -> Url {
    Url::parse("https://github.com/login/oauth/access_token").expect("valid github token url")
}

fn default_api_base() -> Url {
    Url::parse("https://api.github.com").expect("valid github api base")
}
