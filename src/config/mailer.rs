use serde::{Deserialize, Serialize};
use url::Url;

/// Outbound email delivery. When `endpoint` is unset, messages are logged
/// instead of sent, which is the intended development mode.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailerConfig {
    /// HTTP endpoint of a resend-style JSON email API.
    /// TOML: `mailer.endpoint`.
    #[serde(default)]
    pub endpoint: Option<Url>,

    /// Bearer token for the email API. TOML: `mailer.api_key`.
    #[serde(default)]
    pub api_key: String,

    /// From address. TOML: `mailer.from`. Default: `hello@quill.local`.
    #[serde(default = "default_from")]
    pub from: String,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: String::new(),
            from: default_from(),
        }
    }
}

fn default_from() -> String {
    "hello@quill.local".to_string()
}
