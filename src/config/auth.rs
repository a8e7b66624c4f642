use serde::{Deserialize, Serialize};

/// Session and verification policy. These were embedded ad hoc in the flow
/// historically; they are deliberate configuration here.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthPolicyConfig {
    /// How long a Session row lives from creation.
    /// TOML: `auth.session_ttl_days`. Default: `30`.
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,

    /// Staleness window after which a prior 2FA verification no longer
    /// exempts a new login from re-challenge.
    /// TOML: `auth.two_factor_reverify_hours`. Default: `2`.
    #[serde(default = "default_two_factor_reverify_hours")]
    pub two_factor_reverify_hours: i64,

    /// Lifetime (and TOTP period) of emailed one-time codes, in seconds.
    /// TOML: `auth.verification_ttl_secs`. Default: `600`.
    #[serde(default = "default_verification_ttl_secs")]
    pub verification_ttl_secs: u64,

    /// Number of digits in one-time codes.
    /// TOML: `auth.totp_digits`. Default: `6`.
    #[serde(default = "default_totp_digits")]
    pub totp_digits: u32,

    /// TOTP period for authenticator-app (2FA) codes, in seconds.
    /// TOML: `auth.totp_period_secs`. Default: `30`.
    #[serde(default = "default_totp_period_secs")]
    pub totp_period_secs: u64,

    /// Lifetime of the CSRF/PKCE cookies spanning the OAuth redirect hop,
    /// in minutes. TOML: `auth.oauth_state_ttl_mins`. Default: `15`.
    #[serde(default = "default_oauth_state_ttl_mins")]
    pub oauth_state_ttl_mins: i64,
}

impl Default for AuthPolicyConfig {
    fn default() -> Self {
        Self {
            session_ttl_days: default_session_ttl_days(),
            two_factor_reverify_hours: default_two_factor_reverify_hours(),
            verification_ttl_secs: default_verification_ttl_secs(),
            totp_digits: default_totp_digits(),
            totp_period_secs: default_totp_period_secs(),
            oauth_state_ttl_mins: default_oauth_state_ttl_mins(),
        }
    }
}

fn default_session_ttl_days() -> i64 {
    30
}

fn default_two_factor_reverify_hours() -> i64 {
    2
}

fn default_verification_ttl_secs() -> u64 {
    10 * 60
}

fn default_totp_digits() -> u32 {
    6
}

fn default_totp_period_secs() -> u64 {
    30
}

fn default_oauth_state_ttl_mins() -> i64 {
    15
}
