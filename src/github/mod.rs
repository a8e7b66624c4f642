//! GitHub authorization-code flow (with PKCE) and profile retrieval.

mod endpoints;
mod profile;

pub use endpoints::GithubOauthEndpoints;
pub use profile::{ProviderProfile, download_avatar, fetch_profile, prefill_username};
