use crate::config::GithubConfig;
use crate::error::QuillError;
use oauth2::{
    AuthUrl, AuthorizationCode, Client as OAuth2Client, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    StandardRevocableToken, TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenResponse,
    },
};
use url::Url;

/// Stateless GitHub OAuth endpoints. Unlike a fixed-credential deployment
/// the client is rebuilt per call from configuration; construction is cheap.
pub struct GithubOauthEndpoints;

const DEFAULT_SCOPES: [&str; 2] = ["user:email", "read:user"];

pub(crate) const CALLBACK_PATH: &str = "/auth/github/callback";

impl GithubOauthEndpoints {
    /// Build an auth URL with the default scopes and PKCE challenge preset.
    pub fn build_authorize_url(
        cfg: &GithubConfig,
        base_url: &Url,
        pkce_challenge: PkceCodeChallenge,
    ) -> Result<(Url, CsrfToken), QuillError> {
        let client = build_oauth2_client(cfg, base_url)?;
        let mut req = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge);

        for scope in DEFAULT_SCOPES {
            req = req.add_scope(Scope::new(scope.to_string()));
        }

        Ok(req.url())
    }

    /// Exchange an authorization code (PKCE) for tokens.
    pub async fn exchange_authorization_code(
        cfg: &GithubConfig,
        base_url: &Url,
        code: AuthorizationCode,
        verifier: PkceCodeVerifier,
        http_client: reqwest::Client,
    ) -> Result<BasicTokenResponse, QuillError> {
        let client = build_oauth2_client(cfg, base_url)?;
        let token_result = client
            .exchange_code(code)
            .set_pkce_verifier(verifier)
            .request_async(&http_client)
            .await
            .map_err(|e| {
                QuillError::oauth_flow("TOKEN_EXCHANGE_FAILED", format!("Token exchange failed: {e}"))
            })?;
        Ok(token_result)
    }
}

/// Build the GitHub OAuth2 client from configuration.
fn build_oauth2_client(
    cfg: &GithubConfig,
    base_url: &Url,
) -> Result<GithubOauth2Client, QuillError> {
    let redirect = base_url.join(CALLBACK_PATH)?;
    let client = OAuth2Client::new(ClientId::new(cfg.client_id.clone()))
        .set_client_secret(ClientSecret::new(cfg.client_secret.clone()))
        .set_auth_uri(AuthUrl::from_url(cfg.auth_url.clone()))
        .set_token_uri(TokenUrl::from_url(cfg.token_url.clone()))
        .set_redirect_uri(RedirectUrl::from_url(redirect));
    Ok(client)
}

pub(crate) type GithubOauth2Client<
    HasAuthUrl = EndpointSet,
    HasDeviceAuthUrl = EndpointNotSet,
    HasIntrospectionUrl = EndpointNotSet,
    HasRevocationUrl = EndpointNotSet,
    HasTokenUrl = EndpointSet,
> = OAuth2Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    HasAuthUrl,
    HasDeviceAuthUrl,
    HasIntrospectionUrl,
    HasRevocationUrl,
    HasTokenUrl,
>;
