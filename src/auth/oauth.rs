use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, info, warn};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::reqwest::http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use tiny_http::{Response, Server};
use url::Url;

use crate::auth::client_secrets::ClientSecrets;
use crate::auth::credential::{Credential, ScopeSet};
use crate::config::Config;
use crate::error::{AuthError, RefreshError};

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Network side of the credential lifecycle: refreshing an expired token
/// and running the interactive consent flow.
pub trait TokenProvider: Send + Sync {
    fn refresh(&self, stale: &Credential) -> Result<Credential, RefreshError>;

    /// Obtain a brand-new credential for `scopes`. May block on the user.
    fn authorize(&self, scopes: &ScopeSet) -> Result<Credential, AuthError>;
}

/// Google OAuth: refresh-token grant plus authorization code + PKCE with a
/// loopback redirect.
pub struct OAuthProvider {
    secrets_path: PathBuf,
    secrets: Option<ClientSecrets>,
    redirect_port: u16,
    timeout: Duration,
}

impl OAuthProvider {
    pub fn new(
        secrets_path: impl Into<PathBuf>,
        secrets: Option<ClientSecrets>,
        redirect_port: u16,
        timeout: Duration,
    ) -> Self {
        Self {
            secrets_path: secrets_path.into(),
            secrets,
            redirect_port,
            timeout,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self, AuthError> {
        let path = cfg.client_secrets_path();
        let secrets = ClientSecrets::load(&path)?.map(ClientSecrets::with_secret_fallback);
        if secrets.is_none() {
            debug!("no client secrets at {}", path.display());
        }
        Ok(Self::new(
            path,
            secrets,
            cfg.redirect_port,
            Duration::from_secs(cfg.auth_timeout_secs),
        ))
    }

    fn secrets(&self) -> Result<&ClientSecrets, AuthError> {
        self.secrets
            .as_ref()
            .ok_or_else(|| AuthError::MissingClientSecret {
                path: self.secrets_path.clone(),
            })
    }
}

fn oauth_client(secrets: &ClientSecrets) -> Result<BasicClient, url::ParseError> {
    Ok(BasicClient::new(
        ClientId::new(secrets.client_id.clone()),
        secrets.client_secret.clone().map(ClientSecret::new),
        AuthUrl::new(secrets.auth_uri.clone())?,
        Some(TokenUrl::new(secrets.token_uri.clone())?),
    ))
}

/// Turn a token response into a credential. Fields the provider leaves out
/// are carried over from `previous`.
fn credential_from_response(
    token: &BasicTokenResponse,
    previous_refresh: Option<&str>,
    previous_scopes: &ScopeSet,
) -> Credential {
    let lifetime = token
        .expires_in()
        .map(|d| d.as_secs() as i64)
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

    let scopes = token
        .scopes()
        .map(|granted| granted.iter().map(|s| s.as_str().to_string()).collect())
        .unwrap_or_else(|| previous_scopes.clone());

    Credential {
        access_token: token.access_token().secret().to_string(),
        refresh_token: token
            .refresh_token()
            .map(|r| r.secret().to_string())
            .or_else(|| previous_refresh.map(str::to_string)),
        expires_at: Utc::now() + chrono::Duration::seconds(lifetime),
        scopes,
    }
}

impl TokenProvider for OAuthProvider {
    fn refresh(&self, stale: &Credential) -> Result<Credential, RefreshError> {
        let refresh_token = stale
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(RefreshError::NoRefreshToken)?;
        let secrets = self
            .secrets
            .as_ref()
            .ok_or(RefreshError::MissingClientSecret)?;
        let client = oauth_client(secrets).map_err(|e| RefreshError::Transport(e.to_string()))?;

        let token = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request(http_client)
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(resp) => RefreshError::Rejected(resp.to_string()),
                other => RefreshError::Transport(other.to_string()),
            })?;

        Ok(credential_from_response(
            &token,
            Some(refresh_token),
            &stale.scopes,
        ))
    }

    fn authorize(&self, scopes: &ScopeSet) -> Result<Credential, AuthError> {
        let secrets = self.secrets()?;

        // Listen first so the browser can't beat us to the callback.
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.redirect_port);
        let server = Server::http(bind_addr).map_err(|e| {
            AuthError::Authorization(format!("failed to bind callback server on {bind_addr}: {e}"))
        })?;
        let port = server.server_addr().port();
        let redirect_uri = format!("http://localhost:{port}/");

        let redirect_url =
            RedirectUrl::new(redirect_uri).map_err(|e| AuthError::Authorization(e.to_string()))?;
        let client = oauth_client(secrets)
            .map_err(|e| AuthError::InvalidClientSecret(e.to_string()))?
            .set_redirect_uri(redirect_url);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        println!("Open this URL in your browser to authorize inbox access:\n{auth_url}");
        if let Err(e) = open::that(auth_url.as_str()) {
            warn!("could not open browser automatically: {e}");
        }

        let code = wait_for_code(&server, csrf_token.secret(), port, self.timeout)?;

        let token = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request(http_client)
            .map_err(|e| {
                debug!("token exchange failed: {e:#?}");
                AuthError::Authorization(format!("token exchange failed: {e}"))
            })?;

        info!("authorization completed");
        Ok(credential_from_response(&token, None, scopes))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Callback {
    Code(String),
    Denied(String),
    StateMismatch,
    Ignored,
}

/// Inspect one redirect request (`/path?query`) against the expected CSRF state.
fn parse_callback(request_url: &str, port: u16, expected_state: &str) -> Callback {
    let Ok(parsed) = Url::parse(&format!("http://localhost:{port}{request_url}")) else {
        return Callback::Ignored;
    };

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (k, v) in parsed.query_pairs() {
        match k.as_ref() {
            "code" => code = Some(v.into_owned()),
            "state" => state = Some(v.into_owned()),
            "error" => error = Some(v.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Callback::Denied(error);
    }
    match code {
        Some(_) if state.as_deref() != Some(expected_state) => Callback::StateMismatch,
        Some(code) => Callback::Code(code),
        None => Callback::Ignored,
    }
}

fn wait_for_code(
    server: &Server,
    expected_state: &str,
    port: u16,
    timeout: Duration,
) -> Result<String, AuthError> {
    let wait_until = Instant::now() + timeout;

    while Instant::now() < wait_until {
        let Ok(Some(request)) = server.recv_timeout(Duration::from_millis(500)) else {
            continue;
        };

        match parse_callback(request.url(), port, expected_state) {
            Callback::Code(code) => {
                let _ = request.respond(Response::from_string(
                    "Authorization received. You can close this tab.",
                ));
                return Ok(code);
            }
            Callback::Denied(reason) => {
                let _ = request.respond(Response::from_string(
                    "Authorization was denied. You can close this tab.",
                ));
                return Err(AuthError::Authorization(format!(
                    "consent denied: {reason}"
                )));
            }
            Callback::StateMismatch => {
                warn!("ignoring OAuth callback with mismatched state");
                let _ = request.respond(Response::from_string("State mismatch."));
            }
            Callback::Ignored => {
                let _ = request.respond(Response::from_string("No code found in redirect."));
            }
        }
    }

    Err(AuthError::Authorization(format!(
        "no authorization code received within {}s",
        timeout.as_secs()
    )))
}
