//! Registry token negotiation.
//!
//! Probes `GET /v2/` for a `WWW-Authenticate` challenge and requests
//! pull-scoped bearer tokens from the advertised token endpoint.

use docker_pull_core::config::PullConfig;
use docker_pull_core::error::{PullError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use serde::Deserialize;

/// Token endpoint and service name advertised by a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Token endpoint URL (the challenge `realm`)
    pub realm: String,
    /// Service name, empty when the registry does not send one
    pub service: String,
}

impl AuthChallenge {
    /// Read `realm` and `service` from a challenge header.
    ///
    /// The values are taken from fixed positions after splitting on `"`:
    /// `Bearer realm="<realm>",service="<service>",...`. A missing service
    /// yields an empty string; a missing realm yields `None`.
    pub fn parse(header: &str) -> Option<Self> {
        let fields: Vec<&str> = header.split('"').collect();
        let realm = fields.get(1)?.to_string();
        let service = fields.get(3).map(|s| s.to_string()).unwrap_or_default();
        Some(Self { realm, service })
    }

    fn from_config(config: &PullConfig) -> Self {
        Self {
            realm: config.default_auth_realm.clone(),
            service: config.default_auth_service.clone(),
        }
    }
}

/// Inputs of one token request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub token_endpoint: String,
    pub service_name: String,
    /// Repository the token is scoped to (`repository:<repo>:pull`)
    pub repository: String,
    /// Media type sent as `Accept` alongside the token
    pub accept_type: String,
}

impl AuthContext {
    /// `repository:<repo>:pull`
    pub fn scope(&self) -> String {
        format!("repository:{}:pull", self.repository)
    }
}

/// Short-lived pull credential.
#[derive(Debug, Clone)]
pub struct BearerToken {
    pub access_token: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Builds the HTTP client shared by every registry request.
pub fn build_http_client(config: &PullConfig) -> Result<reqwest::Client> {
    if config.accept_invalid_certs {
        tracing::warn!("TLS certificate verification is disabled for registry requests");
    }
    reqwest::Client::builder()
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .build()
        .map_err(|e| PullError::ConfigError(format!("Failed to build HTTP client: {}", e)))
}

/// Fetches bearer tokens for one repository.
///
/// Tokens are requested again for every call to [`AuthNegotiator::authorize`]:
/// they expire quickly and the `Accept` type differs between requests.
pub struct AuthNegotiator {
    http: reqwest::Client,
    challenge: AuthChallenge,
    repository: String,
}

impl AuthNegotiator {
    /// Create a negotiator for an already discovered challenge.
    pub fn new(http: reqwest::Client, challenge: AuthChallenge, repository: impl Into<String>) -> Self {
        Self {
            http,
            challenge,
            repository: repository.into(),
        }
    }

    /// Probe the registry and build a negotiator from its challenge.
    pub async fn discover(
        http: reqwest::Client,
        config: &PullConfig,
        host: &str,
        repository: impl Into<String>,
    ) -> Result<Self> {
        let challenge = probe_registry(&http, config, host).await?;
        Ok(Self::new(http, challenge, repository))
    }

    pub fn challenge(&self) -> &AuthChallenge {
        &self.challenge
    }

    /// Token request parameters for `accept_type`.
    pub fn context(&self, accept_type: &str) -> AuthContext {
        AuthContext {
            token_endpoint: self.challenge.realm.clone(),
            service_name: self.challenge.service.clone(),
            repository: self.repository.clone(),
            accept_type: accept_type.to_string(),
        }
    }

    /// Fetch a fresh token and return the `Authorization`/`Accept` header pair.
    pub async fn authorize(&self, accept_type: &str) -> Result<HeaderMap> {
        let context = self.context(accept_type);
        let token = fetch_token(&self.http, &context).await?;
        auth_headers(&token, &context.accept_type)
    }
}

/// Issue an unauthenticated `GET /v2/` and read the auth challenge.
///
/// A 401 must carry a challenge header. Any other answer means the registry
/// did not ask for a token service, so the configured defaults apply.
pub async fn probe_registry(
    http: &reqwest::Client,
    config: &PullConfig,
    host: &str,
) -> Result<AuthChallenge> {
    let url = format!("{}/", config.registry_base(host));
    tracing::debug!(url = %url, "Probing registry");

    let resp = http.get(&url).send().await?;
    if resp.status() != StatusCode::UNAUTHORIZED {
        tracing::info!(
            registry = %host,
            status = resp.status().as_u16(),
            "No auth challenge, using default token service"
        );
        return Ok(AuthChallenge::from_config(config));
    }

    let header = resp
        .headers()
        .get(WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| PullError::AuthError {
            realm: url.clone(),
            message: "401 without WWW-Authenticate header".to_string(),
        })?;

    let challenge = AuthChallenge::parse(header).ok_or_else(|| PullError::AuthError {
        realm: url.clone(),
        message: format!("Unparseable challenge: {}", header),
    })?;

    tracing::info!(
        registry = %host,
        realm = %challenge.realm,
        service = %challenge.service,
        "Registry requires token auth"
    );
    Ok(challenge)
}

/// Request a bearer token for `context`.
pub async fn fetch_token(http: &reqwest::Client, context: &AuthContext) -> Result<BearerToken> {
    let auth_err = |message: String| PullError::AuthError {
        realm: context.token_endpoint.clone(),
        message,
    };

    tracing::debug!(
        realm = %context.token_endpoint,
        scope = %context.scope(),
        "Requesting bearer token"
    );

    let resp = http
        .get(&context.token_endpoint)
        .query(&[
            ("service", context.service_name.as_str()),
            ("scope", context.scope().as_str()),
        ])
        .send()
        .await
        .map_err(|e| auth_err(format!("Token endpoint unreachable: {}", e)))?;

    let status = resp.status();
    let body: TokenResponse = resp
        .json()
        .await
        .map_err(|e| auth_err(format!("Malformed token response [HTTP {}]: {}", status, e)))?;

    body.token
        .or(body.access_token)
        .map(|access_token| BearerToken { access_token })
        .ok_or_else(|| auth_err(format!("Token response has no token field [HTTP {}]", status)))
}

/// `Authorization: Bearer <token>` and `Accept: <accept_type>`.
pub fn auth_headers(token: &BearerToken, accept_type: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let bearer = HeaderValue::from_str(&format!("Bearer {}", token.access_token))
        .map_err(|e| PullError::HttpError(format!("Invalid token characters: {}", e)))?;
    let accept = HeaderValue::from_str(accept_type)
        .map_err(|e| PullError::HttpError(format!("Invalid accept type: {}", e)))?;
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(ACCEPT, accept);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_challenge_realm_and_service() {
        let challenge = AuthChallenge::parse(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io""#,
        )
        .unwrap();
        assert_eq!(challenge.realm, "https://auth.docker.io/token");
        assert_eq!(challenge.service, "registry.docker.io");
    }

    #[test]
    fn test_parse_challenge_without_service() {
        let challenge = AuthChallenge::parse(r#"Bearer realm="https://mcr.example/token""#).unwrap();
        assert_eq!(challenge.realm, "https://mcr.example/token");
        assert_eq!(challenge.service, "");
    }

    #[test]
    fn test_parse_challenge_with_scope() {
        let challenge = AuthChallenge::parse(
            r#"Bearer realm="https://ghcr.io/token",service="ghcr.io",scope="repository:org/app:pull""#,
        )
        .unwrap();
        assert_eq!(challenge.realm, "https://ghcr.io/token");
        assert_eq!(challenge.service, "ghcr.io");
    }

    #[test]
    fn test_parse_challenge_without_quotes() {
        assert!(AuthChallenge::parse("Basic").is_none());
    }

    #[test]
    fn test_challenge_from_config() {
        let challenge = AuthChallenge::from_config(&PullConfig::default());
        assert_eq!(challenge.realm, "https://auth.docker.io/token");
        assert_eq!(challenge.service, "registry.docker.io");
    }

    #[test]
    fn test_context_scope() {
        let negotiator = AuthNegotiator::new(
            reqwest::Client::new(),
            AuthChallenge {
                realm: "https://auth.example/token".to_string(),
                service: "example".to_string(),
            },
            "library/nginx",
        );
        let context = negotiator.context("application/json");
        assert_eq!(context.token_endpoint, "https://auth.example/token");
        assert_eq!(context.service_name, "example");
        assert_eq!(context.accept_type, "application/json");
        assert_eq!(context.scope(), "repository:library/nginx:pull");
    }

    #[test]
    fn test_auth_headers() {
        let token = BearerToken {
            access_token: "abc.def".to_string(),
        };
        let headers = auth_headers(&token, "application/vnd.docker.distribution.manifest.v2+json")
            .unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer abc.def");
        assert_eq!(
            headers[ACCEPT],
            "application/vnd.docker.distribution.manifest.v2+json"
        );
    }

    #[test]
    fn test_auth_headers_rejects_newline_in_token() {
        let token = BearerToken {
            access_token: "abc\ndef".to_string(),
        };
        assert!(auth_headers(&token, "application/json").is_err());
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&PullConfig::default()).is_ok());
    }
}
