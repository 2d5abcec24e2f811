//! HTTP client for OAuth 2.0 token endpoints
//!
//! Speaks the form-encoded token and revocation protocol used by Google
//! and most providers. Retries are left to the lifecycle manager, so the
//! underlying client makes a single attempt per call.

use std::time::Duration;

use async_trait::async_trait;
use orderlink_core::{TokenEndpoint, TokenEndpointError};
use orderlink_domain::{OAuthPlatformConfig, Result, TokenResponse};
use reqwest::{Method, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::http::HttpClient;

const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Error body defined by RFC 6749 section 5.2.
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// [`TokenEndpoint`] over plain HTTPS form posts.
#[derive(Clone)]
pub struct HttpTokenEndpoint {
    http_client: HttpClient,
}

impl HttpTokenEndpoint {
    /// Client with the default timeout.
    pub fn new() -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http_client })
    }

    /// Use a preconfigured client (tests shorten the timeout).
    pub fn with_client(http_client: HttpClient) -> Self {
        Self { http_client }
    }

    async fn post_token_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> std::result::Result<TokenResponse, TokenEndpointError> {
        let request = self
            .http_client
            .request(Method::POST, url)
            .header("Accept", "application/json")
            .form(form);
        let response = self.http_client.send(request).await?;
        let response = ensure_success(response).await?;

        let body = response
            .text()
            .await
            .map_err(|err| TokenEndpointError::Network(err.to_string()))?;
        let tokens: TokenResponse = serde_json::from_str(&body)
            .map_err(|err| TokenEndpointError::InvalidResponse(err.to_string()))?;
        if tokens.access_token.is_empty() {
            return Err(TokenEndpointError::InvalidResponse("response has no access_token".into()));
        }
        Ok(tokens)
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange_code(
        &self,
        config: &OAuthPlatformConfig,
        code: &str,
        code_verifier: Option<&str>,
    ) -> std::result::Result<TokenResponse, TokenEndpointError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("client_id", config.client_id.as_str()),
        ];
        if !config.client_secret.is_empty() {
            form.push(("client_secret", config.client_secret.as_str()));
        }
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }

        debug!(platform = %config.platform, "exchanging authorization code");
        self.post_token_form(&config.token_url, &form).await
    }

    async fn refresh(
        &self,
        config: &OAuthPlatformConfig,
        refresh_token: &str,
    ) -> std::result::Result<TokenResponse, TokenEndpointError> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", config.client_id.as_str()),
        ];
        if !config.client_secret.is_empty() {
            form.push(("client_secret", config.client_secret.as_str()));
        }

        debug!(platform = %config.platform, "refreshing access token");
        self.post_token_form(&config.token_url, &form).await
    }

    async fn revoke(
        &self,
        config: &OAuthPlatformConfig,
        token: &str,
    ) -> std::result::Result<(), TokenEndpointError> {
        let Some(revoke_url) = config.revoke_url.as_deref() else {
            debug!(platform = %config.platform, "platform has no revocation endpoint");
            return Ok(());
        };

        let request = self
            .http_client
            .request(Method::POST, revoke_url)
            .form(&[("token", token)]);
        let response = self.http_client.send(request).await?;
        ensure_success(response).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into [`TokenEndpointError::Http`], reading the
/// OAuth error body when there is one.
async fn ensure_success(response: Response) -> std::result::Result<Response, TokenEndpointError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (error, description) = match serde_json::from_str::<OAuthErrorBody>(&body) {
        Ok(parsed) => (parsed.error, parsed.error_description),
        Err(_) => (status.canonical_reason().unwrap_or("http_error").to_string(), None),
    };
    warn!(status = status.as_u16(), %error, "token endpoint rejected request");

    Err(TokenEndpointError::Http { status: status.as_u16(), error, description })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config_for(server: &MockServer) -> OAuthPlatformConfig {
        let mut config = OAuthPlatformConfig::google_sheets(
            "client-1".into(),
            "shh".into(),
            "https://app.example.com/oauth/callback".into(),
        );
        config.token_url = format!("{}/token", server.uri());
        config.revoke_url = Some(format!("{}/revoke", server.uri()));
        config
    }

    fn endpoint() -> HttpTokenEndpoint {
        HttpTokenEndpoint::new().expect("token endpoint")
    }

    #[tokio::test]
    async fn exchanges_code_with_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("code_verifier=verifier-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-1",
                "refresh_token": "rt-1",
                "expires_in": 3599,
                "scope": "a b",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = endpoint()
            .exchange_code(&config_for(&server), "abc", Some("verifier-123"))
            .await
            .expect("tokens");

        assert_eq!(tokens.access_token, "at-1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(tokens.expires_in, Some(3599));
    }

    #[tokio::test]
    async fn invalid_grant_maps_to_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let err = endpoint().refresh(&config_for(&server), "rt-old").await.unwrap_err();

        assert_eq!(
            err,
            TokenEndpointError::Http {
                status: 400,
                error: "invalid_grant".into(),
                description: Some("Token has been expired or revoked.".into()),
            }
        );
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn server_error_is_retryable_and_not_retried_here() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503).set_body_string("<html>down</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let err = endpoint().refresh(&config_for(&server), "rt").await.unwrap_err();

        assert!(matches!(err, TokenEndpointError::Http { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn non_json_success_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = endpoint().exchange_code(&config_for(&server), "abc", None).await.unwrap_err();
        assert!(matches!(err, TokenEndpointError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": "late" }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = HttpClient::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .expect("http client");
        let err = HttpTokenEndpoint::with_client(client)
            .refresh(&config_for(&server), "rt")
            .await
            .unwrap_err();

        assert_eq!(err, TokenEndpointError::Timeout);
    }

    #[tokio::test]
    async fn revokes_token_and_skips_platforms_without_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .and(body_string_contains("token=at-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        endpoint().revoke(&config, "at-1").await.expect("revoked");

        config.revoke_url = None;
        endpoint().revoke(&config, "at-1").await.expect("no-op");
    }
}
