//! OAuth helpers for adapters whose providers issue refreshable tokens.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use oauth2::basic::{BasicClient, BasicErrorResponseType};
use oauth2::{
    AuthUrl, ClientId, ClientSecret, RefreshToken, RequestTokenError, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use serde_json::Value;

use crate::contracts::OAuthTokenDto;

use super::AdapterError;

#[async_trait]
pub trait OAuthAdapter: Send + Sync {
    /// How long before expiry a token counts as stale.
    fn expiry_skew(&self) -> Duration;

    fn is_token_expiring(&self, token: &OAuthTokenDto) -> bool {
        let Some(expiry) = token.expiry else {
            return false;
        };
        let skew = chrono::Duration::from_std(self.expiry_skew()).unwrap_or_default();
        expiry - skew <= Utc::now()
    }

    async fn refresh_token(&self, token: &OAuthTokenDto) -> Result<OAuthTokenDto, AdapterError>;
}

/// `oauth_config` block of a provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OAuth2Settings {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub auth_url: String,
    pub token_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry_skew_seconds: Option<u64>,
}

impl OAuth2Settings {
    pub fn from_value(identifier: &str, value: &Value) -> Result<Self, AdapterError> {
        let settings: OAuth2Settings = serde_json::from_value(value.clone())
            .map_err(|e| AdapterError::invalid_config(identifier, format!("oauth_config: {e}")))?;
        AuthUrl::new(settings.auth_url.clone())
            .map_err(|e| AdapterError::invalid_config(identifier, format!("auth_url: {e}")))?;
        TokenUrl::new(settings.token_url.clone())
            .map_err(|e| AdapterError::invalid_config(identifier, format!("token_url: {e}")))?;
        if settings.client_id.trim().is_empty() {
            return Err(AdapterError::invalid_config(identifier, "oauth_config.client_id is empty"));
        }
        Ok(settings)
    }
}

/// Refresh-token grant against the provider's token endpoint.
pub struct OAuth2Refresher {
    provider: String,
    settings: OAuth2Settings,
    skew: Duration,
    http: reqwest::Client,
}

impl OAuth2Refresher {
    pub fn new(provider: &str, settings: OAuth2Settings, default_skew: Duration) -> Result<Self, AdapterError> {
        let skew = settings
            .expiry_skew_seconds
            .map(Duration::from_secs)
            .unwrap_or(default_skew);
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AdapterError::invalid_config(provider, format!("http client: {e}")))?;
        Ok(Self {
            provider: provider.to_string(),
            settings,
            skew,
            http,
        })
    }
}

#[async_trait]
impl OAuthAdapter for OAuth2Refresher {
    fn expiry_skew(&self) -> Duration {
        self.skew
    }

    async fn refresh_token(&self, token: &OAuthTokenDto) -> Result<OAuthTokenDto, AdapterError> {
        let refresh_token = token
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AdapterError::AuthFailed("stored token has no refresh token".into()))?;

        let auth_url = AuthUrl::new(self.settings.auth_url.clone())
            .map_err(|e| AdapterError::AuthFailed(format!("auth_url: {e}")))?;
        let token_url = TokenUrl::new(self.settings.token_url.clone())
            .map_err(|e| AdapterError::AuthFailed(format!("token_url: {e}")))?;
        let mut client = BasicClient::new(ClientId::new(self.settings.client_id.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url);
        if let Some(secret) = &self.settings.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request_async(&self.http)
            .await
            .map_err(|error| match error {
                RequestTokenError::ServerResponse(response) => {
                    if matches!(response.error(), BasicErrorResponseType::InvalidGrant) {
                        tracing::warn!(provider = %self.provider, "Refresh token rejected as invalid_grant");
                    }
                    AdapterError::AuthFailed(format!(
                        "token endpoint rejected refresh: {}",
                        response.error()
                    ))
                }
                RequestTokenError::Request(e) => {
                    AdapterError::AuthFailed(format!("token endpoint unreachable: {e}"))
                }
                RequestTokenError::Parse(e, _) => {
                    AdapterError::AuthFailed(format!("malformed token response: {e}"))
                }
                RequestTokenError::Other(message) => AdapterError::AuthFailed(message),
            })?;

        let scopes = response
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.as_str().to_string()).collect())
            .unwrap_or_else(|| token.scopes.clone());
        let expiry = response
            .expires_in()
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);

        tracing::info!(provider = %self.provider, "Refreshed OAuth access token");
        Ok(OAuthTokenDto {
            access_token: response.access_token().secret().clone(),
            refresh_token: Some(
                response
                    .refresh_token()
                    .map(|t| t.secret().clone())
                    .unwrap_or(refresh_token),
            ),
            expiry,
            scopes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(token_url: String) -> OAuth2Settings {
        OAuth2Settings::from_value(
            "github",
            &json!({
                "client_id": "client",
                "client_secret": "secret",
                "auth_url": "https://example.com/authorize",
                "token_url": token_url,
                "expiry_skew_seconds": 60,
            }),
        )
        .unwrap()
    }

    fn stale_token() -> OAuthTokenDto {
        OAuthTokenDto {
            access_token: "old".into(),
            refresh_token: Some("rt-1".into()),
            expiry: Some(Utc::now() - chrono::Duration::minutes(1)),
            scopes: vec!["repo".into()],
        }
    }

    #[test]
    fn expiry_uses_skew() {
        let refresher =
            OAuth2Refresher::new("github", settings("https://example.com/token".into()), Duration::ZERO)
                .unwrap();
        assert_eq!(refresher.expiry_skew(), Duration::from_secs(60));

        let mut token = stale_token();
        assert!(refresher.is_token_expiring(&token));
        token.expiry = Some(Utc::now() + chrono::Duration::seconds(30));
        assert!(refresher.is_token_expiring(&token));
        token.expiry = Some(Utc::now() + chrono::Duration::hours(1));
        assert!(!refresher.is_token_expiring(&token));
        token.expiry = None;
        assert!(!refresher.is_token_expiring(&token));
    }

    #[test]
    fn rejects_bad_token_url() {
        let err = OAuth2Settings::from_value(
            "github",
            &json!({"client_id": "c", "auth_url": "https://a", "token_url": "not a url"}),
        )
        .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn refresh_keeps_previous_refresh_token_and_scopes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh",
                "token_type": "bearer",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let refresher =
            OAuth2Refresher::new("github", settings(format!("{}/token", server.uri())), Duration::ZERO)
                .unwrap();
        let refreshed = refresher.refresh_token(&stale_token()).await.unwrap();

        assert_eq!(refreshed.access_token, "fresh");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(refreshed.scopes, vec!["repo"]);
        assert!(refreshed.expiry.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn invalid_grant_is_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
            })))
            .mount(&server)
            .await;

        let refresher =
            OAuth2Refresher::new("github", settings(format!("{}/token", server.uri())), Duration::ZERO)
                .unwrap();
        let err = refresher.refresh_token(&stale_token()).await.unwrap_err();
        assert!(matches!(err, AdapterError::AuthFailed(message) if message.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn missing_refresh_token_fails_without_network() {
        let refresher =
            OAuth2Refresher::new("github", settings("http://127.0.0.1:9/token".into()), Duration::ZERO)
                .unwrap();
        let mut token = stale_token();
        token.refresh_token = None;
        assert!(matches!(
            refresher.refresh_token(&token).await,
            Err(AdapterError::AuthFailed(_))
        ));
    }
}
