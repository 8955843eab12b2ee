//! Dashboard API Client
//!
//! `reqwest` adapter for the `DashboardApi` port. Requests are made once;
//! retrying is the offline queue's job.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Value, json};

use crate::application::ports::{
    ApiError, DashboardApi, NewsletterRequest, Preferences, ProfileResponse,
};
use crate::domain::offline::{HttpMethod, NEWSLETTER_ENDPOINT, PREFERENCES_ENDPOINT};

/// Profile endpoint.
pub const PROFILE_ENDPOINT: &str = "/api/user/profile";

/// HTTP client for the dashboard API.
#[derive(Debug, Clone)]
pub struct HttpDashboardApi {
    client: Client,
    base_url: String,
}

impl HttpDashboardApi {
    /// Create a client for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Network` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are made against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.request(to_reqwest_method(method), &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            tracing::debug!(%method, path, status = status.as_u16(), "Dashboard API rejected request");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

const fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

#[async_trait]
impl DashboardApi for HttpDashboardApi {
    async fn fetch_profile(&self) -> Result<ProfileResponse, ApiError> {
        let value = self.request(HttpMethod::Get, PROFILE_ENDPOINT, None).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn update_preferences(&self, preferences: &Preferences) -> Result<(), ApiError> {
        let body = json!({ "preferences": preferences });
        self.request(HttpMethod::Put, PREFERENCES_ENDPOINT, Some(&body))
            .await
            .map(drop)
    }

    async fn subscribe_newsletter(&self, request: &NewsletterRequest) -> Result<(), ApiError> {
        let body = serde_json::to_value(request).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.request(HttpMethod::Post, NEWSLETTER_ENDPOINT, Some(&body))
            .await
            .map(drop)
    }

    async fn send_raw(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        self.request(method, endpoint, body.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn api(server: &MockServer) -> HttpDashboardApi {
        HttpDashboardApi::new(format!("{}/", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn fetch_profile_decodes_preferences() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROFILE_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": { "preferences": { "watchlist": ["AAPL"], "theme": "dark" } }
            })))
            .mount(&server)
            .await;

        let profile = api(&server).await.fetch_profile().await.unwrap();
        assert!(profile.user.preferences.watches("AAPL"));
        assert_eq!(profile.user.preferences.other["theme"], "dark");
    }

    #[tokio::test]
    async fn update_preferences_wraps_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(PREFERENCES_ENDPOINT))
            .and(body_json(json!({ "preferences": { "watchlist": ["TSLA"] } })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let preferences = Preferences {
            watchlist: vec!["TSLA".to_string()],
            ..Preferences::default()
        };
        api(&server)
            .await
            .update_preferences(&preferences)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_success_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(NEWSLETTER_ENDPOINT))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad email"))
            .mount(&server)
            .await;

        let request = NewsletterRequest {
            email: "nope".to_string(),
            preferences: Value::Null,
            source: "footer".to_string(),
        };
        let err = api(&server)
            .await
            .subscribe_newsletter(&request)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::Status {
                status: 422,
                body: "bad email".to_string()
            }
        );
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROFILE_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = api(&server).await.fetch_profile().await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let api = HttpDashboardApi::new("http://127.0.0.1:1", Duration::from_millis(500)).unwrap();
        let err = api
            .send_raw(HttpMethod::Delete, "/api/alerts/3", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }
}
