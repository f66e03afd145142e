//! HTTP client for the downstream list API.

use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vigil_core::{ListItem, ListRef, Result, VigilError};

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the downstream list-consuming system.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct ListClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: HttpClient,
    token: String,
    base_url: String,
}

#[derive(Serialize)]
struct CreateListRequest<'a> {
    name: &'a str,
    description: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

impl ListClient {
    /// Create a client with default settings
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Self::builder(base_url, token).build()
    }

    /// Create a builder for custom configuration
    #[must_use]
    pub fn builder(base_url: impl Into<String>, token: impl Into<String>) -> ListClientBuilder {
        ListClientBuilder::new(base_url, token)
    }

    /// Enumerate every list on the account
    pub async fn list_all(&self) -> Result<Vec<ListRef>> {
        self.get("/lists").await
    }

    /// Create a new list
    pub async fn create_list(
        &self,
        name: &str,
        description: &str,
        kind: &str,
    ) -> Result<ListRef> {
        self.post(
            "/lists",
            &CreateListRequest {
                name,
                description,
                kind,
            },
        )
        .await
    }

    /// Delete a list
    pub async fn delete_list(&self, list_id: &str) -> Result<()> {
        self.delete(&format!("/lists/{list_id}")).await
    }

    /// Replace a list's items wholesale. An empty slice clears the list.
    pub async fn replace_items(&self, list_id: &str, items: &[ListItem]) -> Result<()> {
        self.put(&format!("/lists/{list_id}/items"), &items).await
    }

    /// Append a batch of items to a list
    pub async fn append_items(&self, list_id: &str, items: &[ListItem]) -> Result<()> {
        self.post_empty(&format!("/lists/{list_id}/items"), &items)
            .await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!(url = %url, "GET request");
        let response = self
            .inner
            .http
            .get(&url)
            .bearer_auth(&self.inner.token)
            .send()
            .await
            .map_err(|e| VigilError::Http(e.to_string()))?;
        self.handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        debug!(url = %url, "POST request");
        let response = self
            .inner
            .http
            .post(&url)
            .bearer_auth(&self.inner.token)
            .json(body)
            .send()
            .await
            .map_err(|e| VigilError::Http(e.to_string()))?;
        self.handle_response(response).await
    }

    async fn post_empty<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let url = self.url(path);
        debug!(url = %url, "POST request");
        let response = self
            .inner
            .http
            .post(&url)
            .bearer_auth(&self.inner.token)
            .json(body)
            .send()
            .await
            .map_err(|e| VigilError::Http(e.to_string()))?;
        self.handle_empty_response(response).await
    }

    async fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let url = self.url(path);
        debug!(url = %url, "PUT request");
        let response = self
            .inner
            .http
            .put(&url)
            .bearer_auth(&self.inner.token)
            .json(body)
            .send()
            .await
            .map_err(|e| VigilError::Http(e.to_string()))?;
        self.handle_empty_response(response).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        debug!(url = %url, "DELETE request");
        let response = self
            .inner
            .http
            .delete(&url)
            .bearer_auth(&self.inner.token)
            .send()
            .await
            .map_err(|e| VigilError::Http(e.to_string()))?;
        self.handle_empty_response(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.inner.base_url)
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| VigilError::Http(e.to_string()))?;
            serde_json::from_str(&body).map_err(VigilError::Json)
        } else {
            Err(Self::error_from(status.as_u16(), response).await)
        }
    }

    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::error_from(status.as_u16(), response).await)
        }
    }

    async fn error_from(status: u16, response: reqwest::Response) -> VigilError {
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            warn!("rate limited by downstream list API");
            return VigilError::RateLimited { retry_after };
        }

        let body = response.text().await.unwrap_or_default();
        // Prefer the error message inside a JSON body when there is one.
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or(body);

        VigilError::Api {
            code: status,
            message,
        }
    }
}

/// Builder for configuring a [`ListClient`]
pub struct ListClientBuilder {
    base_url: String,
    token: String,
    timeout: Duration,
    user_agent: String,
}

impl ListClientBuilder {
    fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("vigil/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Set the request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the User-Agent header
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ListClient> {
        let http = HttpClient::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .gzip(true)
            .build()
            .map_err(|e| VigilError::Config(format!("http client: {e}")))?;

        Ok(ListClient {
            inner: Arc::new(ClientInner {
                http,
                token: self.token,
                base_url: self.base_url.trim_end_matches('/').to_string(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> ListClient {
        ListClient::new(server.uri(), "secret-token").unwrap()
    }

    #[tokio::test]
    async fn test_list_all_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lists"))
            .and(bearer_token("secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "l1", "name": "Vigil-20250101-Part001of002", "description": "d"}
            ])))
            .mount(&server)
            .await;

        let lists = client(&server).await.list_all().await.unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].id, "l1");
    }

    #[tokio::test]
    async fn test_create_list_posts_expected_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/lists"))
            .and(body_json(serde_json::json!({
                "name": "Vigil-20250101-Part001of001",
                "description": "aggregated indicators",
                "type": "DOMAIN"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(
                {"id": "new-id", "name": "Vigil-20250101-Part001of001", "description": "aggregated indicators"}
            )))
            .mount(&server)
            .await;

        let list = client(&server)
            .await
            .create_list("Vigil-20250101-Part001of001", "aggregated indicators", "DOMAIN")
            .await
            .unwrap();
        assert_eq!(list.id, "new-id");
    }

    #[tokio::test]
    async fn test_429_maps_to_rate_limited_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/lists/x"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = client(&server).await.delete_list("x").await.unwrap_err();
        assert!(matches!(err, VigilError::RateLimited { retry_after: Some(7) }));
    }

    #[tokio::test]
    async fn test_error_body_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/lists/x/items"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "too many items"})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .replace_items("x", &[])
            .await
            .unwrap_err();
        match err {
            VigilError::Api { code, message } => {
                assert_eq!(code, 400);
                assert_eq!(message, "too many items");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
