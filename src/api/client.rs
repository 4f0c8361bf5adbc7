use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;
use crate::error::{ClientError, Result};
use crate::models::ExportedFile;
use crate::storage::TokenStore;

/// Plain `{"message": ...}` acknowledgement returned by mutation endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: String,
}

/// Stateless REST wrapper. Every authorized call re-reads the bearer token
/// from the token store, so a login in one place is seen everywhere.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    tokens: TokenStore,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, tokens: TokenStore) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                ClientError::InvalidConfiguration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn public(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    pub(crate) fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self.tokens.access_token()?.ok_or(ClientError::MissingToken)?;
        Ok(self.public(method, path).bearer_auth(token))
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(self.authorized(Method::GET, path)?).await
    }

    pub(crate) async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send_json(self.authorized(Method::POST, path)?.json(body)).await
    }

    pub(crate) async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send_json(self.authorized(Method::PUT, path)?.json(body)).await
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = Self::check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    pub(crate) async fn send_bytes(
        &self,
        request: RequestBuilder,
        fallback_name: &str,
    ) -> Result<ExportedFile> {
        let response = Self::check(request.send().await?).await?;

        let headers = response.headers();
        let file_name = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(ExportedFile::file_name_from_disposition)
            .unwrap_or_else(|| fallback_name.to_string());
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await?.to_vec();

        tracing::debug!(file_name = %file_name, size = bytes.len(), "Downloaded export");

        Ok(ExportedFile {
            file_name,
            content_type,
            bytes,
        })
    }

    /// Turns a non-2xx response into `ClientError::Api` carrying the server message
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body).unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("Request failed").to_string()
            } else {
                body.clone()
            }
        });

        tracing::warn!(status = %status, path = %url, message = %message, "API request failed");

        Err(ClientError::Api { status, message })
    }
}

/// Percent-encodes one path segment
pub(crate) fn segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

/// Pulls the human message out of a FastAPI-style error body
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    match value.get("detail") {
        Some(serde_json::Value::String(detail)) => return Some(detail.clone()),
        Some(serde_json::Value::Array(items)) => {
            let joined = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect::<Vec<_>>()
                .join("; ");
            if !joined.is_empty() {
                return Some(joined);
            }
        }
        _ => {}
    }

    value
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client() -> ApiClient {
        ApiClient::new(
            &ApiConfig {
                base_url: "http://localhost:8000/".to_string(),
                request_timeout: Duration::from_secs(5),
            },
            TokenStore::in_memory(),
        )
        .unwrap()
    }

    #[test]
    fn test_extract_detail_string() {
        assert_eq!(
            extract_error_message(r#"{"detail":"Session not found"}"#).as_deref(),
            Some("Session not found")
        );
    }

    #[test]
    fn test_extract_validation_errors() {
        let body = r#"{"detail":[{"loc":["body","email"],"msg":"value is not a valid email address"},{"msg":"field required"}]}"#;
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("value is not a valid email address; field required")
        );
    }

    #[test]
    fn test_extract_message_field_and_garbage() {
        assert_eq!(
            extract_error_message(r#"{"message":"nope"}"#).as_deref(),
            Some("nope")
        );
        assert!(extract_error_message("<html>Bad Gateway</html>").is_none());
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        assert_eq!(client().url("/api/auth/me"), "http://localhost:8000/api/auth/me");
    }

    #[test]
    fn test_authorized_requires_token() {
        let api = client();
        assert!(matches!(
            api.authorized(Method::GET, "/api/auth/me"),
            Err(ClientError::MissingToken)
        ));
        api.tokens().set_access_token("t").unwrap();
        assert!(api.authorized(Method::GET, "/api/auth/me").is_ok());
    }

    #[test]
    fn test_segment_encodes() {
        assert_eq!(segment("a b/c"), "a%20b%2Fc");
    }
}
