//! Common utilities for the OpenSearch admin API client
//!
//! Provides the authenticated HTTP wrapper shared by every API call and
//! the mapping from HTTP status codes to [`OpenSearchError`] classes.

use std::time::Duration;

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::OpenSearchError;

/// Timeout applied to health checks.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout applied to every other call.
pub const MUTATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Basic auth credentials
#[derive(Clone)]
pub struct Credentials {
    /// Username
    pub username: String,
    /// Password
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// HTTP client wrapper with authentication
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, credentials: Credentials) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Send a request and return the raw response after status classification.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        timeout: Duration,
    ) -> Result<Response, OpenSearchError> {
        let url = self.build_url(path);
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header("Accept", "application/json")
            .timeout(timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        check_status(response, &method, path).await
    }

    /// GET and decode JSON
    pub async fn get<T: DeserializeOwned>(&self, path: &str, timeout: Duration) -> Result<T, OpenSearchError> {
        let response = self.send(Method::GET, path, None, timeout).await?;
        decode(response, path).await
    }

    /// GET and decode JSON; 404 becomes `None`
    pub async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, OpenSearchError> {
        match self.get(path, MUTATION_TIMEOUT).await {
            Ok(value) => Ok(Some(value)),
            Err(OpenSearchError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// PUT a JSON body and decode the response
    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T, OpenSearchError> {
        let response = self.send(Method::PUT, path, Some(body), MUTATION_TIMEOUT).await?;
        decode(response, path).await
    }

    /// POST a JSON body and decode the response
    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T, OpenSearchError> {
        let response = self.send(Method::POST, path, Some(body), MUTATION_TIMEOUT).await?;
        decode(response, path).await
    }

    /// DELETE; an already absent object is not an error
    pub async fn delete(&self, path: &str) -> Result<(), OpenSearchError> {
        match self.send(Method::DELETE, path, None, MUTATION_TIMEOUT).await {
            Ok(_) | Err(OpenSearchError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// HEAD; 404 becomes `false`, other non-2xx statuses are errors
    pub async fn head(&self, path: &str) -> Result<bool, OpenSearchError> {
        match self.send(Method::HEAD, path, None, MUTATION_TIMEOUT).await {
            Ok(_) => Ok(true),
            Err(OpenSearchError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Map a reqwest transport failure onto the error taxonomy.
fn classify_transport_error(e: reqwest::Error) -> OpenSearchError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        OpenSearchError::Transient(e.to_string())
    } else {
        OpenSearchError::Http(e)
    }
}

/// Map non-success statuses onto the error taxonomy.
async fn check_status(response: Response, method: &Method, path: &str) -> Result<Response, OpenSearchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(error_for_status(status, &format!("{} {} failed: {} - {}", method, path, status, body)))
}

/// Build the error for a non-success status code.
pub fn error_for_status(status: StatusCode, message: &str) -> OpenSearchError {
    let message = message.to_string();
    match status.as_u16() {
        404 => OpenSearchError::NotFound(message),
        401 | 403 => OpenSearchError::Authentication(message),
        409 => OpenSearchError::Conflict(message),
        400 | 422 => OpenSearchError::Invalid(message),
        408 | 429 => OpenSearchError::Transient(message),
        s if s >= 500 => OpenSearchError::Transient(message),
        _ => OpenSearchError::Api(message),
    }
}

/// Decode a JSON body, keeping a prefix of the raw text for diagnostics.
async fn decode<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, OpenSearchError> {
    let text = response.text().await.map_err(classify_transport_error)?;
    let text = if text.trim().is_empty() { "null".to_string() } else { text };
    serde_json::from_str(&text).map_err(|e| {
        OpenSearchError::Decode(format!(
            "error decoding response of {}: {} - Response (first 500 chars): {}",
            path,
            e,
            text.chars().take(500).collect::<String>()
        ))
    })
}

/// Percent-encode one path segment.
pub fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(error_for_status(StatusCode::NOT_FOUND, "x"), OpenSearchError::NotFound(_)));
        assert!(matches!(error_for_status(StatusCode::CONFLICT, "x"), OpenSearchError::Conflict(_)));
        assert!(matches!(
            error_for_status(StatusCode::UNPROCESSABLE_ENTITY, "x"),
            OpenSearchError::Invalid(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::SERVICE_UNAVAILABLE, "x"),
            OpenSearchError::Transient(_)
        ));
        assert!(matches!(error_for_status(StatusCode::FORBIDDEN, "x"), OpenSearchError::Authentication(_)));
        assert!(matches!(error_for_status(StatusCode::IM_A_TEAPOT, "x"), OpenSearchError::Api(_)));
    }

    #[test]
    fn test_segment_encodes_reserved_characters() {
        assert_eq!(segment("logs/app"), "logs%2Fapp");
        assert_eq!(segment("plain"), "plain");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let c = Credentials {
            username: "admin".into(),
            password: "secret".into(),
        };
        assert!(!format!("{:?}", c).contains("secret"));
    }
}
