//! Aiven REST API client
//!
//! Thin wrapper around `reqwest` that authenticates with an Aiven token and
//! turns non-2xx responses into [`ApiError`]s.

use std::borrow::Cow;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::errors::{AivenError, ApiError, Result};

pub const AIVEN_API_BASE: &str = "https://api.aiven.io/v1";

/// Characters left as-is in a path segment: RFC 3986 unreserved plus the
/// sub-delimiters allowed inside a segment. `/ ; , ?` are escaped.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=')
    .remove(b'@');

/// Environment variable holding the API token
pub const TOKEN_ENV: &str = "AIVEN_TOKEN";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    more_info: Option<String>,
}

/// Aiven API client
#[derive(Debug, Clone)]
pub struct AivenClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl AivenClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(AivenError::Config(format!(
                "an API token is required; set {} or pass --token",
                TOKEN_ENV
            )));
        }

        let http = reqwest::Client::builder()
            .user_agent(format!("aivenctl/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: AIVEN_API_BASE.to_string(),
            token,
        })
    }

    /// Create a client from the `AIVEN_TOKEN` environment variable
    pub fn from_env() -> Result<Self> {
        let token = std::env::var(TOKEN_ENV)
            .map_err(|_| AivenError::Config(format!("{} is not set", TOKEN_ENV)))?;
        Self::new(token)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str) -> Result<JsonValue> {
        self.send(self.request(Method::GET, path)).await
    }

    pub async fn get_with_query(&self, path: &str, query: &[(&str, &str)]) -> Result<JsonValue> {
        self.send(self.request(Method::GET, path).query(query)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<JsonValue> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<JsonValue> {
        self.send(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("{} {}", method, url);
        self.http
            .request(method, url)
            .header("Authorization", format!("aivenv1 {}", self.token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<JsonValue> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let parsed = serde_json::from_str::<ErrorBody>(&body).ok();
            let (message, more_info) = match parsed {
                Some(ErrorBody {
                    message: Some(message),
                    more_info,
                }) => (message, more_info),
                _ => (body, None),
            };
            log::debug!("API error {}: {}", status.as_u16(), message);
            return Err(ApiError {
                status: status.as_u16(),
                message,
                more_info,
            }
            .into());
        }

        if body.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

/// Escape a value used as a URL path segment
pub fn escape(segment: &str) -> Cow<'_, str> {
    utf8_percent_encode(segment, PATH_SEGMENT).into()
}

/// Pull a field out of a response envelope such as `{"service": {...}}`
pub fn take_field(mut body: JsonValue, field: &str) -> Result<JsonValue> {
    body.get_mut(field)
        .map(JsonValue::take)
        .ok_or_else(|| AivenError::Other(format!("response has no '{}' field", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn empty_token_is_a_config_error() {
        let err = AivenClient::new("  ").unwrap_err();
        assert!(matches!(err, AivenError::Config(_)));
    }

    #[tokio::test]
    async fn sends_token_header() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/project/acme"))
            .and(header("Authorization", "aivenv1 secret"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"project": {"project_name": "acme"}})),
            )
            .mount(&mock_server)
            .await;

        let client = AivenClient::new("secret")
            .unwrap()
            .with_base_url(mock_server.uri());
        let body = client.get("/project/acme").await.unwrap();
        let project = take_field(body, "project").unwrap();
        assert_eq!(project["project_name"], "acme");
    }

    #[tokio::test]
    async fn error_body_becomes_api_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/project/acme/vpcs/1234"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "message": "VPC has active peering connections",
                "more_info": "https://api.aiven.io/doc/"
            })))
            .mount(&mock_server)
            .await;

        let client = AivenClient::new("t").unwrap().with_base_url(mock_server.uri());
        let err = client.delete("/project/acme/vpcs/1234").await.unwrap_err();
        match err {
            AivenError::Api(e) => {
                assert_eq!(e.status, 409);
                assert_eq!(e.message, "VPC has active peering connections");
                assert_eq!(e.more_info.as_deref(), Some("https://api.aiven.io/doc/"));
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[test]
    fn escape_path_segments() {
        assert_eq!(escape("my project"), "my%20project");
        assert_eq!(escape("a/b"), "a%2Fb");
        assert_eq!(escape("user@example.com"), "user@example.com");
        assert_eq!(escape("k=v;x,y?z#"), "k=v%3Bx%2Cy%3Fz%23");
        assert_eq!(escape("100%"), "100%25");
    }
}
