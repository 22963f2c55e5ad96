use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::{error, trace};

const JSON: &str = "application/json";

/// A response whose body was decoded as JSON when the server said it was JSON.
#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `None` for non-JSON content types and for bodies that fail to parse.
    pub json: Option<Value>,
}

/// HTTP client that attaches the same Basic credentials to every request.
///
/// Error statuses are logged and handed back like any other response;
/// only connection-level failures become `Err`.
#[derive(Clone)]
pub struct RemoteClient {
    http: Client,
    authorization: String,
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient").finish_non_exhaustive()
    }
}

impl RemoteClient {
    pub fn new(username: &str, password: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            authorization: basic_authorization(username, password),
        })
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<JsonResponse, reqwest::Error> {
        trace!(%method, %url, ?query, body = ?body, "sending request");

        let mut builder = self
            .http
            .request(method.clone(), url)
            .header(AUTHORIZATION, &self.authorization);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let is_json = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|t| t.starts_with(JSON));
        let bytes = response.bytes().await?;
        let json = if is_json {
            serde_json::from_slice(&bytes).ok()
        } else {
            None
        };

        if status.as_u16() >= 400 {
            error!(%method, %url, status = status.as_u16(), "request failed");
        }
        trace!(status = status.as_u16(), body = ?json, "received response");

        Ok(JsonResponse {
            status,
            headers,
            json,
        })
    }
}

/// `Basic base64(username:password)`.
pub fn basic_authorization(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_authorization() {
        assert_eq!(basic_authorization("ci", "secret"), "Basic Y2k6c2VjcmV0");
        assert_eq!(basic_authorization("", ""), "Basic Og==");
    }

    #[test]
    fn test_debug_hides_credentials() {
        let client = RemoteClient::new("ci", "secret", Duration::from_secs(1)).unwrap();
        assert!(!format!("{client:?}").contains("Y2k6c2VjcmV0"));
    }
}
