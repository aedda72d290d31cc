//! `reqwest` transport for the posts API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use strata_cache::Transport;
use strata_core::{HttpMethod, RequestDescriptor, TransportError};

use crate::config::ClientConfig;
use crate::error::PostsError;

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, PostsError> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn network_error(err: reqwest::Error) -> TransportError {
    TransportError::Network {
        reason: err.to_string(),
    }
}

/// Decode a response body. Empty bodies and 204s decode to `null`.
pub fn decode_body(status: StatusCode, text: &str) -> Result<Value, TransportError> {
    if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| TransportError::Decode {
        reason: e.to_string(),
    })
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: RequestDescriptor) -> Result<Value, TransportError> {
        let url = self.url(&request.path);
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Put => self.client.put(&url),
            HttpMethod::Patch => self.client.patch(&url),
            HttpMethod::Delete => self.client.delete(&url),
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        let text = response.text().await.map_err(network_error)?;
        tracing::debug!(method = %request.method, url = %url, status = status.as_u16(), "HTTP response");

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        decode_body(status, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(StatusCode::OK, "[1,2]"), Ok(json!([1, 2])));
        assert_eq!(decode_body(StatusCode::NO_CONTENT, ""), Ok(Value::Null));
        assert_eq!(decode_body(StatusCode::OK, "  "), Ok(Value::Null));
        assert!(matches!(
            decode_body(StatusCode::OK, "<html>"),
            Err(TransportError::Decode { .. })
        ));
    }
}
