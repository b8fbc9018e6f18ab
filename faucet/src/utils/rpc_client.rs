use anyhow::Error;
use http::{HeaderMap, HeaderValue};
use jsonrpsee::{
    core::client::{ClientT, Error as JsonRpcError},
    http_client::{HttpClient, HttpClientBuilder},
};
use serde_json::Value;
use std::time::Duration;

pub struct JSONRPCClient {
    url: String,
    client: HttpClient,
}

impl JSONRPCClient {
    pub fn new_with_timeout(url: &str, timeout: Duration) -> Result<Self, Error> {
        Self::new_with_timeout_and_api_key(url, timeout, None)
    }

    /// Creates a client that authenticates with a bearer API key on every request.
    pub fn new_with_timeout_and_api_key(
        url: &str,
        timeout: Duration,
        api_key: Option<&str>,
    ) -> Result<Self, Error> {
        if url.is_empty() {
            return Err(anyhow::anyhow!("URL is empty"));
        }

        let mut headers = HeaderMap::new();
        if let Some(api_key) = api_key {
            headers.insert(
                "authorization",
                HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| {
                    anyhow::anyhow!("Failed to create header value from api key: {e}")
                })?,
            );
        }

        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .set_headers(headers)
            .build(url)
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    pub async fn call_method(&self, method: &str, params: Vec<Value>) -> Result<Value, Error> {
        match self.client.request(method, params).await {
            Ok(result) => Ok(result),
            Err(JsonRpcError::Transport(err)) => {
                Err(anyhow::anyhow!("Http transport error calling {}: {err}.", self.url))
            }
            Err(JsonRpcError::Call(err)) => Err(anyhow::anyhow!(
                "{method} failed with code {}: {}",
                err.code(),
                err.message()
            )),
            Err(err) => Err(Error::from(err)),
        }
    }
}
