//! HTTP access for test bodies, recording every exchange as a network call.

use reqwest::{Client, RequestBuilder};
use sepcheck_core::{NetworkCall, NetworkRequest, NetworkResponse};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default cap on the bytes read from a response body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// A response, with its body read up to the fetcher's limit.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// HTTP status code
    pub status: u16,

    /// Response headers, names lowercased
    pub headers: BTreeMap<String, String>,

    /// Response body
    pub body: String,

    /// Whether the body was cut off at the limit
    pub truncated: bool,
}

impl Fetched {
    /// Look up a header by lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// HTTP client shared by every test body in a catalog.
#[derive(Clone)]
pub struct Fetcher {
    /// HTTP client
    client: Client,

    /// Bytes read from a body before the rest is dropped
    max_body: usize,
}

impl Fetcher {
    /// Create a fetcher with the default client.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("sepcheck/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client))
    }

    /// Create a fetcher around an existing client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            max_body: MAX_BODY_BYTES,
        }
    }

    /// Set the body size limit.
    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }

    /// Send a GET request.
    pub async fn get(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> (NetworkCall, Result<Fetched, reqwest::Error>) {
        let request = NetworkRequest {
            method: "GET".to_string(),
            url: url.to_string(),
            headers: BTreeMap::new(),
            body: None,
        };
        let builder = self.client.get(url.clone()).timeout(timeout);
        self.exchange(request, builder).await
    }

    /// Send a POST request with a JSON body.
    pub async fn post_json(
        &self,
        url: &Url,
        body: &Value,
        timeout: Duration,
    ) -> (NetworkCall, Result<Fetched, reqwest::Error>) {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let request = NetworkRequest {
            method: "POST".to_string(),
            url: url.to_string(),
            headers,
            body: Some(body.to_string()),
        };
        let builder = self.client.post(url.clone()).json(body).timeout(timeout);
        self.exchange(request, builder).await
    }

    async fn exchange(
        &self,
        request: NetworkRequest,
        builder: RequestBuilder,
    ) -> (NetworkCall, Result<Fetched, reqwest::Error>) {
        debug!("{} {}", request.method, request.url);
        let fetched = read(builder, self.max_body).await;

        let response = match &fetched {
            Ok(fetched) => {
                debug!("{} {} -> {}", request.method, request.url, fetched.status);
                if fetched.truncated {
                    warn!(
                        "{} {} body cut off at {} bytes",
                        request.method, request.url, self.max_body
                    );
                }
                Some(NetworkResponse {
                    status: fetched.status,
                    headers: fetched.headers.clone(),
                    body: Some(fetched.body.clone()),
                })
            }
            Err(error) => {
                debug!("{} {} failed: {}", request.method, request.url, error);
                None
            }
        };

        (NetworkCall { request, response }, fetched)
    }
}

async fn read(builder: RequestBuilder, limit: usize) -> Result<Fetched, reqwest::Error> {
    let mut response = builder.send().await?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_lowercase(), value.to_string()))
        })
        .collect();

    let mut bytes = Vec::new();
    let mut truncated = false;
    while let Some(chunk) = response.chunk().await? {
        let room = limit - bytes.len();
        if chunk.len() > room {
            bytes.extend_from_slice(&chunk[..room]);
            truncated = true;
            break;
        }
        bytes.extend_from_slice(&chunk);
    }
    let body = String::from_utf8_lossy(&bytes).into_owned();

    Ok(Fetched {
        status,
        headers,
        body,
        truncated,
    })
}
