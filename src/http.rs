//! HTTP seam for the token endpoints.
//!
//! The service talks to the wire through the [`HttpClient`] trait so tests
//! can substitute a canned transport; [`ReqwestHttpClient`] is the default
//! implementation.

use std::collections::HashMap;
use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Path of the login endpoint, relative to the site root.
pub const LOGIN_PATH: &str = "sn-token/login";
/// Path of the refresh endpoint.
pub const REFRESH_PATH: &str = "sn-token/refresh";
/// Path of the logout endpoint.
pub const LOGOUT_PATH: &str = "sn-token/logout";

const AUTHENTICATION_TYPE_HEADER: &str = "X-Authentication-Type";
const REFRESH_DATA_HEADER: &str = "X-Refresh-Data";

/// Body of a successful login or refresh response: the two encoded token
/// strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Encoded access token
    pub access: String,
    /// Encoded refresh token
    pub refresh: String,
}

/// Simple HTTP response structure for standardized response handling.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

impl HttpResponse {
    /// Check if the response is successful (status code 200-299)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the response body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// HTTP client trait for abstracting the token endpoint requests.
#[async_trait]
pub trait HttpClient: Send + Sync + Debug {
    /// Send an HTTP request with the specified method, URL, headers, and body
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: Option<HashMap<String, String>>,
        body: Option<String>,
    ) -> Result<HttpResponse>;

    /// Send a POST request
    async fn post(
        &self,
        url: &str,
        headers: Option<HashMap<String, String>>,
        body: Option<String>,
    ) -> Result<HttpResponse> {
        self.request("POST", url, headers, body).await
    }
}

/// Implementation of HttpClient using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a new ReqwestHttpClient with a 30 second request timeout.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: Option<HashMap<String, String>>,
        body: Option<String>,
    ) -> Result<HttpResponse> {
        let method = Method::from_str(method.to_uppercase().as_str())?;
        let mut request_builder = self.client.request(method, url);

        if let Some(headers) = headers {
            let mut header_map = HeaderMap::new();
            for (key, value) in headers {
                let header_name = HeaderName::from_str(&key)?;
                let header_value = HeaderValue::from_str(&value)?;
                header_map.insert(header_name, header_value);
            }
            request_builder = request_builder.headers(header_map);
        }

        if let Some(body) = body {
            request_builder = request_builder.body(body);
        }

        let response = request_builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse { status, body })
    }
}

/// Mock HTTP client for testing: canned responses keyed by URL, plus a log
/// of every request seen. Requests to URLs without a canned response fail,
/// which doubles as transport-failure injection.
#[derive(Debug, Clone, Default)]
pub struct MockHttpClient {
    responses: std::sync::Arc<std::sync::Mutex<HashMap<String, HttpResponse>>>,
    requests: std::sync::Arc<std::sync::Mutex<Vec<RecordedRequest>>>,
}

/// One request observed by [`MockHttpClient`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl MockHttpClient {
    /// Create a new MockHttpClient
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mock response for a URL
    pub fn add_response(&self, url: &str, status: u16, body: &str) {
        self.responses.lock().unwrap().insert(
            url.to_string(),
            HttpResponse {
                status,
                body: body.to_string(),
            },
        );
    }

    /// Add a mock JSON response for a URL
    pub fn add_json_response<T: Serialize>(&self, url: &str, status: u16, data: &T) {
        let body = serde_json::to_string(data).expect("mock body must serialize");
        self.add_response(url, status, &body);
    }

    /// All requests seen so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// How many requests hit the given URL
    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: Option<HashMap<String, String>>,
        body: Option<String>,
    ) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.to_string(),
            url: url.to_string(),
            headers: headers.unwrap_or_default(),
            body,
        });
        match self.responses.lock().unwrap().get(url) {
            Some(response) => Ok(response.clone()),
            None => Err(anyhow::anyhow!("no mock response registered for {}", url)),
        }
    }
}

/// Join a site root and an endpoint path.
pub fn endpoint_url(site: &str, path: &str) -> String {
    format!("{}/{}", site.trim_end_matches('/'), path)
}

/// Headers for the login request: Basic credentials plus the token
/// authentication marker. The credential pair is encoded, never logged.
pub fn login_headers(username: &str, password: &str) -> HashMap<String, String> {
    let basic = STANDARD.encode(format!("{}:{}", username, password));
    let mut headers = token_type_headers();
    headers.insert("Authorization".to_string(), format!("Basic {}", basic));
    headers.insert("Cache-Control".to_string(), "no-cache".to_string());
    headers
}

/// Headers for the refresh request, carrying the refresh token.
pub fn refresh_headers(refresh_token: &str) -> HashMap<String, String> {
    let mut headers = token_type_headers();
    headers.insert(REFRESH_DATA_HEADER.to_string(), refresh_token.to_string());
    headers
}

/// The bare token-authentication marker, used alone by the logout request.
pub fn token_type_headers() -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert(
        AUTHENTICATION_TYPE_HEADER.to_string(),
        "Token".to_string(),
    );
    headers
}
