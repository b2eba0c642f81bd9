//! HTTP access to the Radiant MLHub API.
//!
//! [`ApiClient`] owns the API token and base URL and attaches the bearer
//! header to every outbound request. GET requests retry on transient
//! failures (connect errors, HTTP 500/502/504): the initial request plus
//! five retries, with delays of 0.0, 0.5, 1.0, 1.5 and 2.0 s.

use std::env;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LOCATION};
use reqwest::{redirect, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.radiant.earth/mlhub/v1";
pub const TOKEN_ENV_VAR: &str = "MLHUB_ACCESS_TOKEN";

/// Retries after the initial request.
const MAX_RETRIES: usize = 5;
const BACKOFF_FACTOR_MS: u64 = 500;

pub struct ApiClient {
    /// Client for API calls; follows redirects.
    http: reqwest::Client,
    /// Client with redirects disabled, used to read Location headers
    /// from asset download links.
    probe: reqwest::Client,
    headers: HeaderMap,
    base_url: String,
}

impl ApiClient {
    pub fn new(api_token: Option<String>) -> Result<Self, Error> {
        Self::with_base_url(api_token, DEFAULT_BASE_URL)
    }

    /// Reads the token from the `MLHUB_ACCESS_TOKEN` environment variable.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(env::var(TOKEN_ENV_VAR).ok())
    }

    pub fn with_base_url(api_token: Option<String>, base_url: &str) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = &api_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        } else {
            warn!("no API token configured; most MLHub endpoints will answer 401");
        }

        let http = reqwest::Client::builder().build()?;
        let probe = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            probe,
            headers,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn collections_url(&self) -> String {
        format!("{}/collections", self.base_url)
    }

    pub fn collection_url(&self, collection_id: &str) -> String {
        format!("{}/collections/{}", self.base_url, collection_id)
    }

    pub fn items_url(&self, collection_id: &str) -> String {
        format!("{}/collections/{}/items", self.base_url, collection_id)
    }

    pub fn item_url(&self, collection_id: &str, item_id: &str) -> String {
        format!(
            "{}/collections/{}/items/{}",
            self.base_url, collection_id, item_id
        )
    }

    /// GET `url` and deserialize the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        let response = self.get_with_retry(url).await?;
        let value = response.json::<T>().await?;
        Ok(value)
    }

    /// GET `url` with the auth headers, retrying transient failures.
    pub async fn get_with_retry(&self, url: &str) -> Result<Response, Error> {
        self.retrying_get(&self.http, url).await
    }

    async fn retrying_get(&self, http: &reqwest::Client, url: &str) -> Result<Response, Error> {
        let mut last_err = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                debug!(url, attempt, ?delay, "retrying request");
                tokio::time::sleep(delay).await;
            }
            match http.get(url).headers(self.headers.clone()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if is_retryable_status(status) {
                        warn!(url, status = status.as_u16(), "server error; will retry");
                        last_err = Some(Error::Status {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                        continue;
                    }
                    return check_status(response, url);
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!(url, error = %e, "transport error; will retry");
                    last_err = Some(Error::Http(e));
                }
                Err(e) => return Err(Error::Http(e)),
            }
        }
        Err(last_err.unwrap_or(Error::RetriesExhausted {
            url: url.to_string(),
            attempts: MAX_RETRIES + 1,
        }))
    }

    /// Client for fetching resolved download URLs. Shares the API client's
    /// connection pool but requests made with it carry no auth headers,
    /// which would break presigned bucket URLs.
    pub fn download_client(&self) -> &reqwest::Client {
        &self.http
    }

    /// Resolves an asset href to its final download URL.
    ///
    /// MLHub asset hrefs point back at the API, which answers with a 302
    /// to the hosted file. Redirects are disabled on the probe client so
    /// the Location header can be read; a direct (non-redirecting) href
    /// is returned unchanged.
    pub async fn resolve_download_url(&self, href: &str) -> Result<String, Error> {
        let response = self.retrying_get(&self.probe, href).await?;
        let status = response.status();
        if status.is_redirection() {
            return response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
                .ok_or_else(|| Error::MissingLocation(href.to_string()));
        }
        let _ = check_status(response, href)?;
        Ok(href.to_string())
    }
}

fn check_status(response: Response, url: &str) -> Result<Response, Error> {
    match response.status() {
        StatusCode::UNAUTHORIZED => Err(Error::Unauthorized),
        StatusCode::NOT_FOUND => Err(Error::NotFound(url.to_string())),
        status if status.is_success() || status.is_redirection() => Ok(response),
        status => Err(Error::Status {
            status: status.as_u16(),
            url: url.to_string(),
        }),
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 500 | 502 | 504)
}

/// Delay before retry number `retry` (1-based): 0.0, 0.5, 1.0, 1.5, 2.0 s.
fn backoff_delay(retry: usize) -> Duration {
    Duration::from_millis(BACKOFF_FACTOR_MS * (retry as u64 - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let delays: Vec<u64> = (1..=MAX_RETRIES)
            .map(|retry| backoff_delay(retry).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![0, 500, 1000, 1500, 2000]);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::OK));
    }

    #[test]
    fn test_endpoint_urls() {
        let client = ApiClient::new(Some("secret".to_string())).unwrap();
        assert_eq!(
            client.collection_url("ref_landcovernet_v1_labels"),
            "https://api.radiant.earth/mlhub/v1/collections/ref_landcovernet_v1_labels"
        );
        assert_eq!(
            client.item_url("c", "i"),
            "https://api.radiant.earth/mlhub/v1/collections/c/items/i"
        );
    }

    /// One-shot HTTP/1.1 responder for exercising the retry loop without
    /// a real server.
    fn canned_server(responses: Vec<String>) -> std::net::SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for response in responses {
                if let Ok((mut stream, _)) = listener.accept() {
                    use std::io::{Read, Write};
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf);
                    let _ = stream.write_all(response.as_bytes());
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_resolve_download_url_retries_server_errors() {
        let addr = canned_server(vec![
            "HTTP/1.1 502 Bad Gateway\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                .to_string(),
            "HTTP/1.1 302 Found\r\n\
             location: https://radiant-mlhub.s3.us-west-2.amazonaws.com/labels.tif\r\n\
             content-length: 0\r\nconnection: close\r\n\r\n"
                .to_string(),
        ]);
        let client = ApiClient::with_base_url(
            Some("secret".to_string()),
            &format!("http://{}", addr),
        )
        .unwrap();
        let url = client
            .resolve_download_url(&format!("http://{}/download/abc123", addr))
            .await
            .unwrap();
        assert_eq!(url, "https://radiant-mlhub.s3.us-west-2.amazonaws.com/labels.tif");
    }

    #[tokio::test]
    async fn test_resolve_download_url_maps_unauthorized() {
        let addr = canned_server(vec![
            "HTTP/1.1 401 Unauthorized\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                .to_string(),
        ]);
        let client = ApiClient::with_base_url(None, &format!("http://{}", addr)).unwrap();
        let err = client
            .resolve_download_url(&format!("http://{}/download/abc123", addr))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client =
            ApiClient::with_base_url(None, "https://api.radiant.earth/mlhub/v1/").unwrap();
        assert_eq!(client.collections_url(), "https://api.radiant.earth/mlhub/v1/collections");
    }
}
