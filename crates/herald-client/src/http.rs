use std::time::Duration;

use herald_core::error::AppError;
use herald_core::traits::HttpClient;
use reqwest::{Client, Response};
use url::Url;

/// HTTP client for image downloads and stock-photo search APIs.
///
/// Non-2xx responses become [`AppError::HttpError`] carrying the status, so
/// 429/5xx are retried by the caller's policy and 4xx are not.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(60))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36")
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    async fn send(&self, url: &str, headers: &[(&str, &str)]) -> Result<Response, AppError> {
        validate_scheme(url)?;

        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }
        Ok(response)
    }
}

impl HttpClient for ReqwestHttpClient {
    async fn get_bytes(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<u8>, AppError> {
        let response = self.send(url, headers).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to read response body: {e}")))?;
        tracing::debug!(%url, size = bytes.len(), "Downloaded");
        Ok(bytes.to_vec())
    }

    async fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<serde_json::Value, AppError> {
        let response = self.send(url, headers).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to read response body: {e}")))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Only `http` and `https` URLs are fetched.
fn validate_scheme(url: &str) -> Result<(), AppError> {
    let parsed = Url::parse(url).map_err(|e| AppError::HttpError(format!("Invalid URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(AppError::HttpError(format!(
            "URL scheme '{scheme}' is not allowed (only http/https)"
        ))),
    }
}
