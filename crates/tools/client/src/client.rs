//! photomesh server HTTP client implementation

use crate::types::{ClientError, GeneratedModel, Result};
use photomesh::{GenerateRequest, GenerateResponse, HealthStatus};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

/// Default timeout for health check requests (5 seconds)
const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for generation requests (2 minutes)
const DEFAULT_GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Default number of retry attempts for transient failures
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second)
const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// photomesh server HTTP client
///
/// Sends single images to a photomesh server and returns the decoded mesh.
/// Connection failures, 5xx responses and not-ready answers are retried with
/// exponential backoff; validation rejections and generation failures are not.
///
/// # Example
///
/// ```no_run
/// use photomesh::GenerateRequest;
/// use photomesh_client::PhotomeshClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = PhotomeshClient::new("http://localhost:8000");
///
///     let status = client.health_check().await?;
///     if !status.is_ready() {
///         println!("Server still loading {}", status.model_id);
///         return Ok(());
///     }
///
///     let request = GenerateRequest::new("...").with_mc_resolution(256);
///     let model = client.generate(&request).await?;
///     println!("GLB: {} bytes", model.glb_len());
///
///     Ok(())
/// }
/// ```
pub struct PhotomeshClient {
    client: Client,
    base_url: String,
    health_timeout: Duration,
    generate_timeout: Duration,
    max_retries: u32,
    base_delay_ms: u64,
}

impl PhotomeshClient {
    /// Create a new client for the given server URL (e.g. `http://localhost:8000`)
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: server_url.into().trim_end_matches('/').to_string(),
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            generate_timeout: DEFAULT_GENERATE_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }

    /// Set the timeout for health check requests
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Set the timeout for generation requests
    pub fn with_generate_timeout(mut self, timeout: Duration) -> Self {
        self.generate_timeout = timeout;
        self
    }

    /// Set the maximum number of retry attempts for transient failures
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay for exponential backoff (in milliseconds)
    pub fn with_base_delay_ms(mut self, delay_ms: u64) -> Self {
        self.base_delay_ms = delay_ms;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query `GET /api/health`
    pub async fn health_check(&self) -> Result<HealthStatus> {
        let url = format!("{}/api/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e, self.health_timeout))?;

        if !response.status().is_success() {
            return Err(ClientError::ServerError(format!(
                "Health check failed with status: {}",
                response.status()
            )));
        }

        response
            .json::<HealthStatus>()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse health response: {e}")))
    }

    /// Generate a mesh from a single image
    ///
    /// # Errors
    ///
    /// - `ClientError::Rejected` - the server refused the request (422/413)
    /// - `ClientError::ModelNotReady` - still loading after every retry
    /// - `ClientError::GenerationFailed` - the pipeline answered `success=false`
    /// - `ClientError::InvalidGlb` - the returned GLB is too small to be a mesh
    /// - `ClientError::ConnectionError` / `TimeoutError` / `ServerError`
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedModel> {
        let mut attempt = 0;
        loop {
            match self.generate_once(request).await {
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    let delay = self.calculate_backoff_delay(attempt);
                    tracing::warn!("Generation attempt {} failed ({e}), retrying in {:?}", attempt + 1, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(ClientError::ConnectionError(_)) => {
                    return Err(ClientError::ConnectionError(format!(
                        "Failed to connect to {} after {} attempts",
                        self.base_url,
                        attempt + 1
                    )));
                }
                result => return result,
            }
        }
    }

    async fn generate_once(&self, request: &GenerateRequest) -> Result<GeneratedModel> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .timeout(self.generate_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e, self.generate_timeout))?;

        let status = response.status();
        if status.is_server_error() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Server error".to_string());
            return Err(ClientError::ServerError(format!("{status}: {text}")));
        }
        if status.is_client_error() {
            return Err(rejection(status, response).await);
        }

        let body = response.json::<GenerateResponse>().await.map_err(|e| {
            ClientError::ParseError(format!("Failed to parse generation response: {e}"))
        })?;
        GeneratedModel::from_response(body)
    }

    fn map_send_error(&self, e: reqwest::Error, timeout: Duration) -> ClientError {
        if e.is_timeout() {
            ClientError::TimeoutError(timeout.as_secs())
        } else if e.is_connect() {
            ClientError::ConnectionError(format!("Failed to connect to {}", self.base_url))
        } else {
            ClientError::RequestFailed(e)
        }
    }

    /// Calculate exponential backoff delay for retry attempts
    fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.base_delay_ms * 2u64.pow(attempt);
        Duration::from_millis(delay_ms)
    }
}

impl Default for PhotomeshClient {
    /// Create a client with default localhost URL
    fn default() -> Self {
        Self::new("http://localhost:8000")
    }
}

fn is_transient(error: &ClientError) -> bool {
    matches!(
        error,
        ClientError::ConnectionError(_) | ClientError::ServerError(_) | ClientError::ModelNotReady
    )
}

/// Build a rejection from a 4xx body, preferring its `detail` field
async fn rejection(status: StatusCode, response: Response) -> ClientError {
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Bad request".to_string());
    let detail = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|body| body.get("detail").and_then(|d| d.as_str()).map(str::to_owned))
        .unwrap_or(text);
    ClientError::Rejected {
        status: status.as_u16(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = PhotomeshClient::new("http://localhost:8000");
        assert_eq!(client.base_url, "http://localhost:8000");
        assert_eq!(client.health_timeout, DEFAULT_HEALTH_TIMEOUT);
        assert_eq!(client.generate_timeout, DEFAULT_GENERATE_TIMEOUT);
        assert_eq!(client.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_client_with_trailing_slash() {
        let client = PhotomeshClient::new("http://localhost:8000/");
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_client_configuration() {
        let client = PhotomeshClient::default()
            .with_health_timeout(Duration::from_secs(10))
            .with_generate_timeout(Duration::from_secs(300))
            .with_max_retries(5)
            .with_base_delay_ms(250);

        assert_eq!(client.health_timeout, Duration::from_secs(10));
        assert_eq!(client.generate_timeout, Duration::from_secs(300));
        assert_eq!(client.max_retries, 5);
        assert_eq!(client.base_delay_ms, 250);
    }

    #[test]
    fn test_backoff_delay_calculation() {
        let client = PhotomeshClient::default();
        assert_eq!(client.calculate_backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(client.calculate_backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(client.calculate_backoff_delay(3), Duration::from_millis(8000));
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&ClientError::ServerError("500".into())));
        assert!(is_transient(&ClientError::ModelNotReady));
        assert!(!is_transient(&ClientError::InvalidGlb(10)));
        assert!(!is_transient(&ClientError::Rejected {
            status: 422,
            detail: "bad".into()
        }));
    }
}
