use crate::error::CallError;
use crate::fetch::{HttpRequest, RetryingHttpClient};
use tracing::{error, info};

/// Creates calls at the provider API using the service-side credential
#[derive(Clone)]
pub struct ProviderClient {
    api_url: String,
    api_key: Option<String>,
    http: RetryingHttpClient,
}

impl ProviderClient {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, http: RetryingHttpClient) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            http,
        }
    }

    /// Read the credential from the named environment variable
    pub fn from_env(api_url: impl Into<String>, api_key_env: &str, http: RetryingHttpClient) -> Self {
        Self::new(api_url, std::env::var(api_key_env).ok(), http)
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// Forward a call configuration to the provider and return its response body
    pub async fn create_call(&self, body: &serde_json::Value) -> Result<serde_json::Value, CallError> {
        let Some(api_key) = &self.api_key else {
            error!("Missing provider API key");
            return Err(CallError::ServerConfig(
                "Missing provider API key".to_string(),
            ));
        };

        info!("Attempting to call provider API at {}", self.api_url);

        let request = HttpRequest::post_json(&self.api_url, body)
            .map_err(|e| CallError::Config(e.to_string()))?
            .header("X-API-Key", api_key.clone());

        let response = self.http.send(&request).await?;
        info!("Provider API response status: {}", response.status);

        response
            .json()
            .map_err(|e| CallError::Network(format!("Invalid provider response: {}", e)))
    }
}
