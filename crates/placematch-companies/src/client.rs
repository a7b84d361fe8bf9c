//! HTTP client for the companies API.
//!
//! Wraps `reqwest` with API-key management, typed response deserialization,
//! and envelope status checking. Every endpoint checks the `"status"` field
//! and surfaces API-level failures as [`CompaniesError::Api`].

use std::time::Duration;

use reqwest::{Client, Url};

use crate::error::CompaniesError;
use crate::types::{ApiResponse, CompaniesResponse, CompanyItem};

const DEFAULT_BASE_URL: &str = "https://api.companies-match.example/";

/// Client for the companies REST API.
///
/// Use [`CompaniesClient::new`] for production or
/// [`CompaniesClient::with_base_url`] to point at a mock server in tests.
pub struct CompaniesClient {
    client: Client,
    api_key: String,
    endpoint: Url,
}

impl CompaniesClient {
    /// Creates a client pointed at the production API.
    ///
    /// # Errors
    ///
    /// Returns [`CompaniesError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(api_key: &str, timeout_secs: u64) -> Result<Self, CompaniesError> {
        Self::with_base_url(api_key, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`CompaniesError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`CompaniesError::Api`] if `base_url` is
    /// not a valid URL.
    pub fn with_base_url(
        api_key: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, CompaniesError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("placematch/0.1 (immersion-search)")
            .build()?;

        // Normalise the trailing slash so join() appends the endpoint path
        // instead of replacing the last segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let endpoint = Url::parse(&normalised)
            .and_then(|base| base.join("v1/companies"))
            .map_err(|e| CompaniesError::Api(format!("invalid base URL '{base_url}': {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            endpoint,
        })
    }

    /// Searches companies hiring for `rome_code` within `radius_km` of the
    /// given point.
    ///
    /// # Errors
    ///
    /// - [`CompaniesError::Api`] if the API returns an error status.
    /// - [`CompaniesError::Http`] on network failure or non-2xx HTTP status.
    /// - [`CompaniesError::Deserialize`] if the response does not match the
    ///   expected shape.
    pub async fn search_companies(
        &self,
        rome_code: &str,
        lat: f64,
        lon: f64,
        radius_km: f64,
    ) -> Result<Vec<CompanyItem>, CompaniesError> {
        let url = self.build_url(&[
            ("rome", rome_code),
            ("lat", &lat.to_string()),
            ("lon", &lon.to_string()),
            ("radius_km", &radius_km.to_string()),
        ]);
        let body = self.request_json(&url).await?;
        Self::check_api_error(&body)?;

        let envelope: ApiResponse<CompaniesResponse> =
            serde_json::from_value(body).map_err(|e| CompaniesError::Deserialize {
                context: format!("search_companies(rome={rome_code})"),
                source: e,
            })?;

        Ok(envelope.data.companies)
    }

    /// Builds the request URL with percent-encoded query parameters.
    fn build_url(&self, extra: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("key", &self.api_key);
            for (k, v) in extra {
                pairs.append_pair(k, v);
            }
        }
        url
    }

    /// Sends a GET request, asserts a 2xx status, and parses the body as
    /// JSON.
    async fn request_json(&self, url: &Url) -> Result<serde_json::Value, CompaniesError> {
        let response = self.client.get(url.clone()).send().await?;
        let response = response.error_for_status()?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| CompaniesError::Deserialize {
            context: url.to_string(),
            source: e,
        })
    }

    /// Checks the top-level `"status"` field and returns an error if it
    /// indicates failure.
    fn check_api_error(body: &serde_json::Value) -> Result<(), CompaniesError> {
        if body.get("status").and_then(serde_json::Value::as_str) == Some("ERROR") {
            let message = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown error")
                .to_owned();
            return Err(CompaniesError::Api(message));
        }
        Ok(())
    }
}
