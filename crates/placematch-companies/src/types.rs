//! Companies API response types.
//!
//! Every response is wrapped in a `{"status": "OK", ...}` envelope;
//! [`ApiResponse`] captures that pattern generically.

use serde::Deserialize;

/// Top-level envelope for all companies API responses.
///
/// The `status` field is `"OK"` on success or `"ERROR"` on failure; the
/// remaining fields are flattened from the response body.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(flatten)]
    pub data: T,
}

/// Wrapper for the company search response: `{ "companies": [ ... ] }`.
#[derive(Debug, Deserialize)]
pub struct CompaniesResponse {
    pub companies: Vec<CompanyItem>,
}

/// One company stub as returned by the partner.
///
/// The partner geocodes addresses itself, so `lat`/`lon` are always present
/// while the address parts may not be.
#[derive(Debug, Clone, Deserialize)]
pub struct CompanyItem {
    pub siret: String,
    pub name: String,
    #[serde(default)]
    pub naf: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub distance_km: Option<f64>,
    /// ROME code the partner matched the company against.
    #[serde(default)]
    pub matched_rome: Option<String>,
}
