//! Search request normalization and result types.
//!
//! A [`SearchRequest`] is the raw, transport-agnostic input; all validation
//! happens in [`SearchRequest::into_query`], synchronously and before any
//! I/O. The resulting [`SearchQuery`] echoes every filter and carries no
//! derived data — it is also the exact snapshot the search log persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SearchError;
use crate::establishment::Siret;
use crate::geo::{GeoParams, GeoPosition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    Date,
    Distance,
    Score,
}

impl std::fmt::Display for SortMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortMode::Date => write!(f, "date"),
            SortMode::Distance => write!(f, "distance"),
            SortMode::Score => write!(f, "score"),
        }
    }
}

impl std::str::FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" => Ok(SortMode::Date),
            "distance" => Ok(SortMode::Distance),
            "score" => Ok(SortMode::Score),
            other => Err(format!("unknown sort mode '{other}'")),
        }
    }
}

/// Query-side audience filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchableByTarget {
    JobSeekers,
    Students,
}

impl std::fmt::Display for SearchableByTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchableByTarget::JobSeekers => write!(f, "jobSeekers"),
            SearchableByTarget::Students => write!(f, "students"),
        }
    }
}

impl std::str::FromStr for SearchableByTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jobSeekers" => Ok(SearchableByTarget::JobSeekers),
            "students" => Ok(SearchableByTarget::Students),
            other => Err(format!("unknown audience '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street_number_and_address: String,
    pub postcode: String,
    pub city: String,
    pub department_code: String,
}

/// Raw search input. The geo triple is all-or-nothing; see
/// [`SearchRequest::into_query`] for the full validation rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distance_km: Option<f64>,
    pub rome_code: Option<String>,
    pub appellation_codes: Option<Vec<String>>,
    pub naf_codes: Option<Vec<String>>,
    pub sorted_by: SortMode,
    pub voluntary_to_immersion: Option<bool>,
    pub establishment_searchable_by: Option<SearchableByTarget>,
    pub fit_for_disabled_workers: Option<bool>,
    pub acquisition_campaign: Option<String>,
    pub acquisition_keyword: Option<String>,
}

impl Default for SortMode {
    fn default() -> Self {
        SortMode::Date
    }
}

impl SearchRequest {
    /// Normalizes the raw request into a validated [`SearchQuery`].
    ///
    /// Rules:
    /// - latitude, longitude and `distance_km` must be provided together;
    /// - a zero radius means "no distance filtering" and normalizes to no
    ///   geo at all;
    /// - a zero latitude or longitude with a non-zero radius is degenerate;
    /// - distance sorting requires a non-degenerate geo triple;
    /// - an explicitly empty NAF list is rejected (distinct from no filter).
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidGeoParams`] or
    /// [`SearchError::EmptyNafFilter`] accordingly.
    pub fn into_query(self) -> Result<SearchQuery, SearchError> {
        let geo = match (self.latitude, self.longitude, self.distance_km) {
            (None, None, None) => None,
            (Some(lat), Some(lon), Some(distance_km)) => {
                validate_geo_triple(lat, lon, distance_km)?
            }
            _ => {
                return Err(SearchError::InvalidGeoParams(
                    "latitude, longitude and distanceKm must be provided together".to_owned(),
                ))
            }
        };

        if self.sorted_by == SortMode::Distance && geo.is_none() {
            return Err(SearchError::InvalidGeoParams(
                "sorting by distance requires a full, non-degenerate geo triple".to_owned(),
            ));
        }

        if let Some(naf_codes) = &self.naf_codes {
            if naf_codes.is_empty() {
                return Err(SearchError::EmptyNafFilter);
            }
        }

        Ok(SearchQuery {
            geo,
            rome_code: self.rome_code,
            appellation_codes: self.appellation_codes,
            naf_codes: self.naf_codes,
            sorted_by: self.sorted_by,
            voluntary_to_immersion: self.voluntary_to_immersion,
            establishment_searchable_by: self.establishment_searchable_by,
            fit_for_disabled_workers: self.fit_for_disabled_workers,
            acquisition_campaign: self.acquisition_campaign,
            acquisition_keyword: self.acquisition_keyword,
        })
    }
}

fn validate_geo_triple(
    lat: f64,
    lon: f64,
    distance_km: f64,
) -> Result<Option<GeoParams>, SearchError> {
    if !distance_km.is_finite() || distance_km < 0.0 {
        return Err(SearchError::InvalidGeoParams(format!(
            "distanceKm must be a non-negative number, got {distance_km}"
        )));
    }
    if distance_km == 0.0 {
        // Explicit "no distance filtering".
        return Ok(None);
    }
    if lat == 0.0 || lon == 0.0 {
        return Err(SearchError::InvalidGeoParams(
            "a zero latitude or longitude with a non-zero radius is degenerate".to_owned(),
        ));
    }
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(SearchError::InvalidGeoParams(format!(
            "coordinates out of range: ({lat}, {lon})"
        )));
    }
    Ok(Some(GeoParams {
        position: GeoPosition { lat, lon },
        distance_km,
    }))
}

/// Validated, normalized search — the "search made" record. Echoes all
/// filters, carries no derived data; persisted as-is by the search log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub geo: Option<GeoParams>,
    pub rome_code: Option<String>,
    pub appellation_codes: Option<Vec<String>>,
    pub naf_codes: Option<Vec<String>>,
    pub sorted_by: SortMode,
    pub voluntary_to_immersion: Option<bool>,
    pub establishment_searchable_by: Option<SearchableByTarget>,
    pub fit_for_disabled_workers: Option<bool>,
    pub acquisition_campaign: Option<String>,
    pub acquisition_keyword: Option<String>,
}

/// One (establishment, occupation, location) triple in a search response.
///
/// An establishment can yield several results: one per occupation per
/// location. Externally sourced results have no appellation, address
/// details beyond what the API returned, and unknown audience/fitness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub siret: Siret,
    pub name: String,
    pub naf: Option<String>,
    /// True for catalog results, false for externally sourced prospects.
    pub voluntary_to_immersion: bool,
    pub rome_code: String,
    pub rome_label: String,
    pub appellation_code: Option<String>,
    pub appellation_label: Option<String>,
    pub score: f64,
    pub address: Option<Address>,
    pub position: Option<GeoPosition>,
    /// Geodesic distance from the query center, when the query had one.
    pub distance_m: Option<f64>,
    pub is_searchable: bool,
    pub fit_for_disabled_workers: Option<bool>,
    pub next_availability_date: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Company stub returned by the external nearby-companies API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCompany {
    pub siret: Siret,
    pub name: String,
    pub naf: Option<String>,
    pub address: Option<Address>,
    pub position: GeoPosition,
    pub distance_m: Option<f64>,
}

/// Append-only analytics record: one per search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchLogEntry {
    pub id: Uuid,
    pub query: SearchQuery,
    pub result_count: i64,
    pub made_at: DateTime<Utc>,
}
