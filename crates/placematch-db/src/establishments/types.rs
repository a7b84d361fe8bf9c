//! Row types for the catalog search queries.

use chrono::{DateTime, Utc};

use placematch_core::establishment::Siret;
use placematch_core::geo::GeoPosition;
use placematch_core::search::{Address, SearchResult};

use crate::DbError;

/// One (siret, occupation, location) row from the catalog search query.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SearchResultRow {
    pub siret: String,
    pub name: String,
    pub naf_code: String,
    pub score: f64,
    pub fit_for_disabled_workers: Option<bool>,
    pub next_availability_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub is_searchable: bool,
    pub rome_code: String,
    pub rome_label: String,
    pub appellation_code: String,
    pub appellation_label: String,
    pub street_number_and_address: String,
    pub postcode: String,
    pub city: String,
    pub department_code: String,
    pub lat: f64,
    pub lon: f64,
}

impl SearchResultRow {
    /// Converts the flat row into a domain result. The distance annotation
    /// is left empty; the ranking stage fills it for geo queries.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidRow`] if the stored siret is malformed.
    pub fn into_search_result(self) -> Result<SearchResult, DbError> {
        let siret = Siret::parse(&self.siret).map_err(|e| DbError::InvalidRow {
            table: "establishments",
            reason: e.to_string(),
        })?;
        Ok(SearchResult {
            siret,
            name: self.name,
            naf: Some(self.naf_code),
            voluntary_to_immersion: true,
            rome_code: self.rome_code,
            rome_label: self.rome_label,
            appellation_code: Some(self.appellation_code),
            appellation_label: Some(self.appellation_label),
            score: self.score,
            address: Some(Address {
                street_number_and_address: self.street_number_and_address,
                postcode: self.postcode,
                city: self.city,
                department_code: self.department_code,
            }),
            position: Some(GeoPosition {
                lat: self.lat,
                lon: self.lon,
            }),
            distance_m: None,
            is_searchable: self.is_searchable,
            fit_for_disabled_workers: self.fit_for_disabled_workers,
            next_availability_date: self.next_availability_date,
            updated_at: Some(self.updated_at),
        })
    }
}

/// Per-siret restriction flags for the merged-set filter.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RestrictionRow {
    pub siret: String,
    pub non_searchable: bool,
    pub not_yet_available: bool,
}
