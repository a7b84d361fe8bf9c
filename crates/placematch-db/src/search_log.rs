//! Append-only search log over the `searches_made` table.
//!
//! Rows are never mutated or deleted by this subsystem; the read-back
//! exists for analytics and replay.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use placematch_core::geo::{GeoParams, GeoPosition};
use placematch_core::search::{SearchLogEntry, SearchQuery};

use crate::DbError;

/// Append one log row and return its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn append_search_log(
    pool: &PgPool,
    query: &SearchQuery,
    result_count: u32,
    made_at: DateTime<Utc>,
) -> Result<Uuid, DbError> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO searches_made \
             (id, rome_code, appellation_codes, lat, lon, distance_km, naf_codes, sorted_by, \
              voluntary_to_immersion, searchable_by, fit_for_disabled_workers, \
              acquisition_campaign, acquisition_keyword, result_count, made_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(id)
    .bind(&query.rome_code)
    .bind(&query.appellation_codes)
    .bind(query.geo.map(|g| g.position.lat))
    .bind(query.geo.map(|g| g.position.lon))
    .bind(query.geo.map(|g| g.distance_km))
    .bind(&query.naf_codes)
    .bind(query.sorted_by.to_string())
    .bind(query.voluntary_to_immersion)
    .bind(query.establishment_searchable_by.map(|t| t.to_string()))
    .bind(query.fit_for_disabled_workers)
    .bind(&query.acquisition_campaign)
    .bind(&query.acquisition_keyword)
    .bind(i64::from(result_count))
    .bind(made_at)
    .execute(pool)
    .await?;
    Ok(id)
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SearchLogRow {
    id: Uuid,
    rome_code: Option<String>,
    appellation_codes: Option<Vec<String>>,
    lat: Option<f64>,
    lon: Option<f64>,
    distance_km: Option<f64>,
    naf_codes: Option<Vec<String>>,
    sorted_by: String,
    voluntary_to_immersion: Option<bool>,
    searchable_by: Option<String>,
    fit_for_disabled_workers: Option<bool>,
    acquisition_campaign: Option<String>,
    acquisition_keyword: Option<String>,
    result_count: i64,
    made_at: DateTime<Utc>,
}

impl SearchLogRow {
    fn into_entry(self) -> Result<SearchLogEntry, DbError> {
        let invalid = |reason: String| DbError::InvalidRow {
            table: "searches_made",
            reason,
        };
        let geo = match (self.lat, self.lon, self.distance_km) {
            (Some(lat), Some(lon), Some(distance_km)) => Some(GeoParams {
                position: GeoPosition { lat, lon },
                distance_km,
            }),
            _ => None,
        };
        let sorted_by = self.sorted_by.parse().map_err(invalid)?;
        let establishment_searchable_by = self
            .searchable_by
            .map(|raw| raw.parse().map_err(invalid))
            .transpose()?;
        Ok(SearchLogEntry {
            id: self.id,
            query: SearchQuery {
                geo,
                rome_code: self.rome_code,
                appellation_codes: self.appellation_codes,
                naf_codes: self.naf_codes,
                sorted_by,
                voluntary_to_immersion: self.voluntary_to_immersion,
                establishment_searchable_by,
                fit_for_disabled_workers: self.fit_for_disabled_workers,
                acquisition_campaign: self.acquisition_campaign,
                acquisition_keyword: self.acquisition_keyword,
            },
            result_count: self.result_count,
            made_at: self.made_at,
        })
    }
}

/// Log entries made at or after `since`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::InvalidRow`]
/// if a stored enum value no longer parses.
pub async fn list_search_log_since(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<SearchLogEntry>, DbError> {
    let rows = sqlx::query_as::<_, SearchLogRow>(
        "SELECT id, rome_code, appellation_codes, lat, lon, distance_km, naf_codes, sorted_by, \
                voluntary_to_immersion, searchable_by, fit_for_disabled_workers, \
                acquisition_campaign, acquisition_keyword, result_count, made_at \
         FROM searches_made \
         WHERE made_at >= $1 \
         ORDER BY made_at ASC",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(SearchLogRow::into_entry).collect()
}
