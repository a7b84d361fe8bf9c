//! Catalog search query: a single SQL pass over optional filters, refined
//! by the shared in-Rust ranking stage.
//!
//! The `WHERE` clause mirrors `CatalogFilters` clause-for-clause. Geo
//! queries are pre-filtered with a coarse bounding box in SQL; exact circle
//! membership, per-mode ordering, and the hard cap happen in
//! `rank_results`, the same code path the in-memory catalog uses.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use placematch_core::establishment::Siret;
use placematch_core::rank::{rank_results, CatalogFilters};
use placematch_core::search::{SearchQuery, SearchResult, SearchableByTarget, SortMode};
use placematch_search::ports::SiretRestrictions;

use super::types::{RestrictionRow, SearchResultRow};
use crate::DbError;

/// Upper bound on candidate rows fetched for geo queries, and the size of
/// the ordered establishment prefix used by the unfiltered short-circuit.
/// A performance guard only; it never changes the semantics of the final
/// top-N for realistic catalogs.
pub const CANDIDATE_BOUND: i64 = 5_000;

/// Filtered, geo-bounded, ranked-and-capped search rows: one per
/// (siret, occupation, location) combination.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails or [`DbError::InvalidRow`]
/// on a malformed stored siret.
pub async fn search_immersion_results(
    pool: &PgPool,
    query: &SearchQuery,
    cap: usize,
    _now: DateTime<Utc>,
) -> Result<Vec<SearchResult>, DbError> {
    let filters = CatalogFilters::from_query(query);
    let bounding = query.geo.map(|geo| geo.bounding_box());

    // With no occupation and no geo filter the joins cannot shrink the
    // establishment set below the cap, so an ordered prefix of the
    // establishments table is enough to produce the exact final top-N.
    let unfiltered =
        filters.rome_code.is_none() && filters.appellation_codes.is_none() && query.geo.is_none();
    let source = match (unfiltered, query.sorted_by) {
        (true, SortMode::Date) => {
            "(SELECT * FROM establishments ORDER BY updated_at DESC LIMIT 5000)"
        }
        (true, SortMode::Score) => "(SELECT * FROM establishments ORDER BY score DESC LIMIT 5000)",
        _ => "establishments",
    };
    // Distance ordering is computed in Rust; recency is a stable SQL base
    // order for it.
    let order = match query.sorted_by {
        SortMode::Date | SortMode::Distance => "e.updated_at DESC",
        SortMode::Score => "e.score DESC",
    };
    let sql_limit: i64 = if query.geo.is_some() {
        CANDIDATE_BOUND
    } else {
        i64::try_from(cap).unwrap_or(i64::MAX)
    };

    let sql = format!(
        "SELECT e.siret, e.name, e.naf_code, e.score, e.fit_for_disabled_workers, \
                e.next_availability_date, e.updated_at, \
                (NOT e.is_max_discussions_reached) AS is_searchable, \
                o.rome_code, o.rome_label, o.appellation_code, o.appellation_label, \
                l.street_number_and_address, l.postcode, l.city, l.department_code, \
                l.lat, l.lon \
         FROM {source} e \
         JOIN immersion_offers o ON o.siret = e.siret \
         JOIN establishment_locations l ON l.siret = e.siret \
         WHERE e.is_open = TRUE \
           AND ($1::TEXT IS NULL OR o.rome_code = $1) \
           AND ($2::TEXT[] IS NULL OR o.appellation_code = ANY($2)) \
           AND ($3::TEXT[] IS NULL OR e.naf_code = ANY($3)) \
           AND ($4::TEXT IS NULL \
                OR ($4 = 'jobSeekers' AND e.searchable_by_job_seekers) \
                OR ($4 = 'students' AND e.searchable_by_students)) \
           AND ($5::BOOLEAN IS NULL OR e.fit_for_disabled_workers = $5) \
           AND ($6::FLOAT8 IS NULL \
                OR (l.lat BETWEEN $6 AND $7 AND l.lon BETWEEN $8 AND $9)) \
         ORDER BY {order} \
         LIMIT $10"
    );

    let rows = sqlx::query_as::<_, SearchResultRow>(&sql)
        .bind(filters.rome_code)
        .bind(filters.appellation_codes)
        .bind(filters.naf_codes)
        .bind(filters.searchable_by.map(|t| t.to_string()))
        .bind(filters.fit_for_disabled_workers)
        .bind(bounding.map(|b| b.min_lat))
        .bind(bounding.map(|b| b.max_lat))
        .bind(bounding.map(|b| b.min_lon))
        .bind(bounding.map(|b| b.max_lon))
        .bind(sql_limit)
        .fetch_all(pool)
        .await?;

    let results = rows
        .into_iter()
        .map(SearchResultRow::into_search_result)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rank_results(
        results,
        query.sorted_by,
        query.geo.as_ref(),
        cap,
    ))
}

/// Source-of-truth restriction flags for an arbitrary siret set.
///
/// Sirets unknown to the catalog come back unrestricted: they are pure
/// prospects the platform holds no flags for.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails or [`DbError::InvalidRow`]
/// on a malformed stored siret.
pub async fn siret_restrictions(
    pool: &PgPool,
    sirets: &[Siret],
    searchable_by: Option<SearchableByTarget>,
    now: DateTime<Utc>,
) -> Result<SiretRestrictions, DbError> {
    let mut restrictions = SiretRestrictions::default();
    if sirets.is_empty() {
        return Ok(restrictions);
    }

    let raw: Vec<String> = sirets.iter().map(|s| s.as_str().to_owned()).collect();
    let rows = sqlx::query_as::<_, RestrictionRow>(
        "SELECT siret, \
            (NOT is_open \
             OR is_max_discussions_reached \
             OR NOT ($2::TEXT IS NULL \
                     OR ($2 = 'jobSeekers' AND searchable_by_job_seekers) \
                     OR ($2 = 'students' AND searchable_by_students))) AS non_searchable, \
            (next_availability_date IS NOT NULL AND next_availability_date > $3) \
                AS not_yet_available \
         FROM establishments \
         WHERE siret = ANY($1)",
    )
    .bind(&raw)
    .bind(searchable_by.map(|t| t.to_string()))
    .bind(now)
    .fetch_all(pool)
    .await?;

    for row in rows {
        let siret = Siret::parse(&row.siret).map_err(|e| DbError::InvalidRow {
            table: "establishments",
            reason: e.to_string(),
        })?;
        if row.non_searchable {
            restrictions.non_searchable.insert(siret.clone());
        }
        if row.not_yet_available {
            restrictions.not_yet_available.insert(siret);
        }
    }
    Ok(restrictions)
}
