//! The search orchestrator.
//!
//! Request-scoped and stateless: validate, fan out to the catalog and the
//! external gateway concurrently, log the search, then dedup, filter, score,
//! and sort the merged set. External failures degrade to zero results; the
//! catalog is authoritative and its failures are fatal.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use placematch_core::establishment::Siret;
use placematch_core::geo::GeoPosition;
use placematch_core::occupations::OccupationDirectory;
use placematch_core::rank;
use placematch_core::search::{
    ExternalCompany, SearchQuery, SearchRequest, SearchResult, SortMode,
};
use placematch_core::SearchError;

use crate::ports::{
    DeletedEstablishments, EstablishmentCatalog, ExternalOfferGateway, ScoreEnricher,
    SearchLogStore,
};

/// Hard cap on internal catalog results per search.
pub const INTERNAL_RESULT_CAP: usize = 100;

const DEFAULT_EXTERNAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolved parameters for the external branch of a search.
struct ExternalParams {
    rome_code: String,
    rome_label: String,
    center: GeoPosition,
    radius_km: f64,
}

pub struct SearchEngine {
    catalog: Arc<dyn EstablishmentCatalog>,
    gateway: Arc<dyn ExternalOfferGateway>,
    search_log: Arc<dyn SearchLogStore>,
    deleted: Arc<dyn DeletedEstablishments>,
    enricher: Arc<dyn ScoreEnricher>,
    occupations: Arc<OccupationDirectory>,
    external_timeout: Duration,
}

impl SearchEngine {
    pub fn new(
        catalog: Arc<dyn EstablishmentCatalog>,
        gateway: Arc<dyn ExternalOfferGateway>,
        search_log: Arc<dyn SearchLogStore>,
        deleted: Arc<dyn DeletedEstablishments>,
        enricher: Arc<dyn ScoreEnricher>,
        occupations: Arc<OccupationDirectory>,
    ) -> Self {
        Self {
            catalog,
            gateway,
            search_log,
            deleted,
            enricher,
            occupations,
            external_timeout: DEFAULT_EXTERNAL_TIMEOUT,
        }
    }

    /// Bounds the external gateway call; must stay shorter than the overall
    /// request timeout of the transport layer.
    #[must_use]
    pub fn with_external_timeout(mut self, timeout: Duration) -> Self {
        self.external_timeout = timeout;
        self
    }

    /// Runs a full search. `now` is supplied by the caller so availability
    /// windows and the scoring lookback are deterministic under test.
    ///
    /// # Errors
    ///
    /// - [`SearchError::InvalidGeoParams`] / [`SearchError::EmptyNafFilter`]
    ///   before any I/O;
    /// - [`SearchError::NoMatchingOccupation`] when the external branch is
    ///   eligible but no appellation code resolves;
    /// - [`SearchError::CatalogStore`] / [`SearchError::ScoreEnrichment`] on
    ///   internal store failures. External gateway failures never surface.
    pub async fn search(
        &self,
        request: SearchRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let query = request.into_query()?;
        let external_params = self.resolve_external_params(&query)?;

        let internal_fut = self.catalog.search_results(&query, INTERNAL_RESULT_CAP, now);
        let external_fut = self.fetch_external(external_params.as_ref());
        let (internal_result, external_companies) = tokio::join!(internal_fut, external_fut);

        let mut internal = internal_result.map_err(SearchError::CatalogStore)?;
        let raw_external_count = external_companies.len();

        // Log exactly once per request, before any merge-stage filtering and
        // regardless of how the external branch fared. The count reflects the
        // branch actually served to the caller.
        let logged_count = if query.voluntary_to_immersion == Some(false) {
            raw_external_count
        } else {
            internal.len()
        };
        if let Err(error) = self
            .search_log
            .append(&query, u32::try_from(logged_count).unwrap_or(u32::MAX), now)
            .await
        {
            tracing::warn!(%error, "failed to append search log entry");
        }

        let internal_sirets: HashSet<Siret> =
            internal.iter().map(|r| r.siret.clone()).collect();
        let mut external_companies = rank::dedup_external(external_companies, &internal_sirets);

        if !external_companies.is_empty() {
            let sirets: Vec<Siret> = external_companies
                .iter()
                .map(|c| c.siret.clone())
                .collect();
            let deleted = self
                .deleted
                .deleted_sirets(&sirets)
                .await
                .map_err(SearchError::CatalogStore)?;
            external_companies.retain(|c| !deleted.contains(&c.siret));
        }

        let include_internal = query.voluntary_to_immersion != Some(false);
        if include_internal && !internal.is_empty() && query.sorted_by == SortMode::Score {
            self.enricher
                .enrich(&mut internal, now)
                .await
                .map_err(SearchError::ScoreEnrichment)?;
        }

        let mut merged: Vec<SearchResult> = Vec::new();
        if include_internal {
            merged.append(&mut internal);
        }
        if let Some(params) = &external_params {
            merged.extend(
                external_companies
                    .into_iter()
                    .map(|company| external_to_result(company, params)),
            );
        }

        if !merged.is_empty() {
            let mut sirets: Vec<Siret> = merged.iter().map(|r| r.siret.clone()).collect();
            sirets.sort_unstable();
            sirets.dedup();
            let restrictions = self
                .catalog
                .siret_restrictions(&sirets, query.establishment_searchable_by, now)
                .await
                .map_err(SearchError::CatalogStore)?;
            merged.retain(|r| !restrictions.non_searchable.contains(&r.siret));
            merged.retain(|r| !restrictions.not_yet_available.contains(&r.siret));
        }

        if query.sorted_by == SortMode::Score {
            rank::sort_by_score_desc(&mut merged);
        }

        Ok(merged)
    }

    /// The external branch runs only when an occupation filter and a geo
    /// circle are present and the caller did not restrict the search to the
    /// internal catalog.
    fn resolve_external_params(
        &self,
        query: &SearchQuery,
    ) -> Result<Option<ExternalParams>, SearchError> {
        if query.voluntary_to_immersion == Some(true) {
            return Ok(None);
        }
        let Some(geo) = &query.geo else {
            return Ok(None);
        };

        let rome_code = if let Some(code) = &query.rome_code {
            code.clone()
        } else if let Some(codes) = &query.appellation_codes {
            match codes
                .iter()
                .find_map(|code| self.occupations.rome_for_appellation(code))
            {
                Some(occupation) => occupation.rome_code.clone(),
                None => {
                    return Err(SearchError::NoMatchingOccupation {
                        codes: codes.clone(),
                    })
                }
            }
        } else {
            return Ok(None);
        };

        let rome_label = self
            .occupations
            .rome_label(&rome_code)
            .map_or_else(|| rome_code.clone(), ToOwned::to_owned);

        Ok(Some(ExternalParams {
            rome_code,
            rome_label,
            center: geo.position,
            radius_km: geo.distance_km,
        }))
    }

    async fn fetch_external(&self, params: Option<&ExternalParams>) -> Vec<ExternalCompany> {
        let Some(params) = params else {
            return Vec::new();
        };
        let call = self
            .gateway
            .search_companies(&params.rome_code, params.center, params.radius_km);
        match tokio::time::timeout(self.external_timeout, call).await {
            Ok(Ok(companies)) => companies,
            Ok(Err(error)) => {
                tracing::warn!(
                    %error,
                    rome_code = %params.rome_code,
                    "external offer gateway failed, continuing with internal results only"
                );
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.external_timeout.as_millis(),
                    rome_code = %params.rome_code,
                    "external offer gateway timed out, continuing with internal results only"
                );
                Vec::new()
            }
        }
    }
}

/// External prospects carry no curated data: no appellation, no audience or
/// fitness knowledge, and a zero base score.
fn external_to_result(company: ExternalCompany, params: &ExternalParams) -> SearchResult {
    SearchResult {
        siret: company.siret,
        name: company.name,
        naf: company.naf,
        voluntary_to_immersion: false,
        rome_code: params.rome_code.clone(),
        rome_label: params.rome_label.clone(),
        appellation_code: None,
        appellation_label: None,
        score: 0.0,
        address: company.address,
        position: Some(company.position),
        distance_m: company.distance_m,
        is_searchable: true,
        fit_for_disabled_workers: None,
        next_availability_date: None,
        updated_at: None,
    }
}
