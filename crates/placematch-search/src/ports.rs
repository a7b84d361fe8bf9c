//! Port traits: the narrow read/write seams the orchestrator consumes its
//! collaborators through. Implementations live in `placematch-db` and
//! `placematch-companies`; in-memory versions in [`crate::inmemory`].

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use placematch_core::establishment::Siret;
use placematch_core::geo::GeoPosition;
use placematch_core::search::{ExternalCompany, SearchQuery, SearchResult, SearchableByTarget};

pub type PortResult<T> = Result<T, anyhow::Error>;

/// Per-siret source-of-truth flags applied to the merged result set.
#[derive(Debug, Clone, Default)]
pub struct SiretRestrictions {
    /// Closed, audience-mismatched, or over the discussion quota.
    pub non_searchable: HashSet<Siret>,
    /// `next_availability_date` strictly after the query's "now".
    pub not_yet_available: HashSet<Siret>,
}

impl SiretRestrictions {
    #[must_use]
    pub fn is_restricted(&self, siret: &Siret) -> bool {
        self.non_searchable.contains(siret) || self.not_yet_available.contains(siret)
    }
}

/// Read port over the internal establishment catalog.
#[async_trait]
pub trait EstablishmentCatalog: Send + Sync {
    /// Filtered, geo-bounded, ranked-and-capped result rows: one per
    /// (siret, occupation, location) combination.
    async fn search_results(
        &self,
        query: &SearchQuery,
        cap: usize,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<SearchResult>>;

    /// Restriction flags for an arbitrary siret set (internal or external).
    /// Sirets unknown to the catalog are unrestricted.
    async fn siret_restrictions(
        &self,
        sirets: &[Siret],
        searchable_by: Option<SearchableByTarget>,
        now: DateTime<Utc>,
    ) -> PortResult<SiretRestrictions>;
}

/// Port over the third-party nearby-companies API.
#[async_trait]
pub trait ExternalOfferGateway: Send + Sync {
    async fn search_companies(
        &self,
        rome_code: &str,
        center: GeoPosition,
        radius_km: f64,
    ) -> PortResult<Vec<ExternalCompany>>;
}

/// Append-only search analytics log.
#[async_trait]
pub trait SearchLogStore: Send + Sync {
    async fn append(
        &self,
        query: &SearchQuery,
        result_count: u32,
        made_at: DateTime<Utc>,
    ) -> PortResult<()>;
}

/// Set of sirets whose establishments were deleted from the platform.
#[async_trait]
pub trait DeletedEstablishments: Send + Sync {
    async fn deleted_sirets(&self, sirets: &[Siret]) -> PortResult<HashSet<Siret>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscussionStats {
    pub total: u32,
    /// Discussions with at least one establishment-authored message.
    pub answered: u32,
}

/// Engagement-history reads backing the score enricher.
#[async_trait]
pub trait EngagementRepository: Send + Sync {
    async fn discussion_stats(
        &self,
        sirets: &[Siret],
        since: DateTime<Utc>,
    ) -> PortResult<HashMap<Siret, DiscussionStats>>;

    async fn accepted_convention_counts(
        &self,
        sirets: &[Siret],
        since: DateTime<Utc>,
    ) -> PortResult<HashMap<Siret, u32>>;
}

/// Capability interface for score enrichment, invoked by the orchestrator
/// only when sorting by score.
#[async_trait]
pub trait ScoreEnricher: Send + Sync {
    async fn enrich(&self, results: &mut Vec<SearchResult>, now: DateTime<Utc>) -> PortResult<()>;
}
