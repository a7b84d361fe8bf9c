//! In-memory port implementations.
//!
//! Vector-backed stands-ins for the Postgres and HTTP adapters, used by the
//! engine property tests and local tooling. The catalog reuses the exact
//! same [`CatalogFilters`] + [`rank_results`] pipeline as the SQL path, so
//! the two backends cannot drift apart on filter semantics.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use placematch_core::establishment::{EstablishmentAggregate, Siret};
use placematch_core::geo::GeoPosition;
use placematch_core::rank::{rank_results, CatalogFilters};
use placematch_core::search::{
    ExternalCompany, SearchLogEntry, SearchQuery, SearchResult, SearchableByTarget,
};

use crate::ports::{
    DeletedEstablishments, DiscussionStats, EngagementRepository, EstablishmentCatalog,
    ExternalOfferGateway, PortResult, ScoreEnricher, SearchLogStore, SiretRestrictions,
};

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryEstablishmentCatalog {
    aggregates: Vec<EstablishmentAggregate>,
}

impl InMemoryEstablishmentCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_aggregates(aggregates: Vec<EstablishmentAggregate>) -> Self {
        Self { aggregates }
    }

    pub fn insert(&mut self, aggregate: EstablishmentAggregate) {
        self.aggregates
            .retain(|existing| existing.siret() != aggregate.siret());
        self.aggregates.push(aggregate);
    }

    fn expand(&self, query: &SearchQuery) -> Vec<SearchResult> {
        let filters = CatalogFilters::from_query(query);
        let mut rows = Vec::new();
        for aggregate in &self.aggregates {
            let establishment = &aggregate.establishment;
            if !filters.matches_establishment(establishment) {
                continue;
            }
            for offer in &aggregate.offers {
                if !filters.matches_offer(offer) {
                    continue;
                }
                for location in &aggregate.locations {
                    rows.push(SearchResult {
                        siret: establishment.siret.clone(),
                        name: establishment.name.clone(),
                        naf: Some(establishment.naf_code.clone()),
                        voluntary_to_immersion: true,
                        rome_code: offer.rome_code.clone(),
                        rome_label: offer.rome_label.clone(),
                        appellation_code: Some(offer.appellation_code.clone()),
                        appellation_label: Some(offer.appellation_label.clone()),
                        score: establishment.score,
                        address: Some(location.address.clone()),
                        position: Some(location.position),
                        distance_m: None,
                        is_searchable: !establishment.is_max_discussions_reached,
                        fit_for_disabled_workers: establishment.fit_for_disabled_workers,
                        next_availability_date: establishment.next_availability_date,
                        updated_at: Some(establishment.updated_at),
                    });
                }
            }
        }
        rows
    }
}

#[async_trait]
impl EstablishmentCatalog for InMemoryEstablishmentCatalog {
    async fn search_results(
        &self,
        query: &SearchQuery,
        cap: usize,
        _now: DateTime<Utc>,
    ) -> PortResult<Vec<SearchResult>> {
        Ok(rank_results(
            self.expand(query),
            query.sorted_by,
            query.geo.as_ref(),
            cap,
        ))
    }

    async fn siret_restrictions(
        &self,
        sirets: &[Siret],
        searchable_by: Option<SearchableByTarget>,
        now: DateTime<Utc>,
    ) -> PortResult<SiretRestrictions> {
        let wanted: HashSet<&Siret> = sirets.iter().collect();
        let mut restrictions = SiretRestrictions::default();
        for aggregate in &self.aggregates {
            let establishment = &aggregate.establishment;
            if !wanted.contains(&establishment.siret) {
                continue;
            }
            let audience_ok = match searchable_by {
                None => true,
                Some(SearchableByTarget::JobSeekers) => establishment.searchable_by.job_seekers,
                Some(SearchableByTarget::Students) => establishment.searchable_by.students,
            };
            if !establishment.is_open
                || establishment.is_max_discussions_reached
                || !audience_ok
            {
                restrictions
                    .non_searchable
                    .insert(establishment.siret.clone());
            }
            if let Some(date) = establishment.next_availability_date {
                if date > now {
                    restrictions
                        .not_yet_available
                        .insert(establishment.siret.clone());
                }
            }
        }
        Ok(restrictions)
    }
}

// ---------------------------------------------------------------------------
// External gateway
// ---------------------------------------------------------------------------

enum GatewayBehavior {
    Return(Vec<ExternalCompany>),
    Fail(String),
    Delay(Vec<ExternalCompany>, Duration),
}

/// Scripted gateway double that counts its invocations.
pub struct StubExternalOfferGateway {
    behavior: GatewayBehavior,
    calls: AtomicU32,
}

impl StubExternalOfferGateway {
    #[must_use]
    pub fn returning(companies: Vec<ExternalCompany>) -> Self {
        Self {
            behavior: GatewayBehavior::Return(companies),
            calls: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            behavior: GatewayBehavior::Fail(message.to_owned()),
            calls: AtomicU32::new(0),
        }
    }

    /// Responds only after `delay`; pair with a shorter engine timeout to
    /// exercise the degrade path.
    #[must_use]
    pub fn delayed(companies: Vec<ExternalCompany>, delay: Duration) -> Self {
        Self {
            behavior: GatewayBehavior::Delay(companies, delay),
            calls: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalOfferGateway for StubExternalOfferGateway {
    async fn search_companies(
        &self,
        _rome_code: &str,
        _center: GeoPosition,
        _radius_km: f64,
    ) -> PortResult<Vec<ExternalCompany>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            GatewayBehavior::Return(companies) => Ok(companies.clone()),
            GatewayBehavior::Fail(message) => Err(anyhow::anyhow!("{message}")),
            GatewayBehavior::Delay(companies, delay) => {
                tokio::time::sleep(*delay).await;
                Ok(companies.clone())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Search log
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemorySearchLog {
    entries: Mutex<Vec<SearchLogEntry>>,
}

impl InMemorySearchLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far.
    ///
    /// # Panics
    ///
    /// Panics if the inner lock is poisoned.
    #[must_use]
    pub fn entries(&self) -> Vec<SearchLogEntry> {
        self.entries.lock().expect("search log lock poisoned").clone()
    }
}

#[async_trait]
impl SearchLogStore for InMemorySearchLog {
    async fn append(
        &self,
        query: &SearchQuery,
        result_count: u32,
        made_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let entry = SearchLogEntry {
            id: Uuid::new_v4(),
            query: query.clone(),
            result_count: i64::from(result_count),
            made_at,
        };
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("search log lock poisoned"))?
            .push(entry);
        Ok(())
    }
}

/// Log double that always fails; the engine must warn and carry on.
pub struct FailingSearchLog;

#[async_trait]
impl SearchLogStore for FailingSearchLog {
    async fn append(
        &self,
        _query: &SearchQuery,
        _result_count: u32,
        _made_at: DateTime<Utc>,
    ) -> PortResult<()> {
        Err(anyhow::anyhow!("search log unavailable"))
    }
}

// ---------------------------------------------------------------------------
// Deleted establishments
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryDeletedEstablishments {
    sirets: HashSet<Siret>,
}

impl InMemoryDeletedEstablishments {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sirets(sirets: impl IntoIterator<Item = Siret>) -> Self {
        Self {
            sirets: sirets.into_iter().collect(),
        }
    }
}

#[async_trait]
impl DeletedEstablishments for InMemoryDeletedEstablishments {
    async fn deleted_sirets(&self, sirets: &[Siret]) -> PortResult<HashSet<Siret>> {
        Ok(sirets
            .iter()
            .filter(|siret| self.sirets.contains(siret))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Engagement history
// ---------------------------------------------------------------------------

struct DiscussionRecord {
    siret: Siret,
    created_at: DateTime<Utc>,
    answered: bool,
}

struct ConventionRecord {
    siret: Siret,
    date_submitted: DateTime<Utc>,
    accepted: bool,
}

/// Record-level engagement store so window edges can be tested precisely.
#[derive(Default)]
pub struct InMemoryEngagementRepository {
    discussions: Vec<DiscussionRecord>,
    conventions: Vec<ConventionRecord>,
}

impl InMemoryEngagementRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_discussion(&mut self, siret: Siret, created_at: DateTime<Utc>, answered: bool) {
        self.discussions.push(DiscussionRecord {
            siret,
            created_at,
            answered,
        });
    }

    pub fn add_convention(&mut self, siret: Siret, date_submitted: DateTime<Utc>, accepted: bool) {
        self.conventions.push(ConventionRecord {
            siret,
            date_submitted,
            accepted,
        });
    }
}

#[async_trait]
impl EngagementRepository for InMemoryEngagementRepository {
    async fn discussion_stats(
        &self,
        sirets: &[Siret],
        since: DateTime<Utc>,
    ) -> PortResult<HashMap<Siret, DiscussionStats>> {
        let wanted: HashSet<&Siret> = sirets.iter().collect();
        let mut stats: HashMap<Siret, DiscussionStats> = HashMap::new();
        for record in &self.discussions {
            if record.created_at < since || !wanted.contains(&record.siret) {
                continue;
            }
            let entry = stats.entry(record.siret.clone()).or_default();
            entry.total += 1;
            if record.answered {
                entry.answered += 1;
            }
        }
        Ok(stats)
    }

    async fn accepted_convention_counts(
        &self,
        sirets: &[Siret],
        since: DateTime<Utc>,
    ) -> PortResult<HashMap<Siret, u32>> {
        let wanted: HashSet<&Siret> = sirets.iter().collect();
        let mut counts: HashMap<Siret, u32> = HashMap::new();
        for record in &self.conventions {
            if !record.accepted || record.date_submitted < since || !wanted.contains(&record.siret)
            {
                continue;
            }
            *counts.entry(record.siret.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

/// Enricher that leaves scores untouched, for tests not exercising scoring.
pub struct NoopScoreEnricher;

#[async_trait]
impl ScoreEnricher for NoopScoreEnricher {
    async fn enrich(
        &self,
        _results: &mut Vec<SearchResult>,
        _now: DateTime<Utc>,
    ) -> PortResult<()> {
        Ok(())
    }
}
