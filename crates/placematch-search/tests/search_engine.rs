//! End-to-end orchestrator tests against the in-memory ports.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use placematch_core::establishment::{
    ContactMode, Establishment, EstablishmentAggregate, EstablishmentUserRight, ImmersionOffer,
    Location, SearchableBy, Siret, UserRole,
};
use placematch_core::geo::GeoPosition;
use placematch_core::occupations::{Appellation, Occupation, OccupationDirectory, OccupationsFile};
use placematch_core::search::{
    Address, ExternalCompany, SearchQuery, SearchRequest, SearchResult, SearchableByTarget,
    SortMode,
};
use placematch_core::SearchError;
use placematch_search::inmemory::{
    FailingSearchLog, InMemoryDeletedEstablishments, InMemoryEngagementRepository,
    InMemoryEstablishmentCatalog, InMemorySearchLog, NoopScoreEnricher, StubExternalOfferGateway,
};
use placematch_search::ports::{
    EstablishmentCatalog, PortResult, ScoreEnricher, SiretRestrictions,
};
use placematch_search::{EngagementScoreEnricher, SearchEngine, INTERNAL_RESULT_CAP};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn siret(raw: &str) -> Siret {
    Siret::parse(raw).unwrap()
}

fn directory() -> Arc<OccupationDirectory> {
    let file = OccupationsFile {
        occupations: vec![Occupation {
            rome_code: "D1102".to_owned(),
            rome_label: "Boulangerie - viennoiserie".to_owned(),
            appellations: vec![Appellation {
                code: "11573".to_owned(),
                label: "Boulanger / Boulangère".to_owned(),
            }],
        }],
    };
    Arc::new(OccupationDirectory::from_file(file).unwrap())
}

fn offer(rome: &str, appellation: &str) -> ImmersionOffer {
    ImmersionOffer {
        appellation_code: appellation.to_owned(),
        appellation_label: format!("appellation {appellation}"),
        rome_code: rome.to_owned(),
        rome_label: format!("rome {rome}"),
        created_at: now(),
    }
}

fn location(lat: f64, lon: f64) -> Location {
    Location {
        id: Uuid::new_v4(),
        address: Address {
            street_number_and_address: "1 rue de la Paix".to_owned(),
            postcode: "57000".to_owned(),
            city: "Metz".to_owned(),
            department_code: "57".to_owned(),
        },
        position: GeoPosition { lat, lon },
    }
}

fn aggregate(siret_raw: &str, lat: f64, lon: f64) -> EstablishmentAggregate {
    EstablishmentAggregate {
        establishment: Establishment {
            siret: siret(siret_raw),
            name: format!("Establishment {siret_raw}"),
            is_open: true,
            score: 0.0,
            naf_code: "1071C".to_owned(),
            contact_mode: ContactMode::Email,
            max_contacts_per_period: 10,
            is_max_discussions_reached: false,
            searchable_by: SearchableBy {
                job_seekers: true,
                students: true,
            },
            fit_for_disabled_workers: None,
            next_availability_date: None,
            created_at: now(),
            updated_at: now(),
        },
        offers: vec![offer("D1102", "11573")],
        locations: vec![location(lat, lon)],
        user_rights: vec![EstablishmentUserRight {
            user_id: Uuid::new_v4(),
            role: UserRole::Admin,
        }],
    }
}

fn company(siret_raw: &str) -> ExternalCompany {
    ExternalCompany {
        siret: siret(siret_raw),
        name: format!("Company {siret_raw}"),
        naf: Some("1071C".to_owned()),
        address: None,
        position: GeoPosition {
            lat: 49.01,
            lon: 6.01,
        },
        distance_m: Some(1_500.0),
    }
}

/// Geo + occupation request: makes the external branch eligible.
fn geo_rome_request() -> SearchRequest {
    SearchRequest {
        latitude: Some(49.0),
        longitude: Some(6.0),
        distance_km: Some(30.0),
        rome_code: Some("D1102".to_owned()),
        ..SearchRequest::default()
    }
}

struct Harness {
    catalog: Arc<InMemoryEstablishmentCatalog>,
    gateway: Arc<StubExternalOfferGateway>,
    log: Arc<InMemorySearchLog>,
    deleted: Arc<InMemoryDeletedEstablishments>,
    enricher: Arc<dyn ScoreEnricher>,
}

impl Harness {
    fn new(catalog: InMemoryEstablishmentCatalog, gateway: StubExternalOfferGateway) -> Self {
        Self {
            catalog: Arc::new(catalog),
            gateway: Arc::new(gateway),
            log: Arc::new(InMemorySearchLog::new()),
            deleted: Arc::new(InMemoryDeletedEstablishments::new()),
            enricher: Arc::new(NoopScoreEnricher),
        }
    }

    fn with_deleted(mut self, deleted: InMemoryDeletedEstablishments) -> Self {
        self.deleted = Arc::new(deleted);
        self
    }

    fn with_engagement(mut self, repository: InMemoryEngagementRepository) -> Self {
        self.enricher = Arc::new(EngagementScoreEnricher::new(repository));
        self
    }

    fn engine(&self) -> SearchEngine {
        SearchEngine::new(
            Arc::clone(&self.catalog) as Arc<dyn EstablishmentCatalog>,
            Arc::clone(&self.gateway) as _,
            Arc::clone(&self.log) as _,
            Arc::clone(&self.deleted) as _,
            Arc::clone(&self.enricher),
            directory(),
        )
    }
}

fn sirets_of(results: &[SearchResult]) -> Vec<&str> {
    results.iter().map(|r| r.siret.as_str()).collect()
}

const SIRET_A: &str = "11111111111111";
const SIRET_B: &str = "22222222222222";
const SIRET_C: &str = "33333333333333";
const SIRET_D: &str = "44444444444444";

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partial_geo_triple_fails_before_any_io() {
    let harness = Harness::new(
        InMemoryEstablishmentCatalog::new(),
        StubExternalOfferGateway::returning(vec![]),
    );
    let engine = harness.engine();

    let request = SearchRequest {
        latitude: Some(49.0),
        sorted_by: SortMode::Distance,
        ..SearchRequest::default()
    };
    let error = engine.search(request, now()).await.unwrap_err();
    assert!(matches!(error, SearchError::InvalidGeoParams(_)));
    assert_eq!(harness.gateway.call_count(), 0);
    assert!(harness.log.entries().is_empty(), "nothing may be logged");
}

#[tokio::test]
async fn empty_naf_filter_is_rejected() {
    let harness = Harness::new(
        InMemoryEstablishmentCatalog::new(),
        StubExternalOfferGateway::returning(vec![]),
    );
    let request = SearchRequest {
        naf_codes: Some(vec![]),
        ..SearchRequest::default()
    };
    let error = harness.engine().search(request, now()).await.unwrap_err();
    assert!(matches!(error, SearchError::EmptyNafFilter));
}

#[tokio::test]
async fn unknown_appellation_codes_are_fatal_when_external_branch_is_eligible() {
    let harness = Harness::new(
        InMemoryEstablishmentCatalog::new(),
        StubExternalOfferGateway::returning(vec![]),
    );
    let request = SearchRequest {
        latitude: Some(49.0),
        longitude: Some(6.0),
        distance_km: Some(30.0),
        appellation_codes: Some(vec!["99999".to_owned()]),
        ..SearchRequest::default()
    };
    let error = harness.engine().search(request, now()).await.unwrap_err();
    assert!(matches!(error, SearchError::NoMatchingOccupation { .. }));
}

#[tokio::test]
async fn unknown_appellations_are_tolerated_when_internal_only() {
    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(vec![aggregate(SIRET_A, 49.0, 6.0)]),
        StubExternalOfferGateway::returning(vec![]),
    );
    let request = SearchRequest {
        latitude: Some(49.0),
        longitude: Some(6.0),
        distance_km: Some(30.0),
        appellation_codes: Some(vec!["99999".to_owned()]),
        voluntary_to_immersion: Some(true),
        ..SearchRequest::default()
    };
    // Restricted to the catalog: no external parameters are resolved.
    let results = harness.engine().search(request, now()).await.unwrap();
    assert!(results.is_empty());
    assert_eq!(harness.gateway.call_count(), 0);
}

// ---------------------------------------------------------------------------
// Source selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn voluntary_to_immersion_true_never_calls_the_gateway() {
    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(vec![aggregate(SIRET_A, 49.0, 6.0)]),
        StubExternalOfferGateway::returning(vec![company(SIRET_B)]),
    );
    let request = SearchRequest {
        voluntary_to_immersion: Some(true),
        ..geo_rome_request()
    };
    let results = harness.engine().search(request, now()).await.unwrap();

    assert_eq!(harness.gateway.call_count(), 0);
    assert_eq!(sirets_of(&results), vec![SIRET_A]);
}

#[tokio::test]
async fn voluntary_to_immersion_false_serves_external_only_and_logs_external_count() {
    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(vec![aggregate(SIRET_A, 49.0, 6.0)]),
        StubExternalOfferGateway::returning(vec![company(SIRET_B), company(SIRET_C)]),
    );
    let request = SearchRequest {
        voluntary_to_immersion: Some(false),
        sorted_by: SortMode::Score,
        ..geo_rome_request()
    };
    let results = harness.engine().search(request, now()).await.unwrap();

    let mut found = sirets_of(&results);
    found.sort_unstable();
    assert_eq!(found, vec![SIRET_B, SIRET_C]);
    assert!(results.iter().all(|r| !r.voluntary_to_immersion));
    assert!(results.iter().all(|r| r.score == 0.0));

    let entries = harness.log.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].result_count, 2, "log counts the external branch");
}

#[tokio::test]
async fn no_occupation_filter_means_no_external_call() {
    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(vec![aggregate(SIRET_A, 49.0, 6.0)]),
        StubExternalOfferGateway::returning(vec![company(SIRET_B)]),
    );
    let request = SearchRequest {
        latitude: Some(49.0),
        longitude: Some(6.0),
        distance_km: Some(30.0),
        ..SearchRequest::default()
    };
    let results = harness.engine().search(request, now()).await.unwrap();
    assert_eq!(harness.gateway.call_count(), 0);
    assert_eq!(sirets_of(&results), vec![SIRET_A]);
}

// ---------------------------------------------------------------------------
// Merge, dedup, and merged-set filters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn internal_wins_on_duplicate_sirets() {
    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(vec![aggregate(SIRET_A, 49.0, 6.0)]),
        StubExternalOfferGateway::returning(vec![company(SIRET_A), company(SIRET_B)]),
    );
    let results = harness
        .engine()
        .search(geo_rome_request(), now())
        .await
        .unwrap();

    let from_a: Vec<&SearchResult> =
        results.iter().filter(|r| r.siret.as_str() == SIRET_A).collect();
    assert_eq!(from_a.len(), 1);
    assert!(from_a[0].voluntary_to_immersion, "internal row wins");

    let unique: HashSet<&str> = sirets_of(&results).into_iter().collect();
    assert_eq!(unique.len(), results.len(), "no siret appears twice");
}

#[tokio::test]
async fn deleted_external_sirets_are_dropped() {
    let harness = Harness::new(
        InMemoryEstablishmentCatalog::new(),
        StubExternalOfferGateway::returning(vec![company(SIRET_B), company(SIRET_C)]),
    )
    .with_deleted(InMemoryDeletedEstablishments::with_sirets([siret(SIRET_C)]));

    let results = harness
        .engine()
        .search(geo_rome_request(), now())
        .await
        .unwrap();
    assert_eq!(sirets_of(&results), vec![SIRET_B]);
}

#[tokio::test]
async fn non_searchable_establishments_never_appear_regardless_of_source() {
    // Internal row over the discussion quota, and an external prospect whose
    // siret the catalog knows as closed.
    let mut quota_reached = aggregate(SIRET_A, 49.0, 6.0);
    quota_reached.establishment.is_max_discussions_reached = true;
    let mut closed = aggregate(SIRET_B, 49.0, 6.0);
    closed.establishment.is_open = false;

    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(vec![
            quota_reached,
            closed,
            aggregate(SIRET_C, 49.0, 6.0),
        ]),
        StubExternalOfferGateway::returning(vec![company(SIRET_B), company(SIRET_D)]),
    );
    let results = harness
        .engine()
        .search(geo_rome_request(), now())
        .await
        .unwrap();

    let mut found = sirets_of(&results);
    found.sort_unstable();
    assert_eq!(found, vec![SIRET_C, SIRET_D]);
}

#[tokio::test]
async fn audience_mismatch_restricts_external_results_too() {
    let mut job_seekers_only = aggregate(SIRET_A, 49.0, 6.0);
    job_seekers_only.establishment.searchable_by = SearchableBy {
        job_seekers: true,
        students: false,
    };

    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(vec![job_seekers_only]),
        StubExternalOfferGateway::returning(vec![company(SIRET_A)]),
    );
    let request = SearchRequest {
        establishment_searchable_by: Some(SearchableByTarget::Students),
        ..geo_rome_request()
    };
    let results = harness.engine().search(request, now()).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn future_availability_excludes_results_but_today_does_not() {
    let mut available_later = aggregate(SIRET_A, 49.0, 6.0);
    available_later.establishment.next_availability_date =
        Some(now() + chrono::Duration::days(1));
    let mut available_now = aggregate(SIRET_B, 49.0, 6.0);
    available_now.establishment.next_availability_date = Some(now());

    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(vec![available_later, available_now]),
        StubExternalOfferGateway::returning(vec![]),
    );
    let results = harness
        .engine()
        .search(SearchRequest::default(), now())
        .await
        .unwrap();
    assert_eq!(sirets_of(&results), vec![SIRET_B]);
}

#[tokio::test]
async fn internal_results_are_capped_at_one_hundred() {
    let aggregates: Vec<EstablishmentAggregate> = (0..120)
        .map(|i| aggregate(&format!("{:014}", 10_000_000_000_000_u64 + i), 49.0, 6.0))
        .collect();
    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(aggregates),
        StubExternalOfferGateway::returning(vec![]),
    );
    let results = harness
        .engine()
        .search(SearchRequest::default(), now())
        .await
        .unwrap();
    assert_eq!(results.len(), INTERNAL_RESULT_CAP);
}

// ---------------------------------------------------------------------------
// Cardinality and ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_locations_times_two_offers_yield_exactly_four_rows() {
    let mut agg = aggregate(SIRET_A, 49.0, 6.0);
    agg.offers = vec![offer("D1102", "11573"), offer("M1607", "19364")];
    agg.locations = vec![location(49.0, 6.0), location(48.0, 7.0)];

    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(vec![agg]),
        StubExternalOfferGateway::returning(vec![]),
    );
    let results = harness
        .engine()
        .search(SearchRequest::default(), now())
        .await
        .unwrap();
    assert_eq!(results.len(), 4);

    let pairs: HashSet<(String, GeoPositionKey)> = results
        .iter()
        .map(|r| {
            (
                r.rome_code.clone(),
                GeoPositionKey::from(r.position.unwrap()),
            )
        })
        .collect();
    assert_eq!(pairs.len(), 4, "each (occupation, location) pair is distinct");
}

#[derive(PartialEq, Eq, Hash)]
struct GeoPositionKey(String);

impl From<GeoPosition> for GeoPositionKey {
    fn from(p: GeoPosition) -> Self {
        Self(format!("{:.6},{:.6}", p.lat, p.lon))
    }
}

#[tokio::test]
async fn distance_sort_puts_the_exact_position_first() {
    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(vec![
            aggregate(SIRET_B, 49.001, 6.001),
            aggregate(SIRET_A, 49.0, 6.0),
        ]),
        StubExternalOfferGateway::returning(vec![]),
    );
    let request = SearchRequest {
        latitude: Some(49.0),
        longitude: Some(6.0),
        distance_km: Some(30.0),
        sorted_by: SortMode::Distance,
        ..SearchRequest::default()
    };
    let results = harness.engine().search(request, now()).await.unwrap();

    assert_eq!(sirets_of(&results), vec![SIRET_A, SIRET_B]);
    assert_eq!(results[0].distance_m, Some(0.0));
    let d = results[1].distance_m.unwrap();
    assert!((d - 132.99).abs() < 0.01, "got {d}");
}

#[tokio::test]
async fn score_sort_orders_the_merged_set_descending() {
    let mut strong = aggregate(SIRET_A, 49.0, 6.0);
    strong.establishment.score = 25.0;
    let weak = aggregate(SIRET_B, 49.0, 6.0);

    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(vec![weak, strong]),
        StubExternalOfferGateway::returning(vec![company(SIRET_C)]),
    );
    let request = SearchRequest {
        sorted_by: SortMode::Score,
        ..geo_rome_request()
    };
    let results = harness.engine().search(request, now()).await.unwrap();

    assert_eq!(results[0].siret.as_str(), SIRET_A);
    // The external prospect scores zero and sorts last.
    assert_eq!(results.last().unwrap().siret.as_str(), SIRET_C);
}

// ---------------------------------------------------------------------------
// Scoring enrichment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_answered_discussion_of_two_adds_exactly_fifty() {
    let mut repository = InMemoryEngagementRepository::new();
    let recent = now() - chrono::Duration::days(30);
    repository.add_discussion(siret(SIRET_A), recent, true);
    repository.add_discussion(siret(SIRET_A), recent, false);

    let mut agg = aggregate(SIRET_A, 49.0, 6.0);
    agg.establishment.score = 10.0;

    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(vec![agg]),
        StubExternalOfferGateway::returning(vec![]),
    )
    .with_engagement(repository);

    let request = SearchRequest {
        sorted_by: SortMode::Score,
        ..SearchRequest::default()
    };
    let results = harness.engine().search(request, now()).await.unwrap();
    assert_eq!(results[0].score, 60.0);
}

#[tokio::test]
async fn three_accepted_conventions_add_exactly_thirty() {
    let mut repository = InMemoryEngagementRepository::new();
    let recent = now() - chrono::Duration::days(60);
    for _ in 0..3 {
        repository.add_convention(siret(SIRET_A), recent, true);
    }
    // Noise that must contribute nothing: outside the window, not accepted,
    // or for another siret.
    repository.add_convention(siret(SIRET_A), now() - chrono::Duration::days(400), true);
    repository.add_convention(siret(SIRET_A), recent, false);
    repository.add_convention(siret(SIRET_B), recent, true);

    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(vec![aggregate(SIRET_A, 49.0, 6.0)]),
        StubExternalOfferGateway::returning(vec![]),
    )
    .with_engagement(repository);

    let request = SearchRequest {
        sorted_by: SortMode::Score,
        ..SearchRequest::default()
    };
    let results = harness.engine().search(request, now()).await.unwrap();
    assert_eq!(results[0].score, 30.0);
}

#[tokio::test]
async fn enrichment_is_skipped_for_non_score_sorts() {
    let mut repository = InMemoryEngagementRepository::new();
    repository.add_discussion(siret(SIRET_A), now() - chrono::Duration::days(30), true);

    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(vec![aggregate(SIRET_A, 49.0, 6.0)]),
        StubExternalOfferGateway::returning(vec![]),
    )
    .with_engagement(repository);

    let results = harness
        .engine()
        .search(SearchRequest::default(), now())
        .await
        .unwrap();
    assert_eq!(results[0].score, 0.0, "date sort must not fetch history");
}

// ---------------------------------------------------------------------------
// Degradation and logging
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gateway_failure_degrades_to_internal_results_and_still_logs() {
    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(vec![aggregate(SIRET_A, 49.0, 6.0)]),
        StubExternalOfferGateway::failing("companies API is down"),
    );
    let results = harness
        .engine()
        .search(geo_rome_request(), now())
        .await
        .unwrap();

    assert_eq!(sirets_of(&results), vec![SIRET_A]);
    let entries = harness.log.entries();
    assert_eq!(entries.len(), 1, "exactly one log entry");
    assert_eq!(entries[0].result_count, 1);
    assert_eq!(entries[0].made_at, now());
}

#[tokio::test]
async fn gateway_timeout_degrades_instead_of_failing() {
    let harness = Harness::new(
        InMemoryEstablishmentCatalog::with_aggregates(vec![aggregate(SIRET_A, 49.0, 6.0)]),
        StubExternalOfferGateway::delayed(vec![company(SIRET_B)], Duration::from_secs(30)),
    );
    let engine = harness
        .engine()
        .with_external_timeout(Duration::from_millis(50));
    let results = engine.search(geo_rome_request(), now()).await.unwrap();

    assert_eq!(sirets_of(&results), vec![SIRET_A]);
    assert_eq!(harness.gateway.call_count(), 1);
}

#[tokio::test]
async fn log_write_failure_does_not_fail_the_request() {
    let engine = SearchEngine::new(
        Arc::new(InMemoryEstablishmentCatalog::with_aggregates(vec![
            aggregate(SIRET_A, 49.0, 6.0),
        ])),
        Arc::new(StubExternalOfferGateway::returning(vec![])),
        Arc::new(FailingSearchLog),
        Arc::new(InMemoryDeletedEstablishments::new()),
        Arc::new(NoopScoreEnricher),
        directory(),
    );

    let results = engine.search(SearchRequest::default(), now()).await.unwrap();
    assert_eq!(sirets_of(&results), vec![SIRET_A]);
}

struct FailingCatalog;

#[async_trait]
impl EstablishmentCatalog for FailingCatalog {
    async fn search_results(
        &self,
        _query: &SearchQuery,
        _cap: usize,
        _now: DateTime<Utc>,
    ) -> PortResult<Vec<SearchResult>> {
        Err(anyhow::anyhow!("catalog store unreachable"))
    }

    async fn siret_restrictions(
        &self,
        _sirets: &[Siret],
        _searchable_by: Option<SearchableByTarget>,
        _now: DateTime<Utc>,
    ) -> PortResult<SiretRestrictions> {
        Err(anyhow::anyhow!("catalog store unreachable"))
    }
}

#[tokio::test]
async fn catalog_failure_is_fatal() {
    let engine = SearchEngine::new(
        Arc::new(FailingCatalog),
        Arc::new(StubExternalOfferGateway::returning(vec![])),
        Arc::new(InMemorySearchLog::new()),
        Arc::new(InMemoryDeletedEstablishments::new()),
        Arc::new(NoopScoreEnricher),
        directory(),
    );
    let error = engine
        .search(SearchRequest::default(), now())
        .await
        .unwrap_err();
    assert!(matches!(error, SearchError::CatalogStore(_)));
}
