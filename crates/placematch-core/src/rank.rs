//! Typed filter and ranking pipeline shared by every catalog backend.
//!
//! All filters are ANDed and any filter may be absent. The SQL catalog mirrors
//! [`CatalogFilters`] clause-for-clause in its `WHERE`; the in-memory catalog
//! evaluates it directly, so both backends stay in lockstep. The geo circle is
//! always enforced here with the exact geodesic distance, never by the coarse
//! SQL bounding box alone.

use std::collections::HashSet;

use crate::establishment::{Establishment, ImmersionOffer};
use crate::geo::{distance_meters, GeoParams};
use crate::search::{ExternalCompany, SearchQuery, SearchResult, SearchableByTarget, SortMode};

/// Non-geo predicates derived from a [`SearchQuery`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogFilters {
    pub rome_code: Option<String>,
    pub appellation_codes: Option<Vec<String>>,
    pub naf_codes: Option<Vec<String>>,
    pub searchable_by: Option<SearchableByTarget>,
    pub fit_for_disabled_workers: Option<bool>,
}

impl CatalogFilters {
    #[must_use]
    pub fn from_query(query: &SearchQuery) -> Self {
        Self {
            rome_code: query.rome_code.clone(),
            appellation_codes: query.appellation_codes.clone(),
            naf_codes: query.naf_codes.clone(),
            searchable_by: query.establishment_searchable_by,
            fit_for_disabled_workers: query.fit_for_disabled_workers,
        }
    }

    /// Evaluates the establishment-level predicates. Closed establishments
    /// never match.
    #[must_use]
    pub fn matches_establishment(&self, establishment: &Establishment) -> bool {
        if !establishment.is_open {
            return false;
        }
        if let Some(naf_codes) = &self.naf_codes {
            if !naf_codes.contains(&establishment.naf_code) {
                return false;
            }
        }
        if let Some(target) = self.searchable_by {
            let opted_in = match target {
                SearchableByTarget::JobSeekers => establishment.searchable_by.job_seekers,
                SearchableByTarget::Students => establishment.searchable_by.students,
            };
            if !opted_in {
                return false;
            }
        }
        if let Some(wanted) = self.fit_for_disabled_workers {
            // Strict tri-state: an undeclared establishment never satisfies
            // an explicit fitness filter.
            if establishment.fit_for_disabled_workers != Some(wanted) {
                return false;
            }
        }
        true
    }

    /// Evaluates the offer-level predicates.
    #[must_use]
    pub fn matches_offer(&self, offer: &ImmersionOffer) -> bool {
        if let Some(rome_code) = &self.rome_code {
            if &offer.rome_code != rome_code {
                return false;
            }
        }
        if let Some(appellation_codes) = &self.appellation_codes {
            if !appellation_codes.contains(&offer.appellation_code) {
                return false;
            }
        }
        true
    }
}

/// Final ranking stage: exact circle filter, per-mode stable sort, hard cap.
///
/// For geo queries every row gets its geodesic distance annotated and rows
/// outside the circle (or without a position) are dropped. Sorting is stable,
/// so equal keys keep the backend's order.
#[must_use]
pub fn rank_results(
    mut results: Vec<SearchResult>,
    sorted_by: SortMode,
    geo: Option<&GeoParams>,
    cap: usize,
) -> Vec<SearchResult> {
    if let Some(geo) = geo {
        let radius_m = geo.radius_m();
        results.retain_mut(|result| match result.position {
            Some(position) => {
                let distance = distance_meters(geo.position, position);
                result.distance_m = Some(distance);
                distance <= radius_m
            }
            None => false,
        });
    }

    match sorted_by {
        SortMode::Date => results.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
        SortMode::Score => sort_by_score_desc(&mut results),
        SortMode::Distance => results.sort_by(|a, b| {
            match (a.distance_m, b.distance_m) {
                (Some(da), Some(db)) => da.total_cmp(&db),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        }),
    }

    results.truncate(cap);
    results
}

/// Drops external candidates whose siret already appears internally
/// (internal wins: it carries richer, curated data).
#[must_use]
pub fn dedup_external(
    external: Vec<ExternalCompany>,
    internal_sirets: &HashSet<crate::establishment::Siret>,
) -> Vec<ExternalCompany> {
    external
        .into_iter()
        .filter(|company| !internal_sirets.contains(&company.siret))
        .collect()
}

/// Stable descending sort by score.
pub fn sort_by_score_desc(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::establishment::{ContactMode, SearchableBy, Siret};
    use crate::geo::GeoPosition;

    fn establishment(siret: &str) -> Establishment {
        Establishment {
            siret: Siret::parse(siret).unwrap(),
            name: "Test".to_owned(),
            is_open: true,
            score: 0.0,
            naf_code: "1071C".to_owned(),
            contact_mode: ContactMode::Email,
            max_contacts_per_period: 10,
            is_max_discussions_reached: false,
            searchable_by: SearchableBy::default(),
            fit_for_disabled_workers: None,
            next_availability_date: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn offer(rome: &str, appellation: &str) -> ImmersionOffer {
        ImmersionOffer {
            appellation_code: appellation.to_owned(),
            appellation_label: String::new(),
            rome_code: rome.to_owned(),
            rome_label: String::new(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn result(siret: &str, position: Option<GeoPosition>) -> SearchResult {
        SearchResult {
            siret: Siret::parse(siret).unwrap(),
            name: "Test".to_owned(),
            naf: None,
            voluntary_to_immersion: true,
            rome_code: "D1102".to_owned(),
            rome_label: String::new(),
            appellation_code: None,
            appellation_label: None,
            score: 0.0,
            address: None,
            position,
            distance_m: None,
            is_searchable: true,
            fit_for_disabled_workers: None,
            next_availability_date: None,
            updated_at: None,
        }
    }

    const SIRET_A: &str = "11110000111100";
    const SIRET_B: &str = "22220000222200";
    const SIRET_C: &str = "33330000333300";

    #[test]
    fn no_filters_match_any_open_establishment() {
        let filters = CatalogFilters::default();
        assert!(filters.matches_establishment(&establishment(SIRET_A)));
        assert!(filters.matches_offer(&offer("D1102", "11573")));
    }

    #[test]
    fn closed_establishments_never_match() {
        let mut e = establishment(SIRET_A);
        e.is_open = false;
        assert!(!CatalogFilters::default().matches_establishment(&e));
    }

    #[test]
    fn naf_filter_is_exact_membership() {
        let filters = CatalogFilters {
            naf_codes: Some(vec!["4932Z".to_owned()]),
            ..CatalogFilters::default()
        };
        assert!(!filters.matches_establishment(&establishment(SIRET_A)));
        let mut e = establishment(SIRET_A);
        e.naf_code = "4932Z".to_owned();
        assert!(filters.matches_establishment(&e));
    }

    #[test]
    fn audience_filter_requires_opt_in() {
        let filters = CatalogFilters {
            searchable_by: Some(SearchableByTarget::Students),
            ..CatalogFilters::default()
        };
        // Default audience is job seekers only.
        assert!(!filters.matches_establishment(&establishment(SIRET_A)));
        let mut e = establishment(SIRET_A);
        e.searchable_by.students = true;
        assert!(filters.matches_establishment(&e));
    }

    #[test]
    fn fitness_filter_is_strict_on_the_tri_state() {
        let filters = CatalogFilters {
            fit_for_disabled_workers: Some(true),
            ..CatalogFilters::default()
        };
        // Undeclared (None) does not satisfy an explicit filter.
        assert!(!filters.matches_establishment(&establishment(SIRET_A)));
        let mut declared_no = establishment(SIRET_A);
        declared_no.fit_for_disabled_workers = Some(false);
        assert!(!filters.matches_establishment(&declared_no));
        let mut declared_yes = establishment(SIRET_A);
        declared_yes.fit_for_disabled_workers = Some(true);
        assert!(filters.matches_establishment(&declared_yes));
    }

    #[test]
    fn rome_and_appellation_filters_apply_to_offers() {
        let filters = CatalogFilters {
            rome_code: Some("D1102".to_owned()),
            appellation_codes: Some(vec!["11573".to_owned()]),
            ..CatalogFilters::default()
        };
        assert!(filters.matches_offer(&offer("D1102", "11573")));
        assert!(!filters.matches_offer(&offer("D1102", "11574")));
        assert!(!filters.matches_offer(&offer("M1607", "11573")));
    }

    #[test]
    fn rank_drops_rows_outside_the_circle_and_annotates_distance() {
        let geo = GeoParams {
            position: GeoPosition { lat: 49.0, lon: 6.0 },
            distance_km: 1.0,
        };
        let inside = result(SIRET_A, Some(GeoPosition { lat: 49.001, lon: 6.001 }));
        let outside = result(SIRET_B, Some(GeoPosition { lat: 49.5, lon: 6.5 }));
        let no_position = result(SIRET_C, None);

        let ranked = rank_results(
            vec![outside, inside, no_position],
            SortMode::Distance,
            Some(&geo),
            100,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].siret.as_str(), SIRET_A);
        let d = ranked[0].distance_m.unwrap();
        assert!((d - 132.99).abs() < 0.01, "got {d}");
    }

    #[test]
    fn rank_sorts_by_distance_ascending() {
        let geo = GeoParams {
            position: GeoPosition { lat: 49.0, lon: 6.0 },
            distance_km: 30.0,
        };
        let near = result(SIRET_A, Some(GeoPosition { lat: 49.0, lon: 6.0 }));
        let far = result(SIRET_B, Some(GeoPosition { lat: 49.001, lon: 6.001 }));
        let ranked = rank_results(vec![far, near], SortMode::Distance, Some(&geo), 100);
        assert_eq!(ranked[0].siret.as_str(), SIRET_A);
        assert_eq!(ranked[0].distance_m, Some(0.0));
        assert_eq!(ranked[1].siret.as_str(), SIRET_B);
    }

    #[test]
    fn rank_sorts_by_date_descending_with_missing_dates_last() {
        let mut older = result(SIRET_A, None);
        older.updated_at = Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let mut newer = result(SIRET_B, None);
        newer.updated_at = Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        let undated = result(SIRET_C, None);

        let ranked = rank_results(vec![older, undated, newer], SortMode::Date, None, 100);
        assert_eq!(ranked[0].siret.as_str(), SIRET_B);
        assert_eq!(ranked[1].siret.as_str(), SIRET_A);
        assert_eq!(ranked[2].siret.as_str(), SIRET_C);
    }

    #[test]
    fn rank_applies_the_cap_after_sorting() {
        let mut results = Vec::new();
        for i in 0..10 {
            let mut r = result(SIRET_A, None);
            r.score = f64::from(i);
            results.push(r);
        }
        let ranked = rank_results(results, SortMode::Score, None, 3);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].score, 9.0);
        assert_eq!(ranked[2].score, 7.0);
    }

    #[test]
    fn dedup_drops_external_sirets_already_internal() {
        let internal: HashSet<Siret> = [Siret::parse(SIRET_A).unwrap()].into_iter().collect();
        let external = vec![
            ExternalCompany {
                siret: Siret::parse(SIRET_A).unwrap(),
                name: "Dup".to_owned(),
                naf: None,
                address: None,
                position: GeoPosition { lat: 49.0, lon: 6.0 },
                distance_m: None,
            },
            ExternalCompany {
                siret: Siret::parse(SIRET_B).unwrap(),
                name: "Kept".to_owned(),
                naf: None,
                address: None,
                position: GeoPosition { lat: 49.0, lon: 6.0 },
                distance_m: None,
            },
        ];
        let surviving = dedup_external(external, &internal);
        assert_eq!(surviving.len(), 1);
        assert_eq!(surviving[0].siret.as_str(), SIRET_B);
    }
}
