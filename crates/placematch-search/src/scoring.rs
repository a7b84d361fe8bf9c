//! Score enrichment from engagement signals.
//!
//! Internal results are boosted by how responsive an establishment has been
//! (message-reply rate over its discussions) and how many accepted
//! placements it produced inside the lookback window. History reads are
//! expensive, so the orchestrator only invokes this when sorting by score.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use placematch_core::establishment::Siret;
use placematch_core::search::SearchResult;

use crate::ports::{DiscussionStats, EngagementRepository, PortResult, ScoreEnricher};

/// Engagement signals are considered over the trailing year.
pub const LOOKBACK_DAYS: i64 = 365;

/// Flat boost per accepted placement in the window.
pub const ACCEPTED_CONVENTION_BONUS: f64 = 10.0;

/// Share of discussions with an establishment reply, expressed 0–100.
/// Zero when there are no discussions at all.
#[must_use]
pub fn response_rate(stats: DiscussionStats) -> f64 {
    if stats.total == 0 {
        0.0
    } else {
        f64::from(stats.answered) * 100.0 / f64::from(stats.total)
    }
}

#[must_use]
pub fn engagement_bonus(stats: DiscussionStats, accepted_conventions: u32) -> f64 {
    response_rate(stats) + ACCEPTED_CONVENTION_BONUS * f64::from(accepted_conventions)
}

/// [`ScoreEnricher`] backed by an [`EngagementRepository`].
///
/// Issues one concurrent pair of reads per search (discussions,
/// conventions) over the distinct sirets of the result set — never one pair
/// per result.
pub struct EngagementScoreEnricher<R> {
    repository: R,
}

impl<R> EngagementScoreEnricher<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<R: EngagementRepository> ScoreEnricher for EngagementScoreEnricher<R> {
    async fn enrich(&self, results: &mut Vec<SearchResult>, now: DateTime<Utc>) -> PortResult<()> {
        let mut sirets: Vec<Siret> = results.iter().map(|r| r.siret.clone()).collect();
        sirets.sort_unstable();
        sirets.dedup();
        if sirets.is_empty() {
            return Ok(());
        }

        let since = now - Duration::days(LOOKBACK_DAYS);
        let (discussions, conventions) = tokio::join!(
            self.repository.discussion_stats(&sirets, since),
            self.repository.accepted_convention_counts(&sirets, since),
        );
        let discussions = discussions?;
        let conventions = conventions?;

        for result in results.iter_mut() {
            let stats = discussions.get(&result.siret).copied().unwrap_or_default();
            let accepted = conventions.get(&result.siret).copied().unwrap_or(0);
            result.score += engagement_bonus(stats, accepted);
        }
        Ok(())
    }
}
