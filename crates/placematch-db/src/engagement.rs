//! Engagement-history reads backing the score enricher.
//!
//! One query per signal over the whole siret set of a search — the
//! enricher calls both concurrently, never per result.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use placematch_core::establishment::Siret;
use placematch_search::ports::DiscussionStats;

use crate::DbError;

#[derive(Debug, sqlx::FromRow)]
struct DiscussionStatsRow {
    siret: String,
    total: i64,
    answered: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct ConventionCountRow {
    siret: String,
    accepted: i64,
}

fn parse_siret(table: &'static str, raw: &str) -> Result<Siret, DbError> {
    Siret::parse(raw).map_err(|e| DbError::InvalidRow {
        table,
        reason: e.to_string(),
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn count_u32(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

/// Discussion totals and establishment-answered counts per siret, over
/// discussions created at or after `since`.
///
/// A discussion counts as answered when it has at least one
/// establishment-authored message.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn discussion_stats(
    pool: &PgPool,
    sirets: &[Siret],
    since: DateTime<Utc>,
) -> Result<HashMap<Siret, DiscussionStats>, DbError> {
    if sirets.is_empty() {
        return Ok(HashMap::new());
    }
    let raw: Vec<String> = sirets.iter().map(|s| s.as_str().to_owned()).collect();

    let rows = sqlx::query_as::<_, DiscussionStatsRow>(
        "SELECT d.siret, \
                COUNT(*) AS total, \
                COUNT(*) FILTER (WHERE EXISTS ( \
                    SELECT 1 FROM discussion_messages m \
                    WHERE m.discussion_id = d.id AND m.sender = 'establishment')) AS answered \
         FROM discussions d \
         WHERE d.siret = ANY($1) AND d.created_at >= $2 \
         GROUP BY d.siret",
    )
    .bind(&raw)
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut stats = HashMap::with_capacity(rows.len());
    for row in rows {
        stats.insert(
            parse_siret("discussions", &row.siret)?,
            DiscussionStats {
                total: count_u32(row.total),
                answered: count_u32(row.answered),
            },
        );
    }
    Ok(stats)
}

/// Accepted placement counts per siret, over conventions submitted at or
/// after `since`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn accepted_convention_counts(
    pool: &PgPool,
    sirets: &[Siret],
    since: DateTime<Utc>,
) -> Result<HashMap<Siret, u32>, DbError> {
    if sirets.is_empty() {
        return Ok(HashMap::new());
    }
    let raw: Vec<String> = sirets.iter().map(|s| s.as_str().to_owned()).collect();

    let rows = sqlx::query_as::<_, ConventionCountRow>(
        "SELECT siret, COUNT(*) AS accepted \
         FROM conventions \
         WHERE siret = ANY($1) AND status = 'ACCEPTED' AND date_submitted >= $2 \
         GROUP BY siret",
    )
    .bind(&raw)
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut counts = HashMap::with_capacity(rows.len());
    for row in rows {
        counts.insert(parse_siret("conventions", &row.siret)?, count_u32(row.accepted));
    }
    Ok(counts)
}
