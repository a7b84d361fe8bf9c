//! Deleted-establishment lookups.

use std::collections::HashSet;

use sqlx::PgPool;

use placematch_core::establishment::Siret;

use crate::DbError;

/// Which of the given sirets are recorded as deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn deleted_sirets(
    pool: &PgPool,
    sirets: &[Siret],
) -> Result<HashSet<Siret>, DbError> {
    if sirets.is_empty() {
        return Ok(HashSet::new());
    }
    let raw: Vec<String> = sirets.iter().map(|s| s.as_str().to_owned()).collect();

    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT siret FROM deleted_establishments WHERE siret = ANY($1)")
            .bind(&raw)
            .fetch_all(pool)
            .await?;

    rows.iter()
        .map(|(raw,)| {
            Siret::parse(raw).map_err(|e| DbError::InvalidRow {
                table: "deleted_establishments",
                reason: e.to_string(),
            })
        })
        .collect()
}
