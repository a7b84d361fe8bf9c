//! Aggregate writes: seed and test support.
//!
//! The production catalog is populated by the form-submission pipeline,
//! which owns its own write path. These helpers exist for seeding and
//! integration tests, and follow the same wholesale-replacement rule the
//! pipeline uses for offers, locations, and user rights.

use sqlx::PgPool;

use placematch_core::establishment::{EstablishmentAggregate, Siret};

use crate::DbError;

/// Upsert a full aggregate inside one transaction.
///
/// The establishment row is upserted on its siret; offers, locations, and
/// user rights are replaced wholesale.
///
/// # Errors
///
/// Returns [`DbError::InvalidAggregate`] if the aggregate fails validation,
/// or [`DbError::Sqlx`] if any statement fails (the transaction is rolled
/// back).
pub async fn upsert_establishment_aggregate(
    pool: &PgPool,
    aggregate: &EstablishmentAggregate,
) -> Result<(), DbError> {
    aggregate
        .validate()
        .map_err(|e| DbError::InvalidAggregate(e.to_string()))?;

    let establishment = &aggregate.establishment;
    let siret = establishment.siret.as_str();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO establishments (siret, name, is_open, score, naf_code, contact_mode, \
             max_contacts_per_period, is_max_discussions_reached, \
             searchable_by_job_seekers, searchable_by_students, \
             fit_for_disabled_workers, next_availability_date, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         ON CONFLICT (siret) DO UPDATE SET \
             name = EXCLUDED.name, \
             is_open = EXCLUDED.is_open, \
             score = EXCLUDED.score, \
             naf_code = EXCLUDED.naf_code, \
             contact_mode = EXCLUDED.contact_mode, \
             max_contacts_per_period = EXCLUDED.max_contacts_per_period, \
             is_max_discussions_reached = EXCLUDED.is_max_discussions_reached, \
             searchable_by_job_seekers = EXCLUDED.searchable_by_job_seekers, \
             searchable_by_students = EXCLUDED.searchable_by_students, \
             fit_for_disabled_workers = EXCLUDED.fit_for_disabled_workers, \
             next_availability_date = EXCLUDED.next_availability_date, \
             updated_at = EXCLUDED.updated_at",
    )
    .bind(siret)
    .bind(&establishment.name)
    .bind(establishment.is_open)
    .bind(establishment.score)
    .bind(&establishment.naf_code)
    .bind(establishment.contact_mode.to_string())
    .bind(establishment.max_contacts_per_period)
    .bind(establishment.is_max_discussions_reached)
    .bind(establishment.searchable_by.job_seekers)
    .bind(establishment.searchable_by.students)
    .bind(establishment.fit_for_disabled_workers)
    .bind(establishment.next_availability_date)
    .bind(establishment.created_at)
    .bind(establishment.updated_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM immersion_offers WHERE siret = $1")
        .bind(siret)
        .execute(&mut *tx)
        .await?;
    for offer in &aggregate.offers {
        sqlx::query(
            "INSERT INTO immersion_offers \
                 (siret, appellation_code, appellation_label, rome_code, rome_label, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(siret)
        .bind(&offer.appellation_code)
        .bind(&offer.appellation_label)
        .bind(&offer.rome_code)
        .bind(&offer.rome_label)
        .bind(offer.created_at)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("DELETE FROM establishment_locations WHERE siret = $1")
        .bind(siret)
        .execute(&mut *tx)
        .await?;
    for location in &aggregate.locations {
        sqlx::query(
            "INSERT INTO establishment_locations \
                 (id, siret, street_number_and_address, postcode, city, department_code, lat, lon) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(location.id)
        .bind(siret)
        .bind(&location.address.street_number_and_address)
        .bind(&location.address.postcode)
        .bind(&location.address.city)
        .bind(&location.address.department_code)
        .bind(location.position.lat)
        .bind(location.position.lon)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("DELETE FROM establishment_user_rights WHERE siret = $1")
        .bind(siret)
        .execute(&mut *tx)
        .await?;
    for right in &aggregate.user_rights {
        sqlx::query(
            "INSERT INTO establishment_user_rights (siret, user_id, role) VALUES ($1, $2, $3)",
        )
        .bind(siret)
        .bind(right.user_id)
        .bind(right.role.to_string())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Delete an aggregate and record its siret in the deleted set, so external
/// prospects for it stop surfacing.
///
/// Returns `true` when an establishment row was actually removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn delete_establishment_aggregate(pool: &PgPool, siret: &Siret) -> Result<bool, DbError> {
    let mut tx = pool.begin().await?;

    // Offers, locations, and user rights go with the establishment row
    // through ON DELETE CASCADE.
    let deleted = sqlx::query("DELETE FROM establishments WHERE siret = $1")
        .bind(siret.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query(
        "INSERT INTO deleted_establishments (siret, deleted_at) VALUES ($1, NOW()) \
         ON CONFLICT (siret) DO NOTHING",
    )
    .bind(siret.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(deleted > 0)
}
