//! Postgres implementations of the search engine ports.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use placematch_core::establishment::Siret;
use placematch_core::search::{SearchQuery, SearchResult, SearchableByTarget};
use placematch_search::ports::{
    DeletedEstablishments, DiscussionStats, EngagementRepository, EstablishmentCatalog,
    PortResult, SearchLogStore, SiretRestrictions,
};

use crate::{deleted, engagement, establishments, search_log};

pub struct PgEstablishmentCatalog {
    pool: PgPool,
}

impl PgEstablishmentCatalog {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EstablishmentCatalog for PgEstablishmentCatalog {
    async fn search_results(
        &self,
        query: &SearchQuery,
        cap: usize,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<SearchResult>> {
        Ok(establishments::search_immersion_results(&self.pool, query, cap, now).await?)
    }

    async fn siret_restrictions(
        &self,
        sirets: &[Siret],
        searchable_by: Option<SearchableByTarget>,
        now: DateTime<Utc>,
    ) -> PortResult<SiretRestrictions> {
        Ok(establishments::siret_restrictions(&self.pool, sirets, searchable_by, now).await?)
    }
}

pub struct PgSearchLogStore {
    pool: PgPool,
}

impl PgSearchLogStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SearchLogStore for PgSearchLogStore {
    async fn append(
        &self,
        query: &SearchQuery,
        result_count: u32,
        made_at: DateTime<Utc>,
    ) -> PortResult<()> {
        search_log::append_search_log(&self.pool, query, result_count, made_at).await?;
        Ok(())
    }
}

pub struct PgDeletedEstablishments {
    pool: PgPool,
}

impl PgDeletedEstablishments {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeletedEstablishments for PgDeletedEstablishments {
    async fn deleted_sirets(&self, sirets: &[Siret]) -> PortResult<HashSet<Siret>> {
        Ok(deleted::deleted_sirets(&self.pool, sirets).await?)
    }
}

pub struct PgEngagementRepository {
    pool: PgPool,
}

impl PgEngagementRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EngagementRepository for PgEngagementRepository {
    async fn discussion_stats(
        &self,
        sirets: &[Siret],
        since: DateTime<Utc>,
    ) -> PortResult<HashMap<Siret, DiscussionStats>> {
        Ok(engagement::discussion_stats(&self.pool, sirets, since).await?)
    }

    async fn accepted_convention_counts(
        &self,
        sirets: &[Siret],
        since: DateTime<Utc>,
    ) -> PortResult<HashMap<Siret, u32>> {
        Ok(engagement::accepted_convention_counts(&self.pool, sirets, since).await?)
    }
}
