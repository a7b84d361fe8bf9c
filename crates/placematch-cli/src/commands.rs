//! CLI subcommand implementations.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Args;

use placematch_companies::{CompaniesClient, CompaniesGateway};
use placematch_core::search::{SearchRequest, SearchableByTarget, SortMode};
use placematch_core::{load_app_config, load_occupations, AppConfig};
use placematch_db::{
    connect_pool, run_migrations, PgDeletedEstablishments, PgEngagementRepository,
    PgEstablishmentCatalog, PgSearchLogStore, PoolConfig,
};
use placematch_search::{EngagementScoreEnricher, SearchEngine};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(long)]
    pub lat: Option<f64>,
    #[arg(long)]
    pub lon: Option<f64>,
    #[arg(long)]
    pub distance_km: Option<f64>,
    /// ROME occupation family code, e.g. D1102.
    #[arg(long)]
    pub rome: Option<String>,
    /// Appellation codes; may be repeated.
    #[arg(long = "appellation")]
    pub appellation_codes: Vec<String>,
    /// NAF industry codes; may be repeated.
    #[arg(long = "naf")]
    pub naf_codes: Vec<String>,
    /// date | distance | score
    #[arg(long, default_value = "date")]
    pub sorted_by: SortMode,
    /// true = internal catalog only, false = external source only.
    #[arg(long)]
    pub voluntary_to_immersion: Option<bool>,
    /// jobSeekers | students
    #[arg(long)]
    pub searchable_by: Option<SearchableByTarget>,
    #[arg(long)]
    pub fit_for_disabled_workers: Option<bool>,
    #[arg(long)]
    pub campaign: Option<String>,
    #[arg(long)]
    pub keyword: Option<String>,
}

impl SearchArgs {
    fn into_request(self) -> SearchRequest {
        SearchRequest {
            latitude: self.lat,
            longitude: self.lon,
            distance_km: self.distance_km,
            rome_code: self.rome,
            appellation_codes: none_if_empty(self.appellation_codes),
            naf_codes: none_if_empty(self.naf_codes),
            sorted_by: self.sorted_by,
            voluntary_to_immersion: self.voluntary_to_immersion,
            establishment_searchable_by: self.searchable_by,
            fit_for_disabled_workers: self.fit_for_disabled_workers,
            acquisition_campaign: self.campaign,
            acquisition_keyword: self.keyword,
        }
    }
}

/// An absent repeated flag means "no filter", never an empty list.
fn none_if_empty(values: Vec<String>) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

pub async fn run_migrate() -> anyhow::Result<()> {
    let config = load_app_config().context("loading configuration")?;
    let pool = connect_pool(&config.database_url, PoolConfig::from_app_config(&config))
        .await
        .context("connecting to the database")?;
    run_migrations(&pool).await.context("running migrations")?;
    tracing::info!("migrations up to date");
    Ok(())
}

pub async fn run_search(args: SearchArgs) -> anyhow::Result<()> {
    let config = load_app_config().context("loading configuration")?;
    let engine = build_engine(&config).await?;

    let results = engine.search(args.into_request(), Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

async fn build_engine(config: &AppConfig) -> anyhow::Result<SearchEngine> {
    let pool = connect_pool(&config.database_url, PoolConfig::from_app_config(config))
        .await
        .context("connecting to the database")?;

    let occupations =
        load_occupations(&config.occupations_path).context("loading occupation reference data")?;

    let client = CompaniesClient::with_base_url(
        config.companies_api_key.as_deref().unwrap_or_default(),
        config.companies_request_timeout_secs,
        &config.companies_api_base_url,
    )
    .context("building the companies API client")?;
    let gateway = CompaniesGateway::new(
        client,
        config.companies_max_retries,
        config.companies_retry_backoff_base_ms,
    );

    let enricher = EngagementScoreEnricher::new(PgEngagementRepository::new(pool.clone()));

    Ok(SearchEngine::new(
        Arc::new(PgEstablishmentCatalog::new(pool.clone())),
        Arc::new(gateway),
        Arc::new(PgSearchLogStore::new(pool.clone())),
        Arc::new(PgDeletedEstablishments::new(pool)),
        Arc::new(enricher),
        Arc::new(occupations),
    )
    .with_external_timeout(Duration::from_millis(config.external_search_timeout_ms)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_repeated_flags_become_no_filter() {
        assert_eq!(none_if_empty(vec![]), None);
        assert_eq!(
            none_if_empty(vec!["1071C".to_owned()]),
            Some(vec!["1071C".to_owned()])
        );
    }
}
