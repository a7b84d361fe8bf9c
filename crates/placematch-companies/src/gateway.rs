//! `ExternalOfferGateway` adapter over the companies client.

use async_trait::async_trait;

use placematch_core::establishment::Siret;
use placematch_core::geo::GeoPosition;
use placematch_core::search::{Address, ExternalCompany};
use placematch_search::ports::{ExternalOfferGateway, PortResult};

use crate::client::CompaniesClient;
use crate::retry::retry_with_backoff;
use crate::types::CompanyItem;

/// Gateway over the companies API: retries transient failures, validates
/// sirets, and converts wire stubs into domain [`ExternalCompany`] values.
pub struct CompaniesGateway {
    client: CompaniesClient,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl CompaniesGateway {
    #[must_use]
    pub fn new(client: CompaniesClient, max_retries: u32, backoff_base_ms: u64) -> Self {
        Self {
            client,
            max_retries,
            backoff_base_ms,
        }
    }
}

#[async_trait]
impl ExternalOfferGateway for CompaniesGateway {
    async fn search_companies(
        &self,
        rome_code: &str,
        center: GeoPosition,
        radius_km: f64,
    ) -> PortResult<Vec<ExternalCompany>> {
        let items = retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.client
                .search_companies(rome_code, center.lat, center.lon, radius_km)
        })
        .await?;

        Ok(items.into_iter().filter_map(into_external_company).collect())
    }
}

/// Maps one wire stub to the domain type, dropping entries whose siret is
/// malformed rather than failing the whole batch.
fn into_external_company(item: CompanyItem) -> Option<ExternalCompany> {
    let siret = match Siret::parse(&item.siret) {
        Ok(siret) => siret,
        Err(error) => {
            tracing::warn!(%error, name = %item.name, "skipping company with invalid siret");
            return None;
        }
    };

    let address = match (item.street, item.postcode, item.city) {
        (Some(street), Some(postcode), Some(city)) => {
            let department_code = postcode.chars().take(2).collect();
            Some(Address {
                street_number_and_address: street,
                postcode,
                city,
                department_code,
            })
        }
        _ => None,
    };

    Some(ExternalCompany {
        siret,
        name: item.name,
        naf: item.naf,
        address,
        position: GeoPosition {
            lat: item.lat,
            lon: item.lon,
        },
        distance_m: item.distance_km.map(|km| km * 1_000.0),
    })
}
