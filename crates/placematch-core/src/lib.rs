pub mod app_config;
pub mod config;
pub mod error;
pub mod establishment;
pub mod geo;
pub mod occupations;
pub mod rank;
pub mod search;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use error::{ConfigError, SearchError};
pub use establishment::{
    ContactMode, Establishment, EstablishmentAggregate, EstablishmentUserRight, ImmersionOffer,
    Location, SearchableBy, Siret, UserRole,
};
pub use geo::{distance_meters, BoundingBox, GeoParams, GeoPosition};
pub use occupations::{load_occupations, OccupationDirectory};
pub use rank::{rank_results, CatalogFilters};
pub use search::{
    Address, ExternalCompany, SearchLogEntry, SearchQuery, SearchRequest, SearchResult,
    SearchableByTarget, SortMode,
};
