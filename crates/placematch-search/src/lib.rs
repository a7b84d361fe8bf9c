//! The immersion search engine: orchestrator, scoring enrichment, and the
//! ports every collaborator is consumed through.
//!
//! The orchestrator fans out to the internal catalog and the external
//! companies gateway concurrently, merges and filters the combined set, and
//! durably logs every search. All collaborators are port trait objects so
//! the engine runs identically against Postgres adapters and the in-memory
//! implementations in [`inmemory`].

pub mod engine;
pub mod inmemory;
pub mod ports;
pub mod scoring;

pub use engine::{SearchEngine, INTERNAL_RESULT_CAP};
pub use ports::{
    DeletedEstablishments, DiscussionStats, EngagementRepository, EstablishmentCatalog,
    ExternalOfferGateway, ScoreEnricher, SearchLogStore, SiretRestrictions,
};
pub use scoring::EngagementScoreEnricher;
