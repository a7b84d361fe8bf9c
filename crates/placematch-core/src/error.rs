use thiserror::Error;

/// Search failure taxonomy.
///
/// Validation variants surface synchronously, before any I/O. External
/// gateway failures never appear here: the orchestrator absorbs them and
/// degrades to zero external results.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Partial or degenerate geo triple when distance sorting/filtering is
    /// requested.
    #[error("invalid geo params: {0}")]
    InvalidGeoParams(String),

    /// An explicitly empty NAF-code list, distinct from "no filter".
    #[error("nafCodes must not be an empty list")]
    EmptyNafFilter,

    /// Appellation codes that resolve to no known occupation family; fatal
    /// because the external source cannot be queried without one.
    #[error("no matching occupation for appellation codes {codes:?}")]
    NoMatchingOccupation { codes: Vec<String> },

    /// Infrastructure-level catalog failure; propagated, never recovered
    /// locally.
    #[error("catalog store failure")]
    CatalogStore(#[source] anyhow::Error),

    /// Engagement-history reads failed while enriching scores.
    #[error("score enrichment failure")]
    ScoreEnrichment(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
    #[error("failed to read reference file {path}")]
    ReferenceFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse reference file")]
    ReferenceFileParse(#[from] serde_yaml::Error),
    #[error("{0}")]
    Validation(String),
}
