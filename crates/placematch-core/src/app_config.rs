use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub occupations_path: PathBuf,
    pub companies_api_base_url: String,
    pub companies_api_key: Option<String>,
    pub companies_request_timeout_secs: u64,
    pub companies_max_retries: u32,
    pub companies_retry_backoff_base_ms: u64,
    /// Budget for the external branch of a search, strictly shorter than the
    /// overall request timeout so a slow partner degrades instead of failing.
    pub external_search_timeout_ms: u64,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("occupations_path", &self.occupations_path)
            .field("database_url", &"[redacted]")
            .field("companies_api_base_url", &self.companies_api_base_url)
            .field(
                "companies_api_key",
                &self.companies_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "companies_request_timeout_secs",
                &self.companies_request_timeout_secs,
            )
            .field("companies_max_retries", &self.companies_max_retries)
            .field(
                "companies_retry_backoff_base_ms",
                &self.companies_retry_backoff_base_ms,
            )
            .field("external_search_timeout_ms", &self.external_search_timeout_ms)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .finish()
    }
}
