// ABOUTME: Constants module with domain-separated organization
// ABOUTME: Retry budgets, conflict codes, pool sizing, and parameter formats

//! Constants module
//!
//! Constants are grouped into logical domains rather than being in a single large file.

/// Retry budget and backoff defaults for the transaction runner
pub mod retry {
    /// Maximum number of retries after a conflicting attempt
    pub const DEFAULT_MAX_RETRIES: u32 = 59;
    /// Lower bound of the randomized retry delay in milliseconds
    pub const DEFAULT_MIN_DELAY_MS: u64 = 100;
    /// Upper bound of the randomized retry delay in milliseconds
    pub const DEFAULT_MAX_DELAY_MS: u64 = 1000;
}

/// Savepoint naming
pub mod savepoint {
    /// Prefix keeps generated names valid unquoted identifiers
    pub const NAME_PREFIX: &str = "sp_";
    /// Number of random characters following the prefix
    pub const NAME_RANDOM_LEN: usize = 16;
}

/// Conflict codes that mark an attempt as retryable
pub mod conflict {
    /// `PostgreSQL` SQLSTATE for `serialization_failure`
    pub const SERIALIZATION_FAILURE: &str = "40001";
    /// Codes the relational backend retries
    pub const RETRYABLE_SQLSTATES: &[&str] = &[SERIALIZATION_FAILURE];
    /// Code attached when a Redis `EXEC` returns nil because a watched key changed
    pub const WATCH_CONFLICT: &str = "WATCH_CONFLICT";
}

/// Connection pool defaults
pub mod pool {
    /// Connection pool minimum size
    pub const MIN_CONNECTIONS: u32 = 1;
    /// Connection pool maximum size
    pub const MAX_CONNECTIONS: u32 = 10;
    /// Connection acquire timeout in seconds
    pub const ACQUIRE_TIMEOUT_SECS: u64 = 30;
    /// Default `PostgreSQL` port
    pub const POSTGRES_PORT: u16 = 5432;
    /// Default Redis port
    pub const REDIS_PORT: u16 = 6379;
}

/// Parameter normalization
pub mod params {
    /// Fixed UTC datetime format used for key-value arguments and query traces
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
}

/// Configuration sources
pub mod config {
    /// Environment variable naming the YAML configuration file
    pub const CONFIG_PATH_ENV: &str = "TXRUNNER_CONFIG";
    /// Top-level section for relational servers
    pub const POSTGRES_SECTION: &str = "postgres";
    /// Top-level section for key-value servers
    pub const REDIS_SECTION: &str = "redis";
}

/// Service names for structured logging
pub mod service_names {
    /// Default service name
    pub const TXRUNNER: &str = "txrunner";
}
