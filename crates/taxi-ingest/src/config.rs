//! Configuration management

use std::path::PathBuf;
use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use taxi_common::{EtlError, Result};

// ============================================================================
// Ingestion Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/taxi_trips";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 4;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default number of unique records per bulk load.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Default duplicates audit file.
pub const DEFAULT_DUPLICATES_PATH: &str = "duplicates.csv";

/// Default destination table.
pub const DEFAULT_TABLE: &str = "taxi_trips";

/// Civil time zone assumed for zone-less input timestamps.
pub const DEFAULT_REFERENCE_TZ: &str = "America/New_York";

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// Settings for one ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub database: DatabaseConfig,
    pub batch_size: usize,
    pub convert_to_utc: bool,
    pub duplicates_path: PathBuf,
    pub table: String,
    pub reference_tz: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            convert_to_utc: false,
            duplicates_path: PathBuf::from(DEFAULT_DUPLICATES_PATH),
            table: DEFAULT_TABLE.to_string(),
            reference_tz: DEFAULT_REFERENCE_TZ.to_string(),
        }
    }
}

impl IngestConfig {
    /// Load `.env` if present, then read the environment over the defaults.
    ///
    /// The result is not validated so command-line overrides can be applied first.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Read the environment over the defaults, without touching `.env`
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", defaults.database.max_connections)?,
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    defaults.database.connect_timeout_secs,
                )?,
            },
            batch_size: env_or("TAXI_BATCH_SIZE", defaults.batch_size)?,
            convert_to_utc: env_or("TAXI_CONVERT_TO_UTC", defaults.convert_to_utc)?,
            duplicates_path: std::env::var("TAXI_DUPLICATES_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.duplicates_path),
            table: std::env::var("TAXI_TABLE").unwrap_or(defaults.table),
            reference_tz: std::env::var("TAXI_REFERENCE_TZ").unwrap_or(defaults.reference_tz),
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_convert_to_utc(mut self, convert_to_utc: bool) -> Self {
        self.convert_to_utc = convert_to_utc;
        self
    }

    pub fn with_duplicates_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.duplicates_path = path.into();
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Parsed reference time zone
    pub fn reference_tz(&self) -> Result<Tz> {
        Tz::from_str(&self.reference_tz).map_err(|_| {
            EtlError::Config(format!("Unknown reference time zone '{}'", self.reference_tz))
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EtlError::Config(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.database.url.is_empty() {
            return Err(EtlError::Config("Database URL cannot be empty".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(EtlError::Config(
                "Database max_connections must be greater than 0".to_string(),
            ));
        }

        if !is_table_name(&self.table) {
            return Err(EtlError::Config(format!(
                "Table name '{}' must be an identifier, optionally schema-qualified",
                self.table
            )));
        }

        if self.duplicates_path.as_os_str().is_empty() {
            return Err(EtlError::Config(
                "Duplicates path cannot be empty".to_string(),
            ));
        }

        self.reference_tz()?;

        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| EtlError::Parse(format!("{key} has invalid value '{raw}'"))),
        Err(_) => Ok(default),
    }
}

/// `name` or `schema.name`, each part a plain SQL identifier
fn is_table_name(table: &str) -> bool {
    let parts: Vec<&str> = table.split('.').collect();
    parts.len() <= 2 && parts.iter().all(|part| is_identifier(part))
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
