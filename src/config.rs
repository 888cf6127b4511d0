//! Configuration handling.
//!
//! Pool definitions are plain data, usually deserialized from a JSON datastore
//! file. Optional tuning options are kept as raw strings and validated once
//! against [`OPTION_SCHEMA`]; malformed or unknown options never fail a pool,
//! they fall back to defaults and are reported as [`OptionDiagnostic`]s.

use crate::error::{DbError, DbResult};
use clap::Parser;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_PROBE_QUERY: &str = "SELECT 1";

// Pool configuration defaults
pub const DEFAULT_INITIAL_SIZE: u32 = 0;
pub const DEFAULT_MIN_IDLE: u32 = 1;
pub const DEFAULT_MAX_ACTIVE: u32 = 10;
pub const DEFAULT_MAX_ACTIVE_SQLITE: u32 = 1;
pub const DEFAULT_MAX_WAIT_MS: u64 = 30_000;
pub const DEFAULT_EVICTION_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_MIN_EVICTABLE_IDLE_MS: u64 = 600_000;
pub const DEFAULT_MAX_PREPARED_STATEMENTS: usize = 100;

// =============================================================================
// Driver Kind
// =============================================================================

/// Database engines supported by the bundled sqlx driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    /// Includes MariaDB
    MySql,
    Sqlite,
}

impl DriverKind {
    /// Resolve the engine from an explicit driver identifier, falling back to
    /// the URL scheme.
    ///
    /// Driver identifiers are matched loosely so that class-style names such
    /// as `com.mysql.cj.jdbc.Driver` or `org.sqlite.JDBC` are understood.
    pub fn resolve(driver: Option<&str>, url: &str) -> Option<Self> {
        if let Some(driver) = driver.map(str::trim).filter(|d| !d.is_empty()) {
            let lower = driver.to_lowercase();
            if lower.contains("mysql") || lower.contains("mariadb") {
                return Some(Self::MySql);
            }
            if lower.contains("sqlite") {
                return Some(Self::Sqlite);
            }
        }
        Self::from_url(url)
    }

    /// Parse the engine from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let parsed = Url::parse(strip_jdbc_prefix(url)).ok()?;
        match parsed.scheme() {
            "mysql" | "mariadb" => Some(Self::MySql),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MySql => "MySQL",
            Self::Sqlite => "SQLite",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Remove a leading `jdbc:` so legacy URLs can be handed to sqlx.
pub fn strip_jdbc_prefix(url: &str) -> &str {
    let trimmed = url.trim();
    match trimmed.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("jdbc:") => &trimmed[5..],
        _ => trimmed,
    }
}

/// Mask the password component of a URL for logging.
pub fn masked_url(url: &str) -> String {
    let stripped = strip_jdbc_prefix(url);
    match Url::parse(stripped) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("****")).is_ok() {
                parsed.to_string()
            } else {
                stripped.to_string()
            }
        }
        _ => stripped.to_string(),
    }
}

// =============================================================================
// Pool Definitions
// =============================================================================

fn default_enabled() -> bool {
    true
}

/// Accept JSON scalars for option values and keep them as strings.
fn deserialize_options<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

/// Declarative description of one named pool.
///
/// Mandatory fields (`url`, `username`, `password`) are checked by
/// [`PoolDefinition::validate`] when the pool is created, so one bad entry in a
/// datastore file does not prevent the others from loading.
#[derive(Clone, Deserialize)]
pub struct PoolDefinition {
    pub id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    /// Never logged or serialized.
    #[serde(default)]
    pub password: String,
    /// Driver identifier; the URL scheme is used when absent.
    #[serde(default)]
    pub driver: Option<String>,
    /// Raw tuning options, see [`OPTION_SCHEMA`].
    #[serde(default, deserialize_with = "deserialize_options")]
    pub options: BTreeMap<String, String>,
}

impl PoolDefinition {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            url: url.into(),
            username: username.into(),
            password: password.into(),
            driver: None,
            options: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    #[must_use]
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Identifier with surrounding whitespace removed.
    pub fn pool_id(&self) -> &str {
        self.id.trim()
    }

    /// Check the mandatory fields.
    pub fn validate(&self) -> DbResult<()> {
        let id = self.pool_id();
        if id.is_empty() {
            return Err(DbError::configuration("", "pool id can't be empty"));
        }
        for (field, value) in [
            ("url", &self.url),
            ("username", &self.username),
            ("password", &self.password),
        ] {
            if value.trim().is_empty() {
                return Err(DbError::configuration(id, format!("{field} can't be empty")));
            }
        }
        Ok(())
    }

    pub fn driver_kind(&self) -> Option<DriverKind> {
        DriverKind::resolve(self.driver.as_deref(), &self.url)
    }

    pub fn masked_url(&self) -> String {
        masked_url(&self.url)
    }
}

impl fmt::Debug for PoolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolDefinition")
            .field("id", &self.id)
            .field("enabled", &self.enabled)
            .field("url", &self.masked_url())
            .field("username", &self.username)
            .field("password", &"****")
            .field("driver", &self.driver)
            .field("options", &self.options)
            .finish()
    }
}

/// A datastore file: a list of pool definitions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatastoreConfig {
    #[serde(default)]
    pub pools: Vec<PoolDefinition>,
}

impl DatastoreConfig {
    pub fn from_json_str(json: &str) -> DbResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| DbError::configuration("*", format!("invalid datastore JSON: {e}")))
    }

    pub fn from_path(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DbError::configuration("*", format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&content)
    }
}

// =============================================================================
// Pool Settings
// =============================================================================

/// Typed pool tuning, produced from [`PoolDefinition::options`].
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    /// Connections opened eagerly when the pool is created.
    pub initial_size: u32,
    pub min_idle: u32,
    /// `None` uses the engine default (10, or 1 for SQLite).
    pub max_active: Option<u32>,
    pub max_wait: Duration,
    /// Idle maintenance runs inside the pool; the interval is informational.
    pub eviction_interval: Duration,
    pub min_evictable_idle: Duration,
    pub validation_query: Option<String>,
    pub test_while_idle: bool,
    pub test_on_borrow: bool,
    pub test_on_return: bool,
    pub pool_prepared_statements: bool,
    pub max_prepared_statements: usize,
    pub filters: Vec<String>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            initial_size: DEFAULT_INITIAL_SIZE,
            min_idle: DEFAULT_MIN_IDLE,
            max_active: None,
            max_wait: Duration::from_millis(DEFAULT_MAX_WAIT_MS),
            eviction_interval: Duration::from_millis(DEFAULT_EVICTION_INTERVAL_MS),
            min_evictable_idle: Duration::from_millis(DEFAULT_MIN_EVICTABLE_IDLE_MS),
            validation_query: None,
            test_while_idle: false,
            test_on_borrow: true,
            test_on_return: false,
            pool_prepared_statements: true,
            max_prepared_statements: DEFAULT_MAX_PREPARED_STATEMENTS,
            filters: Vec::new(),
        }
    }
}

/// A non-fatal problem found while reading tuning options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionDiagnostic {
    pub option: String,
    pub message: String,
}

impl fmt::Display for OptionDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.option, self.message)
    }
}

type OptionSetter = fn(&mut PoolSettings, &str) -> Result<(), String>;

/// One recognised tuning option.
pub struct OptionSpec {
    pub name: &'static str,
    /// Alternative spelling accepted for the same option.
    pub alias: &'static str,
    setter: OptionSetter,
}

fn parse_u32(raw: &str) -> Result<u32, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("expected a non-negative integer, got '{raw}'"))
}

fn parse_positive(raw: &str) -> Result<Option<u32>, String> {
    match parse_u32(raw)? {
        0 => Err("must be greater than 0".to_string()),
        n => Ok(Some(n)),
    }
}

fn parse_usize(raw: &str) -> Result<usize, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("expected a non-negative integer, got '{raw}'"))
}

fn parse_millis(raw: &str) -> Result<Duration, String> {
    raw.trim()
        .parse()
        .map(Duration::from_millis)
        .map_err(|_| format!("expected milliseconds, got '{raw}'"))
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(format!("expected true or false, got '{raw}'")),
    }
}

fn parse_text(raw: &str) -> Result<Option<String>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("must not be empty".to_string());
    }
    Ok(Some(trimmed.to_string()))
}

fn parse_list(raw: &str) -> Result<Vec<String>, String> {
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect())
}

macro_rules! option_setter {
    ($fn_name:ident, $field:ident, $parser:expr) => {
        fn $fn_name(settings: &mut PoolSettings, raw: &str) -> Result<(), String> {
            settings.$field = $parser(raw)?;
            Ok(())
        }
    };
}

option_setter!(set_initial_size, initial_size, parse_u32);
option_setter!(set_min_idle, min_idle, parse_u32);
option_setter!(set_max_active, max_active, parse_positive);
option_setter!(set_max_wait, max_wait, parse_millis);
option_setter!(set_eviction_interval, eviction_interval, parse_millis);
option_setter!(set_min_evictable_idle, min_evictable_idle, parse_millis);
option_setter!(set_validation_query, validation_query, parse_text);
option_setter!(set_test_while_idle, test_while_idle, parse_bool);
option_setter!(set_test_on_borrow, test_on_borrow, parse_bool);
option_setter!(set_test_on_return, test_on_return, parse_bool);
option_setter!(set_pool_prepared_statements, pool_prepared_statements, parse_bool);
option_setter!(set_max_prepared_statements, max_prepared_statements, parse_usize);
option_setter!(set_filters, filters, parse_list);

/// Every tuning option a pool definition may carry.
pub const OPTION_SCHEMA: &[OptionSpec] = &[
    OptionSpec { name: "initial_size", alias: "initialSize", setter: set_initial_size },
    OptionSpec { name: "min_idle", alias: "minIdle", setter: set_min_idle },
    OptionSpec { name: "max_active", alias: "maxActive", setter: set_max_active },
    OptionSpec { name: "max_wait_ms", alias: "maxWait", setter: set_max_wait },
    OptionSpec {
        name: "eviction_interval_ms",
        alias: "timeBetweenEvictionRunsMillis",
        setter: set_eviction_interval,
    },
    OptionSpec {
        name: "min_evictable_idle_ms",
        alias: "minEvictableIdleTimeMillis",
        setter: set_min_evictable_idle,
    },
    OptionSpec { name: "validation_query", alias: "validationQuery", setter: set_validation_query },
    OptionSpec { name: "test_while_idle", alias: "testWhileIdle", setter: set_test_while_idle },
    OptionSpec { name: "test_on_borrow", alias: "testOnBorrow", setter: set_test_on_borrow },
    OptionSpec { name: "test_on_return", alias: "testOnReturn", setter: set_test_on_return },
    OptionSpec {
        name: "pool_prepared_statements",
        alias: "poolPreparedStatements",
        setter: set_pool_prepared_statements,
    },
    OptionSpec {
        name: "max_prepared_statements",
        alias: "maxPoolPreparedStatementPerConnection",
        setter: set_max_prepared_statements,
    },
    OptionSpec { name: "filters", alias: "filters", setter: set_filters },
];

/// Filters understood by the bundled driver.
pub const KNOWN_FILTERS: &[&str] = &["log", "stat", "slf4j", "wall"];

impl PoolSettings {
    /// Build settings from raw options.
    ///
    /// Every option is looked up in [`OPTION_SCHEMA`]; parse failures and
    /// unknown names leave the default in place and are returned as
    /// diagnostics.
    pub fn from_options(options: &BTreeMap<String, String>) -> (Self, Vec<OptionDiagnostic>) {
        let mut settings = Self::default();
        let mut diagnostics = Vec::new();

        for (key, raw) in options {
            let key = key.trim();
            let Some(spec) = OPTION_SCHEMA
                .iter()
                .find(|spec| spec.name == key || spec.alias == key)
            else {
                diagnostics.push(OptionDiagnostic {
                    option: key.to_string(),
                    message: "unknown option, ignored".to_string(),
                });
                continue;
            };
            if let Err(message) = (spec.setter)(&mut settings, raw) {
                diagnostics.push(OptionDiagnostic {
                    option: spec.name.to_string(),
                    message: format!("{message}; using default"),
                });
            }
        }

        for filter in &settings.filters {
            if !KNOWN_FILTERS.contains(&filter.as_str()) {
                diagnostics.push(OptionDiagnostic {
                    option: "filters".to_string(),
                    message: format!("unknown filter '{filter}', ignored"),
                });
            }
        }

        (settings, diagnostics)
    }

    /// Get max_active with default value based on the engine.
    pub fn max_active_or_default(&self, kind: DriverKind) -> u32 {
        self.max_active.unwrap_or(match kind {
            DriverKind::Sqlite => DEFAULT_MAX_ACTIVE_SQLITE,
            DriverKind::MySql => DEFAULT_MAX_ACTIVE,
        })
    }

    /// Clamp `min_idle` and `initial_size` to the pool capacity of `kind`.
    ///
    /// The capacity is `max_active`, or the engine default when it is unset.
    pub fn clamp_to_capacity(&mut self, kind: DriverKind) -> Vec<OptionDiagnostic> {
        let max = self.max_active_or_default(kind);
        let mut diagnostics = Vec::new();
        if self.min_idle > max {
            diagnostics.push(OptionDiagnostic {
                option: "min_idle".to_string(),
                message: format!("min_idle ({}) exceeds max_active ({max}); clamped", self.min_idle),
            });
            self.min_idle = max;
        }
        if self.initial_size > max {
            diagnostics.push(OptionDiagnostic {
                option: "initial_size".to_string(),
                message: format!(
                    "initial_size ({}) exceeds max_active ({max}); clamped",
                    self.initial_size
                ),
            });
            self.initial_size = max;
        }
        diagnostics
    }

    /// Statement cache capacity per connection; 0 disables caching.
    pub fn statement_cache_capacity(&self) -> usize {
        if self.pool_prepared_statements {
            self.max_prepared_statements
        } else {
            0
        }
    }

    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.iter().any(|f| f == name)
    }
}

// =============================================================================
// Command Line
// =============================================================================

#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-datastore",
    about = "Load named connection pools and run a read-only probe query",
    version,
    author
)]
pub struct Config {
    /// Path to the JSON datastore file with pool definitions
    #[arg(short, long, value_name = "PATH", env = "DATASTORE_CONFIG")]
    pub config: PathBuf,

    /// Pool to run the probe query against
    #[arg(short, long, value_name = "ID", env = "DATASTORE_POOL")]
    pub pool: Option<String>,

    /// Read-only query to run against the selected pool
    #[arg(short, long, default_value = DEFAULT_PROBE_QUERY, env = "DATASTORE_QUERY")]
    pub query: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DATASTORE_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DATASTORE_JSON_LOGS")]
    pub json_logs: bool,
}
