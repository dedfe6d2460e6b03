// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Typed service configuration.
//!
//! Settings are read from a YAML file and can then be overridden via environment variables named
//! after the setting path, using `__` as the separator.  For example, `BEDROCK__SERVER__PORT=9000`
//! overrides `server.port`.  Every setting has a default so that a partial file is valid.

use ::config::{Config, Environment, File, FileFormat};
use derivative::Derivative;
use log::LevelFilter;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Prefix of the environment variables that override file settings.
pub const ENV_PREFIX: &str = "BEDROCK";

/// Configuration errors.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Indicates that the configuration could not be read or parsed.
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    /// Indicates that the configuration was parsed but contains bad values.
    #[error("Invalid configuration: {0}")]
    InvalidValue(String),
}

impl From<::config::ConfigError> for ConfigError {
    fn from(e: ::config::ConfigError) -> Self {
        ConfigError::LoadError(e.to_string())
    }
}

/// Result type for this module.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Run mode of the server.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    /// Development mode with verbose diagnostics.
    #[default]
    Debug,

    /// Production mode.
    Release,

    /// Mode used by automated tests.
    Test,
}

/// Settings for the HTTP listener.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    /// Port to listen on.
    pub port: u16,

    /// Run mode.
    pub mode: ServerMode,

    /// Maximum time a request may take before it is aborted.
    pub request_timeout_secs: u64,

    /// Maximum time to wait for in-flight requests once shutdown starts.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            mode: ServerMode::Debug,
            request_timeout_secs: 30,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerSettings {
    /// Returns the request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the shutdown grace period as a duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Database engines the service can talk to.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// MySQL or MariaDB server.
    #[default]
    Mysql,

    /// SQLite file, or an in-memory database when `database` is `:memory:`.
    Sqlite,
}

/// Settings for the database connection pool.
#[derive(Clone, Deserialize, Derivative, PartialEq)]
#[derivative(Debug)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database engine.
    pub driver: DatabaseDriver,

    /// Host name of the server.
    pub host: String,

    /// Port of the server.
    pub port: u16,

    /// Username to authenticate with.
    pub username: String,

    /// Password to authenticate with.
    #[derivative(Debug = "ignore")]
    pub password: String,

    /// Database name, or file path for SQLite.
    pub database: String,

    /// Connection character set for MySQL.
    pub charset: String,

    /// Number of connections to keep open while idle.
    pub max_idle_conns: u32,

    /// Maximum number of open connections.
    pub max_open_conns: u32,

    /// Maximum lifetime of a single connection.
    pub conn_max_lifetime_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::Mysql,
            host: "127.0.0.1".to_owned(),
            port: 3306,
            username: "root".to_owned(),
            password: String::new(),
            database: String::new(),
            charset: "utf8mb4".to_owned(),
            max_idle_conns: 10,
            max_open_conns: 100,
            conn_max_lifetime_secs: 3600,
        }
    }
}

/// Settings for the Redis client.
#[derive(Clone, Deserialize, Derivative, PartialEq)]
#[derivative(Debug)]
#[serde(default)]
pub struct RedisSettings {
    /// Host name of the server.
    pub host: String,

    /// Port of the server.
    pub port: u16,

    /// Password to authenticate with, if any.
    #[derivative(Debug = "ignore")]
    pub password: String,

    /// Logical database number.
    pub db: i64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_owned(), port: 6379, password: String::new(), db: 0 }
    }
}

/// Cache backends.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    /// Process-local cache.
    #[default]
    Memory,

    /// Shared Redis cache.
    Redis,

    /// Process-local cache in front of Redis.
    Chain,
}

/// Settings for the cache.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    /// Backend to use.
    pub driver: CacheDriver,

    /// Default expiration of entries, in seconds.
    pub ttl: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { driver: CacheDriver::Memory, ttl: 300 }
    }
}

impl CacheSettings {
    /// Returns the default expiration of entries as a duration.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }
}

/// Settings for the logger.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggerSettings {
    /// Minimum level of messages to record (`error`, `warn`, `info`, `debug` or `trace`).
    pub level: String,

    /// Path to the log file.  Logs only go to the console when empty.
    pub filename: String,

    /// Size in megabytes at which the log file is rotated.
    pub max_size: u64,

    /// Number of rotated files to keep.
    pub max_backups: usize,

    /// Days to keep rotated files for.  Zero disables pruning by age.
    pub max_age: u64,

    /// Whether rotated files are gzipped.
    pub compress: bool,

    /// Whether to mirror file logs to the console.
    pub console: bool,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            filename: String::new(),
            max_size: 100,
            max_backups: 3,
            max_age: 7,
            compress: false,
            console: true,
        }
    }
}

impl LoggerSettings {
    /// Parses the configured level.
    pub fn level_filter(&self) -> ConfigResult<LevelFilter> {
        LevelFilter::from_str(&self.level).map_err(|_| {
            ConfigError::InvalidValue(format!("Unknown log level '{}'", self.level))
        })
    }
}

/// Settings for cross-origin resource sharing.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorsSettings {
    /// Whether CORS headers are added at all.
    pub enabled: bool,

    /// Origins allowed to issue requests; `*` allows any.
    pub allow_origins: Vec<String>,

    /// Methods advertised to clients.
    pub allow_methods: Vec<String>,

    /// Headers advertised to clients.
    pub allow_headers: Vec<String>,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_origins: vec!["*".to_owned()],
            allow_methods: ["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            allow_headers: ["Content-Type", "Authorization", "X-Request-ID"]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }
}

/// Complete configuration of a service.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// HTTP listener settings.
    pub server: ServerSettings,

    /// Database settings.
    pub database: DatabaseSettings,

    /// Redis settings.
    pub redis: RedisSettings,

    /// Cache settings.
    pub cache: CacheSettings,

    /// Logger settings.
    pub logger: LoggerSettings,

    /// CORS settings.
    pub cors: CorsSettings,
}

/// Returns the source that reads setting overrides from the environment.
fn env_overrides() -> Environment {
    Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true)
}

impl Settings {
    /// Loads the settings from the YAML file at `path` and applies environment overrides.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let builder = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml).required(true))
            .add_source(env_overrides());
        Self::build(builder)
    }

    /// Parses the settings from the YAML `text` and applies environment overrides.
    pub fn from_yaml(text: &str) -> ConfigResult<Self> {
        let builder = Config::builder()
            .add_source(File::from_str(text, FileFormat::Yaml))
            .add_source(env_overrides());
        Self::build(builder)
    }

    /// Finalizes a loader `builder` into validated settings.
    fn build(
        builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
    ) -> ConfigResult<Self> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks cross-field constraints that deserialization cannot express.
    fn validate(&self) -> ConfigResult<()> {
        self.logger.level_filter()?;

        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue("server.port cannot be 0".to_owned()));
        }
        if self.database.max_open_conns == 0 {
            return Err(ConfigError::InvalidValue(
                "database.max_open_conns must be positive".to_owned(),
            ));
        }
        if self.database.max_idle_conns > self.database.max_open_conns {
            return Err(ConfigError::InvalidValue(
                "database.max_idle_conns cannot exceed database.max_open_conns".to_owned(),
            ));
        }
        if self.database.database.is_empty() {
            return Err(ConfigError::InvalidValue("database.database must be set".to_owned()));
        }
        if self.cache.ttl == 0 {
            return Err(ConfigError::InvalidValue("cache.ttl must be positive".to_owned()));
        }
        if self.logger.max_size == 0 {
            return Err(ConfigError::InvalidValue("logger.max_size must be positive".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Environment variables that tests in this module may set.
    const OVERRIDES: [&str; 2] = ["BEDROCK__SERVER__PORT", "BEDROCK__CACHE__DRIVER"];

    /// Parses `text` while making sure that no overrides leak in from the environment.
    fn parse(text: &str) -> ConfigResult<Settings> {
        temp_env::with_vars_unset(OVERRIDES, || Settings::from_yaml(text))
    }

    #[test]
    fn test_defaults() {
        let settings = parse("database:\n  database: app\n").unwrap();

        assert_eq!(8080, settings.server.port);
        assert_eq!(ServerMode::Debug, settings.server.mode);
        assert_eq!(DatabaseDriver::Mysql, settings.database.driver);
        assert_eq!(10, settings.database.max_idle_conns);
        assert_eq!(100, settings.database.max_open_conns);
        assert_eq!(CacheDriver::Memory, settings.cache.driver);
        assert_eq!(Duration::from_secs(300), settings.cache.default_ttl());
        assert_eq!(LevelFilter::Info, settings.logger.level_filter().unwrap());
        assert_eq!(100, settings.logger.max_size);
        assert_eq!(3, settings.logger.max_backups);
        assert_eq!(7, settings.logger.max_age);
        assert!(settings.cors.enabled);
        assert_eq!(vec!["*".to_owned()], settings.cors.allow_origins);
        assert!(settings.cors.allow_headers.contains(&"X-Request-ID".to_owned()));
    }

    #[test]
    fn test_full_file() {
        let text = r#"
server:
  port: 9000
  mode: release
  request_timeout_secs: 5
database:
  driver: sqlite
  database: ":memory:"
  max_idle_conns: 1
  max_open_conns: 1
redis:
  host: cache.example.com
  password: secret
  db: 2
cache:
  driver: chain
  ttl: 60
logger:
  level: debug
  filename: /var/log/app.log
  compress: true
cors:
  enabled: false
  allow_origins: ["https://example.com"]
"#;
        let settings = parse(text).unwrap();

        assert_eq!(9000, settings.server.port);
        assert_eq!(ServerMode::Release, settings.server.mode);
        assert_eq!(Duration::from_secs(5), settings.server.request_timeout());
        assert_eq!(DatabaseDriver::Sqlite, settings.database.driver);
        assert_eq!(":memory:", settings.database.database);
        assert_eq!("cache.example.com", settings.redis.host);
        assert_eq!(2, settings.redis.db);
        assert_eq!(CacheDriver::Chain, settings.cache.driver);
        assert_eq!(LevelFilter::Debug, settings.logger.level_filter().unwrap());
        assert!(settings.logger.compress);
        assert!(!settings.cors.enabled);
        assert_eq!(vec!["https://example.com".to_owned()], settings.cors.allow_origins);
    }

    #[test]
    fn test_env_overrides_file() {
        let settings = temp_env::with_vars(
            [("BEDROCK__SERVER__PORT", Some("9999")), ("BEDROCK__CACHE__DRIVER", Some("redis"))],
            || Settings::from_yaml("server:\n  port: 1234\ndatabase:\n  database: app\n").unwrap(),
        );
        assert_eq!(9999, settings.server.port);
        assert_eq!(CacheDriver::Redis, settings.cache.driver);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "server:\n  port: 7000\ndatabase:\n  database: app").unwrap();

        let settings =
            temp_env::with_vars_unset(OVERRIDES, || Settings::load(file.path()).unwrap());
        assert_eq!(7000, settings.server.port);
        assert_eq!("app", settings.database.database);
    }

    #[test]
    fn test_load_missing_file() {
        match Settings::load(Path::new("/nonexistent/config.yaml")) {
            Err(ConfigError::LoadError(_)) => (),
            e => panic!("Unexpected result: {:?}", e),
        }
    }

    #[test]
    fn test_unknown_enum_value() {
        match parse("database:\n  database: app\n  driver: oracle\n") {
            Err(ConfigError::LoadError(e)) => assert!(e.contains("oracle")),
            e => panic!("Unexpected result: {:?}", e),
        }
    }

    #[test]
    fn test_invalid_values() {
        for (text, exp_error) in [
            ("database: {database: app}\nlogger: {level: loud}\n", "Unknown log level 'loud'"),
            ("database: {database: app}\nserver: {port: 0}\n", "server.port"),
            ("database: {database: app}\ncache: {ttl: 0}\n", "cache.ttl"),
            (
                "database: {database: app, max_idle_conns: 20, max_open_conns: 5}\n",
                "max_idle_conns",
            ),
            ("database: {database: app, max_open_conns: 0}\n", "max_open_conns"),
            ("database: {database: app}\nlogger: {max_size: 0}\n", "logger.max_size"),
            ("server: {port: 1234}\n", "database.database"),
        ] {
            match parse(text) {
                Err(ConfigError::InvalidValue(e)) => {
                    assert!(e.contains(exp_error), "'{}' does not contain '{}'", e, exp_error)
                }
                e => panic!("Unexpected result for {}: {:?}", text, e),
            }
        }
    }

    #[test]
    fn test_debug_hides_passwords() {
        let settings = Settings {
            database: DatabaseSettings { password: "db-secret".to_owned(), ..Default::default() },
            redis: RedisSettings { password: "redis-secret".to_owned(), ..Default::default() },
            ..Default::default()
        };
        let text = format!("{:?}", settings);
        assert!(!text.contains("db-secret"));
        assert!(!text.contains("redis-secret"));
    }
}
