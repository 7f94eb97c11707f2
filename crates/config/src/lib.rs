//! Layered configuration for the folio maintenance tool.
//!
//! Sources are merged in order, later ones winning:
//! 1. built-in defaults,
//! 2. a config file (`--config`, or `folio.toml` in the platform config
//!    directory when present),
//! 3. `FOLIO_` environment variables, with `__` separating nested keys
//!    (`FOLIO_DATABASE__PATH=/srv/wiki.db`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

const ENV_PREFIX: &str = "FOLIO_";
const FILE_NAME: &str = "folio.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    pub log: LogConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite database file, created on first use.
    pub path: PathBuf,
    pub max_connections: u32,
    /// How long a writer waits on a locked database before giving up.
    pub busy_timeout_ms: u64,
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("folio.db"),
            max_connections: 5,
            busy_timeout_ms: 1500,
        }
    }
}
impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// One of `off`, `error`, `warn`, `info`, `debug`, `trace`.
    pub level: String,
}
impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}
impl LogConfig {
    pub fn level_filter(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(self.level.trim()).or_raise(|| ErrorKind::Invalid("unknown log level"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaintenanceConfig {
    /// Report what destructive maintenance would do without doing it.
    pub dry_run: bool,
}

impl Config {
    /// Load and validate the configuration.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let figment = Self::figment(path)?.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
    }

    /// Defaults merged with the config file, without the environment layer.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let figment = Figment::from(Serialized::defaults(Config::default()));
        let file = match path {
            Some(path) => {
                // No tracing subscriber is installed yet.
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                path.to_path_buf()
            },
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(figment),
            },
        };
        Ok(match file.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
            Some("json") => figment.merge(Json::file(file)),
            _ => figment.merge(Toml::file(file)),
        })
    }

    /// `folio.toml` inside the platform's configuration directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "folio").map(|dirs| dirs.config_dir().join(FILE_NAME))
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("database path must not be empty"));
        }
        if self.database.max_connections == 0 {
            exn::bail!(ErrorKind::Invalid("database.max_connections must be at least 1"));
        }
        self.log.level_filter()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.database.path, PathBuf::from("folio.db"));
        assert_eq!(config.database.busy_timeout(), Duration::from_millis(1500));
        assert!(!config.maintenance.dry_run);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let file = write_config(
            ".toml",
            r#"
                [database]
                path = "/srv/wiki.db"

                [maintenance]
                dry_run = true
            "#,
        );
        let config = Config::from_figment(&Config::figment(Some(file.path())).unwrap()).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/srv/wiki.db"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.log.level, "info");
        assert!(config.maintenance.dry_run);
    }

    #[test]
    fn test_yaml_by_extension() {
        let file = write_config(".yaml", "log:\n  level: debug\n");
        let config = Config::from_figment(&Config::figment(Some(file.path())).unwrap()).unwrap();
        assert_eq!(config.log.level_filter().unwrap(), LevelFilter::DEBUG);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = Config::load(Some(missing.as_path())).unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound(missing.clone()));
        assert!((*err).to_string().ends_with("nope.toml"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let file = write_config(".toml", "[database]\nfilename = \"x.db\"\n");
        let err = Config::from_figment(&Config::figment(Some(file.path())).unwrap()).unwrap_err();
        assert_eq!(*err, ErrorKind::Load);
    }

    #[rstest]
    #[case("[database]\nmax_connections = 0\n")]
    #[case("[database]\npath = \"\"\n")]
    #[case("[log]\nlevel = \"loud\"\n")]
    fn test_invalid_values(#[case] contents: &str) {
        let file = write_config(".toml", contents);
        let err = Config::from_figment(&Config::figment(Some(file.path())).unwrap()).unwrap_err();
        assert!(matches!(*err, ErrorKind::Invalid(_)));
    }

    #[rstest]
    #[case("off", LevelFilter::OFF)]
    #[case("warn", LevelFilter::WARN)]
    #[case(" TRACE ", LevelFilter::TRACE)]
    fn test_level_filter(#[case] level: &str, #[case] expected: LevelFilter) {
        let log = LogConfig { level: level.to_string() };
        assert_eq!(log.level_filter().unwrap(), expected);
    }
}
