//! Layered settings: defaults, then `repopulse.toml`, then `REPOPULSE__*`
//! environment variables. Command-line flags are applied on top by each
//! subcommand.

use anyhow::{Context, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use repopulse_collector::{GitHubConfig, IngestConfig, LimitsConfig};
use repopulse_warehouse::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file read from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "repopulse.toml";

/// Environment variables look like `REPOPULSE__INGEST__TOP_N`.
pub const ENV_PREFIX: &str = "REPOPULSE";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub github: GitHubConfig,
    pub limits: LimitsConfig,
    pub ingest: IngestConfig,
    pub clickhouse: StoreConfig,
}

impl Settings {
    /// Load settings from `path` (must exist) or from `repopulse.toml` in the
    /// working directory (optional), overlaid with the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::from(PathBuf::from(DEFAULT_CONFIG_FILE))
                .format(FileFormat::Toml)
                .required(false),
        };

        let builder = Config::builder()
            .add_source(file)
            .add_source(environment(None));
        Self::build(builder).with_context(|| match path {
            Some(path) => format!("Failed to load settings from {}", path.display()),
            None => "Failed to load settings".to_string(),
        })
    }

    /// Same layering as [`Settings::load`] over in-memory sources.
    pub fn from_sources(toml: Option<&str>, env: config::Map<String, String>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(toml) = toml {
            builder = builder.add_source(File::from_str(toml, FileFormat::Toml));
        }
        Self::build(builder.add_source(environment(Some(env))))
    }

    fn build(builder: ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings = builder
            .build()
            .context("Invalid configuration sources")?
            .try_deserialize::<Settings>()
            .context("Configuration does not match the expected shape")?;
        Ok(settings)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.github.validate().context("[github]")?;
        self.limits.validate().context("[limits]")?;
        self.ingest.validate().context("[ingest]")?;
        self.clickhouse.validate().context("[clickhouse]")?;
        Ok(())
    }
}

fn environment(source: Option<config::Map<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
        .source(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> config::Map<String, String> {
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_without_sources() {
        let settings = Settings::from_sources(None, env(&[])).unwrap();
        assert_eq!(settings.github.api_url, "https://api.github.com");
        assert_eq!(settings.ingest.top_n, 100);
        assert_eq!(settings.limits.requests_per_window, 4500);
        assert_eq!(settings.clickhouse.port, 8123);
        assert_eq!(
            settings.clickhouse.tables.author_commits,
            "repositories_authors_commits"
        );
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let toml = r#"
            [ingest]
            language = "Rust"
            top_n = 25

            [clickhouse]
            host = "ch.internal"
            database = "github"

            [clickhouse.tables]
            repositories = "github.repositories"
        "#;
        let settings = Settings::from_sources(Some(toml), env(&[])).unwrap();
        assert_eq!(settings.ingest.language(), Some("Rust"));
        assert_eq!(settings.ingest.top_n, 25);
        // untouched keys in a partially given section keep their defaults
        assert_eq!(settings.ingest.concurrency, 8);
        assert_eq!(settings.clickhouse.host, "ch.internal");
        assert_eq!(settings.clickhouse.tables.repositories, "github.repositories");
        assert_eq!(settings.clickhouse.tables.positions, "repositories_positions");
    }

    #[test]
    fn test_environment_overrides_file() {
        let toml = r#"
            [ingest]
            top_n = 25
            language = "Go"
        "#;
        let settings = Settings::from_sources(
            Some(toml),
            env(&[
                ("REPOPULSE__INGEST__TOP_N", "40"),
                ("REPOPULSE__CLICKHOUSE__SECURE", "true"),
                ("REPOPULSE__GITHUB__TOKEN", "ghp_test"),
                ("UNRELATED__INGEST__TOP_N", "1"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.ingest.top_n, 40);
        assert_eq!(settings.ingest.language(), Some("Go"));
        assert!(settings.clickhouse.secure);
        assert_eq!(settings.github.token.as_deref(), Some("ghp_test"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(Settings::from_sources(Some("[ingest\ntop_n = "), env(&[])).is_err());
    }

    #[test]
    fn test_wrong_type_is_an_error() {
        let toml = r#"
            [ingest]
            top_n = "many"
        "#;
        assert!(Settings::from_sources(Some(toml), env(&[])).is_err());
    }

    #[test]
    fn test_validate_reports_section() {
        let toml = r#"
            [ingest]
            top_n = 0
        "#;
        let settings = Settings::from_sources(Some(toml), env(&[])).unwrap();
        let err = settings.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("[ingest]"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let path = Path::new("/nonexistent/repopulse-settings.toml");
        assert!(Settings::load(Some(path)).is_err());
    }
}
