use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "STMTLOAD_CONFIG";
const CONFIG_FILE: &str = "stmtload.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub rules: RulesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = project_dirs()
            .map(|dirs| dirs.data_dir().join("finance.db"))
            .unwrap_or_else(|| PathBuf::from("finance.db"));
        Self { path }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// CSV sheet `rules update` reads when no file is given.
    pub sheet: Option<PathBuf>,
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "stmtload", "stmtload")
}

/// `--config`, then `$STMTLOAD_CONFIG`, then `stmtload.toml` in the user's
/// config directory.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .or_else(|| project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE)))
}

impl Config {
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Invalid configuration")
    }

    /// A missing file is not an error unless it was asked for by name.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = config_path(explicit) else {
            return Ok(Self::default());
        };
        if !path.exists() && explicit.is_none() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::parse(&content).with_context(|| format!("In {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config() {
        let config = Config::parse(
            r#"
            [database]
            path = "/srv/finance/finance.db"

            [rules]
            sheet = "config/mapping-rules.csv"
            "#,
        )
        .unwrap();
        assert_eq!(config.database.path, PathBuf::from("/srv/finance/finance.db"));
        assert_eq!(config.rules.sheet, Some(PathBuf::from("config/mapping-rules.csv")));
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config = Config::parse("[rules]\n").unwrap();
        assert!(config.database.path.ends_with("finance.db"));
        assert_eq!(config.rules.sheet, None);
    }

    #[test]
    fn explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[database]\npath = \"x.db\"\n").unwrap();

        assert_eq!(config_path(Some(&path)), Some(path.clone()));
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.database.path, PathBuf::from("x.db"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(Config::parse("[database]\npath = 3\n").is_err());
    }
}
