use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, ConfigError, Environment, File, FileFormat};
use home::home_dir;
use log::debug;
use serde::Deserialize;

const CONFIG_FILE: &str = ".recipefetch/config.toml";

pub struct RecipeFetchConfig {
    pub cache_dir: Option<PathBuf>,
    pub git_binary: Option<PathBuf>,
    pub fetch_timeout: Option<Duration>,
}

impl RecipeFetchConfig {
    /// Reads `$HOME/.recipefetch/config.toml` when present, overridden by
    /// `RECIPEFETCH_*` environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let file = home_dir().map(|home| home.join(CONFIG_FILE));
        let raw_config = RawConfig::load(file.as_deref(), None)?;

        Ok(Self {
            cache_dir: raw_config.cache.dir,
            git_binary: raw_config.git.binary,
            fetch_timeout: raw_config.fetch.timeout.map(Duration::from_secs),
        })
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    git: GitConfig,
    #[serde(default)]
    fetch: FetchConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CacheConfig {
    dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct GitConfig {
    binary: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct FetchConfig {
    /// Seconds.
    timeout: Option<u64>,
}

impl RawConfig {
    fn load(file: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            debug!("Looking for configuration in {}", file.display());
            builder = builder.add_source(File::from(file).format(FileFormat::Toml).required(false));
        }
        builder
            .add_source(
                Environment::with_prefix("RECIPEFETCH")
                    .separator("_")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn load_empty() {
        let env = HashMap::from([]);
        let config = RawConfig::load(None, Some(env)).unwrap();
        assert_eq!(config, RawConfig::default())
    }

    #[test]
    fn load_environment() {
        let env = HashMap::from([
            ("RECIPEFETCH_CACHE_DIR".to_owned(), "/cache".to_owned()),
            ("RECIPEFETCH_GIT_BINARY".to_owned(), "/usr/bin/git".to_owned()),
            ("RECIPEFETCH_FETCH_TIMEOUT".to_owned(), "60".to_owned()),
        ]);
        let config = RawConfig::load(None, Some(env)).unwrap();
        assert_eq!(
            config,
            RawConfig {
                cache: CacheConfig {
                    dir: Some("/cache".into())
                },
                git: GitConfig {
                    binary: Some("/usr/bin/git".into())
                },
                fetch: FetchConfig { timeout: Some(60) },
            }
        )
    }

    #[test]
    fn environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(
            &file,
            "[cache]\ndir = \"/from/file\"\n\n[fetch]\ntimeout = 30\n",
        )
        .unwrap();
        let env = HashMap::from([("RECIPEFETCH_CACHE_DIR".to_owned(), "/from/env".to_owned())]);

        let config = RawConfig::load(Some(&file), Some(env)).unwrap();
        assert_eq!(
            config,
            RawConfig {
                cache: CacheConfig {
                    dir: Some("/from/env".into())
                },
                git: GitConfig { binary: None },
                fetch: FetchConfig { timeout: Some(30) },
            }
        )
    }

    #[test]
    fn missing_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let config =
            RawConfig::load(Some(&dir.path().join("absent.toml")), Some(HashMap::new())).unwrap();
        assert_eq!(config, RawConfig::default())
    }
}
