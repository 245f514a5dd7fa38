use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use tracing::debug;

use crate::{
    gateway::BackendGateway, BlobStore, DeleteConfirmation, Error, LocalGateway, MemoryGateway,
    Result,
};

/// The environment variable naming the configuration section to use when
/// none is specified explicitly.
pub const ENV_LGN_BLOB_STORE_SECTION: &str = "LGN_BLOB_STORE_SECTION";

static DEFAULT_FILENAME: &str = "legion.toml";
static ROOT_SECTION: &str = "blob_store";

/// The configuration of the blob-store.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub delete_confirmation: DeleteConfirmationConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    Memory {},
    Local(LocalBackendConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Memory {}
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LocalBackendConfig {
    pub path: PathBuf,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DeleteConfirmationConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for DeleteConfirmationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl DeleteConfirmationConfig {
    /// Returns the delete-confirmation policy for this configuration.
    ///
    /// # Errors
    ///
    /// If `max_attempts` is zero, or if the maximum backoff is shorter than the
    /// initial one, `Error::InvalidOption` is returned.
    pub fn policy(&self) -> Result<DeleteConfirmation> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidOption(
                "delete_confirmation.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(Error::InvalidOption(format!(
                "delete_confirmation.max_backoff_ms ({}) is shorter than initial_backoff_ms ({})",
                self.max_backoff_ms, self.initial_backoff_ms
            )));
        }

        Ok(DeleteConfirmation {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        })
    }
}

impl Config {
    /// Returns the configuration from the `legion.toml`, using the section
    /// named by `LGN_BLOB_STORE_SECTION` if it is set.
    ///
    /// Without a `blob_store` section at all, the default configuration is
    /// returned.
    ///
    /// # Errors
    ///
    /// If a named section does not exist, `Error::MissingConfigurationSection`
    /// is returned.
    ///
    /// If the configuration section is invalid, `Error::Configuration` is
    /// returned.
    pub fn load() -> Result<Self> {
        let section = std::env::var(ENV_LGN_BLOB_STORE_SECTION).ok();

        Self::load_section(section.as_deref())
    }

    /// Returns the configuration from the `legion.toml`, with the specified
    /// section.
    ///
    /// Sources are merged in order, later ones taking precedence:
    ///
    /// - The closest `legion.toml` in the current working directory or one of
    /// its ancestors.
    /// - Any file specified in the `LGN_CONFIG` environment variable.
    /// - Environment variables, starting with `LGN_`, with `__` as the key
    /// separator (`LGN_BLOB_STORE__BACKEND__TYPE=local`).
    ///
    /// # Errors
    ///
    /// If the specified configuration section does not exist,
    /// `Error::MissingConfigurationSection` is returned.
    ///
    /// If the configuration section is invalid, `Error::Configuration` is
    /// returned.
    pub fn load_section(section: Option<&str>) -> Result<Self> {
        let current_dir = std::env::current_dir()
            .map_err(|err| Error::Fatal(anyhow::anyhow!("no current directory: {}", err)))?;

        Self::from_figment(&figment_from_directory(&current_dir), section)
    }

    /// Returns the configuration from a TOML document, with the specified
    /// section.
    ///
    /// # Errors
    ///
    /// See [`Config::load_section`].
    pub fn from_toml(toml: &str, section: Option<&str>) -> Result<Self> {
        Self::from_figment(&Figment::new().merge(Toml::string(toml)), section)
    }

    fn from_figment(figment: &Figment, section: Option<&str>) -> Result<Self> {
        let key = match section {
            Some(section) => format!("{}.{}", ROOT_SECTION, section),
            None => ROOT_SECTION.to_string(),
        };

        if !figment.contains(&key) {
            return match section {
                Some(section) => Err(Error::MissingConfigurationSection {
                    section: section.to_string(),
                }),
                None => Ok(Self::default()),
            };
        }

        let config: Self = figment.extract_inner(&key).map_err(Box::new)?;

        // Catch an invalid policy at load time rather than on first use.
        config.delete_confirmation.policy()?;

        debug!("loaded blob-store configuration from `{}`", key);

        Ok(config)
    }

    /// Instantiate the gateway for the configuration.
    ///
    /// # Errors
    ///
    /// This function will return an error if the gateway cannot be instantiated.
    pub async fn instantiate_gateway(&self) -> Result<Box<dyn BackendGateway + Send + Sync>> {
        Ok(match &self.backend {
            BackendConfig::Memory {} => Box::new(MemoryGateway::new()),
            BackendConfig::Local(config) => Box::new(LocalGateway::new(&config.path).await?),
        })
    }

    /// Instantiate a blob store for the configuration, with its configured
    /// delete-confirmation policy.
    ///
    /// # Errors
    ///
    /// This function will return an error if the gateway cannot be instantiated
    /// or the policy is invalid.
    pub async fn instantiate_blob_store(
        &self,
    ) -> Result<BlobStore<Box<dyn BackendGateway + Send + Sync>>> {
        let policy = self.delete_confirmation.policy()?;

        Ok(BlobStore::new(self.instantiate_gateway().await?).with_delete_confirmation(policy))
    }
}

fn figment_from_directory(path: &Path) -> Figment {
    let mut figment = Figment::new();

    // Only the closest file is read.
    for dir in path.ancestors() {
        let config_file_path = dir.join(DEFAULT_FILENAME);

        if std::fs::metadata(&config_file_path).is_ok() {
            figment = figment.merge(Toml::file(config_file_path));
            break;
        }
    }

    if let Some(config_file_path) = std::env::var_os("LGN_CONFIG") {
        figment = figment.merge(Toml::file(config_file_path));
    }

    figment.merge(Env::prefixed("LGN_").split("__"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_backend() {
        let config = Config::from_toml(
            r#"
            [blob_store.backend]
            type = "local"
            path = "./blobs"
            "#,
            None,
        )
        .expect("failed to read configuration");

        assert_eq!(
            config,
            Config {
                backend: BackendConfig::Local(LocalBackendConfig {
                    path: PathBuf::from("./blobs"),
                }),
                delete_confirmation: DeleteConfirmationConfig::default(),
            }
        );
    }

    #[test]
    fn test_parse_delete_confirmation() {
        let config = Config::from_toml(
            r#"
            [blob_store.backend]
            type = "memory"

            [blob_store.delete_confirmation]
            max_attempts = 3
            initial_backoff_ms = 10
            "#,
            None,
        )
        .unwrap();

        assert_eq!(config.backend, BackendConfig::Memory {});
        assert_eq!(
            config.delete_confirmation.policy().unwrap(),
            DeleteConfirmation {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_secs(2),
            }
        );
    }

    #[test]
    fn test_parse_named_section() {
        let toml = r#"
            [blob_store.backend]
            type = "memory"

            [blob_store.archive.backend]
            type = "local"
            path = "/var/blobs"
            "#;

        let config = Config::from_toml(toml, Some("archive")).unwrap();

        assert_eq!(
            config.backend,
            BackendConfig::Local(LocalBackendConfig {
                path: PathBuf::from("/var/blobs"),
            })
        );

        assert!(matches!(
            Config::from_toml(toml, Some("missing")),
            Err(Error::MissingConfigurationSection { section }) if section == "missing"
        ));
    }

    #[test]
    fn test_missing_root_section_is_default() {
        let config = Config::from_toml("[other]\nkey = 1\n", None).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(
            Config::from_toml(
                r#"
                [blob_store.backend]
                type = "carrier-pigeon"
                "#,
                None,
            ),
            Err(Error::Configuration(_))
        ));

        assert!(matches!(
            Config::from_toml(
                r#"
                [blob_store.delete_confirmation]
                max_attempts = 0
                "#,
                None,
            ),
            Err(Error::InvalidOption(_))
        ));
    }

    #[tokio::test]
    async fn test_instantiate_blob_store() {
        let config = Config::from_toml(
            r#"
            [blob_store.delete_confirmation]
            max_attempts = 2
            "#,
            None,
        )
        .unwrap();

        let blob_store = config.instantiate_blob_store().await.unwrap();

        assert_eq!(blob_store.delete_confirmation().max_attempts, 2);
        assert!(blob_store.create_container_in_location(None, "c1").await.unwrap());
        assert!(blob_store.container_exists("c1").await.unwrap());
    }
}
