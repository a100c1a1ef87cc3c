use std::env;
use std::path::{Path, PathBuf};

use pass_core::crypto::{CacheKey, SecretKey, UserKey};
use pass_core::storage::{DiskStore, RuntimeCapabilities, StorageBackend};
use pass_core::PassConfig;

use crate::error::CliError;

const CONFIG_PATH_ENV: &str = "PASS_CONFIG";
const API_URL_ENV: &str = "PASS_API_URL";
const UID_ENV: &str = "PASS_UID";
const ACCESS_TOKEN_ENV: &str = "PASS_ACCESS_TOKEN";
const USER_KEY_ENV: &str = "PASS_USER_KEY";
const CACHE_KEY_ENV: &str = "PASS_CACHE_KEY";

/// Session material read from the environment
pub struct Credentials {
    pub uid: String,
    pub access_token: String,
    pub user_key: UserKey,
    /// Without it the sync result is not cached locally.
    pub cache_key: Option<CacheKey>,
}

impl Credentials {
    pub fn from_env() -> Result<Self, CliError> {
        let cache_key = optional_env(CACHE_KEY_ENV)
            .map(|encoded| SecretKey::from_base64(&encoded))
            .transpose()?;
        Ok(Self {
            uid: required_env(UID_ENV)?,
            access_token: required_env(ACCESS_TOKEN_ENV)?,
            user_key: SecretKey::from_base64(&required_env(USER_KEY_ENV)?)?,
            cache_key,
        })
    }
}

/// Resolve the config from `--config`, `$PASS_CONFIG`, the platform config
/// dir, or a bare `$PASS_API_URL`, in that order.
pub async fn load_config(cli_path: Option<&Path>) -> Result<PassConfig, CliError> {
    if let Some(path) = cli_path
        .map(Path::to_path_buf)
        .or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
    {
        return Ok(PassConfig::load(path).await?);
    }

    let default_path = default_config_path();
    if tokio::fs::try_exists(&default_path).await? {
        return Ok(PassConfig::load(default_path).await?);
    }

    match optional_env(API_URL_ENV) {
        Some(url) => Ok(PassConfig::new(&url)?),
        None => Err(CliError::Config(format!(
            "no config at {}; pass --config or set {API_URL_ENV}",
            default_path.display()
        ))),
    }
}

pub fn open_store(config: &PassConfig, cli_path: Option<&Path>) -> StorageBackend {
    if let Some(path) = cli_path {
        return StorageBackend::Disk(DiskStore::new(path));
    }
    let capabilities = RuntimeCapabilities {
        data_dir: dirs::data_dir().map(|dir| dir.join("pass")),
        session_storage: false,
    };
    StorageBackend::detect(&capabilities, config)
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pass")
        .join("config.json")
}

fn required_env(name: &'static str) -> Result<String, CliError> {
    optional_env(name).ok_or(CliError::MissingCredential(name))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
