//! CLI configuration: JSON file first, `WAYPOINT_*` environment variables on top.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use waypoint_core::config::{BackendConfig, SyncConfig};
use waypoint_core::util::normalize_text_option;

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "config.json";
const DB_FILE_NAME: &str = "waypoint.db";

pub const ENV_SUPABASE_URL: &str = "WAYPOINT_SUPABASE_URL";
pub const ENV_ANON_KEY: &str = "WAYPOINT_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "WAYPOINT_ACCESS_TOKEN";
pub const ENV_USER_ID: &str = "WAYPOINT_USER_ID";
pub const ENV_DB_PATH: &str = "WAYPOINT_DB_PATH";

/// User id stamped on rows pushed in `--offline-demo` mode.
pub const DEMO_USER_ID: &str = "demo-user";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub supabase_url: Option<String>,
    pub anon_key: Option<String>,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
    pub photo_bucket: Option<String>,
    pub sync: SyncConfig,
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("waypoint")
        .join(CONFIG_FILE_NAME)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("waypoint")
        .join(DB_FILE_NAME)
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| std::env::var_os(ENV_DB_PATH).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

impl CliConfig {
    /// Load the config file (if any) and apply the process environment.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, CliError> {
        let mut config = match explicit_path {
            Some(path) => Self::load_from_path(path, true)?,
            None => Self::load_from_path(&default_config_path(), false)?,
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// A missing file is only an error when the user named it.
    pub fn load_from_path(path: &Path, required: bool) -> Result<Self, CliError> {
        if !path.exists() {
            if required {
                return Err(CliError::Config(format!(
                    "Config file {} does not exist",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            CliError::Config(format!("Failed to parse config at {}: {error}", path.display()))
        })?;
        config
            .sync
            .validate()
            .map_err(|error| CliError::Config(error.to_string()))?;
        Ok(config.normalized())
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let overrides = [
            (ENV_SUPABASE_URL, &mut self.supabase_url),
            (ENV_ANON_KEY, &mut self.anon_key),
            (ENV_ACCESS_TOKEN, &mut self.access_token),
            (ENV_USER_ID, &mut self.user_id),
        ];
        for (key, slot) in overrides {
            if let Some(value) = normalize_text_option(lookup(key)) {
                *slot = Some(value);
            }
        }
    }

    fn normalized(mut self) -> Self {
        self.supabase_url = normalize_text_option(self.supabase_url);
        self.anon_key = normalize_text_option(self.anon_key);
        self.access_token = normalize_text_option(self.access_token);
        self.user_id = normalize_text_option(self.user_id);
        self.photo_bucket = normalize_text_option(self.photo_bucket);
        self
    }

    /// Backend settings, or `SyncNotConfigured` when a required value is unset.
    pub fn backend_config(&self) -> Result<BackendConfig, CliError> {
        let (Some(supabase_url), Some(anon_key), Some(user_id)) =
            (&self.supabase_url, &self.anon_key, &self.user_id)
        else {
            return Err(CliError::SyncNotConfigured);
        };
        let mut backend = BackendConfig {
            supabase_url: supabase_url.clone(),
            anon_key: anon_key.clone(),
            access_token: self.access_token.clone(),
            user_id: user_id.clone(),
            photo_bucket: "photos".to_string(),
        };
        if let Some(bucket) = &self.photo_bucket {
            backend.photo_bucket.clone_from(bucket);
        }
        Ok(backend.validated()?)
    }
}
