//! Sync and backend configuration.
//!
//! Both structs deserialize from JSON with defaults for every omitted field,
//! so a config file only needs the values it overrides.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::photos::CompressionOptions;
use crate::retry::RetryPolicy;
use crate::util::{normalize_base_url, normalize_text_option, required_text};

/// Intervals below this drain batteries and API quotas on mobile deployments.
pub const MIN_BATTERY_FRIENDLY_INTERVAL_SECS: u64 = 30;

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 3;
const DEFAULT_PHOTO_MAX_DIMENSION: u32 = 2048;
const DEFAULT_PHOTO_MAX_BYTES: usize = 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

/// Options recognized by the sync engine and photo queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Seconds between automatic sync cycles
    pub sync_interval_secs: u64,
    /// Permit intervals below [`MIN_BATTERY_FRIENDLY_INTERVAL_SECS`]
    pub allow_fast_interval: bool,
    /// Run the background loop on `start`; disabled in test harnesses
    pub start_automatically: bool,
    /// Upper bound on concurrent photo uploads
    pub max_concurrent_uploads: usize,
    /// Longest edge of an uploaded photo, in pixels
    pub photo_max_dimension: u32,
    /// Byte budget for an uploaded photo
    pub photo_max_bytes: usize,
    /// Timeout applied to every network call
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            allow_fast_interval: false,
            start_automatically: true,
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS,
            photo_max_dimension: DEFAULT_PHOTO_MAX_DIMENSION,
            photo_max_bytes: DEFAULT_PHOTO_MAX_BYTES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Parse and validate a JSON config document.
    pub fn from_json_str(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid sync config JSON: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the automatic sync interval
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval_secs = interval.as_secs();
        self
    }

    /// Disable the background loop (manual `sync_now` only)
    #[must_use]
    pub const fn without_auto_start(mut self) -> Self {
        self.start_automatically = false;
        self
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn compression(&self) -> CompressionOptions {
        CompressionOptions {
            max_dimension: self.photo_max_dimension,
            max_bytes: self.photo_max_bytes,
            ..CompressionOptions::DEFAULT
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_secs == 0 {
            return Err(Error::Config("sync_interval_secs must be positive".into()));
        }
        if self.sync_interval_secs < MIN_BATTERY_FRIENDLY_INTERVAL_SECS && !self.allow_fast_interval
        {
            return Err(Error::Config(format!(
                "sync_interval_secs below {MIN_BATTERY_FRIENDLY_INTERVAL_SECS} requires allow_fast_interval"
            )));
        }
        if self.max_concurrent_uploads == 0 {
            return Err(Error::Config(
                "max_concurrent_uploads must be at least 1".into(),
            ));
        }
        if self.photo_max_dimension == 0 || self.photo_max_bytes == 0 {
            return Err(Error::Config(
                "photo compression limits must be positive".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be positive".into()));
        }
        self.retry.validate()
    }
}

/// Connection settings for the Supabase project backing remote sync.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub supabase_url: String,
    pub anon_key: String,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Owner of every pushed row and filter for pulls
    pub user_id: String,
    #[serde(default = "default_photo_bucket")]
    pub photo_bucket: String,
}

fn default_photo_bucket() -> String {
    "photos".to_string()
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BackendConfig")
            .field("supabase_url", &self.supabase_url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user_id", &self.user_id)
            .field("photo_bucket", &self.photo_bucket)
            .finish()
    }
}

impl BackendConfig {
    /// Return a normalized copy, or the first invalid field.
    pub fn validated(&self) -> Result<Self> {
        let supabase_url =
            normalize_base_url(&self.supabase_url, "supabase_url").map_err(Error::Config)?;
        let anon_key = required_text(&self.anon_key, "anon_key").map_err(Error::Config)?;
        let user_id = required_text(&self.user_id, "user_id").map_err(Error::Config)?;
        let photo_bucket =
            required_text(&self.photo_bucket, "photo_bucket").map_err(Error::Config)?;
        Ok(Self {
            supabase_url,
            anon_key,
            access_token: normalize_text_option(self.access_token.clone()),
            user_id,
            photo_bucket,
        })
    }
}
