//! Photo object storage backends.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use reqwest::Client;

use crate::config::BackendConfig;
use crate::remote::{map_transport_error, parse_api_error, RemoteError};

use super::{PhotoError, PhotoStorage};

/// Supabase Storage client (`/storage/v1`).
///
/// Objects are written with `x-upsert` so re-uploading the same key after a
/// lost response is harmless. The returned URL is the bucket's public URL.
#[derive(Clone)]
pub struct SupabaseStorage {
    storage_url: String,
    bucket: String,
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
    client: Client,
}

impl std::fmt::Debug for SupabaseStorage {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SupabaseStorage")
            .field("storage_url", &self.storage_url)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl SupabaseStorage {
    pub fn new(config: &BackendConfig, timeout: Duration) -> crate::Result<Self> {
        let config = config.validated()?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| crate::Error::Config(format!("Failed to build HTTP client: {error}")))?;
        Ok(Self {
            storage_url: format!("{}/storage/v1", config.supabase_url),
            bucket: config.photo_bucket,
            anon_key: config.anon_key,
            access_token: Arc::new(RwLock::new(config.access_token)),
            client,
        })
    }

    pub fn set_access_token(&self, token: impl Into<String>) {
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/object/{}/{}", self.storage_url, self.bucket, encode_key(key))
    }

    /// Public URL of an uploaded object.
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/object/public/{}/{}",
            self.storage_url,
            self.bucket,
            encode_key(key)
        )
    }
}

/// Percent-encode each path segment, keeping the separators.
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl PhotoStorage for SupabaseStorage {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, PhotoError> {
        let token = self
            .access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.anon_key.clone());

        let response = self
            .client
            .post(self.object_url(key))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status.as_u16(), parse_api_error(status, &body)).into());
        }
        Ok(self.public_url(key))
    }
}

/// In-process photo storage with scripted failures.
#[derive(Clone, Default)]
pub struct InMemoryPhotoStorage {
    inner: Arc<MemoryStorageInner>,
}

#[derive(Default)]
struct MemoryStorageInner {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failures: Mutex<VecDeque<PhotoError>>,
    offline: AtomicBool,
    uploads: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryPhotoStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next upload call (in call order) with `error`.
    pub fn fail_next(&self, error: PhotoError) {
        self.inner
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects().get(key).cloned()
    }

    pub fn objects(&self) -> BTreeMap<String, Vec<u8>> {
        self.inner
            .objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Upload calls received, including failed ones.
    pub fn upload_count(&self) -> usize {
        self.inner.uploads.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn url_for(key: &str) -> String {
        format!("memory://photos/{key}")
    }
}

impl PhotoStorage for InMemoryPhotoStorage {
    async fn upload(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String, PhotoError> {
        let inner = &self.inner;
        inner.uploads.fetch_add(1, Ordering::SeqCst);
        let now = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // Let other uploads start so concurrency limits are observable.
        tokio::task::yield_now().await;

        let result = if inner.offline.load(Ordering::SeqCst) {
            Err(RemoteError::Unreachable("storage is offline".to_string()).into())
        } else if let Some(error) = inner
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            Err(error)
        } else {
            inner
                .objects
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key.to_string(), bytes);
            Ok(Self::url_for(key))
        };

        inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
