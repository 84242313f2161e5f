//! Photo upload queue.
//!
//! Photos are compressed and uploaded outside the record sync cycle. A batch
//! hands back one placeholder per image right away; the owning record stores
//! the placeholders as `Pending` refs and the batch result later patches them
//! to `Uploaded` or `Failed`.

mod compress;
mod storage;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinSet;

use crate::config::SyncConfig;
use crate::error::{Error as CoreError, Result};
use crate::models::{new_placeholder, EntityKind, PhotoRef, Record, RecordId};
use crate::remote::{ErrorClass, RemoteError};
use crate::retry::{retry_async, RetryPolicy};

pub use compress::{compress_photo, CompressedPhoto, CompressionOptions, JPEG_CONTENT_TYPE};
pub use storage::{InMemoryPhotoStorage, SupabaseStorage};

#[cfg(test)]
pub(crate) use compress::tests::source_png as test_png;

/// Errors from a single photo upload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PhotoError {
    /// The image could not be decoded or encoded; retrying will not help
    #[error("Photo could not be prepared: {0}")]
    Invalid(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl PhotoError {
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Remote(error) if matches!(error.class(), ErrorClass::Transient))
    }
}

/// Object storage accepting compressed photos.
pub trait PhotoStorage: Send + Sync + 'static {
    /// Store `bytes` under `key` and return the URL the record should keep.
    fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = std::result::Result<String, PhotoError>> + Send;
}

/// Image picked by the user, as raw encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    pub bytes: Vec<u8>,
}

impl LocalImage {
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_bytes(std::fs::read(path)?))
    }
}

/// Record that owns uploaded photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhotoOwner {
    pub kind: EntityKind,
    pub record_id: RecordId,
}

impl PhotoOwner {
    pub const fn new(kind: EntityKind, record_id: RecordId) -> Self {
        Self { kind, record_id }
    }

    pub const fn log(record_id: RecordId) -> Self {
        Self::new(EntityKind::Log, record_id)
    }

    pub const fn trip(record_id: RecordId) -> Self {
        Self::new(EntityKind::Trip, record_id)
    }
}

/// Resolution of one queued photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoOutcome {
    Uploaded { placeholder: String, url: String },
    Failed { placeholder: String, reason: String },
}

impl PhotoOutcome {
    pub fn placeholder(&self) -> &str {
        match self {
            Self::Uploaded { placeholder, .. } | Self::Failed { placeholder, .. } => placeholder,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Uploaded { url, .. } => Some(url),
            Self::Failed { .. } => None,
        }
    }

    /// The reference this outcome resolves its placeholder to.
    fn resolved_ref(&self) -> PhotoRef {
        match self {
            Self::Uploaded { url, .. } => PhotoRef::Uploaded { url: url.clone() },
            Self::Failed { placeholder, .. } => PhotoRef::Failed {
                placeholder: placeholder.clone(),
            },
        }
    }
}

/// Every outcome of one batch, in the order the images were queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoBatchResult {
    pub owner: PhotoOwner,
    pub outcomes: Vec<PhotoOutcome>,
}

impl PhotoBatchResult {
    pub fn uploaded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.url().is_some())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.uploaded()
    }
}

/// Handle on a running batch; resolves once every job resolved.
#[derive(Debug)]
pub struct PhotoBatch {
    owner: PhotoOwner,
    placeholders: Vec<String>,
    done: oneshot::Receiver<Vec<PhotoOutcome>>,
}

impl PhotoBatch {
    pub const fn owner(&self) -> PhotoOwner {
        self.owner
    }

    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    pub async fn wait(self) -> PhotoBatchResult {
        let outcomes = match self.done.await {
            Ok(outcomes) => outcomes,
            // Runtime shut down underneath the batch
            Err(_) => self
                .placeholders
                .into_iter()
                .map(|placeholder| PhotoOutcome::Failed {
                    placeholder,
                    reason: "upload was cancelled".to_string(),
                })
                .collect(),
        };
        PhotoBatchResult {
            owner: self.owner,
            outcomes,
        }
    }
}

struct QueueInner<S> {
    storage: S,
    permits: Semaphore,
    compression: CompressionOptions,
    retry: RetryPolicy,
    timeout: Duration,
}

/// Concurrent, bounded photo uploader. Clones share the concurrency limit.
pub struct PhotoUploadQueue<S> {
    inner: Arc<QueueInner<S>>,
}

impl<S> Clone for PhotoUploadQueue<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: PhotoStorage> PhotoUploadQueue<S> {
    pub fn new(storage: S, config: &SyncConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                storage,
                permits: Semaphore::new(config.max_concurrent_uploads.max(1)),
                compression: config.compression(),
                retry: config.retry.clone(),
                timeout: config.request_timeout(),
            }),
        }
    }

    pub fn storage(&self) -> &S {
        &self.inner.storage
    }

    /// Start uploading `images` for `owner`.
    ///
    /// Returns immediately with one placeholder per image (same order) and
    /// the batch handle. Must be called from within a tokio runtime.
    pub fn queue_batch_upload(
        &self,
        images: Vec<LocalImage>,
        owner: PhotoOwner,
    ) -> (Vec<String>, PhotoBatch) {
        let jobs: Vec<(String, LocalImage)> = images
            .into_iter()
            .map(|image| (new_placeholder(), image))
            .collect();
        let placeholders = jobs.iter().map(|(placeholder, _)| placeholder.clone()).collect();
        (placeholders, self.spawn_batch(jobs, owner))
    }

    /// Upload a single photo and wait for it.
    pub async fn upload_photo(&self, image: LocalImage, owner: PhotoOwner) -> Option<String> {
        match upload_job(Arc::clone(&self.inner), owner, new_placeholder(), image).await {
            PhotoOutcome::Uploaded { url, .. } => Some(url),
            PhotoOutcome::Failed { .. } => None,
        }
    }

    /// Re-upload one image under an existing placeholder (manual retry of a
    /// failed photo).
    pub fn retry_upload(&self, image: LocalImage, owner: PhotoOwner, placeholder: String) -> PhotoBatch {
        tracing::info!("Retrying photo upload {placeholder} for {} {}", owner.kind, owner.record_id);
        self.spawn_batch(vec![(placeholder, image)], owner)
    }

    fn spawn_batch(&self, jobs: Vec<(String, LocalImage)>, owner: PhotoOwner) -> PhotoBatch {
        let placeholders: Vec<String> = jobs.iter().map(|(placeholder, _)| placeholder.clone()).collect();
        let (done_tx, done_rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let mut outcomes: Vec<PhotoOutcome> = placeholders
            .iter()
            .map(|placeholder| PhotoOutcome::Failed {
                placeholder: placeholder.clone(),
                reason: "upload task aborted".to_string(),
            })
            .collect();

        tokio::spawn(async move {
            let mut set = JoinSet::new();
            for (index, (placeholder, image)) in jobs.into_iter().enumerate() {
                let inner = Arc::clone(&inner);
                set.spawn(async move { (index, upload_job(inner, owner, placeholder, image).await) });
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((index, outcome)) => outcomes[index] = outcome,
                    Err(error) => tracing::error!("Photo upload task failed: {error}"),
                }
            }
            let uploaded = outcomes.iter().filter(|outcome| outcome.url().is_some()).count();
            tracing::info!(
                "Photo batch for {} {} finished: {uploaded}/{} uploaded",
                owner.kind,
                owner.record_id,
                outcomes.len()
            );
            // Receiver may have been dropped; the outcomes are then unused.
            let _ = done_tx.send(outcomes);
        });

        PhotoBatch {
            owner,
            placeholders,
            done: done_rx,
        }
    }
}

/// Compress and upload one photo, retrying transient storage errors.
async fn upload_job<S: PhotoStorage>(
    inner: Arc<QueueInner<S>>,
    owner: PhotoOwner,
    placeholder: String,
    image: LocalImage,
) -> PhotoOutcome {
    let result = async {
        let _permit = inner
            .permits
            .acquire()
            .await
            .map_err(|error| PhotoError::Invalid(error.to_string()))?;

        let options = inner.compression;
        let compressed = tokio::task::spawn_blocking(move || compress_photo(&image.bytes, options))
            .await
            .map_err(|error| PhotoError::Invalid(format!("Compression task failed: {error}")))?
            .map_err(|error| PhotoError::Invalid(error.to_string()))?;

        let key = object_key(owner, &placeholder);
        retry_async(&inner.retry, PhotoError::is_transient, |_attempt| {
            let inner = Arc::clone(&inner);
            let key = key.clone();
            let bytes = compressed.bytes.clone();
            async move {
                tokio::time::timeout(
                    inner.timeout,
                    inner.storage.upload(&key, bytes, JPEG_CONTENT_TYPE),
                )
                .await
                .unwrap_or(Err(PhotoError::Remote(RemoteError::Timeout)))
            }
        })
        .await
    }
    .await;

    match result {
        Ok(url) => {
            tracing::debug!("Uploaded photo {placeholder} -> {url}");
            PhotoOutcome::Uploaded { placeholder, url }
        }
        Err(error) => {
            tracing::warn!("Photo upload {placeholder} failed: {error}");
            PhotoOutcome::Failed {
                placeholder,
                reason: error.to_string(),
            }
        }
    }
}

/// Storage key: `<table>/<record id>/<placeholder id>.jpg`.
fn object_key(owner: PhotoOwner, placeholder: &str) -> String {
    let token = placeholder.strip_prefix("placeholder:").unwrap_or(placeholder);
    format!("{}/{}/{token}.jpg", owner.kind.table(), owner.record_id)
}

/// Add `placeholders` to `record` as pending photo refs.
///
/// Logs append them to their photo list; a trip takes a single placeholder as
/// its cover. Places carry no photos.
pub fn attach_placeholders(record: &mut Record, placeholders: &[String]) -> Result<()> {
    let pending = |placeholder: &String| PhotoRef::Pending {
        placeholder: placeholder.clone(),
    };
    match record {
        Record::Log(log) => {
            log.photos.extend(placeholders.iter().map(pending));
            Ok(())
        }
        Record::Trip(trip) => match placeholders {
            [placeholder] => {
                trip.cover_photo = Some(pending(placeholder));
                Ok(())
            }
            _ => Err(CoreError::InvalidInput(
                "A trip takes exactly one cover photo".to_string(),
            )),
        },
        Record::Place(_) => Err(CoreError::InvalidInput(
            "Places do not have photos".to_string(),
        )),
    }
}

/// Patch the unresolved refs of `record` matching `outcomes`.
///
/// Returns whether anything changed; placeholders the user removed in the
/// meantime are ignored.
pub fn apply_outcomes(record: &mut Record, outcomes: &[PhotoOutcome]) -> bool {
    let mut changed = false;
    let mut patch = |photo: &mut PhotoRef| {
        let Some(outcome) = outcomes
            .iter()
            .find(|outcome| photo.placeholder() == Some(outcome.placeholder()))
        else {
            return;
        };
        let resolved = outcome.resolved_ref();
        if *photo != resolved {
            *photo = resolved;
            changed = true;
        }
    };
    match record {
        Record::Log(log) => log.photos.iter_mut().for_each(&mut patch),
        Record::Trip(trip) => {
            if let Some(cover) = trip.cover_photo.as_mut() {
                patch(cover);
            }
        }
        Record::Place(_) => {}
    }
    changed
}
