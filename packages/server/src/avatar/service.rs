use std::sync::Arc;

use chrono::Utc;
use common::storage::{BlobId, BlobStore, StorageError, StoredBlob};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use super::error::AvatarError;
use super::locks::KeyedLocks;
use super::repository::{AvatarRecord, AvatarRepository, RepositoryError};
use crate::imaging::{self, ImageKind, ImagingError, Mask, ResizeSpec};

/// Which of an avatar's two images a read refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarImage {
    Original,
    Thumbnail,
}

impl AvatarImage {
    fn select(self, record: &AvatarRecord) -> BlobId {
        match self {
            Self::Original => record.origin,
            Self::Thumbnail => record.thumb,
        }
    }
}

/// Largest width, height or square size a resized read may ask for unless
/// configured otherwise.
pub const DEFAULT_MAX_RESIZE_DIMENSION: u32 = 4096;

/// Owns every avatar's origin/thumbnail blob pair.
///
/// Mutations of one avatar id are serialized in-process by [`KeyedLocks`]
/// and committed with compare-and-set record updates. New blobs are always
/// written before the record points at them, and superseded blobs are only
/// deleted once the record no longer does.
pub struct AvatarService {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn AvatarRepository>,
    locks: KeyedLocks,
    max_resize_dimension: u32,
}

impl AvatarService {
    pub fn new(blobs: Arc<dyn BlobStore>, records: Arc<dyn AvatarRepository>) -> Self {
        Self {
            blobs,
            records,
            locks: KeyedLocks::new(),
            max_resize_dimension: DEFAULT_MAX_RESIZE_DIMENSION,
        }
    }

    pub fn with_max_resize_dimension(mut self, max: u32) -> Self {
        self.max_resize_dimension = max;
        self
    }

    pub async fn get(&self, id: &str) -> Result<AvatarRecord, AvatarError> {
        Ok(self.records.find(id).await?)
    }

    /// Store a first image for `id`.
    ///
    /// Without a mask the upload is stored once, byte for byte, and serves as
    /// both origin and thumbnail. With a mask the upload is decoded once and
    /// both the re-encoded image and its crop are stored.
    pub async fn create(
        &self,
        id: &str,
        filename: &str,
        bytes: Vec<u8>,
        mask: Option<Mask>,
    ) -> Result<AvatarRecord, AvatarError> {
        let _guard = self.locks.lock(id).await;

        match self.records.find(id).await {
            Ok(_) => return Err(AvatarError::AlreadyExists(id.to_string())),
            Err(e) => match AvatarError::from(e) {
                AvatarError::NotFound(_) => {}
                other => return Err(other),
            },
        }

        let (origin, thumb) = self.store_image(filename, bytes, mask).await?;
        let record = AvatarRecord::new(id, origin, thumb);
        if let Err(e) = self.records.insert(&record).await {
            self.discard(&fresh_blobs(origin, thumb)).await;
            return Err(e.into());
        }

        info!(avatar_id = %id, %origin, %thumb, "avatar created");
        Ok(record)
    }

    /// Swap the image of an existing avatar for a new upload.
    pub async fn replace(
        &self,
        id: &str,
        filename: &str,
        bytes: Vec<u8>,
        mask: Option<Mask>,
    ) -> Result<AvatarRecord, AvatarError> {
        let _guard = self.locks.lock(id).await;
        let current = self.records.find(id).await?;

        let (origin, thumb) = self.store_image(filename, bytes, mask).await?;
        let updated = AvatarRecord {
            origin,
            thumb,
            updated_at: Utc::now(),
            ..current.clone()
        };
        let outcome = self.records.replace_blobs(id, &current, origin, thumb).await;
        self.commit(id, outcome, &fresh_blobs(origin, thumb)).await?;

        self.release(id, current.origin).await;
        if !current.is_aliased() {
            self.release(id, current.thumb).await;
        }

        info!(avatar_id = %id, %origin, %thumb, "avatar replaced");
        Ok(updated)
    }

    /// Crop a new thumbnail out of the stored origin. The origin blob is
    /// never modified.
    pub async fn change_mask(&self, id: &str, mask: Mask) -> Result<AvatarRecord, AvatarError> {
        let _guard = self.locks.lock(id).await;
        let current = self.records.find(id).await?;

        let (origin_info, origin_bytes) = self.blobs.get(&current.origin).await?;
        let (cropped, kind) = run_blocking(move || {
            let decoded = imaging::decode(&origin_bytes)?;
            let rect = mask.resolve(decoded.image.width(), decoded.image.height())?;
            let cropped = imaging::crop(&decoded.image, rect)?;
            Ok((imaging::encode(&cropped, decoded.kind)?, decoded.kind))
        })
        .await?;

        let thumb = self
            .blobs
            .put_derived(&thumb_name(&origin_info.name), kind.mime_type(), &cropped)
            .await?
            .id;
        let updated = AvatarRecord {
            thumb,
            updated_at: Utc::now(),
            ..current.clone()
        };
        let outcome = self.records.set_thumb(id, current.thumb, thumb).await;
        self.commit(id, outcome, &[thumb]).await?;

        if !current.is_aliased() {
            self.release(id, current.thumb).await;
        }

        info!(avatar_id = %id, origin = %current.origin, %thumb, "avatar mask changed");
        Ok(updated)
    }

    /// Remove both blobs, then the record.
    ///
    /// Blobs that are already gone are skipped, so retrying a delete that
    /// failed halfway still reaches the absent state.
    pub async fn delete(&self, id: &str) -> Result<(), AvatarError> {
        let _guard = self.locks.lock(id).await;
        let current = self.records.find(id).await?;

        self.remove_blob(id, current.origin).await?;
        if !current.is_aliased() {
            self.remove_blob(id, current.thumb).await?;
        }
        if !self.records.delete(id).await? {
            warn!(avatar_id = %id, "avatar record vanished during delete");
        }

        info!(avatar_id = %id, origin = %current.origin, thumb = %current.thumb, "avatar deleted");
        Ok(())
    }

    /// Open one of the avatar's stored images unchanged.
    ///
    /// Reads take no lock. A blob that vanished between reading the record
    /// and opening it was released by a concurrent mutation, so the record
    /// is read once more and the new blob opened instead.
    pub async fn read(&self, id: &str, which: AvatarImage) -> Result<StoredBlob, AvatarError> {
        let seen = which.select(&self.records.find(id).await?);
        match self.blobs.open(&seen).await {
            Err(e) if e.is_not_found() => {
                let current = which.select(&self.records.find(id).await?);
                if current == seen {
                    return Err(e.into());
                }
                debug!(avatar_id = %id, released = %seen, %current, "blob replaced during read");
                Ok(self.blobs.open(&current).await?)
            }
            opened => Ok(opened?),
        }
    }

    /// Decode, resize and re-encode one of the avatar's images. The result is
    /// never stored.
    pub async fn read_resized(
        &self,
        id: &str,
        which: AvatarImage,
        spec: ResizeSpec,
    ) -> Result<(Vec<u8>, ImageKind), AvatarError> {
        let spec = spec.validate(self.max_resize_dimension)?;
        let StoredBlob { info, mut reader } = self.read(id, which).await?;
        let mut bytes = Vec::with_capacity(usize::try_from(info.size).unwrap_or(0));
        reader.read_to_end(&mut bytes).await.map_err(StorageError::from)?;
        run_blocking(move || imaging::resize::resize_encoded(&bytes, spec)).await
    }

    /// Write the blobs for a fresh upload and return `(origin, thumb)`.
    ///
    /// Only an unmasked upload is stored under the blob store's size limit.
    /// The re-encoded original and its crop are derived from an upload that
    /// was already accepted and may come out larger than it.
    async fn store_image(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        mask: Option<Mask>,
    ) -> Result<(BlobId, BlobId), AvatarError> {
        let Some(mask) = mask else {
            let kind = imaging::sniff(&bytes)?;
            let id = self.blobs.put(filename, kind.mime_type(), &bytes).await?.id;
            return Ok((id, id));
        };

        let (full, cropped, kind) = run_blocking(move || {
            let decoded = imaging::decode(&bytes)?;
            let rect = mask.resolve(decoded.image.width(), decoded.image.height())?;
            let cropped = imaging::crop(&decoded.image, rect)?;
            Ok((
                imaging::encode(&decoded.image, decoded.kind)?,
                imaging::encode(&cropped, decoded.kind)?,
                decoded.kind,
            ))
        })
        .await?;

        let origin = self
            .blobs
            .put_derived(filename, kind.mime_type(), &full)
            .await?
            .id;
        match self
            .blobs
            .put_derived(&thumb_name(filename), kind.mime_type(), &cropped)
            .await
        {
            Ok(info) => Ok((origin, info.id)),
            Err(e) => {
                self.discard_blob(origin).await;
                Err(e.into())
            }
        }
    }

    /// Turn the outcome of a compare-and-set update into a result. When the
    /// update did not land, `fresh` (blobs written for it) are dropped again.
    async fn commit(
        &self,
        id: &str,
        outcome: Result<bool, RepositoryError>,
        fresh: &[BlobId],
    ) -> Result<(), AvatarError> {
        let err = match outcome {
            Ok(true) => return Ok(()),
            Ok(false) => AvatarError::Conflict(id.to_string()),
            Err(e) => e.into(),
        };
        self.discard(fresh).await;
        Err(err)
    }

    async fn discard(&self, fresh: &[BlobId]) {
        for blob in fresh {
            self.discard_blob(*blob).await;
        }
    }

    async fn discard_blob(&self, blob: BlobId) {
        if let Err(e) = self.blobs.delete(&blob).await {
            warn!(%blob, error = %e, "failed to discard uncommitted blob");
        }
    }

    /// Delete a blob the record no longer references. The update has
    /// already been committed, so failures only leak storage.
    async fn release(&self, id: &str, blob: BlobId) {
        match self.blobs.delete(&blob).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!(avatar_id = %id, %blob, "superseded blob was already missing");
            }
            Err(e) => {
                warn!(avatar_id = %id, %blob, error = %e, "failed to delete superseded blob");
            }
        }
    }

    async fn remove_blob(&self, id: &str, blob: BlobId) -> Result<(), StorageError> {
        match self.blobs.delete(&blob).await {
            Err(e) if e.is_not_found() => {
                warn!(avatar_id = %id, %blob, "blob was already missing");
                Ok(())
            }
            other => other,
        }
    }
}

/// Blobs written for one upload, counting an aliased pair once.
fn fresh_blobs(origin: BlobId, thumb: BlobId) -> Vec<BlobId> {
    if origin == thumb {
        vec![origin]
    } else {
        vec![origin, thumb]
    }
}

fn thumb_name(filename: &str) -> String {
    format!("thumb_{filename}")
}

async fn run_blocking<T, F>(f: F) -> Result<T, AvatarError>
where
    F: FnOnce() -> Result<T, ImagingError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AvatarError::Internal(format!("image task failed: {e}")))?
        .map_err(AvatarError::from)
}
