use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use super::blob::{BlobId, BlobInfo, ContentHash};
use super::error::StorageError;
use super::traits::{BlobStore, BoxReader, StoredBlob};

/// Filesystem-backed blob store.
///
/// Blobs are stored in a sharded directory layout:
/// `{base_path}/{first 2 hex chars}/{remaining 30 hex chars}`, with the
/// blob's [`BlobInfo`] in a `.json` sidecar next to the data file. A blob
/// exists exactly when its data file exists; the sidecar is always written
/// first.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
    max_size: u64,
}

impl FilesystemBlobStore {
    /// Create a new filesystem blob store.
    pub async fn new(base_path: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn blob_path(&self, id: &BlobId) -> PathBuf {
        self.base_path.join(id.shard_prefix()).join(id.shard_suffix())
    }

    fn meta_path(&self, id: &BlobId) -> PathBuf {
        self.base_path
            .join(id.shard_prefix())
            .join(format!("{}.json", id.shard_suffix()))
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }

    async fn read_info(&self, id: &BlobId) -> Result<BlobInfo, StorageError> {
        match fs::read(self.meta_path(id)).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(id.to_hex()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stream `reader` into a temp file, then move it into place under a
    /// fresh id. `limit` caps the number of bytes accepted.
    async fn write_blob(
        &self,
        name: &str,
        content_type: &str,
        mut reader: BoxReader,
        limit: Option<u64>,
    ) -> Result<BlobInfo, StorageError> {
        let temp_path = self.temp_path();
        let mut temp_file = fs::File::create(&temp_path).await?;

        let spooled = spool(&mut reader, &mut temp_file, limit).await;
        drop(temp_file);
        let (total_bytes, content_hash) = match spooled {
            Ok(spooled) => spooled,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        let info = BlobInfo {
            id: BlobId::generate(),
            name: name.to_string(),
            content_type: content_type.to_string(),
            size: total_bytes,
            content_hash,
            created_at: Utc::now(),
        };

        let blob_path = self.blob_path(&info.id);
        let meta_temp = self.temp_path();
        let written = async {
            if let Some(parent) = blob_path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&meta_temp, serde_json::to_vec(&info)?).await?;
            fs::rename(&meta_temp, self.meta_path(&info.id)).await?;
            fs::rename(&temp_path, &blob_path).await?;
            Ok::<_, StorageError>(())
        }
        .await;

        if let Err(e) = written {
            tracing::warn!(blob = %info.id, error = %e, "failed to commit blob, cleaning up");
            let _ = fs::remove_file(&meta_temp).await;
            let _ = fs::remove_file(&temp_path).await;
            let _ = fs::remove_file(self.meta_path(&info.id)).await;
            return Err(e);
        }

        tracing::debug!(blob = %info.id, size = info.size, content_type, "blob stored");
        Ok(info)
    }

    /// Ids of every blob currently present in the store.
    pub async fn blob_ids(&self) -> Result<Vec<BlobId>, StorageError> {
        let mut ids = Vec::new();
        let mut shards = fs::read_dir(&self.base_path).await?;
        while let Some(shard) = shards.next_entry().await? {
            let prefix = shard.file_name().to_string_lossy().into_owned();
            if prefix == ".tmp" || !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(shard.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let suffix = entry.file_name().to_string_lossy().into_owned();
                if suffix.ends_with(".json") {
                    continue;
                }
                if let Ok(id) = BlobId::from_hex(&format!("{prefix}{suffix}")) {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put_stream(
        &self,
        name: &str,
        content_type: &str,
        reader: BoxReader,
    ) -> Result<BlobInfo, StorageError> {
        self.write_blob(name, content_type, reader, Some(self.max_size)).await
    }

    async fn put_derived(
        &self,
        name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<BlobInfo, StorageError> {
        let reader: BoxReader = Box::new(std::io::Cursor::new(data.to_vec()));
        self.write_blob(name, content_type, reader, None).await
    }

    async fn open(&self, id: &BlobId) -> Result<StoredBlob, StorageError> {
        let file = match fs::File::open(self.blob_path(id)).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id.to_hex()));
            }
            Err(e) => return Err(e.into()),
        };
        let info = self.read_info(id).await?;
        Ok(StoredBlob {
            info,
            reader: Box::new(BufReader::new(file)),
        })
    }

    async fn stat(&self, id: &BlobId) -> Result<BlobInfo, StorageError> {
        if !self.exists(id).await? {
            return Err(StorageError::NotFound(id.to_hex()));
        }
        self.read_info(id).await
    }

    async fn exists(&self, id: &BlobId) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.blob_path(id)).await?)
    }

    async fn delete(&self, id: &BlobId) -> Result<(), StorageError> {
        match fs::remove_file(self.blob_path(id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id.to_hex()));
            }
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(blob = %id, "blob deleted");
        match fs::remove_file(self.meta_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Copy `reader` into `file`, hashing as it goes. Returns the byte count
/// and the SHA-256 of the content.
async fn spool(
    reader: &mut BoxReader,
    file: &mut fs::File,
    limit: Option<u64>,
) -> Result<(u64, ContentHash), StorageError> {
    let mut hasher = Sha256::new();
    let mut total_bytes: u64 = 0;
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        total_bytes += n as u64;
        if let Some(limit) = limit
            && total_bytes > limit
        {
            return Err(StorageError::SizeLimitExceeded {
                actual: total_bytes,
                limit,
            });
        }

        hasher.update(&buf[..n]);
        file.write_all(&buf[..n]).await?;
    }

    file.flush().await?;
    Ok((total_bytes, ContentHash::from_bytes(hasher.finalize().into())))
}
