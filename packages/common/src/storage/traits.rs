use std::io::Cursor;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::blob::{BlobId, BlobInfo};
use super::error::StorageError;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// A blob opened for reading.
pub struct StoredBlob {
    pub info: BlobInfo,
    pub reader: BoxReader,
}

/// Blob storage keyed by store-assigned ids.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a fresh id.
    async fn put(
        &self,
        name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<BlobInfo, StorageError> {
        let reader: BoxReader = Box::new(Cursor::new(data.to_vec()));
        self.put_stream(name, content_type, reader).await
    }

    /// Store data from an async reader under a fresh id.
    async fn put_stream(
        &self,
        name: &str,
        content_type: &str,
        reader: BoxReader,
    ) -> Result<BlobInfo, StorageError>;

    /// Store bytes the caller derived from already accepted content, such as
    /// re-encodings and crops of an upload. The store's size limit, which
    /// guards incoming uploads, does not apply.
    async fn put_derived(
        &self,
        name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<BlobInfo, StorageError>;

    /// Retrieve the metadata and all bytes of a blob.
    async fn get(&self, id: &BlobId) -> Result<(BlobInfo, Vec<u8>), StorageError> {
        let StoredBlob { info, mut reader } = self.open(id).await?;
        let mut buf = Vec::with_capacity(usize::try_from(info.size).unwrap_or(0));
        reader.read_to_end(&mut buf).await?;
        Ok((info, buf))
    }

    /// Open a blob as a streaming async reader.
    async fn open(&self, id: &BlobId) -> Result<StoredBlob, StorageError>;

    /// Metadata of a blob without opening its content.
    async fn stat(&self, id: &BlobId) -> Result<BlobInfo, StorageError>;

    /// Check whether a blob exists.
    async fn exists(&self, id: &BlobId) -> Result<bool, StorageError>;

    /// Delete a blob.
    ///
    /// Fails with [`StorageError::NotFound`] if the blob does not exist.
    async fn delete(&self, id: &BlobId) -> Result<(), StorageError>;
}
