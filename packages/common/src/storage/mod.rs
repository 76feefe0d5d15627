//! Blob storage: opaque byte sequences addressed by store-assigned ids.

mod blob;
mod error;
mod traits;

pub mod filesystem;

pub use blob::{BlobId, BlobInfo, ContentHash};
pub use error::StorageError;
pub use traits::{BlobStore, BoxReader, StoredBlob};
