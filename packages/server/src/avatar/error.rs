use common::storage::StorageError;
use sea_orm::DbErr;
use thiserror::Error;

use super::repository::RepositoryError;
use crate::imaging::ImagingError;

#[derive(Error, Debug)]
pub enum AvatarError {
    #[error("avatar not found: {0}")]
    NotFound(String),
    #[error("avatar already exists: {0}")]
    AlreadyExists(String),
    #[error("{0}")]
    InvalidMask(String),
    #[error("{0}")]
    InvalidSize(String),
    #[error("unsupported media type: {0}")]
    UnsupportedFormat(String),
    #[error("invalid image data: {0}")]
    Decode(String),
    /// A compare-and-set update lost against a concurrent writer.
    #[error("avatar {0} was modified concurrently")]
    Conflict(String),
    #[error(transparent)]
    Store(#[from] StorageError),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("{0}")]
    Internal(String),
}

impl From<ImagingError> for AvatarError {
    fn from(err: ImagingError) -> Self {
        match err {
            ImagingError::UnsupportedFormat(msg) => Self::UnsupportedFormat(msg),
            ImagingError::Decode(e) => Self::Decode(e.to_string()),
            ImagingError::InvalidMask(msg) => Self::InvalidMask(msg),
            ImagingError::InvalidSize(msg) => Self::InvalidSize(msg),
            ImagingError::Encode(e) => Self::Internal(format!("failed to encode image: {e}")),
        }
    }
}

impl From<RepositoryError> for AvatarError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => Self::NotFound(id),
            RepositoryError::DuplicateId(id) => Self::AlreadyExists(id),
            RepositoryError::Corrupt(id) => {
                Self::Internal(format!("avatar record {id} is corrupt"))
            }
            RepositoryError::Database(e) => Self::Database(e),
        }
    }
}
