//! Avatar lifecycle: the origin/thumbnail blob pair behind every avatar id.
//!
//! Per id, an avatar moves between three states:
//!
//! | State | Record |
//! |---|---|
//! | absent | no record |
//! | aliased | `origin == thumb`, one physical blob |
//! | cropped | `origin != thumb`, two blobs |
//!
//! Uploading without a mask yields the aliased state, with a mask or after a
//! mask change the cropped one. Every blob referenced by a live record exists,
//! and blobs are deleted once no record references them.

pub mod error;
pub mod locks;
pub mod repository;
pub mod service;

pub use error::AvatarError;
pub use locks::KeyedLocks;
pub use repository::{
    AvatarRecord, AvatarRepository, MemoryAvatarRepository, RepositoryError,
    SeaOrmAvatarRepository,
};
pub use service::{AvatarImage, AvatarService, DEFAULT_MAX_RESIZE_DIMENSION};
