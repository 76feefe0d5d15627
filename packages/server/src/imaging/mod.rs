//! Image handling for avatars, built on the `image` crate.
//!
//! | Operation | Function |
//! |---|---|
//! | **Sniff** | [`codec::sniff`], magic bytes via `image::guess_format` |
//! | **Decode / encode** | [`codec::decode`] / [`codec::encode`], same container in and out |
//! | **Crop** | [`crop::crop`] over the [`crop::SubRegion`] capability |
//! | **Resize** | [`resize::resize`], Lanczos3 |
//!
//! Supported containers are JPEG, PNG, GIF and BMP.

pub mod codec;
pub mod crop;
pub mod resize;

use thiserror::Error;

pub use codec::{DecodedImage, ImageKind, decode, encode, sniff};
pub use crop::{CropRect, Mask, SubRegion, crop};
pub use resize::{ResizeSpec, resize};

#[derive(Error, Debug)]
pub enum ImagingError {
    /// The container format or the decoded pixel layout is not supported.
    #[error("unsupported media type: {0}")]
    UnsupportedFormat(String),
    /// The bytes claim a supported container but are not a valid image.
    #[error("invalid image data: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("{0}")]
    InvalidMask(String),
    #[error("{0}")]
    InvalidSize(String),
}
