use image::DynamicImage;
use image::imageops::FilterType;

use super::ImagingError;
use super::codec::{self, ImageKind};

/// How a stored image should be resized for a single response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeSpec {
    /// Scale to exactly `width` x `height`, ignoring the aspect ratio.
    Exact { width: u32, height: u32 },
    /// Scale down to fit inside a `size` x `size` square, keeping the aspect
    /// ratio. Images already inside the square are left alone.
    Fit(u32),
}

impl ResizeSpec {
    /// Reject zero-sized targets and targets larger than `max_dimension`.
    pub fn validate(self, max_dimension: u32) -> Result<Self, ImagingError> {
        let (a, b) = match self {
            Self::Exact { width, height } => (width, height),
            Self::Fit(size) => (size, size),
        };
        if a == 0 || b == 0 {
            return Err(ImagingError::InvalidSize(
                "resize dimensions must be positive".into(),
            ));
        }
        if a > max_dimension || b > max_dimension {
            return Err(ImagingError::InvalidSize(format!(
                "resize dimensions must not exceed {max_dimension}"
            )));
        }
        Ok(self)
    }
}

pub fn resize(image: &DynamicImage, spec: ResizeSpec) -> DynamicImage {
    match spec {
        ResizeSpec::Exact { width, height } => {
            image.resize_exact(width, height, FilterType::Lanczos3)
        }
        ResizeSpec::Fit(size) => {
            if image.width() <= size && image.height() <= size {
                image.clone()
            } else {
                image.resize(size, size, FilterType::Lanczos3)
            }
        }
    }
}

/// Decode `bytes`, resize, and encode again in the container the bytes came in.
pub fn resize_encoded(
    bytes: &[u8],
    spec: ResizeSpec,
) -> Result<(Vec<u8>, ImageKind), ImagingError> {
    let decoded = codec::decode(bytes)?;
    let resized = resize(&decoded.image, spec);
    Ok((codec::encode(&resized, decoded.kind)?, decoded.kind))
}
