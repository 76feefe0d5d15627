use std::borrow::Cow;
use std::io::Cursor;

use image::{DynamicImage, ImageError, ImageFormat};

use super::ImagingError;

/// Container formats an avatar may be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Bmp,
}

impl ImageKind {
    pub fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::Bmp => Some(Self::Bmp),
            _ => None,
        }
    }

    pub fn format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::Gif => ImageFormat::Gif,
            Self::Bmp => ImageFormat::Bmp,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
        }
    }
}

/// A decoded image together with the container it came from.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub kind: ImageKind,
}

/// Detect the container format from the leading bytes. File names play no
/// part in this.
pub fn sniff(bytes: &[u8]) -> Result<ImageKind, ImagingError> {
    let format = image::guess_format(bytes)
        .map_err(|_| ImagingError::UnsupportedFormat("unrecognized image data".into()))?;
    ImageKind::from_format(format).ok_or_else(|| {
        ImagingError::UnsupportedFormat(format!("{} images are not supported", format_name(format)))
    })
}

pub fn decode(bytes: &[u8]) -> Result<DecodedImage, ImagingError> {
    let kind = sniff(bytes)?;
    let image = image::load_from_memory_with_format(bytes, kind.format()).map_err(|e| match e {
        ImageError::Unsupported(inner) => ImagingError::UnsupportedFormat(inner.to_string()),
        other => ImagingError::Decode(other),
    })?;
    Ok(DecodedImage { image, kind })
}

/// Serialize `image` in the given container.
///
/// Sample layouts the container cannot hold are converted to the closest one
/// it can: JPEG holds L8/RGB8, BMP holds 8-bit samples, GIF holds RGBA8, PNG
/// holds everything but floats.
pub fn encode(image: &DynamicImage, kind: ImageKind) -> Result<Vec<u8>, ImagingError> {
    let storable = storable_layout(image, kind);
    let mut out = Cursor::new(Vec::new());
    storable
        .write_to(&mut out, kind.format())
        .map_err(ImagingError::Encode)?;
    Ok(out.into_inner())
}

fn storable_layout(image: &DynamicImage, kind: ImageKind) -> Cow<'_, DynamicImage> {
    use DynamicImage::*;

    match (kind, image) {
        (ImageKind::Jpeg, ImageLuma8(_) | ImageRgb8(_)) => Cow::Borrowed(image),
        (ImageKind::Jpeg, ImageLumaA8(_) | ImageLuma16(_) | ImageLumaA16(_)) => {
            Cow::Owned(ImageLuma8(image.to_luma8()))
        }
        (ImageKind::Jpeg, _) => Cow::Owned(ImageRgb8(image.to_rgb8())),

        (ImageKind::Bmp, ImageLuma8(_) | ImageLumaA8(_) | ImageRgb8(_) | ImageRgba8(_)) => {
            Cow::Borrowed(image)
        }
        (ImageKind::Bmp, ImageLuma16(_)) => Cow::Owned(ImageLuma8(image.to_luma8())),
        (ImageKind::Bmp, ImageLumaA16(_)) => Cow::Owned(ImageLumaA8(image.to_luma_alpha8())),
        (ImageKind::Bmp, ImageRgb16(_) | ImageRgb32F(_)) => Cow::Owned(ImageRgb8(image.to_rgb8())),
        (ImageKind::Bmp, _) => Cow::Owned(ImageRgba8(image.to_rgba8())),

        (ImageKind::Gif, ImageRgba8(_)) => Cow::Borrowed(image),
        (ImageKind::Gif, _) => Cow::Owned(ImageRgba8(image.to_rgba8())),

        (ImageKind::Png, ImageRgb32F(_)) => Cow::Owned(ImageRgb16(image.to_rgb16())),
        (ImageKind::Png, ImageRgba32F(_)) => Cow::Owned(ImageRgba16(image.to_rgba16())),
        (ImageKind::Png, _) => Cow::Borrowed(image),
    }
}

fn format_name(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("unknown")
}
