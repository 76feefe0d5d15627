use image::{DynamicImage, GenericImageView, ImageBuffer, Pixel, imageops};

use super::ImagingError;

/// A crop rectangle `[x0, y0, x1, y1]` as supplied by a client.
///
/// Only the arity is known to be right; the bounds are checked against a
/// concrete image by [`Mask::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mask([i64; 4]);

impl Mask {
    pub fn new(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self([x0, y0, x1, y1])
    }

    pub fn from_slice(values: &[i64]) -> Result<Self, ImagingError> {
        let arr: [i64; 4] = values.try_into().map_err(|_| {
            ImagingError::InvalidMask("mask must contain exactly 4 integers".into())
        })?;
        Ok(Self(arr))
    }

    /// Check the mask against an image of `width` x `height` pixels.
    pub fn resolve(&self, width: u32, height: u32) -> Result<CropRect, ImagingError> {
        let [x0, y0, x1, y1] = self.0;
        if x0 >= x1 || y0 >= y1 {
            return Err(ImagingError::InvalidMask(format!(
                "mask {:?} is not a rectangle: x0 < x1 and y0 < y1 are required",
                self.0
            )));
        }
        if x0 < 0 || y0 < 0 || x1 > i64::from(width) || y1 > i64::from(height) {
            return Err(ImagingError::InvalidMask(format!(
                "mask {:?} exceeds the {width}x{height} image",
                self.0
            )));
        }
        // Bounded by width/height above, so these fit in u32.
        Ok(CropRect {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

impl TryFrom<Vec<i64>> for Mask {
    type Error = ImagingError;

    fn try_from(values: Vec<i64>) -> Result<Self, Self::Error> {
        Self::from_slice(&values)
    }
}

/// A non-empty rectangle known to lie inside a particular image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Pixel buffers that can produce an equivalent buffer restricted to a
/// sub-rectangle.
pub trait SubRegion: Sized {
    fn sub_region(&self, rect: CropRect) -> Self;
}

impl<P> SubRegion for ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
{
    fn sub_region(&self, rect: CropRect) -> Self {
        imageops::crop_imm(self, rect.x, rect.y, rect.width, rect.height).to_image()
    }
}

/// Crop `image` to `rect`.
///
/// Every 8- and 16-bit sample layout is supported. JPEG YCbCr and GIF palette
/// data reach this point already expanded into one of those. Float layouts
/// are rejected rather than converted.
pub fn crop(image: &DynamicImage, rect: CropRect) -> Result<DynamicImage, ImagingError> {
    let (width, height) = image.dimensions();
    let right = rect.x.checked_add(rect.width);
    let bottom = rect.y.checked_add(rect.height);
    if right.is_none_or(|r| r > width) || bottom.is_none_or(|b| b > height) {
        return Err(ImagingError::InvalidMask(format!(
            "crop {rect:?} exceeds the {width}x{height} image"
        )));
    }

    let cropped = match image {
        DynamicImage::ImageLuma8(buf) => DynamicImage::ImageLuma8(buf.sub_region(rect)),
        DynamicImage::ImageLumaA8(buf) => DynamicImage::ImageLumaA8(buf.sub_region(rect)),
        DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(buf.sub_region(rect)),
        DynamicImage::ImageRgba8(buf) => DynamicImage::ImageRgba8(buf.sub_region(rect)),
        DynamicImage::ImageLuma16(buf) => DynamicImage::ImageLuma16(buf.sub_region(rect)),
        DynamicImage::ImageLumaA16(buf) => DynamicImage::ImageLumaA16(buf.sub_region(rect)),
        DynamicImage::ImageRgb16(buf) => DynamicImage::ImageRgb16(buf.sub_region(rect)),
        DynamicImage::ImageRgba16(buf) => DynamicImage::ImageRgba16(buf.sub_region(rect)),
        other => {
            return Err(ImagingError::UnsupportedFormat(format!(
                "cannot crop {:?} pixel data",
                other.color()
            )));
        }
    };
    Ok(cropped)
}
