//! Bounding-box cropping: cut a face out of a passport image.
//!
//! Boxes arrive in two shapes. The face-comparison service reports
//! [`FractionalBox`]es (0..1 relative to the image), while face-location
//! replies from a vision model report [`PixelBox`]es. Both are converted at
//! the boundary into one canonical [`PixelRect`] that is already clipped to
//! the image, and only that rectangle is ever used to copy pixels.
//!
//! Conversion rules:
//! * fractional edges: `round(left * W)` .. `round((left + width) * W)`,
//!   likewise `top`/`height` against `H`;
//! * pixel edges: `x` .. `x + width`, `y` .. `y + height`;
//! * every edge is clamped to `[0, W]` / `[0, H]`; a rectangle with no area
//!   left after clamping is a [`PassportError::Geometry`].

use crate::error::PassportError;
use crate::pipeline::encode::EmbeddableImage;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

/// MIME type of every crop produced by this module.
pub const CROP_MIME: &str = "image/png";

/// Box expressed as fractions of the image size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FractionalBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Box expressed in absolute pixels from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// A bounding box in either wire form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundingBox {
    Fractional(FractionalBox),
    Pixel(PixelBox),
}

impl From<FractionalBox> for BoundingBox {
    fn from(b: FractionalBox) -> Self {
        BoundingBox::Fractional(b)
    }
}

impl From<PixelBox> for BoundingBox {
    fn from(b: PixelBox) -> Self {
        BoundingBox::Pixel(b)
    }
}

/// Canonical crop rectangle: absolute pixels, inside the image, non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Resolve into a clipped [`PixelRect`] for an image of `width`×`height`.
    pub fn resolve(&self, width: u32, height: u32) -> Result<PixelRect, PassportError> {
        let (w, h) = (i64::from(width), i64::from(height));
        let (x0, y0, x1, y1) = match *self {
            BoundingBox::Fractional(b) => {
                if ![b.left, b.top, b.width, b.height].iter().all(|v| v.is_finite()) {
                    return Err(geometry(width, height, format!("non-finite box {b:?}")));
                }
                (
                    scale(b.left, w),
                    scale(b.top, h),
                    scale(b.left + b.width, w),
                    scale(b.top + b.height, h),
                )
            }
            BoundingBox::Pixel(b) => (
                b.x,
                b.y,
                b.x.saturating_add(b.width),
                b.y.saturating_add(b.height),
            ),
        };

        let (x0, x1) = (x0.clamp(0, w), x1.clamp(0, w));
        let (y0, y1) = (y0.clamp(0, h), y1.clamp(0, h));
        if x1 <= x0 || y1 <= y0 {
            return Err(geometry(
                width,
                height,
                format!("{self:?} clips to {}x{}", (x1 - x0).max(0), (y1 - y0).max(0)),
            ));
        }

        // All four values are inside [0, u32::MAX] after the clamp above.
        Ok(PixelRect {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

fn scale(fraction: f64, extent: i64) -> i64 {
    // Saturating float→int cast; the result is clamped by the caller.
    (fraction * extent as f64).round() as i64
}

fn geometry(image_width: u32, image_height: u32, detail: String) -> PassportError {
    PassportError::Geometry {
        image_width,
        image_height,
        detail,
    }
}

/// Decode an image, reporting undecodable input as a format error.
pub fn load_image(bytes: &[u8]) -> Result<DynamicImage, PassportError> {
    image::load_from_memory(bytes)
        .map_err(|e| PassportError::format(format!("image could not be decoded: {e}")))
}

/// Width and height of an encoded image, read from its header only.
pub fn image_dimensions(bytes: &[u8]) -> Result<(u32, u32), PassportError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PassportError::format(format!("image could not be read: {e}")))?
        .into_dimensions()
        .map_err(|e| PassportError::format(format!("image could not be decoded: {e}")))
}

/// Crop `bytes` to `bbox` and return the region re-encoded as PNG.
///
/// The box is resolved and validated before any pixels are copied or
/// encoded, so a degenerate box never produces output.
pub fn crop(bytes: &[u8], bbox: &BoundingBox) -> Result<Vec<u8>, PassportError> {
    let img = load_image(bytes)?;
    let (width, height) = img.dimensions();
    let rect = bbox.resolve(width, height)?;
    debug!(
        "Cropping {}x{} image to {}x{} at ({}, {})",
        width, height, rect.width, rect.height, rect.x, rect.y
    );

    let region = img.crop_imm(rect.x, rect.y, rect.width, rect.height);
    let mut buf = Vec::new();
    region
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| PassportError::Internal(format!("PNG encoding failed: {e}")))?;
    Ok(buf)
}

/// [`crop`] and wrap the result as an `image/png` [`EmbeddableImage`].
pub fn crop_to_embeddable(
    bytes: &[u8],
    bbox: &BoundingBox,
) -> Result<EmbeddableImage, PassportError> {
    crop(bytes, bbox).map(|png| EmbeddableImage::new(png, CROP_MIME))
}

/// [`crop_to_embeddable`] on the blocking thread pool.
///
/// Decoding and re-encoding a full-resolution passport scan takes long
/// enough to stall a Tokio worker.
pub async fn crop_blocking(
    bytes: Vec<u8>,
    bbox: BoundingBox,
) -> Result<EmbeddableImage, PassportError> {
    tokio::task::spawn_blocking(move || crop_to_embeddable(&bytes, &bbox))
        .await
        .map_err(|e| PassportError::Internal(format!("Crop task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn frac(left: f64, top: f64, width: f64, height: f64) -> BoundingBox {
        BoundingBox::Fractional(FractionalBox {
            left,
            top,
            width,
            height,
        })
    }

    fn px(x: i64, y: i64, width: i64, height: i64) -> BoundingBox {
        BoundingBox::Pixel(PixelBox {
            x,
            y,
            width,
            height,
        })
    }

    #[test]
    fn fractional_box_scales() {
        let rect = frac(0.1, 0.1, 0.3, 0.3).resolve(1000, 1000).unwrap();
        assert_eq!(
            rect,
            PixelRect {
                x: 100,
                y: 100,
                width: 300,
                height: 300
            }
        );
    }

    #[test]
    fn pixel_box_passes_through() {
        let rect = px(10, 20, 30, 40).resolve(100, 100).unwrap();
        assert_eq!(
            rect,
            PixelRect {
                x: 10,
                y: 20,
                width: 30,
                height: 40
            }
        );
    }

    #[test]
    fn out_of_bounds_box_is_clipped() {
        let rect = px(80, -10, 50, 40).resolve(100, 100).unwrap();
        assert_eq!(
            rect,
            PixelRect {
                x: 80,
                y: 0,
                width: 20,
                height: 30
            }
        );
        let rect = frac(0.9, 0.9, 0.5, 0.5).resolve(200, 100).unwrap();
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (180, 90, 20, 10));
    }

    #[test]
    fn degenerate_boxes_are_rejected() {
        for bbox in [
            px(10, 10, 0, 5),
            px(10, 10, 5, -3),
            frac(0.2, 0.2, 0.0, 0.5),
            frac(0.2, 0.2, -0.1, 0.5),
            // entirely outside the image: clips to nothing
            px(150, 10, 20, 20),
            frac(1.2, 0.0, 0.3, 0.3),
            frac(f64::NAN, 0.0, 0.3, 0.3),
        ] {
            let err = bbox.resolve(100, 100).unwrap_err();
            assert!(matches!(err, PassportError::Geometry { .. }), "{bbox:?}");
        }
    }

    #[test]
    fn degenerate_crop_does_not_decode_garbage() {
        let err = crop(&gradient(10, 10), &px(0, 0, 0, 0)).unwrap_err();
        assert!(matches!(err, PassportError::Geometry { .. }));
    }

    #[test]
    fn full_fractional_box_keeps_every_pixel() {
        let src = gradient(64, 48);
        let out = crop(&src, &frac(0.0, 0.0, 1.0, 1.0)).unwrap();
        let before = load_image(&src).unwrap().to_rgb8();
        let after = load_image(&out).unwrap().to_rgb8();
        assert_eq!(before.dimensions(), after.dimensions());
        assert_eq!(before.as_raw(), after.as_raw());
    }

    #[test]
    fn crop_is_deterministic() {
        let src = gradient(120, 80);
        let bbox = frac(0.25, 0.1, 0.5, 0.6);
        assert_eq!(crop(&src, &bbox).unwrap(), crop(&src, &bbox).unwrap());
    }

    #[test]
    fn crop_copies_the_right_pixels() {
        let src = gradient(50, 50);
        let out = crop(&src, &px(5, 7, 10, 12)).unwrap();
        let img = load_image(&out).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (10, 12));
        assert_eq!(img.get_pixel(0, 0), &Rgb([5, 7, 12]));
        assert_eq!(img.get_pixel(9, 11), &Rgb([14, 18, 32]));
    }

    #[test]
    fn undecodable_source_is_a_format_error() {
        let err = crop(b"not an image", &frac(0.0, 0.0, 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, PassportError::Format { .. }));
    }

    #[test]
    fn embeddable_crop_is_png() {
        let img = crop_to_embeddable(&gradient(20, 20), &px(0, 0, 10, 10)).unwrap();
        assert_eq!(img.mime(), CROP_MIME);
        assert_eq!(image_dimensions(img.bytes()).unwrap(), (10, 10));
    }

    #[test]
    fn rekognition_box_deserializes() {
        let b: FractionalBox =
            serde_json::from_str(r#"{"Width":0.3,"Height":0.4,"Left":0.1,"Top":0.2}"#).unwrap();
        assert_eq!(b.left, 0.1);
        assert_eq!(b.height, 0.4);
    }
}
