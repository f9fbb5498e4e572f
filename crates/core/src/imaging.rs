//! Input image normalisation.
//!
//! Every submitted image becomes a 227x227 RGB PNG before it is stored as
//! `{id}.png`, regardless of where it came from.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rand::Rng;

/// Side length, in pixels, of every normalised input image.
pub const INPUT_SIDE: u32 = 227;

const NOISE_MEAN: f64 = 0.5;
const NOISE_STD_DEV: f64 = 16.0 / 256.0;

/// Where the submitted image comes from, after any network fetch.
#[derive(Debug, Clone)]
pub enum SourceImage {
    /// Generate Gaussian noise instead of decoding anything.
    Noise,
    /// Encoded bytes in any supported format.
    Encoded(Vec<u8>),
}

#[derive(Debug, thiserror::Error)]
pub enum ImagingError {
    /// The bytes could not be decoded as an image.
    #[error("Could not decode image: {0}")]
    Decode(#[source] image::ImageError),

    /// Conversion or PNG encoding failed after a successful decode.
    #[error("Could not process image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Decode (or generate), convert to RGB, resize and encode as PNG.
pub fn normalize(source: &SourceImage) -> Result<Vec<u8>, ImagingError> {
    let rgb = match source {
        SourceImage::Noise => noise_image(INPUT_SIDE),
        SourceImage::Encoded(bytes) => {
            let decoded = image::load_from_memory(bytes).map_err(ImagingError::Decode)?;
            image::imageops::resize(
                &decoded.to_rgb8(),
                INPUT_SIDE,
                INPUT_SIDE,
                FilterType::Lanczos3,
            )
        }
    };

    encode_png(rgb)
}

fn encode_png(rgb: RgbImage) -> Result<Vec<u8>, ImagingError> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(rgb)
        .write_to(&mut out, ImageFormat::Png)
        .map_err(ImagingError::Encode)?;
    Ok(out.into_inner())
}

/// Per-channel Gaussian noise around mid-grey, clipped to the valid range.
fn noise_image(side: u32) -> RgbImage {
    let mut rng = rand::rng();
    RgbImage::from_fn(side, side, |_, _| {
        Rgb(std::array::from_fn(|_| {
            let value = (NOISE_MEAN + NOISE_STD_DEV * standard_normal(&mut rng)).clamp(0.0, 1.0);
            (value * 255.0).round() as u8
        }))
    })
}

/// Box-Muller transform.
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1 = 1.0 - rng.random::<f64>();
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
