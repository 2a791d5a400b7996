//! Film-stock tonal response: characteristic curve plus contrast.
//!
//! Each stock type maps to a fixed power curve on normalized channel values:
//!
//! ```text
//! BlackAndWhite: luma = 0.299 R + 0.587 G + 0.114 B;  out = luma ^ 0.9  (all channels)
//! ColorNegative: out = in ^ 0.85  (per channel)
//! ColorSlide:    out = in ^ 1.2   (per channel)
//! ```
//!
//! A contrast pass then scales every color channel around mid-gray:
//!
//! ```text
//! out = (in − 0.5) × factor + 0.5      factor: low 0.8, medium 1.0, high 1.2
//! ```
//!
//! Results are rounded and clamped back to 8 bits after each pass. Overshoot
//! is expected and is never an error. Alpha is left untouched.
//!
//! # Performance
//! Per-channel curves depend only on the input byte, so they are baked into
//! 256-entry tables once per call.

use crate::error::Result;
use crate::film_stock::{FilmStock, FilmType};
use crate::image::Image;

/// Rec. 601 luma weights used for the monochrome conversion.
const LUMA_REC601: [f32; 3] = [0.299, 0.587, 0.114];

/// Characteristic curve exponent for a stock type.
pub const fn curve_exponent(film_type: FilmType) -> f32 {
    match film_type {
        FilmType::BlackAndWhite => 0.9,
        FilmType::ColorNegative => 0.85,
        FilmType::ColorSlide => 1.2,
    }
}

/// Apply the stock's tonal curve and contrast to `image` in place.
pub fn apply_color_response(image: &mut Image, stock: &FilmStock) -> Result<()> {
    image.ensure_valid()?;

    let exponent = curve_exponent(stock.film_type);
    match stock.film_type {
        FilmType::BlackAndWhite => apply_monochrome_curve(image, exponent),
        FilmType::ColorNegative | FilmType::ColorSlide => apply_power_curve(image, exponent),
    }

    adjust_contrast(image, stock.visual_properties.contrast_level.factor());
    Ok(())
}

/// Convert to luma, apply `luma ^ exponent`, and write it to every color channel.
pub fn apply_monochrome_curve(image: &mut Image, exponent: f32) {
    let ch = image.channels() as usize;
    let color = image.color_channels();
    if ch == 0 {
        return;
    }

    for px in image.data_mut().chunks_exact_mut(ch) {
        let luma = if color == 3 {
            LUMA_REC601[0] * normalize(px[0])
                + LUMA_REC601[1] * normalize(px[1])
                + LUMA_REC601[2] * normalize(px[2])
        } else {
            normalize(px[0])
        };
        let value = quantize(luma.max(0.0).powf(exponent));
        px[..color].fill(value);
    }
}

/// Apply `in ^ exponent` independently to each color channel.
pub fn apply_power_curve(image: &mut Image, exponent: f32) {
    let lut = bake_lut(|v| v.powf(exponent));
    apply_lut(image, &lut);
}

/// Scale color channels around 0.5 by `factor`. A factor of 1.0 is a no-op.
pub fn adjust_contrast(image: &mut Image, factor: f32) {
    if (factor - 1.0).abs() < 1e-7 {
        return;
    }
    let lut = bake_lut(|v| (v - 0.5) * factor + 0.5);
    apply_lut(image, &lut);
}

/// Tabulate `f` over all 256 normalized byte values.
fn bake_lut(f: impl Fn(f32) -> f32) -> [u8; 256] {
    std::array::from_fn(|i| quantize(f(normalize(i as u8))))
}

fn apply_lut(image: &mut Image, lut: &[u8; 256]) {
    let ch = image.channels() as usize;
    let color = image.color_channels();
    if ch == 0 {
        return;
    }
    for px in image.data_mut().chunks_exact_mut(ch) {
        for v in &mut px[..color] {
            *v = lut[*v as usize];
        }
    }
}

fn normalize(v: u8) -> f32 {
    v as f32 / 255.0
}

/// Map a normalized value back to a byte with rounding and clamping.
fn quantize(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}
