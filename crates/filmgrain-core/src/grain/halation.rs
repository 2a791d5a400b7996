//! Halation glow around highlights.
//!
//! # Algorithm
//! ```text
//! mask(p)  = 1 if luma(p) ≥ 0.8 else 0
//! glow     = box_blur(mask, radius)          (horizontal pass, then vertical)
//! α(p)     = min(glow(p) × weight × strength, 1)
//! out(p)   = in(p) + (halation_color − in(p)) × α(p)
//! ```
//! `weight` comes from the stock's halation category. Only color channels
//! are written; single-channel images blend toward the luma of the color.

use super::particle::unpack_rgb;
use crate::film_stock::FilmStock;
use crate::image::Image;

/// Normalized luma at or above which a pixel scatters light.
pub const HIGHLIGHT_THRESHOLD: f32 = 0.8;

const LUMA_REC601: [f32; 3] = [0.299, 0.587, 0.114];

/// Apply the stock's halation to `image`. Returns `false` when the stock
/// has no halation or the radius rounds to zero.
pub fn apply_halation(image: &mut Image, stock: &FilmStock, strength: f32) -> bool {
    let effects = &stock.special_effects;
    let weight = effects.halation.weight() * strength.max(0.0);
    let radius = effects.halation_radius.round().max(0.0) as usize;
    if !image.is_valid() || !(weight > 0.0) || radius == 0 {
        return false;
    }

    let width = image.width() as usize;
    let height = image.height() as usize;
    // A window wider than the image already averages the whole line.
    let radius = radius.min(width.max(height));
    let mut mask = highlight_mask(image);
    box_blur(&mut mask, width, height, radius);

    let rgb = unpack_rgb(effects.halation_color).map(|c| c as f32);
    let target: Vec<f32> = if image.color_channels() == 3 {
        rgb.to_vec()
    } else {
        vec![LUMA_REC601.iter().zip(rgb).map(|(w, c)| w * c).sum::<f32>()]
    };

    let ch = image.channels() as usize;
    for (px, glow) in image.data_mut().chunks_exact_mut(ch).zip(&mask) {
        let alpha = (glow * weight).min(1.0);
        if alpha <= 0.0 {
            continue;
        }
        for (v, t) in px.iter_mut().zip(&target) {
            let out = *v as f32 + (t - *v as f32) * alpha;
            *v = out.round().clamp(0.0, 255.0) as u8;
        }
    }

    tracing::debug!("Applied halation for {} (radius {radius}px)", stock.id);
    true
}

/// 1.0 where the pixel is a highlight, 0.0 elsewhere.
fn highlight_mask(image: &Image) -> Vec<f32> {
    let ch = image.channels() as usize;
    let color = image.color_channels() == 3;
    image
        .data()
        .chunks_exact(ch)
        .map(|px| {
            let luma = if color {
                LUMA_REC601
                    .iter()
                    .zip(px)
                    .map(|(w, &v)| w * v as f32)
                    .sum::<f32>()
                    / 255.0
            } else {
                px[0] as f32 / 255.0
            };
            if luma >= HIGHLIGHT_THRESHOLD { 1.0 } else { 0.0 }
        })
        .collect()
}

/// Separable mean filter over a `(2r + 1)` window, shrunk at the borders.
fn box_blur(values: &mut [f32], width: usize, height: usize, radius: usize) {
    let mut prefix = Vec::with_capacity(width.max(height) + 1);
    let mut column = vec![0.0f32; height];

    for row in values.chunks_exact_mut(width) {
        blur_line(row, &mut prefix, radius);
    }

    for x in 0..width {
        for (y, v) in column.iter_mut().enumerate() {
            *v = values[y * width + x];
        }
        blur_line(&mut column, &mut prefix, radius);
        for (y, v) in column.iter().enumerate() {
            values[y * width + x] = *v;
        }
    }
}

/// Running-sum mean of `line`, in place. `prefix` is scratch space.
fn blur_line(line: &mut [f32], prefix: &mut Vec<f32>, radius: usize) {
    let n = line.len();
    prefix.clear();
    prefix.push(0.0);
    let mut total = 0.0f32;
    for v in line.iter() {
        total += *v;
        prefix.push(total);
    }
    for (i, o) in line.iter_mut().enumerate() {
        let lo = i.saturating_sub(radius);
        let hi = i.saturating_add(radius).saturating_add(1).min(n);
        *o = (prefix[hi] - prefix[lo]) / (hi - lo) as f32;
    }
}
