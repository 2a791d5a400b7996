//! Compositing of grain particles onto an image.
//!
//! # Algorithm
//! Every shape blends its color into the covered pixels:
//! ```text
//! out = existing × (1 − α) + grain × α
//! ```
//! - Circular: disk of radius `size`, `α = opacity × (1 − d / size)`, zero
//!   at the rim.
//! - Tabular: axis-aligned `size × aspect` by `size` rectangle, `α = opacity`.
//!
//! Pixel `(px, py)` is sampled at its integer coordinate. Coverage outside
//! the image is skipped. Only color channels are written, so alpha survives.
//! Particles are drawn in sequence order and later ones land on top.

use super::particle::{GrainParticle, GrainShape, unpack_rgb};
use crate::image::Image;

/// Composite every particle in order.
pub fn composite_all(image: &mut Image, particles: &[GrainParticle]) {
    for particle in particles {
        composite(image, particle);
    }
}

/// Composite one particle.
pub fn composite(image: &mut Image, particle: &GrainParticle) {
    if !image.is_valid() || !particle_is_drawable(particle) {
        return;
    }
    match particle.shape.footprint() {
        GrainShape::Tabular => draw_rect(image, particle),
        _ => draw_disk(image, particle),
    }
}

fn particle_is_drawable(p: &GrainParticle) -> bool {
    p.x.is_finite()
        && p.y.is_finite()
        && p.size.is_finite()
        && p.size > 0.0
        && p.opacity.is_finite()
        && p.opacity > 0.0
}

fn draw_disk(image: &mut Image, p: &GrainParticle) {
    let radius = p.size;
    let Some(span) = PixelSpan::covering(image, p.x, p.y, radius, radius) else {
        return;
    };
    let rgb = unpack_rgb(p.color);

    for py in span.y0..=span.y1 {
        for px in span.x0..=span.x1 {
            let dist = (px as f32 - p.x).hypot(py as f32 - p.y);
            if dist > radius {
                continue;
            }
            let alpha = p.opacity * (1.0 - dist / radius);
            blend_pixel(image, px, py, rgb, alpha);
        }
    }
}

fn draw_rect(image: &mut Image, p: &GrainParticle) {
    let half_w = p.size * p.aspect_ratio * 0.5;
    let half_h = p.size * 0.5;
    if !(half_w.is_finite() && half_w > 0.0) {
        return;
    }
    let Some(span) = PixelSpan::covering(image, p.x, p.y, half_w, half_h) else {
        return;
    };
    let rgb = unpack_rgb(p.color);

    for py in span.y0..=span.y1 {
        for px in span.x0..=span.x1 {
            blend_pixel(image, px, py, rgb, p.opacity);
        }
    }
}

/// Inclusive pixel bounds of a footprint, clipped to the image.
struct PixelSpan {
    x0: u32,
    x1: u32,
    y0: u32,
    y1: u32,
}

impl PixelSpan {
    /// Pixels with `|px − cx| ≤ half_w` and `|py − cy| ≤ half_h`.
    fn covering(image: &Image, cx: f32, cy: f32, half_w: f32, half_h: f32) -> Option<Self> {
        let (x0, x1) = clip_axis(cx - half_w, cx + half_w, image.width())?;
        let (y0, y1) = clip_axis(cy - half_h, cy + half_h, image.height())?;
        Some(Self { x0, x1, y0, y1 })
    }
}

fn clip_axis(lo: f32, hi: f32, extent: u32) -> Option<(u32, u32)> {
    let first = (lo.ceil() as i64).max(0);
    let last = (hi.floor() as i64).min(extent as i64 - 1);
    (first <= last).then_some((first as u32, last as u32))
}

fn blend_pixel(image: &mut Image, x: u32, y: u32, rgb: [u8; 3], alpha: f32) {
    if alpha <= 0.0 {
        return;
    }
    let alpha = alpha.min(1.0);
    let color = image.color_channels();
    let Some(px) = image.pixel_mut(x, y) else {
        return;
    };
    for (dst, src) in px[..color].iter_mut().zip(rgb) {
        let v = *dst as f32 * (1.0 - alpha) + src as f32 * alpha;
        *dst = v.round().clamp(0.0, 255.0) as u8;
    }
}
