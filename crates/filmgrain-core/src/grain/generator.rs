//! Stochastic grain particle generation.
//!
//! # Algorithm
//! The particle count follows the emulsion's physical density. The image is
//! treated as a print at a fixed reference resolution:
//! ```text
//! px_per_mm = dpi / 25.4
//! area_mm2  = width × height / px_per_mm²
//! count     = min(⌊area_mm2 × density_per_mm2 × density_multiplier × density_change⌋,
//!                 MAX_PARTICLES)
//! ```
//! Each particle then draws, in order: position (uniform over the image),
//! size (normal around the stock mean, clamped to the stock range, then
//! scaled), opacity (uniform over the stock range, scaled), rotation
//! (uniform over a full turn) and color.
//!
//! # Performance
//! At 300 DPI one mm² is about 140 pixels, so the physical count reaches the
//! millions well before a full-resolution frame. The set is held in one
//! `Vec` for the duration of a render and capped at [`MAX_PARTICLES`].

use std::f32::consts::TAU;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use super::clustering::cluster_particles;
use super::particle::{GrainParticle, GrainShape, pack_rgba};
use crate::film_stock::{FilmStock, FilmType};
use crate::params::GrainParams;

/// Print resolution assumed when converting pixels to film area.
pub const DEFAULT_REFERENCE_DPI: f32 = 300.0;

/// Upper bound on the particles generated for a single render.
pub const MAX_PARTICLES: usize = 4_000_000;

const MM_PER_INCH: f64 = 25.4;

/// Gray range of black-and-white grain.
const MONO_GRAY_MIN: u8 = 200;
/// Channel range of color grain. Kept close to white so the grain reads as
/// a tint rather than a dark speck.
const TINT_MIN: u8 = 240;
const CHANNEL_MAX: u8 = 255;

/// A random stream for one render: seeded when `seed` is given, otherwise
/// drawn from OS entropy.
pub fn render_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Produces the particle set for one render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainGenerator {
    reference_dpi: f32,
}

impl Default for GrainGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_DPI)
    }
}

impl GrainGenerator {
    /// Non-positive or non-finite resolutions fall back to 300 DPI.
    pub fn new(reference_dpi: f32) -> Self {
        let reference_dpi = if reference_dpi.is_finite() && reference_dpi > 0.0 {
            reference_dpi
        } else {
            DEFAULT_REFERENCE_DPI
        };
        Self { reference_dpi }
    }

    pub fn reference_dpi(&self) -> f32 {
        self.reference_dpi
    }

    /// Physical film area covered by a `width × height` image, in mm².
    pub fn area_mm2(&self, width: u32, height: u32) -> f64 {
        let px_per_mm = self.reference_dpi as f64 / MM_PER_INCH;
        width as f64 * height as f64 / (px_per_mm * px_per_mm)
    }

    /// Number of particles [`generate`](Self::generate) will produce.
    pub fn particle_count(
        &self,
        stock: &FilmStock,
        params: &GrainParams,
        width: u32,
        height: u32,
    ) -> usize {
        let (_, density_change) = params.processing.multipliers(stock);
        let count = self.area_mm2(width, height)
            * stock.grain_properties.density_per_mm2 as f64
            * params.density_multiplier as f64
            * density_change as f64;
        // Saturating cast: NaN and negatives become 0.
        (count.max(0.0) as usize).min(MAX_PARTICLES)
    }

    /// Generate every particle for a `width × height` image.
    ///
    /// Positions lie in `[0, width) × [0, height)`. When the stock clusters
    /// and `params.clustering_strength > 0` the set is then pulled into
    /// clumps; the count and order are unchanged by that pass.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        stock: &FilmStock,
        params: &GrainParams,
        width: u32,
        height: u32,
        rng: &mut R,
    ) -> Vec<GrainParticle> {
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let count = self.particle_count(stock, params, width, height);
        if count == MAX_PARTICLES {
            tracing::warn!("Grain for {} capped at {MAX_PARTICLES} particles", stock.id);
        }
        let sampler = ParticleSampler::new(stock, params, width, height);

        let mut particles = Vec::with_capacity(count);
        for _ in 0..count {
            particles.push(sampler.sample(rng));
        }

        if stock.grain_properties.clustering != "isolated" && params.clustering_strength > 0.0 {
            cluster_particles(&mut particles, stock, params, width, height, rng);
        }

        tracing::debug!(
            "Generated {} grain particles for {} ({width}x{height})",
            particles.len(),
            stock.id
        );
        particles
    }
}

/// Convenience wrapper: default resolution, stream seeded from `params.seed`.
pub fn generate_particles(
    stock: &FilmStock,
    params: &GrainParams,
    width: u32,
    height: u32,
) -> Vec<GrainParticle> {
    let mut rng = render_rng(params.seed);
    GrainGenerator::default().generate(stock, params, width, height, &mut rng)
}

/// Per-render constants hoisted out of the particle loop.
struct ParticleSampler {
    width: f32,
    height: f32,
    size_dist: Option<Normal<f32>>,
    avg_size: f32,
    min_size: f32,
    max_size: f32,
    size_scale: f32,
    opacity_min: f32,
    opacity_max: f32,
    opacity_scale: f32,
    aspect_ratio: f32,
    shape: GrainShape,
    monochrome: bool,
    /// `0` keeps color grain neutral.
    color_variation: f32,
}

impl ParticleSampler {
    fn new(stock: &FilmStock, params: &GrainParams, width: u32, height: u32) -> Self {
        let grain = &stock.grain_properties;
        let visual = &stock.visual_properties;
        let (size_increase, _) = params.processing.multipliers(stock);

        let color_variation = if params.enable_color_variation {
            params.color_variation_strength.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            width: width as f32,
            height: height as f32,
            size_dist: Normal::new(grain.avg_size_um, grain.avg_size_um * grain.size_variation_coeff)
                .ok(),
            avg_size: grain.avg_size_um,
            min_size: grain.min_size_um,
            max_size: grain.max_size_um,
            size_scale: params.size_multiplier * size_increase,
            opacity_min: visual.opacity_min,
            opacity_max: visual.opacity_max,
            opacity_scale: params.opacity,
            aspect_ratio: stock.aspect_ratio(),
            shape: GrainShape::classify(grain),
            monochrome: stock.film_type == FilmType::BlackAndWhite,
            color_variation,
        }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> GrainParticle {
        let x = uniform_below(rng, self.width);
        let y = uniform_below(rng, self.height);

        let raw_size = self
            .size_dist
            .as_ref()
            .map_or(self.avg_size, |d| d.sample(rng));
        let size = raw_size.max(self.min_size).min(self.max_size) * self.size_scale;

        let base_opacity = if self.opacity_max > self.opacity_min {
            rng.random_range(self.opacity_min..=self.opacity_max)
        } else {
            self.opacity_min
        };
        let opacity = base_opacity * self.opacity_scale;

        let rotation = uniform_below(rng, TAU);

        GrainParticle {
            x,
            y,
            size,
            opacity,
            aspect_ratio: self.aspect_ratio,
            rotation,
            color: self.sample_color(rng),
            shape: self.shape,
        }
    }

    fn sample_color<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        if self.monochrome {
            let g = rng.random_range(MONO_GRAY_MIN..=CHANNEL_MAX);
            return pack_rgba(g, g, g, CHANNEL_MAX);
        }

        let base = rng.random_range(TINT_MIN..=CHANNEL_MAX);
        if self.color_variation <= 0.0 {
            return pack_rgba(base, base, base, CHANNEL_MAX);
        }

        let mut rgb = [base; 3];
        for c in &mut rgb {
            let jitter = rng.random_range(TINT_MIN..=CHANNEL_MAX);
            let mixed = base as f32 + (jitter as f32 - base as f32) * self.color_variation;
            *c = mixed.round().clamp(TINT_MIN as f32, CHANNEL_MAX as f32) as u8;
        }
        pack_rgba(rgb[0], rgb[1], rgb[2], CHANNEL_MAX)
    }
}

/// Uniform in `[0, limit)`.
fn uniform_below<R: Rng + ?Sized>(rng: &mut R, limit: f32) -> f32 {
    let v = rng.random::<f32>() * limit;
    // f32 rounding can land exactly on the limit.
    if v < limit { v } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::film_stock::ProcessingVariation;
    use crate::grain::particle::unpack_rgb;
    use crate::params::ProcessingType;

    const EPSILON: f32 = 1e-5;

    fn stock(film_type: FilmType) -> FilmStock {
        let mut s = FilmStock {
            id: "test".to_string(),
            film_type,
            ..FilmStock::default()
        };
        s.grain_properties.density_per_mm2 = 50.0;
        s
    }

    #[test]
    fn test_area_at_reference_dpi() {
        let g = GrainGenerator::default();
        // 300 DPI: 11.811 px/mm, so 1181.1 px is 100 mm.
        let area = g.area_mm2(1181, 1181);
        assert!((area - 9998.3).abs() < 1.0, "area {area}");
    }

    #[test]
    fn test_count_matches_formula() {
        let g = GrainGenerator::default();
        let s = stock(FilmType::BlackAndWhite);
        let p = GrainParams::default();
        let expected = (g.area_mm2(200, 100) * 50.0) as usize;
        assert_eq!(g.particle_count(&s, &p, 200, 100), expected);
        assert_eq!(g.generate(&s, &p, 200, 100, &mut render_rng(Some(1))).len(), expected);
    }

    #[test]
    fn test_count_is_capped() {
        let g = GrainGenerator::default();
        let mut s = stock(FilmType::BlackAndWhite);
        s.grain_properties.density_per_mm2 = 1.0e6;
        let p = GrainParams {
            density_multiplier: f32::MAX,
            ..GrainParams::default()
        };
        assert_eq!(g.particle_count(&s, &p, 10_000, 10_000), MAX_PARTICLES);

        s.grain_properties.density_per_mm2 = f32::INFINITY;
        assert_eq!(g.particle_count(&s, &GrainParams::default(), 8, 8), MAX_PARTICLES);
    }

    #[test]
    fn test_zero_density_yields_no_particles() {
        let mut s = stock(FilmType::BlackAndWhite);
        s.grain_properties.density_per_mm2 = 0.0;
        assert!(generate_particles(&s, &GrainParams::default(), 64, 64).is_empty());
    }

    #[test]
    fn test_invalid_dpi_falls_back() {
        assert_eq!(GrainGenerator::new(0.0).reference_dpi(), DEFAULT_REFERENCE_DPI);
        assert_eq!(GrainGenerator::new(f32::NAN).reference_dpi(), DEFAULT_REFERENCE_DPI);
        assert_eq!(GrainGenerator::new(600.0).reference_dpi(), 600.0);
    }

    #[test]
    fn test_push_processing_scales_count_and_size() {
        let mut s = stock(FilmType::BlackAndWhite);
        s.grain_properties.size_variation_coeff = 0.0;
        s.processing_variations.push_1_stop = Some(ProcessingVariation {
            size_increase: 1.5,
            density_change: 2.0,
            contrast_change: String::new(),
        });
        let g = GrainGenerator::default();
        let normal = GrainParams::default();
        let pushed = GrainParams {
            processing: ProcessingType::Push1Stop,
            ..GrainParams::default()
        };

        let n = g.particle_count(&s, &normal, 300, 300);
        let m = g.particle_count(&s, &pushed, 300, 300);
        assert!(m.abs_diff(2 * n) <= 1, "{m} vs 2 × {n}");

        let particles = g.generate(&s, &pushed, 300, 300, &mut render_rng(Some(3)));
        let avg = s.grain_properties.avg_size_um;
        assert!(particles.iter().all(|p| (p.size - avg * 1.5).abs() < EPSILON));
    }

    #[test]
    fn test_particle_attributes_within_bounds() {
        let s = stock(FilmType::ColorNegative);
        let params = GrainParams {
            size_multiplier: 2.0,
            opacity: 0.5,
            ..GrainParams::default()
        };
        let particles = GrainGenerator::default().generate(&s, &params, 120, 80, &mut render_rng(Some(9)));
        assert!(!particles.is_empty());

        let g = &s.grain_properties;
        let v = &s.visual_properties;
        for p in &particles {
            assert!((0.0..120.0).contains(&p.x) && (0.0..80.0).contains(&p.y));
            assert!(p.size >= g.min_size_um * 2.0 - EPSILON && p.size <= g.max_size_um * 2.0 + EPSILON);
            assert!(p.opacity >= v.opacity_min * 0.5 - EPSILON);
            assert!(p.opacity <= v.opacity_max * 0.5 + EPSILON);
            assert!((0.0..TAU).contains(&p.rotation));
            assert_eq!(p.shape, GrainShape::Circular);
        }
    }

    #[test]
    fn test_monochrome_grain_is_light_gray() {
        let s = stock(FilmType::BlackAndWhite);
        for p in generate_particles(&s, &GrainParams::default().with_seed(5), 100, 100) {
            let [r, g, b] = unpack_rgb(p.color);
            assert!(r == g && g == b);
            assert!(r >= MONO_GRAY_MIN);
            assert_eq!(p.color & 0xFF, 0xFF);
        }
    }

    #[test]
    fn test_color_grain_stays_near_white() {
        let s = stock(FilmType::ColorSlide);
        for p in generate_particles(&s, &GrainParams::default().with_seed(11), 100, 100) {
            assert!(unpack_rgb(p.color).iter().all(|&c| c >= TINT_MIN));
        }
    }

    #[test]
    fn test_color_variation_disabled_is_neutral() {
        let s = stock(FilmType::ColorNegative);
        let params = GrainParams {
            enable_color_variation: false,
            ..GrainParams::default().with_seed(2)
        };
        for p in generate_particles(&s, &params, 80, 80) {
            let [r, g, b] = unpack_rgb(p.color);
            assert!(r == g && g == b);
        }
    }

    #[test]
    fn test_same_seed_same_particles() {
        let s = stock(FilmType::ColorNegative);
        let params = GrainParams::default().with_seed(42);
        let a = generate_particles(&s, &params, 64, 48);
        let b = generate_particles(&s, &params, 64, 48);
        assert_eq!(a, b);

        let c = generate_particles(&s, &params.clone().with_seed(43), 64, 48);
        assert_ne!(a, c);
    }

    #[test]
    fn test_tabular_stock_produces_tabular_particles() {
        let mut s = stock(FilmType::BlackAndWhite);
        s.grain_properties.crystal_type = "tabular_t_grain".to_string();
        s.grain_properties.aspect_ratio_x = 2.0;
        for p in generate_particles(&s, &GrainParams::default().with_seed(1), 50, 50) {
            assert_eq!(p.shape, GrainShape::Tabular);
            assert!((p.aspect_ratio - 2.0).abs() < EPSILON);
        }
    }
}
