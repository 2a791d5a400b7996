//! Grain synthesis: particle generation, clustering, compositing and the
//! halation pass that follows it.

pub mod clustering;
pub mod generator;
pub mod halation;
pub mod particle;
pub mod rasterizer;

pub use generator::{
    DEFAULT_REFERENCE_DPI, GrainGenerator, MAX_PARTICLES, generate_particles, render_rng,
};
pub use halation::apply_halation;
pub use particle::{GrainParticle, GrainShape, pack_rgba, unpack_rgb};
pub use rasterizer::{composite, composite_all};

use rand::Rng;

use crate::film_stock::FilmStock;
use crate::image::Image;
use crate::params::GrainParams;

/// Generate a particle set sized to `image` and composite it in order.
///
/// `params.intensity` scales every particle's blend weight at this point,
/// after generation, so generated opacities keep their stock bounds.
/// Returns the number of particles drawn.
pub fn apply_grain<R: Rng + ?Sized>(
    image: &mut Image,
    stock: &FilmStock,
    params: &GrainParams,
    generator: &GrainGenerator,
    rng: &mut R,
) -> usize {
    let mut particles = generator.generate(stock, params, image.width(), image.height(), rng);
    let intensity = params.intensity.max(0.0);
    if intensity != 1.0 {
        for p in &mut particles {
            p.opacity *= intensity;
        }
    }
    composite_all(image, &particles);
    particles.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::film_stock::FilmType;

    fn stock() -> FilmStock {
        let mut s = FilmStock {
            id: "test".to_string(),
            film_type: FilmType::ColorNegative,
            ..FilmStock::default()
        };
        s.grain_properties.density_per_mm2 = 200.0;
        s
    }

    fn render(intensity: f32) -> (Image, usize) {
        let mut image = Image::filled(40, 40, 3, &[30, 30, 30]);
        let params = GrainParams {
            intensity,
            ..GrainParams::default()
        };
        let n = apply_grain(
            &mut image,
            &stock(),
            &params,
            &GrainGenerator::default(),
            &mut render_rng(Some(3)),
        );
        (image, n)
    }

    #[test]
    fn test_apply_grain_reports_particle_count() {
        let (_, n) = render(1.0);
        let expected = GrainGenerator::default().particle_count(&stock(), &GrainParams::default(), 40, 40);
        assert_eq!(n, expected);
    }

    #[test]
    fn test_zero_intensity_leaves_image_untouched() {
        let (image, n) = render(0.0);
        assert!(n > 0);
        assert!(image.data().iter().all(|&v| v == 30));
    }

    #[test]
    fn test_higher_intensity_brightens_more() {
        let sum = |img: &Image| img.data().iter().map(|&v| v as u64).sum::<u64>();
        let (low, _) = render(0.5);
        let (high, _) = render(2.0);
        assert!(sum(&high) > sum(&low));
    }
}
