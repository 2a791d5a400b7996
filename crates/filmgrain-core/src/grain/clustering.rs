//! Proximity clustering of generated particles.
//!
//! # Algorithm
//! A random subset of particles becomes cluster seeds. Every other particle
//! that has a seed within `reach` is pulled toward its nearest seed:
//! ```text
//! reach = 6 × mean_size × (1 + max(stock_correlation, param_correlation))
//! t     = clustering_strength × (1 − d / reach)
//! p'    = p + (seed − p) × t
//! ```
//! Seed probability depends on the stock's clustering category. Count,
//! order and all non-position attributes are unchanged. A move that would
//! leave the image is dropped.
//!
//! # Complexity
//! Seeds are bucketed into a uniform grid with cell size `reach`, so each
//! particle inspects at most nine cells: O(N) overall.

use std::collections::HashMap;

use rand::Rng;

use super::particle::GrainParticle;
use crate::film_stock::FilmStock;
use crate::params::GrainParams;

/// Reach of a seed in multiples of the mean particle size.
const REACH_IN_MEAN_SIZES: f32 = 6.0;

/// Probability that a particle seeds a cluster, by clustering category.
pub fn seed_probability(category: &str) -> f64 {
    match category {
        "light" | "mild" => 0.08,
        "moderate" => 0.15,
        "heavy" => 0.25,
        _ => 0.15,
    }
}

/// Pull `particles` toward randomly chosen seeds.
pub fn cluster_particles<R: Rng + ?Sized>(
    particles: &mut [GrainParticle],
    stock: &FilmStock,
    params: &GrainParams,
    width: u32,
    height: u32,
    rng: &mut R,
) {
    let strength = params.clustering_strength.clamp(0.0, 1.0);
    if particles.is_empty() || strength <= 0.0 {
        return;
    }

    let mean_size = particles.iter().map(|p| p.size).sum::<f32>() / particles.len() as f32;
    let correlation = stock
        .algorithmic_data
        .spatial_correlation
        .max(params.spatial_correlation)
        .clamp(0.0, 1.0);
    let reach = REACH_IN_MEAN_SIZES * mean_size * (1.0 + correlation);
    if !(reach.is_finite() && reach > 0.0) {
        return;
    }

    let probability = seed_probability(&stock.grain_properties.clustering);
    let is_seed: Vec<bool> = particles.iter().map(|_| rng.random_bool(probability)).collect();

    let grid = SeedGrid::build(
        particles
            .iter()
            .zip(&is_seed)
            .filter(|(_, seed)| **seed)
            .map(|(p, _)| (p.x, p.y)),
        reach,
    );
    if grid.is_empty() {
        return;
    }

    let (w, h) = (width as f32, height as f32);
    let mut moved = 0usize;
    for (p, seed) in particles.iter_mut().zip(&is_seed) {
        if *seed {
            continue;
        }
        let Some((sx, sy, d)) = grid.nearest(p.x, p.y) else {
            continue;
        };
        let t = strength * (1.0 - d / reach);
        let nx = p.x + (sx - p.x) * t;
        let ny = p.y + (sy - p.y) * t;
        if (0.0..w).contains(&nx) && (0.0..h).contains(&ny) {
            p.x = nx;
            p.y = ny;
            moved += 1;
        }
    }

    tracing::debug!(
        "Clustered {moved} of {} particles around {} seeds (reach {reach:.2}px)",
        particles.len(),
        grid.len()
    );
}

/// Seed positions bucketed by grid cell.
struct SeedGrid {
    cell: f32,
    cells: HashMap<(i64, i64), Vec<(f32, f32)>>,
    count: usize,
}

impl SeedGrid {
    fn build(seeds: impl Iterator<Item = (f32, f32)>, cell: f32) -> Self {
        let mut grid = Self {
            cell,
            cells: HashMap::new(),
            count: 0,
        };
        for (x, y) in seeds {
            grid.cells.entry(grid.key(x, y)).or_default().push((x, y));
            grid.count += 1;
        }
        grid
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn len(&self) -> usize {
        self.count
    }

    fn key(&self, x: f32, y: f32) -> (i64, i64) {
        ((x / self.cell).floor() as i64, (y / self.cell).floor() as i64)
    }

    /// Nearest seed strictly within one cell size, as `(x, y, distance)`.
    fn nearest(&self, x: f32, y: f32) -> Option<(f32, f32, f32)> {
        let (cx, cy) = self.key(x, y);
        let mut best: Option<(f32, f32, f32)> = None;
        for gy in cy - 1..=cy + 1 {
            for gx in cx - 1..=cx + 1 {
                let Some(bucket) = self.cells.get(&(gx, gy)) else {
                    continue;
                };
                for &(sx, sy) in bucket {
                    let d = (sx - x).hypot(sy - y);
                    if d < self.cell && best.is_none_or(|(_, _, bd)| d < bd) {
                        best = Some((sx, sy, d));
                    }
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grain::generator::render_rng;
    use crate::grain::particle::GrainShape;

    fn particle(x: f32, y: f32) -> GrainParticle {
        GrainParticle {
            x,
            y,
            size: 1.0,
            opacity: 0.5,
            aspect_ratio: 1.0,
            rotation: 0.0,
            color: 0xFFFF_FFFF,
            shape: GrainShape::Circular,
        }
    }

    fn clustered_stock(category: &str) -> FilmStock {
        let mut s = FilmStock {
            id: "clumpy".to_string(),
            ..FilmStock::default()
        };
        s.grain_properties.clustering = category.to_string();
        s
    }

    fn scattered(n: usize, w: f32, h: f32) -> Vec<GrainParticle> {
        let mut rng = render_rng(Some(77));
        (0..n)
            .map(|_| particle(rng.random::<f32>() * w, rng.random::<f32>() * h))
            .collect()
    }

    #[test]
    fn test_seed_probability_by_category() {
        assert_eq!(seed_probability("heavy"), 0.25);
        assert_eq!(seed_probability("moderate"), 0.15);
        assert_eq!(seed_probability("mild"), 0.08);
        assert_eq!(seed_probability("anything"), 0.15);
    }

    #[test]
    fn test_clustering_preserves_count_order_and_attributes() {
        let original = scattered(500, 64.0, 64.0);
        let mut particles: Vec<GrainParticle> = original
            .iter()
            .enumerate()
            .map(|(i, p)| GrainParticle {
                opacity: i as f32 / 500.0,
                ..*p
            })
            .collect();
        let before = particles.clone();
        let params = GrainParams {
            clustering_strength: 1.0,
            ..GrainParams::default()
        };
        cluster_particles(&mut particles, &clustered_stock("heavy"), &params, 64, 64, &mut render_rng(Some(1)));

        assert_eq!(particles.len(), before.len());
        for (a, b) in particles.iter().zip(&before) {
            assert_eq!(a.opacity, b.opacity);
            assert_eq!(a.size, b.size);
            assert_eq!(a.color, b.color);
            assert!((0.0..64.0).contains(&a.x) && (0.0..64.0).contains(&a.y));
        }
        assert!(particles.iter().zip(&before).any(|(a, b)| a.x != b.x || a.y != b.y));
    }

    #[test]
    fn test_clustering_reduces_nearest_neighbour_distance() {
        let mean_nn = |ps: &[GrainParticle]| {
            ps.iter()
                .map(|p| {
                    ps.iter()
                        .filter(|q| !std::ptr::eq(*q, p))
                        .map(|q| (q.x - p.x).hypot(q.y - p.y))
                        .fold(f32::INFINITY, f32::min)
                })
                .sum::<f32>()
                / ps.len() as f32
        };

        let mut particles = scattered(400, 100.0, 100.0);
        let before = mean_nn(&particles);
        let params = GrainParams {
            clustering_strength: 1.0,
            spatial_correlation: 1.0,
            ..GrainParams::default()
        };
        cluster_particles(&mut particles, &clustered_stock("heavy"), &params, 100, 100, &mut render_rng(Some(8)));
        let after = mean_nn(&particles);
        assert!(after < before, "mean nearest neighbour {after} should drop below {before}");
    }

    #[test]
    fn test_zero_strength_is_noop() {
        let mut particles = scattered(100, 32.0, 32.0);
        let before = particles.clone();
        cluster_particles(
            &mut particles,
            &clustered_stock("heavy"),
            &GrainParams::default(),
            32,
            32,
            &mut render_rng(Some(1)),
        );
        assert_eq!(particles, before);
    }

    #[test]
    fn test_grid_nearest_within_reach() {
        let grid = SeedGrid::build([(0.0, 0.0), (10.0, 10.0)].into_iter(), 5.0);
        let (sx, sy, d) = grid.nearest(1.0, 1.0).unwrap();
        assert_eq!((sx, sy), (0.0, 0.0));
        assert!((d - 2f32.sqrt()).abs() < 1e-6);
        assert!(grid.nearest(5.0, 5.0).is_none());
    }
}
