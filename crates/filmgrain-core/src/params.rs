//! Per-render grain parameters.
//!
//! `GrainParams` is supplied with every render call and never persisted.
//! Every render first rejects non-finite values with
//! [`GrainParams::validate`], then pulls the rest into their supported
//! ranges with [`GrainParams::clamped`].

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{FilmGrainError, Result};
use crate::film_stock::{FilmStock, ProcessingVariation};

/// Supported range of [`GrainParams::intensity`].
pub const INTENSITY_RANGE: RangeInclusive<f32> = 0.0..=3.0;
/// Supported range of [`GrainParams::opacity`].
pub const OPACITY_RANGE: RangeInclusive<f32> = 0.0..=1.0;
/// Supported range of [`GrainParams::size_multiplier`].
pub const SIZE_MULTIPLIER_RANGE: RangeInclusive<f32> = 0.1..=5.0;
/// Supported range of [`GrainParams::density_multiplier`].
pub const DENSITY_MULTIPLIER_RANGE: RangeInclusive<f32> = 0.1..=3.0;

/// Development push/pull applied to the emulated negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingType {
    #[default]
    Normal,
    Push1Stop,
    Push2Stop,
    Pull1Stop,
}

impl ProcessingType {
    /// The stock's recorded variation for this processing mode, if any.
    pub fn variation<'a>(&self, stock: &'a FilmStock) -> Option<&'a ProcessingVariation> {
        let v = &stock.processing_variations;
        match self {
            Self::Normal => None,
            Self::Push1Stop => v.push_1_stop.as_ref(),
            Self::Push2Stop => v.push_2_stop.as_ref(),
            Self::Pull1Stop => v.pull_1_stop.as_ref(),
        }
    }

    /// `(size, density)` multipliers for this mode on `stock`.
    ///
    /// `(1.0, 1.0)` for normal processing or when the stock has no data.
    pub fn multipliers(&self, stock: &FilmStock) -> (f32, f32) {
        self.variation(stock)
            .map_or((1.0, 1.0), |v| (v.size_increase, v.density_change))
    }
}

/// Render quality preset. Carried for callers; the CPU path renders every
/// particle at every level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    Draft,
    #[default]
    Normal,
    High,
    Ultra,
}

/// Every knob a render call accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrainParams {
    /// Overall effect strength; scales each particle's blend weight when it
    /// is composited. Default: 1.0.
    pub intensity: f32,
    /// Multiplier on the stock's opacity range. Default: 0.6.
    pub opacity: f32,
    /// Multiplier on crystal size. Default: 1.0.
    pub size_multiplier: f32,
    /// Multiplier on particle count. Default: 1.0.
    pub density_multiplier: f32,

    pub processing: ProcessingType,

    pub enable_halation: bool,
    /// Multiplier on the stock's halation weight. Default: 1.0.
    pub halation_strength: f32,

    /// `[0, 1]`. Widens clustering reach beyond the stock's own correlation.
    pub spatial_correlation: f32,
    /// `[0, 1]`. 0 disables clustering.
    pub clustering_strength: f32,

    pub enable_color_variation: bool,
    /// `[0, 1]`. How far color grain channels may drift apart.
    pub color_variation_strength: f32,

    pub quality: Quality,
    /// Prefer a GPU path. Without one the CPU path runs instead.
    pub use_gpu_acceleration: bool,

    /// Seed for the particle generator. `None` draws a fresh stream.
    pub seed: Option<u64>,
}

impl Default for GrainParams {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            opacity: 0.6,
            size_multiplier: 1.0,
            density_multiplier: 1.0,
            processing: ProcessingType::Normal,
            enable_halation: false,
            halation_strength: 1.0,
            spatial_correlation: 0.0,
            clustering_strength: 0.0,
            enable_color_variation: true,
            color_variation_strength: 1.0,
            quality: Quality::Normal,
            use_gpu_acceleration: true,
            seed: None,
        }
    }
}

impl GrainParams {
    /// Same parameters with a fixed generator seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Reject NaN and infinite values. Finite values outside a supported
    /// range are accepted; [`clamped`](Self::clamped) handles those.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("intensity", self.intensity),
            ("opacity", self.opacity),
            ("size_multiplier", self.size_multiplier),
            ("density_multiplier", self.density_multiplier),
            ("halation_strength", self.halation_strength),
            ("spatial_correlation", self.spatial_correlation),
            ("clustering_strength", self.clustering_strength),
            ("color_variation_strength", self.color_variation_strength),
        ];
        match fields.iter().find(|(_, v)| !v.is_finite()) {
            Some((name, value)) => Err(FilmGrainError::InvalidParams(format!(
                "{name} must be finite (got {value})"
            ))),
            None => Ok(()),
        }
    }

    /// Copy with every bounded field pulled into its supported range.
    pub fn clamped(&self) -> Self {
        Self {
            intensity: clamp_to(self.intensity, &INTENSITY_RANGE),
            opacity: clamp_to(self.opacity, &OPACITY_RANGE),
            size_multiplier: clamp_to(self.size_multiplier, &SIZE_MULTIPLIER_RANGE),
            density_multiplier: clamp_to(self.density_multiplier, &DENSITY_MULTIPLIER_RANGE),
            halation_strength: self.halation_strength.max(0.0),
            spatial_correlation: self.spatial_correlation.clamp(0.0, 1.0),
            clustering_strength: self.clustering_strength.clamp(0.0, 1.0),
            color_variation_strength: self.color_variation_strength.clamp(0.0, 1.0),
            ..self.clone()
        }
    }
}

fn clamp_to(value: f32, range: &RangeInclusive<f32>) -> f32 {
    value.clamp(*range.start(), *range.end())
}
