//! Film stock descriptors and the database that serves them.
//!
//! A [`FilmStock`] is immutable once loaded. The database hands out
//! `Arc<FilmStock>` so any number of in-flight renders can read the same
//! descriptor without copying it.

pub mod database;
mod schema;

pub use database::{FilmStockDatabase, StockLookup};

use serde::{Deserialize, Serialize};

use crate::error::{FilmGrainError, Result};

/// Largest accepted crystal density, per mm².
pub const MAX_DENSITY_PER_MM2: f32 = 1.0e6;
/// Largest accepted halation radius, in pixels.
pub const MAX_HALATION_RADIUS: f32 = 512.0;

/// Broad emulsion family. Selects the tonal curve in the color response stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilmType {
    BlackAndWhite,
    ColorNegative,
    ColorSlide,
}

impl FilmType {
    /// Parse the database type tag. Unknown tags fall back to black and white.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "color_negative" => Self::ColorNegative,
            "slide" | "color_slide" => Self::ColorSlide,
            _ => Self::BlackAndWhite,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::BlackAndWhite => "Black & White",
            Self::ColorNegative => "Color Negative",
            Self::ColorSlide => "Color Slide",
        }
    }
}

/// Overall contrast character of a stock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContrastLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl ContrastLevel {
    /// Parse a contrast label. Anything but `low`/`high` is medium.
    pub fn parse(label: &str) -> Self {
        match label {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }

    /// Scale factor applied around mid-gray after the tonal curve.
    pub const fn factor(&self) -> f32 {
        match self {
            Self::Low => 0.8,
            Self::Medium => 1.0,
            Self::High => 1.2,
        }
    }
}

/// Strength category of the red glow around highlights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Halation {
    #[default]
    None,
    Mild,
    Moderate,
    Strong,
    VeryStrong,
}

impl Halation {
    pub fn parse(label: &str) -> Self {
        match label {
            "mild" => Self::Mild,
            "moderate" => Self::Moderate,
            "strong" => Self::Strong,
            "very_strong" => Self::VeryStrong,
            _ => Self::None,
        }
    }

    /// Blend weight of the halation color at full mask coverage.
    pub const fn weight(&self) -> f32 {
        match self {
            Self::None => 0.0,
            Self::Mild => 0.25,
            Self::Moderate => 0.5,
            Self::Strong => 0.75,
            Self::VeryStrong => 1.0,
        }
    }
}

/// Crystal geometry and population statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrainProperties {
    /// Smallest crystal size in µm.
    pub min_size_um: f32,
    /// Largest crystal size in µm.
    pub max_size_um: f32,
    /// Mean crystal size in µm.
    pub avg_size_um: f32,
    /// Standard deviation of size as a fraction of the mean.
    pub size_variation_coeff: f32,
    /// Crystals per mm² of film area.
    pub density_per_mm2: f32,
    /// e.g. `conventional_cubic`, `tabular_t_grain`.
    pub crystal_type: String,
    /// e.g. `irregular_clustered`, `angular_irregular`, `round_uniform`.
    pub shape: String,
    /// `isolated`, `moderate`, `heavy`, ...
    pub clustering: String,
    /// Crystal width component of the aspect ratio.
    pub aspect_ratio_x: f32,
    /// Crystal height component of the aspect ratio.
    pub aspect_ratio_y: f32,
}

impl Default for GrainProperties {
    fn default() -> Self {
        Self {
            min_size_um: 0.5,
            max_size_um: 3.0,
            avg_size_um: 1.5,
            size_variation_coeff: 0.4,
            density_per_mm2: 10_000.0,
            crystal_type: "conventional_cubic".to_string(),
            shape: "round_uniform".to_string(),
            clustering: "isolated".to_string(),
            aspect_ratio_x: 1.0,
            aspect_ratio_y: 1.0,
        }
    }
}

/// How visible the grain is and how the stock renders contrast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualProperties {
    /// Lower bound of per-crystal opacity, `[0, 1]`.
    pub opacity_min: f32,
    /// Upper bound of per-crystal opacity, `[0, 1]`.
    pub opacity_max: f32,
    /// Spread of opacity within the range. Informational.
    pub opacity_variation: f32,
    /// Selects the contrast factor of the color response.
    pub contrast_level: ContrastLevel,
    /// `soft`, `sharp`, ... Informational.
    pub edge_definition: String,
    /// Grain visibility weight in highlights, `[0, 1]`.
    pub highlight_visibility: f32,
    /// Grain visibility weight in shadows, `[0, 1]`.
    pub shadow_visibility: f32,
    /// Grain visibility weight in midtones, `[0, 1]`.
    pub midtone_prominence: f32,
}

impl Default for VisualProperties {
    fn default() -> Self {
        Self {
            opacity_min: 0.1,
            opacity_max: 0.8,
            opacity_variation: 0.5,
            contrast_level: ContrastLevel::Medium,
            edge_definition: "soft".to_string(),
            highlight_visibility: 0.66,
            shadow_visibility: 0.66,
            midtone_prominence: 0.66,
        }
    }
}

/// A weighted band of grain colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RgbRange {
    /// Inclusive red bounds.
    pub r: [u8; 2],
    /// Inclusive green bounds.
    pub g: [u8; 2],
    /// Inclusive blue bounds.
    pub b: [u8; 2],
    /// Relative share of this band among the stock's ranges.
    pub weight: f32,
}

/// Color character of the grain and the dye layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorProperties {
    /// `neutral`, `warm`, `cool`, ...
    pub primary_cast: String,
    /// Weighted grain color bands, as recorded for the stock.
    pub rgb_ranges: Vec<RgbRange>,
    /// `low`, `medium`, `high`. Informational.
    pub color_variation: String,
    /// `low`, `medium`, `high`. Informational.
    pub saturation_level: String,
}

impl Default for ColorProperties {
    fn default() -> Self {
        Self {
            primary_cast: "neutral".to_string(),
            rgb_ranges: Vec::new(),
            color_variation: "low".to_string(),
            saturation_level: "medium".to_string(),
        }
    }
}

/// Optical effects beyond the grain itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialEffects {
    /// Strength category of the highlight glow.
    pub halation: Halation,
    /// Packed `0xRRGGBBAA`.
    pub halation_color: u32,
    /// Glow radius in pixels.
    pub halation_radius: f32,
    /// Free-form artifact tags, e.g. `red_halation`.
    pub unique_artifacts: Vec<String>,
    /// How the emulsion responds to strong light. Informational.
    pub light_interaction: String,
}

impl Default for SpecialEffects {
    fn default() -> Self {
        Self {
            halation: Halation::None,
            halation_color: 0xFFFF_FFFF,
            halation_radius: 0.0,
            unique_artifacts: Vec::new(),
            light_interaction: "normal".to_string(),
        }
    }
}

/// How pushing or pulling development changes the grain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingVariation {
    /// Multiplier on grain size.
    pub size_increase: f32,
    /// Multiplier on grain count.
    pub density_change: f32,
    /// `increased`, `decreased`, ... Informational.
    #[serde(default)]
    pub contrast_change: String,
}

/// Recorded push/pull behavior. Missing modes render like normal processing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingVariations {
    #[serde(default)]
    pub push_1_stop: Option<ProcessingVariation>,
    #[serde(default)]
    pub push_2_stop: Option<ProcessingVariation>,
    #[serde(default)]
    pub pull_1_stop: Option<ProcessingVariation>,
}

/// Parameters for the spatial distribution of crystals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmicData {
    /// Name of the point process the stock was measured against.
    pub clustering_algorithm: String,
    /// Name of the size distribution. Sizes are always drawn from a normal.
    pub distribution_function: String,
    /// `[0, 1]`; higher values keep neighbouring crystals together.
    pub spatial_correlation: f32,
    /// Box-counting dimension of the crystal outline. Informational.
    pub fractal_dimension: f32,
}

impl Default for AlgorithmicData {
    fn default() -> Self {
        Self {
            clustering_algorithm: "poisson".to_string(),
            distribution_function: "normal".to_string(),
            spatial_correlation: 0.0,
            fractal_dimension: 1.0,
        }
    }
}

/// Everything the renderer knows about one emulsion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmStock {
    /// Database key, e.g. `kodak_tri_x_400`.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// First word of the display name unless the record names one.
    pub manufacturer: String,
    /// Box speed.
    pub iso_speed: u32,
    pub film_type: FilmType,
    pub grain_properties: GrainProperties,
    pub visual_properties: VisualProperties,
    pub color_properties: ColorProperties,
    pub special_effects: SpecialEffects,
    /// Push/pull multipliers, where the stock has them.
    #[serde(default)]
    pub processing_variations: ProcessingVariations,
    pub algorithmic_data: AlgorithmicData,
}

impl Default for FilmStock {
    fn default() -> Self {
        Self {
            id: String::new(),
            display_name: String::new(),
            manufacturer: String::new(),
            iso_speed: 400,
            film_type: FilmType::BlackAndWhite,
            grain_properties: GrainProperties::default(),
            visual_properties: VisualProperties::default(),
            color_properties: ColorProperties::default(),
            special_effects: SpecialEffects::default(),
            processing_variations: ProcessingVariations::default(),
            algorithmic_data: AlgorithmicData::default(),
        }
    }
}

impl FilmStock {
    /// Check the invariants the renderer relies on.
    pub fn validate(&self) -> Result<()> {
        let g = &self.grain_properties;
        let v = &self.visual_properties;

        if self.id.is_empty() {
            return Err(self.invalid("empty id"));
        }
        if let Some(name) = self.first_non_finite() {
            return Err(self.invalid(format!("{name} must be finite")));
        }
        if !(g.min_size_um >= 0.0 && g.min_size_um <= g.avg_size_um && g.avg_size_um <= g.max_size_um)
        {
            return Err(self.invalid(format!(
                "grain sizes must satisfy 0 <= min <= avg <= max (got {} / {} / {})",
                g.min_size_um, g.avg_size_um, g.max_size_um
            )));
        }
        if g.size_variation_coeff < 0.0 {
            return Err(self.invalid("negative size variation"));
        }
        if !(0.0..=MAX_DENSITY_PER_MM2).contains(&g.density_per_mm2) {
            return Err(self.invalid(format!(
                "grain density must lie in [0, {MAX_DENSITY_PER_MM2}] (got {})",
                g.density_per_mm2
            )));
        }
        if !(g.aspect_ratio_x > 0.0 && g.aspect_ratio_y > 0.0) {
            return Err(self.invalid("aspect ratio components must be positive"));
        }
        if !(0.0 <= v.opacity_min && v.opacity_min <= v.opacity_max && v.opacity_max <= 1.0) {
            return Err(self.invalid(format!(
                "opacity range must be ordered within [0, 1] (got [{}, {}])",
                v.opacity_min, v.opacity_max
            )));
        }
        if !(0.0..=1.0).contains(&self.algorithmic_data.spatial_correlation) {
            return Err(self.invalid("spatial correlation outside [0, 1]"));
        }
        if !(0.0..=MAX_HALATION_RADIUS).contains(&self.special_effects.halation_radius) {
            return Err(self.invalid(format!(
                "halation radius must lie in [0, {MAX_HALATION_RADIUS}] (got {})",
                self.special_effects.halation_radius
            )));
        }
        let p = &self.processing_variations;
        for variation in [&p.push_1_stop, &p.push_2_stop, &p.pull_1_stop].into_iter().flatten() {
            if !(variation.size_increase > 0.0 && variation.density_change >= 0.0) {
                return Err(self.invalid("processing multipliers must be positive"));
            }
        }
        Ok(())
    }

    /// Name of the first float field holding NaN or an infinity.
    fn first_non_finite(&self) -> Option<&'static str> {
        let g = &self.grain_properties;
        let v = &self.visual_properties;
        let p = &self.processing_variations;
        let mut fields = vec![
            ("min_size_um", g.min_size_um),
            ("max_size_um", g.max_size_um),
            ("avg_size_um", g.avg_size_um),
            ("size_variation_coeff", g.size_variation_coeff),
            ("density_per_mm2", g.density_per_mm2),
            ("aspect_ratio_x", g.aspect_ratio_x),
            ("aspect_ratio_y", g.aspect_ratio_y),
            ("opacity_min", v.opacity_min),
            ("opacity_max", v.opacity_max),
            ("opacity_variation", v.opacity_variation),
            ("highlight_visibility", v.highlight_visibility),
            ("shadow_visibility", v.shadow_visibility),
            ("midtone_prominence", v.midtone_prominence),
            ("halation_radius", self.special_effects.halation_radius),
            ("spatial_correlation", self.algorithmic_data.spatial_correlation),
            ("fractal_dimension", self.algorithmic_data.fractal_dimension),
        ];
        for variation in [&p.push_1_stop, &p.push_2_stop, &p.pull_1_stop].into_iter().flatten() {
            fields.push(("size_increase", variation.size_increase));
            fields.push(("density_change", variation.density_change));
        }
        let weights = self.color_properties.rgb_ranges.iter();
        fields.extend(weights.map(|r| ("rgb_ranges.weight", r.weight)));
        fields.into_iter().find(|(_, value)| !value.is_finite()).map(|(name, _)| name)
    }

    /// Width-to-height ratio of a single crystal.
    pub fn aspect_ratio(&self) -> f32 {
        self.grain_properties.aspect_ratio_x / self.grain_properties.aspect_ratio_y
    }

    fn invalid(&self, reason: impl Into<String>) -> FilmGrainError {
        FilmGrainError::InvalidStock {
            id: self.id.clone(),
            reason: reason.into(),
        }
    }
}
