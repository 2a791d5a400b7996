//! On-disk JSON layout of the film stock database.
//!
//! The file is an object keyed by stock id. Each record groups its fields
//! the way the research data was collected (`basic_info`, `size_metrics`,
//! ...), which differs from the runtime [`FilmStock`] grouping, so records
//! are deserialized here and converted. Keys not listed are ignored.

use serde::Deserialize;

use super::{
    AlgorithmicData, ColorProperties, ContrastLevel, FilmStock, FilmType, GrainProperties,
    Halation, ProcessingVariations, RgbRange, SpecialEffects, VisualProperties,
};
use crate::error::{FilmGrainError, Result};

#[derive(Debug, Deserialize)]
pub(crate) struct StockRecord {
    basic_info: BasicInfo,
    grain_structure: GrainStructure,
    size_metrics: SizeMetrics,
    visual_properties: VisualRecord,
    #[serde(default)]
    color_properties: ColorRecord,
    #[serde(default)]
    special_effects: EffectsRecord,
    #[serde(default)]
    processing_variations: ProcessingVariations,
    #[serde(default)]
    algorithmic_data: AlgorithmicRecord,
}

#[derive(Debug, Deserialize)]
struct BasicInfo {
    name: String,
    #[serde(default)]
    manufacturer: Option<String>,
    iso: u32,
    #[serde(rename = "type")]
    film_type: String,
}

#[derive(Debug, Deserialize)]
struct GrainStructure {
    crystal_type: String,
    shape: String,
    #[serde(default)]
    aspect_ratio: Vec<f32>,
    #[serde(default = "default_clustering")]
    clustering: String,
}

#[derive(Debug, Deserialize)]
struct SizeMetrics {
    min_size_um: f32,
    max_size_um: f32,
    avg_size_um: f32,
    size_variation_coeff: f32,
    density_per_mm2: f32,
}

#[derive(Debug, Deserialize)]
struct VisualRecord {
    opacity_range: [f32; 2],
    #[serde(default)]
    contrast_level: String,
    #[serde(default)]
    edge_definition: String,
    #[serde(default)]
    opacity_variation: f32,
    #[serde(default)]
    highlight_visibility: Option<Visibility>,
    #[serde(default)]
    shadow_visibility: Option<Visibility>,
    #[serde(default)]
    midtone_prominence: Option<Visibility>,
}

/// Visibility is recorded either as a label or as a weight.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Visibility {
    Weight(f32),
    Label(String),
}

impl Visibility {
    fn weight(&self) -> f32 {
        match self {
            Self::Weight(w) => w.clamp(0.0, 1.0),
            Self::Label(label) => match label.as_str() {
                "very_low" => 0.15,
                "low" => 0.33,
                "high" => 0.85,
                "very_high" => 1.0,
                _ => 0.66,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ColorRecord {
    #[serde(default)]
    primary_cast: Option<String>,
    #[serde(default)]
    rgb_ranges: Vec<RgbRangeRecord>,
    #[serde(default)]
    color_variation: Option<String>,
    #[serde(default)]
    saturation_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RgbRangeRecord {
    r: [u8; 2],
    g: [u8; 2],
    b: [u8; 2],
    #[serde(default = "default_weight")]
    weight: f32,
}

#[derive(Debug, Default, Deserialize)]
struct EffectsRecord {
    #[serde(default)]
    halation: String,
    #[serde(default)]
    halation_color: Option<String>,
    #[serde(default)]
    halation_radius: f32,
    #[serde(default)]
    unique_artifacts: Vec<String>,
    #[serde(default)]
    light_interaction: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AlgorithmicRecord {
    #[serde(default)]
    clustering_algorithm: Option<String>,
    #[serde(default)]
    distribution_function: Option<String>,
    #[serde(default)]
    spatial_correlation: f32,
    #[serde(default)]
    fractal_dimension: Option<f32>,
}

fn default_clustering() -> String {
    "isolated".to_string()
}

fn default_weight() -> f32 {
    1.0
}

impl StockRecord {
    /// Convert into the runtime descriptor. Does not validate invariants.
    pub(crate) fn into_stock(self, id: &str) -> Result<FilmStock> {
        let invalid = |reason: String| FilmGrainError::InvalidStock {
            id: id.to_string(),
            reason,
        };

        let (aspect_x, aspect_y) = match self.grain_structure.aspect_ratio.as_slice() {
            [x, y, ..] => (*x, *y),
            _ => (1.0, 1.0),
        };

        let halation_color = match self.special_effects.halation_color.as_deref() {
            Some(hex) => parse_hex_color(hex)
                .ok_or_else(|| invalid(format!("bad halation color {hex:?}")))?,
            None => SpecialEffects::default().halation_color,
        };

        let manufacturer = self.basic_info.manufacturer.clone().unwrap_or_else(|| {
            self.basic_info
                .name
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string()
        });

        let visual = &self.visual_properties;
        let visual_defaults = VisualProperties::default();
        let color_defaults = ColorProperties::default();
        let algo_defaults = AlgorithmicData::default();

        Ok(FilmStock {
            id: id.to_string(),
            display_name: self.basic_info.name,
            manufacturer,
            iso_speed: self.basic_info.iso,
            film_type: FilmType::parse(&self.basic_info.film_type),
            grain_properties: GrainProperties {
                min_size_um: self.size_metrics.min_size_um,
                max_size_um: self.size_metrics.max_size_um,
                avg_size_um: self.size_metrics.avg_size_um,
                size_variation_coeff: self.size_metrics.size_variation_coeff,
                density_per_mm2: self.size_metrics.density_per_mm2,
                crystal_type: self.grain_structure.crystal_type,
                shape: self.grain_structure.shape,
                clustering: self.grain_structure.clustering,
                aspect_ratio_x: aspect_x,
                aspect_ratio_y: aspect_y,
            },
            visual_properties: VisualProperties {
                opacity_min: visual.opacity_range[0],
                opacity_max: visual.opacity_range[1],
                opacity_variation: visual.opacity_variation,
                contrast_level: ContrastLevel::parse(&visual.contrast_level),
                edge_definition: if visual.edge_definition.is_empty() {
                    visual_defaults.edge_definition
                } else {
                    visual.edge_definition.clone()
                },
                highlight_visibility: visual
                    .highlight_visibility
                    .as_ref()
                    .map_or(visual_defaults.highlight_visibility, Visibility::weight),
                shadow_visibility: visual
                    .shadow_visibility
                    .as_ref()
                    .map_or(visual_defaults.shadow_visibility, Visibility::weight),
                midtone_prominence: visual
                    .midtone_prominence
                    .as_ref()
                    .map_or(visual_defaults.midtone_prominence, Visibility::weight),
            },
            color_properties: ColorProperties {
                primary_cast: self
                    .color_properties
                    .primary_cast
                    .unwrap_or(color_defaults.primary_cast),
                rgb_ranges: self
                    .color_properties
                    .rgb_ranges
                    .into_iter()
                    .map(|r| RgbRange {
                        r: r.r,
                        g: r.g,
                        b: r.b,
                        weight: r.weight,
                    })
                    .collect(),
                color_variation: self
                    .color_properties
                    .color_variation
                    .unwrap_or(color_defaults.color_variation),
                saturation_level: self
                    .color_properties
                    .saturation_level
                    .unwrap_or(color_defaults.saturation_level),
            },
            special_effects: SpecialEffects {
                halation: Halation::parse(&self.special_effects.halation),
                halation_color,
                halation_radius: self.special_effects.halation_radius,
                unique_artifacts: self.special_effects.unique_artifacts,
                light_interaction: self
                    .special_effects
                    .light_interaction
                    .unwrap_or_else(|| "normal".to_string()),
            },
            processing_variations: self.processing_variations,
            algorithmic_data: AlgorithmicData {
                clustering_algorithm: self
                    .algorithmic_data
                    .clustering_algorithm
                    .unwrap_or(algo_defaults.clustering_algorithm),
                distribution_function: self
                    .algorithmic_data
                    .distribution_function
                    .unwrap_or(algo_defaults.distribution_function),
                spatial_correlation: self.algorithmic_data.spatial_correlation,
                fractal_dimension: self
                    .algorithmic_data
                    .fractal_dimension
                    .unwrap_or(algo_defaults.fractal_dimension),
            },
        })
    }
}

/// Parse `#rrggbb` or `#rrggbbaa` into packed `0xRRGGBBAA`.
pub(crate) fn parse_hex_color(hex: &str) -> Option<u32> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let value = u32::from_str_radix(digits, 16).ok()?;
    match digits.len() {
        6 => Some((value << 8) | 0xFF),
        8 => Some(value),
        _ => None,
    }
}
