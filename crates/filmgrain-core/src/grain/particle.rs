//! A single grain crystal and its shape tag.

use serde::{Deserialize, Serialize};

use crate::film_stock::GrainProperties;

/// Geometry family of a crystal.
///
/// Angular and irregular crystals have no dedicated geometry yet and are
/// drawn as circles; see [`GrainShape::footprint`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrainShape {
    #[default]
    Circular,
    Tabular,
    Angular,
    Irregular,
}

impl GrainShape {
    /// Classify a stock's crystals.
    ///
    /// The crystal type is checked before the shape label, so a T-grain
    /// emulsion is tabular whatever its shape says.
    pub fn classify(grain: &GrainProperties) -> Self {
        if grain.crystal_type == "tabular_t_grain" {
            return Self::Tabular;
        }
        match grain.shape.as_str() {
            "angular_irregular" => Self::Angular,
            "irregular_clustered" => Self::Irregular,
            _ => Self::Circular,
        }
    }

    /// The shape the rasterizer actually draws for this tag.
    pub const fn footprint(&self) -> Self {
        match self {
            Self::Tabular => Self::Tabular,
            Self::Circular | Self::Angular | Self::Irregular => Self::Circular,
        }
    }
}

/// One crystal in pixel space. Lives only for a single render call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrainParticle {
    pub x: f32,
    pub y: f32,
    /// Radius (circular) or height (tabular) in pixels.
    pub size: f32,
    /// Peak blend weight, `[0, 1]`.
    pub opacity: f32,
    /// Width over height.
    pub aspect_ratio: f32,
    /// Radians in `[0, 2π)`.
    pub rotation: f32,
    /// Packed `0xRRGGBBAA`.
    pub color: u32,
    pub shape: GrainShape,
}

/// Pack 8-bit components into `0xRRGGBBAA`.
pub const fn pack_rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    ((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | a as u32
}

/// Extract `[r, g, b]` from a packed `0xRRGGBBAA` value.
pub const fn unpack_rgb(color: u32) -> [u8; 3] {
    [
        ((color >> 24) & 0xFF) as u8,
        ((color >> 16) & 0xFF) as u8,
        ((color >> 8) & 0xFF) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grain(crystal_type: &str, shape: &str) -> GrainProperties {
        GrainProperties {
            crystal_type: crystal_type.to_string(),
            shape: shape.to_string(),
            ..GrainProperties::default()
        }
    }

    #[test]
    fn test_tabular_crystal_type_wins_over_shape() {
        let g = grain("tabular_t_grain", "angular_irregular");
        assert_eq!(GrainShape::classify(&g), GrainShape::Tabular);
    }

    #[test]
    fn test_shape_labels() {
        assert_eq!(
            GrainShape::classify(&grain("conventional_cubic", "angular_irregular")),
            GrainShape::Angular
        );
        assert_eq!(
            GrainShape::classify(&grain("conventional_cubic", "irregular_clustered")),
            GrainShape::Irregular
        );
        assert_eq!(
            GrainShape::classify(&grain("conventional_cubic", "round_uniform")),
            GrainShape::Circular
        );
    }

    #[test]
    fn test_angular_and_irregular_draw_as_circles() {
        assert_eq!(GrainShape::Angular.footprint(), GrainShape::Circular);
        assert_eq!(GrainShape::Irregular.footprint(), GrainShape::Circular);
        assert_eq!(GrainShape::Tabular.footprint(), GrainShape::Tabular);
    }

    #[test]
    fn test_pack_and_unpack_color() {
        let c = pack_rgba(0x12, 0x34, 0x56, 0xFF);
        assert_eq!(c, 0x1234_56FF);
        assert_eq!(unpack_rgb(c), [0x12, 0x34, 0x56]);
    }
}
