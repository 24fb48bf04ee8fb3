//! Shared color palette fed uniformly to every scene.
//!
//! A [`Palette`] is extracted from cover art by a collaborator and delivered
//! as one value. It is replaced wholesale on new artwork and shared read-only
//! by all scenes, so swaps are always full `Arc` replacements.

use serde::{Deserialize, Serialize};

/// An RGB color with normalized channels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parse a `#rrggbb` (or bare `rrggbb`) hex string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .ok()
                .map(|v| v as f32 / 255.0)
        };
        Some(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    /// As a vec4 with the given alpha, for uniform upload.
    pub fn to_vec4(self, a: f32) -> [f32; 4] {
        [self.r, self.g, self.b, a]
    }

    pub fn lerp(self, other: Color, t: f32) -> Color {
        let mixed = glam::Vec3::from(self.to_array()).lerp(glam::Vec3::from(other.to_array()), t);
        Color::rgb(mixed.x, mixed.y, mixed.z)
    }
}

/// Dominant/accent colors plus an ordered swatch list (at least one entry).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    pub dominant: Color,
    pub accent: Color,
    pub swatches: Vec<Color>,
}

impl Palette {
    pub fn new(dominant: Color, accent: Color, swatches: Vec<Color>) -> Self {
        let swatches = if swatches.is_empty() {
            vec![accent]
        } else {
            swatches
        };
        Self {
            dominant,
            accent,
            swatches,
        }
    }

    /// Swatch by index, wrapping around the list. Always defined.
    pub fn swatch(&self, index: usize) -> Color {
        if self.swatches.is_empty() {
            return self.accent;
        }
        self.swatches[index % self.swatches.len()]
    }
}

impl Default for Palette {
    /// Boot palette used until the first cover art arrives.
    fn default() -> Self {
        let green = Color::from_hex("#1db954").unwrap_or(Color::WHITE);
        Self {
            dominant: green,
            accent: green,
            swatches: vec![
                green,
                Color::WHITE,
                Color::from_hex("#232323").unwrap_or(Color::BLACK),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colors() {
        let c = Color::from_hex("#1db954").unwrap();
        assert!((c.r - 29.0 / 255.0).abs() < 0.001);
        assert!((c.g - 185.0 / 255.0).abs() < 0.001);
        assert!((c.b - 84.0 / 255.0).abs() < 0.001);

        assert_eq!(Color::from_hex("ffffff").unwrap(), Color::WHITE);
        assert!(Color::from_hex("#fff").is_none());
        assert!(Color::from_hex("#zzzzzz").is_none());
    }

    #[test]
    fn swatch_wraps() {
        let palette = Palette::new(
            Color::BLACK,
            Color::WHITE,
            vec![Color::rgb(1.0, 0.0, 0.0), Color::rgb(0.0, 1.0, 0.0)],
        );
        assert_eq!(palette.swatch(0), palette.swatch(2));
        assert_eq!(palette.swatch(1), palette.swatch(3));
    }

    #[test]
    fn empty_swatches_fall_back_to_accent() {
        let palette = Palette::new(Color::BLACK, Color::WHITE, vec![]);
        assert_eq!(palette.swatch(0), Color::WHITE);
        assert_eq!(palette.swatches.len(), 1);
    }

    #[test]
    fn default_palette_has_boot_colors() {
        let palette = Palette::default();
        assert_eq!(palette.swatches.len(), 3);
        assert_eq!(palette.dominant, palette.accent);
    }
}
