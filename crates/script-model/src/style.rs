//! Caption styling: colors, anchor positions, and the resolved style.
//!
//! Style values arrive as loose strings from script producers. Parsing
//! never fails a job: an unusable value is reported and replaced by the
//! default for that field.

use serde::{Deserialize, Serialize};

/// An RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::opaque(0xFF, 0xFF, 0xFF);
    pub const BLACK: Rgba = Rgba::opaque(0, 0, 0);

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xFF }
    }

    /// Parse `#RGB`, `#RRGGBB`, `#RRGGBBAA` (also with a `0x` prefix) or a
    /// small set of color names.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();
        let named = match lower.as_str() {
            "white" => Some(Self::WHITE),
            "black" => Some(Self::BLACK),
            "red" => Some(Self::opaque(0xFF, 0, 0)),
            "green" => Some(Self::opaque(0, 0x80, 0)),
            "blue" => Some(Self::opaque(0, 0, 0xFF)),
            "yellow" => Some(Self::opaque(0xFF, 0xFF, 0)),
            "transparent" => Some(Self {
                r: 0,
                g: 0,
                b: 0,
                a: 0,
            }),
            _ => None,
        };
        if named.is_some() {
            return named;
        }

        let hex = lower
            .strip_prefix('#')
            .or_else(|| lower.strip_prefix("0x"))?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let byte = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => {
                let nib = |i: usize| byte(&hex[i..i + 1]).map(|v| v * 17);
                Some(Self::opaque(nib(0)?, nib(1)?, nib(2)?))
            }
            6 => Some(Self::opaque(
                byte(&hex[0..2])?,
                byte(&hex[2..4])?,
                byte(&hex[4..6])?,
            )),
            8 => Some(Self {
                r: byte(&hex[0..2])?,
                g: byte(&hex[2..4])?,
                b: byte(&hex[4..6])?,
                a: byte(&hex[6..8])?,
            }),
            _ => None,
        }
    }

    /// Alpha as a 0.0..=1.0 fraction.
    pub fn alpha_fraction(&self) -> f64 {
        self.a as f64 / 255.0
    }

    /// ffmpeg color syntax (`0xRRGGBB@alpha`).
    pub fn to_ffmpeg(&self) -> String {
        format!(
            "0x{:02X}{:02X}{:02X}@{:.3}",
            self.r,
            self.g,
            self.b,
            self.alpha_fraction()
        )
    }
}

/// Anchor position of a caption on the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionPosition {
    Top,
    Center,
    Bottom,
}

impl CaptionPosition {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "top" => Some(Self::Top),
            "center" | "centre" | "middle" => Some(Self::Center),
            "bottom" => Some(Self::Bottom),
            _ => None,
        }
    }
}

/// Style fields exactly as provided by the script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptionStyleSpec {
    /// Pixel size; numbers and numeric strings (`"48"`, `"48px"`) are accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

/// A fully resolved caption style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionStyle {
    pub font_size: u32,
    pub font_color: Rgba,
    pub background_color: Rgba,
    pub position: CaptionPosition,
}

impl Default for CaptionStyle {
    /// 48 px white text on translucent black, anchored at the bottom.
    fn default() -> Self {
        Self {
            font_size: 48,
            font_color: Rgba::WHITE,
            background_color: Rgba {
                r: 0,
                g: 0,
                b: 0,
                a: 0xAA,
            },
            position: CaptionPosition::Bottom,
        }
    }
}

/// Largest caption font size accepted before falling back.
pub const MAX_CAPTION_FONT_SIZE: u32 = 400;

impl CaptionStyleSpec {
    /// Resolve against the default style. Returns the style plus one
    /// message per field that had to fall back.
    pub fn resolve(&self) -> (CaptionStyle, Vec<String>) {
        let default = CaptionStyle::default();
        let mut problems = Vec::new();

        let font_size = match &self.font_size {
            None => default.font_size,
            Some(value) => match parse_font_size(value) {
                Some(size) => size,
                None => {
                    problems.push(format!("invalid font_size {value}"));
                    default.font_size
                }
            },
        };

        let mut color = |field: &str, raw: &Option<String>, fallback: Rgba| match raw {
            None => fallback,
            Some(text) => Rgba::parse(text).unwrap_or_else(|| {
                problems.push(format!("invalid {field} '{text}'"));
                fallback
            }),
        };
        let font_color = color("font_color", &self.font_color, default.font_color);
        let background_color = color(
            "background_color",
            &self.background_color,
            default.background_color,
        );

        let position = match &self.position {
            None => default.position,
            Some(text) => CaptionPosition::parse(text).unwrap_or_else(|| {
                problems.push(format!("invalid position '{text}'"));
                default.position
            }),
        };

        (
            CaptionStyle {
                font_size,
                font_color,
                background_color,
                position,
            },
            problems,
        )
    }
}

fn parse_font_size(value: &serde_json::Value) -> Option<u32> {
    let size = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().trim_end_matches("px").trim().parse().ok()?,
        _ => return None,
    };
    if size.is_finite() && size >= 1.0 && size <= MAX_CAPTION_FONT_SIZE as f64 {
        Some(size.round() as u32)
    } else {
        None
    }
}
