pub mod geometry;
pub mod r#trait;

pub use geometry::{Offset, PositionExpr, PADDING};
pub use r#trait::{CompositeJob, Compositor};

use crate::error::{Result, WatermarkError};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_OPACITY: f32 = 0.7;
pub const DEFAULT_SCALE: f32 = 0.2;

/// Named placement of the watermark inside the container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    Center,
    BottomLeft,
    BottomCenter,
    #[default]
    BottomRight,
}

impl Anchor {
    pub const ALL: [Anchor; 7] = [
        Anchor::TopLeft,
        Anchor::TopCenter,
        Anchor::TopRight,
        Anchor::Center,
        Anchor::BottomLeft,
        Anchor::BottomCenter,
        Anchor::BottomRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Anchor::TopLeft => "top-left",
            Anchor::TopCenter => "top-center",
            Anchor::TopRight => "top-right",
            Anchor::Center => "center",
            Anchor::BottomLeft => "bottom-left",
            Anchor::BottomCenter => "bottom-center",
            Anchor::BottomRight => "bottom-right",
        }
    }

    /// Lenient lookup: anything outside the seven names becomes `bottom-right`.
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}

impl FromStr for Anchor {
    type Err = WatermarkError;

    fn from_str(s: &str) -> Result<Self> {
        Anchor::ALL
            .into_iter()
            .find(|anchor| anchor.as_str() == s.trim())
            .ok_or_else(|| WatermarkError::InvalidArgument(format!("unknown position: {s}")))
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options as they arrive from a caller: untyped strings, any of them missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOptions {
    pub position: Option<String>,
    pub opacity: Option<String>,
    pub scale: Option<String>,
}

impl RawOptions {
    /// Fill every missing field from `fallback`.
    pub fn or(self, fallback: &RawOptions) -> RawOptions {
        RawOptions {
            position: self.position.or_else(|| fallback.position.clone()),
            opacity: self.opacity.or_else(|| fallback.opacity.clone()),
            scale: self.scale.or_else(|| fallback.scale.clone()),
        }
    }
}

/// Per-batch watermark settings. Immutable once a batch starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WatermarkOptions {
    pub position: Anchor,
    /// 0.0 (invisible) ..= 1.0 (as authored)
    pub opacity: f32,
    /// Watermark width as a fraction of the container width, in (0, 1].
    pub scale: f32,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            position: Anchor::BottomRight,
            opacity: DEFAULT_OPACITY,
            scale: DEFAULT_SCALE,
        }
    }
}

impl WatermarkOptions {
    pub fn new(position: Anchor, opacity: f32, scale: f32) -> Self {
        Self {
            position,
            opacity: sanitize_opacity(opacity),
            scale: sanitize_scale(scale),
        }
    }

    /// Parse caller-supplied strings. Never fails: missing or non-numeric
    /// values take the defaults, out-of-range values are pulled into range.
    pub fn from_raw(raw: &RawOptions) -> Self {
        let position = raw
            .position
            .as_deref()
            .map(Anchor::from_name)
            .unwrap_or_default();
        let opacity = parse_number(raw.opacity.as_deref()).unwrap_or(DEFAULT_OPACITY);
        let scale = parse_number(raw.scale.as_deref()).unwrap_or(DEFAULT_SCALE);
        Self::new(position, opacity, scale)
    }

    /// Alpha mask value used by the destination-in blend.
    pub fn alpha_mask(&self) -> u8 {
        (255.0 * self.opacity).round().clamp(0.0, 255.0) as u8
    }

    /// Width of the scaled watermark for a container of `container_width` pixels.
    pub fn target_width(&self, container_width: u32) -> u32 {
        ((container_width as f64 * self.scale as f64).round() as u32).max(1)
    }
}

fn parse_number(value: Option<&str>) -> Option<f32> {
    value
        .and_then(|v| v.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite())
}

fn sanitize_opacity(opacity: f32) -> f32 {
    if opacity.is_nan() {
        DEFAULT_OPACITY
    } else {
        opacity.clamp(0.0, 1.0)
    }
}

fn sanitize_scale(scale: f32) -> f32 {
    if scale.is_nan() || scale <= 0.0 {
        DEFAULT_SCALE
    } else {
        scale.min(1.0)
    }
}

/// The watermark image of a batch, decoded once and shared read-only by every job.
#[derive(Debug, Clone)]
pub struct Watermark {
    bytes: Vec<u8>,
    image: DynamicImage,
    extension: &'static str,
}

impl Watermark {
    /// Decode the watermark. Failure here is fatal for the batch.
    pub fn decode(bytes: Vec<u8>) -> Result<Self> {
        let format = image::guess_format(&bytes).map_err(WatermarkError::WatermarkUnreadable)?;
        let image = image::load_from_memory_with_format(&bytes, format)
            .map_err(WatermarkError::WatermarkUnreadable)?;
        let extension = format.extensions_str().first().copied().unwrap_or("png");

        Ok(Self {
            bytes,
            image,
            extension,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// File extension matching the encoded bytes, for tools that sniff by name.
    pub fn extension(&self) -> &'static str {
        self.extension
    }
}
