use serde::{Deserialize, Serialize};

use crate::color::{Hsv, Rgba};
use crate::error::FillError;
use crate::ops::gradient::SegmentGradient;
use crate::ops::shape::{self, GradientGeometry, GradientShape};
use crate::ops::shapeburst::DistanceField;

// ============================================================================
// REPEAT MODES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepeatMode {
    #[default]
    None,
    Sawtooth,
    Triangular,
}

impl RepeatMode {
    pub fn all() -> &'static [RepeatMode] {
        &[RepeatMode::None, RepeatMode::Sawtooth, RepeatMode::Triangular]
    }

    pub fn name(&self) -> &'static str {
        match self {
            RepeatMode::None => "none",
            RepeatMode::Sawtooth => "sawtooth",
            RepeatMode::Triangular => "triangular",
        }
    }

    pub fn from_name(name: &str) -> Option<RepeatMode> {
        let name = name.to_ascii_lowercase();
        Self::all().iter().copied().find(|m| m.name() == name)
    }

    /// Fold a raw shape factor into the sampled range.
    #[inline]
    pub fn fold(self, r: f64) -> f64 {
        match self {
            RepeatMode::None => r.clamp(0.0, 1.0),
            RepeatMode::Sawtooth => {
                let f = r - r.floor();
                // Tiny negative inputs round up to exactly 1.0.
                if f >= 1.0 { 0.0 } else { f }
            }
            RepeatMode::Triangular => {
                let r = r.abs();
                let n = r as u64;
                let f = r - r.floor();
                if n & 1 == 1 { 1.0 - f } else { f }
            }
        }
    }
}

// ============================================================================
// BLEND MODES
// ============================================================================

/// How a folded factor becomes a colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    /// Foreground to background, interpolated in RGB.
    #[default]
    FgBgRgb,
    /// Foreground to background, interpolated in HSV.
    FgBgHsv,
    /// Foreground to the same colour at zero alpha.
    FgTransparent,
    /// Sample a segment gradient.
    Custom,
}

impl BlendMode {
    pub fn all() -> &'static [BlendMode] {
        &[BlendMode::FgBgRgb, BlendMode::FgBgHsv, BlendMode::FgTransparent, BlendMode::Custom]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::FgBgRgb => "fg-bg-rgb",
            BlendMode::FgBgHsv => "fg-bg-hsv",
            BlendMode::FgTransparent => "fg-transparent",
            BlendMode::Custom => "custom",
        }
    }

    pub fn from_name(name: &str) -> Option<BlendMode> {
        let name = name.to_ascii_lowercase();
        Self::all().iter().copied().find(|m| m.name() == name)
    }
}

// ============================================================================
// RENDER CONTEXT
// ============================================================================

/// Everything the pixel renderer needs, built once per fill and shared
/// read-only between workers.
#[derive(Clone, Debug)]
pub struct RenderContext {
    pub shape: GradientShape,
    pub geometry: GradientGeometry,
    pub repeat: RepeatMode,
    pub blend_mode: BlendMode,
    pub reverse: bool,
    foreground: Rgba,
    background: Rgba,
    fg_hsv: Hsv,
    bg_hsv: Hsv,
    gradient: Option<SegmentGradient>,
    field: Option<DistanceField>,
}

impl RenderContext {
    /// `gradient` is required for [`BlendMode::Custom`] and ignored
    /// otherwise.  Foreground/background-bound gradient colours are resolved
    /// here.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        shape: GradientShape,
        geometry: GradientGeometry,
        repeat: RepeatMode,
        blend_mode: BlendMode,
        reverse: bool,
        foreground: Rgba,
        background: Rgba,
        gradient: Option<&SegmentGradient>,
    ) -> Result<Self, FillError> {
        let background = match blend_mode {
            BlendMode::FgTransparent => foreground.with_alpha(0.0),
            _ => background,
        };
        let gradient = match blend_mode {
            BlendMode::Custom => {
                let g = gradient.ok_or(FillError::MissingGradient)?;
                Some(g.flatten(foreground, background))
            }
            _ => None,
        };
        Ok(Self {
            shape,
            geometry,
            repeat,
            blend_mode,
            reverse,
            foreground,
            background,
            fg_hsv: foreground.to_hsv(),
            bg_hsv: background.to_hsv(),
            gradient,
            field: None,
        })
    }

    pub fn with_distance_field(mut self, field: DistanceField) -> Self {
        self.field = Some(field);
        self
    }

    pub fn distance_field(&self) -> Option<&DistanceField> {
        self.field.as_ref()
    }

    /// Folded factor at drawable position `(x, y)`.
    #[inline]
    pub fn factor_at(&self, x: f64, y: f64) -> f64 {
        let g = &self.geometry;
        let raw = shape::factor(self.shape, g, self.field.as_ref(), x - g.sx, y - g.sy);
        self.repeat.fold(raw)
    }

    /// Colour for a folded factor `t`.
    #[inline]
    pub fn resolve(&self, t: f64) -> Rgba {
        match (self.blend_mode, self.gradient.as_ref()) {
            (BlendMode::Custom, Some(g)) => g.color_at(t, self.reverse),
            (BlendMode::FgBgHsv, _) => {
                let t = if self.reverse { 1.0 - t } else { t };
                self.fg_hsv.lerp(self.bg_hsv, t).to_rgb().clamped()
            }
            _ => {
                let t = if self.reverse { 1.0 - t } else { t };
                self.foreground.lerp(self.background, t).clamped()
            }
        }
    }

    /// Full pixel pipeline: shape factor, fold, colour.
    #[inline]
    pub fn render_pixel(&self, x: f64, y: f64) -> Rgba {
        self.resolve(self.factor_at(x, y))
    }
}
