use crate::color::Rgba;
use crate::error::GradientError;

/// Segment widths or midpoints below this are treated as degenerate.
const EPSILON: f64 = 1e-10;
/// Tolerance when checking that segments tile `[0, 1]`; files store six
/// decimals.
const COVERAGE_TOLERANCE: f64 = 1e-5;

// ============================================================================
// SEGMENT PARAMETERS
// ============================================================================

/// Curve used to map a position inside a segment to a blend factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SegmentBlend {
    #[default]
    Linear,
    Curved,
    Sine,
    SphereIncreasing,
    SphereDecreasing,
    Step,
}

impl SegmentBlend {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => SegmentBlend::Linear,
            1 => SegmentBlend::Curved,
            2 => SegmentBlend::Sine,
            3 => SegmentBlend::SphereIncreasing,
            4 => SegmentBlend::SphereDecreasing,
            5 => SegmentBlend::Step,
            _ => return None,
        })
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    /// Blend factor for a position `pos` in `[0, 1]` within a segment whose
    /// midpoint sits at `middle` (also segment-relative).
    pub fn factor(self, middle: f64, pos: f64) -> f64 {
        match self {
            SegmentBlend::Linear => linear_factor(middle, pos),
            SegmentBlend::Curved => {
                if middle < EPSILON {
                    1.0
                } else if 1.0 - middle < EPSILON {
                    0.0
                } else {
                    pos.powf(0.5f64.ln() / middle.ln())
                }
            }
            SegmentBlend::Sine => {
                let pos = linear_factor(middle, pos);
                ((-std::f64::consts::FRAC_PI_2 + std::f64::consts::PI * pos).sin() + 1.0) / 2.0
            }
            SegmentBlend::SphereIncreasing => {
                let pos = linear_factor(middle, pos) - 1.0;
                (1.0 - pos * pos).max(0.0).sqrt()
            }
            SegmentBlend::SphereDecreasing => {
                let pos = linear_factor(middle, pos);
                1.0 - (1.0 - pos * pos).max(0.0).sqrt()
            }
            SegmentBlend::Step => {
                if pos >= middle { 1.0 } else { 0.0 }
            }
        }
    }
}

fn linear_factor(middle: f64, pos: f64) -> f64 {
    if pos <= middle {
        if middle < EPSILON { 0.0 } else { 0.5 * pos / middle }
    } else {
        let pos = pos - middle;
        let middle = 1.0 - middle;
        if middle < EPSILON { 1.0 } else { 0.5 + 0.5 * pos / middle }
    }
}

/// Colour space a segment interpolates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SegmentColoring {
    #[default]
    Rgb,
    /// HSV, hue moving counter-clockwise (increasing).
    HsvCcw,
    /// HSV, hue moving clockwise (decreasing).
    HsvCw,
}

impl SegmentColoring {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => SegmentColoring::Rgb,
            1 => SegmentColoring::HsvCcw,
            2 => SegmentColoring::HsvCw,
            _ => return None,
        })
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

/// Where a segment endpoint takes its colour from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SegmentColor {
    #[default]
    Fixed,
    Foreground,
    ForegroundTransparent,
    Background,
    BackgroundTransparent,
}

impl SegmentColor {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => SegmentColor::Fixed,
            1 => SegmentColor::Foreground,
            2 => SegmentColor::ForegroundTransparent,
            3 => SegmentColor::Background,
            4 => SegmentColor::BackgroundTransparent,
            _ => return None,
        })
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    /// Resolve against the current foreground/background.
    pub fn resolve(self, fixed: Rgba, fg: Rgba, bg: Rgba) -> Rgba {
        match self {
            SegmentColor::Fixed => fixed,
            SegmentColor::Foreground => fg,
            SegmentColor::ForegroundTransparent => fg.with_alpha(0.0),
            SegmentColor::Background => bg,
            SegmentColor::BackgroundTransparent => bg.with_alpha(0.0),
        }
    }
}

// ============================================================================
// SEGMENTS
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct GradientSegment {
    pub left: f64,
    pub middle: f64,
    pub right: f64,
    pub left_color: Rgba,
    pub left_color_type: SegmentColor,
    pub right_color: Rgba,
    pub right_color_type: SegmentColor,
    pub blend: SegmentBlend,
    pub coloring: SegmentColoring,
}

impl GradientSegment {
    /// A linear RGB segment between two fixed colours, midpoint centred.
    pub fn new(left: f64, right: f64, left_color: Rgba, right_color: Rgba) -> Self {
        Self {
            left,
            middle: (left + right) / 2.0,
            right,
            left_color,
            left_color_type: SegmentColor::Fixed,
            right_color,
            right_color_type: SegmentColor::Fixed,
            blend: SegmentBlend::Linear,
            coloring: SegmentColoring::Rgb,
        }
    }

    pub fn with_color_types(mut self, left: SegmentColor, right: SegmentColor) -> Self {
        self.left_color_type = left;
        self.right_color_type = right;
        self
    }

    pub fn with_blend(mut self, blend: SegmentBlend) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_coloring(mut self, coloring: SegmentColoring) -> Self {
        self.coloring = coloring;
        self
    }

    /// Colour at absolute gradient position `pos` (inside this segment).
    fn color_at(&self, pos: f64) -> Rgba {
        let seg_len = self.right - self.left;
        let (middle, pos) = if seg_len < EPSILON {
            (0.5, 0.5)
        } else {
            ((self.middle - self.left) / seg_len, (pos - self.left) / seg_len)
        };
        let factor = self.blend.factor(middle, pos);

        let (lc, rc) = (self.left_color, self.right_color);
        let mut rgb = match self.coloring {
            SegmentColoring::Rgb => lc.lerp(rc, factor),
            SegmentColoring::HsvCcw | SegmentColoring::HsvCw => {
                let mut left = lc.to_hsv();
                let right = rc.to_hsv();
                left.s += (right.s - left.s) * factor;
                left.v += (right.v - left.v) * factor;

                if self.coloring == SegmentColoring::HsvCcw {
                    if left.h < right.h {
                        left.h += (right.h - left.h) * factor;
                    } else {
                        left.h += (1.0 - (left.h - right.h)) * factor;
                        if left.h > 1.0 {
                            left.h -= 1.0;
                        }
                    }
                } else if right.h < left.h {
                    left.h -= (left.h - right.h) * factor;
                } else {
                    left.h -= (1.0 - (right.h - left.h)) * factor;
                    if left.h < 0.0 {
                        left.h += 1.0;
                    }
                }
                left.to_rgb()
            }
        };
        rgb.a = lc.a + (rc.a - lc.a) * factor;
        rgb.clamped()
    }
}

// ============================================================================
// SEGMENT GRADIENT
// ============================================================================

/// Ordered list of contiguous segments covering `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentGradient {
    pub name: String,
    segments: Vec<GradientSegment>,
}

impl SegmentGradient {
    /// Validate and wrap a segment list.
    pub fn new(name: impl Into<String>, segments: Vec<GradientSegment>) -> Result<Self, GradientError> {
        if segments.is_empty() {
            return Err(GradientError::Empty);
        }
        for (index, seg) in segments.iter().enumerate() {
            let ordered = seg.left <= seg.middle && seg.middle <= seg.right;
            if !ordered || !seg.left.is_finite() || !seg.right.is_finite() {
                return Err(GradientError::BadSegmentOrder {
                    index,
                    left: seg.left,
                    middle: seg.middle,
                    right: seg.right,
                });
            }
            let expected_left = if index == 0 { 0.0 } else { segments[index - 1].right };
            if (seg.left - expected_left).abs() > COVERAGE_TOLERANCE {
                return Err(GradientError::Coverage { index });
            }
        }
        if let Some(last) = segments.last() {
            if (last.right - 1.0).abs() > COVERAGE_TOLERANCE {
                return Err(GradientError::Coverage {
                    index: segments.len() - 1,
                });
            }
        }
        Ok(Self {
            name: name.into(),
            segments,
        })
    }

    /// Single linear segment between two fixed colours.
    pub fn two_color(name: impl Into<String>, left: Rgba, right: Rgba) -> Self {
        Self {
            name: name.into(),
            segments: vec![GradientSegment::new(0.0, 1.0, left, right)],
        }
    }

    pub fn segments(&self) -> &[GradientSegment] {
        &self.segments
    }

    /// `true` when any endpoint follows the foreground or background.
    pub fn is_context_bound(&self) -> bool {
        self.segments.iter().any(|s| {
            s.left_color_type != SegmentColor::Fixed || s.right_color_type != SegmentColor::Fixed
        })
    }

    /// Copy with every bound endpoint replaced by its resolved colour.
    pub fn flatten(&self, fg: Rgba, bg: Rgba) -> SegmentGradient {
        let segments = self
            .segments
            .iter()
            .map(|s| GradientSegment {
                left_color: s.left_color_type.resolve(s.left_color, fg, bg),
                left_color_type: SegmentColor::Fixed,
                right_color: s.right_color_type.resolve(s.right_color, fg, bg),
                right_color_type: SegmentColor::Fixed,
                ..s.clone()
            })
            .collect();
        SegmentGradient {
            name: self.name.clone(),
            segments,
        }
    }

    /// Segment containing `pos` (already clamped).  A position on a shared
    /// boundary belongs to the right-hand segment; `1.0` lands in the last.
    pub fn segment_at(&self, pos: f64) -> &GradientSegment {
        let idx = self
            .segments
            .partition_point(|s| s.right <= pos)
            .min(self.segments.len() - 1);
        &self.segments[idx]
    }

    /// Colour at `pos`, clamped to `[0, 1]` and mirrored when `reverse`.
    /// Bound endpoints read their stored colour; call [`flatten`] first to
    /// resolve them.
    ///
    /// [`flatten`]: SegmentGradient::flatten
    pub fn color_at(&self, pos: f64, reverse: bool) -> Rgba {
        let pos = pos.clamp(0.0, 1.0);
        let pos = if reverse { 1.0 - pos } else { pos };
        self.segment_at(pos).color_at(pos)
    }
}

// ============================================================================
// PRESETS
// ============================================================================

/// Built-in gradients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GradientPreset {
    ForegroundBackground,
    ForegroundTransparent,
    BlackWhite,
    Rainbow,
}

impl GradientPreset {
    pub fn all() -> &'static [GradientPreset] {
        &[
            GradientPreset::ForegroundBackground,
            GradientPreset::ForegroundTransparent,
            GradientPreset::BlackWhite,
            GradientPreset::Rainbow,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            GradientPreset::ForegroundBackground => "fg-bg",
            GradientPreset::ForegroundTransparent => "fg-transparent",
            GradientPreset::BlackWhite => "black-white",
            GradientPreset::Rainbow => "rainbow",
        }
    }

    pub fn from_name(name: &str) -> Option<GradientPreset> {
        let name = name.to_ascii_lowercase();
        Self::all().iter().copied().find(|p| p.name() == name)
    }

    pub fn build(&self) -> SegmentGradient {
        match self {
            GradientPreset::ForegroundBackground => SegmentGradient {
                name: "FG to BG".into(),
                segments: vec![
                    GradientSegment::new(0.0, 1.0, Rgba::BLACK, Rgba::WHITE)
                        .with_color_types(SegmentColor::Foreground, SegmentColor::Background),
                ],
            },
            GradientPreset::ForegroundTransparent => SegmentGradient {
                name: "FG to Transparent".into(),
                segments: vec![
                    GradientSegment::new(0.0, 1.0, Rgba::BLACK, Rgba::TRANSPARENT).with_color_types(
                        SegmentColor::Foreground,
                        SegmentColor::ForegroundTransparent,
                    ),
                ],
            },
            GradientPreset::BlackWhite => SegmentGradient::two_color("Black to White", Rgba::BLACK, Rgba::WHITE),
            GradientPreset::Rainbow => {
                let stops: [(f64, [u8; 4]); 7] = [
                    (0.0, [255, 0, 0, 255]),
                    (0.17, [255, 165, 0, 255]),
                    (0.33, [255, 255, 0, 255]),
                    (0.5, [0, 200, 0, 255]),
                    (0.67, [0, 100, 255, 255]),
                    (0.83, [75, 0, 130, 255]),
                    (1.0, [148, 0, 211, 255]),
                ];
                let segments = stops
                    .windows(2)
                    .map(|w| GradientSegment::new(w[0].0, w[1].0, Rgba::from_u8(w[0].1), Rgba::from_u8(w[1].1)))
                    .collect();
                SegmentGradient {
                    name: "Rainbow".into(),
                    segments,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Rgba, b: Rgba) -> bool {
        a.distance_sq(b) < 1e-12
    }

    #[test]
    fn test_endpoints_and_midpoint() {
        let g = SegmentGradient::two_color("bw", Rgba::BLACK, Rgba::WHITE);
        assert!(close(g.color_at(0.0, false), Rgba::BLACK));
        assert!(close(g.color_at(1.0, false), Rgba::WHITE));
        let mid = g.color_at(0.5, false);
        assert!((mid.r - 0.5).abs() < 1e-12);
        // Out of range positions clamp.
        assert!(close(g.color_at(-3.0, false), Rgba::BLACK));
        assert!(close(g.color_at(7.0, false), Rgba::WHITE));
    }

    #[test]
    fn test_reverse_mirrors_position() {
        let g = GradientPreset::Rainbow.build();
        for i in 0..=20 {
            let t = i as f64 / 20.0;
            assert!(close(g.color_at(t, true), g.color_at(1.0 - t, false)));
        }
    }

    #[test]
    fn test_moved_midpoint_shifts_half_value() {
        let mut seg = GradientSegment::new(0.0, 1.0, Rgba::BLACK, Rgba::WHITE);
        seg.middle = 0.25;
        let g = SegmentGradient::new("m", vec![seg]).unwrap();
        assert!((g.color_at(0.25, false).r - 0.5).abs() < 1e-12);
        assert!((g.color_at(0.625, false).r - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_blend_curves_hit_endpoints() {
        for blend in [
            SegmentBlend::Linear,
            SegmentBlend::Curved,
            SegmentBlend::Sine,
            SegmentBlend::SphereIncreasing,
            SegmentBlend::SphereDecreasing,
        ] {
            assert!(blend.factor(0.5, 0.0).abs() < 1e-12, "{:?}", blend);
            assert!((blend.factor(0.5, 1.0) - 1.0).abs() < 1e-12, "{:?}", blend);
        }
        assert!((SegmentBlend::Curved.factor(0.3, 0.3) - 0.5).abs() < 1e-12);
        assert_eq!(SegmentBlend::Step.factor(0.5, 0.49), 0.0);
        assert_eq!(SegmentBlend::Step.factor(0.5, 0.5), 1.0);
    }

    #[test]
    fn test_hsv_ccw_wraps_through_red() {
        // Magenta (h = 5/6) to yellow (h = 1/6) counter-clockwise passes red.
        let seg = GradientSegment::new(0.0, 1.0, Rgba::new(1.0, 0.0, 1.0, 1.0), Rgba::new(1.0, 1.0, 0.0, 1.0))
            .with_coloring(SegmentColoring::HsvCcw);
        let g = SegmentGradient::new("hsv", vec![seg]).unwrap();
        assert!(close(g.color_at(0.5, false), Rgba::new(1.0, 0.0, 0.0, 1.0)));

        // Clockwise goes the long way round, through cyan.
        let seg = g.segments()[0].clone().with_coloring(SegmentColoring::HsvCw);
        let g = SegmentGradient::new("hsv", vec![seg]).unwrap();
        let mid = g.color_at(0.5, false);
        assert!(mid.r < 0.01 && mid.g > 0.99 && mid.b > 0.99, "{:?}", mid);
    }

    #[test]
    fn test_segment_lookup_on_boundaries() {
        let g = GradientPreset::Rainbow.build();
        assert_eq!(g.segment_at(0.0).left, 0.0);
        assert_eq!(g.segment_at(0.17).left, 0.17);
        assert_eq!(g.segment_at(1.0).right, 1.0);
    }

    #[test]
    fn test_flatten_binds_foreground_and_background() {
        let fg = Rgba::new(1.0, 0.0, 0.0, 1.0);
        let bg = Rgba::new(0.0, 0.0, 1.0, 1.0);
        let g = GradientPreset::ForegroundBackground.build();
        assert!(g.is_context_bound());
        let flat = g.flatten(fg, bg);
        assert!(!flat.is_context_bound());
        assert!(close(flat.color_at(0.0, false), fg));
        assert!(close(flat.color_at(1.0, false), bg));

        let ft = GradientPreset::ForegroundTransparent.build().flatten(fg, bg);
        assert!(close(ft.color_at(1.0, false), fg.with_alpha(0.0)));
    }

    #[test]
    fn test_validation_rejects_gaps_and_disorder() {
        let a = GradientSegment::new(0.0, 0.4, Rgba::BLACK, Rgba::WHITE);
        let b = GradientSegment::new(0.5, 1.0, Rgba::BLACK, Rgba::WHITE);
        assert!(matches!(
            SegmentGradient::new("gap", vec![a.clone(), b]),
            Err(GradientError::Coverage { index: 1 })
        ));
        let mut bad = a.clone();
        bad.middle = 0.9;
        assert!(matches!(
            SegmentGradient::new("order", vec![bad]),
            Err(GradientError::BadSegmentOrder { index: 0, .. })
        ));
        assert!(matches!(SegmentGradient::new("empty", vec![]), Err(GradientError::Empty)));
        assert!(matches!(
            SegmentGradient::new("short", vec![a]),
            Err(GradientError::Coverage { index: 0 })
        ));
    }

    #[test]
    fn test_zero_width_segment_uses_its_midpoint() {
        let segs = vec![
            GradientSegment::new(0.0, 0.5, Rgba::BLACK, Rgba::BLACK),
            GradientSegment::new(0.5, 0.5, Rgba::new(1.0, 0.0, 0.0, 1.0), Rgba::new(0.0, 1.0, 0.0, 1.0)),
            GradientSegment::new(0.5, 1.0, Rgba::WHITE, Rgba::WHITE),
        ];
        let g = SegmentGradient::new("hard", segs).unwrap();
        assert!(close(g.color_at(0.49, false), Rgba::BLACK));
        assert!(close(g.color_at(0.5, false), Rgba::WHITE));
    }
}
