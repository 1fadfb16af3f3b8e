use std::f64::consts::{FRAC_PI_2, PI};

use serde::{Deserialize, Serialize};

use crate::ops::shapeburst::DistanceField;

// ============================================================================
// GRADIENT SHAPES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GradientShape {
    #[default]
    Linear,
    Bilinear,
    Radial,
    Square,
    ConicalSymmetric,
    ConicalAsymmetric,
    ShapeburstAngular,
    ShapeburstSpherical,
    ShapeburstDimpled,
    SpiralClockwise,
    SpiralAnticlockwise,
}

impl GradientShape {
    pub fn all() -> &'static [GradientShape] {
        &[
            GradientShape::Linear,
            GradientShape::Bilinear,
            GradientShape::Radial,
            GradientShape::Square,
            GradientShape::ConicalSymmetric,
            GradientShape::ConicalAsymmetric,
            GradientShape::ShapeburstAngular,
            GradientShape::ShapeburstSpherical,
            GradientShape::ShapeburstDimpled,
            GradientShape::SpiralClockwise,
            GradientShape::SpiralAnticlockwise,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            GradientShape::Linear => "linear",
            GradientShape::Bilinear => "bilinear",
            GradientShape::Radial => "radial",
            GradientShape::Square => "square",
            GradientShape::ConicalSymmetric => "conical-symmetric",
            GradientShape::ConicalAsymmetric => "conical-asymmetric",
            GradientShape::ShapeburstAngular => "shapeburst-angular",
            GradientShape::ShapeburstSpherical => "shapeburst-spherical",
            GradientShape::ShapeburstDimpled => "shapeburst-dimpled",
            GradientShape::SpiralClockwise => "spiral-clockwise",
            GradientShape::SpiralAnticlockwise => "spiral-anticlockwise",
        }
    }

    pub fn from_name(name: &str) -> Option<GradientShape> {
        let name = name.to_ascii_lowercase().replace('_', "-");
        Self::all().iter().copied().find(|s| s.name() == name)
    }

    /// Shapes sampled from a precomputed distance field instead of geometry.
    pub fn is_shapeburst(&self) -> bool {
        matches!(
            self,
            GradientShape::ShapeburstAngular
                | GradientShape::ShapeburstSpherical
                | GradientShape::ShapeburstDimpled
        )
    }
}

// ============================================================================
// GEOMETRY
// ============================================================================

/// Start/end points plus the quantities every evaluator derives from them.
/// Built once per fill and never mutated.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientGeometry {
    pub sx: f64,
    pub sy: f64,
    pub ex: f64,
    pub ey: f64,
    /// Euclidean start→end length (Chebyshev for `Square`).
    pub dist: f64,
    /// Unit start→end direction, zero when `dist == 0`.
    pub vec: [f64; 2],
    /// Percentage, 0–100.
    pub offset: f64,
}

impl GradientGeometry {
    pub fn new(shape: GradientShape, start: (f64, f64), end: (f64, f64), offset: f64) -> Self {
        let (sx, sy) = start;
        let (ex, ey) = end;
        let dx = ex - sx;
        let dy = ey - sy;

        let dist = match shape {
            GradientShape::Square => dx.abs().max(dy.abs()),
            _ => (dx * dx + dy * dy).sqrt(),
        };

        // Square and the shapeburst family never read the direction.
        let vec = match shape {
            GradientShape::Linear
            | GradientShape::Bilinear
            | GradientShape::Radial
            | GradientShape::ConicalSymmetric
            | GradientShape::ConicalAsymmetric
            | GradientShape::SpiralClockwise
            | GradientShape::SpiralAnticlockwise
                if dist > 0.0 =>
            {
                let len = (dx * dx + dy * dy).sqrt();
                [dx / len, dy / len]
            }
            _ => [0.0, 0.0],
        };

        Self {
            sx,
            sy,
            ex,
            ey,
            dist,
            vec,
            offset,
        }
    }
}

// ============================================================================
// SHAPE-FACTOR EVALUATOR
// ============================================================================

/// Raw gradient factor at `(x, y)`, expressed relative to the start point.
///
/// Linear-family results can leave `[0, 1]`; the repeat folder brings them
/// back.  Shapeburst shapes read `field` at the absolute pixel position and
/// panic without one.
pub fn factor(
    shape: GradientShape,
    geom: &GradientGeometry,
    field: Option<&DistanceField>,
    x: f64,
    y: f64,
) -> f64 {
    match shape {
        GradientShape::Linear => linear_factor(geom, x, y),
        GradientShape::Bilinear => bilinear_factor(geom, x, y),
        GradientShape::Radial => {
            if geom.dist == 0.0 {
                return 0.0;
            }
            radial_offset(geom.offset, (x * x + y * y).sqrt() / geom.dist)
        }
        GradientShape::Square => {
            if geom.dist == 0.0 {
                return 0.0;
            }
            radial_offset(geom.offset, x.abs().max(y.abs()) / geom.dist)
        }
        GradientShape::ConicalSymmetric => conical_sym_factor(geom, x, y),
        GradientShape::ConicalAsymmetric => conical_asym_factor(geom, x, y),
        GradientShape::SpiralClockwise => spiral_factor(geom, x, y, true),
        GradientShape::SpiralAnticlockwise => spiral_factor(geom, x, y, false),
        GradientShape::ShapeburstAngular
        | GradientShape::ShapeburstSpherical
        | GradientShape::ShapeburstDimpled => {
            let Some(field) = field else {
                panic!("{} gradient evaluated without a distance field", shape.name());
            };
            let v = field.get_clamped(x + geom.sx, y + geom.sy) as f64;
            match shape {
                GradientShape::ShapeburstAngular => 1.0 - v,
                GradientShape::ShapeburstSpherical => 1.0 - (FRAC_PI_2 * v).sin(),
                _ => (FRAC_PI_2 * v).cos(),
            }
        }
    }
}

fn linear_factor(geom: &GradientGeometry, x: f64, y: f64) -> f64 {
    if geom.dist == 0.0 {
        return 0.0;
    }
    let offset = geom.offset / 100.0;
    let rat = (geom.vec[0] * x + geom.vec[1] * y) / geom.dist;

    if (0.0..offset).contains(&rat) {
        0.0
    } else if offset == 1.0 {
        if rat >= 1.0 { 1.0 } else { 0.0 }
    } else if rat < 0.0 {
        rat / (1.0 - offset)
    } else {
        (rat - offset) / (1.0 - offset)
    }
}

fn bilinear_factor(geom: &GradientGeometry, x: f64, y: f64) -> f64 {
    if geom.dist == 0.0 {
        return 0.0;
    }
    let offset = geom.offset / 100.0;
    let rat = (geom.vec[0] * x + geom.vec[1] * y) / geom.dist;

    if rat.abs() < offset {
        0.0
    } else if offset == 1.0 {
        if rat == 1.0 { 1.0 } else { 0.0 }
    } else {
        (rat.abs() - offset) / (1.0 - offset)
    }
}

/// Offset adjustment shared by radial and square.
fn radial_offset(offset: f64, rat: f64) -> f64 {
    let offset = offset / 100.0;
    if rat < offset {
        0.0
    } else if offset == 1.0 {
        if rat >= 1.0 { 1.0 } else { 0.0 }
    } else {
        (rat - offset) / (1.0 - offset)
    }
}

fn conical_sym_factor(geom: &GradientGeometry, x: f64, y: f64) -> f64 {
    if geom.dist == 0.0 {
        return 0.0;
    }
    if x == 0.0 && y == 0.0 {
        return 0.5;
    }
    let r = (x * x + y * y).sqrt();
    let dot = (geom.vec[0] * x / r + geom.vec[1] * y / r).clamp(-1.0, 1.0);
    let rat = (dot.acos() / PI).powf(geom.offset / 10.0 + 1.0);
    rat.clamp(0.0, 1.0)
}

/// Angle of `(x, y)` measured with the same `atan2(x, y) + π` convention for
/// both the pixel and the axis.
#[inline]
fn angle(x: f64, y: f64) -> f64 {
    x.atan2(y) + PI
}

fn conical_asym_factor(geom: &GradientGeometry, x: f64, y: f64) -> f64 {
    if geom.dist == 0.0 {
        return 0.0;
    }
    if x == 0.0 && y == 0.0 {
        return 0.5;
    }
    let mut ang = angle(x, y) - angle(geom.vec[0], geom.vec[1]);
    if ang < 0.0 {
        ang += 2.0 * PI;
    }
    let rat = (ang / (2.0 * PI)).powf(geom.offset / 10.0 + 1.0);
    rat.clamp(0.0, 1.0)
}

fn spiral_factor(geom: &GradientGeometry, x: f64, y: f64, clockwise: bool) -> f64 {
    if geom.dist == 0.0 {
        return 0.0;
    }
    if x == 0.0 && y == 0.0 {
        return 0.5;
    }
    let ang0 = angle(geom.vec[0], geom.vec[1]);
    let ang1 = angle(x, y);
    let mut ang = if clockwise { ang1 - ang0 } else { ang0 - ang1 };
    if ang < 0.0 {
        ang += 2.0 * PI;
    }
    let r = (x * x + y * y).sqrt() / geom.dist;
    // The offset enters as a raw fraction here, not a percentage.
    (ang / (2.0 * PI) + r + geom.offset) % 1.0
}
