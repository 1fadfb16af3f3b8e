// ============================================================================
// SHAPEBURST: weighted burn distance field seeded from coverage
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::ops::Progress;

const DIAGONAL: f64 = std::f64::consts::SQRT_2;

/// How cells outside the seed buffer take part in the burn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShapeburstEdges {
    /// Only the least-covered cells inside the buffer start the burn.  A
    /// uniform seed therefore yields a flat all-zero field, so a plain
    /// rectangle selection or a fully opaque image fills with one colour.
    /// Use [`ShapeburstEdges::Burn`] to get a gradient there.
    #[default]
    Keep,
    /// The region border also acts as zero coverage.
    Burn,
}

/// Normalised distance-from-zero field covering the fill rectangle.
///
/// Values lie in `[0, 1]` and the maximum is exactly `1.0` unless every cell
/// is zero.
#[derive(Clone, Debug)]
pub struct DistanceField {
    x: f64,
    y: f64,
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DistanceField {
    /// Place the field's top-left cell at drawable position `(x, y)`.
    pub fn with_origin(mut self, x: u32, y: u32) -> Self {
        self.x = x as f64;
        self.y = y as f64;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Value at drawable position `(x, y)`, clamped into the field and
    /// truncated to a cell.  An empty field reads as zero.
    #[inline]
    pub fn get_clamped(&self, x: f64, y: f64) -> f32 {
        if self.width == 0 || self.height == 0 {
            return 0.0;
        }
        let lx = (x - self.x).clamp(0.0, self.width as f64 - 0.7) as usize;
        let ly = (y - self.y).clamp(0.0, self.height as f64 - 0.7) as usize;
        self.data[ly * self.width as usize + lx]
    }

    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(0.0, f32::max)
    }
}

/// Burn distance field over `seed` (8-bit coverage, row-major), with the
/// buffer border left out of the burn.
pub fn compute_distance_field(
    seed: &[u8],
    width: u32,
    height: u32,
    progress: Option<&dyn Progress>,
) -> DistanceField {
    compute_distance_field_with(seed, width, height, ShapeburstEdges::Keep, progress)
}

/// Burn distance field over `seed`.
///
/// Zero-coverage cells start at distance 0 (with [`ShapeburstEdges::Keep`]
/// and no zeros at all, the least-covered cells do).  Entering a cell costs its
/// coverage (scaled to `0..=1`), times `√2` on diagonal steps.  Forward and
/// backward chamfer sweeps repeat until nothing changes, so each cell ends up
/// holding the cheapest cost at which the burn reaches it.  The result is
/// divided by its maximum; a uniform seed gives an all-zero field.
pub fn compute_distance_field_with(
    seed: &[u8],
    width: u32,
    height: u32,
    edges: ShapeburstEdges,
    progress: Option<&dyn Progress>,
) -> DistanceField {
    let w = width as usize;
    let h = height as usize;
    debug_assert_eq!(seed.len(), w * h);

    // Without a burning border the least-covered cells start the burn; that
    // is the zero-coverage cells whenever there are any.
    let floor = match edges {
        ShapeburstEdges::Keep => seed.iter().copied().min().unwrap_or(0),
        ShapeburstEdges::Burn => 0,
    };
    let weight: Vec<f64> = seed.iter().map(|&s| s as f64 / 255.0).collect();
    let mut dist: Vec<f64> = seed
        .iter()
        .map(|&s| if s == floor { 0.0 } else { f64::INFINITY })
        .collect();

    // Outside cells are either zeros or walls.
    let outside = match edges {
        ShapeburstEdges::Keep => f64::INFINITY,
        ShapeburstEdges::Burn => 0.0,
    };
    let at = |dist: &[f64], x: isize, y: isize| -> f64 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            outside
        } else {
            dist[y as usize * w + x as usize]
        }
    };

    let mut pass = 0u32;
    loop {
        let mut changed = false;

        // Forward sweep: W, NW, N, NE neighbours.
        for y in 0..h as isize {
            for x in 0..w as isize {
                let i = y as usize * w + x as usize;
                let cost = weight[i];
                if cost == 0.0 {
                    continue;
                }
                let best = (at(&dist, x - 1, y) + cost)
                    .min(at(&dist, x, y - 1) + cost)
                    .min(at(&dist, x - 1, y - 1) + cost * DIAGONAL)
                    .min(at(&dist, x + 1, y - 1) + cost * DIAGONAL);
                if best < dist[i] {
                    dist[i] = best;
                    changed = true;
                }
            }
        }

        // Backward sweep: E, SE, S, SW neighbours.
        for y in (0..h as isize).rev() {
            for x in (0..w as isize).rev() {
                let i = y as usize * w + x as usize;
                let cost = weight[i];
                if cost == 0.0 {
                    continue;
                }
                let best = (at(&dist, x + 1, y) + cost)
                    .min(at(&dist, x, y + 1) + cost)
                    .min(at(&dist, x + 1, y + 1) + cost * DIAGONAL)
                    .min(at(&dist, x - 1, y + 1) + cost * DIAGONAL);
                if best < dist[i] {
                    dist[i] = best;
                    changed = true;
                }
            }
        }

        pass += 1;
        if let Some(p) = progress {
            // Pass count is not known up front; approach 1 geometrically.
            p.set_value(1.0 - 0.5f64.powi(pass as i32));
        }
        if !changed {
            break;
        }
    }

    let max = dist
        .iter()
        .copied()
        .filter(|d| d.is_finite())
        .fold(0.0f64, f64::max);

    let data: Vec<f32> = dist
        .iter()
        .map(|&d| {
            if !d.is_finite() {
                0.0
            } else if max > 0.0 {
                (d / max) as f32
            } else {
                d as f32
            }
        })
        .collect();

    log::debug!(
        "shapeburst field {}x{} converged after {} passes (max burn {:.3})",
        width,
        height,
        pass,
        max
    );
    if let Some(p) = progress {
        p.set_value(1.0);
    }

    DistanceField {
        x: 0.0,
        y: 0.0,
        width,
        height,
        data,
    }
}
