// ============================================================================
// ADAPTIVE SUPERSAMPLING
// ============================================================================
//
// Each output pixel owns a (2^max_depth + 1)² grid of corner samples.  A cell
// is subdivided while its corner colours disagree by more than the threshold
// and the depth cap allows; leaves average their four corners.  Corner samples
// on a pixel's top edge and left edge are inherited from the pixel above and
// the pixel to the left, so neighbouring pixels never render the same point
// twice.

use crate::color::Rgba;

#[derive(Clone, Copy, Default)]
struct Sample {
    ready: bool,
    color: Rgba,
}

/// Per-pixel sample block plus the recursion parameters.
struct Block<'a, R> {
    render: &'a R,
    size: usize,
    max_depth: u32,
    threshold_sq: f64,
    cells: Vec<Sample>,
    samples: usize,
}

impl<R: Fn(f64, f64) -> Rgba> Block<'_, R> {
    #[inline]
    fn idx(&self, row: usize, col: usize) -> usize {
        row * (self.size + 1) + col
    }

    /// Offset of grid line `i` from the pixel position.
    #[inline]
    fn offset(&self, i: usize) -> f64 {
        (i as f64 - self.size as f64 / 2.0) / self.size as f64
    }

    fn corner(&mut self, x: f64, y: f64, row: usize, col: usize) -> Rgba {
        let i = self.idx(row, col);
        if !self.cells[i].ready {
            let color = (self.render)(x + self.offset(col), y + self.offset(row));
            self.cells[i] = Sample { ready: true, color };
            self.samples += 1;
        }
        self.cells[i].color
    }

    /// Average colour of the cell spanning grid columns `x1..=x3` and rows
    /// `y1..=y3`.
    #[allow(clippy::too_many_arguments)]
    fn render_cell(&mut self, depth: u32, x: f64, y: f64, x1: usize, y1: usize, x3: usize, y3: usize) -> Rgba {
        let c1 = self.corner(x, y, y1, x1);
        let c2 = self.corner(x, y, y1, x3);
        let c3 = self.corner(x, y, y3, x1);
        let c4 = self.corner(x, y, y3, x3);

        if depth < self.max_depth {
            let t = self.threshold_sq;
            let uneven = c1.distance_sq(c2) > t
                || c1.distance_sq(c3) > t
                || c1.distance_sq(c4) > t
                || c2.distance_sq(c3) > t
                || c2.distance_sq(c4) > t
                || c3.distance_sq(c4) > t;

            if uneven {
                let x2 = (x1 + x3) / 2;
                let y2 = (y1 + y3) / 2;
                let q1 = self.render_cell(depth + 1, x, y, x1, y1, x2, y2);
                let q2 = self.render_cell(depth + 1, x, y, x2, y1, x3, y2);
                let q3 = self.render_cell(depth + 1, x, y, x1, y2, x2, y3);
                let q4 = self.render_cell(depth + 1, x, y, x2, y2, x3, y3);
                return average(q1, q2, q3, q4);
            }
        }

        if c1 == c2 && c1 == c3 && c1 == c4 {
            c1
        } else {
            average(c1, c2, c3, c4)
        }
    }
}

#[inline]
fn average(a: Rgba, b: Rgba, c: Rgba, d: Rgba) -> Rgba {
    Rgba::new(
        0.25 * (a.r + b.r + c.r + d.r),
        0.25 * (a.g + b.g + c.g + d.g),
        0.25 * (a.b + b.b + c.b + d.b),
        0.25 * (a.a + b.a + c.a + d.a),
    )
}

/// Supersample every pixel in the inclusive rectangle `(x1, y1)..=(x2, y2)`.
///
/// `render` samples the image at a fractional position and must clamp
/// positions outside its domain itself.  `put` receives each finished pixel
/// in row-major order.  Returns the number of `render` calls.
#[allow(clippy::too_many_arguments)]
pub fn adaptive_supersample_area<R, P>(
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    max_depth: u32,
    threshold: f64,
    render: &R,
    mut put: P,
) -> usize
where
    R: Fn(f64, f64) -> Rgba,
    P: FnMut(i32, i32, Rgba),
{
    if x2 < x1 || y2 < y1 {
        return 0;
    }

    let size = 1usize << max_depth;
    let width = (x2 - x1 + 1) as usize;
    let row_len = size * width + 1;

    let mut block = Block {
        render,
        size,
        max_depth,
        threshold_sq: threshold * threshold,
        cells: vec![Sample::default(); (size + 1) * (size + 1)],
        samples: 0,
    };
    let mut top_row = vec![Sample::default(); row_len];
    let mut bot_row = vec![Sample::default(); row_len];

    for y in y1..=y2 {
        bot_row.iter_mut().for_each(|s| s.ready = false);
        for row in 0..=size {
            let i = block.idx(row, 0);
            block.cells[i].ready = false;
        }

        for x in x1..=x2 {
            let base = (x - x1) as usize * size;

            // Column 0 carries over from the pixel to the left; the rest is
            // fresh apart from the top edge shared with the row above.
            for row in 0..=size {
                for col in 1..=size {
                    let i = block.idx(row, col);
                    block.cells[i].ready = false;
                }
            }
            for col in 0..=size {
                let i = block.idx(0, col);
                block.cells[i] = top_row[base + col];
            }

            let color = block.render_cell(0, x as f64, y as f64, 0, 0, size, size);
            put(x, y, color);

            top_row[base + size] = block.cells[block.idx(0, size)];
            for col in 0..=size {
                bot_row[base + col] = block.cells[block.idx(size, col)];
            }
            for row in 0..=size {
                let (a, b) = (block.idx(row, 0), block.idx(row, size));
                block.cells.swap(a, b);
            }
        }

        std::mem::swap(&mut top_row, &mut bot_row);
    }

    block.samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn collect<R: Fn(f64, f64) -> Rgba>(w: i32, h: i32, depth: u32, threshold: f64, render: &R) -> (Vec<Rgba>, usize) {
        let mut out = Vec::new();
        let n = adaptive_supersample_area(0, 0, w - 1, h - 1, depth, threshold, render, |_, _, c| out.push(c));
        (out, n)
    }

    #[test]
    fn test_constant_color_matches_plain_render() {
        let c = Rgba::new(0.2, 0.4, 0.6, 0.8);
        for depth in 0..5 {
            for threshold in [0.0, 0.01, 1.0] {
                let (pixels, _) = collect(5, 3, depth, threshold, &|_: f64, _: f64| c);
                assert!(pixels.iter().all(|&p| p == c));
            }
        }
    }

    #[test]
    fn test_flat_input_shares_corner_samples() {
        // A w×h area has (w+1)(h+1) pixel corners; flat input never subdivides.
        let calls = Cell::new(0usize);
        let render = |_: f64, _: f64| {
            calls.set(calls.get() + 1);
            Rgba::WHITE
        };
        let (_, n) = collect(4, 3, 3, 0.0, &render);
        assert_eq!(n, 20);
        assert_eq!(calls.get(), 20);
    }

    #[test]
    fn test_put_visits_row_major() {
        let mut seen = Vec::new();
        adaptive_supersample_area(2, 5, 4, 6, 1, 0.1, &|_: f64, _: f64| Rgba::BLACK, |x, y, _| seen.push((x, y)));
        assert_eq!(seen, vec![(2, 5), (3, 5), (4, 5), (2, 6), (3, 6), (4, 6)]);
    }

    #[test]
    fn test_hard_edge_is_antialiased() {
        // Vertical edge through the middle of pixel 1.
        let render = |x: f64, _: f64| if x < 1.0 { Rgba::BLACK } else { Rgba::WHITE };
        let (pixels, _) = collect(3, 1, 3, 0.01, &render);
        assert_eq!(pixels[0], Rgba::BLACK);
        assert_eq!(pixels[2], Rgba::WHITE);
        assert!(pixels[1].r > 0.2 && pixels[1].r < 0.8, "{:?}", pixels[1]);
    }

    #[test]
    fn test_depth_cap_bounds_work() {
        let render = |x: f64, y: f64| Rgba::new((x * 37.0).sin().abs(), (y * 11.0).cos().abs(), 0.0, 1.0);
        let (_, shallow) = collect(4, 4, 1, 0.0, &render);
        let (_, deep) = collect(4, 4, 3, 0.0, &render);
        assert!(shallow <= 9 * 9);
        assert!(deep <= 33 * 33);
        assert!(deep > shallow);
    }

    #[test]
    fn test_empty_area_renders_nothing() {
        let (pixels, n) = collect(0, 4, 2, 0.1, &|_: f64, _: f64| Rgba::WHITE);
        assert!(pixels.is_empty());
        assert_eq!(n, 0);
    }
}
