use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::canvas::{Drawable, PaintMode, PixelRegion, Rect};
use crate::color::{Rgba, quantize};
use crate::error::FillError;
use crate::ops::Progress;
use crate::ops::dither::{DEFAULT_DITHER_SEED, Ditherer};
use crate::ops::gradient::SegmentGradient;
use crate::ops::render::{BlendMode, RenderContext, RepeatMode};
use crate::ops::shape::{GradientGeometry, GradientShape};
use crate::ops::shapeburst::{ShapeburstEdges, compute_distance_field_with};
use crate::ops::supersample::adaptive_supersample_area;

/// Deepest supersampling recursion accepted (a 257×257 sample grid per pixel).
pub const MAX_SUPERSAMPLE_DEPTH: u32 = 8;
/// Rows handed to one worker when supersampling, so corner samples can be
/// shared between neighbouring rows.
const SUPERSAMPLE_BAND: usize = 16;
/// Share of the progress range spent on the shapeburst precompute.
const SHAPEBURST_PROGRESS: f64 = 0.5;

// ============================================================================
// OPTIONS
// ============================================================================

/// Every parameter of one fill.  Loadable from a JSON preset; missing keys
/// take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendOptions {
    pub blend_mode: BlendMode,
    pub paint_mode: PaintMode,
    pub shape: GradientShape,
    /// 0.0 – 1.0
    pub opacity: f64,
    /// 0 – 100
    pub offset: f64,
    pub repeat: RepeatMode,
    pub reverse: bool,
    pub supersample: bool,
    pub max_depth: u32,
    pub threshold: f64,
    pub dither: bool,
    pub dither_seed: u64,
    pub shapeburst_edges: ShapeburstEdges,
    pub start: [f64; 2],
    pub end: [f64; 2],
}

impl Default for BlendOptions {
    fn default() -> Self {
        Self {
            blend_mode: BlendMode::FgBgRgb,
            paint_mode: PaintMode::Normal,
            shape: GradientShape::Linear,
            opacity: 1.0,
            offset: 0.0,
            repeat: RepeatMode::None,
            reverse: false,
            supersample: false,
            max_depth: 3,
            threshold: 0.2,
            dither: true,
            dither_seed: DEFAULT_DITHER_SEED,
            shapeburst_edges: ShapeburstEdges::Keep,
            start: [0.0, 0.0],
            end: [0.0, 0.0],
        }
    }
}

impl BlendOptions {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Reject parameter combinations the renderer cannot honour.
    pub fn validate(&self) -> Result<(), FillError> {
        let invalid = |msg: String| Err(FillError::InvalidOption(msg));

        if !self.start.iter().chain(self.end.iter()).all(|v| v.is_finite()) {
            return invalid(format!(
                "gradient endpoints must be finite (start {:?}, end {:?})",
                self.start, self.end
            ));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return invalid(format!("opacity {} is outside 0..=1", self.opacity));
        }
        if !(0.0..=100.0).contains(&self.offset) {
            return invalid(format!("offset {} is outside 0..=100", self.offset));
        }
        if !(self.threshold >= 0.0 && self.threshold.is_finite()) {
            return invalid(format!("threshold {} must be a non-negative number", self.threshold));
        }
        if self.max_depth > MAX_SUPERSAMPLE_DEPTH {
            return invalid(format!(
                "max_depth {} exceeds {}",
                self.max_depth, MAX_SUPERSAMPLE_DEPTH
            ));
        }
        Ok(())
    }
}

/// Colours and gradient the fill draws from.
#[derive(Clone, Debug)]
pub struct FillContext {
    pub foreground: Rgba,
    pub background: Rgba,
    pub gradient: Option<SegmentGradient>,
}

impl Default for FillContext {
    fn default() -> Self {
        Self {
            foreground: Rgba::BLACK,
            background: Rgba::WHITE,
            gradient: None,
        }
    }
}

// ============================================================================
// PROGRESS PLUMBING
// ============================================================================

/// Maps a sub-task's `0..1` onto `start..start + span` of the outer sink.
struct ScaledProgress<'a> {
    inner: &'a dyn Progress,
    start: f64,
    span: f64,
}

impl Progress for ScaledProgress<'_> {
    fn set_value(&self, value: f64) {
        self.inner.set_value(self.start + self.span * value.clamp(0.0, 1.0));
    }
}

/// Counts finished rows from any worker and forwards a non-decreasing
/// fraction.
struct RowProgress<'a> {
    sink: Option<ScaledProgress<'a>>,
    total: usize,
    step: usize,
    done: AtomicUsize,
    reported: Mutex<usize>,
}

impl<'a> RowProgress<'a> {
    fn new(sink: Option<ScaledProgress<'a>>, total: usize) -> Self {
        Self {
            sink,
            total,
            step: (total / 100).max(1),
            done: AtomicUsize::new(0),
            reported: Mutex::new(0),
        }
    }

    fn rows_finished(&self, rows: usize) {
        let Some(sink) = self.sink.as_ref() else { return };
        let before = self.done.fetch_add(rows, Ordering::Relaxed);
        let done = before + rows;
        if done / self.step == before / self.step && done < self.total {
            return;
        }
        if let Ok(mut reported) = self.reported.lock() {
            if done > *reported {
                *reported = done;
                sink.set_value(done as f64 / self.total as f64);
            }
        }
    }
}

// ============================================================================
// PIXEL WRITE-OUT
// ============================================================================

/// Quantize one colour into a scratch pixel (colour channels + alpha).
#[inline]
fn put_pixel(out: &mut [u8], color: Rgba, gray: bool, dither: Option<&Ditherer>, x: u32, y: u32) {
    let color = if gray {
        let l = color.luminance();
        Rgba::new(l, l, l, color.a)
    } else {
        color
    };
    let [r, g, b, a] = match dither {
        Some(d) => d.quantize(color, x, y),
        None => [quantize(color.r), quantize(color.g), quantize(color.b), quantize(color.a)],
    };
    if gray {
        out[0] = r;
        out[1] = a;
    } else {
        out[0] = r;
        out[1] = g;
        out[2] = b;
        out[3] = a;
    }
}

// ============================================================================
// ENTRY POINT
// ============================================================================

/// Fill `drawable` with a gradient.
///
/// The fill covers the selection bounds clipped to the drawable (the whole
/// drawable without a selection).  Rendering happens in a scratch buffer;
/// only a complete render is composited, so a cancelled or failed fill leaves
/// the drawable untouched.  Returns the affected rectangle, or `None` when
/// there was nothing to fill.
pub fn drawable_blend(
    drawable: &mut Drawable,
    context: &FillContext,
    options: &BlendOptions,
    progress: Option<&dyn Progress>,
    cancel: Option<&AtomicBool>,
) -> Result<Option<Rect>, FillError> {
    options.validate()?;

    let Some(rect) = drawable.mask_intersect() else {
        log::warn!("blend: fill rectangle is empty, nothing to do");
        return Ok(None);
    };

    fill_rect(drawable, rect, context, options, progress, cancel)?;
    Ok(Some(rect))
}

/// Render the gradient over `rect` into a scratch buffer and composite it.
/// Nothing is written to `drawable` unless the whole render succeeds.
fn fill_rect(
    drawable: &mut Drawable,
    rect: Rect,
    context: &FillContext,
    options: &BlendOptions,
    progress: Option<&dyn Progress>,
    cancel: Option<&AtomicBool>,
) -> Result<(), FillError> {
    let started = Instant::now();
    let start = (options.start[0], options.start[1]);
    let end = (options.end[0], options.end[1]);
    let geometry = GradientGeometry::new(options.shape, start, end, options.offset);

    log::debug!(
        "blend: {} {} repeat={} rect={:?} start={:?} end={:?} dist={:.3} offset={}",
        options.shape.name(),
        options.blend_mode.name(),
        options.repeat.name(),
        rect,
        start,
        end,
        geometry.dist,
        options.offset
    );

    let mut render_ctx = RenderContext::new(
        options.shape,
        geometry,
        options.repeat,
        options.blend_mode,
        options.reverse,
        context.foreground,
        context.background,
        context.gradient.as_ref(),
    )?;

    let render_share = if options.shape.is_shapeburst() {
        // Seed: selection coverage if there is one, else the alpha channel
        // (all 255 for drawables without alpha).
        let seed = match drawable.active_selection() {
            Some(mask) => mask.crop(rect),
            None => drawable.extract_alpha(rect),
        };
        let sub = progress.map(|p| ScaledProgress {
            inner: p,
            start: 0.0,
            span: SHAPEBURST_PROGRESS,
        });
        let field = compute_distance_field_with(
            &seed,
            rect.width,
            rect.height,
            options.shapeburst_edges,
            sub.as_ref().map(|s| s as &dyn Progress),
        )
        .with_origin(rect.x, rect.y);
        render_ctx = render_ctx.with_distance_field(field);
        SHAPEBURST_PROGRESS
    } else {
        0.0
    };

    if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
        return Err(FillError::Cancelled);
    }

    let mut scratch = PixelRegion::try_new(rect.width, rect.height, drawable.bytes_with_alpha())?;
    let gray = drawable.format().is_gray();
    let ditherer = options.dither.then(|| Ditherer::new(options.dither_seed));
    let rows = RowProgress::new(
        progress.map(|p| ScaledProgress {
            inner: p,
            start: render_share,
            span: 1.0 - render_share,
        }),
        rect.height as usize,
    );

    let band = if options.supersample { SUPERSAMPLE_BAND } else { 1 };
    let stride = scratch.rowstride();
    let bpp = scratch.bytes();
    let samples = AtomicUsize::new(0);

    scratch
        .par_bands_mut(band)
        .enumerate()
        .try_for_each(|(band_idx, chunk)| {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                return Err(FillError::Cancelled);
            }
            let first_row = band_idx * band;
            let band_rows = chunk.len() / stride;

            if options.supersample {
                let y0 = (rect.y as usize + first_row) as i32;
                let x0 = rect.x as i32;
                let render = |x: f64, y: f64| render_ctx.render_pixel(x, y);
                let n = adaptive_supersample_area(
                    x0,
                    y0,
                    x0 + rect.width as i32 - 1,
                    y0 + band_rows as i32 - 1,
                    options.max_depth,
                    options.threshold,
                    &render,
                    |x, y, color| {
                        let lx = (x - x0) as usize;
                        let ly = (y - y0) as usize;
                        let off = ly * stride + lx * bpp;
                        put_pixel(&mut chunk[off..off + bpp], color, gray, ditherer.as_ref(), x as u32, y as u32);
                    },
                );
                samples.fetch_add(n, Ordering::Relaxed);
            } else {
                let y = rect.y + first_row as u32;
                for (i, px) in chunk.chunks_exact_mut(bpp).enumerate() {
                    let x = rect.x + i as u32;
                    let color = render_ctx.render_pixel(x as f64, y as f64);
                    put_pixel(px, color, gray, ditherer.as_ref(), x, y);
                }
            }

            rows.rows_finished(band_rows);
            Ok(())
        })?;

    drawable.apply_region(&scratch, rect, options.opacity as f32, options.paint_mode);
    drawable.update(rect);

    if let Some(p) = progress {
        p.set_value(1.0);
    }

    if options.supersample {
        log::info!(
            "blend: filled {}x{} at ({}, {}) in {:.1?} ({} samples)",
            rect.width,
            rect.height,
            rect.x,
            rect.y,
            started.elapsed(),
            samples.load(Ordering::Relaxed)
        );
    } else {
        log::info!(
            "blend: filled {}x{} at ({}, {}) in {:.1?}",
            rect.width,
            rect.height,
            rect.x,
            rect.y,
            started.elapsed()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::PixelFormat;

    fn opts(end: [f64; 2]) -> BlendOptions {
        BlendOptions {
            dither: false,
            end,
            ..BlendOptions::default()
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(BlendOptions::default().validate().is_ok());
        let bad = [
            BlendOptions { opacity: 1.5, ..BlendOptions::default() },
            BlendOptions { offset: -1.0, ..BlendOptions::default() },
            BlendOptions { threshold: -0.1, ..BlendOptions::default() },
            BlendOptions { threshold: f64::NAN, ..BlendOptions::default() },
            BlendOptions { max_depth: 9, ..BlendOptions::default() },
            BlendOptions { start: [f64::INFINITY, 0.0], ..BlendOptions::default() },
        ];
        for o in bad {
            assert!(matches!(o.validate(), Err(FillError::InvalidOption(_))), "{:?}", o);
        }
    }

    #[test]
    fn test_json_preset_fills_missing_keys_with_defaults() {
        let o = BlendOptions::from_json(r#"{ "shape": "radial", "repeat": "triangular", "end": [10, 0] }"#).unwrap();
        assert_eq!(o.shape, GradientShape::Radial);
        assert_eq!(o.repeat, RepeatMode::Triangular);
        assert_eq!(o.end, [10.0, 0.0]);
        assert_eq!(o.max_depth, 3);
        let back = BlendOptions::from_json(&o.to_json().unwrap()).unwrap();
        assert_eq!(back, o);
    }

    #[test]
    fn test_gray_drawable_receives_luminance() {
        let mut d = Drawable::new(4, 1, PixelFormat::Gray);
        let ctx = FillContext {
            foreground: Rgba::new(1.0, 0.0, 0.0, 1.0),
            background: Rgba::new(1.0, 0.0, 0.0, 1.0),
            gradient: None,
        };
        drawable_blend(&mut d, &ctx, &opts([3.0, 0.0]), None, None).unwrap();
        assert_eq!(d.pixel(2, 0), &[quantize(0.2126)]);
    }

    #[test]
    fn test_selection_limits_the_fill() {
        use crate::canvas::{SelectionMode, SelectionShape};
        let mut d = Drawable::new(8, 8, PixelFormat::Rgba);
        d.select(
            &SelectionShape::Rectangle { min_x: 2, min_y: 2, max_x: 4, max_y: 3 },
            SelectionMode::Replace,
        );
        let rect = drawable_blend(&mut d, &FillContext::default(), &opts([8.0, 0.0]), None, None).unwrap();
        assert_eq!(rect, Some(Rect::new(2, 2, 3, 2)));
        assert_eq!(d.pixel(0, 0), &[0, 0, 0, 0]);
        assert_eq!(d.pixel(3, 2)[3], 255);
        assert_eq!(d.dirty(), Some(Rect::new(2, 2, 3, 2)));
    }

    #[test]
    fn test_progress_reaches_one_monotonically() {
        let seen = Mutex::new(Vec::new());
        let sink = |v: f64| seen.lock().unwrap().push(v);
        let mut d = Drawable::new(16, 300, PixelFormat::Rgba);
        let o = BlendOptions {
            shape: GradientShape::ShapeburstAngular,
            ..opts([1.0, 0.0])
        };
        drawable_blend(&mut d, &FillContext::default(), &o, Some(&sink), None).unwrap();
        let seen = seen.into_inner().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
        assert_eq!(seen.last().copied(), Some(1.0));
    }

    #[test]
    fn test_custom_without_gradient_fails_before_touching_pixels() {
        let mut d = Drawable::new_filled(3, 3, PixelFormat::Rgb, &[9, 9, 9]);
        let o = BlendOptions {
            blend_mode: BlendMode::Custom,
            ..opts([3.0, 0.0])
        };
        let err = drawable_blend(&mut d, &FillContext::default(), &o, None, None);
        assert!(matches!(err, Err(FillError::MissingGradient)));
        assert_eq!(d.pixel(1, 1), &[9, 9, 9]);
        assert_eq!(d.dirty(), None);
    }

    #[test]
    fn test_failed_scratch_allocation_leaves_drawable_untouched() {
        let mut d = Drawable::new_filled(3, 3, PixelFormat::Rgb, &[9, 9, 9]);
        let huge = Rect::new(0, 0, u32::MAX, u32::MAX);
        let err = fill_rect(&mut d, huge, &FillContext::default(), &opts([3.0, 0.0]), None, None);
        assert!(matches!(
            err,
            Err(FillError::Allocation { width: u32::MAX, height: u32::MAX, bytes: 4 })
        ));
        assert_eq!(d.pixel(1, 1), &[9, 9, 9]);
        assert_eq!(d.dirty(), None);
    }
}
