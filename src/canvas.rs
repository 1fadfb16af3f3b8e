use std::sync::Arc;

use image::{DynamicImage, GrayAlphaImage, GrayImage, Luma, RgbImage, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::FillError;

// ============================================================================
// PIXEL FORMATS
// ============================================================================

/// Channel layout of a drawable.  Every format is 8 bits per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PixelFormat {
    Gray,
    GrayAlpha,
    Rgb,
    #[default]
    Rgba,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes(self) -> usize {
        match self {
            PixelFormat::Gray => 1,
            PixelFormat::GrayAlpha => 2,
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, PixelFormat::GrayAlpha | PixelFormat::Rgba)
    }

    /// Number of colour (non-alpha) channels.
    pub fn color_channels(self) -> usize {
        match self {
            PixelFormat::Gray | PixelFormat::GrayAlpha => 1,
            PixelFormat::Rgb | PixelFormat::Rgba => 3,
        }
    }

    /// The same layout with an alpha channel added (scratch buffers always
    /// carry alpha).
    pub fn with_alpha(self) -> PixelFormat {
        match self {
            PixelFormat::Gray | PixelFormat::GrayAlpha => PixelFormat::GrayAlpha,
            PixelFormat::Rgb | PixelFormat::Rgba => PixelFormat::Rgba,
        }
    }

    pub fn is_gray(self) -> bool {
        self.color_channels() == 1
    }
}

// ============================================================================
// RECT
// ============================================================================

/// Integer pixel rectangle.  `width == 0 || height == 0` is empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
    }

    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }
}

// ============================================================================
// TILED IMAGE – sparse 64×64 chunk storage (Vec-indexed for speed)
// ============================================================================

pub const CHUNK_SIZE: u32 = 64;

/// Returned by reference for pixels in missing chunks (all channels zero).
static ZERO_PIXEL: [u8; 4] = [0; 4];

/// Sparse tiled image backed by a flat `Vec<Option<Arc<Vec<u8>>>>`.
/// Chunk coordinates are mapped to a flat index via `cy * chunks_per_row + cx`.
///
/// Chunks are wrapped in `Arc` for copy-on-write semantics: `clone()` only
/// bumps reference counts and writes use `Arc::make_mut` to COW-clone only
/// the touched chunk.  A missing chunk reads as all-zero bytes.
#[derive(Clone)]
pub struct TiledImage {
    width: u32,
    height: u32,
    bytes: usize,
    chunks_per_row: u32,
    chunks: Vec<Option<Arc<Vec<u8>>>>,
}

impl TiledImage {
    // ---- construction -------------------------------------------------------

    /// Create an empty (all-zero) tiled image with `bytes` per pixel.
    pub fn new(width: u32, height: u32, bytes: usize) -> Self {
        debug_assert!((1..=4).contains(&bytes));
        let chunks_per_row = width.div_ceil(CHUNK_SIZE);
        let chunks_per_col = height.div_ceil(CHUNK_SIZE);
        let total = (chunks_per_row * chunks_per_col) as usize;
        Self {
            width,
            height,
            bytes,
            chunks_per_row,
            chunks: vec![None; total],
        }
    }

    /// Import from a flat row-major byte slice of `width * height * bytes`.
    /// All-zero chunks are not stored.  Chunk conversion is parallelised with
    /// rayon.
    pub fn from_raw(width: u32, height: u32, bytes: usize, data: &[u8]) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * bytes);
        let mut img = Self::new(width, height, bytes);

        let chunks_x = img.chunks_per_row as usize;
        let chunks_y = height.div_ceil(CHUNK_SIZE) as usize;
        let total_chunks = chunks_x * chunks_y;
        let src_stride = width as usize * bytes;
        let chunk_stride = CHUNK_SIZE as usize * bytes;

        let chunk_results: Vec<(usize, Option<Arc<Vec<u8>>>)> = (0..total_chunks)
            .into_par_iter()
            .map(|flat| {
                let cx = (flat % chunks_x) as u32;
                let cy = (flat / chunks_x) as u32;
                let base_x = cx * CHUNK_SIZE;
                let base_y = cy * CHUNK_SIZE;

                let cw = CHUNK_SIZE.min(width - base_x) as usize;
                let ch = CHUNK_SIZE.min(height - base_y);
                let mut chunk_data = vec![0u8; chunk_stride * CHUNK_SIZE as usize];
                let mut has_content = false;

                for ly in 0..ch {
                    let src_start = (base_y + ly) as usize * src_stride + base_x as usize * bytes;
                    let dst_start = ly as usize * chunk_stride;
                    let byte_len = cw * bytes;
                    let src = &data[src_start..src_start + byte_len];
                    chunk_data[dst_start..dst_start + byte_len].copy_from_slice(src);
                    has_content |= src.iter().any(|&b| b != 0);
                }

                (flat, has_content.then(|| Arc::new(chunk_data)))
            })
            .collect();

        for (idx, chunk) in chunk_results {
            img.chunks[idx] = chunk;
        }
        img
    }

    /// Flatten back to contiguous row-major bytes.
    pub fn to_raw(&self) -> Vec<u8> {
        let stride = self.width as usize * self.bytes;
        let mut out = vec![0u8; stride * self.height as usize];
        out.par_chunks_mut(stride.max(1))
            .enumerate()
            .for_each(|(y, row)| self.read_row(0, y as u32, row));
        out
    }

    // ---- indexing helpers ----------------------------------------------------

    #[inline(always)]
    fn flat_index(&self, cx: u32, cy: u32) -> usize {
        (cy * self.chunks_per_row + cx) as usize
    }

    #[inline(always)]
    fn local_offset(&self, x: u32, y: u32) -> usize {
        let lx = (x % CHUNK_SIZE) as usize;
        let ly = (y % CHUNK_SIZE) as usize;
        (ly * CHUNK_SIZE as usize + lx) * self.bytes
    }

    fn chunk_mut(&mut self, cx: u32, cy: u32) -> &mut Vec<u8> {
        let idx = self.flat_index(cx, cy);
        let len = (CHUNK_SIZE * CHUNK_SIZE) as usize * self.bytes;
        let arc = self.chunks[idx].get_or_insert_with(|| Arc::new(vec![0u8; len]));
        Arc::make_mut(arc)
    }

    // ---- pixel access -------------------------------------------------------

    /// Read a pixel (all-zero for missing chunks or out-of-range coordinates).
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> &[u8] {
        if x >= self.width || y >= self.height {
            return &ZERO_PIXEL[..self.bytes];
        }
        let idx = self.flat_index(x / CHUNK_SIZE, y / CHUNK_SIZE);
        let off = self.local_offset(x, y);
        match self.chunks[idx].as_ref() {
            Some(chunk) => &chunk[off..off + self.bytes],
            None => &ZERO_PIXEL[..self.bytes],
        }
    }

    /// Write a pixel (creates the chunk on demand, COW-clones if shared).
    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, pixel: &[u8]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let bytes = self.bytes;
        let off = self.local_offset(x, y);
        let chunk = self.chunk_mut(x / CHUNK_SIZE, y / CHUNK_SIZE);
        chunk[off..off + bytes].copy_from_slice(&pixel[..bytes]);
    }

    /// Copy `out.len() / bytes` pixels starting at `(x, y)` into `out`.
    /// Pixels beyond the right edge read as zero.
    pub fn read_row(&self, x: u32, y: u32, out: &mut [u8]) {
        out.fill(0);
        if y >= self.height || x >= self.width {
            return;
        }
        let count = (out.len() / self.bytes).min((self.width - x) as usize) as u32;
        let mut gx = x;
        while gx < x + count {
            let run = (CHUNK_SIZE - gx % CHUNK_SIZE).min(x + count - gx);
            let idx = self.flat_index(gx / CHUNK_SIZE, y / CHUNK_SIZE);
            if let Some(chunk) = self.chunks[idx].as_ref() {
                let src = self.local_offset(gx, y);
                let dst = (gx - x) as usize * self.bytes;
                let len = run as usize * self.bytes;
                out[dst..dst + len].copy_from_slice(&chunk[src..src + len]);
            }
            gx += run;
        }
    }

    /// Write a row of pixels starting at `(x, y)`, clipped to the image.
    pub fn write_row(&mut self, x: u32, y: u32, data: &[u8]) {
        if y >= self.height || x >= self.width {
            return;
        }
        let bytes = self.bytes;
        let count = (data.len() / bytes).min((self.width - x) as usize) as u32;
        let mut gx = x;
        while gx < x + count {
            let run = (CHUNK_SIZE - gx % CHUNK_SIZE).min(x + count - gx);
            let src = (gx - x) as usize * bytes;
            let len = run as usize * bytes;
            let slice = &data[src..src + len];
            let idx = self.flat_index(gx / CHUNK_SIZE, y / CHUNK_SIZE);
            // Skip materialising chunks for all-zero runs.
            if self.chunks[idx].is_some() || slice.iter().any(|&b| b != 0) {
                let dst = self.local_offset(gx, y);
                let chunk = self.chunk_mut(gx / CHUNK_SIZE, y / CHUNK_SIZE);
                chunk[dst..dst + len].copy_from_slice(slice);
            }
            gx += run;
        }
    }

    /// Fill every pixel with `pixel`.
    pub fn fill(&mut self, pixel: &[u8]) {
        let bytes = self.bytes;
        if pixel[..bytes].iter().all(|&b| b == 0) {
            self.chunks.iter_mut().for_each(|c| *c = None);
            return;
        }
        let mut chunk = vec![0u8; (CHUNK_SIZE * CHUNK_SIZE) as usize * bytes];
        for px in chunk.chunks_exact_mut(bytes) {
            px.copy_from_slice(&pixel[..bytes]);
        }
        let chunk = Arc::new(chunk);
        for slot in &mut self.chunks {
            *slot = Some(Arc::clone(&chunk));
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Number of populated chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }
}

// ============================================================================
// PIXEL REGION – contiguous scratch buffer the blend engine renders into
// ============================================================================

/// Row-major 8-bit buffer of `width × height` pixels with `bytes` per pixel.
pub struct PixelRegion {
    width: u32,
    height: u32,
    bytes: usize,
    data: Vec<u8>,
}

impl PixelRegion {
    /// Allocate a zeroed buffer, reporting allocation failure instead of
    /// aborting the process.
    pub fn try_new(width: u32, height: u32, bytes: usize) -> Result<Self, FillError> {
        let alloc_err = || FillError::Allocation {
            width,
            height,
            bytes,
        };
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(bytes))
            .ok_or_else(alloc_err)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| alloc_err())?;
        data.resize(len, 0);
        Ok(Self {
            width,
            height,
            bytes,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn rowstride(&self) -> usize {
        self.width as usize * self.bytes
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.rowstride();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let off = y as usize * self.rowstride() + x as usize * self.bytes;
        &self.data[off..off + self.bytes]
    }

    /// Independent mutable bands of `rows` rows each, in row order, for
    /// parallel workers.  The last band may be shorter.
    pub fn par_bands_mut(&mut self, rows: usize) -> rayon::slice::ChunksMut<'_, u8> {
        let len = (self.rowstride() * rows.max(1)).max(1);
        self.data.par_chunks_mut(len)
    }
}

// ============================================================================
// SELECTION SYSTEM
// ============================================================================

/// How a new selection shape interacts with the existing mask.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum SelectionMode {
    /// Clear any existing selection, then set the new shape.
    #[default]
    Replace,
    /// Union – add to the existing mask.
    Add,
    /// Difference – subtract from the existing mask.
    Subtract,
    /// Keep only pixels present in both the existing mask AND the new shape.
    Intersect,
}

/// Shape used to build a selection.
#[derive(Clone, Debug)]
pub enum SelectionShape {
    Rectangle { min_x: u32, min_y: u32, max_x: u32, max_y: u32 },
    Ellipse { cx: f32, cy: f32, rx: f32, ry: f32 },
}

impl SelectionShape {
    /// Returns 255 if the pixel (x, y) is inside the shape, 0 otherwise.
    pub fn contains(&self, x: u32, y: u32) -> u8 {
        match self {
            SelectionShape::Rectangle { min_x, min_y, max_x, max_y } => {
                if x >= *min_x && x <= *max_x && y >= *min_y && y <= *max_y {
                    255
                } else {
                    0
                }
            }
            SelectionShape::Ellipse { cx, cy, rx, ry } => {
                if *rx <= 0.0 || *ry <= 0.0 {
                    return 0;
                }
                let dx = (x as f32 + 0.5 - cx) / rx;
                let dy = (y as f32 + 0.5 - cy) / ry;
                if dx * dx + dy * dy <= 1.0 { 255 } else { 0 }
            }
        }
    }

    /// Inclusive bounding box in pixel coordinates (clamped to the mask),
    /// `None` when the shape lies entirely outside.
    pub fn bounds(&self, mask_w: u32, mask_h: u32) -> Option<(u32, u32, u32, u32)> {
        if mask_w == 0 || mask_h == 0 {
            return None;
        }
        let (x0, y0, x1, y1) = match self {
            SelectionShape::Rectangle { min_x, min_y, max_x, max_y } => {
                (*min_x, *min_y, (*max_x).min(mask_w - 1), (*max_y).min(mask_h - 1))
            }
            SelectionShape::Ellipse { cx, cy, rx, ry } => {
                let min_x = (cx - rx).max(0.0).floor() as u32;
                let min_y = (cy - ry).max(0.0).floor() as u32;
                let max_x = ((cx + rx).max(0.0).ceil() as u32).min(mask_w - 1);
                let max_y = ((cy + ry).max(0.0).ceil() as u32).min(mask_h - 1);
                (min_x, min_y, max_x, max_y)
            }
        };
        (x0 <= x1 && y0 <= y1).then_some((x0, y0, x1, y1))
    }
}

/// 8-bit selection coverage, 0 = unselected, 255 = fully selected.
#[derive(Clone, Debug)]
pub struct SelectionMask {
    mask: GrayImage,
}

impl SelectionMask {
    /// An empty (nothing selected) mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            mask: GrayImage::new(width, height),
        }
    }

    pub fn from_gray(mask: GrayImage) -> Self {
        Self { mask }
    }

    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    #[inline]
    pub fn value(&self, x: u32, y: u32) -> u8 {
        if x >= self.mask.width() || y >= self.mask.height() {
            return 0;
        }
        self.mask.get_pixel(x, y).0[0]
    }

    /// `true` when no pixel has any coverage.
    pub fn is_empty(&self) -> bool {
        self.mask.as_raw().iter().all(|&v| v == 0)
    }

    /// Tight bounding box of all covered pixels.
    pub fn bounds(&self) -> Option<Rect> {
        let w = self.mask.width();
        let (mut x0, mut y0, mut x1, mut y1) = (u32::MAX, u32::MAX, 0u32, 0u32);
        for (y, row) in self.mask.as_raw().chunks_exact(w.max(1) as usize).enumerate() {
            if let Some(first) = row.iter().position(|&v| v != 0) {
                let last = row.iter().rposition(|&v| v != 0).unwrap_or(first);
                x0 = x0.min(first as u32);
                x1 = x1.max(last as u32);
                y0 = y0.min(y as u32);
                y1 = y as u32;
            }
        }
        (x0 != u32::MAX).then(|| Rect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1))
    }

    /// Copy the coverage under `rect` as a tightly packed byte buffer.
    pub fn crop(&self, rect: Rect) -> Vec<u8> {
        let mut out = Vec::with_capacity(rect.width as usize * rect.height as usize);
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                out.push(self.value(x, y));
            }
        }
        out
    }

    /// Apply a selection shape to the mask according to `mode`.
    pub fn apply_shape(&mut self, shape: &SelectionShape, mode: SelectionMode) {
        let w = self.mask.width();
        let h = self.mask.height();
        let bounds = shape.bounds(w, h);

        match mode {
            SelectionMode::Replace => {
                self.mask.as_mut().fill(0);
                if let Some((bx0, by0, bx1, by1)) = bounds {
                    for y in by0..=by1 {
                        for x in bx0..=bx1 {
                            let v = shape.contains(x, y);
                            if v > 0 {
                                self.mask.put_pixel(x, y, Luma([v]));
                            }
                        }
                    }
                }
            }
            SelectionMode::Add => {
                let Some((bx0, by0, bx1, by1)) = bounds else { return };
                for y in by0..=by1 {
                    for x in bx0..=bx1 {
                        let new_val = shape.contains(x, y);
                        if new_val > 0 {
                            let old = self.mask.get_pixel(x, y).0[0];
                            self.mask.put_pixel(x, y, Luma([old.max(new_val)]));
                        }
                    }
                }
            }
            SelectionMode::Subtract => {
                let Some((bx0, by0, bx1, by1)) = bounds else { return };
                for y in by0..=by1 {
                    for x in bx0..=bx1 {
                        let sub_val = shape.contains(x, y);
                        if sub_val > 0 {
                            let old = self.mask.get_pixel(x, y).0[0];
                            self.mask.put_pixel(x, y, Luma([old.saturating_sub(sub_val)]));
                        }
                    }
                }
            }
            SelectionMode::Intersect => {
                // Keep only pixels inside BOTH the existing mask and the new shape.
                let old_mask = std::mem::replace(&mut self.mask, GrayImage::new(w, h));
                let Some((bx0, by0, bx1, by1)) = bounds else { return };
                for y in by0..=by1 {
                    for x in bx0..=bx1 {
                        let shape_val = shape.contains(x, y);
                        let old_val = old_mask.get_pixel(x, y).0[0];
                        if shape_val > 0 && old_val > 0 {
                            self.mask.put_pixel(x, y, Luma([shape_val.min(old_val)]));
                        }
                    }
                }
            }
        }
    }
}

// ============================================================================
// PAINT MODES – how the rendered gradient is applied to the drawable
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaintMode {
    #[default]
    Normal,
    /// Paint only where the destination is transparent.
    Behind,
    Multiply,
    Screen,
    Overlay,
    Difference,
    Addition,
    Subtract,
    Darken,
    Lighten,
    /// Replace destination channels (alpha included), scaled by opacity.
    Replace,
}

impl PaintMode {
    pub fn all() -> &'static [PaintMode] {
        &[
            PaintMode::Normal,
            PaintMode::Behind,
            PaintMode::Multiply,
            PaintMode::Screen,
            PaintMode::Overlay,
            PaintMode::Difference,
            PaintMode::Addition,
            PaintMode::Subtract,
            PaintMode::Darken,
            PaintMode::Lighten,
            PaintMode::Replace,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            PaintMode::Normal => "normal",
            PaintMode::Behind => "behind",
            PaintMode::Multiply => "multiply",
            PaintMode::Screen => "screen",
            PaintMode::Overlay => "overlay",
            PaintMode::Difference => "difference",
            PaintMode::Addition => "addition",
            PaintMode::Subtract => "subtract",
            PaintMode::Darken => "darken",
            PaintMode::Lighten => "lighten",
            PaintMode::Replace => "replace",
        }
    }

    pub fn from_name(name: &str) -> Option<PaintMode> {
        let name = name.to_ascii_lowercase();
        Self::all().iter().copied().find(|m| m.name() == name)
    }

    #[inline]
    fn blend_channel(self, base: f32, top: f32) -> f32 {
        match self {
            PaintMode::Multiply => base * top,
            PaintMode::Screen => 1.0 - (1.0 - base) * (1.0 - top),
            PaintMode::Overlay => {
                if base < 0.5 {
                    2.0 * base * top
                } else {
                    1.0 - 2.0 * (1.0 - base) * (1.0 - top)
                }
            }
            PaintMode::Difference => (base - top).abs(),
            PaintMode::Addition => (base + top).min(1.0),
            PaintMode::Subtract => (base - top).max(0.0),
            PaintMode::Darken => base.min(top),
            PaintMode::Lighten => base.max(top),
            PaintMode::Normal | PaintMode::Behind | PaintMode::Replace => top,
        }
    }

    /// Composite one `top` pixel (colour channels + alpha) onto `base` in place.
    ///
    /// `base` has `channels` colour channels plus alpha when `base_alpha`;
    /// `opacity` already includes the selection coverage.
    pub fn composite(self, base: &mut [u8], base_alpha: bool, top: &[u8], channels: usize, opacity: f32) {
        let to_f = |v: u8| v as f32 / 255.0;
        let to_u = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;

        let top_a = to_f(top[channels]) * opacity;
        let base_a = if base_alpha { to_f(base[channels]) } else { 1.0 };

        match self {
            PaintMode::Replace => {
                let n = if base_alpha { channels + 1 } else { channels };
                for i in 0..n {
                    let b = to_f(base[i]);
                    base[i] = to_u(b + (to_f(top[i]) - b) * opacity);
                }
                return;
            }
            PaintMode::Behind => {
                let out_a = base_a + top_a * (1.0 - base_a);
                if out_a == 0.0 {
                    return;
                }
                for i in 0..channels {
                    let c = (to_f(base[i]) * base_a + to_f(top[i]) * top_a * (1.0 - base_a)) / out_a;
                    base[i] = to_u(c);
                }
                if base_alpha {
                    base[channels] = to_u(out_a);
                }
                return;
            }
            _ => {}
        }

        if top_a == 0.0 {
            return;
        }
        let out_a = top_a + base_a * (1.0 - top_a);
        for i in 0..channels {
            let b = to_f(base[i]);
            let blended = self.blend_channel(b, to_f(top[i]));
            let c = (blended * top_a + b * base_a * (1.0 - top_a)) / out_a;
            base[i] = to_u(c);
        }
        if base_alpha {
            base[channels] = to_u(out_a);
        }
    }
}

// ============================================================================
// DRAWABLE – the pixel surface a fill is applied to
// ============================================================================

pub struct Drawable {
    format: PixelFormat,
    pixels: TiledImage,
    selection: Option<SelectionMask>,
    dirty: Option<Rect>,
}

impl Drawable {
    /// A new zero-filled drawable (transparent if the format has alpha).
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            format,
            pixels: TiledImage::new(width, height, format.bytes()),
            selection: None,
            dirty: None,
        }
    }

    pub fn new_filled(width: u32, height: u32, format: PixelFormat, pixel: &[u8]) -> Self {
        let mut drawable = Self::new(width, height, format);
        drawable.pixels.fill(pixel);
        drawable
    }

    pub fn from_raw(width: u32, height: u32, format: PixelFormat, data: &[u8]) -> Self {
        Self {
            format,
            pixels: TiledImage::from_raw(width, height, format.bytes(), data),
            selection: None,
            dirty: None,
        }
    }

    /// Import a decoded image, keeping gray images gray.
    pub fn from_dynamic_image(img: &DynamicImage) -> Self {
        let (w, h) = (img.width(), img.height());
        match img {
            DynamicImage::ImageLuma8(g) => Self::from_raw(w, h, PixelFormat::Gray, g.as_raw()),
            DynamicImage::ImageLumaA8(g) => Self::from_raw(w, h, PixelFormat::GrayAlpha, g.as_raw()),
            DynamicImage::ImageRgb8(rgb) => Self::from_raw(w, h, PixelFormat::Rgb, rgb.as_raw()),
            other => {
                let rgba = other.to_rgba8();
                Self::from_raw(w, h, PixelFormat::Rgba, rgba.as_raw())
            }
        }
    }

    /// Export to an `image` buffer of the matching layout.
    pub fn to_dynamic_image(&self) -> DynamicImage {
        let (w, h) = (self.width(), self.height());
        let raw = self.pixels.to_raw();
        let img = match self.format {
            PixelFormat::Gray => GrayImage::from_raw(w, h, raw).map(DynamicImage::ImageLuma8),
            PixelFormat::GrayAlpha => GrayAlphaImage::from_raw(w, h, raw).map(DynamicImage::ImageLumaA8),
            PixelFormat::Rgb => RgbImage::from_raw(w, h, raw).map(DynamicImage::ImageRgb8),
            PixelFormat::Rgba => RgbaImage::from_raw(w, h, raw).map(DynamicImage::ImageRgba8),
        };
        // to_raw always yields width * height * bytes, so the buffer fits.
        img.unwrap_or_else(|| DynamicImage::new_rgba8(w, h))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width(), self.height())
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn has_alpha(&self) -> bool {
        self.format.has_alpha()
    }

    /// Bytes per pixel of a scratch buffer for this drawable (always with alpha).
    pub fn bytes_with_alpha(&self) -> usize {
        self.format.with_alpha().bytes()
    }

    pub fn pixels(&self) -> &TiledImage {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        self.pixels.get_pixel(x, y)
    }

    pub fn selection(&self) -> Option<&SelectionMask> {
        self.selection.as_ref()
    }

    pub fn set_selection(&mut self, selection: Option<SelectionMask>) {
        self.selection = selection;
    }

    /// Apply a selection shape, creating an empty mask first if needed.
    pub fn select(&mut self, shape: &SelectionShape, mode: SelectionMode) {
        let (w, h) = (self.width(), self.height());
        let mask = self.selection.get_or_insert_with(|| SelectionMask::new(w, h));
        mask.apply_shape(shape, mode);
    }

    /// Selection mask, if one exists and has any coverage.
    pub fn active_selection(&self) -> Option<&SelectionMask> {
        self.selection.as_ref().filter(|m| !m.is_empty())
    }

    /// The rectangle a fill affects: the selection bounds clipped to the
    /// drawable, or the whole drawable without a selection.  `None` when the
    /// intersection is empty.
    pub fn mask_intersect(&self) -> Option<Rect> {
        let bounds = self.bounds();
        match self.active_selection() {
            Some(mask) => mask.bounds()?.intersect(&bounds),
            None => (!bounds.is_empty()).then_some(bounds),
        }
    }

    /// Alpha channel under `rect`, tightly packed.  Drawables without alpha
    /// read as fully opaque.
    pub fn extract_alpha(&self, rect: Rect) -> Vec<u8> {
        if !self.has_alpha() {
            return vec![255; rect.width as usize * rect.height as usize];
        }
        let bytes = self.format.bytes();
        let alpha_idx = bytes - 1;
        let mut row = vec![0u8; rect.width as usize * bytes];
        let mut out = Vec::with_capacity(rect.width as usize * rect.height as usize);
        for y in rect.y..rect.bottom() {
            self.pixels.read_row(rect.x, y, &mut row);
            out.extend(row.chunks_exact(bytes).map(|px| px[alpha_idx]));
        }
        out
    }

    /// Composite `src` (same colour layout as the drawable, with alpha) onto
    /// the drawable at `rect`, through the selection mask.
    pub fn apply_region(&mut self, src: &PixelRegion, rect: Rect, opacity: f32, mode: PaintMode) {
        debug_assert_eq!(src.bytes(), self.bytes_with_alpha());
        let Some(rect) = rect.intersect(&self.bounds()) else { return };
        let channels = self.format.color_channels();
        let bytes = self.format.bytes();
        let base_alpha = self.format.has_alpha();
        let opacity = opacity.clamp(0.0, 1.0);
        // An empty mask counts as no selection.
        let masked = self.active_selection().is_some();

        let mut row = vec![0u8; rect.width as usize * bytes];
        for y in rect.y..rect.bottom() {
            self.pixels.read_row(rect.x, y, &mut row);
            let src_row = src.row(y - rect.y);
            for (i, base) in row.chunks_exact_mut(bytes).enumerate() {
                let x = rect.x + i as u32;
                let coverage = match self.selection.as_ref() {
                    Some(mask) if masked => mask.value(x, y) as f32 / 255.0,
                    _ => 1.0,
                };
                if coverage == 0.0 {
                    continue;
                }
                let top = &src_row[i * src.bytes()..(i + 1) * src.bytes()];
                mode.composite(base, base_alpha, top, channels, opacity * coverage);
            }
            self.pixels.write_row(rect.x, y, &row);
        }
    }

    /// Mark `rect` as needing a redraw.
    pub fn update(&mut self, rect: Rect) {
        self.dirty = Some(match self.dirty {
            Some(d) => d.union(&rect),
            None => rect,
        });
    }

    pub fn dirty(&self) -> Option<Rect> {
        self.dirty
    }

    pub fn take_dirty(&mut self) -> Option<Rect> {
        self.dirty.take()
    }
}
