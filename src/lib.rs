//! Gradient ("blend") fill engine.
//!
//! Fills a [`Drawable`] with a colour gradient: eleven geometric and
//! distance-field shapes, repeat folding, FG/BG or segment-gradient colour
//! sources, adaptive supersampling, dithering and compositing through a
//! selection mask.  Entry point: [`drawable_blend`].

pub mod canvas;
pub mod color;
pub mod error;
pub mod io;
pub mod logger;
pub mod ops;

pub use canvas::{Drawable, PaintMode, PixelFormat, Rect, SelectionMask, SelectionMode, SelectionShape};
pub use color::Rgba;
pub use error::{FillError, GradientError, PresetError};
pub use ops::Progress;
pub use ops::blend::{BlendOptions, FillContext, drawable_blend};
pub use ops::gradient::{GradientPreset, GradientSegment, SegmentGradient};
pub use ops::render::{BlendMode, RepeatMode};
pub use ops::shape::GradientShape;
pub use ops::shapeburst::ShapeburstEdges;
