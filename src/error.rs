use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building or loading a segment gradient.
#[derive(Debug, Error)]
pub enum GradientError {
    #[error("failed to access gradient file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not a GIMP gradient file (header was {0:?})")]
    BadHeader(String),
    #[error("invalid segment count {0:?}")]
    BadSegmentCount(String),
    #[error("file declares {declared} segments but has {found} segment lines")]
    SegmentCountMismatch { declared: usize, found: usize },
    #[error("segment {index}: expected 13 or 15 fields, found {found}")]
    BadFieldCount { index: usize, found: usize },
    #[error("segment {index}: cannot parse {field:?}")]
    BadField { index: usize, field: String },
    #[error("segment {index}: unknown {kind} {value}")]
    UnknownEnum {
        index: usize,
        kind: &'static str,
        value: i64,
    },
    #[error("gradient has no segments")]
    Empty,
    #[error("segment {index} does not satisfy left <= middle <= right ({left}, {middle}, {right})")]
    BadSegmentOrder {
        index: usize,
        left: f64,
        middle: f64,
        right: f64,
    },
    #[error("segments do not cover [0, 1] contiguously (gap or overlap at segment {index})")]
    Coverage { index: usize },
}

/// Errors that abort a fill before anything is composited.
#[derive(Debug, Error)]
pub enum FillError {
    #[error("could not allocate a {width}x{height} scratch buffer ({bytes} bytes per pixel)")]
    Allocation { width: u32, height: u32, bytes: usize },
    #[error("fill cancelled")]
    Cancelled,
    #[error("invalid blend option: {0}")]
    InvalidOption(String),
    #[error("custom blend mode requires a gradient in the fill context")]
    MissingGradient,
    #[error(transparent)]
    Gradient(#[from] GradientError),
}

/// Errors loading or saving a JSON blend preset.
#[derive(Debug, Error)]
pub enum PresetError {
    #[error("failed to access preset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid preset {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
