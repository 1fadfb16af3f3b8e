use std::fmt::Write as _;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{DynamicImage, ImageError};

use crate::canvas::{Drawable, PixelFormat};
use crate::color::Rgba;
use crate::error::{GradientError, PresetError};
use crate::ops::blend::BlendOptions;
use crate::ops::gradient::{GradientSegment, SegmentBlend, SegmentColor, SegmentColoring, SegmentGradient};

/// First line of every gradient file.
const GRADIENT_HEADER: &str = "GIMP Gradient";

// ============================================================================
// IMAGE LOAD / SAVE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveFormat {
    Png,
    Jpeg,
    Webp,
    Bmp,
    Tga,
    Tiff,
}

impl SaveFormat {
    pub fn from_extension(ext: &str) -> Option<SaveFormat> {
        match ext.to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "webp" => Some(SaveFormat::Webp),
            "bmp" => Some(SaveFormat::Bmp),
            "tga" => Some(SaveFormat::Tga),
            "tif" | "tiff" => Some(SaveFormat::Tiff),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<SaveFormat> {
        path.extension().and_then(|e| e.to_str()).and_then(Self::from_extension)
    }
}

/// Decode any raster format the `image` crate supports into a drawable.
/// 8-bit gray and RGB sources keep their layout; everything else becomes RGBA.
pub fn load_drawable(path: &Path) -> Result<Drawable, ImageError> {
    let img = image::open(path)?;
    let img = match img {
        DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(img.to_luma8()),
        DynamicImage::ImageLumaA16(_) => DynamicImage::ImageLumaA8(img.to_luma_alpha8()),
        DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgb32F(_) => DynamicImage::ImageRgb8(img.to_rgb8()),
        other => other,
    };
    Ok(Drawable::from_dynamic_image(&img))
}

/// Encode and write a drawable.  `quality` only applies to JPEG.
pub fn save_drawable(drawable: &Drawable, path: &Path, format: SaveFormat, quality: u8) -> Result<(), ImageError> {
    let img = drawable.to_dynamic_image();

    if format == SaveFormat::Webp {
        return DynamicImage::ImageRgba8(img.to_rgba8()).save(path);
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    match format {
        SaveFormat::Png => {
            let encoder = PngEncoder::new(&mut writer);
            #[allow(deprecated)]
            encoder.encode(img.as_bytes(), img.width(), img.height(), img.color())?;
        }
        SaveFormat::Jpeg => {
            // JPEG carries no alpha.
            let flat = if drawable.format().is_gray() {
                DynamicImage::ImageLuma8(img.to_luma8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality);
            encoder.encode(flat.as_bytes(), flat.width(), flat.height(), flat.color())?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder.encode(img.as_bytes(), img.width(), img.height(), img.color())?;
        }
        SaveFormat::Tga => {
            let encoder = TgaEncoder::new(&mut writer);
            encoder.encode(img.as_bytes(), img.width(), img.height(), img.color())?;
        }
        SaveFormat::Tiff => {
            let img = match drawable.format() {
                PixelFormat::GrayAlpha => DynamicImage::ImageRgba8(img.to_rgba8()),
                _ => img,
            };
            let encoder = TiffEncoder::new(&mut writer);
            encoder.encode(img.as_bytes(), img.width(), img.height(), img.color())?;
        }
        SaveFormat::Webp => unreachable!("webp is written through DynamicImage::save above"),
    }

    Ok(())
}

// ============================================================================
// GRADIENT FILES (.ggr)
// ============================================================================
//
//   GIMP Gradient
//   Name: <name>                       (optional)
//   <segment count>
//   left middle right r0 g0 b0 a0 r1 g1 b1 a1 type coloring [left_type right_type]

/// Parse gradient file contents.  `fallback_name` is used when the file has
/// no `Name:` line.
pub fn parse_gradient(text: &str, fallback_name: &str) -> Result<SegmentGradient, GradientError> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let header = lines.next().unwrap_or_default();
    if header != GRADIENT_HEADER {
        return Err(GradientError::BadHeader(header.to_string()));
    }

    let mut next = lines.next().unwrap_or_default();
    let name = match next.strip_prefix("Name:") {
        Some(name) => {
            let name = name.trim().to_string();
            next = lines.next().unwrap_or_default();
            name
        }
        None => fallback_name.to_string(),
    };

    let count: usize = match next.parse() {
        Ok(n) if n >= 1 => n,
        _ => return Err(GradientError::BadSegmentCount(next.to_string())),
    };

    let rows: Vec<&str> = lines.collect();
    if rows.len() != count {
        return Err(GradientError::SegmentCountMismatch {
            declared: count,
            found: rows.len(),
        });
    }
    let segments = rows
        .iter()
        .enumerate()
        .map(|(index, line)| parse_segment(index, line))
        .collect::<Result<Vec<_>, _>>()?;

    SegmentGradient::new(name, segments)
}

fn parse_segment(index: usize, line: &str) -> Result<GradientSegment, GradientError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 13 && fields.len() != 15 {
        return Err(GradientError::BadFieldCount {
            index,
            found: fields.len(),
        });
    }

    let float = |i: usize| -> Result<f64, GradientError> {
        fields[i]
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| GradientError::BadField {
                index,
                field: fields[i].to_string(),
            })
    };
    let int = |i: usize| -> Result<i64, GradientError> {
        fields[i].parse::<i64>().map_err(|_| GradientError::BadField {
            index,
            field: fields[i].to_string(),
        })
    };
    let unknown = |kind: &'static str, value: i64| GradientError::UnknownEnum { index, kind, value };

    let blend_code = int(11)?;
    let coloring_code = int(12)?;
    let blend = SegmentBlend::from_code(blend_code).ok_or_else(|| unknown("blend type", blend_code))?;
    let coloring = SegmentColoring::from_code(coloring_code).ok_or_else(|| unknown("coloring", coloring_code))?;

    let (left_color_type, right_color_type) = if fields.len() == 15 {
        let (l, r) = (int(13)?, int(14)?);
        (
            SegmentColor::from_code(l).ok_or_else(|| unknown("color type", l))?,
            SegmentColor::from_code(r).ok_or_else(|| unknown("color type", r))?,
        )
    } else {
        (SegmentColor::Fixed, SegmentColor::Fixed)
    };

    Ok(GradientSegment {
        left: float(0)?,
        middle: float(1)?,
        right: float(2)?,
        left_color: Rgba::new(float(3)?, float(4)?, float(5)?, float(6)?),
        left_color_type,
        right_color: Rgba::new(float(7)?, float(8)?, float(9)?, float(10)?),
        right_color_type,
        blend,
        coloring,
    })
}

/// Serialise a gradient in the 15-field form.
pub fn format_gradient(gradient: &SegmentGradient) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", GRADIENT_HEADER);
    let _ = writeln!(out, "Name: {}", gradient.name);
    let _ = writeln!(out, "{}", gradient.segments().len());
    for s in gradient.segments() {
        let (l, r) = (s.left_color, s.right_color);
        let _ = writeln!(
            out,
            "{:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {} {} {} {}",
            s.left,
            s.middle,
            s.right,
            l.r,
            l.g,
            l.b,
            l.a,
            r.r,
            r.g,
            r.b,
            r.a,
            s.blend.code(),
            s.coloring.code(),
            s.left_color_type.code(),
            s.right_color_type.code()
        );
    }
    out
}

pub fn load_gradient(path: &Path) -> Result<SegmentGradient, GradientError> {
    let text = std::fs::read_to_string(path).map_err(|source| GradientError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("Untitled");
    parse_gradient(&text, stem)
}

pub fn save_gradient(gradient: &SegmentGradient, path: &Path) -> Result<(), GradientError> {
    std::fs::write(path, format_gradient(gradient)).map_err(|source| GradientError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// BLEND PRESETS (.json)
// ============================================================================

pub fn load_preset(path: &Path) -> Result<BlendOptions, PresetError> {
    let text = std::fs::read_to_string(path).map_err(|source| PresetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    BlendOptions::from_json(&text).map_err(|source| PresetError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_preset(options: &BlendOptions, path: &Path) -> Result<(), PresetError> {
    let text = options.to_json().map_err(|source| PresetError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text).map_err(|source| PresetError::Io {
        path: path.to_path_buf(),
        source,
    })
}
