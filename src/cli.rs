// ============================================================================
// blendfill CLI: render a gradient fill into an image file
// ============================================================================
//
// Usage examples:
//   blendfill --width 512 --height 256 --end 512,0 -o ramp.png
//   blendfill -i photo.png --shape radial --start 200,150 --end 320,150 \
//             --blend-mode fg-transparent --fg '#ff8800' -o vignette.png
//   blendfill -i logo.png --shape shapeburst-spherical --gradient rainbow -o burst.png
//   blendfill --width 300 --height 300 --preset soft.json --gradient sunrise.ggr -o out.png
//
// A preset supplies defaults; every flag given on the command line overrides
// the matching preset value.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;

use blendfill::canvas::{Drawable, PaintMode, PixelFormat, SelectionMode, SelectionShape};
use blendfill::color::Rgba;
use blendfill::io::{SaveFormat, load_drawable, load_gradient, load_preset, save_drawable, save_gradient, save_preset};
use blendfill::ops::blend::{BlendOptions, FillContext, drawable_blend};
use blendfill::ops::gradient::{GradientPreset, SegmentGradient};
use blendfill::ops::render::{BlendMode, RepeatMode};
use blendfill::ops::shape::GradientShape;
use blendfill::ops::shapeburst::ShapeburstEdges;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Gradient fill renderer.
#[derive(Parser, Debug)]
#[command(
    name = "blendfill",
    about = "Render gradient fills into image files",
    long_about = "Fill an image (or a new blank canvas) with a gradient. Eleven shapes,\n\
                  three repeat modes, adaptive supersampling, dithering, custom GIMP\n\
                  gradients (.ggr) and JSON presets.\n\n\
                  Example:\n  \
                  blendfill --width 512 --height 256 --end 512,0 -o ramp.png\n  \
                  blendfill -i photo.png --shape radial --start 200,150 --end 320,150 -o out.png"
)]
pub struct CliArgs {
    /// Image to fill.  Without it a blank canvas of --width × --height is used.
    #[arg(short, long, value_name = "FILE", conflicts_with_all = ["width", "height"])]
    pub input: Option<PathBuf>,

    /// Blank canvas width.
    #[arg(long, default_value_t = 256)]
    pub width: u32,

    /// Blank canvas height.
    #[arg(long, default_value_t = 256)]
    pub height: u32,

    /// Pixel layout of the blank canvas: gray, gray-alpha, rgb, rgba.
    #[arg(long, default_value = "rgba", value_name = "LAYOUT")]
    pub layout: String,

    /// Output image.  Format is inferred from the extension.
    #[arg(short, long, value_name = "FILE", required_unless_present = "list")]
    pub output: Option<PathBuf>,

    /// JPEG quality (1–100, default 90).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// JSON preset with blend options; flags override its values.
    #[arg(long, value_name = "FILE.json")]
    pub preset: Option<PathBuf>,

    /// Write the effective blend options to a JSON preset.
    #[arg(long, value_name = "FILE.json")]
    pub save_preset: Option<PathBuf>,

    /// Gradient start point.
    #[arg(long, value_name = "X,Y", value_parser = parse_point)]
    pub start: Option<[f64; 2]>,

    /// Gradient end point.
    #[arg(long, value_name = "X,Y", value_parser = parse_point)]
    pub end: Option<[f64; 2]>,

    /// Shape: linear, bilinear, radial, square, conical-symmetric,
    /// conical-asymmetric, shapeburst-angular, shapeburst-spherical,
    /// shapeburst-dimpled, spiral-clockwise, spiral-anticlockwise.
    #[arg(short, long)]
    pub shape: Option<String>,

    /// Colour source: fg-bg-rgb, fg-bg-hsv, fg-transparent, custom.
    #[arg(long)]
    pub blend_mode: Option<String>,

    /// Compositing: normal, behind, multiply, screen, overlay, difference,
    /// addition, subtract, darken, lighten, replace.
    #[arg(long)]
    pub paint_mode: Option<String>,

    /// Repeat: none, sawtooth, triangular.
    #[arg(short, long)]
    pub repeat: Option<String>,

    /// Opacity in percent (0–100).
    #[arg(long, value_name = "0-100")]
    pub opacity: Option<f64>,

    /// Gradient offset in percent (0–100).
    #[arg(long, value_name = "0-100")]
    pub offset: Option<f64>,

    /// Reverse the gradient direction.
    #[arg(long)]
    pub reverse: bool,

    /// Enable adaptive supersampling.
    #[arg(long)]
    pub supersample: bool,

    /// Maximum supersampling depth (0–8).
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Supersampling colour-difference threshold.
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Disable dithering.
    #[arg(long)]
    pub no_dither: bool,

    /// Dither noise seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Shapeburst edge handling: keep, burn.  With `keep` a fully covered
    /// region (a plain rectangle selection or an opaque image) has no
    /// border to burn from and fills flat; use `burn` to get a gradient there.
    #[arg(long, value_name = "MODE")]
    pub edges: Option<String>,

    /// Foreground colour (#rrggbb or #rrggbbaa).
    #[arg(long, value_name = "HEX")]
    pub fg: Option<String>,

    /// Background colour (#rrggbb or #rrggbbaa).
    #[arg(long, value_name = "HEX")]
    pub bg: Option<String>,

    /// Built-in gradient name or a .ggr file.  Implies --blend-mode custom
    /// unless a blend mode is given.
    #[arg(short, long, value_name = "NAME|FILE")]
    pub gradient: Option<String>,

    /// Write the gradient in use to a .ggr file.
    #[arg(long, value_name = "FILE.ggr")]
    pub save_gradient: Option<PathBuf>,

    /// Limit the fill to a rectangle selection.
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_quad)]
    pub select_rect: Option<[f64; 4]>,

    /// Limit the fill to an ellipse selection (added to --select-rect).
    #[arg(long, value_name = "CX,CY,RX,RY", value_parser = parse_quad)]
    pub select_ellipse: Option<[f64; 4]>,

    /// Intersect --select-ellipse with --select-rect instead of adding it.
    #[arg(long, requires_all = ["select_rect", "select_ellipse"])]
    pub select_intersect: bool,

    /// Print available shapes, modes and built-in gradients, then exit.
    #[arg(long)]
    pub list: bool,

    /// Debug logging, mirrored to stderr, plus progress and timing.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the CLI and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    if args.list {
        print_lists();
        return ExitCode::SUCCESS;
    }

    let started = Instant::now();
    match run_one(&args) {
        Ok(()) => {
            if args.verbose
                && let Some(out) = &args.output
            {
                println!(
                    "  → {} ({:.0}ms)",
                    out.display(),
                    started.elapsed().as_secs_f64() * 1000.0
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Fill pipeline
// ============================================================================

fn run_one(args: &CliArgs) -> Result<()> {
    let Some(output) = args.output.as_deref() else {
        bail!("--output is required");
    };
    let format = SaveFormat::from_path(output)
        .with_context(|| format!("unsupported output format '{}'", output.display()))?;

    // -- Step 1: Options --------------------------------------------------
    let mut options = match &args.preset {
        Some(path) => load_preset(path)?,
        None => BlendOptions::default(),
    };
    let explicit_blend_mode = apply_overrides(&mut options, args)?;

    // -- Step 2: Colours and gradient -------------------------------------
    let mut context = FillContext::default();
    if let Some(hex) = &args.fg {
        context.foreground = parse_color(hex)?;
    }
    if let Some(hex) = &args.bg {
        context.background = parse_color(hex)?;
    }
    if let Some(name) = &args.gradient {
        context.gradient = Some(resolve_gradient(name)?);
        if !explicit_blend_mode {
            options.blend_mode = BlendMode::Custom;
        }
    }

    // -- Step 3: Canvas ---------------------------------------------------
    let mut drawable = match &args.input {
        Some(path) => load_drawable(path).with_context(|| format!("load failed: {}", path.display()))?,
        None => {
            let layout = parse_layout(&args.layout)?;
            Drawable::new(args.width, args.height, layout)
        }
    };
    let combine = if args.select_intersect { SelectionMode::Intersect } else { SelectionMode::Add };
    apply_selection(&mut drawable, args.select_rect, args.select_ellipse, combine);

    if args.input.is_none() && args.start.is_none() && args.end.is_none() && args.preset.is_none() {
        // Left-to-right across a fresh canvas.
        options.end = [drawable.width() as f64, 0.0];
    }

    // -- Step 4: Fill -----------------------------------------------------
    let report = |v: f64| log::debug!("progress {:.0}%", v * 100.0);
    let progress = args.verbose.then_some(&report as &dyn blendfill::ops::Progress);
    match drawable_blend(&mut drawable, &context, &options, progress, None)? {
        Some(rect) => log::info!("filled {}x{} at ({}, {})", rect.width, rect.height, rect.x, rect.y),
        None => log::warn!("nothing to fill: the image has no pixels"),
    }

    // -- Step 5: Save -----------------------------------------------------
    save_drawable(&drawable, output, format, args.quality)
        .with_context(|| format!("save failed: {}", output.display()))?;

    if let Some(path) = &args.save_gradient {
        let gradient = match &context.gradient {
            Some(g) => g.clone(),
            None => SegmentGradient::two_color("Foreground to Background", context.foreground, context.background),
        };
        save_gradient(&gradient, path)?;
    }
    if let Some(path) = &args.save_preset {
        save_preset(&options, path)?;
    }

    Ok(())
}

/// Fold command-line flags into `options`.  Returns whether the blend mode
/// was given explicitly.
fn apply_overrides(options: &mut BlendOptions, args: &CliArgs) -> Result<bool> {
    if let Some(p) = args.start {
        options.start = p;
    }
    if let Some(p) = args.end {
        options.end = p;
    }
    if let Some(name) = &args.shape {
        options.shape = GradientShape::from_name(name).with_context(|| format!("unknown shape '{}'", name))?;
    }
    if let Some(name) = &args.blend_mode {
        options.blend_mode = BlendMode::from_name(name).with_context(|| format!("unknown blend mode '{}'", name))?;
    }
    if let Some(name) = &args.paint_mode {
        options.paint_mode = PaintMode::from_name(name).with_context(|| format!("unknown paint mode '{}'", name))?;
    }
    if let Some(name) = &args.repeat {
        options.repeat = RepeatMode::from_name(name).with_context(|| format!("unknown repeat mode '{}'", name))?;
    }
    if let Some(name) = &args.edges {
        options.shapeburst_edges = match name.to_ascii_lowercase().as_str() {
            "keep" => ShapeburstEdges::Keep,
            "burn" => ShapeburstEdges::Burn,
            _ => bail!("unknown edge mode '{}'", name),
        };
    }
    if let Some(v) = args.opacity {
        options.opacity = v / 100.0;
    }
    if let Some(v) = args.offset {
        options.offset = v;
    }
    if let Some(v) = args.max_depth {
        options.max_depth = v;
    }
    if let Some(v) = args.threshold {
        options.threshold = v;
    }
    if let Some(v) = args.seed {
        options.dither_seed = v;
    }
    options.reverse |= args.reverse;
    options.supersample |= args.supersample;
    if args.no_dither {
        options.dither = false;
    }
    Ok(args.blend_mode.is_some())
}

/// Build the selection from the rectangle and ellipse flags.  The ellipse is
/// merged into the rectangle with `combine`; on its own it replaces.
fn apply_selection(
    drawable: &mut Drawable,
    rect: Option<[f64; 4]>,
    ellipse: Option<[f64; 4]>,
    combine: SelectionMode,
) {
    let mut mode = SelectionMode::Replace;
    if let Some([x, y, w, h]) = rect
        && w >= 1.0
        && h >= 1.0
    {
        // Float-to-int casts saturate; the sums must too.
        let (x, y) = (x.max(0.0) as u32, y.max(0.0) as u32);
        drawable.select(
            &SelectionShape::Rectangle {
                min_x: x,
                min_y: y,
                max_x: x.saturating_add(w as u32).saturating_sub(1),
                max_y: y.saturating_add(h as u32).saturating_sub(1),
            },
            mode,
        );
        mode = combine;
    }
    if let Some([cx, cy, rx, ry]) = ellipse {
        drawable.select(
            &SelectionShape::Ellipse {
                cx: cx as f32,
                cy: cy as f32,
                rx: rx as f32,
                ry: ry as f32,
            },
            mode,
        );
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Built-in preset name, or a path to a `.ggr` file.
fn resolve_gradient(name: &str) -> Result<SegmentGradient> {
    if let Some(preset) = GradientPreset::from_name(name) {
        return Ok(preset.build());
    }
    let path = Path::new(name);
    if path.exists() {
        return Ok(load_gradient(path)?);
    }
    bail!("'{}' is neither a built-in gradient nor an existing file", name)
}

fn parse_color(hex: &str) -> Result<Rgba> {
    Rgba::from_hex(hex).with_context(|| format!("invalid colour '{}' (expected #rrggbb or #rrggbbaa)", hex))
}

fn parse_layout(name: &str) -> Result<PixelFormat> {
    Ok(match name.to_ascii_lowercase().as_str() {
        "gray" | "grey" => PixelFormat::Gray,
        "gray-alpha" | "grey-alpha" => PixelFormat::GrayAlpha,
        "rgb" => PixelFormat::Rgb,
        "rgba" => PixelFormat::Rgba,
        _ => bail!("unknown layout '{}'", name),
    })
}

fn parse_numbers<const N: usize>(s: &str) -> Result<[f64; N], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("expected {} comma-separated numbers, got '{}'", N, s));
    }
    let mut out = [0.0; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("'{}' is not a number", part))?;
    }
    Ok(out)
}

fn parse_point(s: &str) -> Result<[f64; 2], String> {
    parse_numbers::<2>(s)
}

fn parse_quad(s: &str) -> Result<[f64; 4], String> {
    parse_numbers::<4>(s)
}

fn print_lists() {
    let join = |names: Vec<&str>| names.join(", ");
    println!("shapes:      {}", join(GradientShape::all().iter().map(|s| s.name()).collect()));
    println!("blend modes: {}", join(BlendMode::all().iter().map(|m| m.name()).collect()));
    println!("paint modes: {}", join(PaintMode::all().iter().map(|m| m.name()).collect()));
    println!("repeat:      {}", join(RepeatMode::all().iter().map(|m| m.name()).collect()));
    println!("gradients:   {}", join(GradientPreset::all().iter().map(|g| g.name()).collect()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> CliArgs {
        let mut full = vec!["blendfill"];
        full.extend_from_slice(argv);
        CliArgs::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_parse_points_and_quads() {
        assert_eq!(parse_point("3, -4.5"), Ok([3.0, -4.5]));
        assert!(parse_point("3").is_err());
        assert!(parse_point("a,b").is_err());
        assert!(parse_point("inf,0").is_err());
        assert_eq!(parse_quad("1,2,3,4"), Ok([1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn test_output_required_unless_listing() {
        let full = ["blendfill", "--width", "10"];
        assert!(CliArgs::try_parse_from(full).is_err());
        assert!(parse(&["--list"]).list);
    }

    #[test]
    fn test_input_conflicts_with_canvas_size() {
        assert!(CliArgs::try_parse_from(["blendfill", "-i", "a.png", "--width", "3", "-o", "b.png"]).is_err());
    }

    #[test]
    fn test_flags_override_preset_values() {
        let mut options = BlendOptions {
            shape: GradientShape::Radial,
            opacity: 0.5,
            dither: true,
            ..BlendOptions::default()
        };
        let args = parse(&[
            "-o", "x.png", "--shape", "spiral_clockwise", "--opacity", "25", "--no-dither", "--end", "5,6",
            "--edges", "burn",
        ]);
        let explicit = apply_overrides(&mut options, &args).unwrap();
        assert!(!explicit);
        assert_eq!(options.shape, GradientShape::SpiralClockwise);
        assert_eq!(options.opacity, 0.25);
        assert!(!options.dither);
        assert_eq!(options.end, [5.0, 6.0]);
        assert_eq!(options.shapeburst_edges, ShapeburstEdges::Burn);
        assert_eq!(options.repeat, RepeatMode::None);
    }

    #[test]
    fn test_unknown_names_are_errors() {
        let mut options = BlendOptions::default();
        let args = parse(&["-o", "x.png", "--repeat", "zigzag"]);
        assert!(apply_overrides(&mut options, &args).is_err());
        assert!(parse_layout("cmyk").is_err());
        assert!(parse_color("#12345").is_err());
        assert!(resolve_gradient("no-such-gradient-anywhere").is_err());
    }

    #[test]
    fn test_builtin_gradient_resolves_by_name() {
        let g = resolve_gradient("rainbow").unwrap();
        assert!(g.segments().len() > 1);
    }

    #[test]
    fn test_selection_flags_limit_fill_rect() {
        let mut d = Drawable::new(20, 20, PixelFormat::Rgba);
        apply_selection(&mut d, Some([2.0, 3.0, 4.0, 5.0]), None, SelectionMode::Add);
        assert_eq!(d.mask_intersect(), Some(blendfill::canvas::Rect::new(2, 3, 4, 5)));
    }

    #[test]
    fn test_oversized_selection_rect_saturates() {
        let mut d = Drawable::new(20, 20, PixelFormat::Rgba);
        apply_selection(&mut d, Some([5.0, 6.0, 1e12, f64::MAX]), None, SelectionMode::Add);
        assert_eq!(d.mask_intersect(), Some(blendfill::canvas::Rect::new(5, 6, 15, 14)));

        apply_selection(&mut d, Some([4e9, 4e9, 4e9, 4e9]), None, SelectionMode::Add);
        // Entirely off the canvas, so nothing is selected and the whole drawable fills.
        assert!(d.active_selection().is_none());
        assert_eq!(d.mask_intersect(), Some(d.bounds()));
    }

    #[test]
    fn test_select_intersect_keeps_the_overlap() {
        let args = parse(&[
            "-o", "x.png", "--select-rect", "0,0,10,20", "--select-ellipse", "10,10,6,6", "--select-intersect",
        ]);
        assert!(args.select_intersect);
        let mut d = Drawable::new(20, 20, PixelFormat::Rgba);
        apply_selection(&mut d, args.select_rect, args.select_ellipse, SelectionMode::Intersect);
        let mask = d.selection().unwrap();
        assert_eq!(mask.value(7, 10), 255);
        // Inside the ellipse but right of the rectangle.
        assert_eq!(mask.value(12, 10), 0);
        // Inside the rectangle but outside the ellipse.
        assert_eq!(mask.value(1, 1), 0);
        assert_eq!(d.mask_intersect().map(|r| r.right()), Some(10));

        let mut added = Drawable::new(20, 20, PixelFormat::Rgba);
        apply_selection(&mut added, args.select_rect, args.select_ellipse, SelectionMode::Add);
        assert_eq!(added.selection().unwrap().value(12, 10), 255);
    }

    #[test]
    fn test_select_intersect_needs_both_shapes() {
        let full = ["blendfill", "-o", "x.png", "--select-rect", "0,0,4,4", "--select-intersect"];
        assert!(CliArgs::try_parse_from(full).is_err());
    }
}
