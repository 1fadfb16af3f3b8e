use std::sync::Mutex;
use std::sync::atomic::AtomicBool;

use blendfill::io::parse_gradient;
use blendfill::{
    BlendMode, BlendOptions, Drawable, FillContext, FillError, GradientShape, PaintMode, PixelFormat, Rect,
    RepeatMode, Rgba, SelectionMode, SelectionShape, ShapeburstEdges, drawable_blend,
};

fn options(shape: GradientShape, start: [f64; 2], end: [f64; 2]) -> BlendOptions {
    BlendOptions {
        shape,
        start,
        end,
        dither: false,
        ..BlendOptions::default()
    }
}

fn row(d: &Drawable, y: u32, channel: usize) -> Vec<u8> {
    (0..d.width()).map(|x| d.pixel(x, y)[channel]).collect()
}

#[test]
fn test_linear_black_to_white() {
    let mut d = Drawable::new(4, 4, PixelFormat::Rgba);
    let o = options(GradientShape::Linear, [0.0, 0.0], [3.0, 0.0]);
    let rect = drawable_blend(&mut d, &FillContext::default(), &o, None, None).unwrap();
    assert_eq!(rect, Some(Rect::new(0, 0, 4, 4)));
    for y in 0..4 {
        assert_eq!(row(&d, y, 0), vec![0, 85, 170, 255]);
        assert_eq!(row(&d, y, 3), vec![255; 4]);
    }
    assert_eq!(d.dirty(), Some(Rect::new(0, 0, 4, 4)));
}

#[test]
fn test_sawtooth_and_triangular_repeat() {
    let mut d = Drawable::new(4, 1, PixelFormat::Rgba);
    let o = BlendOptions {
        repeat: RepeatMode::Sawtooth,
        ..options(GradientShape::Linear, [0.0, 0.0], [1.5, 0.0])
    };
    drawable_blend(&mut d, &FillContext::default(), &o, None, None).unwrap();
    assert_eq!(row(&d, 0, 0), vec![0, 170, 85, 0]);

    let mut d = Drawable::new(4, 1, PixelFormat::Rgba);
    let o = BlendOptions {
        repeat: RepeatMode::Triangular,
        ..o
    };
    drawable_blend(&mut d, &FillContext::default(), &o, None, None).unwrap();
    assert_eq!(row(&d, 0, 0), vec![0, 170, 170, 0]);
}

#[test]
fn test_radial_on_opaque_rgb() {
    let mut d = Drawable::new(5, 5, PixelFormat::Rgb);
    let o = options(GradientShape::Radial, [2.0, 2.0], [4.0, 2.0]);
    drawable_blend(&mut d, &FillContext::default(), &o, None, None).unwrap();
    assert_eq!(d.pixel(2, 2), &[0, 0, 0]);
    assert_eq!(d.pixel(3, 2), &[128, 128, 128]);
    assert_eq!(d.pixel(2, 1), &[128, 128, 128]);
    assert_eq!(d.pixel(4, 2), &[255, 255, 255]);
    assert_eq!(d.pixel(0, 0), &[255, 255, 255]);
}

#[test]
fn test_reverse_swaps_endpoints() {
    let mut d = Drawable::new(4, 1, PixelFormat::Rgba);
    let o = BlendOptions {
        reverse: true,
        ..options(GradientShape::Linear, [0.0, 0.0], [3.0, 0.0])
    };
    drawable_blend(&mut d, &FillContext::default(), &o, None, None).unwrap();
    assert_eq!(row(&d, 0, 0), vec![255, 170, 85, 0]);
}

#[test]
fn test_supersampled_flat_colour_matches_plain() {
    let red = Rgba::new(1.0, 0.0, 0.0, 1.0);
    let ctx = FillContext {
        foreground: red,
        background: red,
        gradient: None,
    };
    let plain = options(GradientShape::ConicalAsymmetric, [5.0, 5.0], [9.0, 2.0]);
    let ss = BlendOptions {
        supersample: true,
        max_depth: 3,
        threshold: 0.0,
        ..plain.clone()
    };

    let mut a = Drawable::new(37, 21, PixelFormat::Rgba);
    let mut b = Drawable::new(37, 21, PixelFormat::Rgba);
    drawable_blend(&mut a, &ctx, &plain, None, None).unwrap();
    drawable_blend(&mut b, &ctx, &ss, None, None).unwrap();
    assert_eq!(a.pixels().to_raw(), b.pixels().to_raw());
    assert_eq!(a.pixel(36, 20), &[255, 0, 0, 255]);
}

#[test]
fn test_supersampling_softens_a_repeat_seam() {
    let o = BlendOptions {
        repeat: RepeatMode::Sawtooth,
        ..options(GradientShape::Linear, [0.0, 0.0], [4.3, 0.0])
    };
    let ss = BlendOptions {
        supersample: true,
        max_depth: 3,
        threshold: 0.1,
        ..o.clone()
    };
    let mut a = Drawable::new(16, 2, PixelFormat::Rgba);
    let mut b = Drawable::new(16, 2, PixelFormat::Rgba);
    drawable_blend(&mut a, &FillContext::default(), &o, None, None).unwrap();
    drawable_blend(&mut b, &FillContext::default(), &ss, None, None).unwrap();
    assert_ne!(a.pixels().to_raw(), b.pixels().to_raw());
    // Rows are identical for a horizontal gradient either way.
    assert_eq!(row(&b, 0, 0), row(&b, 1, 0));
}

#[test]
fn test_cancelled_fill_leaves_drawable_untouched() {
    let mut d = Drawable::new_filled(6, 6, PixelFormat::Rgb, &[7, 8, 9]);
    let cancel = AtomicBool::new(true);
    let o = options(GradientShape::Linear, [0.0, 0.0], [6.0, 0.0]);
    let err = drawable_blend(&mut d, &FillContext::default(), &o, None, Some(&cancel));
    assert!(matches!(err, Err(FillError::Cancelled)));
    assert!((0..6).all(|y| (0..6).all(|x| d.pixel(x, y) == [7, 8, 9])));
    assert_eq!(d.dirty(), None);
}

#[test]
fn test_half_opacity_over_white() {
    let mut d = Drawable::new_filled(3, 3, PixelFormat::Rgb, &[255, 255, 255]);
    let o = BlendOptions {
        opacity: 0.5,
        ..options(GradientShape::Linear, [0.0, 0.0], [0.0, 0.0])
    };
    // Degenerate vector: every pixel takes the foreground.
    drawable_blend(&mut d, &FillContext::default(), &o, None, None).unwrap();
    assert_eq!(d.pixel(1, 1), &[128, 128, 128]);
}

#[test]
fn test_multiply_paint_mode() {
    let mut d = Drawable::new_filled(2, 1, PixelFormat::Rgb, &[200, 100, 50]);
    let white = FillContext {
        foreground: Rgba::WHITE,
        background: Rgba::WHITE,
        gradient: None,
    };
    let o = BlendOptions {
        paint_mode: PaintMode::Multiply,
        ..options(GradientShape::Linear, [0.0, 0.0], [1.0, 0.0])
    };
    drawable_blend(&mut d, &white, &o, None, None).unwrap();
    assert_eq!(d.pixel(0, 0), &[200, 100, 50]);
}

#[test]
fn test_shapeburst_inside_ellipse_selection() {
    let mut d = Drawable::new(21, 21, PixelFormat::Rgba);
    d.select(
        &SelectionShape::Ellipse {
            cx: 10.0,
            cy: 10.0,
            rx: 8.0,
            ry: 8.0,
        },
        SelectionMode::Replace,
    );
    let o = options(GradientShape::ShapeburstAngular, [0.0, 0.0], [1.0, 0.0]);
    let rect = drawable_blend(&mut d, &FillContext::default(), &o, None, None)
        .unwrap()
        .unwrap();
    assert!(rect.width <= 21 && rect.height <= 21);

    // The deepest point takes the foreground; the rim trends to the background.
    let darkest = (0..21)
        .flat_map(|y| (0..21).map(move |x| (x, y)))
        .filter(|&(x, y)| d.pixel(x, y)[3] == 255)
        .map(|(x, y)| d.pixel(x, y)[0])
        .min();
    assert_eq!(darkest, Some(0));
    assert_eq!(d.pixel(10, 10)[3], 255);
    assert!(d.pixel(10, 4)[0] > d.pixel(10, 8)[0]);
    // Outside the selection nothing changes.
    assert_eq!(d.pixel(0, 0), &[0, 0, 0, 0]);
}

#[test]
fn test_shapeburst_in_plain_rectangle_needs_burned_edges() {
    let select = |d: &mut Drawable| {
        d.select(
            &SelectionShape::Rectangle { min_x: 4, min_y: 4, max_x: 14, max_y: 14 },
            SelectionMode::Replace,
        )
    };
    let keep = options(GradientShape::ShapeburstAngular, [0.0, 0.0], [1.0, 0.0]);
    let burn = BlendOptions {
        shapeburst_edges: ShapeburstEdges::Burn,
        ..keep.clone()
    };

    let mut flat = Drawable::new(20, 20, PixelFormat::Rgba);
    select(&mut flat);
    drawable_blend(&mut flat, &FillContext::default(), &keep, None, None).unwrap();
    let first = flat.pixel(4, 4).to_vec();
    for y in 4..=14 {
        for x in 4..=14 {
            assert_eq!(flat.pixel(x, y), first.as_slice(), "({}, {})", x, y);
        }
    }

    let mut burned = Drawable::new(20, 20, PixelFormat::Rgba);
    select(&mut burned);
    drawable_blend(&mut burned, &FillContext::default(), &burn, None, None).unwrap();
    assert_eq!(burned.pixel(9, 9)[0], 0);
    assert!(burned.pixel(4, 9)[0] > burned.pixel(7, 9)[0]);
    assert!(burned.pixel(7, 9)[0] > burned.pixel(9, 9)[0]);
}

#[test]
fn test_shapeburst_follows_alpha_without_selection() {
    // Opaque 5×5 square in the middle of a transparent 9×9 drawable.
    let mut raw = vec![0u8; 9 * 9 * 4];
    for y in 2..7 {
        for x in 2..7 {
            let i = (y * 9 + x) * 4;
            raw[i + 3] = 255;
        }
    }
    let mut d = Drawable::from_raw(9, 9, PixelFormat::Rgba, &raw);
    let o = BlendOptions {
        paint_mode: PaintMode::Replace,
        ..options(GradientShape::ShapeburstDimpled, [0.0, 0.0], [1.0, 0.0])
    };
    drawable_blend(&mut d, &FillContext::default(), &o, None, None).unwrap();
    // Dimpled: cos(π/2 · v) is 0 at the deepest point.
    assert_eq!(&d.pixel(4, 4)[..3], &[0, 0, 0]);
    assert!(d.pixel(2, 4)[0] > 0);
}

#[test]
fn test_custom_gradient_from_file_text() {
    let text = "GIMP Gradient\nName: Red Blue\n1\n\
        0.000000 0.500000 1.000000 1 0 0 1 0 0 1 1 0 0\n";
    let gradient = parse_gradient(text, "x").unwrap();
    let ctx = FillContext {
        gradient: Some(gradient),
        ..FillContext::default()
    };
    let o = BlendOptions {
        blend_mode: BlendMode::Custom,
        ..options(GradientShape::Linear, [0.0, 0.0], [2.0, 0.0])
    };
    let mut d = Drawable::new(3, 1, PixelFormat::Rgba);
    drawable_blend(&mut d, &ctx, &o, None, None).unwrap();
    assert_eq!(d.pixel(0, 0), &[255, 0, 0, 255]);
    assert_eq!(d.pixel(2, 0), &[0, 0, 255, 255]);

    let mut r = Drawable::new(3, 1, PixelFormat::Rgba);
    let o = BlendOptions { reverse: true, ..o };
    drawable_blend(&mut r, &ctx, &o, None, None).unwrap();
    assert_eq!(r.pixel(0, 0), &[0, 0, 255, 255]);
}

#[test]
fn test_dither_is_deterministic_and_bounded() {
    let dithered = |seed: u64| {
        let mut d = Drawable::new(64, 8, PixelFormat::Rgba);
        let o = BlendOptions {
            dither: true,
            dither_seed: seed,
            ..options(GradientShape::Linear, [0.0, 0.0], [63.0, 0.0])
        };
        drawable_blend(&mut d, &FillContext::default(), &o, None, None).unwrap();
        d.pixels().to_raw()
    };
    let a = dithered(1);
    assert_eq!(a, dithered(1));
    assert_ne!(a, dithered(2));

    let mut plain = Drawable::new(64, 8, PixelFormat::Rgba);
    let o = options(GradientShape::Linear, [0.0, 0.0], [63.0, 0.0]);
    drawable_blend(&mut plain, &FillContext::default(), &o, None, None).unwrap();
    for (p, q) in plain.pixels().to_raw().iter().zip(a.iter()) {
        assert!((*p as i32 - *q as i32).abs() <= 1);
    }
}

#[test]
fn test_empty_selection_counts_as_no_selection() {
    let mut d = Drawable::new(4, 4, PixelFormat::Rgba);
    d.select(
        &SelectionShape::Rectangle {
            min_x: 10,
            min_y: 10,
            max_x: 12,
            max_y: 12,
        },
        SelectionMode::Replace,
    );
    let o = options(GradientShape::Linear, [0.0, 0.0], [3.0, 0.0]);
    let rect = drawable_blend(&mut d, &FillContext::default(), &o, None, None).unwrap();
    assert_eq!(rect, Some(Rect::new(0, 0, 4, 4)));
    assert_eq!(d.pixel(3, 3), &[255, 255, 255, 255]);
}

#[test]
fn test_zero_sized_drawable_fills_nothing() {
    let mut d = Drawable::new(0, 5, PixelFormat::Rgba);
    let o = options(GradientShape::Linear, [0.0, 0.0], [3.0, 0.0]);
    assert_eq!(drawable_blend(&mut d, &FillContext::default(), &o, None, None).unwrap(), None);
    assert_eq!(d.dirty(), None);
}

#[test]
fn test_progress_callback_finishes_at_one() {
    let seen = Mutex::new(Vec::new());
    let sink = |v: f64| seen.lock().unwrap().push(v);
    let mut d = Drawable::new(32, 32, PixelFormat::GrayAlpha);
    let o = BlendOptions {
        supersample: true,
        ..options(GradientShape::SpiralClockwise, [16.0, 16.0], [20.0, 16.0])
    };
    drawable_blend(&mut d, &FillContext::default(), &o, Some(&sink), None).unwrap();
    let seen = seen.into_inner().unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.last().copied(), Some(1.0));
}
