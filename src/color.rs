// ============================================================================
// COLOR: floating-point RGBA / HSV values used by the blend engine
// ============================================================================

use serde::{Deserialize, Serialize};

/// Rec. 709 luminance weights used when a gradient is written to a gray
/// drawable.
const LUMINANCE_RED: f64 = 0.2126;
const LUMINANCE_GREEN: f64 = 0.7152;
const LUMINANCE_BLUE: f64 = 0.0722;

/// Un-premultiplied RGBA colour with every channel nominally in `0.0..=1.0`.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

/// Hue/saturation/value colour, all channels in `0.0..=1.0`.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Hsv {
    pub h: f64,
    pub s: f64,
    pub v: f64,
    pub a: f64,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);
    pub const TRANSPARENT: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_u8(c: [u8; 4]) -> Self {
        Self {
            r: c[0] as f64 / 255.0,
            g: c[1] as f64 / 255.0,
            b: c[2] as f64 / 255.0,
            a: c[3] as f64 / 255.0,
        }
    }

    /// Quantize to 8 bits per channel with rounding.
    pub fn to_u8(self) -> [u8; 4] {
        [
            quantize(self.r),
            quantize(self.g),
            quantize(self.b),
            quantize(self.a),
        ]
    }

    /// Parse `#rrggbb` / `#rrggbbaa` (leading `#` optional).
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.trim().trim_start_matches('#');
        if !s.is_ascii() {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(s.get(i..i + 2)?, 16).ok();
        match s.len() {
            6 => Some(Self::from_u8([byte(0)?, byte(2)?, byte(4)?, 255])),
            8 => Some(Self::from_u8([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        let [r, g, b, a] = self.to_u8();
        format!("#{:02x}{:02x}{:02x}{:02x}", r, g, b, a)
    }

    pub fn with_alpha(self, a: f64) -> Self {
        Self { a, ..self }
    }

    /// Channel-wise linear interpolation, `t == 0` gives `self`.
    #[inline]
    pub fn lerp(self, other: Rgba, t: f64) -> Rgba {
        Rgba {
            r: self.r + (other.r - self.r) * t,
            g: self.g + (other.g - self.g) * t,
            b: self.b + (other.b - self.b) * t,
            a: self.a + (other.a - self.a) * t,
        }
    }

    /// Squared Euclidean distance over all four channels.
    #[inline]
    pub fn distance_sq(self, other: Rgba) -> f64 {
        let dr = self.r - other.r;
        let dg = self.g - other.g;
        let db = self.b - other.b;
        let da = self.a - other.a;
        dr * dr + dg * dg + db * db + da * da
    }

    pub fn clamped(self) -> Rgba {
        Rgba {
            r: self.r.clamp(0.0, 1.0),
            g: self.g.clamp(0.0, 1.0),
            b: self.b.clamp(0.0, 1.0),
            a: self.a.clamp(0.0, 1.0),
        }
    }

    #[inline]
    pub fn luminance(self) -> f64 {
        self.r * LUMINANCE_RED + self.g * LUMINANCE_GREEN + self.b * LUMINANCE_BLUE
    }

    pub fn to_hsv(self) -> Hsv {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        let d = max - min;

        let h = if d == 0.0 {
            0.0
        } else if max == self.r {
            ((self.g - self.b) / d % 6.0) / 6.0
        } else if max == self.g {
            (((self.b - self.r) / d) + 2.0) / 6.0
        } else {
            (((self.r - self.g) / d) + 4.0) / 6.0
        };
        let h = if h < 0.0 { h + 1.0 } else { h };
        let s = if max == 0.0 { 0.0 } else { d / max };
        Hsv {
            h,
            s,
            v: max,
            a: self.a,
        }
    }
}

impl Hsv {
    pub fn lerp(self, other: Hsv, t: f64) -> Hsv {
        Hsv {
            h: self.h + (other.h - self.h) * t,
            s: self.s + (other.s - self.s) * t,
            v: self.v + (other.v - self.v) * t,
            a: self.a + (other.a - self.a) * t,
        }
    }

    pub fn to_rgb(self) -> Rgba {
        if self.s <= 0.0 {
            return Rgba::new(self.v, self.v, self.v, self.a);
        }
        let h = self.h.rem_euclid(1.0);
        let h6 = h * 6.0;
        let c = self.v * self.s;
        let x = c * (1.0 - ((h6 % 2.0) - 1.0).abs());
        let m = self.v - c;
        let (r, g, b) = match h6 as i32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        Rgba::new(r + m, g + m, b + m, self.a)
    }
}

/// Round a `0.0..=1.0` channel to a byte.
#[inline]
pub fn quantize(v: f64) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}
