//! Ordered dithering for the 8-bit write-out.
//!
//! Each pixel draws one 32-bit value from a PCG32 stream keyed by its
//! coordinate and the fill seed; each byte of that value offsets one channel
//! by `0..=255/256` before truncation.  Output does not depend on which worker
//! renders the pixel.

use crate::color::Rgba;

/// PCG32 default multiplier.
const PCG_MULT: u64 = 6364136223846793005;
/// PCG32 default increment base.
const PCG_INIT: u64 = 0x853c49e6748fea9b;

/// Seed used when the caller does not pick one.
pub const DEFAULT_DITHER_SEED: u64 = 0x5eed_b1e4d;

/// Small PCG32 generator, one stream per pixel.
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

impl Pcg32 {
    /// Create a stream for `idx` under a global `seed`.
    pub fn new(idx: u64, seed: u64) -> Self {
        let mut rng = Self {
            state: 0,
            inc: (idx.wrapping_add(1) << 1) | 1,
        };
        rng.next_u32();
        rng.state = rng.state.wrapping_add(PCG_INIT.wrapping_add(seed));
        rng.next_u32();
        rng
    }

    pub fn next_u32(&mut self) -> u32 {
        let old = self.state;
        self.state = old.wrapping_mul(PCG_MULT).wrapping_add(self.inc | 1);
        let xorshifted = (((old >> 18) ^ old) >> 27) as u32;
        let rot = (old >> 59) as u32;
        xorshifted.rotate_right(rot)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Ditherer {
    seed: u64,
}

impl Ditherer {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Quantize `color` at pixel `(x, y)` with per-channel noise.
    #[inline]
    pub fn quantize(&self, color: Rgba, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y as u64) << 32) | x as u64;
        let mut bits = Pcg32::new(idx, self.seed).next_u32();
        let mut out = [0u8; 4];
        for (o, c) in out.iter_mut().zip([color.r, color.g, color.b, color.a]) {
            let noise = (bits & 0xff) as f64 / 256.0;
            *o = (c * 255.0 + noise).clamp(0.0, 255.0) as u8;
            bits >>= 8;
        }
        out
    }
}

impl Default for Ditherer {
    fn default() -> Self {
        Self::new(DEFAULT_DITHER_SEED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_pixel_same_output() {
        let d = Ditherer::new(42);
        let c = Rgba::new(0.3, 0.6, 0.9, 0.5);
        assert_eq!(d.quantize(c, 17, 3), d.quantize(c, 17, 3));
    }

    #[test]
    fn test_noise_stays_within_one_level() {
        let d = Ditherer::default();
        let c = Rgba::new(0.3, 0.6, 0.9, 0.5);
        for y in 0..16 {
            for x in 0..16 {
                let q = d.quantize(c, x, y);
                for (v, f) in q.iter().zip([c.r, c.g, c.b, c.a]) {
                    let base = (f * 255.0).floor();
                    assert!(*v as f64 == base || *v as f64 == base + 1.0);
                }
            }
        }
    }

    #[test]
    fn test_extremes_never_overflow() {
        let d = Ditherer::default();
        for x in 0..64 {
            assert_eq!(d.quantize(Rgba::WHITE, x, 0), [255; 4]);
            assert_eq!(d.quantize(Rgba::TRANSPARENT, x, 0), [0; 4]);
        }
    }

    #[test]
    fn test_noise_decorrelates_neighbours() {
        // Mid-level gray sits exactly between two levels: roughly half the
        // pixels should round up.
        let d = Ditherer::default();
        let c = Rgba::new(100.5 / 255.0, 0.0, 0.0, 1.0);
        let ups = (0..32)
            .flat_map(|y| (0..32).map(move |x| (x, y)))
            .filter(|&(x, y)| d.quantize(c, x, y)[0] == 101)
            .count();
        assert!((300..=724).contains(&ups), "ups = {}", ups);
    }

    #[test]
    fn test_seed_changes_pattern() {
        let a = Ditherer::new(1);
        let b = Ditherer::new(2);
        let c = Rgba::new(0.5, 0.5, 0.5, 0.5);
        let differs = (0..64).any(|x| a.quantize(c, x, 0) != b.quantize(c, x, 0));
        assert!(differs);
    }
}
