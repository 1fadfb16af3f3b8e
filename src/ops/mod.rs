pub mod blend;
pub mod dither;
pub mod gradient;
pub mod render;
pub mod shape;
pub mod shapeburst;
pub mod supersample;

/// Sink for fill progress.  Values are fractions in `[0, 1]` and never
/// decrease within one call; implementations may be called from worker
/// threads.
pub trait Progress: Sync {
    fn set_value(&self, value: f64);
}

impl<F: Fn(f64) + Sync> Progress for F {
    fn set_value(&self, value: f64) {
        self(value)
    }
}
