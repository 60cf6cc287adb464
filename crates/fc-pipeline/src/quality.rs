//! Frame quality scoring.
//!
//! The score is a placeholder heuristic: resolution relative to 1080p,
//! capped at 1.0. It is only used to rank frames, so it can be replaced
//! without touching stored data.

const REFERENCE_PIXELS: f64 = 1920.0 * 1080.0;

/// Score a decoded frame of `width` x `height` pixels, in `[0.0, 1.0]`.
pub fn score(width: u32, height: u32) -> f64 {
    let pixels = f64::from(width) * f64::from(height);
    (pixels / REFERENCE_PIXELS).min(1.0)
}
