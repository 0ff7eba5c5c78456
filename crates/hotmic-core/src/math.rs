//! Audio math utilities: dB conversion, panning, denormal handling.

use libm::{log10f, powf, sqrtf};

/// Smallest magnitude treated as a real signal; anything below is flushed
/// to zero to keep denormals out of recursive filters.
const DENORMAL_THRESHOLD: f32 = 1e-20;

/// Convert decibels to linear amplitude.
///
/// `0 dB -> 1.0`, `-6.02 dB -> ~0.5`, `-inf dB -> 0.0` (clamped at -120 dB).
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    if db <= -120.0 {
        0.0
    } else {
        powf(10.0, db / 20.0)
    }
}

/// Convert linear amplitude to decibels.
///
/// Values at or below zero map to -120 dB.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 1e-6 {
        -120.0
    } else {
        20.0 * log10f(linear)
    }
}

/// Flush denormal-range values to zero.
#[inline]
pub fn flush_denormal(x: f32) -> f32 {
    if x.abs() < DENORMAL_THRESHOLD { 0.0 } else { x }
}

/// Equal-power pan gains for a mono source placed across a stereo pair.
///
/// `pan` is -1.0 (hard left) to +1.0 (hard right); 0.0 yields
/// `1/sqrt(2)` on both sides so the summed power stays constant.
#[inline]
pub fn equal_power_pan(pan: f32) -> (f32, f32) {
    let p = (pan.clamp(-1.0, 1.0) + 1.0) * 0.5;
    (sqrtf(1.0 - p), sqrtf(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_linear_roundtrip() {
        for &db in &[-60.0, -12.0, -6.0, 0.0, 6.0, 12.0] {
            let rt = linear_to_db(db_to_linear(db));
            assert!((rt - db).abs() < 0.01, "round-trip failed for {db}: {rt}");
        }
    }

    #[test]
    fn minus_six_db_is_half() {
        let g = db_to_linear(-6.0);
        assert!((g - 0.5012).abs() < 0.001, "got {g}");
    }

    #[test]
    fn silence_maps_to_floor() {
        assert_eq!(linear_to_db(0.0), -120.0);
        assert_eq!(db_to_linear(-150.0), 0.0);
    }

    #[test]
    fn denormals_flush_to_zero() {
        assert_eq!(flush_denormal(1e-30), 0.0);
        assert_eq!(flush_denormal(0.5), 0.5);
        assert_eq!(flush_denormal(-1e-30), 0.0);
    }

    #[test]
    fn equal_power_pan_center() {
        let (l, r) = equal_power_pan(0.0);
        let inv_sqrt2 = 1.0 / sqrtf(2.0);
        assert!((l - inv_sqrt2).abs() < 1e-6);
        assert!((r - inv_sqrt2).abs() < 1e-6);
        // Constant power across the sweep
        for &p in &[-1.0, -0.5, 0.0, 0.5, 1.0] {
            let (l, r) = equal_power_pan(p);
            assert!((l * l + r * r - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn equal_power_pan_extremes() {
        let (l, r) = equal_power_pan(-1.0);
        assert!((l - 1.0).abs() < 1e-6);
        assert!(r.abs() < 1e-6);

        let (l, r) = equal_power_pan(1.0);
        assert!(l.abs() < 1e-6);
        assert!((r - 1.0).abs() < 1e-6);
    }
}
