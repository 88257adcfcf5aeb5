//! Sample codec between the host's normalized float domain and the
//! signed-16-bit-range float domain RNNoise was trained on.

/// Largest magnitude of a signed 16-bit sample.
pub const I16_FULL_SCALE: f32 = 32767.0;

#[inline]
pub fn scale_in(x: f32) -> f32 {
    x * I16_FULL_SCALE
}

#[inline]
pub fn scale_out(y: f32) -> f32 {
    y / I16_FULL_SCALE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_scale_maps_to_i16_max() {
        assert_eq!(scale_in(1.0), 32767.0);
        assert_eq!(scale_in(-1.0), -32767.0);
        assert_eq!(scale_out(32767.0), 1.0);
    }

    #[test]
    fn test_scale_out_undoes_scale_in() {
        for &x in &[0.0f32, 0.25, -0.5, 0.999, -0.001] {
            assert!((scale_out(scale_in(x)) - x).abs() < 1e-6);
        }
    }
}
