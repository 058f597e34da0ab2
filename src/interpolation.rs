//! Vertical interpolation of column profiles onto pressure levels.

/// Value written where no interpolated value exists. Exactly representable
/// in single precision.
pub const MISSING_VALUE: f64 = -1.0e10;

/// Relative tolerance used when comparing target pressures with the
/// surface pressure.
pub const SURFACE_PRESSURE_TOLERANCE: f64 = 1e-6;

/// Separation in log-pressure below which two native levels are
/// considered coincident.
const DEGENERATE_LOG_SPAN: f64 = 1e-12;

/// Whether the given value represents a missing value.
pub fn is_missing(value: f64) -> bool {
    value.is_nan() || value == MISSING_VALUE
}

/// How to handle target pressures below the surface of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskingPolicy {
    /// Mark values below the surface as missing.
    MaskBelowSurface,
    /// Hold the bottom native value constant below the surface, as if the
    /// ground was not there.
    ExtrapolateBelowSurface,
}

impl MaskingPolicy {
    pub fn masks_below_surface(&self) -> bool {
        matches!(self, Self::MaskBelowSurface)
    }
}

impl Default for MaskingPolicy {
    fn default() -> Self {
        Self::MaskBelowSurface
    }
}

/// Defines the properties of a vertical column interpolator.
pub trait VerticalInterpolator: Clone + Sync + Send {
    /// Resamples a column profile onto the given target pressures.
    ///
    /// # Parameters
    ///
    /// - `native_pressures`: Native level pressures (Pa) in top-to-bottom order.
    /// - `native_values`: Field values at the native levels.
    /// - `target_pressures`: Pressures (Pa) to compute values at, in any order.
    /// - `surface_pressure`: Surface pressure (Pa) of the column.
    /// - `masking`: How to treat target pressures below the surface.
    /// - `output_values`: Buffer receiving one value per target pressure.
    ///
    /// # Returns
    ///
    /// The number of output values set to `MISSING_VALUE`.
    ///
    /// # Panics
    ///
    /// If the lengths of the native slices or of the target and output slices differ.
    fn interp_column(
        &self,
        native_pressures: &[f64],
        native_values: &[f64],
        target_pressures: &[f64],
        surface_pressure: f64,
        masking: MaskingPolicy,
        output_values: &mut [f64],
    ) -> usize;

    /// Resamples a column profile onto the given target pressures and
    /// returns the resampled values.
    fn interpolate(
        &self,
        native_pressures: &[f64],
        native_values: &[f64],
        target_pressures: &[f64],
        surface_pressure: f64,
        masking: MaskingPolicy,
    ) -> Vec<f64> {
        let mut output_values = vec![MISSING_VALUE; target_pressures.len()];
        self.interp_column(
            native_pressures,
            native_values,
            target_pressures,
            surface_pressure,
            masking,
            &mut output_values,
        );
        output_values
    }
}

/// Interpolator that is linear in the logarithm of pressure.
///
/// Above the topmost native level the topmost value is held constant.
/// Below the bottommost native level the bottommost value is held constant,
/// unless the target lies below the surface and masking is enabled. Native
/// levels with non-positive pressure are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogPressureInterpolator;

impl LogPressureInterpolator {
    pub fn new() -> Self {
        Self
    }

    fn interp_value(pressures: &[f64], values: &[f64], target_pressure: f64) -> f64 {
        let n = pressures.len();
        if target_pressure <= pressures[0] {
            return values[0];
        }
        if target_pressure >= pressures[n - 1] {
            return values[n - 1];
        }

        // First level with pressure not below the target, in 1..n
        let upper_idx = pressures.partition_point(|&pressure| pressure < target_pressure);
        if pressures[upper_idx] == target_pressure {
            return values[upper_idx];
        }
        let lower_idx = upper_idx - 1;

        let (p_lower, p_upper) = (pressures[lower_idx], pressures[upper_idx]);
        let (v_lower, v_upper) = (values[lower_idx], values[upper_idx]);

        let ln_p_lower = p_lower.ln();
        let log_span = p_upper.ln() - ln_p_lower;
        if log_span < DEGENERATE_LOG_SPAN {
            let nearest = if target_pressure - p_lower <= p_upper - target_pressure {
                v_lower
            } else {
                v_upper
            };
            return if is_missing(nearest) {
                MISSING_VALUE
            } else {
                nearest
            };
        }
        if is_missing(v_lower) || is_missing(v_upper) {
            return MISSING_VALUE;
        }
        v_lower + (v_upper - v_lower) * (target_pressure.ln() - ln_p_lower) / log_span
    }
}

impl VerticalInterpolator for LogPressureInterpolator {
    fn interp_column(
        &self,
        native_pressures: &[f64],
        native_values: &[f64],
        target_pressures: &[f64],
        surface_pressure: f64,
        masking: MaskingPolicy,
        output_values: &mut [f64],
    ) -> usize {
        assert_eq!(
            native_pressures.len(),
            native_values.len(),
            "Number of native pressures and values differ"
        );
        assert_eq!(
            target_pressures.len(),
            output_values.len(),
            "Number of target pressures and output values differ"
        );

        // Levels at or above the model top where pressure vanishes
        let first_valid = native_pressures.partition_point(|&pressure| pressure <= 0.0);
        let pressures = &native_pressures[first_valid..];
        let values = &native_values[first_valid..];

        let surface_limit = surface_pressure * (1.0 + SURFACE_PRESSURE_TOLERANCE);
        let mut n_missing = 0;

        for (output_value, &target_pressure) in output_values.iter_mut().zip(target_pressures) {
            let value = if pressures.is_empty()
                || (masking.masks_below_surface() && target_pressure > surface_limit)
            {
                MISSING_VALUE
            } else {
                let value = Self::interp_value(pressures, values, target_pressure);
                if is_missing(value) {
                    MISSING_VALUE
                } else {
                    value
                }
            };
            if value == MISSING_VALUE {
                n_missing += 1;
            }
            *output_value = value;
        }
        n_missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const NATIVE_PRESSURES: [f64; 3] = [100.0, 500.0, 1000.0];
    const NATIVE_VALUES: [f64; 3] = [200.0, 210.0, 220.0];

    fn interpolate(targets: &[f64], surface_pressure: f64, masking: MaskingPolicy) -> Vec<f64> {
        LogPressureInterpolator::new().interpolate(
            &NATIVE_PRESSURES,
            &NATIVE_VALUES,
            targets,
            surface_pressure,
            masking,
        )
    }

    #[test]
    fn example_column_is_interpolated_in_log_pressure() {
        let values = interpolate(
            &[100.0, 300.0, 1000.0, 1500.0],
            1000.0,
            MaskingPolicy::MaskBelowSurface,
        );
        assert_eq!(values[0], 200.0);
        assert_abs_diff_eq!(
            values[1],
            200.0 + 10.0 * (3.0_f64).ln() / (5.0_f64).ln(),
            epsilon = 1e-12
        );
        assert_eq!(values[2], 220.0);
        assert_eq!(values[3], MISSING_VALUE);
    }

    #[test]
    fn values_at_native_levels_are_exact() {
        let values = interpolate(&NATIVE_PRESSURES, 1000.0, MaskingPolicy::MaskBelowSurface);
        assert_eq!(values, NATIVE_VALUES.to_vec());
    }

    #[test]
    fn targets_below_surface_are_masked_or_extrapolated() {
        let targets = [700.0, 1000.0005, 1200.0, 5000.0];
        let masked = interpolate(&targets, 1000.0, MaskingPolicy::MaskBelowSurface);
        assert!(!is_missing(masked[0]));
        assert_eq!(masked[1], 220.0);
        assert!(is_missing(masked[2]));
        assert!(is_missing(masked[3]));

        let extrapolated = interpolate(&targets, 1000.0, MaskingPolicy::ExtrapolateBelowSurface);
        assert_eq!(extrapolated[0], masked[0]);
        assert_eq!(&extrapolated[1..], &[220.0, 220.0, 220.0]);
    }

    #[test]
    fn masking_uses_surface_pressure_rather_than_bottom_level() {
        let values = interpolate(&[800.0, 900.0], 850.0, MaskingPolicy::MaskBelowSurface);
        assert!(!is_missing(values[0]));
        assert!(is_missing(values[1]));
    }

    #[test]
    fn values_above_model_top_are_held_constant() {
        let values = interpolate(&[1.0, 50.0], 1000.0, MaskingPolicy::MaskBelowSurface);
        assert_eq!(values, vec![200.0, 200.0]);
    }

    #[test]
    fn field_linear_in_log_pressure_is_reproduced() {
        let pressures = [10.0, 1000.0, 1.0e5];
        let field = |p: f64| 3.0 - 0.5 * p.ln();
        let values: Vec<f64> = pressures.iter().map(|&p| field(p)).collect();
        let targets: Vec<f64> = (1..100).map(|i| 10.0 * 1.09_f64.powi(i)).collect();

        let interpolated = LogPressureInterpolator::new().interpolate(
            &pressures,
            &values,
            &targets,
            1.0e5,
            MaskingPolicy::MaskBelowSurface,
        );
        for (&target, &value) in targets.iter().zip(&interpolated) {
            assert_abs_diff_eq!(value, field(target), epsilon = 1e-12);
        }
    }

    #[test]
    fn interpolation_onto_native_grid_is_identity() {
        let pressures: Vec<f64> = (0..40).map(|k| 50.0 * 1.2_f64.powi(k)).collect();
        let values: Vec<f64> = pressures.iter().map(|p| 180.0 + 0.3 * p.sqrt()).collect();
        let surface_pressure = *pressures.last().unwrap();

        let interpolated = LogPressureInterpolator::new().interpolate(
            &pressures,
            &values,
            &pressures,
            surface_pressure,
            MaskingPolicy::MaskBelowSurface,
        );
        for (&value, &expected) in interpolated.iter().zip(&values) {
            assert_abs_diff_eq!(value, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn coincident_levels_keep_neighbouring_layers() {
        let pressures = [100.0, 500.0, 500.0, 1000.0];
        let values = [1.0, 2.0, 3.0, 4.0];
        let interpolated = LogPressureInterpolator::new().interpolate(
            &pressures,
            &values,
            &[500.0, 499.0, 501.0],
            1000.0,
            MaskingPolicy::MaskBelowSurface,
        );
        assert!(interpolated.iter().all(|value| value.is_finite()));
        assert_eq!(interpolated[0], 2.0);
        assert!(interpolated[1] > 1.0 && interpolated[1] < 2.0);
        assert!(interpolated[2] > 3.0 && interpolated[2] < 4.0);
    }

    #[test]
    fn near_coincident_levels_use_nearest_value() {
        let upper = 500.0 * (1.0 + 1e-14);
        let pressures = [100.0, 500.0, upper, 1000.0];
        let interpolated = LogPressureInterpolator::new().interpolate(
            &pressures,
            &[1.0, 2.0, 3.0, 4.0],
            &[500.0 + 1e-12, 500.0 + 4e-12],
            1000.0,
            MaskingPolicy::MaskBelowSurface,
        );
        assert_eq!(interpolated, vec![2.0, 3.0]);

        let interpolated = LogPressureInterpolator::new().interpolate(
            &pressures,
            &[1.0, 2.0, MISSING_VALUE, 4.0],
            &[500.0 + 1e-12, 500.0 + 4e-12],
            1000.0,
            MaskingPolicy::MaskBelowSurface,
        );
        assert_eq!(interpolated, vec![2.0, MISSING_VALUE]);
    }

    #[test]
    fn levels_with_vanishing_pressure_are_ignored() {
        let interpolated = LogPressureInterpolator::new().interpolate(
            &[0.0, 100.0, 1000.0],
            &[0.0, 1.0, 2.0],
            &[10.0, 100.0, (100.0_f64 * 1000.0).sqrt()],
            1000.0,
            MaskingPolicy::MaskBelowSurface,
        );
        assert_eq!(interpolated[0], 1.0);
        assert_eq!(interpolated[1], 1.0);
        assert_abs_diff_eq!(interpolated[2], 1.0 + 0.5, epsilon = 1e-12);
    }

    #[test]
    fn missing_input_values_propagate() {
        let mut output = [0.0; 3];
        let n_missing = LogPressureInterpolator::new().interp_column(
            &NATIVE_PRESSURES,
            &[200.0, MISSING_VALUE, f64::NAN],
            &[100.0, 300.0, 1000.0],
            1000.0,
            MaskingPolicy::MaskBelowSurface,
            &mut output,
        );
        assert_eq!(output[0], 200.0);
        assert_eq!(output[1], MISSING_VALUE);
        assert_eq!(output[2], MISSING_VALUE);
        assert_eq!(n_missing, 2);
    }

    #[test]
    fn missing_value_survives_single_precision() {
        assert_eq!((MISSING_VALUE as f32) as f64, MISSING_VALUE);
    }
}
