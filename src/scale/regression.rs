use micromath::F32Ext;

use crate::error::FitError;

/// A fitted calibration line relating raw kilogram readings to true weight.
///
/// Both coefficients are always replaced together. The default `{0, 0}` means
/// no calibration has been derived yet.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineFit {
    pub slope: f32,
    pub intercept: f32,
}

impl LineFit {
    pub const fn new(slope: f32, intercept: f32) -> Self {
        Self { slope, intercept }
    }
}

/// One calibration data point.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationPoint {
    /// Averaged raw reading in kilograms (x).
    pub measured: f32,
    /// Reference weight that was on the cell in kilograms (y).
    pub known: f32,
}

// x variance below this is treated as a non-responding sensor
const DEGENERATE_EPSILON: f32 = 1e-9;

/// Ordinary least-squares fit over the calibration points.
///
/// x is the measured average per point, y the known weight. Needs at least
/// two points, and fails with [`FitError::DegenerateCalibration`] when all x
/// values are identical instead of dividing by zero.
pub fn fit_line(points: &[CalibrationPoint]) -> Result<LineFit, FitError> {
    if points.len() < 2 {
        return Err(FitError::InsufficientData);
    }

    let n = points.len() as f32;
    let mut sum_x = 0.0f32;
    let mut sum_x2 = 0.0f32;
    let mut sum_y = 0.0f32;
    let mut sum_xy = 0.0f32;
    for point in points {
        sum_x += point.measured;
        sum_x2 += point.measured * point.measured;
        sum_y += point.known;
        sum_xy += point.measured * point.known;
    }

    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator.abs() < DEGENERATE_EPSILON {
        return Err(FitError::DegenerateCalibration);
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    Ok(LineFit { slope, intercept })
}
