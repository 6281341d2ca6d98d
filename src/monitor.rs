// Copyright (C) 2025 Paul Hampson
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License version 3 as  published by the
// Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::scale::regression::LineFit;

/// Diagnostics sink for calibration and taring progress.
///
/// Drives operator prompts during a calibration run and exposes the running
/// numbers for debugging. Every method defaults to a no-op so a disabled sink
/// can never affect control flow.
pub trait CalibrationMonitor {
    /// One calibrated sample was consumed by an averaging run.
    fn sample(&mut self, kilograms: f32, running_sum: f32) {
        let _ = (kilograms, running_sum);
    }

    /// The operator has `pause_ms` to put reference weight `point` on the
    /// cell (or take it off).
    fn prompt_weight_change(&mut self, point: usize, pause_ms: u32) {
        let _ = (point, pause_ms);
    }

    /// A calibration point was recorded.
    fn point_recorded(&mut self, known_kilograms: f32, measured_kilograms: f32) {
        let _ = (known_kilograms, measured_kilograms);
    }

    /// The least-squares fit over all points completed.
    fn fit_computed(&mut self, fit: LineFit) {
        let _ = fit;
    }
}

/// Disabled diagnostics.
pub struct NullMonitor;

impl CalibrationMonitor for NullMonitor {}

/// Diagnostics over defmt, one log line per event.
#[cfg(feature = "defmt")]
pub struct DefmtMonitor;

#[cfg(feature = "defmt")]
impl CalibrationMonitor for DefmtMonitor {
    fn sample(&mut self, kilograms: f32, running_sum: f32) {
        defmt::trace!("weight: {} kg, sum: {}", kilograms, running_sum);
    }

    fn prompt_weight_change(&mut self, point: usize, pause_ms: u32) {
        defmt::info!(
            "you have {} ms to put weight {} on (or take it off)",
            pause_ms,
            point
        );
    }

    fn point_recorded(&mut self, known_kilograms: f32, measured_kilograms: f32) {
        defmt::debug!(
            "{} kg averaged as {} kg raw",
            known_kilograms,
            measured_kilograms
        );
    }

    fn fit_computed(&mut self, fit: LineFit) {
        defmt::info!("slope: {}, intercept: {}", fit.slope, fit.intercept);
    }
}
