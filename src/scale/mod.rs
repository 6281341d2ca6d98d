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

pub mod regression;

use embedded_hal_async::delay::DelayNs;
use heapless::Vec;
use micromath::F32Ext;

use crate::error::Error;
use crate::interface::{AsyncBridgeAdc, SampleTrigger};
use crate::monitor::{CalibrationMonitor, NullMonitor};
use regression::{fit_line, CalibrationPoint, LineFit};

/// Kilograms per pound.
const KG_PER_LB: f32 = 0.45359237;

/// Capacity of the per-run calibration point set, including the forced
/// zero-weight point. Most runs use three or four reference weights.
pub const MAX_CALIBRATION_POINTS: usize = 16;

const DEFAULT_TARE_SAMPLES: u16 = 15;
const DEFAULT_CALIBRATION_SAMPLES: u16 = 20;
const DEFAULT_WEIGHT_CHANGE_PAUSE_MS: u32 = 15_000;

/// Datasheet characteristics of the attached load cell plus the current tare
/// offset.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoadCellSpec {
    /// Rated maximum load in kilograms.
    pub capacity: u16,
    /// Bridge supply voltage in volts.
    pub excitation_voltage: f32,
    /// Sensitivity in mV of output per V of excitation at rated capacity.
    pub rated_output: f32,
    /// Tare offset in kilograms. Updated only by a completed tare.
    pub offset: f32,
}

/// What the scale is currently doing. The conversion path checks this to
/// decide which correction steps apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScaleMode {
    Idle,
    /// A new offset is being averaged; the stale offset must not feed back
    /// into it.
    Taring,
    /// Reference weights are being averaged; no fitted line exists yet.
    Calibrating,
}

/// Construction parameters for a [`StrainGaugeScale`].
///
/// `new` fills in the sampling parameters with the usual values; override
/// the fields directly for cells that need longer stabilisation.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScaleConfig {
    /// Bridge supply voltage in volts, usually 5.
    pub excitation_voltage: f32,
    /// Load cell capacity in kilograms (3, 10, 50, ...).
    pub capacity: u16,
    /// Rated output in mV/V.
    pub rated_output: f32,
    /// Samples averaged by a tare.
    pub tare_samples: u16,
    /// Samples averaged per calibration point.
    pub calibration_samples: u16,
    /// Operator window to change the reference weight between calibration
    /// points.
    pub weight_change_pause_ms: u32,
}

impl ScaleConfig {
    pub const fn new(excitation_voltage: f32, capacity: u16, rated_output: f32) -> Self {
        Self {
            excitation_voltage,
            capacity,
            rated_output,
            tare_samples: DEFAULT_TARE_SAMPLES,
            calibration_samples: DEFAULT_CALIBRATION_SAMPLES,
            weight_change_pause_ms: DEFAULT_WEIGHT_CHANGE_PAUSE_MS,
        }
    }
}

/// Measurement conversion and calibration for one load cell.
///
/// Owns the bridge ADC and the sample trigger. All state shared between the
/// read path and the calibration path (mode, offset, fitted line) lives here
/// and is only ever mutated with the scale borrowed mutably, so there is a
/// single logical thread of control by construction. Coefficients are `Copy`
/// and replaced as a whole struct, never field by field.
pub struct StrainGaugeScale<Adc, Trigger> {
    adc: Adc,
    trigger: Trigger,
    spec: LoadCellSpec,
    fit: LineFit,
    mode: ScaleMode,
    tare_samples: u16,
    calibration_samples: u16,
    weight_change_pause_ms: u32,
}

impl<Adc, Trigger> StrainGaugeScale<Adc, Trigger>
where
    Adc: AsyncBridgeAdc,
    Trigger: SampleTrigger,
{
    /// Fails with [`Error::InvalidConfiguration`] when the excitation voltage
    /// or the rated output is not strictly positive; both are divisors in the
    /// conversion. Starts with a zero offset, no fitted line and [`ScaleMode::Idle`].
    pub fn new(adc: Adc, trigger: Trigger, config: ScaleConfig) -> Result<Self, Error<Adc::Error>> {
        if config.excitation_voltage <= 0.0 || config.rated_output <= 0.0 {
            return Err(Error::InvalidConfiguration);
        }
        Ok(Self {
            adc,
            trigger,
            spec: LoadCellSpec {
                capacity: config.capacity,
                excitation_voltage: config.excitation_voltage,
                rated_output: config.rated_output,
                offset: 0.0,
            },
            fit: LineFit::default(),
            mode: ScaleMode::Idle,
            tare_samples: config.tare_samples,
            calibration_samples: config.calibration_samples,
            weight_change_pause_ms: config.weight_change_pause_ms,
        })
    }

    pub fn spec(&self) -> &LoadCellSpec {
        &self.spec
    }

    /// Current calibration coefficients, e.g. for persisting after a
    /// committed calibration.
    pub fn fit(&self) -> LineFit {
        self.fit
    }

    pub fn offset(&self) -> f32 {
        self.spec.offset
    }

    pub fn mode(&self) -> ScaleMode {
        self.mode
    }

    /// Replace both calibration coefficients together.
    ///
    /// The commit point for a [`calibrate`](Self::calibrate) result, and the
    /// injection point for coefficients restored from persistent storage.
    pub fn set_equation(&mut self, fit: LineFit) {
        self.fit = fit;
    }

    /// Sensor kilograms with no correction applied: a pure linear scaling of
    /// the sense voltage by the datasheet sensitivity.
    pub async fn read_raw_kilograms(&mut self) -> Result<f32, Error<Adc::Error>> {
        let sense_voltage = self
            .adc
            .read_voltage()
            .await
            .map_err(Error::SensorUnavailable)?;
        let scale_factor =
            self.spec.capacity as f32 / (self.spec.excitation_voltage * self.spec.rated_output);
        Ok(sense_voltage * scale_factor)
    }

    /// Calibrated kilograms: raw value, fitted line, tare offset.
    ///
    /// While calibrating there is no line to apply yet and the raw value is
    /// returned as-is. While taring the offset step is skipped so the new
    /// offset is computed without feedback from the stale one.
    pub async fn read_kilograms(&mut self) -> Result<f32, Error<Adc::Error>> {
        let kilograms = self.read_raw_kilograms().await?;

        if self.mode == ScaleMode::Calibrating {
            return Ok(kilograms);
        }

        // sign-aware so the correction keeps its direction for readings
        // below zero (tension, or noise around the zero point)
        let corrected = if kilograms > 0.0 {
            self.fit.slope * kilograms + self.fit.intercept
        } else {
            self.fit.slope * kilograms - self.fit.intercept
        };

        if self.mode == ScaleMode::Taring {
            return Ok(corrected);
        }

        // symmetric zero-point correction regardless of the offset sign
        if self.spec.offset > 0.0 {
            Ok(corrected - self.spec.offset)
        } else {
            Ok(corrected + self.spec.offset.abs())
        }
    }

    pub async fn read_pounds(&mut self) -> Result<f32, Error<Adc::Error>> {
        Ok(self.read_kilograms().await? / KG_PER_LB)
    }

    /// Average of `samples` calibrated readings, each one gated on the
    /// sample trigger so a conversion is never counted twice.
    ///
    /// Suspends until the trigger fires for every sample; callers that need
    /// bounded latency race this against their own timeout.
    pub async fn read_average(&mut self, samples: u16) -> Result<f32, Error<Adc::Error>> {
        self.read_average_monitored(samples, &mut NullMonitor).await
    }

    async fn read_average_monitored<M>(
        &mut self,
        samples: u16,
        monitor: &mut M,
    ) -> Result<f32, Error<Adc::Error>>
    where
        M: CalibrationMonitor,
    {
        if samples == 0 {
            return Err(Error::InvalidArgument);
        }

        let mut sum = 0.0f32;
        for _ in 0..samples {
            self.trigger.wait_for_sample().await;
            let weight = self.read_kilograms().await?;
            sum += weight;
            monitor.sample(weight, sum);
        }
        Ok(sum / samples as f32)
    }

    /// Average the current load and store it as the new offset, driving
    /// subsequent readings of that load to zero.
    ///
    /// The offset is replaced only when every sample succeeds; on any error
    /// the previous offset and the idle mode are restored untouched.
    pub async fn tare(&mut self) -> Result<f32, Error<Adc::Error>> {
        self.mode = ScaleMode::Taring;
        let result = self.read_average(self.tare_samples).await;
        self.mode = ScaleMode::Idle;

        let tare_weight = result?;
        self.spec.offset = tare_weight;
        Ok(tare_weight)
    }

    /// Guided calibration against `known_weights`.
    ///
    /// Point 0 is always the unloaded cell paired with a true weight of zero.
    /// For each known weight the monitor prompts the operator, the delay
    /// collaborator waits out the weight-change window and the loaded cell is
    /// averaged. The least-squares fit over all points is returned WITHOUT
    /// being committed; the caller decides when to apply it via
    /// [`set_equation`](Self::set_equation).
    pub async fn calibrate<D, M>(
        &mut self,
        known_weights: &[f32],
        delay: &mut D,
        monitor: &mut M,
    ) -> Result<LineFit, Error<Adc::Error>>
    where
        D: DelayNs,
        M: CalibrationMonitor,
    {
        if known_weights.is_empty() || known_weights.len() + 1 > MAX_CALIBRATION_POINTS {
            return Err(Error::InvalidArgument);
        }

        let mut points: Vec<CalibrationPoint, MAX_CALIBRATION_POINTS> = Vec::new();
        self.mode = ScaleMode::Calibrating;
        let collected = self
            .collect_points(known_weights, &mut points, delay, monitor)
            .await;
        self.mode = ScaleMode::Idle;
        collected?;

        let fit = fit_line(&points)?;
        monitor.fit_computed(fit);
        Ok(fit)
    }

    async fn collect_points<D, M>(
        &mut self,
        known_weights: &[f32],
        points: &mut Vec<CalibrationPoint, MAX_CALIBRATION_POINTS>,
        delay: &mut D,
        monitor: &mut M,
    ) -> Result<(), Error<Adc::Error>>
    where
        D: DelayNs,
        M: CalibrationMonitor,
    {
        let measured = self
            .read_average_monitored(self.calibration_samples, monitor)
            .await?;
        monitor.point_recorded(0.0, measured);
        points
            .push(CalibrationPoint {
                measured,
                known: 0.0,
            })
            .ok();

        for (index, &known) in known_weights.iter().enumerate() {
            monitor.prompt_weight_change(index + 1, self.weight_change_pause_ms);
            delay.delay_ms(self.weight_change_pause_ms).await;

            let measured = self
                .read_average_monitored(self.calibration_samples, monitor)
                .await?;
            monitor.point_recorded(known, measured);
            points.push(CalibrationPoint { measured, known }).ok();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FitError;
    use embassy_futures::block_on;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct AdcFault;

    /// Plays each level for `per_level` conversions in order, then faults.
    struct StepAdc {
        levels: std::vec::Vec<f32>,
        per_level: usize,
        emitted: usize,
    }

    impl StepAdc {
        fn new(levels: &[f32], per_level: usize) -> Self {
            Self {
                levels: levels.to_vec(),
                per_level,
                emitted: 0,
            }
        }

        fn constant(volts: f32) -> Self {
            Self::new(&[volts], usize::MAX)
        }
    }

    impl AsyncBridgeAdc for StepAdc {
        type Error = AdcFault;

        async fn read_voltage(&mut self) -> Result<f32, AdcFault> {
            match self.levels.get(self.emitted / self.per_level) {
                Some(&volts) => {
                    self.emitted += 1;
                    Ok(volts)
                }
                None => Err(AdcFault),
            }
        }
    }

    struct AlwaysReady;

    impl SampleTrigger for AlwaysReady {
        async fn wait_for_sample(&mut self) {}
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        async fn delay_ns(&mut self, _ns: u32) {}
    }

    #[derive(Default)]
    struct RecordingMonitor {
        samples: usize,
        prompts: usize,
        points: std::vec::Vec<(f32, f32)>,
        fit: Option<LineFit>,
    }

    impl CalibrationMonitor for RecordingMonitor {
        fn sample(&mut self, _kilograms: f32, _running_sum: f32) {
            self.samples += 1;
        }

        fn prompt_weight_change(&mut self, _point: usize, _pause_ms: u32) {
            self.prompts += 1;
        }

        fn point_recorded(&mut self, known_kilograms: f32, measured_kilograms: f32) {
            self.points.push((known_kilograms, measured_kilograms));
        }

        fn fit_computed(&mut self, fit: LineFit) {
            self.fit = Some(fit);
        }
    }

    /// 1 kg capacity, 1 V excitation, 1 mV/V: volts map 1:1 to kilograms.
    fn unit_scale(adc: StepAdc) -> StrainGaugeScale<StepAdc, AlwaysReady> {
        StrainGaugeScale::new(adc, AlwaysReady, ScaleConfig::new(1.0, 1, 1.0)).unwrap()
    }

    #[test]
    fn rejects_non_positive_excitation_voltage() {
        let result = StrainGaugeScale::new(
            StepAdc::constant(0.5),
            AlwaysReady,
            ScaleConfig::new(0.0, 3, 2.0),
        );
        assert!(matches!(result, Err(Error::InvalidConfiguration)));
    }

    #[test]
    fn rejects_non_positive_rated_output() {
        let result = StrainGaugeScale::new(
            StepAdc::constant(0.5),
            AlwaysReady,
            ScaleConfig::new(5.0, 3, -2.0),
        );
        assert!(matches!(result, Err(Error::InvalidConfiguration)));
    }

    #[test]
    fn raw_reading_is_linear_in_the_sample() {
        // 3 kg cell on a 5 V bridge at 2 mV/V
        let mut scale = StrainGaugeScale::new(
            StepAdc::new(&[0.25, 0.5], 1),
            AlwaysReady,
            ScaleConfig::new(5.0, 3, 2.0),
        )
        .unwrap();

        let single = block_on(scale.read_raw_kilograms()).unwrap();
        let doubled = block_on(scale.read_raw_kilograms()).unwrap();

        assert!((doubled - 2.0 * single).abs() < 1e-6);
        assert!((single - 0.25 * 3.0 / 10.0).abs() < 1e-6);
    }

    #[test]
    fn identity_fit_and_zero_offset_match_raw_reading() {
        let mut scale = unit_scale(StepAdc::constant(0.5));
        scale.set_equation(LineFit::new(1.0, 0.0));

        let raw = block_on(scale.read_raw_kilograms()).unwrap();
        let calibrated = block_on(scale.read_kilograms()).unwrap();

        assert_eq!(raw, calibrated);
    }

    #[test]
    fn negative_reading_subtracts_the_intercept() {
        let mut scale = unit_scale(StepAdc::constant(-1.0));
        scale.set_equation(LineFit::new(2.0, 0.5));

        let kilograms = block_on(scale.read_kilograms()).unwrap();

        assert!((kilograms - (2.0 * -1.0 - 0.5)).abs() < 1e-6);
    }

    #[test]
    fn zero_offset_falls_into_the_add_branch_as_a_noop() {
        let mut scale = unit_scale(StepAdc::constant(0.5));
        scale.set_equation(LineFit::new(1.0, 0.0));

        assert_eq!(scale.offset(), 0.0);
        let kilograms = block_on(scale.read_kilograms()).unwrap();

        assert!((kilograms - 0.5).abs() < 1e-6);
    }

    #[test]
    fn positive_offset_is_subtracted() {
        // 15 tare samples at 0.2 kg, then steady 0.5 kg readings
        let mut scale = unit_scale(StepAdc::new(&[0.2, 0.5], 15));
        scale.set_equation(LineFit::new(1.0, 0.0));

        let offset = block_on(scale.tare()).unwrap();
        assert!((offset - 0.2).abs() < 1e-6);

        let kilograms = block_on(scale.read_kilograms()).unwrap();
        assert!((kilograms - 0.3).abs() < 1e-6);
    }

    #[test]
    fn negative_offset_raises_the_reading() {
        let mut scale = unit_scale(StepAdc::new(&[-0.2, 0.5], 15));
        scale.set_equation(LineFit::new(1.0, 0.0));

        let offset = block_on(scale.tare()).unwrap();
        assert!((offset - -0.2).abs() < 1e-6);

        let kilograms = block_on(scale.read_kilograms()).unwrap();
        assert!((kilograms - 0.7).abs() < 1e-6);
    }

    #[test]
    fn pounds_reading_applies_the_conversion_factor() {
        let mut scale = unit_scale(StepAdc::constant(KG_PER_LB));
        scale.set_equation(LineFit::new(1.0, 0.0));

        let pounds = block_on(scale.read_pounds()).unwrap();

        assert!((pounds - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_count_average_is_invalid() {
        let mut scale = unit_scale(StepAdc::constant(0.5));

        let result = block_on(scale.read_average(0));

        assert!(matches!(result, Err(Error::InvalidArgument)));
    }

    #[test]
    fn average_sums_one_reading_per_trigger() {
        let mut scale = unit_scale(StepAdc::new(&[0.1, 0.2, 0.3], 1));
        scale.set_equation(LineFit::new(1.0, 0.0));

        let average = block_on(scale.read_average(3)).unwrap();

        assert!((average - 0.2).abs() < 1e-6);
    }

    #[test]
    fn taring_twice_drives_the_reading_to_zero() {
        let mut scale = unit_scale(StepAdc::constant(0.3));
        scale.set_equation(LineFit::new(1.0, 0.0));

        let first = block_on(scale.tare()).unwrap();
        // the stale offset must not bias the second run
        let second = block_on(scale.tare()).unwrap();
        assert!((first - second).abs() < 1e-6);

        let kilograms = block_on(scale.read_kilograms()).unwrap();
        assert!(kilograms.abs() < 1e-6);
    }

    #[test]
    fn failed_tare_leaves_offset_and_mode_untouched() {
        // ADC dies after 5 of the 15 tare samples
        let mut scale = unit_scale(StepAdc::new(&[0.3], 5));
        scale.set_equation(LineFit::new(1.0, 0.0));

        let result = block_on(scale.tare());

        assert!(matches!(result, Err(Error::SensorUnavailable(AdcFault))));
        assert_eq!(scale.offset(), 0.0);
        assert_eq!(scale.mode(), ScaleMode::Idle);
    }

    #[test]
    fn calibrate_rejects_an_empty_weight_list() {
        let mut scale = unit_scale(StepAdc::constant(0.5));

        let result = block_on(scale.calibrate(&[], &mut NoDelay, &mut NullMonitor));

        assert!(matches!(result, Err(Error::InvalidArgument)));
    }

    #[test]
    fn calibrate_rejects_more_weights_than_point_capacity() {
        let mut scale = unit_scale(StepAdc::constant(0.5));
        let weights = [0.1f32; MAX_CALIBRATION_POINTS];

        let result = block_on(scale.calibrate(&weights, &mut NoDelay, &mut NullMonitor));

        assert!(matches!(result, Err(Error::InvalidArgument)));
    }

    #[test]
    fn calibrate_with_a_dead_sensor_is_degenerate() {
        // zero volts at every point: no x variation to fit a line through
        let mut scale = unit_scale(StepAdc::new(&[0.0], usize::MAX));

        let result = block_on(scale.calibrate(&[0.1, 0.2], &mut NoDelay, &mut NullMonitor));

        assert!(matches!(
            result,
            Err(Error::Fit(FitError::DegenerateCalibration))
        ));
    }

    #[test]
    fn failed_calibration_restores_idle_mode_and_commits_nothing() {
        // enough samples for the zero point only
        let mut scale = unit_scale(StepAdc::new(&[0.0], 20));

        let result = block_on(scale.calibrate(&[0.1, 0.2], &mut NoDelay, &mut NullMonitor));

        assert!(matches!(result, Err(Error::SensorUnavailable(AdcFault))));
        assert_eq!(scale.mode(), ScaleMode::Idle);
        assert_eq!(scale.fit(), LineFit::default());
    }

    #[test]
    fn calibration_run_fits_the_reference_weights() {
        // 20 raw samples per point: unloaded, then 0.1/0.2/0.3 kg references
        let levels: &[f32] = &[0.0, 0.098, 0.203, 0.297];
        let known_weights = [0.1, 0.2, 0.3];
        let mut scale = unit_scale(StepAdc::new(levels, 20));
        let mut monitor = RecordingMonitor::default();

        let fit = block_on(scale.calibrate(&known_weights, &mut NoDelay, &mut monitor)).unwrap();

        // expected straight from the OLS formulas over the same points
        let ys = [0.0, 0.1, 0.2, 0.3];
        let n = levels.len() as f32;
        let sum_x: f32 = levels.iter().sum();
        let sum_y: f32 = ys.iter().sum();
        let sum_xy: f32 = levels.iter().zip(&ys).map(|(x, y)| x * y).sum();
        let sum_x2: f32 = levels.iter().map(|x| x * x).sum();
        let slope = (n * sum_xy - sum_x * sum_y) / (n * sum_x2 - sum_x * sum_x);
        let intercept = (sum_y - slope * sum_x) / n;

        assert!((fit.slope - slope).abs() < 1e-4);
        assert!((fit.intercept - intercept).abs() < 1e-4);
        assert!(fit.slope > 1.0 && fit.slope < 1.01);

        // one prompt per reference weight, one point per weight plus zero
        assert_eq!(monitor.prompts, known_weights.len());
        assert_eq!(monitor.points.len(), known_weights.len() + 1);
        assert_eq!(monitor.samples, 20 * (known_weights.len() + 1));
        assert_eq!(monitor.points[0].0, 0.0);
        assert_eq!(monitor.fit, Some(fit));

        // nothing is committed until the caller applies the fit
        assert_eq!(scale.fit(), LineFit::default());
        assert_eq!(scale.mode(), ScaleMode::Idle);

        scale.set_equation(fit);
        assert_eq!(scale.fit(), fit);
    }
}
