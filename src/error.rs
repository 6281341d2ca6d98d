/// Failures from fitting the calibration line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FitError {
    /// Fewer than two calibration points were supplied.
    InsufficientData,
    /// No variation in the measured data across the calibration points, so
    /// the line is undefined. Usually means the sensor is not responding.
    DegenerateCalibration,
}

/// Scale errors. `AdcE` is the bridge ADC's own error type.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<AdcE> {
    /// Non-positive excitation voltage or rated output. Both are divisors in
    /// the voltage-to-kilograms conversion and must be strictly positive.
    InvalidConfiguration,
    /// Zero-count average request, or a known-weight list that is empty or
    /// larger than the calibration point capacity.
    InvalidArgument,
    Fit(FitError),
    /// The bridge ADC failed to produce a sample.
    SensorUnavailable(AdcE),
}

impl<AdcE> From<FitError> for Error<AdcE> {
    fn from(e: FitError) -> Self {
        Error::Fit(e)
    }
}
