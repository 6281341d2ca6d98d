pub mod trigger;

pub use trigger::{SignalTrigger, TickerTrigger};

/// Bridge amplifier ADC supplying instantaneous sense voltages.
///
/// Implementations own the bus protocol to the amplifier chip; the scale
/// only ever asks for the most recent conversion result.
pub trait AsyncBridgeAdc {
    type Error;

    /// Most recent instantaneous sense voltage, in volts.
    async fn read_voltage(&mut self) -> Result<f32, Self::Error>;
}

/// "Sample ready" gate set by an external fixed-rate source.
///
/// [`StrainGaugeScale::read_average`](crate::StrainGaugeScale::read_average)
/// is the sole consumer: it waits here before every read so that one
/// conversion is never counted twice. Returning from `wait_for_sample` must
/// consume the pending ready event.
pub trait SampleTrigger {
    async fn wait_for_sample(&mut self);
}
