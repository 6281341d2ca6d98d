use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker};

use crate::interface::SampleTrigger;

/// Sample gate fed from a timer interrupt or a dedicated sampling task
/// through an `embassy-sync` signal.
///
/// `Signal::wait` resets the signal on receipt, which gives the
/// consume-on-read contract [`SampleTrigger`] requires without any flag
/// handling on the producer side. The producer simply calls
/// `signal.signal(())` at its sampling cadence; a still-pending event means
/// the consumer has not caught up yet and is never duplicated.
pub struct SignalTrigger<'a, M: RawMutex> {
    signal: &'a Signal<M, ()>,
}

impl<'a, M: RawMutex> SignalTrigger<'a, M> {
    pub fn new(signal: &'a Signal<M, ()>) -> Self {
        Self { signal }
    }
}

impl<M: RawMutex> SampleTrigger for SignalTrigger<'_, M> {
    async fn wait_for_sample(&mut self) {
        self.signal.wait().await;
    }
}

/// Fixed-cadence gate for targets without a hardware sampling interrupt.
///
/// `Ticker` keeps an absolute deadline, so time spent in the ADC read between
/// waits does not stretch the sampling period.
pub struct TickerTrigger {
    ticker: Ticker,
}

impl TickerTrigger {
    pub fn new(period: Duration) -> Self {
        Self {
            ticker: Ticker::every(period),
        }
    }
}

impl SampleTrigger for TickerTrigger {
    async fn wait_for_sample(&mut self) {
        self.ticker.next().await;
    }
}
