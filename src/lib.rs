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

//! Signal conditioning for a resistive load cell read through a bridge
//! amplifier ADC.
//!
//! Converts raw amplifier voltages into calibrated weight measurements,
//! supports zero-offset taring and derives a linear correction from a set of
//! known reference weights by least-squares regression. The hardware side is
//! abstracted behind two small traits: [`AsyncBridgeAdc`] supplies
//! instantaneous voltage samples and [`SampleTrigger`] gates each read on the
//! platform's "conversion ready" event, so the same scale logic runs against
//! a timer-interrupt driven target, an embassy soft timer or a test mock.

#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

pub mod error;
pub mod interface;
pub mod monitor;
pub mod scale;

pub use error::{Error, FitError};
pub use interface::{AsyncBridgeAdc, SampleTrigger, SignalTrigger, TickerTrigger};
pub use monitor::{CalibrationMonitor, NullMonitor};
pub use scale::regression::{fit_line, CalibrationPoint, LineFit};
pub use scale::{LoadCellSpec, ScaleConfig, ScaleMode, StrainGaugeScale, MAX_CALIBRATION_POINTS};
