//! Parameter measurements with per-quantity failure isolation.
//!
//! Each requested quantity is one query against the measurement engine
//! (`C<n>:PAVA?`), except frequency, which uses the dedicated hardware
//! counter (`CYMOMETER?`) because it keeps working on signals the engine
//! gives up on. A quantity the engine cannot compute comes back as the
//! `****` sentinel and is recorded as [`MeasuredValue::Invalid`] without
//! disturbing the rest of the batch. If any invalid quantity can be
//! derived from sample data, one waveform capture is attempted and the
//! derived values are tagged so callers can tell them apart from
//! instrument readings.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scpi::{self, value::UnitFamily, NumericReply};

use super::{channel_ok, Sds1202x};

/// Samples requested for the fallback capture. Matches the window the
/// measurement engine itself evaluates closely enough for display-grade
/// statistics.
const FALLBACK_SAMPLES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantity {
    Frequency,
    Period,
    PeakToPeak,
    Amplitude,
    Maximum,
    Minimum,
    Mean,
    Rms,
}

impl Quantity {
    /// Every quantity the driver knows how to measure, in display order.
    pub const ALL: [Quantity; 8] = [
        Quantity::Frequency,
        Quantity::Period,
        Quantity::PeakToPeak,
        Quantity::Amplitude,
        Quantity::Maximum,
        Quantity::Minimum,
        Quantity::Mean,
        Quantity::Rms,
    ];

    /// Token used with `C<n>:PAVA?` and echoed in its reply.
    pub fn pava_token(self) -> &'static str {
        match self {
            Quantity::Frequency => "FREQ",
            Quantity::Period => "PERI",
            Quantity::PeakToPeak => "PKPK",
            Quantity::Amplitude => "AMPL",
            Quantity::Maximum => "MAX",
            Quantity::Minimum => "MIN",
            Quantity::Mean => "MEAN",
            Quantity::Rms => "RMS",
        }
    }

    pub fn unit(self) -> Unit {
        match self {
            Quantity::Frequency => Unit::Hertz,
            Quantity::Period => Unit::Second,
            _ => Unit::Volt,
        }
    }

    pub(crate) fn unit_family(self) -> UnitFamily {
        match self {
            Quantity::Frequency => UnitFamily::Frequency,
            Quantity::Period => UnitFamily::Time,
            _ => UnitFamily::Voltage,
        }
    }

    /// Can this quantity be recomputed from captured samples when the
    /// measurement engine reports it invalid?
    pub fn waveform_derivable(self) -> bool {
        // All of them: the voltage statistics directly, frequency from the
        // spectrum, period from frequency.
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Volt,
    Second,
    Hertz,
}

impl Unit {
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Volt => "V",
            Unit::Second => "s",
            Unit::Hertz => "Hz",
        }
    }
}

/// Outcome of measuring one quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MeasuredValue {
    /// Read from the instrument's measurement engine or counter.
    Measured { value: f64, unit: Unit },
    /// Computed locally from captured waveform samples.
    Derived { value: f64, unit: Unit },
    /// Neither the instrument nor the fallback could produce the quantity.
    Invalid,
}

impl MeasuredValue {
    pub fn is_invalid(&self) -> bool {
        matches!(self, MeasuredValue::Invalid)
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            MeasuredValue::Measured { value, .. } | MeasuredValue::Derived { value, .. } => {
                Some(*value)
            }
            MeasuredValue::Invalid => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub quantity: Quantity,
    pub value: MeasuredValue,
}

impl Sds1202x {
    /// Measure `quantities` on `channel`, in request order.
    ///
    /// Sentinel replies become [`MeasuredValue::Invalid`] markers and never
    /// abort the batch; transport and protocol failures surface unmodified.
    /// At most one fallback capture is attempted per call.
    pub fn measure_channel(
        &mut self,
        channel: u8,
        quantities: &[Quantity],
    ) -> Result<Vec<Measurement>> {
        channel_ok(channel)?;

        let mut results = Vec::with_capacity(quantities.len());
        for &quantity in quantities {
            let value = self.query_quantity(channel, quantity)?;
            results.push(Measurement { quantity, value });
        }

        let needs_fallback = results
            .iter()
            .any(|m| m.value.is_invalid() && m.quantity.waveform_derivable());
        if needs_fallback {
            self.fill_from_waveform(channel, &mut results);
        }

        Ok(results)
    }

    fn query_quantity(&mut self, channel: u8, quantity: Quantity) -> Result<MeasuredValue> {
        let reply = match quantity {
            Quantity::Frequency => self.ask("CYMOMETER?")?,
            _ => self.ask(&format!("C{}:PAVA? {}", channel, quantity.pava_token()))?,
        };
        let decoded = scpi::decode_measurement(
            &reply,
            channel,
            quantity.pava_token(),
            quantity.unit_family(),
        )?;
        Ok(match decoded {
            NumericReply::Value(value) => MeasuredValue::Measured {
                value,
                unit: quantity.unit(),
            },
            NumericReply::Invalid => MeasuredValue::Invalid,
        })
    }

    /// One capture, then fill whatever is still invalid and derivable.
    /// A failed or empty capture leaves the markers as they are; it is not
    /// an error at this level.
    fn fill_from_waveform(&mut self, channel: u8, results: &mut [Measurement]) {
        let waveform = match self.capture_waveform(channel, FALLBACK_SAMPLES) {
            Ok(w) if !w.is_empty() => w,
            Ok(_) => {
                debug!("fallback capture returned an empty trace");
                return;
            }
            Err(e) => {
                debug!("fallback capture failed: {}", e);
                return;
            }
        };

        for m in results.iter_mut() {
            if !m.value.is_invalid() || !m.quantity.waveform_derivable() {
                continue;
            }
            if let Some(value) = waveform.statistic(m.quantity) {
                m.value = MeasuredValue::Derived {
                    value,
                    unit: m.quantity.unit(),
                };
            }
        }
    }
}
