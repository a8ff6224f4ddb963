//! Waveform capture and binary decoding.
//!
//! The instrument transfers the acquisition buffer as a definite-length
//! block of signed 8-bit sample codes. Codes only become physical units
//! together with the channel's vertical scale and offset and the current
//! timebase, so those are read immediately before the transfer; decoding
//! against stale calibration silently produces wrong volts.

use std::io::Cursor;

use byteorder::ReadBytesExt;
use rustfft::num_complex::Complex;
use rustfft::num_traits::Zero;
use rustfft::FFTplanner;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScopeError};
use crate::scpi::block;

use super::measurement::Quantity;
use super::{channel_ok, Sds1202x};

/// The display spans 14 horizontal divisions with the trigger point at
/// center; vertically one division is 25 sample codes.
const HORIZONTAL_DIVISIONS: f64 = 14.0;
const CODES_PER_DIVISION: f64 = 25.0;

/// A decoded acquisition: calibrated voltage samples and their time axis,
/// plus the calibration the decode used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveformData {
    pub channel: u8,
    /// Seconds relative to the trigger point. Same length as `volts`.
    pub times: Vec<f64>,
    pub volts: Vec<f64>,
    pub volts_per_div: f64,
    pub offset_volts: f64,
    pub time_per_div: f64,
    pub delay: f64,
    pub sample_rate: f64,
    /// Set when fewer samples than requested were decoded, either because
    /// the instrument advertised fewer or because the transfer was cut off
    /// mid-stream. Short data is returned as-is, never padded.
    pub partial: bool,
}

impl WaveformData {
    pub fn len(&self) -> usize {
        self.volts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volts.is_empty()
    }

    pub fn maximum(&self) -> Option<f64> {
        self.volts.iter().cloned().reduce(f64::max)
    }

    pub fn minimum(&self) -> Option<f64> {
        self.volts.iter().cloned().reduce(f64::min)
    }

    pub fn peak_to_peak(&self) -> Option<f64> {
        match (self.maximum(), self.minimum()) {
            (Some(max), Some(min)) => Some(max - min),
            _ => None,
        }
    }

    pub fn mean(&self) -> Option<f64> {
        if self.volts.is_empty() {
            return None;
        }
        Some(self.volts.iter().sum::<f64>() / self.volts.len() as f64)
    }

    pub fn rms(&self) -> Option<f64> {
        if self.volts.is_empty() {
            return None;
        }
        let sum_sq: f64 = self.volts.iter().map(|v| v * v).sum();
        Some((sum_sq / self.volts.len() as f64).sqrt())
    }

    /// Frequency of the strongest non-DC spectral component, from an FFT
    /// over the captured samples. `None` when the trace is too short or
    /// carries no signal.
    pub fn dominant_frequency(&self) -> Option<f64> {
        let n = self.volts.len();
        if n < 16 || self.sample_rate <= 0.0 {
            return None;
        }

        let mut input: Vec<Complex<f64>> =
            self.volts.iter().map(|v| Complex::new(*v, 0.0)).collect();
        let mut output: Vec<Complex<f64>> = vec![Complex::zero(); n];
        let mut planner: FFTplanner<f64> = FFTplanner::new(false);
        let fft = planner.plan_fft(n);
        fft.process(&mut input, &mut output);

        let half = n / 2;
        let mut best: Option<(usize, f64)> = None;
        for (offset, bin) in output[1..half].iter().enumerate() {
            let magnitude = bin.norm_sqr();
            if best.map(|(_, m)| magnitude > m).unwrap_or(true) {
                best = Some((offset + 1, magnitude));
            }
        }

        match best {
            Some((bin, magnitude)) if magnitude > 0.0 => {
                Some(bin as f64 * self.sample_rate / n as f64)
            }
            _ => None,
        }
    }

    /// Locally computed stand-in for an instrument measurement.
    pub(crate) fn statistic(&self, quantity: Quantity) -> Option<f64> {
        match quantity {
            Quantity::Maximum => self.maximum(),
            Quantity::Minimum => self.minimum(),
            Quantity::PeakToPeak => self.peak_to_peak(),
            Quantity::Amplitude => self.peak_to_peak().map(|v| v / 2.0),
            Quantity::Mean => self.mean(),
            Quantity::Rms => self.rms(),
            Quantity::Frequency => self.dominant_frequency(),
            Quantity::Period => self
                .dominant_frequency()
                .filter(|f| *f > 0.0)
                .map(|f| 1.0 / f),
        }
    }
}

impl Sds1202x {
    /// Capture up to `sample_count` samples from `channel`.
    ///
    /// Shorter-than-requested data is returned with `partial` set; the
    /// series is never padded to the requested length.
    pub fn capture_waveform(&mut self, channel: u8, sample_count: usize) -> Result<WaveformData> {
        channel_ok(channel)?;
        if sample_count == 0 {
            return Err(ScopeError::Validation("sample count must be nonzero".into()));
        }

        // Transfer window: every point from the first, capped at the request.
        self.write(&format!("WFSU SP,0,NP,{},FP,0", sample_count))?;

        // Calibration for the decode, read alongside the transfer.
        let volts_per_div = self.volts_per_div(channel)?;
        let offset_volts = self.voltage_offset(channel)?;
        let time_per_div = self.time_per_div()?;
        let delay = self.trigger_delay()?;
        let sample_rate = self.sample_rate()?;
        if sample_rate <= 0.0 {
            return Err(ScopeError::Protocol(format!(
                "instrument reported a nonpositive sample rate {}",
                sample_rate
            )));
        }

        self.write(&format!("C{}:WF? DAT2", channel))?;
        let timeout = self.config().waveform_timeout;
        let block = block::read_block(self.conn()?.io(), timeout)?;

        let n = block.payload.len().min(sample_count);
        let partial = block.is_truncated() || n < sample_count;

        let mut rdr = Cursor::new(&block.payload);
        let mut volts = Vec::with_capacity(n);
        for _ in 0..n {
            let code = rdr
                .read_i8()
                .map_err(|_| ScopeError::Protocol("block payload ended early".into()))?;
            volts.push(code as f64 * (volts_per_div / CODES_PER_DIVISION) - offset_volts);
        }

        // Time axis: acquisition starts half a screen before the trigger
        // point, shifted by the horizontal delay.
        let origin = delay - time_per_div * HORIZONTAL_DIVISIONS / 2.0;
        let times: Vec<f64> = (0..n).map(|i| origin + i as f64 / sample_rate).collect();

        Ok(WaveformData {
            channel,
            times,
            volts,
            volts_per_div,
            offset_volts,
            time_per_div,
            delay,
            sample_rate,
            partial,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waveform(volts: Vec<f64>, sample_rate: f64) -> WaveformData {
        let times = (0..volts.len()).map(|i| i as f64 / sample_rate).collect();
        WaveformData {
            channel: 1,
            times,
            volts,
            volts_per_div: 1.0,
            offset_volts: 0.0,
            time_per_div: 1e-3,
            delay: 0.0,
            sample_rate,
            partial: false,
        }
    }

    #[test]
    fn statistics_on_a_known_trace() {
        let w = waveform(vec![-1.0, 0.0, 1.0, 0.0], 1000.0);
        assert_eq!(w.maximum(), Some(1.0));
        assert_eq!(w.minimum(), Some(-1.0));
        assert_eq!(w.peak_to_peak(), Some(2.0));
        assert_eq!(w.mean(), Some(0.0));
        let rms = w.rms().unwrap();
        assert!((rms - (0.5f64).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn statistics_on_an_empty_trace_are_none() {
        let w = waveform(vec![], 1000.0);
        assert_eq!(w.maximum(), None);
        assert_eq!(w.peak_to_peak(), None);
        assert_eq!(w.mean(), None);
        assert_eq!(w.rms(), None);
        assert_eq!(w.dominant_frequency(), None);
    }

    #[test]
    fn dominant_frequency_finds_a_clean_sine() {
        // 50 Hz sine sampled at 1 kSa/s over exactly 10 cycles.
        let sample_rate = 1000.0;
        let n = 200;
        let volts: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * 50.0 * i as f64 / sample_rate).sin())
            .collect();
        let w = waveform(volts, sample_rate);
        let freq = w.dominant_frequency().unwrap();
        assert!((freq - 50.0).abs() < sample_rate / n as f64);
    }

    #[test]
    fn dominant_frequency_survives_noise() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let sample_rate = 10_000.0;
        let n = 1000;
        let volts: Vec<f64> = (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate;
                (2.0 * std::f64::consts::PI * 440.0 * t).sin() + rng.gen_range(-0.1..0.1)
            })
            .collect();
        let w = waveform(volts, sample_rate);
        let freq = w.dominant_frequency().unwrap();
        assert!((freq - 440.0).abs() < 2.0 * sample_rate / n as f64);
    }

    #[test]
    fn statistic_maps_each_quantity() {
        let w = waveform(vec![-1.0, 0.0, 1.0, 0.0], 1000.0);
        assert_eq!(w.statistic(Quantity::PeakToPeak), Some(2.0));
        assert_eq!(w.statistic(Quantity::Amplitude), Some(1.0));
        assert_eq!(w.statistic(Quantity::Maximum), Some(1.0));
        assert_eq!(w.statistic(Quantity::Minimum), Some(-1.0));
        assert_eq!(w.statistic(Quantity::Mean), Some(0.0));
        // Four samples are too few for a spectral estimate.
        assert_eq!(w.statistic(Quantity::Frequency), None);
        assert_eq!(w.statistic(Quantity::Period), None);
    }
}
