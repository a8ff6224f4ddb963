//! Channel, timebase and trigger configuration.
//!
//! These are plain values copied out to the caller; mutating one has no
//! effect until it is resubmitted through `set_channel` and friends.
//! Enumerated fields are closed enums mapped to and from the instrument's
//! wire tokens, so an unsupported token can only come from the wire, where
//! it is a protocol error.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScopeError};

/// Probe attenuation ratios the front end accepts.
pub const PROBE_RATIOS: [u32; 4] = [1, 10, 100, 1000];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coupling {
    /// DC coupling into 1 MOhm.
    Dc1M,
    /// AC coupling into 1 MOhm.
    Ac1M,
    /// DC coupling into 50 Ohm.
    Dc50,
    /// Input grounded.
    Gnd,
}

impl Coupling {
    pub fn token(self) -> &'static str {
        match self {
            Coupling::Dc1M => "D1M",
            Coupling::Ac1M => "A1M",
            Coupling::Dc50 => "D50",
            Coupling::Gnd => "GND",
        }
    }

    pub fn from_token(token: &str) -> Result<Self> {
        match token {
            "D1M" => Ok(Coupling::Dc1M),
            "A1M" => Ok(Coupling::Ac1M),
            "D50" => Ok(Coupling::Dc50),
            "GND" => Ok(Coupling::Gnd),
            other => Err(ScopeError::Protocol(format!(
                "unknown coupling token {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode {
    Auto,
    Normal,
    Single,
    /// Acquisition halted. Not usually requested directly (`stop()` does
    /// that), but the instrument reports it after a single sweep completes,
    /// so read-back has to represent it.
    Stop,
}

impl TriggerMode {
    pub fn token(self) -> &'static str {
        match self {
            TriggerMode::Auto => "AUTO",
            TriggerMode::Normal => "NORM",
            TriggerMode::Single => "SINGLE",
            TriggerMode::Stop => "STOP",
        }
    }

    pub fn from_token(token: &str) -> Result<Self> {
        match token {
            "AUTO" => Ok(TriggerMode::Auto),
            "NORM" => Ok(TriggerMode::Normal),
            "SINGLE" => Ok(TriggerMode::Single),
            "STOP" => Ok(TriggerMode::Stop),
            other => Err(ScopeError::Protocol(format!(
                "unknown trigger mode token {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSlope {
    Rising,
    Falling,
}

impl TriggerSlope {
    pub fn token(self) -> &'static str {
        match self {
            TriggerSlope::Rising => "POS",
            TriggerSlope::Falling => "NEG",
        }
    }

    pub fn from_token(token: &str) -> Result<Self> {
        match token {
            "POS" => Ok(TriggerSlope::Rising),
            "NEG" => Ok(TriggerSlope::Falling),
            other => Err(ScopeError::Protocol(format!(
                "unknown trigger slope token {:?}",
                other
            ))),
        }
    }
}

/// Acquisition state reported by `SAST?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionState {
    Armed,
    Ready,
    Auto,
    Trigd,
    Stop,
}

impl AcquisitionState {
    pub fn from_token(token: &str) -> Result<Self> {
        match token {
            "Armed" | "Arm" => Ok(AcquisitionState::Armed),
            "Ready" => Ok(AcquisitionState::Ready),
            "Auto" => Ok(AcquisitionState::Auto),
            "Trig'd" => Ok(AcquisitionState::Trigd),
            "Stop" => Ok(AcquisitionState::Stop),
            other => Err(ScopeError::Protocol(format!(
                "unknown acquisition state {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel number, 1 or 2.
    pub channel: u8,
    pub volts_per_div: f64,
    pub offset_volts: f64,
    pub coupling: Coupling,
    /// Probe attenuation ratio, one of [`PROBE_RATIOS`].
    pub probe_atten: u32,
    /// 20 MHz bandwidth limit.
    pub bandwidth_limit: bool,
    /// Trace display on/off.
    pub enabled: bool,
}

impl ChannelConfig {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            volts_per_div: 1.0,
            offset_volts: 0.0,
            coupling: Coupling::Dc1M,
            probe_atten: 1,
            bandwidth_limit: false,
            enabled: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        super::channel_ok(self.channel)?;
        if !self.volts_per_div.is_finite() || self.volts_per_div <= 0.0 {
            return Err(ScopeError::Validation(format!(
                "volts per division must be positive, got {}",
                self.volts_per_div
            )));
        }
        if !self.offset_volts.is_finite() {
            return Err(ScopeError::Validation("offset must be finite".into()));
        }
        if !PROBE_RATIOS.contains(&self.probe_atten) {
            return Err(ScopeError::Validation(format!(
                "probe attenuation {} is not one of {:?}",
                self.probe_atten, PROBE_RATIOS
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimebaseConfig {
    pub time_per_div: f64,
    /// Horizontal delay relative to the trigger point.
    pub delay: f64,
}

impl TimebaseConfig {
    pub fn new(time_per_div: f64) -> Self {
        Self {
            time_per_div,
            delay: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.time_per_div.is_finite() || self.time_per_div <= 0.0 {
            return Err(ScopeError::Validation(format!(
                "time per division must be positive, got {}",
                self.time_per_div
            )));
        }
        if !self.delay.is_finite() {
            return Err(ScopeError::Validation("delay must be finite".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Source channel, 1 or 2.
    pub source: u8,
    pub mode: TriggerMode,
    pub slope: TriggerSlope,
    pub level_volts: f64,
}

impl TriggerConfig {
    pub fn new(source: u8) -> Self {
        Self {
            source,
            mode: TriggerMode::Auto,
            slope: TriggerSlope::Rising,
            level_volts: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        super::channel_ok(self.source)?;
        if !self.level_volts.is_finite() {
            return Err(ScopeError::Validation("trigger level must be finite".into()));
        }
        Ok(())
    }
}
