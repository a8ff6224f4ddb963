//! Driver for the SDS1202X-E, a two-channel SDS-series oscilloscope.
//!
//! Every public operation is one blocking round trip (or a short fixed
//! sequence of them): command out, wait up to the configured deadline,
//! reply in. Operations take `&mut self`, so a logical sequence such as a
//! configuration write plus its read-back cannot be interleaved with other
//! commands on the same driver instance. Each `set_*` re-queries the
//! instrument afterwards and returns what was actually applied, because
//! the front end is free to snap requested values to its supported steps.

pub mod config;
pub mod measurement;
pub mod waveform;

use std::thread;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScopeError};
use crate::scpi::{self, value};
use crate::transport::{Backend, Connection, Transport};
use crate::ScopeConfig;

use self::config::{
    AcquisitionState, ChannelConfig, Coupling, TimebaseConfig, TriggerConfig, TriggerMode,
    TriggerSlope,
};

pub const CHANNELS: u8 = 2;

pub(crate) fn channel_ok(n: u8) -> Result<()> {
    if n == 0 || n > CHANNELS {
        return Err(ScopeError::Validation(format!(
            "the SDS1202X has channels 1 and 2; channel {} does not exist",
            n
        )));
    }
    Ok(())
}

/// Fields of the `*IDN?` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub manufacturer: String,
    pub model: String,
    pub serial_num: String,
    pub fw_version: String,
}

/// On-demand snapshot of the instrument. Never cached across calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeStatus {
    pub identity: Identity,
    /// Trace display flags for channels 1 and 2.
    pub channels_enabled: [bool; 2],
    pub acquisition: AcquisitionState,
}

pub struct Sds1202x {
    config: ScopeConfig,
    conn: Option<Connection>,
}

impl Sds1202x {
    /// Open the resource named in `config` through the first backend that
    /// accepts it, then verify the instrument identifies as an SDS-series
    /// scope.
    pub fn connect(config: ScopeConfig) -> Result<Self> {
        let conn = Connection::open(&config)?;
        let mut scope = Self {
            config,
            conn: Some(conn),
        };
        let identity = scope.identify()?;
        if !identity.model.contains("SDS") {
            return Err(ScopeError::Protocol(format!(
                "connected to {} {}, which is not an SDS-series scope",
                identity.manufacturer, identity.model
            )));
        }
        info!(
            "connected to {} {} (fw {})",
            identity.manufacturer, identity.model, identity.fw_version
        );
        Ok(scope)
    }

    /// Build a driver over an already-constructed transport. Used in tests
    /// with a scripted transport; skips the identification handshake.
    pub fn with_transport(config: ScopeConfig, io: Box<dyn Transport>) -> Self {
        Self {
            config,
            conn: Some(Connection::with_transport(io)),
        }
    }

    /// Release the connection and its resource claim. Safe to call twice.
    pub fn disconnect(&mut self) {
        if self.conn.take().is_some() {
            info!("disconnected from {}", self.config.resource);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Backend the live connection is bound to, if any.
    pub fn backend(&self) -> Option<Backend> {
        self.conn.as_ref().map(|c| c.backend())
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    pub(crate) fn conn(&mut self) -> Result<&mut Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| ScopeError::Connection("not connected".into()))
    }

    fn throttle(&self) {
        if !self.config.tx_throttle.is_zero() {
            thread::sleep(self.config.tx_throttle);
        }
    }

    fn settle(&self) {
        if !self.config.settle.is_zero() {
            thread::sleep(self.config.settle);
        }
    }

    pub(crate) fn write(&mut self, command: &str) -> Result<()> {
        self.throttle();
        self.conn()?.write(command)
    }

    pub(crate) fn ask(&mut self, command: &str) -> Result<String> {
        self.throttle();
        let timeout = self.config.timeout;
        self.conn()?.ask(command, timeout)
    }

    // --- status ---

    pub fn identify(&mut self) -> Result<Identity> {
        let reply = self.ask("*IDN?")?;
        let (manufacturer, model, serial_num, fw_version) = scpi::decode_idn(&reply)?;
        Ok(Identity {
            manufacturer,
            model,
            serial_num,
            fw_version,
        })
    }

    pub fn acquisition_state(&mut self) -> Result<AcquisitionState> {
        let reply = self.ask("SAST?")?;
        AcquisitionState::from_token(&scpi::decode_sast(&reply)?)
    }

    pub fn status(&mut self) -> Result<ScopeStatus> {
        let identity = self.identify()?;
        let ch1 = self.trace_enabled(1)?;
        let ch2 = self.trace_enabled(2)?;
        let acquisition = self.acquisition_state()?;
        Ok(ScopeStatus {
            identity,
            channels_enabled: [ch1, ch2],
            acquisition,
        })
    }

    // --- channel configuration ---

    /// Apply a channel configuration, then read back and return what the
    /// instrument actually accepted.
    pub fn set_channel(&mut self, cfg: &ChannelConfig) -> Result<ChannelConfig> {
        cfg.validate()?;
        let n = cfg.channel;
        self.write(&format!("C{}:TRA {}", n, if cfg.enabled { "ON" } else { "OFF" }))?;
        self.write(&format!("C{}:VDIV {}", n, value::format_voltage(cfg.volts_per_div)))?;
        self.write(&format!("C{}:OFST {}", n, value::format_voltage(cfg.offset_volts)))?;
        self.write(&format!("C{}:CPL {}", n, cfg.coupling.token()))?;
        self.write(&format!("C{}:ATTN {}", n, cfg.probe_atten))?;
        self.write(&format!(
            "C{}:BWL {}",
            n,
            if cfg.bandwidth_limit { "ON" } else { "OFF" }
        ))?;
        self.get_channel(n)
    }

    pub fn get_channel(&mut self, channel: u8) -> Result<ChannelConfig> {
        channel_ok(channel)?;
        let volts_per_div = self.volts_per_div(channel)?;
        let offset_volts = self.voltage_offset(channel)?;
        let coupling = {
            let reply = self.ask(&format!("C{}:CPL?", channel))?;
            Coupling::from_token(&scpi::decode_cpl(&reply, channel)?)?
        };
        let probe_atten = {
            let reply = self.ask(&format!("C{}:ATTN?", channel))?;
            scpi::decode_attn(&reply, channel)?
        };
        let bandwidth_limit = {
            let reply = self.ask(&format!("C{}:BWL?", channel))?;
            scpi::decode_bwl(&reply, channel)?
        };
        let enabled = self.trace_enabled(channel)?;
        Ok(ChannelConfig {
            channel,
            volts_per_div,
            offset_volts,
            coupling,
            probe_atten,
            bandwidth_limit,
            enabled,
        })
    }

    pub fn volts_per_div(&mut self, channel: u8) -> Result<f64> {
        channel_ok(channel)?;
        let reply = self.ask(&format!("C{}:VDIV?", channel))?;
        scpi::decode_vdiv(&reply, channel)
    }

    pub fn voltage_offset(&mut self, channel: u8) -> Result<f64> {
        channel_ok(channel)?;
        let reply = self.ask(&format!("C{}:OFST?", channel))?;
        scpi::decode_ofst(&reply, channel)
    }

    pub fn trace_enabled(&mut self, channel: u8) -> Result<bool> {
        channel_ok(channel)?;
        let reply = self.ask(&format!("C{}:TRA?", channel))?;
        scpi::decode_tra(&reply, channel)
    }

    // --- timebase ---

    pub fn set_timebase(&mut self, cfg: &TimebaseConfig) -> Result<TimebaseConfig> {
        cfg.validate()?;
        self.write(&format!("TDIV {}", value::format_time(cfg.time_per_div)))?;
        self.write(&format!("TRDL {}", value::format_time(cfg.delay)))?;
        self.get_timebase()
    }

    pub fn get_timebase(&mut self) -> Result<TimebaseConfig> {
        let time_per_div = self.time_per_div()?;
        let delay = self.trigger_delay()?;
        Ok(TimebaseConfig {
            time_per_div,
            delay,
        })
    }

    pub fn time_per_div(&mut self) -> Result<f64> {
        let reply = self.ask("TDIV?")?;
        scpi::decode_tdiv(&reply)
    }

    pub fn trigger_delay(&mut self) -> Result<f64> {
        let reply = self.ask("TRDL?")?;
        scpi::decode_trdl(&reply)
    }

    // --- trigger ---

    pub fn set_trigger(&mut self, cfg: &TriggerConfig) -> Result<TriggerConfig> {
        cfg.validate()?;
        self.write(&format!(
            "TRSE EDGE,SR,C{},{},OFF",
            cfg.source,
            cfg.slope.token()
        ))?;
        self.write(&format!("TRMD {}", cfg.mode.token()))?;
        self.write(&format!(
            "C{}:TRLV {}",
            cfg.source,
            value::format_voltage(cfg.level_volts)
        ))?;
        self.get_trigger()
    }

    pub fn get_trigger(&mut self) -> Result<TriggerConfig> {
        let (source, slope) = {
            let reply = self.ask("TRSE?")?;
            let (source, slope_token) = scpi::decode_trse(&reply)?;
            channel_ok(source).map_err(|_| {
                ScopeError::Protocol(format!("trigger source C{} out of range", source))
            })?;
            (source, TriggerSlope::from_token(&slope_token)?)
        };
        let mode = {
            let reply = self.ask("TRMD?")?;
            TriggerMode::from_token(&scpi::decode_trmd(&reply)?)?
        };
        let level_volts = {
            let reply = self.ask(&format!("C{}:TRLV?", source))?;
            scpi::decode_trlv(&reply, source)?
        };
        Ok(TriggerConfig {
            source,
            mode,
            slope,
            level_volts,
        })
    }

    // --- acquisition control ---

    /// Auto-configure the acquisition for the present signal. Blocking and
    /// idempotent; observe the effect through the `get_*` calls.
    pub fn auto_setup(&mut self) -> Result<()> {
        self.write("ASET")?;
        self.settle();
        Ok(())
    }

    /// Reset the instrument to factory defaults. Blocking and idempotent.
    pub fn reset(&mut self) -> Result<()> {
        self.write("*RST")?;
        self.settle();
        Ok(())
    }

    /// Clear status registers and the error queue.
    pub fn clear_status(&mut self) -> Result<()> {
        self.write("*CLS")
    }

    pub fn arm(&mut self) -> Result<()> {
        self.write("ARM")
    }

    pub fn stop(&mut self) -> Result<()> {
        self.write("STOP")
    }

    pub fn force_trigger(&mut self) -> Result<()> {
        self.write("FRTR")
    }

    /// Current acquisition sample rate in Sa/s.
    pub fn sample_rate(&mut self) -> Result<f64> {
        let reply = self.ask("SARA?")?;
        scpi::decode_sara(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use std::time::Duration;

    fn test_config() -> ScopeConfig {
        let mut config = ScopeConfig::new("MOCK::SDS1202X");
        config.tx_throttle = Duration::ZERO;
        config.settle = Duration::ZERO;
        config
    }

    fn scope_with(io: MockTransport) -> Sds1202x {
        Sds1202x::with_transport(test_config(), Box::new(io))
    }

    #[test]
    fn channel_bounds() {
        assert!(channel_ok(1).is_ok());
        assert!(channel_ok(2).is_ok());
        assert!(matches!(channel_ok(0), Err(ScopeError::Validation(_))));
        assert!(matches!(channel_ok(3), Err(ScopeError::Validation(_))));
    }

    #[test]
    fn identify_parses_the_idn_reply() {
        let mut io = MockTransport::new();
        io.push_reply("Siglent Technologies,SDS1202X-E,SDS1EEFX803161,1.3.27");
        let mut scope = scope_with(io);
        let identity = scope.identify().unwrap();
        assert_eq!(identity.model, "SDS1202X-E");
        assert_eq!(identity.fw_version, "1.3.27");
    }

    #[test]
    fn status_is_recomputed_from_the_wire() {
        let mut io = MockTransport::new();
        io.push_reply("Siglent Technologies,SDS1202X-E,SDS1EEFX803161,1.3.27");
        io.push_reply("C1:TRA ON");
        io.push_reply("C2:TRA OFF");
        io.push_reply("SAST Trig'd");
        let mut scope = scope_with(io);
        let status = scope.status().unwrap();
        assert_eq!(status.channels_enabled, [true, false]);
        assert_eq!(status.acquisition, AcquisitionState::Trigd);
    }

    #[test]
    fn set_channel_returns_the_read_back_configuration() {
        let mut io = MockTransport::new();
        // Read-back replies; the instrument clamps 0.3 V/div to 0.5 V/div.
        io.push_reply("C1:VDIV 5.00E-01V");
        io.push_reply("C1:OFST 0.00E+00V");
        io.push_reply("C1:CPL D1M");
        io.push_reply("C1:ATTN 10");
        io.push_reply("C1:BWL OFF");
        io.push_reply("C1:TRA ON");

        let mut requested = ChannelConfig::new(1);
        requested.volts_per_div = 0.3;
        requested.probe_atten = 10;

        let mut scope = scope_with(io);
        let applied = scope.set_channel(&requested).unwrap();
        assert_eq!(applied.volts_per_div, 0.5);
        assert_eq!(applied.coupling, Coupling::Dc1M);
        assert_eq!(applied.probe_atten, 10);
        assert!(applied.enabled);
    }

    #[test]
    fn set_channel_emits_the_expected_commands() {
        let mut io = MockTransport::new();
        let log = io.command_log();
        io.push_reply("C2:VDIV 1.00E-01V");
        io.push_reply("C2:OFST -5.00E-02V");
        io.push_reply("C2:CPL A1M");
        io.push_reply("C2:ATTN 1");
        io.push_reply("C2:BWL ON");
        io.push_reply("C2:TRA OFF");

        let requested = ChannelConfig {
            channel: 2,
            volts_per_div: 0.1,
            offset_volts: -0.05,
            coupling: Coupling::Ac1M,
            probe_atten: 1,
            bandwidth_limit: true,
            enabled: false,
        };

        let mut scope = scope_with(io);
        scope.set_channel(&requested).unwrap();

        let sent = log.lock().unwrap();
        let writes: Vec<&str> = sent.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            &writes[..6],
            [
                "C2:TRA OFF",
                "C2:VDIV 100MV",
                "C2:OFST -50MV",
                "C2:CPL A1M",
                "C2:ATTN 1",
                "C2:BWL ON",
            ]
        );
        // Followed by the read-back queries.
        assert_eq!(writes[6], "C2:VDIV?");
    }

    #[test]
    fn invalid_channel_config_is_rejected_before_transmission() {
        let mut bad = ChannelConfig::new(1);
        bad.probe_atten = 7;
        // Empty transport: any transmission attempt would error with Timeout,
        // so reaching Validation proves nothing was sent.
        let mut scope = scope_with(MockTransport::new());
        assert!(matches!(
            scope.set_channel(&bad),
            Err(ScopeError::Validation(_))
        ));
    }

    #[test]
    fn trigger_round_trip() {
        let mut io = MockTransport::new();
        io.push_reply("TRSE EDGE,SR,C1,POS,OFF");
        io.push_reply("TRMD NORM");
        io.push_reply("C1:TRLV 5.00E-01V");
        let mut scope = scope_with(io);

        let requested = TriggerConfig {
            source: 1,
            mode: TriggerMode::Normal,
            slope: TriggerSlope::Rising,
            level_volts: 0.5,
        };
        let applied = scope.set_trigger(&requested).unwrap();
        assert_eq!(applied, requested);
    }

    #[test]
    fn stopped_trigger_mode_reads_back() {
        let mut io = MockTransport::new();
        io.push_reply("TRSE EDGE,SR,C2,NEG,OFF");
        io.push_reply("TRMD STOP");
        io.push_reply("C2:TRLV 0.00E+00V");
        let mut scope = scope_with(io);
        let trigger = scope.get_trigger().unwrap();
        assert_eq!(trigger.mode, TriggerMode::Stop);
        assert_eq!(trigger.slope, TriggerSlope::Falling);
        assert_eq!(trigger.source, 2);
    }

    #[test]
    fn timebase_round_trip() {
        let mut io = MockTransport::new();
        let log = io.command_log();
        io.push_reply("TDIV 1.00E-03S");
        io.push_reply("TRDL 0.00E+00S");
        let mut scope = scope_with(io);

        let applied = scope.set_timebase(&TimebaseConfig::new(1e-3)).unwrap();
        assert_eq!(applied.time_per_div, 1e-3);
        assert_eq!(applied.delay, 0.0);

        let sent = log.lock().unwrap();
        assert_eq!(sent[0], "TDIV 1MS");
        assert_eq!(sent[1], "TRDL 0S");
    }

    #[test]
    fn acquisition_control_commands() {
        let mut io = MockTransport::new();
        let log = io.command_log();
        let mut scope = scope_with(io);

        scope.auto_setup().unwrap();
        scope.reset().unwrap();
        scope.clear_status().unwrap();
        scope.arm().unwrap();
        scope.stop().unwrap();
        scope.force_trigger().unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            ["ASET", "*RST", "*CLS", "ARM", "STOP", "FRTR"]
        );
    }

    #[test]
    fn operations_after_disconnect_fail_with_connection_error() {
        let mut scope = scope_with(MockTransport::new());
        scope.disconnect();
        scope.disconnect(); // idempotent
        assert!(!scope.is_connected());
        assert!(matches!(
            scope.identify(),
            Err(ScopeError::Connection(_))
        ));
    }
}
