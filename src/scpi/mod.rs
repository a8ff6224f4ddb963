//! SCPI command codec for the SDS command set.
//!
//! One regex per command family; every reply is matched against its
//! family's grammar and converted into a typed value. Replies that match
//! nothing are protocol errors, never silently wrong values. Channel-tagged
//! replies are checked against the channel that was asked for.
//!
//! Encoding lives close to the callers as `format!` over these same
//! families, with unit suffixes rendered by [`value`].

pub mod block;
pub mod value;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::error::{Result, ScopeError};

use self::value::UnitFamily;

lazy_static! {
    static ref IDN_RE: Regex = Regex::new(r"([^,]+),([^,]+),([^,]+),([^,\s]+)").unwrap();
    static ref VDIV_RE: Regex = Regex::new(r"C(\d):VDIV\s+(\S+)").unwrap();
    static ref OFST_RE: Regex = Regex::new(r"C(\d):OFST\s+(\S+)").unwrap();
    static ref TRA_RE: Regex = Regex::new(r"C(\d):TRA\s+(ON|OFF)").unwrap();
    static ref CPL_RE: Regex = Regex::new(r"C(\d):CPL\s+(\w+)").unwrap();
    static ref ATTN_RE: Regex = Regex::new(r"C(\d):ATTN\s+(\d+)").unwrap();
    static ref BWL_RE: Regex = Regex::new(r"C(\d):BWL\s+(ON|OFF)").unwrap();
    static ref TDIV_RE: Regex = Regex::new(r"TDIV\s+(\S+)").unwrap();
    static ref TRDL_RE: Regex = Regex::new(r"TRDL\s+(\S+)").unwrap();
    static ref TRMD_RE: Regex = Regex::new(r"TRMD\s+(\w+)").unwrap();
    static ref TRLV_RE: Regex = Regex::new(r"C(\d):TRLV\s+(\S+)").unwrap();
    static ref TRSE_RE: Regex = Regex::new(r"TRSE\s+(\w+),SR,C(\d),(\w+)").unwrap();
    static ref SARA_RE: Regex = Regex::new(r"SARA\s+([0-9.Ee+-]+)\s*(G|M|k)?Sa/s").unwrap();
    static ref SAST_RE: Regex = Regex::new(r"SAST\s+(\S+)").unwrap();
    static ref PAVA_RE: Regex = Regex::new(r"C(\d):PAVA\s+(\w+),(.+)").unwrap();
    static ref CYMT_RE: Regex = Regex::new(r"CYMT\s+(.+)").unwrap();
}

/// A numeric reply from the measurement engine: either a value or the
/// engine's explicit "cannot compute this" sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericReply {
    Value(f64),
    Invalid,
}

fn cap_str<'a>(caps: &'a Captures, idx: usize, what: &str) -> Result<&'a str> {
    caps.get(idx)
        .map(|m| m.as_str())
        .ok_or_else(|| ScopeError::Protocol(format!("no match for {}", what)))
}

fn check_channel(caps: &Captures, idx: usize, expected: u8, reply: &str) -> Result<()> {
    let tagged = cap_str(caps, idx, "channel tag")?;
    if tagged != expected.to_string() {
        return Err(ScopeError::Protocol(format!(
            "reply {:?} is tagged for channel {}, expected {}",
            reply, tagged, expected
        )));
    }
    Ok(())
}

/// `*IDN?` reply as (manufacturer, model, serial, firmware).
pub fn decode_idn(reply: &str) -> Result<(String, String, String, String)> {
    let caps = IDN_RE
        .captures(reply)
        .ok_or_else(|| ScopeError::Protocol(format!("unparseable *IDN? reply {:?}", reply)))?;
    Ok((
        cap_str(&caps, 1, "manufacturer")?.to_owned(),
        cap_str(&caps, 2, "model")?.to_owned(),
        cap_str(&caps, 3, "serial number")?.to_owned(),
        cap_str(&caps, 4, "firmware version")?.to_owned(),
    ))
}

fn decode_channel_quantity(
    re: &Regex,
    reply: &str,
    channel: u8,
    family: UnitFamily,
    what: &str,
) -> Result<f64> {
    let caps = re
        .captures(reply)
        .ok_or_else(|| ScopeError::Protocol(format!("unparseable {} reply {:?}", what, reply)))?;
    check_channel(&caps, 1, channel, reply)?;
    value::parse(cap_str(&caps, 2, what)?, family)
}

pub fn decode_vdiv(reply: &str, channel: u8) -> Result<f64> {
    decode_channel_quantity(&VDIV_RE, reply, channel, UnitFamily::Voltage, "VDIV")
}

pub fn decode_ofst(reply: &str, channel: u8) -> Result<f64> {
    decode_channel_quantity(&OFST_RE, reply, channel, UnitFamily::Voltage, "OFST")
}

pub fn decode_trlv(reply: &str, channel: u8) -> Result<f64> {
    decode_channel_quantity(&TRLV_RE, reply, channel, UnitFamily::Voltage, "TRLV")
}

fn decode_channel_switch(re: &Regex, reply: &str, channel: u8, what: &str) -> Result<bool> {
    let caps = re
        .captures(reply)
        .ok_or_else(|| ScopeError::Protocol(format!("unparseable {} reply {:?}", what, reply)))?;
    check_channel(&caps, 1, channel, reply)?;
    Ok(cap_str(&caps, 2, what)? == "ON")
}

pub fn decode_tra(reply: &str, channel: u8) -> Result<bool> {
    decode_channel_switch(&TRA_RE, reply, channel, "TRA")
}

pub fn decode_bwl(reply: &str, channel: u8) -> Result<bool> {
    decode_channel_switch(&BWL_RE, reply, channel, "BWL")
}

/// Coupling token, e.g. `D1M`; mapping to the enum happens in the device layer.
pub fn decode_cpl(reply: &str, channel: u8) -> Result<String> {
    let caps = CPL_RE
        .captures(reply)
        .ok_or_else(|| ScopeError::Protocol(format!("unparseable CPL reply {:?}", reply)))?;
    check_channel(&caps, 1, channel, reply)?;
    Ok(cap_str(&caps, 2, "coupling")?.to_owned())
}

pub fn decode_attn(reply: &str, channel: u8) -> Result<u32> {
    let caps = ATTN_RE
        .captures(reply)
        .ok_or_else(|| ScopeError::Protocol(format!("unparseable ATTN reply {:?}", reply)))?;
    check_channel(&caps, 1, channel, reply)?;
    cap_str(&caps, 2, "attenuation")?
        .parse::<u32>()
        .map_err(|_| ScopeError::Protocol(format!("bad attenuation in {:?}", reply)))
}

pub fn decode_tdiv(reply: &str) -> Result<f64> {
    let caps = TDIV_RE
        .captures(reply)
        .ok_or_else(|| ScopeError::Protocol(format!("unparseable TDIV reply {:?}", reply)))?;
    value::parse(cap_str(&caps, 1, "TDIV")?, UnitFamily::Time)
}

pub fn decode_trdl(reply: &str) -> Result<f64> {
    let caps = TRDL_RE
        .captures(reply)
        .ok_or_else(|| ScopeError::Protocol(format!("unparseable TRDL reply {:?}", reply)))?;
    value::parse(cap_str(&caps, 1, "TRDL")?, UnitFamily::Time)
}

/// Trigger mode token (`AUTO`, `NORM`, `SINGLE`, `STOP`).
pub fn decode_trmd(reply: &str) -> Result<String> {
    let caps = TRMD_RE
        .captures(reply)
        .ok_or_else(|| ScopeError::Protocol(format!("unparseable TRMD reply {:?}", reply)))?;
    Ok(cap_str(&caps, 1, "trigger mode")?.to_owned())
}

/// Trigger selection as (source channel, slope token).
pub fn decode_trse(reply: &str) -> Result<(u8, String)> {
    let caps = TRSE_RE
        .captures(reply)
        .ok_or_else(|| ScopeError::Protocol(format!("unparseable TRSE reply {:?}", reply)))?;
    let source = cap_str(&caps, 2, "trigger source")?
        .parse::<u8>()
        .map_err(|_| ScopeError::Protocol(format!("bad trigger source in {:?}", reply)))?;
    Ok((source, cap_str(&caps, 3, "trigger slope")?.to_owned()))
}

/// Acquisition state token from `SAST?` (`Armed`, `Ready`, `Auto`,
/// `Trig'd`, `Stop`).
pub fn decode_sast(reply: &str) -> Result<String> {
    let caps = SAST_RE
        .captures(reply)
        .ok_or_else(|| ScopeError::Protocol(format!("unparseable SAST reply {:?}", reply)))?;
    Ok(cap_str(&caps, 1, "acquisition state")?.to_owned())
}

/// Sample rate in Sa/s. The instrument reports either scientific notation
/// or a suffixed numeral (`SARA 1.00GSa/s`).
pub fn decode_sara(reply: &str) -> Result<f64> {
    let caps = SARA_RE
        .captures(reply)
        .ok_or_else(|| ScopeError::Protocol(format!("unparseable SARA reply {:?}", reply)))?;
    let numeral = cap_str(&caps, 1, "sample rate")?
        .parse::<f64>()
        .map_err(|_| ScopeError::Protocol(format!("bad sample rate in {:?}", reply)))?;
    let scale = match caps.get(2).map(|m| m.as_str()) {
        Some("G") => 1e9,
        Some("M") => 1e6,
        Some("k") => 1e3,
        Some(other) => {
            return Err(ScopeError::Protocol(format!(
                "unrecognized sample rate suffix {:?}",
                other
            )))
        }
        None => 1.0,
    };
    Ok(numeral * scale)
}

/// Decode a measurement reply for `channel`, expected to carry `token`.
///
/// Accepts the `C<n>:PAVA <TOK>,<value>` echo form, the cymometer's
/// `CYMT <value>` form, and a bare value. The `****` sentinel decodes to
/// [`NumericReply::Invalid`] rather than a parse failure.
pub fn decode_measurement(
    reply: &str,
    channel: u8,
    token: &str,
    family: UnitFamily,
) -> Result<NumericReply> {
    if value::is_sentinel(reply) {
        return Ok(NumericReply::Invalid);
    }

    let payload = if let Some(caps) = PAVA_RE.captures(reply) {
        check_channel(&caps, 1, channel, reply)?;
        let echoed = cap_str(&caps, 2, "measurement token")?;
        if echoed != token {
            return Err(ScopeError::Protocol(format!(
                "asked for {} but reply {:?} carries {}",
                token, reply, echoed
            )));
        }
        cap_str(&caps, 3, "measurement value")?.to_owned()
    } else if let Some(caps) = CYMT_RE.captures(reply) {
        cap_str(&caps, 1, "cymometer value")?.to_owned()
    } else {
        reply.trim().to_owned()
    };

    value::parse(&payload, family).map(NumericReply::Value)
}
