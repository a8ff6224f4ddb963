//! Connect to a scope, configure it, and read a measurement batch.
//!
//! Usage: basic_control [RESOURCE]
//! e.g. basic_control TCPIP0::192.168.2.3::INSTR

use sdscope::devices::sds1202x::config::{
    ChannelConfig, Coupling, TimebaseConfig, TriggerConfig, TriggerMode, TriggerSlope,
};
use sdscope::devices::sds1202x::measurement::{MeasuredValue, Quantity};
use sdscope::{ScopeConfig, Sds1202x};

fn main() -> sdscope::Result<()> {
    env_logger::init();

    let resource = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "TCPIP0::192.168.2.3::INSTR".to_string());

    let mut scope = Sds1202x::connect(ScopeConfig::new(resource))?;

    let status = scope.status()?;
    println!(
        "{} {} (fw {}), acquisition {:?}",
        status.identity.manufacturer,
        status.identity.model,
        status.identity.fw_version,
        status.acquisition
    );

    let mut channel = ChannelConfig::new(1);
    channel.volts_per_div = 0.5;
    channel.coupling = Coupling::Dc1M;
    channel.probe_atten = 10;
    let applied = scope.set_channel(&channel)?;
    println!(
        "channel 1: {} V/div, offset {} V ({})",
        applied.volts_per_div,
        applied.offset_volts,
        if applied.enabled { "on" } else { "off" }
    );

    scope.set_timebase(&TimebaseConfig::new(1e-3))?;

    let mut trigger = TriggerConfig::new(1);
    trigger.mode = TriggerMode::Auto;
    trigger.slope = TriggerSlope::Rising;
    scope.set_trigger(&trigger)?;

    let results = scope.measure_channel(1, &Quantity::ALL)?;
    for m in &results {
        match m.value {
            MeasuredValue::Measured { value, unit } => {
                println!("{:?}: {} {}", m.quantity, value, unit.symbol())
            }
            MeasuredValue::Derived { value, unit } => {
                println!("{:?}: {} {} (derived from waveform)", m.quantity, value, unit.symbol())
            }
            MeasuredValue::Invalid => println!("{:?}: no signal", m.quantity),
        }
    }

    scope.disconnect();
    Ok(())
}
