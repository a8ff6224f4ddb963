//! Capture a single acquisition and write it out as JSON.
//!
//! Usage: waveform_dump [RESOURCE] [SAMPLES]

use std::thread;
use std::time::Duration;

use sdscope::devices::sds1202x::config::TriggerMode;
use sdscope::{ScopeConfig, Sds1202x};

fn main() -> sdscope::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let resource = args
        .next()
        .unwrap_or_else(|| "TCPIP0::192.168.2.3::INSTR".to_string());
    let samples: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(1400);

    let mut scope = Sds1202x::connect(ScopeConfig::new(resource))?;

    let mut trigger = scope.get_trigger()?;
    trigger.mode = TriggerMode::Single;
    scope.set_trigger(&trigger)?;
    scope.arm()?;
    thread::sleep(Duration::from_secs(1));
    scope.force_trigger()?;

    let waveform = scope.capture_waveform(1, samples)?;
    println!(
        "captured {} samples at {} Sa/s{}",
        waveform.len(),
        waveform.sample_rate,
        if waveform.partial { " (partial)" } else { "" }
    );

    let json = serde_json::to_string_pretty(&waveform).expect("waveform serializes");
    std::fs::write("waveform.json", json.as_bytes()).expect("write waveform.json");
    println!("wrote waveform.json");

    scope.disconnect();
    Ok(())
}
