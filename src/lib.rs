// Error taxonomy shared by every layer
pub mod error;

// VISA-style transport: backend selection, resource claims, and the
// byte-level session primitives everything above is built on
pub mod transport;

// SCPI command codec: unit-tagged values, reply grammars, definite-length blocks
pub mod scpi;

// Instrument drivers built on the codec
pub mod devices;

pub use crate::devices::sds1202x::Sds1202x;
pub use crate::error::{Result, ScopeError};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection settings supplied by the caller at construction time.
///
/// There are no process-wide defaults; every driver instance carries its
/// own copy of these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// VISA-style resource name, e.g. `TCPIP0::192.168.2.3::INSTR` or
    /// `USB0::0xF4ED::0xEE3A::SDS1EEFX803161::INSTR`.
    pub resource: String,

    /// Reply deadline for ordinary commands. Default 10 s.
    pub timeout: Duration,

    /// Reply deadline for waveform block transfers, which are much larger
    /// than ordinary replies. Default 15 s.
    pub waveform_timeout: Duration,

    /// Pause inserted before each outgoing command; the SDS front panel
    /// firmware drops commands that arrive back to back.
    pub tx_throttle: Duration,

    /// Wait after `*RST` and `ASET` while the acquisition front end
    /// reconfigures itself.
    pub settle: Duration,
}

impl ScopeConfig {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            timeout: Duration::from_secs(10),
            waveform_timeout: Duration::from_secs(15),
            tx_throttle: Duration::from_millis(100),
            settle: Duration::from_secs(2),
        }
    }
}
