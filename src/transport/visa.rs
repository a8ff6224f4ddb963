//! Vendor VISA backend via the `visa-rs` binding.
//!
//! Compiled only with the `vendor-visa` feature since it links against the
//! native VISA library. This backend understands every resource class the
//! vendor library does (USB, TCPIP, GPIB), which is why it is tried first.

use std::time::Duration;

use log::debug;
use visa_rs::{DefaultRM, Instrument, VISA_SUCCESS};

use crate::error::{Result, ScopeError};
use crate::transport::{Backend, Transport};
use crate::ScopeConfig;

pub struct VisaSession {
    instr: Box<dyn Instrument>,
    _rm: DefaultRM,
}

impl VisaSession {
    pub fn open(config: &ScopeConfig) -> Result<Self> {
        let rm = DefaultRM::new()
            .map_err(|e| ScopeError::Connection(format!("VISA resource manager: {}", e)))?;

        let instr = rm
            .open(&config.resource, config.timeout.as_millis() as u32, 0)
            .map_err(|e| {
                ScopeError::Connection(format!("VISA open {}: {}", config.resource, e))
            })?;

        debug!("VISA backend opened {}", config.resource);
        Ok(Self { instr, _rm: rm })
    }

    fn apply_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.instr
            .set_timeout(timeout.as_millis() as u32)
            .map_err(|e| ScopeError::Connection(format!("VISA set timeout: {}", e)))
    }

    /// One VISA read. The library folds deadline expiry and bus faults into
    /// the same status path, so a failed read inside a receive window is
    /// classified as a timeout.
    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let mut count = 0i32;
        let status = self.instr.read(buf, &mut count);
        if status != VISA_SUCCESS || count <= 0 {
            return Err(ScopeError::Timeout(timeout));
        }
        Ok(count as usize)
    }
}

impl Transport for VisaSession {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(data)
            .map_err(|_| ScopeError::Protocol("outgoing command is not ASCII".into()))?;
        self.instr
            .write(&format!("{}\n", text))
            .map_err(|e| ScopeError::Connection(format!("VISA write: {}", e)))
    }

    fn receive_line(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        self.apply_timeout(timeout)?;
        let mut buf = vec![0u8; 4096];
        let n = self.read_chunk(&mut buf, timeout)?;
        buf.truncate(n);
        while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
            buf.pop();
        }
        Ok(buf)
    }

    fn receive_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>> {
        self.apply_timeout(timeout)?;
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            let mut buf = vec![0u8; n - out.len()];
            let read = self.read_chunk(&mut buf, timeout)?;
            out.extend_from_slice(&buf[..read]);
        }
        Ok(out)
    }

    fn receive_partial(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>> {
        self.apply_timeout(timeout)?;
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            let mut buf = vec![0u8; n - out.len()];
            match self.read_chunk(&mut buf, timeout) {
                Ok(read) => out.extend_from_slice(&buf[..read]),
                Err(_) => break,
            }
        }
        Ok(out)
    }

    fn backend(&self) -> Backend {
        Backend::Visa
    }
}
