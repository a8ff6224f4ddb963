//! Portable raw-socket SCPI backend.
//!
//! Speaks SCPI over a plain TCP stream, the instrument's raw-socket
//! service (port 5025 unless the resource name says otherwise). This is
//! the fallback when the vendor VISA library is not available; it only
//! understands `TCPIP` resources, so USB resources fail the backend trial
//! here and must go through the vendor backend.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::error::{Result, ScopeError};
use crate::transport::{Backend, Transport};
use crate::ScopeConfig;

pub const DEFAULT_SCPI_PORT: u16 = 5025;

const MAX_LINE: usize = 64 * 1024;

lazy_static! {
    // TCPIP0::192.168.2.3::INSTR or TCPIP0::192.168.2.3::5025::SOCKET
    static ref TCPIP_RE: Regex =
        Regex::new(r"^TCPIP\d*::([^:]+)(?:::(\d+))?::(?:SOCKET|INSTR)$").unwrap();
}

/// Host/port pair extracted from a `TCPIP` resource name.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct TcpResource {
    pub host: String,
    pub port: u16,
}

impl TcpResource {
    pub(crate) fn parse(resource: &str) -> Result<Self> {
        let caps = TCPIP_RE.captures(resource).ok_or_else(|| {
            ScopeError::Connection(format!(
                "resource {} is not addressable by the socket backend",
                resource
            ))
        })?;
        let host = caps
            .get(1)
            .map(|m| m.as_str().to_owned())
            .ok_or_else(|| ScopeError::Connection("no host in resource name".into()))?;
        let port = match caps.get(2) {
            Some(m) => m.as_str().parse::<u16>().map_err(|_| {
                ScopeError::Connection(format!("bad port in resource name {}", resource))
            })?,
            None => DEFAULT_SCPI_PORT,
        };
        Ok(Self { host, port })
    }
}

pub struct SocketSession {
    stream: TcpStream,
    write_timeout: Duration,
}

impl SocketSession {
    pub fn open(config: &ScopeConfig) -> Result<Self> {
        let resource = TcpResource::parse(&config.resource)?;

        let addrs: Vec<SocketAddr> = (resource.host.as_str(), resource.port)
            .to_socket_addrs()
            .map_err(|e| {
                ScopeError::Connection(format!("cannot resolve {}: {}", resource.host, e))
            })?
            .collect();

        let mut last_err: Option<std::io::Error> = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, config.timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true).ok();
                    stream
                        .set_write_timeout(Some(config.timeout))
                        .map_err(|e| ScopeError::Connection(e.to_string()))?;
                    debug!("socket backend connected to {}", addr);
                    return Ok(Self {
                        stream,
                        write_timeout: config.timeout,
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(ScopeError::Connection(match last_err {
            Some(e) => format!("cannot connect to {}:{}: {}", resource.host, resource.port, e),
            None => format!("no addresses for {}", resource.host),
        }))
    }

    /// Arm the read deadline with whatever time remains, then read into
    /// `buf`. A zero remainder is reported as the timeout it is.
    fn read_some(&mut self, buf: &mut [u8], deadline: Instant, timeout: Duration) -> Result<usize> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ScopeError::Timeout(timeout));
        }
        self.stream
            .set_read_timeout(Some(remaining))
            .map_err(|e| ScopeError::Connection(e.to_string()))?;
        let n = self
            .stream
            .read(buf)
            .map_err(|e| ScopeError::from_io(&e, timeout))?;
        if n == 0 {
            return Err(ScopeError::Connection("connection closed by peer".into()));
        }
        Ok(n)
    }
}

impl Transport for SocketSession {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let timeout = self.write_timeout;
        self.stream
            .write_all(data)
            .and_then(|_| self.stream.write_all(b"\n"))
            .and_then(|_| self.stream.flush())
            .map_err(|e| ScopeError::from_io(&e, timeout))
    }

    fn receive_line(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            self.read_some(&mut byte, deadline, timeout)?;
            if byte[0] == b'\n' {
                return Ok(line);
            }
            line.push(byte[0]);
            if line.len() > MAX_LINE {
                return Err(ScopeError::Protocol(
                    "reply exceeded maximum line length".into(),
                ));
            }
        }
    }

    fn receive_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut out = vec![0u8; n];
        let mut filled = 0usize;
        while filled < n {
            filled += self.read_some(&mut out[filled..], deadline, timeout)?;
        }
        Ok(out)
    }

    fn receive_partial(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut out = vec![0u8; n];
        let mut filled = 0usize;
        while filled < n {
            match self.read_some(&mut out[filled..], deadline, timeout) {
                Ok(read) => filled += read,
                // A short transfer is the caller's to report, not ours.
                Err(ScopeError::Timeout(_)) | Err(ScopeError::Connection(_)) => break,
                Err(other) => return Err(other),
            }
        }
        out.truncate(filled);
        Ok(out)
    }

    fn backend(&self) -> Backend {
        Backend::Socket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_instr_resource_with_default_port() {
        let r = TcpResource::parse("TCPIP0::192.168.2.3::INSTR").unwrap();
        assert_eq!(r.host, "192.168.2.3");
        assert_eq!(r.port, DEFAULT_SCPI_PORT);
    }

    #[test]
    fn parses_socket_resource_with_explicit_port() {
        let r = TcpResource::parse("TCPIP::scope.lab.local::5024::SOCKET").unwrap();
        assert_eq!(r.host, "scope.lab.local");
        assert_eq!(r.port, 5024);
    }

    #[test]
    fn rejects_usb_resources() {
        let err = TcpResource::parse("USB0::0xF4ED::0xEE3A::SDS1EEFX::INSTR").unwrap_err();
        assert!(matches!(err, ScopeError::Connection(_)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(TcpResource::parse("not a resource").is_err());
    }
}
