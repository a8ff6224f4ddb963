//! VISA-style transport layer.
//!
//! Opens a session to a named resource by trying candidate backends in a
//! fixed priority order: the vendor VISA binding first (when built with the
//! `vendor-visa` feature), then the portable raw-socket backend. The first
//! backend that opens the resource wins for the lifetime of the handle;
//! there is no per-call re-selection.
//!
//! A process-wide claim registry enforces the single-holder rule: while one
//! [`Connection`] to a resource is open, a second `open` of the same
//! resource name fails fast instead of queueing behind the holder.

pub mod mock;
pub mod socket;
#[cfg(feature = "vendor-visa")]
pub mod visa;

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use lazy_static::lazy_static;
use log::{debug, info};

use crate::error::{Result, ScopeError};
use crate::ScopeConfig;

lazy_static! {
    static ref CLAIMED: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
}

/// Blocking byte-level session primitives implemented by each backend.
///
/// Replies are pull-based: nothing is read from the instrument until one of
/// the `receive_*` methods asks for it, and every receive carries its own
/// deadline.
pub trait Transport: Send {
    /// Send one command; the backend appends the line terminator.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive one line-terminated ASCII reply, without the terminator.
    fn receive_line(&mut self, timeout: Duration) -> Result<Vec<u8>>;

    /// Receive exactly `n` bytes. Hitting the deadline first is a
    /// `Timeout` error even if some bytes already arrived.
    fn receive_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Receive up to `n` bytes, returning whatever arrived by the deadline.
    /// Used for block payloads, where a short transfer is data to report
    /// rather than a failure.
    fn receive_partial(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Which backend produced this session.
    fn backend(&self) -> Backend;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Vendor VISA library via `visa-rs` (`vendor-visa` feature).
    Visa,
    /// Portable raw-socket SCPI over TCP.
    Socket,
    /// Scripted in-memory transport for tests.
    Mock,
}

impl Backend {
    /// Candidate order tried at connect time. Fixed across runs.
    #[cfg(feature = "vendor-visa")]
    pub const PRIORITY: &'static [Backend] = &[Backend::Visa, Backend::Socket];
    #[cfg(not(feature = "vendor-visa"))]
    pub const PRIORITY: &'static [Backend] = &[Backend::Socket];

    fn open(self, config: &ScopeConfig) -> Result<Box<dyn Transport>> {
        match self {
            #[cfg(feature = "vendor-visa")]
            Backend::Visa => {
                visa::VisaSession::open(config).map(|s| Box::new(s) as Box<dyn Transport>)
            }
            Backend::Socket => {
                socket::SocketSession::open(config).map(|s| Box::new(s) as Box<dyn Transport>)
            }
            #[cfg(not(feature = "vendor-visa"))]
            Backend::Visa => Err(ScopeError::Connection(
                "vendor VISA backend not compiled in; rebuild with --features vendor-visa".into(),
            )),
            Backend::Mock => Err(ScopeError::Connection(
                "the mock backend is constructed directly, not opened by resource name".into(),
            )),
        }
    }
}

/// Membership in the process-wide claim registry. Dropping the claim
/// releases the resource name on every exit path.
struct ResourceClaim {
    resource: String,
}

impl ResourceClaim {
    fn take(resource: &str) -> Result<Self> {
        let mut held = CLAIMED.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(resource.to_string()) {
            return Err(ScopeError::Connection(format!(
                "resource {} is already claimed by another session",
                resource
            )));
        }
        Ok(Self {
            resource: resource.to_string(),
        })
    }
}

impl Drop for ResourceClaim {
    fn drop(&mut self) {
        let mut held = CLAIMED.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.resource);
    }
}

/// One live session to the instrument. Owns the backend transport and the
/// resource claim; both are released when the connection drops.
pub struct Connection {
    io: Box<dyn Transport>,
    _claim: Option<ResourceClaim>,
}

impl Connection {
    /// Claim the resource, then try each backend in [`Backend::PRIORITY`]
    /// until one opens it. Only connect-time `Connection` failures fall
    /// through to the next candidate.
    pub fn open(config: &ScopeConfig) -> Result<Self> {
        let claim = ResourceClaim::take(&config.resource)?;

        let mut failures: Vec<String> = Vec::new();
        for &backend in Backend::PRIORITY {
            match backend.open(config) {
                Ok(io) => {
                    info!("opened {} via {:?} backend", config.resource, backend);
                    return Ok(Self {
                        io,
                        _claim: Some(claim),
                    });
                }
                Err(ScopeError::Connection(reason)) => {
                    debug!("{:?} backend failed for {}: {}", backend, config.resource, reason);
                    failures.push(format!("{:?}: {}", backend, reason));
                }
                Err(other) => return Err(other),
            }
        }

        Err(ScopeError::Connection(format!(
            "no backend could open {} ({})",
            config.resource,
            failures.join("; ")
        )))
    }

    /// Wrap an already-constructed transport. Used with
    /// [`mock::MockTransport`] in tests; takes no resource claim.
    pub fn with_transport(io: Box<dyn Transport>) -> Self {
        Self { io, _claim: None }
    }

    pub fn backend(&self) -> Backend {
        self.io.backend()
    }

    /// Write a command with no reply expected.
    pub fn write(&mut self, command: &str) -> Result<()> {
        debug!("-> {}", command);
        self.io.send(command.as_bytes())
    }

    /// Send a query and receive one ASCII reply line, trimmed.
    pub fn ask(&mut self, command: &str, timeout: Duration) -> Result<String> {
        debug!("-> {}", command);
        self.io.send(command.as_bytes())?;
        let raw = self.io.receive_line(timeout)?;
        let text = String::from_utf8(raw)
            .map_err(|_| ScopeError::Protocol(format!("reply to {} is not UTF-8", command)))?;
        let text = text.trim().to_string();
        debug!("<- {}", text);
        Ok(text)
    }

    /// Byte-level access for the definite-length block reader.
    pub fn io(&mut self) -> &mut dyn Transport {
        self.io.as_mut()
    }
}
