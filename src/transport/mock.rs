//! Scripted transport for tests: canned replies in, recorded commands out.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Result, ScopeError};
use crate::transport::{Backend, Transport};

/// Transport double that replays a scripted inbound stream.
///
/// Each queued reply is one inbound message; `receive_*` consumes the
/// current message byte by byte and moves to the next when it is empty.
/// Asking for bytes when nothing is queued behaves like a timeout, which
/// is also how truncated block transfers are simulated.
///
/// Sent commands are recorded in a shared log; grab a handle with
/// [`command_log`](MockTransport::command_log) before boxing the transport.
#[derive(Default)]
pub struct MockTransport {
    replies: VecDeque<Vec<u8>>,
    pending: Vec<u8>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an ASCII reply line; the line terminator is appended.
    pub fn push_reply(&mut self, line: &str) {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.replies.push_back(bytes);
    }

    /// Queue raw bytes, e.g. a definite-length block with its echo prefix.
    pub fn push_raw(&mut self, bytes: Vec<u8>) {
        self.replies.push_back(bytes);
    }

    /// Shared handle to the log of sent commands, in order, terminators
    /// stripped.
    pub fn command_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.sent)
    }

    fn refill(&mut self) -> bool {
        if self.pending.is_empty() {
            if let Some(next) = self.replies.pop_front() {
                self.pending = next;
            }
        }
        !self.pending.is_empty()
    }

    fn take(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.pending.len());
        self.pending.drain(..n).collect()
    }
}

impl Transport for MockTransport {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(String::from_utf8_lossy(data).trim_end().to_string());
        Ok(())
    }

    fn receive_line(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        if !self.refill() {
            return Err(ScopeError::Timeout(timeout));
        }
        if let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            Ok(line)
        } else {
            Ok(std::mem::take(&mut self.pending))
        }
    }

    fn receive_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            if !self.refill() {
                return Err(ScopeError::Timeout(timeout));
            }
            let need = n - out.len();
            let chunk = self.take(need);
            out.extend(chunk);
        }
        Ok(out)
    }

    fn receive_partial(&mut self, n: usize, _timeout: Duration) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            if !self.refill() {
                break;
            }
            let need = n - out.len();
            let chunk = self.take(need);
            out.extend(chunk);
        }
        Ok(out)
    }

    fn backend(&self) -> Backend {
        Backend::Mock
    }
}
