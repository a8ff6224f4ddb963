//! IEEE-488.2 definite-length block reader.
//!
//! Wire form: `#<d><n1..nd><payload><terminator>` where `<d>` is a single
//! ASCII digit (1 to 9) giving how many length digits follow, and the
//! length digits give the exact payload byte count. The header is read
//! field by field, so the payload length always comes from the header and
//! never from a fixed-size read; waveform replies prefix the block with an
//! ASCII echo (`C1:WF DAT2,`) that is skipped while scanning for the
//! marker.

use std::time::Duration;

use crate::error::{Result, ScopeError};
use crate::transport::Transport;

/// Longest ASCII echo tolerated before the `#` marker.
const MAX_PREFIX: usize = 64;

/// A received block. A payload shorter than `declared_len` means the
/// transfer was cut off mid-stream (usually a timeout); the caller decides
/// how to report that.
#[derive(Debug)]
pub struct Block {
    pub payload: Vec<u8>,
    pub declared_len: usize,
}

impl Block {
    pub fn is_truncated(&self) -> bool {
        self.payload.len() < self.declared_len
    }
}

/// Read one definite-length block from the transport.
pub fn read_block(io: &mut dyn Transport, timeout: Duration) -> Result<Block> {
    // Scan past the echo prefix to the marker.
    let mut skipped = 0usize;
    loop {
        let byte = io.receive_exact(1, timeout)?;
        if byte[0] == b'#' {
            break;
        }
        skipped += 1;
        if skipped > MAX_PREFIX {
            return Err(ScopeError::Protocol(
                "no definite-length block marker in reply".into(),
            ));
        }
    }

    let digit_count = io.receive_exact(1, timeout)?[0];
    if !digit_count.is_ascii_digit() || digit_count == b'0' {
        return Err(ScopeError::Protocol(format!(
            "bad digit-count byte {:#04x} in block header",
            digit_count
        )));
    }
    let n_digits = (digit_count - b'0') as usize;

    let length_field = io.receive_exact(n_digits, timeout)?;
    let declared_len = std::str::from_utf8(&length_field)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            ScopeError::Protocol(format!(
                "bad block length field {:?}",
                String::from_utf8_lossy(&length_field)
            ))
        })?;

    let payload = io.receive_partial(declared_len, timeout)?;

    if payload.len() == declared_len {
        // Consume the trailing terminator if the instrument sent one.
        let _ = io.receive_partial(2, Duration::from_millis(50));
    }

    Ok(Block {
        payload,
        declared_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    fn reply_with_block(prefix: &str, digits: &str, payload: &[u8]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(prefix.as_bytes());
        raw.push(b'#');
        raw.extend_from_slice(format!("{}", digits.len()).as_bytes());
        raw.extend_from_slice(digits.as_bytes());
        raw.extend_from_slice(payload);
        raw.extend_from_slice(b"\n\n");
        raw
    }

    #[test]
    fn reads_single_digit_length_field() {
        let mut io = MockTransport::new();
        io.push_raw(reply_with_block("", "5", &[1, 2, 3, 4, 5]));
        let block = read_block(&mut io, Duration::from_secs(1)).unwrap();
        assert_eq!(block.declared_len, 5);
        assert_eq!(block.payload, vec![1, 2, 3, 4, 5]);
        assert!(!block.is_truncated());
    }

    #[test]
    fn reads_wide_length_field_and_echo_prefix() {
        let payload: Vec<u8> = (0..200).map(|i| (i % 251) as u8).collect();
        let mut io = MockTransport::new();
        io.push_raw(reply_with_block("C1:WF DAT2,", "000000200", &payload));
        let block = read_block(&mut io, Duration::from_secs(1)).unwrap();
        assert_eq!(block.declared_len, 200);
        assert_eq!(block.payload, payload);
    }

    #[test]
    fn consumes_exactly_the_declared_payload() {
        // Two blocks back to back: reading the first must not eat into the
        // second.
        let mut io = MockTransport::new();
        let mut raw = reply_with_block("", "003", &[9, 9, 9]);
        raw.extend_from_slice(&reply_with_block("", "002", &[7, 7]));
        io.push_raw(raw);
        let first = read_block(&mut io, Duration::from_secs(1)).unwrap();
        assert_eq!(first.payload, vec![9, 9, 9]);
        let second = read_block(&mut io, Duration::from_secs(1)).unwrap();
        assert_eq!(second.payload, vec![7, 7]);
    }

    #[test]
    fn short_payload_is_reported_as_truncated() {
        let mut io = MockTransport::new();
        let mut raw = Vec::new();
        raw.extend_from_slice(b"#3500");
        raw.extend_from_slice(&vec![0u8; 123]);
        io.push_raw(raw);
        let block = read_block(&mut io, Duration::from_secs(1)).unwrap();
        assert_eq!(block.declared_len, 500);
        assert_eq!(block.payload.len(), 123);
        assert!(block.is_truncated());
    }

    #[test]
    fn zero_digit_count_is_a_protocol_error() {
        let mut io = MockTransport::new();
        io.push_raw(b"#0".to_vec());
        assert!(matches!(
            read_block(&mut io, Duration::from_secs(1)),
            Err(ScopeError::Protocol(_))
        ));
    }

    #[test]
    fn missing_marker_is_a_protocol_error() {
        let mut io = MockTransport::new();
        io.push_raw(vec![b'x'; 200]);
        assert!(matches!(
            read_block(&mut io, Duration::from_secs(1)),
            Err(ScopeError::Protocol(_))
        ));
    }
}
