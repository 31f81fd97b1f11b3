//! Bounded-time read-until-match over a duplex byte stream.
//!
//! The blocking reads happen on the stream's dedicated reader thread (see
//! [`crate::reader`]); [`Expector::expect`] polls the channel in short slices
//! so a deadline can preempt a wait without tearing down the stream. A single
//! timeout is a hard failure for that call; retrying is the caller's business.

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

const POLL_SLICE: Duration = Duration::from_millis(50);

/// A successful pattern wait.
#[derive(Debug, Clone)]
pub struct ExpectMatch {
    /// Everything read from the stream up to and including the matched span.
    pub text: String,
    /// The span the pattern itself matched.
    pub matched: String,
    /// Capture groups `1..n` of the pattern, in order.
    pub groups: Vec<Option<String>>,
}

/// Accumulates stream output and waits for patterns in it.
///
/// Bytes consumed from the stream are not replayable. On a match the buffer
/// is consumed up to and including the matched span, so a later wait cannot
/// match the same occurrence; on a timeout the whole buffer is drained into
/// the error for diagnostics.
pub struct Expector {
    rx: Receiver<Vec<u8>>,
    buffer: String,
}

impl Expector {
    /// Wrap the receiving end of a stream's reader channel.
    pub fn new(rx: Receiver<Vec<u8>>) -> Self {
        Expector {
            rx,
            buffer: String::new(),
        }
    }

    /// Wait until `pattern` matches the accumulated output, or until `timeout`
    /// elapses.
    pub async fn expect(&mut self, pattern: &Regex, timeout: Duration) -> Result<ExpectMatch> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(found) = self.take_match(pattern) {
                return Ok(found);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(Error::Timeout {
                    timeout,
                    buffered: std::mem::take(&mut self.buffer),
                });
            }

            let slice = POLL_SLICE.min(deadline - now);
            match self.rx.recv_timeout(slice) {
                Ok(data) => self.buffer.push_str(&String::from_utf8_lossy(&data)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::connection(format!(
                        "stream closed while waiting for /{pattern}/, buffered: {:?}",
                        self.buffer
                    )));
                }
            }
        }
    }

    /// Find `pattern` in the buffer and consume through the end of the match.
    fn take_match(&mut self, pattern: &Regex) -> Option<ExpectMatch> {
        let (end, matched, groups) = {
            let caps = pattern.captures(&self.buffer)?;
            let whole = caps.get(0)?;
            let groups = (1..caps.len())
                .map(|i| caps.get(i).map(|m| m.as_str().to_string()))
                .collect();
            (whole.end(), whole.as_str().to_string(), groups)
        };

        let text: String = self.buffer.drain(..end).collect();
        Some(ExpectMatch {
            text,
            matched,
            groups,
        })
    }
}
