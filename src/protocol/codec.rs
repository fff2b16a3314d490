//! Line framing for the device link.
//!
//! The rig speaks newline-delimited text. Bytes arrive in arbitrary chunks from
//! the serial read loop; `LineDecoder` reassembles them into lines and
//! `DeviceEvent::decode` maps each line onto an event.

/// Token the device sends after finishing one cycle.
pub const CYCLE_DONE_TOKEN: &str = "done";

/// Longest line kept in the assembly buffer before it is flushed unterminated.
pub const MAX_LINE_LEN: usize = 1024;

/// A decoded message from the device session worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The device reported one completed cycle.
    CycleCompleted,
    /// Any other non-empty line, delivered verbatim (trimmed).
    Unrecognized(String),
    /// Terminal event: the link failed mid-session and the read loop has ended.
    ConnectionLost(String),
}

impl DeviceEvent {
    /// Decode one received line. Blank lines carry no event.
    pub fn decode(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            None
        } else if line == CYCLE_DONE_TOKEN {
            Some(DeviceEvent::CycleCompleted)
        } else {
            Some(DeviceEvent::Unrecognized(line.to_string()))
        }
    }
}

/// Encode the session header sent once when the worker starts.
pub fn encode_target(target: u8) -> Vec<u8> {
    format!("{target}\n").into_bytes()
}

/// Incremental splitter turning raw serial chunks into text lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    assembling: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                lines.push(self.take_line());
                continue;
            }
            self.assembling.push(byte);
            if self.assembling.len() >= MAX_LINE_LEN {
                log::debug!(
                    "line decoder: flushing {} bytes without terminator",
                    self.assembling.len()
                );
                lines.push(self.take_line());
            }
        }
        lines
    }

    /// Bytes received after the last newline.
    pub fn pending(&self) -> usize {
        self.assembling.len()
    }

    fn take_line(&mut self) -> String {
        if self.assembling.last() == Some(&b'\r') {
            self.assembling.pop();
        }
        let line = String::from_utf8_lossy(&self.assembling).into_owned();
        self.assembling.clear();
        line
    }
}
