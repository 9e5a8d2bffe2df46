//! Line framing for raw subprocess output.
//!
//! The agent writes newline-delimited JSON, but the OS hands us arbitrary
//! chunk boundaries. One framer instance lives per active subprocess and
//! carries the partial trailing line across chunks.

/// Stateful buffer turning raw chunks into complete lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line completed by it, in order.
    /// The trailing fragment (no newline yet) stays buffered.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let rest = self.buf.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.buf, rest);
            line.truncate(line.len() - 1); // drop the newline
            if line.ends_with('\r') {
                line.truncate(line.len() - 1);
            }
            lines.push(line);
        }
        lines
    }

    /// Consume the framer and return any unterminated final fragment.
    pub fn finish(self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf)
        }
    }
}
