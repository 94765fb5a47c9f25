//! Incremental Server-Sent Events decoder.
//!
//! Bytes arrive in arbitrary chunks; complete lines are parsed as they
//! appear and an event is emitted on each blank line. Handles LF, CRLF and
//! CR line endings, multi-line `data`, `id`, and `:` comments. A trailing
//! event not terminated by a blank line is never emitted.
//!
//! A UTF-8 byte order mark at the start of the stream is skipped. A line
//! longer than the configured limit is dropped along with the event it
//! belongs to.

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Default longest accepted line.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name (`message` when the server sent none).
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Last event id seen on the stream.
    pub id: Option<String>,
}

#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    max_line: usize,
    bom_checked: bool,
    discarding: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that drops lines longer than `max_line` bytes.
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            event: None,
            data: Vec::new(),
            id: None,
            max_line,
            bom_checked: false,
            discarding: false,
        }
    }

    /// Feed a chunk, returning every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        if !self.bom_checked {
            // The mark may itself be split across chunks.
            if self.buffer.len() < BOM.len() && BOM.starts_with(&self.buffer) {
                return frames;
            }
            if self.buffer.starts_with(BOM) {
                self.buffer.drain(..BOM.len());
            }
            self.bom_checked = true;
        }

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n' || *b == b'\r') {
            let terminator_len = match (self.buffer[pos], self.buffer.get(pos + 1).copied()) {
                (b'\r', Some(b'\n')) => 2,
                // CR at the end of the chunk may be the first half of CRLF.
                (b'\r', None) => break,
                _ => 1,
            };

            let line: Vec<u8> = self.buffer.drain(..pos).collect();
            self.buffer.drain(..terminator_len);

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_line {
                self.drop_oversized();
                continue;
            }
            if let Some(frame) = self.process_line(&String::from_utf8_lossy(&line)) {
                frames.push(frame);
            }
        }

        if !self.discarding && self.buffer.len() > self.max_line {
            self.drop_oversized();
            self.discarding = true;
        }
        if self.discarding {
            self.clear_partial_line();
        }

        frames
    }

    /// Forget the unterminated tail, keeping a pending CR so the next chunk
    /// still ends the line.
    fn clear_partial_line(&mut self) {
        let pending_cr = self.buffer.last() == Some(&b'\r');
        self.buffer.clear();
        if pending_cr {
            self.buffer.push(b'\r');
        }
    }

    fn drop_oversized(&mut self) {
        tracing::warn!(limit = self.max_line, "Dropping oversized stream line");
        self.event = None;
        self.data.clear();
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.find(':') {
            Some(i) => {
                let value = &line[i + 1..];
                (&line[..i], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }

        let data = self.data.join("\n");
        self.data.clear();

        Some(SseFrame {
            event: event
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "message".to_string()),
            data,
            id: self.id.clone(),
        })
    }
}
