//! Typed bulk-fetch events and log entries.

use chrono::{DateTime, Local, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stream::error::StreamError;
use crate::stream::sse::SseFrame;

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    #[serde(rename = "log")]
    Info,
    Error,
    Success,
}

/// One line of the visible operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogKind::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogKind::Error, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogKind::Success, message)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self.timestamp.with_timezone(&Local).format("%H:%M:%S");
        match self.kind {
            LogKind::Info => write!(f, "[{time}] ℹ {}", self.message),
            LogKind::Error => write!(f, "[{time}] ✗ {}", self.message),
            LogKind::Success => write!(f, "[{time}] ✓ {}", self.message),
        }
    }
}

/// Processed/failed counters reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStats {
    pub processed: u64,
    pub failed: u64,
}

#[derive(Deserialize)]
struct MessagePayload {
    message: String,
}

#[derive(Deserialize)]
struct ProgressPayload {
    percent: f64,
    processed: u64,
    failed: u64,
}

/// A decoded server-push event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Log { message: String },
    Error { message: String },
    Progress { percent: f64, stats: FetchStats },
    Complete(FetchStats),
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Log { .. } => "log",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Progress { .. } => "progress",
            StreamEvent::Complete(_) => "complete",
        }
    }

    /// Decode a frame. Unknown event names yield `Ok(None)`.
    pub fn decode(frame: &SseFrame) -> Result<Option<Self>, StreamError> {
        let event = match frame.event.as_str() {
            "log" => {
                let payload: MessagePayload = parse(frame)?;
                StreamEvent::Log { message: payload.message }
            }
            "error" => {
                let payload: MessagePayload = parse(frame)?;
                StreamEvent::Error { message: payload.message }
            }
            "progress" => {
                let payload: ProgressPayload = parse(frame)?;
                StreamEvent::Progress {
                    percent: payload.percent,
                    stats: FetchStats {
                        processed: payload.processed,
                        failed: payload.failed,
                    },
                }
            }
            "complete" => StreamEvent::Complete(parse(frame)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

fn parse<T: DeserializeOwned>(frame: &SseFrame) -> Result<T, StreamError> {
    serde_json::from_str(&frame.data).map_err(|e| StreamError::Malformed {
        event: frame.event.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str, data: &str) -> SseFrame {
        SseFrame {
            event: event.into(),
            data: data.into(),
            id: None,
        }
    }

    #[test]
    fn test_decode_each_event() {
        assert_eq!(
            StreamEvent::decode(&frame("log", r#"{"message":"Fetching artists"}"#)).unwrap(),
            Some(StreamEvent::Log { message: "Fetching artists".into() })
        );
        assert_eq!(
            StreamEvent::decode(&frame("error", r#"{"message":"Track 12 not found"}"#)).unwrap(),
            Some(StreamEvent::Error { message: "Track 12 not found".into() })
        );
        assert_eq!(
            StreamEvent::decode(&frame("progress", r#"{"percent":12.5,"processed":10,"failed":1}"#)).unwrap(),
            Some(StreamEvent::Progress {
                percent: 12.5,
                stats: FetchStats { processed: 10, failed: 1 },
            })
        );
        assert_eq!(
            StreamEvent::decode(&frame("complete", r#"{"processed":78,"failed":3}"#)).unwrap(),
            Some(StreamEvent::Complete(FetchStats { processed: 78, failed: 3 }))
        );
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        assert_eq!(StreamEvent::decode(&frame("message", "hello")).unwrap(), None);
    }

    #[test]
    fn test_malformed_payload() {
        let err = StreamEvent::decode(&frame("progress", r#"{"percent":"ten"}"#)).unwrap_err();
        assert!(matches!(err, StreamError::Malformed { ref event, .. } if event == "progress"));
    }

    #[test]
    fn test_log_entry_display() {
        let entry = LogEntry::success("Operation complete!");
        let line = entry.to_string();
        assert!(line.starts_with('['));
        assert!(line.ends_with("✓ Operation complete!"));
    }

    #[test]
    fn test_log_kind_wire_names() {
        assert_eq!(serde_json::to_string(&LogKind::Info).unwrap(), "\"log\"");
        assert_eq!(serde_json::to_string(&LogKind::Success).unwrap(), "\"success\"");
    }
}
