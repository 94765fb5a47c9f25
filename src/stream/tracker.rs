//! Bulk-fetch progress tracker.
//!
//! # States
//! - Idle: no connection
//! - Connecting: connection requested, not yet established
//! - Streaming: events are being applied
//! - Complete: the server reported completion
//! - Errored: the connection failed before completion
//!
//! # State Transitions
//! ```text
//! Idle → Connecting:        start_fetch
//! Connecting → Streaming:   transport connected
//! Streaming → Complete:     `complete` event
//! Connecting/Streaming → Errored: transport error or early close
//! Connecting/Streaming → Idle:    stop_fetch
//! Complete/Errored → Connecting:  start_fetch (log and counters reset)
//! ```
//!
//! # Design Decisions
//! - At most one connection: `start_fetch` while fetching does nothing
//! - Each session owns a cancellation token and an id; a driver task
//!   whose session is no longer current cannot touch the state
//! - Failures are user visible through the log; nothing retries

use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::observability::metrics;
use crate::stream::error::StreamError;
use crate::stream::events::{FetchStats, LogEntry, StreamEvent};
use crate::stream::transport::PushTransport;

const CONNECTING_MESSAGE: &str = "Initializing connection to metadata service...";
const CONNECTED_MESSAGE: &str = "Connected. Waiting for server updates...";

/// Lifecycle phase of the tracked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamPhase {
    Idle,
    Connecting,
    Streaming,
    Complete,
    Errored,
}

/// Read view of the tracked operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerSnapshot {
    pub phase: StreamPhase,
    pub logs: Vec<LogEntry>,
    pub progress: f64,
    pub stats: FetchStats,
    pub is_fetching: bool,
    pub is_complete: bool,
    pub session_id: Option<Uuid>,
}

impl Default for TrackerSnapshot {
    fn default() -> Self {
        Self {
            phase: StreamPhase::Idle,
            logs: Vec::new(),
            progress: 0.0,
            stats: FetchStats::default(),
            is_fetching: false,
            is_complete: false,
            session_id: None,
        }
    }
}

#[derive(Default)]
struct Session {
    view: TrackerSnapshot,
    cancel: Option<CancellationToken>,
}

impl Session {
    fn is_current(&self, id: Uuid) -> bool {
        self.view.session_id == Some(id) && self.view.is_fetching
    }

    fn close_connection(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.view.is_fetching = false;
    }
}

/// Drives one bulk operation reported over a push stream.
pub struct StreamProgressTracker {
    transport: Arc<dyn PushTransport>,
    state: Arc<watch::Sender<Session>>,
}

impl StreamProgressTracker {
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            transport,
            state: Arc::new(state),
        }
    }

    /// Open the push connection unless one is already active.
    ///
    /// Returns `true` if a new session was started. Must be called within a
    /// Tokio runtime.
    pub fn start_fetch(&self) -> bool {
        let session_id = Uuid::new_v4();
        let token = CancellationToken::new();

        let started = self.state.send_if_modified(|session| {
            if session.view.is_fetching {
                return false;
            }
            session.view = TrackerSnapshot {
                phase: StreamPhase::Connecting,
                logs: vec![LogEntry::info(CONNECTING_MESSAGE)],
                is_fetching: true,
                session_id: Some(session_id),
                ..TrackerSnapshot::default()
            };
            session.cancel = Some(token.clone());
            true
        });

        if !started {
            tracing::debug!("Bulk fetch already active, ignoring start");
            return false;
        }

        tracing::info!(session = %session_id, "Starting bulk fetch");
        metrics::record_stream_connection();
        tokio::spawn(drive(
            Arc::clone(&self.transport),
            Arc::clone(&self.state),
            session_id,
            token,
        ));
        true
    }

    /// Close the connection if open. The log and counters stay visible.
    pub fn stop_fetch(&self) {
        let stopped = self.state.send_if_modified(|session| {
            let was_active = session.cancel.is_some() || session.view.is_fetching;
            session.close_connection();
            if matches!(session.view.phase, StreamPhase::Connecting | StreamPhase::Streaming) {
                session.view.phase = StreamPhase::Idle;
            }
            was_active
        });

        if stopped {
            tracing::info!("Bulk fetch stopped");
        }
    }

    /// Reset the log, progress, counters and completion flag without
    /// touching the connection.
    pub fn clear_logs(&self) {
        self.state.send_modify(|session| {
            let view = &mut session.view;
            view.logs.clear();
            view.progress = 0.0;
            view.stats = FetchStats::default();
            view.is_complete = false;
            if matches!(view.phase, StreamPhase::Complete | StreamPhase::Errored) {
                view.phase = StreamPhase::Idle;
            }
        });
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.state.borrow().view.clone()
    }

    pub fn is_fetching(&self) -> bool {
        self.state.borrow().view.is_fetching
    }

    pub fn is_complete(&self) -> bool {
        self.state.borrow().view.is_complete
    }

    /// Follow state changes.
    pub fn subscribe(&self) -> TrackerUpdates {
        TrackerUpdates {
            rx: self.state.subscribe(),
        }
    }
}

impl Drop for StreamProgressTracker {
    fn drop(&mut self) {
        if let Some(token) = &self.state.borrow().cancel {
            token.cancel();
        }
    }
}

/// Receiver side of [`StreamProgressTracker::subscribe`].
pub struct TrackerUpdates {
    rx: watch::Receiver<Session>,
}

impl TrackerUpdates {
    pub fn snapshot(&self) -> TrackerSnapshot {
        self.rx.borrow().view.clone()
    }

    /// Wait for the next change. `None` once the tracker is gone.
    pub async fn changed(&mut self) -> Option<TrackerSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().view.clone())
    }

    /// Wait until `predicate` holds for the current state.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&TrackerSnapshot) -> bool,
    ) -> Option<TrackerSnapshot> {
        let session = self.rx.wait_for(|session| predicate(&session.view)).await.ok()?;
        Some(session.view.clone())
    }
}

async fn drive(
    transport: Arc<dyn PushTransport>,
    state: Arc<watch::Sender<Session>>,
    session_id: Uuid,
    token: CancellationToken,
) {
    let connected = tokio::select! {
        _ = token.cancelled() => return,
        result = transport.connect() => result,
    };

    let mut events = match connected {
        Ok(events) => events,
        Err(e) => {
            interrupt(&state, session_id, &e);
            return;
        }
    };

    let streaming = state.send_if_modified(|session| {
        if !session.is_current(session_id) {
            return false;
        }
        session.view.phase = StreamPhase::Streaming;
        session.view.logs.push(LogEntry::info(CONNECTED_MESSAGE));
        true
    });
    if !streaming {
        return;
    }

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = events.next() => next,
        };

        match next {
            Some(Ok(frame)) => match StreamEvent::decode(&frame) {
                Ok(Some(event)) => {
                    if apply(&state, session_id, event) {
                        break;
                    }
                }
                Ok(None) => tracing::trace!(event = %frame.event, "Ignoring unknown stream event"),
                Err(e) => tracing::warn!(session = %session_id, error = %e, "Discarding stream event"),
            },
            Some(Err(e)) => {
                interrupt(&state, session_id, &e);
                break;
            }
            None => {
                let closed = StreamError::Transport("stream closed before completion".to_string());
                interrupt(&state, session_id, &closed);
                break;
            }
        }
    }

    tracing::debug!(session = %session_id, "Push connection closed");
}

/// Apply one event. Returns `true` when the driver should stop reading.
fn apply(state: &watch::Sender<Session>, session_id: Uuid, event: StreamEvent) -> bool {
    metrics::record_stream_event(event.name());
    let mut finished = false;

    state.send_if_modified(|session| {
        if !session.is_current(session_id) {
            finished = true;
            return false;
        }

        let view = &mut session.view;
        match event {
            StreamEvent::Log { message } => view.logs.push(LogEntry::info(message)),
            StreamEvent::Error { message } => view.logs.push(LogEntry::error(message)),
            StreamEvent::Progress { percent, stats } => {
                view.progress = percent;
                view.stats = stats;
            }
            StreamEvent::Complete(stats) => {
                view.stats = stats;
                view.is_complete = true;
                view.phase = StreamPhase::Complete;
                view.logs.push(LogEntry::success(format!(
                    "Operation complete! Processed: {}, Failed: {}",
                    stats.processed, stats.failed
                )));
                session.close_connection();
                finished = true;
                tracing::info!(
                    session = %session_id,
                    processed = stats.processed,
                    failed = stats.failed,
                    "Bulk fetch complete"
                );
            }
        }
        true
    });

    finished
}

/// Tear the session down after a transport failure, unless it already
/// completed or was replaced.
fn interrupt(state: &watch::Sender<Session>, session_id: Uuid, error: &StreamError) {
    let interrupted = state.send_if_modified(|session| {
        if !session.is_current(session_id) || session.view.is_complete {
            return false;
        }
        session
            .view
            .logs
            .push(LogEntry::error(format!("Connection interrupted: {error}")));
        session.close_connection();
        session.view.phase = StreamPhase::Errored;
        true
    });

    if interrupted {
        tracing::warn!(session = %session_id, error = %error, "Bulk fetch interrupted");
    }
}
