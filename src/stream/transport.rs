//! Push-stream transport.
//!
//! # Responsibilities
//! - Open the long-lived bulk-fetch connection
//! - Turn the response body into a stream of SSE frames
//!
//! # Design Decisions
//! - Only a connect timeout applies; the stream itself may run for as long
//!   as the server keeps it open
//! - Dropping the returned stream closes the connection

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::collections::VecDeque;
use std::fmt::Display;

use crate::stream::error::StreamError;
use crate::stream::sse::{SseDecoder, SseFrame};

/// Frames read from an open push connection.
pub type EventStream = BoxStream<'static, Result<SseFrame, StreamError>>;

/// Opens push connections.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open one connection.
    async fn connect(&self) -> Result<EventStream, StreamError>;
}

/// HTTP Server-Sent Events transport.
#[derive(Clone)]
pub struct HttpPushTransport {
    client: Client,
    url: String,
    session_token: Option<String>,
}

impl HttpPushTransport {
    pub fn new(client: Client, url: impl Into<String>, session_token: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            session_token,
        }
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn connect(&self) -> Result<EventStream, StreamError> {
        let mut request = self.client.get(&self.url).header(ACCEPT, "text/event-stream");
        if let Some(token) = &self.session_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status(status.as_u16()));
        }

        tracing::debug!(url = %self.url, "Push stream connected");
        Ok(decode_sse(response.bytes_stream()).boxed())
    }
}

/// Decode a byte stream into SSE frames.
///
/// A read error is yielded once and ends the stream.
pub fn decode_sse<S, B, E>(bytes: S) -> impl Stream<Item = Result<SseFrame, StreamError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = (Box::pin(bytes), SseDecoder::new(), VecDeque::new(), false);

    stream::unfold(state, |(mut bytes, mut decoder, mut pending, done)| async move {
        loop {
            if let Some(frame) = pending.pop_front() {
                return Some((Ok(frame), (bytes, decoder, pending, done)));
            }
            if done {
                return None;
            }
            match bytes.next().await {
                Some(Ok(chunk)) => pending.extend(decoder.push(chunk.as_ref())),
                Some(Err(e)) => {
                    let error = StreamError::Transport(e.to_string());
                    return Some((Err(error), (bytes, decoder, pending, true)));
                }
                None => return None,
            }
        }
    })
}
