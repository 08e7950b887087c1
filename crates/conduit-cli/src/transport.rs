//! Newline-delimited JSON-RPC over stdin/stdout.
//!
//! One JSON payload per input line; one line per non-null output. Replies to
//! our own requests are routed to the [`PendingResponseBag`] before the rest
//! of the payload reaches the dispatcher.

use anyhow::{Context, Result};
use conduit_jsonrpc::{JsonRpcHandler, KeepAliveSession, ParsedMessage, PendingResponseBag};
use conduit_session::Session;
use conduit_types::{JsonRpcMessage, JsonRpcReply, JsonRpcRequest, RequestId};
use serde_json::Map;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Writes outbound messages, recording each on the session's server stream
/// under an increasing numeric event id.
pub struct Outbox {
    session: Session,
    stream: Uuid,
    next_event_id: u64,
}

impl Outbox {
    /// Continue on the session's first server stream, or open one. Numbering
    /// resumes after the highest numeric event id already on the stream.
    pub fn open(mut session: Session) -> Result<Self> {
        let existing = session
            .streams()
            .iter()
            .find(|stream| !stream.is_client_initiated())
            .map(|stream| {
                let highest = stream.events().filter_map(|e| e.id.parse::<u64>().ok()).max();
                (stream.id(), highest)
            });
        let (stream, highest_event_id) = match existing {
            Some(found) => found,
            None => (session.add_new_stream(false)?, None),
        };
        Ok(Self {
            session,
            stream,
            next_event_id: highest_event_id.map_or(1, |id| id + 1),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn stream_id(&self) -> Uuid {
        self.stream
    }

    async fn send<W: AsyncWrite + Unpin>(&mut self, writer: &mut W, text: &str) -> Result<()> {
        let event_id = self.next_event_id.to_string();
        self.next_event_id += 1;
        if let Err(e) = self.session.add_event_on_stream(self.stream, &event_id, text) {
            tracing::warn!("Failed to record event {event_id}: {e}");
        }
        write_line(writer, text).await
    }

    /// Re-send what was recorded after `event_id`. Returns how many messages
    /// were written; zero when the id is unknown or no longer retained.
    pub async fn replay_after<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut W,
        event_id: &str,
    ) -> Result<usize> {
        let events = self.session.get_events_after_id(event_id)?;
        for event in &events {
            write_line(writer, &event.event).await?;
        }
        Ok(events.len())
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> Result<()> {
    writer.write_all(text.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await.context("Failed to flush output")
}

/// The serving loop for one connection.
pub struct StdioServer {
    handler: JsonRpcHandler,
    outbox: Outbox,
    pending: PendingResponseBag,
    keepalive: Option<KeepAliveSession>,
    sweep_interval: Duration,
    pings_sent: u64,
}

impl StdioServer {
    pub fn new(
        handler: JsonRpcHandler,
        outbox: Outbox,
        pending: PendingResponseBag,
        keepalive: Option<KeepAliveSession>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            handler,
            outbox,
            pending,
            keepalive,
            sweep_interval,
            pings_sent: 0,
        }
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    #[cfg(test)]
    pub fn pending(&self) -> &PendingResponseBag {
        &self.pending
    }

    /// Serve until input closes or `cancel` fires. Pending requests and
    /// keep-alive pings are serviced every sweep interval.
    pub async fn run<R, W>(
        &mut self,
        input: R,
        mut output: W,
        cancel: CancellationToken,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Shutting down");
                    break;
                }
                line = lines.next_line() => {
                    match line.context("Failed to read input")? {
                        Some(line) => self.handle_line(&line, &mut output).await?,
                        None => {
                            tracing::info!("Input closed");
                            break;
                        }
                    }
                }
                _ = sweep.tick() => self.sweep(&mut output).await?,
            }
        }

        if let Some(keepalive) = &mut self.keepalive {
            keepalive.stop();
        }
        if !self.pending.is_empty() {
            tracing::debug!("Abandoning {} pending request(s)", self.pending.len());
            self.pending.clear();
        }
        Ok(())
    }

    /// Handle one input line, writing every reply it produces.
    pub async fn handle_line<W: AsyncWrite + Unpin>(
        &mut self,
        line: &str,
        output: &mut W,
    ) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        if self.handler.is_initialize_request(line) {
            tracing::info!("Client started the initialize handshake");
            if let Some(keepalive) = &mut self.keepalive {
                keepalive.start();
            }
        }

        let outputs = match self.handler.factory().create(line) {
            Ok(messages) => {
                let rest = route_replies(&mut self.pending, messages);
                self.handler.process_messages(rest)
            }
            Err(_) => self.handler.process(line),
        };
        for text in outputs.flatten() {
            self.outbox.send(output, &text).await?;
        }
        Ok(())
    }

    /// Time out overdue requests and send a keep-alive ping if one is due.
    pub async fn sweep<W: AsyncWrite + Unpin>(&mut self, output: &mut W) -> Result<()> {
        let expired = self
            .pending
            .gc_with(|id| tracing::warn!("Client did not answer request {id} in time"));
        if expired > 0 {
            tracing::debug!("Timed out {expired} pending request(s)");
        }

        let due = self
            .keepalive
            .as_mut()
            .is_some_and(|keepalive| keepalive.tick(|| {}));
        if due {
            self.send_ping(output).await?;
        }
        Ok(())
    }

    /// Send a `ping` request to the client and wait for its reply in the bag.
    pub async fn send_ping<W: AsyncWrite + Unpin>(
        &mut self,
        output: &mut W,
    ) -> Result<RequestId> {
        self.pings_sent += 1;
        let id = RequestId::from(format!("ping-{}", self.pings_sent));

        let answered = id.clone();
        self.pending.track(id.clone(), move |reply| {
            if reply.is_error() {
                tracing::debug!("Ping {answered} failed");
            } else {
                tracing::debug!("Ping {answered} answered");
            }
        });

        let request = JsonRpcMessage::from(JsonRpcRequest::new(id.clone(), "ping", Map::new()));
        let text = request.to_json().context("Failed to encode ping")?;
        self.outbox.send(output, &text).await?;
        Ok(id)
    }
}

/// Resolve client replies against the bag and return everything else.
fn route_replies(
    pending: &mut PendingResponseBag,
    messages: Vec<ParsedMessage>,
) -> Vec<ParsedMessage> {
    messages
        .into_iter()
        .filter_map(|message| {
            let reply: JsonRpcReply = match message {
                ParsedMessage::Message(JsonRpcMessage::Response(response)) => response.into(),
                ParsedMessage::Message(JsonRpcMessage::Error(error)) => error.into(),
                other => return Some(other),
            };
            let id = reply.id().clone();
            if !pending.resolve(reply) {
                tracing::debug!("Dropping reply {id} with no pending request");
            }
            None
        })
        .collect()
}
