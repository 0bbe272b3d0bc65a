//! Client Connection Pumps
//!
//! Each connection runs two tasks:
//!
//! - the **reader** receives one frame at a time and hands data frames to
//!   [`ConnectionHub::broadcast`];
//! - the **writer** drains the client's outbound queue into the socket. It is
//!   the only task that ever sends on the socket.
//!
//! Whichever pump stops first brings the other one down: a finished reader
//! unregisters the client (closing the queue, which ends the writer), and a
//! finished writer aborts the reader. Removal from the hub from elsewhere
//! (a slow-consumer prune) ends the session too, even when the writer is
//! blocked on a peer that stopped reading.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

use super::hub::{ClientHandle, ClientId, ConnectionHub};
use super::payload::Payload;
use crate::auth::Identity;

/// How long the writer gets to flush its close frame after the reader stops
const WRITER_GRACE: Duration = Duration::from_secs(5);

/// Why the reader pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadExit {
    /// Peer sent a close frame
    PeerClosed,
    /// Stream ended without a close frame
    StreamEnded,
    /// Receive failed
    ReceiveError,
    /// Nothing received within the idle timeout
    IdleTimeout,
}

/// Why the writer pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteExit {
    /// Outbound queue closed by the hub
    QueueClosed,
    /// Socket send failed
    SendFailed,
}

/// One authenticated connection before its pumps start
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    identity: Identity,
    outbound: mpsc::Receiver<Payload>,
    /// Resolves once the hub drops this client's handle
    evicted: oneshot::Receiver<()>,
}

impl Client {
    /// Create a client with a bounded outbound queue
    ///
    /// Returns the client (consumer side) and the handle to register with the
    /// hub (producer side).
    pub fn new(identity: Identity, queue_capacity: usize) -> (Self, ClientHandle) {
        let id = Uuid::new_v4();
        let (sender, outbound) = mpsc::channel(queue_capacity.max(1));
        let (evict, evicted) = oneshot::channel();
        let handle = ClientHandle::new(id, identity.clone(), sender, evict);

        (
            Self {
                id,
                identity,
                outbound,
                evicted,
            },
            handle,
        )
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Give up the pumps and take the outbound queue, for callers that
    /// drive their own writer
    pub fn into_outbound(self) -> mpsc::Receiver<Payload> {
        self.outbound
    }

    #[cfg(test)]
    pub(crate) fn outbound_mut(&mut self) -> &mut mpsc::Receiver<Payload> {
        &mut self.outbound
    }

    /// Run both pumps over an upgraded socket until the connection closes
    pub async fn run(self, socket: WebSocket, hub: Arc<ConnectionHub>) {
        let (sink, stream) = socket.split();
        self.run_with(sink, stream, hub).await;
    }

    /// Run both pumps over an arbitrary sink/stream pair
    pub async fn run_with<W, S, E>(self, sink: W, stream: S, hub: Arc<ConnectionHub>)
    where
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: Display + Send,
        S: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send,
    {
        let Client {
            id,
            identity,
            outbound,
            mut evicted,
        } = self;
        let ping_interval = hub.config().ping_interval;
        let idle_timeout = hub.config().idle_timeout;

        let mut writer = tokio::spawn(write_pump(sink, outbound, ping_interval));

        let reader_hub = Arc::clone(&hub);
        let mut reader = tokio::spawn(async move {
            read_pump(stream, &reader_hub, &identity, idle_timeout).await
        });

        tokio::select! {
            exit = &mut reader => {
                tracing::debug!(client_id = %id, exit = ?exit.ok(), "Reader stopped");
                hub.unregister(&id).await;
                finish_writer(id, &mut writer).await;
            }
            exit = &mut writer => {
                tracing::debug!(client_id = %id, exit = ?exit.ok(), "Writer stopped");
                stop_reader(&mut reader).await;
                hub.unregister(&id).await;
            }
            _ = &mut evicted => {
                tracing::debug!(client_id = %id, "Removed from hub, closing session");
                stop_reader(&mut reader).await;
                finish_writer(id, &mut writer).await;
            }
        }
    }
}

/// Abort the reader and wait until its stream is dropped
async fn stop_reader(reader: &mut JoinHandle<ReadExit>) {
    reader.abort();
    let _ = reader.await;
}

/// Give the writer time to drain and send its close frame, then abort it
async fn finish_writer(id: ClientId, writer: &mut JoinHandle<WriteExit>) {
    if tokio::time::timeout(WRITER_GRACE, &mut *writer).await.is_err() {
        tracing::debug!(client_id = %id, "Writer did not finish, aborting");
        writer.abort();
        let _ = writer.await;
    }
}

/// Receive frames and forward data frames to the hub
pub async fn read_pump<S, E>(
    mut stream: S,
    hub: &ConnectionHub,
    identity: &Identity,
    idle_timeout: Option<Duration>,
) -> ReadExit
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::debug!(user_id = identity.user_id, "Idle timeout");
                    return ReadExit::IdleTimeout;
                }
            },
            None => stream.next().await,
        };

        match next {
            Some(Ok(Message::Close(_))) => {
                tracing::debug!(user_id = identity.user_id, "Client requested close");
                return ReadExit::PeerClosed;
            }
            Some(Ok(message)) => {
                // Ping/Pong only count as liveness
                if let Some(payload) = Payload::from_message(message) {
                    hub.broadcast(Some(identity), payload).await;
                }
            }
            Some(Err(e)) => {
                tracing::debug!(
                    user_id = identity.user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                return ReadExit::ReceiveError;
            }
            None => return ReadExit::StreamEnded,
        }
    }
}

/// Drain the outbound queue into the socket
///
/// Sends a close frame and returns once the queue is closed.
pub async fn write_pump<W>(
    mut sink: W,
    mut outbound: mpsc::Receiver<Payload>,
    ping_interval: Option<Duration>,
) -> WriteExit
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut keepalive = ping_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            next = outbound.recv() => match next {
                Some(payload) => {
                    if let Err(e) = sink.send(payload.to_message()).await {
                        tracing::debug!(error = %e, "WebSocket send failed, closing connection");
                        return WriteExit::SendFailed;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    return WriteExit::QueueClosed;
                }
            },
            _ = tick(&mut keepalive) => {
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    tracing::debug!(error = %e, "Keepalive ping failed");
                    return WriteExit::SendFailed;
                }
            }
        }
    }
}

async fn tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
