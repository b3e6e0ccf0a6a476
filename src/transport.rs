//! The async TCP driver wrapping the sans-IO [`LinkLayer`].
//!
//! Grounded on `lockframe_client::transport::ConnectedClient` — a thin
//! handle holding `mpsc` channels into a spawned task, with an
//! [`tokio::task::AbortHandle`] to stop it — adapted from lockframe's
//! QUIC unidirectional-stream model to a single [`TcpStream`] carrying a
//! byte stream the [`HeaderParser`] frames, and from `aecsocket-aeronet`'s
//! single `select!` loop driving a sans-IO `Session` alongside its own
//! timer.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::header::parser::HeaderParser;
use crate::link::{Event, LinkError, LinkLayer, LinkLayerConfig};
use crate::message::Message;
use crate::registry::{CodecOptions, Registry};

const READ_BUF_SIZE: usize = 8192;
const INBOUND_CHANNEL_CAPACITY: usize = 32;
const COMMAND_CHANNEL_CAPACITY: usize = 32;
/// A timer duration far longer than any real `timeout`, used to park the
/// retransmit timer while no write is pending.
const NO_PENDING_WRITE_PARK: Duration = Duration::from_secs(3600);

/// Errors establishing or driving a [`Connection`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TransportError {
    /// The TCP connection could not be established.
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    /// The background driver task is gone (the connection was dropped or
    /// panicked).
    #[error("connection closed")]
    Closed,
}

/// A message delivered upward by the driver, either a fully decoded
/// message or a protocol-level error that isn't tied to one particular
/// outbound write.
#[derive(Debug)]
pub enum Inbound {
    /// A reassembled, sequence-checked, MID-decoded message.
    Delivered(Message),
    /// An error on the dedicated `error` channel (`spec.md` §7) — a
    /// framing, reassembly, or sequencing failure that isn't a write's
    /// completion.
    Error(LinkError),
    /// An error on the dedicated `errorSerializer` channel (`spec.md`
    /// §6/§7) — an outbound encoding failure. Always paired with the
    /// failed write's own `Err` completion.
    SerializerError(LinkError),
}

enum Command {
    Write {
        msg: Message,
        opts: CodecOptions,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    Activate,
    Deactivate,
}

/// A handle to a running Open Protocol connection.
///
/// Dropping this handle (or calling [`Connection::stop`]) aborts the
/// background driver task.
#[derive(Debug)]
pub struct Connection {
    to_task: mpsc::Sender<Command>,
    from_task: mpsc::Receiver<Inbound>,
    abort_handle: tokio::task::AbortHandle,
}

impl Connection {
    /// Connects to `addr` and spawns the background driver task.
    pub async fn connect(
        addr: SocketAddr,
        config: LinkLayerConfig,
        registry: Arc<Registry>,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::Connect)?;
        Ok(Self::from_stream(stream, config, registry))
    }

    /// Wraps an already-connected [`TcpStream`], spawning the background
    /// driver task. Exposed for tests that connect over a loopback pair.
    pub fn from_stream(stream: TcpStream, config: LinkLayerConfig, registry: Arc<Registry>) -> Self {
        let raw_data = config.raw_data;
        let link = LinkLayer::new(config, registry);

        let (to_task, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (from_task, inbound_rx_caller) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

        let handle = tokio::spawn(run(stream, link, raw_data, cmd_rx, from_task));

        Self {
            to_task,
            from_task: inbound_rx_caller,
            abort_handle: handle.abort_handle(),
        }
    }

    /// Engages Active mode (full sequencing, acking, and retransmission).
    pub async fn activate(&self) -> Result<(), TransportError> {
        self.to_task
            .send(Command::Activate)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Returns to Inactive mode.
    pub async fn deactivate(&self) -> Result<(), TransportError> {
        self.to_task
            .send(Command::Deactivate)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Writes `msg`, resolving once the Link Layer completes it: `Ok(())`
    /// on ack (or immediately, outside Active mode), `Err` on NACK,
    /// mismatch, or retry exhaustion.
    pub async fn write(&self, msg: Message, opts: CodecOptions) -> Result<(), LinkError> {
        let (reply, rx) = oneshot::channel();
        if self
            .to_task
            .send(Command::Write { msg, opts, reply })
            .await
            .is_err()
        {
            return Err(LinkError::Timeout);
        }
        rx.await.unwrap_or(Err(LinkError::Timeout))
    }

    /// Receives the next delivered message or protocol error.
    /// `None` once the driver task has exited.
    pub async fn recv(&mut self) -> Option<Inbound> {
        self.from_task.recv().await
    }

    /// Aborts the background driver task.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

async fn run(
    stream: TcpStream,
    mut link: LinkLayer,
    raw_data: bool,
    mut cmd_rx: mpsc::Receiver<Command>,
    inbound_tx: mpsc::Sender<Inbound>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut parser = HeaderParser::new(raw_data);
    let mut read_buf = vec![0u8; READ_BUF_SIZE];
    let mut pending_reply: Option<oneshot::Sender<Result<(), LinkError>>> = None;

    let sleep = tokio::time::sleep(NO_PENDING_WRITE_PARK);
    tokio::pin!(sleep);

    loop {
        if let Some(deadline) = link.poll_timeout() {
            sleep.as_mut().reset(tokio::time::Instant::from_std(deadline));
        }

        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Write { msg, opts, reply }) => {
                        trace!(mid = msg.mid, "write submitted");
                        pending_reply = Some(reply);
                        for event in link.write(Instant::now(), msg, &opts) {
                            handle_event(event, &mut write_half, &inbound_tx, &mut pending_reply).await;
                        }
                    }
                    Some(Command::Activate) => {
                        debug!("link layer activated");
                        link.activate();
                    }
                    Some(Command::Deactivate) => {
                        debug!("link layer deactivated");
                        link.deactivate();
                    }
                    None => break,
                }
            }

            () = &mut sleep, if link.poll_timeout().is_some() => {
                trace!("retransmit timer fired");
                for event in link.on_timeout(Instant::now()) {
                    handle_event(event, &mut write_half, &inbound_tx, &mut pending_reply).await;
                }
            }

            result = read_half.read(&mut read_buf) => {
                match result {
                    Ok(0) => {
                        debug!("peer closed the connection");
                        break;
                    }
                    Ok(n) => {
                        parser.push(&read_buf[..n]);
                        let mut fatal = false;
                        loop {
                            match parser.next() {
                                Ok(Some(frame)) => {
                                    for event in link.receive(frame) {
                                        handle_event(event, &mut write_half, &inbound_tx, &mut pending_reply).await;
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    warn!(error = %e, "header parse error");
                                    fatal = matches!(
                                        e,
                                        crate::header::parser::ParseError::InvalidLength
                                            | crate::header::parser::ParseError::InvalidMid
                                    );
                                    let _ = inbound_tx.send(Inbound::Error(LinkError::from(e))).await;
                                    // Non-fatal header errors (`InvalidRevision`..`InvalidTerminator`)
                                    // already skipped past the malformed frame inside
                                    // `HeaderParser::fail`, so any complete frames still sitting
                                    // in the buffer behind it are worth draining now rather than
                                    // stranding them until the next socket-readable event.
                                    if fatal {
                                        break;
                                    }
                                }
                            }
                        }
                        if fatal {
                            debug!("unrecoverable frame length/mid; closing connection");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "socket read failed");
                        break;
                    }
                }
            }
        }
    }
}

async fn handle_event(
    event: Event,
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    inbound_tx: &mpsc::Sender<Inbound>,
    pending_reply: &mut Option<oneshot::Sender<Result<(), LinkError>>>,
) {
    match event {
        Event::Send(bytes) => {
            trace!(len = bytes.len(), "sending frame");
            if let Err(e) = write_half.write_all(&bytes).await {
                warn!(error = %e, "frame write failed");
            }
        }
        Event::Delivered(msg) => {
            let _ = inbound_tx.send(Inbound::Delivered(msg)).await;
        }
        Event::WriteComplete(result) => {
            if let Some(reply) = pending_reply.take() {
                let _ = reply.send(result);
            }
        }
        Event::Error(e) => {
            let _ = inbound_tx.send(Inbound::Error(e)).await;
        }
        Event::SerializerError(e) => {
            let _ = inbound_tx.send(Inbound::SerializerError(e)).await;
        }
    }
}
