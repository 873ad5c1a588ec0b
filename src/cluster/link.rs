use anyhow::{bail, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Notify};

use super::types::{NodeInfo, PeerMessage, PeerRequest, PeerResponse};

/// Upper bound on a single frame. Anything larger is treated as a
/// protocol violation and tears the link down.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Outbound queue depth per link.
pub(crate) const OUTBOUND_QUEUE: usize = 128;

/// Why a per-request call did not produce a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    /// No response within the per-request deadline. The link stays open;
    /// only the failure detector closes links.
    Timeout,
    /// The link is closed (or closed while the request was in flight).
    Closed,
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::Timeout => f.write_str("peer request timed out"),
            RequestError::Closed => f.write_str("peer link closed"),
        }
    }
}

impl std::error::Error for RequestError {}

/// One directed, multiplexed channel to a remote node.
///
/// All message kinds share the link's socket: requests are tagged with a
/// correlation id and matched to their response by the link's reader
/// task, notices go out fire-and-forget. Cloned handles share the same
/// underlying connection.
pub struct PeerLink {
    pub remote: NodeInfo,
    outbound: mpsc::Sender<PeerMessage>,
    pending: Arc<DashMap<u64, oneshot::Sender<PeerResponse>>>,
    next_request_id: AtomicU64,
    request_timeout: Duration,
    shutdown: Arc<Notify>,
    closed: AtomicBool,
}

impl PeerLink {
    pub(crate) fn new(
        remote: NodeInfo,
        outbound: mpsc::Sender<PeerMessage>,
        pending: Arc<DashMap<u64, oneshot::Sender<PeerResponse>>>,
        request_timeout: Duration,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            remote,
            outbound,
            pending,
            next_request_id: AtomicU64::new(1),
            request_timeout,
            shutdown,
            closed: AtomicBool::new(false),
        }
    }

    /// Sends a request and waits for the matching response, bounded by
    /// the per-request timeout. A timeout fails this request only.
    pub async fn request(&self, body: PeerRequest) -> Result<PeerResponse, RequestError> {
        if self.is_closed() {
            return Err(RequestError::Closed);
        }

        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        if self
            .outbound
            .send(PeerMessage::Request { id, body })
            .await
            .is_err()
        {
            self.pending.remove(&id);
            return Err(RequestError::Closed);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(RequestError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                Err(RequestError::Timeout)
            }
        }
    }

    /// Queues a fire-and-forget message. Best-effort: dropped silently if
    /// the link is closed or its outbound queue is full.
    pub fn notify(&self, message: PeerMessage) {
        let _ = self.outbound.try_send(message);
    }

    /// Queues the response for request `id`.
    pub(crate) async fn respond(&self, id: u64, body: PeerResponse) -> Result<(), RequestError> {
        self.outbound
            .send(PeerMessage::Response { id, body })
            .await
            .map_err(|_| RequestError::Closed)
    }

    /// Routes an inbound response to the request waiting on it.
    pub(crate) fn complete(&self, id: u64, body: PeerResponse) {
        if let Some((_, tx)) = self.pending.remove(&id) {
            let _ = tx.send(body);
        }
    }

    /// Tears the link down: wakes the reader task and fails every pending
    /// request. Called by the failure detector and on disconnect.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pending.clear();
        self.shutdown.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Writes one length-prefixed bincode frame.
pub(crate) async fn write_frame<W>(writer: &mut W, message: &PeerMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_FRAME_BYTES {
        bail!("outbound frame of {} bytes exceeds limit", payload.len());
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    Ok(())
}

/// Reads one length-prefixed bincode frame.
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<PeerMessage>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        bail!("inbound frame of {} bytes exceeds limit", len);
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(bincode::deserialize(&payload)?)
}

/// Drains the outbound queue onto the socket until the queue closes or a
/// write fails.
pub(crate) async fn run_writer<W>(mut queue: mpsc::Receiver<PeerMessage>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = queue.recv().await {
        if let Err(e) = write_frame(&mut writer, &message).await {
            tracing::debug!("Peer write failed: {}", e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

pub(crate) type PendingMap = Arc<DashMap<u64, oneshot::Sender<PeerResponse>>>;
