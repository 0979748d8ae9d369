//! REP: the reply side of request-reply.
//!
//! One bound listener, any number of requesting peers. Every complete
//! request lands in a single shared queue in arrival order; `recv`
//! pulls the next one and marks its connection as the active peer, and
//! `send` replies to that peer. For out-of-order replies, reply
//! through [`RequestChunk::reply`] instead.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};
use wiremq_core::queue::Unbounded;

use crate::connection::Connection;
use crate::error::{Result, WireError};
use crate::frame::Frame;
use crate::handshake::SocketType;
use crate::socket::{self, ServerBase};

/// One complete request, still attached to the connection it came in on.
#[derive(Debug)]
pub struct RequestChunk {
    conn: Arc<Connection>,
    parts: Vec<Bytes>,
}

impl RequestChunk {
    #[must_use]
    pub fn parts(&self) -> &[Bytes] {
        &self.parts
    }

    #[must_use]
    pub fn into_parts(self) -> Vec<Bytes> {
        self.parts
    }

    /// Reply directly to the peer this request came from, regardless of
    /// which request was received last.
    pub async fn reply(&self, parts: &[Bytes]) -> Result<()> {
        socket::send_parts(&self.conn, parts).await
    }
}

struct RepInner {
    base: Arc<ServerBase>,
    store: Unbounded<RequestChunk>,
    active: parking_lot::Mutex<Option<Arc<Connection>>>,
}

/// Reply socket.
pub struct RepSocket {
    inner: Arc<RepInner>,
}

impl Default for RepSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl RepSocket {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RepInner {
                base: ServerBase::new(SocketType::Rep),
                store: Unbounded::new(),
                active: parking_lot::Mutex::new(None),
            }),
        }
    }

    /// Bind `tcp://host:port` and start accepting requesting peers.
    pub async fn bind(&self, endpoint: &str) -> Result<()> {
        let inner = self.inner.clone();
        self.inner
            .base
            .bind(endpoint, move |conn| {
                let inner = inner.clone();
                async move { inner.read_loop(conn).await }
            })
            .await
    }

    /// Wait for the next complete request. `Ok(None)` only after the
    /// request store has been closed.
    pub async fn recv(&self) -> Result<Option<RequestChunk>> {
        self.inner.store.load();
        match self.inner.store.next().await? {
            Some(chunk) => {
                *self.inner.active.lock() = Some(chunk.conn.clone());
                Ok(Some(chunk))
            }
            None => Ok(None),
        }
    }

    /// Reply to the most recently received request's peer.
    pub async fn send(&self, parts: &[Bytes]) -> Result<()> {
        let conn = self
            .inner
            .active
            .lock()
            .clone()
            .ok_or(WireError::NoActiveConnection)?;
        socket::send_parts(&conn, parts).await
    }

    /// Peers currently connected, handshaken or not.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.base.connection_count()
    }

    /// Address actually bound, once `bind` has succeeded.
    #[must_use]
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.inner.base.local_addr()
    }
}

impl RepInner {
    /// Per-connection receive loop: reassemble multipart requests and
    /// push them onto the shared store. Empty parts are dropped, except
    /// that the final frame always terminates the request, even empty.
    async fn read_loop(&self, conn: Arc<Connection>) {
        let mut parts: Vec<Bytes> = Vec::new();
        loop {
            match conn.read_frame().await {
                Ok(Frame::Data(data)) => {
                    if !data.more {
                        parts.push(data.payload);
                        let chunk = RequestChunk {
                            conn: conn.clone(),
                            parts: std::mem::take(&mut parts),
                        };
                        if let Err(e) = self.store.push(chunk) {
                            debug!("[REP] request store closed, dropping peer: {e}");
                            conn.close().await;
                            return;
                        }
                    } else if !data.payload.is_empty() {
                        parts.push(data.payload);
                    }
                }
                Ok(Frame::Command(cmd)) => {
                    trace!("[REP] ignoring command {:?}", cmd.name);
                }
                Err(e) if e.is_end_of_stream() => {
                    trace!("[REP] peer {} disconnected", conn.id());
                    return;
                }
                Err(e) => {
                    debug!("[REP] dropping peer {}: {e}", conn.id());
                    return;
                }
            }
        }
    }
}
