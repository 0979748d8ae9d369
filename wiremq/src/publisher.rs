//! PUB: topic-filtered fan-out.
//!
//! Each subscribing peer announces exactly one topic with its first
//! data frame, whose payload is a flag byte followed by the topic
//! bytes; anything it sends after that is ignored. Publishing sends the whole multipart message, first
//! part being the topic, to every peer subscribed to that topic, in
//! the order they subscribed. A slow or dead peer only loses its own
//! copy; the fan-out never aborts.

use std::sync::Arc;

use bytes::Bytes;
use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::connection::Connection;
use crate::error::{Result, WireError};
use crate::frame::Frame;
use crate::handshake::SocketType;
use crate::socket::{self, ServerBase};

/// Flag byte opening a subscription payload.
pub(crate) const SUBSCRIBE: u8 = 0x01;

struct PubInner {
    base: Arc<ServerBase>,
    topics: parking_lot::Mutex<HashMap<String, Vec<Arc<Connection>>>>,
}

/// Publish socket.
pub struct PubSocket {
    inner: Arc<PubInner>,
}

impl Default for PubSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl PubSocket {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PubInner {
                base: ServerBase::new(SocketType::Pub),
                topics: parking_lot::Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Bind `tcp://host:port` and start accepting subscribers.
    pub async fn bind(&self, endpoint: &str) -> Result<()> {
        let inner = self.inner.clone();
        self.inner
            .base
            .bind(endpoint, move |conn| {
                let inner = inner.clone();
                async move { inner.register(conn).await }
            })
            .await
    }

    /// Publish a multipart message whose first part is the topic.
    ///
    /// A topic nobody subscribed to is a silent no-op. Per-peer send
    /// failures are logged and skipped so one dead subscriber cannot
    /// block the rest.
    pub async fn send(&self, parts: &[Bytes]) -> Result<()> {
        let Some(topic_part) = parts.first() else {
            return Err(WireError::EmptyMessage);
        };
        let topic = String::from_utf8_lossy(topic_part).into_owned();

        let subs = match self.inner.topics.lock().get(&topic) {
            Some(subs) => subs.clone(),
            None => {
                trace!("[PUB] no subscribers for {topic:?}");
                return Ok(());
            }
        };

        for conn in subs {
            if let Err(e) = socket::send_parts(&conn, parts).await {
                debug!("[PUB] send to subscriber {} failed: {e}", conn.id());
            }
        }
        Ok(())
    }

    /// Number of peers currently subscribed to `topic`.
    #[must_use]
    pub fn subscribers(&self, topic: &str) -> usize {
        self.inner
            .topics
            .lock()
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Peers currently connected, subscribed or not.
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

impl PubInner {
    /// Read exactly one subscription frame from the peer and register
    /// its topic. A peer that sends anything other than a non-empty
    /// data frame is dropped. Afterwards the stream is only drained so
    /// the disconnect is noticed; later frames register nothing.
    async fn register(self: Arc<Self>, conn: Arc<Connection>) {
        let payload = match conn.read_frame().await {
            Ok(Frame::Data(data)) if !data.payload.is_empty() => data.payload,
            Ok(frame) => {
                debug!(
                    "[PUB] peer {} sent an invalid subscription frame: {frame:?}",
                    conn.id()
                );
                conn.close().await;
                return;
            }
            Err(e) => {
                if !e.is_end_of_stream() {
                    debug!("[PUB] dropping peer {}: {e}", conn.id());
                }
                return;
            }
        };

        let flag = payload[0];
        if flag != SUBSCRIBE {
            trace!("[PUB] peer {} sent flag {flag:#04x}", conn.id());
        }
        let topic = String::from_utf8_lossy(&payload[1..]).into_owned();
        trace!("[PUB] peer {} subscribes to {topic:?}", conn.id());

        conn.set_tag(topic.clone());
        self.topics
            .lock()
            .entry(topic)
            .or_default()
            .push(conn.clone());

        self.unsubscribe_on_close(&conn);

        loop {
            match conn.read_frame().await {
                Ok(frame) => {
                    trace!(
                        "[PUB] peer {} sent a frame past its subscription, ignoring: {frame:?}",
                        conn.id()
                    );
                }
                Err(e) => {
                    if !e.is_end_of_stream() {
                        debug!("[PUB] dropping peer {}: {e}", conn.id());
                    }
                    return;
                }
            }
        }
    }

    /// Arrange for the peer's topic entry to disappear when the
    /// connection closes. Removal is keyed by connection id.
    fn unsubscribe_on_close(self: &Arc<Self>, conn: &Arc<Connection>) {
        let inner = Arc::downgrade(self);
        let weak_conn = Arc::downgrade(conn);
        let id = conn.id();
        conn.once_close(move || {
            let Some(inner) = inner.upgrade() else { return };
            let tags = weak_conn.upgrade().map(|c| c.tags()).unwrap_or_default();
            let mut topics = inner.topics.lock();
            for tag in tags {
                if let Some(subs) = topics.get_mut(&tag) {
                    subs.retain(|c| c.id() != id);
                    if subs.is_empty() {
                        topics.remove(&tag);
                    }
                }
            }
        });
    }
}
