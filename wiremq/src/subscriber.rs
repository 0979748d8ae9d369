//! SUB: the receiving side of topic-filtered fan-out.
//!
//! Subscriptions travel as data frames whose payload is the subscribe
//! flag byte followed by the raw topic bytes. Filtering happens on the
//! publisher, so everything that arrives here is already wanted.

use bytes::Bytes;

use crate::codec::Encoder;
use crate::error::Result;
use crate::frame::{DataFrame, Frame};
use crate::handshake::SocketType;
use crate::publisher::SUBSCRIBE;
use crate::socket::{self, ClientBase};

/// Subscribe socket.
pub struct SubSocket {
    base: ClientBase,
}

impl Default for SubSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl SubSocket {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: ClientBase::new(SocketType::Sub),
        }
    }

    /// Connect to `tcp://host:port` and run the handshake.
    pub async fn connect(&self, endpoint: &str) -> Result<()> {
        self.base.connect(endpoint).await
    }

    /// Announce interest in a topic. May be called any number of times.
    pub async fn subscribe(&self, topic: &str) -> Result<()> {
        let conn = self.base.conn()?;

        let mut enc = Encoder::with_capacity(1 + topic.len());
        enc.put_u8(SUBSCRIBE);
        enc.put_str(topic);

        conn.write_frame(&Frame::Data(DataFrame::new(enc.freeze(), false)))
            .await;
        conn.flush().await
    }

    /// Receive the next published message for any subscribed topic.
    /// `Ok(None)` when the publisher goes away.
    pub async fn recv(&self) -> Result<Option<Vec<Bytes>>> {
        let conn = self.base.conn()?;
        match socket::recv_parts(&conn).await {
            Ok(parts) => Ok(Some(parts)),
            Err(e) if e.is_end_of_stream() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
