//! REQ: the requesting side of request-reply.
//!
//! Thin over the shared client base: one connection, send a multipart
//! request, receive a multipart reply. Strict send/receive alternation
//! is the caller's contract; nothing here enforces lockstep, and a
//! pipelined peer will simply see interleaved frames.

use bytes::Bytes;

use crate::error::Result;
use crate::handshake::SocketType;
use crate::socket::{self, ClientBase};

/// Request socket.
pub struct ReqSocket {
    base: ClientBase,
}

impl Default for ReqSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqSocket {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: ClientBase::new(SocketType::Req),
        }
    }

    /// Connect to `tcp://host:port` and run the handshake.
    pub async fn connect(&self, endpoint: &str) -> Result<()> {
        self.base.connect(endpoint).await
    }

    /// Send one multipart request.
    pub async fn send(&self, parts: &[Bytes]) -> Result<()> {
        let conn = self.base.conn()?;
        socket::send_parts(&conn, parts).await
    }

    /// Receive one multipart reply. Empty parts are dropped.
    pub async fn recv(&self) -> Result<Vec<Bytes>> {
        let conn = self.base.conn()?;
        socket::recv_parts(&conn).await
    }
}
