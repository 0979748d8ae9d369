//! A framed connection over a TCP stream.
//!
//! The stream is cloned into a read half and a write half so a receive
//! loop can sit in `read_frame` while another task replies. Each half
//! keeps its own buffer behind an async mutex; reads accumulate into a
//! read-ahead buffer, which is what makes the greeting peeks possible,
//! and writes accumulate until `flush`.
//!
//! Any read or write failure tears the connection down through its
//! close hooks, which fire exactly once no matter how many paths race
//! to report the failure.

use std::collections::{HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;
use compio::buf::BufResult;
use compio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use compio::net::TcpStream;
use compio::runtime::TryClone;
use tracing::error;

use crate::error::{Result, WireError};
use crate::frame::{self, Frame};
use crate::greeting::{Greeting, GREETING_SIZE};

/// Read granularity for the read-ahead buffer.
const READ_CHUNK: usize = 8 * 1024;

/// Length of the peekable greeting signature prefix.
pub const SIGNATURE_SIZE: usize = 10;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

struct Reader {
    stream: TcpStream,
    buf: BytesMut,
}

struct Writer {
    stream: TcpStream,
    buf: BytesMut,
}

type CloseHook = Box<dyn FnOnce() + Send>;

/// One peer connection carrying greetings and frames.
pub struct Connection {
    id: u64,
    reader: async_lock::Mutex<Reader>,
    writer: async_lock::Mutex<Writer>,
    hooks: parking_lot::Mutex<VecDeque<CloseHook>>,
    tags: parking_lot::Mutex<HashSet<String>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}

impl Connection {
    /// Split the stream into buffered read and write halves.
    pub fn new(stream: TcpStream) -> Result<Self> {
        let write_half = stream.try_clone()?;
        Ok(Self {
            id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
            reader: async_lock::Mutex::new(Reader {
                stream,
                buf: BytesMut::new(),
            }),
            writer: async_lock::Mutex::new(Writer {
                stream: write_half,
                buf: BytesMut::new(),
            }),
            hooks: parking_lot::Mutex::new(VecDeque::new()),
            tags: parking_lot::Mutex::new(HashSet::new()),
        })
    }

    /// Process-unique id, used to find this connection in registries.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Peek the 10-byte greeting signature without consuming it.
    pub async fn peek_signature(&self) -> Result<[u8; SIGNATURE_SIZE]> {
        let mut r = self.reader.lock().await;
        match Self::fill(&mut r, SIGNATURE_SIZE).await {
            Ok(()) => {
                let mut sig = [0u8; SIGNATURE_SIZE];
                sig.copy_from_slice(&r.buf[..SIGNATURE_SIZE]);
                Ok(sig)
            }
            Err(e) => {
                drop(r);
                self.notify_close();
                Err(e)
            }
        }
    }

    /// Peek the peer's major protocol version without consuming it.
    pub async fn peek_version_major(&self) -> Result<u8> {
        let mut r = self.reader.lock().await;
        match Self::fill(&mut r, SIGNATURE_SIZE + 1).await {
            Ok(()) => Ok(r.buf[SIGNATURE_SIZE]),
            Err(e) => {
                drop(r);
                self.notify_close();
                Err(e)
            }
        }
    }

    /// Read and consume the peer's 64-byte greeting.
    pub async fn read_greeting(&self) -> Result<Greeting> {
        let mut r = self.reader.lock().await;
        let res = async {
            Self::fill(&mut r, GREETING_SIZE).await?;
            let raw = r.buf.split_to(GREETING_SIZE).freeze();
            Greeting::parse(&raw)
        }
        .await;
        if res.is_err() {
            drop(r);
            self.notify_close();
        }
        res
    }

    /// Read and consume the next complete frame.
    ///
    /// `EndOfStream` means the peer closed cleanly between frames; any
    /// other error leaves the stream unsynchronized, so both tear the
    /// connection down before returning.
    pub async fn read_frame(&self) -> Result<Frame> {
        let mut r = self.reader.lock().await;
        let res = Self::read_frame_inner(&mut r).await;
        if res.is_err() {
            drop(r);
            self.notify_close();
        }
        res
    }

    async fn read_frame_inner(r: &mut Reader) -> Result<Frame> {
        Self::fill(r, 1).await?;
        let header = frame::header_len(r.buf[0]);
        Self::fill(r, header).await?;
        let body = frame::body_len(&r.buf[..header])?;

        let total = header + body;
        Self::fill(r, total).await?;
        let raw = r.buf.split_to(total).freeze();
        Frame::decode(&raw)
    }

    /// Grow the read-ahead buffer to at least `n` bytes.
    async fn fill(r: &mut Reader, n: usize) -> Result<()> {
        while r.buf.len() < n {
            let chunk = Vec::with_capacity(READ_CHUNK);
            let BufResult(res, chunk) = r.stream.read(chunk).await;
            let got = res?;
            if got == 0 {
                return Err(WireError::EndOfStream);
            }
            r.buf.extend_from_slice(&chunk[..got]);
        }
        Ok(())
    }

    /// Queue a greeting on the write buffer.
    pub async fn write_greeting(&self, greeting: &Greeting) {
        let mut w = self.writer.lock().await;
        w.buf.extend_from_slice(&greeting.encode());
    }

    /// Queue a frame on the write buffer.
    pub async fn write_frame(&self, frame: &Frame) {
        let mut w = self.writer.lock().await;
        w.buf.extend_from_slice(&frame.encode());
    }

    /// Push the write buffer out to the peer.
    pub async fn flush(&self) -> Result<()> {
        let mut w = self.writer.lock().await;
        if w.buf.is_empty() {
            return Ok(());
        }
        let out = w.buf.split().freeze().to_vec();
        let BufResult(res, _) = w.stream.write_all(out).await;
        match res {
            Ok(_) => Ok(()),
            Err(e) => {
                drop(w);
                self.notify_close();
                Err(e.into())
            }
        }
    }

    /// Shut the stream down and fire the close hooks.
    pub async fn close(&self) {
        {
            let mut w = self.writer.lock().await;
            let _ = w.stream.shutdown().await;
        }
        self.notify_close();
    }

    /// Register a hook to run when this connection closes.
    pub fn once_close(&self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.lock().push_back(Box::new(hook));
    }

    /// Drain the close hooks in registration order. Idempotent: hooks
    /// are consumed, so whichever caller gets here first runs them.
    pub(crate) fn notify_close(&self) {
        loop {
            let hook = self.hooks.lock().pop_front();
            let Some(hook) = hook else { break };
            if let Err(panic) = catch_unwind(AssertUnwindSafe(hook)) {
                error!("[conn:{}] close hook panicked: {panic:?}", self.id);
            }
        }
    }

    /// Tag this connection, e.g. with a topic it subscribed to.
    pub fn set_tag(&self, tag: impl Into<String>) {
        self.tags.lock().insert(tag.into());
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.lock().contains(tag)
    }

    /// Snapshot of the tags on this connection.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.tags.lock().iter().cloned().collect()
    }

    /// Bytes currently sitting in the read-ahead buffer.
    #[cfg(test)]
    pub(crate) async fn buffered(&self) -> usize {
        self.reader.lock().await.buf.len()
    }
}
