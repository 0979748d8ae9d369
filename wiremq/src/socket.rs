//! Shared plumbing behind the socket patterns.
//!
//! `ClientBase` owns the single outbound connection of REQ and SUB;
//! `ServerBase` owns the listener and connection registry of REP and
//! PUB. Both enforce the single-use contract: one connect or bind per
//! socket, ever.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use compio::net::{TcpListener, TcpStream};
use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::{debug, trace};
use wiremq_core::endpoint::Endpoint;
use wiremq_core::tcp::enable_nodelay;

use crate::connection::Connection;
use crate::error::{Result, WireError};
use crate::frame::{DataFrame, Frame};
use crate::handshake::{self, SocketType};

/// Send one multipart message: every part but the last flagged MORE,
/// then a single flush.
pub(crate) async fn send_parts(conn: &Connection, parts: &[Bytes]) -> Result<()> {
    if parts.is_empty() {
        return Err(WireError::EmptyMessage);
    }
    for (i, part) in parts.iter().enumerate() {
        let more = i + 1 < parts.len();
        conn.write_frame(&Frame::Data(DataFrame::new(part.clone(), more)))
            .await;
    }
    conn.flush().await
}

/// Collect data frames until one without MORE arrives. Empty parts are
/// dropped during reassembly; stray commands are ignored.
pub(crate) async fn recv_parts(conn: &Connection) -> Result<Vec<Bytes>> {
    let mut parts: SmallVec<[Bytes; 4]> = SmallVec::new();
    loop {
        match conn.read_frame().await? {
            Frame::Data(data) => {
                let last = !data.more;
                if !data.payload.is_empty() {
                    parts.push(data.payload);
                }
                if last {
                    return Ok(parts.into_vec());
                }
            }
            Frame::Command(cmd) => {
                trace!("[conn:{}] ignoring command {:?}", conn.id(), cmd.name);
            }
        }
    }
}

#[derive(Default)]
struct ConnSlot {
    started: bool,
    conn: Option<Arc<Connection>>,
}

/// Single outbound connection shared by the client-side patterns.
pub(crate) struct ClientBase {
    socket_type: SocketType,
    slot: parking_lot::Mutex<ConnSlot>,
}

impl ClientBase {
    pub(crate) fn new(socket_type: SocketType) -> Self {
        Self {
            socket_type,
            slot: parking_lot::Mutex::new(ConnSlot::default()),
        }
    }

    /// Connect to `tcp://host:port` and run the handshake.
    ///
    /// A socket connects once; a second call fails with
    /// `AlreadyConnected` even while the first is still in flight.
    pub(crate) async fn connect(&self, endpoint: &str) -> Result<()> {
        let endpoint = Endpoint::parse(endpoint)?;
        {
            let mut slot = self.slot.lock();
            if slot.started {
                return Err(WireError::AlreadyConnected);
            }
            slot.started = true;
        }

        match self.connect_inner(&endpoint).await {
            Ok(conn) => {
                self.slot.lock().conn = Some(conn);
                Ok(())
            }
            Err(e) => {
                self.slot.lock().started = false;
                Err(e)
            }
        }
    }

    async fn connect_inner(&self, endpoint: &Endpoint) -> Result<Arc<Connection>> {
        let stream = TcpStream::connect(endpoint.addr()).await?;
        if let Err(e) = enable_nodelay(&stream) {
            debug!("[{}] could not set TCP_NODELAY: {e}", self.socket_type);
        }

        let conn = Arc::new(Connection::new(stream)?);
        match handshake::initiate(&conn, self.socket_type).await {
            Ok(_) => {
                debug!("[{}] connected to {endpoint}", self.socket_type);
                Ok(conn)
            }
            Err(e) => {
                conn.close().await;
                Err(e)
            }
        }
    }

    /// The live connection, or `NotConnected`.
    pub(crate) fn conn(&self) -> Result<Arc<Connection>> {
        self.slot.lock().conn.clone().ok_or(WireError::NotConnected)
    }
}

#[derive(Default)]
struct BindState {
    started: bool,
    local: Option<SocketAddr>,
}

/// Listener plus live-connection registry for the server-side patterns.
pub(crate) struct ServerBase {
    socket_type: SocketType,
    state: parking_lot::Mutex<BindState>,
    conns: parking_lot::Mutex<HashMap<u64, Arc<Connection>>>,
}

impl ServerBase {
    pub(crate) fn new(socket_type: SocketType) -> Arc<Self> {
        Arc::new(Self {
            socket_type,
            state: parking_lot::Mutex::new(BindState::default()),
            conns: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    /// Bind `tcp://host:port` and start accepting.
    ///
    /// Each accepted connection is handshaken in its own task; when the
    /// handshake succeeds, `handler` takes the connection over.
    pub(crate) async fn bind<F, Fut>(self: &Arc<Self>, endpoint: &str, handler: F) -> Result<()>
    where
        F: Fn(Arc<Connection>) -> Fut + Clone + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let endpoint = Endpoint::parse(endpoint)?;
        {
            let mut state = self.state.lock();
            if state.started {
                return Err(WireError::AlreadyBound);
            }
            state.started = true;
        }

        let listener = match TcpListener::bind(endpoint.addr()).await {
            Ok(listener) => listener,
            Err(e) => {
                self.state.lock().started = false;
                return Err(e.into());
            }
        };
        let local = listener.local_addr()?;
        self.state.lock().local = Some(local);
        debug!("[{}] listening on {local}", self.socket_type);

        let socket_type = self.socket_type;
        let base = Arc::downgrade(self);
        compio::runtime::spawn(async move {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        debug!("[{socket_type}] accept failed: {e}");
                        break;
                    }
                };
                let Some(registry) = base.upgrade() else { break };

                if let Err(e) = enable_nodelay(&stream) {
                    debug!("[{socket_type}] could not set TCP_NODELAY for {peer}: {e}");
                }

                let conn = match Connection::new(stream) {
                    Ok(conn) => Arc::new(conn),
                    Err(e) => {
                        debug!("[{socket_type}] could not set up {peer}: {e}");
                        continue;
                    }
                };
                registry.track(&conn);
                drop(registry);

                let handler = handler.clone();
                compio::runtime::spawn(async move {
                    match handshake::serve(&conn, socket_type).await {
                        Ok(_) => handler(conn).await,
                        Err(e) => {
                            debug!("[{socket_type}] handshake with {peer} failed: {e}");
                            conn.close().await;
                        }
                    }
                })
                .detach();
            }
        })
        .detach();

        Ok(())
    }

    /// Register a connection; a close hook unregisters it.
    fn track(self: &Arc<Self>, conn: &Arc<Connection>) {
        self.conns.lock().insert(conn.id(), conn.clone());

        let registry = Arc::downgrade(self);
        let id = conn.id();
        conn.once_close(move || {
            if let Some(registry) = registry.upgrade() {
                registry.conns.lock().remove(&id);
            }
        });
    }

    /// Number of connections currently registered, handshaken or not.
    pub(crate) fn connection_count(&self) -> usize {
        self.conns.lock().len()
    }

    /// Address actually bound, once `bind` has succeeded.
    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().local
    }
}
