//! Connection establishment: greeting exchange followed by READY.
//!
//! Both sides send a 64-byte greeting, validate the peer's signature
//! and version, then exchange READY commands carrying their socket
//! type. The server speaks its READY first; the client answers with
//! its own, adding an empty Identity property. Anything else on the
//! wire before READY completes is a handshake failure.

use tracing::trace;

use crate::connection::Connection;
use crate::error::{Result, WireError};
use crate::frame::{self, Frame, KEY_IDENTITY, KEY_SOCKET_TYPE, READY};
use crate::greeting::{Greeting, SIG_HEAD, SIG_MARK, SIG_TAIL};

/// The four supported socket patterns, as announced during READY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketType {
    Req,
    Rep,
    Pub,
    Sub,
}

impl SocketType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Req => "REQ",
            Self::Rep => "REP",
            Self::Pub => "PUB",
            Self::Sub => "SUB",
        }
    }
}

impl std::fmt::Display for SocketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn check_signature(sig: &[u8]) -> Result<()> {
    if sig[0] != SIG_HEAD || sig[8] != SIG_MARK || sig[9] != SIG_TAIL {
        return Err(WireError::handshake(format!(
            "peer did not present a valid signature: {:02x?}",
            &sig[..]
        )));
    }
    Ok(())
}

fn check_greeting(greeting: &Greeting) -> Result<()> {
    if !greeting.is_null_mechanism() {
        return Err(WireError::handshake(format!(
            "unsupported security mechanism {:?}",
            greeting.mechanism()
        )));
    }
    if greeting.major() < 3 {
        return Err(WireError::handshake(format!(
            "unsupported protocol version {}.{}",
            greeting.major(),
            greeting.minor()
        )));
    }
    Ok(())
}

/// Read the next frame and require it to be READY.
/// Returns the peer's metadata properties.
async fn expect_ready(conn: &Connection) -> Result<Vec<String>> {
    match conn.read_frame().await? {
        Frame::Command(cmd) if cmd.name == READY => cmd.metadata(),
        Frame::Command(cmd) => Err(WireError::handshake(format!(
            "expected READY, peer sent {:?}",
            cmd.name
        ))),
        Frame::Data(_) => Err(WireError::handshake("expected READY, peer sent data")),
    }
}

/// Server side of the handshake. Waits for the client's signature
/// before revealing anything, then mirrors the greeting exchange and
/// speaks READY first. Returns the client's metadata.
pub(crate) async fn serve(conn: &Connection, local: SocketType) -> Result<Vec<String>> {
    let sig = conn.peek_signature().await?;
    check_signature(&sig)?;

    conn.write_greeting(&Greeting::default()).await;
    conn.flush().await?;

    let major = conn.peek_version_major().await?;
    trace!("[{local}] peer announces version major {major}");

    let greeting = conn.read_greeting().await?;
    check_greeting(&greeting)?;

    conn.write_frame(&Frame::Command(frame::ready(&[(
        KEY_SOCKET_TYPE,
        local.as_str(),
    )])))
    .await;
    conn.flush().await?;

    let metadata = expect_ready(conn).await?;
    trace!("[{local}] handshake complete, peer metadata {metadata:?}");
    Ok(metadata)
}

/// Client side of the handshake. Sends its greeting eagerly, validates
/// the server's, waits for the server's READY, then answers with its
/// own carrying the socket type and an empty identity.
pub(crate) async fn initiate(conn: &Connection, local: SocketType) -> Result<Vec<String>> {
    conn.write_greeting(&Greeting::default()).await;
    conn.flush().await?;

    let sig = conn.peek_signature().await?;
    check_signature(&sig)?;

    let major = conn.peek_version_major().await?;
    trace!("[{local}] peer announces version major {major}");

    let greeting = conn.read_greeting().await?;
    check_greeting(&greeting)?;

    let metadata = expect_ready(conn).await?;

    conn.write_frame(&Frame::Command(frame::ready(&[
        (KEY_SOCKET_TYPE, local.as_str()),
        (KEY_IDENTITY, ""),
    ])))
    .await;
    conn.flush().await?;

    trace!("[{local}] handshake complete, peer metadata {metadata:?}");
    Ok(metadata)
}
