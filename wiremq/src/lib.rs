//! # wiremq
//!
//! Asynchronous `ZeroMQ`-style messaging over TCP.
//!
//! ## Overview
//!
//! wiremq implements the 3.x wire protocol (greeting, NULL security,
//! READY handshake, multipart frames) and four socket patterns:
//! - **REQ**: request client
//! - **REP**: reply server, fair-queued across peers
//! - **PUB**: topic-filtered fan-out publisher
//! - **SUB**: subscriber
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use wiremq::{RepSocket, ReqSocket};
//!
//! #[compio::main]
//! async fn main() -> wiremq::Result<()> {
//!     let rep = RepSocket::new();
//!     rep.bind("tcp://127.0.0.1:5555").await?;
//!
//!     let req = ReqSocket::new();
//!     req.connect("tcp://127.0.0.1:5555").await?;
//!     req.send(&[Bytes::from("ping")]).await?;
//!
//!     if let Some(request) = rep.recv().await? {
//!         assert_eq!(&request.parts()[0][..], b"ping");
//!         rep.send(&[Bytes::from("pong")]).await?;
//!     }
//!     let reply = req.recv().await?;
//!     assert_eq!(&reply[0][..], b"pong");
//!     Ok(())
//! }
//! ```

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod handshake;
mod socket;

pub mod codec;

pub mod connection;
pub mod error;
pub mod frame;
pub mod greeting;
pub mod publisher;
pub mod rep;
pub mod req;
pub mod subscriber;

pub use connection::Connection;
pub use error::{Result, WireError};
pub use greeting::Greeting;
pub use handshake::SocketType;
pub use publisher::PubSocket;
pub use rep::{RepSocket, RequestChunk};
pub use req::ReqSocket;
pub use subscriber::SubSocket;

/// Convenience re-exports for binding and driving sockets.
pub mod prelude {
    pub use crate::error::{Result, WireError};
    pub use crate::publisher::PubSocket;
    pub use crate::rep::{RepSocket, RequestChunk};
    pub use crate::req::ReqSocket;
    pub use crate::subscriber::SubSocket;
    pub use bytes::Bytes;
}
