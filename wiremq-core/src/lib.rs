//! wiremq core
//!
//! Protocol-agnostic building blocks shared by the wiremq protocol crate:
//! - Transport endpoint parsing (`endpoint`)
//! - Single-slot unbounded hand-off queue (`queue`)
//! - TCP socket tuning (`tcp`)

// The tcp module needs raw fd/socket access for socket configuration
#![cfg_attr(not(test), deny(unsafe_code))]
#![allow(clippy::module_name_repetitions)]

pub mod endpoint;
pub mod queue;
pub mod tcp;
