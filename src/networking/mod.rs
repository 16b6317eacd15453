/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The UDP datagram transport the agreement algorithm runs over: per-peer [Client]s offering
//! acknowledged sends with retry, the process's single bound [Server] driving a cooperative
//! receive loop, and the [Address] book entry both are built from.
//!
//! The transport deliberately knows nothing about the algorithm. Reliability is bolted onto UDP at
//! this layer only to the extent the algorithm needs it: a sender re-sends until an
//! acknowledgement it recognizes arrives or its attempts run out, and a message whose attempts run
//! out is simply lost — the rounds above are designed to make progress anyway.

pub mod address;

pub mod client;

pub mod server;

pub use address::{Address, AddressError};
pub use client::Client;
pub use server::{Handler, Replier, Server};

use std::fmt;
use std::io;

/// Verdict returned by transport callbacks: keep the surrounding loop going, or leave it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerAction {
    Continue,
    Stop,
}

/// Errors raised by the transport. Socket creation, bind, and non-timeout receive failures are
/// fatal to the process. Send failures are reported to the caller, which treats the affected
/// message as lost.
#[derive(Debug)]
pub enum TransportError {
    Socket(io::Error),
    Bind(io::Error),
    Send(io::Error),
    Receive(io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Socket(err) => write!(f, "failed to set up a UDP socket: {}", err),
            TransportError::Bind(err) => write!(f, "failed to bind the server socket: {}", err),
            TransportError::Send(err) => write!(f, "failed to send a datagram: {}", err),
            TransportError::Receive(err) => write!(f, "failed to receive a datagram: {}", err),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Socket(err)
            | TransportError::Bind(err)
            | TransportError::Send(err)
            | TransportError::Receive(err) => Some(err),
        }
    }
}

// How EAGAIN / EWOULDBLOCK / ECONNREFUSED surface through std::io on a socket with a read
// timeout. ConnectionRefused shows up on loopback when a peer's socket is gone; for an
// unreliable-by-design transport it is indistinguishable from silence.
pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::ConnectionRefused
    )
}
