use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::messages::MAX_DATAGRAM_SIZE;
use crate::networking::{is_timeout, ServerAction, TransportError};

/// Callbacks driven by [Server::listen]. Implemented by the state machine that owns the agreement
/// state, so that every state mutation happens on the single thread running the listen loop.
pub trait Handler {
    /// Called with each received datagram. `replier` sends back to the datagram's source.
    fn on_receive(&mut self, replier: Replier<'_>, buf: &[u8]) -> ServerAction;

    /// Called when the socket receive timeout fires with no datagram.
    fn on_timeout(&mut self) -> ServerAction;
}

/// The process's single bound receiving socket.
pub struct Server {
    socket: UdpSocket,
}

impl Server {
    /// Binds to `port` on all interfaces. `receive_timeout` bounds each blocking receive so the
    /// loop regains control even when no traffic arrives.
    pub fn bind(port: u16, receive_timeout: Duration) -> Result<Server, TransportError> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).map_err(TransportError::Bind)?;
        socket
            .set_read_timeout(Some(receive_timeout))
            .map_err(TransportError::Socket)?;
        Ok(Server { socket })
    }

    /// The cooperative single-threaded receive loop. Each iteration blocks in `recv_from` for at
    /// most the receive timeout, then hands control to the handler. Returns when a callback
    /// answers [ServerAction::Stop]; receive failures other than a timeout are fatal.
    pub fn listen(&self, handler: &mut impl Handler) -> Result<(), TransportError> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        loop {
            let action = match self.socket.recv_from(&mut buf) {
                Ok((n, from)) => handler.on_receive(Replier::new(&self.socket, from), &buf[..n]),
                Err(err) if is_timeout(&err) => handler.on_timeout(),
                Err(err) => return Err(TransportError::Receive(err)),
            };
            if let ServerAction::Stop = action {
                return Ok(());
            }
        }
    }
}

/// The reply path for a single received datagram: sends through the server's own socket, back to
/// the datagram's source address.
pub struct Replier<'a> {
    socket: &'a UdpSocket,
    peer: SocketAddr,
}

impl<'a> Replier<'a> {
    pub(crate) fn new(socket: &'a UdpSocket, peer: SocketAddr) -> Replier<'a> {
        Replier { socket, peer }
    }

    /// The source address of the datagram being replied to.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// One-shot send to the datagram's source.
    pub fn send(&self, buf: &[u8]) -> Result<(), TransportError> {
        self.socket
            .send_to(buf, self.peer)
            .map_err(TransportError::Send)?;
        Ok(())
    }
}
