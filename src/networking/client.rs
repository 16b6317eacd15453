use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::messages::MAX_DATAGRAM_SIZE;
use crate::networking::{is_timeout, ServerAction, TransportError};

/// A peer's sending endpoint: an unconnected UDP socket pointed at the peer's address.
///
/// The socket stays unconnected because acknowledgements come back from the peer's server socket,
/// whose port is not the one datagrams are sent to.
pub struct Client {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl Client {
    /// Creates a client for `peer`. `ack_timeout` becomes the socket's receive timeout, bounding
    /// each wait for an acknowledgement inside [Client::send_with_ack].
    pub fn new(peer: SocketAddr, ack_timeout: Duration) -> Result<Client, TransportError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).map_err(TransportError::Socket)?;
        socket
            .set_read_timeout(Some(ack_timeout))
            .map_err(TransportError::Socket)?;
        Ok(Client { socket, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// One-shot send with no delivery guarantee.
    pub fn send(&self, buf: &[u8]) -> Result<(), TransportError> {
        self.socket
            .send_to(buf, self.peer)
            .map_err(TransportError::Send)?;
        Ok(())
    }

    /// Sends `buf` and waits for an acknowledgement. `validate_ack` inspects each reply datagram:
    /// [ServerAction::Stop] accepts it, [ServerAction::Continue] ignores it and keeps waiting
    /// within the current attempt's window. When the socket timeout fires the datagram is sent
    /// again, up to `max_attempts` times in total (0 means retry forever).
    ///
    /// Returns whether an acknowledgement was accepted. Exhausting every attempt is not an error:
    /// the message is simply treated as lost, which the algorithm above tolerates.
    pub fn send_with_ack<F>(
        &self,
        buf: &[u8],
        max_attempts: u32,
        mut validate_ack: F,
    ) -> Result<bool, TransportError>
    where
        F: FnMut(&[u8]) -> ServerAction,
    {
        let mut attempt = 0;
        while max_attempts == 0 || attempt < max_attempts {
            attempt += 1;
            self.send(buf)?;

            let mut reply = [0u8; MAX_DATAGRAM_SIZE];
            loop {
                match self.socket.recv_from(&mut reply) {
                    Ok((n, _)) => {
                        if let ServerAction::Stop = validate_ack(&reply[..n]) {
                            return Ok(true);
                        }
                        // Not the acknowledgement we are waiting for; keep listening within this
                        // attempt's window.
                    }
                    Err(err) if is_timeout(&err) => break,
                    Err(err) => return Err(TransportError::Receive(err)),
                }
            }
        }
        Ok(false)
    }
}
