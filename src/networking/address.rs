use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

/// The location of a participating process: a `host:port` pair, resolved once at startup.
///
/// Resolution is eager so that a bad hostfile entry fails the process before the algorithm starts
/// rather than in the middle of a round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    hostname: String,
    port: u16,
    socket_addr: SocketAddr,
}

impl Address {
    /// Resolves `hostname:port` into an [Address].
    pub fn resolve(hostname: &str, port: u16) -> Result<Address, AddressError> {
        let socket_addr = (hostname, port)
            .to_socket_addrs()
            .map_err(|err| AddressError::Resolve {
                host: hostname.to_string(),
                err,
            })?
            .next()
            .ok_or_else(|| AddressError::NoRecords(hostname.to_string()))?;
        Ok(Address {
            hostname: hostname.to_string(),
            port,
            socket_addr,
        })
    }

    /// Parses a hostfile entry of the form `hostname` or `hostname:port`, falling back to
    /// `default_port` when the entry does not carry its own port.
    pub fn parse(entry: &str, default_port: Option<u16>) -> Result<Address, AddressError> {
        match entry.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| AddressError::BadPort(entry.to_string()))?;
                Address::resolve(host, port)
            }
            None => match default_port {
                Some(port) => Address::resolve(entry, port),
                None => Err(AddressError::MissingPort(entry.to_string())),
            },
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.socket_addr
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

#[derive(Debug)]
pub enum AddressError {
    Resolve { host: String, err: io::Error },
    NoRecords(String),
    BadPort(String),
    MissingPort(String),
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::Resolve { host, err } => {
                write!(f, "could not resolve host \"{}\": {}", host, err)
            }
            AddressError::NoRecords(host) => {
                write!(f, "host \"{}\" resolved to no addresses", host)
            }
            AddressError::BadPort(entry) => {
                write!(f, "entry \"{}\" has an unparseable port", entry)
            }
            AddressError::MissingPort(entry) => write!(
                f,
                "entry \"{}\" has no port and no default port was provided",
                entry
            ),
        }
    }
}

impl std::error::Error for AddressError {}
