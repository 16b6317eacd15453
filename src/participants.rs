//! The process registry: which processes participate in the run, where they live on the network,
//! and the shared per-peer transport handles built from that list.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::networking::{Address, AddressError, Client, TransportError};

/// Identifies a participating process: its index in the [ProcessList] after commander
/// normalization. Process 0 is always the commander.
pub type ProcessId = u32;

/// The ordered list of the n participating processes, where index i is the endpoint of process i.
/// Immutable once the run starts.
#[derive(Clone, Debug)]
pub struct ProcessList {
    processes: Vec<Address>,
}

impl ProcessList {
    pub fn new(processes: Vec<Address>) -> ProcessList {
        ProcessList { processes }
    }

    /// Reads a hostfile: whitespace-separated `hostname` or `hostname:port` entries, where the
    /// entry's position is the process's id before commander normalization. Entries without a
    /// port take `default_port`.
    pub fn from_hostfile(
        path: impl AsRef<Path>,
        default_port: Option<u16>,
    ) -> Result<ProcessList, HostfileError> {
        let contents = fs::read_to_string(path).map_err(HostfileError::Read)?;
        let mut processes = Vec::new();
        for entry in contents.split_whitespace() {
            processes.push(Address::parse(entry, default_port)?);
        }
        Ok(ProcessList { processes })
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn get(&self, id: ProcessId) -> Option<&Address> {
        self.processes.get(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.processes.iter()
    }

    /// Normalizes the list so that the configured commander sits at index 0. Callers that derived
    /// their own id before normalizing must remap it: the swap moves ids 0 and `commander_id`,
    /// and leaves every other id where it was.
    pub fn swap_commander_to_front(&mut self, commander_id: ProcessId) {
        if commander_id as usize >= self.processes.len() {
            panic!("Programming error: commander id out of bounds of the process list.");
        }
        self.processes.swap(0, commander_id as usize);
    }

    /// Finds the process running on this host by comparing hostfile entries against the local
    /// hostname. Errors when the local host appears more than once (an explicit id is needed to
    /// break the tie) or not at all.
    pub fn local_process_id(&self) -> Result<ProcessId, HostfileError> {
        let local = local_hostname()?;
        let mut found = None;
        for (id, address) in self.processes.iter().enumerate() {
            if address.hostname() == local {
                if found.is_some() {
                    return Err(HostfileError::AmbiguousLocalHost(local));
                }
                found = Some(id as ProcessId);
            }
        }
        found.ok_or(HostfileError::LocalHostNotListed(local))
    }

    /// Whether the entry for `id` names the host this process is running on. Used to validate an
    /// explicitly supplied id against the hostfile.
    pub fn is_on_local_host(&self, id: ProcessId) -> Result<bool, HostfileError> {
        let local = local_hostname()?;
        Ok(self
            .get(id)
            .map_or(false, |address| address.hostname() == local))
    }
}

fn local_hostname() -> Result<String, HostfileError> {
    hostname::get()
        .map_err(HostfileError::Hostname)?
        .into_string()
        .map_err(|_| {
            HostfileError::Hostname(io::Error::new(
                io::ErrorKind::InvalidData,
                "local hostname is not valid UTF-8",
            ))
        })
}

/// One shared [Client] per process, created before round 0 and reused by every sender worker for
/// the lifetime of the run.
pub struct Clients {
    clients: Vec<Arc<Client>>,
}

impl Clients {
    pub fn connect(
        processes: &ProcessList,
        ack_timeout: Duration,
    ) -> Result<Clients, TransportError> {
        let mut clients = Vec::with_capacity(processes.len());
        for address in processes.iter() {
            clients.push(Arc::new(Client::new(address.socket_addr(), ack_timeout)?));
        }
        Ok(Clients { clients })
    }

    /// Hands out the shared handle for `id`.
    pub fn get(&self, id: ProcessId) -> Arc<Client> {
        // Safety: ids come from the process list the clients were built from, or from chains
        // validated against it.
        self.clients[id as usize].clone()
    }
}

#[derive(Debug)]
pub enum HostfileError {
    Read(io::Error),
    Address(AddressError),
    Hostname(io::Error),
    AmbiguousLocalHost(String),
    LocalHostNotListed(String),
}

impl From<AddressError> for HostfileError {
    fn from(err: AddressError) -> HostfileError {
        HostfileError::Address(err)
    }
}

impl fmt::Display for HostfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostfileError::Read(err) => write!(f, "could not open hostfile: {}", err),
            HostfileError::Address(err) => write!(f, "bad hostfile entry: {}", err),
            HostfileError::Hostname(err) => {
                write!(f, "could not determine the local hostname: {}", err)
            }
            HostfileError::AmbiguousLocalHost(host) => write!(
                f,
                "\"{}\" appears more than once in the hostfile; use an explicit id",
                host
            ),
            HostfileError::LocalHostNotListed(host) => {
                write!(f, "current hostname \"{}\" not found in hostfile", host)
            }
        }
    }
}

impl std::error::Error for HostfileError {}
