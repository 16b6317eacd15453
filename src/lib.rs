//! An implementation of the Byzantine Generals agreement algorithm (the oral-messages variant of
//! Lamport, Shostak & Pease, 1982) over UDP. A commander and n - 1 lieutenants run faulty + 1
//! rounds of message exchange and reach agreement on a single order despite up to `faulty`
//! traitors, provided n >= faulty + 2.

pub mod behavior;

pub mod config;

pub mod messages;

pub mod networking;

pub mod participants;

pub mod protocol;

// Re-exports
pub use behavior::MaliciousBehavior;
pub use config::Configuration;
pub use messages::{Message, Order};
pub use participants::{ProcessId, ProcessList};
pub use protocol::{Commander, General, Lieutenant};
