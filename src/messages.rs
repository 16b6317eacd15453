/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The two record types that travel on the wire during an agreement run: the [Message] carrying an
//! order and the chain of processes it passed through, and the acknowledgement that makes delivery
//! over UDP reliable.
//!
//! ## Wire format
//!
//! Both records begin with a header of 32-bit big-endian integers. A data message is laid out as
//! `type (4) | size (4) | round (4) | order (4)` followed by one 32-bit id per hop in its chain,
//! where `type` is [MESSAGE_TYPE] and `size` is the total length of the datagram in bytes. An
//! acknowledgement is `type (4) | size (4) | round (4)` with `type` equal to [ACK_TYPE]. Datagrams
//! longer than [MAX_DATAGRAM_SIZE] bytes are never produced and never accepted, which admits chains
//! of up to 252 hops.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// `type` field value identifying a data message.
pub const MESSAGE_TYPE: u32 = 1;

/// `type` field value identifying an acknowledgement.
pub const ACK_TYPE: u32 = 2;

/// Byte length of the fixed part of a data message.
pub const MESSAGE_HEADER_SIZE: usize = 16;

/// Byte length of an acknowledgement.
pub const ACK_SIZE: usize = 12;

/// The largest datagram the transport accepts.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// The order the generals are trying to agree on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Order {
    Retreat,
    Attack,
    /// The placeholder carried in forwarded messages whose underlying order the forwarder had
    /// already recorded (per the paper: "a message reporting that he will not send such a
    /// message"). Never chosen as a decision.
    NoOrder,
}

impl Order {
    fn from_wire(value: u32) -> Option<Order> {
        match value {
            0 => Some(Order::Retreat),
            1 => Some(Order::Attack),
            2 => Some(Order::NoOrder),
            _ => None,
        }
    }

    fn to_wire(self) -> u32 {
        match self {
            Order::Retreat => 0,
            Order::Attack => 1,
            Order::NoOrder => 2,
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::Retreat => write!(f, "retreat"),
            Order::Attack => write!(f, "attack"),
            Order::NoOrder => write!(f, "no_order"),
        }
    }
}

impl FromStr for Order {
    type Err = ParseOrderError;

    /// Accepts the two orders a commander can be configured with. [Order::NoOrder] is internal to
    /// the algorithm and deliberately not parseable.
    fn from_str(s: &str) -> Result<Order, ParseOrderError> {
        match s {
            "retreat" => Ok(Order::Retreat),
            "attack" => Ok(Order::Attack),
            _ => Err(ParseOrderError),
        }
    }
}

#[derive(Debug)]
pub struct ParseOrderError;

impl fmt::Display for ParseOrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order can either be \"attack\" or \"retreat\"")
    }
}

impl std::error::Error for ParseOrderError {}

/// A Byzantine message: an order together with the round it was sent in and the chain of process
/// ids it has been forwarded through. `ids` always starts at the commander (id 0) and a round-r
/// message carries exactly r + 1 ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Message {
    pub round: u32,
    pub order: Order,
    pub ids: Vec<u32>,
}

/// Messages order lexicographically by `(round, ids, order)`, so that sets of messages iterate
/// round by round and chain by chain.
impl Ord for Message {
    fn cmp(&self, other: &Message) -> Ordering {
        self.round
            .cmp(&other.round)
            .then_with(|| self.ids.cmp(&other.ids))
            .then_with(|| self.order.cmp(&other.order))
    }
}

impl PartialOrd for Message {
    fn partial_cmp(&self, other: &Message) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{round: {}, order: {}, ids: <", self.round, self.order)?;
        for (i, id) in self.ids.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", id)?;
        }
        write!(f, ">}}")
    }
}

/// Encodes `msg` into its wire representation.
pub fn encode_message(msg: &Message) -> Vec<u8> {
    let size = MESSAGE_HEADER_SIZE + 4 * msg.ids.len();
    let mut buf = Vec::with_capacity(size);
    buf.extend_from_slice(&MESSAGE_TYPE.to_be_bytes());
    buf.extend_from_slice(&(size as u32).to_be_bytes());
    buf.extend_from_slice(&msg.round.to_be_bytes());
    buf.extend_from_slice(&msg.order.to_wire().to_be_bytes());
    for id in &msg.ids {
        buf.extend_from_slice(&id.to_be_bytes());
    }
    buf
}

/// Decodes a [Message] from a received datagram. Returns `None` when the buffer is shorter than
/// the message header, the type tag is wrong, the size field disagrees with the buffer length, or
/// the order value is out of range.
pub fn decode_message(buf: &[u8]) -> Option<Message> {
    if buf.len() < MESSAGE_HEADER_SIZE || buf.len() > MAX_DATAGRAM_SIZE {
        return None;
    }
    if read_u32(buf, 0)? != MESSAGE_TYPE {
        return None;
    }
    if read_u32(buf, 4)? as usize != buf.len() {
        return None;
    }
    let round = read_u32(buf, 8)?;
    let order = Order::from_wire(read_u32(buf, 12)?)?;
    let ids = buf[MESSAGE_HEADER_SIZE..]
        .chunks_exact(4)
        .filter_map(|chunk| chunk.try_into().ok())
        .map(u32::from_be_bytes)
        .collect();
    Some(Message { round, order, ids })
}

/// Encodes an acknowledgement for `round`.
pub fn encode_ack(round: u32) -> [u8; ACK_SIZE] {
    let mut buf = [0u8; ACK_SIZE];
    buf[0..4].copy_from_slice(&ACK_TYPE.to_be_bytes());
    buf[4..8].copy_from_slice(&(ACK_SIZE as u32).to_be_bytes());
    buf[8..12].copy_from_slice(&round.to_be_bytes());
    buf
}

/// Decodes an acknowledgement and returns its round number. Returns `None` unless the buffer is
/// exactly [ACK_SIZE] bytes and carries the acknowledgement type tag.
pub fn decode_ack(buf: &[u8]) -> Option<u32> {
    if buf.len() != ACK_SIZE {
        return None;
    }
    if read_u32(buf, 0)? != ACK_TYPE {
        return None;
    }
    read_u32(buf, 8)
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_be_bytes(bytes.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips() {
        let msg = Message {
            round: 2,
            order: Order::Attack,
            ids: vec![0, 3, 1],
        };
        let buf = encode_message(&msg);
        assert_eq!(buf.len(), MESSAGE_HEADER_SIZE + 12);
        assert_eq!(decode_message(&buf), Some(msg));
    }

    #[test]
    fn chainless_message_round_trips() {
        let msg = Message {
            round: 0,
            order: Order::NoOrder,
            ids: vec![],
        };
        assert_eq!(decode_message(&encode_message(&msg)), Some(msg));
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let buf = encode_message(&Message {
            round: 0,
            order: Order::Attack,
            ids: vec![0],
        });
        assert_eq!(decode_message(&buf[..MESSAGE_HEADER_SIZE - 1]), None);
        // Chopping off part of the chain makes the size field disagree with the buffer.
        assert_eq!(decode_message(&buf[..buf.len() - 1]), None);
    }

    #[test]
    fn size_field_must_match_buffer_length() {
        let mut buf = encode_message(&Message {
            round: 1,
            order: Order::Retreat,
            ids: vec![0, 2],
        });
        buf[4..8].copy_from_slice(&1000u32.to_be_bytes());
        assert_eq!(decode_message(&buf), None);
    }

    #[test]
    fn wrong_type_tag_is_rejected() {
        let mut buf = encode_message(&Message {
            round: 0,
            order: Order::Attack,
            ids: vec![0],
        });
        buf[0..4].copy_from_slice(&ACK_TYPE.to_be_bytes());
        assert_eq!(decode_message(&buf), None);
    }

    #[test]
    fn out_of_range_orders_are_rejected() {
        for raw_order in 3..=255u32 {
            let mut buf = encode_message(&Message {
                round: 0,
                order: Order::Attack,
                ids: vec![0],
            });
            buf[12..16].copy_from_slice(&raw_order.to_be_bytes());
            assert_eq!(decode_message(&buf), None);
        }
    }

    #[test]
    fn oversized_datagram_is_rejected() {
        let msg = Message {
            round: 0,
            order: Order::Attack,
            ids: vec![7; (MAX_DATAGRAM_SIZE - MESSAGE_HEADER_SIZE) / 4 + 1],
        };
        assert_eq!(decode_message(&encode_message(&msg)), None);
    }

    #[test]
    fn ack_round_trips() {
        for round in [0, 1, 7, u32::MAX] {
            assert_eq!(decode_ack(&encode_ack(round)), Some(round));
        }
    }

    #[test]
    fn ack_requires_exact_size_and_type() {
        let buf = encode_ack(3);
        assert_eq!(decode_ack(&buf[..ACK_SIZE - 1]), None);

        let mut extended = buf.to_vec();
        extended.push(0);
        assert_eq!(decode_ack(&extended), None);

        let mut retyped = buf;
        retyped[0..4].copy_from_slice(&MESSAGE_TYPE.to_be_bytes());
        assert_eq!(decode_ack(&retyped), None);
    }

    #[test]
    fn messages_order_by_round_then_chain_then_order() {
        let early = Message {
            round: 0,
            order: Order::NoOrder,
            ids: vec![0],
        };
        let mid = Message {
            round: 1,
            order: Order::Attack,
            ids: vec![0, 1],
        };
        let late = Message {
            round: 1,
            order: Order::Retreat,
            ids: vec![0, 2],
        };
        assert!(early < mid);
        assert!(mid < late);

        let rewritten = Message {
            order: Order::NoOrder,
            ..mid.clone()
        };
        assert_ne!(mid.cmp(&rewritten), Ordering::Equal);
    }

    #[test]
    fn order_parses_cli_strings_only() {
        assert_eq!("attack".parse::<Order>().ok(), Some(Order::Attack));
        assert_eq!("retreat".parse::<Order>().ok(), Some(Order::Retreat));
        assert!("no_order".parse::<Order>().is_err());
        assert!("ATTACK".parse::<Order>().is_err());
    }
}
