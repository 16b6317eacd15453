/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The agreement protocol: the [Commander]'s round-0 fan-out, the [Lieutenant]'s round-driven
//! agreement engine, and the sender workers both roles use to push messages to their peers.

pub mod commander;

pub mod lieutenant;

pub mod rounds;

pub use commander::Commander;
pub use lieutenant::Lieutenant;

use threadpool::ThreadPool;

use crate::config::Configuration;
use crate::messages::{decode_ack, encode_ack, encode_message, Message, Order};
use crate::networking::{Client, Replier, ServerAction, TransportError};

/// A participant in the agreement algorithm: the commander, which dictates an order, or a
/// lieutenant, which coordinates with its peers to agree on one.
pub enum General {
    Commander(Commander),
    Lieutenant(Lieutenant),
}

impl General {
    /// Runs the algorithm to completion and returns this process's decision.
    pub fn decide(&mut self) -> Result<Order, TransportError> {
        match self {
            General::Commander(commander) => Ok(commander.decide()),
            General::Lieutenant(lieutenant) => lieutenant.decide(),
        }
    }
}

/// Encodes `msg` and sends it to `client` with acknowledged retries. An acknowledgement only
/// counts if it names the message's round. Exhausting every attempt is not an error: the message
/// is treated as lost, which the algorithm tolerates.
pub(crate) fn send_message(client: &Client, msg: &Message, config: &Configuration) {
    let buf = encode_message(msg);
    let round = msg.round;
    let result = client.send_with_ack(&buf, config.send_attempts, |reply| {
        match decode_ack(reply) {
            Some(ack_round) if ack_round == round => ServerAction::Stop,
            _ => ServerAction::Continue,
        }
    });
    match result {
        Ok(true) => (),
        Ok(false) => log::debug!(
            "no acknowledgement for {} after {} attempts",
            msg,
            config.send_attempts
        ),
        Err(err) => log::warn!("sending {} failed: {}", msg, err),
    }
}

/// Best-effort acknowledgement for `round`, sent once and never retried.
pub(crate) fn send_ack(replier: &Replier<'_>, round: u32) {
    if let Err(err) = replier.send(&encode_ack(round)) {
        log::debug!("sending ack for round {} failed: {}", round, err);
    }
}

/// The sender workers of a round. Backed by a thread pool with one thread per process, so that a
/// round's sends genuinely run in parallel; [SenderPool::join_all] is the round barrier.
pub(crate) struct SenderPool {
    pool: ThreadPool,
}

impl SenderPool {
    pub(crate) fn new(workers: usize) -> SenderPool {
        SenderPool {
            pool: ThreadPool::new(workers.max(1)),
        }
    }

    pub(crate) fn add<F: FnOnce() + Send + 'static>(&self, job: F) {
        self.pool.execute(job);
    }

    /// Blocks until every sender queued so far has finished. A panicked worker is replaced by the
    /// pool and does not take the caller down with it.
    pub(crate) fn join_all(&self) {
        self.pool.join();
    }
}
