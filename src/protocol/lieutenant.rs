/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The lieutenant's agreement engine: the round-driven state machine at the heart of the
//! algorithm.
//!
//! A lieutenant spends its whole life inside [Server::listen]. Every datagram is decoded and
//! validated against the algorithm's preconditions; surviving messages are acknowledged, recorded,
//! and staged for forwarding with this process's id appended to their chain. A round ends either
//! when the expected number of distinct chains for the round has arrived
//! ([rounds::messages_for_round]) or when the round's time budget runs out, whichever comes first.
//! After round `faulty + 1` the engine leaves the loop and derives the decision from the set of
//! distinct orders it has seen.
//!
//! ## Dual timeout
//!
//! Both the socket receive timeout and a per-round timer are enforced. The socket timeout alone is
//! not enough: a traitor that dribbles one valid-looking datagram just inside the socket timeout
//! would reset it forever without the round making progress. The round timer is checked after
//! every callback and is reset only on a round transition.
//!
//! ## Threading
//!
//! The receive thread is the sole mutator of agreement state. Sender workers launched at round
//! boundaries read only the snapshots captured at launch (their per-peer message batch and the
//! shared client handle), and the previous round's workers are joined before the next round's are
//! staged.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::mem;
use std::net::SocketAddr;
use std::time::Instant;

use crate::behavior::MaliciousBehavior;
use crate::config::Configuration;
use crate::messages::{decode_message, Message, Order};
use crate::networking::{Handler, Replier, Server, ServerAction, TransportError};
use crate::participants::{Clients, ProcessId, ProcessList};
use crate::protocol::{rounds, send_ack, send_message, SenderPool};

pub struct Lieutenant {
    server: Server,
    engine: Engine,
}

impl Lieutenant {
    /// Creates a lieutenant with the given id, binding its server to the port its own hostfile
    /// entry names. `processes` must already be normalized so the commander sits at index 0.
    pub fn new(
        processes: ProcessList,
        id: ProcessId,
        faulty: u32,
        behavior: MaliciousBehavior,
        config: Configuration,
    ) -> Result<Lieutenant, TransportError> {
        let address = processes
            .get(id)
            .expect("Programming error: lieutenant id out of bounds of the process list.");
        let server = Server::bind(address.port(), config.round_timeout)?;
        let clients = Clients::connect(&processes, config.ack_timeout)?;
        let senders = SenderPool::new(processes.len());
        Ok(Lieutenant {
            server,
            engine: Engine {
                id,
                faulty,
                behavior,
                config,
                processes,
                clients,
                senders,
                round: 0,
                orders_seen: BTreeSet::new(),
                msgs_this_round: BTreeSet::new(),
                chains_this_round: HashSet::new(),
                round_start: Instant::now(),
            },
        })
    }

    /// Runs the receive loop until the terminal round completes or times out, then computes the
    /// decision.
    pub fn decide(&mut self) -> Result<Order, TransportError> {
        self.server.listen(&mut self.engine)?;
        let decision = self.engine.decide_order();
        log::info!("decided on {}", decision);
        Ok(decision)
    }
}

/// The agreement state machine. Owned and driven exclusively by the receive thread.
struct Engine {
    id: ProcessId,
    faulty: u32,
    behavior: MaliciousBehavior,
    config: Configuration,
    processes: ProcessList,
    clients: Clients,
    senders: SenderPool,

    /// The current round, in `0..=faulty + 1`. Only ever increments.
    round: u32,
    /// Every distinct real order seen over the whole run. Never contains [Order::NoOrder] and
    /// never holds more than the two real orders.
    orders_seen: BTreeSet<Order>,
    /// Messages accepted this round, staged for forwarding in the next.
    msgs_this_round: BTreeSet<Message>,
    /// Chains accepted this round. This is the replay key rather than the whole message: the
    /// already-seen rule may rewrite a message's order after arrival, and two rewrites of the same
    /// chain must still collide.
    chains_this_round: HashSet<Vec<u32>>,
    /// When the current round began. The round timeout is measured from here on the monotonic
    /// clock.
    round_start: Instant,
}

impl Handler for Engine {
    fn on_receive(&mut self, replier: Replier<'_>, buf: &[u8]) -> ServerAction {
        let mut msg = match decode_message(buf) {
            Some(msg) if self.valid_message(&msg, replier.peer()) => msg,
            // Malformed or invalid messages are dropped without a response; answering them would
            // only give a hostile peer something to work with.
            _ => return self.continue_unless_timeout(),
        };

        log::debug!("received {} from {}", msg, replier.peer());
        send_ack(&replier, self.round);

        let mut new_round = false;
        if self.first_round() {
            // Only the first real order counts; round 0 ignores everything else, including
            // no-order messages from a commander with nothing to say.
            if msg.order != Order::NoOrder && self.orders_seen.is_empty() {
                self.orders_seen.insert(msg.order);
                self.msgs_this_round.insert(msg);
                new_round = true;
            }
        } else if msg.round == self.round && !self.chains_this_round.contains(&msg.ids) {
            self.chains_this_round.insert(msg.ids.clone());

            if msg.order != Order::NoOrder && !self.orders_seen.contains(&msg.order) {
                self.orders_seen.insert(msg.order);
            } else {
                // Already seen (or carrying no order at all): forward a no-order in its place.
                msg.order = Order::NoOrder;
            }
            self.msgs_this_round.insert(msg);

            new_round = self.round_complete();
        }

        if new_round {
            return self.advance_or_stop();
        }
        self.continue_unless_timeout()
    }

    fn on_timeout(&mut self) -> ServerAction {
        self.handle_round_timeout()
    }
}

impl Engine {
    fn first_round(&self) -> bool {
        self.round == 0
    }

    fn last_round(&self) -> bool {
        self.round == self.faulty + 1
    }

    fn round_complete(&self) -> bool {
        self.chains_this_round.len() == rounds::messages_for_round(self.processes.len(), self.round)
    }

    /// Validates that `msg` makes sense in the current state of the algorithm and that its chain
    /// is well formed. This is the whole defence against malicious messages.
    fn valid_message(&self, msg: &Message, from: SocketAddr) -> bool {
        // Messages from future rounds are dropped outright. Late arrivals from the current or
        // earlier rounds pass; the receive path only records current-round chains.
        if msg.round > self.round {
            return false;
        }
        // A round-r message carries a chain of exactly r + 1 ids.
        if msg.ids.len() != msg.round as usize + 1 {
            return false;
        }
        // Every chain starts at the commander.
        if msg.ids.first() != Some(&0) {
            return false;
        }
        // Ids must be known processes, must not repeat, and must not include us.
        let mut seen = HashSet::with_capacity(msg.ids.len());
        for &id in &msg.ids {
            if id as usize >= self.processes.len() || id == self.id || !seen.insert(id) {
                return false;
            }
        }
        // The purported forwarder must match the datagram's source host. This cannot tell apart
        // processes co-hosted on one machine, because a datagram's source port is not the
        // sender's listening port; that limitation is accepted.
        let Some(&last) = msg.ids.last() else {
            return false;
        };
        match self.processes.get(last) {
            Some(address) => address.socket_addr().ip() == from.ip(),
            None => false,
        }
    }

    /// Checks the round timer and runs the round-timeout path if the budget is spent. The listen
    /// loop always re-arms afterwards: a terminal verdict from the timeout handler is picked up on
    /// the next socket timeout instead.
    fn continue_unless_timeout(&mut self) -> ServerAction {
        if self.round_start.elapsed() > self.config.round_timeout {
            let _ = self.handle_round_timeout();
        }
        ServerAction::Continue
    }

    fn handle_round_timeout(&mut self) -> ServerAction {
        if self.first_round() {
            // No progress is possible without the commander; keep waiting.
            return ServerAction::Continue;
        }
        log::info!("timeout in round {}", self.round);
        self.advance_or_stop()
    }

    fn advance_or_stop(&mut self) -> ServerAction {
        if self.last_round() {
            self.senders.join_all();
            return ServerAction::Stop;
        }
        self.init_new_round();
        ServerAction::Continue
    }

    /// Moves to the next round: drains the previous round's senders, stages every message
    /// accepted last round for forwarding with this process's id appended, launches one sender
    /// worker per target process, and resets the per-round state.
    fn init_new_round(&mut self) {
        self.senders.join_all();

        self.round += 1;
        log::info!("moving to round {}", self.round);

        // Stage the full forwarding plan before any worker launches, so that every outgoing
        // payload already carries the new round number.
        let mut to_send: HashMap<ProcessId, Vec<Message>> = HashMap::new();
        for mut msg in mem::take(&mut self.msgs_this_round) {
            if msg.round != self.round - 1 {
                panic!("Programming error: message staged for forwarding is not from the previous round.");
            }
            msg.round = self.round;
            msg.ids.push(self.id);

            for pid in 0..self.processes.len() as ProcessId {
                // Only processes that have not yet carried this message.
                if msg.ids.contains(&pid) {
                    continue;
                }
                if self.behavior.should_send(&self.config) {
                    log::debug!("sending {} to p{}", msg, pid);
                    to_send.entry(pid).or_default().push(msg.clone());
                }
            }
        }

        for (pid, batch) in to_send {
            let client = self.clients.get(pid);
            let behavior = self.behavior;
            let config = self.config.clone();
            self.senders.add(move || {
                // One worker per peer; its messages go out serially on the shared client.
                for msg in &batch {
                    behavior.maybe_delay(&config);
                    send_message(&client, msg, &config);
                }
            });
        }

        self.chains_this_round.clear();
        self.round_start = Instant::now();
    }

    /// The decision rule over the orders seen across the whole run:
    ///
    /// ```text
    /// choice(V) := v        if V = {v}
    ///            | retreat  if V = {} or |V| >= 2
    /// ```
    fn decide_order(&self) -> Order {
        if self.orders_seen.len() == 1 && self.orders_seen.contains(&Order::Attack) {
            return Order::Attack;
        }
        Order::Retreat
    }
}
