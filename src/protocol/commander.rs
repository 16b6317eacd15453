/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The commander's half of the algorithm: a single parallel fan-out of the initial order to every
//! lieutenant. The commander's decision is trivially its own configured order.

use rand::Rng;

use crate::behavior::MaliciousBehavior;
use crate::config::Configuration;
use crate::messages::{Message, Order};
use crate::participants::{Clients, ProcessId, ProcessList};
use crate::protocol::{send_message, SenderPool};
use crate::networking::TransportError;

pub struct Commander {
    processes: ProcessList,
    clients: Clients,
    behavior: MaliciousBehavior,
    config: Configuration,
    order: Order,
}

impl Commander {
    /// Creates the commander over `processes`, which must already be normalized so that the
    /// commander sits at index 0.
    pub fn new(
        processes: ProcessList,
        order: Order,
        behavior: MaliciousBehavior,
        config: Configuration,
    ) -> Result<Commander, TransportError> {
        let clients = Clients::connect(&processes, config.ack_timeout)?;
        Ok(Commander {
            processes,
            clients,
            behavior,
            config,
            order,
        })
    }

    /// Sends the round-0 order to every lieutenant and returns the commander's true order as its
    /// own decision. The commander never listens.
    ///
    /// The fan-out runs one sender per lieutenant, in parallel. Sending serially would let the
    /// first lieutenant complete round 0 while the last was still waiting for its order, which
    /// undermines the round-timeout assumption the lieutenants run under.
    pub fn decide(&self) -> Order {
        let senders = SenderPool::new(self.processes.len());
        for pid in 1..self.processes.len() as ProcessId {
            if !self.behavior.should_send(&self.config) {
                continue;
            }
            let msg = Message {
                round: 0,
                order: self.order_for_msg(),
                ids: vec![0],
            };
            log::debug!("sending {} to p{}", msg, pid);

            let client = self.clients.get(pid);
            let behavior = self.behavior;
            let config = self.config.clone();
            senders.add(move || {
                behavior.maybe_delay(&config);
                send_message(&client, &msg, &config);
            });
        }
        senders.join_all();
        self.order
    }

    // The order to place in an outbound message. A wrong_order commander flips it with the
    // configured probability, re-rolled for every recipient, so different lieutenants may be told
    // different things.
    fn order_for_msg(&self) -> Order {
        if self.behavior.exhibits(MaliciousBehavior::WRONG_ORDER)
            && rand::thread_rng().gen_bool(self.config.wrong_order_probability)
        {
            return match self.order {
                Order::Attack => Order::Retreat,
                _ => Order::Attack,
            };
        }
        self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::networking::Address;

    fn test_processes(n: usize) -> ProcessList {
        // Nothing listens on these ports; sends are simply lost.
        ProcessList::new(
            (0..n)
                .map(|i| Address::resolve("127.0.0.1", 39300 + i as u16).unwrap())
                .collect(),
        )
    }

    fn test_config() -> Configuration {
        Configuration {
            ack_timeout: Duration::from_millis(10),
            send_attempts: 1,
            ..Configuration::default()
        }
    }

    #[test]
    fn decide_returns_the_true_order() {
        let commander = Commander::new(
            test_processes(4),
            Order::Attack,
            MaliciousBehavior::NONE,
            test_config(),
        )
        .unwrap();
        assert_eq!(commander.decide(), Order::Attack);
    }

    #[test]
    fn even_a_lying_commander_reports_its_true_order() {
        let commander = Commander::new(
            test_processes(4),
            Order::Retreat,
            MaliciousBehavior::WRONG_ORDER,
            test_config(),
        )
        .unwrap();
        assert_eq!(commander.decide(), Order::Retreat);
    }

    #[test]
    fn a_silent_commander_still_decides() {
        let commander = Commander::new(
            test_processes(4),
            Order::Attack,
            MaliciousBehavior::SILENT,
            test_config(),
        )
        .unwrap();
        assert_eq!(commander.decide(), Order::Attack);
    }

    #[test]
    fn loyal_commanders_never_flip_the_order() {
        let commander = Commander::new(
            test_processes(4),
            Order::Attack,
            MaliciousBehavior::NONE,
            test_config(),
        )
        .unwrap();
        assert!((0..200).all(|_| commander.order_for_msg() == Order::Attack));
    }

    #[test]
    fn wrong_order_commanders_flip_sometimes_but_not_always() {
        let commander = Commander::new(
            test_processes(4),
            Order::Attack,
            MaliciousBehavior::WRONG_ORDER,
            test_config(),
        )
        .unwrap();
        let flipped = (0..1000)
            .filter(|_| commander.order_for_msg() == Order::Retreat)
            .count();
        // p = 0.30; the bounds are over ten sigma out.
        assert!(flipped > 150 && flipped < 450, "flipped {} of 1000", flipped);
    }
}
