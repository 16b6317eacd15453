//! Helpers for the end-to-end agreement tests: a logger that tags lines with their thread, and a
//! harness that runs a whole agreement scenario over real UDP sockets on the loopback interface.

use std::io;
use std::sync::Once;
use std::thread::{self, JoinHandle};

use log::LevelFilter;

use byzantine_generals::behavior::MaliciousBehavior;
use byzantine_generals::config::Configuration;
use byzantine_generals::messages::Order;
use byzantine_generals::networking::Address;
use byzantine_generals::participants::{ProcessId, ProcessList};
use byzantine_generals::protocol::{Commander, Lieutenant};

static LOGGER_INIT: Once = Once::new();

// Set up a logger that logs all log messages with level Trace and above.
pub fn setup_logger(level: LevelFilter) {
    LOGGER_INIT.call_once(|| {
        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "[{:?}][{}] {}",
                    thread::current().id(),
                    record.level(),
                    message
                ))
            })
            .level(level)
            .chain(io::stdout())
            .apply()
            .unwrap();
    })
}

/// One agreement run on the loopback interface. Process 0 is the commander; `behaviors[i]` is
/// process i's malicious profile. Ports `base_port..base_port + n` must not collide with any other
/// scenario in the suite.
pub struct Scenario {
    pub base_port: u16,
    pub faulty: u32,
    pub commander_order: Order,
    pub behaviors: Vec<MaliciousBehavior>,
}

impl Scenario {
    /// Runs the scenario to completion and returns every process's decision, indexed by process
    /// id. Panics if any process fails, exactly as a test should.
    pub fn run(self) -> Vec<Order> {
        self.run_with_commander_view(None)
    }

    /// Like [Scenario::run], but the commander fans out over `commander_view` instead of the real
    /// process list. Pointing some of its entries at unused ports models a commander that only
    /// reaches part of the fleet.
    pub fn run_with_commander_view(self, commander_view: Option<ProcessList>) -> Vec<Order> {
        let n = self.behaviors.len();
        assert!(n >= self.faulty as usize + 2);
        let config = Configuration::default();

        let processes = loopback_processes(self.base_port, n);

        // Construct every lieutenant before the commander starts, so all server sockets are bound
        // before the first round-0 datagram can fly.
        let lieutenants: Vec<(ProcessId, Lieutenant)> = (1..n as ProcessId)
            .map(|id| {
                let lieutenant = Lieutenant::new(
                    processes.clone(),
                    id,
                    self.faulty,
                    self.behaviors[id as usize],
                    config.clone(),
                )
                .unwrap();
                (id, lieutenant)
            })
            .collect();

        let handles: Vec<JoinHandle<Order>> = lieutenants
            .into_iter()
            .map(|(id, mut lieutenant)| {
                thread::Builder::new()
                    .name(format!("lieutenant-{}", id))
                    .spawn(move || lieutenant.decide().unwrap())
                    .unwrap()
            })
            .collect();

        let commander = Commander::new(
            commander_view.unwrap_or_else(|| processes.clone()),
            self.commander_order,
            self.behaviors[0],
            config,
        )
        .unwrap();

        let mut decisions = vec![commander.decide()];
        for handle in handles {
            decisions.push(handle.join().unwrap());
        }
        decisions
    }
}

pub fn loopback_processes(base_port: u16, n: usize) -> ProcessList {
    ProcessList::new(
        (0..n)
            .map(|i| Address::resolve("127.0.0.1", base_port + i as u16).unwrap())
            .collect(),
    )
}
