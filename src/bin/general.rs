/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Command-line entry point for a single general process.
//!
//! # Usage
//!
//! ```bash
//! # A commander ordering an attack, tolerating one traitor among four processes:
//! general --hostfile hosts.txt --faulty 1 --commander-id 0 --order attack
//!
//! # A lieutenant on the same run:
//! general --hostfile hosts.txt --faulty 1 --commander-id 0
//!
//! # A traitorous lieutenant that stays silent and, separately, delays what it does send:
//! general --hostfile hosts.txt --faulty 1 --commander-id 0 -m silent -m delay_send
//! ```
//!
//! The hostfile lists one `hostname` or `hostname:port` entry per line; the line number is the
//! process's id. Entries without a port take `--port`. On completion the process prints
//! `<id>: Agreed on <order>` and exits.

use std::io;
use std::path::PathBuf;
use std::process::exit;
use std::str::FromStr;
use std::thread;

use anyhow::{bail, Context};
use clap::Parser;
use log::LevelFilter;

use byzantine_generals::behavior::MaliciousBehavior;
use byzantine_generals::config::Configuration;
use byzantine_generals::messages::Order;
use byzantine_generals::participants::{ProcessId, ProcessList};
use byzantine_generals::protocol::{Commander, General, Lieutenant};

/// An implementation of the Byzantine Generals agreement algorithm.
#[derive(Parser)]
#[command(name = "general", version, about)]
struct Cli {
    /// Path to a file listing one `hostname` or `hostname:port` participant per line. The line
    /// number is the process's id before commander normalization.
    #[arg(long)]
    hostfile: PathBuf,

    /// Listening port for hostfile entries that do not carry their own.
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of traitorous processes tolerated. The algorithm runs for faulty + 1 rounds, and the
    /// total number of processes must be at least faulty + 2.
    #[arg(short, long)]
    faulty: u32,

    /// Id of the commander process, an index into the hostfile. 0-indexed.
    #[arg(short, long)]
    commander_id: ProcessId,

    /// The order to send, either "attack" or "retreat". Specifying an order makes this process the
    /// commander; only the commander may specify one.
    #[arg(short, long, value_parser = Order::from_str)]
    order: Option<Order>,

    /// A malicious behavior to exhibit: one of "silent", "delay_send", "partial_send", or
    /// "wrong_order" (commander only). Repeat the flag to combine behaviors.
    #[arg(short, long, value_parser = MaliciousBehavior::from_str)]
    malicious: Vec<MaliciousBehavior>,

    /// Explicit id of this process in the hostfile. Only needed when several hostfile entries name
    /// this host. 0-indexed.
    #[arg(short, long)]
    id: Option<ProcessId>,

    /// Log every message sent and received.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    setup_logger(if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    });

    if let Err(err) = run(cli) {
        eprintln!("{:#}", err);
        exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut processes = ProcessList::from_hostfile(&cli.hostfile, cli.port)
        .with_context(|| format!("reading hostfile {}", cli.hostfile.display()))?;

    let my_id = match cli.id {
        Some(id) => {
            if processes.get(id).is_none() {
                bail!("--id value not found in hostfile");
            }
            if !processes.is_on_local_host(id)? {
                bail!("--id value is not the hostname of this host");
            }
            id
        }
        None => processes.local_process_id()?,
    };

    if processes.get(cli.commander_id).is_none() {
        bail!("commander id does not reference a process");
    }
    processes.swap_commander_to_front(cli.commander_id);
    // The swap exchanged ids 0 and commander_id; our own id moves with it.
    let my_id = if my_id == cli.commander_id {
        0
    } else if my_id == 0 {
        cli.commander_id
    } else {
        my_id
    };

    if processes.len() < cli.faulty as usize + 2 {
        bail!("the total number of processes must be no less than faulty + 2");
    }

    let behavior = cli
        .malicious
        .iter()
        .fold(MaliciousBehavior::NONE, |acc, &flag| acc | flag);

    let is_commander = my_id == 0;
    let config = Configuration::default();
    let mut general = if is_commander {
        let order = cli.order.context("the commander must specify an order")?;
        General::Commander(Commander::new(processes, order, behavior, config)?)
    } else {
        if cli.order.is_some() {
            bail!("only the commander process can specify an order");
        }
        if behavior.exhibits(MaliciousBehavior::WRONG_ORDER) {
            bail!("only the commander process can have the malicious behavior \"wrong_order\"");
        }
        General::Lieutenant(Lieutenant::new(processes, my_id, cli.faulty, behavior, config)?)
    };

    let decision = general.decide()?;
    println!("{}: Agreed on {}", my_id, decision);
    Ok(())
}

// Log lines carry the thread id so the receive loop and the sender workers can be told apart.
fn setup_logger(level: LevelFilter) {
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
        .expect("Programming error: the logger is initialized twice.");
}
