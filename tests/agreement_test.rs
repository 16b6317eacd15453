/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! End-to-end agreement scenarios over real UDP sockets on the loopback interface.
//!
//! Each test stands up a commander and its lieutenants as real processes-in-threads, runs the full
//! faulty + 1 rounds, and checks the two interactive-consistency conditions:
//!
//! - IC1 (agreement): all loyal lieutenants decide the same order.
//! - IC2 (validity): if the commander is loyal, the loyal lieutenants decide the commander's
//!   order.
//!
//! Every scenario uses its own port range so the tests can run concurrently.

mod common;

use std::thread;
use std::time::Duration;

use log::LevelFilter;

use byzantine_generals::behavior::MaliciousBehavior;
use byzantine_generals::config::Configuration;
use byzantine_generals::messages::Order;
use byzantine_generals::protocol::{Commander, Lieutenant};

use common::{loopback_processes, setup_logger, Scenario};

const LOYAL: MaliciousBehavior = MaliciousBehavior::NONE;

#[test]
fn all_loyal_processes_adopt_the_commanders_order() {
    setup_logger(LevelFilter::Debug);

    let decisions = Scenario {
        base_port: 21000,
        faulty: 1,
        commander_order: Order::Attack,
        behaviors: vec![LOYAL; 4],
    }
    .run();

    assert_eq!(decisions[1..], [Order::Attack; 3]);
}

#[test]
fn a_silent_lieutenant_cannot_break_validity() {
    setup_logger(LevelFilter::Debug);

    let decisions = Scenario {
        base_port: 21100,
        faulty: 1,
        commander_order: Order::Retreat,
        behaviors: vec![LOYAL, LOYAL, LOYAL, MaliciousBehavior::SILENT],
    }
    .run();

    // The traitor's own output is meaningless; the loyal lieutenants must follow the commander.
    assert_eq!(decisions[1], Order::Retreat);
    assert_eq!(decisions[2], Order::Retreat);
}

#[test]
fn a_lying_commander_cannot_break_agreement() {
    setup_logger(LevelFilter::Debug);

    let decisions = Scenario {
        base_port: 21200,
        faulty: 1,
        commander_order: Order::Attack,
        behaviors: vec![MaliciousBehavior::WRONG_ORDER, LOYAL, LOYAL, LOYAL],
    }
    .run();

    // With a traitorous commander IC2 says nothing about the value; IC1 still requires the loyal
    // lieutenants to agree among themselves.
    assert_eq!(decisions[1], decisions[2]);
    assert_eq!(decisions[2], decisions[3]);
}

#[test]
fn a_partial_sender_cannot_break_validity() {
    setup_logger(LevelFilter::Debug);

    let decisions = Scenario {
        base_port: 21300,
        faulty: 1,
        commander_order: Order::Attack,
        behaviors: vec![LOYAL, LOYAL, LOYAL, LOYAL, MaliciousBehavior::PARTIAL_SEND],
    }
    .run();

    // A partial sender only withholds messages, it never forges orders, so the loyal majority
    // still adopts the loyal commander's order.
    assert_eq!(decisions[1], Order::Attack);
    assert_eq!(decisions[2], Order::Attack);
    assert_eq!(decisions[3], Order::Attack);
}

#[test]
fn two_traitorous_lieutenants_among_six_processes() {
    setup_logger(LevelFilter::Debug);

    let decisions = Scenario {
        base_port: 21400,
        faulty: 2,
        commander_order: Order::Retreat,
        behaviors: vec![
            LOYAL,
            LOYAL,
            LOYAL,
            MaliciousBehavior::SILENT,
            LOYAL,
            MaliciousBehavior::DELAY_SEND,
        ],
    }
    .run();

    assert_eq!(decisions[1], Order::Retreat);
    assert_eq!(decisions[2], Order::Retreat);
    assert_eq!(decisions[4], Order::Retreat);
}

#[test]
fn a_commander_that_reaches_a_single_lieutenant() {
    setup_logger(LevelFilter::Debug);

    let config = Configuration::default();
    let processes = loopback_processes(21500, 4);

    let mut lieutenants: Vec<Lieutenant> = (1..4)
        .map(|id| Lieutenant::new(processes.clone(), id, 1, LOYAL, config.clone()).unwrap())
        .collect();

    // The unreached lieutenants: per the algorithm they sit in round 0 until the commander's
    // order arrives, so their threads are left running and never joined.
    let l3 = lieutenants.pop().unwrap();
    let l2 = lieutenants.pop().unwrap();
    let stuck: Vec<_> = [l2, l3]
        .into_iter()
        .map(|mut lieutenant| thread::spawn(move || lieutenant.decide().unwrap()))
        .collect();

    let mut l1 = lieutenants.pop().unwrap();
    let l1_handle = thread::spawn(move || l1.decide().unwrap());

    // The commander's view of the world points everyone but L1 at unused ports, modelling a
    // commander that crashes after its first send.
    let commander_view = {
        let mut addresses = vec![
            processes.get(0).unwrap().clone(),
            processes.get(1).unwrap().clone(),
        ];
        addresses.extend(loopback_processes(21550, 2).iter().cloned());
        byzantine_generals::participants::ProcessList::new(addresses)
    };
    let commander = Commander::new(commander_view, Order::Attack, LOYAL, config).unwrap();
    commander.decide();

    // The only lieutenant that heard anything still terminates and decides the order it heard.
    assert_eq!(l1_handle.join().unwrap(), Order::Attack);

    // The others are still waiting in round 0.
    thread::sleep(Duration::from_millis(200));
    for handle in &stuck {
        assert!(!handle.is_finished());
    }
}
