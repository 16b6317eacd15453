/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Round arithmetic for the oral-messages algorithm.

/// The maximum number of valid messages a lieutenant expects in `round`, given `process_num`
/// initial processes.
///
/// A round-r message is a chain of r + 1 distinct ids that excludes the receiver, so every round
/// multiplies the previous round's count by the number of processes that could have extended each
/// chain. Only defined for the algorithmic range `round <= faulty + 1 <= process_num - 2`, inside
/// which every factor is positive.
pub fn messages_for_round(process_num: usize, round: u32) -> usize {
    if round == 0 {
        return 1;
    }
    (process_num - 1 - round as usize) * messages_for_round(process_num, round - 1)
}
