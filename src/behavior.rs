//! Fault injection: the ways a traitorous general misbehaves, and the hooks the send paths consult
//! to act them out.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;
use std::thread;

use rand::Rng;
use rand_distr::{Distribution, Poisson};

use crate::config::Configuration;

/// A set of malicious behaviors. A process with the empty set is loyal.
///
/// The randomness behind `partial_send` and `delay_send` runs on [rand::thread_rng], so every
/// sender worker draws from its own generator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaliciousBehavior(u8);

impl MaliciousBehavior {
    /// The loyal profile.
    pub const NONE: MaliciousBehavior = MaliciousBehavior(0);
    /// Sends nothing at all.
    pub const SILENT: MaliciousBehavior = MaliciousBehavior(1 << 0);
    /// Sleeps for a random interval before each send.
    pub const DELAY_SEND: MaliciousBehavior = MaliciousBehavior(1 << 1);
    /// Randomly drops a fraction of its sends.
    pub const PARTIAL_SEND: MaliciousBehavior = MaliciousBehavior(1 << 2);
    /// Occasionally sends the flipped order. Only meaningful on the commander, which is the only
    /// process that originates orders.
    pub const WRONG_ORDER: MaliciousBehavior = MaliciousBehavior(1 << 3);

    pub fn is_loyal(self) -> bool {
        self.0 == 0
    }

    pub fn exhibits(self, behavior: MaliciousBehavior) -> bool {
        self.0 & behavior.0 != 0
    }

    /// Whether to go through with a given send. Consulted once per outbound message per recipient.
    pub fn should_send(self, config: &Configuration) -> bool {
        if self.exhibits(Self::SILENT) {
            return false;
        }
        if self.exhibits(Self::PARTIAL_SEND) {
            return rand::thread_rng().gen_bool(config.partial_send_probability);
        }
        true
    }

    /// Sleeps a `delay_send` process for a Poisson-distributed number of delay quanta, with mean
    /// equal to half the round timeout. Returns immediately for every other profile.
    pub fn maybe_delay(self, config: &Configuration) {
        if !self.exhibits(Self::DELAY_SEND) {
            return;
        }

        let quantum_ms = config.delay_quantum.as_millis().max(1) as f64;
        let mean_quanta = config.round_timeout.as_millis() as f64 / quantum_ms / 2.0;
        let poisson = match Poisson::new(mean_quanta) {
            Ok(poisson) => poisson,
            Err(_) => return,
        };
        let quanta = poisson.sample(&mut rand::thread_rng()) as u32;
        if quanta == 0 {
            return;
        }
        thread::sleep(config.delay_quantum * quanta);
    }
}

impl BitOr for MaliciousBehavior {
    type Output = MaliciousBehavior;

    fn bitor(self, rhs: MaliciousBehavior) -> MaliciousBehavior {
        MaliciousBehavior(self.0 | rhs.0)
    }
}

impl BitOrAssign for MaliciousBehavior {
    fn bitor_assign(&mut self, rhs: MaliciousBehavior) {
        self.0 |= rhs.0;
    }
}

impl FromStr for MaliciousBehavior {
    type Err = ParseBehaviorError;

    fn from_str(s: &str) -> Result<MaliciousBehavior, ParseBehaviorError> {
        match s {
            "silent" => Ok(MaliciousBehavior::SILENT),
            "delay_send" => Ok(MaliciousBehavior::DELAY_SEND),
            "partial_send" => Ok(MaliciousBehavior::PARTIAL_SEND),
            "wrong_order" => Ok(MaliciousBehavior::WRONG_ORDER),
            _ => Err(ParseBehaviorError),
        }
    }
}

impl fmt::Display for MaliciousBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_loyal() {
            return write!(f, "loyal");
        }
        let mut first = true;
        for (flag, name) in [
            (Self::SILENT, "silent"),
            (Self::DELAY_SEND, "delay_send"),
            (Self::PARTIAL_SEND, "partial_send"),
            (Self::WRONG_ORDER, "wrong_order"),
        ] {
            if self.exhibits(flag) {
                if !first {
                    write!(f, "+")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ParseBehaviorError;

impl fmt::Display for ParseBehaviorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malicious behavior can be one of {{\"silent\", \"delay_send\", \"partial_send\", \"wrong_order\"}}"
        )
    }
}

impl std::error::Error for ParseBehaviorError {}
