use std::time::Duration;

/// Knobs that govern an agreement run. [Configuration::default] carries the values the algorithm
/// was designed around; the test suite shrinks the timeouts to keep runs short.
#[derive(Clone, Debug)]
pub struct Configuration {
    /// How long a sender waits for an acknowledgement before re-sending.
    pub ack_timeout: Duration,

    /// Progress budget of a single round. Doubles as the receive timeout on the lieutenant's
    /// server socket, so a quiet network still wakes the round-timeout path up.
    pub round_timeout: Duration,

    /// Send attempts made before a message is given up as lost. 0 retries forever.
    pub send_attempts: u32,

    /// Probability that a `partial_send` process actually performs a given send.
    pub partial_send_probability: f64,

    /// Probability that a `wrong_order` commander flips the order for a given recipient.
    pub wrong_order_probability: f64,

    /// Tick size of the `delay_send` distribution.
    pub delay_quantum: Duration,
}

impl Default for Configuration {
    fn default() -> Configuration {
        Configuration {
            ack_timeout: Duration::from_millis(250),
            round_timeout: Duration::from_secs(1),
            send_attempts: 3,
            partial_send_probability: 0.75,
            wrong_order_probability: 0.30,
            delay_quantum: Duration::from_millis(100),
        }
    }
}
