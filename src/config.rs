//! Timing and policy configuration.
//!
//! Every bound the core applies to hardware polling and waiting lives here,
//! so a port can tune them for its platform.  The defaults suit CBMIA
//! firmware 204 and later on a 1 Mbit/s bus.

// Copyright (C) 2026 mil1553-core contributors
//
// MIT License

use core::time::Duration;

use crate::queue::QSZ;

/// What to do when a submitted item addresses an RTI that did not answer the
/// last poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtiDownPolicy {
    /// Log a warning and queue the item anyway
    #[default]
    Warn,
    /// Fail the whole submission with [`crate::Error::NotFound`]
    Reject,
}

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long the transmit engine waits for the previous transfer's
    /// completion interrupt before assuming it was lost
    pub handshake_timeout: Duration,
    /// How long the transmit engine waits for the completion interrupt after
    /// starting a transfer.  Expiry is only logged.
    pub completion_timeout: Duration,
    /// Reads of the TXREG busy bit before starting regardless
    pub busy_poll_tries: u32,
    /// Delay between TXREG busy bit reads
    pub busy_poll_delay: Duration,
    /// Reads of the up-RTI register OR-ed together by an RTI poll
    pub up_rti_poll_tries: u32,
    /// Delay between up-RTI register reads
    pub up_rti_poll_delay: Duration,
    /// Receive timeout given to new client sessions
    pub client_timeout: Duration,
    /// Capacity of every transmit and receive queue
    pub queue_size: u32,
    pub rti_down_policy: RtiDownPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(20),
            completion_timeout: Duration::from_millis(5),
            busy_poll_tries: 100,
            busy_poll_delay: Duration::from_micros(10),
            up_rti_poll_tries: 500,
            up_rti_poll_delay: Duration::from_micros(200),
            client_timeout: Duration::from_secs(1),
            queue_size: QSZ,
            rti_down_policy: RtiDownPolicy::Warn,
        }
    }
}

impl Config {
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    pub fn with_busy_poll(mut self, tries: u32, delay: Duration) -> Self {
        self.busy_poll_tries = tries;
        self.busy_poll_delay = delay;
        self
    }

    pub fn with_up_rti_poll(mut self, tries: u32, delay: Duration) -> Self {
        self.up_rti_poll_tries = tries;
        self.up_rti_poll_delay = delay;
        self
    }

    pub fn with_client_timeout(mut self, timeout: Duration) -> Self {
        self.client_timeout = timeout;
        self
    }

    /// Queue capacity, at least 1
    pub fn with_queue_size(mut self, size: u32) -> Self {
        self.queue_size = size.max(1);
        self
    }

    pub fn with_rti_down_policy(mut self, policy: RtiDownPolicy) -> Self {
        self.rti_down_policy = policy;
        self
    }
}
