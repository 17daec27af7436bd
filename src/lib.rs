//! Transaction queueing and interrupt-driven completion core for MIL-STD-1553
//! bus controllers (CBMIA PCI modules).
//!
//! A host may carry several bus controllers (BCs), each the master of its own
//! serial bus with up to 30 remote terminal interfaces (RTIs) attached.  Clients
//! open a session, submit batches of items addressed to RTIs on any BC, and
//! later collect the replies.  Replies arrive asynchronously: the hardware
//! raises an interrupt when a bus transfer completes and the interrupt handler
//! routes the result to the client that issued it.
//!
//! `no_std`.  Requires `alloc`.
//!
//! ## Architecture
//!
//! Each BC owns an outbound [`queue::RingQueue`] of transmit items.  Each
//! client session owns an inbound [`queue::RingQueue`] of received items and
//! a wake channel.  The flow of one item is:
//!
//! 1. [`Mil1553::submit()`] validates a batch, tags each BC's run of items with
//!    START/END markers and enqueues them on the BC queues.
//! 2. The transmit engine copies the head item of an idle BC into the hardware
//!    transmit buffer and writes the transmit register.
//! 3. The hardware interrupts.  [`Mil1553::isr()`] dequeues the head item,
//!    copies the reply onto the owning client's inbound queue, wakes the
//!    client, and starts the next queued item on that BC.
//! 4. [`Mil1553::receive()`] hands the reply to the client, blocking until it
//!    arrives or the session timeout expires.
//!
//! Only one transfer is outstanding per BC at any time.  Separate BCs run
//! fully in parallel; there is no lock spanning controllers.
//!
//! ## Integration
//!
//! The crate does not find or map hardware itself.  The embedding driver
//! provides, per bus controller, an implementation of [`io::BusIo`] for the
//! mapped register window, plus one [`platform::Platform`] for time, short
//! delays and signal state.  It must route the device interrupt to
//! [`Mil1553::isr()`].
//!
//! ## Modules
//!
//! - [`queue`] - Fixed capacity ring queue and its pointer arithmetic
//! - [`regs`] - Register window layout, command word and interleave codecs
//! - [`io`] - Register window access trait
//! - [`platform`] - Time and scheduling services required by the core
//! - [`wait`] - Wake channels and the per-BC hardware handshake
//! - [`controller`] - Per bus controller state
//! - [`client`] - Client sessions, and the async client
//! - [`driver`] - The driver context, submission, transmit engine and ISR
//! - [`config`] - Timing and policy configuration
//!
//! ## Features
//!
//! Default features:
//! - `async` - Enable the async client (requires `alloc`).
//!
//! Optional features:
//! - `std` - Provide [`platform::StdPlatform`], backed by the standard library.

// Copyright (C) 2026 mil1553-core contributors
//
// MIT License

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod client;
pub mod config;
pub mod controller;
pub mod driver;
pub mod io;
pub mod platform;
pub mod queue;
pub mod regs;
pub mod wait;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ClientHandle, PacketRole, ReceivedItem, WakeMask};
pub use config::{Config, RtiDownPolicy};
pub use controller::{BcInfo, BcState};
pub use driver::{IrqReturn, Mil1553, SendItem};

/// Driver errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Unknown bus controller or RTI
    NotFound,
    /// Resource held by another client
    Busy,
    /// Timeout waiting for a reply or for the hardware
    TimedOut,
    /// Parity, format or word count error reported by the hardware
    HardwareFault,
    /// Wait aborted by a pending signal, the call may be retried
    Interrupted,
    /// Item payload or control word is malformed
    InvalidItem,
    /// Register window access failed
    Io,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Error::NotFound => "no such bus controller or RTI",
            Error::Busy => "resource busy",
            Error::TimedOut => "timed out",
            Error::HardwareFault => "hardware reported a bus error",
            Error::Interrupted => "interrupted",
            Error::InvalidItem => "invalid item",
            Error::Io => "register access failed",
        };
        f.write_str(s)
    }
}

/// Type to represent the result of a driver operation
pub type Result<T> = core::result::Result<T, Error>;
