//! Transmit engine: copy the head item of a BC queue into the hardware and
//! start the transfer.
//!
//! The head item stays on the queue until the completion interrupt confirms
//! it, so a lost interrupt leads to the same item being sent again rather
//! than silently disappearing.
//!
//! Two entry points share the hardware path:
//! - [`Mil1553::start_tx()`], from a client call, which may wait for the
//!   transfer in flight and for the completion of its own transfer
//! - `start_next()`, from the interrupt handler, which never waits

// Copyright (C) 2026 mil1553-core contributors
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::controller::{BcState, BusController};
use crate::io::BusIo;
use crate::platform::Platform;
use crate::regs::{self, TX_BUF_SIZE, packed_len};
use crate::wait::Acquired;
use crate::{Mil1553, Result};

/// Context a transfer is started from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Caller {
    /// Client call, may delay between busy bit polls
    Process,
    /// Interrupt handler, never delays
    Interrupt,
}

impl<I: BusIo, P: Platform> Mil1553<I, P> {
    /// Start the head item of `controller` if no transaction is running.
    ///
    /// While the BC is busy this does nothing: the interrupt handler chains
    /// the queued items itself, and starting a second transfer while one is
    /// outstanding corrupts the bus.
    ///
    /// Otherwise waits for any transfer still in flight to complete, up to
    /// the handshake timeout, after which the completion is assumed lost.  A
    /// pending signal aborts that wait with [`crate::Error::Interrupted`]
    /// before anything is written to the hardware.
    pub fn start_tx(&self, controller: &BusController<I>) -> Result<()> {
        let bc = controller.bc();
        if controller.state() == BcState::Busy {
            trace!("BC{bc} busy, transaction chained by interrupt");
            return Ok(());
        }

        let handshake = &controller.handshake;
        match handshake.acquire(&self.platform, self.config.handshake_timeout)? {
            Acquired::Clean => {}
            Acquired::Forced => {
                warn!(
                    "BC{bc} no completion interrupt within {:?}, clearing busy flag",
                    self.config.handshake_timeout
                );
            }
        }

        let generation = handshake.generation();
        match self.transmit_head(controller, Caller::Process) {
            Ok(true) => {}
            Ok(false) => {
                handshake.release();
                return Ok(());
            }
            Err(e) => {
                handshake.release();
                return Err(e);
            }
        }

        if !handshake.wait_complete(&self.platform, generation, self.config.completion_timeout) {
            warn!(
                "BC{bc} no completion within {:?} of start",
                self.config.completion_timeout
            );
        }
        Ok(())
    }

    /// Start the head item from interrupt context.  Does nothing if another
    /// context has already claimed the hardware.
    pub(crate) fn start_next(&self, controller: &BusController<I>) {
        let handshake = &controller.handshake;
        if !handshake.try_claim() {
            trace!("BC{} next transfer started elsewhere", controller.bc());
            return;
        }

        match self.transmit_head(controller, Caller::Interrupt) {
            Ok(true) => {}
            Ok(false) => handshake.release(),
            Err(e) => {
                error!("BC{} failed to start next transfer: {e}", controller.bc());
                handshake.release();
            }
        }
    }

    /// Write the head item to the hardware.  The caller holds the handshake.
    ///
    /// Returns `false`, marking the BC done, if the queue is empty.
    fn transmit_head(&self, controller: &BusController<I>, caller: Caller) -> Result<bool> {
        let mut txbuf = [0u32; packed_len(TX_BUF_SIZE)];
        let (control, wc) = {
            let tx_queue = controller.tx_queue.lock();
            let Some(item) = tx_queue.peek() else {
                controller.set_state(BcState::Done);
                trace!("BC{} queue empty", controller.bc());
                return Ok(false);
            };
            let wc = item.control.word_count();
            regs::pack_words(&item.words[..wc], &mut txbuf);
            (item.control, wc)
        };

        self.wait_tx_ready(controller, caller)?;

        controller
            .io
            .write_bulk(regs::TXBUF, &txbuf[..packed_len(wc)])?;
        controller.io.write_u32(regs::TXREG, control.0)?;
        controller.count_transfer();

        trace!(
            "BC{} started RTI{} cw {:#06X} wc {}",
            controller.bc(),
            control.rti(),
            control.0,
            wc
        );
        Ok(true)
    }

    /// Poll the TXREG busy bit.  The bit is known to stick on some modules,
    /// so after the configured number of tries the transfer is started anyway.
    /// From interrupt context the bit is read once.
    fn wait_tx_ready(&self, controller: &BusController<I>, caller: Caller) -> Result<()> {
        let tries = match caller {
            Caller::Process => self.config.busy_poll_tries,
            Caller::Interrupt => 1,
        };
        for _ in 0..tries {
            if controller.io.read_u32(regs::TXREG)? & regs::TXREG_BUSY == 0 {
                return Ok(());
            }
            if caller == Caller::Process {
                self.platform.delay(self.config.busy_poll_delay);
            }
        }
        warn!(
            "BC{} TXREG busy after {} tries, starting anyway",
            controller.bc(),
            tries
        );
        Ok(())
    }
}
