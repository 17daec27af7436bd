//! Completion interrupt handling.
//!
//! The hardware interrupts once per finished transfer.  The handler confirms
//! the head item of the BC queue, hands its reply to the client that queued
//! it, and starts the next item, so a transaction runs back to back without
//! returning to the client.

// Copyright (C) 2026 mil1553-core contributors
//
// MIT License

use core::sync::atomic::Ordering;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::client::{PacketRole, ReceivedItem};
use crate::controller::{BcState, BusController, TransmitItem};
use crate::io::BusIo;
use crate::platform::Platform;
use crate::regs::{self, InterruptSource, RX_BUF_SIZE, TX_BUF_SIZE, packed_len};
use crate::{Mil1553, Result};

/// Whether an interrupt on a shared line came from this device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// Not ours, let other devices on the line look at it
    None,
    Handled,
}

impl<I: BusIo, P: Platform> Mil1553<I, P> {
    /// Interrupt handler for bus controller `bc`.
    ///
    /// Never blocks and never fails: problems are logged, and a client whose
    /// reply is lost sees its receive time out.
    pub fn isr(&self, bc: u32) -> IrqReturn {
        let Ok(controller) = self.controller(bc) else {
            return IrqReturn::None;
        };

        // Reading acknowledges the interrupt
        let src = match controller.io.read_u32(regs::ISRC) {
            Ok(isrc) => InterruptSource::decode(isrc),
            Err(e) => {
                error!("BC{bc} interrupt source read failed: {e}");
                return IrqReturn::None;
            }
        };
        if !src.is_irq() {
            return IrqReturn::None;
        }

        self.icnt.fetch_add(1, Ordering::AcqRel);
        controller.count_interrupt();

        // The completed item leaves the queue before the handshake is
        // released, or a waiting client would start it a second time
        let item = controller.tx_queue.lock().pop();
        controller.handshake.release();
        let Some(item) = item else {
            controller.set_state(BcState::Done);
            trace!("BC{bc} interrupt with empty queue");
            return IrqReturn::Handled;
        };

        if src.timed_out() || src.is_bad() {
            self.fail(controller, &item, &src);
            return IrqReturn::Handled;
        }

        controller.mark_rti(src.rti, true);
        trace!("BC{bc} RTI{} done wc {} role {:?}", src.rti, src.wc, item.role);

        if !item.no_reply {
            self.deliver(controller, &item, &src);
        }

        // An item may be both START and END
        if item.role.contains(PacketRole::START) {
            controller.set_state(BcState::Busy);
        }
        if item.role.contains(PacketRole::END) {
            controller.set_state(BcState::Done);
        }

        self.start_next(controller);
        IrqReturn::Handled
    }

    /// Drop the result of a failed transfer.  The rest of the queue waits for
    /// the next client start.
    fn fail(&self, controller: &BusController<I>, item: &TransmitItem, src: &InterruptSource) {
        controller.mark_rti(item.rti, false);
        controller.set_state(BcState::Done);

        if src.is_bad() {
            error!(
                "BC{} RTI{} bus error {:?}, reply dropped",
                controller.bc(),
                item.rti,
                src.flags
            );
            if let Some(session) = item.client.upgrade() {
                session.record_fault();
            }
        } else {
            warn!(
                "BC{} RTI{} did not respond, reply dropped",
                controller.bc(),
                item.rti
            );
        }
    }

    /// Copy the reply onto the owning session's queue and wake it.
    fn deliver(&self, controller: &BusController<I>, item: &TransmitItem, src: &InterruptSource) {
        let Some(session) = item.client.upgrade() else {
            debug!(
                "BC{} RTI{} reply for closed session discarded",
                controller.bc(),
                src.rti
            );
            return;
        };

        let reply = match self.read_reply(controller, src) {
            Ok(reply) => reply,
            Err(e) => {
                error!("BC{} receive buffer read failed: {e}", controller.bc());
                return;
            }
        };

        if !session.deliver(reply) {
            warn!(
                "Session {} rx queue full, BC{} RTI{} reply dropped",
                session.id(),
                controller.bc(),
                src.rti
            );
        }
        session.wake(item.role);
    }

    /// Read the RTI status word and `wc` data words from the receive buffer.
    fn read_reply(
        &self,
        controller: &BusController<I>,
        src: &InterruptSource,
    ) -> Result<ReceivedItem> {
        let words = src.wc + 1;
        let mut rxregs = [0u32; packed_len(RX_BUF_SIZE)];
        controller
            .io
            .read_bulk(regs::RXBUF, &mut rxregs[..packed_len(words)])?;

        let mut rxbuf = [0u16; RX_BUF_SIZE];
        regs::unpack_words(&rxregs[..packed_len(words)], &mut rxbuf);

        let mut data = [0u16; TX_BUF_SIZE];
        data[..src.wc].copy_from_slice(&rxbuf[1..words]);

        Ok(ReceivedItem {
            bc: controller.bc(),
            rti: src.rti,
            wc: src.wc,
            status: rxbuf[0],
            words: data,
            icnt: 0,
        })
    }
}
