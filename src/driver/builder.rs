//! Validating submitted items and queueing them per bus controller.
//!
//! Contiguous items for one BC form a transaction, tagged START on the first
//! item and END on the last, every item also carrying ALL.  An item that is
//! alone on its BC carries both START and END.  Clients choose which of these
//! they are woken for when they receive.

// Copyright (C) 2026 mil1553-core contributors
//
// MIT License

use alloc::vec::Vec;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::client::{ClientHandle, PacketRole};
use crate::config::RtiDownPolicy;
use crate::controller::{BusController, TransmitItem};
use crate::io::BusIo;
use crate::platform::Platform;
use crate::regs::{ControlWord, MAX_RTI, TX_BUF_SIZE};
use crate::{Error, Mil1553, Result};

/// An item as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendItem {
    /// Bus controller, from 1
    pub bc: u32,
    /// Target RTI
    pub rti: u32,
    /// Command word written to TXREG
    pub control: ControlWord,
    /// Data words, at most 32.  Only the first word count words are sent;
    /// missing words are sent as 0.
    pub payload: Vec<u16>,
    /// Discard the reply
    pub no_reply: bool,
}

impl SendItem {
    pub fn new(bc: u32, rti: u32, control: ControlWord) -> Self {
        Self {
            bc,
            rti,
            control,
            payload: Vec::new(),
            no_reply: false,
        }
    }

    pub fn with_payload(mut self, payload: &[u16]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn with_no_reply(mut self) -> Self {
        self.no_reply = true;
        self
    }
}

/// Index of the first item addressed to `bc`.
fn find_start(bc: u32, items: &[SendItem]) -> Option<usize> {
    items.iter().position(|item| item.bc == bc)
}

/// Index of the last item addressed to `bc`.
fn find_end(bc: u32, items: &[SendItem]) -> Option<usize> {
    items.iter().rposition(|item| item.bc == bc)
}

/// Role of item `index` within the transaction for its BC.
fn packet_role(index: usize, start: Option<usize>, end: Option<usize>) -> PacketRole {
    let mut role = PacketRole::ALL;
    if start == Some(index) {
        role |= PacketRole::START;
    }
    if end == Some(index) {
        role |= PacketRole::END;
    }
    role
}

impl<I: BusIo, P: Platform> Mil1553<I, P> {
    /// Queue `items` on their bus controllers and start any idle ones.
    ///
    /// Validation is all-or-nothing: an unknown BC or RTI fails the call
    /// before anything is queued.  Queueing is not: items that do not fit on
    /// a full BC queue are dropped, so callers must compare the returned count
    /// with the number submitted.
    ///
    /// Once queued, items are never taken back.  A start interrupted by a
    /// signal leaves that BC's items queued for its next start and still
    /// returns the count, so a retry does not queue them twice.  A hardware
    /// access error on one BC is returned after every other BC was started.
    ///
    /// Items for the same BC keep their relative order and are queued back to
    /// back, so no other submission interleaves with the transaction.
    ///
    /// Returns the number of items queued.
    pub fn submit(&self, client: &ClientHandle, items: &[SendItem]) -> Result<usize> {
        debug!("Session {} submit {} items", client.id(), items.len());
        if items.is_empty() {
            return Ok(0);
        }

        self.validate(items)?;

        // Distinct BCs in order of first appearance
        let mut bcs: Vec<u32> = Vec::new();
        for item in items {
            if !bcs.contains(&item.bc) {
                bcs.push(item.bc);
            }
        }

        let mut queued = 0;
        let mut to_start = Vec::new();
        for bc in bcs {
            let controller = self.controller(bc)?;
            let start = find_start(bc, items);
            let end = find_end(bc, items);

            let mut tx_queue = controller.tx_queue.lock();
            let mut started = false;
            for (index, item) in items.iter().enumerate().filter(|(_, i)| i.bc == bc) {
                let tx_item = self.build(client, item, packet_role(index, start, end));
                let role = tx_item.role;
                if tx_queue.push(tx_item).is_ok() {
                    queued += 1;
                    started |= role.contains(PacketRole::START);
                } else {
                    debug!("BC{bc} queue full, item {index} dropped");
                }
            }
            debug!("BC{bc} queue {:?}", tx_queue.pointers());
            drop(tx_queue);

            if started {
                to_start.push(controller);
            }
        }

        // Every BC gets its start, whatever happened on the others
        let mut result = Ok(queued);
        for controller in to_start {
            match self.start_tx(controller) {
                Ok(()) => {}
                Err(Error::Interrupted) => {
                    warn!(
                        "BC{} start interrupted, items stay queued for the next start",
                        controller.bc()
                    );
                }
                Err(e) => {
                    error!("BC{} start failed: {e}", controller.bc());
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }

        result
    }

    fn validate(&self, items: &[SendItem]) -> Result<()> {
        for item in items {
            let controller = self.controller(item.bc).inspect_err(|_| {
                debug!("No such BC{}", item.bc);
            })?;

            if item.rti > MAX_RTI {
                debug!("No such RTI{} on BC{}", item.rti, item.bc);
                return Err(Error::NotFound);
            }

            if item.payload.len() > TX_BUF_SIZE {
                debug!("Payload of {} words too long", item.payload.len());
                return Err(Error::InvalidItem);
            }

            self.check_rti(controller, item.rti)?;
        }
        Ok(())
    }

    fn check_rti(&self, controller: &BusController<I>, rti: u32) -> Result<()> {
        if controller.check_rti_up(rti, &self.config, &self.platform)? {
            return Ok(());
        }
        match self.config.rti_down_policy {
            RtiDownPolicy::Warn => {
                warn!("BC{} RTI{} is down, sending anyway", controller.bc(), rti);
                Ok(())
            }
            RtiDownPolicy::Reject => {
                debug!("BC{} RTI{} is down", controller.bc(), rti);
                Err(Error::NotFound)
            }
        }
    }

    fn build(&self, client: &ClientHandle, item: &SendItem, role: PacketRole) -> TransmitItem {
        let wc = item.control.word_count().min(item.payload.len());
        let mut words = [0u16; TX_BUF_SIZE];
        words[..wc].copy_from_slice(&item.payload[..wc]);

        TransmitItem {
            client: client.downgrade(),
            bc: item.bc,
            rti: item.rti,
            control: item.control,
            words,
            no_reply: item.no_reply,
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::Transfer;

    fn item(bc: u32) -> SendItem {
        SendItem::new(bc, 1, ControlWord::new(1, Transfer::Read, 1, 1))
    }

    #[test]
    fn start_and_end_per_bc() {
        let items = [item(1), item(2), item(1), item(1)];
        assert_eq!(find_start(1, &items), Some(0));
        assert_eq!(find_end(1, &items), Some(3));
        assert_eq!(find_start(2, &items), Some(1));
        assert_eq!(find_end(2, &items), Some(1));
        assert_eq!(find_start(3, &items), None);
    }

    #[test]
    fn roles() {
        assert_eq!(
            packet_role(0, Some(0), Some(2)),
            PacketRole::ALL | PacketRole::START
        );
        assert_eq!(packet_role(1, Some(0), Some(2)), PacketRole::ALL);
        assert_eq!(
            packet_role(2, Some(0), Some(2)),
            PacketRole::ALL | PacketRole::END
        );
        assert_eq!(
            packet_role(4, Some(4), Some(4)),
            PacketRole::ALL | PacketRole::START | PacketRole::END
        );
    }
}
