//! Fixed capacity ring queue.
//!
//! Used for the outbound transmit queue of each bus controller and the inbound
//! receive queue of each client session.  The queue itself is not locked;
//! owners wrap it in a [`spin::Mutex`] so that both the interrupt handler and
//! process context can use it.
//!
//! The read and write pointers run over `capacity + 1` slots.  One slot is
//! always left free so that `rp == wp` means empty and a queue holding
//! `capacity` items is full, never wrapping back to look empty.

// Copyright (C) 2026 mil1553-core contributors
//
// MIT License

use alloc::vec::Vec;

/// Default queue capacity, for both transmit and receive queues.
pub const QSZ: u32 = 30;

/// Number of items on a queue of capacity `qsz`.
pub const fn queue_size(rp: u32, wp: u32, qsz: u32) -> u32 {
    if wp >= rp {
        wp - rp
    } else {
        qsz - (rp - wp) + 1
    }
}

/// Advance the write pointer.  Returns `false`, leaving `wp` untouched, if the
/// queue is full.
pub fn next_wp(rp: u32, wp: &mut u32, qsz: u32) -> bool {
    if queue_size(rp, *wp, qsz) < qsz {
        *wp += 1;
        if *wp > qsz {
            *wp = 0;
        }
        true
    } else {
        false
    }
}

/// Advance the read pointer.  Returns `false`, leaving `rp` untouched, if the
/// queue is empty.
pub fn next_rp(rp: &mut u32, wp: u32, qsz: u32) -> bool {
    if queue_size(*rp, wp, qsz) > 0 {
        *rp += 1;
        if *rp > qsz {
            *rp = 0;
        }
        true
    } else {
        false
    }
}

/// Bounded FIFO with explicit read/write pointers.
pub struct RingQueue<T> {
    rp: u32,
    wp: u32,
    qsz: u32,
    slots: Vec<Option<T>>,
}

impl<T> RingQueue<T> {
    /// Create an empty queue holding at most `qsz` items.  All storage is
    /// allocated here.
    pub fn new(qsz: u32) -> Self {
        let mut slots = Vec::with_capacity(qsz as usize + 1);
        slots.resize_with(qsz as usize + 1, || None);
        Self {
            rp: 0,
            wp: 0,
            qsz,
            slots,
        }
    }

    /// Append `item`.  A full queue hands the item back.
    pub fn push(&mut self, item: T) -> core::result::Result<(), T> {
        let slot = self.wp as usize;
        if next_wp(self.rp, &mut self.wp, self.qsz) {
            self.slots[slot] = Some(item);
            Ok(())
        } else {
            Err(item)
        }
    }

    /// Remove and return the head item.
    pub fn pop(&mut self) -> Option<T> {
        let slot = self.rp as usize;
        if next_rp(&mut self.rp, self.wp, self.qsz) {
            self.slots[slot].take()
        } else {
            None
        }
    }

    /// Head item, left on the queue.
    pub fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            None
        } else {
            self.slots[self.rp as usize].as_ref()
        }
    }

    /// Queued items, head first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let slots = self.qsz + 1;
        (0..self.len()).filter_map(move |i| self.slots[((self.rp + i) % slots) as usize].as_ref())
    }

    pub fn len(&self) -> u32 {
        queue_size(self.rp, self.wp, self.qsz)
    }

    pub fn is_empty(&self) -> bool {
        self.rp == self.wp
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.qsz
    }

    pub fn capacity(&self) -> u32 {
        self.qsz
    }

    /// Current `(rp, wp)` pair, for diagnostics.
    pub fn pointers(&self) -> (u32, u32) {
        (self.rp, self.wp)
    }
}

impl<T> core::fmt::Debug for RingQueue<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RingQueue")
            .field("rp", &self.rp)
            .field("wp", &self.wp)
            .field("len", &self.len())
            .field("capacity", &self.qsz)
            .finish()
    }
}
