//! Client sessions.
//!
//! A session is created by [`crate::Mil1553::open()`] and owns an inbound
//! queue of replies, a wake channel and a completion counter.  The interrupt
//! handler reaches a session only through the weak reference carried by each
//! queued transmit item, so a session closed with transfers in flight is
//! simply freed and late replies for it are discarded.
//!
//! See [`AsyncClient`] for polling from async code.

// Copyright (C) 2026 mil1553-core contributors
//
// MIT License

#[cfg(feature = "async")]
pub mod futures;

#[cfg(feature = "async")]
pub use futures::{AsyncClient, AsyncDelay, AsyncTransport};

use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use core::time::Duration;

use bitflags::bitflags;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use spin::Mutex;

use crate::platform::Platform;
use crate::queue::RingQueue;
use crate::regs::TX_BUF_SIZE;
use crate::wait::WaitQueue;
use crate::{Error, Result};

bitflags! {
    /// Position of an item within its transaction.  Also used as the mask of
    /// positions a client wants to be woken for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PacketRole: u32 {
        /// First item of the transaction on its bus controller
        const START = 0x1;
        /// Every item
        const ALL = 0x2;
        /// Last item of the transaction on its bus controller
        const END = 0x4;
    }
}

/// Mask of packet roles that wake a blocked receiver
pub type WakeMask = PacketRole;

/// A reply delivered to a client by the interrupt handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedItem {
    /// Bus controller
    pub bc: u32,
    /// RTI that answered
    pub rti: u32,
    /// Data words received
    pub wc: usize,
    /// RTI status word, first word of the receive buffer
    pub status: u16,
    /// Data words, valid up to `wc`
    pub words: [u16; TX_BUF_SIZE],
    /// Session completion count when this reply was queued
    pub icnt: u32,
}

impl ReceivedItem {
    pub fn data(&self) -> &[u16] {
        &self.words[..self.wc.min(TX_BUF_SIZE)]
    }
}

/// Per open handle state, shared with in-flight transmit items.
#[derive(Debug)]
pub struct Session {
    id: u64,
    rx_queue: Mutex<RingQueue<ReceivedItem>>,
    wait_queue: WaitQueue,
    icnt: AtomicU32,
    faults: AtomicU32,
    wake_mask: AtomicU32,
    timeout_us: AtomicU64,
}

impl Session {
    pub(crate) fn new(id: u64, qsz: u32, timeout: Duration) -> Self {
        Self {
            id,
            rx_queue: Mutex::new(RingQueue::new(qsz)),
            wait_queue: WaitQueue::new(),
            icnt: AtomicU32::new(0),
            faults: AtomicU32::new(0),
            wake_mask: AtomicU32::new(PacketRole::ALL.bits()),
            timeout_us: AtomicU64::new(duration_to_us(timeout)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Replies delivered to this session, whether or not they fitted on its
    /// queue.
    pub fn icnt(&self) -> u32 {
        self.icnt.load(Ordering::Acquire)
    }

    /// Replies lost to bus errors reported by the hardware.
    pub fn faults(&self) -> u32 {
        self.faults.load(Ordering::Acquire)
    }

    pub(crate) fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::AcqRel);
    }

    pub fn wake_mask(&self) -> PacketRole {
        PacketRole::from_bits_truncate(self.wake_mask.load(Ordering::Acquire))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_micros(self.timeout_us.load(Ordering::Acquire))
    }

    pub(crate) fn set_wake_mask(&self, mask: PacketRole) {
        self.wake_mask.store(mask.bits(), Ordering::Release);
    }

    pub(crate) fn set_timeout(&self, timeout: Duration) {
        self.timeout_us
            .store(duration_to_us(timeout), Ordering::Release);
    }

    /// Replies waiting on the inbound queue.
    pub fn pending(&self) -> u32 {
        self.rx_queue.lock().len()
    }

    /// Queue a reply.  Interrupt context.
    ///
    /// The completion count moves even when the queue is full and the reply
    /// is dropped, so a receiver holding an older count still wakes.
    pub(crate) fn deliver(&self, mut reply: ReceivedItem) -> bool {
        let mut rx_queue = self.rx_queue.lock();
        let icnt = self.icnt.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        reply.icnt = icnt;
        let queued = rx_queue.push(reply).is_ok();
        trace!("Session {} rx queue {:?}", self.id, rx_queue.pointers());
        queued
    }

    /// Wake the receiver if `role` is one it asked for.  Interrupt context.
    pub(crate) fn wake(&self, role: PacketRole) -> bool {
        if role.intersects(self.wake_mask()) {
            self.wait_queue.notify();
            true
        } else {
            false
        }
    }

    /// Dequeue the head reply without blocking.
    pub(crate) fn try_read(&self) -> Option<ReceivedItem> {
        self.rx_queue.lock().pop()
    }

    /// Dequeue the head reply, blocking until one arrives or `timeout`
    /// elapses.  No lock is held while blocked.
    pub(crate) fn read_queue<P: Platform>(
        &self,
        platform: &P,
        wake_mask: PacketRole,
        timeout: Duration,
    ) -> Result<ReceivedItem> {
        self.set_wake_mask(wake_mask);
        self.set_timeout(timeout);

        let deadline = platform.now().saturating_add(timeout);
        loop {
            // Sampled before looking at the queue so a reply landing in
            // between moves the count and ends the wait at once
            let icnt = self.icnt();

            if let Some(reply) = self.try_read() {
                debug!(
                    "Session {} received BC{} RTI{} wc {} icnt {}",
                    self.id, reply.bc, reply.rti, reply.wc, reply.icnt
                );
                return Ok(reply);
            }

            let remaining = deadline.saturating_sub(platform.now());
            if remaining.is_zero()
                || !self
                    .wait_queue
                    .wait_until(platform, remaining, || self.icnt() != icnt)
            {
                debug!("Session {} receive timed out", self.id);
                return Err(Error::TimedOut);
            }
        }
    }
}

fn duration_to_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Open handle to the driver.  Pass to [`crate::Mil1553::close()`] when done,
/// which also releases any bus controller locks it holds.
#[derive(Debug)]
pub struct ClientHandle {
    pub(crate) session: Arc<Session>,
}

impl ClientHandle {
    pub(crate) fn new(session: Session) -> Self {
        Self {
            session: Arc::new(session),
        }
    }

    pub fn id(&self) -> u64 {
        self.session.id()
    }

    /// Receive timeout used by [`crate::Mil1553::send_receive()`].
    pub fn timeout(&self) -> Duration {
        self.session.timeout()
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.session.set_timeout(timeout)
    }

    pub fn icnt(&self) -> u32 {
        self.session.icnt()
    }

    /// Replies waiting to be received.
    pub fn pending(&self) -> u32 {
        self.session.pending()
    }

    pub fn faults(&self) -> u32 {
        self.session.faults()
    }

    pub(crate) fn downgrade(&self) -> Weak<Session> {
        Arc::downgrade(&self.session)
    }
}
