//! Per bus controller state.
//!
//! A [`BusController`] binds one CBMIA register window to its outbound
//! transmit queue, its busy/done transaction state, the hardware handshake
//! flag and the mask of RTIs last seen on its bus.

// Copyright (C) 2026 mil1553-core contributors
//
// MIT License

use alloc::sync::Weak;
use core::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use spin::Mutex;

use crate::client::{PacketRole, Session};
use crate::config::Config;
use crate::io::BusIo;
use crate::platform::Platform;
use crate::queue::RingQueue;
use crate::regs::{self, ControlWord, TX_BUF_SIZE};
use crate::wait::{Acquired, Handshake, WaitQueue};
use crate::{Error, Result};

/// Transaction state of a bus controller
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BcState {
    /// No transaction in progress, clients may start the queue
    #[default]
    Done = 0,
    /// A START..END transaction is being chained by the interrupt handler
    Busy = 1,
}

impl From<u8> for BcState {
    fn from(value: u8) -> Self {
        match value {
            1 => BcState::Busy,
            _ => BcState::Done,
        }
    }
}

/// One queued bus transfer.
#[derive(Debug, Clone)]
pub struct TransmitItem {
    /// Session that receives the reply
    pub client: Weak<Session>,
    pub bc: u32,
    pub rti: u32,
    pub control: ControlWord,
    pub words: [u16; TX_BUF_SIZE],
    /// Discard the reply
    pub no_reply: bool,
    pub role: PacketRole,
}

/// Snapshot returned by [`crate::Mil1553::bc_info()`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BcInfo {
    pub bc: u32,
    /// 64-bit module serial number
    pub serial: u64,
    /// Firmware version from the hardware status register
    pub firmware: u32,
    /// Bus speed field of the command register
    pub speed: u32,
    /// Interrupts handled by the whole driver
    pub driver_icnt: u32,
    /// Interrupts handled for this bus controller
    pub icnt: u32,
    /// Transfers started
    pub tx_count: u32,
    pub state: BcState,
    pub up_rtis: u32,
    /// Items waiting on the transmit queue, including the one in flight
    pub queued: u32,
}

/// A bus controller and its queue.
pub struct BusController<I: BusIo> {
    bc: u32,
    pub(crate) io: I,
    serial: u64,
    up_rtis: AtomicU32,
    state: AtomicU8,
    pub(crate) tx_queue: Mutex<RingQueue<TransmitItem>>,
    pub(crate) handshake: Handshake,
    icnt: AtomicU32,
    tx_count: AtomicU32,
    /// Session holding the advisory lock, 0 when free
    owner: AtomicU64,
    owner_wq: WaitQueue,
}

impl<I: BusIo> BusController<I> {
    /// Initialise the hardware and take ownership of its window.
    ///
    /// Clears any pending interrupt, enables completion interrupts, selects
    /// 1 Mbit/s with hardware polling off, reads the serial number and polls
    /// for live RTIs.
    pub fn probe<P: Platform>(bc: u32, io: I, config: &Config, platform: &P) -> Result<Self> {
        io.read_u32(regs::ISRC)?;
        io.write_u32(regs::INTEN, regs::INTEN_INF)?;
        io.write_u32(
            regs::CMD,
            regs::CMD_POLL_OFF | (regs::CMD_SPEED_1M << regs::CMD_SPEED_SHIFT),
        )?;

        let snum_h = io.read_u32(regs::SNUM_H)?;
        let snum_l = io.read_u32(regs::SNUM_L)?;

        let controller = Self {
            bc,
            io,
            serial: ((snum_h as u64) << 32) | snum_l as u64,
            up_rtis: AtomicU32::new(0),
            state: AtomicU8::new(BcState::Done as u8),
            tx_queue: Mutex::new(RingQueue::new(config.queue_size)),
            handshake: Handshake::new(),
            icnt: AtomicU32::new(0),
            tx_count: AtomicU32::new(0),
            owner: AtomicU64::new(0),
            owner_wq: WaitQueue::new(),
        };

        let up_rtis = controller.poll_up_rtis(config, platform)?;
        info!(
            "BC{} serial {:#018X} up RTIs {:#010X}",
            bc, controller.serial, up_rtis
        );
        Ok(controller)
    }

    pub fn bc(&self) -> u32 {
        self.bc
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn state(&self) -> BcState {
        BcState::from(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: BcState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Cached mask of live RTIs, bit n set for RTI n.
    pub fn up_rtis(&self) -> u32 {
        self.up_rtis.load(Ordering::Acquire)
    }

    pub(crate) fn mark_rti(&self, rti: u32, up: bool) {
        let Some(mask) = 1u32.checked_shl(rti) else {
            return;
        };
        if up {
            self.up_rtis.fetch_or(mask, Ordering::AcqRel);
        } else {
            self.up_rtis.fetch_and(!mask, Ordering::AcqRel);
        }
    }

    /// Poll the bus for live RTIs.
    ///
    /// Polling disturbs transfers, so while items are queued the cached mask
    /// is returned instead.  Otherwise the handshake is held for the whole
    /// poll, so no transfer is in flight or can start while hardware polling
    /// is on and interrupts are off.  The hardware poller is too fast for
    /// some RTI cards, so the up-RTI register is read many times and the
    /// results OR-ed together.
    pub fn poll_up_rtis<P: Platform>(&self, config: &Config, platform: &P) -> Result<u32> {
        if !self.tx_queue.lock().is_empty() {
            debug!("BC{} queue busy, cached up RTIs", self.bc);
            return Ok(self.up_rtis());
        }

        if self.handshake.acquire(platform, config.handshake_timeout)? == Acquired::Forced {
            warn!(
                "BC{} no completion interrupt within {:?}, polling anyway",
                self.bc, config.handshake_timeout
            );
        }
        // Items queued while waiting for the handshake go first
        if !self.tx_queue.lock().is_empty() {
            self.handshake.release();
            debug!("BC{} queue busy, cached up RTIs", self.bc);
            return Ok(self.up_rtis());
        }

        let result = self.read_up_rtis(config, platform);
        self.handshake.release();
        let up_rtis = result?;

        self.up_rtis.store(up_rtis, Ordering::Release);
        debug!("BC{} polled up RTIs {:#010X}", self.bc, up_rtis);
        Ok(up_rtis)
    }

    /// Run the hardware RTI poller.  The caller holds the handshake.
    fn read_up_rtis<P: Platform>(&self, config: &Config, platform: &P) -> Result<u32> {
        self.io.write_u32(regs::INTEN, 0)?;
        let cmd = self.io.read_u32(regs::CMD)?;
        self.io.write_u32(regs::CMD, cmd & !regs::CMD_POLL_OFF)?;

        let mut up_rtis = 0;
        let mut result = Ok(());
        for _ in 0..config.up_rti_poll_tries {
            match self.io.read_u32(regs::UP_RTIS) {
                Ok(v) => up_rtis |= v,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
            platform.delay(config.up_rti_poll_delay);
        }

        // Restore polling off and interrupts even if a read failed
        self.io.write_u32(regs::CMD, cmd | regs::CMD_POLL_OFF)?;
        self.io.write_u32(regs::INTEN, regs::INTEN_INF)?;
        result.map(|()| up_rtis)
    }

    /// True if `rti` answered the last poll, polling first if nothing is
    /// known yet.
    pub(crate) fn check_rti_up<P: Platform>(
        &self,
        rti: u32,
        config: &Config,
        platform: &P,
    ) -> Result<bool> {
        let mut up_rtis = self.up_rtis();
        if up_rtis == 0 {
            up_rtis = self.poll_up_rtis(config, platform)?;
        }
        Ok(up_rtis & (1 << rti) != 0)
    }

    /// Hardware status field
    pub fn status(&self) -> Result<u32> {
        let reg = self.io.read_u32(regs::HSTAT)?;
        Ok((reg & regs::HSTAT_STAT_MASK) >> regs::HSTAT_STAT_SHIFT)
    }

    pub fn set_bus_speed(&self, speed: u32) -> Result<()> {
        let reg = ((speed << regs::CMD_SPEED_SHIFT) & regs::CMD_SPEED_MASK) | regs::CMD_POLL_OFF;
        self.io.write_u32(regs::CMD, reg)
    }

    pub(crate) fn count_interrupt(&self) {
        self.icnt.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn count_transfer(&self) {
        self.tx_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn queued(&self) -> u32 {
        self.tx_queue.lock().len()
    }

    pub(crate) fn info(&self, driver_icnt: u32) -> Result<BcInfo> {
        let hstat = self.io.read_u32(regs::HSTAT)?;
        let cmd = self.io.read_u32(regs::CMD)?;
        Ok(BcInfo {
            bc: self.bc,
            serial: self.serial,
            firmware: (hstat & regs::HSTAT_VER_MASK) >> regs::HSTAT_VER_SHIFT,
            speed: (cmd & regs::CMD_SPEED_MASK) >> regs::CMD_SPEED_SHIFT,
            driver_icnt,
            icnt: self.icnt.load(Ordering::Acquire),
            tx_count: self.tx_count.load(Ordering::Acquire),
            state: self.state(),
            up_rtis: self.up_rtis(),
            queued: self.queued(),
        })
    }

    /// Take the advisory lock for session `id` without waiting.
    pub(crate) fn try_lock(&self, id: u64) -> Result<()> {
        match self
            .owner
            .compare_exchange(0, id, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(owner) if owner == id => Ok(()),
            Err(_) => Err(Error::Busy),
        }
    }

    /// Take the advisory lock for session `id`, waiting for its holder.
    pub(crate) fn lock<P: Platform>(
        &self,
        id: u64,
        platform: &P,
        timeout: core::time::Duration,
    ) -> Result<()> {
        if self
            .owner_wq
            .wait_until_interruptible(platform, timeout, || self.try_lock(id).is_ok())?
        {
            Ok(())
        } else {
            Err(Error::TimedOut)
        }
    }

    pub(crate) fn unlock(&self, id: u64) -> Result<()> {
        self.owner
            .compare_exchange(id, 0, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy)?;
        self.owner_wq.notify();
        Ok(())
    }

    pub fn owner(&self) -> Option<u64> {
        match self.owner.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }
}

impl<I: BusIo> core::fmt::Debug for BusController<I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BusController")
            .field("bc", &self.bc)
            .field("serial", &self.serial)
            .field("state", &self.state())
            .field("up_rtis", &self.up_rtis())
            .field("handshake", &self.handshake)
            .finish()
    }
}
