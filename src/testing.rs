//! Simulated CBMIA register window and host platform for tests.

// Copyright (C) 2026 mil1553-core contributors
//
// MIT License

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use spin::Mutex;

use crate::config::Config;
use crate::io::BusIo;
use crate::platform::Platform;
use crate::regs::{self, ControlWord, InterruptSource, IsrcFlags, packed_len};
use crate::{Error, Result};

const WINDOW_REGS: usize = 0x100 / 4;

/// Platform on `std::time`, with a settable pending signal.
#[derive(Debug)]
pub(crate) struct TestPlatform {
    epoch: Instant,
    signal: AtomicBool,
}

impl TestPlatform {
    pub(crate) fn new() -> Self {
        Self {
            epoch: Instant::now(),
            signal: AtomicBool::new(false),
        }
    }

    pub(crate) fn raise_signal(&self) {
        self.signal.store(true, Ordering::Release);
    }
}

impl Platform for TestPlatform {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn delay(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }

    fn relax(&self) {
        std::thread::yield_now();
    }

    fn signal_pending(&self) -> bool {
        self.signal.load(Ordering::Acquire)
    }
}

/// Short timeouts so that tests exercising lost interrupts stay fast.
pub(crate) fn test_config() -> Config {
    Config::default()
        .with_handshake_timeout(Duration::from_millis(50))
        .with_completion_timeout(Duration::from_millis(1))
        .with_busy_poll(4, Duration::ZERO)
        .with_up_rti_poll(2, Duration::ZERO)
        .with_client_timeout(Duration::from_millis(200))
}

/// A transfer started on the simulated hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Started {
    pub control: ControlWord,
    /// TXBUF contents at start, as 16-bit words
    pub words: Vec<u16>,
    /// Started while the RTI poller was running or interrupts were off
    pub polling: bool,
}

struct SimState {
    regs: [u32; WINDOW_REGS],
    up_rti_reads: VecDeque<u32>,
    up_rtis: u32,
    busy_reads: u32,
    txreg_reads: u32,
    started: Vec<Started>,
    unclaimed: VecDeque<ControlWord>,
    fail_reads: bool,
}

/// Register file behaving like a CBMIA module: ISRC clears on read, TXREG
/// writes are recorded as started transfers.
pub(crate) struct SimBus {
    state: Mutex<SimState>,
}

impl SimBus {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                regs: [0; WINDOW_REGS],
                up_rti_reads: VecDeque::new(),
                up_rtis: 0x7FFF_FFFE,
                busy_reads: 0,
                txreg_reads: 0,
                started: Vec::new(),
                unclaimed: VecDeque::new(),
                fail_reads: false,
            }),
        }
    }

    pub(crate) fn reg(&self, offset: u32) -> u32 {
        self.state.lock().regs[(offset / 4) as usize]
    }

    pub(crate) fn set_reg(&self, offset: u32, value: u32) {
        self.state.lock().regs[(offset / 4) as usize] = value;
    }

    pub(crate) fn set_serial(&self, serial: u64) {
        self.set_reg(regs::SNUM_H, (serial >> 32) as u32);
        self.set_reg(regs::SNUM_L, serial as u32);
    }

    pub(crate) fn set_up_rtis(&self, mask: u32) {
        let mut state = self.state.lock();
        state.up_rtis = mask;
        state.up_rti_reads.clear();
    }

    /// Values returned by successive up-RTI reads, before falling back to 0.
    pub(crate) fn set_up_rti_sequence(&self, reads: &[u32]) {
        let mut state = self.state.lock();
        state.up_rtis = 0;
        state.up_rti_reads = reads.iter().copied().collect();
    }

    /// TXREG reads report busy this many times.
    pub(crate) fn set_busy_reads(&self, reads: u32) {
        self.state.lock().busy_reads = reads;
    }

    /// TXREG reads since the last call
    pub(crate) fn take_txreg_reads(&self) -> u32 {
        core::mem::take(&mut self.state.lock().txreg_reads)
    }

    pub(crate) fn set_fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    pub(crate) fn started(&self) -> Vec<Started> {
        self.state.lock().started.clone()
    }

    pub(crate) fn started_count(&self) -> usize {
        self.state.lock().started.len()
    }

    /// Oldest transfer not yet answered by [`Self::take_started()`].
    pub(crate) fn take_started(&self) -> Option<ControlWord> {
        self.state.lock().unclaimed.pop_front()
    }

    /// Load the receive buffer and raise a completion for `rti`.
    pub(crate) fn complete(&self, rti: u32, status: u16, data: &[u16]) {
        let mut words = Vec::with_capacity(data.len() + 1);
        words.push(status);
        words.extend_from_slice(data);
        let mut rxregs = [0u32; packed_len(regs::RX_BUF_SIZE)];
        regs::pack_words(&words, &mut rxregs);

        let src = InterruptSource {
            flags: IsrcFlags::IRQ,
            rti,
            wc: data.len(),
        };
        let mut state = self.state.lock();
        let base = (regs::RXBUF / 4) as usize;
        state.regs[base..base + rxregs.len()].copy_from_slice(&rxregs);
        state.regs[(regs::ISRC / 4) as usize] = src.encode();
    }

    /// Raise a completion carrying error `flags` for `rti`.
    pub(crate) fn fail(&self, rti: u32, flags: IsrcFlags) {
        let src = InterruptSource {
            flags: IsrcFlags::IRQ | flags,
            rti,
            wc: 0,
        };
        self.set_reg(regs::ISRC, src.encode());
    }
}

impl BusIo for SimBus {
    fn read_u32(&self, offset: u32) -> Result<u32> {
        let mut state = self.state.lock();
        if state.fail_reads {
            return Err(Error::Io);
        }
        let index = (offset / 4) as usize;
        let value = match offset {
            regs::ISRC => core::mem::take(&mut state.regs[index]),
            regs::UP_RTIS => match state.up_rti_reads.pop_front() {
                Some(v) => v,
                None => state.up_rtis,
            },
            regs::TXREG => {
                state.txreg_reads += 1;
                if state.busy_reads > 0 {
                    state.busy_reads -= 1;
                    regs::TXREG_BUSY
                } else {
                    0
                }
            }
            _ => *state.regs.get(index).ok_or(Error::Io)?,
        };
        Ok(value)
    }

    fn write_u32(&self, offset: u32, value: u32) -> Result<()> {
        let mut state = self.state.lock();
        let index = (offset / 4) as usize;
        *state.regs.get_mut(index).ok_or(Error::Io)? = value;

        if offset == regs::TXREG {
            let control = ControlWord(value);
            let base = (regs::TXBUF / 4) as usize;
            let wc = control.word_count();
            let mut words = alloc::vec![0u16; packed_len(wc) * 2];
            regs::unpack_words(&state.regs[base..base + packed_len(wc)], &mut words);
            words.truncate(wc);
            let polling = state.regs[(regs::CMD / 4) as usize] & regs::CMD_POLL_OFF == 0
                || state.regs[(regs::INTEN / 4) as usize] == 0;
            state.started.push(Started {
                control,
                words,
                polling,
            });
            state.unclaimed.push_back(control);
        }
        Ok(())
    }
}

/// Driver over `n` simulated bus controllers.
pub(crate) fn sim_driver(
    n: usize,
    config: Config,
) -> (
    crate::Mil1553<Arc<SimBus>, TestPlatform>,
    Vec<Arc<SimBus>>,
) {
    let sims: Vec<Arc<SimBus>> = (0..n).map(|_| Arc::new(SimBus::new())).collect();
    let driver = crate::Mil1553::new(sims.iter().cloned(), TestPlatform::new(), config)
        .expect("probe simulated bus controllers");
    (driver, sims)
}
