//! The driver context.
//!
//! [`Mil1553`] owns every probed bus controller, the platform services and the
//! configuration.  It is built once after device enumeration and shared by
//! reference with every client call and with the interrupt handler; there is
//! no global state.
//!
//! The work is split over three files:
//! - `builder` - validating and queueing submitted items
//! - `tx` - starting transfers on the hardware
//! - `isr` - completion handling and chaining the next transfer

// Copyright (C) 2026 mil1553-core contributors
//
// MIT License

mod builder;
mod isr;
mod tx;

pub use builder::SendItem;
pub use isr::IrqReturn;

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use core::time::Duration;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::client::{ClientHandle, PacketRole, ReceivedItem, Session};
use crate::config::Config;
use crate::controller::{BcInfo, BusController};
use crate::io::BusIo;
use crate::platform::Platform;
use crate::{Error, Result};

/// Most bus controllers one driver instance handles
pub const MAX_DEVS: usize = 16;

/// MIL-STD-1553 driver core.
///
/// Bus controllers are numbered from 1 in probe order.
///
/// ```rust,ignore
/// let driver = Mil1553::new(windows, platform, Config::default())?;
/// let client = driver.open();
/// let cw = ControlWord::new(rti, Transfer::Read, sa, 2);
/// driver.submit(&client, &[SendItem::new(1, rti, cw)])?;
/// let reply = driver.receive(&client, PacketRole::ALL, Duration::from_secs(1))?;
/// driver.close(client);
/// ```
pub struct Mil1553<I: BusIo, P: Platform> {
    controllers: Vec<BusController<I>>,
    platform: P,
    config: Config,
    icnt: AtomicU32,
    next_session: AtomicU64,
}

impl<I: BusIo, P: Platform> Mil1553<I, P> {
    /// Probe one bus controller per register window.
    ///
    /// Arguments:
    /// - `windows` - Register windows in enumeration order, at most
    ///   [`MAX_DEVS`]; extra windows are ignored
    /// - `platform` - Time and scheduling services
    /// - `config` - Timing and policy configuration
    pub fn new(windows: impl IntoIterator<Item = I>, platform: P, config: Config) -> Result<Self> {
        let mut controllers = Vec::new();
        for (index, io) in windows.into_iter().enumerate() {
            if index >= MAX_DEVS {
                warn!("More than {MAX_DEVS} bus controllers, ignoring the rest");
                break;
            }
            let bc = index as u32 + 1;
            controllers.push(BusController::probe(bc, io, &config, &platform)?);
        }
        info!("Installed {} bus controllers", controllers.len());

        Ok(Self {
            controllers,
            platform,
            config,
            icnt: AtomicU32::new(0),
            next_session: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Number of bus controllers installed
    pub fn bc_count(&self) -> u32 {
        self.controllers.len() as u32
    }

    /// Bus controller `bc`, numbered from 1
    pub fn controller(&self, bc: u32) -> Result<&BusController<I>> {
        (bc as usize)
            .checked_sub(1)
            .and_then(|index| self.controllers.get(index))
            .ok_or(Error::NotFound)
    }

    /// Interrupts handled across all bus controllers
    pub fn icnt(&self) -> u32 {
        self.icnt.load(Ordering::Acquire)
    }

    /// Open a client session.
    pub fn open(&self) -> ClientHandle {
        let id = self.next_session.fetch_add(1, Ordering::AcqRel);
        debug!("Open session {id}");
        ClientHandle::new(Session::new(
            id,
            self.config.queue_size,
            self.config.client_timeout,
        ))
    }

    /// Close a client session.
    ///
    /// Items it still has queued are transmitted as normal, but their replies
    /// are discarded.  Bus controller locks it holds are released.
    pub fn close(&self, client: ClientHandle) {
        let id = client.id();
        let session = client.downgrade();
        for controller in &self.controllers {
            let pending = controller
                .tx_queue
                .lock()
                .iter()
                .filter(|item| item.client.ptr_eq(&session))
                .count();
            if pending > 0 {
                debug!(
                    "Session {id} closed with {pending} items queued on BC{}, replies discarded",
                    controller.bc()
                );
            }
            if controller.owner() == Some(id) {
                let _ = controller.unlock(id);
                debug!("Session {id} released BC{} on close", controller.bc());
            }
        }
        debug!("Close session {id}");
    }

    /// Wait for the next reply for `client`.
    ///
    /// Returns at once if a reply is queued.  Otherwise blocks until the
    /// interrupt handler queues one for an item whose role is in `wake_mask`,
    /// or `timeout` elapses.  `wake_mask` and `timeout` become the session's
    /// current settings.
    pub fn receive(
        &self,
        client: &ClientHandle,
        wake_mask: PacketRole,
        timeout: Duration,
    ) -> Result<ReceivedItem> {
        client
            .session
            .read_queue(&self.platform, wake_mask, timeout)
    }

    /// Dequeue a reply if one is waiting.  Never blocks.
    pub fn try_receive(&self, client: &ClientHandle) -> Option<ReceivedItem> {
        client.session.try_read()
    }

    /// Submit one item and wait for its reply, using the session timeout.
    ///
    /// Returns `Ok(None)` for a `no_reply` item once it is queued.  Any reply
    /// already waiting on the session is returned first, so callers mixing
    /// this with [`Self::submit()`] should drain the session beforehand.
    ///
    /// A reply lost to a parity, manchester or word count error is reported
    /// as [`Error::HardwareFault`] once the timeout expires.
    pub fn send_receive(
        &self,
        client: &ClientHandle,
        item: SendItem,
    ) -> Result<Option<ReceivedItem>> {
        let no_reply = item.no_reply;
        let faults = client.session.faults();

        if self.submit(client, core::slice::from_ref(&item))? == 0 {
            return Err(Error::Busy);
        }
        if no_reply {
            return Ok(None);
        }

        let timeout = client.timeout();
        match client
            .session
            .read_queue(&self.platform, PacketRole::ALL, timeout)
        {
            Err(Error::TimedOut) if client.session.faults() != faults => Err(Error::HardwareFault),
            result => result.map(Some),
        }
    }

    /// Poll bus controller `bc` for live RTIs.  Returns the cached mask while
    /// transfers are queued.
    pub fn poll_up_rtis(&self, bc: u32) -> Result<u32> {
        self.controller(bc)?
            .poll_up_rtis(&self.config, &self.platform)
    }

    pub fn bc_info(&self, bc: u32) -> Result<BcInfo> {
        self.controller(bc)?.info(self.icnt())
    }

    /// Hardware status field of bus controller `bc`
    pub fn status(&self, bc: u32) -> Result<u32> {
        self.controller(bc)?.status()
    }

    pub fn set_bus_speed(&self, bc: u32, speed: u32) -> Result<()> {
        self.controller(bc)?.set_bus_speed(speed)
    }

    /// Take the advisory lock on bus controller `bc`, waiting for its holder
    /// up to the handshake timeout.  Locks are advisory: they only serialise
    /// clients that also lock.
    pub fn lock_bc(&self, client: &ClientHandle, bc: u32) -> Result<()> {
        self.controller(bc)?
            .lock(client.id(), &self.platform, self.config.handshake_timeout)
    }

    /// Take the advisory lock on `bc`, failing with [`Error::Busy`] if another
    /// session holds it.
    pub fn try_lock_bc(&self, client: &ClientHandle, bc: u32) -> Result<()> {
        self.controller(bc)?.try_lock(client.id())
    }

    pub fn unlock_bc(&self, client: &ClientHandle, bc: u32) -> Result<()> {
        self.controller(bc)?.unlock(client.id())
    }
}

impl<I: BusIo, P: Platform> core::fmt::Debug for Mil1553<I, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mil1553")
            .field("controllers", &self.controllers)
            .field("config", &self.config)
            .field("icnt", &self.icnt())
            .finish()
    }
}
