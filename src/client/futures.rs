//! Asynchronous Client - for callers that must not block a thread while a
//! reply is outstanding.

// Copyright (C) 2026 mil1553-core contributors
//
// MIT License

use alloc::boxed::Box;
use core::time::Duration;

use async_trait::async_trait;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::client::{ClientHandle, ReceivedItem};
use crate::driver::SendItem;
use crate::io::BusIo;
use crate::platform::Platform;
use crate::{Error, Mil1553, Result};

/// Yield delay for async polling loops.
///
/// Application must provide an implementation of this trait in order for the
/// async client to be able to yield while waiting for the interrupt handler to
/// deliver a reply.
///
/// This trait keeps `mil1553-core` free of any specific async runtime.
///
/// Example:
///
/// ```rust,ignore
/// use embassy_time::{Duration, Timer};
/// struct Delay;
/// impl AsyncDelay for Delay {
///     async fn delay() {
///         Timer::after(Duration::from_micros(100)).await;
///     }
/// }
/// ```
pub trait AsyncDelay {
    fn delay() -> impl Future<Output = ()>;
}

/// Transaction interface for async dispatch layers.
#[async_trait(?Send)]
pub trait AsyncTransport {
    /// Queue items, returning how many were accepted
    async fn submit(&mut self, items: &[SendItem]) -> Result<usize>;

    /// Next reply, or [`Error::TimedOut`] once `timeout` has passed
    async fn receive(&mut self, timeout: Duration) -> Result<ReceivedItem>;

    /// Timeout used by [`Self::request()`]
    fn timeout(&self) -> Duration;

    /// Submit a single item and wait for its reply.  Returns `Ok(None)` for a
    /// `no_reply` item once queued.
    async fn request(&mut self, item: SendItem) -> Result<Option<ReceivedItem>> {
        let no_reply = item.no_reply;
        if self.submit(core::slice::from_ref(&item)).await? == 0 {
            return Err(Error::Busy);
        }
        if no_reply {
            return Ok(None);
        }
        let timeout = self.timeout();
        self.receive(timeout).await.map(Some)
    }
}

/// Async client session.
///
/// Owns a session on the driver for its lifetime.  Submission runs
/// synchronously, as it only waits on the hardware handshake; receiving polls
/// the session queue, yielding through `D` between polls.  A receive that
/// times out after a bus error since the last submit fails with
/// [`Error::HardwareFault`].
///
/// See [`AsyncDelay`] for required delay trait.
///
/// Example usage:
///
/// ```rust,ignore
/// let mut client = AsyncClient::<_, _, Delay>::new(&driver);
/// let cw = ControlWord::new(rti, Transfer::Read, sa, 4);
/// let reply = client.request(SendItem::new(1, rti, cw)).await?;
/// client.close();
/// ```
pub struct AsyncClient<'a, I: BusIo, P: Platform, D: AsyncDelay> {
    driver: &'a Mil1553<I, P>,
    handle: ClientHandle,
    /// Session fault count at the last submit
    faults: u32,
    _delay: core::marker::PhantomData<D>,
}

impl<'a, I: BusIo, P: Platform, D: AsyncDelay> AsyncClient<'a, I, P, D> {
    /// Open a session on `driver`.
    pub fn new(driver: &'a Mil1553<I, P>) -> Self {
        Self {
            driver,
            handle: driver.open(),
            faults: 0,
            _delay: core::marker::PhantomData,
        }
    }

    /// The underlying session, for the synchronous driver calls
    pub fn handle(&self) -> &ClientHandle {
        &self.handle
    }

    /// Close the session, releasing any bus controller locks it holds.
    pub fn close(self) {
        self.driver.close(self.handle);
    }
}

#[async_trait(?Send)]
impl<I: BusIo, P: Platform, D: AsyncDelay> AsyncTransport for AsyncClient<'_, I, P, D> {
    async fn submit(&mut self, items: &[SendItem]) -> Result<usize> {
        self.faults = self.handle.faults();
        self.driver.submit(&self.handle, items)
    }

    async fn receive(&mut self, timeout: Duration) -> Result<ReceivedItem> {
        let platform = self.driver.platform();
        let deadline = platform.now().saturating_add(timeout);
        loop {
            if let Some(reply) = self.driver.try_receive(&self.handle) {
                trace!(
                    "Session {} async receive BC{} RTI{}",
                    self.handle.id(),
                    reply.bc,
                    reply.rti
                );
                return Ok(reply);
            }
            if platform.now() >= deadline {
                debug!("Session {} async receive timed out", self.handle.id());
                return Err(if self.handle.faults() != self.faults {
                    Error::HardwareFault
                } else {
                    Error::TimedOut
                });
            }
            D::delay().await;
        }
    }

    fn timeout(&self) -> Duration {
        self.handle.timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::{ControlWord, IsrcFlags, Transfer};
    use crate::testing::{sim_driver, test_config};
    use core::pin::pin;
    use core::task::{Context, Poll, Waker};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    struct YieldNow(bool);

    impl Future for YieldNow {
        type Output = ();

        fn poll(mut self: core::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.0 {
                Poll::Ready(())
            } else {
                self.0 = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    struct Yield;

    impl AsyncDelay for Yield {
        async fn delay() {
            YieldNow(false).await;
            thread::yield_now();
        }
    }

    fn block_on<F: Future>(fut: F) -> F::Output {
        let mut fut = pin!(fut);
        let mut cx = Context::from_waker(Waker::noop());
        loop {
            if let Poll::Ready(v) = fut.as_mut().poll(&mut cx) {
                return v;
            }
        }
    }

    #[test]
    fn request_round_trip() {
        let (driver, sims) = sim_driver(1, test_config());
        let sim = &sims[0];
        let done = AtomicBool::new(false);
        thread::scope(|s| {
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    if let Some(cw) = sim.take_started() {
                        sim.complete(cw.rti(), 0x2800, &[0xBEEF, 0xCAFE]);
                        driver.isr(1);
                    }
                    thread::yield_now();
                }
            });

            let mut client = AsyncClient::<_, _, Yield>::new(&driver);
            let cw = ControlWord::new(5, Transfer::Read, 2, 2);
            let result = block_on(client.request(SendItem::new(1, 5, cw)));
            done.store(true, Ordering::Release);
            let reply = result.unwrap().unwrap();
            assert_eq!(reply.rti, 5);
            assert_eq!(reply.status, 0x2800);
            assert_eq!(reply.data(), &[0xBEEF, 0xCAFE]);
            client.close();
        });
    }

    #[test]
    fn no_reply_request_returns_none() {
        let (driver, _sims) = sim_driver(1, test_config());
        let mut client = AsyncClient::<_, _, Yield>::new(&driver);
        let cw = ControlWord::new(3, Transfer::Write, 1, 1);
        let item = SendItem::new(1, 3, cw).with_payload(&[1]).with_no_reply();
        assert_eq!(block_on(client.request(item)), Ok(None));
    }

    #[test]
    fn receive_times_out() {
        let (driver, _sims) = sim_driver(1, test_config());
        let mut client = AsyncClient::<_, _, Yield>::new(&driver);
        assert_eq!(
            block_on(client.receive(Duration::from_millis(5))),
            Err(Error::TimedOut)
        );
    }

    #[test]
    fn bus_error_reported_as_fault() {
        let (driver, sims) = sim_driver(1, test_config());
        let sim = &sims[0];
        thread::scope(|s| {
            s.spawn(|| {
                while sim.take_started().is_none() {
                    thread::yield_now();
                }
                sim.fail(2, IsrcFlags::PARITY);
                driver.isr(1);
            });

            let mut client = AsyncClient::<_, _, Yield>::new(&driver);
            client.handle().set_timeout(Duration::from_millis(50));
            let cw = ControlWord::new(2, Transfer::Read, 1, 1);
            assert_eq!(
                block_on(client.request(SendItem::new(1, 2, cw))),
                Err(Error::HardwareFault)
            );
        });
    }

    #[test]
    fn unknown_bc_rejected() {
        let (driver, _sims) = sim_driver(1, test_config());
        let mut client = AsyncClient::<_, _, Yield>::new(&driver);
        let cw = ControlWord::new(2, Transfer::Read, 1, 1);
        assert_eq!(
            block_on(client.request(SendItem::new(7, 2, cw))),
            Err(Error::NotFound)
        );
    }
}
