//! Register window access for a bus controller.
//!
//! The embedding driver maps the CBMIA BAR and implements [`BusIo`] over it,
//! one instance per bus controller.  The window is big-endian on the PCI bus;
//! implementations perform any byte swapping so that the core only ever sees
//! register values.
//!
//! # Possible implementations
//!
//! - A mapped PCI BAR, using volatile big-endian accesses
//! - A simulated register file, for testing the core without hardware
//!
//! # Contexts
//!
//! Methods take `&self` because the same window is accessed concurrently from
//! process context (the transmit engine) and from the interrupt handler.  They
//! must not block.
//!
//! # Offsets
//!
//! All offsets are byte offsets into the window, see [`crate::regs`].

// Copyright (C) 2026 mil1553-core contributors
//
// MIT License

use alloc::sync::Arc;

use crate::Result;

/// Register window trait.
pub trait BusIo: Send + Sync {
    /// Read one 32-bit register.
    fn read_u32(&self, offset: u32) -> Result<u32>;

    /// Write one 32-bit register.
    fn write_u32(&self, offset: u32, value: u32) -> Result<()>;

    /// Read consecutive registers starting at `offset`.
    fn read_bulk(&self, offset: u32, buf: &mut [u32]) -> Result<()> {
        for (i, word) in buf.iter_mut().enumerate() {
            *word = self.read_u32(offset + (i as u32 * 4))?;
        }
        Ok(())
    }

    /// Write consecutive registers starting at `offset`.
    fn write_bulk(&self, offset: u32, data: &[u32]) -> Result<()> {
        for (i, word) in data.iter().enumerate() {
            self.write_u32(offset + (i as u32 * 4), *word)?;
        }
        Ok(())
    }
}

impl<T: BusIo + ?Sized> BusIo for Arc<T> {
    fn read_u32(&self, offset: u32) -> Result<u32> {
        (**self).read_u32(offset)
    }

    fn write_u32(&self, offset: u32, value: u32) -> Result<()> {
        (**self).write_u32(offset, value)
    }

    fn read_bulk(&self, offset: u32, buf: &mut [u32]) -> Result<()> {
        (**self).read_bulk(offset, buf)
    }

    fn write_bulk(&self, offset: u32, data: &[u32]) -> Result<()> {
        (**self).write_bulk(offset, data)
    }
}
