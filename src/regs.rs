//! CBMIA register window layout and the codecs the core needs on top of it.
//!
//! Offsets are byte offsets into the mapped window, each register is 32 bits.
//! The transmit and receive buffers hold 16-bit bus words, two per register:
//! the even-indexed word in the low half, the odd-indexed word in the high
//! half.

// Copyright (C) 2026 mil1553-core contributors
//
// MIT License

use bitflags::bitflags;

/// R/W Interrupt source, cleared on read
pub const ISRC: u32 = 0x00;
/// R/W Interrupt enable
pub const INTEN: u32 = 0x04;
/// R   Temperature
pub const TEMP: u32 = 0x08;
/// R   Hardware status
pub const HSTAT: u32 = 0x0C;
/// R/W Command
pub const CMD: u32 = 0x10;
/// R   High 32 bits of serial number
pub const SNUM_H: u32 = 0x18;
/// R   Low 32 bits of serial number
pub const SNUM_L: u32 = 0x1C;
/// R/W Transmit control, writing starts a bus transfer
pub const TXREG: u32 = 0x20;
/// R   RTIs seen by the hardware poller
pub const UP_RTIS: u32 = 0x24;
/// R   Receive buffer, RTI status word followed by data words
pub const RXBUF: u32 = 0x28;
/// R/W Transmit buffer
pub const TXBUF: u32 = 0x6C;

/// Data words per transfer
pub const TX_BUF_SIZE: usize = 32;
/// Receive buffer words, the RTI status word plus data
pub const RX_BUF_SIZE: usize = TX_BUF_SIZE + 1;

/// Highest RTI address on a bus
pub const MAX_RTI: u32 = 30;

/// TXREG reads back with this bit set while the previous transfer is being
/// clocked out
pub const TXREG_BUSY: u32 = 1 << 31;

pub const HSTAT_STAT_MASK: u32 = 0x0000_FFFF;
pub const HSTAT_STAT_SHIFT: u32 = 0;
pub const HSTAT_VER_MASK: u32 = 0xFFFF_0000;
pub const HSTAT_VER_SHIFT: u32 = 16;

pub const CMD_SPEED_MASK: u32 = 0x3;
pub const CMD_SPEED_SHIFT: u32 = 0;
/// Hardware RTI polling off
pub const CMD_POLL_OFF: u32 = 1 << 4;
/// 1 Mbit/s, the only speed used in operation
pub const CMD_SPEED_1M: u32 = 0;

/// Interrupt on transfer finished
pub const INTEN_INF: u32 = 0x1;

const CW_WC_MASK: u32 = 0x001F;
const CW_WC_SHIFT: u32 = 0;
const CW_SA_MASK: u32 = 0x03E0;
const CW_SA_SHIFT: u32 = 5;
const CW_TR_MASK: u32 = 0x0400;
const CW_TR_SHIFT: u32 = 10;
const CW_RTI_MASK: u32 = 0xF800;
const CW_RTI_SHIFT: u32 = 11;

const ISRC_RTI_MASK: u32 = 0x0000_1F00;
const ISRC_RTI_SHIFT: u32 = 8;
const ISRC_WC_MASK: u32 = 0x003F_0000;
const ISRC_WC_SHIFT: u32 = 16;

/// Transfer direction, seen from the RTI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// BC sends data words to the RTI
    Write = 0,
    /// RTI sends data words to the BC
    Read = 1,
}

/// Command word written to TXREG: RTI address, T/R bit, subaddress and word
/// count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlWord(pub u32);

impl ControlWord {
    /// Pack a command word.  A word count of 32 is encoded as 0.
    pub const fn new(rti: u32, tr: Transfer, sa: u32, wc: u32) -> Self {
        let cw = ((rti << CW_RTI_SHIFT) & CW_RTI_MASK)
            | ((tr as u32) << CW_TR_SHIFT)
            | ((sa << CW_SA_SHIFT) & CW_SA_MASK)
            | ((wc << CW_WC_SHIFT) & CW_WC_MASK);
        Self(cw)
    }

    pub const fn rti(&self) -> u32 {
        (self.0 & CW_RTI_MASK) >> CW_RTI_SHIFT
    }

    pub const fn subaddress(&self) -> u32 {
        (self.0 & CW_SA_MASK) >> CW_SA_SHIFT
    }

    pub const fn transfer(&self) -> Transfer {
        if (self.0 & CW_TR_MASK) != 0 {
            Transfer::Read
        } else {
            Transfer::Write
        }
    }

    /// Data word count.  The hardware encodes 32 as 0.
    pub const fn word_count(&self) -> usize {
        match (self.0 & CW_WC_MASK) >> CW_WC_SHIFT {
            0 => TX_BUF_SIZE,
            wc => wc as usize,
        }
    }
}

bitflags! {
    /// Event bits of the interrupt source register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IsrcFlags: u32 {
        /// A transfer finished on this device
        const IRQ = 0x01;
        /// Addressed RTI did not respond
        const TIMEOUT = 0x02;
        const PARITY = 0x04;
        const MANCHESTER = 0x08;
        const WC_ERROR = 0x10;
    }
}

/// Decoded interrupt source register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptSource {
    pub flags: IsrcFlags,
    /// RTI that answered
    pub rti: u32,
    /// Data words received, not counting the status word
    pub wc: usize,
}

impl InterruptSource {
    pub fn decode(isrc: u32) -> Self {
        let wc = ((isrc & ISRC_WC_MASK) >> ISRC_WC_SHIFT) as usize;
        Self {
            flags: IsrcFlags::from_bits_truncate(isrc),
            rti: (isrc & ISRC_RTI_MASK) >> ISRC_RTI_SHIFT,
            wc: wc.min(TX_BUF_SIZE),
        }
    }

    /// Raw register value with these fields, as the hardware would present it.
    pub fn encode(&self) -> u32 {
        self.flags.bits()
            | ((self.rti << ISRC_RTI_SHIFT) & ISRC_RTI_MASK)
            | (((self.wc as u32) << ISRC_WC_SHIFT) & ISRC_WC_MASK)
    }

    /// Interrupt was raised by this device
    pub fn is_irq(&self) -> bool {
        self.flags.contains(IsrcFlags::IRQ)
    }

    pub fn timed_out(&self) -> bool {
        self.flags.contains(IsrcFlags::TIMEOUT)
    }

    /// Parity, manchester or word count error
    pub fn is_bad(&self) -> bool {
        self.flags
            .intersects(IsrcFlags::PARITY | IsrcFlags::MANCHESTER | IsrcFlags::WC_ERROR)
    }
}

/// Number of 32-bit registers holding `words` 16-bit words.
pub const fn packed_len(words: usize) -> usize {
    words.div_ceil(2)
}

/// Pack 16-bit words into registers, even word in the low half.  An odd
/// trailing word is padded with 0 in the high half.
pub fn pack_words(words: &[u16], regs: &mut [u32]) {
    for (i, reg) in regs.iter_mut().enumerate().take(packed_len(words.len())) {
        let lo = words[i * 2] as u32;
        let hi = words.get(i * 2 + 1).copied().unwrap_or(0) as u32;
        *reg = (hi << 16) | lo;
    }
}

/// Unpack registers into 16-bit words, the inverse of [`pack_words()`].
pub fn unpack_words(regs: &[u32], words: &mut [u16]) {
    for (i, reg) in regs.iter().enumerate() {
        if let Some(w) = words.get_mut(i * 2) {
            *w = (*reg & 0xFFFF) as u16;
        }
        if let Some(w) = words.get_mut(i * 2 + 1) {
            *w = (*reg >> 16) as u16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_zero_means_32() {
        let cw = ControlWord::new(5, Transfer::Read, 1, 0);
        assert_eq!(cw.word_count(), 32);
        let cw = ControlWord::new(5, Transfer::Read, 1, 32);
        assert_eq!(cw.word_count(), 32);
        let cw = ControlWord::new(5, Transfer::Read, 1, 7);
        assert_eq!(cw.word_count(), 7);
    }

    #[test]
    fn control_word_fields() {
        let cw = ControlWord::new(17, Transfer::Write, 0x1E, 3);
        assert_eq!(cw.rti(), 17);
        assert_eq!(cw.subaddress(), 0x1E);
        assert_eq!(cw.transfer(), Transfer::Write);
        assert_eq!(cw.0, (17 << 11) | (0x1E << 5) | 3);
    }

    #[test]
    fn interleave_order() {
        let mut regs = [0u32; 2];
        pack_words(&[0x1111, 0x2222, 0x3333], &mut regs);
        assert_eq!(regs, [0x2222_1111, 0x0000_3333]);

        let mut words = [0u16; 3];
        unpack_words(&regs, &mut words);
        assert_eq!(words, [0x1111, 0x2222, 0x3333]);
    }

    #[test]
    fn isrc_decode() {
        let src = InterruptSource::decode(0x0005_0A01);
        assert!(src.is_irq());
        assert!(!src.timed_out());
        assert!(!src.is_bad());
        assert_eq!(src.rti, 10);
        assert_eq!(src.wc, 5);
        assert_eq!(src.encode(), 0x0005_0A01);

        let src = InterruptSource::decode(IsrcFlags::IRQ.bits() | IsrcFlags::PARITY.bits());
        assert!(src.is_bad());
        assert!(!InterruptSource::decode(0).is_irq());
    }
}
