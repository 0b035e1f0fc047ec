//! Control records exchanged with the SMB2 driver.
//!
//! Each record is `#[repr(C)]` so its field order matches the driver ABI:
//! flags, device address, optional command byte, then the payload.

use alloc::vec;
use alloc::vec::Vec;

use bitflags::bitflags;

use crate::signal::SignalCode;

/// Maximum payload of an SMBus block transfer.
pub const BLOCK_MAX_BYTES: usize = 32;

/// Offset of the SMB2 block codes in the driver's block status space.
const BLOCK_CODE_BASE: u32 = 0x300;

bitflags! {
    /// Per-transfer flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SmbFlags: u32 {
        /// Append and check a packet error code.
        const PEC = 1 << 0;
        /// Use ten-bit addressing.
        const TEN_BIT_ADDR = 1 << 1;
    }
}

bitflags! {
    /// Flags of a single I2C message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct I2cFlags: u16 {
        /// Read from the device (write otherwise).
        const READ = 1 << 0;
    }
}

/// Selector of a driver block operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum BlockCode {
    QuickComm = BLOCK_CODE_BASE,
    WriteByte,
    ReadByte,
    WriteByteData,
    ReadByteData,
    WriteWordData,
    ReadWordData,
    WriteBlockData,
    ReadBlockData,
    ProcessCall,
    BlockProcessCall,
    AlertResponse,
    AlertCbInstall,
    AlertCbRemove,
    I2cXfer,
}

/// Direction of a quick command; the r/w bit is the command itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadWrite {
    Write = 0,
    Read = 1,
}

/// Record for single-value transfers.
///
/// `data` holds a byte, a word or the alert count depending on the
/// operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Transfer {
    pub flags: u32,
    pub addr: u16,
    pub read_write: u8,
    pub cmd_addr: u8,
    pub data: u16,
}

impl Transfer {
    /// Creates a zeroed record addressed to `addr`.
    pub fn new(flags: SmbFlags, addr: u16) -> Self {
        Self {
            flags: flags.bits(),
            addr,
            ..Default::default()
        }
    }

    /// Sets the command or index byte.
    pub fn with_cmd(mut self, cmd_addr: u8) -> Self {
        self.cmd_addr = cmd_addr;
        self
    }

    #[inline]
    pub fn byte(&self) -> u8 {
        self.data as u8
    }

    #[inline]
    pub fn set_byte(&mut self, byte: u8) {
        self.data = byte as u16;
    }

    #[inline]
    pub fn word(&self) -> u16 {
        self.data
    }

    #[inline]
    pub fn set_word(&mut self, word: u16) {
        self.data = word;
    }
}

/// Record for block transfers.
///
/// `length` is the block length for plain block transfers and the write length
/// for block process calls, whose reply lands in `data[length..length + read_len]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct TransferBlock {
    pub flags: u32,
    pub addr: u16,
    pub cmd_addr: u8,
    pub length: u8,
    pub read_len: u8,
    pub data: [u8; BLOCK_MAX_BYTES],
}

impl TransferBlock {
    /// Creates a zeroed record addressed to `addr` with command `cmd_addr`.
    pub fn new(flags: SmbFlags, addr: u16, cmd_addr: u8) -> Self {
        Self {
            flags: flags.bits(),
            addr,
            cmd_addr,
            length: 0,
            read_len: 0,
            data: [0; BLOCK_MAX_BYTES],
        }
    }

    /// Copies `payload` to the front of the data area and records its length.
    ///
    /// The caller has validated `payload.len() <= BLOCK_MAX_BYTES`.
    pub fn load(&mut self, payload: &[u8]) {
        let len = payload.len().min(BLOCK_MAX_BYTES);
        self.data[..len].copy_from_slice(&payload[..len]);
        self.length = len as u8;
    }
}

/// Record for alert callback registration at the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct AlertCtrl {
    pub addr: u16,
    pub sig_code: u32,
}

impl AlertCtrl {
    pub fn new(addr: u16, code: SignalCode) -> Self {
        Self {
            addr,
            sig_code: code.0,
        }
    }

    pub fn code(&self) -> SignalCode {
        SignalCode(self.sig_code)
    }
}

/// One message of a raw I2C transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cMessage {
    pub addr: u16,
    pub flags: I2cFlags,
    pub buf: Vec<u8>,
}

impl I2cMessage {
    /// A message writing `data` to `addr`.
    pub fn write(addr: u16, data: &[u8]) -> Self {
        Self {
            addr,
            flags: I2cFlags::empty(),
            buf: data.to_vec(),
        }
    }

    /// A message reading `len` bytes from `addr`.
    pub fn read(addr: u16, len: usize) -> Self {
        Self {
            addr,
            flags: I2cFlags::READ,
            buf: vec![0; len],
        }
    }

    pub fn is_read(&self) -> bool {
        self.flags.contains(I2cFlags::READ)
    }
}

/// A borrowed control record handed to the driver.
#[derive(Debug)]
pub enum ControlBlock<'a> {
    Transfer(&'a mut Transfer),
    Block(&'a mut TransferBlock),
    Alert(&'a mut AlertCtrl),
    I2c(&'a mut I2cMessage),
}

impl ControlBlock<'_> {
    /// Device address the record is directed at.
    pub fn addr(&self) -> u16 {
        match self {
            ControlBlock::Transfer(trx) => trx.addr,
            ControlBlock::Block(blk) => blk.addr,
            ControlBlock::Alert(ctrl) => ctrl.addr,
            ControlBlock::I2c(msg) => msg.addr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_codes_are_consecutive() {
        assert_eq!(BlockCode::QuickComm as u32, 0x300);
        assert_eq!(BlockCode::I2cXfer as u32, 0x30E);
    }

    #[test]
    fn test_transfer_block_load() {
        let mut blk = TransferBlock::new(SmbFlags::PEC, 0x50, 0x10);
        blk.load(&[1, 2, 3]);
        assert_eq!(blk.length, 3);
        assert_eq!(&blk.data[..4], &[1, 2, 3, 0]);
        assert_eq!(blk.flags, SmbFlags::PEC.bits());
    }

    #[test]
    fn test_transfer_byte_and_word_views() {
        let mut trx = Transfer::new(SmbFlags::empty(), 0x20).with_cmd(7);
        trx.set_word(0xBEEF);
        assert_eq!(trx.byte(), 0xEF);
        trx.set_byte(0x12);
        assert_eq!(trx.word(), 0x12);
        assert_eq!(trx.cmd_addr, 7);
    }

    #[test]
    fn test_i2c_message_constructors() {
        let msg = I2cMessage::read(0x51, 4);
        assert!(msg.is_read());
        assert_eq!(msg.buf.len(), 4);
        assert!(!I2cMessage::write(0x51, &[0]).is_read());
    }
}
