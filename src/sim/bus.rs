//! In-memory SMBus driver.
//!
//! Devices are passive stores: whatever is written can be read back. The bus
//! also keeps the driver-side alert table, so a test can raise an alert for a
//! device and learn which notification code the driver would deliver.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use arrayvec::ArrayVec;
use spin::Mutex;

use crate::driver::{DeviceOpener, SmbDriver};
use crate::error::{SmbError, SmbResult};
use crate::signal::SignalCode;
use crate::transfer::{BLOCK_MAX_BYTES, BlockCode, ControlBlock, TransferBlock};

/// State of one simulated device.
#[derive(Debug, Default)]
struct SimDevice {
    /// Last byte of a plain byte write.
    byte: u8,
    /// Per-command byte and word registers.
    registers: BTreeMap<u8, u16>,
    /// Per-command blocks.
    blocks: BTreeMap<u8, ArrayVec<u8, BLOCK_MAX_BYTES>>,
    /// Buffer shared by raw I2C writes and reads.
    i2c: Vec<u8>,
}

#[derive(Debug, Default)]
struct SimBusState {
    devices: BTreeMap<u16, SimDevice>,
    /// Driver-side alert registrations.
    alerts: BTreeMap<u16, SignalCode>,
    /// Devices with an unacknowledged alert, oldest first.
    pending: Vec<u16>,
    /// One-shot failures per block code.
    failures: BTreeMap<BlockCode, SmbError>,
    closed: bool,
}

struct SimBusInner {
    name: String,
    state: Mutex<SimBusState>,
    transfers: AtomicU64,
}

/// Simulated SMB2 driver path.
///
/// Clones share the same bus, so a test can keep one while a session owns
/// another.
#[derive(Clone)]
pub struct SimBus {
    inner: Arc<SimBusInner>,
}

impl SimBus {
    /// Creates an empty bus reachable under device name `name`.
    pub fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(SimBusInner {
                name: name.to_string(),
                state: Mutex::new(SimBusState::default()),
                transfers: AtomicU64::new(0),
            }),
        }
    }

    /// Adds a device at `addr`.
    pub fn with_device(self, addr: u16) -> Self {
        self.add_device(addr);
        self
    }

    /// Adds a device at `addr`.
    pub fn add_device(&self, addr: u16) {
        self.inner.state.lock().devices.entry(addr).or_default();
    }

    /// Makes the next request with `code` fail with `err`.
    pub fn fail_next(&self, code: BlockCode, err: SmbError) {
        self.inner.state.lock().failures.insert(code, err);
    }

    /// Lets the device at `addr` raise an alert.
    ///
    /// Returns the notification code the driver delivers for it, or `None` if
    /// no alert callback is registered for the device.
    pub fn raise_alert(&self, addr: u16) -> Option<SignalCode> {
        let mut state = self.inner.state.lock();
        if !state.pending.contains(&addr) {
            state.pending.push(addr);
        }
        state.alerts.get(&addr).copied()
    }

    /// Notification code registered at the driver for `addr`.
    pub fn alert_code(&self, addr: u16) -> Option<SignalCode> {
        self.inner.state.lock().alerts.get(&addr).copied()
    }

    /// Number of driver-side alert registrations.
    pub fn alert_registrations(&self) -> usize {
        self.inner.state.lock().alerts.len()
    }

    /// Number of requests that reached the bus.
    pub fn transfer_count(&self) -> u64 {
        self.inner.transfers.load(Ordering::Relaxed)
    }

    /// Checks whether a path to this bus was closed.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    fn request(&self, code: BlockCode, block: ControlBlock<'_>) -> SmbResult {
        self.inner.transfers.fetch_add(1, Ordering::Relaxed);
        let mut state = self.inner.state.lock();

        if let Some(err) = state.failures.remove(&code) {
            trace!("sim: injected {:?} for {:?}", err, code);
            return Err(err);
        }

        let addr = block.addr();
        if code != BlockCode::AlertResponse && !state.devices.contains_key(&addr) {
            return Err(SmbError::NoDevice);
        }

        match (code, block) {
            (BlockCode::AlertCbInstall, ControlBlock::Alert(ctrl)) => {
                state.alerts.insert(ctrl.addr, ctrl.code());
                Ok(())
            }
            (BlockCode::AlertCbRemove, ControlBlock::Alert(ctrl)) => state
                .alerts
                .remove(&ctrl.addr)
                .map(|_| ())
                .ok_or(SmbError::ParamError),
            (BlockCode::AlertResponse, ControlBlock::Transfer(trx)) => {
                let before = state.pending.len();
                state
                    .pending
                    .retain(|&pending| trx.addr != 0 && pending != trx.addr);
                trx.set_word((before - state.pending.len()) as u16);
                Ok(())
            }
            (BlockCode::I2cXfer, ControlBlock::I2c(msg)) => {
                let device = state.device(addr)?;
                if msg.is_read() {
                    for (i, byte) in msg.buf.iter_mut().enumerate() {
                        *byte = device.i2c.get(i).copied().unwrap_or(0);
                    }
                } else {
                    device.i2c = msg.buf.clone();
                }
                Ok(())
            }
            (code, ControlBlock::Transfer(trx)) => {
                let device = state.device(addr)?;
                match code {
                    BlockCode::QuickComm => {}
                    BlockCode::WriteByte => device.byte = trx.byte(),
                    BlockCode::ReadByte => trx.set_byte(device.byte),
                    BlockCode::WriteByteData | BlockCode::WriteWordData => {
                        device.registers.insert(trx.cmd_addr, trx.word());
                    }
                    BlockCode::ReadByteData | BlockCode::ReadWordData => {
                        let value = device.registers.get(&trx.cmd_addr).copied().unwrap_or(0);
                        trx.set_word(value);
                    }
                    BlockCode::ProcessCall => {
                        let previous = device
                            .registers
                            .insert(trx.cmd_addr, trx.word())
                            .unwrap_or(0);
                        trx.set_word(previous);
                    }
                    _ => return Err(SmbError::NotSupported),
                }
                Ok(())
            }
            (code, ControlBlock::Block(blk)) => {
                let device = state.device(addr)?;
                match code {
                    BlockCode::WriteBlockData => {
                        device.blocks.insert(blk.cmd_addr, stored_block(blk, 0)?);
                    }
                    BlockCode::ReadBlockData => {
                        let stored = device.blocks.get(&blk.cmd_addr).cloned().unwrap_or_default();
                        blk.data[..stored.len()].copy_from_slice(&stored);
                        blk.length = stored.len() as u8;
                    }
                    BlockCode::BlockProcessCall => {
                        let write_len = blk.length as usize;
                        let previous = device
                            .blocks
                            .insert(blk.cmd_addr, stored_block(blk, 0)?)
                            .unwrap_or_default();
                        let read_len = previous.len().min(BLOCK_MAX_BYTES - write_len);
                        blk.data[write_len..write_len + read_len]
                            .copy_from_slice(&previous[..read_len]);
                        blk.read_len = read_len as u8;
                    }
                    _ => return Err(SmbError::NotSupported),
                }
                Ok(())
            }
            _ => Err(SmbError::ParamError),
        }
    }
}

impl SimBusState {
    fn device(&mut self, addr: u16) -> SmbResult<&mut SimDevice> {
        self.devices.get_mut(&addr).ok_or(SmbError::NoDevice)
    }
}

/// Copies the written part of a block record.
fn stored_block(blk: &TransferBlock, offset: usize) -> SmbResult<ArrayVec<u8, BLOCK_MAX_BYTES>> {
    let end = offset + blk.length as usize;
    let mut stored = ArrayVec::new();
    stored
        .try_extend_from_slice(blk.data.get(offset..end).ok_or(SmbError::ParamError)?)
        .map_err(|_| SmbError::ParamError)?;
    Ok(stored)
}

impl SmbDriver for SimBus {
    fn set_block(&self, code: BlockCode, block: ControlBlock<'_>) -> SmbResult {
        self.request(code, block)
    }

    fn get_block(&self, code: BlockCode, block: ControlBlock<'_>) -> SmbResult {
        self.request(code, block)
    }

    fn close(&self) -> SmbResult {
        self.inner.state.lock().closed = true;
        Ok(())
    }
}

impl DeviceOpener for SimBus {
    type Driver = SimBus;

    fn open(&self, device: &str) -> SmbResult<SimBus> {
        if device != self.inner.name {
            debug!("sim: no device named {}", device);
            return Err(SmbError::NoDescriptor);
        }
        self.inner.state.lock().closed = false;
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{AlertCtrl, SmbFlags, Transfer};

    #[test]
    fn test_sim_bus_open_by_name() {
        let bus = SimBus::new("smb2_1");
        assert!(bus.open("smb2_1").is_ok());
        assert_eq!(bus.open("smb2_2").err(), Some(SmbError::NoDescriptor));
    }

    #[test]
    fn test_sim_bus_alert_table_and_response() {
        let bus = SimBus::new("smb2_1").with_device(0x50).with_device(0x51);
        let mut ctrl = AlertCtrl::new(0x50, SignalCode(4));
        bus.set_block(BlockCode::AlertCbInstall, ControlBlock::Alert(&mut ctrl))
            .unwrap();

        assert_eq!(bus.raise_alert(0x50), Some(SignalCode(4)));
        assert_eq!(bus.raise_alert(0x51), None);

        let mut trx = Transfer::new(SmbFlags::empty(), 0x51);
        bus.get_block(BlockCode::AlertResponse, ControlBlock::Transfer(&mut trx))
            .unwrap();
        assert_eq!(trx.word(), 1);

        let mut trx = Transfer::new(SmbFlags::empty(), 0);
        bus.get_block(BlockCode::AlertResponse, ControlBlock::Transfer(&mut trx))
            .unwrap();
        assert_eq!(trx.word(), 1);
    }

    #[test]
    fn test_sim_bus_injected_failure_is_one_shot() {
        let bus = SimBus::new("smb2_1").with_device(0x50);
        bus.fail_next(BlockCode::QuickComm, SmbError::BusCollision);

        let mut trx = Transfer::new(SmbFlags::empty(), 0x50);
        assert_eq!(
            bus.set_block(BlockCode::QuickComm, ControlBlock::Transfer(&mut trx)),
            Err(SmbError::BusCollision)
        );
        assert!(bus
            .set_block(BlockCode::QuickComm, ControlBlock::Transfer(&mut trx))
            .is_ok());
        assert_eq!(bus.transfer_count(), 2);
    }
}
