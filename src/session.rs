//! SMB2 session handle.
//!
//! A session wraps one open driver path. It offers the SMBus transfer
//! operations, each of which fills a control record and issues a single
//! blocking driver request, and the alert callback API, which goes through the
//! process-wide [`AlertManager`] using the session's own signal pool.

use alloc::sync::Arc;

use arrayvec::ArrayVec;
use spin::Mutex;

use crate::alert::{AlertCallback, AlertManager};
use crate::config::SessionConfig;
use crate::driver::{DeviceOpener, SmbDriver};
use crate::error::{SmbError, SmbResult};
use crate::signal::{SignalCode, SignalSlotPool};
use crate::transfer::{
    BLOCK_MAX_BYTES, BlockCode, ControlBlock, I2cMessage, ReadWrite, SmbFlags, Transfer,
    TransferBlock,
};

/// Identifier of a session within its alert manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub usize);

/// Payload of a block read.
pub type BlockData = ArrayVec<u8, BLOCK_MAX_BYTES>;

/// An open SMB2 device.
///
/// Dropping a session without [`close`](Self::close) leaves its alert
/// bindings installed.
pub struct SmbSession<D: SmbDriver> {
    driver: D,
    id: SessionId,
    signals: Arc<Mutex<SignalSlotPool>>,
    alerts: Arc<AlertManager>,
}

impl<D: SmbDriver> SmbSession<D> {
    /// Opens `device` and creates a session on it.
    pub fn open<O>(
        opener: &O,
        device: &str,
        alerts: Arc<AlertManager>,
        config: &SessionConfig,
    ) -> SmbResult<Self>
    where
        O: DeviceOpener<Driver = D>,
    {
        let driver = opener.open(device)?;
        let session = Self::with_driver(driver, alerts, config);
        debug!("Opened SMB2 device {} as {:?}", device, session.id);
        Ok(session)
    }

    /// Creates a session on an already open driver path.
    pub fn with_driver(driver: D, alerts: Arc<AlertManager>, config: &SessionConfig) -> Self {
        Self {
            driver,
            id: alerts.next_session_id(),
            signals: Arc::new(Mutex::new(SignalSlotPool::new(config))),
            alerts,
        }
    }

    /// Removes all alerts of this session and closes the driver path.
    ///
    /// The path is closed even if removing an alert failed; the first error is
    /// returned.
    pub fn close(self) -> SmbResult {
        let drained = self.alerts.release_session(&self.driver, self.id);
        let closed = self.driver.close();
        debug!("Closed SMB2 session {:?}", self.id);
        drained.and(closed)
    }

    /// The session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The underlying driver path.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The alert manager this session installs into.
    pub fn alert_manager(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    /// Snapshot of the session's signal pool.
    pub fn signal_pool(&self) -> SignalSlotPool {
        self.signals.lock().clone()
    }

    /// Number of pool signals held by alert bindings.
    pub fn used_signals(&self) -> usize {
        self.signals.lock().used_count()
    }

    fn set(&self, code: BlockCode, block: ControlBlock<'_>) -> SmbResult {
        trace!("SMB2 set {:?} addr {:#04x}", code, block.addr());
        self.driver.set_block(code, block)
    }

    fn get(&self, code: BlockCode, block: ControlBlock<'_>) -> SmbResult {
        trace!("SMB2 get {:?} addr {:#04x}", code, block.addr());
        self.driver.get_block(code, block)
    }

    /// Quick command; the r/w bit is the command issued to the device.
    pub fn quick_comm(&self, flags: SmbFlags, addr: u16, read_write: ReadWrite) -> SmbResult {
        let mut trx = Transfer::new(flags, addr);
        trx.read_write = read_write as u8;
        self.set(BlockCode::QuickComm, ControlBlock::Transfer(&mut trx))
    }

    /// Writes one data byte.
    pub fn write_byte(&self, flags: SmbFlags, addr: u16, data: u8) -> SmbResult {
        let mut trx = Transfer::new(flags, addr);
        trx.set_byte(data);
        self.set(BlockCode::WriteByte, ControlBlock::Transfer(&mut trx))
    }

    /// Reads one data byte.
    pub fn read_byte(&self, flags: SmbFlags, addr: u16) -> SmbResult<u8> {
        let mut trx = Transfer::new(flags, addr);
        self.get(BlockCode::ReadByte, ControlBlock::Transfer(&mut trx))?;
        Ok(trx.byte())
    }

    /// Writes command `cmd` and one data byte.
    pub fn write_byte_data(&self, flags: SmbFlags, addr: u16, cmd: u8, data: u8) -> SmbResult {
        let mut trx = Transfer::new(flags, addr).with_cmd(cmd);
        trx.set_byte(data);
        self.set(BlockCode::WriteByteData, ControlBlock::Transfer(&mut trx))
    }

    /// Writes command `cmd` and reads one data byte.
    pub fn read_byte_data(&self, flags: SmbFlags, addr: u16, cmd: u8) -> SmbResult<u8> {
        let mut trx = Transfer::new(flags, addr).with_cmd(cmd);
        self.get(BlockCode::ReadByteData, ControlBlock::Transfer(&mut trx))?;
        Ok(trx.byte())
    }

    /// Writes command `cmd` and one data word.
    pub fn write_word_data(&self, flags: SmbFlags, addr: u16, cmd: u8, data: u16) -> SmbResult {
        let mut trx = Transfer::new(flags, addr).with_cmd(cmd);
        trx.set_word(data);
        self.set(BlockCode::WriteWordData, ControlBlock::Transfer(&mut trx))
    }

    /// Writes command `cmd` and reads one data word.
    pub fn read_word_data(&self, flags: SmbFlags, addr: u16, cmd: u8) -> SmbResult<u16> {
        let mut trx = Transfer::new(flags, addr).with_cmd(cmd);
        self.get(BlockCode::ReadWordData, ControlBlock::Transfer(&mut trx))?;
        Ok(trx.word())
    }

    /// Writes command `cmd` and a block of 1..=32 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SmbError::ParamError`] for an empty or oversized block,
    /// without contacting the driver.
    pub fn write_block_data(&self, flags: SmbFlags, addr: u16, cmd: u8, data: &[u8]) -> SmbResult {
        check_block_len(data.len())?;
        let mut blk = TransferBlock::new(flags, addr, cmd);
        blk.load(data);
        self.set(BlockCode::WriteBlockData, ControlBlock::Block(&mut blk))
    }

    /// Writes command `cmd` and reads a data block.
    pub fn read_block_data(&self, flags: SmbFlags, addr: u16, cmd: u8) -> SmbResult<BlockData> {
        let mut blk = TransferBlock::new(flags, addr, cmd);
        self.get(BlockCode::ReadBlockData, ControlBlock::Block(&mut blk))?;
        block_reply(&blk.data, 0, blk.length as usize)
    }

    /// Writes command `cmd` and a data word, then reads a data word.
    pub fn process_call(&self, flags: SmbFlags, addr: u16, cmd: u8, data: u16) -> SmbResult<u16> {
        let mut trx = Transfer::new(flags, addr).with_cmd(cmd);
        trx.set_word(data);
        self.get(BlockCode::ProcessCall, ControlBlock::Transfer(&mut trx))?;
        Ok(trx.word())
    }

    /// Writes command `cmd` and a data block, then reads a data block.
    ///
    /// Written and read bytes together must not exceed 32.
    pub fn block_process_call(
        &self,
        flags: SmbFlags,
        addr: u16,
        cmd: u8,
        write: &[u8],
    ) -> SmbResult<BlockData> {
        check_block_len(write.len())?;
        let mut blk = TransferBlock::new(flags, addr, cmd);
        blk.load(write);
        self.get(BlockCode::BlockProcessCall, ControlBlock::Block(&mut blk))?;
        block_reply(&blk.data, write.len(), blk.read_len as usize)
    }

    /// Issues a read byte command to the alert response address.
    ///
    /// Returns the number of alerts received. With `addr` set to a device
    /// address only alerts of that device are counted; 0 counts any device.
    pub fn alert_response(&self, flags: SmbFlags, addr: u16) -> SmbResult<u16> {
        let mut trx = Transfer::new(flags, addr);
        self.get(BlockCode::AlertResponse, ControlBlock::Transfer(&mut trx))?;
        Ok(trx.word())
    }

    /// Generic SMBus protocol transfer; not available through this driver.
    pub fn smb_xfer(
        &self,
        _flags: SmbFlags,
        addr: u16,
        read_write: ReadWrite,
        _cmd: u8,
        _data: &mut [u8],
    ) -> SmbResult {
        trace!("SMB2 smb_xfer {:?} addr {:#04x} not supported", read_write, addr);
        Err(SmbError::NotSupported)
    }

    /// Transfers I2C messages in order, stopping at the first failure.
    pub fn i2c_xfer(&self, msgs: &mut [I2cMessage]) -> SmbResult {
        for msg in msgs.iter_mut() {
            self.get(BlockCode::I2cXfer, ControlBlock::I2c(msg))?;
        }
        Ok(())
    }

    /// Installs `callback` for alerts of `addr` on a signal from the session pool.
    ///
    /// Returns the signal assigned to the binding.
    ///
    /// # Errors
    ///
    /// Returns [`SmbError::NoFreeSlot`] if every pool signal is in use here
    /// or bound by another session; use
    /// [`alert_cb_install_sig`](Self::alert_cb_install_sig) with a
    /// caller-chosen code in that case. Other errors as for
    /// [`AlertManager::install`].
    pub fn alert_cb_install<F>(&self, addr: u16, callback: F) -> SmbResult<SignalCode>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.alerts
            .install_pooled(
                &self.driver,
                self.id,
                addr,
                Arc::new(callback),
                Arc::clone(&self.signals),
            )
            .inspect_err(|err| {
                if *err == SmbError::NoFreeSlot {
                    debug!("No free signal for alert of address {:#04x}", addr);
                }
            })
    }

    /// Installs `callback` for alerts of `addr` on the caller-chosen `code`.
    ///
    /// A code from the session pool is taken from the pool for the lifetime of
    /// the binding; any other code is used as is.
    pub fn alert_cb_install_sig<F>(&self, addr: u16, callback: F, code: SignalCode) -> SmbResult
    where
        F: Fn() + Send + Sync + 'static,
    {
        let pooled = {
            let mut pool = self.signals.lock();
            if pool.contains(code) && !pool.claim(code) {
                warn!("{} of the session pool is already in use", code);
                return Err(SmbError::AlertInstallFailed);
            }
            pool.contains(code)
        };

        let installed = self.alerts.install(
            &self.driver,
            self.id,
            addr,
            code,
            Arc::new(callback),
            pooled.then(|| Arc::clone(&self.signals)),
        );
        if installed.is_err() && pooled {
            self.signals.lock().release(code);
        }
        installed
    }

    /// Removes the alert callback of `addr` and returns it.
    pub fn alert_cb_remove(&self, addr: u16) -> SmbResult<AlertCallback> {
        self.alerts.remove(&self.driver, addr)
    }
}

fn check_block_len(len: usize) -> SmbResult {
    if (1..=BLOCK_MAX_BYTES).contains(&len) {
        Ok(())
    } else {
        Err(SmbError::ParamError)
    }
}

/// Copies `len` reply bytes starting at `offset` out of a block record.
fn block_reply(data: &[u8; BLOCK_MAX_BYTES], offset: usize, len: usize) -> SmbResult<BlockData> {
    let end = offset
        .checked_add(len)
        .filter(|&end| end <= BLOCK_MAX_BYTES)
        .ok_or(SmbError::GeneralError)?;

    let mut reply = BlockData::new();
    reply
        .try_extend_from_slice(&data[offset..end])
        .map_err(|_| SmbError::GeneralError)?;
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimBus, SimSignalHost};
    use core::sync::atomic::{AtomicU32, Ordering};

    fn session(bus: &SimBus, signals: usize) -> SmbSession<SimBus> {
        let manager = AlertManager::new(Arc::new(SimSignalHost::new()));
        SmbSession::open(
            bus,
            "smb2_1",
            manager,
            &SessionConfig::new(SignalCode(1), signals),
        )
        .unwrap()
    }

    #[test]
    fn test_session_byte_and_word_access() {
        let bus = SimBus::new("smb2_1").with_device(0x50);
        let session = session(&bus, 2);
        let flags = SmbFlags::empty();

        session.write_byte(flags, 0x50, 0xA5).unwrap();
        assert_eq!(session.read_byte(flags, 0x50).unwrap(), 0xA5);

        session.write_byte_data(flags, 0x50, 0x10, 0x42).unwrap();
        assert_eq!(session.read_byte_data(flags, 0x50, 0x10).unwrap(), 0x42);

        session.write_word_data(flags, 0x50, 0x20, 0xBEEF).unwrap();
        assert_eq!(session.read_word_data(flags, 0x50, 0x20).unwrap(), 0xBEEF);

        session.quick_comm(flags, 0x50, ReadWrite::Write).unwrap();
        assert_eq!(
            session.quick_comm(flags, 0x33, ReadWrite::Read),
            Err(SmbError::NoDevice)
        );
    }

    #[test]
    fn test_session_block_length_checked_before_driver() {
        let bus = SimBus::new("smb2_1").with_device(0x50);
        let session = session(&bus, 2);
        let before = bus.transfer_count();

        assert_eq!(
            session.write_block_data(SmbFlags::empty(), 0x50, 0, &[]),
            Err(SmbError::ParamError)
        );
        assert_eq!(
            session.write_block_data(SmbFlags::empty(), 0x50, 0, &[0; 33]),
            Err(SmbError::ParamError)
        );
        assert_eq!(
            session.block_process_call(SmbFlags::empty(), 0x50, 0, &[]),
            Err(SmbError::ParamError)
        );
        assert_eq!(bus.transfer_count(), before);
    }

    #[test]
    fn test_session_process_calls() {
        let bus = SimBus::new("smb2_1").with_device(0x50);
        let session = session(&bus, 2);
        let flags = SmbFlags::empty();

        session.write_word_data(flags, 0x50, 3, 0x1111).unwrap();
        assert_eq!(session.process_call(flags, 0x50, 3, 0x2222).unwrap(), 0x1111);
        assert_eq!(session.read_word_data(flags, 0x50, 3).unwrap(), 0x2222);

        session.write_block_data(flags, 0x50, 4, &[9, 8, 7]).unwrap();
        let reply = session.block_process_call(flags, 0x50, 4, &[1, 2]).unwrap();
        assert_eq!(reply.as_slice(), &[9, 8, 7]);
        assert_eq!(
            session.read_block_data(flags, 0x50, 4).unwrap().as_slice(),
            &[1, 2]
        );
    }

    #[test]
    fn test_session_smb_xfer_not_supported() {
        let bus = SimBus::new("smb2_1").with_device(0x50);
        let session = session(&bus, 2);
        let mut data = [0u8; 2];
        assert_eq!(
            session.smb_xfer(SmbFlags::empty(), 0x50, ReadWrite::Read, 0, &mut data),
            Err(SmbError::NotSupported)
        );
    }

    #[test]
    fn test_session_i2c_xfer() {
        let bus = SimBus::new("smb2_1").with_device(0x50);
        let session = session(&bus, 2);

        let mut msgs = [I2cMessage::write(0x50, &[1, 2, 3]), I2cMessage::read(0x50, 3)];
        session.i2c_xfer(&mut msgs).unwrap();
        assert_eq!(msgs[1].buf, alloc::vec![1, 2, 3]);

        let mut msgs = [I2cMessage::read(0x60, 1), I2cMessage::write(0x50, &[5])];
        assert_eq!(session.i2c_xfer(&mut msgs), Err(SmbError::NoDevice));
    }

    #[test]
    fn test_session_install_failure_returns_slot() {
        let bus = SimBus::new("smb2_1").with_device(0x50);
        let session = session(&bus, 2);

        bus.fail_next(BlockCode::AlertCbInstall, SmbError::BusBusy);
        assert_eq!(
            session.alert_cb_install(0x50, || {}),
            Err(SmbError::AlertInstallFailed)
        );
        assert_eq!(session.used_signals(), 0);
    }

    #[test]
    fn test_session_install_sig_with_pool_code() {
        let bus = SimBus::new("smb2_1").with_device(0x50).with_device(0x51);
        let session = session(&bus, 2);

        session.alert_cb_install_sig(0x50, || {}, SignalCode(2)).unwrap();
        assert_eq!(session.used_signals(), 1);
        assert_eq!(session.alert_cb_install(0x51, || {}).unwrap(), SignalCode(1));
        assert_eq!(session.used_signals(), 2);

        session.alert_cb_remove(0x50).unwrap();
        assert_eq!(session.used_signals(), 1);
        assert!(!session.signal_pool().is_used(SignalCode(2)));
    }

    #[test]
    fn test_session_default_pools_share_codes() {
        let bus = SimBus::new("smb2_1").with_device(0x50).with_device(0x51);
        let manager = AlertManager::new(Arc::new(SimSignalHost::new()));
        let config = SessionConfig::host_default();
        let first = SmbSession::with_driver(bus.clone(), manager.clone(), &config);
        let second = SmbSession::with_driver(bus.clone(), manager.clone(), &config);

        let a = first.alert_cb_install(0x50, || {}).unwrap();
        let b = second.alert_cb_install(0x51, || {}).unwrap();
        assert_ne!(a, b);
        assert_eq!(manager.code_for(0x51), Some(b));
        assert_eq!(second.used_signals(), 1);
    }

    #[test]
    fn test_session_remove_returns_callback() {
        let bus = SimBus::new("smb2_1").with_device(0x50);
        let session = session(&bus, 2);
        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = hits.clone();

        session
            .alert_cb_install(0x50, move || {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let callback = session.alert_cb_remove(0x50).unwrap();
        callback();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_session_close_drains_alerts() {
        let bus = SimBus::new("smb2_1").with_device(0x50);
        let session = session(&bus, 2);
        let manager = Arc::clone(session.alert_manager());

        session.alert_cb_install(0x50, || {}).unwrap();
        session.close().unwrap();

        assert_eq!(manager.binding_count(), 0);
        assert!(!manager.is_armed());
        assert!(bus.is_closed());
    }
}
