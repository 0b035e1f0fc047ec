//! Boundary to the SMB2 device driver.

use crate::error::SmbResult;
use crate::transfer::{BlockCode, ControlBlock};

/// An open path to the SMB2 driver.
///
/// Both calls block until the driver has processed the record. `set_block`
/// hands a record to the driver, `get_block` additionally lets the driver
/// write results back into it.
pub trait SmbDriver: Send + Sync {
    /// Issues a write-style block request.
    fn set_block(&self, code: BlockCode, block: ControlBlock<'_>) -> SmbResult;

    /// Issues a read-style block request.
    fn get_block(&self, code: BlockCode, block: ControlBlock<'_>) -> SmbResult;

    /// Closes the path.
    fn close(&self) -> SmbResult {
        Ok(())
    }
}

/// Opens driver paths by device name.
pub trait DeviceOpener {
    /// The path type produced by this opener.
    type Driver: SmbDriver;

    /// Opens `device`.
    fn open(&self, device: &str) -> SmbResult<Self::Driver>;
}
