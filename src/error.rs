//! SMB2 error taxonomy and error-string formatting.
//!
//! Every fallible operation in this crate returns [`SmbResult`]. The SMB2
//! error codes live in the device-specific range of the driver error space,
//! starting at `ERR_DEV + 0x80`. Errors that do not belong to that range are
//! carried through unchanged as [`SmbError::Driver`] (numeric driver codes) or
//! [`SmbError::Os`] (signal primitive failures).

use alloc::format;
use alloc::string::String;
use core::fmt;

use axerrno::AxError;

/// Base of the device-specific driver error range.
pub const ERR_DEV: i32 = 0xE00;
/// End (exclusive) of the device-specific driver error range.
pub const ERR_END: i32 = 0xF00;
/// First SMB2 error code.
pub const SMB_ERR_BASE: i32 = ERR_DEV + 0x80;

/// SMB2 library result type.
pub type SmbResult<T = ()> = Result<T, SmbError>;

/// Closed set of SMB2 errors plus pass-through errors from collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmbError {
    /// Initial data missing or wrong.
    NoDescriptor,
    /// Could not allocate resources.
    OutOfMemory,
    /// Address not present or wrong.
    AddressError,
    /// Bus is busy.
    BusBusy,
    /// Bus collision.
    BusCollision,
    /// No device found.
    NoDevice,
    /// Wrong parameters passed.
    ParamError,
    /// PEC error detected.
    PecError,
    /// Function or access size not supported.
    NotSupported,
    /// General error (timeout, ...).
    GeneralError,
    /// Alert callback installation failed.
    AlertInstallFailed,
    /// No free signal slot for an alert.
    NoFreeSlot,
    /// Address is excluded by the device descriptor.
    AddressExcluded,
    /// Bus did not get idle after STOP.
    BusNotIdle,
    /// Controller is busy.
    ControllerBusy,
    /// Numeric driver error outside the SMB2 range.
    Driver(i32),
    /// Failure of an OS signal primitive.
    Os(AxError),
}

/// SMB2 errors in code order; index `n` has code `SMB_ERR_BASE + n`.
const SMB_ERRORS: [SmbError; 15] = [
    SmbError::NoDescriptor,
    SmbError::OutOfMemory,
    SmbError::AddressError,
    SmbError::BusBusy,
    SmbError::BusCollision,
    SmbError::NoDevice,
    SmbError::ParamError,
    SmbError::PecError,
    SmbError::NotSupported,
    SmbError::GeneralError,
    SmbError::AlertInstallFailed,
    SmbError::NoFreeSlot,
    SmbError::AddressExcluded,
    SmbError::BusNotIdle,
    SmbError::ControllerBusy,
];

impl SmbError {
    /// Maps a numeric driver code to an error.
    ///
    /// Codes of the SMB2 range become their named variant, everything else is
    /// kept as [`SmbError::Driver`].
    pub fn from_code(code: i32) -> Self {
        let index = code.wrapping_sub(SMB_ERR_BASE);
        if (0..SMB_ERRORS.len() as i32).contains(&index) {
            SMB_ERRORS[index as usize]
        } else {
            SmbError::Driver(code)
        }
    }

    /// Returns the numeric code of this error.
    pub fn code(&self) -> i32 {
        match self {
            SmbError::Driver(code) => *code,
            SmbError::Os(err) => err.code(),
            smb => {
                let index = SMB_ERRORS
                    .iter()
                    .position(|e| e == smb)
                    .unwrap_or_default();
                SMB_ERR_BASE + index as i32
            }
        }
    }

    /// Returns the description of an SMB2 error, `None` for pass-through errors.
    pub fn description(&self) -> Option<&'static str> {
        let desc = match self {
            SmbError::NoDescriptor => "Initial data missing/wrong",
            SmbError::OutOfMemory => "Could not allocate ressources",
            SmbError::AddressError => "Address not present or wrong",
            SmbError::BusBusy => "Bus is busy",
            SmbError::BusCollision => "Bus collision",
            SmbError::NoDevice => "No device found",
            SmbError::ParamError => "Wrong parameters passed",
            SmbError::PecError => "PEC error detected",
            SmbError::NotSupported => "Function/Access size not supported",
            SmbError::GeneralError => "General Error (timeout, ...)",
            SmbError::AlertInstallFailed => "Alert callback installation failed",
            SmbError::NoFreeSlot => "No free signal for alert",
            SmbError::AddressExcluded => "Address is excluded",
            SmbError::BusNotIdle => "Bus did not get idle after STOP",
            SmbError::ControllerBusy => "Controller is busy",
            SmbError::Driver(_) | SmbError::Os(_) => return None,
        };
        Some(desc)
    }
}

impl fmt::Display for SmbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmbError::Driver(code) => write!(f, "driver error {:#06x}", code),
            SmbError::Os(err) => write!(f, "OS error: {:?}", err),
            smb => f.write_str(smb.description().unwrap_or("Unknown SMB2 error")),
        }
    }
}

impl From<AxError> for SmbError {
    fn from(err: AxError) -> Self {
        SmbError::Os(err)
    }
}

impl From<SmbError> for AxError {
    fn from(err: SmbError) -> Self {
        match err {
            SmbError::Os(err) => err,
            SmbError::OutOfMemory | SmbError::NoFreeSlot => AxError::NoMemory,
            SmbError::ParamError | SmbError::NoDescriptor => AxError::InvalidInput,
            SmbError::AddressError => AxError::BadAddress,
            SmbError::AddressExcluded => AxError::PermissionDenied,
            SmbError::NoDevice => AxError::NotFound,
            SmbError::NotSupported => AxError::Unsupported,
            SmbError::BusBusy | SmbError::ControllerBusy | SmbError::BusNotIdle => {
                AxError::ResourceBusy
            }
            SmbError::AlertInstallFailed => AxError::BadState,
            SmbError::BusCollision
            | SmbError::PecError
            | SmbError::GeneralError
            | SmbError::Driver(_) => AxError::Io,
        }
    }
}

/// Returns `true` if `code` lies in the SMB2 part of the driver error range.
pub fn is_smb_code(code: i32) -> bool {
    (SMB_ERR_BASE..ERR_END).contains(&code)
}

/// Builds an error message for `code`.
///
/// SMB2 codes are formatted as `ERROR (SMB2) 0x0e86: Wrong parameters passed`.
/// Any other code is handed to `fallback`, which stands in for the OS or
/// driver framework formatter.
pub fn errstring_with<F>(code: i32, fallback: F) -> String
where
    F: FnOnce(i32) -> String,
{
    if !is_smb_code(code) {
        return fallback(code);
    }

    match SmbError::from_code(code).description() {
        Some(desc) => format!("ERROR (SMB2) 0x{:04x}: {}", code, desc),
        None => format!("ERROR (SMB2) 0x{:04x}: Unknown SMB2 error", code),
    }
}

/// Builds an error message for `code` with the generic fallback formatter.
pub fn errstring(code: i32) -> String {
    errstring_with(code, |code| format!("ERROR (OS) 0x{:04x}: unknown error", code))
}
