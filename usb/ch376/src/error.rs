use std::fmt;

use thiserror::Error;

use crate::driver_interface::PacketResult;

/// Enumeration step that a failed transfer belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EnumerationStage {
    DeviceDescriptor8Byte,
    SetAddress,
    DeviceDescriptor,
    ConfigDescriptor,
    SetConfiguration,
}

impl EnumerationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeviceDescriptor8Byte => "getting the device descriptor (8 bytes)",
            Self::SetAddress => "setting the device address",
            Self::DeviceDescriptor => "getting the device descriptor",
            Self::ConfigDescriptor => "getting the configuration descriptor",
            Self::SetConfiguration => "setting the device configuration",
        }
    }
}

impl fmt::Display for EnumerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures that cannot be expressed as a [PacketResult].
///
/// Expected outcomes of a transaction (NAK, STALL, timeouts and so on) are always reported as
/// values. This type covers broken invariants and invalid requests.
#[derive(Debug, Error)]
pub enum UsbError {
    /// The chip returned an interrupt status that does not map to any known result.
    #[error("unexpected value from GET_STATUS: {0:#04x}")]
    UnexpectedStatus(u8),

    #[error("enumeration failed when {stage}: {result:?}")]
    EnumerationFailed {
        stage: EnumerationStage,
        result: PacketResult,
    },

    #[error("no valid device descriptor received after {0} polls")]
    NoDeviceDescriptor(u32),

    #[error("malformed descriptor: {0}")]
    MalformedDescriptor(&'static str),

    #[error("bus reset failed")]
    BusResetFailed,

    #[error("invalid endpoint {address:#04x}: {reason}")]
    InvalidEndpoint { address: u8, reason: &'static str },

    #[error("data buffer too small: {needed} bytes needed, {available} available")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("data buffer direction does not match the setup packet")]
    DirectionMismatch,
}

pub type Result<T, E = UsbError> = std::result::Result<T, E>;
