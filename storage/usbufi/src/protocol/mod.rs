use ch376::{DeviceReqData, PacketResult, UsbError};
use thiserror::Error;

use crate::sense::SenseCode;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Too large command block ({0} > 12)")]
    TooLargeCommandBlock(usize),

    #[error("usb host error: {0}")]
    Usb(#[from] UsbError),

    #[error("no device connected at address {0}")]
    NotConnected(u8),

    #[error("the device has no CBI mass storage interface")]
    NoCbiInterface,

    #[error("the CBI interface has no {0} endpoint")]
    MissingEndpoint(&'static str),
}

/// Outcome of one command.
///
/// `result` only describes the transport. A command that the device rejected still gives
/// [PacketResult::Ok], with the reason in `sense`. `sense` is `None` when the exchange broke down
/// before the device could be asked.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CbiCommandResult {
    pub result: PacketResult,
    pub bytes_transferred: usize,
    pub sense: Option<SenseCode>,
}

impl CbiCommandResult {
    pub fn failed(result: PacketResult, bytes_transferred: usize) -> Self {
        Self {
            result,
            bytes_transferred,
            sense: None,
        }
    }
    pub fn is_error(&self) -> bool {
        self.result.is_error()
    }
    /// The transport succeeded and the device reported no error.
    pub fn is_success(&self) -> bool {
        !self.is_error() && self.sense.map_or(false, |sense| sense.is_ok())
    }
}

pub trait Protocol {
    /// Runs one command, with its data phase in the direction of `data`.
    fn send_command(
        &mut self,
        command: &[u8],
        data: DeviceReqData<'_>,
    ) -> Result<CbiCommandResult, ProtocolError>;
}

impl<P: Protocol + ?Sized> Protocol for &mut P {
    fn send_command(
        &mut self,
        command: &[u8],
        data: DeviceReqData<'_>,
    ) -> Result<CbiCommandResult, ProtocolError> {
        (**self).send_command(command, data)
    }
}

/// Control/Bulk/Interrupt transport
pub mod cbi;
