use crate::driver_interface::PacketResult;

use super::cmd::CMD_RET_SUCCESS;

pub const USB_INT_SUCCESS: u8 = 0x14;
pub const USB_INT_CONNECT: u8 = 0x15;
pub const USB_INT_DISCONNECT: u8 = 0x16;
pub const USB_INT_BUF_OVER: u8 = 0x17;
pub const USB_INT_DISK_ERR: u8 = 0x1F;

const PID_STATUS_MASK: u8 = 0x2F;
const PID_STATUS_NAK: u8 = 0x2A;
const PID_STATUS_STALL: u8 = 0x2E;
const TIMEOUT_MASK: u8 = 0x23;
const TIMEOUT: u8 = 0x20;

/// Maps an interrupt status byte, as read with GET_STATUS, to a transaction result.
///
/// `None` means the byte doesn't correspond to any transaction outcome.
pub fn classify(status: u8) -> Option<PacketResult> {
    match status {
        CMD_RET_SUCCESS | USB_INT_SUCCESS => return Some(PacketResult::Ok),
        USB_INT_DISCONNECT => return Some(PacketResult::NoDeviceConnected),
        USB_INT_BUF_OVER => return Some(PacketResult::DataError),
        _ => (),
    }

    match status & PID_STATUS_MASK {
        PID_STATUS_NAK => Some(PacketResult::Nak),
        PID_STATUS_STALL => Some(PacketResult::Stall),
        pid_status if pid_status & TIMEOUT_MASK == TIMEOUT => Some(PacketResult::Timeout),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_codes() {
        assert_eq!(classify(0x51), Some(PacketResult::Ok));
        assert_eq!(classify(0x14), Some(PacketResult::Ok));
        assert_eq!(classify(0x16), Some(PacketResult::NoDeviceConnected));
        assert_eq!(classify(0x17), Some(PacketResult::DataError));
    }

    #[test]
    fn pid_responses() {
        // Upper bits carry the toggle state and are ignored.
        assert_eq!(classify(0x2A), Some(PacketResult::Nak));
        assert_eq!(classify(0xEA), Some(PacketResult::Nak));
        assert_eq!(classify(0x2E), Some(PacketResult::Stall));
        assert_eq!(classify(0x6E), Some(PacketResult::Stall));
        assert_eq!(classify(0x20), Some(PacketResult::Timeout));
        assert_eq!(classify(0x24), Some(PacketResult::Timeout));
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert_eq!(classify(0x15), None);
        assert_eq!(classify(USB_INT_DISK_ERR), None);
        assert_eq!(classify(0x00), None);
        assert_eq!(classify(0x23), None);
    }
}
