use bitflags::bitflags;

/// CH376 command codes, written to the command port.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Cmd {
    GetIcVer = 0x01,
    ResetAll = 0x05,
    ReadVar8 = 0x0A,
    WriteVar8 = 0x0B,
    SetUsbAddr = 0x13,
    SetUsbMode = 0x15,
    TestConnect = 0x16,
    GetStatus = 0x22,
    RdUsbData0 = 0x27,
    WrHostData = 0x2C,
    DiskMount = 0x31,
    DiskQuery = 0x3F,
    ClrStall = 0x41,
    GetDescr = 0x46,
    IssueTknX = 0x4E,
}

/// Operating modes accepted by [Cmd::SetUsbMode].
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UsbMode {
    /// Host mode, no SOF generated. Used while no device is attached.
    HostWithoutSof = 5,
    HostWithSof = 6,
    /// Host mode with the bus held in reset.
    HostBusReset = 7,
}

/// Token PIDs for [Cmd::IssueTknX].
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Pid {
    Out = 0x01,
    In = 0x09,
    Setup = 0x0D,
}

bitflags! {
    /// First argument of [Cmd::IssueTknX].
    pub struct TokenFlags: u8 {
        const IN_TOGGLE = 0x80;
        const OUT_TOGGLE = 0x40;
    }
}

/// Second argument of [Cmd::IssueTknX]: endpoint number in the high nibble, PID in the low one.
pub const fn token_target(endpoint_number: u8, pid: Pid) -> u8 {
    ((endpoint_number & 0x0F) << 4) | pid as u8
}

/// Returned through the data port after commands such as [Cmd::SetUsbMode].
pub const CMD_RET_SUCCESS: u8 = 0x51;
pub const CMD_RET_ABORT: u8 = 0x5F;

/// Size of the chip's USB data buffer.
pub const BUFFER_LEN: usize = 64;

/// Number of data port polls after [Cmd::SetUsbMode] before giving up.
pub const SET_USB_MODE_POLLS: u32 = 50;

/// Chip variable holding the disk status, see [Cmd::ReadVar8].
pub const VAR_DISK_STATUS: u8 = 0x28;
pub const DEF_DISK_READY: u8 = 0x10;
pub const DEF_DISK_MOUNTED: u8 = 0x03;

/// First chip revision whose FAT32 handling doesn't need the disk status fixup.
pub const IC_VER_FAT32_FIXED: u8 = 0x43;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_layout() {
        assert_eq!(token_target(0, Pid::Setup), 0x0D);
        assert_eq!(token_target(2, Pid::In), 0x29);
        assert_eq!(token_target(0x81, Pid::In), 0x19);
        assert_eq!(
            (TokenFlags::IN_TOGGLE | TokenFlags::OUT_TOGGLE).bits(),
            0xC0
        );
    }
}
