use plain::Plain;

use super::opcodes::Opcode;

/// Every UFI command block is padded to this size.
pub const UFI_CMD_LEN: usize = 12;

pub trait CommandBlock: Plain + Sized {
    fn as_bytes(&self) -> &[u8] {
        // Command blocks are packed structs of plain integers, without padding.
        unsafe { plain::as_bytes(self) }
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct TestUnitReady {
    pub opcode: u8,
    /// bits 7:5 logical unit, stamped by the transport
    pub a: u8,
    pub _rsvd: [u8; 10],
}
unsafe impl Plain for TestUnitReady {}
impl CommandBlock for TestUnitReady {}

impl TestUnitReady {
    pub const fn new() -> Self {
        Self {
            opcode: Opcode::TestUnitReady as u8,
            a: 0,
            _rsvd: [0; 10],
        }
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestSense {
    pub opcode: u8,
    pub a: u8,
    pub _rsvd1: u16,
    pub alloc_len: u8,
    pub _rsvd2: [u8; 7],
}
unsafe impl Plain for RequestSense {}
impl CommandBlock for RequestSense {}

impl RequestSense {
    /// Enough for the fixed part of the sense data, up to the qualifier.
    pub const MINIMAL_ALLOC_LEN: u8 = 14;

    pub const fn new(alloc_len: u8) -> Self {
        Self {
            opcode: Opcode::RequestSense as u8,
            a: 0,
            _rsvd1: 0,
            alloc_len,
            _rsvd2: [0; 7],
        }
    }
}

/// The fixed format sense data returned by [RequestSense].
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct SenseData {
    pub error_code: u8,
    pub _rsvd1: u8,
    /// bits 3:0
    pub sense_key: u8,
    pub information: u32,
    pub add_sense_len: u8,
    pub _rsvd2: u32,
    pub add_sense_code: u8,
    pub add_sense_code_qual: u8,
    pub _rsvd3: [u8; 4],
}
unsafe impl Plain for SenseData {}

/// READ(10) and WRITE(10) share the same layout.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct ReadWrite10 {
    pub opcode: u8,
    /// bit 4 DPO, bit 3 FUA
    pub a: u8,
    /// big endian
    pub lba: u32,
    pub _rsvd1: u8,
    /// big endian
    pub transfer_len: u16,
    pub _rsvd2: [u8; 3],
}
unsafe impl Plain for ReadWrite10 {}
impl CommandBlock for ReadWrite10 {}

impl ReadWrite10 {
    pub const fn read(lba: u32, transfer_len: u16) -> Self {
        Self::new(Opcode::Read10, lba, transfer_len)
    }
    pub const fn write(lba: u32, transfer_len: u16) -> Self {
        Self::new(Opcode::Write10, lba, transfer_len)
    }
    const fn new(opcode: Opcode, lba: u32, transfer_len: u16) -> Self {
        Self {
            opcode: opcode as u8,
            a: 0,
            lba: u32::to_be(lba),
            _rsvd1: 0,
            transfer_len: u16::to_be(transfer_len),
            _rsvd2: [0; 3],
        }
    }
}

#[repr(u8)]
pub enum ModePageControl {
    CurrentValues = 0,
    ChangeableValues = 1,
    DefaultValues = 2,
    SavedValues = 3,
}

/// Mode page holding the geometry and transfer rate of a flexible disk.
pub const MODE_PAGE_FLEXIBLE_DISK: u8 = 0x05;

#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct ModeSense10 {
    pub opcode: u8,
    /// bit 3 DBD
    pub a: u8,
    /// bits 7:6 page control, bits 5:0 page code
    pub b: u8,
    pub _rsvd1: [u8; 4],
    /// big endian
    pub alloc_len: u16,
    pub _rsvd2: [u8; 3],
}
unsafe impl Plain for ModeSense10 {}
impl CommandBlock for ModeSense10 {}

impl ModeSense10 {
    pub const fn new(dbd: bool, page_code: u8, pc: ModePageControl, alloc_len: u16) -> Self {
        Self {
            opcode: Opcode::ModeSense10 as u8,
            a: (dbd as u8) << 3,
            b: (page_code & 0x3F) | ((pc as u8) << 6),
            _rsvd1: [0; 4],
            alloc_len: u16::to_be(alloc_len),
            _rsvd2: [0; 3],
        }
    }
    /// Asks for the flexible disk page. Cheap enough to be used as a media change probe.
    pub const fn flexible_disk(alloc_len: u16) -> Self {
        Self::new(
            false,
            MODE_PAGE_FLEXIBLE_DISK,
            ModePageControl::CurrentValues,
            alloc_len,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn sizes() {
        assert_eq!(mem::size_of::<TestUnitReady>(), UFI_CMD_LEN);
        assert_eq!(mem::size_of::<RequestSense>(), UFI_CMD_LEN);
        assert_eq!(mem::size_of::<ReadWrite10>(), UFI_CMD_LEN);
        assert_eq!(mem::size_of::<ModeSense10>(), UFI_CMD_LEN);
        assert_eq!(mem::size_of::<SenseData>(), 18);
    }

    #[test]
    fn read_and_write_blocks() {
        assert_eq!(
            ReadWrite10::read(0x0102_0304, 0x0506).as_bytes(),
            [0x28, 0, 1, 2, 3, 4, 0, 5, 6, 0, 0, 0]
        );
        assert_eq!(
            ReadWrite10::write(19, 1).as_bytes(),
            [0x2A, 0, 0, 0, 0, 19, 0, 0, 1, 0, 0, 0]
        );
    }

    #[test]
    fn sense_and_mode_sense_blocks() {
        assert_eq!(
            RequestSense::new(RequestSense::MINIMAL_ALLOC_LEN).as_bytes(),
            [3, 0, 0, 0, 14, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            ModeSense10::flexible_disk(1).as_bytes(),
            [0x5A, 0, 5, 0, 0, 0, 0, 0, 1, 0, 0, 0]
        );
        assert_eq!(TestUnitReady::new().as_bytes(), [0; 12]);
    }

    #[test]
    fn sense_data_offsets() {
        let mut bytes = [0u8; 18];
        bytes[2] = 0x06;
        bytes[12] = 0x28;
        bytes[13] = 0x01;
        let data = plain::from_bytes::<SenseData>(&bytes).unwrap();
        assert_eq!(data.sense_key & 0x0F, 0x06);
        assert_eq!(data.add_sense_code, 0x28);
        assert_eq!(data.add_sense_code_qual, 0x01);
    }
}
