/// UFI command opcodes.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Opcode {
    TestUnitReady = 0x00,
    RezeroUnit = 0x01,
    RequestSense = 0x03,
    FormatUnit = 0x04,
    Inquiry = 0x12,
    StartStopUnit = 0x1B,
    SendDiagnostic = 0x1D,
    PreventAllowMediumRemoval = 0x1E,
    ReadFormatCapacities = 0x23,
    ReadCapacity = 0x25,
    Read10 = 0x28,
    Write10 = 0x2A,
    Seek10 = 0x2B,
    WriteAndVerify = 0x2E,
    Verify = 0x2F,
    ModeSelect = 0x55,
    ModeSense10 = 0x5A,
    Read12 = 0xA8,
    Write12 = 0xAA,
}
