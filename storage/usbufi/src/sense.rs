//! Additional sense codes reported by UFI devices, and what they mean to the disk layer.

use std::fmt;

use thiserror::Error;

pub const ASC_NO_SENSE: u8 = 0x00;
pub const ASC_NO_SEEK_COMPLETE: u8 = 0x02;
pub const ASC_WRITE_FAULT: u8 = 0x03;
pub const ASC_NOT_READY: u8 = 0x04;
pub const ASC_CRC_ERROR: u8 = 0x10;
pub const ASC_WRITE_PROTECTED: u8 = 0x27;
/// Not ready to ready transition: the medium may have been changed.
pub const ASC_MEDIA_CHANGED: u8 = 0x28;
pub const ASC_MEDIUM_NOT_PRESENT: u8 = 0x3A;

/// The range of codes reserved for unit attention conditions.
pub const ASC_UNIT_ATTENTION: std::ops::RangeInclusive<u8> = 0x28..=0x2F;

pub const ASCQ_BECOMING_READY: u8 = 0x01;
pub const ASCQ_BUSY: u8 = 0xFF;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct SenseCode {
    pub asc: u8,
    pub ascq: u8,
}

impl SenseCode {
    pub const fn new(asc: u8, ascq: u8) -> Self {
        Self { asc, ascq }
    }

    pub fn is_ok(&self) -> bool {
        self.asc == ASC_NO_SENSE
    }

    /// Whether reissuing the command can be expected to give a different outcome: unit
    /// attention, or a drive that is still becoming ready.
    pub fn is_transient(&self) -> bool {
        ASC_UNIT_ATTENTION.contains(&self.asc)
            || (self.asc == ASC_NOT_READY
                && (self.ascq == ASCQ_BECOMING_READY || self.ascq == ASCQ_BUSY))
    }

    pub fn is_media_changed(&self) -> bool {
        self.asc == ASC_MEDIA_CHANGED
    }
}

impl fmt::Display for SenseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ASC {:#04x}, ASCQ {:#04x}", self.asc, self.ascq)
    }
}

/// Disk errors in terms of the legacy disk-I/O BIOS error codes.
#[derive(Clone, Copy, Debug, Eq, Error, Hash, PartialEq)]
pub enum DiskError {
    /// Reported as a success with a protection flag by most consumers.
    #[error("disk is write protected")]
    WriteProtected,
    #[error("drive not ready")]
    NotReady,
    #[error("CRC error")]
    Crc,
    #[error("seek error")]
    Seek,
    #[error("write fault")]
    WriteFault,
    #[error("other error")]
    Other,
}

impl DiskError {
    pub fn code(self) -> u8 {
        match self {
            Self::WriteProtected => 255,
            Self::NotReady => 2,
            Self::Crc => 4,
            Self::Seek => 6,
            Self::WriteFault => 10,
            Self::Other => 12,
        }
    }

    pub fn from_asc(asc: u8) -> Self {
        match asc {
            ASC_WRITE_PROTECTED => Self::WriteProtected,
            ASC_MEDIUM_NOT_PRESENT => Self::NotReady,
            ASC_CRC_ERROR => Self::Crc,
            ASC_NO_SEEK_COMPLETE => Self::Seek,
            ASC_WRITE_FAULT => Self::WriteFault,
            _ => Self::Other,
        }
    }

    /// A missing sense code means that the device couldn't even be asked what went wrong.
    pub fn from_sense(sense: Option<SenseCode>) -> Self {
        sense.map_or(Self::Other, |sense| Self::from_asc(sense.asc))
    }
}
