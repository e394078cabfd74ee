//! The chip's built-in mass storage support, used to identify a disk without going through a
//! class driver.

use log::{debug, info};
use thiserror::Error;

use common::timeout::{Clock, Timeout};

use super::cmd::{Cmd, DEF_DISK_MOUNTED, DEF_DISK_READY, IC_VER_FAT32_FIXED, VAR_DISK_STATUS};
use super::status::{USB_INT_DISCONNECT, USB_INT_SUCCESS};
use super::{Ch376, Ch376Ports};

const INQUIRY_LEN: usize = 36;
const INQUIRY_IDENT_OFFSET: usize = 8;
const DISK_QUERY_LEN: usize = 9;
const SECTORS_PER_MB: u32 = 2048;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Filesystem {
    Fat12,
    Fat16,
    Fat32,
    Unknown(u8),
}

impl From<u8> for Filesystem {
    fn from(raw: u8) -> Self {
        match raw {
            1 => Self::Fat12,
            2 => Self::Fat16,
            3 => Self::Fat32,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DiskCapacity {
    pub total_size_mb: u32,
    pub free_size_mb: u32,
    pub filesystem: Filesystem,
}

#[derive(Debug, Error)]
pub enum DiskQueryError {
    #[error("no device connected")]
    NotConnected,
    #[error("no proper storage device connected (status {0:#04x})")]
    MountFailed(u8),
    #[error("disk query failed (status {0:#04x})")]
    QueryFailed(u8),
    #[error("short reply from the chip: {0} bytes")]
    ShortReply(usize),
    #[error("timed out waiting for the chip")]
    Timeout,
}

impl<P: Ch376Ports, C: Clock> Ch376<P, C> {
    fn wait_raw_status(&mut self) -> Result<u8, DiskQueryError> {
        if !self.wait_interrupt() {
            return Err(DiskQueryError::Timeout);
        }
        Ok(self.get_status())
    }

    /// TEST_CONNECT raises no interrupt; the answer shows up on the data port, which reads as 0
    /// until the chip has looked at the bus.
    fn wait_data_reply(&mut self) -> Result<u8, DiskQueryError> {
        let timeout = self
            .config
            .int_wait_timeout_ms
            .map(|millis| Timeout::from_millis(&self.clock, millis));
        loop {
            let reply = self.ports.read_data();
            if reply != 0 {
                return Ok(reply);
            }
            if let Some(ref timeout) = timeout {
                if timeout.run(&self.clock).is_err() {
                    return Err(DiskQueryError::Timeout);
                }
            }
            self.clock.sleep_ms(1);
        }
    }

    /// Checks the bus, then resets it and mounts the attached disk, returning the vendor and
    /// product identification from its INQUIRY data.
    pub fn init_disk(&mut self) -> Result<String, DiskQueryError> {
        self.ports.write_command(Cmd::TestConnect as u8);
        match self.wait_data_reply()? {
            USB_INT_DISCONNECT => return Err(DiskQueryError::NotConnected),
            reply => debug!("TEST_CONNECT returned {:#04x}", reply),
        }
        self.device_connected = true;

        if self.bus_reset().is_error() {
            return Err(DiskQueryError::NotConnected);
        }

        self.ports.write_command(Cmd::DiskMount as u8);
        match self.wait_raw_status()? {
            USB_INT_SUCCESS => (),
            other => return Err(DiskQueryError::MountFailed(other)),
        }

        let mut inquiry = [0u8; INQUIRY_LEN];
        let len = self
            .read_usb_data(&mut inquiry)
            .ok_or(DiskQueryError::ShortReply(INQUIRY_LEN + 1))?;
        if len < INQUIRY_IDENT_OFFSET {
            return Err(DiskQueryError::ShortReply(len));
        }

        let ident = String::from_utf8_lossy(&inquiry[INQUIRY_IDENT_OFFSET..len])
            .trim()
            .to_string();
        info!("mounted disk: {}", ident);
        Ok(ident)
    }

    pub fn disk_type_and_capacity(&mut self) -> Result<DiskCapacity, DiskQueryError> {
        self.ports.write_command(Cmd::GetIcVer as u8);
        let version = self.ports.read_data();
        if version < IC_VER_FAT32_FIXED {
            // Older revisions mishandle FAT32 volumes unless the disk is flagged as mounted.
            self.ports.write_command(Cmd::ReadVar8 as u8);
            self.ports.write_data(VAR_DISK_STATUS);
            if self.ports.read_data() >= DEF_DISK_READY {
                self.ports.write_command(Cmd::WriteVar8 as u8);
                self.ports.write_data(VAR_DISK_STATUS);
                self.ports.write_data(DEF_DISK_MOUNTED);
            }
        }

        self.ports.write_command(Cmd::DiskQuery as u8);
        match self.wait_raw_status()? {
            USB_INT_SUCCESS => (),
            other => return Err(DiskQueryError::QueryFailed(other)),
        }

        let mut reply = [0u8; DISK_QUERY_LEN];
        match self.read_usb_data(&mut reply) {
            Some(DISK_QUERY_LEN) => (),
            Some(len) => return Err(DiskQueryError::ShortReply(len)),
            None => return Err(DiskQueryError::ShortReply(DISK_QUERY_LEN + 1)),
        }

        let total_sectors = u32::from_le_bytes([reply[0], reply[1], reply[2], reply[3]]);
        let free_sectors = u32::from_le_bytes([reply[4], reply[5], reply[6], reply[7]]);
        Ok(DiskCapacity {
            total_size_mb: total_sectors / SECTORS_PER_MB,
            free_size_mb: free_sectors / SECTORS_PER_MB,
            filesystem: reply[8].into(),
        })
    }
}
