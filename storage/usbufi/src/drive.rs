//! Sector I/O and geometry for a single UFI floppy drive, in terms of the legacy disk BIOS.

use ch376::DeviceReqData;
use log::{debug, error, info, warn};

use crate::config::UfiConfig;
use crate::dpb::{Dpb, SECTOR_SIZE};
use crate::protocol::Protocol;
use crate::sense::DiskError;
use crate::ufi::cmds::{CommandBlock, ModeSense10, ReadWrite10, TestUnitReady};
use crate::ufi::{send_command_with_retry, RetryOutcome};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DiskParameters {
    /// Only present when a change check was requested.
    pub changed: Option<bool>,
    pub dpb: Dpb,
}

pub struct UfiDrive<P> {
    protocol: P,
    retry_limit: Option<u32>,
    dpb: Option<Dpb>,
}

impl<P: Protocol> UfiDrive<P> {
    pub fn new(protocol: P, config: &UfiConfig) -> Self {
        Self {
            protocol,
            retry_limit: config.command_retry_limit,
            dpb: None,
        }
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }
    pub fn protocol_mut(&mut self) -> &mut P {
        &mut self.protocol
    }
    pub fn into_protocol(self) -> P {
        self.protocol
    }

    pub fn cached_dpb(&self) -> Option<&Dpb> {
        self.dpb.as_ref()
    }

    fn run(
        &mut self,
        command: &[u8],
        data: DeviceReqData<'_>,
        retry_on_media_changed: bool,
    ) -> Result<RetryOutcome, DiskError> {
        send_command_with_retry(
            &mut self.protocol,
            command,
            data,
            retry_on_media_changed,
            self.retry_limit,
        )
        .map_err(|err| {
            let opcode = command.first().copied().unwrap_or(0);
            error!("command {:#04x} failed: {}", opcode, err);
            DiskError::Other
        })
    }

    fn check_buffer(count: u16, available: usize) -> Result<usize, DiskError> {
        let len = usize::from(count) * usize::from(SECTOR_SIZE);
        if available < len {
            warn!(
                "{} sectors need {} bytes, the buffer has {}",
                count, len, available
            );
            return Err(DiskError::Other);
        }
        Ok(len)
    }

    fn finish_io(&mut self, outcome: RetryOutcome) -> Result<(), DiskError> {
        if outcome.media_changed && self.dpb.take().is_some() {
            info!("media changed, dropping the cached disk parameters");
        }
        if outcome.result.is_success() {
            return Ok(());
        }
        let err = DiskError::from_sense(outcome.result.sense);
        debug!(
            "disk I/O failed: {:?}, sense {:?} => {}",
            outcome.result.result,
            outcome.result.sense,
            err.code()
        );
        Err(err)
    }

    pub fn read_sectors(
        &mut self,
        first_sector: u32,
        count: u16,
        buffer: &mut [u8],
    ) -> Result<(), DiskError> {
        let len = Self::check_buffer(count, buffer.len())?;
        if count == 0 {
            return Ok(());
        }
        let command = ReadWrite10::read(first_sector, count);
        let outcome = self.run(
            command.as_bytes(),
            DeviceReqData::In(&mut buffer[..len]),
            true,
        )?;
        self.finish_io(outcome)
    }

    pub fn write_sectors(
        &mut self,
        first_sector: u32,
        count: u16,
        buffer: &[u8],
    ) -> Result<(), DiskError> {
        let len = Self::check_buffer(count, buffer.len())?;
        if count == 0 {
            return Ok(());
        }
        let command = ReadWrite10::write(first_sector, count);
        let outcome = self.run(command.as_bytes(), DeviceReqData::Out(&buffer[..len]), true)?;
        self.finish_io(outcome)
    }

    /// Checks that the drive can take commands. A media change seen on the way drops the cached
    /// disk parameters.
    pub fn test_unit_ready(&mut self) -> Result<(), DiskError> {
        let command = TestUnitReady::new();
        let outcome = self.run(command.as_bytes(), DeviceReqData::NoData, true)?;
        self.finish_io(outcome)
    }

    /// Probes the drive for a media change. A change drops the cached disk parameters.
    pub fn check_disk_changed(&mut self) -> Result<bool, DiskError> {
        let command = ModeSense10::flexible_disk(1);
        let mut data = [0u8; 1];
        let outcome = self.run(command.as_bytes(), DeviceReqData::In(&mut data), false)?;

        if outcome.result.is_success() {
            return Ok(false);
        }
        match outcome.result.sense {
            None => Err(DiskError::Other),
            Some(sense) if sense.is_media_changed() => {
                info!("disk changed");
                self.dpb = None;
                Ok(true)
            }
            Some(sense) => Err(DiskError::from_asc(sense.asc)),
        }
    }

    /// Returns the disk parameters, reading them from the boot sector if there are none cached
    /// or the disk has been changed.
    pub fn disk_parameter_block(
        &mut self,
        check_changed: bool,
    ) -> Result<DiskParameters, DiskError> {
        let changed = if check_changed {
            Some(self.check_disk_changed()?)
        } else {
            None
        };

        let dpb = match self.dpb {
            Some(dpb) => dpb,
            None => {
                let mut sector = [0u8; SECTOR_SIZE as usize];
                self.read_sectors(0, 1, &mut sector)?;
                let dpb = Dpb::from_boot_sector(&sector)?;
                debug!("disk parameters: {:?}", dpb);
                self.dpb = Some(dpb);
                dpb
            }
        };

        Ok(DiskParameters { changed, dpb })
    }
}
