#![allow(dead_code)]

use std::collections::VecDeque;

use ch376::usb::{DescriptorKind, SetupReq};
use ch376::{
    ConnectionStatus, DeviceReqData, HostConfig, PacketResult, Setup, Toggle, TransferResult,
    UsbError, UsbHost, UsbHostHardware,
};
use scroll::Pwrite;
use usbufi::dpb::BiosParameterBlock;

pub const SECTOR: usize = 512;
pub const FLOPPY_SECTORS: usize = 2880;

const OP_REQUEST_SENSE: u8 = 0x03;
const OP_READ10: u8 = 0x28;
const OP_WRITE10: u8 = 0x2A;
const OP_MODE_SENSE10: u8 = 0x5A;

const BULK_IN: u8 = 1;
const BULK_OUT: u8 = 2;
const INTERRUPT: u8 = 3;

/// How the next command (other than REQUEST SENSE) goes wrong. The sense code is what a
/// following REQUEST SENSE reports.
#[derive(Clone, Copy, Debug)]
pub enum Fault {
    /// The data phase stalls and the status block reports the sense code.
    Failed(u8, u8),
    /// The data moves but the status block reports the sense code.
    StatusOnly(u8, u8),
    AdscStall(u8, u8),
    AdscError(PacketResult),
    DataError(PacketResult),
    InterruptStall(u8, u8),
}

struct Current {
    block: [u8; 12],
    data_stall: bool,
    status: [u8; 2],
}

/// A CBI floppy drive on the other side of a USB host controller.
pub struct FakeFloppy {
    pub disk: Vec<u8>,
    pub write_protected: bool,
    pub vendor: u16,
    pub product: u16,
    pub interface_class: (u8, u8, u8),
    pub faults: VecDeque<Fault>,
    /// Results for the ADSC stage of upcoming REQUEST SENSE commands.
    pub request_sense_faults: VecDeque<PacketResult>,
    /// Bytes of sense data sent back; the whole allocation when `None`.
    pub sense_len: Option<usize>,
    pub commands: Vec<[u8; 12]>,
    pub adsc_setups: Vec<Setup>,
    pub cleared_halts: Vec<u8>,
    announced: bool,
    unit_attention: bool,
    sense: (u8, u8),
    current: Option<Current>,
}

impl FakeFloppy {
    pub fn new(disk: Vec<u8>) -> Self {
        Self {
            disk,
            write_protected: false,
            vendor: 0x1234,
            product: 0x0002,
            interface_class: (8, 4, 0),
            faults: VecDeque::new(),
            request_sense_faults: VecDeque::new(),
            sense_len: None,
            commands: Vec::new(),
            adsc_setups: Vec::new(),
            cleared_halts: Vec::new(),
            announced: false,
            unit_attention: false,
            sense: (0, 0),
            current: None,
        }
    }

    /// Swaps the medium. The next command reports a unit attention.
    pub fn change_disk(&mut self, disk: Vec<u8>) {
        self.disk = disk;
        self.unit_attention = true;
    }

    pub fn opcodes(&self) -> Vec<u8> {
        self.commands.iter().map(|block| block[0]).collect()
    }

    fn device_descriptor(&self) -> Vec<u8> {
        let mut desc = vec![18, 1, 0x10, 0x01, 0, 0, 0, 8, 0, 0, 0, 0, 0x00, 0x01, 1, 2, 0, 1];
        desc[8..10].copy_from_slice(&self.vendor.to_le_bytes());
        desc[10..12].copy_from_slice(&self.product.to_le_bytes());
        desc
    }

    fn config_descriptor(&self) -> Vec<u8> {
        let (class, sub_class, protocol) = self.interface_class;
        let mut blob = vec![9, 2, 0, 0, 1, 1, 0, 0x80, 50];
        blob.extend_from_slice(&[9, 4, 0, 0, 3, class, sub_class, protocol, 0]);
        blob.extend_from_slice(&[7, 5, 0x81, 2, 64, 0, 0]);
        blob.extend_from_slice(&[7, 5, 0x02, 2, 64, 0, 0]);
        blob.extend_from_slice(&[7, 5, 0x83, 3, 2, 0, 255]);
        let len = blob.len() as u16;
        blob[2..4].copy_from_slice(&len.to_le_bytes());
        blob
    }

    fn advance(toggle: Toggle, len: usize, packet_size: u16) -> Toggle {
        let packets = (len + usize::from(packet_size) - 1) / usize::from(packet_size);
        (0..packets).fold(toggle, |t, _| t.flip())
    }

    fn disk_range(&self, block: &[u8; 12]) -> Option<std::ops::Range<usize>> {
        let lba = u32::from_be_bytes([block[2], block[3], block[4], block[5]]) as usize;
        let count = u16::from_be_bytes([block[7], block[8]]) as usize;
        let range = lba * SECTOR..(lba + count) * SECTOR;
        if range.end <= self.disk.len() {
            Some(range)
        } else {
            None
        }
    }

    fn fail(&mut self, block: [u8; 12], sense: (u8, u8), data_stall: bool) -> PacketResult {
        self.sense = sense;
        self.current = Some(Current {
            block,
            data_stall,
            status: [sense.0, sense.1],
        });
        PacketResult::Ok
    }

    fn adsc(&mut self, block: [u8; 12]) -> PacketResult {
        self.commands.push(block);
        self.current = None;

        if block[0] == OP_REQUEST_SENSE {
            if let Some(result) = self.request_sense_faults.pop_front() {
                return result;
            }
            self.current = Some(Current {
                block,
                data_stall: false,
                status: [0, 0],
            });
            return PacketResult::Ok;
        }

        if self.unit_attention {
            self.unit_attention = false;
            return self.fail(block, (0x28, 0), true);
        }

        // Data and interrupt faults are left queued for their own phase.
        let fault = match self.faults.front() {
            Some(Fault::DataError(_)) | Some(Fault::InterruptStall(..)) | None => None,
            Some(_) => self.faults.pop_front(),
        };
        match fault {
            Some(Fault::Failed(asc, ascq)) => return self.fail(block, (asc, ascq), true),
            Some(Fault::StatusOnly(asc, ascq)) => return self.fail(block, (asc, ascq), false),
            Some(Fault::AdscStall(asc, ascq)) => {
                self.sense = (asc, ascq);
                return PacketResult::Stall;
            }
            Some(Fault::AdscError(result)) => return result,
            _ => (),
        }

        let out_of_range =
            matches!(block[0], OP_READ10 | OP_WRITE10) && self.disk_range(&block).is_none();
        if out_of_range {
            return self.fail(block, (0x21, 0), true);
        }
        if block[0] == OP_WRITE10 && self.write_protected {
            return self.fail(block, (0x27, 0), true);
        }

        self.current = Some(Current {
            block,
            data_stall: false,
            status: [0, 0],
        });
        PacketResult::Ok
    }

    fn take_fault_for(&mut self, data_phase: bool) -> Option<Fault> {
        match self.faults.front() {
            Some(Fault::DataError(_)) if data_phase => self.faults.pop_front(),
            Some(Fault::InterruptStall(..)) if !data_phase => self.faults.pop_front(),
            _ => None,
        }
    }

    fn bulk_in(&mut self, buffer: &mut [u8]) -> PacketResult {
        if let Some(Fault::DataError(result)) = self.take_fault_for(true) {
            return result;
        }
        let current = match &self.current {
            Some(current) => current,
            None => return PacketResult::Stall,
        };
        if current.data_stall {
            return PacketResult::Stall;
        }
        let block = current.block;
        match block[0] {
            OP_READ10 => {
                if let Some(range) = self.disk_range(&block) {
                    let len = buffer.len().min(range.len());
                    buffer[..len].copy_from_slice(&self.disk[range][..len]);
                }
            }
            OP_REQUEST_SENSE => {
                let mut data = [0u8; 18];
                data[0] = 0x70;
                data[2] = if self.sense.0 == 0 { 0 } else { 0x06 };
                data[7] = 10;
                data[12] = self.sense.0;
                data[13] = self.sense.1;
                let len = buffer.len().min(data.len());
                buffer[..len].copy_from_slice(&data[..len]);
                self.sense = (0, 0);
            }
            OP_MODE_SENSE10 => buffer.iter_mut().for_each(|byte| *byte = 0),
            _ => return PacketResult::Stall,
        }
        PacketResult::Ok
    }

    fn bulk_out(&mut self, buffer: &[u8]) -> PacketResult {
        if let Some(Fault::DataError(result)) = self.take_fault_for(true) {
            return result;
        }
        let current = match &self.current {
            Some(current) => current,
            None => return PacketResult::Stall,
        };
        if current.data_stall {
            return PacketResult::Stall;
        }
        let block = current.block;
        if block[0] != OP_WRITE10 {
            return PacketResult::Stall;
        }
        if let Some(range) = self.disk_range(&block) {
            let len = buffer.len().min(range.len());
            let start = range.start;
            self.disk[start..start + len].copy_from_slice(&buffer[..len]);
        }
        PacketResult::Ok
    }

    fn interrupt(&mut self, buffer: &mut [u8]) -> PacketResult {
        if let Some(Fault::InterruptStall(asc, ascq)) = self.take_fault_for(false) {
            self.sense = (asc, ascq);
            return PacketResult::Stall;
        }
        let status = self.current.take().map_or([0, 0], |current| current.status);
        let len = buffer.len().min(2);
        buffer[..len].copy_from_slice(&status[..len]);
        PacketResult::Ok
    }
}

impl UsbHostHardware for FakeFloppy {
    fn hardware_reset(&mut self) {}

    fn check_connection_status(&mut self) -> ConnectionStatus {
        if self.announced {
            ConnectionStatus::Connected
        } else {
            self.announced = true;
            ConnectionStatus::Changed
        }
    }

    fn control_transfer(
        &mut self,
        setup: Setup,
        data: DeviceReqData<'_>,
        _device_address: u8,
        _packet_size: u16,
    ) -> Result<TransferResult, UsbError> {
        if setup.kind == 0x21 && setup.request == 0 {
            self.adsc_setups.push(setup);
            let mut block = [0u8; 12];
            if let DeviceReqData::Out(payload) = data {
                let len = payload.len().min(12);
                block[..len].copy_from_slice(&payload[..len]);
            }
            let result = self.adsc(block);
            return Ok(if result.is_ok() {
                TransferResult::success(12, Toggle::Data1)
            } else {
                TransferResult::failure(result, Toggle::Data1)
            });
        }

        if setup.request == SetupReq::ClearFeature as u8 {
            self.cleared_halts.push(setup.index as u8);
            return Ok(TransferResult::success(0, Toggle::Data1));
        }
        if setup.request != SetupReq::GetDescriptor as u8 {
            return Ok(TransferResult::success(0, Toggle::Data1));
        }

        let reply = if setup.value_hi() == DescriptorKind::Device as u8 {
            self.device_descriptor()
        } else {
            self.config_descriptor()
        };
        let len = reply.len().min(usize::from(setup.length));
        if let DeviceReqData::In(buffer) = data {
            buffer[..len].copy_from_slice(&reply[..len]);
        }
        Ok(TransferResult::success(len, Toggle::Data1))
    }

    fn data_in_transfer(
        &mut self,
        buffer: &mut [u8],
        _device_address: u8,
        endpoint_number: u8,
        packet_size: u16,
        toggle: Toggle,
    ) -> Result<TransferResult, UsbError> {
        let sending_sense = matches!(
            &self.current,
            Some(current) if current.block[0] == OP_REQUEST_SENSE
        );
        let len = match self.sense_len {
            Some(len) if endpoint_number == BULK_IN && sending_sense => len.min(buffer.len()),
            _ => buffer.len(),
        };
        let result = match endpoint_number {
            BULK_IN => self.bulk_in(&mut buffer[..len]),
            INTERRUPT => self.interrupt(buffer),
            _ => PacketResult::Stall,
        };
        Ok(match result {
            PacketResult::Ok => {
                TransferResult::success(len, Self::advance(toggle, len, packet_size))
            }
            other => TransferResult::failure(other, toggle),
        })
    }

    fn data_out_transfer(
        &mut self,
        buffer: &[u8],
        _device_address: u8,
        endpoint_number: u8,
        packet_size: u16,
        toggle: Toggle,
    ) -> Result<TransferResult, UsbError> {
        let result = match endpoint_number {
            BULK_OUT => self.bulk_out(buffer),
            _ => PacketResult::Stall,
        };
        Ok(match result {
            PacketResult::Ok => TransferResult::success(
                buffer.len(),
                Self::advance(toggle, buffer.len(), packet_size),
            ),
            other => TransferResult::failure(other, toggle),
        })
    }
}

pub fn attach(floppy: FakeFloppy) -> UsbHost<FakeFloppy> {
    let mut host = UsbHost::new(floppy, HostConfig::default());
    assert_eq!(
        host.update_device_connection_status().unwrap(),
        ConnectionStatus::Changed
    );
    host
}

pub fn floppy_1440k_bpb() -> BiosParameterBlock {
    BiosParameterBlock {
        jump: [0xEB, 0x3C, 0x90],
        oem_name: *b"MSDOS5.0",
        bytes_per_sector: 512,
        sectors_per_cluster: 1,
        reserved_sectors: 1,
        fat_count: 2,
        root_entries: 224,
        total_sectors: 2880,
        media_descriptor: 0xF0,
        sectors_per_fat: 9,
    }
}

/// A formatted disk image. Every sector past the boot sector is filled with its own number.
pub fn disk_image(bpb: BiosParameterBlock) -> Vec<u8> {
    let sectors = usize::from(bpb.total_sectors);
    let mut disk = vec![0u8; sectors * SECTOR];
    for (n, sector) in disk.chunks_mut(SECTOR).enumerate().skip(1) {
        sector.iter_mut().for_each(|byte| *byte = n as u8);
    }
    disk.pwrite_with(bpb, 0, scroll::LE).unwrap();
    disk[510] = 0x55;
    disk[511] = 0xAA;
    disk
}
