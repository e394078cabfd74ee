use std::mem;

use ch376::usb::{ReqDirection, ReqRecipient, ReqType};
use ch376::{
    DeviceReqData, EndpDirection, Endpoint, Interface, PacketResult, Setup, UsbHost,
    UsbHostHardware,
};
use log::{debug, info, warn};

use super::{CbiCommandResult, Protocol, ProtocolError};
use crate::config::UfiConfig;
use crate::sense::SenseCode;
use crate::ufi::cmds::{CommandBlock, RequestSense, SenseData, UFI_CMD_LEN};
use crate::ufi::opcodes::Opcode;

pub const MASS_STORAGE_CLASS: u8 = 0x08;
pub const UFI_SUBCLASS: u8 = 0x04;
/// CBI with command completion interrupt.
pub const CBI_PROTOCOL: u8 = 0x00;

/// Accept Device-Specific Command
pub const ADSC_REQUEST: u8 = 0x00;

/// Bits 7:5 of the second command byte.
pub const LUN_SHIFT: u8 = 5;

const INTERRUPT_DATA_LEN: usize = 2;

pub struct CbiTransport<'a, H> {
    host: &'a mut UsbHost<H>,
    device_address: u8,
    lun: u8,
    interface_number: u8,
    bulk_in: u8,
    bulk_out: u8,
    interrupt: u8,
    adsc: Setup,
}

fn is_cbi(interface: &Interface) -> bool {
    interface.class == MASS_STORAGE_CLASS
        && interface.sub_class == UFI_SUBCLASS
        && interface.protocol == CBI_PROTOCOL
}

fn find_endpoint(
    interface: &Interface,
    name: &'static str,
    pred: impl Fn(&Endpoint) -> bool,
) -> Result<u8, ProtocolError> {
    interface
        .endpoints
        .iter()
        .find(|endpoint| pred(endpoint))
        .map(|endpoint| endpoint.address)
        .ok_or(ProtocolError::MissingEndpoint(name))
}

impl<'a, H: UsbHostHardware> CbiTransport<'a, H> {
    pub fn init(
        host: &'a mut UsbHost<H>,
        device_address: u8,
        config: &UfiConfig,
    ) -> Result<Self, ProtocolError> {
        let device = host
            .connected_device_with_address(device_address)
            .ok_or(ProtocolError::NotConnected(device_address))?;

        let interface = if config.is_class_check_exception(device.vendor, device.product) {
            debug!(
                "{:04x}:{:04x} is a known CBI device, skipping the class check",
                device.vendor, device.product
            );
            device.interfaces().first()
        } else {
            let mut candidates = device.interfaces().iter().filter(|iface| is_cbi(iface));
            let first = candidates.next();
            if candidates.next().is_some() {
                warn!("more than one CBI interface, using the first one");
            }
            first
        };
        let interface = interface.ok_or(ProtocolError::NoCbiInterface)?;

        let bulk_in = find_endpoint(interface, "bulk IN", |endp| {
            endp.is_bulk() && endp.direction() == EndpDirection::In
        })?;
        let bulk_out = find_endpoint(interface, "bulk OUT", |endp| {
            endp.is_bulk() && endp.direction() == EndpDirection::Out
        })?;
        let interrupt = find_endpoint(interface, "interrupt IN", |endp| {
            endp.is_interrupt() && endp.direction() == EndpDirection::In
        })?;

        let interface_number = interface.number;
        info!(
            "CBI interface {}: bulk in {:#04x}, bulk out {:#04x}, interrupt {:#04x}",
            interface_number, bulk_in, bulk_out, interrupt
        );

        Ok(Self {
            host,
            device_address,
            lun: config.lun,
            interface_number,
            bulk_in,
            bulk_out,
            interrupt,
            adsc: Setup::new(
                ReqDirection::HostToDevice,
                ReqType::Class,
                ReqRecipient::Interface,
                ADSC_REQUEST,
                0,
                u16::from(interface_number),
                UFI_CMD_LEN as u16,
            ),
        })
    }

    pub fn host(&self) -> &UsbHost<H> {
        &*self.host
    }
    pub fn host_mut(&mut self) -> &mut UsbHost<H> {
        &mut *self.host
    }
    pub fn interface_number(&self) -> u8 {
        self.interface_number
    }

    /// Pads `command` to a full UFI command block, with the logical unit stamped in.
    pub fn command_block(&self, command: &[u8]) -> Result<[u8; UFI_CMD_LEN], ProtocolError> {
        if command.len() > UFI_CMD_LEN {
            return Err(ProtocolError::TooLargeCommandBlock(command.len()));
        }
        let mut block = [0u8; UFI_CMD_LEN];
        block[..command.len()].copy_from_slice(command);
        block[1] = (block[1] & !(0b111 << LUN_SHIFT)) | (self.lun << LUN_SHIFT);
        Ok(block)
    }

    fn clear_halt(&mut self, endpoint_address: u8) -> Result<(), ProtocolError> {
        debug!("clearing halt on endpoint {:#04x}", endpoint_address);
        let res = self
            .host
            .clear_endpoint_halt(self.device_address, endpoint_address)?;
        if res.is_error() {
            warn!(
                "failed to clear halt on endpoint {:#04x}: {:?}",
                endpoint_address, res.result
            );
        }
        Ok(())
    }

    fn request_sense(&mut self) -> Result<Option<SenseCode>, ProtocolError> {
        let command = RequestSense::new(RequestSense::MINIMAL_ALLOC_LEN);
        let mut buffer = [0u8; mem::size_of::<SenseData>()];
        let alloc_len = usize::from(RequestSense::MINIMAL_ALLOC_LEN);

        let res = self.send_command(
            command.as_bytes(),
            DeviceReqData::In(&mut buffer[..alloc_len]),
        )?;
        if res.is_error() || res.sense.is_none() {
            debug!("REQUEST SENSE failed: {:?}", res.result);
            return Ok(None);
        }
        // ASC and ASCQ are the last two bytes asked for.
        if res.bytes_transferred < alloc_len {
            warn!(
                "REQUEST SENSE returned {} of {} bytes",
                res.bytes_transferred, alloc_len
            );
            return Ok(None);
        }

        match plain::from_bytes::<SenseData>(&buffer) {
            Ok(data) => Ok(Some(SenseCode::new(
                data.add_sense_code,
                data.add_sense_code_qual,
            ))),
            Err(err) => {
                warn!("unable to interpret sense data: {:?}", err);
                Ok(None)
            }
        }
    }

    /// Asks the device why `block` failed. `failing` is reported when that isn't possible.
    fn result_on_error(
        &mut self,
        block: &[u8; UFI_CMD_LEN],
        failing: PacketResult,
        bytes_transferred: usize,
    ) -> Result<CbiCommandResult, ProtocolError> {
        if block[0] == Opcode::RequestSense as u8 {
            return Ok(CbiCommandResult::failed(failing, bytes_transferred));
        }
        Ok(match self.request_sense()? {
            Some(sense) => {
                debug!("command {:#04x} failed: {}", block[0], sense);
                CbiCommandResult {
                    result: PacketResult::Ok,
                    bytes_transferred,
                    sense: Some(sense),
                }
            }
            None => CbiCommandResult::failed(failing, bytes_transferred),
        })
    }
}

impl<'a, H: UsbHostHardware> Protocol for CbiTransport<'a, H> {
    fn send_command(
        &mut self,
        command: &[u8],
        data: DeviceReqData<'_>,
    ) -> Result<CbiCommandResult, ProtocolError> {
        let block = self.command_block(command)?;
        let address = self.device_address;

        let res = self
            .host
            .control_transfer(self.adsc, DeviceReqData::Out(&block), address)?;
        if res.is_error_but_not_stall() {
            debug!("ADSC for command {:#04x} failed: {:?}", block[0], res.result);
            return Ok(CbiCommandResult::failed(res.result, 0));
        }
        if res.is_error() {
            return self.result_on_error(&block, res.result, 0);
        }

        let data_res = match data {
            DeviceReqData::In(buf) if !buf.is_empty() => {
                Some((self.host.data_in_transfer(buf, address, self.bulk_in)?, self.bulk_in))
            }
            DeviceReqData::Out(buf) if !buf.is_empty() => Some((
                self.host.data_out_transfer(buf, address, self.bulk_out)?,
                self.bulk_out,
            )),
            _ => None,
        };

        let mut bytes_transferred = 0;
        let mut data_stall = None;
        if let Some((res, endpoint)) = data_res {
            bytes_transferred = res.bytes_transferred;
            if res.is_error_but_not_stall() {
                return Ok(CbiCommandResult::failed(res.result, bytes_transferred));
            }
            if res.is_error() {
                self.clear_halt(endpoint)?;
                data_stall = Some(res.result);
            }
        }

        let mut status = [0u8; INTERRUPT_DATA_LEN];
        let interrupt = self.interrupt;
        let res = self.host.data_in_transfer(&mut status, address, interrupt)?;
        if res.is_error_but_not_stall() {
            return Ok(CbiCommandResult::failed(res.result, bytes_transferred));
        }
        if res.is_error() {
            self.clear_halt(interrupt)?;
            return self.result_on_error(&block, res.result, bytes_transferred);
        }
        if let Some(failing) = data_stall {
            return self.result_on_error(&block, failing, bytes_transferred);
        }
        if status[0] != 0 {
            return self.result_on_error(&block, PacketResult::Ok, bytes_transferred);
        }

        Ok(CbiCommandResult {
            result: PacketResult::Ok,
            bytes_transferred,
            sense: Some(SenseCode::new(status[0], status[1])),
        })
    }
}
