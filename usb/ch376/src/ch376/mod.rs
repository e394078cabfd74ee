//! Packet engine for the CH376 USB host chip.
//!
//! Every transfer is run as a sequence of tokens issued with ISSUE_TKN_X. After each token the
//! engine waits for the chip to raise its interrupt line, reads the interrupt status and maps it
//! to a [PacketResult]. NAKs are retried here and never leave this module.

use log::{debug, error, info, trace, warn};

use common::timeout::{Clock, Timeout};

use crate::config::Ch376Config;
use crate::driver_interface::{
    ConnectionStatus, DeviceReqData, EndpDirection, PacketResult, Toggle, TransferResult,
    UsbHardwareShortcuts, UsbHostHardware,
};
use crate::error::{Result, UsbError};
use crate::usb::{DescriptorKind, Setup};

pub mod cmd;
pub mod disk;
pub mod ports;
pub mod status;

#[cfg(test)]
pub(crate) mod mock;

use self::cmd::{token_target, Cmd, Pid, TokenFlags, UsbMode, BUFFER_LEN, CMD_RET_SUCCESS};
pub use self::disk::{DiskCapacity, DiskQueryError, Filesystem};
pub use self::ports::{Ch376Ports, IoPorts};
use self::status::{USB_INT_CONNECT, USB_INT_DISCONNECT};

pub struct Ch376<P, C> {
    ports: P,
    clock: C,
    config: Ch376Config,
    device_connected: bool,
}

impl<P: Ch376Ports, C: Clock> Ch376<P, C> {
    /// Resets the chip and leaves it in host mode, waiting for a device.
    pub fn new(ports: P, clock: C, config: Ch376Config) -> Self {
        let mut this = Self {
            ports,
            clock,
            config,
            device_connected: false,
        };
        this.hardware_reset();
        this
    }

    pub fn ports(&self) -> &P {
        &self.ports
    }
    pub fn ports_mut(&mut self) -> &mut P {
        &mut self.ports
    }
    pub fn clock(&self) -> &C {
        &self.clock
    }
    pub fn device_connected(&self) -> bool {
        self.device_connected
    }

    fn set_usb_mode(&mut self, mode: UsbMode) -> PacketResult {
        self.ports.write_command(Cmd::SetUsbMode as u8);
        self.ports.write_data(mode as u8);
        for _ in 0..cmd::SET_USB_MODE_POLLS {
            if self.ports.read_data() == CMD_RET_SUCCESS {
                return PacketResult::Ok;
            }
            self.clock.sleep_ms(1);
        }
        warn!("CH376 did not acknowledge USB mode {:?}", mode);
        PacketResult::OtherError
    }

    fn set_host_without_sof_mode(&mut self) {
        self.ports.write_command(Cmd::SetUsbMode as u8);
        self.ports.write_data(UsbMode::HostWithoutSof as u8);
    }

    fn bus_reset(&mut self) -> PacketResult {
        let result = self.set_usb_mode(UsbMode::HostBusReset);
        if result.is_error() {
            return result;
        }
        self.clock.sleep_ms(self.config.bus_reset_delay_ms);
        self.set_usb_mode(UsbMode::HostWithSof)
    }

    fn set_target_address(&mut self, address: u8) {
        self.ports.write_command(Cmd::SetUsbAddr as u8);
        self.ports.write_data(address);
    }

    fn write_usb_data(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= BUFFER_LEN);
        self.ports.write_command(Cmd::WrHostData as u8);
        self.ports.write_data(data.len() as u8);
        self.ports.write_multiple_data(data);
    }

    /// Copies the chip buffer into `buffer`. A packet that doesn't fit is drained and `None` is
    /// returned.
    fn read_usb_data(&mut self, buffer: &mut [u8]) -> Option<usize> {
        self.ports.write_command(Cmd::RdUsbData0 as u8);
        let len = usize::from(self.ports.read_data());
        if len > buffer.len() {
            warn!("received {} bytes, but only {} fit", len, buffer.len());
            let mut scratch = [0u8; u8::MAX as usize];
            self.ports.read_multiple_data(&mut scratch[..len]);
            return None;
        }
        self.ports.read_multiple_data(&mut buffer[..len]);
        Some(len)
    }

    fn discard_usb_data(&mut self) {
        let mut scratch = [0u8; u8::MAX as usize];
        let _ = self.read_usb_data(&mut scratch);
    }

    fn issue_token(&mut self, endpoint_number: u8, pid: Pid, flags: TokenFlags) {
        trace!("token {:?} ep {} {:?}", pid, endpoint_number, flags);
        self.ports.write_command(Cmd::IssueTknX as u8);
        self.ports.write_data(flags.bits());
        self.ports.write_data(token_target(endpoint_number, pid));
    }

    /// Blocks until the interrupt line is active. `false` if the configured wait timed out.
    fn wait_interrupt(&mut self) -> bool {
        let timeout = self
            .config
            .int_wait_timeout_ms
            .map(|millis| Timeout::from_millis(&self.clock, millis));

        while !self.ports.int_is_active() {
            if let Some(ref timeout) = timeout {
                if timeout.run(&self.clock).is_err() {
                    return false;
                }
            }
            self.clock.sleep_ms(1);
        }
        true
    }

    fn get_status(&mut self) -> u8 {
        self.ports.write_command(Cmd::GetStatus as u8);
        self.ports.read_data()
    }

    fn wait_and_get_result(&mut self) -> Result<PacketResult> {
        if !self.wait_interrupt() {
            warn!("timed out waiting for the CH376 interrupt");
            return Ok(PacketResult::Timeout);
        }

        let raw = self.get_status();
        trace!("interrupt status {:#04x}", raw);
        match status::classify(raw) {
            Some(PacketResult::NoDeviceConnected) => {
                info!("device disconnected");
                self.device_connected = false;
                self.set_host_without_sof_mode();
                Ok(PacketResult::NoDeviceConnected)
            }
            Some(result) => Ok(result),
            None => {
                error!("unexpected value from GET_STATUS: {:#04x}", raw);
                Err(UsbError::UnexpectedStatus(raw))
            }
        }
    }

    /// Runs `issue` until the device answers with something other than a NAK.
    fn repeat_while_nak<F>(&mut self, mut issue: F) -> Result<PacketResult>
    where
        F: FnMut(&mut Self),
    {
        let mut naks = 0u32;
        loop {
            issue(self);
            let result = self.wait_and_get_result()?;
            if result != PacketResult::Nak {
                return Ok(result);
            }

            naks += 1;
            if let Some(limit) = self.config.nak_retry_limit {
                if naks > limit {
                    debug!("giving up after {} NAKs", naks);
                    return Ok(PacketResult::Timeout);
                }
            }
            self.clock.sleep_ms(self.config.nak_retry_delay_ms);
        }
    }

    fn data_in(
        &mut self,
        buffer: &mut [u8],
        endpoint_number: u8,
        packet_size: u16,
        mut toggle: Toggle,
    ) -> Result<TransferResult> {
        let mut transferred = 0;

        while transferred < buffer.len() {
            let flags = if toggle.is_set() {
                TokenFlags::IN_TOGGLE
            } else {
                TokenFlags::empty()
            };
            let result =
                self.repeat_while_nak(|this| this.issue_token(endpoint_number, Pid::In, flags))?;
            if result.is_error() {
                return Ok(TransferResult {
                    result,
                    bytes_transferred: transferred,
                    next_toggle: toggle,
                });
            }

            toggle = toggle.flip();
            let amount = match self.read_usb_data(&mut buffer[transferred..]) {
                Some(amount) => amount,
                None => {
                    return Ok(TransferResult {
                        result: PacketResult::DataError,
                        bytes_transferred: transferred,
                        next_toggle: toggle,
                    })
                }
            };
            transferred += amount;

            // Short packet: the device has nothing more to send.
            if amount < usize::from(packet_size) || amount == 0 {
                break;
            }
        }

        Ok(TransferResult::success(transferred, toggle))
    }

    fn data_out(
        &mut self,
        buffer: &[u8],
        endpoint_number: u8,
        packet_size: u16,
        mut toggle: Toggle,
    ) -> Result<TransferResult> {
        let chunk_len = usize::from(packet_size).clamp(1, BUFFER_LEN);
        let mut transferred = 0;

        for chunk in buffer.chunks(chunk_len) {
            self.write_usb_data(chunk);
            let flags = if toggle.is_set() {
                TokenFlags::OUT_TOGGLE
            } else {
                TokenFlags::empty()
            };
            let result =
                self.repeat_while_nak(|this| this.issue_token(endpoint_number, Pid::Out, flags))?;
            if result.is_error() {
                return Ok(TransferResult {
                    result,
                    bytes_transferred: transferred,
                    next_toggle: toggle,
                });
            }

            toggle = toggle.flip();
            transferred += chunk.len();
        }

        Ok(TransferResult::success(transferred, toggle))
    }
}

impl<P: Ch376Ports, C: Clock> UsbHostHardware for Ch376<P, C> {
    fn hardware_reset(&mut self) {
        debug!("resetting CH376");
        self.ports.write_command(Cmd::ResetAll as u8);
        self.clock.sleep_ms(self.config.reset_delay_ms);
        self.set_host_without_sof_mode();
        self.device_connected = false;
    }

    fn check_connection_status(&mut self) -> ConnectionStatus {
        if self.ports.int_is_active() {
            match self.get_status() {
                USB_INT_CONNECT => {
                    info!("device connected, resetting bus");
                    self.device_connected = true;
                    return if self.bus_reset().is_ok() {
                        ConnectionStatus::Changed
                    } else {
                        ConnectionStatus::Error
                    };
                }
                USB_INT_DISCONNECT => {
                    info!("device disconnected");
                    self.device_connected = false;
                    self.set_host_without_sof_mode();
                    return ConnectionStatus::NotConnected;
                }
                other => trace!("ignoring interrupt status {:#04x} while idle", other),
            }
        }

        if self.device_connected {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::NotConnected
        }
    }

    fn control_transfer(
        &mut self,
        setup: Setup,
        mut data: DeviceReqData<'_>,
        device_address: u8,
        packet_size: u16,
    ) -> Result<TransferResult> {
        let length = usize::from(setup.length);
        let direction = setup.direction();
        if length > 0 {
            if data.direction() != direction || matches!(data, DeviceReqData::NoData) {
                return Err(UsbError::DirectionMismatch);
            }
            if data.len() < length {
                return Err(UsbError::BufferTooSmall {
                    needed: length,
                    available: data.len(),
                });
            }
        }

        self.set_target_address(device_address);

        self.write_usb_data(&setup.to_bytes());
        self.issue_token(0, Pid::Setup, TokenFlags::empty());
        let result = self.wait_and_get_result()?;
        if result.is_error() {
            debug!("SETUP stage failed: {:?}", result);
            return Ok(TransferResult::failure(result, Toggle::Data0));
        }

        let data_result = match data.reborrow() {
            _ if length == 0 => TransferResult::success(0, Toggle::Data1),
            DeviceReqData::In(buffer) => {
                self.data_in(&mut buffer[..length], 0, packet_size, Toggle::Data1)?
            }
            DeviceReqData::Out(buffer) => {
                self.data_out(&buffer[..length], 0, packet_size, Toggle::Data1)?
            }
            DeviceReqData::NoData => TransferResult::success(0, Toggle::Data1),
        };
        if data_result.is_error() {
            return Ok(data_result);
        }

        let status = if direction == EndpDirection::Out || length == 0 {
            let status = self
                .repeat_while_nak(|this| this.issue_token(0, Pid::In, TokenFlags::IN_TOGGLE))?;
            if status.is_ok() {
                self.discard_usb_data();
            }
            status
        } else {
            self.repeat_while_nak(|this| {
                this.write_usb_data(&[]);
                this.issue_token(0, Pid::Out, TokenFlags::OUT_TOGGLE);
            })?
        };
        if status.is_error() {
            debug!("status stage failed: {:?}", status);
            return Ok(TransferResult {
                result: status,
                ..data_result
            });
        }

        Ok(data_result)
    }

    fn data_in_transfer(
        &mut self,
        buffer: &mut [u8],
        device_address: u8,
        endpoint_number: u8,
        packet_size: u16,
        toggle: Toggle,
    ) -> Result<TransferResult> {
        self.set_target_address(device_address);
        self.data_in(buffer, endpoint_number, packet_size, toggle)
    }

    fn data_out_transfer(
        &mut self,
        buffer: &[u8],
        device_address: u8,
        endpoint_number: u8,
        packet_size: u16,
        toggle: Toggle,
    ) -> Result<TransferResult> {
        self.set_target_address(device_address);
        self.data_out(buffer, endpoint_number, packet_size, toggle)
    }

    fn shortcuts(&mut self) -> Option<&mut dyn UsbHardwareShortcuts> {
        if self.config.use_hardware_shortcuts {
            Some(self)
        } else {
            None
        }
    }
}

impl<P: Ch376Ports, C: Clock> UsbHardwareShortcuts for Ch376<P, C> {
    /// The chip can only fetch the first device or configuration descriptor, and only up to the
    /// size of its buffer.
    fn get_descriptor(
        &mut self,
        device_address: u8,
        kind: u8,
        index: u8,
        language: u16,
        buffer: &mut [u8],
    ) -> Result<TransferResult> {
        let supported = kind == DescriptorKind::Device as u8
            || kind == DescriptorKind::Configuration as u8;
        if !supported || index != 0 || language != 0 {
            return Ok(PacketResult::NotImplemented.into());
        }

        self.set_target_address(device_address);
        self.ports.write_command(Cmd::GetDescr as u8);
        self.ports.write_data(kind);
        match self.wait_and_get_result()? {
            PacketResult::DataError => return Ok(PacketResult::NotImplemented.into()),
            result if result.is_error() => return Ok(result.into()),
            _ => (),
        }

        let mut descriptor = [0u8; BUFFER_LEN];
        let len = match self.read_usb_data(&mut descriptor) {
            Some(len) => len,
            None => return Ok(PacketResult::NotImplemented.into()),
        };
        let copied = len.min(buffer.len());
        buffer[..copied].copy_from_slice(&descriptor[..copied]);
        Ok(TransferResult::success(copied, Toggle::Data0))
    }

    fn clear_endpoint_halt(
        &mut self,
        device_address: u8,
        endpoint_address: u8,
    ) -> Result<TransferResult> {
        self.set_target_address(device_address);
        self.ports.write_command(Cmd::ClrStall as u8);
        self.ports.write_data(endpoint_address);
        let result = self.wait_and_get_result()?;
        Ok(result.into())
    }
}
