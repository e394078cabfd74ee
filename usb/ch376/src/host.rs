//! Single entry point for class drivers: owns the hardware, tracks the attached device and routes
//! transfers to its endpoints.

use log::{debug, error, info};

use crate::config::HostConfig;
use crate::driver_interface::{
    ConnectionStatus, Device, DeviceReqData, EndpDirection, EndpointTy, PacketResult, Setup,
    Toggle, TransferResult, UsbHostHardware,
};
use crate::enumerator::DeviceEnumerator;
use crate::error::{Result, UsbError};
use crate::usb::{ENDP_ADDR_DIR_BIT, ENDP_ADDR_NUM_MASK};

/// Where a validated data transfer goes.
struct Route {
    endpoint_address: u8,
    packet_size: u16,
    toggle: Toggle,
}

pub struct UsbHost<H> {
    hw: H,
    config: HostConfig,
    has_shortcuts: bool,
    device: Option<Device>,
}

impl<H: UsbHostHardware> UsbHost<H> {
    pub fn new(mut hw: H, config: HostConfig) -> Self {
        let has_shortcuts = hw.shortcuts().is_some();
        debug!("hardware shortcuts available: {}", has_shortcuts);
        Self {
            hw,
            config,
            has_shortcuts,
            device: None,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }
    pub fn hardware(&self) -> &H {
        &self.hw
    }
    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    /// Resets the controller and forgets the attached device.
    pub fn reset(&mut self) {
        self.hw.hardware_reset();
        self.device = None;
    }

    /// Polls the hardware for attach and detach events, enumerating a newly attached device.
    ///
    /// A failed enumeration leaves no device behind; the next attach is enumerated again.
    pub fn update_device_connection_status(&mut self) -> Result<ConnectionStatus> {
        let status = self.hw.check_connection_status();
        match status {
            ConnectionStatus::Changed => {
                self.device = None;
                info!("device attached, enumerating");
                let device =
                    DeviceEnumerator::new(&mut self.hw, &self.config, self.has_shortcuts).run()?;
                self.device = Some(device);
            }
            ConnectionStatus::NotConnected => {
                if self.device.take().is_some() {
                    info!("device detached");
                }
            }
            ConnectionStatus::Error => {
                self.device = None;
                error!("bus reset after attach failed");
                return Err(UsbError::BusResetFailed);
            }
            ConnectionStatus::Connected => (),
        }
        Ok(status)
    }

    pub fn connected_device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    pub fn connected_device_with_address(&self, address: u8) -> Option<&Device> {
        self.device.as_ref().filter(|device| device.address == address)
    }

    fn note_result(&mut self, res: &TransferResult) {
        if res.result == PacketResult::NoDeviceConnected && self.device.take().is_some() {
            info!("device detached during a transfer");
        }
    }

    pub fn control_transfer(
        &mut self,
        setup: Setup,
        data: DeviceReqData<'_>,
        device_address: u8,
    ) -> Result<TransferResult> {
        let packet_size = match self.connected_device_with_address(device_address) {
            Some(device) => u16::from(device.packet_size),
            None => return Ok(PacketResult::NoDeviceConnected.into()),
        };
        let res = self
            .hw
            .control_transfer(setup, data, device_address, packet_size)?;
        self.note_result(&res);
        Ok(res)
    }

    /// Checks that `endpoint` can carry a transfer in `direction`. `None` when there is no device
    /// at `device_address`.
    ///
    /// `endpoint` may be given either as a bare number or as a full endpoint address.
    fn route(
        &self,
        device_address: u8,
        endpoint: u8,
        direction: EndpDirection,
    ) -> Result<Option<Route>> {
        let device = match self.connected_device_with_address(device_address) {
            Some(device) => device,
            None => {
                debug!("no device at address {}", device_address);
                return Ok(None);
            }
        };

        let invalid = |reason| UsbError::InvalidEndpoint {
            address: endpoint,
            reason,
        };
        if endpoint & ENDP_ADDR_DIR_BIT != 0 && direction == EndpDirection::Out {
            return Err(invalid("IN endpoint used for an OUT transfer"));
        }
        let number = endpoint & ENDP_ADDR_NUM_MASK;
        let endpoint_address = match direction {
            EndpDirection::In => number | ENDP_ADDR_DIR_BIT,
            EndpDirection::Out => number,
        };

        let endp = match device.endpoint(endpoint_address) {
            Some(endp) => endp,
            None if device.endpoint(endpoint_address ^ ENDP_ADDR_DIR_BIT).is_some() => {
                return Err(invalid("endpoint has the opposite direction"))
            }
            None => return Err(invalid("no such endpoint")),
        };
        match endp.ty() {
            EndpointTy::Bulk => (),
            EndpointTy::Interrupt if direction == EndpDirection::Out => {
                return Err(invalid("OUT transfers to interrupt endpoints are not supported"))
            }
            EndpointTy::Interrupt => (),
            EndpointTy::Ctrl | EndpointTy::Isoch => {
                return Err(invalid("not a bulk or interrupt endpoint"))
            }
        }

        Ok(Some(Route {
            endpoint_address,
            packet_size: endp.max_packet_size,
            toggle: endp.toggle,
        }))
    }

    fn finish_data_transfer(&mut self, endpoint_address: u8, res: &TransferResult) {
        if let Some(endp) = self
            .device
            .as_mut()
            .and_then(|device| device.endpoint_mut(endpoint_address))
        {
            endp.toggle = res.next_toggle;
        }
        self.note_result(res);
    }

    pub fn data_in_transfer(
        &mut self,
        buffer: &mut [u8],
        device_address: u8,
        endpoint: u8,
    ) -> Result<TransferResult> {
        let route = match self.route(device_address, endpoint, EndpDirection::In)? {
            Some(route) => route,
            None => return Ok(PacketResult::NoDeviceConnected.into()),
        };
        let res = self.hw.data_in_transfer(
            buffer,
            device_address,
            route.endpoint_address & ENDP_ADDR_NUM_MASK,
            route.packet_size,
            route.toggle,
        )?;
        self.finish_data_transfer(route.endpoint_address, &res);
        Ok(res)
    }

    pub fn data_out_transfer(
        &mut self,
        buffer: &[u8],
        device_address: u8,
        endpoint: u8,
    ) -> Result<TransferResult> {
        let route = match self.route(device_address, endpoint, EndpDirection::Out)? {
            Some(route) => route,
            None => return Ok(PacketResult::NoDeviceConnected.into()),
        };
        let res = self.hw.data_out_transfer(
            buffer,
            device_address,
            route.endpoint_address,
            route.packet_size,
            route.toggle,
        )?;
        self.finish_data_transfer(route.endpoint_address, &res);
        Ok(res)
    }

    /// Clears a halted endpoint. The toggle bit of the endpoint is left alone.
    pub fn clear_endpoint_halt(
        &mut self,
        device_address: u8,
        endpoint_address: u8,
    ) -> Result<TransferResult> {
        if self.connected_device_with_address(device_address).is_none() {
            return Ok(PacketResult::NoDeviceConnected.into());
        }

        if self.has_shortcuts {
            if let Some(shortcuts) = self.hw.shortcuts() {
                let res = shortcuts.clear_endpoint_halt(device_address, endpoint_address)?;
                if res.result != PacketResult::NotImplemented {
                    self.note_result(&res);
                    return Ok(res);
                }
            }
        }

        debug!("CLEAR_FEATURE(ENDPOINT_HALT) on {:#04x}", endpoint_address);
        self.control_transfer(
            Setup::clear_endpoint_halt(endpoint_address),
            DeviceReqData::NoData,
            device_address,
        )
    }
}
