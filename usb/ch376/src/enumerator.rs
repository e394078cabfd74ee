//! Brings a freshly attached device from the default state to the configured state.

use std::mem;

use log::{debug, info, trace, warn};
use smallvec::SmallVec;

use crate::config::HostConfig;
use crate::driver_interface::{
    Device, DeviceReqData, Interface, PacketResult, PortState, TransferResult, UsbHostHardware,
};
use crate::error::{EnumerationStage, Result, UsbError};
use crate::usb::{
    ConfigDescriptor, DescriptorIter, DescriptorKind, DeviceDescriptor, DeviceDescriptor8Byte,
    EndpointDescriptor, InterfaceDescriptor, Setup, DEVICE_DESCRIPTOR_LEN,
};

/// Packet size assumed for endpoint 0 until the device descriptor says otherwise.
const DEFAULT_PACKET_SIZE: u8 = 8;
const CONFIG_BUFFER_LEN: usize = 255;

pub struct DeviceEnumerator<'a, H> {
    hw: &'a mut H,
    config: &'a HostConfig,
    use_shortcuts: bool,
    state: PortState,
}

impl<'a, H: UsbHostHardware> DeviceEnumerator<'a, H> {
    pub fn new(hw: &'a mut H, config: &'a HostConfig, use_shortcuts: bool) -> Self {
        Self {
            hw,
            config,
            use_shortcuts,
            state: PortState::Default,
        }
    }

    pub fn state(&self) -> PortState {
        self.state
    }

    fn set_state(&mut self, state: PortState) {
        debug!("port {} -> {}", self.state.as_str(), state.as_str());
        self.state = state;
    }

    /// Fetches a descriptor, through the hardware shortcut when there is one that can handle the
    /// request. `buffer.len()` is the requested length.
    fn get_descriptor(
        &mut self,
        address: u8,
        packet_size: u8,
        kind: DescriptorKind,
        index: u8,
        buffer: &mut [u8],
    ) -> Result<TransferResult> {
        if self.use_shortcuts {
            if let Some(shortcuts) = self.hw.shortcuts() {
                let res = shortcuts.get_descriptor(address, kind as u8, index, 0, buffer)?;
                if res.result != PacketResult::NotImplemented {
                    return Ok(res);
                }
                trace!("no shortcut for {:?} descriptor, using a control transfer", kind);
            }
        }

        let length = u16::try_from(buffer.len()).unwrap_or(u16::MAX);
        self.hw.control_transfer(
            Setup::get_descriptor(kind, index, 0, length),
            DeviceReqData::In(buffer),
            address,
            u16::from(packet_size),
        )
    }

    fn check(stage: EnumerationStage, res: TransferResult) -> Result<TransferResult> {
        if res.is_error() {
            warn!("enumeration failed when {}: {:?}", stage, res.result);
            return Err(UsbError::EnumerationFailed {
                stage,
                result: res.result,
            });
        }
        Ok(res)
    }

    /// Polls the first 8 bytes of the device descriptor until the device answers with something
    /// that looks like one. Some devices return garbage for a while after the bus reset.
    fn poll_device_descriptor(&mut self) -> Result<DeviceDescriptor8Byte> {
        let mut polls = 0u32;
        loop {
            let mut buffer = [0u8; mem::size_of::<DeviceDescriptor8Byte>()];
            let res = self.get_descriptor(
                0,
                DEFAULT_PACKET_SIZE,
                DescriptorKind::Device,
                0,
                &mut buffer,
            )?;
            Self::check(EnumerationStage::DeviceDescriptor8Byte, res)?;
            polls += 1;

            if res.bytes_transferred == buffer.len() && buffer[0] == DEVICE_DESCRIPTOR_LEN {
                return plain::from_bytes::<DeviceDescriptor8Byte>(&buffer)
                    .map(|desc| *desc)
                    .map_err(|_| UsbError::MalformedDescriptor("short device descriptor"));
            }

            trace!(
                "device descriptor poll {}: {} bytes, length byte {}",
                polls,
                res.bytes_transferred,
                buffer[0]
            );
            if let Some(limit) = self.config.descriptor_poll_limit {
                if polls >= limit {
                    warn!("no device descriptor after {} polls", polls);
                    return Err(UsbError::NoDeviceDescriptor(polls));
                }
            }
        }
    }

    /// Collects the first `count` interfaces of a configuration, in their default setting.
    fn parse_interfaces(data: &[u8], count: u8) -> Result<SmallVec<[Interface; 1]>> {
        let mut interfaces = SmallVec::<[Interface; 1]>::new();
        // Endpoints that follow an alternate setting belong to it and are skipped too.
        let mut in_default_setting = false;

        for item in DescriptorIter::new(data) {
            let (base, bytes) = item?;
            if base.kind == DescriptorKind::Interface as u8 {
                let desc = *plain::from_bytes::<InterfaceDescriptor>(bytes)
                    .map_err(|_| UsbError::MalformedDescriptor("short interface descriptor"))?;
                in_default_setting = desc.is_default_setting();
                if in_default_setting && interfaces.len() >= usize::from(count) {
                    debug!(
                        "ignoring interface {} past the {} announced by the configuration",
                        desc.number, count
                    );
                    break;
                }
                if !in_default_setting {
                    trace!(
                        "skipping alternate setting {} of interface {}",
                        desc.alternate_setting,
                        desc.number
                    );
                    continue;
                }
                interfaces.push(desc.to_interface());
            } else if base.kind == DescriptorKind::Endpoint as u8 {
                let desc = *plain::from_bytes::<EndpointDescriptor>(bytes)
                    .map_err(|_| UsbError::MalformedDescriptor("short endpoint descriptor"))?;
                if !in_default_setting {
                    continue;
                }
                match interfaces.last_mut() {
                    Some(interface) => interface.endpoints.push(desc.to_endpoint()),
                    None => warn!(
                        "endpoint {:#04x} outside of any interface, ignoring",
                        desc.address
                    ),
                }
            } else if base.kind != DescriptorKind::Configuration as u8 {
                trace!("skipping descriptor of type {:#04x}", base.kind);
            }
        }

        Ok(interfaces)
    }

    /// Runs the whole enumeration. The device must have just been reset, so that it answers at
    /// address 0.
    pub fn run(mut self) -> Result<Device> {
        let address = self.config.device_address;

        let short = self.poll_device_descriptor()?;
        let packet_size = short.packet_size;
        if packet_size == 0 {
            return Err(UsbError::MalformedDescriptor("zero endpoint 0 packet size"));
        }
        debug!("endpoint 0 packet size {}", packet_size);

        let res = self.hw.control_transfer(
            Setup::set_address(u16::from(address)),
            DeviceReqData::NoData,
            0,
            u16::from(packet_size),
        )?;
        Self::check(EnumerationStage::SetAddress, res)?;
        self.set_state(PortState::Addressed);

        let mut buffer = [0u8; DEVICE_DESCRIPTOR_LEN as usize];
        let res = self.get_descriptor(
            address,
            packet_size,
            DescriptorKind::Device,
            0,
            &mut buffer,
        )?;
        Self::check(EnumerationStage::DeviceDescriptor, res)?;
        let device_desc = plain::from_bytes::<DeviceDescriptor>(&buffer[..res.bytes_transferred])
            .map(|desc| *desc)
            .map_err(|_| UsbError::MalformedDescriptor("short device descriptor"))?;

        let mut config_buffer = [0u8; CONFIG_BUFFER_LEN];
        let res = self.get_descriptor(
            address,
            packet_size,
            DescriptorKind::Configuration,
            0,
            &mut config_buffer,
        )?;
        Self::check(EnumerationStage::ConfigDescriptor, res)?;
        let config_desc =
            plain::from_bytes::<ConfigDescriptor>(&config_buffer[..res.bytes_transferred])
                .map(|desc| *desc)
                .map_err(|_| UsbError::MalformedDescriptor("short configuration descriptor"))?;
        let config_len = config_desc.received_len(res.bytes_transferred);
        if config_len < usize::from(u16::from_le(config_desc.total_length)) {
            debug!(
                "configuration descriptor truncated to {} bytes",
                res.bytes_transferred
            );
        }
        let config_data = &config_buffer[..config_len];
        let configuration_value = config_desc.configuration_value;

        let res = self.hw.control_transfer(
            Setup::set_configuration(configuration_value),
            DeviceReqData::NoData,
            address,
            u16::from(packet_size),
        )?;
        Self::check(EnumerationStage::SetConfiguration, res)?;
        self.set_state(PortState::Configured);

        let interfaces = Self::parse_interfaces(config_data, config_desc.interfaces)?;
        let device = Device::new(address, &device_desc, configuration_value, interfaces);
        info!(
            "device {:04x}:{:04x} configured at address {} with {} interface(s)",
            device.vendor,
            device.product,
            device.address,
            device.interfaces().len()
        );
        Ok(device)
    }
}
