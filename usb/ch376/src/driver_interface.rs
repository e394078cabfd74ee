use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::Result;
pub use crate::usb::{EndpointTy, Setup, ENDP_ATTR_TY_MASK};
use crate::usb::{DeviceDescriptor, ENDP_ADDR_DIR_BIT, ENDP_ADDR_NUM_MASK};

/// Outcome of a single USB transaction as seen by the host.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum PacketResult {
    Ok,
    /// The device is not ready yet. Retried internally, never surfaced by the transfer functions.
    Nak,
    Stall,
    Timeout,
    /// Buffer overrun: the device sent more than what fits.
    DataError,
    OtherError,
    NoDeviceConnected,
    /// Returned by [UsbHardwareShortcuts] for requests that the hardware can't shortcut.
    NotImplemented,
}

impl PacketResult {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
    pub fn is_error(self) -> bool {
        !self.is_ok()
    }
    pub fn is_error_but_not_stall(self) -> bool {
        self.is_error() && self != Self::Stall
    }
}

/// Data toggle sequence bit of an endpoint.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Toggle {
    #[default]
    Data0,
    Data1,
}

impl Toggle {
    #[must_use]
    pub fn flip(self) -> Self {
        match self {
            Self::Data0 => Self::Data1,
            Self::Data1 => Self::Data0,
        }
    }
    pub fn is_set(self) -> bool {
        self == Self::Data1
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TransferResult {
    pub result: PacketResult,
    pub bytes_transferred: usize,
    /// Toggle bit the endpoint must use for its next transfer.
    pub next_toggle: Toggle,
}

impl TransferResult {
    pub fn success(bytes_transferred: usize, next_toggle: Toggle) -> Self {
        Self {
            result: PacketResult::Ok,
            bytes_transferred,
            next_toggle,
        }
    }
    pub fn failure(result: PacketResult, toggle: Toggle) -> Self {
        Self {
            result,
            bytes_transferred: 0,
            next_toggle: toggle,
        }
    }
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
    pub fn is_error(&self) -> bool {
        self.result.is_error()
    }
    pub fn is_error_but_not_stall(&self) -> bool {
        self.result.is_error_but_not_stall()
    }
}

impl From<PacketResult> for TransferResult {
    fn from(result: PacketResult) -> Self {
        Self::failure(result, Toggle::Data0)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum EndpDirection {
    Out,
    In,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConnectionStatus {
    NotConnected,
    Connected,
    /// A device was just attached and the bus has been reset; it needs to be enumerated.
    Changed,
    /// The bus reset after an attach failed.
    Error,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PortState {
    Default,
    Addressed,
    Configured,
}
impl PortState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Addressed => "addressed",
            Self::Configured => "configured",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
    /// Owned by the transfer functions; only reset by a new enumeration.
    pub toggle: Toggle,
}

impl Endpoint {
    pub fn ty(&self) -> EndpointTy {
        EndpointTy::from_attributes(self.attributes)
    }
    pub fn number(&self) -> u8 {
        self.address & ENDP_ADDR_NUM_MASK
    }
    pub fn direction(&self) -> EndpDirection {
        if self.address & ENDP_ADDR_DIR_BIT != 0 {
            EndpDirection::In
        } else {
            EndpDirection::Out
        }
    }
    pub fn is_bulk(&self) -> bool {
        self.ty() == EndpointTy::Bulk
    }
    pub fn is_interrupt(&self) -> bool {
        self.ty() == EndpointTy::Interrupt
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Interface {
    pub number: u8,
    pub class: u8,
    pub sub_class: u8,
    pub protocol: u8,
    pub interface_str: u8,
    pub endpoints: SmallVec<[Endpoint; 4]>,
}

/// The single addressed and configured device.
///
/// A new value is built by every successful enumeration; it is never patched in place except for
/// the endpoint toggle bits.
#[derive(Clone, Debug, Serialize)]
pub struct Device {
    pub address: u8,
    pub packet_size: u8,
    pub class: u8,
    pub sub_class: u8,
    pub protocol: u8,
    pub vendor: u16,
    pub product: u16,
    pub release: u16,
    pub manufacturer_str: u8,
    pub product_str: u8,
    pub serial_str: u8,
    pub configuration_value: u8,
    interfaces: SmallVec<[Interface; 1]>,
    /// Endpoint address to (interface index, endpoint index).
    #[serde(skip)]
    endpoint_index: BTreeMap<u8, (usize, usize)>,
}

impl Device {
    pub fn new(
        address: u8,
        desc: &DeviceDescriptor,
        configuration_value: u8,
        interfaces: SmallVec<[Interface; 1]>,
    ) -> Self {
        let mut endpoint_index = BTreeMap::new();
        for (if_idx, interface) in interfaces.iter().enumerate() {
            for (ep_idx, endpoint) in interface.endpoints.iter().enumerate() {
                if endpoint_index.contains_key(&endpoint.address) {
                    warn!(
                        "endpoint {:#04x} declared by more than one interface, keeping the first",
                        endpoint.address
                    );
                    continue;
                }
                endpoint_index.insert(endpoint.address, (if_idx, ep_idx));
            }
        }

        Self {
            address,
            packet_size: desc.packet_size,
            class: desc.class,
            sub_class: desc.sub_class,
            protocol: desc.protocol,
            vendor: desc.vendor,
            product: desc.product,
            release: desc.release,
            manufacturer_str: desc.manufacturer_str,
            product_str: desc.product_str,
            serial_str: desc.serial_str,
            configuration_value,
            interfaces,
            endpoint_index,
        }
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn endpoint(&self, address: u8) -> Option<&Endpoint> {
        let &(if_idx, ep_idx) = self.endpoint_index.get(&address)?;
        Some(&self.interfaces[if_idx].endpoints[ep_idx])
    }

    pub fn endpoint_mut(&mut self, address: u8) -> Option<&mut Endpoint> {
        let &(if_idx, ep_idx) = self.endpoint_index.get(&address)?;
        Some(&mut self.interfaces[if_idx].endpoints[ep_idx])
    }
}

pub enum DeviceReqData<'a> {
    In(&'a mut [u8]),
    Out(&'a [u8]),
    NoData,
}
impl DeviceReqData<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::In(buf) => buf.len(),
            Self::Out(buf) => buf.len(),
            Self::NoData => 0,
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn direction(&self) -> EndpDirection {
        match self {
            DeviceReqData::Out(_) => EndpDirection::Out,
            DeviceReqData::NoData => EndpDirection::Out,
            DeviceReqData::In(_) => EndpDirection::In,
        }
    }
    pub fn reborrow(&mut self) -> DeviceReqData<'_> {
        match self {
            Self::In(buf) => DeviceReqData::In(buf),
            Self::Out(buf) => DeviceReqData::Out(buf),
            Self::NoData => DeviceReqData::NoData,
        }
    }
}

/// A USB host controller able to run single transfers against one device.
///
/// None of the transfer functions touch per-endpoint state: the toggle bit is passed in and the
/// one to use next is handed back in [TransferResult::next_toggle].
pub trait UsbHostHardware {
    fn hardware_reset(&mut self);

    fn check_connection_status(&mut self) -> ConnectionStatus;

    /// Runs the setup, data and status stages of a control transfer. The data stage transfers
    /// `setup.length` bytes, in the direction given by the setup packet.
    fn control_transfer(
        &mut self,
        setup: Setup,
        data: DeviceReqData<'_>,
        device_address: u8,
        packet_size: u16,
    ) -> Result<TransferResult>;

    fn data_in_transfer(
        &mut self,
        buffer: &mut [u8],
        device_address: u8,
        endpoint_number: u8,
        packet_size: u16,
        toggle: Toggle,
    ) -> Result<TransferResult>;

    fn data_out_transfer(
        &mut self,
        buffer: &[u8],
        device_address: u8,
        endpoint_number: u8,
        packet_size: u16,
        toggle: Toggle,
    ) -> Result<TransferResult>;

    /// Hardware-accelerated standard requests, if the controller has any.
    fn shortcuts(&mut self) -> Option<&mut dyn UsbHardwareShortcuts> {
        None
    }
}

/// Optional capability of a [UsbHostHardware]. Any request the hardware can't handle itself is
/// answered with [PacketResult::NotImplemented], and the caller falls back to a control transfer.
pub trait UsbHardwareShortcuts {
    /// Reads a descriptor into `buffer`; the descriptor length is in `bytes_transferred`.
    fn get_descriptor(
        &mut self,
        device_address: u8,
        kind: u8,
        index: u8,
        language: u16,
        buffer: &mut [u8],
    ) -> Result<TransferResult>;

    fn clear_endpoint_halt(&mut self, device_address: u8, endpoint_address: u8)
        -> Result<TransferResult>;
}
