use plain::Plain;

use crate::driver_interface::{Endpoint, Toggle};

#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct EndpointDescriptor {
    pub length: u8,
    pub kind: u8,
    pub address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

unsafe impl Plain for EndpointDescriptor {}

impl EndpointDescriptor {
    /// Freshly configured endpoints start with the DATA0 toggle.
    pub fn to_endpoint(&self) -> Endpoint {
        Endpoint {
            address: self.address,
            attributes: self.attributes,
            max_packet_size: u16::from_le(self.max_packet_size),
            interval: self.interval,
            toggle: Toggle::Data0,
        }
    }
}
