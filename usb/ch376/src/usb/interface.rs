use plain::Plain;
use smallvec::SmallVec;

use crate::driver_interface::Interface;

#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct InterfaceDescriptor {
    pub length: u8,
    pub kind: u8,
    pub number: u8,
    pub alternate_setting: u8,
    pub endpoints: u8,
    pub class: u8,
    pub sub_class: u8,
    pub protocol: u8,
    pub interface_str: u8,
}

unsafe impl Plain for InterfaceDescriptor {}

impl InterfaceDescriptor {
    pub fn is_default_setting(&self) -> bool {
        self.alternate_setting == 0
    }

    /// The interface as recorded on the device, before its endpoints are known.
    pub fn to_interface(&self) -> Interface {
        Interface {
            number: self.number,
            class: self.class,
            sub_class: self.sub_class,
            protocol: self.protocol,
            interface_str: self.interface_str,
            endpoints: SmallVec::new(),
        }
    }
}
