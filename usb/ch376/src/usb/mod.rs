pub use self::config::ConfigDescriptor;
pub use self::device::{DeviceDescriptor, DeviceDescriptor8Byte};
pub use self::endpoint::EndpointDescriptor;
pub use self::interface::InterfaceDescriptor;
pub use self::setup::{ReqDirection, ReqRecipient, ReqType, Setup, SetupReq};

use crate::error::{Result, UsbError};

pub mod config;
pub mod device;
pub mod endpoint;
pub mod interface;
pub mod setup;

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DescriptorKind {
    None = 0,
    Device = 1,
    Configuration = 2,
    String = 3,
    Interface = 4,
    Endpoint = 5,
    DeviceQualifier = 6,
    OtherSpeedConfiguration = 7,
    InterfacePower = 8,
}

pub const DEVICE_DESCRIPTOR_LEN: u8 = 18;

pub const ENDP_ATTR_TY_MASK: u8 = 0x03;
pub const ENDP_ADDR_DIR_BIT: u8 = 0x80;
pub const ENDP_ADDR_NUM_MASK: u8 = 0x7F;

/// Feature selector for CLEAR_FEATURE on an endpoint.
pub const FEATURE_ENDPOINT_HALT: u16 = 0;

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EndpointTy {
    Ctrl = 0,
    Isoch = 1,
    Bulk = 2,
    Interrupt = 3,
}

impl EndpointTy {
    pub fn from_attributes(attributes: u8) -> Self {
        match attributes & ENDP_ATTR_TY_MASK {
            0 => Self::Ctrl,
            1 => Self::Isoch,
            2 => Self::Bulk,
            _ => Self::Interrupt,
        }
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct DescriptorBase {
    pub length: u8,
    pub kind: u8,
}

unsafe impl plain::Plain for DescriptorBase {}

/// Walks a blob of concatenated, length-prefixed descriptors.
///
/// A record that claims to be longer than what is left of the blob ends the walk. A zero-length
/// record can't be skipped over and is reported as an error.
pub struct DescriptorIter<'a> {
    bytes: &'a [u8],
}
impl<'a> DescriptorIter<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}
impl<'a> From<&'a [u8]> for DescriptorIter<'a> {
    fn from(slice: &'a [u8]) -> Self {
        Self::new(slice)
    }
}
impl<'a> Iterator for DescriptorIter<'a> {
    type Item = Result<(DescriptorBase, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        let desc = *plain::from_bytes::<DescriptorBase>(self.bytes).ok()?;
        if desc.length == 0 {
            self.bytes = &[];
            return Some(Err(UsbError::MalformedDescriptor("zero-length descriptor")));
        }
        if desc.length as usize > self.bytes.len() {
            log::warn!(
                "descriptor of type {:#x} truncated ({} > {} bytes)",
                desc.kind,
                desc.length,
                self.bytes.len()
            );
            self.bytes = &[];
            return None;
        }
        let (bytes_ret, rest) = self.bytes.split_at(desc.length as usize);
        self.bytes = rest;
        Some(Ok((desc, bytes_ret)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_records() {
        let blob = [3u8, 1, 0xAA, 2, 5, 4, 4, 0, 0];
        let records = DescriptorIter::new(&blob)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].0.kind, 1);
        assert_eq!(records[0].1, &[3, 1, 0xAA]);
        assert_eq!(records[1].0.kind, 5);
        assert_eq!(records[2].1.len(), 4);
    }

    #[test]
    fn zero_length_is_malformed() {
        let blob = [2u8, 1, 0, 4, 9, 9];
        let mut iter = DescriptorIter::new(&blob);
        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(
            iter.next(),
            Some(Err(UsbError::MalformedDescriptor(_)))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn truncated_record_ends_walk() {
        let blob = [2u8, 1, 9, 4, 0];
        let mut iter = DescriptorIter::new(&blob);
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().is_none());
    }

    #[test]
    fn endpoint_type_from_attributes() {
        assert_eq!(EndpointTy::from_attributes(0x02), EndpointTy::Bulk);
        assert_eq!(EndpointTy::from_attributes(0x83), EndpointTy::Interrupt);
        assert_eq!(EndpointTy::from_attributes(0x0D), EndpointTy::Isoch);
        assert_eq!(EndpointTy::from_attributes(0x00), EndpointTy::Ctrl);
    }
}
