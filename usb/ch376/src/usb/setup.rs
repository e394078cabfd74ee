use super::{DescriptorKind, FEATURE_ENDPOINT_HALT};
use crate::driver_interface::EndpDirection;

/// An 8-byte control request, as sent in the SETUP stage.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Setup {
    pub kind: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

unsafe impl plain::Plain for Setup {}

#[repr(u8)]
pub enum ReqDirection {
    HostToDevice = 0,
    DeviceToHost = 1,
}

#[repr(u8)]
pub enum ReqType {
    /// Standard device requests, such as SET_ADDRESS and SET_CONFIGURATION.
    Standard = 0,

    /// Class specific requests, such as the mass storage ADSC.
    Class = 1,

    /// Vendor specific requests.
    Vendor = 2,

    /// Reserved
    Reserved = 3,
}

#[repr(u8)]
pub enum ReqRecipient {
    Device = 0,
    Interface = 1,
    Endpoint = 2,
    Other = 3,
    // 4..=30 are reserved
    VendorSpecific = 31,
}

#[repr(u8)]
pub enum SetupReq {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    SetAddress = 0x05,
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    SetConfiguration = 0x09,
    GetInterface = 0x0A,
    SetInterface = 0x0B,
    SynchFrame = 0x0C,
}

pub const USB_SETUP_DIR_BIT: u8 = 1 << 7;
pub const USB_SETUP_DIR_SHIFT: u8 = 7;
pub const USB_SETUP_REQ_TY_MASK: u8 = 0x60;
pub const USB_SETUP_REQ_TY_SHIFT: u8 = 5;
pub const USB_SETUP_RECIPIENT_MASK: u8 = 0x1F;
pub const USB_SETUP_RECIPIENT_SHIFT: u8 = 0;

pub const SETUP_LEN: usize = 8;

const fn lo(word: u16) -> u8 {
    word as u8
}
const fn hi(word: u16) -> u8 {
    (word >> 8) as u8
}
const fn with_lo(word: u16, byte: u8) -> u16 {
    (word & 0xFF00) | byte as u16
}
const fn with_hi(word: u16, byte: u8) -> u16 {
    (word & 0x00FF) | ((byte as u16) << 8)
}

impl Setup {
    /// Builds a request of the given type, recipient and direction.
    pub const fn new(
        direction: ReqDirection,
        ty: ReqType,
        recipient: ReqRecipient,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> Self {
        Self {
            kind: ((direction as u8) << USB_SETUP_DIR_SHIFT)
                | ((ty as u8) << USB_SETUP_REQ_TY_SHIFT)
                | ((recipient as u8) << USB_SETUP_RECIPIENT_SHIFT),
            request,
            value,
            index,
            length,
        }
    }

    pub fn direction(&self) -> EndpDirection {
        if self.kind & USB_SETUP_DIR_BIT == 0 {
            EndpDirection::Out
        } else {
            EndpDirection::In
        }
    }
    pub const fn req_ty(&self) -> u8 {
        (self.kind & USB_SETUP_REQ_TY_MASK) >> USB_SETUP_REQ_TY_SHIFT
    }
    pub const fn req_recipient(&self) -> u8 {
        (self.kind & USB_SETUP_RECIPIENT_MASK) >> USB_SETUP_RECIPIENT_SHIFT
    }

    pub const fn value_lo(&self) -> u8 {
        lo(self.value)
    }
    pub const fn value_hi(&self) -> u8 {
        hi(self.value)
    }
    pub fn set_value_lo(&mut self, byte: u8) {
        self.value = with_lo(self.value, byte);
    }
    pub fn set_value_hi(&mut self, byte: u8) {
        self.value = with_hi(self.value, byte);
    }
    pub const fn index_lo(&self) -> u8 {
        lo(self.index)
    }
    pub const fn index_hi(&self) -> u8 {
        hi(self.index)
    }
    pub fn set_index_lo(&mut self, byte: u8) {
        self.index = with_lo(self.index, byte);
    }
    pub fn set_index_hi(&mut self, byte: u8) {
        self.index = with_hi(self.index, byte);
    }
    pub const fn length_lo(&self) -> u8 {
        lo(self.length)
    }
    pub const fn length_hi(&self) -> u8 {
        hi(self.length)
    }
    pub fn set_length_lo(&mut self, byte: u8) {
        self.length = with_lo(self.length, byte);
    }
    pub fn set_length_hi(&mut self, byte: u8) {
        self.length = with_hi(self.length, byte);
    }

    /// Wire layout, all 16-bit fields little-endian.
    pub const fn to_bytes(&self) -> [u8; SETUP_LEN] {
        [
            self.kind,
            self.request,
            self.value_lo(),
            self.value_hi(),
            self.index_lo(),
            self.index_hi(),
            self.length_lo(),
            self.length_hi(),
        ]
    }

    pub const fn from_bytes(bytes: [u8; SETUP_LEN]) -> Self {
        Self {
            kind: bytes[0],
            request: bytes[1],
            value: u16::from_le_bytes([bytes[2], bytes[3]]),
            index: u16::from_le_bytes([bytes[4], bytes[5]]),
            length: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    pub const fn clear_endpoint_halt(endpoint_address: u8) -> Self {
        Self::new(
            ReqDirection::HostToDevice,
            ReqType::Standard,
            ReqRecipient::Endpoint,
            SetupReq::ClearFeature as u8,
            FEATURE_ENDPOINT_HALT,
            endpoint_address as u16,
            0,
        )
    }

    pub const fn set_address(address: u16) -> Self {
        Self {
            kind: 0b0000_0000,
            request: 0x05,
            value: address,
            index: 0,
            length: 0,
        }
    }

    pub const fn get_descriptor(
        kind: DescriptorKind,
        index: u8,
        language: u16,
        length: u16,
    ) -> Self {
        Self {
            kind: 0b1000_0000,
            request: 0x06,
            value: ((kind as u16) << 8) | (index as u16),
            index: language,
            length,
        }
    }

    pub const fn set_configuration(value: u8) -> Self {
        Self {
            kind: 0b0000_0000,
            request: 0x09,
            value: value as u16,
            index: 0,
            length: 0,
        }
    }
}
