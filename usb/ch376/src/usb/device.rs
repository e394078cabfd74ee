//! The "Device" USB descriptor (USB 2.0 section 9.6.1).

/// A USB Device Descriptor.
///
/// Provides information that applies globally to the device and all of its configurations. A
/// given device only has one device descriptor.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceDescriptor {
    /// The length of this descriptor in bytes (bLength), always 18.
    pub length: u8,
    /// The descriptor type (bDescriptorType). See [super::DescriptorKind]
    pub kind: u8,
    /// The USB standard version in binary-coded decimal (bcdUSB).
    pub usb: u16,
    /// The USB class code (bDeviceClass).
    ///
    /// A value of FF indicates a vendor-specific class. A value of 0 indicates that all the
    /// interfaces in a configuration provide their own class information.
    pub class: u8,
    /// bDeviceSubClass
    pub sub_class: u8,
    /// bDeviceProtocol
    pub protocol: u8,
    /// The maximum packet size for endpoint 0 (bMaxPacketSize0).
    pub packet_size: u8,
    /// idVendor
    pub vendor: u16,
    /// idProduct
    pub product: u16,
    /// The device release number in binary-coded decimal (bcdDevice).
    pub release: u16,
    /// Index of the string descriptor describing the manufacturer (iManufacturer).
    pub manufacturer_str: u8,
    /// iProduct
    pub product_str: u8,
    /// iSerialNumber
    pub serial_str: u8,
    /// bNumConfigurations
    pub configurations: u8,
}

unsafe impl plain::Plain for DeviceDescriptor {}

/// The first 8 bytes of a [DeviceDescriptor].
///
/// This is what gets requested before the endpoint 0 packet size is known.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceDescriptor8Byte {
    pub length: u8,
    pub kind: u8,
    pub usb: u16,
    pub class: u8,
    pub sub_class: u8,
    pub protocol: u8,
    pub packet_size: u8,
}

unsafe impl plain::Plain for DeviceDescriptor8Byte {}
