use plain::Plain;

/// Header of the configuration descriptor set. Interface and endpoint records follow it.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigDescriptor {
    pub length: u8,
    pub kind: u8,
    pub total_length: u16,
    pub interfaces: u8,
    pub configuration_value: u8,
    pub configuration_str: u8,
    pub attributes: u8,
    pub max_power: u8,
}

unsafe impl Plain for ConfigDescriptor {}

impl ConfigDescriptor {
    /// Length of the whole set, limited to what was actually received.
    pub fn received_len(&self, received: usize) -> usize {
        usize::from(u16::from_le(self.total_length)).min(received)
    }
}
