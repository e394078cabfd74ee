use serde::Deserialize;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
pub struct DeviceId {
    pub vendor: u16,
    pub product: u16,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct UfiConfig {
    /// Logical unit stamped into every command block.
    pub lun: u8,
    /// Maximum number of times a command is reissued after a transient sense code. Unbounded
    /// when absent.
    pub command_retry_limit: Option<u32>,
    /// Devices that speak CBI/UFI but report a different interface class. Their first interface
    /// is used as is.
    pub class_check_exceptions: Vec<DeviceId>,
}

impl Default for UfiConfig {
    fn default() -> Self {
        Self {
            lun: 0,
            command_retry_limit: None,
            class_check_exceptions: vec![DeviceId {
                vendor: 0x0644,
                product: 0x0001,
            }],
        }
    }
}

impl UfiConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn is_class_check_exception(&self, vendor: u16, product: u16) -> bool {
        self.class_check_exceptions
            .iter()
            .any(|id| id.vendor == vendor && id.product == product)
    }
}
