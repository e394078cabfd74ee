use serde::Deserialize;

/// Host-side settings. Every field has a default, so an empty document is a valid config.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    /// The address assigned to the device during enumeration.
    pub device_address: u8,
    /// How many times to poll for the first 8 bytes of the device descriptor before giving up.
    /// Unbounded when absent.
    pub descriptor_poll_limit: Option<u32>,
    pub ch376: Ch376Config,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            device_address: 1,
            descriptor_poll_limit: None,
            ch376: Ch376Config::default(),
        }
    }
}

impl HostConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Ch376Config {
    pub nak_retry_delay_ms: u64,
    /// Maximum number of NAKs tolerated for a single token before reporting a timeout.
    /// Unbounded when absent.
    pub nak_retry_limit: Option<u32>,
    /// How long to wait for the chip to raise its interrupt line. Unbounded when absent.
    pub int_wait_timeout_ms: Option<u64>,
    pub bus_reset_delay_ms: u64,
    pub reset_delay_ms: u64,
    pub use_hardware_shortcuts: bool,
}

impl Default for Ch376Config {
    fn default() -> Self {
        Self {
            nak_retry_delay_ms: 1,
            nak_retry_limit: None,
            int_wait_timeout_ms: None,
            bus_reset_delay_ms: 35,
            reset_delay_ms: 50,
            use_hardware_shortcuts: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = HostConfig::from_toml_str("").unwrap();
        assert_eq!(config, HostConfig::default());
        assert_eq!(config.device_address, 1);
        assert!(config.ch376.use_hardware_shortcuts);
    }

    #[test]
    fn partial_tables_are_merged_with_defaults() {
        let config = HostConfig::from_toml_str(
            r#"
            device_address = 3
            descriptor_poll_limit = 10

            [ch376]
            nak_retry_limit = 500
            use_hardware_shortcuts = false
            "#,
        )
        .unwrap();
        assert_eq!(config.device_address, 3);
        assert_eq!(config.descriptor_poll_limit, Some(10));
        assert_eq!(config.ch376.nak_retry_limit, Some(500));
        assert_eq!(config.ch376.nak_retry_delay_ms, 1);
        assert_eq!(config.ch376.bus_reset_delay_ms, 35);
        assert!(!config.ch376.use_hardware_shortcuts);
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(HostConfig::from_toml_str("device_address = \"one\"").is_err());
    }
}
