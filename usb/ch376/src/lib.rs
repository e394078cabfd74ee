//! Software USB host built on the CH376 command/data register interface.
//!
//! The layering goes from the raw register access ([ch376::Ch376Ports]), through the packet
//! engine ([ch376::Ch376], an implementation of [UsbHostHardware]), to the device enumerator
//! and the [UsbHost] facade that class drivers talk to.

pub extern crate serde;
pub extern crate smallvec;

pub mod ch376;
pub mod config;
pub mod driver_interface;
pub mod enumerator;
pub mod error;
pub mod host;
pub mod usb;

pub use config::{Ch376Config, HostConfig};
pub use driver_interface::*;
pub use error::UsbError;
pub use host::UsbHost;
