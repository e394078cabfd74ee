//! UFI floppy drives over the CBI mass storage transport, on top of the `ch376` USB host.

pub mod config;
pub mod dpb;
pub mod drive;
pub mod protocol;
pub mod sense;
pub mod ufi;

pub use config::UfiConfig;
pub use dpb::Dpb;
pub use drive::{DiskParameters, UfiDrive};
pub use protocol::cbi::CbiTransport;
pub use protocol::{CbiCommandResult, Protocol, ProtocolError};
pub use sense::{DiskError, SenseCode};
