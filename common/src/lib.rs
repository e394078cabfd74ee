//! Plumbing shared by the USB host and storage drivers: register access and time.

pub mod io;
pub mod timeout;
