use common::io::Io;

/// Raw register access to the chip: a command port, a data port and the status register.
///
/// The multi-byte operations exist so that slow links can batch transfers; they must behave
/// exactly like repeated single-byte calls.
pub trait Ch376Ports {
    fn write_command(&mut self, command: u8);
    fn write_data(&mut self, data: u8);
    fn read_data(&mut self) -> u8;
    fn read_status(&mut self) -> u8;
    /// Whether the chip is signalling a completed operation.
    fn int_is_active(&mut self) -> bool;

    fn read_multiple_data(&mut self, buffer: &mut [u8]) {
        for byte in buffer.iter_mut() {
            *byte = self.read_data();
        }
    }
    fn write_multiple_data(&mut self, data: &[u8]) {
        for &byte in data {
            self.write_data(byte);
        }
    }
}

/// Status register bit that is cleared while an interrupt is pending.
pub const STATUS_INT_INACTIVE: u8 = 1 << 7;

/// [Ch376Ports] over the two registers the chip exposes in parallel mode. Writes to the command
/// register issue a command; reads from it return the status register.
pub struct IoPorts<D, C> {
    data: D,
    command: C,
}

impl<D: Io, C: Io> IoPorts<D, C> {
    pub fn new(data: D, command: C) -> Self {
        Self { data, command }
    }
}

impl<D: Io, C: Io> Ch376Ports for IoPorts<D, C> {
    fn write_command(&mut self, command: u8) {
        self.command.write(command);
    }
    fn write_data(&mut self, data: u8) {
        self.data.write(data);
    }
    fn read_data(&mut self) -> u8 {
        self.data.read()
    }
    fn read_status(&mut self) -> u8 {
        self.command.read()
    }
    fn int_is_active(&mut self) -> bool {
        !self.command.readf(STATUS_INT_INACTIVE)
    }
}
