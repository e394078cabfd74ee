//! Byte-wide registers of parallel-bus peripherals.

/// One byte-wide register.
///
/// Reads take `&mut self` because reading a data register usually consumes the byte.
pub trait Io {
    fn read(&mut self) -> u8;
    fn write(&mut self, value: u8);

    /// Whether all of `flags` are set.
    #[inline(always)]
    fn readf(&mut self, flags: u8) -> bool {
        self.read() & flags == flags
    }
}

impl<I: Io + ?Sized> Io for &mut I {
    #[inline(always)]
    fn read(&mut self) -> u8 {
        (**self).read()
    }
    #[inline(always)]
    fn write(&mut self, value: u8) {
        (**self).write(value)
    }
}
