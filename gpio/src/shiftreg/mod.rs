mod gpio;

use std::fmt::Debug;
use crate::GpioResult;
pub use gpio::*;

/// A serial-in, parallel-out shift register.
pub trait ShiftRegister: Debug {
    /// Shifts `byte` in and latches it onto the parallel outputs.
    ///
    /// The parallel outputs keep their previous value until the whole byte is shifted in.
    fn send_byte(&self, byte: u8) -> GpioResult<()>;
}
