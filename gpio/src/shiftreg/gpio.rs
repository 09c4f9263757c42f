use std::fmt::{Debug, Formatter};
use log::trace;
use crate::{GpioOutput, GpioResult};
use crate::shiftreg::ShiftRegister;

/// A 595-style shift register bit-banged over three GPIO outputs.
///
/// Bits are shifted in LSb first, one shift clock pulse per bit, and latched with a rising edge of
/// the storage clock. There are no delays between transitions.
pub struct GpioShiftRegister<'a> {
    serial_data: &'a dyn GpioOutput,
    shift_clock: &'a dyn GpioOutput,
    storage_clock: &'a dyn GpioOutput,
}

impl Debug for GpioShiftRegister<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GpioShiftRegister({:?}, {:?}, {:?})",
            self.serial_data, self.shift_clock, self.storage_clock
        )
    }
}

impl<'a> GpioShiftRegister<'a> {
    pub fn new(
        serial_data: &'a dyn GpioOutput,
        shift_clock: &'a dyn GpioOutput,
        storage_clock: &'a dyn GpioOutput,
    ) -> Self {
        GpioShiftRegister {
            serial_data,
            shift_clock,
            storage_clock,
        }
    }
}

impl ShiftRegister for GpioShiftRegister<'_> {
    fn send_byte(&self, byte: u8) -> GpioResult<()> {
        trace!("Shifting out: {:08b}", byte);

        // Hold the outputs while shifting
        self.storage_clock.write(false)?;

        for i in 0..8 {
            self.serial_data.write((byte >> i) & 1 == 1)?;
            self.shift_clock.write(true)?;
            self.shift_clock.write(false)?;
        }

        // Latch
        self.storage_clock.write(true)?;
        Ok(())
    }
}
