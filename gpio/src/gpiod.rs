//! Output-only GPIO driver on top of the Linux GPIO character device, using the gpiod library.
//!
//! Lines are requested from the kernel when claimed and handed back when the output is dropped,
//! so no other process can drive them meanwhile.
//!
//! A driver can span several chips. Lines are then numbered globally, in chip order: with four
//! 32-line chips, line 62 is line 30 of the second chip.
use crate::{GpioDriver, GpioError, GpioOutput, GpioResult};
use bitvec::vec::BitVec;
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::atomic::AtomicU8;

pub struct GpiodDriver {
    chips: Vec<gpiod::Chip>,
    used_pins: BitVec<AtomicU8>,
}

impl GpiodDriver {
    pub fn new(chips: Vec<gpiod::Chip>) -> Self {
        let n = chips.iter().map(|chip| chip.num_lines() as usize).sum();
        let bits = BitVec::repeat(false, n);
        Self {
            chips,
            used_pins: bits,
        }
    }

    /// Opens the chips at the given paths, e.g. `/dev/gpiochip0`, numbering their lines in that
    /// order.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> GpioResult<Self> {
        if paths.is_empty() {
            return Err(GpioError::InvalidArgument);
        }
        let chips = paths
            .iter()
            .map(|path| {
                let path: &Path = path.as_ref();
                gpiod::Chip::new(path)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(chips))
    }
}

/// Splits a global line number into a chip index and the line offset on that chip.
fn locate(lines_per_chip: impl IntoIterator<Item = usize>, index: usize) -> Option<(usize, u32)> {
    let mut first = 0;
    for (chip, lines) in lines_per_chip.into_iter().enumerate() {
        if index < first + lines {
            return u32::try_from(index - first).ok().map(|offset| (chip, offset));
        }
        first += lines;
    }
    None
}

impl Debug for GpiodDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.chips.iter().map(|chip| chip.name().to_string()).collect();
        write!(f, "GpiodDriver({})", names.join(", "))
    }
}

impl GpioDriver for GpiodDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.used_pins.len())
    }

    fn claim_output(&self, index: usize) -> GpioResult<Box<dyn GpioOutput + '_>> {
        let lines = self.chips.iter().map(|chip| chip.num_lines() as usize);
        let Some((chip, offset)) = locate(lines, index) else {
            return Err(GpioError::InvalidPin(index));
        };

        if self.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        let line = self.chips[chip]
            .request_lines(gpiod::Options::output([offset]).consumer(env!("CARGO_PKG_NAME")))?;
        line.set_values([false])?;

        self.used_pins.set_aliased(index, true);

        Ok(Box::new(GpiodOutput {
            driver: self,
            pin_index: index,
            line,
        }))
    }
}

struct GpiodOutput<'a> {
    driver: &'a GpiodDriver,
    pin_index: usize,
    line: gpiod::Lines<gpiod::Output>,
}

impl Debug for GpiodOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}][output]", self.driver, self.pin_index)
    }
}

impl GpioOutput for GpiodOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.line.set_values([value])?;
        Ok(())
    }
}

impl Drop for GpiodOutput<'_> {
    fn drop(&mut self) {
        self.driver.used_pins.set_aliased(self.pin_index, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_numbers_span_chips_in_order() {
        let banks = [32, 32, 32, 32];

        assert_eq!(locate(banks, 0), Some((0, 0)));
        assert_eq!(locate(banks, 31), Some((0, 31)));
        assert_eq!(locate(banks, 62), Some((1, 30)));
        assert_eq!(locate(banks, 86), Some((2, 22)));
        assert_eq!(locate(banks, 127), Some((3, 31)));
        assert_eq!(locate(banks, 128), None);
    }

    #[test]
    fn uneven_chips_are_numbered_back_to_back() {
        assert_eq!(locate([54, 8], 53), Some((0, 53)));
        assert_eq!(locate([54, 8], 54), Some((1, 0)));
        assert_eq!(locate([54, 8], 62), None);
        assert_eq!(locate(std::iter::empty(), 0), None);
    }
}
