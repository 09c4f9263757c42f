//! Logical pin roles of the LCD + shift register wiring, and their lifecycle.
use crate::shiftreg::GpioShiftRegister;
use crate::{GpioDriver, GpioError, GpioOutput, GpioResult};
use log::{debug, warn};
use std::fmt::{Debug, Formatter};

/// The lines the LCD bus is built from.
///
/// The first three go straight to the LCD, the last three drive the shift register that feeds the
/// LCD data bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LogicalPin {
    /// LCD register select. Low for commands, high for character data.
    RegisterSelect,
    /// LCD read/write.
    ReadWrite,
    /// LCD enable strobe.
    Enable,
    /// Shift register serial input.
    SerialData,
    /// Shift register shift clock, one pulse per bit.
    ShiftClock,
    /// Shift register storage clock, latches the shifted byte onto the parallel outputs.
    StorageClock,
}

impl LogicalPin {
    /// All roles, in claim order.
    pub const ALL: [LogicalPin; 6] = [
        LogicalPin::RegisterSelect,
        LogicalPin::ReadWrite,
        LogicalPin::Enable,
        LogicalPin::SerialData,
        LogicalPin::ShiftClock,
        LogicalPin::StorageClock,
    ];

    /// The roles driving the shift register alone.
    pub const SHIFT_REGISTER: [LogicalPin; 3] = [
        LogicalPin::SerialData,
        LogicalPin::ShiftClock,
        LogicalPin::StorageClock,
    ];
}

/// Physical line numbers for every [LogicalPin].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinMap {
    pub register_select: usize,
    pub read_write: usize,
    pub enable: usize,
    pub serial_data: usize,
    pub shift_clock: usize,
    pub storage_clock: usize,
}

impl PinMap {
    pub fn get(&self, pin: LogicalPin) -> usize {
        match pin {
            LogicalPin::RegisterSelect => self.register_select,
            LogicalPin::ReadWrite => self.read_write,
            LogicalPin::Enable => self.enable,
            LogicalPin::SerialData => self.serial_data,
            LogicalPin::ShiftClock => self.shift_clock,
            LogicalPin::StorageClock => self.storage_clock,
        }
    }

    /// The first of `roles` mapped to a line a driver with `count` lines doesn't have.
    pub fn first_out_of_range(&self, roles: &[LogicalPin], count: usize) -> Option<(LogicalPin, usize)> {
        roles
            .iter()
            .map(|&pin| (pin, self.get(pin)))
            .find(|&(_, index)| index >= count)
    }
}

impl Default for PinMap {
    fn default() -> Self {
        PinMap {
            register_select: 62,
            read_write: 86,
            enable: 79,
            serial_data: 70,
            shift_clock: 73,
            storage_clock: 76,
        }
    }
}

/// Lines claimed as outputs, by role.
///
/// Either every requested line is claimed or none is: a failed claim releases the lines claimed
/// before it. [PinSet::release] consumes the set, so every line is released exactly once.
pub struct PinSet<'a> {
    map: PinMap,
    outputs: Vec<(LogicalPin, Box<dyn GpioOutput + 'a>)>,
}

impl<'a> PinSet<'a> {
    /// Claims all six lines.
    pub fn claim(gpio: &'a dyn GpioDriver, map: PinMap) -> GpioResult<Self> {
        Self::claim_only(gpio, map, &LogicalPin::ALL)
    }

    /// Claims the lines of `roles`, in that order.
    pub fn claim_only(gpio: &'a dyn GpioDriver, map: PinMap, roles: &[LogicalPin]) -> GpioResult<Self> {
        let mut outputs = Vec::with_capacity(roles.len());

        for &pin in roles {
            let index = map.get(pin);
            match gpio.claim_output(index) {
                Ok(output) => {
                    debug!("Claimed {:?} on pin {}", pin, index);
                    outputs.push((pin, output));
                }
                Err(err) => {
                    warn!("Failed to claim {:?} on pin {}: {}", pin, index, err);
                    Self::release_outputs(&map, outputs);
                    return Err(err);
                }
            }
        }

        Ok(PinSet { map, outputs })
    }

    pub fn map(&self) -> &PinMap {
        &self.map
    }

    /// # Errors
    /// - `GpioError::InvalidArgument` if the role wasn't claimed.
    pub fn output(&self, pin: LogicalPin) -> GpioResult<&dyn GpioOutput> {
        for (role, output) in &self.outputs {
            if *role == pin {
                return Ok(&**output);
            }
        }
        Err(GpioError::InvalidArgument)
    }

    pub fn set_level(&self, pin: LogicalPin, high: bool) -> GpioResult<()> {
        self.output(pin)?.write(high)
    }

    /// The shift register wired to the serial data, shift clock and storage clock lines.
    pub fn shift_register(&self) -> GpioResult<GpioShiftRegister<'_>> {
        Ok(GpioShiftRegister::new(
            self.output(LogicalPin::SerialData)?,
            self.output(LogicalPin::ShiftClock)?,
            self.output(LogicalPin::StorageClock)?,
        ))
    }

    /// Drives every line low and releases it.
    ///
    /// Best effort: a line that can't be driven low is still released.
    pub fn release(self) {
        Self::release_outputs(&self.map, self.outputs);
    }

    fn release_outputs(map: &PinMap, outputs: Vec<(LogicalPin, Box<dyn GpioOutput + 'a>)>) {
        for (pin, output) in outputs.into_iter().rev() {
            if let Err(err) = output.write(false) {
                warn!("Failed to drive {:?} low: {}", pin, err);
            }
            drop(output);
            debug!("Released {:?} on pin {}", pin, map.get(pin));
        }
    }
}

impl Debug for PinSet<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PinSet({:?})", self.map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shiftreg::ShiftRegister;
    use crate::sim::{SimEvent, SimGpioDriver};

    fn small_map() -> PinMap {
        PinMap {
            register_select: 0,
            read_write: 1,
            enable: 2,
            serial_data: 3,
            shift_clock: 4,
            storage_clock: 5,
        }
    }

    #[test]
    fn claims_in_role_order() {
        let gpio = SimGpioDriver::new(8);
        let pins = PinSet::claim(&gpio, small_map()).unwrap();

        assert_eq!(
            gpio.events(),
            (0..6).map(SimEvent::Claim).collect::<Vec<_>>()
        );
        pins.set_level(LogicalPin::Enable, true).unwrap();
        assert_eq!(gpio.level(2), Some(true));
    }

    #[test]
    fn release_drives_low_then_frees_every_line() {
        let gpio = SimGpioDriver::new(8);
        let pins = PinSet::claim(&gpio, small_map()).unwrap();
        gpio.clear_events();

        pins.release();

        let events = gpio.events();
        assert_eq!(events.len(), 12);
        for index in 0..6 {
            let low = events.iter().position(|e| *e == SimEvent::Level(index, false)).unwrap();
            let released = events.iter().position(|e| *e == SimEvent::Release(index)).unwrap();
            assert_eq!(released, low + 1);
            assert!(!gpio.is_claimed(index));
        }
    }

    #[test]
    fn failed_claim_releases_what_was_claimed() {
        let gpio = SimGpioDriver::new(8);
        let map = PinMap {
            serial_data: 42,
            ..small_map()
        };

        let err = PinSet::claim(&gpio, map).unwrap_err();
        assert_eq!(err, GpioError::InvalidPin(42));

        assert_eq!(
            gpio.events(),
            vec![
                SimEvent::Claim(0),
                SimEvent::Claim(1),
                SimEvent::Claim(2),
                SimEvent::Level(2, false),
                SimEvent::Release(2),
                SimEvent::Level(1, false),
                SimEvent::Release(1),
                SimEvent::Level(0, false),
                SimEvent::Release(0),
            ]
        );
        for index in 0..8 {
            assert!(!gpio.is_claimed(index));
        }
    }

    #[test]
    fn duplicate_line_in_map_is_rejected() {
        let gpio = SimGpioDriver::new(8);
        let map = PinMap {
            storage_clock: 0,
            ..small_map()
        };

        assert_eq!(PinSet::claim(&gpio, map).unwrap_err(), GpioError::AlreadyInUse);
        assert!(!gpio.is_claimed(0));
    }

    #[test]
    fn release_frees_every_line_even_if_one_cannot_be_driven_low() {
        let gpio = SimGpioDriver::new(8);
        let pins = PinSet::claim(&gpio, small_map()).unwrap();
        gpio.fail_writes(3);
        gpio.clear_events();

        pins.release();

        let events = gpio.events();
        assert!(!events.contains(&SimEvent::Level(3, false)));
        for index in 0..6 {
            assert!(events.contains(&SimEvent::Release(index)));
            assert!(!gpio.is_claimed(index));
        }
        assert_eq!(events.len(), 11);
    }

    #[test]
    fn claim_only_takes_the_requested_roles() {
        let gpio = SimGpioDriver::new(8);
        let pins = PinSet::claim_only(&gpio, small_map(), &LogicalPin::SHIFT_REGISTER).unwrap();

        assert_eq!(
            gpio.events(),
            vec![SimEvent::Claim(3), SimEvent::Claim(4), SimEvent::Claim(5)]
        );
        assert_eq!(pins.set_level(LogicalPin::Enable, true), Err(GpioError::InvalidArgument));

        pins.shift_register().unwrap().send_byte(0x5A).unwrap();
        assert_eq!(gpio.latched_bytes(3, 4, 5), vec![0x5A]);
    }

    #[test]
    fn reference_wiring_needs_more_than_58_lines() {
        let map = PinMap::default();

        assert_eq!(
            map.first_out_of_range(&LogicalPin::ALL, 58),
            Some((LogicalPin::RegisterSelect, 62))
        );
        assert_eq!(
            map.first_out_of_range(&LogicalPin::SHIFT_REGISTER, 72),
            Some((LogicalPin::ShiftClock, 73))
        );
        assert_eq!(map.first_out_of_range(&LogicalPin::ALL, 128), None);
    }
}
