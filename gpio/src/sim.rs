//! In-memory GPIO driver recording everything that happens on its lines.
//!
//! Claims, level changes, releases and the delays requested through [SimDelay] all land in one
//! shared, ordered event log. Nothing sleeps, so protocol timing can be asserted on the requested
//! durations instead of the wall clock.
//!
//! [SimGpioDriver::logging] keeps nothing and only writes each event to the `trace` log, for
//! running without hardware for as long as needed.
use crate::delay::Delay;
use crate::{GpioDriver, GpioError, GpioOutput, GpioResult};
use bitvec::vec::BitVec;
use log::trace;
use std::fmt::{Debug, Formatter};
use std::io::ErrorKind;
use std::sync::atomic::AtomicU8;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One recorded step of the simulated hardware.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SimEvent {
    /// The line was claimed as an output, driven low.
    Claim(usize),
    /// The line was driven to the given level.
    Level(usize, bool),
    /// A blocking delay of the given milliseconds was requested.
    Delay(u32),
    /// The line was released.
    Release(usize),
}

#[derive(Clone, Debug)]
struct EventLog {
    events: Arc<Mutex<Vec<SimEvent>>>,
    recording: bool,
}

impl EventLog {
    fn lock(&self) -> MutexGuard<'_, Vec<SimEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: SimEvent) {
        trace!("{:?}", event);
        if self.recording {
            self.lock().push(event);
        }
    }
}

pub struct SimGpioDriver {
    log: EventLog,
    used_pins: BitVec<AtomicU8>,
    failing_pins: BitVec<AtomicU8>,
}

impl SimGpioDriver {
    /// Creates a driver with `count` lines, numbered from 0, recording every event.
    pub fn new(count: usize) -> Self {
        Self::with_recording(count, true)
    }

    /// Creates a driver with `count` lines that only traces events and keeps none of them.
    ///
    /// [SimGpioDriver::events] stays empty, so nothing grows however long the driver runs.
    pub fn logging(count: usize) -> Self {
        Self::with_recording(count, false)
    }

    fn with_recording(count: usize, recording: bool) -> Self {
        Self {
            log: EventLog {
                events: Arc::default(),
                recording,
            },
            used_pins: BitVec::repeat(false, count),
            failing_pins: BitVec::repeat(false, count),
        }
    }

    /// Makes every later write to the line fail with `GpioError::Io`.
    ///
    /// Failed writes are not recorded. Claiming and releasing the line still work.
    pub fn fail_writes(&self, index: usize) {
        if index < self.failing_pins.len() {
            self.failing_pins.set_aliased(index, true);
        }
    }

    /// A delay source writing into this driver's event log.
    pub fn delay(&self) -> SimDelay {
        SimDelay {
            log: self.log.clone(),
        }
    }

    /// Returns a copy of all events recorded so far.
    pub fn events(&self) -> Vec<SimEvent> {
        self.log.lock().clone()
    }

    /// Forgets all recorded events.
    pub fn clear_events(&self) {
        self.log.lock().clear();
    }

    /// Whether the line is currently claimed.
    pub fn is_claimed(&self, index: usize) -> bool {
        self.used_pins.get(index).is_some_and(|bit| *bit)
    }

    /// The last level driven on the line, if it was ever claimed.
    pub fn level(&self, index: usize) -> Option<bool> {
        self.log.lock().iter().rev().find_map(|event| match *event {
            SimEvent::Level(pin, level) if pin == index => Some(level),
            SimEvent::Claim(pin) if pin == index => Some(false),
            _ => None,
        })
    }

    /// Replays the event log through a shift register wired to the given lines and returns the
    /// bytes it latched, in order.
    ///
    /// The first bit clocked in becomes bit 0 of the latched byte.
    pub fn latched_bytes(&self, serial_data: usize, shift_clock: usize, storage_clock: usize) -> Vec<u8> {
        let mut latched = Vec::new();
        let mut data = false;
        let mut shift = false;
        let mut storage = false;
        let mut bits: Vec<bool> = Vec::new();

        for event in self.log.lock().iter() {
            let SimEvent::Level(pin, level) = *event else {
                continue;
            };
            if pin == serial_data {
                data = level;
            } else if pin == shift_clock {
                if level && !shift {
                    bits.push(data);
                }
                shift = level;
            } else if pin == storage_clock {
                if level && !storage {
                    let byte = bits
                        .iter()
                        .rev()
                        .take(8)
                        .rev()
                        .enumerate()
                        .fold(0u8, |byte, (i, &bit)| byte | (u8::from(bit) << i));
                    latched.push(byte);
                    bits.clear();
                }
                storage = level;
            }
        }

        latched
    }
}

impl Debug for SimGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimGpioDriver({})", self.used_pins.len())
    }
}

impl GpioDriver for SimGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.used_pins.len())
    }

    fn claim_output(&self, index: usize) -> GpioResult<Box<dyn GpioOutput + '_>> {
        if index >= self.count()? {
            return Err(GpioError::InvalidPin(index));
        }

        if self.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        self.used_pins.set_aliased(index, true);
        self.log.push(SimEvent::Claim(index));

        Ok(Box::new(SimGpioOutput {
            driver: self,
            pin_index: index,
        }))
    }
}

struct SimGpioOutput<'a> {
    driver: &'a SimGpioDriver,
    pin_index: usize,
}

impl Debug for SimGpioOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}][output]", self.driver, self.pin_index)
    }
}

impl GpioOutput for SimGpioOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        if self.driver.failing_pins[self.pin_index] {
            return Err(GpioError::Io(ErrorKind::Other));
        }
        self.driver.log.push(SimEvent::Level(self.pin_index, value));
        Ok(())
    }
}

impl Drop for SimGpioOutput<'_> {
    fn drop(&mut self) {
        self.driver.log.push(SimEvent::Release(self.pin_index));
        self.driver.used_pins.set_aliased(self.pin_index, false);
    }
}

/// Records requested delays into the event log of a [SimGpioDriver] instead of sleeping.
#[derive(Clone)]
pub struct SimDelay {
    log: EventLog,
}

impl Debug for SimDelay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDelay")
    }
}

impl Delay for SimDelay {
    fn delay_ms(&self, ms: u32) {
        self.log.push(SimEvent::Delay(ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_rejects_out_of_range_and_reused_lines() {
        let gpio = SimGpioDriver::new(4);
        assert_eq!(gpio.claim_output(4).unwrap_err(), GpioError::InvalidPin(4));

        let output = gpio.claim_output(2).unwrap();
        assert!(gpio.is_claimed(2));
        assert_eq!(gpio.claim_output(2).unwrap_err(), GpioError::AlreadyInUse);

        drop(output);
        assert!(!gpio.is_claimed(2));
        assert!(gpio.claim_output(2).is_ok());
    }

    #[test]
    fn records_levels_and_delays_in_order() {
        let gpio = SimGpioDriver::new(4);
        let delay = gpio.delay();
        {
            let output = gpio.claim_output(1).unwrap();
            output.write(true).unwrap();
            delay.delay_ms(3);
            output.write(false).unwrap();
        }

        assert_eq!(
            gpio.events(),
            vec![
                SimEvent::Claim(1),
                SimEvent::Level(1, true),
                SimEvent::Delay(3),
                SimEvent::Level(1, false),
                SimEvent::Release(1),
            ]
        );
        assert_eq!(gpio.level(1), Some(false));
        assert_eq!(gpio.level(0), None);
    }

    #[test]
    fn decodes_latched_bytes() {
        let gpio = SimGpioDriver::new(3);
        let data = gpio.claim_output(0).unwrap();
        let shift = gpio.claim_output(1).unwrap();
        let storage = gpio.claim_output(2).unwrap();

        storage.write(false).unwrap();
        for bit in [true, false, false, false, false, false, true, false] {
            data.write(bit).unwrap();
            shift.write(true).unwrap();
            shift.write(false).unwrap();
        }
        storage.write(true).unwrap();

        assert_eq!(gpio.latched_bytes(0, 1, 2), vec![0b0100_0001]);
    }

    #[test]
    fn logging_driver_keeps_no_events() {
        let gpio = SimGpioDriver::logging(4);
        let delay = gpio.delay();
        for _ in 0..100 {
            let output = gpio.claim_output(3).unwrap();
            output.write(true).unwrap();
            delay.delay_ms(1);
        }

        assert!(gpio.events().is_empty());
        assert!(!gpio.is_claimed(3));
    }

    #[test]
    fn failing_line_rejects_writes_but_still_releases() {
        let gpio = SimGpioDriver::new(4);
        let output = gpio.claim_output(1).unwrap();
        gpio.fail_writes(1);

        assert_eq!(output.write(true), Err(GpioError::Io(ErrorKind::Other)));
        drop(output);

        assert!(!gpio.is_claimed(1));
        assert_eq!(gpio.events(), vec![SimEvent::Claim(1), SimEvent::Release(1)]);
    }
}
