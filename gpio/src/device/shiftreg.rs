use crate::device::{CancelToken, DeviceResult, SessionGate};
use crate::pins::PinSet;
use crate::shiftreg::ShiftRegister;
use log::{debug, info};
use std::fmt::{Debug, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};

struct RegisterState<'a> {
    pins: PinSet<'a>,
    latched: Option<u8>,
}

/// The shift register on its own: every write latches one raw byte onto its parallel outputs.
///
/// Has its own gate, independent of any [LcdDevice](crate::device::LcdDevice).
pub struct ShiftRegDevice<'a> {
    gate: SessionGate,
    state: Mutex<RegisterState<'a>>,
}

impl<'a> ShiftRegDevice<'a> {
    /// Wraps the serial data, shift clock and storage clock lines of `pins`.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if one of them wasn't claimed.
    pub fn start(pins: PinSet<'a>) -> DeviceResult<Self> {
        pins.shift_register()?;
        info!("Shift register device started on {:?}.", pins);

        Ok(ShiftRegDevice {
            gate: SessionGate::new(),
            state: Mutex::new(RegisterState {
                pins,
                latched: None,
            }),
        })
    }

    /// Opens a session, waiting for the current one to close.
    ///
    /// # Errors
    /// - `DeviceError::Interrupted` if `cancel` fires while waiting.
    pub fn open(&self, cancel: &CancelToken) -> DeviceResult<RegisterSession<'_, 'a>> {
        if let Err(err) = self.gate.acquire(cancel) {
            info!("Could not lock shift register during open: {}", err);
            return Err(err);
        }
        info!("Shift register opened.");
        Ok(RegisterSession { device: self })
    }

    /// # Errors
    /// - `DeviceError::Busy` if a session is open.
    pub fn try_open(&self) -> DeviceResult<RegisterSession<'_, 'a>> {
        self.gate.try_acquire()?;
        info!("Shift register opened.");
        Ok(RegisterSession { device: self })
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.gate.cancel_token()
    }

    pub fn is_open(&self) -> bool {
        self.gate.is_held()
    }

    /// Hands the lines back, e.g. to release them.
    pub fn stop(self) -> PinSet<'a> {
        info!("Shift register device stopped.");
        self.state.into_inner().unwrap_or_else(PoisonError::into_inner).pins
    }

    fn state(&self) -> MutexGuard<'_, RegisterState<'a>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Debug for ShiftRegDevice<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ShiftRegDevice({:?})", self.gate)
    }
}

/// An open session on a [ShiftRegDevice].
pub struct RegisterSession<'s, 'a> {
    device: &'s ShiftRegDevice<'a>,
}

impl RegisterSession<'_, '_> {
    /// Latches the first byte of `input` and returns it. Empty input sends nothing.
    pub fn write(&self, input: &[u8]) -> DeviceResult<Option<u8>> {
        let Some(&byte) = input.first() else {
            return Ok(None);
        };

        debug!("Latching {:#04x}", byte);
        let mut state = self.device.state();
        state.pins.shift_register()?.send_byte(byte)?;
        state.latched = Some(byte);
        Ok(Some(byte))
    }

    /// The byte latched last, if any.
    pub fn read(&self) -> Option<u8> {
        debug!("Reading from shift register...");
        self.device.state().latched
    }

    pub fn close(self) {}
}

impl Drop for RegisterSession<'_, '_> {
    fn drop(&mut self) {
        self.device.gate.release();
        info!("Closing shift register.");
    }
}

impl Debug for RegisterSession<'_, '_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RegisterSession({:?})", self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;
    use crate::pins::{LogicalPin, PinMap};
    use crate::sim::SimGpioDriver;
    use crate::GpioError;

    fn latched(gpio: &SimGpioDriver) -> Vec<u8> {
        let map = PinMap::default();
        gpio.latched_bytes(map.serial_data, map.shift_clock, map.storage_clock)
    }

    #[test]
    fn write_latches_the_first_byte_only() {
        let gpio = SimGpioDriver::new(128);
        let pins = PinSet::claim_only(&gpio, PinMap::default(), &LogicalPin::SHIFT_REGISTER).unwrap();
        let device = ShiftRegDevice::start(pins).unwrap();

        let session = device.try_open().unwrap();
        assert_eq!(session.read(), None);
        assert_eq!(session.write(b"\xA5rest"), Ok(Some(0xA5)));
        assert_eq!(session.write(b""), Ok(None));

        assert_eq!(latched(&gpio), vec![0xA5]);
        assert_eq!(session.read(), Some(0xA5));
    }

    #[test]
    fn lcd_lines_stay_untouched() {
        let gpio = SimGpioDriver::new(128);
        let pins = PinSet::claim_only(&gpio, PinMap::default(), &LogicalPin::SHIFT_REGISTER).unwrap();
        let device = ShiftRegDevice::start(pins).unwrap();

        device.try_open().unwrap().write(b"x").unwrap();

        let map = PinMap::default();
        for pin in [LogicalPin::RegisterSelect, LogicalPin::ReadWrite, LogicalPin::Enable] {
            assert!(!gpio.is_claimed(map.get(pin)));
            assert_eq!(gpio.level(map.get(pin)), None);
        }
    }

    #[test]
    fn one_session_at_a_time() {
        let gpio = SimGpioDriver::new(128);
        let pins = PinSet::claim_only(&gpio, PinMap::default(), &LogicalPin::SHIFT_REGISTER).unwrap();
        let device = ShiftRegDevice::start(pins).unwrap();

        let session = device.try_open().unwrap();
        assert!(matches!(device.try_open(), Err(DeviceError::Busy)));
        session.close();
        assert!(!device.is_open());
        assert!(device.try_open().is_ok());
    }

    #[test]
    fn start_needs_the_shift_register_lines() {
        let gpio = SimGpioDriver::new(128);
        let pins = PinSet::claim_only(&gpio, PinMap::default(), &[LogicalPin::SerialData]).unwrap();

        assert_eq!(
            ShiftRegDevice::start(pins).unwrap_err(),
            DeviceError::Gpio(GpioError::InvalidArgument)
        );
        // The rejected set was dropped, which frees its line
        assert!(!gpio.is_claimed(PinMap::default().serial_data));
    }

    #[test]
    fn stop_returns_the_lines_for_release() {
        let gpio = SimGpioDriver::new(128);
        let pins = PinSet::claim_only(&gpio, PinMap::default(), &LogicalPin::SHIFT_REGISTER).unwrap();
        let device = ShiftRegDevice::start(pins).unwrap();

        device.stop().release();

        let map = PinMap::default();
        for pin in LogicalPin::SHIFT_REGISTER {
            assert!(!gpio.is_claimed(map.get(pin)));
        }
    }
}
