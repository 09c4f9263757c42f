//! The LCD as a single-user device: open a session, write text to it, read back what it shows.
//!
//! ```text
//! write("Hi")    -> "Hi" shown and buffered
//! write("*ABC")  -> display cleared, "ABC" ignored
//! ```
//!
//! Only the first [CAPACITY] characters since the last clear are shown; the rest are dropped
//! without an error.
//!
//! [ShiftRegDevice] drives the shift register alone, one raw byte per write.
mod buffer;
mod session;
mod shiftreg;

use crate::lcd::driver::LcdDriver;
use crate::GpioError;
pub use buffer::*;
use log::{debug, info, warn};
pub use session::*;
pub use shiftreg::*;
use std::fmt::{Debug, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Leading character of a write that clears the display instead of printing.
pub const CLEAR_SENTINEL: u8 = b'*';

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum DeviceError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] GpioError),
    #[error("device is busy")]
    Busy,
    #[error("interrupted while waiting for the device")]
    Interrupted,
    #[error("cancel token belongs to another device")]
    ForeignCancelToken,
    #[error("resources exhausted: {0}")]
    ResourceExhausted(String),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Outcome of one write request.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct WriteReport {
    /// The request started with [CLEAR_SENTINEL] and the display was cleared.
    pub cleared: bool,
    /// Characters printed and buffered.
    pub displayed: usize,
    /// Characters dropped because the buffer was full.
    pub dropped: usize,
}

struct DeviceState<D> {
    driver: D,
    buffer: DisplayBuffer,
}

impl<D: LcdDriver> DeviceState<D> {
    fn write(&mut self, input: &[u8]) -> DeviceResult<WriteReport> {
        // Input ends at the first NUL, like a C string
        let input = match input.iter().position(|&b| b == 0) {
            Some(end) => &input[..end],
            None => input,
        };

        let mut report = WriteReport::default();

        if input.first() == Some(&CLEAR_SENTINEL) {
            debug!("Clearing display");
            self.driver.clear_display()?;
            self.buffer.clear();
            report.cleared = true;
            return Ok(report);
        }

        for (i, &letter) in input.iter().enumerate() {
            if self.buffer.is_full() {
                report.dropped = input.len() - i;
                break;
            }
            self.buffer.append(letter);
            self.driver.print_char(letter)?;
            report.displayed += 1;
        }

        if report.dropped > 0 {
            debug!("Display full, dropped {} characters", report.dropped);
        }

        Ok(report)
    }
}

/// The LCD device context: driver, display mirror and the gate serializing access to them.
pub struct LcdDevice<D> {
    gate: SessionGate,
    state: Mutex<DeviceState<D>>,
}

impl<D: LcdDriver> LcdDevice<D> {
    /// Initializes the display and wraps it in a device.
    pub fn start(mut driver: D) -> DeviceResult<Self> {
        info!("Starting LCD device on {:?}...", driver);
        driver.init()?;
        info!("LCD device started.");

        Ok(LcdDevice {
            gate: SessionGate::new(),
            state: Mutex::new(DeviceState {
                driver,
                buffer: DisplayBuffer::new(),
            }),
        })
    }

    /// Opens a session, waiting for the current one to close.
    ///
    /// # Errors
    /// - `DeviceError::Interrupted` if `cancel` fires while waiting.
    pub fn open(&self, cancel: &CancelToken) -> DeviceResult<Session<'_, D>> {
        if let Err(err) = self.gate.acquire(cancel) {
            info!("Could not lock device during open: {}", err);
            return Err(err);
        }
        info!("Device opened.");
        Ok(Session { device: self })
    }

    /// Opens a session if none is open.
    ///
    /// # Errors
    /// - `DeviceError::Busy` if a session is open.
    pub fn try_open(&self) -> DeviceResult<Session<'_, D>> {
        self.gate.try_acquire()?;
        info!("Device opened.");
        Ok(Session { device: self })
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.gate.cancel_token()
    }

    pub fn is_open(&self) -> bool {
        self.gate.is_held()
    }

    /// Clears the display and hands the driver back, e.g. to release its pins.
    ///
    /// Failing to clear is logged, the driver is returned anyway.
    pub fn stop(self) -> D {
        info!("Stopping LCD device...");
        let mut state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);

        if let Err(err) = state.driver.clear_display() {
            warn!("Failed to clear display on stop: {}", err);
        }
        state.buffer.clear();

        info!("LCD device stopped.");
        state.driver
    }

    fn state(&self) -> MutexGuard<'_, DeviceState<D>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: Debug> Debug for LcdDevice<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "LcdDevice({:?})", self.gate)
    }
}

/// An open session on an [LcdDevice]. Closing or dropping it lets the next session in.
pub struct Session<'a, D: LcdDriver> {
    device: &'a LcdDevice<D>,
}

impl<D: LcdDriver> Session<'_, D> {
    /// Writes text to the display.
    ///
    /// A leading [CLEAR_SENTINEL] clears the display and the buffer, and the rest of the input
    /// is ignored. Otherwise characters are printed in order until the buffer is full; the rest
    /// are dropped and only counted in the report.
    pub fn write(&self, input: &[u8]) -> DeviceResult<WriteReport> {
        debug!("Writing {:?} to device", String::from_utf8_lossy(input));
        self.device.state().write(input)
    }

    /// Returns up to `max_len` characters of what the display shows.
    pub fn read(&self, max_len: usize) -> Vec<u8> {
        debug!("Reading from device...");
        let state = self.device.state();
        let contents = state.buffer.as_bytes();
        contents[..contents.len().min(max_len)].to_vec()
    }

    pub fn close(self) {}
}

impl<D: LcdDriver> Drop for Session<'_, D> {
    fn drop(&mut self) {
        self.device.gate.release();
        info!("Closing device.");
    }
}

impl<D: LcdDriver> Debug for Session<'_, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session({:?})", self.device)
    }
}
