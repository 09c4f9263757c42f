pub mod delay;
pub mod device;
pub mod gpiod;
pub mod lcd;
pub mod pins;
pub mod raw;
pub mod shiftreg;
pub mod sim;

use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("pin {0} is not a valid output line")]
    InvalidPin(usize),
    #[error("the feature is not supported on this backend")]
    NotSupported,
    #[error("the display controller is not initialized")]
    NotReady,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
    #[error("error: {0}")]
    Other(String),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        GpioError::Io(err.kind())
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

/// A source of GPIO lines.
///
/// Lines are only ever used as outputs here, so a claim hands out an output directly.
pub trait GpioDriver: Debug + Send + Sync {
    /// Gets the amount of GPIO pins available.
    fn count(&self) -> GpioResult<usize>;

    /// Claims the GPIO pin at the given index, configures it as an output and drives it low.
    ///
    /// The line is released when the returned output is dropped.
    ///
    /// # Errors
    /// - `GpioError::InvalidPin` if the index is not a line of this driver.
    /// - `GpioError::AlreadyInUse` if the line is already claimed.
    fn claim_output(&self, index: usize) -> GpioResult<Box<dyn GpioOutput + '_>>;
}

pub trait GpioOutput: Debug + Send + Sync {
    /// Writes the state of the GPIO pin.
    fn write(&self, value: bool) -> GpioResult<()>;
}
