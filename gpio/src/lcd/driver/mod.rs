mod shiftreg;

use crate::{GpioError, GpioResult};
pub use shiftreg::*;
use std::fmt::{Debug, Display, Formatter};

/// One bus transaction worth of controller lines.
///
/// bits:  9   8    7    6    5    4    3    2    1    0
/// pins: RS, RW, DB7, DB6, DB5, DB4, DB3, DB2, DB1, DB0
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CommandWord(u16);

impl CommandWord {
    pub const MASK: u16 = 0b11_1111_1111;

    /// Clears the display and sets the cursor to the home position.
    pub const CLEAR_DISPLAY: CommandWord = CommandWord(0b0000000001);
    /// Entry mode: cursor moves right, no display shift.
    pub const ENTRY_MODE_INCREMENT: CommandWord = CommandWord(0b0000000110);
    /// Display, cursor and blinking all off.
    pub const DISPLAY_OFF: CommandWord = CommandWord(0b0000001000);
    /// Display, cursor and blinking all on.
    pub const DISPLAY_ON_CURSOR_BLINK: CommandWord = CommandWord(0b0000001111);
    /// Function set: 8-bit bus.
    pub const FUNCTION_SET_8BIT: CommandWord = CommandWord(0b0000110000);
    /// Function set: 8-bit bus, two lines.
    pub const FUNCTION_SET_8BIT_2LINE: CommandWord = CommandWord(0b0000111000);

    /// # Errors
    /// - `GpioError::InvalidArgument` if `value` doesn't fit in 10 bits.
    pub fn new(value: u16) -> GpioResult<Self> {
        if value & !Self::MASK != 0 {
            return Err(GpioError::InvalidArgument);
        }
        Ok(CommandWord(value))
    }

    pub const fn from_parts(register_select: bool, read_write: bool, data: u8) -> Self {
        CommandWord(((register_select as u16) << 9) | ((read_write as u16) << 8) | data as u16)
    }

    /// A controller instruction: RS and RW low.
    pub const fn command(data: u8) -> Self {
        Self::from_parts(false, false, data)
    }

    pub const fn value(self) -> u16 {
        self.0
    }

    /// Bits 7..0, the part that travels through the shift register.
    pub const fn data(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Bit 8.
    pub const fn read_write(self) -> bool {
        (self.0 >> 8) & 1 == 1
    }

    /// Bit 9.
    pub const fn register_select(self) -> bool {
        (self.0 >> 9) & 1 == 1
    }
}

impl Display for CommandWord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:010b}", self.0)
    }
}

/// Where the controller is in its power-on configuration.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum LcdState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
}

/// Wait times of the protocol, in milliseconds.
///
/// There is no busy flag feedback, so these are the only thing keeping the bus in step with the
/// controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LcdTiming {
    /// Wait before the first instruction after power-on.
    pub power_on_ms: u32,
    /// How long E is held high during a bus transaction.
    pub enable_pulse_ms: u32,
    /// Each of the three waits of a character write.
    pub char_step_ms: u32,
    /// Settle time after a clear display issued outside of initialization.
    pub clear_settle_ms: u32,
}

impl Default for LcdTiming {
    fn default() -> Self {
        LcdTiming {
            power_on_ms: 17,
            enable_pulse_ms: 10,
            char_step_ms: 1,
            clear_settle_ms: 10,
        }
    }
}

/// Power-on configuration, as `(word, settle_ms)` pairs.
///
/// The first three function sets synchronize the controller to the 8-bit interface and need the
/// decreasing waits. Must not be reordered or shortened.
pub const INIT_SEQUENCE: [(CommandWord, u32); 8] = [
    (CommandWord::FUNCTION_SET_8BIT, 5),
    (CommandWord::FUNCTION_SET_8BIT, 2),
    (CommandWord::FUNCTION_SET_8BIT, 1),
    (CommandWord::FUNCTION_SET_8BIT_2LINE, 1),
    (CommandWord::DISPLAY_OFF, 1),
    (CommandWord::CLEAR_DISPLAY, 1),
    (CommandWord::ENTRY_MODE_INCREMENT, 1),
    (CommandWord::DISPLAY_ON_CURSOR_BLINK, 1),
];

pub trait LcdDriver: Debug + Send {
    /// Runs the power-on configuration sequence.
    ///
    /// Moves the controller from [LcdState::Uninitialized] through [LcdState::Initializing] to
    /// [LcdState::Ready]. If any transaction fails, the controller is back to
    /// [LcdState::Uninitialized].
    fn init(&mut self) -> GpioResult<()>;

    fn state(&self) -> LcdState;

    fn is_ready(&self) -> bool {
        self.state() == LcdState::Ready
    }

    /// Clears the display and sets the cursor to the home position.
    fn clear_display(&mut self) -> GpioResult<()>;

    // Low-level commands

    /// Sends one 10-bit word to the controller and waits `settle_ms` afterwards.
    ///
    /// Every controller instruction is exactly one such transaction.
    fn set_pin_array(&mut self, word: CommandWord, settle_ms: u32) -> GpioResult<()>;

    /// Writes one character to the display at the cursor.
    ///
    /// # Errors
    /// - `GpioError::NotReady` if the controller isn't initialized yet.
    fn print_char(&mut self, letter: u8) -> GpioResult<()>;
}
