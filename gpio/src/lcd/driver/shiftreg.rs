use crate::delay::Delay;
use crate::lcd::driver::{CommandWord, INIT_SEQUENCE, LcdDriver, LcdState, LcdTiming};
use crate::pins::{LogicalPin, PinSet};
use crate::shiftreg::ShiftRegister;
use crate::{GpioError, GpioResult};
use log::{debug, trace};

/// Driver for an 8-bit character LCD whose data bus is fed by a shift register.
///
/// Commands and characters use two different pulse protocols:
/// - [LcdDriver::set_pin_array] puts the data byte on the bus first, then sets RW and RS, then
///   pulses E for [LcdTiming::enable_pulse_ms] and waits the caller's settle time.
/// - [LcdDriver::print_char] sets RS and RW first, raises E, shifts the byte out while E is high,
///   drops E, and finally puts RS low and RW high again.
///
/// Owns its [PinSet]; [ShiftRegLcdDriver::release] drives the lines low and frees them.
#[derive(Debug)]
pub struct ShiftRegLcdDriver<'a> {
    pins: PinSet<'a>,
    delay: &'a dyn Delay,
    timing: LcdTiming,
    state: LcdState,
}

impl<'a> ShiftRegLcdDriver<'a> {
    pub fn new(pins: PinSet<'a>, delay: &'a dyn Delay) -> Self {
        ShiftRegLcdDriver {
            pins,
            delay,
            timing: LcdTiming::default(),
            state: LcdState::Uninitialized,
        }
    }

    pub fn with_timing(mut self, timing: LcdTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Drives every line low and releases it.
    pub fn release(self) {
        self.pins.release();
    }

    fn run_init_sequence(&mut self) -> GpioResult<()> {
        self.delay.delay_ms(self.timing.power_on_ms);
        for (word, settle_ms) in INIT_SEQUENCE {
            self.set_pin_array(word, settle_ms)?;
        }
        Ok(())
    }
}

impl LcdDriver for ShiftRegLcdDriver<'_> {
    fn init(&mut self) -> GpioResult<()> {
        debug!("Initializing LCD...");
        self.state = LcdState::Initializing;

        match self.run_init_sequence() {
            Ok(()) => {
                self.state = LcdState::Ready;
                debug!("LCD ready.");
                Ok(())
            }
            Err(err) => {
                self.state = LcdState::Uninitialized;
                Err(err)
            }
        }
    }

    fn state(&self) -> LcdState {
        self.state
    }

    fn clear_display(&mut self) -> GpioResult<()> {
        self.set_pin_array(CommandWord::CLEAR_DISPLAY, self.timing.clear_settle_ms)
    }

    fn set_pin_array(&mut self, word: CommandWord, settle_ms: u32) -> GpioResult<()> {
        trace!("Sending word: {}, settle: {} ms", word, settle_ms);

        self.pins.shift_register()?.send_byte(word.data())?;
        self.pins.set_level(LogicalPin::ReadWrite, word.read_write())?;
        self.pins.set_level(LogicalPin::RegisterSelect, word.register_select())?;

        self.pins.set_level(LogicalPin::Enable, true)?;
        self.delay.delay_ms(self.timing.enable_pulse_ms);
        self.pins.set_level(LogicalPin::Enable, false)?;
        self.delay.delay_ms(settle_ms);

        Ok(())
    }

    fn print_char(&mut self, letter: u8) -> GpioResult<()> {
        if self.state != LcdState::Ready {
            return Err(GpioError::NotReady);
        }

        trace!("Printing: {:?}", letter as char);
        let step = self.timing.char_step_ms;

        self.pins.set_level(LogicalPin::RegisterSelect, true)?;
        self.pins.set_level(LogicalPin::ReadWrite, false)?;
        self.delay.delay_ms(step);

        self.pins.set_level(LogicalPin::Enable, true)?;
        self.delay.delay_ms(step);
        self.pins.shift_register()?.send_byte(letter)?;
        self.pins.set_level(LogicalPin::Enable, false)?;
        self.delay.delay_ms(step);

        self.pins.set_level(LogicalPin::RegisterSelect, false)?;
        self.pins.set_level(LogicalPin::ReadWrite, true)?;

        Ok(())
    }
}
