mod config;

use std::io::{stdin, BufRead};
use dotenv::dotenv;
use eyre::bail;
use log::{debug, info, warn};
use sysinfo::System;
use lcd_sr_gpio::GpioDriver;
use lcd_sr_gpio::delay::ThreadDelay;
use lcd_sr_gpio::device::{DeviceError, LcdDevice, ShiftRegDevice, CAPACITY};
use lcd_sr_gpio::gpiod::GpiodDriver;
use lcd_sr_gpio::lcd::driver::{LcdDriver, ShiftRegLcdDriver};
use lcd_sr_gpio::pins::{LogicalPin, PinMap, PinSet};
use lcd_sr_gpio::raw::RawGpioDriver;
use lcd_sr_gpio::sim::SimGpioDriver;
use crate::config::{Backend, Config, Mode};

fn open_gpio(config: &Config) -> Result<Box<dyn GpioDriver>, DeviceError> {
    let gpio: Box<dyn GpioDriver> = match config.backend {
        Backend::Raw => Box::new(RawGpioDriver::new_gpiomem()?),
        Backend::Mem => Box::new(RawGpioDriver::new_mem()?),
        Backend::Gpiod => Box::new(GpiodDriver::open(&config.chips)?),
        Backend::Sim => Box::new(SimGpioDriver::logging(128)),
    };
    Ok(gpio)
}

/// Every input line is one session: open, write, read back, close.
fn run<D: LcdDriver>(device: &LcdDevice<D>) -> eyre::Result<()> {
    let cancel = device.cancel_token();

    for line in stdin().lock().lines() {
        let line = line?;

        let session = device.open(&cancel)?;
        let report = session.write(line.as_bytes())?;
        debug!("{:?}", report);
        if report.dropped > 0 {
            warn!("Display full, {} characters not shown", report.dropped);
        }

        let contents = session.read(CAPACITY);
        info!("Display: {:?}", String::from_utf8_lossy(&contents));
        session.close();
    }

    Ok(())
}

/// The byte an input line stands for: `0x` followed by hex digits, or else its first character.
fn raw_byte(line: &str) -> Option<u8> {
    match line.strip_prefix("0x") {
        Some(hex) if !hex.is_empty() => u8::from_str_radix(hex, 16).ok(),
        _ => line.bytes().next(),
    }
}

/// Every input line latches one byte onto the shift register outputs.
fn run_shift_register(device: &ShiftRegDevice<'_>) -> eyre::Result<()> {
    let cancel = device.cancel_token();

    for line in stdin().lock().lines() {
        let line = line?;
        let Some(byte) = raw_byte(&line) else {
            warn!("Not a byte: {:?}", line);
            continue;
        };

        let session = device.open(&cancel)?;
        session.write(&[byte])?;
        if let Some(latched) = session.read() {
            info!("Outputs: {:08b}", latched);
        }
        session.close();
    }

    Ok(())
}

fn drive_lcd(gpio: &dyn GpioDriver, pin_map: PinMap) -> eyre::Result<()> {
    let pins = PinSet::claim(gpio, pin_map).map_err(DeviceError::from)?;
    let delay = ThreadDelay;
    let driver = ShiftRegLcdDriver::new(pins, &delay);

    // A failed start drops the driver, which frees the pins
    let device = LcdDevice::start(driver)?;

    info!("Ready, reading lines from stdin. Start a line with '*' to clear the display.");
    let result = run(&device);

    let driver = device.stop();
    driver.release();
    info!("Pins released.");

    result
}

fn drive_shift_register(gpio: &dyn GpioDriver, pin_map: PinMap) -> eyre::Result<()> {
    let pins = PinSet::claim_only(gpio, pin_map, &LogicalPin::SHIFT_REGISTER)
        .map_err(DeviceError::from)?;
    let device = ShiftRegDevice::start(pins)?;

    info!("Ready, reading lines from stdin. Each line latches one byte, e.g. 'A' or '0x5a'.");
    let result = run_shift_register(&device);

    device.stop().release();
    info!("Pins released.");

    result
}

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!("lcd-sr starting...");
    info!(
        "System {} ver {} kernel ver {}",
        System::name().as_deref().unwrap_or(UNKNOWN_STR),
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
    );
    info!("Architecture {}", System::cpu_arch());

    debug!("Trying to load config...");
    let mut config = if let Some(config) = Config::try_load() {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found. Using default");
        let config = Config::default();
        config.save()?;
        info!("Default config saved.");
        config
    };
    config.apply_env()?;

    let pin_map: PinMap = config.pins.into();
    info!(
        "LCD @ RS: {}, RW: {}, E: {}; shift register @ data: {}, shift: {}, storage: {}",
        pin_map.register_select,
        pin_map.read_write,
        pin_map.enable,
        pin_map.serial_data,
        pin_map.shift_clock,
        pin_map.storage_clock,
    );

    debug!("Initializing GPIO driver ({:?})...", config.backend);
    let gpio = open_gpio(&config)
        .map_err(|err| DeviceError::ResourceExhausted(err.to_string()))?;
    debug!("{:?} initialized.", gpio);

    let roles: &[LogicalPin] = match config.mode {
        Mode::Lcd => &LogicalPin::ALL,
        Mode::ShiftReg => &LogicalPin::SHIFT_REGISTER,
    };
    let count = gpio.count()?;
    if let Some((pin, index)) = pin_map.first_out_of_range(roles, count) {
        bail!(
            "{:?} is set to pin {}, but the {:?} backend only has {} lines. \
             Set the pins in the config file or with LCDSR_PIN_* variables.",
            pin,
            index,
            config.backend,
            count,
        );
    }

    match config.mode {
        Mode::Lcd => drive_lcd(&*gpio, pin_map),
        Mode::ShiftReg => drive_shift_register(&*gpio, pin_map),
    }
}
