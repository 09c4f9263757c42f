use std::env::var_os;
use std::ffi::OsStr;
use std::path::Path;
use dotenv::var;
use lcd_sr_gpio::pins::PinMap;
use serde::{Serialize, Deserialize};
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("{var} is not a pin number: {value:?}")]
    InvalidPin { var: &'static str, value: String },
}

/// Which GPIO driver talks to the hardware.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// BCM283x register window through `/dev/gpiomem`. Lines 0 to 57 only.
    Raw,
    /// BCM283x register window through `/dev/mem`. Lines 0 to 57 only.
    Mem,
    /// GPIO character devices listed in [Config::chips], lines numbered across them in order.
    ///
    /// With the default four 32-line banks this addresses the default pins.
    #[default]
    Gpiod,
    /// No hardware. Every line change and delay goes to the `trace` log and nothing is kept.
    Sim,
}

/// What the lines drive.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The LCD, fed through the shift register. Claims all six pins.
    #[default]
    Lcd,
    /// The shift register alone, one raw byte per line. Claims only its three pins.
    ShiftReg,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
#[serde(default)]
pub struct PinConfig {
    pub register_select: usize,
    pub read_write: usize,
    pub enable: usize,
    pub serial_data: usize,
    pub shift_clock: usize,
    pub storage_clock: usize,
}

impl Default for PinConfig {
    fn default() -> Self {
        let map = PinMap::default();
        PinConfig {
            register_select: map.register_select,
            read_write: map.read_write,
            enable: map.enable,
            serial_data: map.serial_data,
            shift_clock: map.shift_clock,
            storage_clock: map.storage_clock,
        }
    }
}

impl From<PinConfig> for PinMap {
    fn from(pins: PinConfig) -> Self {
        PinMap {
            register_select: pins.register_select,
            read_write: pins.read_write,
            enable: pins.enable,
            serial_data: pins.serial_data,
            shift_clock: pins.shift_clock,
            storage_clock: pins.storage_clock,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    pub mode: Mode,
    /// Chip paths for [Backend::Gpiod], in numbering order.
    pub chips: Vec<String>,
    pub pins: PinConfig,
}

impl Config {
    fn path() -> String {
        let config_str = var_os("CONFIG_FILE");
        let config_str: &OsStr = config_str.as_deref().unwrap_or(OsStr::new("lcd-sr.json"));
        config_str.to_string_lossy().into_owned()
    }

    pub fn try_load() -> Option<Self> {
        let config_str = Self::path();
        let config_path = Path::new(&config_str);
        if config_path.exists() {
            let file = std::fs::File::open(config_path).ok()?;
            let reader = std::io::BufReader::new(file);
            serde_json::from_reader(reader).ok()
        } else {
            None
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        let config_str = Self::path();
        let config_path = Path::new(&config_str);
        let file = std::fs::File::create(config_path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Overrides single pins from `LCDSR_PIN_*` environment variables (or `.env`).
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| var(name).ok())
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let pins = &mut self.pins;
        let slots: [(&'static str, &mut usize); 6] = [
            ("LCDSR_PIN_RS", &mut pins.register_select),
            ("LCDSR_PIN_RW", &mut pins.read_write),
            ("LCDSR_PIN_E", &mut pins.enable),
            ("LCDSR_PIN_DATA", &mut pins.serial_data),
            ("LCDSR_PIN_SHCLK", &mut pins.shift_clock),
            ("LCDSR_PIN_STCLK", &mut pins.storage_clock),
        ];

        for (name, slot) in slots {
            if let Some(value) = lookup(name) {
                *slot = value.trim().parse().map_err(|_| ConfigError::InvalidPin {
                    var: name,
                    value: value.clone(),
                })?;
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: Backend::default(),
            mode: Mode::default(),
            chips: (0..4).map(|n| format!("/dev/gpiochip{n}")).collect(),
            pins: PinConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcd_sr_gpio::pins::LogicalPin;

    #[test]
    fn default_pins_match_the_reference_wiring() {
        let map: PinMap = Config::default().pins.into();
        assert_eq!(map, PinMap::default());
        assert_eq!(map.enable, 79);
        assert_eq!(map.serial_data, 70);
    }

    #[test]
    fn partial_config_file_falls_back_to_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "backend": "gpiod", "pins": { "register_select": 1, "read_write": 2, "enable": 3, "serial_data": 4, "shift_clock": 5, "storage_clock": 6 } }"#)
                .unwrap();

        assert_eq!(config.backend, Backend::Gpiod);
        assert_eq!(config.chips[0], "/dev/gpiochip0");
        assert_eq!(config.chips.len(), 4);
        assert_eq!(config.pins.storage_clock, 6);
    }

    #[test]
    fn missing_pins_keep_their_defaults() {
        let config: Config = serde_json::from_str(r#"{ "pins": { "enable": 17 } }"#).unwrap();

        assert_eq!(config.backend, Backend::Gpiod);
        assert_eq!(config.mode, Mode::Lcd);
        assert_eq!(config.pins.enable, 17);
        assert_eq!(config.pins.read_write, 86);
    }

    #[test]
    fn shift_register_mode_and_sim_backend_parse() {
        let config: Config =
            serde_json::from_str(r#"{ "backend": "sim", "mode": "shiftreg", "chips": ["gpiochip2"] }"#)
                .unwrap();

        assert_eq!(config.backend, Backend::Sim);
        assert_eq!(config.mode, Mode::ShiftReg);
        assert_eq!(config.chips, vec!["gpiochip2".to_string()]);
    }

    #[test]
    fn default_backend_reaches_the_default_pins() {
        // Four 32-line banks, numbered back to back
        let lines = 32 * Config::default().chips.len();
        let map: PinMap = Config::default().pins.into();

        assert_eq!(Config::default().backend, Backend::Gpiod);
        assert_eq!(map.first_out_of_range(&LogicalPin::ALL, lines), None);
    }

    #[test]
    fn env_overrides_single_pins() {
        let mut config = Config::default();
        config
            .apply_overrides(|name| match name {
                "LCDSR_PIN_E" => Some(" 17 ".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.pins.enable, 17);
        assert_eq!(config.pins.register_select, 62);
    }

    #[test]
    fn bad_env_pin_is_reported() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|name| (name == "LCDSR_PIN_RW").then(|| "abc".to_string()))
            .unwrap_err();

        assert_eq!(
            err,
            ConfigError::InvalidPin {
                var: "LCDSR_PIN_RW",
                value: "abc".to_string()
            }
        );
    }
}
