use apc_library::link::DEFAULT_CLIENT_NAME;
use apc_library::{BehaviorConfig, ButtonKind, Color, ControlAddress, LedEntry, PressMode};
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize, Debug)]
#[serde(default)]
pub(crate) struct Settings {
    pub client_name: String,
    /// Substring of the surface's MIDI input port name.
    pub input_port: String,
    pub output_port: String,
    /// Optional port receiving a raw copy of everything the surface sends.
    /// Empty disables it.
    pub passthrough_port: String,
    /// Inbound events waiting for observers before new ones are dropped.
    pub queue_capacity: usize,
    /// How long stopping an animation may take, in milliseconds.
    pub stop_timeout_ms: u64,
    pub self_test: bool,
    /// Color and channel painted on controls pressed without a behavior.
    pub selection_color: String,
    pub selection_channel: u8,
    pub behaviors: Vec<BehaviorSetting>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            input_port: "APC mini mk2".to_string(),
            output_port: "APC mini mk2".to_string(),
            passthrough_port: "".to_string(),
            queue_capacity: 256,
            stop_timeout_ms: 1000,
            self_test: true,
            selection_color: "WHITE".to_string(),
            selection_channel: 6,
            behaviors: vec![],
        }
    }
}

/// One `[[behaviors]]` table.
#[derive(Deserialize, Debug, Clone)]
pub(crate) struct BehaviorSetting {
    /// `pad:<0-63>`, `track:<0-7>` or `scene:<0-7>`
    pub control: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// `toggle` or `flash`
    pub mode: String,
    pub pressed_color: String,
    pub pressed_channel: u8,
    #[serde(default = "off")]
    pub unpressed_color: String,
    #[serde(default)]
    pub unpressed_channel: u8,
}

fn enabled_by_default() -> bool {
    true
}

fn off() -> String {
    "OFF".to_string()
}

pub(crate) fn parse_control(s: &str) -> Result<ControlAddress, String> {
    let (kind, index) = s
        .trim()
        .split_once(':')
        .ok_or_else(|| format!("control {s:?} should look like \"pad:12\" or \"track:0\""))?;
    let index: u8 = index
        .trim()
        .parse()
        .map_err(|_| format!("control {s:?} has no valid index"))?;
    let address = match kind.trim().to_ascii_lowercase().as_str() {
        "pad" => ControlAddress::Pad(index),
        "track" => ControlAddress::Button(ButtonKind::Track, index),
        "scene" => ControlAddress::Button(ButtonKind::Scene, index),
        other => return Err(format!("unknown control kind {other:?} in {s:?}")),
    };
    address.validate().map_err(|e| e.to_string())
}

impl BehaviorSetting {
    pub(crate) fn resolve(&self) -> Result<(ControlAddress, BehaviorConfig), String> {
        let address = parse_control(&self.control)?;
        let mode = match self.mode.trim().to_ascii_lowercase().as_str() {
            "toggle" => PressMode::Toggle,
            "flash" => PressMode::Flash,
            other => return Err(format!("mode must be \"toggle\" or \"flash\" (got {other:?})")),
        };
        let entry = |color: &str, channel: u8| -> Result<LedEntry, String> {
            let color: Color = color.parse().map_err(|e: apc_library::Error| e.to_string())?;
            LedEntry::new(color, channel).map_err(|e| e.to_string())
        };
        Ok((
            address,
            BehaviorConfig {
                enabled: self.enabled,
                mode,
                pressed: entry(&self.pressed_color, self.pressed_channel)?,
                unpressed: entry(&self.unpressed_color, self.unpressed_channel)?,
            },
        ))
    }
}

impl Settings {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.client_name.is_empty() {
            return Err("Client name must not be empty".to_string());
        }

        if self.input_port.is_empty() {
            return Err("Input port name must not be empty".to_string());
        }

        if self.output_port.is_empty() {
            return Err("Output port name must not be empty".to_string());
        }

        if self.queue_capacity == 0 {
            return Err("queue_capacity must be at least 1".to_string());
        }

        self.selection()?;

        for behavior in &self.behaviors {
            behavior
                .resolve()
                .map_err(|e| format!("behavior for {:?}: {e}", behavior.control))?;
        }

        Ok(())
    }

    pub(crate) fn selection(&self) -> Result<(Color, u8), String> {
        let color: Color = self
            .selection_color
            .parse()
            .map_err(|e: apc_library::Error| e.to_string())?;
        LedEntry::new(color, self.selection_channel).map_err(|e| e.to_string())?;
        Ok((color, self.selection_channel))
    }

    pub(crate) fn passthrough(&self) -> Option<&str> {
        Some(self.passthrough_port.as_str()).filter(|name| !name.is_empty())
    }

    pub(crate) fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    fn from_toml(toml: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.validate(), Ok(()));
        assert_eq!(settings.passthrough(), None);
        assert_eq!(settings.selection(), Ok((Color::White, 6)));
    }

    #[test]
    fn reads_behaviors_from_toml() {
        let settings = from_toml(
            r#"
            passthrough_port = "Bitwig"
            selection_color = "light-blue"
            selection_channel = 9

            [[behaviors]]
            control = "track:0"
            mode = "toggle"
            pressed_color = "RED"
            pressed_channel = 13

            [[behaviors]]
            control = "pad:63"
            mode = "Flash"
            enabled = false
            pressed_color = "yellow"
            pressed_channel = 6
            unpressed_color = "dark blue"
            unpressed_channel = 2
            "#,
        );
        assert_eq!(settings.validate(), Ok(()));
        assert_eq!(settings.passthrough(), Some("Bitwig"));
        assert_eq!(settings.selection(), Ok((Color::LightBlue, 9)));
        assert_eq!(settings.input_port, "APC mini mk2");

        let (address, config) = settings.behaviors[0].resolve().unwrap();
        assert_eq!(address, ControlAddress::Button(ButtonKind::Track, 0));
        assert_eq!(config.mode, PressMode::Toggle);
        assert!(config.enabled);
        assert_eq!(config.pressed, LedEntry::new(Color::Red, 13).unwrap());
        assert_eq!(config.unpressed, LedEntry::OFF);

        let (address, config) = settings.behaviors[1].resolve().unwrap();
        assert_eq!(address, ControlAddress::Pad(63));
        assert!(!config.enabled);
        assert_eq!(config.unpressed, LedEntry::new(Color::DarkBlue, 2).unwrap());
    }

    #[test]
    fn controls_parse() {
        assert_eq!(parse_control("pad:0"), Ok(ControlAddress::Pad(0)));
        assert_eq!(
            parse_control(" Scene : 7 "),
            Ok(ControlAddress::Button(ButtonKind::Scene, 7))
        );
        assert!(parse_control("pad:64").is_err());
        assert!(parse_control("track:8").is_err());
        assert!(parse_control("fader:1").is_err());
        assert!(parse_control("pad").is_err());
    }

    #[test]
    fn rejects_bad_values() {
        let settings = Settings {
            selection_channel: 16,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            selection_color: "PURPLE".to_string(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            queue_capacity: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        let settings = from_toml(
            r#"
            [[behaviors]]
            control = "pad:1"
            mode = "hold"
            pressed_color = "RED"
            pressed_channel = 6
            "#,
        );
        let err = settings.validate().unwrap_err();
        assert!(err.contains("pad:1"), "{err}");
    }
}
