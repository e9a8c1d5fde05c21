//! `client.toml`: serial link, run parameters, display layout and the item list.

use crate::hardware::ShellCheck;
use crate::ui::UiLayout;
use crate::{Settings, Timing};
use jig_core::{ItemKind, Registry, TestItem, UiHandle};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "client.toml";
pub const MODEL_PATH: &str = "/proc/device-tree/model";

const MODEL_MARKER: &str = "ODROID-";
const DEFAULT_SERIAL_DEVICE: &str = "/dev/ttyS0";
const DEFAULT_BAUD: u32 = 115_200;
const DEFAULT_RUN_SECONDS: u32 = 60;
const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 30;
const DEFAULT_INTERFACE: &str = "eth0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub ui: UiLayout,
    #[serde(default)]
    pub network: NetworkConfig,
    /// Per-model serial overrides.
    #[serde(default)]
    pub boards: Vec<BoardConfig>,
    #[serde(default)]
    pub items: Vec<ItemConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SerialConfig {
    #[serde(default = "default_serial_device")]
    pub device: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: default_serial_device(),
            baud: default_baud(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_run_seconds")]
    pub seconds: u32,
    #[serde(default)]
    pub self_test: bool,
    #[serde(default = "default_check_timeout_secs")]
    pub check_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seconds: default_run_seconds(),
            self_test: false,
            check_timeout_secs: default_check_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_interface")]
    pub interface: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardConfig {
    /// Device-tree model, e.g. `ODROID-M1`.
    pub model: String,
    pub device: Option<String>,
    pub baud: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemConfig {
    pub name: String,
    pub group: i32,
    pub device: i32,
    pub ui: UiHandle,
    #[serde(default)]
    pub kind: ItemKind,
    /// Shell command run as the check. Items without one fail with `NO CHECK`.
    pub command: Option<String>,
    #[serde(default)]
    pub confirm: bool,
    #[serde(default)]
    pub throughput: bool,
}

fn default_serial_device() -> String {
    DEFAULT_SERIAL_DEVICE.to_string()
}

fn default_baud() -> u32 {
    DEFAULT_BAUD
}

fn default_run_seconds() -> u32 {
    DEFAULT_RUN_SECONDS
}

fn default_check_timeout_secs() -> u64 {
    DEFAULT_CHECK_TIMEOUT_SECS
}

fn default_interface() -> String {
    DEFAULT_INTERFACE.to_string()
}

impl ClientConfig {
    /// Load from `path`. A missing file at the default location yields the
    /// built-in defaults; any other read failure is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e)
                if e.kind() == std::io::ErrorKind::NotFound
                    && path == Path::new(DEFAULT_CONFIG_PATH) =>
            {
                tracing::warn!("{} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Checks that every item can be reported and looked up.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let throughput_items = self.items.iter().filter(|i| i.throughput).count();
        if throughput_items > 1 {
            return Err(ConfigError::Invalid(format!(
                "{} items publish throughput, at most one may",
                throughput_items
            )));
        }
        for (i, item) in self.items.iter().enumerate() {
            if item.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("item {} has no name", i)));
            }
            if self.items[..i]
                .iter()
                .any(|other| (other.group, other.device) == (item.group, item.device))
            {
                return Err(ConfigError::Invalid(format!(
                    "item {:?} repeats gid = {}, did = {}",
                    item.name, item.group, item.device
                )));
            }
        }
        Ok(())
    }

    /// Serial device and baud for `model`, falling back to `[serial]`.
    pub fn serial_for(&self, model: Option<&str>) -> (String, u32) {
        let board = model.and_then(|model| {
            self.boards
                .iter()
                .find(|b| b.model.eq_ignore_ascii_case(model))
        });
        match board {
            Some(board) => (
                board.device.clone().unwrap_or_else(|| self.serial.device.clone()),
                board.baud.unwrap_or(self.serial.baud),
            ),
            None => (self.serial.device.clone(), self.serial.baud),
        }
    }

    pub fn registry(&self) -> Registry {
        Registry::new(
            self.items
                .iter()
                .map(|item| {
                    TestItem::new(item.ui, item.group, item.device, item.kind, item.name.as_str())
                })
                .collect(),
        )
    }

    pub fn shell_checks(&self) -> HashMap<(i32, i32), ShellCheck> {
        self.items
            .iter()
            .filter_map(|item| {
                let command = item.command.clone()?;
                Some((
                    (item.group, item.device),
                    ShellCheck {
                        command,
                        confirm: item.confirm,
                        throughput: item.throughput,
                    },
                ))
            })
            .collect()
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.run.check_timeout_secs)
    }

    pub fn settings(&self) -> Settings {
        Settings {
            self_test: self.run.self_test,
            timing: Timing::default(),
            layout: self.ui,
        }
    }
}

/// Board model from the device tree, if this is a supported board.
pub fn detect_model() -> Option<String> {
    match std::fs::read(MODEL_PATH) {
        Ok(raw) => model_name(&String::from_utf8_lossy(&raw)),
        Err(e) => {
            tracing::debug!("no device-tree model: {}", e);
            None
        }
    }
}

/// `Hardkernel ODROID-m1\0` -> `ODROID-M1`.
pub fn model_name(raw: &str) -> Option<String> {
    let upper = raw.to_ascii_uppercase();
    let start = upper.find(MODEL_MARKER)?;
    let name = upper[start..].trim_end_matches(['\0', '\n', '\r', ' ']);
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[serial]
device = "/dev/ttyS1"

[run]
seconds = 90
self_test = true

[ui]
status = 50

[[boards]]
model = "ODROID-M1"
device = "/dev/ttyS2"
baud = 921600

[[boards]]
model = "ODROID-C4"
baud = 57600

[[items]]
name = "MEM"
group = 0
device = 0
ui = 10
kind = "data_only"
command = "free -g | awk '/Mem/ {print $2}'"

[[items]]
name = "IPERF"
group = 5
device = 2
ui = 11
command = "iperf-probe"
throughput = true

[[items]]
name = "HEADER"
group = 6
device = 0
ui = 12
command = "gpio-loop"
confirm = true

[[items]]
name = "LED 1G"
group = 8
device = 3
ui = 13
kind = "status_only"
"#;

    #[test]
    fn parses_full_file() {
        let config = ClientConfig::from_toml(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.serial.device, "/dev/ttyS1");
        assert_eq!(config.serial.baud, DEFAULT_BAUD);
        assert_eq!(config.run.seconds, 90);
        assert!(config.run.self_test);
        assert_eq!(config.run.check_timeout_secs, DEFAULT_CHECK_TIMEOUT_SECS);
        assert_eq!(config.ui.status, UiHandle(50));
        assert_eq!(config.ui.alive, UiHandle(0));
        assert_eq!(config.network.interface, "eth0");

        let registry = config.registry();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.get(0).unwrap().kind, ItemKind::DataOnly);
        assert_eq!(registry.get(1).unwrap().kind, ItemKind::Interactive);
        assert_eq!(registry.find_ui_handle(8, 3), Some(UiHandle(13)));

        let checks = config.shell_checks();
        assert_eq!(checks.len(), 3);
        assert!(checks[&(6, 0)].confirm);
        assert!(checks[&(5, 2)].throughput);
        assert!(!checks.contains_key(&(8, 3)));

        let settings = config.settings();
        assert!(settings.self_test);
        assert_eq!(settings.layout.status, UiHandle(50));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = ClientConfig::from_toml("").unwrap();
        assert_eq!(config.serial.device, DEFAULT_SERIAL_DEVICE);
        assert_eq!(config.serial.baud, 115_200);
        assert_eq!(config.run.seconds, 60);
        assert!(!config.run.self_test);
        assert!(config.items.is_empty());
    }

    #[test]
    fn board_overrides_serial_settings() {
        let config = ClientConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(
            config.serial_for(Some("ODROID-M1")),
            ("/dev/ttyS2".to_string(), 921_600)
        );
        assert_eq!(
            config.serial_for(Some("odroid-c4")),
            ("/dev/ttyS1".to_string(), 57_600)
        );
        assert_eq!(
            config.serial_for(Some("ODROID-N2")),
            ("/dev/ttyS1".to_string(), DEFAULT_BAUD)
        );
        assert_eq!(config.serial_for(None), ("/dev/ttyS1".to_string(), DEFAULT_BAUD));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let config = ClientConfig::from_toml(
            r#"
[[items]]
name = "A"
group = 1
device = 0
ui = 1

[[items]]
name = "B"
group = 1
device = 0
ui = 2
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unknown_kind_fails_to_parse() {
        let err = ClientConfig::from_toml(
            r#"
[[items]]
name = "A"
group = 1
device = 0
ui = 1
kind = "blinking"
"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn model_name_from_device_tree() {
        assert_eq!(model_name("Hardkernel ODROID-M1\0").as_deref(), Some("ODROID-M1"));
        assert_eq!(model_name("hardkernel odroid-c4\n").as_deref(), Some("ODROID-C4"));
        assert_eq!(model_name("Raspberry Pi 4"), None);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = ClientConfig::load(Path::new("/nonexistent/jig/client.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
