//! Sequence manager: loads and holds the named register definitions.

use crate::error::ConfigError;
use crate::sequence::{ABSENT_ADDRESS, Command, RegisterTarget, Sequence, Slider};
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

const CELEX4_DESCRIPTION: &str = include_str!("../config/celex4.toml");
const CELEX5_DESCRIPTION: &str = include_str!("../config/celex5.toml");

// =============================================================================
// Config Entries
// =============================================================================

/// An externally visible register descriptor, as listed in a config group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConfigEntry {
    /// Register name.
    pub name: String,
    /// Minimum value.
    #[serde(default)]
    pub min: u32,
    /// Maximum value.
    #[serde(default = "default_max")]
    pub max: u32,
    /// Default value.
    pub value: u32,
    /// UI step size.
    #[serde(default = "default_step")]
    pub step: u32,
    /// High (or only) address.
    pub high_addr: i16,
    /// Middle address, `-1` if absent.
    #[serde(default = "absent")]
    pub middle_addr: i16,
    /// Low address, `-1` if absent.
    #[serde(default = "absent")]
    pub low_addr: i16,
}

impl ConfigEntry {
    /// Resolve the entry's address triple.
    pub fn target(&self) -> Option<RegisterTarget> {
        RegisterTarget::from_raw(
            self.high_addr.into(),
            self.middle_addr.into(),
            self.low_addr.into(),
        )
    }
}

fn default_max() -> u32 {
    u32::MAX
}

fn default_step() -> u32 {
    1
}

fn absent() -> i16 {
    ABSENT_ADDRESS as i16
}

// =============================================================================
// Raw Description Entries
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawCommand {
    name: String,
    high_addr: i32,
    #[serde(default = "absent")]
    middle_addr: i16,
    #[serde(default = "absent")]
    low_addr: i16,
    #[serde(default)]
    value: u32,
    min: Option<u32>,
    max: Option<u32>,
    #[serde(default = "default_step")]
    step: u32,
    #[serde(default = "default_mask")]
    mask: u32,
    #[serde(default)]
    settle_ms: u64,
}

fn default_mask() -> u32 {
    0xFF
}

fn default_shown() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawSequence {
    name: String,
    commands: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawSlider {
    name: String,
    command: String,
    value: Option<u32>,
    #[serde(default = "default_shown")]
    shown: bool,
    #[serde(default)]
    advanced: bool,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    name: String,
    #[serde(default, rename = "register")]
    registers: Vec<toml::Value>,
}

impl RawCommand {
    fn into_command(self) -> Result<Command, String> {
        let target = RegisterTarget::from_raw(
            self.high_addr,
            self.middle_addr.into(),
            self.low_addr.into(),
        )
        .ok_or_else(|| format!("invalid high address {}", self.high_addr))?;

        let command = Command {
            name: self.name,
            target,
            value: self.value,
            min: self.min,
            max: self.max,
            step: self.step,
            mask: self.mask,
            settle_ms: self.settle_ms,
        };
        if !command.accepts(command.value) {
            return Err(format!(
                "value {} outside [{:?}, {:?}]",
                command.value, command.min, command.max
            ));
        }
        Ok(command)
    }
}

// =============================================================================
// Sequence Manager
// =============================================================================

/// Holds every command, sequence, slider and config group of a description.
///
/// Definitions are immutable once loaded. Lookups by an unknown name return
/// `None`; callers decide whether that is worth a log line.
///
/// # Example
///
/// ```
/// use celex_sdk::SequenceManager;
///
/// let manager = SequenceManager::from_toml_str(r#"
///     [[command]]
///     name = "PLL_PD_B on"
///     high_addr = 150
///     value = 1
///
///     [[sequence]]
///     name = "Enable PLL"
///     commands = ["PLL_PD_B on"]
/// "#).unwrap();
///
/// assert_eq!(manager.sequence("Enable PLL").unwrap().commands.len(), 1);
/// assert!(manager.sequence("Disable PLL").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SequenceManager {
    commands: HashMap<String, Command>,
    sequences: HashMap<String, Sequence>,
    sliders: HashMap<String, Slider>,
    slider_order: Vec<String>,
    groups: BTreeMap<String, Vec<ConfigEntry>>,
}

impl SequenceManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// The sample CeleX4 description shipped with the crate.
    pub fn celex4_builtin() -> Result<Self, ConfigError> {
        Self::from_toml_str(CELEX4_DESCRIPTION)
    }

    /// The sample CeleX5 description shipped with the crate.
    pub fn celex5_builtin() -> Result<Self, ConfigError> {
        Self::from_toml_str(CELEX5_DESCRIPTION)
    }

    /// Load a description from a TOML file.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Io`] if the file cannot be read
    /// - [`ConfigError::Parse`] if the file is not valid TOML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("loading register description from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load a description from TOML text.
    ///
    /// Commands are parsed first, then sequences and sliders (which refer to
    /// commands by name), then config groups. Malformed entries, duplicates
    /// and dangling references are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] only if the document itself is not valid TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let doc: toml::Table = content.parse()?;
        let mut manager = Self::new();

        manager.parse_command_list(entries(&doc, "command"));
        manager.parse_sequence_list(entries(&doc, "sequence"));
        manager.parse_slider_list(entries(&doc, "slider"));
        manager.parse_group_list(entries(&doc, "group"));

        info!(
            "loaded {} commands, {} sequences, {} sliders, {} config groups",
            manager.commands.len(),
            manager.sequences.len(),
            manager.sliders.len(),
            manager.groups.len()
        );
        Ok(manager)
    }

    fn parse_command_list(&mut self, entries: &[toml::Value]) {
        for (index, entry) in entries.iter().enumerate() {
            let command = match entry.clone().try_into::<RawCommand>() {
                Ok(raw) => raw.into_command(),
                Err(e) => Err(e.to_string()),
            };
            match command {
                Ok(command) if self.commands.contains_key(&command.name) => {
                    warn!("command '{}' defined twice, keeping the first", command.name);
                }
                Ok(command) => {
                    self.commands.insert(command.name.clone(), command);
                }
                Err(e) => warn!("skipping command #{}: {}", index, e),
            }
        }
    }

    fn parse_sequence_list(&mut self, entries: &[toml::Value]) {
        for (index, entry) in entries.iter().enumerate() {
            let raw = match entry.clone().try_into::<RawSequence>() {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("skipping sequence #{}: {}", index, e);
                    continue;
                }
            };
            if self.sequences.contains_key(&raw.name) {
                warn!("sequence '{}' defined twice, keeping the first", raw.name);
                continue;
            }

            let resolved: Result<Vec<Command>, &String> = raw
                .commands
                .iter()
                .map(|name| self.commands.get(name).cloned().ok_or(name))
                .collect();
            match resolved {
                Ok(commands) => {
                    self.sequences.insert(
                        raw.name.clone(),
                        Sequence {
                            name: raw.name,
                            commands,
                        },
                    );
                }
                Err(missing) => warn!(
                    "skipping sequence '{}': unknown command '{}'",
                    raw.name, missing
                ),
            }
        }
    }

    fn parse_slider_list(&mut self, entries: &[toml::Value]) {
        for (index, entry) in entries.iter().enumerate() {
            let raw = match entry.clone().try_into::<RawSlider>() {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("skipping slider #{}: {}", index, e);
                    continue;
                }
            };
            if self.sliders.contains_key(&raw.name) {
                warn!("slider '{}' defined twice, keeping the first", raw.name);
                continue;
            }
            let Some(template) = self.commands.get(&raw.command).cloned() else {
                warn!(
                    "skipping slider '{}': unknown command '{}'",
                    raw.name, raw.command
                );
                continue;
            };

            let value = raw.value.unwrap_or(template.value);
            if !template.accepts(value) {
                warn!("skipping slider '{}': initial value {} out of bounds", raw.name, value);
                continue;
            }
            self.slider_order.push(raw.name.clone());
            self.sliders.insert(
                raw.name.clone(),
                Slider {
                    name: raw.name,
                    value,
                    shown: raw.shown,
                    advanced: raw.advanced,
                    template,
                },
            );
        }
    }

    fn parse_group_list(&mut self, entries: &[toml::Value]) {
        for (index, entry) in entries.iter().enumerate() {
            let raw = match entry.clone().try_into::<RawGroup>() {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("skipping config group #{}: {}", index, e);
                    continue;
                }
            };
            if self.groups.contains_key(&raw.name) {
                warn!("config group '{}' defined twice, keeping the first", raw.name);
                continue;
            }

            let mut registers = Vec::with_capacity(raw.registers.len());
            for (reg_index, value) in raw.registers.into_iter().enumerate() {
                match value.try_into::<ConfigEntry>() {
                    Ok(entry) if entry.target().is_none() => {
                        warn!("{}: skipping '{}': invalid address", raw.name, entry.name)
                    }
                    Ok(entry) if entry.value < entry.min || entry.value > entry.max => {
                        warn!("{}: skipping '{}': value out of bounds", raw.name, entry.name)
                    }
                    Ok(entry) => registers.push(entry),
                    Err(e) => warn!("{}: skipping register #{}: {}", raw.name, reg_index, e),
                }
            }
            self.groups.insert(raw.name, registers);
        }
    }

    /// Look up a command by name.
    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    /// Look up a sequence by name.
    pub fn sequence(&self, name: &str) -> Option<&Sequence> {
        self.sequences.get(name)
    }

    /// Look up a slider by name.
    pub fn slider(&self, name: &str) -> Option<&Slider> {
        self.sliders.get(name)
    }

    /// Every slider name, in definition order.
    pub fn slider_names(&self) -> Vec<&str> {
        self.slider_order.iter().map(String::as_str).collect()
    }

    /// Every config group, keyed by group name.
    pub fn config_groups(&self) -> &BTreeMap<String, Vec<ConfigEntry>> {
        &self.groups
    }

    /// Registers of one config group, in definition order.
    pub fn config_group(&self, name: &str) -> Option<&[ConfigEntry]> {
        self.groups.get(name).map(Vec::as_slice)
    }
}

fn entries<'a>(doc: &'a toml::Table, key: &str) -> &'a [toml::Value] {
    match doc.get(key) {
        Some(toml::Value::Array(items)) => items.as_slice(),
        Some(_) => {
            warn!("'{}' is not an array of tables, ignored", key);
            &[]
        }
        None => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = r#"
        [[command]]
        name = "CFG_EN"
        high_addr = 90
        value = 1

        [[command]]
        name = "START_EN"
        high_addr = 93
        value = 0

        [[command]]
        name = "BIAS_BRT_I"
        high_addr = 22
        low_addr = 23
        value = 140
        min = 0
        max = 1023

        [[command]]
        name = "no address"
        value = 3

        [[command]]
        name = "out of bounds"
        high_addr = 1
        value = 50
        max = 10

        [[command]]
        name = "CFG_EN"
        high_addr = 91
        value = 7

        [[sequence]]
        name = "Enter CFG Mode"
        commands = ["START_EN", "CFG_EN"]

        [[sequence]]
        name = "Broken"
        commands = ["CFG_EN", "missing"]

        [[sequence]]
        name = 5

        [[slider]]
        name = "BRT"
        command = "BIAS_BRT_I"
        advanced = true

        [[slider]]
        name = "Hidden"
        command = "CFG_EN"
        value = 0
        shown = false

        [[slider]]
        name = "Dangling"
        command = "nope"

        [[group]]
        name = "Sensor_Core_Parameters"

        [[group.register]]
        name = "BIAS_EVT_VL"
        high_addr = 2
        low_addr = 3
        value = 341
        max = 1023

        [[group.register]]
        name = "COL_GAIN"
        high_addr = 45
        value = 1
        min = 1
        max = 3

        [[group.register]]
        name = "bad"
        high_addr = 46
        value = 9
        max = 3
    "#;

    #[test]
    fn test_parse_skips_malformed_entries() {
        let manager = SequenceManager::from_toml_str(DESCRIPTION).unwrap();

        assert!(manager.command("no address").is_none());
        assert!(manager.command("out of bounds").is_none());
        assert_eq!(manager.command("CFG_EN").unwrap().target, RegisterTarget::Single(90));

        let seq = manager.sequence("Enter CFG Mode").unwrap();
        let names: Vec<&str> = seq.commands.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["START_EN", "CFG_EN"]);
        assert!(manager.sequence("Broken").is_none());

        assert_eq!(manager.slider_names(), vec!["BRT", "Hidden"]);
        let brt = manager.slider("BRT").unwrap();
        assert_eq!(brt.value, 140);
        assert!(brt.shown && brt.advanced);
        assert!(!manager.slider("Hidden").unwrap().shown);
    }

    #[test]
    fn test_config_groups() {
        let manager = SequenceManager::from_toml_str(DESCRIPTION).unwrap();
        let group = manager.config_group("Sensor_Core_Parameters").unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(group[0].name, "BIAS_EVT_VL");
        assert_eq!(group[0].middle_addr, -1);
        assert_eq!(group[0].low_addr, 3);
        assert_eq!(group[1].target(), Some(RegisterTarget::Single(45)));
        assert!(manager.config_group("PLL_Parameters").is_none());
    }

    #[test]
    fn test_invalid_document_is_an_error() {
        assert!(matches!(
            SequenceManager::from_toml_str("[[command]\nname ="),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_builtin_descriptions_load() {
        let celex4 = SequenceManager::celex4_builtin().unwrap();
        assert!(celex4.sequence("Power Up").is_some());
        assert!(celex4.slider("REF+").is_some());

        let celex5 = SequenceManager::celex5_builtin().unwrap();
        for group in [
            "PLL_Parameters",
            "MIPI_Parameters",
            "Sensor_Core_Parameters",
            "Sensor_Operation_Mode_Control_Parameters",
            "Sensor_Data_Transfer_Parameters",
        ] {
            assert!(celex5.config_group(group).is_some(), "missing {group}");
        }
    }
}
