//! `set` and `unset` subcommands for the persisted config.

use std::error::Error;
use std::fmt::{self, Write as _};

use crate::core::config::data::path_display;
use crate::core::config::Config;

pub const KEYS: &[&str] = &[
    "base-url",
    "ws-url",
    "default-model",
    "default-tools",
    "default-data-sources",
    "reconnect-delay-ms",
    "max-reconnect-attempts",
];

/// Errors that can occur when modifying configuration settings.
#[derive(Debug, PartialEq, Eq)]
pub enum SettingError {
    /// The provided setting key is not recognized.
    UnknownKey(String),
    MissingValue(&'static str),
    /// The value could not be parsed as a whole number.
    InvalidNumber { key: &'static str, input: String },
}

impl fmt::Display for SettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingError::UnknownKey(key) => {
                write!(f, "Unknown config key: {key} (known keys: {})", KEYS.join(", "))
            }
            SettingError::MissingValue(key) => write!(f, "Missing value for {key}"),
            SettingError::InvalidNumber { key, input } => {
                write!(f, "Invalid value for {key}: {input} (expected a whole number)")
            }
        }
    }
}

impl Error for SettingError {}

fn canonical_key(key: &str) -> Result<&'static str, SettingError> {
    KEYS.iter()
        .copied()
        .find(|known| *known == key)
        .ok_or_else(|| SettingError::UnknownKey(key.to_string()))
}

/// Tool and data-source lists accept separate words, commas, or both.
fn split_list(value: &[String]) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in value.iter().flat_map(|word| word.split(',')) {
        let item = item.trim();
        if !item.is_empty() && !items.iter().any(|existing| existing == item) {
            items.push(item.to_string());
        }
    }
    items
}

fn parse_number<T: std::str::FromStr>(key: &'static str, input: &str) -> Result<T, SettingError> {
    input.parse().map_err(|_| SettingError::InvalidNumber {
        key,
        input: input.to_string(),
    })
}

/// Apply `key = value` to `config`. Returns the confirmation to print.
pub fn set_value(config: &mut Config, key: &str, value: &[String]) -> Result<String, SettingError> {
    let key = canonical_key(key)?;
    let joined = value.join(" ");
    let joined = joined.trim();
    if joined.is_empty() {
        return Err(SettingError::MissingValue(key));
    }

    match key {
        "base-url" => config.base_url = Some(joined.to_string()),
        "ws-url" => config.ws_url = Some(joined.to_string()),
        "default-model" => config.default_model = Some(joined.to_string()),
        "default-tools" => config.default_tools = split_list(value),
        "default-data-sources" => config.default_data_sources = split_list(value),
        "reconnect-delay-ms" => config.reconnect_delay_ms = Some(parse_number(key, joined)?),
        "max-reconnect-attempts" => {
            config.max_reconnect_attempts = Some(parse_number(key, joined)?)
        }
        _ => return Err(SettingError::UnknownKey(key.to_string())),
    }
    Ok(format!("✅ Set {key} to: {}", current_value(config, key)))
}

pub fn unset_value(config: &mut Config, key: &str) -> Result<String, SettingError> {
    let key = canonical_key(key)?;
    match key {
        "base-url" => config.base_url = None,
        "ws-url" => config.ws_url = None,
        "default-model" => config.default_model = None,
        "default-tools" => config.default_tools.clear(),
        "default-data-sources" => config.default_data_sources.clear(),
        "reconnect-delay-ms" => config.reconnect_delay_ms = None,
        "max-reconnect-attempts" => config.max_reconnect_attempts = None,
        _ => return Err(SettingError::UnknownKey(key.to_string())),
    }
    Ok(format!("✅ Unset {key}"))
}

fn current_value(config: &Config, key: &str) -> String {
    fn or_unset(value: Option<String>) -> String {
        value.unwrap_or_else(|| "(unset)".to_string())
    }
    fn list(items: &[String]) -> String {
        if items.is_empty() {
            "(none set)".to_string()
        } else {
            items.join(", ")
        }
    }

    match key {
        "base-url" => or_unset(config.base_url.clone()),
        "ws-url" => or_unset(config.ws_url.clone()),
        "default-model" => or_unset(config.default_model.clone()),
        "default-tools" => list(&config.default_tools),
        "default-data-sources" => list(&config.default_data_sources),
        "reconnect-delay-ms" => or_unset(config.reconnect_delay_ms.map(|ms| ms.to_string())),
        "max-reconnect-attempts" => {
            or_unset(config.max_reconnect_attempts.map(|max| max.to_string()))
        }
        _ => String::new(),
    }
}

pub fn render_settings(config: &Config) -> String {
    let mut out = String::from("Current configuration:\n");
    for key in KEYS {
        let _ = writeln!(out, "  {key}: {}", current_value(config, key));
    }
    out
}

/// `galaxy-chat set [KEY VALUE...]`. Without a key, prints every setting.
pub fn run_set(key: Option<String>, value: Vec<String>) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load()?;
    let Some(key) = key else {
        print!("{}", render_settings(&config));
        return Ok(());
    };

    match set_value(&mut config, &key, &value) {
        Ok(message) => {
            config.save()?;
            println!("{message}");
            println!("Saved to {}", path_display(Config::config_path()?));
            Ok(())
        }
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    }
}

pub fn run_unset(key: String) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load()?;
    match unset_value(&mut config, &key) {
        Ok(message) => {
            config.save()?;
            println!("{message}");
            println!("Saved to {}", path_display(Config::config_path()?));
            Ok(())
        }
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    }
}
