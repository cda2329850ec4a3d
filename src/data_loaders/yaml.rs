// ~/src/data_loaders/yaml.rs

use std::{fs, path::Path};

use serde_yaml::Value;

use crate::warn;

/// Reads and parses a YAML file. Missing files are silent, parse errors are logged.
pub fn load_yaml(path: &Path) -> Option<Value> {
    let txt = fs::read_to_string(path).ok()?;
    parse_yaml(&txt, path)
}

pub fn parse_yaml(txt: &str, origin: &Path) -> Option<Value> {
    match serde_yaml::from_str::<Value>(txt) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("[BADGES][CONFIG] Failed to parse {}: {}", origin.display(), e);
            None
        }
    }
}
