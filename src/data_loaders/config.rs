use std::{path::Path, time::Duration};

use serde_yaml::{Mapping, Value};

use super::yaml::load_yaml;
use crate::{failure_guard::FailurePolicy, renderer::Size};

#[derive(Debug, Clone)]
pub struct BadgeConfig {
    pub enabled: bool,
    pub debug: bool,
    pub log_level: String,
    pub throttle: ThrottleSettings,
    pub failures: FailureSettings,
    pub thumbnail: ThumbnailSettings,
    pub live_preview: LivePreviewSettings,
}

#[derive(Debug, Clone)]
pub struct ThrottleSettings {
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct FailureSettings {
    pub ceiling: u32,
    pub reset_on_success: bool,
}

#[derive(Debug, Clone)]
pub struct ThumbnailSettings {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct LivePreviewSettings {
    pub offset_x: i32,
    pub offset_y: i32,
}

impl Default for BadgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debug: false,
            log_level: "warn".to_string(),
            throttle: ThrottleSettings::default(),
            failures: FailureSettings::default(),
            thumbnail: ThumbnailSettings::default(),
            live_preview: LivePreviewSettings::default(),
        }
    }
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            min_interval_ms: 250,
            max_interval_ms: 1000,
        }
    }
}

impl Default for FailureSettings {
    fn default() -> Self {
        Self {
            ceiling: 13,
            reset_on_success: false,
        }
    }
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            width: 196,
            height: 106,
        }
    }
}

impl Default for LivePreviewSettings {
    fn default() -> Self {
        Self {
            offset_x: 8,
            offset_y: 8,
        }
    }
}

impl ThrottleSettings {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

impl FailureSettings {
    pub fn policy(&self) -> FailurePolicy {
        if self.reset_on_success {
            FailurePolicy::Consecutive
        } else {
            FailurePolicy::Cumulative
        }
    }
}

impl ThumbnailSettings {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl BadgeConfig {
    pub fn load(path: &Path) -> Option<Self> {
        let value = load_yaml(path)?;
        Self::from_yaml(&value)
    }

    pub fn from_yaml(root: &Value) -> Option<Self> {
        let map = root.as_mapping()?;
        let mut config = Self::default();

        config.enabled = bool_any(map, &["enabled", "solution_badges"]).unwrap_or(config.enabled);
        config.debug = bool_any(map, &["debug", "debug_mode"]).unwrap_or(config.debug);
        config.log_level = str_any(map, &["log_level", "logging"])
            .unwrap_or(&config.log_level)
            .to_lowercase();

        if let Some(throttle) = mapping_at(map, "throttle") {
            config.throttle.min_interval_ms = u64_any(throttle, &["min_interval_ms", "min_ms"])
                .unwrap_or(config.throttle.min_interval_ms)
                .max(10);
            config.throttle.max_interval_ms = u64_any(throttle, &["max_interval_ms", "max_ms"])
                .unwrap_or(config.throttle.max_interval_ms)
                .max(config.throttle.min_interval_ms);
        }

        if let Some(failures) = mapping_at(map, "failures") {
            config.failures.ceiling = u64_any(failures, &["ceiling", "max_failures", "max_failure_count"])
                .map(|v| v.min(u32::MAX as u64) as u32)
                .unwrap_or(config.failures.ceiling)
                .max(1);
            config.failures.reset_on_success = bool_any(failures, &["reset_on_success", "consecutive"])
                .unwrap_or(config.failures.reset_on_success);
        }

        if let Some(thumbnail) = mapping_at(map, "thumbnail") {
            config.thumbnail.width = u64_at(thumbnail, "width")
                .map(|v| v.clamp(1, 1024) as u32)
                .unwrap_or(config.thumbnail.width);
            config.thumbnail.height = u64_at(thumbnail, "height")
                .map(|v| v.clamp(1, 1024) as u32)
                .unwrap_or(config.thumbnail.height);
        }

        if let Some(preview) = mapping_at(map, "live_preview") {
            config.live_preview.offset_x =
                i32_at(preview, "offset_x").unwrap_or(config.live_preview.offset_x);
            config.live_preview.offset_y =
                i32_at(preview, "offset_y").unwrap_or(config.live_preview.offset_y);
        }

        Some(config)
    }
}

fn bool_at(map: &Mapping, key: &str) -> Option<bool> {
    map.get(Value::String(key.to_string()))?.as_bool()
}

fn bool_any(map: &Mapping, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| bool_at(map, k))
}

fn str_at<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(Value::String(key.to_string()))?.as_str()
}

fn str_any<'a>(map: &'a Mapping, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| str_at(map, k))
}

fn mapping_at<'a>(map: &'a Mapping, key: &str) -> Option<&'a Mapping> {
    map.get(Value::String(key.to_string()))?.as_mapping()
}

fn u64_at(map: &Mapping, key: &str) -> Option<u64> {
    map.get(Value::String(key.to_string()))?
        .as_i64()
        .and_then(|v| if v >= 0 { Some(v as u64) } else { None })
}

fn u64_any(map: &Mapping, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| u64_at(map, k))
}

fn i32_at(map: &Mapping, key: &str) -> Option<i32> {
    map.get(Value::String(key.to_string()))?
        .as_i64()
        .and_then(|v| i32::try_from(v).ok())
}
