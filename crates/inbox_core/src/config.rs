use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use shared::domain::DeviceType;

pub const DEFAULT_SETTINGS_FILE: &str = "inbox.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Device class whose badge counts are surfaced.
    pub device_type: DeviceType,
    pub priority_unbox_count: usize,
    pub unbox_timeout_ms: u64,
    pub drain_interval_ms: u64,
    pub max_pending_items: usize,
    pub full_reload_backlog: u64,
    pub snippet_max_chars: usize,
    pub auto_select_first: bool,
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            device_type: DeviceType::Desktop,
            priority_unbox_count: 20,
            unbox_timeout_ms: 30_000,
            drain_interval_ms: 100,
            max_pending_items: 1024,
            full_reload_backlog: 200,
            snippet_max_chars: 100,
            auto_select_first: true,
            event_capacity: 1024,
        }
    }
}

impl EngineSettings {
    pub fn unbox_timeout(&self) -> Duration {
        Duration::from_millis(self.unbox_timeout_ms)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    /// Auto-selection only applies to desktop clients.
    pub fn selects_first_unboxed(&self) -> bool {
        self.auto_select_first && self.device_type == DeviceType::Desktop
    }
}

/// Defaults, then `inbox.toml` in the working directory, then `APP__*` env vars.
pub fn load_settings() -> EngineSettings {
    let settings = match load_settings_file(Path::new(DEFAULT_SETTINGS_FILE)) {
        Ok(Some(settings)) => settings,
        Ok(None) => EngineSettings::default(),
        Err(err) => {
            tracing::warn!("config: ignoring unreadable {DEFAULT_SETTINGS_FILE}: {err:#}");
            EngineSettings::default()
        }
    };
    apply_env_overrides(settings, |key| std::env::var(key).ok())
}

pub fn load_settings_file(path: &Path) -> anyhow::Result<Option<EngineSettings>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };
    let settings = toml::from_str::<EngineSettings>(&raw)
        .with_context(|| format!("invalid settings in '{}'", path.display()))?;
    Ok(Some(settings))
}

fn apply_env_overrides(
    mut settings: EngineSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> EngineSettings {
    if let Some(v) = lookup("APP__DEVICE_TYPE") {
        if v.eq_ignore_ascii_case("mobile") {
            settings.device_type = DeviceType::Mobile;
        } else if v.eq_ignore_ascii_case("desktop") {
            settings.device_type = DeviceType::Desktop;
        }
    }
    if let Some(parsed) = lookup("APP__PRIORITY_UNBOX_COUNT").and_then(|v| v.parse().ok()) {
        settings.priority_unbox_count = parsed;
    }
    if let Some(parsed) = lookup("APP__UNBOX_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        settings.unbox_timeout_ms = parsed;
    }
    if let Some(parsed) = lookup("APP__DRAIN_INTERVAL_MS").and_then(|v| v.parse().ok()) {
        settings.drain_interval_ms = parsed;
    }
    if let Some(parsed) = lookup("APP__MAX_PENDING_ITEMS").and_then(|v| v.parse().ok()) {
        settings.max_pending_items = parsed;
    }
    if let Some(parsed) = lookup("APP__FULL_RELOAD_BACKLOG").and_then(|v| v.parse().ok()) {
        settings.full_reload_backlog = parsed;
    }
    if let Some(parsed) = lookup("APP__SNIPPET_MAX_CHARS").and_then(|v| v.parse().ok()) {
        settings.snippet_max_chars = parsed;
    }
    if let Some(parsed) = lookup("APP__AUTO_SELECT_FIRST").and_then(|v| v.parse().ok()) {
        settings.auto_select_first = parsed;
    }
    settings
}
