//! Extension Configuration
//!
//! Settings live in an external key-value store. Each key is read on its
//! own; a key that fails to decode keeps its default.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::bindings::{default_bindings, KeyBinding};
use crate::blacklist::DEFAULT_BLACKLIST;
use crate::{Error, Result};

/// Key-value settings storage
pub trait SettingsStore {
    fn get(&self, key: &str) -> Option<serde_json::Value>;

    /// Fire-and-forget write
    fn set(&mut self, key: &str, value: serde_json::Value);
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, serde_json::Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: serde_json::Value) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: serde_json::Value) {
        self.values.insert(key.to_string(), value);
    }
}

/// Extension settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub enabled: bool,
    pub start_hidden: bool,
    pub remember_speed: bool,
    pub force_last_saved_speed: bool,
    /// Also control `<audio>` elements
    pub audio_boolean: bool,
    pub controller_opacity: f64,
    pub blacklist: String,
    pub key_bindings: Vec<KeyBinding>,
    pub last_speed: f64,
    /// Speed per media source URL
    pub speeds: HashMap<String, f64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            start_hidden: false,
            remember_speed: false,
            force_last_saved_speed: false,
            audio_boolean: false,
            controller_opacity: 0.3,
            blacklist: DEFAULT_BLACKLIST.to_string(),
            key_bindings: default_bindings(),
            last_speed: 1.0,
            speeds: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load every key from `store`, keeping defaults for missing or
    /// malformed keys
    pub fn load(store: &dyn SettingsStore) -> Self {
        let mut settings = Self::default();
        load_key(store, "enabled", &mut settings.enabled);
        load_key(store, "startHidden", &mut settings.start_hidden);
        load_key(store, "rememberSpeed", &mut settings.remember_speed);
        load_key(store, "forceLastSavedSpeed", &mut settings.force_last_saved_speed);
        load_key(store, "audioBoolean", &mut settings.audio_boolean);
        load_key(store, "controllerOpacity", &mut settings.controller_opacity);
        load_key(store, "blacklist", &mut settings.blacklist);
        load_key(store, "keyBindings", &mut settings.key_bindings);
        load_key(store, "lastSpeed", &mut settings.last_speed);
        load_key(store, "speeds", &mut settings.speeds);

        if settings.key_bindings.is_empty() {
            settings.key_bindings = default_bindings();
        }
        settings
    }
}

fn read_key<T: DeserializeOwned>(store: &dyn SettingsStore, key: &str) -> Result<Option<T>> {
    let Some(value) = store.get(key) else {
        return Ok(None);
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| Error::Setting { key: key.to_string(), source })
}

fn load_key<T: DeserializeOwned>(store: &dyn SettingsStore, key: &str, slot: &mut T) {
    match read_key(store, key) {
        Ok(Some(value)) => *slot = value,
        Ok(None) => {}
        Err(err) => tracing::warn!("{}; keeping default", err),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::bindings::Action;

    #[test]
    fn test_defaults_from_empty_store() {
        let settings = Settings::load(&MemoryStore::new());
        assert_eq!(settings, Settings::default());
        assert!(settings.enabled);
        assert_eq!(settings.controller_opacity, 0.3);
        assert_eq!(settings.key_bindings.len(), 7);
    }

    #[test]
    fn test_malformed_key_keeps_default() {
        let store = MemoryStore::new()
            .with("rememberSpeed", json!(true))
            .with("controllerOpacity", json!("very"))
            .with("lastSpeed", json!(1.75));
        let settings = Settings::load(&store);
        assert!(settings.remember_speed);
        assert_eq!(settings.controller_opacity, 0.3);
        assert_eq!(settings.last_speed, 1.75);
    }

    #[test]
    fn test_empty_bindings_fall_back_to_defaults() {
        let store = MemoryStore::new().with("keyBindings", json!([]));
        let settings = Settings::load(&store);
        assert_eq!(settings.key_bindings, default_bindings());
    }

    #[test]
    fn test_stored_bindings_and_speeds() {
        let store = MemoryStore::new()
            .with("keyBindings", json!([
                {"action": "faster", "key": 187, "value": 0.25, "force": "true", "predefined": true}
            ]))
            .with("speeds", json!({"https://cdn.example.com/a.mp4": 1.5}));
        let settings = Settings::load(&store);
        assert_eq!(settings.key_bindings[0].action, Action::Faster);
        assert!(settings.key_bindings[0].force);
        assert_eq!(settings.speeds.get("https://cdn.example.com/a.mp4"), Some(&1.5));
    }

    #[test]
    fn test_store_set_overwrites() {
        let mut store = MemoryStore::new();
        store.set("lastSpeed", json!(2.0));
        store.set("lastSpeed", json!(2.5));
        assert_eq!(store.get("lastSpeed"), Some(json!(2.5)));
    }
}
