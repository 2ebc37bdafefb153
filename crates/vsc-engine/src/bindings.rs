//! Key Bindings
//!
//! Ordered action → key table. Predefined bindings come first; lookups
//! return the first match.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use vsc_dom::{KeyboardInit, Modifier};

/// Logical controller action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Display,
    Slower,
    Faster,
    Rewind,
    Advance,
    Reset,
    Fast,
    Muted,
    Softer,
    Louder,
    Pause,
    Mark,
    Jump,
    Drag,
    Blink,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Display => "display",
            Self::Slower => "slower",
            Self::Faster => "faster",
            Self::Rewind => "rewind",
            Self::Advance => "advance",
            Self::Reset => "reset",
            Self::Fast => "fast",
            Self::Muted => "muted",
            Self::Softer => "softer",
            Self::Louder => "louder",
            Self::Pause => "pause",
            Self::Mark => "mark",
            Self::Jump => "jump",
            Self::Drag => "drag",
            Self::Blink => "blink",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "display" => Self::Display,
            "slower" => Self::Slower,
            "faster" => Self::Faster,
            "rewind" => Self::Rewind,
            "advance" => Self::Advance,
            "reset" => Self::Reset,
            "fast" => Self::Fast,
            "muted" => Self::Muted,
            "softer" => Self::Softer,
            "louder" => Self::Louder,
            "pause" => Self::Pause,
            "mark" => Self::Mark,
            "jump" => Self::Jump,
            "drag" => Self::Drag,
            "blink" => Self::Blink,
            other => return Err(format!("unknown action: {other}")),
        })
    }
}

/// Modifier a binding can require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyModifier {
    Ctrl,
    Alt,
    Shift,
}

/// One key binding as persisted in `keyBindings`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyBinding {
    pub action: Action,
    /// Key code (0 when unbound)
    #[serde(default)]
    pub key: u32,
    #[serde(default)]
    pub modifiers: Vec<KeyModifier>,
    pub value: f64,
    /// Suppress the page's own handling of the key
    #[serde(default, deserialize_with = "bool_or_string")]
    pub force: bool,
    #[serde(default)]
    pub predefined: bool,
}

impl KeyBinding {
    pub fn new(action: Action, key: u32, value: f64) -> Self {
        Self {
            action,
            key,
            modifiers: Vec::new(),
            value,
            force: false,
            predefined: false,
        }
    }

    pub fn predefined(mut self) -> Self {
        self.predefined = true;
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn with_modifier(mut self, modifier: KeyModifier) -> Self {
        if !self.modifiers.contains(&modifier) {
            self.modifiers.push(modifier);
        }
        self
    }

    /// Ctrl and Alt must match exactly; Shift only when listed
    pub fn matches(&self, key: &KeyboardInit) -> bool {
        if self.key == 0 || self.key != key.key_code {
            return false;
        }
        let wants = |m| self.modifiers.contains(&m);
        wants(KeyModifier::Ctrl) == key.get_modifier_state(Modifier::Ctrl)
            && wants(KeyModifier::Alt) == key.get_modifier_state(Modifier::Alt)
            && (!wants(KeyModifier::Shift) || key.get_modifier_state(Modifier::Shift))
    }
}

/// `force` was historically stored as the strings "true"/"false"
fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(s) => match s.as_str() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid force flag: {other}"))),
        },
    }
}

/// Built-in bindings
pub fn default_bindings() -> Vec<KeyBinding> {
    vec![
        KeyBinding::new(Action::Display, 86, 0.0).predefined(),
        KeyBinding::new(Action::Slower, 83, 0.1).predefined(),
        KeyBinding::new(Action::Faster, 68, 0.1).predefined(),
        KeyBinding::new(Action::Rewind, 90, 10.0).predefined(),
        KeyBinding::new(Action::Advance, 88, 10.0).predefined(),
        KeyBinding::new(Action::Reset, 82, 1.0).predefined(),
        KeyBinding::new(Action::Fast, 71, 1.8).predefined(),
    ]
}

/// Ordered binding table
#[derive(Debug, Clone, PartialEq)]
pub struct KeyBindingTable {
    bindings: Vec<KeyBinding>,
}

impl Default for KeyBindingTable {
    fn default() -> Self {
        Self { bindings: default_bindings() }
    }
}

impl KeyBindingTable {
    /// Build from stored bindings. An empty list means the defaults; a
    /// missing `display` binding is restored.
    pub fn new(bindings: Vec<KeyBinding>) -> Self {
        if bindings.is_empty() {
            return Self::default();
        }
        let (mut ordered, custom): (Vec<_>, Vec<_>) = bindings.into_iter().partition(|b| b.predefined);
        ordered.extend(custom);
        if !ordered.iter().any(|b| b.action == Action::Display) {
            ordered.push(KeyBinding::new(Action::Display, 86, 0.0).predefined());
        }
        Self { bindings: ordered }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyBinding> {
        self.bindings.iter()
    }

    /// Value of the first binding for `action`
    pub fn value(&self, action: Action) -> Option<f64> {
        self.bindings.iter().find(|b| b.action == action).map(|b| b.value)
    }

    /// Rewrite the value of the first binding for `action` in place.
    /// Returns false when no such binding exists.
    pub fn set_value(&mut self, action: Action, value: f64) -> bool {
        match self.bindings.iter_mut().find(|b| b.action == action) {
            Some(binding) => {
                binding.value = value;
                true
            }
            None => false,
        }
    }

    /// First binding triggered by a key event
    pub fn find_by_key(&self, key: &KeyboardInit) -> Option<&KeyBinding> {
        self.bindings.iter().find(|b| b.matches(key))
    }

    /// Append a custom binding; earlier bindings keep precedence
    pub fn push(&mut self, binding: KeyBinding) {
        self.bindings.push(binding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let table = KeyBindingTable::default();
        assert_eq!(table.value(Action::Reset), Some(1.0));
        assert_eq!(table.value(Action::Fast), Some(1.8));
        assert_eq!(table.value(Action::Rewind), Some(10.0));
        assert_eq!(table.value(Action::Mark), None);
    }

    #[test]
    fn test_set_value_rewrites_first_binding() {
        let mut table = KeyBindingTable::new(vec![
            KeyBinding::new(Action::Reset, 82, 1.0).predefined(),
            KeyBinding::new(Action::Reset, 49, 2.0),
        ]);
        assert!(table.set_value(Action::Reset, 1.5));
        assert_eq!(table.value(Action::Reset), Some(1.5));
        assert_eq!(table.iter().nth(1).map(|b| b.value), Some(2.0));
        assert!(!table.set_value(Action::Jump, 1.0));
    }

    #[test]
    fn test_predefined_first_and_display_restored() {
        let table = KeyBindingTable::new(vec![
            KeyBinding::new(Action::Faster, 68, 0.5),
            KeyBinding::new(Action::Faster, 70, 0.1).predefined(),
        ]);
        let first = table.find_by_key(&KeyboardInit::new(70)).unwrap();
        assert!(first.predefined);
        assert_eq!(table.value(Action::Faster), Some(0.1));
        assert_eq!(table.value(Action::Display), Some(0.0));
    }

    #[test]
    fn test_pushed_binding_is_found_after_existing() {
        let mut table = KeyBindingTable::default();
        let before = table.len();
        table.push(KeyBinding::new(Action::Pause, 80, 0.0).with_modifier(KeyModifier::Alt));
        table.push(KeyBinding::new(Action::Louder, 68, 0.1));

        assert_eq!(table.len(), before + 2);
        let alt_p = KeyboardInit::new(80).with(Modifier::Alt);
        assert_eq!(table.find_by_key(&alt_p).map(|b| b.action), Some(Action::Pause));
        assert!(table.find_by_key(&KeyboardInit::new(80)).is_none());
        // D is already bound to faster
        assert_eq!(table.find_by_key(&KeyboardInit::new(68)).map(|b| b.action), Some(Action::Faster));
    }

    #[test]
    fn test_modifier_matching() {
        let plain = KeyBinding::new(Action::Faster, 68, 0.1);
        let shifted = KeyBinding::new(Action::Faster, 68, 0.1).with_modifier(KeyModifier::Shift);
        let ctrl = KeyBinding::new(Action::Faster, 68, 0.1).with_modifier(KeyModifier::Ctrl);

        let d = KeyboardInit::new(68);
        let shift_d = KeyboardInit::new(68).with(Modifier::Shift);
        let ctrl_d = KeyboardInit::new(68).with(Modifier::Ctrl);

        assert!(plain.matches(&d));
        assert!(plain.matches(&shift_d));
        assert!(!plain.matches(&ctrl_d));
        assert!(!shifted.matches(&d));
        assert!(shifted.matches(&shift_d));
        assert!(ctrl.matches(&ctrl_d));
        assert!(!ctrl.matches(&d));
    }

    #[test]
    fn test_deserialize_string_force() {
        let json = serde_json::json!([
            {"action": "pause", "key": 80, "value": 0, "force": "true", "predefined": false},
            {"action": "mark", "key": 77, "modifiers": ["Alt"], "value": 0, "force": false}
        ]);
        let bindings: Vec<KeyBinding> = serde_json::from_value(json).unwrap();
        assert!(bindings[0].force);
        assert_eq!(bindings[1].modifiers, vec![KeyModifier::Alt]);
        assert!(!bindings[1].force);
    }

    #[test]
    fn test_action_names_round_trip() {
        assert_eq!("louder".parse::<Action>(), Ok(Action::Louder));
        assert_eq!(Action::Blink.to_string(), "blink");
        assert!("speedup".parse::<Action>().is_err());
    }
}
