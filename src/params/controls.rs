//! Keyboard bindings for camera and render-loop controls.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use winit::keyboard::KeyCode;

/// Actions bound to keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    MoveForward,
    MoveBackward,
    MoveLeft,
    MoveRight,
    MoveForwardLeft,
    MoveForwardRight,
    MoveBackwardLeft,
    MoveBackwardRight,
    TurnLeft,
    TurnRight,
    PitchUp,
    PitchDown,
    ZoomIn,
    ZoomOut,
    PauseResume,
}

impl Control {
    pub const ALL: [Control; 15] = [
        Control::MoveForward,
        Control::MoveBackward,
        Control::MoveLeft,
        Control::MoveRight,
        Control::MoveForwardLeft,
        Control::MoveForwardRight,
        Control::MoveBackwardLeft,
        Control::MoveBackwardRight,
        Control::TurnLeft,
        Control::TurnRight,
        Control::PitchUp,
        Control::PitchDown,
        Control::ZoomIn,
        Control::ZoomOut,
        Control::PauseResume,
    ];

    /// Factory binding: numpad for panning, arrows for orientation
    pub fn default_key(self) -> KeyCode {
        match self {
            Control::MoveForward => KeyCode::Numpad8,
            Control::MoveBackward => KeyCode::Numpad2,
            Control::MoveLeft => KeyCode::Numpad4,
            Control::MoveRight => KeyCode::Numpad6,
            Control::MoveForwardLeft => KeyCode::Numpad7,
            Control::MoveForwardRight => KeyCode::Numpad9,
            Control::MoveBackwardLeft => KeyCode::Numpad1,
            Control::MoveBackwardRight => KeyCode::Numpad3,
            Control::TurnLeft => KeyCode::ArrowLeft,
            Control::TurnRight => KeyCode::ArrowRight,
            Control::PitchUp => KeyCode::ArrowUp,
            Control::PitchDown => KeyCode::ArrowDown,
            Control::ZoomIn => KeyCode::NumpadAdd,
            Control::ZoomOut => KeyCode::NumpadSubtract,
            Control::PauseResume => KeyCode::Pause,
        }
    }
}

/// Control → key map. Controls missing from a configuration file keep their
/// factory binding. A key belongs to at most one control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Control, KeyCode>", into = "BTreeMap<Control, KeyCode>")]
pub struct KeyBindings {
    keys: BTreeMap<Control, KeyCode>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            keys: Control::ALL
                .into_iter()
                .map(|control| (control, control.default_key()))
                .collect(),
        }
    }
}

impl From<BTreeMap<Control, KeyCode>> for KeyBindings {
    fn from(overrides: BTreeMap<Control, KeyCode>) -> Self {
        let mut bindings = Self::default();
        for (control, key) in overrides {
            bindings.bind(control, key);
        }
        bindings
    }
}

impl From<KeyBindings> for BTreeMap<Control, KeyCode> {
    fn from(bindings: KeyBindings) -> Self {
        bindings.keys
    }
}

impl KeyBindings {
    pub fn key(&self, control: Control) -> Option<KeyCode> {
        self.keys.get(&control).copied()
    }

    /// Bind `key` to `control`, unbinding any other control that held it
    pub fn bind(&mut self, control: Control, key: KeyCode) {
        let displaced: Vec<Control> = self
            .keys
            .iter()
            .filter(|(other, bound)| **other != control && **bound == key)
            .map(|(other, _)| *other)
            .collect();
        for other in displaced {
            log::warn!("{:?} is now bound to {:?}, unbinding {:?}", key, control, other);
            self.keys.remove(&other);
        }
        self.keys.insert(control, key);
    }

    /// Control bound to `key`, if any
    pub fn control(&self, key: KeyCode) -> Option<Control> {
        self.keys
            .iter()
            .find(|(_, bound)| **bound == key)
            .map(|(control, _)| *control)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_control_has_a_default() {
        let bindings = KeyBindings::default();
        for control in Control::ALL {
            assert_eq!(bindings.key(control), Some(control.default_key()));
            assert_eq!(bindings.control(control.default_key()), Some(control));
        }
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let bindings: KeyBindings = serde_json::from_str(r#"{ "turn_left": "KeyA" }"#).unwrap();
        assert_eq!(bindings.key(Control::TurnLeft), Some(KeyCode::KeyA));
        assert_eq!(bindings.key(Control::TurnRight), Some(KeyCode::ArrowRight));
        assert_eq!(bindings.control(KeyCode::KeyA), Some(Control::TurnLeft));
    }

    #[test]
    fn test_override_takes_key_from_factory_binding() {
        let bindings: KeyBindings =
            serde_json::from_str(r#"{ "turn_left": "ArrowRight" }"#).unwrap();
        assert_eq!(bindings.control(KeyCode::ArrowRight), Some(Control::TurnLeft));
        assert_eq!(bindings.key(Control::TurnLeft), Some(KeyCode::ArrowRight));
        assert_eq!(bindings.key(Control::TurnRight), None);
        assert_eq!(bindings.control(KeyCode::ArrowLeft), None);
    }

    #[test]
    fn test_every_key_has_one_owner() {
        let bindings: KeyBindings =
            serde_json::from_str(r#"{ "pitch_up": "KeyW", "pitch_down": "KeyW" }"#).unwrap();
        let owners = Control::ALL
            .into_iter()
            .filter(|control| bindings.key(*control) == Some(KeyCode::KeyW))
            .count();
        assert_eq!(owners, 1);
        assert!(bindings.control(KeyCode::KeyW).is_some());
    }

    #[test]
    fn test_rebinding_same_control_keeps_it() {
        let mut bindings = KeyBindings::default();
        bindings.bind(Control::ZoomIn, KeyCode::NumpadAdd);
        assert_eq!(bindings.key(Control::ZoomIn), Some(KeyCode::NumpadAdd));
        assert_eq!(bindings.control(KeyCode::NumpadAdd), Some(Control::ZoomIn));
    }

    #[test]
    fn test_unbound_key() {
        assert_eq!(KeyBindings::default().control(KeyCode::KeyQ), None);
    }
}
