//! Input sources, interaction profiles and action paths

use serde::{Deserialize, Serialize};

use crate::action::ActionKind;
use crate::error::{XrError, XrResult};

/// Top-level user path
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    HandLeft,
    HandRight,
    Head,
    Gamepad,
    Treadmill,
}

impl Source {
    pub fn path(self) -> &'static str {
        match self {
            Source::HandLeft => "/user/hand/left",
            Source::HandRight => "/user/hand/right",
            Source::Head => "/user/head",
            Source::Gamepad => "/user/gamepad",
            Source::Treadmill => "/user/treadmill",
        }
    }
}

/// Input or output on a device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identifier {
    Menu,
    Select,
    Trackpad,
    Thumbstick,
    Joystick,
    Trigger,
    Throttle,
    Trackball,
    Pedal,
    System,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    A,
    B,
    X,
    Y,
    VolumeUp,
    VolumeDown,
    Thumbrest,
    Shoulder,
    Squeeze,
    Wheel,
    Grip,
    Aim,
    Haptic,
}

/// Component of an identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Click,
    Touch,
    Force,
    Value,
    X,
    Y,
    Twist,
    /// Both axes of a stick or trackpad
    Vector2,
    Pose,
    Vibrate,
}

impl Component {
    /// Path suffix; `None` when the identifier path is used as is
    pub fn path(self) -> Option<&'static str> {
        match self {
            Component::Click => Some("click"),
            Component::Touch => Some("touch"),
            Component::Force => Some("force"),
            Component::Value => Some("value"),
            Component::X => Some("x"),
            Component::Y => Some("y"),
            Component::Twist => Some("twist"),
            Component::Pose => Some("pose"),
            Component::Vector2 | Component::Vibrate => None,
        }
    }

    /// Action type a binding to this component creates
    pub fn action_kind(self) -> ActionKind {
        match self {
            Component::Click | Component::Touch => ActionKind::Boolean,
            Component::Force
            | Component::Value
            | Component::Twist
            | Component::X
            | Component::Y => ActionKind::Float,
            Component::Vector2 => ActionKind::Vector2,
            Component::Pose => ActionKind::Pose,
            Component::Vibrate => ActionKind::Vibration,
        }
    }
}

/// Source, identifier and component of one binding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputBinding {
    pub source: Source,
    pub identifier: Identifier,
    pub component: Component,
}

impl InputBinding {
    pub fn new(source: Source, identifier: Identifier, component: Component) -> Self {
        Self {
            source,
            identifier,
            component,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.component.action_kind()
    }
}

/// Controller profile bindings are suggested for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionProfile {
    /// Khronos simple controller
    #[default]
    Simple,
    /// Oculus Touch controller
    OculusTouch,
}

impl InteractionProfile {
    pub fn profile_path(self) -> &'static str {
        match self {
            InteractionProfile::Simple => "/interaction_profiles/khr/simple_controller",
            InteractionProfile::OculusTouch => "/interaction_profiles/oculus/touch_controller",
        }
    }

    /// Full input path for a binding, e.g. `/user/hand/left/input/select/click`
    pub fn path(self, binding: &InputBinding) -> XrResult<String> {
        let identifier = self.map_identifier(binding.source, binding.identifier)?;
        let identifier = self.identifier_path(identifier)?;

        let mut path = format!("{}/{}", binding.source.path(), identifier);
        if let Some(component) = binding.component.path() {
            path.push('/');
            path.push_str(component);
        }
        Ok(path)
    }

    fn map_identifier(self, source: Source, identifier: Identifier) -> XrResult<Identifier> {
        if self != InteractionProfile::OculusTouch {
            return Ok(identifier);
        }
        // Touch controllers carry X/Y on the left hand and A/B on the right
        let mapped = match (source, identifier) {
            (Source::HandLeft, Identifier::A) => Identifier::X,
            (Source::HandLeft, Identifier::B) => Identifier::Y,
            (Source::HandRight, Identifier::X) => Identifier::A,
            (Source::HandRight, Identifier::Y) => Identifier::B,
            (Source::HandRight, Identifier::Menu) => {
                return Err(XrError::InvalidConfig(
                    "menu is not available on the right hand".into(),
                ))
            }
            (_, other) => other,
        };
        Ok(mapped)
    }

    fn identifier_path(self, identifier: Identifier) -> XrResult<&'static str> {
        let path = match (self, identifier) {
            (_, Identifier::Menu) => "input/menu",
            (_, Identifier::Grip) => "input/grip",
            (_, Identifier::Aim) => "input/aim",
            (_, Identifier::Haptic) => "output/haptic",
            (InteractionProfile::Simple, Identifier::Select) => "input/select",
            (InteractionProfile::OculusTouch, Identifier::X) => "input/x",
            (InteractionProfile::OculusTouch, Identifier::Y) => "input/y",
            (InteractionProfile::OculusTouch, Identifier::A) => "input/a",
            (InteractionProfile::OculusTouch, Identifier::B) => "input/b",
            (InteractionProfile::OculusTouch, Identifier::Squeeze) => "input/squeeze",
            (InteractionProfile::OculusTouch, Identifier::Trigger) => "input/trigger",
            (InteractionProfile::OculusTouch, Identifier::Thumbstick) => "input/thumbstick",
            (InteractionProfile::OculusTouch, Identifier::Thumbrest) => "input/thumbrest",
            (profile, identifier) => {
                return Err(XrError::InvalidConfig(format!(
                    "{:?} not supported by profile {}",
                    identifier,
                    profile.profile_path()
                )))
            }
        };
        Ok(path)
    }
}
