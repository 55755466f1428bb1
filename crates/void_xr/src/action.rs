//! Action snapshots handed to renderers

use std::collections::BTreeMap;
use std::time::Duration;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::Pose;

/// Runtime action type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Boolean,
    Float,
    Vector2,
    Pose,
    /// Haptic output; has no readable state
    Vibration,
}

impl ActionKind {
    /// Whether the runtime can be queried for a state of this kind
    pub fn has_state(self) -> bool {
        !matches!(self, ActionKind::Vibration)
    }

    pub fn default_state(self) -> ActionState {
        match self {
            ActionKind::Boolean => ActionState::Bool(false),
            ActionKind::Float => ActionState::Float(0.0),
            ActionKind::Vector2 => ActionState::Vector2(Vec2::ZERO),
            ActionKind::Pose => ActionState::Pose(Pose::IDENTITY),
            ActionKind::Vibration => ActionState::Vibration,
        }
    }
}

/// Last known value of an action
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ActionState {
    Bool(bool),
    Float(f32),
    Vector2(Vec2),
    Pose(Pose),
    Vibration,
}

impl ActionState {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionState::Bool(_) => ActionKind::Boolean,
            ActionState::Float(_) => ActionKind::Float,
            ActionState::Vector2(_) => ActionKind::Vector2,
            ActionState::Pose(_) => ActionKind::Pose,
            ActionState::Vibration => ActionKind::Vibration,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ActionState::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            ActionState::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector2(&self) -> Option<Vec2> {
        match self {
            ActionState::Vector2(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_pose(&self) -> Option<Pose> {
        match self {
            ActionState::Pose(v) => Some(*v),
            _ => None,
        }
    }
}

/// One action as seen by the renderer.
///
/// `value` is the last value reported while the action was active; it is
/// not reset when the runtime reports the action inactive, so check
/// `is_active` before trusting it.
#[derive(Clone, Debug, PartialEq)]
pub struct Action {
    pub name: String,
    pub kind: ActionKind,
    pub is_active: bool,
    pub changed: bool,
    pub value: ActionState,
}

impl Action {
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            is_active: false,
            changed: false,
            value: kind.default_state(),
        }
    }
}

/// Named set of actions
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActionSet {
    pub name: String,
    pub actions: BTreeMap<String, Action>,
}

impl ActionSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, action: Action) {
        self.actions.insert(action.name.clone(), action);
    }

    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Action> {
        self.actions.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }
}

/// Haptic pulse requested by a renderer
#[derive(Clone, Debug, PartialEq)]
pub struct Vibrate {
    /// Name of the vibration action to pulse
    pub action: String,
    /// `None` requests the runtime's minimum pulse
    pub duration: Option<Duration>,
    /// Hz; `None` lets the runtime choose
    pub frequency: Option<f32>,
    pub amplitude: f32,
}

impl Vibrate {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            duration: None,
            frequency: None,
            amplitude: 0.5,
        }
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn frequency(mut self, hz: f32) -> Self {
        self.frequency = Some(hz);
        self
    }

    pub fn amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }
}

/// Which action sets are synchronized each frame
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ActionSetSelector {
    #[default]
    All,
    Named(Vec<String>),
}

impl ActionSetSelector {
    pub fn includes(&self, name: &str) -> bool {
        match self {
            ActionSetSelector::All => true,
            ActionSetSelector::Named(names) => names.iter().any(|n| n == name),
        }
    }
}
