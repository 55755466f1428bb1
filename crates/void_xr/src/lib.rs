//! # void_xr - XR Session Lifecycle and Frame Orchestration
//!
//! Drives a head-mounted-display application against an XR device runtime:
//! - Instance bootstrap with bounded retries
//! - Session lifecycle as an explicit state machine fed by runtime events
//! - Per-frame protocol (wait, begin, acquire, locate, sync input, render, end)
//! - Pluggable renderers and graphics services
//!
//! ## Architecture
//!
//! ```text
//! Application ── ContextCreation ──► Context (instance + system + graphics)
//!      │              ▲ retried through Backoff
//!      ▼
//! SessionService ── SessionState ──► frame protocol ──► Renderer
//!      │                                   │
//!      └──────────── XrSession ◄───────────┘  (OpenXR or stub runtime)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use void_xr::prelude::*;
//!
//! let creation = ContextCreation::headless().app_name("demo");
//! let config = SessionConfig::new().add_swapchain(
//!     SwapchainSpec::new("color").format(formats::R8G8B8A8_UNORM).size(1024, 1024).color_attachment(),
//! );
//!
//! let mut app = Application::new(
//!     creation,
//!     config,
//!     Box::new(StubRuntime::new().auto_lifecycle(Some(600))),
//!     Box::new(NullRenderer),
//!     Box::new(|_| Ok(Box::new(HeadlessGraphicsService::new()) as Box<dyn GraphicsService>)),
//! );
//! app.run()?;
//! ```
//!
//! ## Features
//!
//! - `openxr-backend`: real runtime through the `openxr` crate
//! - `vulkan`: bind sessions to a Vulkan device instead of the headless API

pub mod action;
pub mod application;
pub mod backoff;
pub mod config;
pub mod context;
pub mod error;
pub mod frame;
pub mod graphics;
pub mod input;
pub mod layer;
pub mod renderer;
pub mod runtime;
pub mod session;
pub mod stub;

#[cfg(feature = "openxr-backend")]
pub mod openxr_backend;

#[cfg(feature = "openxr-backend")]
pub use openxr_backend::OpenXrLoader;

use glam::{Mat4, Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

pub use action::{Action, ActionKind, ActionSet, ActionSetSelector, ActionState, Vibrate};
pub use application::{Application, GraphicsFactory, TerminationHandle, UnknownEventPolicy};
pub use backoff::Backoff;
pub use config::{formats, ActionSetSpec, ActionSpec, ReferenceSpaceSpec, SessionConfig, SwapchainSpec, SwapchainUsage};
pub use context::{Context, ContextCreation};
pub use error::{RuntimeError, RuntimeResult, XrError, XrResult};
pub use frame::{FrameInfo, FrameState, FrameTiming, ImageId, SpaceLocation, View, ViewInfo, ViewState};
pub use graphics::{GraphicsApi, GraphicsBinding, GraphicsContext, GraphicsContextCreation, GraphicsService, HeadlessContextCreation, HeadlessGraphicsService, Swapchain, VulkanContextCreation};
pub use input::{Component, Identifier, InputBinding, InteractionProfile, Source};
pub use layer::{BlendMode, CompositionLayer, EyeVisibility, FrameEnd, ProjectionView, Rect2D, SubImage};
pub use renderer::{NullRenderer, Renderer};
pub use runtime::{
    ActionHandle, ActionSetHandle, GraphicsRequirements, InstanceProperties, InstanceRequest, Location,
    RawActionState, RuntimeEvent, RuntimeLoader, SpaceHandle, SwapchainHandle, SystemId, SystemProperties,
    XrInstance, XrSession,
};
pub use session::{SessionService, SessionState};
pub use stub::{RuntimeCall, StubRuntime};

/// Runtime version number (major.minor.patch)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u16, minor: u16, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Pack as an OpenXR `XrVersion`
    pub fn to_xr(self) -> u64 {
        ((self.major as u64) << 48) | ((self.minor as u64) << 32) | self.patch as u64
    }

    /// Unpack an OpenXR `XrVersion`
    pub fn from_xr(raw: u64) -> Self {
        Self {
            major: (raw >> 48) as u16,
            minor: ((raw >> 32) & 0xffff) as u16,
            patch: (raw & 0xffff_ffff) as u32,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl core::fmt::Display for Version {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl core::str::FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let mut next = |what: &str| -> Result<u32, String> {
            match parts.next() {
                Some(p) => p.parse().map_err(|_| format!("Invalid {} in version: {}", what, s)),
                None => Ok(0),
            }
        };
        let major = next("major")?;
        let minor = next("minor")?;
        let patch = next("patch")?;
        Ok(Self::new(major as u16, minor as u16, patch))
    }
}

/// Runtime timestamp in nanoseconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(pub i64);

impl Time {
    pub fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }
}

/// Device form factor requested when resolving a system
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormFactor {
    #[default]
    HeadMountedDisplay,
    HandheldDisplay,
}

/// View configuration a session renders for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewConfigurationType {
    PrimaryMono,
    PrimaryStereo,
}

/// Recommended image size for one view of a view configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewConfigurationView {
    pub recommended_width: u32,
    pub recommended_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

/// Reference space kinds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceSpaceType {
    /// Head-relative
    View,
    /// Local (seated)
    #[default]
    Local,
    /// Stage (standing, room-scale)
    Stage,
}

/// Pose (position + orientation)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    /// Create a new pose
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self { position, orientation }
    }

    /// Convert to transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position)
    }

    /// World-to-view matrix for a camera at this pose
    pub fn view_matrix(&self) -> Mat4 {
        self.to_matrix().inverse()
    }
}

/// Field of view definition (radians, OpenXR sign convention)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fov {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

impl Default for Fov {
    fn default() -> Self {
        let half_fov = 45.0_f32.to_radians();
        Self {
            angle_left: -half_fov,
            angle_right: half_fov,
            angle_up: half_fov,
            angle_down: -half_fov,
        }
    }
}

impl Fov {
    /// Asymmetric perspective projection for this field of view
    pub fn projection(&self, near: f32, far: f32) -> Mat4 {
        let tan_left = self.angle_left.tan();
        let tan_right = self.angle_right.tan();
        let tan_up = self.angle_up.tan();
        let tan_down = self.angle_down.tan();

        let tan_width = tan_right - tan_left;
        let tan_height = tan_up - tan_down;

        let a = 2.0 / tan_width;
        let b = 2.0 / tan_height;
        let c = (tan_right + tan_left) / tan_width;
        let d = (tan_up + tan_down) / tan_height;
        let e = -(far + near) / (far - near);
        let f = -(2.0 * far * near) / (far - near);

        // Column-major order for OpenGL/Vulkan conventions
        Mat4::from_cols(
            Vec4::new(a, 0.0, 0.0, 0.0),
            Vec4::new(0.0, b, 0.0, 0.0),
            Vec4::new(c, d, e, -1.0),
            Vec4::new(0.0, 0.0, f, 0.0),
        )
    }
}

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::{
        Action, ActionKind, ActionSet, ActionSetSelector, ActionSetSpec, ActionSpec, ActionState,
        Application, Backoff, BlendMode, CompositionLayer, Context, ContextCreation, FrameEnd,
        FrameInfo, GraphicsService, HeadlessGraphicsService, InteractionProfile, NullRenderer,
        Pose, ReferenceSpaceSpec, Renderer, SessionConfig, SessionService, SessionState,
        StubRuntime, SwapchainSpec, Vibrate, XrError, XrResult,
    };
    pub use crate::config::formats;
    pub use crate::input::{Component, Identifier, Source};

    #[cfg(feature = "openxr-backend")]
    pub use crate::openxr_backend::OpenXrLoader;
}
