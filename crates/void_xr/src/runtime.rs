//! Device runtime boundary
//!
//! The session core talks to the XR runtime only through these traits.
//! [`crate::openxr_backend`] implements them on a real OpenXR runtime and
//! [`crate::stub`] on a scripted in-process one. Runtime objects are
//! referenced through opaque copyable handles; every fallible call reports
//! a [`RuntimeError`] naming the entry point.

use std::time::Duration;

use crate::action::{ActionKind, ActionState, Vibrate};
use crate::config::SwapchainSpec;
use crate::error::RuntimeResult;
use crate::frame::{FrameState, ViewInfo};
use crate::graphics::{GraphicsApi, GraphicsBinding};
use crate::layer::{BlendMode, CompositionLayer};
use crate::session::SessionState;
use crate::{
    FormFactor, Pose, ReferenceSpaceType, Time, Version, ViewConfigurationType,
    ViewConfigurationView,
};

macro_rules! define_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
            pub struct $name(pub u64);

            impl $name {
                pub const NULL: $name = $name(0);

                pub fn raw(self) -> u64 {
                    self.0
                }

                pub fn is_null(self) -> bool {
                    self.0 == 0
                }
            }
        )*
    };
}

define_handle! {
    /// Device resolved for a form factor
    SystemId;
    /// Reference or action space
    SpaceHandle;
    SwapchainHandle;
    ActionSetHandle;
    ActionHandle;
}

/// Parameters for instance creation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceRequest {
    pub app_name: String,
    pub app_version: u32,
    pub engine_name: String,
    pub engine_version: u32,
    pub api_version: Version,
    pub extensions: Vec<String>,
    /// Extension enabling the graphics binding
    pub graphics_extension: Option<String>,
}

/// Runtime identification
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceProperties {
    pub runtime_name: String,
    pub runtime_version: Version,
}

/// Device capabilities
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemProperties {
    pub system_name: String,
    pub vendor_id: u32,
    pub max_swapchain_width: u32,
    pub max_swapchain_height: u32,
    pub max_layer_count: u32,
    pub orientation_tracking: bool,
    pub position_tracking: bool,
}

/// Graphics API versions the runtime accepts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphicsRequirements {
    pub min_api_version: Version,
    pub max_api_version: Version,
}

/// Result of locating a space
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Location {
    pub pose: Pose,
    pub position_valid: bool,
    pub orientation_valid: bool,
}

/// State of an action as reported by the runtime
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawActionState {
    pub is_active: bool,
    pub changed: bool,
    pub value: ActionState,
}

/// Event delivered by [`XrInstance::poll_event`]
#[derive(Clone, Debug, PartialEq)]
pub enum RuntimeEvent {
    SessionStateChanged { state: SessionState, time: Time },
    InstanceLossPending { loss_time: Time },
    InteractionProfileChanged,
    /// Any other event, by type name
    Other(String),
}

/// Entry point creating runtime instances
pub trait RuntimeLoader {
    fn create_instance(&self, request: &InstanceRequest) -> RuntimeResult<Box<dyn XrInstance>>;
}

/// A runtime instance
pub trait XrInstance {
    fn properties(&self) -> RuntimeResult<InstanceProperties>;

    fn system(&self, form_factor: FormFactor) -> RuntimeResult<SystemId>;

    fn system_properties(&self, system: SystemId) -> RuntimeResult<SystemProperties>;

    fn view_configurations(&self, system: SystemId) -> RuntimeResult<Vec<ViewConfigurationType>>;

    fn view_configuration_views(
        &self,
        system: SystemId,
        view_configuration: ViewConfigurationType,
    ) -> RuntimeResult<Vec<ViewConfigurationView>>;

    fn graphics_requirements(
        &self,
        system: SystemId,
        api: GraphicsApi,
    ) -> RuntimeResult<GraphicsRequirements>;

    /// Next queued event, `None` when the queue is empty
    fn poll_event(&mut self) -> RuntimeResult<Option<RuntimeEvent>>;

    fn create_session(
        &mut self,
        system: SystemId,
        binding: &GraphicsBinding,
    ) -> RuntimeResult<Box<dyn XrSession>>;

    fn destroy(&mut self) -> RuntimeResult<()>;
}

/// A runtime session and the objects created through it
pub trait XrSession {
    fn swapchain_formats(&self) -> RuntimeResult<Vec<i64>>;

    fn create_reference_space(
        &mut self,
        space_type: ReferenceSpaceType,
        pose: Pose,
    ) -> RuntimeResult<SpaceHandle>;

    fn create_swapchain(&mut self, spec: &SwapchainSpec) -> RuntimeResult<SwapchainHandle>;

    /// Backend image handles of a swapchain
    fn swapchain_images(&self, swapchain: SwapchainHandle) -> RuntimeResult<Vec<u64>>;

    fn create_action_set(
        &mut self,
        name: &str,
        description: &str,
        priority: u32,
    ) -> RuntimeResult<ActionSetHandle>;

    fn create_action(
        &mut self,
        set: ActionSetHandle,
        name: &str,
        description: &str,
        kind: ActionKind,
    ) -> RuntimeResult<ActionHandle>;

    fn create_action_space(&mut self, action: ActionHandle) -> RuntimeResult<SpaceHandle>;

    fn suggest_bindings(
        &mut self,
        profile: &str,
        bindings: &[(ActionHandle, String)],
    ) -> RuntimeResult<()>;

    fn attach_action_sets(&mut self, sets: &[ActionSetHandle]) -> RuntimeResult<()>;

    fn begin(&mut self, view_configuration: ViewConfigurationType) -> RuntimeResult<()>;

    fn end(&mut self) -> RuntimeResult<()>;

    /// Block until the runtime wants the next frame
    fn wait_frame(&mut self) -> RuntimeResult<FrameState>;

    fn begin_frame(&mut self) -> RuntimeResult<()>;

    fn end_frame(
        &mut self,
        display_time: Time,
        blend_mode: BlendMode,
        layers: &[CompositionLayer],
    ) -> RuntimeResult<()>;

    fn acquire_image(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<u32>;

    /// Wait for the acquired image; `None` waits indefinitely
    fn wait_image(&mut self, swapchain: SwapchainHandle, timeout: Option<Duration>) -> RuntimeResult<()>;

    fn release_image(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<()>;

    fn locate_views(
        &self,
        view_configuration: ViewConfigurationType,
        time: Time,
        space: SpaceHandle,
    ) -> RuntimeResult<ViewInfo>;

    fn locate_space(&self, space: SpaceHandle, base: SpaceHandle, time: Time) -> RuntimeResult<Location>;

    fn sync_actions(&mut self, sets: &[ActionSetHandle]) -> RuntimeResult<()>;

    fn action_state(&self, action: ActionHandle, kind: ActionKind) -> RuntimeResult<RawActionState>;

    fn apply_haptic(&mut self, action: ActionHandle, vibrate: &Vibrate) -> RuntimeResult<()>;

    fn destroy(&mut self) -> RuntimeResult<()>;
}
