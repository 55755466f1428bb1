//! Simulated runtime
//!
//! A deterministic, in-process implementation of the runtime traits for
//! development without a headset and for tests. Everything it returns is
//! scripted through [`StubRuntime`], and every call it receives is appended
//! to a shared log that can be inspected with [`StubRuntime::calls`].
//!
//! ```ignore
//! let runtime = StubRuntime::new().auto_lifecycle(Some(3));
//! // Idle -> Ready -> Synchronized -> Visible -> Focused, three frames,
//! // then Stopping -> Idle -> Exiting.
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use parking_lot::Mutex;

use crate::action::{ActionKind, Vibrate};
use crate::config::{formats, SwapchainSpec};
use crate::error::{RuntimeError, RuntimeResult};
use crate::frame::{FrameState, View, ViewInfo, ViewState};
use crate::graphics::{GraphicsApi, GraphicsBinding};
use crate::layer::{BlendMode, CompositionLayer};
use crate::runtime::{
    ActionHandle, ActionSetHandle, GraphicsRequirements, InstanceProperties, InstanceRequest,
    Location, RawActionState, RuntimeEvent, RuntimeLoader, SpaceHandle, SwapchainHandle,
    SystemId, SystemProperties, XrInstance, XrSession,
};
use crate::session::SessionState;
use crate::{
    Fov, FormFactor, Pose, ReferenceSpaceType, Time, Version, ViewConfigurationType,
    ViewConfigurationView,
};

const IMAGES_PER_SWAPCHAIN: u32 = 3;
const HALF_IPD: f32 = 0.032;

/// Call received by the simulated runtime
#[derive(Clone, Debug, PartialEq)]
pub enum RuntimeCall {
    CreateInstance { app_name: String, extensions: Vec<String> },
    GetSystem(FormFactor),
    DestroyInstance,
    CreateSession,
    DestroySession,
    CreateReferenceSpace(ReferenceSpaceType),
    CreateSwapchain { name: String, format: i64, width: u32, height: u32 },
    CreateActionSet(String),
    CreateAction { name: String, kind: ActionKind },
    CreateActionSpace(String),
    SuggestBindings { profile: String, paths: Vec<String> },
    AttachActionSets(usize),
    BeginSession(ViewConfigurationType),
    EndSession,
    WaitFrame,
    BeginFrame,
    EndFrame { display_time: Time, blend_mode: BlendMode, layers: usize },
    AcquireImage(SwapchainHandle),
    WaitImage(SwapchainHandle),
    ReleaseImage(SwapchainHandle),
    LocateViews,
    LocateSpace(SpaceHandle),
    SyncActions(usize),
    GetActionState(String),
    ApplyHaptic { action: String, amplitude: f32 },
}

impl RuntimeCall {
    /// Calls belonging to the per-frame protocol
    pub fn is_frame_call(&self) -> bool {
        matches!(
            self,
            RuntimeCall::WaitFrame
                | RuntimeCall::BeginFrame
                | RuntimeCall::EndFrame { .. }
                | RuntimeCall::AcquireImage(_)
                | RuntimeCall::WaitImage(_)
                | RuntimeCall::ReleaseImage(_)
                | RuntimeCall::LocateViews
                | RuntimeCall::LocateSpace(_)
        )
    }

    /// Calls that create runtime objects for the session
    pub fn is_action_call(&self) -> bool {
        matches!(
            self,
            RuntimeCall::CreateActionSet(_)
                | RuntimeCall::CreateAction { .. }
                | RuntimeCall::CreateActionSpace(_)
                | RuntimeCall::SuggestBindings { .. }
                | RuntimeCall::AttachActionSets(_)
        )
    }
}

struct StubState {
    calls: Vec<RuntimeCall>,
    events: VecDeque<RuntimeEvent>,
    fail_instance_creations: u32,
    fail_system_lookups: u32,
    reject_begin_frames: u32,
    fail_session_begins: u32,
    view_configurations: Vec<ViewConfigurationType>,
    swapchain_formats: Vec<i64>,
    frames: VecDeque<bool>,
    action_states: BTreeMap<String, RawActionState>,
    vulkan: GraphicsRequirements,
    auto_lifecycle: Option<u32>,
    frames_ended: u32,
    frame_period: Duration,
    pace: bool,
    time: i64,
    next_handle: u64,
    actions: BTreeMap<ActionHandle, String>,
    acquired: BTreeMap<SwapchainHandle, u32>,
}

impl Default for StubState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            events: VecDeque::new(),
            fail_instance_creations: 0,
            fail_system_lookups: 0,
            reject_begin_frames: 0,
            fail_session_begins: 0,
            view_configurations: vec![ViewConfigurationType::PrimaryStereo],
            swapchain_formats: vec![
                formats::R8G8B8A8_UNORM,
                formats::R8G8B8A8_SRGB,
                formats::B8G8R8A8_UNORM,
                formats::B8G8R8A8_SRGB,
            ],
            frames: VecDeque::new(),
            action_states: BTreeMap::new(),
            vulkan: GraphicsRequirements {
                min_api_version: Version::new(1, 0, 0),
                max_api_version: Version::new(1, 3, 0),
            },
            auto_lifecycle: None,
            frames_ended: 0,
            frame_period: Duration::from_micros(11_111),
            pace: false,
            time: 0,
            next_handle: 0,
            actions: BTreeMap::new(),
            acquired: BTreeMap::new(),
        }
    }
}

impl StubState {
    fn record(&mut self, call: RuntimeCall) {
        self.calls.push(call);
    }

    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn push_states(&mut self, states: &[SessionState]) {
        let time = Time(self.time);
        for &state in states {
            self.events.push_back(RuntimeEvent::SessionStateChanged { state, time });
        }
    }
}

type Shared = Arc<Mutex<StubState>>;

/// Scripted runtime loader; clones share the same script and call log
#[derive(Clone, Default)]
pub struct StubRuntime {
    state: Shared,
}

impl StubRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` instance creations
    pub fn fail_instance_creations(self, count: u32) -> Self {
        self.state.lock().fail_instance_creations = count;
        self
    }

    /// Fail the next `count` system lookups
    pub fn fail_system_lookups(self, count: u32) -> Self {
        self.state.lock().fail_system_lookups = count;
        self
    }

    /// Reject the next `count` begin-frame calls
    pub fn reject_begin_frames(self, count: u32) -> Self {
        self.state.lock().reject_begin_frames = count;
        self
    }

    /// Fail the next `count` begin-session calls
    pub fn fail_session_begins(self, count: u32) -> Self {
        self.state.lock().fail_session_begins = count;
        self
    }

    pub fn view_configurations(self, configurations: Vec<ViewConfigurationType>) -> Self {
        self.state.lock().view_configurations = configurations;
        self
    }

    pub fn swapchain_formats(self, formats: Vec<i64>) -> Self {
        self.state.lock().swapchain_formats = formats;
        self
    }

    pub fn vulkan_requirements(self, min: Version, max: Version) -> Self {
        self.state.lock().vulkan = GraphicsRequirements {
            min_api_version: min,
            max_api_version: max,
        };
        self
    }

    /// Drive the session through its whole lifecycle, stopping after
    /// `frames` submitted frames; `None` keeps it running until told otherwise.
    pub fn auto_lifecycle(self, frames: Option<u32>) -> Self {
        self.state.lock().auto_lifecycle = Some(frames.unwrap_or(u32::MAX));
        self
    }

    /// Sleep for one display period in every frame wait
    pub fn paced(self, period: Duration) -> Self {
        {
            let mut state = self.state.lock();
            state.pace = true;
            state.frame_period = period;
        }
        self
    }

    /// Queue a session state change
    pub fn push_state(&self, state: SessionState) {
        self.state.lock().push_states(&[state]);
    }

    pub fn push_event(&self, event: RuntimeEvent) {
        self.state.lock().events.push_back(event);
    }

    /// Script the `should_render` flag of an upcoming frame
    pub fn push_frame(&self, should_render: bool) {
        self.state.lock().frames.push_back(should_render);
    }

    /// Set the state reported for an action from now on
    pub fn set_action_state(&self, action: impl Into<String>, state: RawActionState) {
        self.state.lock().action_states.insert(action.into(), state);
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&RuntimeCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn pending_events(&self) -> usize {
        self.state.lock().events.len()
    }
}

impl std::fmt::Debug for StubRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StubRuntime")
            .field("calls", &state.calls.len())
            .field("events", &state.events.len())
            .finish()
    }
}

impl RuntimeLoader for StubRuntime {
    fn create_instance(&self, request: &InstanceRequest) -> RuntimeResult<Box<dyn XrInstance>> {
        let mut state = self.state.lock();
        state.record(RuntimeCall::CreateInstance {
            app_name: request.app_name.clone(),
            extensions: request.extensions.clone(),
        });

        if state.fail_instance_creations > 0 {
            state.fail_instance_creations -= 1;
            return Err(RuntimeError::new("xrCreateInstance", -2, "XR_ERROR_RUNTIME_FAILURE"));
        }

        Ok(Box::new(StubInstance {
            state: self.state.clone(),
        }))
    }
}

struct StubInstance {
    state: Shared,
}

impl XrInstance for StubInstance {
    fn properties(&self) -> RuntimeResult<InstanceProperties> {
        Ok(InstanceProperties {
            runtime_name: "void_xr stub runtime".into(),
            runtime_version: Version::new(1, 0, 0),
        })
    }

    fn system(&self, form_factor: FormFactor) -> RuntimeResult<SystemId> {
        let mut state = self.state.lock();
        state.record(RuntimeCall::GetSystem(form_factor));
        if state.fail_system_lookups > 0 {
            state.fail_system_lookups -= 1;
            return Err(RuntimeError::new("xrGetSystem", -50, "XR_ERROR_FORM_FACTOR_UNAVAILABLE"));
        }
        Ok(SystemId(1))
    }

    fn system_properties(&self, _system: SystemId) -> RuntimeResult<SystemProperties> {
        Ok(SystemProperties {
            system_name: "Stub HMD".into(),
            vendor_id: 0,
            max_swapchain_width: 4096,
            max_swapchain_height: 4096,
            max_layer_count: 16,
            orientation_tracking: true,
            position_tracking: true,
        })
    }

    fn view_configurations(&self, _system: SystemId) -> RuntimeResult<Vec<ViewConfigurationType>> {
        Ok(self.state.lock().view_configurations.clone())
    }

    fn view_configuration_views(
        &self,
        _system: SystemId,
        view_configuration: ViewConfigurationType,
    ) -> RuntimeResult<Vec<ViewConfigurationView>> {
        let view = ViewConfigurationView {
            recommended_width: 1440,
            recommended_height: 1584,
            max_width: 4096,
            max_height: 4096,
        };
        let count = match view_configuration {
            ViewConfigurationType::PrimaryMono => 1,
            ViewConfigurationType::PrimaryStereo => 2,
        };
        Ok(vec![view; count])
    }

    fn graphics_requirements(
        &self,
        _system: SystemId,
        api: GraphicsApi,
    ) -> RuntimeResult<GraphicsRequirements> {
        match api {
            GraphicsApi::Vulkan => Ok(self.state.lock().vulkan),
            GraphicsApi::Headless => Ok(GraphicsRequirements::default()),
        }
    }

    fn poll_event(&mut self) -> RuntimeResult<Option<RuntimeEvent>> {
        Ok(self.state.lock().events.pop_front())
    }

    fn create_session(
        &mut self,
        _system: SystemId,
        _binding: &GraphicsBinding,
    ) -> RuntimeResult<Box<dyn XrSession>> {
        let mut state = self.state.lock();
        state.record(RuntimeCall::CreateSession);
        if state.auto_lifecycle.is_some() {
            state.frames_ended = 0;
            state.push_states(&[SessionState::Idle, SessionState::Ready]);
        }
        Ok(Box::new(StubSession {
            state: self.state.clone(),
        }))
    }

    fn destroy(&mut self) -> RuntimeResult<()> {
        self.state.lock().record(RuntimeCall::DestroyInstance);
        Ok(())
    }
}

struct StubSession {
    state: Shared,
}

impl XrSession for StubSession {
    fn swapchain_formats(&self) -> RuntimeResult<Vec<i64>> {
        Ok(self.state.lock().swapchain_formats.clone())
    }

    fn create_reference_space(
        &mut self,
        space_type: ReferenceSpaceType,
        _pose: Pose,
    ) -> RuntimeResult<SpaceHandle> {
        let mut state = self.state.lock();
        state.record(RuntimeCall::CreateReferenceSpace(space_type));
        Ok(SpaceHandle(state.handle()))
    }

    fn create_swapchain(&mut self, spec: &SwapchainSpec) -> RuntimeResult<SwapchainHandle> {
        let mut state = self.state.lock();
        state.record(RuntimeCall::CreateSwapchain {
            name: spec.name.clone(),
            format: spec.format,
            width: spec.width,
            height: spec.height,
        });
        Ok(SwapchainHandle(state.handle()))
    }

    fn swapchain_images(&self, swapchain: SwapchainHandle) -> RuntimeResult<Vec<u64>> {
        Ok((0..IMAGES_PER_SWAPCHAIN as u64)
            .map(|i| (swapchain.raw() << 8) | i)
            .collect())
    }

    fn create_action_set(
        &mut self,
        name: &str,
        _description: &str,
        _priority: u32,
    ) -> RuntimeResult<ActionSetHandle> {
        let mut state = self.state.lock();
        state.record(RuntimeCall::CreateActionSet(name.to_string()));
        Ok(ActionSetHandle(state.handle()))
    }

    fn create_action(
        &mut self,
        _set: ActionSetHandle,
        name: &str,
        _description: &str,
        kind: ActionKind,
    ) -> RuntimeResult<ActionHandle> {
        let mut state = self.state.lock();
        state.record(RuntimeCall::CreateAction {
            name: name.to_string(),
            kind,
        });
        let handle = ActionHandle(state.handle());
        state.actions.insert(handle, name.to_string());
        Ok(handle)
    }

    fn create_action_space(&mut self, action: ActionHandle) -> RuntimeResult<SpaceHandle> {
        let mut state = self.state.lock();
        let name = state.actions.get(&action).cloned().unwrap_or_default();
        state.record(RuntimeCall::CreateActionSpace(name));
        Ok(SpaceHandle(state.handle()))
    }

    fn suggest_bindings(
        &mut self,
        profile: &str,
        bindings: &[(ActionHandle, String)],
    ) -> RuntimeResult<()> {
        self.state.lock().record(RuntimeCall::SuggestBindings {
            profile: profile.to_string(),
            paths: bindings.iter().map(|(_, path)| path.clone()).collect(),
        });
        Ok(())
    }

    fn attach_action_sets(&mut self, sets: &[ActionSetHandle]) -> RuntimeResult<()> {
        self.state.lock().record(RuntimeCall::AttachActionSets(sets.len()));
        Ok(())
    }

    fn begin(&mut self, view_configuration: ViewConfigurationType) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        state.record(RuntimeCall::BeginSession(view_configuration));
        if state.fail_session_begins > 0 {
            state.fail_session_begins -= 1;
            return Err(RuntimeError::new("xrBeginSession", -28, "XR_ERROR_SESSION_NOT_READY"));
        }
        if state.auto_lifecycle.is_some() {
            state.push_states(&[
                SessionState::Synchronized,
                SessionState::Visible,
                SessionState::Focused,
            ]);
        }
        Ok(())
    }

    fn end(&mut self) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        state.record(RuntimeCall::EndSession);
        if state.auto_lifecycle.is_some() {
            state.push_states(&[SessionState::Idle, SessionState::Exiting]);
        }
        Ok(())
    }

    fn wait_frame(&mut self) -> RuntimeResult<FrameState> {
        let (pace, period, frame) = {
            let mut state = self.state.lock();
            state.record(RuntimeCall::WaitFrame);
            let period = state.frame_period;
            state.time += period.as_nanos() as i64;
            let should_render = state.frames.pop_front().unwrap_or(true);
            let frame = FrameState {
                predicted_display_time: Time(state.time + period.as_nanos() as i64),
                predicted_display_period: period,
                should_render,
            };
            (state.pace, period, frame)
        };
        if pace {
            std::thread::sleep(period);
        }
        Ok(frame)
    }

    fn begin_frame(&mut self) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        state.record(RuntimeCall::BeginFrame);
        if state.reject_begin_frames > 0 {
            state.reject_begin_frames -= 1;
            return Err(RuntimeError::new("xrBeginFrame", -10, "XR_ERROR_CALL_ORDER_INVALID"));
        }
        Ok(())
    }

    fn end_frame(
        &mut self,
        display_time: Time,
        blend_mode: BlendMode,
        layers: &[CompositionLayer],
    ) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        state.record(RuntimeCall::EndFrame {
            display_time,
            blend_mode,
            layers: layers.len(),
        });
        state.frames_ended += 1;
        if state.auto_lifecycle == Some(state.frames_ended) {
            state.push_states(&[SessionState::Stopping]);
        }
        Ok(())
    }

    fn acquire_image(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<u32> {
        let mut state = self.state.lock();
        state.record(RuntimeCall::AcquireImage(swapchain));
        let next = state.acquired.entry(swapchain).or_insert(0);
        let index = *next % IMAGES_PER_SWAPCHAIN;
        *next += 1;
        Ok(index)
    }

    fn wait_image(&mut self, swapchain: SwapchainHandle, _timeout: Option<Duration>) -> RuntimeResult<()> {
        self.state.lock().record(RuntimeCall::WaitImage(swapchain));
        Ok(())
    }

    fn release_image(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<()> {
        self.state.lock().record(RuntimeCall::ReleaseImage(swapchain));
        Ok(())
    }

    fn locate_views(
        &self,
        view_configuration: ViewConfigurationType,
        _time: Time,
        _space: SpaceHandle,
    ) -> RuntimeResult<ViewInfo> {
        self.state.lock().record(RuntimeCall::LocateViews);
        let eye = |x: f32| View {
            pose: Pose::new(Vec3::new(x, 0.0, 0.0), glam::Quat::IDENTITY),
            fov: Fov::default(),
        };
        let views = match view_configuration {
            ViewConfigurationType::PrimaryMono => vec![eye(0.0)],
            ViewConfigurationType::PrimaryStereo => vec![eye(-HALF_IPD), eye(HALF_IPD)],
        };
        Ok(ViewInfo {
            state: ViewState::TRACKED,
            views,
        })
    }

    fn locate_space(&self, space: SpaceHandle, _base: SpaceHandle, _time: Time) -> RuntimeResult<Location> {
        self.state.lock().record(RuntimeCall::LocateSpace(space));
        Ok(Location {
            pose: Pose::IDENTITY,
            position_valid: true,
            orientation_valid: true,
        })
    }

    fn sync_actions(&mut self, sets: &[ActionSetHandle]) -> RuntimeResult<()> {
        self.state.lock().record(RuntimeCall::SyncActions(sets.len()));
        Ok(())
    }

    fn action_state(&self, action: ActionHandle, kind: ActionKind) -> RuntimeResult<RawActionState> {
        let mut state = self.state.lock();
        let name = state.actions.get(&action).cloned().unwrap_or_default();
        state.record(RuntimeCall::GetActionState(name.clone()));
        Ok(state.action_states.get(&name).copied().unwrap_or(RawActionState {
            is_active: false,
            changed: false,
            value: kind.default_state(),
        }))
    }

    fn apply_haptic(&mut self, action: ActionHandle, vibrate: &Vibrate) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        let name = state.actions.get(&action).cloned().unwrap_or_default();
        state.record(RuntimeCall::ApplyHaptic {
            action: name,
            amplitude: vibrate.amplitude,
        });
        Ok(())
    }

    fn destroy(&mut self) -> RuntimeResult<()> {
        self.state.lock().record(RuntimeCall::DestroySession);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> InstanceRequest {
        InstanceRequest {
            app_name: "test".into(),
            app_version: 1,
            engine_name: "test".into(),
            engine_version: 1,
            api_version: Version::new(1, 0, 34),
            extensions: Vec::new(),
            graphics_extension: None,
        }
    }

    #[test]
    fn test_scripted_instance_failures() {
        let runtime = StubRuntime::new().fail_instance_creations(2);
        assert!(runtime.create_instance(&request()).is_err());
        assert!(runtime.create_instance(&request()).is_err());
        assert!(runtime.create_instance(&request()).is_ok());
        assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::CreateInstance { .. })), 3);
    }

    #[test]
    fn test_auto_lifecycle_events() {
        let runtime = StubRuntime::new().auto_lifecycle(Some(1));
        let mut instance = runtime.create_instance(&request()).unwrap();
        let mut session = instance.create_session(SystemId(1), &GraphicsBinding::Headless).unwrap();

        fn drain(instance: &mut Box<dyn XrInstance>, states: &mut Vec<SessionState>) {
            while let Some(RuntimeEvent::SessionStateChanged { state, .. }) = instance.poll_event().unwrap() {
                states.push(state);
            }
        }

        let mut states = Vec::new();

        drain(&mut instance, &mut states);
        session.begin(ViewConfigurationType::PrimaryStereo).unwrap();
        session.wait_frame().unwrap();
        session.begin_frame().unwrap();
        session.end_frame(Time(0), BlendMode::Opaque, &[]).unwrap();
        drain(&mut instance, &mut states);
        session.end().unwrap();
        drain(&mut instance, &mut states);

        assert_eq!(
            states,
            vec![
                SessionState::Idle,
                SessionState::Ready,
                SessionState::Synchronized,
                SessionState::Visible,
                SessionState::Focused,
                SessionState::Stopping,
                SessionState::Idle,
                SessionState::Exiting,
            ]
        );
    }

    #[test]
    fn test_frame_times_advance() {
        let runtime = StubRuntime::new();
        let mut instance = runtime.create_instance(&request()).unwrap();
        let mut session = instance.create_session(SystemId(1), &GraphicsBinding::Headless).unwrap();
        runtime.push_frame(false);

        let first = session.wait_frame().unwrap();
        let second = session.wait_frame().unwrap();
        assert!(!first.should_render);
        assert!(second.should_render);
        assert!(second.predicted_display_time > first.predicted_display_time);
    }

    #[test]
    fn test_acquire_cycles_images() {
        let runtime = StubRuntime::new();
        let mut instance = runtime.create_instance(&request()).unwrap();
        let mut session = instance.create_session(SystemId(1), &GraphicsBinding::Headless).unwrap();
        let swapchain = session.create_swapchain(&SwapchainSpec::new("color")).unwrap();

        let indices: Vec<u32> = (0..4).map(|_| session.acquire_image(swapchain).unwrap()).collect();
        assert_eq!(indices, vec![0, 1, 2, 0]);
        assert_eq!(session.swapchain_images(swapchain).unwrap().len(), 3);
    }
}
