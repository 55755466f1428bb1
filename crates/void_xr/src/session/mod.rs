//! Session service
//!
//! Owns the runtime session and everything created through it: reference
//! spaces, swapchains and action bindings. Lifecycle events are applied
//! through [`SessionService::handle`]; [`SessionService::process_frame`]
//! runs one iteration of the frame protocol for the current state.
//!
//! Resource setup order in [`SessionService::init`]:
//!
//! 1. Validate the [`SessionConfig`]
//! 2. Create the runtime session bound to the graphics device
//! 3. Named reference spaces
//! 4. Swapchains (format checked against the runtime's list)
//! 5. Tracking space views are located in
//! 6. Action sets, actions and binding suggestions
//! 7. Renderer

mod actions;
mod frame;
mod state;

pub use state::SessionState;

use std::collections::BTreeMap;
use std::time::Duration;

use crate::action::ActionSet;
use crate::config::SessionConfig;
use crate::context::Context;
use crate::error::{RuntimeCheck, XrError, XrResult};
use crate::frame::FrameTiming;
use crate::graphics::{GraphicsService, Swapchain};
use crate::renderer::Renderer;
use crate::runtime::{SpaceHandle, XrSession};
use crate::{Pose, ReferenceSpaceType};

use actions::BoundActionSet;

/// Time a non-running session yields per frame call
pub const IDLE_SLEEP: Duration = Duration::from_millis(10);

pub(crate) fn live(session: &mut Option<Box<dyn XrSession>>) -> XrResult<&mut (dyn XrSession + 'static)> {
    session.as_deref_mut().ok_or(XrError::SessionDestroyed)
}

/// Runtime session with its resources and lifecycle state
pub struct SessionService<'a> {
    config: &'a SessionConfig,
    graphics: &'a mut dyn GraphicsService,
    renderer: &'a mut dyn Renderer,

    session: Option<Box<dyn XrSession>>,
    swapchains: Vec<Swapchain>,
    spaces: BTreeMap<String, SpaceHandle>,
    tracking_space: SpaceHandle,
    action_sets: Vec<BoundActionSet>,

    state: SessionState,
    frame_timing: FrameTiming,
    termination_requested: bool,
    idle_sleep: Duration,
}

impl<'a> SessionService<'a> {
    pub fn new(
        config: &'a SessionConfig,
        graphics: &'a mut dyn GraphicsService,
        renderer: &'a mut dyn Renderer,
    ) -> Self {
        Self {
            config,
            graphics,
            renderer,
            session: None,
            swapchains: Vec::new(),
            spaces: BTreeMap::new(),
            tracking_space: SpaceHandle::NULL,
            action_sets: Vec::new(),
            state: SessionState::Unknown,
            frame_timing: FrameTiming::default(),
            termination_requested: false,
            idle_sleep: IDLE_SLEEP,
        }
    }

    /// Override how long non-running states sleep per frame call
    pub fn with_idle_sleep(mut self, idle_sleep: Duration) -> Self {
        self.idle_sleep = idle_sleep;
        self
    }

    /// Create the session and all its resources
    pub fn init(&mut self, ctx: &mut Context) -> XrResult<()> {
        self.config.validate()?;
        self.create_session(ctx)?;
        self.create_reference_spaces()?;
        self.create_swapchains()?;
        self.create_tracking_space()?;
        self.setup_actions()?;
        self.init_renderer(ctx)
    }

    fn create_session(&mut self, ctx: &mut Context) -> XrResult<()> {
        let binding = self.graphics.graphics_binding();
        let system_id = ctx.system_id();
        let session = ctx.instance_mut()?.create_session(system_id, &binding).check()?;
        self.session = Some(session);
        log::debug!("XR session created");
        Ok(())
    }

    fn create_reference_spaces(&mut self) -> XrResult<()> {
        let config = self.config;
        let session = live(&mut self.session)?;
        for spec in &config.spaces {
            let space = session
                .create_reference_space(spec.space_type, spec.pose_in_space())
                .check()?;
            self.spaces.insert(spec.name.clone(), space);
        }
        Ok(())
    }

    fn create_swapchains(&mut self) -> XrResult<()> {
        let config = self.config;
        let session = live(&mut self.session)?;
        let supported = session.swapchain_formats().check()?;

        for spec in &config.swapchains {
            if !supported.contains(&spec.format) {
                return Err(XrError::Unsupported(format!(
                    "swapchain '{}' image format {} unsupported",
                    spec.name, spec.format
                )));
            }
            let handle = session.create_swapchain(spec).check()?;
            let images = session.swapchain_images(handle).check()?;
            self.swapchains.push(Swapchain {
                spec: spec.clone(),
                handle,
                images,
            });
        }

        self.graphics.set_swapchains(&self.swapchains)
    }

    fn create_tracking_space(&mut self) -> XrResult<()> {
        self.tracking_space = live(&mut self.session)?
            .create_reference_space(ReferenceSpaceType::View, Pose::IDENTITY)
            .check()?;
        Ok(())
    }

    fn init_renderer(&mut self, ctx: &Context) -> XrResult<()> {
        log::debug!("initializing renderer '{}'", self.renderer.name());
        self.renderer.init(ctx, &mut *self.graphics)
    }

    /// Apply a session state change reported by the runtime
    pub fn handle(&mut self, ctx: &Context, state: SessionState) -> XrResult<()> {
        state::transition(self, ctx, state)
    }

    /// Request termination; honored at the start of the next frame
    pub fn terminate(&mut self) {
        self.termination_requested = true;
    }

    pub fn termination_requested(&self) -> bool {
        self.termination_requested
    }

    /// Give up the session after instance loss
    pub fn stop(&mut self) -> XrResult<()> {
        self.adopt(SessionState::LossPending)?;
        self.destroy_session()
    }

    /// Whether frames should still be pumped
    pub fn is_running(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Whether the session ended for good rather than being lost
    pub fn should_exit(&self) -> bool {
        self.state == SessionState::Exiting
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn frame_timing(&self) -> FrameTiming {
        self.frame_timing
    }

    pub fn swapchains(&self) -> &[Swapchain] {
        &self.swapchains
    }

    pub fn tracking_space(&self) -> SpaceHandle {
        self.tracking_space
    }

    pub fn space(&self, name: &str) -> Option<SpaceHandle> {
        self.spaces.get(name).copied()
    }

    /// Latest action values
    pub fn action_sets(&self) -> impl Iterator<Item = &ActionSet> {
        self.action_sets.iter().map(|s| &s.snapshot)
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    fn adopt(&mut self, next: SessionState) -> XrResult<()> {
        if next == SessionState::Unknown {
            return Err(XrError::InvalidTransition(next.to_string()));
        }
        log::debug!("transitioning session state from {} to {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Destroy the runtime session and drop every handle created through it
    fn destroy_session(&mut self) -> XrResult<()> {
        self.swapchains.clear();
        self.spaces.clear();
        self.action_sets.clear();
        self.tracking_space = SpaceHandle::NULL;

        match self.session.take() {
            Some(mut session) => {
                session.destroy().check()?;
                log::debug!("XR session destroyed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for SessionService<'_> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(err) = session.destroy() {
                log::error!("{}", err);
            }
        }
    }
}

impl std::fmt::Debug for SessionService<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("state", &self.state)
            .field("swapchains", &self.swapchains.len())
            .field("spaces", &self.spaces.keys().collect::<Vec<_>>())
            .field("action_sets", &self.action_sets.len())
            .field("termination_requested", &self.termination_requested)
            .finish()
    }
}
