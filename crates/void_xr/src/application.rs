//! Top-level driver
//!
//! Creates a context (retrying through [`Backoff`]), builds the graphics
//! service and session, pumps runtime events and frames until the session
//! ends, tears everything down and starts over unless the session exited
//! for good.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::Backoff;
use crate::config::SessionConfig;
use crate::context::{Context, ContextCreation};
use crate::error::{XrError, XrResult};
use crate::graphics::GraphicsService;
use crate::renderer::Renderer;
use crate::runtime::{RuntimeEvent, RuntimeLoader};
use crate::session::{SessionService, IDLE_SLEEP};

/// Builds the graphics service for a freshly created context
pub type GraphicsFactory = Box<dyn FnMut(&Context) -> XrResult<Box<dyn GraphicsService>>>;

/// What to do with runtime events the driver does not know
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownEventPolicy {
    /// Log and continue
    #[default]
    Ignore,
    /// Abort with [`XrError::UnhandledEvent`]
    Fail,
}

/// Cloneable flag requesting the application to shut down
#[derive(Clone, Debug, Default)]
pub struct TerminationHandle(Arc<AtomicBool>);

impl TerminationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// XR application driver
pub struct Application {
    creation: ContextCreation,
    config: SessionConfig,
    loader: Box<dyn RuntimeLoader>,
    renderer: Box<dyn Renderer>,
    graphics_factory: GraphicsFactory,
    backoff: Backoff,
    termination: TerminationHandle,
    event_policy: UnknownEventPolicy,
    idle_sleep: Duration,
}

impl Application {
    pub fn new(
        creation: ContextCreation,
        config: SessionConfig,
        loader: Box<dyn RuntimeLoader>,
        renderer: Box<dyn Renderer>,
        graphics_factory: GraphicsFactory,
    ) -> Self {
        Self {
            creation,
            config,
            loader,
            renderer,
            graphics_factory,
            backoff: Backoff::new("failed to create XR instance"),
            termination: TerminationHandle::new(),
            event_policy: UnknownEventPolicy::default(),
            idle_sleep: IDLE_SLEEP,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_event_policy(mut self, policy: UnknownEventPolicy) -> Self {
        self.event_policy = policy;
        self
    }

    pub fn with_idle_sleep(mut self, idle_sleep: Duration) -> Self {
        self.idle_sleep = idle_sleep;
        self
    }

    /// Handle that stops the application from another thread or a signal handler
    pub fn termination_handle(&self) -> TerminationHandle {
        self.termination.clone()
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }

    /// Run until the session exits or the retry budget is spent
    pub fn run(&mut self) -> XrResult<()> {
        loop {
            if self.termination.is_requested() {
                log::info!("termination requested, not starting a new session");
                break;
            }

            let Some(mut context) = self.creation.create(self.loader.as_ref())? else {
                self.backoff.attempt()?;
                continue;
            };
            self.backoff.reset();

            let exit = self.run_context(&mut context)?;
            context.destroy();

            if exit {
                break;
            }
            log::info!("XR session lost, restarting");
        }

        log::info!("XR instance terminated, exiting application");
        Ok(())
    }

    fn run_context(&mut self, context: &mut Context) -> XrResult<bool> {
        let mut graphics = (self.graphics_factory)(context)?;
        if let Err(err) = graphics.init(context) {
            graphics.shutdown();
            return Err(err);
        }

        let result = pump(
            context,
            &self.config,
            graphics.as_mut(),
            self.renderer.as_mut(),
            &self.termination,
            self.event_policy,
            self.idle_sleep,
        );

        graphics.shutdown();
        result
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("creation", &self.creation)
            .field("renderer", &self.renderer.name())
            .field("backoff", &self.backoff)
            .field("event_policy", &self.event_policy)
            .finish()
    }
}

/// Drive one session; returns whether the application should exit
fn pump(
    context: &mut Context,
    config: &SessionConfig,
    graphics: &mut dyn GraphicsService,
    renderer: &mut dyn Renderer,
    termination: &TerminationHandle,
    policy: UnknownEventPolicy,
    idle_sleep: Duration,
) -> XrResult<bool> {
    let mut session = SessionService::new(config, graphics, renderer).with_idle_sleep(idle_sleep);
    session.init(context)?;

    while session.is_running() {
        if termination.is_requested() && !session.termination_requested() {
            session.terminate();
        }

        while let Some(event) = context.poll_event()? {
            dispatch(&mut session, context, event, policy)?;
            if !session.is_running() {
                break;
            }
        }

        if session.is_running() {
            session.process_frame()?;
        }
    }

    Ok(session.should_exit())
}

fn dispatch(
    session: &mut SessionService<'_>,
    context: &Context,
    event: RuntimeEvent,
    policy: UnknownEventPolicy,
) -> XrResult<()> {
    match event {
        RuntimeEvent::SessionStateChanged { state, .. } => session.handle(context, state),
        RuntimeEvent::InstanceLossPending { loss_time } => {
            log::warn!("XR instance loss pending at {}s", loss_time.as_secs_f64());
            session.stop()
        }
        RuntimeEvent::InteractionProfileChanged => {
            log::debug!("interaction profile changed");
            Ok(())
        }
        RuntimeEvent::Other(name) => match policy {
            UnknownEventPolicy::Ignore => {
                log::warn!("Event[{}] type not handled, ignoring", name);
                Ok(())
            }
            UnknownEventPolicy::Fail => Err(XrError::UnhandledEvent(name)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SwapchainSpec;
    use crate::graphics::HeadlessGraphicsService;
    use crate::renderer::NullRenderer;
    use crate::session::SessionState;
    use crate::stub::StubRuntime;

    fn context(runtime: &StubRuntime) -> Context {
        ContextCreation::headless()
            .app_name("test")
            .create(runtime)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_unknown_event_policy() {
        let runtime = StubRuntime::new();
        let ctx = context(&runtime);
        let config = SessionConfig::new().add_swapchain(SwapchainSpec::new("color").color_attachment());
        let mut graphics = HeadlessGraphicsService::new();
        let mut renderer = NullRenderer;
        let mut session = SessionService::new(&config, &mut graphics, &mut renderer);

        let event = || RuntimeEvent::Other("XR_TYPE_EVENT_DATA_VISIBILITY_MASK_CHANGED_KHR".into());
        assert!(dispatch(&mut session, &ctx, event(), UnknownEventPolicy::Ignore).is_ok());
        assert!(matches!(
            dispatch(&mut session, &ctx, event(), UnknownEventPolicy::Fail),
            Err(XrError::UnhandledEvent(_))
        ));
    }

    #[test]
    fn test_instance_loss_stops_session() {
        let runtime = StubRuntime::new();
        let mut ctx = context(&runtime);
        let config = SessionConfig::new().add_swapchain(SwapchainSpec::new("color").color_attachment());
        let mut graphics = HeadlessGraphicsService::new();
        let mut renderer = NullRenderer;
        let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
        session.init(&mut ctx).unwrap();

        let event = RuntimeEvent::InstanceLossPending { loss_time: crate::Time(0) };
        dispatch(&mut session, &ctx, event, UnknownEventPolicy::Ignore).unwrap();
        assert_eq!(session.state(), SessionState::LossPending);
        assert!(!session.is_running());
        assert!(!session.should_exit());
        assert!(!session.has_session());
    }

    #[test]
    fn test_termination_handle_is_shared() {
        let handle = TerminationHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_requested());
        clone.request();
        assert!(handle.is_requested());
    }
}
