//! Integration tests for the void_xr application driver

use std::sync::{Arc, Mutex};
use std::time::Duration;

use void_xr::prelude::*;
use void_xr::{
    FrameInfo, GraphicsBinding, GraphicsFactory, RuntimeCall, RuntimeEvent, Swapchain, TerminationHandle,
    UnknownEventPolicy,
};

fn headless_factory() -> GraphicsFactory {
    Box::new(|_ctx: &Context| Ok(Box::new(HeadlessGraphicsService::new()) as Box<dyn GraphicsService>))
}

fn config() -> SessionConfig {
    SessionConfig::new().add_swapchain(SwapchainSpec::new("color").size(1024, 1024).color_attachment())
}

fn app(runtime: &StubRuntime, renderer: Box<dyn Renderer>) -> Application {
    let _ = env_logger::builder().is_test(true).try_init();
    Application::new(
        ContextCreation::headless().app_name("application_tests"),
        config(),
        Box::new(runtime.clone()),
        renderer,
        headless_factory(),
    )
    .with_idle_sleep(Duration::from_millis(1))
}

fn recorded_backoff(sleeps: &Arc<Mutex<Vec<Duration>>>) -> Backoff {
    let sleeps = sleeps.clone();
    Backoff::with_sleeper("failed to create XR instance", move |delay| {
        sleeps.lock().unwrap().push(delay);
    })
}

// Requests termination after a number of focused frames
struct CountingRenderer {
    frames: usize,
    stop_after: usize,
    termination: TerminationHandle,
}

impl Renderer for CountingRenderer {
    fn paused(&mut self, _frame: &FrameInfo, _graphics: &mut dyn GraphicsService) -> FrameEnd {
        FrameEnd::default()
    }

    fn render(&mut self, _frame: &FrameInfo, _graphics: &mut dyn GraphicsService) -> FrameEnd {
        self.frames += 1;
        if self.frames == self.stop_after {
            self.termination.request();
        }
        FrameEnd::default()
    }
}

// Graphics service whose device never comes up
struct BrokenGraphics {
    inner: HeadlessGraphicsService,
    shut_down: Arc<Mutex<bool>>,
}

impl GraphicsService for BrokenGraphics {
    fn init(&mut self, _ctx: &Context) -> XrResult<()> {
        Err(XrError::Unsupported("no graphics device".into()))
    }

    fn graphics_binding(&self) -> GraphicsBinding {
        self.inner.graphics_binding()
    }

    fn set_swapchains(&mut self, swapchains: &[Swapchain]) -> XrResult<()> {
        self.inner.set_swapchains(swapchains)
    }

    fn shutdown(&mut self) {
        *self.shut_down.lock().unwrap() = true;
    }
}

#[test]
fn test_failed_graphics_init_is_shut_down() {
    let _ = env_logger::builder().is_test(true).try_init();
    let runtime = StubRuntime::new().auto_lifecycle(Some(1));
    let shut_down = Arc::new(Mutex::new(false));
    let flag = shut_down.clone();
    let factory: GraphicsFactory = Box::new(move |_ctx: &Context| {
        Ok(Box::new(BrokenGraphics {
            inner: HeadlessGraphicsService::new(),
            shut_down: flag.clone(),
        }) as Box<dyn GraphicsService>)
    });
    let mut app = Application::new(
        ContextCreation::headless().app_name("application_tests"),
        config(),
        Box::new(runtime.clone()),
        Box::new(NullRenderer),
        factory,
    );

    let result = app.run();

    assert!(matches!(result, Err(XrError::Unsupported(_))));
    assert!(*shut_down.lock().unwrap());
    assert_eq!(runtime.count(|c| *c == RuntimeCall::CreateSession), 0);
    assert_eq!(runtime.count(|c| *c == RuntimeCall::DestroyInstance), 1);
}

#[test]
fn test_full_lifecycle_exits() {
    let runtime = StubRuntime::new().auto_lifecycle(Some(3));
    let mut app = app(&runtime, Box::new(NullRenderer));

    app.run().unwrap();

    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::CreateInstance { .. })), 1);
    assert_eq!(runtime.count(|c| *c == RuntimeCall::CreateSession), 1);
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::BeginSession(_))), 1);
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::EndFrame { .. })), 3);
    assert_eq!(runtime.count(|c| *c == RuntimeCall::EndSession), 1);
    assert_eq!(runtime.count(|c| *c == RuntimeCall::DestroySession), 1);
    assert_eq!(runtime.count(|c| *c == RuntimeCall::DestroyInstance), 1);
    assert_eq!(runtime.pending_events(), 0);
}

#[test]
fn test_instance_retries_then_runs() {
    let runtime = StubRuntime::new().fail_instance_creations(2).auto_lifecycle(Some(1));
    let sleeps = Arc::new(Mutex::new(Vec::new()));
    let mut app = app(&runtime, Box::new(NullRenderer)).with_backoff(recorded_backoff(&sleeps));

    app.run().unwrap();

    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::CreateInstance { .. })), 3);
    assert_eq!(
        *sleeps.lock().unwrap(),
        vec![Duration::from_secs(2), Duration::from_secs(4)]
    );
}

#[test]
fn test_instance_retries_exhausted() {
    let runtime = StubRuntime::new().fail_instance_creations(10);
    let sleeps = Arc::new(Mutex::new(Vec::new()));
    let mut app = app(&runtime, Box::new(NullRenderer)).with_backoff(recorded_backoff(&sleeps));

    let result = app.run();

    assert!(matches!(result, Err(XrError::RetriesExhausted { retries: 5, .. })));
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::CreateInstance { .. })), 6);
    assert_eq!(sleeps.lock().unwrap().len(), 5);
    assert_eq!(runtime.count(|c| *c == RuntimeCall::CreateSession), 0);
}

#[test]
fn test_termination_from_renderer() {
    let runtime = StubRuntime::new().auto_lifecycle(None);
    let termination = TerminationHandle::new();
    let renderer = CountingRenderer {
        frames: 0,
        stop_after: 5,
        termination: termination.clone(),
    };
    let mut app = app(&runtime, Box::new(renderer));

    // forward the renderer's request the way a signal handler would
    let handle = app.termination_handle();
    let watcher = std::thread::spawn(move || {
        while !termination.is_requested() {
            std::thread::sleep(Duration::from_millis(1));
        }
        handle.request();
    });

    app.run().unwrap();
    watcher.join().unwrap();

    assert!(runtime.count(|c| matches!(c, RuntimeCall::EndFrame { .. })) >= 5);
    assert_eq!(runtime.count(|c| *c == RuntimeCall::EndSession), 1);
    assert_eq!(runtime.count(|c| *c == RuntimeCall::DestroySession), 1);
    assert_eq!(runtime.count(|c| *c == RuntimeCall::DestroyInstance), 1);
}

#[test]
fn test_termination_before_run() {
    let runtime = StubRuntime::new().auto_lifecycle(Some(1));
    let mut app = app(&runtime, Box::new(NullRenderer));

    app.termination_handle().request();
    app.run().unwrap();

    assert!(runtime.calls().is_empty());
}

#[test]
fn test_unknown_event_fails_run_when_strict() {
    let runtime = StubRuntime::new().auto_lifecycle(Some(10));
    runtime.push_event(RuntimeEvent::Other("XR_TYPE_EVENT_DATA_PERF_SETTINGS_EXT".into()));
    let mut app = app(&runtime, Box::new(NullRenderer)).with_event_policy(UnknownEventPolicy::Fail);

    let result = app.run();

    assert!(matches!(result, Err(XrError::UnhandledEvent(_))));
    assert_eq!(runtime.count(|c| *c == RuntimeCall::DestroySession), 1);
    assert_eq!(runtime.count(|c| *c == RuntimeCall::DestroyInstance), 1);
}

#[test]
fn test_unknown_event_ignored_by_default() {
    let runtime = StubRuntime::new().auto_lifecycle(Some(2));
    runtime.push_event(RuntimeEvent::Other("XR_TYPE_EVENT_DATA_PERF_SETTINGS_EXT".into()));
    let mut app = app(&runtime, Box::new(NullRenderer));

    app.run().unwrap();

    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::EndFrame { .. })), 2);
}
