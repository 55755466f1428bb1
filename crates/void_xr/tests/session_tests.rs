//! Integration tests for the void_xr session service

use std::time::{Duration, Instant};

use void_xr::prelude::*;
use void_xr::{
    FrameInfo, InputBinding, ProjectionView, RawActionState, Rect2D, ReferenceSpaceType, RuntimeCall,
    SpaceLocation, SubImage, Time, ViewConfigurationType,
};

// Renderer that records what the frame protocol hands it
#[derive(Default)]
struct RecordingRenderer {
    rendered: usize,
    paused: usize,
    frames: Vec<FrameInfo>,
    locations: Vec<SpaceLocation>,
    action_sets: Vec<ActionSet>,
    haptic_threshold: Option<f32>,
    requested: Vec<String>,
}

impl RecordingRenderer {
    fn with_haptic_threshold(threshold: f32) -> Self {
        Self {
            haptic_threshold: Some(threshold),
            ..Self::default()
        }
    }

    fn layer(frame: &FrameInfo) -> FrameEnd {
        let views = frame
            .views
            .views
            .iter()
            .enumerate()
            .map(|(eye, view)| ProjectionView {
                pose: view.pose,
                fov: view.fov,
                sub_image: SubImage {
                    swapchain: frame.image.handle,
                    rect: Rect2D::from_extent(1024, 1024),
                    array_index: eye as u32,
                },
            })
            .collect();

        FrameEnd::new(BlendMode::Opaque).with_layer(CompositionLayer::Projection {
            space: frame.space,
            views,
        })
    }
}

impl Renderer for RecordingRenderer {
    fn name(&self) -> &str {
        "recording"
    }

    fn paused(&mut self, frame: &FrameInfo, _graphics: &mut dyn GraphicsService) -> FrameEnd {
        self.paused += 1;
        self.frames.push(frame.clone());
        FrameEnd::default()
    }

    fn render(&mut self, frame: &FrameInfo, _graphics: &mut dyn GraphicsService) -> FrameEnd {
        self.rendered += 1;
        self.frames.push(frame.clone());
        Self::layer(frame)
    }

    fn set_space_locations(&mut self, locations: &[SpaceLocation]) {
        self.locations = locations.to_vec();
    }

    fn set_action_sets(&mut self, sets: &[ActionSet]) -> Vec<Vibrate> {
        self.action_sets = sets.to_vec();

        let Some(threshold) = self.haptic_threshold else {
            return Vec::new();
        };

        let pulled = sets
            .iter()
            .filter_map(|set| set.get("trigger"))
            .any(|a| a.is_active && a.changed && a.value.as_float().unwrap_or(0.0) > threshold);

        if pulled {
            self.requested.push("buzz".into());
            vec![Vibrate::new("buzz").amplitude(0.8)]
        } else {
            Vec::new()
        }
    }
}

fn setup(runtime: &StubRuntime) -> Context {
    let _ = env_logger::builder().is_test(true).try_init();
    ContextCreation::headless()
        .app_name("session_tests")
        .create(runtime)
        .unwrap()
        .unwrap()
}

fn color_config() -> SessionConfig {
    SessionConfig::new().add_swapchain(
        SwapchainSpec::new("color")
            .format(formats::R8G8B8A8_UNORM)
            .size(1024, 1024)
            .color_attachment(),
    )
}

fn game_config() -> SessionConfig {
    color_config()
        .interaction_profile(InteractionProfile::OculusTouch)
        .add_action_set(
            ActionSetSpec::new("game")
                .add_action(ActionSpec::new(
                    "trigger",
                    InputBinding::new(Source::HandRight, Identifier::Trigger, Component::Value),
                ))
                .add_action(ActionSpec::new(
                    "hand",
                    InputBinding::new(Source::HandRight, Identifier::Grip, Component::Pose),
                ))
                .add_action(ActionSpec::new(
                    "buzz",
                    InputBinding::new(Source::HandRight, Identifier::Haptic, Component::Vibrate),
                )),
        )
}

fn advance(session: &mut SessionService<'_>, ctx: &Context, states: &[SessionState]) {
    for &state in states {
        session.handle(ctx, state).unwrap();
        assert_eq!(session.state(), state);
    }
}

const TO_FOCUSED: [SessionState; 5] = [
    SessionState::Idle,
    SessionState::Ready,
    SessionState::Synchronized,
    SessionState::Visible,
    SessionState::Focused,
];

fn float_state(is_active: bool, changed: bool, value: f32) -> RawActionState {
    RawActionState {
        is_active,
        changed,
        value: ActionState::Float(value),
    }
}

#[test]
fn test_init_single_swapchain_without_actions() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    runtime.clear_calls();

    let config = color_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = NullRenderer;

    {
        let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
        session.init(&mut ctx).unwrap();

        assert_eq!(session.state(), SessionState::Unknown);
        assert_eq!(session.swapchains().len(), 1);
        assert_eq!(session.swapchains()[0].images.len(), 3);
        assert_eq!(session.action_sets().count(), 0);
        assert!(!session.tracking_space().is_null());

        session.handle(&ctx, SessionState::Idle).unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    assert_eq!(
        runtime.count(|c| matches!(
            c,
            RuntimeCall::CreateSwapchain { format, width: 1024, height: 1024, .. }
                if *format == formats::R8G8B8A8_UNORM
        )),
        1
    );
    assert_eq!(runtime.count(RuntimeCall::is_action_call), 0);
    assert_eq!(graphics.swapchains().len(), 1);
}

#[test]
fn test_unsupported_swapchain_format() {
    let runtime = StubRuntime::new().swapchain_formats(vec![formats::B8G8R8A8_SRGB]);
    let mut ctx = setup(&runtime);
    let config = color_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = NullRenderer;
    let mut session = SessionService::new(&config, &mut graphics, &mut renderer);

    assert!(matches!(session.init(&mut ctx), Err(XrError::Unsupported(_))));
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::CreateSwapchain { .. })), 0);
}

#[test]
fn test_idle_frames_only_sleep() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    let config = color_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = NullRenderer;
    let mut session =
        SessionService::new(&config, &mut graphics, &mut renderer).with_idle_sleep(Duration::from_millis(2));
    session.init(&mut ctx).unwrap();
    advance(&mut session, &ctx, &[SessionState::Idle]);
    runtime.clear_calls();

    let start = Instant::now();
    for _ in 0..3 {
        session.process_frame().unwrap();
    }

    assert!(start.elapsed() >= Duration::from_millis(6));
    assert_eq!(runtime.count(RuntimeCall::is_frame_call), 0);
    assert!(runtime.calls().is_empty());
}

#[test]
fn test_ready_without_stereo_fails_before_begin() {
    let runtime = StubRuntime::new().view_configurations(vec![ViewConfigurationType::PrimaryMono]);
    let mut ctx = setup(&runtime);
    let config = color_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = NullRenderer;
    let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
    session.init(&mut ctx).unwrap();
    advance(&mut session, &ctx, &[SessionState::Idle]);

    let result = session.handle(&ctx, SessionState::Ready);

    assert!(matches!(result, Err(XrError::Unsupported(_))));
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::BeginSession(_))), 0);
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_same_state_is_noop() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    let config = color_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = NullRenderer;
    let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
    session.init(&mut ctx).unwrap();
    advance(&mut session, &ctx, &TO_FOCUSED[..2]);
    runtime.clear_calls();

    session.handle(&ctx, SessionState::Ready).unwrap();

    assert_eq!(session.state(), SessionState::Ready);
    assert!(runtime.calls().is_empty());
}

#[test]
fn test_one_begin_and_end_per_frame() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    let config = color_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = RecordingRenderer::default();

    {
        let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
        session.init(&mut ctx).unwrap();
        advance(&mut session, &ctx, &TO_FOCUSED);
        runtime.clear_calls();

        for _ in 0..3 {
            session.process_frame().unwrap();
        }
        assert!(session.frame_timing().predicted_display_time > Time(0));
    }

    assert_eq!(runtime.count(|c| *c == RuntimeCall::WaitFrame), 3);
    assert_eq!(runtime.count(|c| *c == RuntimeCall::BeginFrame), 3);
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::EndFrame { layers: 1, .. })), 3);
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::AcquireImage(_))), 3);
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::ReleaseImage(_))), 3);

    assert_eq!(renderer.rendered, 3);
    let images: Vec<u32> = renderer.frames.iter().map(|f| f.image.image_index).collect();
    assert_eq!(images, vec![0, 1, 2]);
    assert_eq!(renderer.frames[0].views.views.len(), 2);
    assert_eq!(renderer.frames[0].aspect_ratio, 1.0);
}

#[test]
fn test_end_frame_stamped_with_predicted_time() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    let config = color_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = NullRenderer;
    let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
    session.init(&mut ctx).unwrap();
    advance(&mut session, &ctx, &TO_FOCUSED);
    runtime.clear_calls();

    session.process_frame().unwrap();

    let predicted = session.frame_timing().predicted_display_time;
    assert!(runtime
        .calls()
        .iter()
        .any(|c| matches!(c, RuntimeCall::EndFrame { display_time, .. } if *display_time == predicted)));
}

#[test]
fn test_no_render_submits_empty_frame() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    let config = color_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = RecordingRenderer::default();

    {
        let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
        session.init(&mut ctx).unwrap();
        advance(&mut session, &ctx, &TO_FOCUSED);
        runtime.clear_calls();

        runtime.push_frame(false);
        session.process_frame().unwrap();
    }

    assert_eq!(runtime.count(|c| *c == RuntimeCall::BeginFrame), 1);
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::EndFrame { layers: 0, .. })), 1);
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::AcquireImage(_))), 0);
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::ReleaseImage(_))), 0);
    assert_eq!(renderer.rendered, 0);
}

#[test]
fn test_rejected_begin_frame_still_ends_frame() {
    let runtime = StubRuntime::new().reject_begin_frames(1);
    let mut ctx = setup(&runtime);
    let config = color_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = NullRenderer;
    let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
    session.init(&mut ctx).unwrap();
    advance(&mut session, &ctx, &TO_FOCUSED);
    runtime.clear_calls();

    session.process_frame().unwrap();
    session.process_frame().unwrap();

    assert_eq!(runtime.count(|c| *c == RuntimeCall::BeginFrame), 2);
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::EndFrame { .. })), 2);
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::AcquireImage(_))), 1);
}

#[test]
fn test_visible_frames_are_paused() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    let config = color_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = RecordingRenderer::default();

    {
        let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
        session.init(&mut ctx).unwrap();
        advance(&mut session, &ctx, &TO_FOCUSED[..4]);
        session.process_frame().unwrap();

        advance(&mut session, &ctx, &[SessionState::Synchronized]);
        session.process_frame().unwrap();
    }

    assert_eq!(renderer.paused, 1);
    assert_eq!(renderer.rendered, 0);
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::EndFrame { layers: 0, .. })), 2);
    // no input sync outside focus
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::SyncActions(_))), 0);
}

#[test]
fn test_named_spaces_located_each_frame() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    let config = color_config().add_space(ReferenceSpaceSpec::new("stage", ReferenceSpaceType::Stage));
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = RecordingRenderer::default();

    {
        let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
        session.init(&mut ctx).unwrap();
        let stage = session.space("stage").unwrap();
        advance(&mut session, &ctx, &TO_FOCUSED);
        runtime.clear_calls();

        session.process_frame().unwrap();
        assert_eq!(runtime.count(|c| *c == RuntimeCall::LocateSpace(stage)), 1);
    }

    assert_eq!(renderer.locations.len(), 1);
    assert_eq!(renderer.locations[0].name, "stage");
    assert!(renderer.locations[0].is_valid());
}

#[test]
fn test_action_setup_suggests_profile_paths() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    let config = game_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = NullRenderer;
    let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
    session.init(&mut ctx).unwrap();

    let suggested = runtime.calls().into_iter().find_map(|c| match c {
        RuntimeCall::SuggestBindings { profile, paths } => Some((profile, paths)),
        _ => None,
    });
    let (profile, paths) = suggested.unwrap();

    assert_eq!(profile, "/interaction_profiles/oculus/touch_controller");
    assert_eq!(
        paths,
        vec![
            "/user/hand/right/input/trigger/value".to_string(),
            "/user/hand/right/input/grip/pose".to_string(),
            "/user/hand/right/output/haptic".to_string(),
        ]
    );
    assert_eq!(runtime.count(|c| *c == RuntimeCall::CreateActionSpace("hand".into())), 1);
    assert_eq!(runtime.count(|c| *c == RuntimeCall::AttachActionSets(1)), 1);
    assert_eq!(session.action_sets().count(), 1);
}

#[test]
fn test_inactive_action_keeps_last_value() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    let config = game_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = RecordingRenderer::default();
    let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
    session.init(&mut ctx).unwrap();
    advance(&mut session, &ctx, &TO_FOCUSED);

    runtime.set_action_state("trigger", float_state(true, true, 0.4));
    session.process_frame().unwrap();

    runtime.set_action_state("trigger", float_state(false, false, 0.0));
    session.process_frame().unwrap();

    let game = session.action_sets().next().unwrap();
    let trigger = game.get("trigger").unwrap();
    assert!(!trigger.is_active);
    assert_eq!(trigger.value, ActionState::Float(0.4));
}

#[test]
fn test_active_pose_action_is_located() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    let config = game_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = RecordingRenderer::default();

    {
        let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
        session.init(&mut ctx).unwrap();
        advance(&mut session, &ctx, &TO_FOCUSED);
        runtime.set_action_state(
            "hand",
            RawActionState {
                is_active: true,
                changed: false,
                value: ActionState::Pose(Pose::IDENTITY),
            },
        );
        runtime.clear_calls();

        session.process_frame().unwrap();
    }

    // no named spaces, only the hand's action space
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::LocateSpace(_))), 1);
    assert_eq!(runtime.count(|c| *c == RuntimeCall::GetActionState("buzz".into())), 0);

    let hand = renderer.action_sets[0].get("hand").unwrap();
    assert!(hand.is_active);
    assert_eq!(hand.value.as_pose(), Some(Pose::IDENTITY));
}

#[test]
fn test_threshold_triggers_single_haptic() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    let config = game_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = RecordingRenderer::with_haptic_threshold(0.9);

    {
        let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
        session.init(&mut ctx).unwrap();
        advance(&mut session, &ctx, &TO_FOCUSED);

        runtime.set_action_state("trigger", float_state(true, true, 0.95));
        session.process_frame().unwrap();

        runtime.set_action_state("trigger", float_state(true, false, 0.95));
        session.process_frame().unwrap();
    }

    assert_eq!(renderer.requested, vec!["buzz".to_string()]);
    assert_eq!(
        runtime.count(|c| matches!(c, RuntimeCall::ApplyHaptic { action, .. } if action == "buzz")),
        1
    );
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::SyncActions(1))), 2);
}

#[test]
fn test_haptic_resolves_to_vibration_action_across_sets() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    // "buzz" is a float in "menu" and a haptic output in "game"
    let config = color_config()
        .interaction_profile(InteractionProfile::OculusTouch)
        .add_action_set(ActionSetSpec::new("menu").add_action(ActionSpec::new(
            "buzz",
            InputBinding::new(Source::HandLeft, Identifier::Trigger, Component::Value),
        )))
        .add_action_set(
            ActionSetSpec::new("game")
                .add_action(ActionSpec::new(
                    "trigger",
                    InputBinding::new(Source::HandRight, Identifier::Trigger, Component::Value),
                ))
                .add_action(ActionSpec::new(
                    "buzz",
                    InputBinding::new(Source::HandRight, Identifier::Haptic, Component::Vibrate),
                )),
        );
    assert!(config.validate().is_ok());
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = RecordingRenderer::with_haptic_threshold(0.5);

    {
        let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
        session.init(&mut ctx).unwrap();
        advance(&mut session, &ctx, &TO_FOCUSED);

        runtime.set_action_state("trigger", float_state(true, true, 0.9));
        session.process_frame().unwrap();
        assert_eq!(session.state(), SessionState::Focused);
    }

    assert_eq!(renderer.requested, vec!["buzz".to_string()]);
    assert_eq!(
        runtime.count(|c| matches!(c, RuntimeCall::ApplyHaptic { action, .. } if action == "buzz")),
        1
    );
}

#[test]
fn test_stopping_then_exiting() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    let config = color_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = NullRenderer;
    let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
    session.init(&mut ctx).unwrap();
    advance(&mut session, &ctx, &TO_FOCUSED);

    advance(&mut session, &ctx, &[SessionState::Stopping]);
    assert_eq!(runtime.count(|c| *c == RuntimeCall::EndSession), 1);
    assert!(session.is_running());

    advance(&mut session, &ctx, &[SessionState::Idle, SessionState::Exiting]);
    assert!(!session.is_running());
    assert!(session.should_exit());
    assert!(!session.has_session());
    assert_eq!(runtime.count(|c| *c == RuntimeCall::DestroySession), 1);
}

#[test]
fn test_terminate_ends_running_session() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    let config = color_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = NullRenderer;
    let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
    session.init(&mut ctx).unwrap();
    advance(&mut session, &ctx, &TO_FOCUSED);
    runtime.clear_calls();

    session.terminate();
    session.process_frame().unwrap();
    session.process_frame().unwrap();

    assert_eq!(session.state(), SessionState::Exiting);
    assert!(session.should_exit());
    assert_eq!(runtime.count(|c| *c == RuntimeCall::EndSession), 1);
    assert_eq!(runtime.count(|c| *c == RuntimeCall::DestroySession), 1);
    assert_eq!(runtime.count(RuntimeCall::is_frame_call), 0);
}

#[test]
fn test_session_destroyed_once_on_drop() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    let config = color_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = NullRenderer;

    {
        let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
        session.init(&mut ctx).unwrap();
    }

    assert_eq!(runtime.count(|c| *c == RuntimeCall::DestroySession), 1);
}

#[test]
fn test_located_views_use_tracking_space() {
    let runtime = StubRuntime::new();
    let mut ctx = setup(&runtime);
    let config = color_config();
    let mut graphics = HeadlessGraphicsService::new();
    let mut renderer = RecordingRenderer::default();

    let tracking = {
        let mut session = SessionService::new(&config, &mut graphics, &mut renderer);
        session.init(&mut ctx).unwrap();
        advance(&mut session, &ctx, &TO_FOCUSED);
        session.process_frame().unwrap();
        session.tracking_space()
    };

    assert_eq!(renderer.frames[0].space, tracking);
    assert!(renderer.frames[0].views.state.position_valid);
}
