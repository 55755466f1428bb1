//! Renderer contract driven by the frame protocol

use crate::action::{ActionSet, ActionSetSelector, Vibrate};
use crate::context::Context;
use crate::error::XrResult;
use crate::frame::{FrameInfo, SpaceLocation};
use crate::graphics::GraphicsService;
use crate::layer::FrameEnd;

/// Produces composition layers for each frame.
///
/// Everything handed to a renderer (frame info, space locations, action
/// sets) is only valid for the current frame.
pub trait Renderer {
    fn name(&self) -> &str {
        "renderer"
    }

    fn init(&mut self, _ctx: &Context, _graphics: &mut dyn GraphicsService) -> XrResult<()> {
        Ok(())
    }

    fn begin_frame(&mut self) {}

    fn end_frame(&mut self) {}

    /// Content while visible but without input focus
    fn paused(&mut self, frame: &FrameInfo, graphics: &mut dyn GraphicsService) -> FrameEnd;

    /// Content while focused
    fn render(&mut self, frame: &FrameInfo, graphics: &mut dyn GraphicsService) -> FrameEnd;

    /// Named reference spaces located at the predicted display time
    fn set_space_locations(&mut self, _locations: &[SpaceLocation]) {}

    /// Refreshed action sets; returns haptic pulses to issue
    fn set_action_sets(&mut self, _sets: &[ActionSet]) -> Vec<Vibrate> {
        Vec::new()
    }

    fn active_action_sets(&self) -> ActionSetSelector {
        ActionSetSelector::All
    }
}

/// Renderer that submits no layers
#[derive(Clone, Copy, Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn name(&self) -> &str {
        "null"
    }

    fn paused(&mut self, _frame: &FrameInfo, _graphics: &mut dyn GraphicsService) -> FrameEnd {
        FrameEnd::default()
    }

    fn render(&mut self, _frame: &FrameInfo, _graphics: &mut dyn GraphicsService) -> FrameEnd {
        FrameEnd::default()
    }
}
