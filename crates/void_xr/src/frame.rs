//! Per-frame data produced by the frame protocol

use std::time::Duration;

use crate::runtime::{SpaceHandle, SwapchainHandle};
use crate::{Fov, Pose, Time};

/// Swapchain image acquired for the current frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageId {
    /// Name of the swapchain spec
    pub swapchain: String,
    pub handle: SwapchainHandle,
    pub image_index: u32,
}

/// View location validity flags (`XrViewStateFlags`)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewState {
    pub orientation_valid: bool,
    pub position_valid: bool,
    pub orientation_tracked: bool,
    pub position_tracked: bool,
}

impl ViewState {
    pub const TRACKED: ViewState = ViewState {
        orientation_valid: true,
        position_valid: true,
        orientation_tracked: true,
        position_tracked: true,
    };
}

/// Eye pose and field of view
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct View {
    pub pose: Pose,
    pub fov: Fov,
}

/// Views located at the predicted display time
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewInfo {
    pub state: ViewState,
    pub views: Vec<View>,
}

/// Result of waiting for the next frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameState {
    pub predicted_display_time: Time,
    pub predicted_display_period: Duration,
    pub should_render: bool,
}

/// Timing of the frame in flight, overwritten on every wait
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameTiming {
    pub predicted_display_time: Time,
    pub predicted_display_period: Duration,
}

impl From<&FrameState> for FrameTiming {
    fn from(state: &FrameState) -> Self {
        Self {
            predicted_display_time: state.predicted_display_time,
            predicted_display_period: state.predicted_display_period,
        }
    }
}

/// Everything a renderer needs to produce one frame.
///
/// Only valid for the frame it was built for.
#[derive(Clone, Debug)]
pub struct FrameInfo {
    pub image: ImageId,
    pub views: ViewInfo,
    /// Space the views are located in
    pub space: SpaceHandle,
    pub predicted_display_time: Time,
    pub predicted_display_period: Duration,
    pub aspect_ratio: f32,
}

/// Named reference space located against the tracking space
#[derive(Clone, Debug, PartialEq)]
pub struct SpaceLocation {
    pub name: String,
    pub pose: Pose,
    pub position_valid: bool,
    pub orientation_valid: bool,
}

impl SpaceLocation {
    pub fn is_valid(&self) -> bool {
        self.position_valid && self.orientation_valid
    }
}
