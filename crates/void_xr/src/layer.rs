//! Composition layers submitted at the end of a frame

use glam::Vec2;

use crate::runtime::{SpaceHandle, SwapchainHandle};
use crate::{Fov, Pose};

/// How the compositor blends submitted layers with the environment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    Opaque,
    Additive,
    AlphaBlend,
}

/// Pixel rectangle within a swapchain image
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_extent(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

/// Region of a swapchain image referenced by a layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubImage {
    pub swapchain: SwapchainHandle,
    pub rect: Rect2D,
    pub array_index: u32,
}

/// Which eyes see a layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EyeVisibility {
    #[default]
    Both,
    Left,
    Right,
}

/// One eye of a projection layer
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionView {
    pub pose: Pose,
    pub fov: Fov,
    pub sub_image: SubImage,
}

/// Layer descriptor handed to the compositor
#[derive(Clone, Debug, PartialEq)]
pub enum CompositionLayer {
    /// Stereo projection, one view per eye
    Projection {
        space: SpaceHandle,
        views: Vec<ProjectionView>,
    },
    /// Flat rectangle placed in a space
    Quad {
        space: SpaceHandle,
        eye_visibility: EyeVisibility,
        sub_image: SubImage,
        pose: Pose,
        size: Vec2,
    },
    /// Cube map surrounding the viewer
    Cube {
        space: SpaceHandle,
        eye_visibility: EyeVisibility,
        swapchain: SwapchainHandle,
        image_array_index: u32,
        orientation: glam::Quat,
    },
    /// Equirectangular image mapped onto a sphere
    Equirect {
        space: SpaceHandle,
        eye_visibility: EyeVisibility,
        sub_image: SubImage,
        pose: Pose,
        radius: f32,
        scale: Vec2,
        bias: Vec2,
    },
}

impl CompositionLayer {
    pub fn kind(&self) -> &'static str {
        match self {
            CompositionLayer::Projection { .. } => "projection",
            CompositionLayer::Quad { .. } => "quad",
            CompositionLayer::Cube { .. } => "cube",
            CompositionLayer::Equirect { .. } => "equirect",
        }
    }
}

/// Renderer output for one frame
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameEnd {
    pub blend_mode: BlendMode,
    pub layers: Vec<CompositionLayer>,
}

impl FrameEnd {
    pub fn new(blend_mode: BlendMode) -> Self {
        Self {
            blend_mode,
            layers: Vec::new(),
        }
    }

    pub fn with_layer(mut self, layer: CompositionLayer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
