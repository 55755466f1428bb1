//! Declarative session configuration
//!
//! A [`SessionConfig`] lists everything a session creates up front:
//! swapchains, named reference spaces and input action sets. It is
//! validated once before the runtime session exists.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{XrError, XrResult};
use crate::input::{InputBinding, InteractionProfile};
use crate::{Pose, ReferenceSpaceType};

/// Common swapchain formats (Vulkan `VkFormat` values)
pub mod formats {
    pub const R8G8B8A8_UNORM: i64 = 37;
    pub const R8G8B8A8_SRGB: i64 = 43;
    pub const B8G8R8A8_UNORM: i64 = 44;
    pub const B8G8R8A8_SRGB: i64 = 50;
    pub const D32_SFLOAT: i64 = 126;
}

/// Swapchain usage flags (`XrSwapchainUsageFlags`)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwapchainUsage(pub u64);

impl SwapchainUsage {
    pub const COLOR_ATTACHMENT: Self = Self(0x0000_0001);
    pub const DEPTH_STENCIL_ATTACHMENT: Self = Self(0x0000_0002);
    pub const UNORDERED_ACCESS: Self = Self(0x0000_0004);
    pub const TRANSFER_SRC: Self = Self(0x0000_0008);
    pub const TRANSFER_DST: Self = Self(0x0000_0010);
    pub const SAMPLED: Self = Self(0x0000_0020);
    pub const MUTABLE_FORMAT: Self = Self(0x0000_0040);

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for SwapchainUsage {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for SwapchainUsage {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Swapchain description
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapchainSpec {
    pub name: String,
    pub create_flags: u64,
    pub usage: SwapchainUsage,
    pub format: i64,
    pub sample_count: u32,
    pub width: u32,
    pub height: u32,
    pub face_count: u32,
    pub array_size: u32,
    pub mip_count: u32,
}

impl Default for SwapchainSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            create_flags: 0,
            usage: SwapchainUsage::default(),
            format: formats::R8G8B8A8_UNORM,
            sample_count: 1,
            width: 1024,
            height: 1024,
            face_count: 1,
            array_size: 1,
            mip_count: 1,
        }
    }
}

impl SwapchainSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn format(mut self, format: i64) -> Self {
        self.format = format;
        self
    }

    pub fn usage(mut self, usage: SwapchainUsage) -> Self {
        self.usage |= usage;
        self
    }

    pub fn color_attachment(self) -> Self {
        self.usage(SwapchainUsage::COLOR_ATTACHMENT)
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// One layer per eye
    pub fn array_size(mut self, size: u32) -> Self {
        self.array_size = size;
        self
    }

    pub fn face_count(mut self, count: u32) -> Self {
        self.face_count = count;
        self
    }

    pub fn mip_count(mut self, count: u32) -> Self {
        self.mip_count = count;
        self
    }

    pub fn create_flags(mut self, flags: u64) -> Self {
        self.create_flags = flags;
        self
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }
}

/// Named reference space created with the session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSpaceSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub space_type: ReferenceSpaceType,
    /// Offset of the space origin within the reference space
    #[serde(default)]
    pub position: [f32; 3],
    /// Orientation quaternion (x, y, z, w)
    #[serde(default = "identity_orientation")]
    pub orientation: [f32; 4],
}

fn identity_orientation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl ReferenceSpaceSpec {
    pub fn new(name: impl Into<String>, space_type: ReferenceSpaceType) -> Self {
        Self {
            name: name.into(),
            space_type,
            position: [0.0; 3],
            orientation: identity_orientation(),
        }
    }

    pub fn pose(mut self, pose: Pose) -> Self {
        self.position = pose.position.to_array();
        self.orientation = pose.orientation.to_array();
        self
    }

    /// Pose of the space origin
    pub fn pose_in_space(&self) -> Pose {
        Pose::new(
            Vec3::from_array(self.position),
            Quat::from_array(self.orientation).normalize(),
        )
    }
}

/// One logical input bound to a device path
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub binding: InputBinding,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, binding: InputBinding) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            binding,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Group of actions activated together
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionSetSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

impl ActionSetSpec {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            priority: 0,
            actions: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn add_action(mut self, action: ActionSpec) -> Self {
        self.actions.push(action);
        self
    }
}

/// Everything a session creates at init
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub swapchains: Vec<SwapchainSpec>,
    pub spaces: Vec<ReferenceSpaceSpec>,
    pub action_sets: Vec<ActionSetSpec>,
    /// Profile the action bindings are suggested for
    pub interaction_profile: InteractionProfile,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_swapchain(mut self, spec: SwapchainSpec) -> Self {
        self.swapchains.push(spec);
        self
    }

    pub fn add_space(mut self, spec: ReferenceSpaceSpec) -> Self {
        self.spaces.push(spec);
        self
    }

    pub fn add_action_set(mut self, spec: ActionSetSpec) -> Self {
        self.action_sets.push(spec);
        self
    }

    pub fn interaction_profile(mut self, profile: InteractionProfile) -> Self {
        self.interaction_profile = profile;
        self
    }

    /// Check the description before any runtime object is created
    pub fn validate(&self) -> XrResult<()> {
        if self.swapchains.is_empty() {
            return Err(XrError::InvalidConfig("at least one swapchain required".into()));
        }

        for swapchain in &self.swapchains {
            if swapchain.width == 0 || swapchain.height == 0 {
                return Err(XrError::InvalidConfig(format!(
                    "swapchain '{}' has zero extent",
                    swapchain.name
                )));
            }
        }

        let mut seen = std::collections::BTreeSet::new();
        for space in &self.spaces {
            if !seen.insert(space.name.as_str()) {
                return Err(XrError::InvalidConfig(format!(
                    "duplicate reference space '{}'",
                    space.name
                )));
            }
        }

        for set in &self.action_sets {
            if set.name.is_empty() {
                return Err(XrError::InvalidConfig("action set name must not be empty".into()));
            }
            let mut names = std::collections::BTreeSet::new();
            for action in &set.actions {
                if action.name.is_empty() {
                    return Err(XrError::InvalidConfig(format!(
                        "action in set '{}' has an empty name",
                        set.name
                    )));
                }
                if !names.insert(action.name.as_str()) {
                    return Err(XrError::InvalidConfig(format!(
                        "duplicate action '{}' in set '{}'",
                        action.name, set.name
                    )));
                }
                // Resolves the input path, rejecting identifiers the profile lacks
                self.interaction_profile.path(&action.binding)?;
            }
        }

        Ok(())
    }

    pub fn action_count(&self) -> usize {
        self.action_sets.iter().map(|s| s.actions.len()).sum()
    }
}
