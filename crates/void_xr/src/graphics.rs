//! Graphics backend contract
//!
//! A [`GraphicsContextCreation`] is validated against the runtime while the
//! context is created. A [`GraphicsService`] owns the device, hands its
//! binding to session creation and receives the swapchains created by the
//! session.

use crate::config::SwapchainSpec;
use crate::context::Context;
use crate::error::{RuntimeCheck, XrError, XrResult};
use crate::runtime::{SwapchainHandle, SystemId, XrInstance};
use crate::Version;

/// Graphics API a session binds to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GraphicsApi {
    /// No rendering device (`XR_MND_headless`)
    Headless,
    Vulkan,
}

/// Backend device handles passed to session creation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GraphicsBinding {
    #[default]
    Headless,
    Vulkan {
        instance: u64,
        physical_device: u64,
        device: u64,
        queue_family_index: u32,
        queue_index: u32,
    },
}

/// Graphics state negotiated at context creation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphicsContext {
    Headless,
    Vulkan {
        app_name: String,
        api_version: Version,
        layers: Vec<String>,
        extensions: Vec<String>,
    },
}

impl GraphicsContext {
    pub fn api(&self) -> GraphicsApi {
        match self {
            GraphicsContext::Headless => GraphicsApi::Headless,
            GraphicsContext::Vulkan { .. } => GraphicsApi::Vulkan,
        }
    }
}

/// Graphics part of a context creation request
pub trait GraphicsContextCreation {
    fn api(&self) -> GraphicsApi;

    /// Instance extension enabling this binding
    fn extension(&self) -> &'static str;

    fn create(&self, instance: &dyn XrInstance, system: SystemId) -> XrResult<GraphicsContext>;
}

/// Session without a rendering device
#[derive(Clone, Copy, Debug, Default)]
pub struct HeadlessContextCreation;

impl GraphicsContextCreation for HeadlessContextCreation {
    fn api(&self) -> GraphicsApi {
        GraphicsApi::Headless
    }

    fn extension(&self) -> &'static str {
        "XR_MND_headless"
    }

    fn create(&self, _instance: &dyn XrInstance, _system: SystemId) -> XrResult<GraphicsContext> {
        Ok(GraphicsContext::Headless)
    }
}

/// Vulkan instance request, checked against the runtime's requirements
#[derive(Clone, Debug)]
pub struct VulkanContextCreation {
    pub app_name: String,
    pub app_version: u32,
    pub engine_name: String,
    pub engine_version: u32,
    pub api_version: Version,
    pub layers: Vec<String>,
    pub extensions: Vec<String>,
}

impl Default for VulkanContextCreation {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            app_version: 0,
            engine_name: String::new(),
            engine_version: 0,
            api_version: Version::new(1, 3, 0),
            layers: Vec::new(),
            extensions: Vec::new(),
        }
    }
}

impl VulkanContextCreation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn app_version(mut self, version: u32) -> Self {
        self.app_version = version;
        self
    }

    pub fn engine(mut self, name: impl Into<String>) -> Self {
        self.engine_name = name.into();
        self
    }

    pub fn engine_version(mut self, version: u32) -> Self {
        self.engine_version = version;
        self
    }

    pub fn api_version(mut self, version: Version) -> Self {
        self.api_version = version;
        self
    }

    pub fn add_layer(mut self, layer: impl Into<String>) -> Self {
        self.layers.push(layer.into());
        self
    }

    pub fn add_extension(mut self, extension: impl Into<String>) -> Self {
        self.extensions.push(extension.into());
        self
    }

    fn validate(&self, min: Version) -> XrResult<()> {
        if self.app_name.is_empty() {
            return Err(XrError::InvalidConfig("VulkanContextCreation: app name required".into()));
        }
        if self.api_version.is_zero() {
            return Err(XrError::InvalidConfig("VulkanContextCreation: api version required".into()));
        }
        if (self.api_version.major, self.api_version.minor) < (min.major, min.minor) {
            return Err(XrError::VersionMismatch(format!(
                "VulkanContextCreation: minimum required version {}, requested {}",
                min, self.api_version
            )));
        }
        Ok(())
    }
}

impl GraphicsContextCreation for VulkanContextCreation {
    fn api(&self) -> GraphicsApi {
        GraphicsApi::Vulkan
    }

    fn extension(&self) -> &'static str {
        "XR_KHR_vulkan_enable2"
    }

    fn create(&self, instance: &dyn XrInstance, system: SystemId) -> XrResult<GraphicsContext> {
        let requirements = instance.graphics_requirements(system, GraphicsApi::Vulkan).check()?;
        self.validate(requirements.min_api_version)?;

        log::debug!(
            "Vulkan {} accepted (runtime supports {} - {})",
            self.api_version,
            requirements.min_api_version,
            requirements.max_api_version
        );

        Ok(GraphicsContext::Vulkan {
            app_name: self.app_name.clone(),
            api_version: self.api_version,
            layers: self.layers.clone(),
            extensions: self.extensions.clone(),
        })
    }
}

/// A swapchain created by the session with its enumerated images
#[derive(Clone, Debug, PartialEq)]
pub struct Swapchain {
    pub spec: SwapchainSpec,
    pub handle: SwapchainHandle,
    pub images: Vec<u64>,
}

/// GPU side of a session
pub trait GraphicsService {
    fn init(&mut self, ctx: &Context) -> XrResult<()>;

    /// Device handles bound to the session at creation
    fn graphics_binding(&self) -> GraphicsBinding;

    /// Receive the session's swapchains; set up per-image views and commands
    fn set_swapchains(&mut self, swapchains: &[Swapchain]) -> XrResult<()>;

    fn shutdown(&mut self) {}
}

/// Graphics service for headless sessions
#[derive(Debug, Default)]
pub struct HeadlessGraphicsService {
    swapchains: Vec<Swapchain>,
    initialized: bool,
}

impl HeadlessGraphicsService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn swapchains(&self) -> &[Swapchain] {
        &self.swapchains
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl GraphicsService for HeadlessGraphicsService {
    fn init(&mut self, ctx: &Context) -> XrResult<()> {
        if ctx.graphics().api() != GraphicsApi::Headless {
            return Err(XrError::Unsupported(
                "headless graphics service requires a headless context".into(),
            ));
        }
        self.initialized = true;
        Ok(())
    }

    fn graphics_binding(&self) -> GraphicsBinding {
        GraphicsBinding::Headless
    }

    fn set_swapchains(&mut self, swapchains: &[Swapchain]) -> XrResult<()> {
        for swapchain in swapchains {
            log::debug!(
                "swapchain '{}': {} images of {}x{}",
                swapchain.spec.name,
                swapchain.images.len(),
                swapchain.spec.width,
                swapchain.spec.height
            );
        }
        self.swapchains = swapchains.to_vec();
        Ok(())
    }

    fn shutdown(&mut self) {
        self.swapchains.clear();
        self.initialized = false;
    }
}
