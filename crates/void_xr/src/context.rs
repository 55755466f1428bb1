//! Runtime instance, system and graphics context

use crate::error::{RuntimeCheck, XrError, XrResult};
use crate::graphics::{GraphicsContext, GraphicsContextCreation, HeadlessContextCreation};
use crate::runtime::{InstanceRequest, RuntimeEvent, RuntimeLoader, SystemId, XrInstance};
use crate::{FormFactor, Version, ViewConfigurationType, ViewConfigurationView};

/// Request for a [`Context`]
pub struct ContextCreation {
    pub app_name: String,
    pub app_version: u32,
    pub engine_name: String,
    pub engine_version: u32,
    pub api_version: Version,
    pub extensions: Vec<String>,
    pub form_factor: FormFactor,
    pub graphics: Box<dyn GraphicsContextCreation>,
}

impl ContextCreation {
    pub fn new(graphics: Box<dyn GraphicsContextCreation>) -> Self {
        Self {
            app_name: "void_xr application".into(),
            app_version: 1,
            engine_name: "void_xr".into(),
            engine_version: 1,
            api_version: Version::new(1, 0, 34),
            extensions: Vec::new(),
            form_factor: FormFactor::HeadMountedDisplay,
            graphics,
        }
    }

    pub fn headless() -> Self {
        Self::new(Box::new(HeadlessContextCreation))
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

    pub fn add_extension(mut self, extension: impl Into<String>) -> Self {
        self.extensions.push(extension.into());
        self
    }

    pub fn form_factor(mut self, form_factor: FormFactor) -> Self {
        self.form_factor = form_factor;
        self
    }

    pub fn graphics(mut self, graphics: Box<dyn GraphicsContextCreation>) -> Self {
        self.graphics = graphics;
        self
    }

    pub fn validate(&self) -> XrResult<()> {
        if self.app_name.is_empty() {
            return Err(XrError::InvalidConfig("ContextCreation: app name is required".into()));
        }
        if self.api_version.is_zero() {
            return Err(XrError::InvalidConfig("ContextCreation: api version is required".into()));
        }
        Ok(())
    }

    fn request(&self) -> InstanceRequest {
        InstanceRequest {
            app_name: self.app_name.clone(),
            app_version: self.app_version,
            engine_name: self.engine_name.clone(),
            engine_version: self.engine_version,
            api_version: self.api_version,
            extensions: self.extensions.clone(),
            graphics_extension: Some(self.graphics.extension().to_string()),
        }
    }

    /// Create the runtime instance and resolve the system.
    ///
    /// `Ok(None)` means the runtime could not provide an instance or system
    /// right now and the caller should retry later. Invalid requests and
    /// graphics version mismatches are errors.
    pub fn create(&self, loader: &dyn RuntimeLoader) -> XrResult<Option<Context>> {
        self.validate()?;

        let mut instance = match loader.create_instance(&self.request()) {
            Ok(instance) => instance,
            Err(err) => {
                log::warn!("{}", err);
                return Ok(None);
            }
        };

        let system_id = match instance.system(self.form_factor) {
            Ok(system_id) => system_id,
            Err(err) => {
                log::warn!("{}", err);
                if let Err(err) = instance.destroy() {
                    log::error!("{}", err);
                }
                return Ok(None);
            }
        };

        log_capabilities(instance.as_ref(), system_id);

        let graphics = match self.graphics.create(instance.as_ref(), system_id) {
            Ok(graphics) => graphics,
            Err(err) => {
                if let Err(destroy_err) = instance.destroy() {
                    log::error!("{}", destroy_err);
                }
                return Err(err);
            }
        };

        Ok(Some(Context {
            instance: Some(instance),
            system_id,
            graphics,
        }))
    }
}

impl std::fmt::Debug for ContextCreation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextCreation")
            .field("app_name", &self.app_name)
            .field("api_version", &self.api_version)
            .field("extensions", &self.extensions)
            .field("form_factor", &self.form_factor)
            .field("graphics", &self.graphics.api())
            .finish()
    }
}

fn log_capabilities(instance: &dyn XrInstance, system_id: SystemId) {
    let (properties, system) = match (instance.properties(), instance.system_properties(system_id)) {
        (Ok(properties), Ok(system)) => (properties, system),
        (Err(err), _) | (_, Err(err)) => {
            log::warn!("could not query runtime capabilities: {}", err);
            return;
        }
    };

    let support = |supported: bool| if supported { "supported" } else { "unsupported" };

    log::info!(
        "XR instance created\n\
         Runtime: {}, version: {}\n\
         System: {}\n\
         \tMax swapchain size: {}x{}\n\
         \tMax layer count: {}\n\
         \tPosition tracking {}\n\
         \tOrientation tracking {}",
        properties.runtime_name,
        properties.runtime_version,
        system.system_name,
        system.max_swapchain_width,
        system.max_swapchain_height,
        system.max_layer_count,
        support(system.position_tracking),
        support(system.orientation_tracking),
    );
}

/// Runtime instance, system id and graphics context.
///
/// Owns the instance; destroyed once, explicitly or on drop.
pub struct Context {
    instance: Option<Box<dyn XrInstance>>,
    system_id: SystemId,
    graphics: GraphicsContext,
}

impl Context {
    pub fn instance(&self) -> XrResult<&dyn XrInstance> {
        self.instance.as_deref().ok_or(XrError::ContextDestroyed)
    }

    pub fn instance_mut(&mut self) -> XrResult<&mut (dyn XrInstance + 'static)> {
        self.instance.as_deref_mut().ok_or(XrError::ContextDestroyed)
    }

    pub fn system_id(&self) -> SystemId {
        self.system_id
    }

    pub fn graphics(&self) -> &GraphicsContext {
        &self.graphics
    }

    pub fn is_destroyed(&self) -> bool {
        self.instance.is_none()
    }

    /// Whether the system supports a view configuration
    pub fn is_supported(&self, view_configuration: ViewConfigurationType) -> XrResult<bool> {
        let configurations = self.instance()?.view_configurations(self.system_id).check()?;
        Ok(configurations.contains(&view_configuration))
    }

    /// Recommended image sizes for each view of a configuration
    pub fn views(&self, view_configuration: ViewConfigurationType) -> XrResult<Vec<ViewConfigurationView>> {
        self.instance()?
            .view_configuration_views(self.system_id, view_configuration)
            .check()
    }

    pub fn poll_event(&mut self) -> XrResult<Option<RuntimeEvent>> {
        self.instance_mut()?.poll_event().check()
    }

    /// Destroy the runtime instance. Later calls do nothing.
    pub fn destroy(&mut self) {
        let Some(mut instance) = self.instance.take() else {
            return;
        };
        log::debug!("destroying XR context ...");
        if let Err(err) = instance.destroy() {
            log::error!("{}", err);
        }
        self.system_id = SystemId::NULL;
        log::info!("XR context destroyed");
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("system_id", &self.system_id)
            .field("graphics", &self.graphics)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
