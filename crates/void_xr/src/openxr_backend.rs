//! OpenXR runtime backend
//!
//! Implements [`RuntimeLoader`], [`XrInstance`] and [`XrSession`] on the
//! `openxr` crate. Sessions bind to the headless graphics API by default and
//! to Vulkan with the `vulkan` feature. Compatible with SteamVR, Monado,
//! Oculus and WMR runtimes.
//!
//! Headless sessions (`XR_MND_headless`) cannot own swapchains; they report
//! no swapchain formats, so rendering sessions need the `vulkan` feature and
//! a Vulkan [`crate::GraphicsService`].

use std::collections::BTreeMap;
use std::time::Duration;

use glam::{Quat, Vec2, Vec3};
use openxr as xr;

use crate::action::{ActionKind, ActionState, Vibrate};
use crate::config::SwapchainSpec;
use crate::error::{RuntimeError, RuntimeResult};
use crate::frame::{FrameState, View, ViewInfo, ViewState};
use crate::graphics::{GraphicsApi, GraphicsBinding};
use crate::layer::{BlendMode, CompositionLayer, EyeVisibility, ProjectionView, SubImage};
use crate::runtime::{
    ActionHandle, ActionSetHandle, GraphicsRequirements, InstanceProperties, InstanceRequest,
    Location, RawActionState, RuntimeEvent, RuntimeLoader, SpaceHandle, SwapchainHandle, SystemId,
    SystemProperties, XrInstance, XrSession,
};
use crate::session::SessionState;
use crate::{
    FormFactor, Fov, Pose, ReferenceSpaceType, Time, Version, ViewConfigurationType,
    ViewConfigurationView,
};

#[cfg(feature = "vulkan")]
type Api = xr::Vulkan;

#[cfg(not(feature = "vulkan"))]
type Api = xr::Headless;

const ERROR_HANDLE_INVALID: i32 = -12;
const ERROR_EXTENSION_NOT_PRESENT: i32 = -9;
const ERROR_GRAPHICS_DEVICE_INVALID: i32 = -38;
const ERROR_RUNTIME_UNAVAILABLE: i32 = -51;

fn fail(call: &'static str) -> impl FnOnce(xr::sys::Result) -> RuntimeError {
    move |result| RuntimeError::new(call, result.into_raw(), result.to_string())
}

fn invalid_handle(call: &'static str) -> RuntimeError {
    RuntimeError::new(call, ERROR_HANDLE_INVALID, "XR_ERROR_HANDLE_INVALID")
}

/// Loads the system OpenXR loader
pub struct OpenXrLoader {
    entry: xr::Entry,
}

impl OpenXrLoader {
    pub fn new() -> RuntimeResult<Self> {
        #[cfg(feature = "linked")]
        let entry = xr::Entry::linked();

        #[cfg(not(feature = "linked"))]
        let entry = unsafe { xr::Entry::load() }.map_err(|e| {
            RuntimeError::new(
                "xrNegotiateLoaderRuntimeInterface",
                ERROR_RUNTIME_UNAVAILABLE,
                format!("failed to load OpenXR: {:?}", e),
            )
        })?;

        Ok(Self { entry })
    }

    fn extension_set(&self, request: &InstanceRequest) -> RuntimeResult<xr::ExtensionSet> {
        let available = self
            .entry
            .enumerate_extensions()
            .map_err(fail("xrEnumerateInstanceExtensionProperties"))?;

        let mut extensions = xr::ExtensionSet::default();
        let requested = request.extensions.iter().chain(request.graphics_extension.iter());

        for name in requested {
            let present = match name.as_str() {
                "XR_MND_headless" => {
                    extensions.mnd_headless = true;
                    available.mnd_headless
                }
                "XR_KHR_vulkan_enable2" => {
                    extensions.khr_vulkan_enable2 = true;
                    available.khr_vulkan_enable2
                }
                "XR_KHR_composition_layer_cube" => {
                    extensions.khr_composition_layer_cube = true;
                    available.khr_composition_layer_cube
                }
                "XR_KHR_composition_layer_equirect" => {
                    extensions.khr_composition_layer_equirect = true;
                    available.khr_composition_layer_equirect
                }
                "XR_EXT_debug_utils" => {
                    extensions.ext_debug_utils = true;
                    available.ext_debug_utils
                }
                other => {
                    extensions.other.push(other.to_string());
                    available.other.iter().any(|ext| ext == other)
                }
            };

            if !present {
                return Err(RuntimeError::new(
                    "xrCreateInstance",
                    ERROR_EXTENSION_NOT_PRESENT,
                    format!("extension {} not available", name),
                ));
            }
        }

        Ok(extensions)
    }
}

impl RuntimeLoader for OpenXrLoader {
    fn create_instance(&self, request: &InstanceRequest) -> RuntimeResult<Box<dyn XrInstance>> {
        let extensions = self.extension_set(request)?;
        let version = request.api_version;

        let instance = self
            .entry
            .create_instance(
                &xr::ApplicationInfo {
                    application_name: &request.app_name,
                    application_version: request.app_version,
                    engine_name: &request.engine_name,
                    engine_version: request.engine_version,
                    api_version: xr::Version::new(version.major, version.minor, version.patch),
                },
                &extensions,
                &[],
            )
            .map_err(fail("xrCreateInstance"))?;

        Ok(Box::new(OpenXrInstance {
            instance: Some(instance),
            events: xr::EventDataBuffer::new(),
        }))
    }
}

struct OpenXrInstance {
    instance: Option<xr::Instance>,
    events: xr::EventDataBuffer,
}

impl OpenXrInstance {
    fn instance(&self, call: &'static str) -> RuntimeResult<&xr::Instance> {
        self.instance.as_ref().ok_or_else(|| invalid_handle(call))
    }
}

impl XrInstance for OpenXrInstance {
    fn properties(&self) -> RuntimeResult<InstanceProperties> {
        let props = self
            .instance("xrGetInstanceProperties")?
            .properties()
            .map_err(fail("xrGetInstanceProperties"))?;

        Ok(InstanceProperties {
            runtime_name: props.runtime_name,
            runtime_version: version_from_xr(props.runtime_version),
        })
    }

    fn system(&self, form_factor: FormFactor) -> RuntimeResult<SystemId> {
        let form_factor = match form_factor {
            FormFactor::HeadMountedDisplay => xr::FormFactor::HEAD_MOUNTED_DISPLAY,
            FormFactor::HandheldDisplay => xr::FormFactor::HANDHELD_DISPLAY,
        };
        let system = self
            .instance("xrGetSystem")?
            .system(form_factor)
            .map_err(fail("xrGetSystem"))?;
        Ok(SystemId(system.into_raw()))
    }

    fn system_properties(&self, system: SystemId) -> RuntimeResult<SystemProperties> {
        let props = self
            .instance("xrGetSystemProperties")?
            .system_properties(xr::SystemId::from_raw(system.raw()))
            .map_err(fail("xrGetSystemProperties"))?;

        Ok(SystemProperties {
            system_name: props.system_name,
            vendor_id: props.vendor_id,
            max_swapchain_width: props.graphics_properties.max_swapchain_image_width,
            max_swapchain_height: props.graphics_properties.max_swapchain_image_height,
            max_layer_count: props.graphics_properties.max_layer_count,
            orientation_tracking: props.tracking_properties.orientation_tracking,
            position_tracking: props.tracking_properties.position_tracking,
        })
    }

    fn view_configurations(&self, system: SystemId) -> RuntimeResult<Vec<ViewConfigurationType>> {
        let configs = self
            .instance("xrEnumerateViewConfigurations")?
            .enumerate_view_configurations(xr::SystemId::from_raw(system.raw()))
            .map_err(fail("xrEnumerateViewConfigurations"))?;

        Ok(configs.into_iter().filter_map(view_configuration_from_xr).collect())
    }

    fn view_configuration_views(
        &self,
        system: SystemId,
        view_configuration: ViewConfigurationType,
    ) -> RuntimeResult<Vec<ViewConfigurationView>> {
        let views = self
            .instance("xrEnumerateViewConfigurationViews")?
            .enumerate_view_configuration_views(
                xr::SystemId::from_raw(system.raw()),
                view_configuration_to_xr(view_configuration),
            )
            .map_err(fail("xrEnumerateViewConfigurationViews"))?;

        Ok(views
            .into_iter()
            .map(|v| ViewConfigurationView {
                recommended_width: v.recommended_image_rect_width,
                recommended_height: v.recommended_image_rect_height,
                max_width: v.max_image_rect_width,
                max_height: v.max_image_rect_height,
            })
            .collect())
    }

    fn graphics_requirements(
        &self,
        system: SystemId,
        api: GraphicsApi,
    ) -> RuntimeResult<GraphicsRequirements> {
        match api {
            GraphicsApi::Headless => Ok(GraphicsRequirements::default()),
            GraphicsApi::Vulkan => {
                let requirements = self
                    .instance("xrGetVulkanGraphicsRequirements2KHR")?
                    .graphics_requirements::<xr::Vulkan>(xr::SystemId::from_raw(system.raw()))
                    .map_err(fail("xrGetVulkanGraphicsRequirements2KHR"))?;

                Ok(GraphicsRequirements {
                    min_api_version: version_from_xr(requirements.min_api_version_supported),
                    max_api_version: version_from_xr(requirements.max_api_version_supported),
                })
            }
        }
    }

    fn poll_event(&mut self) -> RuntimeResult<Option<RuntimeEvent>> {
        let instance = self.instance.as_ref().ok_or_else(|| invalid_handle("xrPollEvent"))?;
        let event = instance
            .poll_event(&mut self.events)
            .map_err(fail("xrPollEvent"))?;

        let Some(event) = event else {
            return Ok(None);
        };

        let event = match event {
            xr::Event::SessionStateChanged(e) => RuntimeEvent::SessionStateChanged {
                state: SessionState::from_raw(e.state().into_raw()),
                time: Time(e.time().as_nanos()),
            },
            xr::Event::InstanceLossPending(e) => RuntimeEvent::InstanceLossPending {
                loss_time: Time(e.loss_time().as_nanos()),
            },
            xr::Event::InteractionProfileChanged(_) => RuntimeEvent::InteractionProfileChanged,
            xr::Event::EventsLost(e) => {
                RuntimeEvent::Other(format!("XR_TYPE_EVENT_DATA_EVENTS_LOST ({})", e.lost_event_count()))
            }
            xr::Event::ReferenceSpaceChangePending(_) => {
                RuntimeEvent::Other("XR_TYPE_EVENT_DATA_REFERENCE_SPACE_CHANGE_PENDING".into())
            }
            _ => RuntimeEvent::Other("unrecognized OpenXR event".into()),
        };

        Ok(Some(event))
    }

    fn create_session(
        &mut self,
        system: SystemId,
        binding: &GraphicsBinding,
    ) -> RuntimeResult<Box<dyn XrSession>> {
        let instance = self.instance("xrCreateSession")?.clone();
        let system = xr::SystemId::from_raw(system.raw());
        let (session, frame_waiter, frame_stream) = open_session(&instance, system, binding)?;

        Ok(Box::new(OpenXrSession {
            instance,
            session,
            frame_waiter,
            frame_stream,
            spaces: BTreeMap::new(),
            swapchains: BTreeMap::new(),
            action_sets: BTreeMap::new(),
            actions: BTreeMap::new(),
            next_handle: 1,
        }))
    }

    fn destroy(&mut self) -> RuntimeResult<()> {
        // xrDestroyInstance runs when the last clone is dropped
        self.instance = None;
        Ok(())
    }
}

type SessionParts = (xr::Session<Api>, xr::FrameWaiter, xr::FrameStream<Api>);

#[cfg(not(feature = "vulkan"))]
fn open_session(
    instance: &xr::Instance,
    system: xr::SystemId,
    binding: &GraphicsBinding,
) -> RuntimeResult<SessionParts> {
    match binding {
        GraphicsBinding::Headless => unsafe {
            instance
                .create_session::<Api>(system, &xr::headless::SessionCreateInfo {})
                .map_err(fail("xrCreateSession"))
        },
        GraphicsBinding::Vulkan { .. } => Err(RuntimeError::new(
            "xrCreateSession",
            ERROR_GRAPHICS_DEVICE_INVALID,
            "Vulkan binding requires the vulkan feature",
        )),
    }
}

#[cfg(feature = "vulkan")]
fn open_session(
    instance: &xr::Instance,
    system: xr::SystemId,
    binding: &GraphicsBinding,
) -> RuntimeResult<SessionParts> {
    match *binding {
        GraphicsBinding::Vulkan {
            instance: vk_instance,
            physical_device,
            device,
            queue_family_index,
            queue_index,
        } => unsafe {
            instance
                .create_session::<Api>(
                    system,
                    &xr::vulkan::SessionCreateInfo {
                        instance: vk_instance as usize as _,
                        physical_device: physical_device as usize as _,
                        device: device as usize as _,
                        queue_family_index,
                        queue_index,
                    },
                )
                .map_err(fail("xrCreateSession"))
        },
        GraphicsBinding::Headless => Err(RuntimeError::new(
            "xrCreateSession",
            ERROR_GRAPHICS_DEVICE_INVALID,
            "headless binding passed to a Vulkan session",
        )),
    }
}

enum AnyAction {
    Boolean(xr::Action<bool>),
    Float(xr::Action<f32>),
    Vector2(xr::Action<xr::Vector2f>),
    Pose(xr::Action<xr::Posef>),
    Vibration(xr::Action<xr::Haptic>),
}

impl AnyAction {
    fn binding(&self, path: xr::Path) -> xr::Binding<'_> {
        match self {
            AnyAction::Boolean(a) => xr::Binding::new(a, path),
            AnyAction::Float(a) => xr::Binding::new(a, path),
            AnyAction::Vector2(a) => xr::Binding::new(a, path),
            AnyAction::Pose(a) => xr::Binding::new(a, path),
            AnyAction::Vibration(a) => xr::Binding::new(a, path),
        }
    }
}

struct OpenXrSession {
    instance: xr::Instance,
    session: xr::Session<Api>,
    frame_waiter: xr::FrameWaiter,
    frame_stream: xr::FrameStream<Api>,
    spaces: BTreeMap<SpaceHandle, xr::Space>,
    swapchains: BTreeMap<SwapchainHandle, xr::Swapchain<Api>>,
    action_sets: BTreeMap<ActionSetHandle, xr::ActionSet>,
    actions: BTreeMap<ActionHandle, AnyAction>,
    next_handle: u64,
}

impl OpenXrSession {
    fn next_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn swapchain_mut(
        &mut self,
        call: &'static str,
        handle: SwapchainHandle,
    ) -> RuntimeResult<&mut xr::Swapchain<Api>> {
        self.swapchains.get_mut(&handle).ok_or_else(|| invalid_handle(call))
    }

    fn action(&self, call: &'static str, handle: ActionHandle) -> RuntimeResult<&AnyAction> {
        self.actions.get(&handle).ok_or_else(|| invalid_handle(call))
    }
}

fn space<'a>(
    spaces: &'a BTreeMap<SpaceHandle, xr::Space>,
    call: &'static str,
    handle: SpaceHandle,
) -> RuntimeResult<&'a xr::Space> {
    spaces.get(&handle).ok_or_else(|| invalid_handle(call))
}

fn sub_image<'a>(
    swapchains: &'a BTreeMap<SwapchainHandle, xr::Swapchain<Api>>,
    image: &SubImage,
) -> RuntimeResult<xr::SwapchainSubImage<'a, Api>> {
    let swapchain = swapchains
        .get(&image.swapchain)
        .ok_or_else(|| invalid_handle("xrEndFrame"))?;

    Ok(xr::SwapchainSubImage::new()
        .swapchain(swapchain)
        .image_rect(xr::Rect2Di {
            offset: xr::Offset2Di {
                x: image.rect.x,
                y: image.rect.y,
            },
            extent: xr::Extent2Di {
                width: image.rect.width as i32,
                height: image.rect.height as i32,
            },
        })
        .image_array_index(image.array_index))
}

fn projection_view<'a>(
    swapchains: &'a BTreeMap<SwapchainHandle, xr::Swapchain<Api>>,
    view: &ProjectionView,
) -> RuntimeResult<xr::CompositionLayerProjectionView<'a, Api>> {
    Ok(xr::CompositionLayerProjectionView::new()
        .pose(pose_to_xr(&view.pose))
        .fov(fov_to_xr(&view.fov))
        .sub_image(sub_image(swapchains, &view.sub_image)?))
}

enum Layer<'a> {
    Projection(xr::CompositionLayerProjection<'a, Api>),
    Quad(xr::CompositionLayerQuad<'a, Api>),
}

#[cfg(feature = "vulkan")]
mod images {
    use super::*;

    pub(super) fn formats(session: &xr::Session<Api>) -> RuntimeResult<Vec<i64>> {
        let formats = session
            .enumerate_swapchain_formats()
            .map_err(fail("xrEnumerateSwapchainFormats"))?;
        Ok(formats.into_iter().map(|f| f as i64).collect())
    }

    pub(super) fn create(session: &xr::Session<Api>, spec: &SwapchainSpec) -> RuntimeResult<xr::Swapchain<Api>> {
        session
            .create_swapchain(&xr::SwapchainCreateInfo {
                create_flags: xr::SwapchainCreateFlags::from_raw(spec.create_flags),
                usage_flags: xr::SwapchainUsageFlags::from_raw(spec.usage.bits()),
                format: spec.format as _,
                sample_count: spec.sample_count,
                width: spec.width,
                height: spec.height,
                face_count: spec.face_count,
                array_size: spec.array_size,
                mip_count: spec.mip_count,
            })
            .map_err(fail("xrCreateSwapchain"))
    }

    pub(super) fn enumerate(swapchain: &xr::Swapchain<Api>) -> RuntimeResult<Vec<u64>> {
        let images = swapchain
            .enumerate_images()
            .map_err(fail("xrEnumerateSwapchainImages"))?;
        Ok(images.into_iter().map(|image| image as u64).collect())
    }
}

#[cfg(not(feature = "vulkan"))]
mod images {
    use super::*;

    const ERROR_SWAPCHAIN_FORMAT_UNSUPPORTED: i32 = -26;

    fn unsupported(call: &'static str) -> RuntimeError {
        RuntimeError::new(
            call,
            ERROR_SWAPCHAIN_FORMAT_UNSUPPORTED,
            "headless sessions have no swapchains",
        )
    }

    pub(super) fn formats(_session: &xr::Session<Api>) -> RuntimeResult<Vec<i64>> {
        Ok(Vec::new())
    }

    pub(super) fn create(_session: &xr::Session<Api>, _spec: &SwapchainSpec) -> RuntimeResult<xr::Swapchain<Api>> {
        Err(unsupported("xrCreateSwapchain"))
    }

    pub(super) fn enumerate(_swapchain: &xr::Swapchain<Api>) -> RuntimeResult<Vec<u64>> {
        Err(unsupported("xrEnumerateSwapchainImages"))
    }
}

impl XrSession for OpenXrSession {
    fn swapchain_formats(&self) -> RuntimeResult<Vec<i64>> {
        images::formats(&self.session)
    }

    fn create_reference_space(
        &mut self,
        space_type: ReferenceSpaceType,
        pose: Pose,
    ) -> RuntimeResult<SpaceHandle> {
        let space_type = match space_type {
            ReferenceSpaceType::View => xr::ReferenceSpaceType::VIEW,
            ReferenceSpaceType::Local => xr::ReferenceSpaceType::LOCAL,
            ReferenceSpaceType::Stage => xr::ReferenceSpaceType::STAGE,
        };
        let space = self
            .session
            .create_reference_space(space_type, pose_to_xr(&pose))
            .map_err(fail("xrCreateReferenceSpace"))?;

        let handle = SpaceHandle(self.next_handle());
        self.spaces.insert(handle, space);
        Ok(handle)
    }

    fn create_swapchain(&mut self, spec: &SwapchainSpec) -> RuntimeResult<SwapchainHandle> {
        let swapchain = images::create(&self.session, spec)?;
        let handle = SwapchainHandle(self.next_handle());
        self.swapchains.insert(handle, swapchain);
        Ok(handle)
    }

    fn swapchain_images(&self, swapchain: SwapchainHandle) -> RuntimeResult<Vec<u64>> {
        let swapchain = self
            .swapchains
            .get(&swapchain)
            .ok_or_else(|| invalid_handle("xrEnumerateSwapchainImages"))?;
        images::enumerate(swapchain)
    }

    fn create_action_set(
        &mut self,
        name: &str,
        description: &str,
        priority: u32,
    ) -> RuntimeResult<ActionSetHandle> {
        let localized = if description.is_empty() { name } else { description };
        let set = self
            .instance
            .create_action_set(name, localized, priority)
            .map_err(fail("xrCreateActionSet"))?;

        let handle = ActionSetHandle(self.next_handle());
        self.action_sets.insert(handle, set);
        Ok(handle)
    }

    fn create_action(
        &mut self,
        set: ActionSetHandle,
        name: &str,
        description: &str,
        kind: ActionKind,
    ) -> RuntimeResult<ActionHandle> {
        const CALL: &str = "xrCreateAction";
        let set = self.action_sets.get(&set).ok_or_else(|| invalid_handle(CALL))?;
        let localized = if description.is_empty() { name } else { description };

        let action = match kind {
            ActionKind::Boolean => AnyAction::Boolean(set.create_action(name, localized, &[]).map_err(fail(CALL))?),
            ActionKind::Float => AnyAction::Float(set.create_action(name, localized, &[]).map_err(fail(CALL))?),
            ActionKind::Vector2 => AnyAction::Vector2(set.create_action(name, localized, &[]).map_err(fail(CALL))?),
            ActionKind::Pose => AnyAction::Pose(set.create_action(name, localized, &[]).map_err(fail(CALL))?),
            ActionKind::Vibration => {
                AnyAction::Vibration(set.create_action(name, localized, &[]).map_err(fail(CALL))?)
            }
        };

        let handle = ActionHandle(self.next_handle());
        self.actions.insert(handle, action);
        Ok(handle)
    }

    fn create_action_space(&mut self, action: ActionHandle) -> RuntimeResult<SpaceHandle> {
        const CALL: &str = "xrCreateActionSpace";
        let AnyAction::Pose(action) = self.action(CALL, action)? else {
            return Err(invalid_handle(CALL));
        };
        let space = action
            .create_space(self.session.clone(), xr::Path::NULL, xr::Posef::IDENTITY)
            .map_err(fail(CALL))?;

        let handle = SpaceHandle(self.next_handle());
        self.spaces.insert(handle, space);
        Ok(handle)
    }

    fn suggest_bindings(
        &mut self,
        profile: &str,
        bindings: &[(ActionHandle, String)],
    ) -> RuntimeResult<()> {
        const CALL: &str = "xrSuggestInteractionProfileBindings";
        let profile = self.instance.string_to_path(profile).map_err(fail("xrStringToPath"))?;

        let mut suggested = Vec::with_capacity(bindings.len());
        for (action, path) in bindings {
            let path = self.instance.string_to_path(path).map_err(fail("xrStringToPath"))?;
            suggested.push(self.action(CALL, *action)?.binding(path));
        }

        self.instance
            .suggest_interaction_profile_bindings(profile, &suggested)
            .map_err(fail(CALL))
    }

    fn attach_action_sets(&mut self, sets: &[ActionSetHandle]) -> RuntimeResult<()> {
        const CALL: &str = "xrAttachSessionActionSets";
        let sets = sets
            .iter()
            .map(|handle| self.action_sets.get(handle).ok_or_else(|| invalid_handle(CALL)))
            .collect::<RuntimeResult<Vec<_>>>()?;

        self.session.attach_action_sets(&sets).map_err(fail(CALL))
    }

    fn begin(&mut self, view_configuration: ViewConfigurationType) -> RuntimeResult<()> {
        self.session
            .begin(view_configuration_to_xr(view_configuration))
            .map(|_| ())
            .map_err(fail("xrBeginSession"))
    }

    fn end(&mut self) -> RuntimeResult<()> {
        self.session.end().map(|_| ()).map_err(fail("xrEndSession"))
    }

    fn wait_frame(&mut self) -> RuntimeResult<FrameState> {
        let state = self.frame_waiter.wait().map_err(fail("xrWaitFrame"))?;

        Ok(FrameState {
            predicted_display_time: Time(state.predicted_display_time.as_nanos()),
            predicted_display_period: Duration::from_nanos(
                state.predicted_display_period.as_nanos().max(0) as u64,
            ),
            should_render: state.should_render,
        })
    }

    fn begin_frame(&mut self) -> RuntimeResult<()> {
        self.frame_stream.begin().map(|_| ()).map_err(fail("xrBeginFrame"))
    }

    fn end_frame(
        &mut self,
        display_time: Time,
        blend_mode: BlendMode,
        layers: &[CompositionLayer],
    ) -> RuntimeResult<()> {
        const CALL: &str = "xrEndFrame";
        let spaces = &self.spaces;
        let swapchains = &self.swapchains;

        let mut projection_views = Vec::new();
        for layer in layers {
            if let CompositionLayer::Projection { views, .. } = layer {
                let views = views
                    .iter()
                    .map(|view| projection_view(swapchains, view))
                    .collect::<RuntimeResult<Vec<_>>>()?;
                projection_views.push(views);
            }
        }

        let mut built = Vec::with_capacity(layers.len());
        let mut projections = projection_views.iter();
        for layer in layers {
            match layer {
                CompositionLayer::Projection { space: handle, .. } => {
                    let views = projections.next().ok_or_else(|| invalid_handle(CALL))?;
                    built.push(Layer::Projection(
                        xr::CompositionLayerProjection::new()
                            .space(space(spaces, CALL, *handle)?)
                            .views(views),
                    ));
                }
                CompositionLayer::Quad {
                    space: handle,
                    eye_visibility,
                    sub_image: image,
                    pose,
                    size,
                } => {
                    built.push(Layer::Quad(
                        xr::CompositionLayerQuad::new()
                            .space(space(spaces, CALL, *handle)?)
                            .eye_visibility(eye_visibility_to_xr(*eye_visibility))
                            .sub_image(sub_image(swapchains, image)?)
                            .pose(pose_to_xr(pose))
                            .size(xr::Extent2Df {
                                width: size.x,
                                height: size.y,
                            }),
                    ));
                }
                CompositionLayer::Cube { .. } | CompositionLayer::Equirect { .. } => {
                    log::warn!("{} layers are not submitted by the OpenXR backend", layer.kind());
                }
            }
        }

        let refs: Vec<&xr::CompositionLayerBase<'_, Api>> = built
            .iter()
            .map(|layer| match layer {
                Layer::Projection(l) => &**l,
                Layer::Quad(l) => &**l,
            })
            .collect();

        self.frame_stream
            .end(
                xr::Time::from_nanos(display_time.as_nanos()),
                blend_mode_to_xr(blend_mode),
                &refs,
            )
            .map_err(fail(CALL))
    }

    fn acquire_image(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<u32> {
        const CALL: &str = "xrAcquireSwapchainImage";
        self.swapchain_mut(CALL, swapchain)?.acquire_image().map_err(fail(CALL))
    }

    fn wait_image(&mut self, swapchain: SwapchainHandle, timeout: Option<Duration>) -> RuntimeResult<()> {
        const CALL: &str = "xrWaitSwapchainImage";
        let timeout = match timeout {
            Some(timeout) => xr::Duration::from_nanos(timeout.as_nanos().min(i64::MAX as u128) as i64),
            None => xr::Duration::INFINITE,
        };
        self.swapchain_mut(CALL, swapchain)?
            .wait_image(timeout)
            .map(|_| ())
            .map_err(fail(CALL))
    }

    fn release_image(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<()> {
        const CALL: &str = "xrReleaseSwapchainImage";
        self.swapchain_mut(CALL, swapchain)?.release_image().map_err(fail(CALL))
    }

    fn locate_views(
        &self,
        view_configuration: ViewConfigurationType,
        time: Time,
        handle: SpaceHandle,
    ) -> RuntimeResult<ViewInfo> {
        const CALL: &str = "xrLocateViews";
        let (flags, views) = self
            .session
            .locate_views(
                view_configuration_to_xr(view_configuration),
                xr::Time::from_nanos(time.as_nanos()),
                space(&self.spaces, CALL, handle)?,
            )
            .map_err(fail(CALL))?;

        Ok(ViewInfo {
            state: ViewState {
                orientation_valid: flags.contains(xr::ViewStateFlags::ORIENTATION_VALID),
                position_valid: flags.contains(xr::ViewStateFlags::POSITION_VALID),
                orientation_tracked: flags.contains(xr::ViewStateFlags::ORIENTATION_TRACKED),
                position_tracked: flags.contains(xr::ViewStateFlags::POSITION_TRACKED),
            },
            views: views
                .iter()
                .map(|view| View {
                    pose: convert_pose(&view.pose),
                    fov: convert_fov(&view.fov),
                })
                .collect(),
        })
    }

    fn locate_space(&self, handle: SpaceHandle, base: SpaceHandle, time: Time) -> RuntimeResult<Location> {
        const CALL: &str = "xrLocateSpace";
        let location = space(&self.spaces, CALL, handle)?
            .locate(space(&self.spaces, CALL, base)?, xr::Time::from_nanos(time.as_nanos()))
            .map_err(fail(CALL))?;

        Ok(Location {
            pose: convert_pose(&location.pose),
            position_valid: location
                .location_flags
                .contains(xr::SpaceLocationFlags::POSITION_VALID),
            orientation_valid: location
                .location_flags
                .contains(xr::SpaceLocationFlags::ORIENTATION_VALID),
        })
    }

    fn sync_actions(&mut self, sets: &[ActionSetHandle]) -> RuntimeResult<()> {
        const CALL: &str = "xrSyncActions";
        let active = sets
            .iter()
            .map(|handle| {
                self.action_sets
                    .get(handle)
                    .map(xr::ActiveActionSet::new)
                    .ok_or_else(|| invalid_handle(CALL))
            })
            .collect::<RuntimeResult<Vec<_>>>()?;

        self.session.sync_actions(&active).map_err(fail(CALL))
    }

    fn action_state(&self, handle: ActionHandle, kind: ActionKind) -> RuntimeResult<RawActionState> {
        const CALL: &str = "xrGetActionState";
        let session = &self.session;

        let state = match self.action(CALL, handle)? {
            AnyAction::Boolean(a) => {
                let s = a.state(session, xr::Path::NULL).map_err(fail("xrGetActionStateBoolean"))?;
                RawActionState {
                    is_active: s.is_active,
                    changed: s.changed_since_last_sync,
                    value: ActionState::Bool(s.current_state),
                }
            }
            AnyAction::Float(a) => {
                let s = a.state(session, xr::Path::NULL).map_err(fail("xrGetActionStateFloat"))?;
                RawActionState {
                    is_active: s.is_active,
                    changed: s.changed_since_last_sync,
                    value: ActionState::Float(s.current_state),
                }
            }
            AnyAction::Vector2(a) => {
                let s = a.state(session, xr::Path::NULL).map_err(fail("xrGetActionStateVector2f"))?;
                RawActionState {
                    is_active: s.is_active,
                    changed: s.changed_since_last_sync,
                    value: ActionState::Vector2(Vec2::new(s.current_state.x, s.current_state.y)),
                }
            }
            AnyAction::Pose(a) => RawActionState {
                is_active: a.is_active(session, xr::Path::NULL).map_err(fail("xrGetActionStatePose"))?,
                changed: false,
                value: ActionState::Pose(Pose::IDENTITY),
            },
            AnyAction::Vibration(_) => RawActionState {
                is_active: false,
                changed: false,
                value: ActionState::Vibration,
            },
        };

        if state.value.kind() != kind {
            return Err(invalid_handle(CALL));
        }
        Ok(state)
    }

    fn apply_haptic(&mut self, handle: ActionHandle, vibrate: &Vibrate) -> RuntimeResult<()> {
        const CALL: &str = "xrApplyHapticFeedback";
        let AnyAction::Vibration(action) = self.action(CALL, handle)? else {
            return Err(invalid_handle(CALL));
        };

        let duration = match vibrate.duration {
            Some(duration) => xr::Duration::from_nanos(duration.as_nanos().min(i64::MAX as u128) as i64),
            None => xr::Duration::MIN_HAPTIC,
        };
        // 0 Hz leaves the frequency to the runtime
        let frequency = vibrate.frequency.unwrap_or(0.0);

        let event = xr::HapticVibration::new()
            .amplitude(vibrate.amplitude.clamp(0.0, 1.0))
            .duration(duration)
            .frequency(frequency);

        action
            .apply_feedback(&self.session, xr::Path::NULL, &event)
            .map_err(fail(CALL))
    }

    fn destroy(&mut self) -> RuntimeResult<()> {
        // Child handles go first; the session itself is destroyed with its last clone
        self.actions.clear();
        self.action_sets.clear();
        self.swapchains.clear();
        self.spaces.clear();
        Ok(())
    }
}

fn version_from_xr(version: xr::Version) -> Version {
    Version::new(version.major(), version.minor(), version.patch())
}

fn view_configuration_to_xr(config: ViewConfigurationType) -> xr::ViewConfigurationType {
    match config {
        ViewConfigurationType::PrimaryMono => xr::ViewConfigurationType::PRIMARY_MONO,
        ViewConfigurationType::PrimaryStereo => xr::ViewConfigurationType::PRIMARY_STEREO,
    }
}

fn view_configuration_from_xr(config: xr::ViewConfigurationType) -> Option<ViewConfigurationType> {
    match config {
        xr::ViewConfigurationType::PRIMARY_MONO => Some(ViewConfigurationType::PrimaryMono),
        xr::ViewConfigurationType::PRIMARY_STEREO => Some(ViewConfigurationType::PrimaryStereo),
        _ => None,
    }
}

fn blend_mode_to_xr(mode: BlendMode) -> xr::EnvironmentBlendMode {
    match mode {
        BlendMode::Opaque => xr::EnvironmentBlendMode::OPAQUE,
        BlendMode::Additive => xr::EnvironmentBlendMode::ADDITIVE,
        BlendMode::AlphaBlend => xr::EnvironmentBlendMode::ALPHA_BLEND,
    }
}

fn eye_visibility_to_xr(visibility: EyeVisibility) -> xr::EyeVisibility {
    match visibility {
        EyeVisibility::Both => xr::EyeVisibility::BOTH,
        EyeVisibility::Left => xr::EyeVisibility::LEFT,
        EyeVisibility::Right => xr::EyeVisibility::RIGHT,
    }
}

fn convert_quaternion(q: &xr::Quaternionf) -> Quat {
    Quat::from_xyzw(q.x, q.y, q.z, q.w)
}

fn convert_vector(v: &xr::Vector3f) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn convert_pose(p: &xr::Posef) -> Pose {
    Pose {
        position: convert_vector(&p.position),
        orientation: convert_quaternion(&p.orientation),
    }
}

fn convert_fov(fov: &xr::Fovf) -> Fov {
    Fov {
        angle_left: fov.angle_left,
        angle_right: fov.angle_right,
        angle_up: fov.angle_up,
        angle_down: fov.angle_down,
    }
}

fn pose_to_xr(pose: &Pose) -> xr::Posef {
    xr::Posef {
        orientation: xr::Quaternionf {
            x: pose.orientation.x,
            y: pose.orientation.y,
            z: pose.orientation.z,
            w: pose.orientation.w,
        },
        position: xr::Vector3f {
            x: pose.position.x,
            y: pose.position.y,
            z: pose.position.z,
        },
    }
}

fn fov_to_xr(fov: &Fov) -> xr::Fovf {
    xr::Fovf {
        angle_left: fov.angle_left,
        angle_right: fov.angle_right,
        angle_up: fov.angle_up,
        angle_down: fov.angle_down,
    }
}
