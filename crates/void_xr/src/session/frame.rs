//! Frame protocol

use crate::error::{RuntimeCheck, XrError, XrResult};
use crate::frame::{FrameInfo, FrameState, FrameTiming, ImageId, SpaceLocation};
use crate::layer::FrameEnd;
use crate::ViewConfigurationType;

use super::{live, SessionService, SessionState};

impl SessionService<'_> {
    /// Run one frame for the current state.
    ///
    /// Non-running states only yield the thread. Running states wait for the
    /// frame, then always pair `begin_frame` with exactly one `end_frame`.
    pub fn process_frame(&mut self) -> XrResult<()> {
        if self.termination_requested {
            return self.finish();
        }

        if !self.state.is_running() {
            std::thread::sleep(self.idle_sleep);
            return Ok(());
        }

        self.run_frame()
    }

    fn finish(&mut self) -> XrResult<()> {
        if self.state == SessionState::Exiting && self.session.is_none() {
            return Ok(());
        }

        if self.state.is_running() {
            if let Some(session) = self.session.as_deref_mut() {
                session.end().check()?;
            }
        }
        self.destroy_session()?;
        self.adopt(SessionState::Exiting)
    }

    fn run_frame(&mut self) -> XrResult<()> {
        let frame_state = live(&mut self.session)?.wait_frame().check()?;
        self.frame_timing = FrameTiming::from(&frame_state);
        let display_time = frame_state.predicted_display_time;

        if let Err(err) = live(&mut self.session)?.begin_frame() {
            log::warn!("{}", err);
            let empty = FrameEnd::default();
            return live(&mut self.session)?
                .end_frame(display_time, empty.blend_mode, &empty.layers)
                .check();
        }

        let content = self.frame_content(&frame_state);
        let (frame, content_error) = match content {
            Ok(frame) => (frame, None),
            Err(err) => (FrameEnd::default(), Some(err)),
        };

        live(&mut self.session)?
            .end_frame(display_time, frame.blend_mode, &frame.layers)
            .check()?;

        match content_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn frame_content(&mut self, frame_state: &FrameState) -> XrResult<FrameEnd> {
        if self.state == SessionState::Focused {
            self.sync_actions()?;
        }

        if !frame_state.should_render {
            return Ok(FrameEnd::default());
        }

        let swapchain = self
            .swapchains
            .first()
            .ok_or_else(|| XrError::InvalidConfig("no swapchain to render into".into()))?;
        let handle = swapchain.handle;
        let name = swapchain.spec.name.clone();
        let aspect_ratio = swapchain.spec.aspect_ratio();

        let image_index = live(&mut self.session)?.acquire_image(handle).check()?;
        let image = ImageId {
            swapchain: name,
            handle,
            image_index,
        };

        let rendered = self.render_image(image, aspect_ratio, frame_state);
        let released = live(&mut self.session)?.release_image(handle).check();

        let frame = rendered?;
        released?;
        Ok(frame)
    }

    fn render_image(&mut self, image: ImageId, aspect_ratio: f32, frame_state: &FrameState) -> XrResult<FrameEnd> {
        let tracking_space = self.tracking_space;
        let time = frame_state.predicted_display_time;
        let session = live(&mut self.session)?;

        session.wait_image(image.handle, None).check()?;

        let views = session
            .locate_views(ViewConfigurationType::PrimaryStereo, time, tracking_space)
            .check()?;

        let mut locations = Vec::with_capacity(self.spaces.len());
        for (name, space) in &self.spaces {
            let location = session.locate_space(*space, tracking_space, time).check()?;
            locations.push(SpaceLocation {
                name: name.clone(),
                pose: location.pose,
                position_valid: location.position_valid,
                orientation_valid: location.orientation_valid,
            });
        }
        if !locations.is_empty() {
            self.renderer.set_space_locations(&locations);
        }

        let info = FrameInfo {
            image,
            views,
            space: tracking_space,
            predicted_display_time: time,
            predicted_display_period: frame_state.predicted_display_period,
            aspect_ratio,
        };

        let frame = match self.state {
            SessionState::Visible => {
                self.renderer.begin_frame();
                let frame = self.renderer.paused(&info, &mut *self.graphics);
                self.renderer.end_frame();
                frame
            }
            SessionState::Focused => {
                self.renderer.begin_frame();
                let frame = self.renderer.render(&info, &mut *self.graphics);
                self.renderer.end_frame();
                frame
            }
            _ => FrameEnd::default(),
        };

        Ok(frame)
    }
}
