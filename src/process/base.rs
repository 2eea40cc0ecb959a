//! State and steps shared by every render mode

use crate::backend::FrameBufferHandle;
use crate::events::{Event, EventManager};
use crate::scene::Camera;

use super::{FrameContext, RenderResult, RenderingContext, Viewport};

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Rendering context, default viewport and result buffer of a mode
#[derive(Debug, Clone)]
pub struct ModeBase {
    pub rc: RenderingContext,
    pub viewport: Viewport,
    result_buffer: Option<FrameBufferHandle>,
}

impl Default for ModeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeBase {
    pub fn new() -> Self {
        Self {
            rc: RenderingContext::new(),
            viewport: Viewport::extend(),
            result_buffer: None,
        }
    }

    pub fn result_buffer(&self) -> Option<FrameBufferHandle> {
        self.result_buffer
    }

    pub fn set_result_buffer(&mut self, result: Option<FrameBufferHandle>) {
        self.result_buffer = result;
    }

    /// Start a pass into `fb` (`None` for the screen) at `width` x `height`.
    ///
    /// Returns whether post-processing captured the pass. If it did not, `fb` itself is bound
    /// and cleared so the scene lands there directly.
    pub fn post_process_capture(
        &mut self,
        ctx: &mut FrameContext<'_>,
        fb: Option<FrameBufferHandle>,
        width: u32,
        height: u32,
    ) -> RenderResult<bool> {
        let captured = ctx.post_process.capture(ctx.backend, width, height)?;
        if !captured {
            ctx.backend.bind_frame_buffer(fb);
            ctx.backend.clear(CLEAR_COLOR)?;
        }
        self.rc.frame_buffer = fb;
        self.rc.post_process_active = captured;
        self.rc.set_size(width, height);
        Ok(captured)
    }

    /// Finish a pass: run post-processing into `fb`, draw the camera overlay outside of HMD
    /// rendering, and record the result buffer
    pub fn post_process_render(
        &mut self,
        ctx: &mut FrameContext<'_>,
        fb: Option<FrameBufferHandle>,
        captured: bool,
        camera: &Camera,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        if captured {
            ctx.post_process.render(ctx.backend, fb)?;
        }

        let overlay = if ctx.settings.runtime.hmd_active() {
            Ok(())
        } else {
            if captured {
                ctx.backend.bind_frame_buffer(fb);
            }
            ctx.scene
                .render_camera_overlay(ctx.backend, camera, width, height)
        };
        ctx.backend.bind_frame_buffer(None);

        self.result_buffer = match fb {
            Some(fb) => Some(fb),
            None if captured => ctx.post_process.combined_buffer(),
            None => None,
        };
        self.rc.post_process_active = false;
        overlay
    }

    /// Tell camera-orientation listeners about the pass, unless the size is degenerate
    pub fn send_orientation_update(events: &EventManager, camera: &Camera, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        events.publish(Event::CameraOrientationUpdate {
            direction: camera.direction,
            up: camera.up,
            width,
            height,
        });
    }

    /// Render the scene with this mode's context
    pub fn render_scene(
        &self,
        ctx: &mut FrameContext<'_>,
        camera: &Camera,
        t: f64,
    ) -> RenderResult<()> {
        ctx.scene.render_scene(ctx.backend, camera, t, &self.rc)
    }
}
