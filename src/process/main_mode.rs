//! Default single-view mode

use crate::backend::{FrameBufferHandle, GraphicsBackend, ViewportRect};
use crate::scene::Camera;
use crate::settings::Settings;

use super::{FrameContext, ModeBase, RenderMode, RenderResult, RenderSize};

/// Renders the scene once through post-processing
#[derive(Debug, Default)]
pub struct MainMode {
    base: ModeBase,
}

impl MainMode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base(&self) -> &ModeBase {
        &self.base
    }
}

impl RenderMode for MainMode {
    fn render(
        &mut self,
        ctx: &mut FrameContext<'_>,
        camera: &mut Camera,
        t: f64,
        size: RenderSize,
        fb: Option<FrameBufferHandle>,
    ) -> RenderResult<()> {
        let RenderSize {
            render_width: rw,
            render_height: rh,
            target_width: tw,
            target_height: th,
        } = size;

        let degenerate = rw == 0 || rh == 0;
        let (cw, ch) = if degenerate { (0, 0) } else { (tw, th) };
        let captured = self.base.post_process_capture(ctx, fb, cw, ch)?;

        self.base.viewport.set_world_size(rw as f32, rh as f32);
        self.base.viewport.set_screen_bounds(ViewportRect::full(rw, rh));
        self.base.viewport.apply(ctx.backend, camera);

        let scene = self.base.render_scene(ctx, camera, t);

        let post = if !degenerate {
            ModeBase::send_orientation_update(ctx.events, camera, rw, rh);
            self.base
                .post_process_render(ctx, fb, captured, camera, rw, rh)
        } else {
            ctx.backend.bind_frame_buffer(None);
            Ok(())
        };

        scene.and(post)
    }

    fn resize(
        &mut self,
        _backend: &mut dyn GraphicsBackend,
        _settings: &Settings,
        _size: RenderSize,
    ) -> RenderResult<()> {
        Ok(())
    }

    fn dispose(&mut self, _backend: &mut dyn GraphicsBackend) {}

    fn result_buffer(&self) -> Option<FrameBufferHandle> {
        self.base.result_buffer()
    }
}
