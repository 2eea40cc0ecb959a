//! Field-of-view mode for the astrometric apertures

use crate::backend::{FrameBufferHandle, GraphicsBackend};
use crate::scene::Camera;
use crate::settings::Settings;

use super::{FrameContext, ModeBase, RenderMode, RenderResult, RenderSize};

/// Renders one or both apertures of a field-of-view camera into the same target
#[derive(Debug, Default)]
pub struct FovMode {
    base: ModeBase,
}

impl FovMode {
    pub fn new() -> Self {
        Self::default()
    }

    fn render_apertures(
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

        let apertures: &[usize] = match camera.mode.fov_mode() {
            1 => &[0],
            2 => &[1],
            3 => &[0, 1],
            _ => return Ok(()),
        };

        let captured = self.base.post_process_capture(ctx, fb, tw, th)?;

        self.base.viewport.set_world_size(rw as f32, rh as f32);
        let (rw_f, rh_f) = (rw as f32, rh as f32);
        let screen_width = if tw > 0 { rw_f * rw_f / tw as f32 } else { 0.0 };
        let screen_height = if th > 0 { rh_f * rh_f / th as f32 } else { 0.0 };
        self.base.viewport.set_screen_size(screen_width, screen_height);
        self.base.viewport.apply(ctx.backend, camera);

        let mut scene = Ok(());
        for &index in apertures {
            camera.dir_index = index;
            scene = self.base.render_scene(ctx, camera, t);
            if scene.is_err() {
                break;
            }
        }

        ModeBase::send_orientation_update(ctx.events, camera, rw, rh);
        let post = self
            .base
            .post_process_render(ctx, fb, captured, camera, rw, rh);
        scene.and(post)
    }
}

impl RenderMode for FovMode {
    fn render(
        &mut self,
        ctx: &mut FrameContext<'_>,
        camera: &mut Camera,
        t: f64,
        size: RenderSize,
        fb: Option<FrameBufferHandle>,
    ) -> RenderResult<()> {
        let dir_index = camera.dir_index;
        let result = self.render_apertures(ctx, camera, t, size, fb);
        camera.dir_index = dir_index;
        result
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendOp;
    use crate::process::testing::Harness;
    use crate::scene::CameraMode;
    use rstest::rstest;

    #[rstest]
    #[case(CameraMode::Fov1, vec![0])]
    #[case(CameraMode::Fov2, vec![1])]
    #[case(CameraMode::FovBoth, vec![0, 1])]
    fn test_apertures_rendered(#[case] mode: CameraMode, #[case] expected: Vec<usize>) {
        let mut h = Harness::new(800, 600);
        let mut camera = Camera::default();
        camera.mode = mode;
        camera.dir_index = 7;
        let mut fov = FovMode::new();

        fov.render(&mut h.ctx(), &mut camera, 0.0, RenderSize::uniform(800, 600), None)
            .unwrap();

        let indices: Vec<usize> = h.scene.passes.iter().map(|p| p.dir_index).collect();
        assert_eq!(indices, expected);
        assert_eq!(camera.dir_index, 7);
    }

    #[test]
    fn test_both_apertures_share_one_capture() {
        let mut h = Harness::new(800, 600);
        let mut camera = Camera::default();
        camera.mode = CameraMode::FovBoth;
        let mut fov = FovMode::new();

        fov.render(&mut h.ctx(), &mut camera, 0.0, RenderSize::uniform(800, 600), None)
            .unwrap();

        let clears = h
            .backend
            .ops()
            .iter()
            .filter(|op| matches!(op, BackendOp::Clear(_)))
            .count();
        assert_eq!(clears, 1);
    }

    #[test]
    fn test_screen_size_scaled_by_render_ratio() {
        let mut h = Harness::new(1600, 1200);
        let mut camera = Camera::default();
        camera.mode = CameraMode::Fov1;
        let mut fov = FovMode::new();

        fov.render(
            &mut h.ctx(),
            &mut camera,
            0.0,
            RenderSize::new(800, 600, 1600, 1200),
            None,
        )
        .unwrap();

        let viewport = h.backend.ops().iter().find_map(|op| match op {
            BackendOp::SetViewport(rect) => Some(*rect),
            _ => None,
        });
        let viewport = viewport.unwrap();
        assert_eq!((viewport.width, viewport.height), (400.0, 300.0));
    }
}
