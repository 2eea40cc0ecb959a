//! Stereoscopic modes: anaglyph, side-by-side and stacked pairs

use crate::backend::{FrameBufferHandle, GraphicsBackend, ViewportRect};
use crate::events::{Event, EventManager};
use crate::postprocess::AnaglyphEffect;
use crate::scene::{with_camera_restored, Camera, KM_TO_U, M_TO_U};
use crate::settings::{Settings, StereoProfile};

use super::vr::Eye;
use super::{
    FrameBufferCache, FrameBufferKey, FrameContext, ModeBase, RenderMode, RenderResult,
    RenderSize, Viewport,
};

/// Angle between the eye axis and the line to the convergence point, degrees
pub const EYE_ANGLE_DEG: f64 = 1.5;
/// Upper bound of the eye separation, internal units
pub const MAX_EYE_SEPARATION: f64 = 1.0e8 * KM_TO_U;
/// Eye separation inside a spacecraft, internal units
pub const SPACECRAFT_EYE_SEPARATION: f64 = 0.5 * M_TO_U;

const RESULT_SLOT: u8 = 0;
const LEFT_EYE_SLOT: u8 = 1;
const RIGHT_EYE_SLOT: u8 = 2;
const HALF_SLOT: u8 = 3;

/// Lateral distance between the two eye cameras.
///
/// Scales with the distance to the focus (focus mode) or the closest body, so that the
/// object of interest always sits at the same parallax angle.
pub fn compute_eye_separation(camera: &Camera, settings: &Settings) -> f64 {
    if camera.mode.is_spacecraft() {
        return SPACECRAFT_EYE_SEPARATION;
    }
    let body = if camera.mode.is_focus() {
        camera.focus
    } else {
        camera.closest_body
    };
    let separation = match body {
        Some(body) => EYE_ANGLE_DEG.to_radians().tan() * body.surface_distance(),
        None => settings.stereo().ipd * M_TO_U,
    };
    separation.min(MAX_EYE_SEPARATION)
}

/// Shift the camera sideways for one eye and turn it towards the convergence point
fn move_camera(camera: &mut Camera, separation: f64, eye: Eye) {
    let side = camera.right() * separation;
    let (offset, toe_in) = match eye {
        Eye::Left => (-side, -EYE_ANGLE_DEG),
        Eye::Right => (side, EYE_ANGLE_DEG),
    };
    camera.pos += offset;
    let rotation = glam::DQuat::from_axis_angle(camera.up.normalize(), toe_in.to_radians());
    camera.direction = rotation * camera.direction;
}

/// Renders the scene once per eye and combines both images
pub struct StereoscopicMode {
    base: ModeBase,
    stretch_viewport: Viewport,
    cache: FrameBufferCache,
    anaglyph: AnaglyphEffect,
}

impl StereoscopicMode {
    pub fn new(settings: &Settings) -> Self {
        let mut anaglyph = AnaglyphEffect::new();
        anaglyph.set_anaglyph_mode(settings.stereo().profile.anaglyph_mode());
        Self {
            base: ModeBase::new(),
            stretch_viewport: Viewport::stretch(),
            cache: FrameBufferCache::new("Stereo"),
            anaglyph,
        }
    }

    pub fn cache(&self) -> &FrameBufferCache {
        &self.cache
    }

    fn render_anaglyph(
        &mut self,
        ctx: &mut FrameContext<'_>,
        camera: &mut Camera,
        t: f64,
        size: RenderSize,
        fb: Option<FrameBufferHandle>,
        separation: Option<f64>,
    ) -> RenderResult<FrameBufferHandle> {
        let RenderSize {
            render_width: rw,
            render_height: rh,
            target_width: tw,
            target_height: th,
        } = size;

        self.base.viewport.set_world_size(rw as f32, rh as f32);
        self.base.viewport.set_screen_bounds(ViewportRect::full(rw, rh));

        let mut eyes = Vec::with_capacity(2);
        for (eye, slot) in [(Eye::Left, LEFT_EYE_SLOT), (Eye::Right, RIGHT_EYE_SLOT)] {
            let eye_fb = self
                .cache
                .get(ctx.backend, FrameBufferKey::new(rw, rh, slot))?;
            let base = &mut self.base;
            with_camera_restored(camera, |camera| -> RenderResult<()> {
                if let Some(separation) = separation {
                    move_camera(camera, separation, eye);
                }
                base.viewport.apply(ctx.backend, camera);
                ctx.scene.render_glow_pass(ctx.backend, camera)?;

                let captured = base.post_process_capture(ctx, Some(eye_fb), tw, th)?;
                let scene = base.render_scene(ctx, camera, t);
                ModeBase::send_orientation_update(ctx.events, camera, rw, rh);
                let post = base.post_process_render(ctx, Some(eye_fb), captured, camera, rw, rh);
                scene.and(post)
            })?;
            eyes.push(eye_fb);
        }

        let result = match fb {
            Some(fb) => fb,
            None => self
                .cache
                .get(ctx.backend, FrameBufferKey::new(rw, rh, RESULT_SLOT))?,
        };
        self.anaglyph
            .set_anaglyph_mode(ctx.settings.stereo().profile.anaglyph_mode());
        self.anaglyph
            .render(ctx.backend, eyes[0], eyes[1], Some(result))?;
        ctx.backend.reset_texture_unit();
        Ok(result)
    }

    fn render_side_by_side(
        &mut self,
        ctx: &mut FrameContext<'_>,
        camera: &mut Camera,
        t: f64,
        size: RenderSize,
        fb: Option<FrameBufferHandle>,
        separation: Option<f64>,
    ) -> RenderResult<FrameBufferHandle> {
        let (rw, rh) = (size.render_width, size.render_height);
        let profile = ctx.settings.stereo().profile;
        let stretch = profile.is_3d_tv();

        let (half_w, half_h) = half_size(profile, rw, rh);
        let (world_w, world_h) = match (stretch, profile.is_horizontal()) {
            (false, _) => (half_w, half_h),
            (true, true) => (rw, half_h),
            (true, false) => (half_w, rh),
        };
        let [left_bounds, right_bounds] = eye_bounds(profile, rw, rh, ctx.settings);

        let half_fb = self
            .cache
            .get(ctx.backend, FrameBufferKey::new(half_w, half_h, HALF_SLOT))?;
        let result = match fb {
            Some(fb) => fb,
            None => self
                .cache
                .get(ctx.backend, FrameBufferKey::new(rw, rh, RESULT_SLOT))?,
        };

        let base = &mut self.base;
        let viewport = if stretch {
            &mut self.stretch_viewport
        } else {
            &mut base.viewport
        };
        viewport.set_world_size(world_w as f32, world_h as f32);
        viewport.set_screen_bounds(ViewportRect::full(half_w, half_h));
        let viewport = viewport.clone();

        for (eye, bounds) in [(Eye::Left, left_bounds), (Eye::Right, right_bounds)] {
            with_camera_restored(camera, |camera| -> RenderResult<()> {
                if let Some(separation) = separation {
                    move_camera(camera, separation, eye);
                }
                viewport.apply(ctx.backend, camera);
                ctx.scene.render_glow_pass(ctx.backend, camera)?;

                let captured = base.post_process_capture(ctx, Some(half_fb), half_w, half_h)?;
                let scene = base.render_scene(ctx, camera, t);
                ModeBase::send_orientation_update(ctx.events, camera, rw, rh);
                let post =
                    base.post_process_render(ctx, Some(half_fb), captured, camera, half_w, half_h);
                scene.and(post)?;

                ctx.backend.blit(half_fb, Some(result), bounds, true)?;
                Ok(())
            })?;
        }
        Ok(result)
    }
}

/// Size of one eye of a side-by-side or stacked pair
fn half_size(profile: StereoProfile, rw: u32, rh: u32) -> (u32, u32) {
    if profile.is_horizontal() {
        ((rw / 2).max(1), rh)
    } else {
        (rw, (rh / 2).max(1))
    }
}

/// Buffers `render` draws into for `profile` at `rw` x `rh`
fn frame_keys(profile: StereoProfile, rw: u32, rh: u32) -> Vec<FrameBufferKey> {
    let result = FrameBufferKey::new(rw, rh, RESULT_SLOT);
    if profile.is_anaglyph() {
        vec![
            FrameBufferKey::new(rw, rh, LEFT_EYE_SLOT),
            FrameBufferKey::new(rw, rh, RIGHT_EYE_SLOT),
            result,
        ]
    } else {
        let (half_w, half_h) = half_size(profile, rw, rh);
        vec![FrameBufferKey::new(half_w, half_h, HALF_SLOT), result]
    }
}

/// Where each eye lands in the result, left eye first
fn eye_bounds(profile: StereoProfile, rw: u32, rh: u32, settings: &Settings) -> [ViewportRect; 2] {
    let (w, h) = (rw as f32, rh as f32);
    let (left, right) = if profile.is_horizontal() {
        (
            ViewportRect::new(0.0, 0.0, w / 2.0, h),
            ViewportRect::new(w / 2.0, 0.0, w / 2.0, h),
        )
    } else {
        (
            ViewportRect::new(0.0, 0.0, w, h / 2.0),
            ViewportRect::new(0.0, h / 2.0, w, h / 2.0),
        )
    };
    let scale = settings.units_per_pixel() / settings.graphics.back_buffer_scale;
    let (left, right) = (left.scaled(scale), right.scaled(scale));
    if profile.is_cross_eye() {
        [right, left]
    } else {
        [left, right]
    }
}

impl RenderMode for StereoscopicMode {
    fn render(
        &mut self,
        ctx: &mut FrameContext<'_>,
        camera: &mut Camera,
        t: f64,
        size: RenderSize,
        fb: Option<FrameBufferHandle>,
    ) -> RenderResult<()> {
        if size.render_width == 0 || size.render_height == 0 {
            log::trace!("Skipping stereo frame of zero size");
            return Ok(());
        }
        let separation = camera
            .mode
            .allows_eye_offset()
            .then(|| compute_eye_separation(camera, ctx.settings));

        let result = if ctx.settings.stereo().profile.is_anaglyph() {
            self.render_anaglyph(ctx, camera, t, size, fb, separation)?
        } else {
            self.render_side_by_side(ctx, camera, t, size, fb, separation)?
        };

        if fb.is_none() {
            let (sw, sh) = ctx.backend.screen_size();
            ctx.backend
                .blit(result, None, ViewportRect::full(sw, sh), false)?;
        }
        self.base.set_result_buffer(Some(result));
        Ok(())
    }

    fn resize(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        settings: &Settings,
        size: RenderSize,
    ) -> RenderResult<()> {
        let (rw, rh) = (size.render_width, size.render_height);
        let keep = if settings.stereo().active && rw > 0 && rh > 0 {
            frame_keys(settings.stereo().profile, rw, rh)
        } else {
            Vec::new()
        };
        self.cache.retain_only(backend, &keep);
        for key in &keep {
            self.cache.get(backend, *key)?;
        }
        if self
            .base
            .result_buffer()
            .is_some_and(|fb| backend.frame_buffer_size(fb).is_none())
        {
            self.base.set_result_buffer(None);
        }
        Ok(())
    }

    fn dispose(&mut self, backend: &mut dyn GraphicsBackend) {
        self.cache.dispose(backend);
        self.base.set_result_buffer(None);
    }

    fn result_buffer(&self) -> Option<FrameBufferHandle> {
        self.base.result_buffer()
    }

    fn notify(
        &mut self,
        event: &Event,
        _settings: &Settings,
        backend: &mut dyn GraphicsBackend,
        _events: &EventManager,
    ) -> RenderResult<()> {
        match event {
            Event::FrameSizeUpdate { .. } | Event::ScreenshotSizeUpdate { .. } => {
                self.dispose(backend);
            }
            Event::StereoProfileCmd(profile) => {
                self.anaglyph.set_anaglyph_mode(profile.anaglyph_mode());
            }
            _ => {}
        }
        Ok(())
    }
}
