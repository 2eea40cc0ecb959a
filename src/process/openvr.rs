//! OpenVR headset mode

use crate::backend::{FrameBufferHandle, GraphicsBackend, ViewportRect};
use crate::events::{Event, EventManager};
use crate::scene::Camera;
use crate::settings::Settings;

use super::vr::{self, Eye, VrControllers, VrGuis, VrRuntime};
use super::{
    FrameBufferCache, FrameBufferKey, FrameContext, ModeBase, RenderMode, RenderResult,
    RenderSize,
};

/// Headsets reporting a narrower field of view than this get the fallback
const MIN_HMD_FOV_DEG: f32 = 50.0;
const FALLBACK_FOV_DEG: f32 = 89.0;

/// Field of view announced when the headset starts
pub fn initial_fov(hmd_fov: Option<f32>) -> f32 {
    match hmd_fov {
        Some(fov) if fov > MIN_HMD_FOV_DEG => fov,
        _ => FALLBACK_FOV_DEG,
    }
}

/// Mirror of the left eye on the desktop, recomputed when either size changes
#[derive(Debug, Clone, Copy)]
struct MirrorLayout {
    eye: (u32, u32),
    screen: (u32, u32),
    rect: ViewportRect,
}

/// Renders both eyes of an OpenVR headset and mirrors the left one on the desktop
pub struct OpenVrMode {
    base: ModeBase,
    runtime: Box<dyn VrRuntime>,
    cache: FrameBufferCache,
    controllers: VrControllers,
    pub guis: VrGuis,
    mirror: Option<MirrorLayout>,
}

impl OpenVrMode {
    pub fn new(runtime: Box<dyn VrRuntime>, events: &EventManager) -> Self {
        let fov = initial_fov(runtime.hmd_fov_degrees());
        log::info!("OpenVR mode initialized, field of view {:.1} deg", fov);
        events.publish(Event::FovCmd(fov));

        let mut controllers = VrControllers::new();
        for device in runtime.devices() {
            controllers.connect(&device, events);
        }

        Self {
            base: ModeBase::new(),
            runtime,
            cache: FrameBufferCache::new("OpenVR"),
            controllers,
            guis: VrGuis::new(),
            mirror: None,
        }
    }

    pub fn controllers(&self) -> &VrControllers {
        &self.controllers
    }

    fn mirror_rect(&mut self, eye: (u32, u32), screen: (u32, u32)) -> ViewportRect {
        match self.mirror {
            Some(layout) if layout.eye == eye && layout.screen == screen => layout.rect,
            _ => {
                let rect = vr::keep_aspect(eye, screen);
                self.mirror = Some(MirrorLayout { eye, screen, rect });
                rect
            }
        }
    }

    fn eye_buffer(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        eye: Eye,
    ) -> RenderResult<FrameBufferHandle> {
        let (w, h) = self.runtime.render_size();
        Ok(self
            .cache
            .get(backend, FrameBufferKey::new(w, h, eye.index() as u8))?)
    }
}

impl RenderMode for OpenVrMode {
    fn render(
        &mut self,
        ctx: &mut FrameContext<'_>,
        camera: &mut Camera,
        t: f64,
        size: RenderSize,
        fb: Option<FrameBufferHandle>,
    ) -> RenderResult<()> {
        match self.runtime.poll_events() {
            Ok(events) => {
                for event in &events {
                    self.controllers.handle(event, ctx.events);
                }
            }
            Err(err) => log::warn!("Failed to poll VR events: {}", err),
        }
        self.controllers.extract(&*self.runtime, ctx.scene);

        let (w, h) = self.runtime.render_size();
        let pose = self.runtime.hmd_pose();
        let mut eye_buffers = Vec::with_capacity(Eye::BOTH.len());

        for eye in Eye::BOTH {
            let eye_fb = self.eye_buffer(ctx.backend, eye)?;
            let (near, far) = (camera.camera.near, camera.camera.far);
            vr::apply_view(
                camera,
                &mut self.base,
                pose,
                self.runtime.projection(eye, near, far),
                self.runtime.eye_to_head(eye),
                w,
                h,
            );
            vr::render_view(
                &mut self.base,
                &mut self.guis,
                ctx,
                camera,
                t,
                eye,
                eye_fb,
                w,
                h,
            )?;
            eye_buffers.push(eye_fb);
        }
        self.base.rc.reset();

        for (view, eye_fb) in eye_buffers.iter().enumerate() {
            self.runtime.submit(view, ctx.backend, *eye_fb)?;
        }

        let rect = self.mirror_rect((w, h), (size.target_width, size.target_height));
        ctx.backend.blit(eye_buffers[0], fb, rect, false)?;
        self.base.set_result_buffer(fb);
        Ok(())
    }

    fn resize(
        &mut self,
        _backend: &mut dyn GraphicsBackend,
        _settings: &Settings,
        _size: RenderSize,
    ) -> RenderResult<()> {
        self.mirror = None;
        Ok(())
    }

    fn dispose(&mut self, backend: &mut dyn GraphicsBackend) {
        self.cache.dispose(backend);
        self.mirror = None;
    }

    fn result_buffer(&self) -> Option<FrameBufferHandle> {
        self.base.result_buffer()
    }

    fn notify(
        &mut self,
        event: &Event,
        _settings: &Settings,
        _backend: &mut dyn GraphicsBackend,
        events: &EventManager,
    ) -> RenderResult<()> {
        match event {
            Event::VrDeviceConnected(device) => {
                self.controllers.connect(device, events);
            }
            Event::VrDeviceDisconnected(device) => {
                self.controllers.disconnect(device, events);
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendOp;
    use crate::postprocess::PostProcessor;
    use crate::process::testing::{FakeVrRuntime, Harness};
    use crate::process::vr::{VrDevice, VrDeviceKind, VrEvent};
    use rstest::rstest;

    fn vr_harness() -> Harness {
        let mut h = Harness::new(1920, 1080);
        h.post_process = PostProcessor::disabled();
        h.settings.runtime.openvr = true;
        h
    }

    #[rstest]
    #[case(Some(110.0), 110.0)]
    #[case(Some(50.0), 89.0)]
    #[case(Some(30.0), 89.0)]
    #[case(None, 89.0)]
    fn test_initial_fov(#[case] hmd: Option<f32>, #[case] expected: f32) {
        assert_eq!(initial_fov(hmd), expected);
    }

    #[test]
    fn test_new_announces_fov_and_registers_controllers() {
        let events = EventManager::new();
        let rx = events.subscribe();
        let mut runtime = FakeVrRuntime::new();
        runtime.fov = Some(100.0);
        runtime.devices = vec![
            VrDevice::new(0, VrDeviceKind::Hmd),
            VrDevice::new(1, VrDeviceKind::Controller),
        ];

        let mode = OpenVrMode::new(Box::new(runtime), &events);

        assert_eq!(rx.try_recv().unwrap(), Event::FovCmd(100.0));
        assert!(matches!(rx.try_recv().unwrap(), Event::SceneAddObject(_)));
        assert_eq!(mode.controllers().len(), 1);
    }

    #[test]
    fn test_renders_and_submits_both_eyes() {
        let mut h = vr_harness();
        let runtime = FakeVrRuntime::new();
        let submitted = runtime.submitted.clone();
        let mut mode = OpenVrMode::new(Box::new(runtime), &h.events);
        let mut camera = Camera::default();

        mode.render(&mut h.ctx(), &mut camera, 0.0, RenderSize::uniform(1920, 1080), None)
            .unwrap();

        assert_eq!(h.scene.passes.len(), 2);
        assert!(h
            .scene
            .passes
            .iter()
            .all(|p| (p.width, p.height) == (1000, 1000) && p.vr_offset.is_some()));
        assert_eq!(h.scene.glow_passes, 2);
        // The overlay is drawn once per eye by the mode, never by post-processing
        assert_eq!(h.scene.overlays, 2);

        let submitted = submitted.borrow();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].0, 0);
        assert_eq!(submitted[1].0, 1);
        assert_ne!(submitted[0].1, submitted[1].1);
        assert_eq!(h.scene.passes[0].frame_buffer, Some(submitted[0].1));
    }

    #[test]
    fn test_left_eye_mirrored_keeping_aspect() {
        let mut h = vr_harness();
        let runtime = FakeVrRuntime::new();
        let submitted = runtime.submitted.clone();
        let mut mode = OpenVrMode::new(Box::new(runtime), &h.events);
        let mut camera = Camera::default();

        mode.render(&mut h.ctx(), &mut camera, 0.0, RenderSize::uniform(1920, 1080), None)
            .unwrap();

        let left = submitted.borrow()[0].1;
        let blit = h
            .backend
            .ops()
            .iter()
            .rev()
            .find(|op| matches!(op, BackendOp::Blit { .. }))
            .cloned();
        assert_eq!(
            blit,
            Some(BackendOp::Blit {
                src: left,
                dst: None,
                rect: ViewportRect::new(420.0, 0.0, 1080.0, 1080.0),
                flip_y: false,
            })
        );
        assert_eq!(mode.result_buffer(), None);
    }

    #[test]
    fn test_eye_matrices_include_eye_offset() {
        let mut h = vr_harness();
        let mut runtime = FakeVrRuntime::new();
        runtime.eye_offset = 0.032;
        let mut mode = OpenVrMode::new(Box::new(runtime), &h.events);
        let mut camera = Camera::default();

        mode.render(&mut h.ctx(), &mut camera, 0.0, RenderSize::uniform(800, 600), None)
            .unwrap();

        let left = h.scene.passes[0].combined;
        let right = h.scene.passes[1].combined;
        assert!(!left.abs_diff_eq(right, 1e-6));
    }

    #[test]
    fn test_polled_controller_events_reach_scene() {
        let mut h = vr_harness();
        let rx = h.events.subscribe();
        let mut runtime = FakeVrRuntime::new();
        let controller = VrDevice::new(4, VrDeviceKind::Controller);
        runtime.pending.push(VrEvent::DeviceConnected(controller));
        runtime
            .device_poses
            .insert(controller.id, crate::process::vr::DevicePose::default());
        let mut mode = OpenVrMode::new(Box::new(runtime), &h.events);
        let mut camera = Camera::default();

        mode.render(&mut h.ctx(), &mut camera, 0.0, RenderSize::uniform(800, 600), None)
            .unwrap();

        assert_eq!(mode.controllers().len(), 1);
        assert_eq!(h.scene.controllers.len(), 1);
        let received: Vec<Event> = rx.try_iter().collect();
        assert!(received.contains(&Event::VrDeviceConnected(controller)));
    }

    #[test]
    fn test_notify_tracks_controllers() {
        let mut h = vr_harness();
        let mut mode = OpenVrMode::new(Box::new(FakeVrRuntime::new()), &h.events);
        let controller = VrDevice::new(2, VrDeviceKind::Controller);

        mode.notify(
            &Event::VrDeviceConnected(controller),
            &h.settings,
            &mut h.backend,
            &h.events,
        )
        .unwrap();
        assert_eq!(mode.controllers().len(), 1);

        mode.notify(
            &Event::VrDeviceDisconnected(controller),
            &h.settings,
            &mut h.backend,
            &h.events,
        )
        .unwrap();
        assert!(mode.controllers().is_empty());
    }

    #[test]
    fn test_dispose_releases_eye_buffers() {
        let mut h = vr_harness();
        let mut mode = OpenVrMode::new(Box::new(FakeVrRuntime::new()), &h.events);
        let mut camera = Camera::default();
        mode.render(&mut h.ctx(), &mut camera, 0.0, RenderSize::uniform(800, 600), None)
            .unwrap();

        mode.dispose(&mut h.backend);

        assert_eq!(h.backend.live_frame_buffers(), 0);
    }
}
