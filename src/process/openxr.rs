//! OpenXR headset mode

use crate::backend::{FrameBufferHandle, GraphicsBackend};
use crate::events::{Event, EventManager};
use crate::scene::Camera;
use crate::settings::Settings;

use super::vr::{self, Eye, VrControllers, VrGuis, VrRuntime};
use super::{
    FrameBufferCache, FrameBufferKey, FrameContext, ModeBase, RenderMode, RenderResult,
    RenderSize,
};

/// Renders every view the OpenXR session reports for the frame
///
/// Nothing is drawn on the desktop; the compositor owns the output.
pub struct OpenXrMode {
    base: ModeBase,
    runtime: Box<dyn VrRuntime>,
    cache: FrameBufferCache,
    controllers: VrControllers,
    pub guis: VrGuis,
}

impl OpenXrMode {
    pub fn new(runtime: Box<dyn VrRuntime>, events: &EventManager) -> Self {
        let mut controllers = VrControllers::new();
        for device in runtime.devices() {
            controllers.connect(&device, events);
        }
        log::info!("OpenXR mode initialized");
        Self {
            base: ModeBase::new(),
            runtime,
            cache: FrameBufferCache::new("OpenXR"),
            controllers,
            guis: VrGuis::new(),
        }
    }

    pub fn controllers(&self) -> &VrControllers {
        &self.controllers
    }
}

impl RenderMode for OpenXrMode {
    fn render(
        &mut self,
        ctx: &mut FrameContext<'_>,
        camera: &mut Camera,
        t: f64,
        _size: RenderSize,
        _fb: Option<FrameBufferHandle>,
    ) -> RenderResult<()> {
        match self.runtime.poll_events() {
            Ok(events) => {
                for event in &events {
                    self.controllers.handle(event, ctx.events);
                }
            }
            Err(err) => log::warn!("Failed to poll XR events: {}", err),
        }

        let Some(views) = self.runtime.views() else {
            log::debug!("XR session not tracking, skipping frame");
            return Ok(());
        };
        self.controllers.extract(&*self.runtime, ctx.scene);

        let (w, h) = self.runtime.render_size();
        let mut view_buffers = Vec::with_capacity(views.len());
        for (index, view) in views.iter().enumerate() {
            let view_fb = self
                .cache
                .get(ctx.backend, FrameBufferKey::new(w, h, index as u8))?;
            let (near, far) = (camera.camera.near, camera.camera.far);
            vr::apply_view(
                camera,
                &mut self.base,
                Some(view.pose),
                view.fov.projection(near, far),
                glam::Mat4::IDENTITY,
                w,
                h,
            );
            vr::render_view(
                &mut self.base,
                &mut self.guis,
                ctx,
                camera,
                t,
                Eye::from_index(index),
                view_fb,
                w,
                h,
            )?;
            view_buffers.push(view_fb);
        }
        self.base.rc.reset();

        for (index, view_fb) in view_buffers.into_iter().enumerate() {
            self.runtime.submit(index, ctx.backend, view_fb)?;
        }
        self.base.set_result_buffer(None);
        Ok(())
    }

    fn resize(
        &mut self,
        _backend: &mut dyn GraphicsBackend,
        _settings: &Settings,
        _size: RenderSize,
    ) -> RenderResult<()> {
        Ok(())
    }

    fn dispose(&mut self, backend: &mut dyn GraphicsBackend) {
        self.cache.dispose(backend);
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
