//! Render modes
//!
//! Each mode renders the same scene one or more times per frame under its own camera and
//! projection setup, and composites the passes into a result buffer. The engine picks one
//! mode per frame; [`RenderProcess`] is the closed set it picks from.

mod base;
mod context;
pub mod cubemap;
mod cubemap_projections;
mod fov;
mod framebuffer_cache;
mod main_mode;
mod openvr;
mod openxr;
mod stereoscopic;
mod viewport;
pub mod vr;

#[cfg(test)]
pub(crate) mod testing;

pub use base::ModeBase;
pub use context::{CubemapSide, RenderingContext};
pub use cubemap::{Cubemap, CubemapFlags, CubeFace};
pub use cubemap_projections::CubemapProjectionsMode;
pub use fov::FovMode;
pub use framebuffer_cache::{FrameBufferCache, FrameBufferKey};
pub use main_mode::MainMode;
pub use openvr::OpenVrMode;
pub use openxr::OpenXrMode;
pub use stereoscopic::{
    compute_eye_separation, StereoscopicMode, EYE_ANGLE_DEG, MAX_EYE_SEPARATION,
    SPACECRAFT_EYE_SEPARATION,
};
pub use viewport::{Viewport, ViewportKind};
pub use vr::{VrError, VrRuntime};

use thiserror::Error;

use crate::backend::{BackendError, FrameBufferHandle, GraphicsBackend};
use crate::events::{Event, EventManager};
use crate::postprocess::{PostProcess, WarpMeshError};
use crate::scene::{Camera, SceneRenderer};
use crate::settings::Settings;

/// Render error type
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Scene rendering failed: {0}")]
    Scene(String),
    #[error(transparent)]
    Vr(#[from] VrError),
    #[error(transparent)]
    WarpMesh(#[from] WarpMeshError),
    #[error("Failed to encode screenshot: {0}")]
    Screenshot(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Render and target resolution of a frame
///
/// The scene is rasterized at the render size; the final composite has the target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderSize {
    pub render_width: u32,
    pub render_height: u32,
    pub target_width: u32,
    pub target_height: u32,
}

impl RenderSize {
    pub fn new(render_width: u32, render_height: u32, target_width: u32, target_height: u32) -> Self {
        Self {
            render_width,
            render_height,
            target_width,
            target_height,
        }
    }

    /// Render and target size are the same
    pub fn uniform(width: u32, height: u32) -> Self {
        Self::new(width, height, width, height)
    }
}

/// Collaborators a mode renders with during one frame
pub struct FrameContext<'a> {
    pub backend: &'a mut dyn GraphicsBackend,
    pub scene: &'a mut dyn SceneRenderer,
    pub post_process: &'a mut dyn PostProcess,
    pub events: &'a EventManager,
    pub settings: &'a Settings,
}

/// Contract shared by all render modes
pub trait RenderMode {
    /// Render one frame into `fb`, or the screen if `None`
    fn render(
        &mut self,
        ctx: &mut FrameContext<'_>,
        camera: &mut Camera,
        t: f64,
        size: RenderSize,
        fb: Option<FrameBufferHandle>,
    ) -> RenderResult<()>;

    /// React to a new window or render size, dropping buffers of the old one
    fn resize(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        settings: &Settings,
        size: RenderSize,
    ) -> RenderResult<()>;

    /// Release all GPU resources owned by the mode
    fn dispose(&mut self, backend: &mut dyn GraphicsBackend);

    /// Buffer holding the last rendered frame, if it is not the screen
    fn result_buffer(&self) -> Option<FrameBufferHandle>;

    /// Handle a command, already applied to `settings`
    fn notify(
        &mut self,
        _event: &Event,
        _settings: &Settings,
        _backend: &mut dyn GraphicsBackend,
        _events: &EventManager,
    ) -> RenderResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderModeKind {
    Main,
    Fov,
    CubemapProjections,
    Stereoscopic,
    OpenVr,
    OpenXr,
}

/// The closed set of render modes
pub enum RenderProcess {
    Main(MainMode),
    Fov(FovMode),
    CubemapProjections(CubemapProjectionsMode),
    Stereoscopic(StereoscopicMode),
    OpenVr(OpenVrMode),
    OpenXr(OpenXrMode),
}

impl RenderProcess {
    pub fn kind(&self) -> RenderModeKind {
        match self {
            RenderProcess::Main(_) => RenderModeKind::Main,
            RenderProcess::Fov(_) => RenderModeKind::Fov,
            RenderProcess::CubemapProjections(_) => RenderModeKind::CubemapProjections,
            RenderProcess::Stereoscopic(_) => RenderModeKind::Stereoscopic,
            RenderProcess::OpenVr(_) => RenderModeKind::OpenVr,
            RenderProcess::OpenXr(_) => RenderModeKind::OpenXr,
        }
    }

    fn as_mode(&mut self) -> &mut dyn RenderMode {
        match self {
            RenderProcess::Main(mode) => mode,
            RenderProcess::Fov(mode) => mode,
            RenderProcess::CubemapProjections(mode) => mode,
            RenderProcess::Stereoscopic(mode) => mode,
            RenderProcess::OpenVr(mode) => mode,
            RenderProcess::OpenXr(mode) => mode,
        }
    }
}

impl RenderMode for RenderProcess {
    fn render(
        &mut self,
        ctx: &mut FrameContext<'_>,
        camera: &mut Camera,
        t: f64,
        size: RenderSize,
        fb: Option<FrameBufferHandle>,
    ) -> RenderResult<()> {
        self.as_mode().render(ctx, camera, t, size, fb)
    }

    fn resize(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        settings: &Settings,
        size: RenderSize,
    ) -> RenderResult<()> {
        self.as_mode().resize(backend, settings, size)
    }

    fn dispose(&mut self, backend: &mut dyn GraphicsBackend) {
        self.as_mode().dispose(backend)
    }

    fn result_buffer(&self) -> Option<FrameBufferHandle> {
        match self {
            RenderProcess::Main(mode) => mode.result_buffer(),
            RenderProcess::Fov(mode) => mode.result_buffer(),
            RenderProcess::CubemapProjections(mode) => mode.result_buffer(),
            RenderProcess::Stereoscopic(mode) => mode.result_buffer(),
            RenderProcess::OpenVr(mode) => mode.result_buffer(),
            RenderProcess::OpenXr(mode) => mode.result_buffer(),
        }
    }

    fn notify(
        &mut self,
        event: &Event,
        settings: &Settings,
        backend: &mut dyn GraphicsBackend,
        events: &EventManager,
    ) -> RenderResult<()> {
        self.as_mode().notify(event, settings, backend, events)
    }
}
