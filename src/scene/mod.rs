//! Scene-side collaborators of the render modes

mod camera;

pub use camera::*;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::GraphicsBackend;
use crate::process::vr::DevicePose;
use crate::process::{RenderResult, RenderingContext};

/// Identifier of a scene entity created by the render layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        EntityId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Draws the scene for a render mode
///
/// Must be callable several times per frame; each call sees the cube face, viewport size
/// and target of the pass in the [`RenderingContext`].
pub trait SceneRenderer {
    /// Render the scene into the backend's bound target
    fn render_scene(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        camera: &Camera,
        t: f64,
        rc: &RenderingContext,
    ) -> RenderResult<()>;

    /// Light glow pre-pass, run before the target of a pass is captured
    fn render_glow_pass(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        camera: &Camera,
    ) -> RenderResult<()>;

    /// Crosshairs and markers drawn over the finished image
    fn render_camera_overlay(
        &mut self,
        _backend: &mut dyn GraphicsBackend,
        _camera: &Camera,
        _width: u32,
        _height: u32,
    ) -> RenderResult<()> {
        Ok(())
    }

    /// Queue a VR controller model for this frame
    fn extract_vr_controller(&mut self, _entity: EntityId, _pose: &DevicePose) {}
}
