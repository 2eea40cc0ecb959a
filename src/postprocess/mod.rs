//! Post-processing effects
//!
//! [`PostProcess`] is the per-frame effect chain a render mode captures the scene into.
//! The remaining effects composite the outputs of multi-pass modes.

mod anaglyph;
mod cubemap_projection;
mod geometry_warp;
mod mosaic;
mod tonemapping;
pub mod warp_mesh;

pub use anaglyph::AnaglyphEffect;
pub use cubemap_projection::{CubemapProjectionEffect, FaceFrame};
pub use geometry_warp::GeometryWarpEffect;
pub use mosaic::MosaicEffect;
pub use tonemapping::{TonemapOperator, TonemappingEffect};
pub use warp_mesh::{WarpMesh, WarpMeshError};

use crate::backend::traits::*;
use crate::backend::types::*;

/// Common fullscreen quad shader, prepended to every fullscreen fragment module
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;

    // Generate fullscreen triangle
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);

    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);

    return output;
}
"#;

/// The post-process bean: a chain of fullscreen effects applied after the scene pass
pub trait PostProcess {
    /// Start capturing the scene at `width` x `height`.
    ///
    /// Returns true if the chain claimed the frame; its capture buffer is then bound.
    fn capture(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        width: u32,
        height: u32,
    ) -> BackendResult<bool>;

    /// Run the chain on the captured image, writing into `target` or, for `None`, into the
    /// combined buffer and the screen
    fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        target: Option<FrameBufferHandle>,
    ) -> BackendResult<()>;

    /// Buffer holding the last image rendered without an explicit target
    fn combined_buffer(&self) -> Option<FrameBufferHandle>;

    fn is_enabled(&self) -> bool;

    /// Release GPU resources
    fn dispose(&mut self, backend: &mut dyn GraphicsBackend);
}

#[derive(Debug, Clone, Copy)]
struct SizedBuffer {
    handle: FrameBufferHandle,
    width: u32,
    height: u32,
}

/// Default post-process chain: capture, then tonemap
pub struct PostProcessor {
    enabled: bool,
    pub tonemapping: TonemappingEffect,
    capture_buffer: Option<SizedBuffer>,
    combined: Option<SizedBuffer>,
    captured: bool,
}

impl PostProcessor {
    pub fn new() -> Self {
        Self {
            enabled: true,
            tonemapping: TonemappingEffect::default(),
            capture_buffer: None,
            combined: None,
            captured: false,
        }
    }

    /// A chain that never captures, for modes that render straight into their targets
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn ensure(
        slot: &mut Option<SizedBuffer>,
        backend: &mut dyn GraphicsBackend,
        label: &str,
        width: u32,
        height: u32,
    ) -> BackendResult<FrameBufferHandle> {
        match slot {
            Some(buffer) if buffer.width == width && buffer.height == height => Ok(buffer.handle),
            _ => {
                if let Some(old) = slot.take() {
                    backend.destroy_frame_buffer(old.handle);
                }
                let mut desc = FrameBufferDescriptor::new(label, width, height);
                desc.format = TextureFormat::Rgba8Unorm;
                let handle = backend.create_frame_buffer(&desc)?;
                *slot = Some(SizedBuffer {
                    handle,
                    width,
                    height,
                });
                Ok(handle)
            }
        }
    }
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl PostProcess for PostProcessor {
    fn capture(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        width: u32,
        height: u32,
    ) -> BackendResult<bool> {
        self.captured = false;
        if !self.enabled || width == 0 || height == 0 {
            return Ok(false);
        }
        let buffer = Self::ensure(
            &mut self.capture_buffer,
            backend,
            "Post-process capture",
            width,
            height,
        )?;
        backend.bind_frame_buffer(Some(buffer));
        backend.clear([0.0, 0.0, 0.0, 1.0])?;
        self.captured = true;
        Ok(true)
    }

    fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        target: Option<FrameBufferHandle>,
    ) -> BackendResult<()> {
        let Some(capture) = self.capture_buffer.filter(|_| self.captured) else {
            return Ok(());
        };
        self.captured = false;
        backend.bind_frame_buffer(None);

        match target {
            Some(target) => self.tonemapping.render(backend, capture.handle, Some(target)),
            None => {
                let combined = Self::ensure(
                    &mut self.combined,
                    backend,
                    "Post-process combined",
                    capture.width,
                    capture.height,
                )?;
                self.tonemapping.render(backend, capture.handle, Some(combined))?;
                let (w, h) = backend.screen_size();
                backend.blit(combined, None, ViewportRect::full(w, h), false)
            }
        }
    }

    fn combined_buffer(&self) -> Option<FrameBufferHandle> {
        self.combined.map(|b| b.handle)
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn dispose(&mut self, backend: &mut dyn GraphicsBackend) {
        for buffer in [self.capture_buffer.take(), self.combined.take()]
            .into_iter()
            .flatten()
        {
            backend.destroy_frame_buffer(buffer.handle);
        }
        self.captured = false;
    }
}
