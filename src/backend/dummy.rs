//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It keeps track of live frame
//! buffers and records every command as a [`BackendOp`], so render modes can be
//! checked for what they asked the GPU to do.

use std::collections::HashMap;

use super::traits::*;
use super::types::*;

/// A recorded backend command
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOp {
    CreateFrameBuffer {
        frame_buffer: FrameBufferHandle,
        width: u32,
        height: u32,
    },
    DestroyFrameBuffer(FrameBufferHandle),
    Bind(Option<FrameBufferHandle>),
    Clear(Option<FrameBufferHandle>),
    SetViewport(ViewportRect),
    Fullscreen {
        label: String,
        inputs: Vec<FrameBufferHandle>,
        target: Option<FrameBufferHandle>,
        viewport: Option<ViewportRect>,
    },
    Blit {
        src: FrameBufferHandle,
        dst: Option<FrameBufferHandle>,
        rect: ViewportRect,
        flip_y: bool,
    },
    ResetTextureUnit,
    ReadPixels(FrameBufferHandle),
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    screen: (u32, u32),
    frame_buffers: HashMap<u64, (u32, u32)>,
    next_frame_buffer_id: u64,
    bound: Option<FrameBufferHandle>,
    viewport: Option<ViewportRect>,
    ops: Vec<BackendOp>,
}

impl DummyBackend {
    /// Create a new dummy backend with a screen of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            screen: (width, height),
            frame_buffers: HashMap::new(),
            next_frame_buffer_id: 1,
            bound: None,
            viewport: None,
            ops: Vec::new(),
        }
    }

    /// Commands recorded so far.
    pub fn ops(&self) -> &[BackendOp] {
        &self.ops
    }

    /// Drop the recorded commands, keeping resource state.
    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Number of frame buffers created and not yet destroyed.
    pub fn live_frame_buffers(&self) -> usize {
        self.frame_buffers.len()
    }

    pub fn is_live(&self, frame_buffer: FrameBufferHandle) -> bool {
        self.frame_buffers.contains_key(&frame_buffer.0)
    }

    fn check(&self, frame_buffer: FrameBufferHandle) -> BackendResult<()> {
        if self.is_live(frame_buffer) {
            Ok(())
        } else {
            Err(BackendError::UnknownFrameBuffer(frame_buffer))
        }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl GraphicsBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn screen_size(&self) -> (u32, u32) {
        self.screen
    }

    fn resize_screen(&mut self, width: u32, height: u32) -> BackendResult<()> {
        log::trace!("DummyBackend: resizing screen to {}x{}", width, height);
        self.screen = (width, height);
        Ok(())
    }

    fn create_frame_buffer(
        &mut self,
        desc: &FrameBufferDescriptor,
    ) -> BackendResult<FrameBufferHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::FrameBufferCreationFailed(format!(
                "{:?} has zero size {}x{}",
                desc.label, desc.width, desc.height
            )));
        }
        let handle = FrameBufferHandle(self.next_frame_buffer_id);
        self.next_frame_buffer_id += 1;
        log::trace!(
            "DummyBackend: creating frame buffer {:?} ({}x{}) -> {:?}",
            desc.label,
            desc.width,
            desc.height,
            handle
        );
        self.frame_buffers.insert(handle.0, (desc.width, desc.height));
        self.ops.push(BackendOp::CreateFrameBuffer {
            frame_buffer: handle,
            width: desc.width,
            height: desc.height,
        });
        Ok(handle)
    }

    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferHandle) {
        log::trace!("DummyBackend: destroying frame buffer {:?}", frame_buffer);
        if self.frame_buffers.remove(&frame_buffer.0).is_some() {
            self.ops.push(BackendOp::DestroyFrameBuffer(frame_buffer));
        }
        if self.bound == Some(frame_buffer) {
            self.bound = None;
        }
    }

    fn frame_buffer_size(&self, frame_buffer: FrameBufferHandle) -> Option<(u32, u32)> {
        self.frame_buffers.get(&frame_buffer.0).copied()
    }

    fn bind_frame_buffer(&mut self, frame_buffer: Option<FrameBufferHandle>) {
        log::trace!("DummyBackend: binding {:?}", frame_buffer);
        self.bound = frame_buffer;
        self.ops.push(BackendOp::Bind(frame_buffer));
    }

    fn bound_frame_buffer(&self) -> Option<FrameBufferHandle> {
        self.bound
    }

    fn clear(&mut self, _color: [f32; 4]) -> BackendResult<()> {
        if let Some(fb) = self.bound {
            self.check(fb)?;
        }
        self.ops.push(BackendOp::Clear(self.bound));
        Ok(())
    }

    fn set_viewport(&mut self, viewport: ViewportRect) {
        self.viewport = Some(viewport);
        self.ops.push(BackendOp::SetViewport(viewport));
    }

    fn viewport(&self) -> Option<ViewportRect> {
        self.viewport
    }

    fn draw_fullscreen(&mut self, pass: &FullscreenPass) -> BackendResult<()> {
        if pass.inputs.len() > MAX_FULLSCREEN_INPUTS {
            return Err(BackendError::TooManyInputs {
                label: pass.label.to_string(),
                count: pass.inputs.len(),
            });
        }
        for input in pass.inputs {
            self.check(*input)?;
        }
        if let Some(target) = pass.target {
            self.check(target)?;
        }
        log::trace!(
            "DummyBackend: fullscreen pass '{}' ({} inputs) -> {:?}",
            pass.label,
            pass.inputs.len(),
            pass.target
        );
        self.ops.push(BackendOp::Fullscreen {
            label: pass.label.to_string(),
            inputs: pass.inputs.to_vec(),
            target: pass.target,
            viewport: pass.viewport,
        });
        Ok(())
    }

    fn blit(
        &mut self,
        src: FrameBufferHandle,
        dst: Option<FrameBufferHandle>,
        rect: ViewportRect,
        flip_y: bool,
    ) -> BackendResult<()> {
        self.check(src)?;
        if let Some(dst) = dst {
            self.check(dst)?;
        }
        self.ops.push(BackendOp::Blit {
            src,
            dst,
            rect,
            flip_y,
        });
        Ok(())
    }

    fn reset_texture_unit(&mut self) {
        self.ops.push(BackendOp::ResetTextureUnit);
    }

    fn read_pixels(&mut self, frame_buffer: FrameBufferHandle) -> BackendResult<Vec<u8>> {
        let (w, h) = self
            .frame_buffer_size(frame_buffer)
            .ok_or(BackendError::UnknownFrameBuffer(frame_buffer))?;
        self.ops.push(BackendOp::ReadPixels(frame_buffer));
        Ok(vec![0; (w * h * 4) as usize])
    }
}
