//! Core backend abstraction traits
//!
//! Render modes only ever talk to the GPU through [`GraphicsBackend`], which keeps them
//! testable against the recording [`DummyBackend`](super::dummy::DummyBackend).

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create frame buffer: {0}")]
    FrameBufferCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Unknown frame buffer {0:?}")]
    UnknownFrameBuffer(FrameBufferHandle),
    #[error("Too many inputs for fullscreen pass '{label}': {count}")]
    TooManyInputs { label: String, count: usize },
    #[error("Failed to read back pixels: {0}")]
    ReadbackFailed(String),
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a frame buffer (color texture plus optional depth)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameBufferHandle(pub(crate) u64);

impl FrameBufferHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Main graphics backend trait
pub trait GraphicsBackend {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Size of the default (screen) target
    fn screen_size(&self) -> (u32, u32);

    /// Resize the default (screen) target
    fn resize_screen(&mut self, width: u32, height: u32) -> BackendResult<()>;

    // Frame buffers

    /// Create a frame buffer
    fn create_frame_buffer(&mut self, desc: &FrameBufferDescriptor)
        -> BackendResult<FrameBufferHandle>;

    /// Destroy a frame buffer; unknown handles are ignored
    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferHandle);

    /// Size of a live frame buffer
    fn frame_buffer_size(&self, frame_buffer: FrameBufferHandle) -> Option<(u32, u32)>;

    /// Make `frame_buffer` the draw target; `None` binds the screen
    fn bind_frame_buffer(&mut self, frame_buffer: Option<FrameBufferHandle>);

    /// Currently bound draw target
    fn bound_frame_buffer(&self) -> Option<FrameBufferHandle>;

    // Commands

    /// Clear the bound target's color and depth
    fn clear(&mut self, color: [f32; 4]) -> BackendResult<()>;

    /// Set the viewport used by subsequent draws into the bound target
    fn set_viewport(&mut self, viewport: ViewportRect);

    /// Current viewport
    fn viewport(&self) -> Option<ViewportRect>;

    /// Run a fullscreen fragment pass
    fn draw_fullscreen(&mut self, pass: &FullscreenPass) -> BackendResult<()>;

    /// Copy `src` into `rect` of `dst` (or the screen), optionally flipping vertically
    fn blit(
        &mut self,
        src: FrameBufferHandle,
        dst: Option<FrameBufferHandle>,
        rect: ViewportRect,
        flip_y: bool,
    ) -> BackendResult<()>;

    /// Leave texture unit 0 active for whatever renders next
    fn reset_texture_unit(&mut self);

    /// Read the color attachment back as tightly packed RGBA8 rows
    fn read_pixels(&mut self, frame_buffer: FrameBufferHandle) -> BackendResult<Vec<u8>>;
}
