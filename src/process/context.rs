//! Per-mode rendering context

use glam::DVec3;

use crate::backend::FrameBufferHandle;

/// Cube face being rendered, `None` outside cubemap passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CubemapSide {
    #[default]
    None,
    Front,
    Back,
    Left,
    Right,
    Up,
    Down,
}

/// What the scene renderer needs to know about the pass it is drawing
#[derive(Debug, Clone, Default)]
pub struct RenderingContext {
    /// Final target of the pass, `None` for the screen
    pub frame_buffer: Option<FrameBufferHandle>,
    /// Post-processing captured the pass
    pub post_process_active: bool,
    pub width: u32,
    pub height: u32,
    pub cubemap_side: CubemapSide,
    /// Head position in internal units, for VR passes
    pub vr_offset: Option<DVec3>,
}

impl RenderingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Drop per-pass state: face tag and VR offset
    pub fn reset(&mut self) {
        self.cubemap_side = CubemapSide::None;
        self.vr_offset = None;
    }
}
