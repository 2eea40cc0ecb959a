//! Common types shared between backends

use super::traits::FrameBufferHandle;

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    #[default]
    Rgba8Unorm,
    Rgba16Float,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
        }
    }
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const TEXTURE_BINDING: Self = Self(1 << 2);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 4);

    /// Everything a render-mode frame buffer is used for
    pub const FRAME_BUFFER: Self =
        Self((1 << 0) | (1 << 1) | (1 << 2) | (1 << 4));

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Frame buffer descriptor: one color attachment plus an optional depth attachment
#[derive(Debug, Clone)]
pub struct FrameBufferDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub depth: bool,
}

impl Default for FrameBufferDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::FRAME_BUFFER,
            depth: true,
        }
    }
}

impl FrameBufferDescriptor {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: Some(label.into()),
            width,
            height,
            ..Default::default()
        }
    }
}

/// Viewport rectangle in pixels, origin at the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewportRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ViewportRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Viewport covering a whole `width` x `height` target
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    Clear([f32; 4]),
    Load,
}

/// A fullscreen-triangle draw of a fragment shader into a frame buffer (or the screen)
///
/// Inputs are bound in order after the shared sampler, uniforms (if any) after the inputs.
#[derive(Debug, Clone)]
pub struct FullscreenPass<'a> {
    pub label: &'a str,
    /// WGSL fragment module; the fullscreen vertex stage is prepended by the backend
    pub shader: &'static str,
    pub inputs: &'a [FrameBufferHandle],
    pub uniforms: &'a [u8],
    /// `None` renders to the screen
    pub target: Option<FrameBufferHandle>,
    pub viewport: Option<ViewportRect>,
    pub load_op: LoadOp,
}

impl<'a> FullscreenPass<'a> {
    pub fn new(label: &'a str, shader: &'static str) -> Self {
        Self {
            label,
            shader,
            inputs: &[],
            uniforms: &[],
            target: None,
            viewport: None,
            load_op: LoadOp::Clear([0.0, 0.0, 0.0, 1.0]),
        }
    }

    pub fn inputs(mut self, inputs: &'a [FrameBufferHandle]) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn uniforms(mut self, uniforms: &'a [u8]) -> Self {
        self.uniforms = uniforms;
        self
    }

    pub fn target(mut self, target: Option<FrameBufferHandle>) -> Self {
        self.target = target;
        self
    }

    pub fn viewport(mut self, viewport: ViewportRect) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn load(mut self) -> Self {
        self.load_op = LoadOp::Load;
        self
    }
}

/// Maximum number of sampled inputs a fullscreen pass may bind
pub const MAX_FULLSCREEN_INPUTS: usize = 6;

/// Binding index of the uniform block in fullscreen passes
pub const FULLSCREEN_UNIFORM_BINDING: u32 = 8;
