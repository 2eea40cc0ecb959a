//! Anaglyph compositing of a left/right image pair

use bytemuck::{Pod, Zeroable};

use crate::backend::traits::*;
use crate::backend::types::*;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct AnaglyphParams {
    mode: u32,
    _padding: [u32; 3],
}

/// Combines two eye images into one by color channel selection
#[derive(Debug, Clone, Default)]
pub struct AnaglyphEffect {
    /// 0 red/blue, 1 red/cyan
    pub mode: u32,
}

impl AnaglyphEffect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_anaglyph_mode(&mut self, mode: u32) {
        self.mode = mode;
    }

    pub fn render(
        &self,
        backend: &mut dyn GraphicsBackend,
        left: FrameBufferHandle,
        right: FrameBufferHandle,
        target: Option<FrameBufferHandle>,
    ) -> BackendResult<()> {
        let params = AnaglyphParams {
            mode: self.mode,
            _padding: [0; 3],
        };
        let inputs = [left, right];
        backend.draw_fullscreen(
            &FullscreenPass::new("Anaglyph", ANAGLYPH_SHADER)
                .inputs(&inputs)
                .uniforms(bytemuck::bytes_of(&params))
                .target(target),
        )
    }
}

pub const ANAGLYPH_SHADER: &str = r#"
struct AnaglyphParams {
    mode: u32,
}

@group(0) @binding(0) var eye_sampler: sampler;
@group(0) @binding(1) var left_eye: texture_2d<f32>;
@group(0) @binding(2) var right_eye: texture_2d<f32>;
@group(0) @binding(8) var<uniform> params: AnaglyphParams;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let left = textureSample(left_eye, eye_sampler, input.uv);
    let right = textureSample(right_eye, eye_sampler, input.uv);

    if (params.mode == 0u) {
        // Red/blue
        return vec4<f32>(left.r, 0.0, right.b, 1.0);
    }
    // Red/cyan
    return vec4<f32>(left.r, right.g, right.b, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendOp, DummyBackend};

    #[test]
    fn test_inputs_are_left_then_right() {
        let mut backend = DummyBackend::default();
        let left = backend
            .create_frame_buffer(&FrameBufferDescriptor::new("left", 8, 8))
            .unwrap();
        let right = backend
            .create_frame_buffer(&FrameBufferDescriptor::new("right", 8, 8))
            .unwrap();
        let out = backend
            .create_frame_buffer(&FrameBufferDescriptor::new("out", 8, 8))
            .unwrap();

        AnaglyphEffect::new()
            .render(&mut backend, left, right, Some(out))
            .unwrap();

        assert_eq!(
            backend.ops().last(),
            Some(&BackendOp::Fullscreen {
                label: "Anaglyph".into(),
                inputs: vec![left, right],
                target: Some(out),
                viewport: None,
            })
        );
    }
}
