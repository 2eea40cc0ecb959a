//! Mosaic of four quarter tiles into one image

use crate::backend::traits::*;
use crate::backend::types::*;

/// Composites four tiles, given as top-left, bottom-left, top-right, bottom-right
#[derive(Debug, Clone, Default)]
pub struct MosaicEffect;

impl MosaicEffect {
    pub fn new() -> Self {
        Self
    }

    pub fn render(
        &self,
        backend: &mut dyn GraphicsBackend,
        tiles: [FrameBufferHandle; 4],
        target: Option<FrameBufferHandle>,
    ) -> BackendResult<()> {
        backend.draw_fullscreen(
            &FullscreenPass::new("Mosaic", MOSAIC_SHADER)
                .inputs(&tiles)
                .target(target),
        )
    }
}

pub const MOSAIC_SHADER: &str = r#"
@group(0) @binding(0) var tile_sampler: sampler;
@group(0) @binding(1) var top_left: texture_2d<f32>;
@group(0) @binding(2) var bottom_left: texture_2d<f32>;
@group(0) @binding(3) var top_right: texture_2d<f32>;
@group(0) @binding(4) var bottom_right: texture_2d<f32>;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let local = fract(input.uv * 2.0);
    let left = input.uv.x < 0.5;
    let top = input.uv.y < 0.5;

    var color: vec4<f32>;
    if (left && top) {
        color = textureSampleLevel(top_left, tile_sampler, local, 0.0);
    } else if (left) {
        color = textureSampleLevel(bottom_left, tile_sampler, local, 0.0);
    } else if (top) {
        color = textureSampleLevel(top_right, tile_sampler, local, 0.0);
    } else {
        color = textureSampleLevel(bottom_right, tile_sampler, local, 0.0);
    }
    return color;
}
"#;
