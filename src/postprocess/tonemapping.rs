//! Tonemapping post-processing

use bytemuck::{Pod, Zeroable};

use crate::backend::traits::*;
use crate::backend::types::*;

/// Tonemapping operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TonemapOperator {
    Reinhard,
    #[default]
    Aces,
    None,
}

impl TonemapOperator {
    fn shader_id(&self) -> u32 {
        match self {
            TonemapOperator::Reinhard => 0,
            TonemapOperator::Aces => 1,
            TonemapOperator::None => 2,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TonemapParams {
    exposure: f32,
    gamma: f32,
    op: u32,
    _padding: u32,
}

/// Tonemapping post-processing effect
#[derive(Debug, Clone)]
pub struct TonemappingEffect {
    pub operator: TonemapOperator,
    pub exposure: f32,
    pub gamma: f32,
}

impl Default for TonemappingEffect {
    fn default() -> Self {
        Self {
            operator: TonemapOperator::Aces,
            exposure: 1.0,
            gamma: 2.2,
        }
    }
}

impl TonemappingEffect {
    /// Tonemap `input` into `target` (`None` for the screen)
    pub fn render(
        &self,
        backend: &mut dyn GraphicsBackend,
        input: FrameBufferHandle,
        target: Option<FrameBufferHandle>,
    ) -> BackendResult<()> {
        let params = TonemapParams {
            exposure: self.exposure,
            gamma: self.gamma,
            op: self.operator.shader_id(),
            _padding: 0,
        };
        let inputs = [input];
        backend.draw_fullscreen(
            &FullscreenPass::new("Tonemapping", TONEMAPPING_SHADER)
                .inputs(&inputs)
                .uniforms(bytemuck::bytes_of(&params))
                .target(target),
        )
    }
}

pub const TONEMAPPING_SHADER: &str = r#"
struct TonemapParams {
    exposure: f32,
    gamma: f32,
    op: u32,
}

@group(0) @binding(0) var hdr_sampler: sampler;
@group(0) @binding(1) var hdr_texture: texture_2d<f32>;
@group(0) @binding(8) var<uniform> params: TonemapParams;

fn aces_tonemap(color: vec3<f32>) -> vec3<f32> {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    return saturate((color * (a * color + b)) / (color * (c * color + d) + e));
}

fn reinhard_tonemap(color: vec3<f32>) -> vec3<f32> {
    return color / (color + vec3<f32>(1.0));
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    var color = textureSample(hdr_texture, hdr_sampler, input.uv).rgb;
    color = color * params.exposure;

    var mapped: vec3<f32>;
    switch params.op {
        case 0u: { mapped = reinhard_tonemap(color); }
        case 1u: { mapped = aces_tonemap(color); }
        default: { mapped = saturate(color); }
    }

    let gamma_corrected = pow(mapped, vec3<f32>(1.0 / params.gamma));
    return vec4<f32>(gamma_corrected, 1.0);
}
"#;
