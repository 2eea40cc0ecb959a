//! Geometry warp for spherical mirror projection

use bytemuck::{Pod, Zeroable};

use super::warp_mesh::WarpMesh;
use crate::backend::traits::*;
use crate::backend::types::*;

/// Side length of the resampled warp grid uploaded to the shader
const WARP_GRID: usize = 32;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct WarpParams {
    grid: [u32; 4],
    nodes: [[f32; 4]; WARP_GRID * WARP_GRID],
}

/// Resamples the fisheye image through a warp mesh
pub struct GeometryWarpEffect {
    params: Box<WarpParams>,
    has_mesh: bool,
}

impl GeometryWarpEffect {
    pub fn new() -> Self {
        let mut effect = Self {
            params: Box::new(WarpParams::zeroed()),
            has_mesh: false,
        };
        effect.upload(&WarpMesh::identity(WARP_GRID, WARP_GRID));
        effect
    }

    /// Use `mesh` for subsequent renders
    pub fn set_mesh(&mut self, mesh: &WarpMesh) {
        self.upload(mesh);
        self.has_mesh = true;
    }

    pub fn has_mesh(&self) -> bool {
        self.has_mesh
    }

    fn upload(&mut self, mesh: &WarpMesh) {
        self.params.grid = [WARP_GRID as u32, WARP_GRID as u32, 0, 0];
        for j in 0..WARP_GRID {
            for i in 0..WARP_GRID {
                let s = i as f32 / (WARP_GRID - 1) as f32;
                let t = j as f32 / (WARP_GRID - 1) as f32;
                let [u, v, intensity] = mesh.sample(s, t);
                self.params.nodes[j * WARP_GRID + i] = [u, v, intensity, 0.0];
            }
        }
    }

    pub fn render(
        &self,
        backend: &mut dyn GraphicsBackend,
        input: FrameBufferHandle,
        target: Option<FrameBufferHandle>,
        viewport: ViewportRect,
    ) -> BackendResult<()> {
        let inputs = [input];
        backend.draw_fullscreen(
            &FullscreenPass::new("Geometry warp", GEOMETRY_WARP_SHADER)
                .inputs(&inputs)
                .uniforms(bytemuck::bytes_of(self.params.as_ref()))
                .target(target)
                .viewport(viewport),
        )
    }
}

impl Default for GeometryWarpEffect {
    fn default() -> Self {
        Self::new()
    }
}

pub const GEOMETRY_WARP_SHADER: &str = r#"
struct WarpParams {
    grid: vec4<u32>,
    nodes: array<vec4<f32>, 1024>,
}

@group(0) @binding(0) var warp_sampler: sampler;
@group(0) @binding(1) var source: texture_2d<f32>;
@group(0) @binding(8) var<uniform> params: WarpParams;

fn node(i: u32, j: u32) -> vec4<f32> {
    return params.nodes[j * params.grid.x + i];
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let nx = params.grid.x;
    let ny = params.grid.y;
    // Mesh rows run bottom to top
    let pos = vec2<f32>(input.uv.x, 1.0 - input.uv.y) * vec2<f32>(f32(nx - 1u), f32(ny - 1u));
    let i0 = min(u32(floor(pos.x)), nx - 2u);
    let j0 = min(u32(floor(pos.y)), ny - 2u);
    let a = pos - vec2<f32>(f32(i0), f32(j0));

    let bottom = mix(node(i0, j0), node(i0 + 1u, j0), a.x);
    let top = mix(node(i0, j0 + 1u), node(i0 + 1u, j0 + 1u), a.x);
    let warp = mix(bottom, top, a.y);

    if (warp.z < 0.0) {
        return vec4<f32>(0.0, 0.0, 0.0, 1.0);
    }
    let color = textureSampleLevel(source, warp_sampler, vec2<f32>(warp.x, 1.0 - warp.y), 0.0);
    return vec4<f32>(color.rgb * warp.z, 1.0);
}
"#;
