//! Projection of six cube faces into a single panorama or dome image

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::settings::CubemapProjection;

/// Orientation a cube face was rendered with, relative to the unrotated camera
/// (forward `+Z`, up `+Y`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceFrame {
    pub forward: Vec3,
    pub up: Vec3,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ProjectionParams {
    face_forward: [[f32; 4]; 6],
    face_up: [[f32; 4]; 6],
    projection: u32,
    aperture: f32,
    index_of_refraction: f32,
    aspect: f32,
}

/// Samples the cube faces along the view ray of every output pixel
#[derive(Debug, Clone)]
pub struct CubemapProjectionEffect {
    pub projection: CubemapProjection,
    /// Dome aperture in degrees, for fisheye projections
    pub aperture: f32,
    pub index_of_refraction: f32,
    frames: [FaceFrame; 6],
}

impl CubemapProjectionEffect {
    /// `frames` are the face orientations in right, left, up, down, front, back order
    pub fn new(frames: [FaceFrame; 6]) -> Self {
        Self {
            projection: CubemapProjection::default(),
            aperture: 180.0,
            index_of_refraction: 1.0,
            frames,
        }
    }

    fn params(&self, aspect: f32) -> ProjectionParams {
        let mut face_forward = [[0.0; 4]; 6];
        let mut face_up = [[0.0; 4]; 6];
        for (i, frame) in self.frames.iter().enumerate() {
            face_forward[i] = frame.forward.extend(0.0).to_array();
            face_up[i] = frame.up.extend(0.0).to_array();
        }
        ProjectionParams {
            face_forward,
            face_up,
            projection: self.projection.shader_id(),
            aperture: self.aperture,
            index_of_refraction: self.index_of_refraction,
            aspect,
        }
    }

    /// Project `faces` (right, left, up, down, front, back) into `viewport` of `target`
    pub fn render(
        &self,
        backend: &mut dyn GraphicsBackend,
        faces: [FrameBufferHandle; 6],
        target: Option<FrameBufferHandle>,
        viewport: ViewportRect,
    ) -> BackendResult<()> {
        let aspect = if viewport.height > 0.0 {
            viewport.width / viewport.height
        } else {
            1.0
        };
        let params = self.params(aspect);
        backend.draw_fullscreen(
            &FullscreenPass::new("Cubemap projection", CUBEMAP_PROJECTION_SHADER)
                .inputs(&faces)
                .uniforms(bytemuck::bytes_of(&params))
                .target(target)
                .viewport(viewport),
        )
    }
}

pub const CUBEMAP_PROJECTION_SHADER: &str = r#"
struct ProjectionParams {
    face_forward: array<vec4<f32>, 6>,
    face_up: array<vec4<f32>, 6>,
    projection: u32,
    aperture: f32,
    index_of_refraction: f32,
    aspect: f32,
}

@group(0) @binding(0) var face_sampler: sampler;
@group(0) @binding(1) var face_right: texture_2d<f32>;
@group(0) @binding(2) var face_left: texture_2d<f32>;
@group(0) @binding(3) var face_up: texture_2d<f32>;
@group(0) @binding(4) var face_down: texture_2d<f32>;
@group(0) @binding(5) var face_front: texture_2d<f32>;
@group(0) @binding(6) var face_back: texture_2d<f32>;
@group(0) @binding(8) var<uniform> params: ProjectionParams;

const PI: f32 = 3.14159265358979;
const FORWARD: vec3<f32> = vec3<f32>(0.0, 0.0, 1.0);
const UP: vec3<f32> = vec3<f32>(0.0, 1.0, 0.0);

fn right_axis() -> vec3<f32> {
    return cross(FORWARD, UP);
}

fn sphere_direction(lon: f32, lat: f32) -> vec3<f32> {
    return cos(lat) * (sin(lon) * right_axis() + cos(lon) * FORWARD) + sin(lat) * UP;
}

// xyz: view direction, w: 1 if the pixel is inside the projection
fn view_direction(uv: vec2<f32>) -> vec4<f32> {
    var result = vec4<f32>(0.0, 0.0, 1.0, 0.0);
    switch params.projection {
        case 0u: {
            // Equirectangular
            let lon = (uv.x - 0.5) * 2.0 * PI;
            let lat = (0.5 - uv.y) * PI;
            result = vec4<f32>(sphere_direction(lon, lat), 1.0);
        }
        case 1u: {
            // Cylindrical
            let lon = (uv.x - 0.5) * 2.0 * PI;
            let lat = atan((0.5 - uv.y) * PI);
            result = vec4<f32>(sphere_direction(lon, lat), 1.0);
        }
        case 2u: {
            // Hammer
            let x = (uv.x * 2.0 - 1.0) * 2.0 * sqrt(2.0);
            let y = (1.0 - uv.y * 2.0) * sqrt(2.0);
            if (x * x / 8.0 + y * y / 2.0 <= 1.0) {
                let z = sqrt(1.0 - x * x / 16.0 - y * y / 4.0);
                let lon = 2.0 * atan2(z * x, 2.0 * (2.0 * z * z - 1.0));
                let lat = asin(clamp(z * y, -1.0, 1.0));
                result = vec4<f32>(sphere_direction(lon, lat), 1.0);
            }
        }
        case 3u: {
            // Orthosphere: the far side of a glass sphere seen through its near side
            let p = vec2<f32>((uv.x * 2.0 - 1.0) * params.aspect, 1.0 - uv.y * 2.0);
            let r2 = dot(p, p);
            if (r2 <= 1.0) {
                let entry = p.x * right_axis() + p.y * UP - sqrt(1.0 - r2) * FORWARD;
                let bent = refract(FORWARD, entry, 1.0 / max(params.index_of_refraction, 0.0001));
                if (dot(bent, bent) > 0.0) {
                    let s = -2.0 * dot(entry, bent);
                    result = vec4<f32>(normalize(entry + s * bent), 1.0);
                }
            }
        }
        default: {
            // Azimuthal equidistant
            let p = vec2<f32>((uv.x * 2.0 - 1.0) * params.aspect, 1.0 - uv.y * 2.0);
            let r = length(p);
            if (r <= 1.0) {
                let theta = r * radians(params.aperture) * 0.5;
                let phi = atan2(p.y, p.x);
                let d = cos(theta) * FORWARD + sin(theta) * (cos(phi) * right_axis() + sin(phi) * UP);
                result = vec4<f32>(d, 1.0);
            }
        }
    }
    return result;
}

fn sample_face(index: u32, uv: vec2<f32>) -> vec4<f32> {
    var color = vec4<f32>(0.0, 0.0, 0.0, 1.0);
    switch index {
        case 0u: { color = textureSampleLevel(face_right, face_sampler, uv, 0.0); }
        case 1u: { color = textureSampleLevel(face_left, face_sampler, uv, 0.0); }
        case 2u: { color = textureSampleLevel(face_up, face_sampler, uv, 0.0); }
        case 3u: { color = textureSampleLevel(face_down, face_sampler, uv, 0.0); }
        case 4u: { color = textureSampleLevel(face_front, face_sampler, uv, 0.0); }
        default: { color = textureSampleLevel(face_back, face_sampler, uv, 0.0); }
    }
    return color;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let view = view_direction(input.uv);
    if (view.w == 0.0) {
        return vec4<f32>(0.0, 0.0, 0.0, 1.0);
    }
    let d = normalize(view.xyz);

    var best = 0u;
    var best_dot = -2.0;
    for (var i = 0u; i < 6u; i = i + 1u) {
        let k = dot(d, params.face_forward[i].xyz);
        if (k > best_dot) {
            best_dot = k;
            best = i;
        }
    }

    let forward = params.face_forward[best].xyz;
    let up = params.face_up[best].xyz;
    let right = cross(forward, up);
    let z = dot(d, forward);
    let local = vec2<f32>(dot(d, right), dot(d, up)) / z;
    let uv = vec2<f32>(0.5 + 0.5 * local.x, 0.5 - 0.5 * local.y);
    return sample_face(best, uv);
}
"#;
