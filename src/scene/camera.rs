//! Camera system
//!
//! The scene camera lives in double precision internal units. Rendering uses a floating
//! origin: the perspective camera always sits at the origin and the scene is translated
//! by `-pos`, so only direction, up and the projection reach the GPU in single precision.

use bytemuck::{Pod, Zeroable};
use glam::{DVec3, Mat4, Vec3, Vec4};

/// Meters to internal units
pub const M_TO_U: f64 = 1.0e-9;
/// Kilometers to internal units
pub const KM_TO_U: f64 = M_TO_U * 1000.0;

/// What drives the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CameraMode {
    #[default]
    Free,
    Focus,
    Game,
    Spacecraft,
    /// Field-of-view camera, first aperture
    Fov1,
    /// Field-of-view camera, second aperture
    Fov2,
    /// Field-of-view camera, both apertures
    FovBoth,
}

impl CameraMode {
    /// Aperture selector: 1, 2, 3 (both) or 0 outside FOV modes
    pub fn fov_mode(&self) -> u8 {
        match self {
            CameraMode::Fov1 => 1,
            CameraMode::Fov2 => 2,
            CameraMode::FovBoth => 3,
            _ => 0,
        }
    }

    pub fn is_fov(&self) -> bool {
        self.fov_mode() != 0
    }

    pub fn is_focus(&self) -> bool {
        matches!(self, CameraMode::Focus)
    }

    pub fn is_spacecraft(&self) -> bool {
        matches!(self, CameraMode::Spacecraft)
    }

    /// Modes in which the camera may be displaced per eye for stereo
    pub fn allows_eye_offset(&self) -> bool {
        matches!(
            self,
            CameraMode::Free | CameraMode::Focus | CameraMode::Spacecraft
        )
    }
}

/// Distance information about a body the camera relates to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyInfo {
    /// Distance from the camera to the body center, internal units
    pub distance_to_camera: f64,
    /// Body radius, internal units
    pub radius: f64,
}

impl BodyInfo {
    pub fn new(distance_to_camera: f64, radius: f64) -> Self {
        Self {
            distance_to_camera,
            radius,
        }
    }

    /// Distance from the camera to the body surface, never negative
    pub fn surface_distance(&self) -> f64 {
        (self.distance_to_camera - self.radius).max(0.0)
    }
}

/// Perspective projection state handed to scene renderers
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    pub direction: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub projection: Mat4,
    pub view: Mat4,
    pub combined: Mat4,
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        let mut camera = Self {
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: 45.0,
            near: 0.5,
            far: 1.0e17,
            viewport_width: 1280.0,
            viewport_height: 720.0,
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            combined: Mat4::IDENTITY,
        };
        camera.update();
        camera
    }
}

impl PerspectiveCamera {
    pub fn aspect(&self) -> f32 {
        if self.viewport_height > 0.0 {
            self.viewport_width / self.viewport_height
        } else {
            1.0
        }
    }

    /// Recompute projection, view and combined matrices
    pub fn update(&mut self) {
        self.projection =
            Mat4::perspective_rh(self.fov.to_radians(), self.aspect(), self.near, self.far);
        self.view = Mat4::look_to_rh(Vec3::ZERO, self.direction, self.up);
        self.combined = self.projection * self.view;
    }

    /// Build camera uniform data for shaders
    pub fn uniform_data(&self) -> CameraUniformData {
        CameraUniformData {
            view: self.view,
            proj: self.projection,
            view_proj: self.combined,
            inv_view: self.view.inverse(),
            inv_proj: self.projection.inverse(),
            position: Vec4::W,
            near_far: Vec4::new(self.near, self.far, 0.0, 0.0),
        }
    }
}

/// Camera uniform data for GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniformData {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view: Mat4,
    pub inv_proj: Mat4,
    pub position: Vec4,
    pub near_far: Vec4,
}

/// The scene camera
#[derive(Debug, Clone)]
pub struct Camera {
    /// Position in internal units
    pub pos: DVec3,
    pub direction: DVec3,
    pub up: DVec3,
    pub mode: CameraMode,
    /// Active aperture in field-of-view modes
    pub dir_index: usize,
    /// Object in focus, in focus mode
    pub focus: Option<BodyInfo>,
    /// Closest body to the camera
    pub closest_body: Option<BodyInfo>,
    pub camera: PerspectiveCamera,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            pos: DVec3::ZERO,
            direction: DVec3::NEG_Z,
            up: DVec3::Y,
            mode: CameraMode::Free,
            dir_index: 0,
            focus: None,
            closest_body: None,
            camera: PerspectiveCamera::default(),
        }
    }
}

impl Camera {
    pub fn new(pos: DVec3, direction: DVec3, up: DVec3) -> Self {
        Self {
            pos,
            direction: direction.normalize(),
            up: up.normalize(),
            ..Default::default()
        }
    }

    pub fn fov(&self) -> f32 {
        self.camera.fov
    }

    pub fn set_fov(&mut self, fov: f32) {
        self.camera.fov = fov;
        self.camera.update();
    }

    /// Get the right direction
    pub fn right(&self) -> DVec3 {
        self.direction.cross(self.up).normalize()
    }

    /// Copy direction and up into the perspective camera and refresh its matrices
    pub fn sync(&mut self) {
        self.camera.direction = self.direction.as_vec3();
        self.camera.up = self.up.as_vec3();
        self.camera.update();
    }

    /// Capture everything a multi-pass mode may perturb
    pub fn snapshot(&self) -> CameraSnapshot {
        CameraSnapshot {
            pos: self.pos,
            direction: self.direction,
            up: self.up,
            dir_index: self.dir_index,
            camera: self.camera.clone(),
        }
    }
}

/// Saved camera state
///
/// Field of view is part of the perspective camera, but modes that change it announce the
/// change on the event bus and restore it explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSnapshot {
    pub pos: DVec3,
    pub direction: DVec3,
    pub up: DVec3,
    pub dir_index: usize,
    pub camera: PerspectiveCamera,
}

impl CameraSnapshot {
    /// Put the camera back exactly as captured, keeping its current field of view
    pub fn restore(&self, camera: &mut Camera) {
        let fov = camera.camera.fov;
        camera.pos = self.pos;
        camera.direction = self.direction;
        camera.up = self.up;
        camera.dir_index = self.dir_index;
        camera.camera = self.camera.clone();
        camera.camera.fov = fov;
        camera.camera.update();
    }
}

/// Run `f` with the camera, restoring the captured state afterwards whatever `f` returned
pub fn with_camera_restored<R>(camera: &mut Camera, f: impl FnOnce(&mut Camera) -> R) -> R {
    let snapshot = camera.snapshot();
    let result = f(camera);
    snapshot.restore(camera);
    result
}
