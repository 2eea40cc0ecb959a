//! Runtime settings read by the render modes
//!
//! Plain structs with defaults. The engine owns one [`Settings`] and only mutates it on the
//! render thread, when it drains the command queue at the start of a frame.

use std::path::PathBuf;

/// Projection used to compose the six cube faces into one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CubemapProjection {
    #[default]
    Equirectangular,
    Cylindrical,
    Hammer,
    /// Celestial sphere seen from outside, with refraction
    Orthosphere,
    /// Fisheye dome master
    AzimuthalEquidistant,
    /// Fisheye warped for a spherical-mirror projector
    SphericalMirror,
}

impl CubemapProjection {
    pub fn is_planetarium(&self) -> bool {
        matches!(
            self,
            CubemapProjection::AzimuthalEquidistant | CubemapProjection::SphericalMirror
        )
    }

    pub fn is_panorama(&self) -> bool {
        matches!(
            self,
            CubemapProjection::Equirectangular
                | CubemapProjection::Cylindrical
                | CubemapProjection::Hammer
        )
    }

    /// Projection selector understood by the cubemap projection shader
    pub fn shader_id(&self) -> u32 {
        match self {
            CubemapProjection::Equirectangular => 0,
            CubemapProjection::Cylindrical => 1,
            CubemapProjection::Hammer => 2,
            CubemapProjection::Orthosphere => 3,
            CubemapProjection::AzimuthalEquidistant | CubemapProjection::SphericalMirror => 4,
        }
    }
}

/// How the two stereo views are presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StereoProfile {
    VrHeadset,
    Horizontal3dTv,
    Vertical3dTv,
    CrossEye,
    ParallelView,
    #[default]
    AnaglyphRedCyan,
    AnaglyphRedBlue,
}

impl StereoProfile {
    pub fn is_anaglyph(&self) -> bool {
        matches!(
            self,
            StereoProfile::AnaglyphRedCyan | StereoProfile::AnaglyphRedBlue
        )
    }

    /// Side-by-side layouts; everything else that is not anaglyph is stacked
    pub fn is_horizontal(&self) -> bool {
        matches!(
            self,
            StereoProfile::VrHeadset
                | StereoProfile::Horizontal3dTv
                | StereoProfile::CrossEye
                | StereoProfile::ParallelView
        )
    }

    /// 3D TV layouts stretch each half back to the full aspect ratio
    pub fn is_3d_tv(&self) -> bool {
        matches!(
            self,
            StereoProfile::Horizontal3dTv | StereoProfile::Vertical3dTv
        )
    }

    pub fn is_cross_eye(&self) -> bool {
        matches!(self, StereoProfile::CrossEye)
    }

    /// Channel selection for the anaglyph shader: 0 red/blue, 1 red/cyan
    pub fn anaglyph_mode(&self) -> u32 {
        match self {
            StereoProfile::AnaglyphRedBlue => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphicsSettings {
    /// Ratio between the back buffer and the window size
    pub back_buffer_scale: f32,
}

impl Default for GraphicsSettings {
    fn default() -> Self {
        Self {
            back_buffer_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlanetariumSettings {
    /// Dome opening angle in degrees
    pub aperture: f32,
    /// Angle between the view direction and the dome zenith, in degrees
    pub angle: f32,
    /// Warp mesh for the spherical mirror projection
    pub spherical_mirror_warp: Option<PathBuf>,
}

impl Default for PlanetariumSettings {
    fn default() -> Self {
        Self {
            aperture: 180.0,
            angle: 50.0,
            spherical_mirror_warp: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CubemapSettings {
    pub active: bool,
    pub projection: CubemapProjection,
    /// Side length of each cube face in pixels
    pub resolution: u32,
    pub planetarium: PlanetariumSettings,
    pub celestial_sphere_index_of_refraction: f32,
    /// Render every face as four 45 degree tiles
    pub subdivide_faces: bool,
}

impl Default for CubemapSettings {
    fn default() -> Self {
        Self {
            active: false,
            projection: CubemapProjection::Equirectangular,
            resolution: 1500,
            planetarium: PlanetariumSettings::default(),
            celestial_sphere_index_of_refraction: 1.0,
            subdivide_faces: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StereoSettings {
    pub active: bool,
    pub profile: StereoProfile,
    /// Interpupillary distance in meters, used when nothing is in focus
    pub ipd: f64,
}

impl Default for StereoSettings {
    fn default() -> Self {
        Self {
            active: false,
            profile: StereoProfile::AnaglyphRedCyan,
            ipd: 0.064,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModeSettings {
    pub cubemap: CubemapSettings,
    pub stereo: StereoSettings,
}

#[derive(Debug, Clone)]
pub struct UiSettings {
    pub scale: f32,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

#[derive(Debug, Clone)]
pub struct ScreenshotSettings {
    pub location: PathBuf,
}

impl Default for ScreenshotSettings {
    fn default() -> Self {
        Self {
            location: std::env::temp_dir(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgramSettings {
    pub modes: ModeSettings,
    pub ui: UiSettings,
    pub screenshot: ScreenshotSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Vertical field of view in degrees
    pub fov: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self { fov: 45.0 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SceneSettings {
    pub camera: CameraSettings,
}

/// Flags describing what is running right now, not persisted
#[derive(Debug, Clone, Default)]
pub struct RuntimeSettings {
    pub openvr: bool,
    pub openxr: bool,
}

impl RuntimeSettings {
    /// A head-mounted display owns the output
    pub fn hmd_active(&self) -> bool {
        self.openvr || self.openxr
    }
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub graphics: GraphicsSettings,
    pub program: ProgramSettings,
    pub scene: SceneSettings,
    pub runtime: RuntimeSettings,
}

impl Settings {
    /// Logical units per physical pixel for UI-scaled layouts
    pub fn units_per_pixel(&self) -> f32 {
        1.0 / self.program.ui.scale.max(f32::EPSILON)
    }

    pub fn cubemap(&self) -> &CubemapSettings {
        &self.program.modes.cubemap
    }

    pub fn stereo(&self) -> &StereoSettings {
        &self.program.modes.stereo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planetarium_projections() {
        assert!(CubemapProjection::AzimuthalEquidistant.is_planetarium());
        assert!(CubemapProjection::SphericalMirror.is_planetarium());
        assert!(!CubemapProjection::Equirectangular.is_planetarium());
        assert!(CubemapProjection::Hammer.is_panorama());
        assert!(!CubemapProjection::Orthosphere.is_panorama());
    }

    #[test]
    fn test_stereo_profiles() {
        assert!(StereoProfile::AnaglyphRedBlue.is_anaglyph());
        assert_eq!(StereoProfile::AnaglyphRedBlue.anaglyph_mode(), 0);
        assert_eq!(StereoProfile::AnaglyphRedCyan.anaglyph_mode(), 1);
        assert!(!StereoProfile::Vertical3dTv.is_horizontal());
        assert!(StereoProfile::Vertical3dTv.is_3d_tv());
        assert!(StereoProfile::CrossEye.is_horizontal());
        assert!(!StereoProfile::CrossEye.is_3d_tv());
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.cubemap().planetarium.aperture, 180.0);
        assert_eq!(settings.scene.camera.fov, 45.0);
        assert!(!settings.runtime.hmd_active());
        assert_eq!(settings.units_per_pixel(), 1.0);
    }
}
