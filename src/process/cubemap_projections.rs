//! Panorama, orthosphere and planetarium modes built on the cube faces

use std::fmt::Display;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};

use crate::backend::{BackendError, FrameBufferHandle, GraphicsBackend, ViewportRect};
use crate::events::{Event, EventManager};
use crate::postprocess::{CubemapProjectionEffect, GeometryWarpEffect, WarpMesh};
use crate::scene::Camera;
use crate::settings::{CubemapProjection, Settings};

use super::{
    CubeFace, Cubemap, FrameBufferKey, FrameContext, RenderMode, RenderResult, RenderSize,
};

/// Cache slot of the composed image when rendering to the screen
const RESULT_SLOT: u8 = 6;
/// Cache slot of the unwarped fisheye for the spherical mirror
const MIDDLE_SLOT: u8 = 7;

/// `yyyyMMdd_HHmmss` prefix of cubemap screenshot names
pub fn screenshot_timestamp<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    time.format("%Y%m%d_%H%M%S").to_string()
}

/// Renders the cube faces and projects them into one image
pub struct CubemapProjectionsMode {
    cubemap: Cubemap,
    projection: CubemapProjection,
    projection_effect: CubemapProjectionEffect,
    geometry_warp: GeometryWarpEffect,
    result_buffer: Option<FrameBufferHandle>,
}

impl CubemapProjectionsMode {
    pub fn new(settings: &Settings) -> Self {
        let cubemap_settings = settings.cubemap();
        let mut projection_effect = CubemapProjectionEffect::new(Cubemap::face_frames());
        projection_effect.aperture = cubemap_settings.planetarium.aperture;
        projection_effect.index_of_refraction =
            cubemap_settings.celestial_sphere_index_of_refraction;

        let mut mode = Self {
            cubemap: Cubemap::new(),
            projection: cubemap_settings.projection,
            projection_effect,
            geometry_warp: GeometryWarpEffect::new(),
            result_buffer: None,
        };
        if let Some(path) = &cubemap_settings.planetarium.spherical_mirror_warp {
            if let Err(err) = mode.load_geometry_warp(path) {
                log::warn!("Could not load warp mesh {}: {}", path.display(), err);
            }
        }
        mode.set_projection(cubemap_settings.projection, settings);
        mode
    }

    pub fn projection(&self) -> CubemapProjection {
        self.projection
    }

    pub fn cubemap(&self) -> &Cubemap {
        &self.cubemap
    }

    pub fn aperture(&self) -> f32 {
        self.projection_effect.aperture
    }

    pub fn index_of_refraction(&self) -> f32 {
        self.projection_effect.index_of_refraction
    }

    /// Switch projection and work out which faces it needs
    pub fn set_projection(&mut self, projection: CubemapProjection, settings: &Settings) {
        self.projection = projection;
        self.projection_effect.projection = projection;

        let flags = &mut self.cubemap.flags;
        *flags = super::CubemapFlags::all();
        if projection.is_planetarium() {
            // The back face only shows up in domes wider than a hemisphere
            flags.back = self.projection_effect.aperture > 180.0;
            self.cubemap
                .set_planetarium_angle(settings.cubemap().planetarium.angle);
        } else {
            self.cubemap.set_planetarium_angle(0.0);
        }
        log::info!(
            "Cubemap projection {:?}, rendering {} faces",
            projection,
            self.cubemap.flags.enabled_count()
        );
    }

    pub fn load_geometry_warp(&mut self, path: &Path) -> RenderResult<()> {
        let mesh = WarpMesh::load(path)?;
        self.geometry_warp.set_mesh(&mesh);
        log::info!("Spherical mirror geometry warp initialized with {}", path.display());
        Ok(())
    }

    /// Write the six faces of the last cube as PNG files into `directory`
    pub fn save_faces(
        &self,
        backend: &mut dyn GraphicsBackend,
        directory: &Path,
    ) -> RenderResult<Vec<PathBuf>> {
        let stamp = screenshot_timestamp(&Local::now());
        std::fs::create_dir_all(directory)?;

        let mut written = Vec::with_capacity(CubeFace::ALL.len());
        for face in [
            CubeFace::Front,
            CubeFace::Back,
            CubeFace::Right,
            CubeFace::Left,
            CubeFace::Up,
            CubeFace::Down,
        ] {
            let Some(fb) = self.cubemap.face_buffer(face) else {
                continue;
            };
            let Some((width, height)) = backend.frame_buffer_size(fb) else {
                continue;
            };
            let pixels = backend.read_pixels(fb)?;
            let image = image::RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
                BackendError::ReadbackFailed(format!("short readback of {:?}", face))
            })?;
            let path = directory.join(format!(
                "{}_cubemap_{}.png",
                stamp,
                face.screenshot_suffix()
            ));
            image.save(&path)?;
            written.push(path);
        }
        log::info!(
            "Cubemap screenshot saved to {}",
            directory.join(format!("{}_cubemap_[...]", stamp)).display()
        );
        Ok(written)
    }
}

impl RenderMode for CubemapProjectionsMode {
    fn render(
        &mut self,
        ctx: &mut FrameContext<'_>,
        camera: &mut Camera,
        t: f64,
        size: RenderSize,
        fb: Option<FrameBufferHandle>,
    ) -> RenderResult<()> {
        let RenderSize {
            render_width: rw,
            render_height: rh,
            target_width: tw,
            target_height: th,
        } = size;
        if rw == 0 || rh == 0 {
            log::trace!("Skipping cubemap frame of zero size");
            return Ok(());
        }

        let resolution = ctx.settings.cubemap().resolution;
        let faces = self
            .cubemap
            .render_cubemap_sides(ctx, camera, t, resolution)?;

        let result = match fb {
            Some(fb) => fb,
            None => self
                .cubemap
                .get_frame_buffer(ctx.backend, rw, rh, RESULT_SLOT)?,
        };
        let viewport = ViewportRect::full(tw, th);

        if self.projection == CubemapProjection::SphericalMirror && self.geometry_warp.has_mesh() {
            let middle = self
                .cubemap
                .get_frame_buffer(ctx.backend, rw, rh, MIDDLE_SLOT)?;
            self.projection_effect
                .render(ctx.backend, faces, Some(middle), viewport)?;
            self.geometry_warp
                .render(ctx.backend, middle, Some(result), viewport)?;
        } else {
            self.projection_effect
                .render(ctx.backend, faces, Some(result), viewport)?;
        }

        if fb.is_none() {
            let (sw, sh) = ctx.backend.screen_size();
            ctx.backend
                .blit(result, None, ViewportRect::full(sw, sh), false)?;
        }
        self.result_buffer = Some(result);
        Ok(())
    }

    fn resize(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        settings: &Settings,
        size: RenderSize,
    ) -> RenderResult<()> {
        if !settings.cubemap().active {
            self.dispose(backend);
            return Ok(());
        }
        let (rw, rh) = (size.render_width, size.render_height);
        self.cubemap.retain_current(
            backend,
            &[
                FrameBufferKey::new(rw, rh, RESULT_SLOT),
                FrameBufferKey::new(rw, rh, MIDDLE_SLOT),
            ],
        );
        if self
            .result_buffer
            .is_some_and(|fb| backend.frame_buffer_size(fb).is_none())
        {
            self.result_buffer = None;
        }
        Ok(())
    }

    fn dispose(&mut self, backend: &mut dyn GraphicsBackend) {
        self.cubemap.dispose(backend);
        self.result_buffer = None;
    }

    fn result_buffer(&self) -> Option<FrameBufferHandle> {
        self.result_buffer
    }

    fn notify(
        &mut self,
        event: &Event,
        settings: &Settings,
        backend: &mut dyn GraphicsBackend,
        _events: &EventManager,
    ) -> RenderResult<()> {
        if settings.runtime.openxr {
            return Ok(());
        }
        match event {
            Event::CubemapCmd { projection, .. }
            | Event::CubemapProjectionCmd(projection)
            | Event::PlanetariumProjectionCmd(projection) => {
                self.set_projection(*projection, settings);
            }
            Event::CubemapResolutionCmd(resolution) => {
                self.cubemap.ensure_resolution(backend, *resolution);
                if self
                    .result_buffer
                    .is_some_and(|fb| backend.frame_buffer_size(fb).is_none())
                {
                    self.result_buffer = None;
                }
            }
            Event::PlanetariumApertureCmd(aperture) => {
                self.projection_effect.aperture = *aperture;
                self.set_projection(settings.cubemap().projection, settings);
            }
            Event::PlanetariumAngleCmd(angle) => {
                if self.projection.is_planetarium() {
                    self.cubemap.set_planetarium_angle(*angle);
                }
            }
            Event::IndexOfRefractionCmd(ior) => {
                self.projection_effect.index_of_refraction = *ior;
            }
            Event::PlanetariumGeometryWarpFileCmd(path) => {
                if let Err(err) = self.load_geometry_warp(path) {
                    log::warn!("Could not load warp mesh {}: {}", path.display(), err);
                }
            }
            Event::ScreenshotCubemapCmd(directory) => {
                if settings.cubemap().active {
                    self.save_faces(backend, directory)?;
                } else {
                    log::warn!("Cubemap screenshots need the cubemap mode to be active");
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendOp;
    use crate::postprocess::PostProcessor;
    use crate::process::testing::Harness;
    use rstest::rstest;

    fn planetarium_settings(aperture: f32) -> Settings {
        let mut settings = Settings::default();
        let cubemap = &mut settings.program.modes.cubemap;
        cubemap.active = true;
        cubemap.projection = CubemapProjection::AzimuthalEquidistant;
        cubemap.planetarium.aperture = aperture;
        cubemap.resolution = 64;
        settings
    }

    #[rstest]
    #[case(170.0, false)]
    #[case(180.0, false)]
    #[case(200.0, true)]
    fn test_back_face_follows_aperture(#[case] aperture: f32, #[case] back: bool) {
        let mode = CubemapProjectionsMode::new(&planetarium_settings(aperture));
        assert_eq!(mode.cubemap().flags.back, back);
        assert_eq!(mode.cubemap().angle_from_zenith(), 50.0);
    }

    #[rstest]
    #[case(CubemapProjection::Equirectangular, 6)]
    #[case(CubemapProjection::Cylindrical, 6)]
    #[case(CubemapProjection::Hammer, 6)]
    #[case(CubemapProjection::Orthosphere, 6)]
    fn test_non_planetarium_face_count(#[case] projection: CubemapProjection, #[case] faces: usize) {
        let mut settings = Settings::default();
        settings.program.modes.cubemap.projection = projection;
        let mode = CubemapProjectionsMode::new(&settings);
        assert_eq!(mode.cubemap().flags.enabled_count(), faces);
        assert_eq!(mode.cubemap().angle_from_zenith(), 0.0);
    }

    #[rstest]
    #[case(170.0, 5)]
    #[case(200.0, 6)]
    fn test_planetarium_renders_faces(#[case] aperture: f32, #[case] passes: usize) {
        let mut h = Harness::new(640, 480);
        h.settings = planetarium_settings(aperture);
        let mut mode = CubemapProjectionsMode::new(&h.settings);
        let mut camera = Camera::default();

        mode.render(&mut h.ctx(), &mut camera, 0.0, RenderSize::uniform(640, 480), None)
            .unwrap();

        assert_eq!(h.scene.passes.len(), passes);
        let result = mode.result_buffer().unwrap();
        assert_eq!(h.backend.frame_buffer_size(result), Some((640, 480)));
        assert!(h
            .backend
            .ops()
            .iter()
            .any(|op| matches!(op, BackendOp::Blit { src, dst: None, .. } if *src == result)));
    }

    #[test]
    fn test_aperture_command_updates_back_face() {
        let mut h = Harness::new(640, 480);
        h.settings = planetarium_settings(170.0);
        let mut mode = CubemapProjectionsMode::new(&h.settings);
        assert!(!mode.cubemap().flags.back);

        h.settings.program.modes.cubemap.planetarium.aperture = 220.0;
        mode.notify(
            &Event::PlanetariumApertureCmd(220.0),
            &h.settings,
            &mut h.backend,
            &h.events,
        )
        .unwrap();

        assert!(mode.cubemap().flags.back);
        assert_eq!(mode.aperture(), 220.0);
    }

    #[test]
    fn test_commands_ignored_under_openxr() {
        let mut h = Harness::new(640, 480);
        h.settings.runtime.openxr = true;
        let mut mode = CubemapProjectionsMode::new(&h.settings);

        mode.notify(
            &Event::CubemapProjectionCmd(CubemapProjection::Orthosphere),
            &h.settings,
            &mut h.backend,
            &h.events,
        )
        .unwrap();

        assert_eq!(mode.projection(), CubemapProjection::Equirectangular);
    }

    #[test]
    fn test_angle_only_applies_to_planetarium() {
        let mut h = Harness::new(640, 480);
        let mut mode = CubemapProjectionsMode::new(&h.settings);

        mode.notify(&Event::PlanetariumAngleCmd(30.0), &h.settings, &mut h.backend, &h.events)
            .unwrap();
        assert_eq!(mode.cubemap().angle_from_zenith(), 0.0);

        mode.set_projection(CubemapProjection::SphericalMirror, &h.settings);
        mode.notify(&Event::PlanetariumAngleCmd(30.0), &h.settings, &mut h.backend, &h.events)
            .unwrap();
        assert_eq!(mode.cubemap().angle_from_zenith(), 30.0);
    }

    #[test]
    fn test_resolution_change_disposes_faces() {
        let mut h = Harness::new(640, 480);
        h.settings = planetarium_settings(180.0);
        let mut mode = CubemapProjectionsMode::new(&h.settings);
        let mut camera = Camera::default();
        mode.render(&mut h.ctx(), &mut camera, 0.0, RenderSize::uniform(640, 480), None)
            .unwrap();

        mode.notify(&Event::CubemapResolutionCmd(64), &h.settings, &mut h.backend, &h.events)
            .unwrap();
        assert!(mode.cubemap().has_frame_buffer(64, 64, 0));

        mode.notify(&Event::CubemapResolutionCmd(128), &h.settings, &mut h.backend, &h.events)
            .unwrap();
        assert!(!mode.cubemap().has_frame_buffer(64, 64, 0));
        assert!(mode.result_buffer().is_none());
    }

    #[test]
    fn test_spherical_mirror_warps_through_middle_buffer() {
        let mut h = Harness::new(320, 240);
        h.settings = planetarium_settings(180.0);
        h.settings.program.modes.cubemap.projection = CubemapProjection::SphericalMirror;
        let mut mode = CubemapProjectionsMode::new(&h.settings);
        mode.geometry_warp.set_mesh(&WarpMesh::identity(4, 4));
        let mut camera = Camera::default();
        let target = h
            .backend
            .create_frame_buffer(&crate::backend::FrameBufferDescriptor::new("out", 320, 240))
            .unwrap();

        mode.render(&mut h.ctx(), &mut camera, 0.0, RenderSize::uniform(320, 240), Some(target))
            .unwrap();

        let labels: Vec<(String, Option<FrameBufferHandle>)> = h
            .backend
            .ops()
            .iter()
            .filter_map(|op| match op {
                BackendOp::Fullscreen { label, target, .. }
                    if label == "Cubemap projection" || label == "Geometry warp" =>
                {
                    Some((label.clone(), *target))
                }
                _ => None,
            })
            .collect();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].0, "Cubemap projection");
        assert_ne!(labels[0].1, Some(target));
        assert_eq!(labels[1], ("Geometry warp".to_string(), Some(target)));
        assert_eq!(mode.result_buffer(), Some(target));
    }

    #[test]
    fn test_resize_keeps_only_current_buffers() {
        let mut h = Harness::new(640, 480);
        h.settings = planetarium_settings(200.0);
        h.post_process = PostProcessor::disabled();
        let mut mode = CubemapProjectionsMode::new(&h.settings);
        let mut camera = Camera::default();

        for (w, ht) in [(640, 480), (800, 600), (1024, 768), (1280, 720), (1920, 1080)] {
            let size = RenderSize::uniform(w, ht);
            h.backend.resize_screen(w, ht).unwrap();
            mode.resize(&mut h.backend, &h.settings, size).unwrap();
            mode.render(&mut h.ctx(), &mut camera, 0.0, size, None).unwrap();
            assert_eq!(h.backend.live_frame_buffers(), 7);
        }

        let result = mode.result_buffer().unwrap();
        assert_eq!(h.backend.frame_buffer_size(result), Some((1920, 1080)));
        assert!(mode.cubemap().has_frame_buffer(64, 64, 0));
        assert!(!mode.cubemap().has_frame_buffer(640, 480, RESULT_SLOT));
    }

    #[test]
    fn test_resize_drops_result_buffer_it_destroyed() {
        let mut h = Harness::new(640, 480);
        h.settings = planetarium_settings(180.0);
        let mut mode = CubemapProjectionsMode::new(&h.settings);
        let mut camera = Camera::default();
        mode.render(&mut h.ctx(), &mut camera, 0.0, RenderSize::uniform(640, 480), None)
            .unwrap();

        mode.resize(&mut h.backend, &h.settings, RenderSize::uniform(800, 600))
            .unwrap();

        assert!(mode.result_buffer().is_none());
        assert!(mode.cubemap().has_frame_buffer(64, 64, 0));
    }

    #[test]
    fn test_resize_while_inactive_releases_cube() {
        let mut h = Harness::new(640, 480);
        h.settings = planetarium_settings(180.0);
        h.post_process = PostProcessor::disabled();
        let mut mode = CubemapProjectionsMode::new(&h.settings);
        let mut camera = Camera::default();
        mode.render(&mut h.ctx(), &mut camera, 0.0, RenderSize::uniform(640, 480), None)
            .unwrap();

        h.settings.program.modes.cubemap.active = false;
        mode.resize(&mut h.backend, &h.settings, RenderSize::uniform(800, 600))
            .unwrap();

        assert_eq!(h.backend.live_frame_buffers(), 0);
    }

    #[test]
    fn test_zero_size_frame_is_skipped() {
        let mut h = Harness::new(640, 480);
        h.settings = planetarium_settings(180.0);
        let mut mode = CubemapProjectionsMode::new(&h.settings);
        let mut camera = Camera::default();

        mode.render(&mut h.ctx(), &mut camera, 0.0, RenderSize::uniform(0, 0), None)
            .unwrap();

        assert!(h.scene.passes.is_empty());
        assert_eq!(h.backend.live_frame_buffers(), 0);
        assert!(mode.result_buffer().is_none());
    }

    #[test]
    fn test_screenshot_timestamp_format() {
        let time = chrono::Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        assert_eq!(screenshot_timestamp(&time), "20261016_120000");
    }

    #[test]
    fn test_screenshot_writes_six_faces() {
        let mut h = Harness::new(320, 240);
        h.settings = planetarium_settings(200.0);
        let mut mode = CubemapProjectionsMode::new(&h.settings);
        let mut camera = Camera::default();
        mode.render(&mut h.ctx(), &mut camera, 0.0, RenderSize::uniform(320, 240), None)
            .unwrap();

        let dir = std::env::temp_dir().join(format!("skyview-cubemap-{}", std::process::id()));
        let written = mode.save_faces(&mut h.backend, &dir).unwrap();

        assert_eq!(written.len(), 6);
        for (path, suffix) in written.iter().zip(["zp", "zm", "xp", "xm", "yp", "ym"]) {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            let (stamp, rest) = name.split_at(15);
            assert_eq!(rest, format!("_cubemap_{}.png", suffix));
            assert!(stamp.chars().enumerate().all(|(i, c)| if i == 8 {
                c == '_'
            } else {
                c.is_ascii_digit()
            }));
            assert!(path.exists());
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
