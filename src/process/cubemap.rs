//! Cube-face rendering shared by the cubemap projection modes
//!
//! The six faces are rendered with a 90 degree field of view around the camera, optionally
//! tilted towards a dome zenith first. Each face can also be split into four 45 degree
//! tiles that are composited back into the face buffer.

use glam::{DQuat, DVec3};

use crate::backend::{BackendResult, FrameBufferHandle, GraphicsBackend, ViewportRect};
use crate::events::Event;
use crate::postprocess::{FaceFrame, MosaicEffect};
use crate::scene::{with_camera_restored, Camera};

use super::{
    CubemapSide, FrameBufferCache, FrameBufferKey, FrameContext, ModeBase, RenderResult,
};

/// Field of view of a full cube face
pub const FACE_FOV: f32 = 90.0;
/// Field of view of one of the four tiles of a subdivided face
pub const TILE_FOV: f32 = 45.0;

/// The six faces of the cube
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    Right,
    Left,
    Up,
    Down,
    Front,
    Back,
}

impl CubeFace {
    /// Render order, which is also the input order of the projection effect
    pub const ALL: [CubeFace; 6] = [
        CubeFace::Right,
        CubeFace::Left,
        CubeFace::Up,
        CubeFace::Down,
        CubeFace::Front,
        CubeFace::Back,
    ];

    /// Frame buffer cache slot of the face
    pub fn slot(&self) -> u8 {
        match self {
            CubeFace::Front => 0,
            CubeFace::Back => 1,
            CubeFace::Right => 2,
            CubeFace::Left => 3,
            CubeFace::Up => 4,
            CubeFace::Down => 5,
        }
    }

    pub fn side(&self) -> CubemapSide {
        match self {
            CubeFace::Right => CubemapSide::Right,
            CubeFace::Left => CubemapSide::Left,
            CubeFace::Up => CubemapSide::Up,
            CubeFace::Down => CubemapSide::Down,
            CubeFace::Front => CubemapSide::Front,
            CubeFace::Back => CubemapSide::Back,
        }
    }

    /// File name suffix of the face in cubemap screenshots
    pub fn screenshot_suffix(&self) -> &'static str {
        match self {
            CubeFace::Front => "zp",
            CubeFace::Back => "zm",
            CubeFace::Right => "xp",
            CubeFace::Left => "xm",
            CubeFace::Up => "yp",
            CubeFace::Down => "ym",
        }
    }

    /// Direction and up of the face for a camera looking along `dir` with `up`.
    ///
    /// `side` is the camera's left axis, `-(dir x up)`.
    pub fn orient(&self, dir: DVec3, up: DVec3, side: DVec3) -> (DVec3, DVec3) {
        match self {
            CubeFace::Right => (rotate(dir, up, -90.0), up),
            CubeFace::Left => (rotate(dir, up, 90.0), up),
            CubeFace::Up => (rotate(dir, side, -90.0), rotate(up, side, -90.0)),
            CubeFace::Down => (rotate(dir, side, 90.0), rotate(up, side, 90.0)),
            CubeFace::Front => (dir, up),
            CubeFace::Back => (rotate(dir, up, 180.0), up),
        }
    }

    /// Face orientation for the unrotated camera (forward `+Z`, up `+Y`)
    pub fn frame(&self) -> FaceFrame {
        let (dir, up) = (DVec3::Z, DVec3::Y);
        let (forward, up) = self.orient(dir, up, side_axis(dir, up));
        FaceFrame {
            forward: forward.as_vec3(),
            up: up.as_vec3(),
        }
    }
}

/// Rotate `v` by `degrees` about `axis` (right-handed)
fn rotate(v: DVec3, axis: DVec3, degrees: f64) -> DVec3 {
    DQuat::from_axis_angle(axis.normalize(), degrees.to_radians()) * v
}

fn side_axis(dir: DVec3, up: DVec3) -> DVec3 {
    -dir.cross(up).normalize()
}

/// Which faces get rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CubemapFlags {
    pub right: bool,
    pub left: bool,
    pub up: bool,
    pub down: bool,
    pub front: bool,
    pub back: bool,
}

impl Default for CubemapFlags {
    fn default() -> Self {
        Self::all()
    }
}

impl CubemapFlags {
    pub fn all() -> Self {
        Self {
            right: true,
            left: true,
            up: true,
            down: true,
            front: true,
            back: true,
        }
    }

    pub fn is_enabled(&self, face: CubeFace) -> bool {
        match face {
            CubeFace::Right => self.right,
            CubeFace::Left => self.left,
            CubeFace::Up => self.up,
            CubeFace::Down => self.down,
            CubeFace::Front => self.front,
            CubeFace::Back => self.back,
        }
    }

    pub fn enabled_count(&self) -> usize {
        CubeFace::ALL.iter().filter(|f| self.is_enabled(**f)).count()
    }
}

#[derive(Debug, Clone, Copy)]
struct Tile {
    /// Rotation about the face up, positive towards the left
    yaw: f64,
    /// Rotation about the face side axis, negative towards the top
    pitch: f64,
    slot: u8,
}

/// Top-left, bottom-left, top-right, bottom-right
const TILES: [Tile; 4] = [
    Tile {
        yaw: 22.5,
        pitch: -22.5,
        slot: 10,
    },
    Tile {
        yaw: 22.5,
        pitch: 22.5,
        slot: 11,
    },
    Tile {
        yaw: -22.5,
        pitch: -22.5,
        slot: 12,
    },
    Tile {
        yaw: -22.5,
        pitch: 22.5,
        slot: 13,
    },
];

/// Renders the cube faces around the camera into cached frame buffers
#[derive(Debug)]
pub struct Cubemap {
    base: ModeBase,
    cache: FrameBufferCache,
    pub flags: CubemapFlags,
    /// Tilt of the view towards the dome zenith, degrees
    angle_from_zenith: f32,
    resolution: u32,
    mosaic: MosaicEffect,
}

impl Default for Cubemap {
    fn default() -> Self {
        Self::new()
    }
}

impl Cubemap {
    pub fn new() -> Self {
        Self {
            base: ModeBase::new(),
            cache: FrameBufferCache::new("Cubemap"),
            flags: CubemapFlags::all(),
            angle_from_zenith: 0.0,
            resolution: 0,
            mosaic: MosaicEffect::new(),
        }
    }

    pub fn set_planetarium_angle(&mut self, angle: f32) {
        self.angle_from_zenith = angle;
    }

    pub fn angle_from_zenith(&self) -> f32 {
        self.angle_from_zenith
    }

    /// Face orientations in render order, for the projection effect
    pub fn face_frames() -> [FaceFrame; 6] {
        CubeFace::ALL.map(|face| face.frame())
    }

    /// Cached frame buffer, created on first use
    pub fn get_frame_buffer(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        width: u32,
        height: u32,
        slot: u8,
    ) -> BackendResult<FrameBufferHandle> {
        self.cache
            .get(backend, FrameBufferKey::new(width, height, slot))
    }

    pub fn has_frame_buffer(&self, width: u32, height: u32, slot: u8) -> bool {
        self.cache.contains(&FrameBufferKey::new(width, height, slot))
    }

    /// Buffer of `face` from the last rendered cube
    pub fn face_buffer(&self, face: CubeFace) -> Option<FrameBufferHandle> {
        self.cache.peek(&FrameBufferKey::new(
            self.resolution,
            self.resolution,
            face.slot(),
        ))
    }

    /// Side length of the last rendered cube
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    fn face_buffers(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        wh: u32,
    ) -> BackendResult<[FrameBufferHandle; 6]> {
        Ok([
            self.get_frame_buffer(backend, wh, wh, CubeFace::Right.slot())?,
            self.get_frame_buffer(backend, wh, wh, CubeFace::Left.slot())?,
            self.get_frame_buffer(backend, wh, wh, CubeFace::Up.slot())?,
            self.get_frame_buffer(backend, wh, wh, CubeFace::Down.slot())?,
            self.get_frame_buffer(backend, wh, wh, CubeFace::Front.slot())?,
            self.get_frame_buffer(backend, wh, wh, CubeFace::Back.slot())?,
        ])
    }

    /// Render every enabled face at `wh` x `wh`.
    ///
    /// Returns the face buffers in [`CubeFace::ALL`] order. Disabled faces keep whatever
    /// their buffer held. The camera comes back with the direction, up and field of view it
    /// had on entry, also when a face fails.
    pub fn render_cubemap_sides(
        &mut self,
        ctx: &mut FrameContext<'_>,
        camera: &mut Camera,
        t: f64,
        wh: u32,
    ) -> RenderResult<[FrameBufferHandle; 6]> {
        let buffers = self.face_buffers(ctx.backend, wh)?;
        self.resolution = wh;

        let fov_backup = camera.fov();
        let face_fov = if ctx.settings.cubemap().subdivide_faces {
            TILE_FOV
        } else {
            FACE_FOV
        };
        camera.set_fov(face_fov);
        ctx.events.publish(Event::FovCmd(face_fov));

        let result = with_camera_restored(camera, |camera| {
            self.render_faces(ctx, camera, t, wh, &buffers)
        });

        self.base.rc.reset();
        ctx.backend.reset_texture_unit();
        camera.set_fov(fov_backup);
        ctx.events.publish(Event::FovCmd(fov_backup));

        result.map(|_| buffers)
    }

    fn render_faces(
        &mut self,
        ctx: &mut FrameContext<'_>,
        camera: &mut Camera,
        t: f64,
        wh: u32,
        buffers: &[FrameBufferHandle; 6],
    ) -> RenderResult<()> {
        let side = side_axis(camera.direction, camera.up);
        let zenith = -(self.angle_from_zenith as f64);
        let dir = rotate(camera.direction, side, zenith);
        let up = rotate(camera.up, side, zenith);

        for (face, fb) in CubeFace::ALL.into_iter().zip(buffers.iter().copied()) {
            if !self.flags.is_enabled(face) {
                continue;
            }
            log::trace!("Rendering cube face {:?}", face);
            self.base.rc.cubemap_side = face.side();
            let (face_dir, face_up) = face.orient(dir, up, side);
            if ctx.settings.cubemap().subdivide_faces {
                self.render_tiled_face(ctx, camera, t, face_dir, face_up, fb, wh)?;
            } else {
                camera.direction = face_dir;
                camera.up = face_up;
                ctx.scene.render_glow_pass(ctx.backend, camera)?;
                self.render_view(ctx, camera, t, fb, wh)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn render_tiled_face(
        &mut self,
        ctx: &mut FrameContext<'_>,
        camera: &mut Camera,
        t: f64,
        face_dir: DVec3,
        face_up: DVec3,
        fb: FrameBufferHandle,
        wh: u32,
    ) -> RenderResult<()> {
        let half = (wh / 2).max(1);
        let face_side = side_axis(face_dir, face_up);

        let mut tiles = Vec::with_capacity(TILES.len());
        for tile in TILES {
            let tile_fb = self.get_frame_buffer(ctx.backend, half, half, tile.slot)?;
            let yawed = rotate(face_dir, face_up, tile.yaw);
            let pitch_axis = rotate(face_side, face_up, tile.yaw);
            camera.direction = rotate(yawed, pitch_axis, tile.pitch);
            camera.up = rotate(face_up, pitch_axis, tile.pitch);

            ctx.scene.render_glow_pass(ctx.backend, camera)?;
            self.render_view(ctx, camera, t, tile_fb, half)?;
            tiles.push(tile_fb);
        }

        let tiles = [tiles[0], tiles[1], tiles[2], tiles[3]];
        self.mosaic.render(ctx.backend, tiles, Some(fb))?;
        Ok(())
    }

    /// One square pass into `fb`
    fn render_view(
        &mut self,
        ctx: &mut FrameContext<'_>,
        camera: &mut Camera,
        t: f64,
        fb: FrameBufferHandle,
        wh: u32,
    ) -> RenderResult<()> {
        let captured = self.base.post_process_capture(ctx, Some(fb), wh, wh)?;

        self.base.viewport.set_world_size(wh as f32, wh as f32);
        self.base.viewport.set_screen_bounds(ViewportRect::full(wh, wh));
        self.base.viewport.apply(ctx.backend, camera);

        let scene = self.base.render_scene(ctx, camera, t);
        ModeBase::send_orientation_update(ctx.events, camera, wh, wh);
        let post = self
            .base
            .post_process_render(ctx, Some(fb), captured, camera, wh, wh);
        scene.and(post)
    }

    /// Keys of the face and tile buffers of a `wh` x `wh` cube
    pub fn cube_keys(wh: u32) -> Vec<FrameBufferKey> {
        let half = (wh / 2).max(1);
        CubeFace::ALL
            .iter()
            .map(|face| FrameBufferKey::new(wh, wh, face.slot()))
            .chain(TILES.iter().map(|tile| FrameBufferKey::new(half, half, tile.slot)))
            .collect()
    }

    /// Destroy every buffer except those of the last rendered cube and `extra`
    pub fn retain_current(&mut self, backend: &mut dyn GraphicsBackend, extra: &[FrameBufferKey]) {
        let mut keep = Self::cube_keys(self.resolution);
        keep.extend_from_slice(extra);
        self.cache.retain_only(backend, &keep);
    }

    /// Drop every cached buffer unless the face buffers for `wh` already exist
    pub fn ensure_resolution(&mut self, backend: &mut dyn GraphicsBackend, wh: u32) {
        if !self.has_frame_buffer(wh, wh, 0) {
            self.cache.dispose(backend);
        }
    }

    pub fn dispose(&mut self, backend: &mut dyn GraphicsBackend) {
        self.cache.dispose(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendOp;
    use crate::process::testing::Harness;
    use crate::process::RenderError;
    use rstest::rstest;

    fn assert_close(a: DVec3, b: DVec3) {
        assert!((a - b).length() < 1e-9, "{:?} != {:?}", a, b);
    }

    #[rstest]
    #[case(CubeFace::Right, DVec3::X, DVec3::Y)]
    #[case(CubeFace::Left, DVec3::NEG_X, DVec3::Y)]
    #[case(CubeFace::Up, DVec3::Y, DVec3::Z)]
    #[case(CubeFace::Down, DVec3::NEG_Y, DVec3::NEG_Z)]
    #[case(CubeFace::Front, DVec3::NEG_Z, DVec3::Y)]
    #[case(CubeFace::Back, DVec3::Z, DVec3::Y)]
    fn test_face_orientation(#[case] face: CubeFace, #[case] dir: DVec3, #[case] up: DVec3) {
        let (d, u) = (DVec3::NEG_Z, DVec3::Y);
        let (face_dir, face_up) = face.orient(d, u, side_axis(d, u));
        assert_close(face_dir, dir);
        assert_close(face_up, up);
    }

    #[test]
    fn test_face_slots_distinct() {
        let mut slots: Vec<u8> = CubeFace::ALL.iter().map(|f| f.slot()).collect();
        slots.sort();
        assert_eq!(slots, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_face_frames_are_orthonormal() {
        for frame in Cubemap::face_frames() {
            assert!((frame.forward.length() - 1.0).abs() < 1e-5);
            assert!(frame.forward.dot(frame.up).abs() < 1e-5);
        }
    }

    #[test]
    fn test_renders_enabled_faces_in_order() {
        let mut h = Harness::new(1280, 720);
        let mut camera = Camera::default();
        let mut cubemap = Cubemap::new();
        cubemap.flags.back = false;

        cubemap
            .render_cubemap_sides(&mut h.ctx(), &mut camera, 0.0, 256)
            .unwrap();

        let sides: Vec<CubemapSide> = h.scene.passes.iter().map(|p| p.side).collect();
        assert_eq!(
            sides,
            vec![
                CubemapSide::Right,
                CubemapSide::Left,
                CubemapSide::Up,
                CubemapSide::Down,
                CubemapSide::Front,
            ]
        );
        assert!(h.scene.passes.iter().all(|p| p.fov == FACE_FOV));
        assert!(h.scene.passes.iter().all(|p| (p.width, p.height) == (256, 256)));
        assert_eq!(h.scene.glow_passes, 5);
    }

    #[test]
    fn test_camera_restored_after_faces() {
        let mut h = Harness::new(1280, 720);
        let mut camera = Camera::new(
            DVec3::new(5.0, 0.0, 1.0),
            DVec3::new(0.2, 0.3, -1.0),
            DVec3::Y,
        );
        camera.set_fov(60.0);
        let before = camera.snapshot();
        let rx = h.events.subscribe();
        let mut cubemap = Cubemap::new();
        cubemap.set_planetarium_angle(50.0);

        cubemap
            .render_cubemap_sides(&mut h.ctx(), &mut camera, 0.0, 128)
            .unwrap();

        assert_eq!(camera.direction, before.direction);
        assert_eq!(camera.up, before.up);
        assert_eq!(camera.pos, before.pos);
        assert_eq!(camera.fov(), 60.0);

        let fovs: Vec<f32> = rx
            .try_iter()
            .filter_map(|e| match e {
                Event::FovCmd(fov) => Some(fov),
                _ => None,
            })
            .collect();
        assert_eq!(fovs, vec![FACE_FOV, 60.0]);
    }

    #[test]
    fn test_camera_restored_when_face_fails() {
        let mut h = Harness::new(1280, 720);
        h.scene.fail_after = Some(2);
        let mut camera = Camera::default();
        let before = camera.snapshot();
        let mut cubemap = Cubemap::new();

        let result = cubemap.render_cubemap_sides(&mut h.ctx(), &mut camera, 0.0, 64);

        assert!(matches!(result, Err(RenderError::Scene(_))));
        assert_eq!(camera.direction, before.direction);
        assert_eq!(camera.up, before.up);
        assert_eq!(camera.fov(), before.camera.fov);
    }

    #[test]
    fn test_zenith_tilt_moves_front_face_up() {
        let mut h = Harness::new(1280, 720);
        let mut camera = Camera::default();
        let mut cubemap = Cubemap::new();
        cubemap.flags = CubemapFlags {
            right: false,
            left: false,
            up: false,
            down: false,
            front: true,
            back: false,
        };
        cubemap.set_planetarium_angle(90.0);

        cubemap
            .render_cubemap_sides(&mut h.ctx(), &mut camera, 0.0, 64)
            .unwrap();

        assert_eq!(h.scene.passes.len(), 1);
        assert_close(h.scene.passes[0].direction, DVec3::Y);
    }

    #[test]
    fn test_texture_unit_reset_after_faces() {
        let mut h = Harness::new(1280, 720);
        let mut camera = Camera::default();
        let mut cubemap = Cubemap::new();

        cubemap
            .render_cubemap_sides(&mut h.ctx(), &mut camera, 0.0, 64)
            .unwrap();

        assert!(matches!(
            h.backend.ops().last(),
            Some(BackendOp::ResetTextureUnit)
        ));
    }

    #[test]
    fn test_subdivided_faces_use_four_tiles() {
        let mut h = Harness::new(1280, 720);
        h.settings.program.modes.cubemap.subdivide_faces = true;
        let mut camera = Camera::default();
        camera.set_fov(70.0);
        let mut cubemap = Cubemap::new();

        cubemap
            .render_cubemap_sides(&mut h.ctx(), &mut camera, 0.0, 256)
            .unwrap();

        assert_eq!(h.scene.passes.len(), 24);
        assert!(h.scene.passes.iter().all(|p| p.fov == TILE_FOV));
        assert!(h.scene.passes.iter().all(|p| (p.width, p.height) == (128, 128)));
        let mosaics = h
            .backend
            .ops()
            .iter()
            .filter(|op| matches!(op, BackendOp::Fullscreen { label, .. } if label == "Mosaic"))
            .count();
        assert_eq!(mosaics, 6);
        assert_eq!(camera.fov(), 70.0);
    }

    #[test]
    fn test_ensure_resolution_drops_stale_buffers() {
        let mut h = Harness::new(1280, 720);
        let mut camera = Camera::default();
        let mut cubemap = Cubemap::new();
        cubemap
            .render_cubemap_sides(&mut h.ctx(), &mut camera, 0.0, 64)
            .unwrap();
        assert!(cubemap.face_buffer(CubeFace::Front).is_some());

        cubemap.ensure_resolution(&mut h.backend, 64);
        assert!(cubemap.has_frame_buffer(64, 64, 0));

        cubemap.ensure_resolution(&mut h.backend, 128);
        assert!(!cubemap.has_frame_buffer(64, 64, 0));
        assert!(cubemap.face_buffer(CubeFace::Front).is_none());
    }
}
