//! Test doubles for render-mode tests

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use glam::{DVec3, Mat4, Vec3};

use crate::backend::{DummyBackend, FrameBufferHandle, GraphicsBackend};
use crate::events::EventManager;
use crate::postprocess::PostProcessor;
use crate::scene::{Camera, EntityId, SceneRenderer};
use crate::settings::Settings;

use super::vr::{DevicePose, Eye, VrDevice, VrDeviceId, VrError, VrEvent, VrRuntime, XrView};
use super::{CubemapSide, FrameContext, RenderError, RenderResult, RenderingContext};

/// What the scene renderer saw during one pass
#[derive(Debug, Clone)]
pub struct ScenePass {
    pub side: CubemapSide,
    pub width: u32,
    pub height: u32,
    pub frame_buffer: Option<FrameBufferHandle>,
    pub pos: DVec3,
    pub direction: DVec3,
    pub up: DVec3,
    pub fov: f32,
    pub aspect: f32,
    pub dir_index: usize,
    pub combined: Mat4,
    pub vr_offset: Option<DVec3>,
}

/// Scene renderer recording every call
#[derive(Debug, Default)]
pub struct RecordingScene {
    pub passes: Vec<ScenePass>,
    pub glow_passes: usize,
    pub overlays: usize,
    pub controllers: Vec<EntityId>,
    /// Fail every scene pass
    pub fail: bool,
    /// Fail once this many passes were recorded
    pub fail_after: Option<usize>,
}

impl SceneRenderer for RecordingScene {
    fn render_scene(
        &mut self,
        _backend: &mut dyn GraphicsBackend,
        camera: &Camera,
        _t: f64,
        rc: &RenderingContext,
    ) -> RenderResult<()> {
        if self.fail || self.fail_after.is_some_and(|n| self.passes.len() >= n) {
            return Err(RenderError::Scene("scene failure".into()));
        }
        self.passes.push(ScenePass {
            side: rc.cubemap_side,
            width: rc.width,
            height: rc.height,
            frame_buffer: rc.frame_buffer,
            pos: camera.pos,
            direction: camera.direction,
            up: camera.up,
            fov: camera.fov(),
            aspect: camera.camera.aspect(),
            dir_index: camera.dir_index,
            combined: camera.camera.combined,
            vr_offset: rc.vr_offset,
        });
        Ok(())
    }

    fn render_glow_pass(
        &mut self,
        _backend: &mut dyn GraphicsBackend,
        _camera: &Camera,
    ) -> RenderResult<()> {
        self.glow_passes += 1;
        Ok(())
    }

    fn render_camera_overlay(
        &mut self,
        _backend: &mut dyn GraphicsBackend,
        _camera: &Camera,
        _width: u32,
        _height: u32,
    ) -> RenderResult<()> {
        self.overlays += 1;
        Ok(())
    }

    fn extract_vr_controller(&mut self, entity: EntityId, _pose: &DevicePose) {
        self.controllers.push(entity);
    }
}

/// Headset with fixed matrices and scripted events
pub struct FakeVrRuntime {
    pub size: (u32, u32),
    pub fov: Option<f32>,
    /// Half the interpupillary distance, meters
    pub eye_offset: f32,
    pub pose: Option<DevicePose>,
    pub devices: Vec<VrDevice>,
    pub device_poses: HashMap<VrDeviceId, DevicePose>,
    pub pending: Vec<VrEvent>,
    pub views: Option<Vec<XrView>>,
    /// View index and buffer of every submission
    pub submitted: Rc<RefCell<Vec<(usize, FrameBufferHandle)>>>,
}

impl FakeVrRuntime {
    pub fn new() -> Self {
        Self {
            size: (1000, 1000),
            fov: None,
            eye_offset: 0.0,
            pose: Some(DevicePose::default()),
            devices: Vec::new(),
            device_poses: HashMap::new(),
            pending: Vec::new(),
            views: None,
            submitted: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl VrRuntime for FakeVrRuntime {
    fn poll_events(&mut self) -> Result<Vec<VrEvent>, VrError> {
        Ok(std::mem::take(&mut self.pending))
    }

    fn devices(&self) -> Vec<VrDevice> {
        self.devices.clone()
    }

    fn render_size(&self) -> (u32, u32) {
        self.size
    }

    fn hmd_fov_degrees(&self) -> Option<f32> {
        self.fov
    }

    fn projection(&self, _eye: Eye, near: f32, far: f32) -> Mat4 {
        Mat4::perspective_rh(100f32.to_radians(), 1.0, near, far)
    }

    fn eye_to_head(&self, eye: Eye) -> Mat4 {
        let x = match eye {
            Eye::Left => -self.eye_offset,
            Eye::Right => self.eye_offset,
        };
        Mat4::from_translation(Vec3::new(x, 0.0, 0.0))
    }

    fn hmd_pose(&self) -> Option<DevicePose> {
        self.pose
    }

    fn device_pose(&self, device: VrDeviceId) -> Option<DevicePose> {
        self.device_poses.get(&device).copied()
    }

    fn submit(
        &mut self,
        view: usize,
        _backend: &mut dyn GraphicsBackend,
        frame_buffer: FrameBufferHandle,
    ) -> Result<(), VrError> {
        self.submitted.borrow_mut().push((view, frame_buffer));
        Ok(())
    }

    fn views(&mut self) -> Option<Vec<XrView>> {
        self.views.clone()
    }
}

/// Everything a mode needs to render one frame against the dummy backend
pub struct Harness {
    pub backend: DummyBackend,
    pub scene: RecordingScene,
    pub post_process: PostProcessor,
    pub events: EventManager,
    pub settings: Settings,
}

impl Harness {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            backend: DummyBackend::new(width, height),
            scene: RecordingScene::default(),
            post_process: PostProcessor::new(),
            events: EventManager::new(),
            settings: Settings::default(),
        }
    }

    pub fn ctx(&mut self) -> FrameContext<'_> {
        FrameContext {
            backend: &mut self.backend,
            scene: &mut self.scene,
            post_process: &mut self.post_process,
            events: &self.events,
            settings: &self.settings,
        }
    }
}
