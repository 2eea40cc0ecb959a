//! Head-mounted display support shared by the OpenVR and OpenXR modes
//!
//! The VR SDK itself stays behind [`VrRuntime`]: device enumeration, tracking, per-eye
//! matrices and compositor submission. Everything here only consumes what it returns.

use std::collections::HashMap;

use glam::{Mat4, Vec3, Vec4};
use thiserror::Error;

use crate::backend::{FrameBufferHandle, GraphicsBackend, ViewportRect};
use crate::events::{Event, EventManager};
use crate::scene::{Camera, EntityId, SceneRenderer, M_TO_U};

use super::{FrameContext, ModeBase, RenderResult};

/// VR error type
#[derive(Error, Debug)]
pub enum VrError {
    #[error("VR runtime error: {0}")]
    Runtime(String),
    #[error("No head-mounted display connected")]
    NoHmd,
    #[error("Failed to submit view {view}: {reason}")]
    SubmitFailed { view: usize, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    /// View index used for submission and buffer slots
    pub fn index(&self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }

    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            Eye::Left
        } else {
            Eye::Right
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VrDeviceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VrDeviceKind {
    Hmd,
    Controller,
    Other,
}

/// A tracked device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VrDevice {
    pub id: VrDeviceId,
    pub kind: VrDeviceKind,
}

impl VrDevice {
    pub fn new(id: u32, kind: VrDeviceKind) -> Self {
        Self {
            id: VrDeviceId(id),
            kind,
        }
    }

    pub fn is_controller(&self) -> bool {
        self.kind == VrDeviceKind::Controller
    }
}

/// Tracked pose in tracker space, meters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DevicePose {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
}

impl Default for DevicePose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
        }
    }
}

impl DevicePose {
    /// Rotation-only view matrix, the translation travels as the VR offset
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(Vec3::ZERO, self.direction, self.up)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VrEvent {
    DeviceConnected(VrDevice),
    DeviceDisconnected(VrDevice),
}

/// Field of view of one view as four half-angles in radians
///
/// Left and down are negative for a view centered on its axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XrFov {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

impl XrFov {
    pub fn symmetric(horizontal: f32, vertical: f32) -> Self {
        Self {
            angle_left: -horizontal / 2.0,
            angle_right: horizontal / 2.0,
            angle_up: vertical / 2.0,
            angle_down: -vertical / 2.0,
        }
    }

    /// Right-handed off-axis projection with a `[0, 1]` depth range
    pub fn projection(&self, near: f32, far: f32) -> Mat4 {
        let (tan_l, tan_r) = (self.angle_left.tan(), self.angle_right.tan());
        let (tan_u, tan_d) = (self.angle_up.tan(), self.angle_down.tan());
        let width = tan_r - tan_l;
        let height = tan_u - tan_d;
        let depth = far / (near - far);
        Mat4::from_cols(
            Vec4::new(2.0 / width, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0 / height, 0.0, 0.0),
            Vec4::new((tan_r + tan_l) / width, (tan_u + tan_d) / height, depth, -1.0),
            Vec4::new(0.0, 0.0, depth * near, 0.0),
        )
    }

    /// Vertical extent in degrees
    pub fn vertical_degrees(&self) -> f32 {
        (self.angle_up - self.angle_down).to_degrees()
    }
}

/// One view reported by an OpenXR session for the current frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XrView {
    pub pose: DevicePose,
    pub fov: XrFov,
}

/// Boundary to the VR SDK
pub trait VrRuntime {
    /// Drain pending device events
    fn poll_events(&mut self) -> Result<Vec<VrEvent>, VrError>;

    /// Devices known at start-up
    fn devices(&self) -> Vec<VrDevice>;

    /// Recommended per-eye render target size
    fn render_size(&self) -> (u32, u32);

    /// Vertical field of view of the headset, degrees
    fn hmd_fov_degrees(&self) -> Option<f32>;

    fn projection(&self, eye: Eye, near: f32, far: f32) -> Mat4;

    fn eye_to_head(&self, eye: Eye) -> Mat4;

    fn hmd_pose(&self) -> Option<DevicePose>;

    fn device_pose(&self, device: VrDeviceId) -> Option<DevicePose>;

    /// Hand a rendered view to the compositor
    fn submit(
        &mut self,
        view: usize,
        backend: &mut dyn GraphicsBackend,
        frame_buffer: FrameBufferHandle,
    ) -> Result<(), VrError>;

    /// Views to render this frame, `None` while the session does not track
    fn views(&mut self) -> Option<Vec<XrView>> {
        None
    }
}

/// Scene entities standing in for the connected controllers
#[derive(Debug, Default)]
pub struct VrControllers {
    entities: HashMap<VrDeviceId, EntityId>,
}

impl VrControllers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity for a newly connected controller
    pub fn connect(&mut self, device: &VrDevice, events: &EventManager) -> Option<EntityId> {
        if !device.is_controller() || self.entities.contains_key(&device.id) {
            return None;
        }
        let entity = EntityId::next();
        self.entities.insert(device.id, entity);
        log::info!("VR controller {:?} connected as {:?}", device.id, entity);
        events.publish(Event::SceneAddObject(entity));
        Some(entity)
    }

    pub fn disconnect(&mut self, device: &VrDevice, events: &EventManager) -> Option<EntityId> {
        if !device.is_controller() {
            return None;
        }
        let entity = self.entities.remove(&device.id)?;
        log::info!("VR controller {:?} disconnected", device.id);
        events.publish(Event::SceneRemoveObject(entity));
        Some(entity)
    }

    pub fn handle(&mut self, event: &VrEvent, events: &EventManager) {
        match event {
            VrEvent::DeviceConnected(device) => {
                events.publish(Event::VrDeviceConnected(*device));
                self.connect(device, events);
            }
            VrEvent::DeviceDisconnected(device) => {
                events.publish(Event::VrDeviceDisconnected(*device));
                self.disconnect(device, events);
            }
        }
    }

    pub fn entity(&self, device: VrDeviceId) -> Option<EntityId> {
        self.entities.get(&device).copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Queue every tracked controller model for this frame
    pub fn extract(&self, runtime: &dyn VrRuntime, scene: &mut dyn SceneRenderer) {
        let mut tracked: Vec<_> = self.entities.iter().collect();
        tracked.sort();
        for (device, entity) in tracked {
            if let Some(pose) = runtime.device_pose(*device) {
                scene.extract_vr_controller(*entity, &pose);
            }
        }
    }
}

/// A panel drawn inside the headset
pub trait VrGui {
    fn must_draw(&self) -> bool;

    fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        eye: Eye,
        width: u32,
        height: u32,
    ) -> RenderResult<()>;
}

/// The in-headset panels, drawn by priority
#[derive(Default)]
pub struct VrGuis {
    pub controller_hints: Option<Box<dyn VrGui>>,
    pub info: Option<Box<dyn VrGui>>,
    pub selection: Option<Box<dyn VrGui>>,
}

impl VrGuis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Controller hints hide everything else; info and selection may show together
    pub fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        eye: Eye,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        if let Some(hints) = self.controller_hints.as_mut().filter(|g| g.must_draw()) {
            return hints.render(backend, eye, width, height);
        }
        for gui in [self.info.as_mut(), self.selection.as_mut()]
            .into_iter()
            .flatten()
        {
            if gui.must_draw() {
                gui.render(backend, eye, width, height)?;
            }
        }
        Ok(())
    }
}

/// Largest rectangle of `src` aspect centered in `dst`
pub fn keep_aspect(src: (u32, u32), dst: (u32, u32)) -> ViewportRect {
    let (sw, sh) = (src.0 as f32, src.1 as f32);
    let (dw, dh) = (dst.0 as f32, dst.1 as f32);
    if sw <= 0.0 || sh <= 0.0 {
        return ViewportRect::full(dst.0, dst.1);
    }
    let scale = (dw / sw).min(dh / sh);
    let (w, h) = (sw * scale, sh * scale);
    ViewportRect::new((dw - w) / 2.0, (dh - h) / 2.0, w, h)
}

/// Point the camera along the head pose and load the eye matrices
pub(crate) fn apply_view(
    camera: &mut Camera,
    base: &mut ModeBase,
    pose: Option<DevicePose>,
    projection: Mat4,
    eye_to_head: Mat4,
    width: u32,
    height: u32,
) {
    let pose = pose.unwrap_or_default();
    base.rc.vr_offset = Some(pose.position.as_dvec3() * M_TO_U);
    camera.direction = pose.direction.as_dvec3();
    camera.up = pose.up.as_dvec3();

    let pc = &mut camera.camera;
    pc.direction = pose.direction;
    pc.up = pose.up;
    pc.viewport_width = width as f32;
    pc.viewport_height = height as f32;
    pc.projection = projection;
    pc.view = pose.view_matrix();
    pc.combined = projection * eye_to_head.inverse() * pc.view;
}

/// One headset view: glow, scene, overlay, panels and post-processing into `fb`
#[allow(clippy::too_many_arguments)]
pub(crate) fn render_view(
    base: &mut ModeBase,
    guis: &mut VrGuis,
    ctx: &mut FrameContext<'_>,
    camera: &Camera,
    t: f64,
    eye: Eye,
    fb: FrameBufferHandle,
    width: u32,
    height: u32,
) -> RenderResult<()> {
    ctx.scene.render_glow_pass(ctx.backend, camera)?;
    let captured = base.post_process_capture(ctx, Some(fb), width, height)?;

    let scene = base
        .render_scene(ctx, camera, t)
        .and_then(|_| {
            ctx.scene
                .render_camera_overlay(ctx.backend, camera, width, height)
        })
        .and_then(|_| guis.render(ctx.backend, eye, width, height));

    ModeBase::send_orientation_update(ctx.events, camera, width, height);
    let post = base.post_process_render(ctx, Some(fb), captured, camera, width, height);
    scene.and(post)
}
