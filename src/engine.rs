//! Render engine: owns the modes and picks one per frame

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::backend::wgpu_backend::WgpuBackend;
use crate::backend::DummyBackend;
use crate::events::{CommandQueue, CommandSender, Event, EventManager};
use crate::postprocess::{PostProcess, PostProcessor};
use crate::process::{
    CubemapProjectionsMode, FovMode, FrameContext, MainMode, OpenVrMode, OpenXrMode,
    RenderMode, RenderModeKind, RenderProcess, RenderResult, RenderSize, StereoscopicMode,
    VrRuntime,
};
use crate::scene::{Camera, SceneRenderer};
use crate::settings::Settings;
use crate::{BackendType, RendererConfig};

/// Backend wrapper to abstract over different backends
pub enum Backend {
    Wgpu(WgpuBackend),
    Dummy(DummyBackend),
}

impl Backend {
    /// Create a new backend, blocking on device creation
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new(backend_type: BackendType, width: u32, height: u32) -> BackendResult<Self> {
        match backend_type {
            BackendType::Wgpu => Ok(Backend::Wgpu(WgpuBackend::new(width, height)?)),
            BackendType::Dummy => Ok(Backend::Dummy(DummyBackend::new(width, height))),
        }
    }

    pub async fn new_async(
        backend_type: BackendType,
        width: u32,
        height: u32,
    ) -> BackendResult<Self> {
        match backend_type {
            BackendType::Wgpu => Ok(Backend::Wgpu(WgpuBackend::new_async(width, height).await?)),
            BackendType::Dummy => Ok(Backend::Dummy(DummyBackend::new(width, height))),
        }
    }

    /// Get the wgpu backend (if using wgpu)
    pub fn as_wgpu(&self) -> Option<&WgpuBackend> {
        match self {
            Backend::Wgpu(b) => Some(b),
            _ => None,
        }
    }

    /// Get the dummy backend (if using it)
    pub fn as_dummy(&self) -> Option<&DummyBackend> {
        match self {
            Backend::Dummy(b) => Some(b),
            _ => None,
        }
    }
}

impl GraphicsBackend for Backend {
    fn name(&self) -> &'static str {
        match self {
            Backend::Wgpu(b) => b.name(),
            Backend::Dummy(b) => b.name(),
        }
    }

    fn screen_size(&self) -> (u32, u32) {
        match self {
            Backend::Wgpu(b) => b.screen_size(),
            Backend::Dummy(b) => b.screen_size(),
        }
    }

    fn resize_screen(&mut self, width: u32, height: u32) -> BackendResult<()> {
        match self {
            Backend::Wgpu(b) => b.resize_screen(width, height),
            Backend::Dummy(b) => b.resize_screen(width, height),
        }
    }

    fn create_frame_buffer(
        &mut self,
        desc: &FrameBufferDescriptor,
    ) -> BackendResult<FrameBufferHandle> {
        match self {
            Backend::Wgpu(b) => b.create_frame_buffer(desc),
            Backend::Dummy(b) => b.create_frame_buffer(desc),
        }
    }

    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferHandle) {
        match self {
            Backend::Wgpu(b) => b.destroy_frame_buffer(frame_buffer),
            Backend::Dummy(b) => b.destroy_frame_buffer(frame_buffer),
        }
    }

    fn frame_buffer_size(&self, frame_buffer: FrameBufferHandle) -> Option<(u32, u32)> {
        match self {
            Backend::Wgpu(b) => b.frame_buffer_size(frame_buffer),
            Backend::Dummy(b) => b.frame_buffer_size(frame_buffer),
        }
    }

    fn bind_frame_buffer(&mut self, frame_buffer: Option<FrameBufferHandle>) {
        match self {
            Backend::Wgpu(b) => b.bind_frame_buffer(frame_buffer),
            Backend::Dummy(b) => b.bind_frame_buffer(frame_buffer),
        }
    }

    fn bound_frame_buffer(&self) -> Option<FrameBufferHandle> {
        match self {
            Backend::Wgpu(b) => b.bound_frame_buffer(),
            Backend::Dummy(b) => b.bound_frame_buffer(),
        }
    }

    fn clear(&mut self, color: [f32; 4]) -> BackendResult<()> {
        match self {
            Backend::Wgpu(b) => b.clear(color),
            Backend::Dummy(b) => b.clear(color),
        }
    }

    fn set_viewport(&mut self, viewport: ViewportRect) {
        match self {
            Backend::Wgpu(b) => b.set_viewport(viewport),
            Backend::Dummy(b) => b.set_viewport(viewport),
        }
    }

    fn viewport(&self) -> Option<ViewportRect> {
        match self {
            Backend::Wgpu(b) => b.viewport(),
            Backend::Dummy(b) => b.viewport(),
        }
    }

    fn draw_fullscreen(&mut self, pass: &FullscreenPass) -> BackendResult<()> {
        match self {
            Backend::Wgpu(b) => b.draw_fullscreen(pass),
            Backend::Dummy(b) => b.draw_fullscreen(pass),
        }
    }

    fn blit(
        &mut self,
        src: FrameBufferHandle,
        dst: Option<FrameBufferHandle>,
        rect: ViewportRect,
        flip_y: bool,
    ) -> BackendResult<()> {
        match self {
            Backend::Wgpu(b) => b.blit(src, dst, rect, flip_y),
            Backend::Dummy(b) => b.blit(src, dst, rect, flip_y),
        }
    }

    fn reset_texture_unit(&mut self) {
        match self {
            Backend::Wgpu(b) => b.reset_texture_unit(),
            Backend::Dummy(b) => b.reset_texture_unit(),
        }
    }

    fn read_pixels(&mut self, frame_buffer: FrameBufferHandle) -> BackendResult<Vec<u8>> {
        match self {
            Backend::Wgpu(b) => b.read_pixels(frame_buffer),
            Backend::Dummy(b) => b.read_pixels(frame_buffer),
        }
    }
}

/// Fold a command into the settings it changes
pub fn apply_command(settings: &mut Settings, event: &Event) {
    let cubemap = &mut settings.program.modes.cubemap;
    match event {
        Event::CubemapCmd { active, projection } => {
            cubemap.active = *active;
            cubemap.projection = *projection;
        }
        Event::CubemapProjectionCmd(projection) | Event::PlanetariumProjectionCmd(projection) => {
            cubemap.projection = *projection;
        }
        Event::CubemapResolutionCmd(resolution) => cubemap.resolution = *resolution,
        Event::PlanetariumApertureCmd(aperture) => cubemap.planetarium.aperture = *aperture,
        Event::PlanetariumAngleCmd(angle) => cubemap.planetarium.angle = *angle,
        Event::IndexOfRefractionCmd(ior) => cubemap.celestial_sphere_index_of_refraction = *ior,
        Event::PlanetariumGeometryWarpFileCmd(path) => {
            cubemap.planetarium.spherical_mirror_warp = Some(path.clone());
        }
        Event::StereoscopicCmd(active) => settings.program.modes.stereo.active = *active,
        Event::StereoProfileCmd(profile) => settings.program.modes.stereo.profile = *profile,
        Event::FovCmd(fov) => settings.scene.camera.fov = *fov,
        _ => {}
    }
}

/// The render layer: settings, event bus, post-processing and one instance of every mode
pub struct RenderEngine {
    backend: Backend,
    settings: Settings,
    events: EventManager,
    commands: CommandQueue,
    post_process: PostProcessor,
    modes: Vec<RenderProcess>,
    active: Option<RenderModeKind>,
}

impl RenderEngine {
    /// Create an engine with a backend built from `config`
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new(config: &RendererConfig) -> RenderResult<Self> {
        let backend = Backend::new(config.backend, config.width, config.height)?;
        let mut settings = Settings::default();
        settings.graphics.back_buffer_scale = config.back_buffer_scale;
        Ok(Self::with_backend(backend, settings))
    }

    pub fn with_backend(backend: Backend, settings: Settings) -> Self {
        log::info!("Render engine on {} backend", backend.name());
        let modes = vec![
            RenderProcess::Main(MainMode::new()),
            RenderProcess::Fov(FovMode::new()),
            RenderProcess::CubemapProjections(CubemapProjectionsMode::new(&settings)),
            RenderProcess::Stereoscopic(StereoscopicMode::new(&settings)),
        ];
        Self {
            backend,
            settings,
            events: EventManager::new(),
            commands: CommandQueue::new(),
            post_process: PostProcessor::new(),
            modes,
            active: None,
        }
    }

    /// Drive an OpenVR headset from now on
    pub fn attach_openvr(&mut self, runtime: Box<dyn VrRuntime>) {
        self.detach_vr();
        let mode = OpenVrMode::new(runtime, &self.events);
        self.modes.push(RenderProcess::OpenVr(mode));
        self.settings.runtime.openvr = true;
    }

    /// Drive an OpenXR session from now on
    pub fn attach_openxr(&mut self, runtime: Box<dyn VrRuntime>) {
        self.detach_vr();
        let mode = OpenXrMode::new(runtime, &self.events);
        self.modes.push(RenderProcess::OpenXr(mode));
        self.settings.runtime.openxr = true;
    }

    /// Drop the headset mode, if any
    pub fn detach_vr(&mut self) {
        let backend = &mut self.backend;
        self.modes.retain_mut(|mode| {
            let vr = matches!(mode.kind(), RenderModeKind::OpenVr | RenderModeKind::OpenXr);
            if vr {
                mode.dispose(&mut *backend);
            }
            !vr
        });
        self.settings.runtime.openvr = false;
        self.settings.runtime.openxr = false;
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut Backend {
        &mut self.backend
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn events(&self) -> &EventManager {
        &self.events
    }

    pub fn post_process_mut(&mut self) -> &mut PostProcessor {
        &mut self.post_process
    }

    /// Handle for posting commands from other threads
    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    /// Mode used for the last frame
    pub fn active_mode(&self) -> Option<RenderModeKind> {
        self.active
    }

    /// Result buffer of the last frame, `None` if it went to the screen
    pub fn result_buffer(&self) -> Option<FrameBufferHandle> {
        let active = self.active?;
        self.modes
            .iter()
            .find(|mode| mode.kind() == active)
            .and_then(|mode| mode.result_buffer())
    }

    /// Apply queued commands and forward them to every mode
    pub fn process_commands(&mut self) -> RenderResult<()> {
        for event in self.commands.drain() {
            log::debug!("Command {:?}", event);
            apply_command(&mut self.settings, &event);
            for mode in &mut self.modes {
                mode.notify(&event, &self.settings, &mut self.backend, &self.events)?;
            }
        }
        Ok(())
    }

    /// Mode for the next frame given the current settings and camera
    pub fn select_mode(&self, camera: &Camera) -> RenderModeKind {
        let runtime = &self.settings.runtime;
        let has = |kind| self.modes.iter().any(|mode| mode.kind() == kind);
        if runtime.openxr && has(RenderModeKind::OpenXr) {
            RenderModeKind::OpenXr
        } else if runtime.openvr && has(RenderModeKind::OpenVr) {
            RenderModeKind::OpenVr
        } else if self.settings.cubemap().active {
            RenderModeKind::CubemapProjections
        } else if self.settings.stereo().active {
            RenderModeKind::Stereoscopic
        } else if camera.mode.is_fov() {
            RenderModeKind::Fov
        } else {
            RenderModeKind::Main
        }
    }

    /// Render one frame with whichever mode the settings call for
    pub fn render_frame(
        &mut self,
        scene: &mut dyn SceneRenderer,
        camera: &mut Camera,
        t: f64,
        size: RenderSize,
        fb: Option<FrameBufferHandle>,
    ) -> RenderResult<()> {
        self.process_commands()?;

        let kind = self.select_mode(camera);
        if self.active != Some(kind) {
            log::info!("Render mode {:?} -> {:?}", self.active, kind);
            self.active = Some(kind);
        }

        let Some(mode) = self.modes.iter_mut().find(|mode| mode.kind() == kind) else {
            return Ok(());
        };
        let mut ctx = FrameContext {
            backend: &mut self.backend,
            scene,
            post_process: &mut self.post_process,
            events: &self.events,
            settings: &self.settings,
        };
        mode.render(&mut ctx, camera, t, size, fb)
    }

    /// Forward a new window or render size to every mode
    pub fn resize(&mut self, size: RenderSize) -> RenderResult<()> {
        self.backend
            .resize_screen(size.target_width, size.target_height)?;
        for mode in &mut self.modes {
            mode.resize(&mut self.backend, &self.settings, size)?;
        }
        Ok(())
    }

    /// Release every GPU resource held by the modes and post-processing
    pub fn dispose(&mut self) {
        for mode in &mut self.modes {
            mode.dispose(&mut self.backend);
        }
        self.post_process.dispose(&mut self.backend);
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::{FakeVrRuntime, RecordingScene};
    use crate::scene::CameraMode;
    use crate::settings::{CubemapProjection, StereoProfile};

    fn engine() -> RenderEngine {
        RenderEngine::with_backend(
            Backend::Dummy(DummyBackend::new(1280, 720)),
            Settings::default(),
        )
    }

    fn frame(engine: &mut RenderEngine, camera: &mut Camera) -> RecordingScene {
        let mut scene = RecordingScene::default();
        engine
            .render_frame(&mut scene, camera, 0.0, RenderSize::uniform(1280, 720), None)
            .unwrap();
        scene
    }

    #[test]
    fn test_default_mode_is_main() {
        let mut engine = engine();
        let mut camera = Camera::default();
        let scene = frame(&mut engine, &mut camera);
        assert_eq!(engine.active_mode(), Some(RenderModeKind::Main));
        assert_eq!(scene.passes.len(), 1);
    }

    #[test]
    fn test_fov_camera_selects_fov_mode() {
        let engine = engine();
        let mut camera = Camera::default();
        camera.mode = CameraMode::FovBoth;
        assert_eq!(engine.select_mode(&camera), RenderModeKind::Fov);
    }

    #[test]
    fn test_commands_switch_modes() {
        let mut engine = engine();
        let sender = engine.command_sender();
        let mut camera = Camera::default();

        sender.post(Event::StereoscopicCmd(true));
        frame(&mut engine, &mut camera);
        assert_eq!(engine.active_mode(), Some(RenderModeKind::Stereoscopic));

        sender.post(Event::CubemapCmd {
            active: true,
            projection: CubemapProjection::Cylindrical,
        });
        sender.post(Event::CubemapResolutionCmd(32));
        frame(&mut engine, &mut camera);
        assert_eq!(engine.active_mode(), Some(RenderModeKind::CubemapProjections));
        assert_eq!(engine.settings().cubemap().projection, CubemapProjection::Cylindrical);

        sender.post(Event::CubemapCmd {
            active: false,
            projection: CubemapProjection::Cylindrical,
        });
        sender.post(Event::StereoscopicCmd(false));
        frame(&mut engine, &mut camera);
        assert_eq!(engine.active_mode(), Some(RenderModeKind::Main));
    }

    #[test]
    fn test_vr_wins_over_everything() {
        let mut engine = engine();
        engine.command_sender().post(Event::CubemapCmd {
            active: true,
            projection: CubemapProjection::Equirectangular,
        });
        engine.attach_openvr(Box::new(FakeVrRuntime::new()));
        let mut camera = Camera::default();

        frame(&mut engine, &mut camera);
        assert_eq!(engine.active_mode(), Some(RenderModeKind::OpenVr));

        engine.attach_openxr(Box::new(FakeVrRuntime::new()));
        assert!(!engine.settings().runtime.openvr);
        assert_eq!(engine.select_mode(&camera), RenderModeKind::OpenXr);

        engine.detach_vr();
        assert_eq!(engine.select_mode(&camera), RenderModeKind::CubemapProjections);
    }

    #[test]
    fn test_apply_command_updates_settings() {
        let mut settings = Settings::default();
        apply_command(&mut settings, &Event::PlanetariumApertureCmd(200.0));
        apply_command(&mut settings, &Event::PlanetariumAngleCmd(30.0));
        apply_command(&mut settings, &Event::IndexOfRefractionCmd(1.3));
        apply_command(&mut settings, &Event::StereoProfileCmd(StereoProfile::CrossEye));

        assert_eq!(settings.cubemap().planetarium.aperture, 200.0);
        assert_eq!(settings.cubemap().planetarium.angle, 30.0);
        assert_eq!(settings.cubemap().celestial_sphere_index_of_refraction, 1.3);
        assert_eq!(settings.stereo().profile, StereoProfile::CrossEye);
    }

    fn live_buffers(engine: &RenderEngine) -> usize {
        engine
            .backend()
            .as_dummy()
            .map_or(0, |b| b.live_frame_buffers())
    }

    #[test]
    fn test_repeated_resizes_keep_cubemap_memory_flat() {
        let mut engine = engine();
        let sender = engine.command_sender();
        sender.post(Event::CubemapCmd {
            active: true,
            projection: CubemapProjection::Equirectangular,
        });
        sender.post(Event::CubemapResolutionCmd(32));
        let mut camera = Camera::default();

        let mut live = Vec::new();
        for (w, h) in [(1280, 720), (1300, 740), (1320, 760), (1340, 780), (1360, 800)] {
            let size = RenderSize::uniform(w, h);
            engine.resize(size).unwrap();
            let mut scene = RecordingScene::default();
            engine
                .render_frame(&mut scene, &mut camera, 0.0, size, None)
                .unwrap();
            live.push(live_buffers(&engine));
        }

        assert_eq!(engine.active_mode(), Some(RenderModeKind::CubemapProjections));
        assert!(live.iter().all(|n| *n == live[0]), "{:?}", live);
    }

    #[test]
    fn test_resize_without_stereo_allocates_nothing() {
        let mut engine = engine();
        engine.resize(RenderSize::uniform(3840, 2160)).unwrap();
        assert_eq!(live_buffers(&engine), 0);

        engine.command_sender().post(Event::StereoscopicCmd(true));
        engine.process_commands().unwrap();
        engine.resize(RenderSize::uniform(1920, 1080)).unwrap();
        assert!(live_buffers(&engine) > 0);
    }

    #[test]
    fn test_minimized_window_skips_frame() {
        let mut engine = engine();
        engine.command_sender().post(Event::StereoscopicCmd(true));
        let mut camera = Camera::default();
        let mut scene = RecordingScene::default();

        engine
            .render_frame(&mut scene, &mut camera, 0.0, RenderSize::uniform(0, 0), None)
            .unwrap();

        assert_eq!(engine.active_mode(), Some(RenderModeKind::Stereoscopic));
        assert!(scene.passes.is_empty());
    }

    #[test]
    fn test_dispose_releases_all_buffers() {
        let mut engine = engine();
        engine.command_sender().post(Event::StereoscopicCmd(true));
        let mut camera = Camera::default();
        frame(&mut engine, &mut camera);

        engine.dispose();

        let live = engine.backend().as_dummy().map(|b| b.live_frame_buffers());
        assert_eq!(live, Some(0));
        assert_eq!(engine.result_buffer(), None);
    }
}
