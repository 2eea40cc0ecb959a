//! Skyview Render - multi-mode render dispatch and view compositing
//!
//! A scene is drawn through one of several render modes, each of which renders it one or
//! more times per frame under its own camera setup and composites the passes:
//! - **Main**: a single view through post-processing
//! - **FOV**: one or both fields of view of an astrometric instrument
//! - **Cubemap projections**: six cube faces projected to a panorama, an orthosphere or a
//!   planetarium dome, optionally warped for a spherical-mirror projector
//! - **Stereoscopic**: anaglyph, 3D TV, cross-eye and parallel-view pairs
//! - **OpenVR / OpenXR**: per-eye rendering handed to a headset compositor
//!
//! The GPU is reached through the [`GraphicsBackend`](backend::GraphicsBackend) trait, with a
//! headless wgpu backend and a recording dummy backend for tests.

pub mod backend;
pub mod engine;
pub mod events;
pub mod postprocess;
pub mod process;
pub mod scene;
pub mod settings;

pub use backend::wgpu_backend::WgpuBackend;
pub use engine::{Backend, RenderEngine};
pub use events::{CommandSender, Event, EventManager};
pub use process::{
    RenderError, RenderMode, RenderModeKind, RenderProcess, RenderResult, RenderSize,
};
pub use scene::{Camera, SceneRenderer};
pub use settings::Settings;

/// Backend selection for the render engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendType {
    /// Headless wgpu backend
    #[default]
    Wgpu,
    /// Records commands without touching a GPU
    Dummy,
}

/// Configuration for initializing the render engine
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Initial screen width
    pub width: u32,
    /// Initial screen height
    pub height: u32,
    /// Which backend to use
    pub backend: BackendType,
    /// Ratio of back-buffer to window pixels
    pub back_buffer_scale: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            backend: BackendType::Wgpu,
            back_buffer_scale: 1.0,
        }
    }
}

/// Install the native logger, `info` unless `RUST_LOG` says otherwise
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
