//! World-to-screen viewport mapping

use crate::backend::{GraphicsBackend, ViewportRect};
use crate::scene::Camera;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewportKind {
    /// Keeps the world aspect and extends the world along one axis to fill the screen
    #[default]
    Extend,
    /// Maps the world onto the screen bounds regardless of aspect
    Stretch,
}

/// Viewport with a world size (what the camera sees) and screen bounds (where it lands)
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub kind: ViewportKind,
    pub world_width: f32,
    pub world_height: f32,
    pub screen: ViewportRect,
}

impl Viewport {
    pub fn new(kind: ViewportKind) -> Self {
        Self {
            kind,
            world_width: 1.0,
            world_height: 1.0,
            screen: ViewportRect::full(1, 1),
        }
    }

    pub fn extend() -> Self {
        Self::new(ViewportKind::Extend)
    }

    pub fn stretch() -> Self {
        Self::new(ViewportKind::Stretch)
    }

    pub fn set_world_size(&mut self, width: f32, height: f32) {
        self.world_width = width;
        self.world_height = height;
    }

    pub fn set_screen_size(&mut self, width: f32, height: f32) {
        self.screen.width = width;
        self.screen.height = height;
    }

    pub fn set_screen_bounds(&mut self, bounds: ViewportRect) {
        self.screen = bounds;
    }

    /// World size the camera ends up with
    pub fn effective_world_size(&self) -> (f32, f32) {
        match self.kind {
            ViewportKind::Stretch => (self.world_width, self.world_height),
            ViewportKind::Extend => {
                if self.world_width <= 0.0
                    || self.world_height <= 0.0
                    || self.screen.width <= 0.0
                    || self.screen.height <= 0.0
                {
                    return (self.world_width, self.world_height);
                }
                let scale = (self.screen.width / self.world_width)
                    .min(self.screen.height / self.world_height);
                (self.screen.width / scale, self.screen.height / scale)
            }
        }
    }

    /// Set the GPU viewport and size the camera projection to the world
    pub fn apply(&self, backend: &mut dyn GraphicsBackend, camera: &mut Camera) {
        let (width, height) = self.effective_world_size();
        camera.camera.viewport_width = width;
        camera.camera.viewport_height = height;
        camera.sync();
        backend.set_viewport(self.screen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    #[test]
    fn test_extend_keeps_world_when_aspects_match() {
        let mut vp = Viewport::extend();
        vp.set_world_size(1920.0, 1080.0);
        vp.set_screen_bounds(ViewportRect::full(1920, 1080));
        assert_eq!(vp.effective_world_size(), (1920.0, 1080.0));
    }

    #[test]
    fn test_extend_widens_world() {
        let mut vp = Viewport::extend();
        vp.set_world_size(100.0, 100.0);
        vp.set_screen_bounds(ViewportRect::full(200, 100));
        assert_eq!(vp.effective_world_size(), (200.0, 100.0));
    }

    #[test]
    fn test_stretch_keeps_world() {
        let mut vp = Viewport::stretch();
        vp.set_world_size(1920.0, 1080.0);
        vp.set_screen_bounds(ViewportRect::full(960, 1080));
        assert_eq!(vp.effective_world_size(), (1920.0, 1080.0));
    }

    #[test]
    fn test_apply_sets_camera_and_backend() {
        let mut backend = DummyBackend::default();
        let mut camera = Camera::default();
        let mut vp = Viewport::extend();
        vp.set_world_size(800.0, 400.0);
        vp.set_screen_bounds(ViewportRect::full(800, 400));

        vp.apply(&mut backend, &mut camera);

        assert_eq!(camera.camera.aspect(), 2.0);
        assert_eq!(backend.viewport(), Some(ViewportRect::full(800, 400)));
    }
}
