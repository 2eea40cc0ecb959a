//! Backend abstraction layer
//!
//! Provides the frame-buffer level GPU interface render modes are written against,
//! with a headless wgpu implementation and a recording dummy for tests.

pub mod dummy;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use dummy::{BackendOp, DummyBackend};
pub use traits::*;
pub use types::*;
