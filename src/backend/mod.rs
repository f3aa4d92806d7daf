//! Backend abstraction layer
//!
//! Provides the host graphics API the render graph is written against, plus
//! two implementations: a headless wgpu backend and a command-recording
//! backend for tests.

pub mod recording;
pub mod traits;
pub mod types;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use recording::RecordingBackend;
pub use traits::*;
pub use types::*;

#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::WgpuBackend;
