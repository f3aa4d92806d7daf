//! Filter Graph - a render graph for multi-pass GPU image filters
//!
//! Effects are composed from reusable full-screen passes wired together as a
//! directed acyclic graph of typed nodes and sockets. The graph is executed
//! in topological order against a long-lived pool of render targets, and
//! every intermediate target goes back to the pool as soon as its last
//! consumer has run.
//!
//! # Layout
//! - [`backend`]: the host graphics API (`GraphicsBackend`), a headless wgpu
//!   implementation and a command-recording implementation for tests
//! - [`render_graph`]: render targets and their pool, the pass executor,
//!   sockets, nodes and the scheduler
//! - [`kernels`]: the compute kernels shipped with the crate
//! - [`effects`]: ready-made graphs for common effect selections
//! - [`engine`]: the long-lived owner of backend, pool and executor

pub mod backend;
pub mod effects;
pub mod engine;
pub mod kernels;
pub mod render_graph;

pub use backend::{GraphicsBackend, RecordingBackend, TextureFormat, TextureHandle};
#[cfg(feature = "wgpu-backend")]
pub use backend::WgpuBackend;
pub use effects::Effect;
pub use engine::FilterEngine;
pub use render_graph::{GraphError, GraphResult, NodeId, RenderTargetPool, ShaderGraph};

/// Adapter preference used when the wgpu backend picks a GPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerPreference {
    LowPower,
    #[default]
    HighPerformance,
}

/// Configuration for the filter engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Format of every pooled render target attachment
    pub target_format: TextureFormat,
    /// Colour each target is cleared to before a pass draws into it
    pub clear_color: [f32; 4],
    /// Which adapter the wgpu backend asks for
    pub power_preference: PowerPreference,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_format: TextureFormat::Rgba8Unorm,
            clear_color: [0.2, 0.2, 0.2, 1.0],
            power_preference: PowerPreference::HighPerformance,
        }
    }
}
