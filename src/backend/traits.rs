//! Core backend abstraction traits
//!
//! The render graph talks to the GPU only through [`GraphicsBackend`]. Both the
//! wgpu backend and the command-recording backend implement it.

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
///
/// Every variant is a configuration error: a kernel, program or render target
/// that does not fit together. None of them is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to link program `{label}`: {log}")]
    ProgramLinkFailed { label: String, log: String },
    #[error("Uniform `{name}` not found in program `{program}`")]
    MissingUniform { program: String, name: String },
    #[error("Uniform `{name}` in program `{program}` does not accept {value}")]
    UniformTypeMismatch {
        program: String,
        name: String,
        value: String,
    },
    #[error("Sampler `{name}` in program `{program}` has no texture unit assigned")]
    UnassignedSampler { program: String, name: String },
    #[error("Render target is not complete: {0}")]
    IncompleteRenderTarget(String),
    #[error("Texture {0:?} is both sampled and written by the same draw")]
    ReadWriteHazard(TextureHandle),
    #[error("Unknown texture {0:?}")]
    UnknownTexture(TextureHandle),
    #[error("Unknown framebuffer {0:?}")]
    UnknownFramebuffer(FramebufferHandle),
    #[error("Unknown program {0:?}")]
    UnknownProgram(ProgramHandle),
    #[error("No render target bound")]
    NoRenderTargetBound,
    #[error("No program in use")]
    NoProgramBound,
    #[error("Texture upload of {actual} bytes does not match {expected} expected bytes")]
    UploadSizeMismatch { expected: usize, actual: usize },
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a framebuffer (a set of colour attachments drawn together)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferHandle(pub(crate) u64);

/// Handle to a linked full-screen program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub(crate) u64);

/// Location of a named uniform inside a program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    pub program: ProgramHandle,
    pub(crate) index: usize,
}

/// Maximum number of colour attachments a framebuffer may carry.
pub const MAX_COLOR_ATTACHMENTS: usize = 8;

/// Main graphics backend trait
///
/// The model is a bind-and-draw state machine: bind a render target, pick a
/// program, bind textures to units, set uniforms, draw, unbind. Implementations
/// must be object safe so kernels can take `&mut dyn GraphicsBackend`.
pub trait GraphicsBackend {
    /// Human readable backend name
    fn name(&self) -> &str;

    // Resource creation

    /// Create a texture usable both as a colour attachment and as a sampled input
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Replace the full contents of a texture with tightly packed pixel data
    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> BackendResult<()>;

    /// Create a framebuffer over the given attachments, in attachment order
    fn create_framebuffer(
        &mut self,
        label: &str,
        attachments: &[TextureHandle],
    ) -> BackendResult<FramebufferHandle>;

    /// Compile and link a full-screen program
    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle>;

    /// Look up a uniform declared by `program`
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    // Command recording

    /// Make `framebuffer` the draw destination
    fn bind_render_target(&mut self, framebuffer: FramebufferHandle) -> BackendResult<()>;

    /// Restore the default draw destination
    fn unbind_render_target(&mut self);

    /// Set viewport
    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32);

    /// Clear every attachment of the bound render target before the next draw
    fn clear(&mut self, color: [f32; 4]);

    /// Select the program used by the next draw
    fn use_program(&mut self, program: ProgramHandle) -> BackendResult<()>;

    /// Bind a texture to a texture unit
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) -> BackendResult<()>;

    /// Write a uniform of the program in use
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) -> BackendResult<()>;

    /// Draw non-indexed primitives into the bound render target
    fn draw(&mut self, vertices: std::ops::Range<u32>) -> BackendResult<()>;

    // Resource cleanup

    /// Destroy a framebuffer
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);
}
