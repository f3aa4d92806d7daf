//! The single-pass execution primitive

use crate::backend::*;
use crate::render_graph::pool::RenderTarget;
use glam::Vec2;

/// Vertex count of the full-screen quad (two triangles)
pub const QUAD_VERTEX_COUNT: u32 = 6;

/// Uniform the executor fills with the viewport size when a program declares it
pub const RESOLUTION_UNIFORM: &str = "u_resolution";

/// One full-screen draw
#[derive(Debug, Clone, Copy)]
pub struct FullscreenPass<'a> {
    pub label: &'a str,
    pub program: ProgramHandle,
    /// Bound to texture units in order: `inputs[i]` lands on unit `i`
    pub inputs: &'a [TextureHandle],
    pub width: u32,
    pub height: u32,
}

/// Writes named uniforms of the program in use.
///
/// Looking up a name the program does not declare is a
/// [`BackendError::MissingUniform`].
pub struct UniformSetter<'a> {
    backend: &'a mut dyn GraphicsBackend,
    program: ProgramHandle,
    label: &'a str,
}

impl<'a> UniformSetter<'a> {
    fn location(&self, name: &str) -> BackendResult<UniformLocation> {
        self.backend
            .uniform_location(self.program, name)
            .ok_or_else(|| BackendError::MissingUniform {
                program: self.label.to_string(),
                name: name.to_string(),
            })
    }

    pub fn set(&mut self, name: &str, value: UniformValue) -> BackendResult<()> {
        let location = self.location(name)?;
        self.backend.set_uniform(location, value)
    }

    pub fn set_int(&mut self, name: &str, value: i32) -> BackendResult<()> {
        self.set(name, UniformValue::Int(value))
    }

    pub fn set_float(&mut self, name: &str, value: f32) -> BackendResult<()> {
        self.set(name, UniformValue::Float(value))
    }

    pub fn set_vec2(&mut self, name: &str, value: Vec2) -> BackendResult<()> {
        self.set(name, UniformValue::Vec2(value))
    }

    pub fn set_vec4(&mut self, name: &str, value: glam::Vec4) -> BackendResult<()> {
        self.set(name, UniformValue::Vec4(value))
    }

    pub fn set_float_array(&mut self, name: &str, values: &[f32]) -> BackendResult<()> {
        self.set(name, UniformValue::FloatArray(values.to_vec()))
    }

    /// Declare that the logical input `name` reads texture unit `unit`
    pub fn set_texture_unit(&mut self, name: &str, unit: u32) -> BackendResult<()> {
        self.set(name, UniformValue::TextureUnit(unit))
    }

    /// Whether the program in use declares `name`
    pub fn declares(&self, name: &str) -> bool {
        self.backend.uniform_location(self.program, name).is_some()
    }
}

/// Binds a target, binds inputs, lets the caller configure uniforms,
/// draws the full-screen quad once and unbinds.
#[derive(Debug, Clone)]
pub struct PassExecutor {
    clear_color: [f32; 4],
}

impl PassExecutor {
    pub fn new(clear_color: [f32; 4]) -> Self {
        Self { clear_color }
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Run one pass. Any error is fatal for the pass; the target is
    /// unbound on every path.
    pub fn run<F>(
        &self,
        backend: &mut dyn GraphicsBackend,
        pass: FullscreenPass<'_>,
        target: &RenderTarget,
        configure: F,
    ) -> BackendResult<()>
    where
        F: FnOnce(&mut UniformSetter<'_>) -> BackendResult<()>,
    {
        log::trace!(
            "PassExecutor: `{}` {}x{} into {:?}",
            pass.label,
            pass.width,
            pass.height,
            target.id
        );

        target.bind(backend)?;
        let result = self.draw(backend, pass, configure);
        target.unbind(backend);
        result
    }

    fn draw<F>(
        &self,
        backend: &mut dyn GraphicsBackend,
        pass: FullscreenPass<'_>,
        configure: F,
    ) -> BackendResult<()>
    where
        F: FnOnce(&mut UniformSetter<'_>) -> BackendResult<()>,
    {
        backend.set_viewport(0, 0, pass.width, pass.height);
        backend.clear(self.clear_color);
        backend.use_program(pass.program)?;
        for (unit, texture) in pass.inputs.iter().enumerate() {
            backend.bind_texture(unit as u32, *texture)?;
        }

        {
            let mut uniforms = UniformSetter {
                backend: &mut *backend,
                program: pass.program,
                label: pass.label,
            };
            if uniforms.declares(RESOLUTION_UNIFORM) {
                uniforms.set_vec2(
                    RESOLUTION_UNIFORM,
                    Vec2::new(pass.width as f32, pass.height as f32),
                )?;
            }
            configure(&mut uniforms)?;
        }

        backend.draw(0..QUAD_VERTEX_COUNT)
    }
}

impl Default for PassExecutor {
    fn default() -> Self {
        Self::new(crate::EngineConfig::default().clear_color)
    }
}
