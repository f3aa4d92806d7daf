//! Colour inversion

use crate::backend::*;
use crate::kernels::{compile_program, ComputeKernel, KernelInputs};
use crate::render_graph::{SocketDescriptor, SocketType, UniformSetter};
use std::any::Any;

const FRAGMENT: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(u_image, linear_sampler, in.uv);
    return vec4<f32>(1.0 - color.rgb, color.a);
}
"#;

const INPUTS: &[SocketDescriptor] = &[SocketDescriptor::new("input", SocketType::Image)];
const OUTPUTS: &[SocketDescriptor] = &[SocketDescriptor::new("output", SocketType::Image)];

#[derive(Debug, Default)]
pub struct Invert {
    program: Option<ProgramHandle>,
}

impl Invert {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ComputeKernel for Invert {
    fn label(&self) -> &str {
        "Invert"
    }

    fn inputs(&self) -> &[SocketDescriptor] {
        INPUTS
    }

    fn outputs(&self) -> &[SocketDescriptor] {
        OUTPUTS
    }

    fn compile(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        self.program = Some(compile_program(
            backend,
            "Invert",
            FRAGMENT,
            vec![UniformDecl::new("u_image", UniformType::Sampler)],
        )?);
        Ok(())
    }

    fn program(&self) -> Option<ProgramHandle> {
        self.program
    }

    fn configure_uniforms(
        &self,
        uniforms: &mut UniformSetter<'_>,
        _inputs: &KernelInputs<'_>,
    ) -> BackendResult<()> {
        uniforms.set_texture_unit("u_image", 0)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
