//! Weighted difference of two images

use crate::backend::*;
use crate::kernels::{compile_program, ComputeKernel, KernelInputs, ParameterSet, ParameterSpec};
use crate::render_graph::{SocketDescriptor, SocketType, UniformSetter};
use std::any::Any;

const FRAGMENT: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let a = textureSample(u_image1, linear_sampler, in.uv);
    let b = textureSample(u_image2, linear_sampler, in.uv);
    return vec4<f32>(a.rgb - u.u_tau * b.rgb, a.a);
}
"#;

const INPUTS: &[SocketDescriptor] = &[
    SocketDescriptor::new("a", SocketType::Image),
    SocketDescriptor::new("b", SocketType::Image),
];
const OUTPUTS: &[SocketDescriptor] = &[SocketDescriptor::new("output", SocketType::Image)];

const PARAMETERS: &[ParameterSpec] = &[ParameterSpec::new("tau", 0.0, 200.0, 0.01, 1.0)];

/// Computes `a - tau * b` on colour, keeping the alpha of `a`
#[derive(Debug)]
pub struct Subtract {
    program: Option<ProgramHandle>,
    parameters: ParameterSet,
}

impl Subtract {
    pub fn new() -> Self {
        Self {
            program: None,
            parameters: ParameterSet::new("Subtract", PARAMETERS),
        }
    }

    pub fn tau(&self) -> f32 {
        self.parameters.get("tau").unwrap_or(PARAMETERS[0].default)
    }
}

impl Default for Subtract {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeKernel for Subtract {
    fn label(&self) -> &str {
        "Subtract"
    }

    fn inputs(&self) -> &[SocketDescriptor] {
        INPUTS
    }

    fn outputs(&self) -> &[SocketDescriptor] {
        OUTPUTS
    }

    fn parameter_set(&self) -> Option<&ParameterSet> {
        Some(&self.parameters)
    }

    fn parameter_set_mut(&mut self) -> Option<&mut ParameterSet> {
        Some(&mut self.parameters)
    }

    fn compile(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        self.program = Some(compile_program(
            backend,
            "Subtract",
            FRAGMENT,
            vec![
                UniformDecl::new("u_image1", UniformType::Sampler),
                UniformDecl::new("u_image2", UniformType::Sampler),
                UniformDecl::new("u_tau", UniformType::Float),
            ],
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
        uniforms.set_texture_unit("u_image1", 0)?;
        uniforms.set_texture_unit("u_image2", 1)?;
        uniforms.set_float("u_tau", self.tau())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
