//! Separable gaussian blur
//!
//! Runs a horizontal pass into a scratch target and a vertical pass into the
//! node's output. The scratch target is released before the node returns.

use crate::backend::*;
use crate::kernels::{
    compile_program, ComputeKernel, KernelContext, KernelInputs, ParameterSet, ParameterSpec,
};
use crate::render_graph::{
    GraphError, GraphResult, RenderTargetId, SocketDescriptor, SocketType, UniformSetter,
};
use glam::Vec2;
use std::any::Any;

/// Largest kernel the program can hold
pub const MAX_KERNEL_SIZE: usize = 1000;

const FRAGMENT: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let texel = 1.0 / vec2<f32>(textureDimensions(u_image));
    let half_size = u.u_kernel_size / 2;
    var sum = vec4<f32>(0.0);
    for (var i = -half_size; i <= half_size; i++) {
        let k = u32(half_size + i);
        let weight = u.u_kernel[k / 4u][k % 4u];
        let offset = f32(i) * u.u_direction * texel;
        sum += textureSampleLevel(u_image, linear_sampler, in.uv + offset, 0.0) * weight;
    }
    return sum;
}
"#;

const INPUTS: &[SocketDescriptor] = &[SocketDescriptor::new("input", SocketType::Image)];
const OUTPUTS: &[SocketDescriptor] = &[SocketDescriptor::new("output", SocketType::Image)];

const PARAMETERS: &[ParameterSpec] = &[ParameterSpec::new("radius", 0.01, 60.0, 0.01, 2.0)];

const HORIZONTAL: Vec2 = Vec2::new(1.0, 0.0);
const VERTICAL: Vec2 = Vec2::new(0.0, 1.0);

/// Odd kernel size covering three standard deviations, at least 3
pub fn kernel_size(sigma: f32) -> usize {
    let size = ((3.0 * sigma).ceil() as usize + 1) | 1;
    size.max(3)
}

/// Normalised 1D gaussian weights. Even sizes are bumped to the next odd one.
pub fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    let size = size | 1;
    let half = (size / 2) as i32;
    let weights: Vec<f32> = (-half..=half)
        .map(|x| {
            let x = x as f32;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

#[derive(Debug)]
pub struct GaussianBlur {
    program: Option<ProgramHandle>,
    parameters: ParameterSet,
}

impl GaussianBlur {
    pub fn new() -> Self {
        Self {
            program: None,
            parameters: ParameterSet::new("Gaussian Blur", PARAMETERS),
        }
    }

    pub fn with_radius(radius: f32) -> Self {
        let mut blur = Self::new();
        if let Err(e) = blur.parameters.apply(&[("radius", radius)]) {
            log::warn!("{}", e);
        }
        blur
    }

    pub fn radius(&self) -> f32 {
        self.parameters.get("radius").unwrap_or(PARAMETERS[0].default)
    }

    fn configure_direction(
        &self,
        uniforms: &mut UniformSetter<'_>,
        direction: Vec2,
    ) -> BackendResult<()> {
        let sigma = self.radius();
        let size = kernel_size(sigma);
        uniforms.set_texture_unit("u_image", 0)?;
        uniforms.set_int("u_kernel_size", size as i32)?;
        uniforms.set_float_array("u_kernel", &gaussian_kernel(size, sigma))?;
        uniforms.set_vec2("u_direction", direction)
    }
}

impl Default for GaussianBlur {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeKernel for GaussianBlur {
    fn label(&self) -> &str {
        "Gaussian Blur"
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
            "Gaussian Blur",
            FRAGMENT,
            vec![
                UniformDecl::new("u_image", UniformType::Sampler),
                UniformDecl::new("u_kernel_size", UniformType::Int),
                UniformDecl::new("u_kernel", UniformType::FloatArray(MAX_KERNEL_SIZE as u32)),
                UniformDecl::new("u_direction", UniformType::Vec2),
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
        self.configure_direction(uniforms, HORIZONTAL)
    }

    fn execute(
        &self,
        ctx: &mut KernelContext<'_, '_>,
        inputs: &KernelInputs<'_>,
        output: RenderTargetId,
    ) -> GraphResult<()> {
        let program = self.program.ok_or_else(|| GraphError::KernelNotCompiled {
            kernel: self.label().to_string(),
        })?;
        let source = inputs.textures();

        let scratch = ctx.acquire_scratch(1, &source)?;
        ctx.run(self.label(), program, &source, scratch, |u| {
            self.configure_direction(u, HORIZONTAL)
        })?;

        let blurred_x = ctx.attachments(scratch)?;
        ctx.run(self.label(), program, &blurred_x, output, |u| {
            self.configure_direction(u, VERTICAL)
        })?;

        ctx.release(scratch);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
