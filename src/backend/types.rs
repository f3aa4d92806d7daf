//! Common types shared between backends

use glam::{Vec2, Vec4};
use std::borrow::Cow;

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
    R32Float,
    Rg32Float,
}

impl TextureFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm | TextureFormat::R32Float => 4,
            TextureFormat::Rgba16Float | TextureFormat::Rg32Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
        }
    }
}

impl TextureDescriptor {
    /// Size in bytes of a tightly packed upload for this descriptor.
    /// Saturates where `usize` is too narrow, so no slice can match it.
    pub fn byte_size(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(self.format.bytes_per_pixel() as usize)
    }
}

/// Type of a named program uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Int,
    Float,
    Vec2,
    Vec4,
    /// Fixed-capacity float array, packed four to a `vec4<f32>` slot.
    FloatArray(u32),
    /// A sampled 2D texture. Its value is the texture unit that feeds it.
    Sampler,
}

impl UniformType {
    /// Alignment in the WGSL uniform address space. Samplers live outside
    /// the uniform block and report zero.
    pub fn alignment(&self) -> u32 {
        match self {
            UniformType::Int | UniformType::Float => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec4 | UniformType::FloatArray(_) => 16,
            UniformType::Sampler => 0,
        }
    }

    /// Size in the WGSL uniform address space.
    pub fn size(&self) -> u32 {
        match self {
            UniformType::Int | UniformType::Float => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec4 => 16,
            UniformType::FloatArray(len) => 16 * Self::array_slots(*len),
            UniformType::Sampler => 0,
        }
    }

    /// Number of `vec4<f32>` slots backing a float array of `len` elements.
    pub fn array_slots(len: u32) -> u32 {
        len.div_ceil(4).max(1)
    }

    pub fn is_sampler(&self) -> bool {
        matches!(self, UniformType::Sampler)
    }

    /// WGSL spelling of this type inside the generated uniform struct.
    pub fn wgsl(&self) -> Option<String> {
        match self {
            UniformType::Int => Some("i32".into()),
            UniformType::Float => Some("f32".into()),
            UniformType::Vec2 => Some("vec2<f32>".into()),
            UniformType::Vec4 => Some("vec4<f32>".into()),
            UniformType::FloatArray(len) => {
                Some(format!("array<vec4<f32>, {}>", Self::array_slots(*len)))
            }
            UniformType::Sampler => None,
        }
    }
}

/// A uniform declared by a program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniformDecl {
    pub name: Cow<'static, str>,
    pub ty: UniformType,
}

impl UniformDecl {
    pub const fn new(name: &'static str, ty: UniformType) -> Self {
        Self {
            name: Cow::Borrowed(name),
            ty,
        }
    }
}

/// Value written to a uniform location.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec4(Vec4),
    FloatArray(Vec<f32>),
    TextureUnit(u32),
}

impl UniformValue {
    /// Whether this value may be written to a uniform of type `ty`.
    pub fn matches(&self, ty: UniformType) -> bool {
        match (self, ty) {
            (UniformValue::Int(_), UniformType::Int)
            | (UniformValue::Float(_), UniformType::Float)
            | (UniformValue::Vec2(_), UniformType::Vec2)
            | (UniformValue::Vec4(_), UniformType::Vec4)
            | (UniformValue::TextureUnit(_), UniformType::Sampler) => true,
            (UniformValue::FloatArray(values), UniformType::FloatArray(capacity)) => {
                values.len() <= capacity as usize
            }
            _ => false,
        }
    }
}

/// Description of a full-screen fragment program.
///
/// The fragment source is WGSL and must provide `fs_main`. The backend
/// supplies the vertex stage and the declarations for every uniform listed
/// here, so the source refers to non-sampler uniforms as `u.<name>` and to
/// sampler uniforms by their bare name together with `linear_sampler`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramDescriptor {
    pub label: Cow<'static, str>,
    pub fragment_source: Cow<'static, str>,
    pub uniforms: Vec<UniformDecl>,
    /// Number of colour attachments written by `fs_main`.
    pub outputs: u32,
}

impl ProgramDescriptor {
    pub fn sampler_count(&self) -> usize {
        self.uniforms.iter().filter(|u| u.ty.is_sampler()).count()
    }

    /// Byte offsets of every non-sampler uniform in the uniform block,
    /// followed by the block size rounded up to 16 bytes.
    pub fn uniform_layout(&self) -> (Vec<Option<u32>>, u32) {
        let mut offset = 0u32;
        let offsets = self
            .uniforms
            .iter()
            .map(|decl| {
                if decl.ty.is_sampler() {
                    return None;
                }
                let align = decl.ty.alignment();
                offset = offset.div_ceil(align) * align;
                let this = offset;
                offset += decl.ty.size();
                Some(this)
            })
            .collect();
        (offsets, offset.div_ceil(16) * 16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size_of_large_float_texture() {
        let desc = TextureDescriptor {
            label: None,
            width: 16384,
            height: 16384,
            format: TextureFormat::Rgba32Float,
        };
        #[cfg(target_pointer_width = "64")]
        assert_eq!(desc.byte_size(), 16384 * 16384 * 16);
        assert_ne!(desc.byte_size(), 0);
    }

    #[test]
    fn test_uniform_layout_alignment() {
        let desc = ProgramDescriptor {
            label: "layout".into(),
            fragment_source: "".into(),
            uniforms: vec![
                UniformDecl::new("u_image", UniformType::Sampler),
                UniformDecl::new("u_size", UniformType::Int),
                UniformDecl::new("u_direction", UniformType::Vec2),
                UniformDecl::new("u_kernel", UniformType::FloatArray(5)),
                UniformDecl::new("u_scale", UniformType::Float),
            ],
            outputs: 1,
        };

        let (offsets, size) = desc.uniform_layout();
        assert_eq!(offsets, vec![None, Some(0), Some(8), Some(16), Some(48)]);
        assert_eq!(size, 64);
        assert_eq!(desc.sampler_count(), 1);
    }

    #[test]
    fn test_value_matches_declared_type() {
        assert!(UniformValue::TextureUnit(0).matches(UniformType::Sampler));
        assert!(UniformValue::FloatArray(vec![0.0; 4]).matches(UniformType::FloatArray(4)));
        assert!(!UniformValue::FloatArray(vec![0.0; 5]).matches(UniformType::FloatArray(4)));
        assert!(!UniformValue::Float(1.0).matches(UniformType::Int));
    }
}
