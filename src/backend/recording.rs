//! Command-recording backend for testing and development.
//!
//! This backend performs no GPU work. It keeps track of every resource it
//! hands out, records each command in order, and applies the same validation
//! a real device would: complete framebuffers, declared uniforms, assigned
//! samplers and no sampling from the target being drawn into.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateTexture {
        texture: TextureHandle,
        width: u32,
        height: u32,
    },
    WriteTexture {
        texture: TextureHandle,
        len: usize,
    },
    CreateFramebuffer {
        framebuffer: FramebufferHandle,
        attachments: Vec<TextureHandle>,
    },
    CreateProgram {
        program: ProgramHandle,
        label: String,
    },
    BindRenderTarget(FramebufferHandle),
    UnbindRenderTarget,
    SetViewport {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    Clear([f32; 4]),
    UseProgram(ProgramHandle),
    BindTexture {
        unit: u32,
        texture: TextureHandle,
    },
    SetUniform {
        program: ProgramHandle,
        name: String,
        value: UniformValue,
    },
    Draw(DrawCall),
    DestroyFramebuffer(FramebufferHandle),
    DestroyTexture(TextureHandle),
}

/// A validated draw, with the textures it sampled and the attachments it wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: ProgramHandle,
    pub program_label: String,
    pub framebuffer: FramebufferHandle,
    pub vertices: Range<u32>,
    pub sampled: Vec<TextureHandle>,
    pub written: Vec<TextureHandle>,
}

struct RecordedProgram {
    desc: ProgramDescriptor,
    sampler_units: HashMap<usize, u32>,
}

/// Backend that records commands instead of executing them.
pub struct RecordingBackend {
    commands: Vec<Command>,
    textures: HashMap<TextureHandle, TextureDescriptor>,
    framebuffers: HashMap<FramebufferHandle, Vec<TextureHandle>>,
    programs: HashMap<ProgramHandle, RecordedProgram>,
    program_cache: HashMap<(String, String), ProgramHandle>,
    rejected_programs: HashSet<String>,
    next_id: u64,

    bound_target: Option<FramebufferHandle>,
    current_program: Option<ProgramHandle>,
    texture_units: BTreeMap<u32, TextureHandle>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            program_cache: HashMap::new(),
            rejected_programs: HashSet::new(),
            next_id: 1,
            bound_target: None,
            current_program: None,
            texture_units: BTreeMap::new(),
        }
    }

    /// Make every later `create_program` with this label fail to link.
    pub fn reject_program(&mut self, label: &str) {
        self.rejected_programs.insert(label.to_string());
    }

    /// All commands recorded so far, in call order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Forget the recorded command list; resources stay alive.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawCall> {
        self.commands.iter().filter_map(|command| match command {
            Command::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    pub fn draw_count(&self) -> usize {
        self.draws().count()
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn is_texture_live(&self, texture: TextureHandle) -> bool {
        self.textures.contains_key(&texture)
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Descriptor a program was created from
    pub fn program_descriptor(&self, program: ProgramHandle) -> Option<&ProgramDescriptor> {
        self.programs.get(&program).map(|p| &p.desc)
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn program(&self, program: ProgramHandle) -> BackendResult<&RecordedProgram> {
        self.programs
            .get(&program)
            .ok_or(BackendError::UnknownProgram(program))
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsBackend for RecordingBackend {
    fn name(&self) -> &str {
        "Recording"
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero extent ({}x{})",
                desc.label, desc.width, desc.height
            )));
        }

        let texture = TextureHandle(self.next_handle());
        log::trace!(
            "RecordingBackend: creating texture {:?} {:?} ({}x{})",
            texture,
            desc.label,
            desc.width,
            desc.height
        );
        self.textures.insert(texture, desc.clone());
        self.commands.push(Command::CreateTexture {
            texture,
            width: desc.width,
            height: desc.height,
        });
        Ok(texture)
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> BackendResult<()> {
        let desc = self
            .textures
            .get(&texture)
            .ok_or(BackendError::UnknownTexture(texture))?;
        if data.len() != desc.byte_size() {
            return Err(BackendError::UploadSizeMismatch {
                expected: desc.byte_size(),
                actual: data.len(),
            });
        }
        self.commands.push(Command::WriteTexture {
            texture,
            len: data.len(),
        });
        Ok(())
    }

    fn create_framebuffer(
        &mut self,
        label: &str,
        attachments: &[TextureHandle],
    ) -> BackendResult<FramebufferHandle> {
        if attachments.is_empty() || attachments.len() > MAX_COLOR_ATTACHMENTS {
            return Err(BackendError::IncompleteRenderTarget(format!(
                "{label}: {} colour attachments (expected 1..={MAX_COLOR_ATTACHMENTS})",
                attachments.len()
            )));
        }

        let mut extent = None;
        for &texture in attachments {
            let desc = self.textures.get(&texture).ok_or_else(|| {
                BackendError::IncompleteRenderTarget(format!(
                    "{label}: attachment {texture:?} does not exist"
                ))
            })?;
            match extent {
                None => extent = Some((desc.width, desc.height)),
                Some(size) if size != (desc.width, desc.height) => {
                    return Err(BackendError::IncompleteRenderTarget(format!(
                        "{label}: attachments differ in size"
                    )));
                }
                Some(_) => {}
            }
        }

        let framebuffer = FramebufferHandle(self.next_handle());
        self.framebuffers.insert(framebuffer, attachments.to_vec());
        self.commands.push(Command::CreateFramebuffer {
            framebuffer,
            attachments: attachments.to_vec(),
        });
        Ok(framebuffer)
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        let key = (desc.label.to_string(), desc.fragment_source.to_string());
        if let Some(&program) = self.program_cache.get(&key) {
            return Ok(program);
        }

        if self.rejected_programs.contains(desc.label.as_ref()) {
            return Err(BackendError::ProgramLinkFailed {
                label: desc.label.to_string(),
                log: "rejected by recording backend".into(),
            });
        }

        let program = ProgramHandle(self.next_handle());
        self.programs.insert(
            program,
            RecordedProgram {
                desc: desc.clone(),
                sampler_units: HashMap::new(),
            },
        );
        self.program_cache.insert(key, program);
        self.commands.push(Command::CreateProgram {
            program,
            label: desc.label.to_string(),
        });
        Ok(program)
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let recorded = self.programs.get(&program)?;
        let index = recorded
            .desc
            .uniforms
            .iter()
            .position(|decl| decl.name == name)?;
        Some(UniformLocation { program, index })
    }

    fn bind_render_target(&mut self, framebuffer: FramebufferHandle) -> BackendResult<()> {
        if !self.framebuffers.contains_key(&framebuffer) {
            return Err(BackendError::UnknownFramebuffer(framebuffer));
        }
        self.bound_target = Some(framebuffer);
        self.commands.push(Command::BindRenderTarget(framebuffer));
        Ok(())
    }

    fn unbind_render_target(&mut self) {
        self.bound_target = None;
        self.commands.push(Command::UnbindRenderTarget);
    }

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.commands.push(Command::SetViewport {
            x,
            y,
            width,
            height,
        });
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.commands.push(Command::Clear(color));
    }

    fn use_program(&mut self, program: ProgramHandle) -> BackendResult<()> {
        self.program(program)?;
        self.current_program = Some(program);
        self.commands.push(Command::UseProgram(program));
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) -> BackendResult<()> {
        if !self.textures.contains_key(&texture) {
            return Err(BackendError::UnknownTexture(texture));
        }
        self.texture_units.insert(unit, texture);
        self.commands.push(Command::BindTexture { unit, texture });
        Ok(())
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) -> BackendResult<()> {
        let recorded = self
            .programs
            .get_mut(&location.program)
            .ok_or(BackendError::UnknownProgram(location.program))?;
        let decl = recorded.desc.uniforms.get(location.index).ok_or_else(|| {
            BackendError::MissingUniform {
                program: recorded.desc.label.to_string(),
                name: format!("#{}", location.index),
            }
        })?;

        if !value.matches(decl.ty) {
            return Err(BackendError::UniformTypeMismatch {
                program: recorded.desc.label.to_string(),
                name: decl.name.to_string(),
                value: format!("{value:?}"),
            });
        }
        if let UniformValue::TextureUnit(unit) = value {
            recorded.sampler_units.insert(location.index, unit);
        }

        self.commands.push(Command::SetUniform {
            program: location.program,
            name: decl.name.to_string(),
            value,
        });
        Ok(())
    }

    fn draw(&mut self, vertices: Range<u32>) -> BackendResult<()> {
        let framebuffer = self.bound_target.ok_or(BackendError::NoRenderTargetBound)?;
        let program = self.current_program.ok_or(BackendError::NoProgramBound)?;
        let recorded = self.program(program)?;
        let written = self
            .framebuffers
            .get(&framebuffer)
            .cloned()
            .ok_or(BackendError::UnknownFramebuffer(framebuffer))?;

        if written.len() != recorded.desc.outputs as usize {
            return Err(BackendError::IncompleteRenderTarget(format!(
                "program `{}` writes {} outputs but the target has {} attachments",
                recorded.desc.label,
                recorded.desc.outputs,
                written.len()
            )));
        }

        let mut sampled = Vec::new();
        for (index, decl) in recorded.desc.uniforms.iter().enumerate() {
            if !decl.ty.is_sampler() {
                continue;
            }
            let texture = recorded
                .sampler_units
                .get(&index)
                .and_then(|unit| self.texture_units.get(unit))
                .copied()
                .ok_or_else(|| BackendError::UnassignedSampler {
                    program: recorded.desc.label.to_string(),
                    name: decl.name.to_string(),
                })?;
            if written.contains(&texture) {
                return Err(BackendError::ReadWriteHazard(texture));
            }
            sampled.push(texture);
        }

        let draw = DrawCall {
            program,
            program_label: recorded.desc.label.to_string(),
            framebuffer,
            vertices,
            sampled,
            written,
        };
        log::trace!(
            "RecordingBackend: draw `{}` into {:?}",
            draw.program_label,
            framebuffer
        );
        self.commands.push(Command::Draw(draw));
        Ok(())
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.framebuffers.remove(&framebuffer).is_some() {
            self.commands.push(Command::DestroyFramebuffer(framebuffer));
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_some() {
            self.texture_units.retain(|_, bound| *bound != texture);
            self.commands.push(Command::DestroyTexture(texture));
        }
    }
}
