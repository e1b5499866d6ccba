//! WGSL compilation, link checks and interface reflection
//!
//! Each stage is parsed and validated with naga. Linking checks that the two
//! stages agree on their interface and produces the [`ProgramLayout`] that the
//! device and the uniform setters work from.

use std::collections::{BTreeMap, BTreeSet};

use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Handle, Module, Type, TypeInner};

use super::ShaderStage;
use crate::error::ShaderError;
use crate::gfx::device::TextureBinding;

/// Suffix naming the sampler that pairs with a texture global
pub const SAMPLER_SUFFIX: &str = "_sampler";

/// What lives at one `@group(0) @binding(n)` slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKind {
    /// A non-struct uniform: scalar, vector, matrix or array
    Uniform { size: u32 },
    /// A struct-typed uniform buffer
    Block { size: u32 },
    Texture,
    Sampler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    pub binding: u32,
    pub size: u32,
}

/// Reflected interface of a linked program
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramLayout {
    /// Every binding the program's entry points actually use
    pub bindings: BTreeMap<u32, (String, BindingKind)>,
    pub uniforms: BTreeMap<String, UniformSlot>,
    pub blocks: BTreeMap<String, UniformSlot>,
    pub textures: BTreeMap<String, TextureBinding>,
    /// Shader locations read by the vertex entry point
    pub vertex_inputs: BTreeSet<u32>,
}

/// One successfully compiled stage
#[derive(Debug)]
pub struct CompiledStage {
    pub stage: ShaderStage,
    pub source: String,
    pub entry_point: String,
    module: Module,
    info: ModuleInfo,
    entry_index: usize,
}

/// Parses and validates a WGSL source for one stage
pub fn compile(stage: ShaderStage, source: &str) -> Result<CompiledStage, ShaderError> {
    let compile_error = |diagnostic: String| ShaderError::Compile {
        stage,
        diagnostic,
        shader_source: source.to_owned(),
    };

    let module =
        naga::front::wgsl::parse_str(source).map_err(|e| compile_error(e.emit_to_string(source)))?;

    let info = Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| compile_error(e.emit_to_string(source)))?;

    let naga_stage = stage.to_naga();
    let entry_index = module
        .entry_points
        .iter()
        .position(|ep| ep.stage == naga_stage)
        .ok_or_else(|| compile_error(format!("no @{} entry point", stage.attribute())))?;
    let entry_point = module.entry_points[entry_index].name.clone();

    Ok(CompiledStage {
        stage,
        source: source.to_owned(),
        entry_point,
        module,
        info,
        entry_index,
    })
}

impl CompiledStage {
    fn entry(&self) -> &naga::EntryPoint {
        &self.module.entry_points[self.entry_index]
    }

    /// Locations consumed by the entry point's arguments
    pub fn input_locations(&self) -> BTreeSet<u32> {
        let mut locations = BTreeSet::new();
        for argument in &self.entry().function.arguments {
            collect_locations(&self.module, argument.ty, argument.binding.as_ref(), &mut locations);
        }
        locations
    }

    /// Locations written by the entry point's result
    pub fn output_locations(&self) -> BTreeSet<u32> {
        let mut locations = BTreeSet::new();
        if let Some(result) = &self.entry().function.result {
            collect_locations(&self.module, result.ty, result.binding.as_ref(), &mut locations);
        }
        locations
    }

    /// Resource globals used by this stage's entry point
    fn used_bindings(&self) -> Result<BTreeMap<u32, (String, BindingKind)>, String> {
        let usage = self.info.get_entry_point(self.entry_index);
        let mut bindings = BTreeMap::new();

        for (handle, var) in self.module.global_variables.iter() {
            let Some(resource) = &var.binding else {
                continue;
            };
            if usage[handle].is_empty() {
                continue;
            }
            let name = var
                .name
                .clone()
                .unwrap_or_else(|| format!("binding{}", resource.binding));
            if resource.group != 0 {
                return Err(format!(
                    "{name}: only @group(0) is supported, found @group({})",
                    resource.group
                ));
            }

            let inner = &self.module.types[var.ty].inner;
            let kind = match (var.space, inner) {
                (AddressSpace::Uniform, TypeInner::Struct { .. }) => BindingKind::Block {
                    size: inner.size(self.module.to_ctx()),
                },
                (AddressSpace::Uniform, _) => BindingKind::Uniform {
                    size: inner.size(self.module.to_ctx()),
                },
                (AddressSpace::Handle, TypeInner::Image { .. }) => BindingKind::Texture,
                (AddressSpace::Handle, TypeInner::Sampler { .. }) => BindingKind::Sampler,
                (space, _) => {
                    return Err(format!("{name}: unsupported resource in {space:?} space"));
                }
            };
            bindings.insert(resource.binding, (name, kind));
        }

        Ok(bindings)
    }
}

fn collect_locations(
    module: &Module,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    out: &mut BTreeSet<u32>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => {
            out.insert(*location);
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    if let Some(Binding::Location { location, .. }) = &member.binding {
                        out.insert(*location);
                    }
                }
            }
        }
    }
}

/// Checks the stage interfaces against each other and reflects the program
pub fn link(
    vertex: &CompiledStage,
    fragment: Option<&CompiledStage>,
) -> Result<ProgramLayout, ShaderError> {
    let mut log = Vec::new();

    if vertex.stage != ShaderStage::Vertex {
        return Err(ShaderError::Link {
            log: "program has no vertex stage".to_owned(),
        });
    }

    let mut bindings = vertex.used_bindings().unwrap_or_else(|e| {
        log.push(e);
        BTreeMap::new()
    });

    if let Some(fragment) = fragment {
        let written = vertex.output_locations();
        for location in fragment.input_locations() {
            if !written.contains(&location) {
                log.push(format!(
                    "fragment input @location({location}) is not written by the vertex stage"
                ));
            }
        }

        match fragment.used_bindings() {
            Ok(fragment_bindings) => {
                for (binding, (name, kind)) in fragment_bindings {
                    match bindings.get(&binding) {
                        Some((existing, existing_kind))
                            if existing != &name || existing_kind != &kind =>
                        {
                            log.push(format!(
                                "@binding({binding}) is `{existing}` in the vertex stage but `{name}` in the fragment stage"
                            ));
                        }
                        Some(_) => {}
                        None => {
                            bindings.insert(binding, (name, kind));
                        }
                    }
                }
            }
            Err(e) => log.push(e),
        }
    }

    if !log.is_empty() {
        return Err(ShaderError::Link {
            log: log.join("\n"),
        });
    }

    Ok(reflect_layout(bindings, vertex.input_locations()))
}

fn reflect_layout(
    bindings: BTreeMap<u32, (String, BindingKind)>,
    vertex_inputs: BTreeSet<u32>,
) -> ProgramLayout {
    let mut layout = ProgramLayout {
        vertex_inputs,
        ..Default::default()
    };

    let samplers: BTreeMap<&str, u32> = bindings
        .iter()
        .filter(|(_, (_, kind))| *kind == BindingKind::Sampler)
        .map(|(binding, (name, _))| (name.as_str(), *binding))
        .collect();

    for (binding, (name, kind)) in &bindings {
        match kind {
            BindingKind::Uniform { size } => {
                layout.uniforms.insert(
                    name.clone(),
                    UniformSlot {
                        binding: *binding,
                        size: *size,
                    },
                );
            }
            BindingKind::Block { size } => {
                layout.blocks.insert(
                    name.clone(),
                    UniformSlot {
                        binding: *binding,
                        size: *size,
                    },
                );
            }
            BindingKind::Texture => {
                let sampler = samplers
                    .get(format!("{name}{SAMPLER_SUFFIX}").as_str())
                    .copied();
                layout.textures.insert(
                    name.clone(),
                    TextureBinding {
                        texture: *binding,
                        sampler,
                    },
                );
            }
            BindingKind::Sampler => {}
        }
    }

    layout.bindings = bindings;
    layout
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r#"
@group(0) @binding(0) var<uniform> u_mvp: mat4x4<f32>;
@group(0) @binding(1) var<uniform> u_scale: f32;

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(2) uv: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip = u_mvp * vec4<f32>(position * u_scale, 1.0);
    out.uv = uv;
    return out;
}
"#;

    const FRAGMENT: &str = r#"
@group(0) @binding(2) var s_texture: texture_2d<f32>;
@group(0) @binding(3) var s_texture_sampler: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(s_texture, s_texture_sampler, uv);
}
"#;

    #[test]
    fn test_compile_reports_diagnostic_and_source() {
        let err = compile(ShaderStage::Vertex, "fn broken( {").unwrap_err();
        match err {
            ShaderError::Compile {
                stage,
                diagnostic,
                shader_source,
            } => {
                assert_eq!(stage, ShaderStage::Vertex);
                assert!(!diagnostic.is_empty());
                assert_eq!(shader_source, "fn broken( {");
            }
            other => panic!("expected compile failure, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_entry_point_is_compile_failure() {
        let err = compile(ShaderStage::Fragment, VERTEX).unwrap_err();
        assert!(matches!(err, ShaderError::Compile { .. }));
    }

    #[test]
    fn test_link_reflects_uniforms_and_textures() {
        let vs = compile(ShaderStage::Vertex, VERTEX).unwrap();
        let fs = compile(ShaderStage::Fragment, FRAGMENT).unwrap();
        let layout = link(&vs, Some(&fs)).unwrap();

        assert_eq!(layout.uniforms["u_mvp"], UniformSlot { binding: 0, size: 64 });
        assert_eq!(layout.uniforms["u_scale"].binding, 1);
        assert_eq!(
            layout.textures["s_texture"],
            TextureBinding {
                texture: 2,
                sampler: Some(3)
            }
        );
        assert_eq!(layout.vertex_inputs.iter().copied().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_link_rejects_unwritten_fragment_input() {
        let vs = compile(ShaderStage::Vertex, VERTEX).unwrap();
        let fs_src = r#"
@fragment
fn fs_main(@location(5) tint: vec4<f32>) -> @location(0) vec4<f32> {
    return tint;
}
"#;
        let fs = compile(ShaderStage::Fragment, fs_src).unwrap();
        let err = link(&vs, Some(&fs)).unwrap_err();
        match err {
            ShaderError::Link { log } => assert!(log.contains("@location(5)")),
            other => panic!("expected link failure, got {other:?}"),
        }
    }

    #[test]
    fn test_link_requires_vertex_stage() {
        let fs = compile(ShaderStage::Fragment, FRAGMENT).unwrap();
        assert!(matches!(link(&fs, None), Err(ShaderError::Link { .. })));
    }
}
