//! Shader programs
//!
//! A [`ShaderProgram`] is compiled from WGSL text, linked, and owns one
//! program handle on the device. Uniforms and textures are addressed by the
//! name of their global in the shader.

pub mod compiler;

use std::collections::BTreeMap;

use cgmath::{Matrix3, Matrix4, Vector2, Vector3, Vector4};

use crate::error::{GfxError, GfxResult};
use crate::gfx::device::{ProgramDesc, RawHandle, ResourceKind, SharedDevice, StageModule};
use crate::gfx::texture::Texture2D;

pub use compiler::{BindingKind, ProgramLayout, UniformSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }

    fn attribute(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

/// A value destined for a non-block uniform
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(Vector2<f32>),
    Vec3(Vector3<f32>),
    Vec4(Vector4<f32>),
    Mat3(Matrix3<f32>),
    Mat4(Matrix4<f32>),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    Vec2Array(Vec<Vector2<f32>>),
    Vec3Array(Vec<Vector3<f32>>),
    Mat3Array(Vec<Matrix3<f32>>),
    Mat4Array(Vec<Matrix4<f32>>),
}

impl UniformValue {
    /// Bytes laid out the way WGSL's uniform address space expects.
    ///
    /// Vectors occupy 16 bytes, `mat3x3` columns are padded to 16 bytes and
    /// array elements are strided to a multiple of 16.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            UniformValue::Int(v) => push_padded(&mut out, &[*v as u32]),
            UniformValue::Float(v) => push_floats(&mut out, &[*v]),
            UniformValue::Vec2(v) => push_floats(&mut out, &[v.x, v.y]),
            UniformValue::Vec3(v) => push_floats(&mut out, &[v.x, v.y, v.z]),
            UniformValue::Vec4(v) => push_floats(&mut out, &[v.x, v.y, v.z, v.w]),
            UniformValue::Mat3(m) => push_mat3(&mut out, m),
            UniformValue::Mat4(m) => push_mat4(&mut out, m),
            UniformValue::IntArray(values) => {
                for v in values {
                    push_padded(&mut out, &[*v as u32]);
                }
            }
            UniformValue::FloatArray(values) => {
                for v in values {
                    push_floats(&mut out, &[*v]);
                }
            }
            UniformValue::Vec2Array(values) => {
                for v in values {
                    push_floats(&mut out, &[v.x, v.y]);
                }
            }
            UniformValue::Vec3Array(values) => {
                for v in values {
                    push_floats(&mut out, &[v.x, v.y, v.z]);
                }
            }
            UniformValue::Mat3Array(values) => {
                for m in values {
                    push_mat3(&mut out, m);
                }
            }
            UniformValue::Mat4Array(values) => {
                for m in values {
                    push_mat4(&mut out, m);
                }
            }
        }
        out
    }
}

fn push_padded(out: &mut Vec<u8>, words: &[u32]) {
    let mut padded = [0u32; 4];
    padded[..words.len()].copy_from_slice(words);
    out.extend_from_slice(bytemuck::cast_slice(&padded));
}

fn push_floats(out: &mut Vec<u8>, values: &[f32]) {
    let bits: Vec<u32> = values.iter().map(|v| v.to_bits()).collect();
    push_padded(out, &bits);
}

fn push_mat3(out: &mut Vec<u8>, m: &Matrix3<f32>) {
    for column in [m.x, m.y, m.z] {
        push_floats(out, &[column.x, column.y, column.z]);
    }
}

fn push_mat4(out: &mut Vec<u8>, m: &Matrix4<f32>) {
    let columns: &[f32; 16] = m.as_ref();
    out.extend_from_slice(bytemuck::cast_slice(columns));
}

macro_rules! uniform_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for UniformValue {
                fn from(value: $ty) -> Self {
                    UniformValue::$variant(value)
                }
            }
        )*
    };
}

uniform_from! {
    i32 => Int,
    f32 => Float,
    Vector2<f32> => Vec2,
    Vector3<f32> => Vec3,
    Vector4<f32> => Vec4,
    Matrix3<f32> => Mat3,
    Matrix4<f32> => Mat4,
    Vec<i32> => IntArray,
    Vec<f32> => FloatArray,
    Vec<Vector2<f32>> => Vec2Array,
    Vec<Vector3<f32>> => Vec3Array,
    Vec<Matrix3<f32>> => Mat3Array,
    Vec<Matrix4<f32>> => Mat4Array,
}

/// A linked vertex + fragment program
pub struct ShaderProgram {
    device: SharedDevice,
    handle: RawHandle,
    layout: ProgramLayout,
}

impl ShaderProgram {
    /// Compiles both stages and links them into one program
    pub fn new(device: &SharedDevice, vertex_source: &str, fragment_source: &str) -> GfxResult<Self> {
        let vertex = compile_logged(ShaderStage::Vertex, vertex_source)?;
        let fragment = compile_logged(ShaderStage::Fragment, fragment_source)?;
        Self::link(device, &vertex, Some(&fragment))
    }

    /// Builds a program from a single stage. Only a vertex stage links on
    /// its own; the result renders depth without color output.
    pub fn from_stage(device: &SharedDevice, stage: ShaderStage, source: &str) -> GfxResult<Self> {
        let compiled = compile_logged(stage, source)?;
        Self::link(device, &compiled, None)
    }

    fn link(
        device: &SharedDevice,
        vertex: &compiler::CompiledStage,
        fragment: Option<&compiler::CompiledStage>,
    ) -> GfxResult<Self> {
        let layout = compiler::link(vertex, fragment).inspect_err(|e| {
            log::error!("{e}");
        })?;

        let desc = ProgramDesc {
            label: &vertex.entry_point,
            vertex: StageModule {
                source: &vertex.source,
                entry_point: &vertex.entry_point,
            },
            fragment: fragment.map(|f| StageModule {
                source: &f.source,
                entry_point: &f.entry_point,
            }),
            layout: &layout,
        };
        let handle = device.create_program(&desc)?;

        Ok(Self {
            device: device.clone(),
            handle,
            layout,
        })
    }

    pub fn handle(&self) -> RawHandle {
        self.handle
    }

    pub fn layout(&self) -> &ProgramLayout {
        &self.layout
    }

    /// All active non-block uniforms, textures and samplers keyed by binding
    pub fn reflect(&self) -> BTreeMap<u32, String> {
        self.layout
            .bindings
            .iter()
            .filter(|(_, (_, kind))| !matches!(kind, BindingKind::Block { .. }))
            .map(|(binding, (name, _))| (*binding, name.clone()))
            .collect()
    }

    /// Sets a uniform by name. Names the program does not use are ignored.
    pub fn uniform(&self, name: &str, value: impl Into<UniformValue>) {
        match self.layout.uniforms.get(name) {
            Some(slot) => {
                let bytes = value.into().to_bytes();
                self.device.set_uniform(self.handle, slot.binding, &bytes);
            }
            None => log::trace!("uniform `{name}` not active, ignored"),
        }
    }

    /// Sets an array uniform from a slice of scalars, vectors or matrices
    pub fn uniform_array<T: Clone>(&self, name: &str, values: &[T])
    where
        Vec<T>: Into<UniformValue>,
    {
        self.uniform(name, values.to_vec());
    }

    /// Replaces the contents of a struct-typed uniform buffer
    pub fn uniform_block(&self, name: &str, bytes: &[u8]) {
        match self.layout.blocks.get(name) {
            Some(slot) => self.device.set_uniform(self.handle, slot.binding, bytes),
            None => log::trace!("uniform block `{name}` not active, ignored"),
        }
    }

    /// Binds a texture, and its `<name>_sampler` if present, by name
    pub fn texture(&self, name: &str, texture: &Texture2D) -> GfxResult<()> {
        match self.layout.textures.get(name) {
            Some(binding) => {
                let handle = texture.object.ensure()?;
                self.device.bind_texture(self.handle, *binding, handle);
            }
            None => log::trace!("texture `{name}` not active, ignored"),
        }
        Ok(())
    }

    pub fn bind(&self) {
        self.device.use_program(Some(self.handle));
    }

    pub fn unbind(&self) {
        self.device.use_program(None);
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        self.device.destroy_handle(ResourceKind::Program, self.handle);
    }
}

fn compile_logged(stage: ShaderStage, source: &str) -> Result<compiler::CompiledStage, GfxError> {
    compiler::compile(stage, source).map_err(|e| {
        log::error!("{e}");
        log::error!("source:\n{source}");
        GfxError::from(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShaderError;
    use crate::gfx::device::recording::{DeviceCall, RecordingDevice};
    use cgmath::SquareMatrix;

    const VERTEX: &str = r#"
@group(0) @binding(0) var<uniform> u_mvp: mat4x4<f32>;
@group(0) @binding(1) var<uniform> u_tint: vec3<f32>;

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) tint: vec3<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip = u_mvp * vec4<f32>(position, 1.0);
    out.tint = u_tint;
    return out;
}
"#;

    const FRAGMENT: &str = r#"
@fragment
fn fs_main(@location(0) tint: vec3<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(tint, 1.0);
}
"#;

    #[test]
    fn test_invalid_source_never_creates_program() {
        let (recorder, device) = RecordingDevice::shared();
        let result = ShaderProgram::new(&device, "this is not wgsl", FRAGMENT);

        assert!(matches!(
            result,
            Err(GfxError::Shader(ShaderError::Compile { .. }))
        ));
        assert_eq!(recorder.count(|c| matches!(c, DeviceCall::CreateProgram { .. })), 0);
    }

    #[test]
    fn test_reflect_lists_active_uniforms() {
        let (_, device) = RecordingDevice::shared();
        let program = ShaderProgram::new(&device, VERTEX, FRAGMENT).unwrap();
        let reflected = program.reflect();

        assert_eq!(reflected.get(&0).map(String::as_str), Some("u_mvp"));
        assert_eq!(reflected.get(&1).map(String::as_str), Some("u_tint"));
        assert_eq!(reflected.len(), 2);
    }

    #[test]
    fn test_unknown_uniform_is_noop() {
        let (recorder, device) = RecordingDevice::shared();
        let program = ShaderProgram::new(&device, VERTEX, FRAGMENT).unwrap();

        program.uniform("u_missing", 1.0f32);
        assert_eq!(recorder.count(|c| matches!(c, DeviceCall::Uniform { .. })), 0);

        program.uniform("u_mvp", Matrix4::<f32>::identity());
        assert_eq!(
            recorder.count(|c| matches!(c, DeviceCall::Uniform { binding: 0, len: 64, .. })),
            1
        );
    }

    #[test]
    fn test_uniform_array_uploads_every_element() {
        let (recorder, device) = RecordingDevice::shared();
        let program = ShaderProgram::new(&device, VERTEX, FRAGMENT).unwrap();

        program.uniform_array("u_mvp", &[Matrix4::<f32>::identity(); 2]);
        assert_eq!(
            recorder.count(|c| matches!(c, DeviceCall::Uniform { binding: 0, len: 128, .. })),
            1
        );
    }

    #[test]
    fn test_program_handle_released_on_drop() {
        let (recorder, device) = RecordingDevice::shared();
        let program = ShaderProgram::new(&device, VERTEX, FRAGMENT).unwrap();
        let handle = program.handle();
        drop(program);

        assert_eq!(
            recorder.count(|c| *c == DeviceCall::Destroy(ResourceKind::Program, handle)),
            1
        );
    }

    #[test]
    fn test_mat3_columns_are_padded() {
        let bytes = UniformValue::Mat3(Matrix3::identity()).to_bytes();
        assert_eq!(bytes.len(), 48);
        let floats: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
        assert_eq!(floats[4..8], [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_float_array_uses_sixteen_byte_stride() {
        let bytes = UniformValue::from(vec![1.0f32, 2.0, 3.0]).to_bytes();
        assert_eq!(bytes.len(), 48);
        let floats: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
        assert_eq!(floats[4], 2.0);
    }
}
