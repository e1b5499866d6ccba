//! [`RenderDevice`] on top of wgpu
//!
//! Handles index small tables of wgpu objects. Uploads go straight to the
//! queue; clears and draws are recorded per framebuffer and replayed into
//! render passes by [`WgpuDevice::flush`]. Each draw captures the program's
//! uniform values and texture bindings at the time it was issued, so setting
//! a uniform between two draws behaves as it would in GL.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};

use wgpu::util::{BufferInitDescriptor, DeviceExt};

use super::*;
use crate::error::{GfxError, GfxResult};
use crate::gfx::shader::BindingKind;

/// Depth format of the window surface pass
pub const SURFACE_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const BUFFER_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::VERTEX
    .union(wgpu::BufferUsages::INDEX)
    .union(wgpu::BufferUsages::UNIFORM)
    .union(wgpu::BufferUsages::COPY_DST);

struct BufferEntry {
    /// CPU copy, padded to the copy alignment, used for partial writes
    shadow: Vec<u8>,
    len: u64,
    gpu: Option<wgpu::Buffer>,
}

struct TextureEntry {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: TextureFormat,
    extent: (u32, u32),
}

struct ProgramEntry {
    label: String,
    vertex: (wgpu::ShaderModule, String),
    fragment: Option<(wgpu::ShaderModule, String)>,
    bindings: BTreeMap<u32, (String, BindingKind)>,
    vertex_inputs: BTreeSet<u32>,
    uniforms: BTreeMap<u32, Vec<u8>>,
    textures: BTreeMap<u32, RawHandle>,
}

/// A draw with everything it needs captured at record time
#[derive(Debug, Clone)]
struct RecordedDraw {
    program: RawHandle,
    call: DrawCall,
    uniforms: Vec<(u32, Vec<u8>)>,
    textures: Vec<(u32, RawHandle)>,
}

#[derive(Debug, Clone, Default)]
struct RecordedPass {
    /// `None` is the window surface
    target: Option<RawHandle>,
    clear_color: Option<[f32; 4]>,
    clear_depth: Option<f32>,
    draws: Vec<RecordedDraw>,
}

/// Splits the command stream into passes: a new pass starts whenever the
/// framebuffer changes or a clear follows a draw.
#[derive(Debug, Default)]
struct FrameRecorder {
    target: Option<RawHandle>,
    passes: Vec<RecordedPass>,
}

impl FrameRecorder {
    fn bind(&mut self, target: Option<RawHandle>) {
        self.target = target;
    }

    fn current(&mut self, fresh: bool) -> &mut RecordedPass {
        let reuse = self
            .passes
            .last()
            .is_some_and(|p| p.target == self.target && !(fresh && !p.draws.is_empty()));
        if !reuse {
            self.passes.push(RecordedPass {
                target: self.target,
                ..Default::default()
            });
        }
        let last = self.passes.len() - 1;
        &mut self.passes[last]
    }

    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>) {
        let pass = self.current(true);
        if color.is_some() {
            pass.clear_color = color;
        }
        if depth.is_some() {
            pass.clear_depth = depth;
        }
    }

    fn draw(&mut self, draw: RecordedDraw) {
        self.current(false).draws.push(draw);
    }

    fn take(&mut self) -> Vec<RecordedPass> {
        std::mem::take(&mut self.passes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VertexBufferKey {
    buffer: RawHandle,
    stride: u64,
    instanced: bool,
    attributes: Vec<(u32, VertexFormat, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: RawHandle,
    topology: Topology,
    strip_index: Option<IndexFormat>,
    /// Buffer handles are not part of the layout
    buffers: Vec<(u64, bool, Vec<(u32, VertexFormat, u64)>)>,
    colors: Vec<wgpu::TextureFormat>,
    depth: Option<wgpu::TextureFormat>,
}

/// Groups a vertex array's attributes into one vertex buffer slot per
/// (buffer, stride, step mode), keeping only locations the program reads.
fn vertex_buffer_layout(
    attributes: &BTreeMap<u32, (RawHandle, VertexAttribute)>,
    inputs: &BTreeSet<u32>,
) -> GfxResult<Vec<VertexBufferKey>> {
    if let Some(&location) = inputs.iter().find(|l| !attributes.contains_key(l)) {
        return Err(GfxError::MissingVertexInput { location });
    }

    let mut slots: Vec<VertexBufferKey> = Vec::new();
    for (location, (buffer, attribute)) in attributes {
        if !inputs.contains(location) {
            continue;
        }
        let stride = match attribute.stride {
            0 => attribute.format.size(),
            s => s as u64,
        };
        let instanced = attribute.divisor != 0;
        let entry = (*location, attribute.format, attribute.offset);
        match slots
            .iter_mut()
            .find(|s| s.buffer == *buffer && s.stride == stride && s.instanced == instanced)
        {
            Some(slot) => slot.attributes.push(entry),
            None => slots.push(VertexBufferKey {
                buffer: *buffer,
                stride,
                instanced,
                attributes: vec![entry],
            }),
        }
    }
    Ok(slots)
}

/// Byte range to rewrite for a sub-data update, widened to 4-byte boundaries
fn aligned_range(offset: u64, len: u64, padded_len: u64) -> (u64, u64) {
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    let start = offset / align * align;
    let end = (offset + len).div_ceil(align) * align;
    (start, end.min(padded_len))
}

fn padded(data: &[u8]) -> Vec<u8> {
    let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
    let mut out = data.to_vec();
    out.resize(data.len().div_ceil(align) * align, 0);
    out
}

#[derive(Default)]
struct DeviceState {
    next_handle: u32,
    buffers: HashMap<RawHandle, BufferEntry>,
    textures: HashMap<RawHandle, TextureEntry>,
    renderbuffers: HashMap<RawHandle, TextureEntry>,
    vertex_arrays: HashMap<RawHandle, BTreeMap<u32, (RawHandle, VertexAttribute)>>,
    framebuffers: HashMap<RawHandle, BTreeMap<AttachmentPoint, AttachmentSource>>,
    programs: HashMap<RawHandle, ProgramEntry>,
    /// Handles allocated but not yet given storage
    reserved: HashMap<RawHandle, ResourceKind>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    current_program: Option<RawHandle>,
    frame: FrameRecorder,
}

impl DeviceState {
    fn allocate(&mut self) -> GfxResult<RawHandle> {
        let next = self.next_handle.checked_add(1).ok_or(GfxError::HandleCreation {
            kind: ResourceKind::Buffer,
            reason: "handle space exhausted".to_owned(),
        })?;
        self.next_handle = next;
        NonZeroU32::new(next).ok_or(GfxError::HandleCreation {
            kind: ResourceKind::Buffer,
            reason: "handle space exhausted".to_owned(),
        })
    }

    fn attachment(&self, source: AttachmentSource) -> Option<&TextureEntry> {
        match source {
            AttachmentSource::Texture(h) => self.textures.get(&h),
            AttachmentSource::Renderbuffer(h) => self.renderbuffers.get(&h),
        }
    }

    fn known(&self, kind: ResourceKind, handle: RawHandle) -> bool {
        self.reserved.get(&handle) == Some(&kind)
            || match kind {
                ResourceKind::Buffer => self.buffers.contains_key(&handle),
                ResourceKind::Texture => self.textures.contains_key(&handle),
                ResourceKind::Renderbuffer => self.renderbuffers.contains_key(&handle),
                ResourceKind::VertexArray => self.vertex_arrays.contains_key(&handle),
                ResourceKind::Framebuffer => self.framebuffers.contains_key(&handle),
                ResourceKind::Program => self.programs.contains_key(&handle),
            }
    }
}

fn unknown(kind: ResourceKind, handle: RawHandle) -> GfxError {
    GfxError::UnknownHandle {
        kind,
        handle: handle.get(),
    }
}

/// The production render device
pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    surface_format: wgpu::TextureFormat,
    state: RefCell<DeviceState>,
    errors: Arc<Mutex<Vec<String>>>,
    white: TextureEntry,
    sampler: wgpu::Sampler,
}

impl WgpuDevice {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        device.on_uncaptured_error(Box::new(move |error| {
            if let Ok(mut errors) = sink.lock() {
                errors.push(error.to_string());
            }
        }));

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Default Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            ..Default::default()
        });

        let white = Self::allocate_texture(&device, "White", 1, 1, TextureFormat::Rgba8Unorm, 1);
        queue.write_texture(
            white.texture.as_image_copy(),
            &[255; 4],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );

        Self {
            device,
            queue,
            surface_format,
            state: RefCell::new(DeviceState::default()),
            errors,
            white,
            sampler,
        }
    }

    pub fn raw_device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    /// The wgpu texture behind a texture or renderbuffer handle
    pub fn texture(&self, handle: RawHandle) -> Option<wgpu::Texture> {
        let state = self.state.borrow();
        state
            .textures
            .get(&handle)
            .or_else(|| state.renderbuffers.get(&handle))
            .map(|t| t.texture.clone())
    }

    /// Validation errors reported by wgpu since the last call
    pub fn drain_errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .map(|mut errors| std::mem::take(&mut *errors))
            .unwrap_or_default()
    }

    fn allocate_texture(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
        mip_level_count: u32,
    ) -> TextureEntry {
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT;
        if !format.is_depth() {
            usage |= wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC;
        }
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_level_count.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: format.to_wgpu(),
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        TextureEntry {
            texture,
            view,
            format,
            extent: (width, height),
        }
    }

    /// Replays the recorded frame into `encoder`. Surface passes render into
    /// `surface` with `surface_depth` as their depth buffer.
    pub fn flush(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        surface: &wgpu::TextureView,
        surface_depth: &wgpu::TextureView,
    ) {
        let mut state = self.state.borrow_mut();
        let passes = state.frame.take();

        for pass in passes {
            if let Err(e) = self.replay(&mut state, encoder, &pass, surface, surface_depth) {
                log::warn!("skipped render pass: {e}");
            }
        }
    }

    /// Forgets everything recorded since the last flush. Returns the number
    /// of passes dropped.
    pub fn discard_frame(&self) -> usize {
        self.state.borrow_mut().frame.take().len()
    }

    fn replay(
        &self,
        state: &mut DeviceState,
        encoder: &mut wgpu::CommandEncoder,
        pass: &RecordedPass,
        surface: &wgpu::TextureView,
        surface_depth: &wgpu::TextureView,
    ) -> GfxResult<()> {
        let mut colors: Vec<(wgpu::TextureView, wgpu::TextureFormat)> = Vec::new();
        let mut depth: Option<(wgpu::TextureView, wgpu::TextureFormat)> = None;
        match pass.target {
            None => {
                colors.push((surface.clone(), self.surface_format));
                depth = Some((surface_depth.clone(), SURFACE_DEPTH_FORMAT));
            }
            Some(framebuffer) => {
                let attachments = state
                    .framebuffers
                    .get(&framebuffer)
                    .ok_or_else(|| unknown(ResourceKind::Framebuffer, framebuffer))?;
                for (point, source) in attachments {
                    let Some(entry) = state.attachment(*source) else {
                        continue;
                    };
                    let attachment = (entry.view.clone(), entry.format.to_wgpu());
                    match point {
                        AttachmentPoint::Color(_) => colors.push(attachment),
                        AttachmentPoint::Depth => depth = Some(attachment),
                    }
                }
            }
        }

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = colors
            .iter()
            .map(|(view, _)| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: match pass.clear_color {
                            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                                r: r as f64,
                                g: g as f64,
                                b: b as f64,
                                a: a as f64,
                            }),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let color_formats: Vec<wgpu::TextureFormat> = colors.iter().map(|(_, f)| *f).collect();
        let depth_format = depth.as_ref().map(|(_, f)| *f);

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Recorded Pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth.as_ref().map(|(view, _)| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: match pass.clear_depth {
                            Some(d) => wgpu::LoadOp::Clear(d),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        for draw in &pass.draws {
            if let Err(e) = self.encode_draw(state, &mut render_pass, draw, &color_formats, depth_format)
            {
                log::warn!("skipped draw: {e}");
            }
        }
        Ok(())
    }

    fn encode_draw(
        &self,
        state: &mut DeviceState,
        render_pass: &mut wgpu::RenderPass,
        draw: &RecordedDraw,
        colors: &[wgpu::TextureFormat],
        depth: Option<wgpu::TextureFormat>,
    ) -> GfxResult<()> {
        let call = &draw.call;
        let program = state
            .programs
            .get(&draw.program)
            .ok_or_else(|| unknown(ResourceKind::Program, draw.program))?;
        let attributes = state
            .vertex_arrays
            .get(&call.vao)
            .ok_or_else(|| unknown(ResourceKind::VertexArray, call.vao))?;
        let slots = vertex_buffer_layout(attributes, &program.vertex_inputs)?;

        let strip_index = match call.kind {
            DrawKind::Indexed { format, .. } if call.topology.is_strip() => Some(format),
            _ => None,
        };
        let key = PipelineKey {
            program: draw.program,
            topology: call.topology,
            strip_index,
            buffers: slots
                .iter()
                .map(|s| (s.stride, s.instanced, s.attributes.clone()))
                .collect(),
            colors: colors.to_vec(),
            depth,
        };

        if !state.pipelines.contains_key(&key) {
            let pipeline = self.build_pipeline(program, &key);
            state.pipelines.insert(key.clone(), pipeline);
        }
        let Some(pipeline) = state.pipelines.get(&key) else {
            return Ok(());
        };
        render_pass.set_pipeline(pipeline);

        if !program.bindings.is_empty() {
            let bind_group = self.bind_group(state, program, pipeline, draw)?;
            render_pass.set_bind_group(0, &bind_group, &[]);
        }

        for (slot, vertex_buffer) in slots.iter().enumerate() {
            let gpu = state
                .buffers
                .get(&vertex_buffer.buffer)
                .and_then(|b| b.gpu.as_ref())
                .ok_or_else(|| unknown(ResourceKind::Buffer, vertex_buffer.buffer))?;
            render_pass.set_vertex_buffer(slot as u32, gpu.slice(..));
        }

        let instances = 0..call.instances.max(1);
        match call.kind {
            DrawKind::Arrays { count } => render_pass.draw(0..count, instances),
            DrawKind::Indexed {
                buffer,
                format,
                count,
            } => {
                let entry = state
                    .buffers
                    .get(&buffer)
                    .ok_or_else(|| unknown(ResourceKind::Buffer, buffer))?;
                let gpu = entry
                    .gpu
                    .as_ref()
                    .ok_or_else(|| unknown(ResourceKind::Buffer, buffer))?;
                let bytes = (count as u64 * format.size() as u64).min(entry.len);
                render_pass.set_index_buffer(gpu.slice(..bytes), format.to_wgpu());
                render_pass.draw_indexed(0..count, 0, instances);
            }
        }
        Ok(())
    }

    fn build_pipeline(&self, program: &ProgramEntry, key: &PipelineKey) -> wgpu::RenderPipeline {
        log::debug!("building pipeline for {} ({:?})", program.label, key.topology);

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = key
            .buffers
            .iter()
            .map(|(_, _, attrs)| {
                attrs
                    .iter()
                    .map(|(location, format, offset)| wgpu::VertexAttribute {
                        format: format.to_wgpu(),
                        offset: *offset,
                        shader_location: *location,
                    })
                    .collect()
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = key
            .buffers
            .iter()
            .zip(&attributes)
            .map(|((stride, instanced, _), attributes)| wgpu::VertexBufferLayout {
                array_stride: *stride,
                step_mode: if *instanced {
                    wgpu::VertexStepMode::Instance
                } else {
                    wgpu::VertexStepMode::Vertex
                },
                attributes,
            })
            .collect();

        let targets: Vec<Option<wgpu::ColorTargetState>> = key
            .colors
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(program.label.as_str()),
                layout: None,
                vertex: wgpu::VertexState {
                    module: &program.vertex.0,
                    entry_point: Some(program.vertex.1.as_str()),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &buffers,
                },
                primitive: wgpu::PrimitiveState {
                    topology: key.topology.to_wgpu(),
                    strip_index_format: key.strip_index.map(IndexFormat::to_wgpu),
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: key.depth.map(|format| wgpu::DepthStencilState {
                    format,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: program
                    .fragment
                    .as_ref()
                    .map(|(module, entry)| wgpu::FragmentState {
                        module,
                        entry_point: Some(entry.as_str()),
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                        targets: &targets,
                    }),
                multiview: None,
                cache: None,
            })
    }

    fn bind_group(
        &self,
        state: &DeviceState,
        program: &ProgramEntry,
        pipeline: &wgpu::RenderPipeline,
        draw: &RecordedDraw,
    ) -> GfxResult<wgpu::BindGroup> {
        let uniforms: BTreeMap<u32, wgpu::Buffer> = draw
            .uniforms
            .iter()
            .map(|(binding, bytes)| {
                let buffer = self.device.create_buffer_init(&BufferInitDescriptor {
                    label: Some("Uniform Snapshot"),
                    contents: bytes,
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                (*binding, buffer)
            })
            .collect();
        let textures: BTreeMap<u32, RawHandle> = draw.textures.iter().copied().collect();

        let mut entries = Vec::new();
        for (binding, (name, kind)) in &program.bindings {
            let resource = match kind {
                BindingKind::Uniform { .. } | BindingKind::Block { .. } => {
                    match uniforms.get(binding) {
                        Some(buffer) => buffer.as_entire_binding(),
                        None => {
                            return Err(GfxError::UnsupportedFormat(format!(
                                "uniform `{name}` has no value"
                            )))
                        }
                    }
                }
                BindingKind::Texture => {
                    let view = textures
                        .get(binding)
                        .and_then(|h| state.textures.get(h).or_else(|| state.renderbuffers.get(h)))
                        .map_or(&self.white.view, |t| &t.view);
                    wgpu::BindingResource::TextureView(view)
                }
                BindingKind::Sampler => wgpu::BindingResource::Sampler(&self.sampler),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource,
            });
        }

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.label.as_str()),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &entries,
        }))
    }
}

impl RenderDevice for WgpuDevice {
    fn create_handle(&self, kind: ResourceKind) -> GfxResult<RawHandle> {
        let mut state = self.state.borrow_mut();
        let handle = state.allocate().map_err(|_| GfxError::HandleCreation {
            kind,
            reason: "handle space exhausted".to_owned(),
        })?;
        match kind {
            ResourceKind::VertexArray => {
                state.vertex_arrays.insert(handle, BTreeMap::new());
            }
            ResourceKind::Framebuffer => {
                state.framebuffers.insert(handle, BTreeMap::new());
            }
            _ => {
                state.reserved.insert(handle, kind);
            }
        }
        Ok(handle)
    }

    fn destroy_handle(&self, kind: ResourceKind, handle: RawHandle) {
        let mut state = self.state.borrow_mut();
        state.reserved.remove(&handle);
        match kind {
            ResourceKind::Buffer => {
                if let Some(gpu) = state.buffers.remove(&handle).and_then(|b| b.gpu) {
                    gpu.destroy();
                }
            }
            ResourceKind::Texture => {
                if let Some(entry) = state.textures.remove(&handle) {
                    entry.texture.destroy();
                }
            }
            ResourceKind::Renderbuffer => {
                if let Some(entry) = state.renderbuffers.remove(&handle) {
                    entry.texture.destroy();
                }
            }
            ResourceKind::VertexArray => {
                state.vertex_arrays.remove(&handle);
            }
            ResourceKind::Framebuffer => {
                state.framebuffers.remove(&handle);
            }
            ResourceKind::Program => {
                state.programs.remove(&handle);
                state.pipelines.retain(|key, _| key.program != handle);
                if state.current_program == Some(handle) {
                    state.current_program = None;
                }
            }
        }
    }

    fn buffer_data(
        &self,
        buffer: RawHandle,
        target: BufferTarget,
        data: &[u8],
        usage: BufferUsage,
    ) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.known(ResourceKind::Buffer, buffer) {
            return Err(unknown(ResourceKind::Buffer, buffer));
        }
        state.reserved.remove(&buffer);

        let shadow = padded(data);
        let label = format!("{target:?} Buffer ({usage:?})");
        let gpu = (!data.is_empty()).then(|| {
            self.device.create_buffer_init(&BufferInitDescriptor {
                label: Some(label.as_str()),
                contents: &shadow,
                usage: BUFFER_USAGE,
            })
        });
        if let Some(old) = state.buffers.insert(
            buffer,
            BufferEntry {
                shadow,
                len: data.len() as u64,
                gpu,
            },
        ) {
            if let Some(gpu) = old.gpu {
                gpu.destroy();
            }
        }
        Ok(())
    }

    fn buffer_sub_data(&self, buffer: RawHandle, offset: u64, data: &[u8]) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        let entry = state
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| unknown(ResourceKind::Buffer, buffer))?;

        let len = data.len() as u64;
        if offset.checked_add(len).is_none_or(|end| end > entry.len) {
            return Err(GfxError::OutOfBounds {
                offset,
                len,
                size: entry.len,
            });
        }
        let start = offset as usize;
        entry.shadow[start..start + data.len()].copy_from_slice(data);

        if let Some(gpu) = &entry.gpu {
            let (from, to) = aligned_range(offset, len, entry.shadow.len() as u64);
            if to > from {
                self.queue
                    .write_buffer(gpu, from, &entry.shadow[from as usize..to as usize]);
            }
        }
        Ok(())
    }

    fn texture_image(&self, texture: RawHandle, image: &TextureImage) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.known(ResourceKind::Texture, texture) {
            return Err(unknown(ResourceKind::Texture, texture));
        }
        if image.format.is_depth() && !image.levels.is_empty() {
            return Err(GfxError::UnsupportedFormat(
                "depth textures cannot be uploaded from pixel data".to_owned(),
            ));
        }
        state.reserved.remove(&texture);

        let entry = Self::allocate_texture(
            &self.device,
            "Texture2D",
            image.width,
            image.height,
            image.format,
            image.mip_level_count,
        );

        let bpp = image.format.bytes_per_pixel() as u32;
        for (level, pixels) in image.levels.iter().enumerate() {
            let width = (image.width >> level).max(1);
            let height = (image.height >> level).max(1);
            let expected = (width * height * bpp) as usize;
            if pixels.len() != expected {
                return Err(GfxError::PixelDataSize {
                    expected,
                    actual: pixels.len(),
                });
            }
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &entry.texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                pixels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * bpp),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }

        if let Some(old) = state.textures.insert(texture, entry) {
            old.texture.destroy();
        }
        Ok(())
    }

    fn renderbuffer_storage(
        &self,
        renderbuffer: RawHandle,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.known(ResourceKind::Renderbuffer, renderbuffer) {
            return Err(unknown(ResourceKind::Renderbuffer, renderbuffer));
        }
        state.reserved.remove(&renderbuffer);
        let entry = Self::allocate_texture(&self.device, "Renderbuffer", width, height, format, 1);
        if let Some(old) = state.renderbuffers.insert(renderbuffer, entry) {
            old.texture.destroy();
        }
        Ok(())
    }

    fn vertex_attribute(
        &self,
        vao: RawHandle,
        buffer: RawHandle,
        attribute: &VertexAttribute,
    ) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.buffers.contains_key(&buffer) {
            return Err(unknown(ResourceKind::Buffer, buffer));
        }
        let attributes = state
            .vertex_arrays
            .get_mut(&vao)
            .ok_or_else(|| unknown(ResourceKind::VertexArray, vao))?;
        attributes.insert(attribute.index, (buffer, *attribute));
        Ok(())
    }

    fn framebuffer_attach(
        &self,
        framebuffer: RawHandle,
        point: AttachmentPoint,
        source: AttachmentSource,
    ) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        let attachments = state
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or_else(|| unknown(ResourceKind::Framebuffer, framebuffer))?;
        attachments.insert(point, source);
        Ok(())
    }

    fn framebuffer_status(&self, framebuffer: RawHandle) -> FramebufferStatus {
        let state = self.state.borrow();
        let Some(attachments) = state.framebuffers.get(&framebuffer) else {
            return FramebufferStatus::MissingAttachment;
        };
        let infos: Vec<AttachmentInfo> = attachments
            .iter()
            .map(|(point, source)| {
                let entry = state.attachment(*source);
                AttachmentInfo {
                    point: *point,
                    extent: entry.map(|e| e.extent),
                    format: entry.map(|e| e.format),
                }
            })
            .collect();
        attachment_status(&infos)
    }

    fn bind_framebuffer(&self, framebuffer: Option<RawHandle>) {
        self.state.borrow_mut().frame.bind(framebuffer);
    }

    fn create_program(&self, desc: &ProgramDesc) -> GfxResult<RawHandle> {
        let module = |stage: &StageModule| {
            let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(stage.source.into()),
            });
            (module, stage.entry_point.to_owned())
        };

        let uniforms = desc
            .layout
            .bindings
            .iter()
            .filter_map(|(binding, (_, kind))| match kind {
                BindingKind::Uniform { size } | BindingKind::Block { size } => {
                    Some((*binding, vec![0u8; (*size as usize).next_multiple_of(16)]))
                }
                _ => None,
            })
            .collect();

        let entry = ProgramEntry {
            label: desc.label.to_owned(),
            vertex: module(&desc.vertex),
            fragment: desc.fragment.as_ref().map(module),
            bindings: desc.layout.bindings.clone(),
            vertex_inputs: desc.layout.vertex_inputs.clone(),
            uniforms,
            textures: BTreeMap::new(),
        };

        let mut state = self.state.borrow_mut();
        let handle = state.allocate().map_err(|_| GfxError::HandleCreation {
            kind: ResourceKind::Program,
            reason: "handle space exhausted".to_owned(),
        })?;
        state.programs.insert(handle, entry);
        Ok(handle)
    }

    fn use_program(&self, program: Option<RawHandle>) {
        self.state.borrow_mut().current_program = program;
    }

    fn set_uniform(&self, program: RawHandle, binding: u32, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        let Some(value) = state
            .programs
            .get_mut(&program)
            .and_then(|p| p.uniforms.get_mut(&binding))
        else {
            return;
        };
        if value.len() < bytes.len() {
            value.resize(bytes.len().next_multiple_of(16), 0);
        }
        value[..bytes.len()].copy_from_slice(bytes);
    }

    fn bind_texture(&self, program: RawHandle, binding: TextureBinding, texture: RawHandle) {
        let mut state = self.state.borrow_mut();
        if let Some(program) = state.programs.get_mut(&program) {
            program.textures.insert(binding.texture, texture);
        }
    }

    fn clear(&self, color: Option<[f32; 4]>, depth: Option<f32>) {
        self.state.borrow_mut().frame.clear(color, depth);
    }

    fn draw(&self, call: &DrawCall) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        let handle = state.current_program.ok_or(GfxError::NoProgramBound)?;
        let program = state
            .programs
            .get(&handle)
            .ok_or_else(|| unknown(ResourceKind::Program, handle))?;
        let attributes = state
            .vertex_arrays
            .get(&call.vao)
            .ok_or_else(|| unknown(ResourceKind::VertexArray, call.vao))?;
        vertex_buffer_layout(attributes, &program.vertex_inputs)?;

        let draw = RecordedDraw {
            program: handle,
            call: *call,
            uniforms: program
                .uniforms
                .iter()
                .map(|(b, v)| (*b, v.clone()))
                .collect(),
            textures: program.textures.iter().map(|(b, t)| (*b, *t)).collect(),
        };
        state.frame.draw(draw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u32) -> RawHandle {
        NonZeroU32::new(n).unwrap()
    }

    fn draw(vao: u32) -> RecordedDraw {
        RecordedDraw {
            program: h(1),
            call: DrawCall {
                vao: h(vao),
                topology: Topology::Triangles,
                kind: DrawKind::Arrays { count: 3 },
                instances: 0,
            },
            uniforms: Vec::new(),
            textures: Vec::new(),
        }
    }

    fn attribute(index: u32, format: VertexFormat, stride: u32, offset: u64) -> VertexAttribute {
        VertexAttribute {
            index,
            format,
            stride,
            offset,
            divisor: 0,
        }
    }

    #[test]
    fn test_clear_after_draw_starts_new_pass() {
        let mut frame = FrameRecorder::default();
        frame.clear(Some([0.0; 4]), Some(1.0));
        frame.draw(draw(1));
        frame.draw(draw(2));
        frame.clear(None, Some(1.0));
        frame.draw(draw(3));

        let passes = frame.take();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].draws.len(), 2);
        assert_eq!(passes[0].clear_color, Some([0.0; 4]));
        assert_eq!(passes[1].clear_color, None);
        assert_eq!(passes[1].clear_depth, Some(1.0));
        assert!(frame.take().is_empty());
    }

    #[test]
    fn test_framebuffer_switch_splits_passes() {
        let mut frame = FrameRecorder::default();
        frame.bind(Some(h(7)));
        frame.clear(Some([1.0; 4]), None);
        frame.draw(draw(1));
        frame.bind(None);
        frame.draw(draw(2));
        frame.bind(Some(h(7)));
        frame.draw(draw(3));

        let targets: Vec<_> = frame.take().iter().map(|p| p.target).collect();
        assert_eq!(targets, vec![Some(h(7)), None, Some(h(7))]);
    }

    #[test]
    fn test_interleaved_attributes_share_a_slot() {
        let mut attributes = BTreeMap::new();
        attributes.insert(0, (h(4), attribute(0, VertexFormat::Float32x3, 20, 0)));
        attributes.insert(2, (h(4), attribute(2, VertexFormat::Float32x2, 20, 12)));
        let inputs = BTreeSet::from([0, 2]);

        let slots = vertex_buffer_layout(&attributes, &inputs).unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].stride, 20);
        assert_eq!(
            slots[0].attributes,
            vec![(0, VertexFormat::Float32x3, 0), (2, VertexFormat::Float32x2, 12)]
        );
    }

    #[test]
    fn test_unread_attributes_are_dropped_and_missing_ones_fail() {
        let mut attributes = BTreeMap::new();
        attributes.insert(0, (h(4), attribute(0, VertexFormat::Float32x3, 32, 0)));
        attributes.insert(1, (h(4), attribute(1, VertexFormat::Float32x3, 32, 12)));

        let slots = vertex_buffer_layout(&attributes, &BTreeSet::from([0])).unwrap();
        assert_eq!(slots[0].attributes.len(), 1);

        let err = vertex_buffer_layout(&attributes, &BTreeSet::from([0, 2])).unwrap_err();
        assert!(matches!(err, GfxError::MissingVertexInput { location: 2 }));
    }

    #[test]
    fn test_instanced_attributes_get_their_own_slot() {
        let mut attributes = BTreeMap::new();
        attributes.insert(0, (h(4), attribute(0, VertexFormat::Float32x3, 0, 0)));
        attributes.insert(
            3,
            (
                h(5),
                VertexAttribute {
                    divisor: 1,
                    ..attribute(3, VertexFormat::Float32x4, 16, 0)
                },
            ),
        );
        let slots = vertex_buffer_layout(&attributes, &BTreeSet::from([0, 3])).unwrap();
        assert_eq!(slots.len(), 2);
        // Zero stride means tightly packed
        assert_eq!(slots[0].stride, 12);
        assert!(slots[1].instanced);
    }

    #[test]
    fn test_sub_data_range_is_widened_to_copy_alignment() {
        assert_eq!(aligned_range(5, 2, 12), (4, 8));
        assert_eq!(aligned_range(8, 4, 12), (8, 12));
        assert_eq!(aligned_range(9, 2, 12), (8, 12));
        assert_eq!(padded(&[1, 2, 3, 4, 5]).len(), 8);
    }
}
