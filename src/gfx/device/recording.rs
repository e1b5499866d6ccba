//! Test double that records every device call

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use super::*;
use crate::error::GfxError;

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Create(ResourceKind, RawHandle),
    Destroy(ResourceKind, RawHandle),
    BufferData {
        buffer: RawHandle,
        target: BufferTarget,
        len: usize,
    },
    BufferSubData {
        buffer: RawHandle,
        offset: u64,
        len: usize,
    },
    TextureImage {
        texture: RawHandle,
        width: u32,
        height: u32,
        format: TextureFormat,
        levels: usize,
    },
    RenderbufferStorage {
        renderbuffer: RawHandle,
        format: TextureFormat,
        width: u32,
        height: u32,
    },
    VertexAttribute {
        vao: RawHandle,
        buffer: RawHandle,
        attribute: VertexAttribute,
    },
    Attach {
        framebuffer: RawHandle,
        point: AttachmentPoint,
        source: AttachmentSource,
    },
    BindFramebuffer(Option<RawHandle>),
    CreateProgram {
        handle: RawHandle,
    },
    UseProgram(Option<RawHandle>),
    Uniform {
        program: RawHandle,
        binding: u32,
        len: usize,
    },
    BindTexture {
        program: RawHandle,
        binding: TextureBinding,
        texture: RawHandle,
    },
    Clear {
        color: Option<[f32; 4]>,
        depth: Option<f32>,
    },
    Draw(DrawCall),
}

#[derive(Default)]
pub struct RecordingDevice {
    calls: RefCell<Vec<DeviceCall>>,
    next: Cell<u32>,
    fail_creation: Cell<bool>,
    extents: RefCell<HashMap<RawHandle, ((u32, u32), TextureFormat)>>,
    attachments: RefCell<HashMap<RawHandle, Vec<(AttachmentPoint, AttachmentSource)>>>,
}

impl RecordingDevice {
    /// The recorder plus the same device as a `SharedDevice`
    pub fn shared() -> (Rc<RecordingDevice>, SharedDevice) {
        let recorder = Rc::new(RecordingDevice::default());
        let device: SharedDevice = recorder.clone();
        (recorder, device)
    }

    pub fn fail_creation(&self, fail: bool) {
        self.fail_creation.set(fail);
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| predicate(c)).count()
    }

    pub fn draws(&self) -> Vec<DrawCall> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                DeviceCall::Draw(call) => Some(*call),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: DeviceCall) {
        self.calls.borrow_mut().push(call);
    }

    fn allocate(&self) -> RawHandle {
        let id = self.next.get() + 1;
        self.next.set(id);
        RawHandle::new(id).unwrap_or(RawHandle::MIN)
    }
}

impl RenderDevice for RecordingDevice {
    fn create_handle(&self, kind: ResourceKind) -> GfxResult<RawHandle> {
        if self.fail_creation.get() {
            return Err(GfxError::HandleCreation {
                kind,
                reason: "creation disabled".to_owned(),
            });
        }
        let handle = self.allocate();
        self.record(DeviceCall::Create(kind, handle));
        Ok(handle)
    }

    fn destroy_handle(&self, kind: ResourceKind, handle: RawHandle) {
        self.extents.borrow_mut().remove(&handle);
        self.attachments.borrow_mut().remove(&handle);
        self.record(DeviceCall::Destroy(kind, handle));
    }

    fn buffer_data(
        &self,
        buffer: RawHandle,
        target: BufferTarget,
        data: &[u8],
        _usage: BufferUsage,
    ) -> GfxResult<()> {
        self.record(DeviceCall::BufferData {
            buffer,
            target,
            len: data.len(),
        });
        Ok(())
    }

    fn buffer_sub_data(&self, buffer: RawHandle, offset: u64, data: &[u8]) -> GfxResult<()> {
        self.record(DeviceCall::BufferSubData {
            buffer,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn texture_image(&self, texture: RawHandle, image: &TextureImage) -> GfxResult<()> {
        self.extents
            .borrow_mut()
            .insert(texture, ((image.width, image.height), image.format));
        self.record(DeviceCall::TextureImage {
            texture,
            width: image.width,
            height: image.height,
            format: image.format,
            levels: image.levels.len(),
        });
        Ok(())
    }

    fn renderbuffer_storage(
        &self,
        renderbuffer: RawHandle,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> GfxResult<()> {
        self.extents
            .borrow_mut()
            .insert(renderbuffer, ((width, height), format));
        self.record(DeviceCall::RenderbufferStorage {
            renderbuffer,
            format,
            width,
            height,
        });
        Ok(())
    }

    fn vertex_attribute(
        &self,
        vao: RawHandle,
        buffer: RawHandle,
        attribute: &VertexAttribute,
    ) -> GfxResult<()> {
        self.record(DeviceCall::VertexAttribute {
            vao,
            buffer,
            attribute: *attribute,
        });
        Ok(())
    }

    fn framebuffer_attach(
        &self,
        framebuffer: RawHandle,
        point: AttachmentPoint,
        source: AttachmentSource,
    ) -> GfxResult<()> {
        let mut attachments = self.attachments.borrow_mut();
        let list = attachments.entry(framebuffer).or_default();
        list.retain(|(existing, _)| *existing != point);
        list.push((point, source));
        self.record(DeviceCall::Attach {
            framebuffer,
            point,
            source,
        });
        Ok(())
    }

    fn framebuffer_status(&self, framebuffer: RawHandle) -> FramebufferStatus {
        let extents = self.extents.borrow();
        let infos: Vec<AttachmentInfo> = self
            .attachments
            .borrow()
            .get(&framebuffer)
            .map(|list| {
                list.iter()
                    .map(|(point, source)| {
                        let handle = match source {
                            AttachmentSource::Texture(h) | AttachmentSource::Renderbuffer(h) => h,
                        };
                        let storage = extents.get(handle);
                        AttachmentInfo {
                            point: *point,
                            extent: storage.map(|(extent, _)| *extent),
                            format: storage.map(|(_, format)| *format),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        attachment_status(&infos)
    }

    fn bind_framebuffer(&self, framebuffer: Option<RawHandle>) {
        self.record(DeviceCall::BindFramebuffer(framebuffer));
    }

    fn create_program(&self, _desc: &ProgramDesc) -> GfxResult<RawHandle> {
        let handle = self.allocate();
        self.record(DeviceCall::CreateProgram { handle });
        Ok(handle)
    }

    fn use_program(&self, program: Option<RawHandle>) {
        self.record(DeviceCall::UseProgram(program));
    }

    fn set_uniform(&self, program: RawHandle, binding: u32, bytes: &[u8]) {
        self.record(DeviceCall::Uniform {
            program,
            binding,
            len: bytes.len(),
        });
    }

    fn bind_texture(&self, program: RawHandle, binding: TextureBinding, texture: RawHandle) {
        self.record(DeviceCall::BindTexture {
            program,
            binding,
            texture,
        });
    }

    fn clear(&self, color: Option<[f32; 4]>, depth: Option<f32>) {
        self.record(DeviceCall::Clear { color, depth });
    }

    fn draw(&self, call: &DrawCall) -> GfxResult<()> {
        self.record(DeviceCall::Draw(*call));
        Ok(())
    }
}
