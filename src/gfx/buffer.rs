//! GPU buffers

use bytemuck::Pod;

use crate::error::{GfxError, GfxResult};
use crate::gfx::device::{BufferTarget, BufferUsage, RawHandle, SharedDevice};
use crate::gfx::handle::BufferObject;

/// A device buffer and the size of its current contents
#[derive(Debug)]
pub struct Buffer {
    pub object: BufferObject,
    target: BufferTarget,
    size: u64,
}

impl Buffer {
    pub fn new(device: &SharedDevice, target: BufferTarget) -> Self {
        Self {
            object: BufferObject::new(device),
            target,
            size: 0,
        }
    }

    /// Replaces the whole contents and records the new size
    pub fn set_data(&mut self, data: &[u8], usage: BufferUsage) -> GfxResult<()> {
        let handle = self.object.ensure()?;
        self.object
            .device()
            .buffer_data(handle, self.target, data, usage)?;
        self.size = data.len() as u64;
        Ok(())
    }

    pub fn set_slice<T: Pod>(&mut self, data: &[T], usage: BufferUsage) -> GfxResult<()> {
        self.set_data(bytemuck::cast_slice(data), usage)
    }

    /// Overwrites `data.len()` bytes starting at `offset`
    pub fn set_sub_data(&mut self, offset: u64, data: &[u8]) -> GfxResult<()> {
        let len = data.len() as u64;
        if offset.checked_add(len).is_none_or(|end| end > self.size) {
            return Err(GfxError::OutOfBounds {
                offset,
                len,
                size: self.size,
            });
        }
        let handle = self.object.ensure()?;
        self.object.device().buffer_sub_data(handle, offset, data)
    }

    pub fn handle(&self) -> GfxResult<RawHandle> {
        self.object.ensure()
    }

    pub fn target(&self) -> BufferTarget {
        self.target
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::recording::{DeviceCall, RecordingDevice};

    #[test]
    fn test_set_data_records_size() {
        let (recorder, device) = RecordingDevice::shared();
        let mut buffer = Buffer::new(&device, BufferTarget::Vertex);
        assert!(buffer.is_empty());

        buffer.set_slice(&[1.0f32, 2.0, 3.0], BufferUsage::Static).unwrap();
        assert_eq!(buffer.size(), 12);
        assert_eq!(
            recorder.count(|c| matches!(
                c,
                DeviceCall::BufferData {
                    target: BufferTarget::Vertex,
                    len: 12,
                    ..
                }
            )),
            1
        );
    }

    #[test]
    fn test_sub_data_within_bounds() {
        let (recorder, device) = RecordingDevice::shared();
        let mut buffer = Buffer::new(&device, BufferTarget::Uniform);
        buffer.set_data(&[0u8; 16], BufferUsage::Dynamic).unwrap();

        buffer.set_sub_data(8, &[1u8; 8]).unwrap();
        assert_eq!(
            recorder.count(|c| matches!(c, DeviceCall::BufferSubData { offset: 8, len: 8, .. })),
            1
        );
    }

    #[test]
    fn test_sub_data_past_end_is_rejected() {
        let (recorder, device) = RecordingDevice::shared();
        let mut buffer = Buffer::new(&device, BufferTarget::Vertex);
        buffer.set_data(&[0u8; 16], BufferUsage::Static).unwrap();

        let err = buffer.set_sub_data(12, &[0u8; 8]).unwrap_err();
        assert!(matches!(
            err,
            GfxError::OutOfBounds {
                offset: 12,
                len: 8,
                size: 16
            }
        ));
        assert!(matches!(
            buffer.set_sub_data(u64::MAX, &[0u8; 1]),
            Err(GfxError::OutOfBounds { .. })
        ));
        assert_eq!(recorder.count(|c| matches!(c, DeviceCall::BufferSubData { .. })), 0);
    }
}
