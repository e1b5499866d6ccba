//! Offscreen render targets

use crate::error::{GfxError, GfxResult};
use crate::gfx::device::{
    AttachmentPoint, AttachmentSource, FramebufferStatus, RawHandle, SharedDevice, TextureFormat,
};
use crate::gfx::handle::FramebufferObject;
use crate::gfx::texture::{Renderbuffer, Texture2D, TextureSetup};

#[derive(Debug)]
pub struct Framebuffer {
    pub object: FramebufferObject,
    width: u32,
    height: u32,
}

impl Framebuffer {
    pub fn new(device: &SharedDevice) -> Self {
        Self {
            object: FramebufferObject::new(device),
            width: 0,
            height: 0,
        }
    }

    pub fn attach_color(&mut self, index: u32, texture: &Texture2D) -> GfxResult<()> {
        let handle = self.object.ensure()?;
        let source = AttachmentSource::Texture(texture.handle()?);
        self.object
            .device()
            .framebuffer_attach(handle, AttachmentPoint::Color(index), source)?;
        self.width = texture.width();
        self.height = texture.height();
        Ok(())
    }

    pub fn attach_depth(&mut self, depth: &Renderbuffer) -> GfxResult<()> {
        let handle = self.object.ensure()?;
        let source = AttachmentSource::Renderbuffer(depth.object.ensure()?);
        self.object
            .device()
            .framebuffer_attach(handle, AttachmentPoint::Depth, source)
    }

    /// Binds the framebuffer and fails unless the device reports it complete
    pub fn check_complete(&self) -> GfxResult<()> {
        let handle = self.object.ensure()?;
        let device = self.object.device();
        device.bind_framebuffer(Some(handle));
        let status = device.framebuffer_status(handle);
        device.bind_framebuffer(None);
        match status {
            FramebufferStatus::Complete => Ok(()),
            status => Err(GfxError::FramebufferIncomplete(status)),
        }
    }

    pub fn bind(&self) -> GfxResult<()> {
        let handle = self.object.ensure()?;
        self.object.device().bind_framebuffer(Some(handle));
        Ok(())
    }

    pub fn unbind(&self) {
        self.object.device().bind_framebuffer(None);
    }

    pub fn handle(&self) -> GfxResult<RawHandle> {
        self.object.ensure()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// A color texture plus depth renderbuffer bundled into a complete framebuffer
#[derive(Debug)]
pub struct RenderTarget {
    pub framebuffer: Framebuffer,
    pub color: Texture2D,
    pub depth: Renderbuffer,
}

impl RenderTarget {
    pub fn new(device: &SharedDevice, width: u32, height: u32) -> GfxResult<Self> {
        let mut color = Texture2D::new(device);
        color.setup(&TextureSetup::rgba8(width, height, None))?;
        let mut depth = Renderbuffer::new(device);
        depth.storage(TextureFormat::Depth32Float, width, height)?;

        let mut framebuffer = Framebuffer::new(device);
        framebuffer.attach_color(0, &color)?;
        framebuffer.attach_depth(&depth)?;
        framebuffer.check_complete()?;

        Ok(Self {
            framebuffer,
            color,
            depth,
        })
    }

    pub fn width(&self) -> u32 {
        self.framebuffer.width()
    }

    pub fn height(&self) -> u32 {
        self.framebuffer.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::recording::{DeviceCall, RecordingDevice};

    #[test]
    fn test_render_target_is_complete() {
        let (recorder, device) = RecordingDevice::shared();
        let target = RenderTarget::new(&device, 64, 32).unwrap();
        assert_eq!((target.width(), target.height()), (64, 32));
        assert_eq!(recorder.count(|c| matches!(c, DeviceCall::Attach { .. })), 2);
    }

    #[test]
    fn test_framebuffer_without_attachments_is_incomplete() {
        let (_, device) = RecordingDevice::shared();
        let framebuffer = Framebuffer::new(&device);
        assert!(matches!(
            framebuffer.check_complete(),
            Err(GfxError::FramebufferIncomplete(
                FramebufferStatus::MissingAttachment
            ))
        ));
    }

    #[test]
    fn test_mismatched_depth_is_incomplete() {
        let (_, device) = RecordingDevice::shared();
        let mut color = Texture2D::new(&device);
        color.setup(&TextureSetup::rgba8(16, 16, None)).unwrap();
        let mut depth = Renderbuffer::new(&device);
        depth.storage(TextureFormat::Depth32Float, 8, 8).unwrap();

        let mut framebuffer = Framebuffer::new(&device);
        framebuffer.attach_color(0, &color).unwrap();
        framebuffer.attach_depth(&depth).unwrap();
        assert!(matches!(
            framebuffer.check_complete(),
            Err(GfxError::FramebufferIncomplete(
                FramebufferStatus::DimensionMismatch
            ))
        ));
    }
}
