//! Lazily created, exclusively owned device handles
//!
//! A [`GpuHandle`] starts empty. The first [`GpuHandle::ensure`] asks the
//! device for a handle; dropping the wrapper releases it again, but only if
//! one was ever created. The type is move-only, so a handle is never owned by
//! two wrappers.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;

use crate::error::GfxResult;
use crate::gfx::device::{RawHandle, ResourceKind, SharedDevice};

/// Compile-time tag selecting the device resource kind of a handle
pub trait HandleKind {
    const KIND: ResourceKind;
}

macro_rules! handle_kind {
    ($($name:ident => $kind:ident),* $(,)?) => {
        $(
            #[derive(Debug)]
            pub enum $name {}

            impl HandleKind for $name {
                const KIND: ResourceKind = ResourceKind::$kind;
            }
        )*
    };
}

handle_kind! {
    BufferKind => Buffer,
    TextureKind => Texture,
    VertexArrayKind => VertexArray,
    RenderbufferKind => Renderbuffer,
    FramebufferKind => Framebuffer,
}

pub struct GpuHandle<K: HandleKind> {
    device: SharedDevice,
    handle: Cell<Option<RawHandle>>,
    _kind: PhantomData<K>,
}

pub type BufferObject = GpuHandle<BufferKind>;
pub type TextureObject = GpuHandle<TextureKind>;
pub type VertexArrayObject = GpuHandle<VertexArrayKind>;
pub type RenderbufferObject = GpuHandle<RenderbufferKind>;
pub type FramebufferObject = GpuHandle<FramebufferKind>;

impl<K: HandleKind> GpuHandle<K> {
    /// An empty wrapper. Nothing is allocated until [`ensure`](Self::ensure).
    pub fn new(device: &SharedDevice) -> Self {
        Self {
            device: device.clone(),
            handle: Cell::new(None),
            _kind: PhantomData,
        }
    }

    /// Returns the handle, creating it on first use
    pub fn ensure(&self) -> GfxResult<RawHandle> {
        if let Some(handle) = self.handle.get() {
            return Ok(handle);
        }
        let handle = self.device.create_handle(K::KIND)?;
        self.handle.set(Some(handle));
        Ok(handle)
    }

    /// The handle if one has been created, without allocating
    pub fn id(&self) -> Option<RawHandle> {
        self.handle.get()
    }

    pub fn device(&self) -> &SharedDevice {
        &self.device
    }

    /// Releases the current handle, if any, and returns to the empty state
    pub fn reset(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.device.destroy_handle(K::KIND, handle);
        }
    }

    /// Moves the handle into a new wrapper, leaving this one empty
    pub fn take(&mut self) -> Self {
        Self {
            device: self.device.clone(),
            handle: Cell::new(self.handle.take()),
            _kind: PhantomData,
        }
    }
}

impl<K: HandleKind> Drop for GpuHandle<K> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<K: HandleKind> fmt::Debug for GpuHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuHandle")
            .field("kind", &K::KIND)
            .field("handle", &self.handle.get())
            .finish()
    }
}
