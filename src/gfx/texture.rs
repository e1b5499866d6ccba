//! 2D textures and renderbuffers
//!
//! Pixel data is normalised on the CPU before it reaches the device: RGB
//! sources gain an alpha channel and mip chains are produced by 2x2 box
//! filtering. Sampling always uses linear filtering with clamp-to-edge
//! addressing.

use std::path::Path;

use crate::error::{GfxError, GfxResult};
use crate::gfx::device::{RawHandle, SharedDevice, TextureFormat, TextureImage};
use crate::gfx::handle::{RenderbufferObject, TextureObject};

/// Channel layout of the pixel data handed to [`Texture2D::setup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Red,
    Rgb,
    Rgba,
}

impl PixelFormat {
    fn channels(self) -> usize {
        match self {
            PixelFormat::Red => 1,
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// Component type of the source pixel data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    U8,
    F32,
}

impl PixelType {
    fn size(self) -> usize {
        match self {
            PixelType::U8 => 1,
            PixelType::F32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TextureSetup<'a> {
    pub width: u32,
    pub height: u32,
    pub internal_format: TextureFormat,
    pub source_format: PixelFormat,
    pub source_type: PixelType,
    /// `None` allocates storage without contents, e.g. for render targets
    pub pixels: Option<&'a [u8]>,
    pub generate_mipmaps: bool,
}

impl<'a> TextureSetup<'a> {
    pub fn rgba8(width: u32, height: u32, pixels: Option<&'a [u8]>) -> Self {
        Self {
            width,
            height,
            internal_format: TextureFormat::Rgba8Unorm,
            source_format: PixelFormat::Rgba,
            source_type: PixelType::U8,
            pixels,
            generate_mipmaps: false,
        }
    }

    pub fn with_mipmaps(mut self, generate: bool) -> Self {
        self.generate_mipmaps = generate;
        self
    }

    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.internal_format = format;
        self
    }
}

#[derive(Debug)]
pub struct Texture2D {
    pub object: TextureObject,
    width: u32,
    height: u32,
    format: TextureFormat,
    mip_levels: u32,
}

impl Texture2D {
    pub fn new(device: &SharedDevice) -> Self {
        Self {
            object: TextureObject::new(device),
            width: 0,
            height: 0,
            format: TextureFormat::Rgba8Unorm,
            mip_levels: 0,
        }
    }

    /// Uploads (or allocates) the texture's storage
    pub fn setup(&mut self, setup: &TextureSetup) -> GfxResult<()> {
        let image = prepare_image(setup)?;
        let handle = self.object.ensure()?;
        self.object.device().texture_image(handle, &image)?;

        self.width = image.width;
        self.height = image.height;
        self.format = image.format;
        self.mip_levels = image.mip_level_count;
        Ok(())
    }

    /// Decodes a PNG or JPEG file into a mipmapped sRGB texture
    pub fn load_image(device: &SharedDevice, path: impl AsRef<Path>) -> GfxResult<Self> {
        let path = path.as_ref();
        let decoded = image::open(path)
            .map_err(|source| GfxError::Image {
                path: path.display().to_string(),
                source,
            })?
            .to_rgba8();
        log::info!(
            "loaded texture {} ({}x{})",
            path.display(),
            decoded.width(),
            decoded.height()
        );

        let mut texture = Self::new(device);
        texture.setup(
            &TextureSetup::rgba8(decoded.width(), decoded.height(), Some(decoded.as_raw()))
                .with_format(TextureFormat::Rgba8UnormSrgb)
                .with_mipmaps(true),
        )?;
        Ok(texture)
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

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }
}

fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Validates and converts the source pixels into device-ready levels
fn prepare_image(setup: &TextureSetup) -> GfxResult<TextureImage> {
    let format = setup.internal_format;
    let mip_level_count = if setup.generate_mipmaps {
        mip_level_count(setup.width, setup.height)
    } else {
        1
    };
    let mut image = TextureImage {
        width: setup.width.max(1),
        height: setup.height.max(1),
        format,
        mip_level_count,
        levels: Vec::new(),
    };

    let Some(pixels) = setup.pixels else {
        return Ok(image);
    };

    let texels = image.width as usize * image.height as usize;
    let expected = texels * setup.source_format.channels() * setup.source_type.size();
    if pixels.len() != expected {
        return Err(GfxError::PixelDataSize {
            expected,
            actual: pixels.len(),
        });
    }

    let base = match (format, setup.source_format, setup.source_type) {
        (TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb, source, PixelType::U8) => {
            expand_u8(pixels, source, 4)
        }
        (TextureFormat::R8Unorm, PixelFormat::Red, PixelType::U8) => pixels.to_vec(),
        (TextureFormat::R32Float, PixelFormat::Red, PixelType::F32) => pixels.to_vec(),
        (TextureFormat::Rgba32Float, PixelFormat::Rgba, PixelType::F32) => pixels.to_vec(),
        (TextureFormat::Rgba32Float, PixelFormat::Rgb, PixelType::F32) => {
            let floats: Vec<f32> = bytemuck::pod_collect_to_vec(pixels);
            let rgba: Vec<f32> = floats
                .chunks_exact(3)
                .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 1.0])
                .collect();
            bytemuck::cast_slice(&rgba).to_vec()
        }
        (format, source, ty) => {
            return Err(GfxError::UnsupportedFormat(format!(
                "{source:?}/{ty:?} pixels into {format:?}"
            )));
        }
    };

    image.levels.push(base);
    if setup.generate_mipmaps {
        let channels = format.bytes_per_pixel();
        let (mut w, mut h) = (image.width, image.height);
        for _ in 1..mip_level_count {
            let previous = image.levels.last().map(Vec::as_slice).unwrap_or_default();
            let next = match format {
                TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb | TextureFormat::R8Unorm => {
                    downsample_u8(previous, w, h, channels)
                }
                TextureFormat::R32Float | TextureFormat::Rgba32Float => {
                    downsample_f32(previous, w, h, channels / 4)
                }
                _ => break,
            };
            image.levels.push(next);
            w = (w / 2).max(1);
            h = (h / 2).max(1);
        }
        image.mip_level_count = image.levels.len() as u32;
    }

    Ok(image)
}

fn expand_u8(pixels: &[u8], source: PixelFormat, channels: usize) -> Vec<u8> {
    let stride = source.channels();
    if stride == channels {
        return pixels.to_vec();
    }
    let mut out = Vec::with_capacity(pixels.len() / stride * channels);
    for texel in pixels.chunks_exact(stride) {
        match source {
            PixelFormat::Red => out.extend_from_slice(&[texel[0], 0, 0, 255]),
            PixelFormat::Rgb => out.extend_from_slice(&[texel[0], texel[1], texel[2], 255]),
            PixelFormat::Rgba => out.extend_from_slice(texel),
        }
    }
    out
}

/// Averages each 2x2 block of the source level. Odd edges reuse the last row or column.
fn box_filter<T: Copy>(
    src: &[T],
    width: u32,
    height: u32,
    channels: usize,
    average: impl Fn([T; 4]) -> T,
) -> Vec<T> {
    let (w, h) = (width as usize, height as usize);
    let (nw, nh) = ((w / 2).max(1), (h / 2).max(1));
    let mut out = Vec::with_capacity(nw * nh * channels);
    for y in 0..nh {
        let y0 = (2 * y).min(h - 1);
        let y1 = (2 * y + 1).min(h - 1);
        for x in 0..nw {
            let x0 = (2 * x).min(w - 1);
            let x1 = (2 * x + 1).min(w - 1);
            for c in 0..channels {
                let at = |x: usize, y: usize| src[(y * w + x) * channels + c];
                out.push(average([at(x0, y0), at(x1, y0), at(x0, y1), at(x1, y1)]));
            }
        }
    }
    out
}

fn downsample_u8(src: &[u8], width: u32, height: u32, channels: usize) -> Vec<u8> {
    box_filter(src, width, height, channels, |s| {
        ((s.iter().map(|&v| u32::from(v)).sum::<u32>() + 2) / 4) as u8
    })
}

fn downsample_f32(src: &[u8], width: u32, height: u32, channels: usize) -> Vec<u8> {
    let floats: Vec<f32> = bytemuck::pod_collect_to_vec(src);
    let out = box_filter(&floats, width, height, channels, |s| s.iter().sum::<f32>() * 0.25);
    bytemuck::cast_slice(&out).to_vec()
}

/// Render-only storage, used for depth attachments
#[derive(Debug)]
pub struct Renderbuffer {
    pub object: RenderbufferObject,
    width: u32,
    height: u32,
    format: TextureFormat,
}

impl Renderbuffer {
    pub fn new(device: &SharedDevice) -> Self {
        Self {
            object: RenderbufferObject::new(device),
            width: 0,
            height: 0,
            format: TextureFormat::Depth32Float,
        }
    }

    pub fn storage(&mut self, format: TextureFormat, width: u32, height: u32) -> GfxResult<()> {
        let handle = self.object.ensure()?;
        self.object
            .device()
            .renderbuffer_storage(handle, format, width, height)?;
        self.width = width;
        self.height = height;
        self.format = format;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::recording::{DeviceCall, RecordingDevice};

    #[test]
    fn test_rgb_source_gains_alpha() {
        let setup = TextureSetup {
            source_format: PixelFormat::Rgb,
            ..TextureSetup::rgba8(2, 1, Some(&[10, 20, 30, 40, 50, 60]))
        };
        let image = prepare_image(&setup).unwrap();
        assert_eq!(image.levels, vec![vec![10, 20, 30, 255, 40, 50, 60, 255]]);
    }

    #[test]
    fn test_mip_chain_is_box_filtered() {
        #[rustfmt::skip]
        let pixels = [
            0, 0, 0, 0,     100, 100, 100, 100,
            200, 200, 200, 200,  100, 100, 100, 100,
        ];
        let image =
            prepare_image(&TextureSetup::rgba8(2, 2, Some(&pixels)).with_mipmaps(true)).unwrap();

        assert_eq!(image.mip_level_count, 2);
        assert_eq!(image.levels[1], vec![100, 100, 100, 100]);
    }

    #[test]
    fn test_non_square_mip_count() {
        let pixels = vec![255u8; 8 * 2 * 4];
        let image =
            prepare_image(&TextureSetup::rgba8(8, 2, Some(&pixels)).with_mipmaps(true)).unwrap();
        assert_eq!(image.mip_level_count, 4);
        assert_eq!(image.levels[3].len(), 4);
    }

    #[test]
    fn test_pixel_size_mismatch() {
        let err = prepare_image(&TextureSetup::rgba8(4, 4, Some(&[0u8; 8]))).unwrap_err();
        assert!(matches!(
            err,
            GfxError::PixelDataSize {
                expected: 64,
                actual: 8
            }
        ));
    }

    #[test]
    fn test_unsupported_conversion() {
        let setup = TextureSetup::rgba8(1, 1, Some(&[0u8; 4])).with_format(TextureFormat::Depth32Float);
        assert!(matches!(
            prepare_image(&setup),
            Err(GfxError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_setup_uploads_and_records_metadata() {
        let (recorder, device) = RecordingDevice::shared();
        let mut texture = Texture2D::new(&device);
        texture
            .setup(&TextureSetup::rgba8(4, 4, None).with_mipmaps(true))
            .unwrap();

        assert_eq!((texture.width(), texture.height()), (4, 4));
        assert_eq!(texture.mip_levels(), 3);
        assert_eq!(
            recorder.count(|c| matches!(
                c,
                DeviceCall::TextureImage {
                    width: 4,
                    height: 4,
                    levels: 0,
                    ..
                }
            )),
            1
        );
    }
}
