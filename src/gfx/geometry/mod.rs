//! # Procedural Geometry
//!
//! Geometry is a bundle of parallel vertex channels plus a triangle list.
//! [`make_mesh_from_geometry`] interleaves the populated channels into one
//! vertex buffer using a fixed attribute contract shared by every shader in
//! the crate:
//!
//! | location | channel  | present when           |
//! |----------|----------|------------------------|
//! | 0        | position | always                 |
//! | 1        | normal   | `normals` is non-empty |
//! | 2        | uv       | `tex_coords` non-empty |
//!
//! The byte offset of each channel only counts the channels that are present,
//! so a position + uv geometry has a 20 byte stride with uv at offset 12.

pub mod primitives;

pub use primitives::*;

use cgmath::{InnerSpace, Vector2, Vector3, Zero};

use crate::error::{GfxError, GfxResult};
use crate::gfx::device::{BufferUsage, SharedDevice, VertexAttribute, VertexFormat};
use crate::gfx::mesh::Mesh;

pub const POSITION_LOCATION: u32 = 0;
pub const NORMAL_LOCATION: u32 = 1;
pub const UV_LOCATION: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub vertices: Vec<Vector3<f32>>,
    pub normals: Vec<Vector3<f32>>,
    pub tex_coords: Vec<Vector2<f32>>,
    pub triangles: Vec<[u32; 3]>,
}

impl Geometry {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Populated channels must match the vertex count and indices must be in range
    pub fn validate(&self) -> GfxResult<()> {
        let count = self.vertices.len();
        if !self.normals.is_empty() && self.normals.len() != count {
            return Err(GfxError::InvalidGeometry(format!(
                "{} normals for {count} vertices",
                self.normals.len()
            )));
        }
        if !self.tex_coords.is_empty() && self.tex_coords.len() != count {
            return Err(GfxError::InvalidGeometry(format!(
                "{} texture coordinates for {count} vertices",
                self.tex_coords.len()
            )));
        }
        if let Some(index) = self
            .triangles
            .iter()
            .flatten()
            .find(|&&i| i as usize >= count)
        {
            return Err(GfxError::InvalidGeometry(format!(
                "index {index} out of range for {count} vertices"
            )));
        }
        Ok(())
    }

    /// Replaces the normals with area-weighted smooth vertex normals
    pub fn compute_normals(&mut self) {
        let mut normals = vec![Vector3::zero(); self.vertices.len()];
        for &[a, b, c] in &self.triangles {
            let (a, b, c) = (a as usize, b as usize, c as usize);
            let face = (self.vertices[b] - self.vertices[a]).cross(self.vertices[c] - self.vertices[a]);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
        for n in &mut normals {
            if n.magnitude2() > 0.0 {
                *n = n.normalize();
            }
        }
        self.normals = normals;
    }
}

/// Stride and attributes of an interleaved vertex buffer
#[derive(Debug, Clone, PartialEq)]
pub struct InterleavedLayout {
    /// Floats per vertex
    pub components: u32,
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

pub fn interleave_layout(geometry: &Geometry) -> InterleavedLayout {
    let float = std::mem::size_of::<f32>() as u32;
    let mut components = 3;
    let mut channels = vec![(POSITION_LOCATION, 3, 0)];

    if !geometry.normals.is_empty() {
        channels.push((NORMAL_LOCATION, 3, components));
        components += 3;
    }
    if !geometry.tex_coords.is_empty() {
        channels.push((UV_LOCATION, 2, components));
        components += 2;
    }

    let stride = components * float;
    let attributes = channels
        .into_iter()
        .filter_map(|(index, lanes, offset)| {
            Some(VertexAttribute {
                index,
                format: VertexFormat::float(lanes)?,
                stride,
                offset: u64::from(offset * float),
                divisor: 0,
            })
        })
        .collect();

    InterleavedLayout {
        components,
        stride,
        attributes,
    }
}

/// Position, then normal and uv when present, per vertex
pub fn interleave(geometry: &Geometry) -> Vec<f32> {
    let layout = interleave_layout(geometry);
    let mut buffer = Vec::with_capacity(geometry.vertices.len() * layout.components as usize);
    for (i, v) in geometry.vertices.iter().enumerate() {
        buffer.extend_from_slice(&[v.x, v.y, v.z]);
        if let Some(n) = geometry.normals.get(i) {
            buffer.extend_from_slice(&[n.x, n.y, n.z]);
        }
        if let Some(t) = geometry.tex_coords.get(i) {
            buffer.extend_from_slice(&[t.x, t.y]);
        }
    }
    buffer
}

pub fn make_mesh_from_geometry(
    device: &SharedDevice,
    geometry: &Geometry,
    usage: BufferUsage,
) -> GfxResult<Mesh> {
    geometry.validate()?;

    let mut mesh = Mesh::new(device);
    mesh.set_vertices(&interleave(geometry), usage)?;
    for attribute in interleave_layout(geometry).attributes {
        mesh.set_attribute(attribute)?;
    }
    if !geometry.triangles.is_empty() {
        mesh.set_triangles(&geometry.triangles)?;
    }
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::recording::RecordingDevice;
    use crate::gfx::device::{DrawKind, IndexFormat};

    #[test]
    fn test_uv_without_normals_keeps_slot_two() {
        let quad = make_fullscreen_quad_ndc();
        assert!(quad.normals.is_empty());

        let layout = interleave_layout(&quad);
        assert_eq!(layout.components, 5);
        assert_eq!(layout.stride, 20);

        let slots: Vec<(u32, u64)> = layout.attributes.iter().map(|a| (a.index, a.offset)).collect();
        assert_eq!(slots, vec![(POSITION_LOCATION, 0), (UV_LOCATION, 12)]);
        assert_eq!(layout.attributes[1].format, VertexFormat::Float32x2);
    }

    #[test]
    fn test_full_layout() {
        let layout = interleave_layout(&make_cube());
        assert_eq!(layout.stride, 32);
        let offsets: Vec<u64> = layout.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
    }

    #[test]
    fn test_interleaved_values() {
        let quad = make_fullscreen_quad_ndc();
        let data = interleave(&quad);
        assert_eq!(data.len(), 30);
        assert_eq!(&data[..5], &[-1.0, -1.0, 0.0, 0.0, 0.0]);
        assert_eq!(&data[25..], &[1.0, 1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_mesh_from_cube_is_indexed() {
        let (recorder, device) = RecordingDevice::shared();
        let mesh = make_mesh_from_geometry(&device, &make_cube(), BufferUsage::Static).unwrap();
        mesh.draw_elements(0).unwrap();

        assert_eq!(mesh.vertex_stride(), 32);
        assert!(matches!(
            recorder.draws()[0].kind,
            DrawKind::Indexed {
                format: IndexFormat::U32,
                count: 36,
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_mismatched_channels() {
        let mut geometry = make_plane(1.0, 1.0, 1, 1);
        geometry.tex_coords.pop();
        assert!(matches!(geometry.validate(), Err(GfxError::InvalidGeometry(_))));

        let mut geometry = make_cube();
        geometry.triangles.push([0, 1, 99]);
        assert!(geometry.validate().is_err());
    }

    #[test]
    fn test_compute_normals_of_flat_plane() {
        let mut plane = make_plane(2.0, 2.0, 2, 2);
        plane.compute_normals();
        assert_eq!(plane.normals.len(), plane.vertices.len());
        for n in &plane.normals {
            assert!((n - Vector3::unit_z()).magnitude() < 1e-6);
        }
    }
}
