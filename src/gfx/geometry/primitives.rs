//! # Primitive Shapes
//!
//! Deterministic generators for the shapes the app renders.

use cgmath::{vec2, vec3, Vector2, Vector3};

use super::Geometry;

/// A `width` x `height` rectangle in the z = 0 plane, centred on the origin,
/// split into `nw` x `nh` quads of four vertices each.
///
/// Quads are emitted column by column. Each contributes the triangles
/// (0, 1, 2) and (0, 2, 3), both facing +Z.
pub fn make_plane(width: f32, height: f32, nw: u32, nh: u32) -> Geometry {
    let (nw, nh) = (nw.max(1), nh.max(1));
    let cell_w = width / nw as f32;
    let cell_h = height / nh as f32;
    let (du, dv) = (1.0 / nw as f32, 1.0 / nh as f32);

    let quads = (nw * nh) as usize;
    let mut g = Geometry {
        vertices: Vec::with_capacity(quads * 4),
        normals: Vec::new(),
        tex_coords: Vec::with_capacity(quads * 4),
        triangles: Vec::with_capacity(quads * 2),
    };

    for i in 0..nw {
        for j in 0..nh {
            let x = -width / 2.0 + i as f32 * cell_w;
            let y = -height / 2.0 + j as f32 * cell_h;
            let u = i as f32 * du;
            let v = j as f32 * dv;
            // Last row and column land exactly on the far edge.
            let u1 = if i + 1 == nw { 1.0 } else { u + du };
            let v1 = if j + 1 == nh { 1.0 } else { v + dv };

            let base = g.vertices.len() as u32;
            g.vertices.extend_from_slice(&[
                vec3(x, y + cell_h, 0.0),
                vec3(x, y, 0.0),
                vec3(x + cell_w, y, 0.0),
                vec3(x + cell_w, y + cell_h, 0.0),
            ]);
            g.tex_coords
                .extend_from_slice(&[vec2(u, v1), vec2(u, v), vec2(u1, v), vec2(u1, v1)]);
            g.triangles
                .extend_from_slice(&[[base, base + 1, base + 2], [base, base + 2, base + 3]]);
        }
    }

    g
}

/// The [-1, 1] cube with one flat-shaded quad per face
pub fn make_cube() -> Geometry {
    // (normal, four corners counter-clockwise seen from outside)
    #[rustfmt::skip]
    const FACES: [([f32; 3], [[f32; 3]; 4]); 6] = [
        ([-1.0, 0.0, 0.0], [[-1.0, -1.0, -1.0], [-1.0, -1.0,  1.0], [-1.0,  1.0,  1.0], [-1.0,  1.0, -1.0]]),
        ([ 1.0, 0.0, 0.0], [[ 1.0, -1.0,  1.0], [ 1.0, -1.0, -1.0], [ 1.0,  1.0, -1.0], [ 1.0,  1.0,  1.0]]),
        ([0.0, -1.0, 0.0], [[-1.0, -1.0, -1.0], [ 1.0, -1.0, -1.0], [ 1.0, -1.0,  1.0], [-1.0, -1.0,  1.0]]),
        ([0.0,  1.0, 0.0], [[ 1.0,  1.0, -1.0], [-1.0,  1.0, -1.0], [-1.0,  1.0,  1.0], [ 1.0,  1.0,  1.0]]),
        ([0.0, 0.0, -1.0], [[-1.0, -1.0, -1.0], [-1.0,  1.0, -1.0], [ 1.0,  1.0, -1.0], [ 1.0, -1.0, -1.0]]),
        ([0.0, 0.0,  1.0], [[-1.0,  1.0,  1.0], [-1.0, -1.0,  1.0], [ 1.0, -1.0,  1.0], [ 1.0,  1.0,  1.0]]),
    ];
    const FACE_UVS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

    let mut g = Geometry::default();
    for (normal, corners) in FACES {
        let base = g.vertices.len() as u32;
        for (corner, uv) in corners.iter().zip(FACE_UVS) {
            g.vertices.push(Vector3::from(*corner));
            g.normals.push(Vector3::from(normal));
            g.tex_coords.push(Vector2::from(uv));
        }
        g.triangles
            .extend_from_slice(&[[base, base + 1, base + 2], [base, base + 2, base + 3]]);
    }
    g
}

/// Two clip-space triangles covering the viewport, for blits and post passes
pub fn make_fullscreen_quad_ndc() -> Geometry {
    Geometry {
        vertices: vec![
            vec3(-1.0, -1.0, 0.0),
            vec3(1.0, -1.0, 0.0),
            vec3(-1.0, 1.0, 0.0),
            vec3(-1.0, 1.0, 0.0),
            vec3(1.0, -1.0, 0.0),
            vec3(1.0, 1.0, 0.0),
        ],
        normals: Vec::new(),
        tex_coords: vec![
            vec2(0.0, 0.0),
            vec2(1.0, 0.0),
            vec2(0.0, 1.0),
            vec2(0.0, 1.0),
            vec2(1.0, 0.0),
            vec2(1.0, 1.0),
        ],
        triangles: vec![[0, 1, 2], [3, 4, 5]],
    }
}
