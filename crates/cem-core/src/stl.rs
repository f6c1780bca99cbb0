//! STL mesh analysis for the geometry the external kernel produces.
//!
//! Reads binary and ASCII STL from bytes; the caller owns file I/O.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CemError, Result};

const BINARY_HEADER_LEN: usize = 80;
const BINARY_TRIANGLE_LEN: usize = 50;

type Vec3 = [f64; 3];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StlAnalysis {
    pub faces: usize,
    /// Distinct vertex positions.
    pub vertices: usize,
    pub volume_mm3: f64,
    pub volume_cm3: f64,
    pub surface_area_mm2: f64,
    pub bounds: Bounds,
    pub dimensions: Extent,
    /// Every edge is shared by exactly two faces.
    pub is_watertight: bool,
}

impl StlAnalysis {
    /// Mass in grams for a density in g/cm³.
    pub fn mass_g(&self, density_g_cm3: f64) -> f64 {
        self.volume_cm3 * density_g_cm3
    }
}

/// Decode triangles from STL bytes, binary or ASCII.
pub fn read_triangles(bytes: &[u8]) -> Result<Vec<[Vec3; 3]>> {
    if let Some(tris) = read_binary(bytes) {
        return Ok(tris);
    }
    read_ascii(bytes)
}

fn read_binary(bytes: &[u8]) -> Option<Vec<[Vec3; 3]>> {
    let count_bytes: [u8; 4] = bytes
        .get(BINARY_HEADER_LEN..BINARY_HEADER_LEN + 4)?
        .try_into()
        .ok()?;
    let count = u32::from_le_bytes(count_bytes) as usize;
    let expected = count
        .checked_mul(BINARY_TRIANGLE_LEN)?
        .checked_add(BINARY_HEADER_LEN + 4)?;
    if bytes.len() != expected {
        return None;
    }
    let body = &bytes[BINARY_HEADER_LEN + 4..];
    let mut tris = Vec::with_capacity(count);
    for rec in body.chunks_exact(BINARY_TRIANGLE_LEN) {
        // 12 bytes normal, 3 × 12 bytes vertices, 2 bytes attribute
        let mut tri = [[0.0; 3]; 3];
        for (v, vertex) in tri.iter_mut().enumerate() {
            for (axis, coord) in vertex.iter_mut().enumerate() {
                let off = 12 + v * 12 + axis * 4;
                let raw: [u8; 4] = rec[off..off + 4].try_into().ok()?;
                *coord = f64::from(f32::from_le_bytes(raw));
            }
        }
        tris.push(tri);
    }
    Some(tris)
}

fn read_ascii(bytes: &[u8]) -> Result<Vec<[Vec3; 3]>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| CemError::Stl("not a binary STL and not valid UTF-8".into()))?;
    if !text.trim_start().starts_with("solid") {
        return Err(CemError::Stl("missing 'solid' header".into()));
    }
    let mut verts = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let mut it = line.split_whitespace();
        if it.next() != Some("vertex") {
            continue;
        }
        let mut v = [0.0; 3];
        for coord in &mut v {
            *coord = it
                .next()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| CemError::Stl(format!("bad vertex on line {}", lineno + 1)))?;
        }
        verts.push(v);
    }
    if verts.len() % 3 != 0 {
        return Err(CemError::Stl(format!(
            "{} vertices do not form whole triangles",
            verts.len()
        )));
    }
    Ok(verts.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
}

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

fn vertex_key(v: &Vec3) -> [u64; 3] {
    // Kernel output is f32; compare at that precision. -0.0 and 0.0 are one point.
    v.map(|c| {
        let c = c as f32;
        u64::from(if c == 0.0 { 0.0f32 } else { c }.to_bits())
    })
}

/// Analyze a triangle soup.
pub fn analyze_triangles(tris: &[[Vec3; 3]]) -> Result<StlAnalysis> {
    if tris.is_empty() {
        return Err(CemError::Stl("mesh has no triangles".into()));
    }
    let mut ids: HashMap<[u64; 3], usize> = HashMap::new();
    let mut edges: HashMap<(usize, usize), u32> = HashMap::new();
    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    let mut signed_volume = 0.0;
    let mut area = 0.0;

    for tri in tris {
        let mut idx = [0usize; 3];
        for (slot, v) in idx.iter_mut().zip(tri) {
            let next = ids.len();
            *slot = *ids.entry(vertex_key(v)).or_insert(next);
            for axis in 0..3 {
                min[axis] = min[axis].min(v[axis]);
                max[axis] = max[axis].max(v[axis]);
            }
        }
        for (a, b) in [(idx[0], idx[1]), (idx[1], idx[2]), (idx[2], idx[0])] {
            *edges.entry((a.min(b), a.max(b))).or_default() += 1;
        }
        let [a, b, c] = *tri;
        signed_volume += dot(a, cross(b, c)) / 6.0;
        area += norm(cross(sub(b, a), sub(c, a))) / 2.0;
    }

    let volume_mm3 = signed_volume.abs();
    Ok(StlAnalysis {
        faces: tris.len(),
        vertices: ids.len(),
        volume_mm3,
        volume_cm3: volume_mm3 / 1000.0,
        surface_area_mm2: area,
        bounds: Bounds { min, max },
        dimensions: Extent {
            x: max[0] - min[0],
            y: max[1] - min[1],
            z: max[2] - min[2],
        },
        is_watertight: edges.values().all(|&n| n == 2),
    })
}

/// Decode and analyze STL bytes.
pub fn analyze_stl(bytes: &[u8]) -> Result<StlAnalysis> {
    analyze_triangles(&read_triangles(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Closed unit-scaled cube of side `s`, outward winding.
    fn cube(s: f64) -> Vec<[Vec3; 3]> {
        let p = |x: f64, y: f64, z: f64| [x * s, y * s, z * s];
        let quads = [
            [p(0., 0., 0.), p(0., 1., 0.), p(1., 1., 0.), p(1., 0., 0.)],
            [p(0., 0., 1.), p(1., 0., 1.), p(1., 1., 1.), p(0., 1., 1.)],
            [p(0., 0., 0.), p(1., 0., 0.), p(1., 0., 1.), p(0., 0., 1.)],
            [p(0., 1., 0.), p(0., 1., 1.), p(1., 1., 1.), p(1., 1., 0.)],
            [p(0., 0., 0.), p(0., 0., 1.), p(0., 1., 1.), p(0., 1., 0.)],
            [p(1., 0., 0.), p(1., 1., 0.), p(1., 1., 1.), p(1., 0., 1.)],
        ];
        quads
            .iter()
            .flat_map(|q| [[q[0], q[1], q[2]], [q[0], q[2], q[3]]])
            .collect()
    }

    fn to_binary(tris: &[[Vec3; 3]]) -> Vec<u8> {
        let mut out = vec![0u8; 80];
        out.extend_from_slice(&(tris.len() as u32).to_le_bytes());
        for tri in tris {
            out.extend_from_slice(&[0u8; 12]);
            for v in tri {
                for c in v {
                    out.extend_from_slice(&(*c as f32).to_le_bytes());
                }
            }
            out.extend_from_slice(&[0u8; 2]);
        }
        out
    }

    #[test]
    fn test_cube_metrics() {
        let a = analyze_triangles(&cube(10.0)).unwrap();
        assert_eq!(a.faces, 12);
        assert_eq!(a.vertices, 8);
        assert_relative_eq!(a.volume_mm3, 1000.0, epsilon = 1e-9);
        assert_relative_eq!(a.volume_cm3, 1.0, epsilon = 1e-12);
        assert_relative_eq!(a.surface_area_mm2, 600.0, epsilon = 1e-9);
        assert_relative_eq!(a.dimensions.z, 10.0);
        assert!(a.is_watertight);
        assert_relative_eq!(a.mass_g(1.25), 1.25, epsilon = 1e-12);
    }

    #[test]
    fn test_open_mesh_not_watertight() {
        let mut tris = cube(10.0);
        tris.pop();
        assert!(!analyze_triangles(&tris).unwrap().is_watertight);
    }

    #[test]
    fn test_signed_zero_is_one_vertex() {
        let mut tris = cube(10.0);
        for tri in tris.iter_mut().take(2) {
            for v in tri.iter_mut() {
                for c in v.iter_mut() {
                    if *c == 0.0 {
                        *c = -0.0;
                    }
                }
            }
        }
        let a = analyze_triangles(&tris).unwrap();
        assert_eq!(a.vertices, 8);
        assert!(a.is_watertight);
    }

    #[test]
    fn test_binary_roundtrip() {
        let a = analyze_stl(&to_binary(&cube(20.0))).unwrap();
        assert_relative_eq!(a.volume_mm3, 8000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_ascii() {
        let mut text = String::from("solid test\n");
        for tri in cube(2.0) {
            text.push_str("facet normal 0 0 0\nouter loop\n");
            for v in tri {
                text.push_str(&format!("vertex {} {} {}\n", v[0], v[1], v[2]));
            }
            text.push_str("endloop\nendfacet\n");
        }
        text.push_str("endsolid test\n");
        let a = analyze_stl(text.as_bytes()).unwrap();
        assert_relative_eq!(a.volume_mm3, 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(analyze_stl(b"not an stl").is_err());
        assert!(analyze_stl(b"solid empty\nendsolid\n").is_err());
    }
}
