//! Polygon triangulation capability.
//!
//! The chunk iterators only depend on the [`Triangulate`] trait: given the
//! ordered corner positions of a roughly planar polygon, produce triangle
//! index triples into that input. [`EarClipper`] is the default
//! implementation; degenerate input makes it fail, which callers treat as
//! "skip this polygon", never as a fatal error.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("polygon is degenerate and cannot be triangulated")]
pub struct TriangulationError;

pub trait Triangulate {
    /// Triangulate an ordered polygon outline. Each returned triple indexes
    /// into `points`.
    fn triangulate(&self, points: &[[f32; 3]])
        -> Result<Vec<[usize; 3]>, TriangulationError>;
}

/// Ear-clipping triangulator over the polygon's dominant plane.
///
/// The polygon normal is estimated with Newell's method, the outline is
/// projected onto the two non-dominant axes and ears are clipped until a
/// single triangle remains. Handles convex and concave outlines; colinear
/// or self-degenerate outlines fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct EarClipper;

const AREA_EPS: f64 = 1e-12;

impl Triangulate for EarClipper {
    fn triangulate(
        &self,
        points: &[[f32; 3]],
    ) -> Result<Vec<[usize; 3]>, TriangulationError> {
        let n = points.len();
        if n < 3 {
            return Err(TriangulationError);
        }
        if n == 3 {
            return Ok(vec![[0, 1, 2]]);
        }

        let normal = newell_normal(points);
        let norm_sq =
            normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2];
        if norm_sq <= AREA_EPS {
            return Err(TriangulationError);
        }

        // Project onto the plane's two non-dominant axes.
        let dominant = (0..3)
            .max_by(|&a, &b| normal[a].abs().total_cmp(&normal[b].abs()))
            .unwrap();
        let (u_axis, v_axis) = match dominant {
            0 => (1, 2),
            1 => (2, 0),
            _ => (0, 1),
        };
        let flat: Vec<[f64; 2]> = points
            .iter()
            .map(|p| [f64::from(p[u_axis]), f64::from(p[v_axis])])
            .collect();

        let winding = signed_area(&flat);
        if winding.abs() <= AREA_EPS {
            return Err(TriangulationError);
        }
        let orientation = winding.signum();

        let mut remaining: Vec<usize> = (0..n).collect();
        let mut triangles = Vec::with_capacity(n - 2);

        while remaining.len() > 3 {
            let len = remaining.len();
            let mut clipped = false;
            for i in 0..len {
                let prev = remaining[(i + len - 1) % len];
                let curr = remaining[i];
                let next = remaining[(i + 1) % len];
                if !is_ear(&flat, &remaining, prev, curr, next, orientation) {
                    continue;
                }
                triangles.push([prev, curr, next]);
                remaining.remove(i);
                clipped = true;
                break;
            }
            if !clipped {
                // Remaining outline is degenerate (colinear runs, zero-area
                // spikes); give up and let the caller skip the polygon.
                return Err(TriangulationError);
            }
        }

        triangles.push([remaining[0], remaining[1], remaining[2]]);
        Ok(triangles)
    }
}

fn newell_normal(points: &[[f32; 3]]) -> [f64; 3] {
    let mut normal = [0.0f64; 3];
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        let p = [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])];
        let q = [f64::from(q[0]), f64::from(q[1]), f64::from(q[2])];
        normal[0] += (p[1] - q[1]) * (p[2] + q[2]);
        normal[1] += (p[2] - q[2]) * (p[0] + q[0]);
        normal[2] += (p[0] - q[0]) * (p[1] + q[1]);
    }
    normal
}

fn signed_area(flat: &[[f64; 2]]) -> f64 {
    let mut area = 0.0;
    for (i, p) in flat.iter().enumerate() {
        let q = flat[(i + 1) % flat.len()];
        area += p[0] * q[1] - q[0] * p[1];
    }
    area / 2.0
}

fn cross(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

fn is_ear(
    flat: &[[f64; 2]],
    remaining: &[usize],
    prev: usize,
    curr: usize,
    next: usize,
    orientation: f64,
) -> bool {
    let a = flat[prev];
    let b = flat[curr];
    let c = flat[next];
    // The corner must turn with the polygon winding and span real area.
    if cross(a, b, c) * orientation <= AREA_EPS {
        return false;
    }
    // No other remaining corner may sit inside the candidate triangle.
    for &other in remaining {
        if other == prev || other == curr || other == next {
            continue;
        }
        if point_in_triangle(flat[other], a, b, c, orientation) {
            return false;
        }
    }
    true
}

fn point_in_triangle(p: [f64; 2], a: [f64; 2], b: [f64; 2], c: [f64; 2], orientation: f64) -> bool {
    cross(a, b, p) * orientation >= -AREA_EPS
        && cross(b, c, p) * orientation >= -AREA_EPS
        && cross(c, a, p) * orientation >= -AREA_EPS
}
