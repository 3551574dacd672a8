//! Quickshear defacing.
//!
//! The brain mask is reoriented to RPS, projected along the left-right axis and outlined. The
//! first segment of the lower convex hull of that outline, lowered by `buffer` voxels, defines a
//! shearing plane: everything on the face side of the plane is removed.

use super::Defacer;
use crate::constants::DEFAULT_DEFACING_BUFFER;
use crate::image::{write_mask, NiftiVolume};
use crate::{PreprocessError, PreprocessResult};
use ndarray::{s, Array2, Array3, Axis};
use std::path::Path;

/// World axis direction wanted along each array axis after reorientation: R, P, S.
const RPS: [f64; 3] = [1.0, -1.0, 1.0];

#[derive(Clone, Debug, PartialEq)]
pub struct QuickshearDefacer {
    buffer: f64,
}

impl QuickshearDefacer {
    pub fn new(buffer: f64) -> Self {
        Self { buffer }
    }

    pub fn buffer(&self) -> f64 {
        self.buffer
    }

    /// Computes the defacing mask (1 = keep) for a binary brain mask.
    ///
    /// Unlike nipy's quickshear, which pairs nonzero indices with the line heights from index 0,
    /// every column `x` of the second axis is cut at the line's own height at `x`.
    fn shear(
        &self,
        brain: &Array3<u8>,
        affine: &[[f64; 4]; 4],
        path: &Path,
    ) -> PreprocessResult<Array3<u8>> {
        let orientation = Orientation::from_affine(affine);
        let brain = orientation.reorient(brain);
        let degenerate = |reason: &str| PreprocessError::DegenerateMask {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let edges = edge_mask(&brain);
        let hull = lower_hull(&edges);
        let &[(x0, y0), (x1, y1), ..] = hull.as_slice() else {
            return Err(degenerate("brain mask outline has fewer than two hull points"));
        };
        if x1 == x0 {
            return Err(degenerate("first hull segment is vertical"));
        }

        let slope = (y1 - y0) as f64 / (x1 - x0) as f64;
        let intercept = y0 as f64 - x0 as f64 * slope - self.buffer;

        let (_, ny, nz) = brain.dim();
        let mut defaced = Array3::<u8>::ones(brain.raw_dim());
        for x in 0..ny {
            let cut = x as f64 * slope + intercept;
            if cut > 0.0 {
                let end = (cut as usize).min(nz);
                defaced.slice_mut(s![.., x, ..end]).fill(0);
            }
        }

        Ok(orientation.restore(defaced))
    }
}

impl Default for QuickshearDefacer {
    fn default() -> Self {
        Self::new(DEFAULT_DEFACING_BUFFER)
    }
}

impl Defacer for QuickshearDefacer {
    fn deface(&self, brain_mask: &Path, defacing_mask: &Path) -> PreprocessResult<()> {
        let volume = NiftiVolume::read(brain_mask)?;
        let brain = volume.data.mapv(|v| u8::from(v > 0.0));
        let defaced = self.shear(&brain, &volume.affine(), brain_mask)?;
        write_mask(defacing_mask, &volume.header, &defaced)
    }
}

/// How the voxel axes map onto RPS.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Orientation {
    /// `axes[k]` is the voxel axis that ends up as output axis `k`.
    axes: [usize; 3],
    /// Whether output axis `k` has to be flipped.
    flip: [bool; 3],
}

impl Orientation {
    /// Pairs voxel and world axes greedily by the largest absolute affine entry.
    fn from_affine(affine: &[[f64; 4]; 4]) -> Self {
        let mut world_of_voxel = [(0usize, 1.0f64); 3];
        let mut used_world = [false; 3];
        let mut used_voxel = [false; 3];

        for _ in 0..3 {
            let mut best: Option<(usize, usize, f64)> = None;
            for (world, row) in affine.iter().take(3).enumerate() {
                if used_world[world] {
                    continue;
                }
                for voxel in (0..3).filter(|&v| !used_voxel[v]) {
                    let value = row[voxel];
                    if best.map_or(true, |(_, _, b)| value.abs() > b.abs()) {
                        best = Some((world, voxel, value));
                    }
                }
            }
            if let Some((world, voxel, value)) = best {
                used_world[world] = true;
                used_voxel[voxel] = true;
                world_of_voxel[voxel] = (world, if value < 0.0 { -1.0 } else { 1.0 });
            }
        }

        let mut axes = [0; 3];
        let mut flip = [false; 3];
        for (voxel, &(world, sign)) in world_of_voxel.iter().enumerate() {
            axes[world] = voxel;
            flip[world] = sign != RPS[world];
        }
        Self { axes, flip }
    }

    fn reorient(&self, data: &Array3<u8>) -> Array3<u8> {
        let mut out = data.view().permuted_axes(self.axes);
        for (axis, &flip) in self.flip.iter().enumerate() {
            if flip {
                out.invert_axis(Axis(axis));
            }
        }
        out.as_standard_layout().into_owned()
    }

    fn restore(&self, mut data: Array3<u8>) -> Array3<u8> {
        for (axis, &flip) in self.flip.iter().enumerate() {
            if flip {
                data.invert_axis(Axis(axis));
            }
        }
        let mut inverse = [0; 3];
        for (k, &voxel) in self.axes.iter().enumerate() {
            inverse[voxel] = k;
        }
        data.permuted_axes(inverse)
            .as_standard_layout()
            .into_owned()
    }
}

/// Outline of the brain projected along the first axis.
///
/// A pixel is an edge when it differs from the mean of its four neighbours, with
/// wrap-around at the borders.
fn edge_mask(mask: &Array3<u8>) -> Array2<bool> {
    let projected = mask.map_axis(Axis(0), |column| i32::from(column.iter().any(|&v| v > 0)));
    let (rows, cols) = projected.dim();

    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let up = projected[[(r + rows - 1) % rows, c]];
        let down = projected[[(r + 1) % rows, c]];
        let left = projected[[r, (c + cols - 1) % cols]];
        let right = projected[[r, (c + 1) % cols]];
        4 * projected[[r, c]] - up - down - left - right != 0
    })
}

/// Lower convex hull (monotone chain) of the set pixels, visited in row-major order.
fn lower_hull(edges: &Array2<bool>) -> Vec<(i64, i64)> {
    let cross = |o: (i64, i64), a: (i64, i64), b: (i64, i64)| {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    };

    let mut lower: Vec<(i64, i64)> = Vec::new();
    for ((r, c), _) in edges.indexed_iter().filter(|(_, &set)| set) {
        let point = (r as i64, c as i64);
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], point) <= 0
        {
            lower.pop();
        }
        lower.push(point);
    }
    lower
}
