//! NIfTI volume I/O and voxel-wise helpers.
//!
//! Volumes are held as `Array3<f32>` indexed `[i, j, k]` in voxel order together with the
//! header they were read from, so that anything written back keeps the source geometry.

use crate::{PreprocessError, PreprocessResult};
use ndarray::{Array3, ArrayD, Axis, Ix3, Zip};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;

/// A 3-D NIfTI volume and its header.
#[derive(Debug, Clone)]
pub struct NiftiVolume {
    pub header: NiftiHeader,
    pub data: Array3<f32>,
}

impl NiftiVolume {
    /// Reads a `.nii` or `.nii.gz` file with scaling applied.
    ///
    /// 4-D files with a single volume along the fourth axis are accepted and squeezed.
    pub fn read(path: &Path) -> PreprocessResult<Self> {
        let obj = ReaderOptions::new()
            .read_file(path)
            .map_err(|source| PreprocessError::NiftiRead {
                path: path.to_path_buf(),
                source,
            })?;
        let header = obj.header().clone();
        let data: ArrayD<f32> = obj.into_volume().into_ndarray::<f32>().map_err(|source| {
            PreprocessError::NiftiRead {
                path: path.to_path_buf(),
                source,
            }
        })?;

        Ok(Self {
            header,
            data: into_3d(data, path)?,
        })
    }

    /// Wraps data with a header taken from another volume.
    pub fn with_header(header: &NiftiHeader, data: Array3<f32>) -> Self {
        Self {
            header: header.clone(),
            data,
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        let (x, y, z) = self.data.dim();
        [x, y, z]
    }

    /// Writes the volume as `float32`, keeping the geometry of the header.
    pub fn write(&self, path: &Path) -> PreprocessResult<()> {
        write_array(path, &self.header, &self.data)
    }

    /// Voxel-to-world affine as a row-major 4x4 matrix.
    pub fn affine(&self) -> [[f64; 4]; 4] {
        header_affine(&self.header)
    }
}

fn into_3d(data: ArrayD<f32>, path: &Path) -> PreprocessResult<Array3<f32>> {
    let shape_err = |reason: String| PreprocessError::ImageShape {
        path: path.to_path_buf(),
        reason,
    };

    let data = match data.ndim() {
        3 => data,
        4 if data.shape()[3] == 1 => data.index_axis_move(Axis(3), 0),
        n => {
            return Err(shape_err(format!(
                "expected a 3-D volume, got {n} dimensions {:?}",
                data.shape()
            )))
        }
    };

    data.into_dimensionality::<Ix3>()
        .map_err(|e| shape_err(e.to_string()))
}

/// Header for derived images: voxel values are written unscaled.
fn output_header(reference: &NiftiHeader) -> NiftiHeader {
    let mut header = reference.clone();
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;
    header
}

/// Creates the parent directory of `path` if it has one.
pub(crate) fn create_parent(path: &Path) -> PreprocessResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| PreprocessError::DirCreation {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Copies a finished image to an output location, creating its folder.
pub fn copy_image(from: &Path, to: &Path) -> PreprocessResult<()> {
    create_parent(to)?;
    std::fs::copy(from, to).map_err(|source| PreprocessError::FileCopy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn prepare_output(path: &Path, reference: &NiftiHeader) -> PreprocessResult<NiftiHeader> {
    create_parent(path)?;
    Ok(output_header(reference))
}

fn write_err(path: &Path) -> impl FnOnce(nifti::NiftiError) -> PreprocessError + '_ {
    move |source| PreprocessError::NiftiWrite {
        path: path.to_path_buf(),
        source,
    }
}

fn write_array(path: &Path, reference: &NiftiHeader, data: &Array3<f32>) -> PreprocessResult<()> {
    let header = prepare_output(path, reference)?;
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(data)
        .map_err(write_err(path))
}

/// Writes a binary mask as `uint8`, using `reference` for geometry.
pub fn write_mask(path: &Path, reference: &NiftiHeader, mask: &Array3<u8>) -> PreprocessResult<()> {
    let header = prepare_output(path, reference)?;
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(mask)
        .map_err(write_err(path))
}

/// Zeroes every voxel of `input` where `mask` is not positive and writes the result.
///
/// # Errors
///
/// Returns `MaskShapeMismatch` if the two volumes do not share a grid.
pub fn apply_mask(input: &Path, mask: &Path, output: &Path) -> PreprocessResult<()> {
    let mut image = NiftiVolume::read(input)?;
    let mask = NiftiVolume::read(mask)?;

    if image.data.shape() != mask.data.shape() {
        return Err(PreprocessError::MaskShapeMismatch {
            image: image.data.shape().to_vec(),
            mask: mask.data.shape().to_vec(),
        });
    }

    Zip::from(&mut image.data)
        .and(&mask.data)
        .for_each(|voxel, &m| {
            if m <= 0.0 {
                *voxel = 0.0;
            }
        });

    image.write(output)
}

/// Get the affine transformation matrix from a header.
///
/// Prefers sform, then qform, then falls back to pixdim scaling.
pub fn header_affine(header: &NiftiHeader) -> [[f64; 4]; 4] {
    if header.sform_code > 0 {
        let row = |r: [f32; 4]| [r[0] as f64, r[1] as f64, r[2] as f64, r[3] as f64];
        return [
            row(header.srow_x),
            row(header.srow_y),
            row(header.srow_z),
            [0.0, 0.0, 0.0, 1.0],
        ];
    }

    let dx = header.pixdim[1] as f64;
    let dy = header.pixdim[2] as f64;
    let dz = header.pixdim[3] as f64;

    if header.qform_code > 0 {
        let b = header.quatern_b as f64;
        let c = header.quatern_c as f64;
        let d = header.quatern_d as f64;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let dz = dz * qfac;

        return [
            [
                (a * a + b * b - c * c - d * d) * dx,
                (2.0 * b * c - 2.0 * a * d) * dy,
                (2.0 * b * d + 2.0 * a * c) * dz,
                header.quatern_x as f64,
            ],
            [
                (2.0 * b * c + 2.0 * a * d) * dx,
                (a * a + c * c - b * b - d * d) * dy,
                (2.0 * c * d - 2.0 * a * b) * dz,
                header.quatern_y as f64,
            ],
            [
                (2.0 * b * d - 2.0 * a * c) * dx,
                (2.0 * c * d + 2.0 * a * b) * dy,
                (a * a + d * d - c * c - b * b) * dz,
                header.quatern_z as f64,
            ],
            [0.0, 0.0, 0.0, 1.0],
        ];
    }

    [
        [dx, 0.0, 0.0, 0.0],
        [0.0, dy, 0.0, 0.0],
        [0.0, 0.0, dz, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}
