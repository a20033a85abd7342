//! Core data model shared across the pipeline (`spec.md` section 3).

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::IoError;
use crate::voxel::VoxelType;

// =============================================================================
// VolumeMeta
// =============================================================================

/// Geometry and type metadata carried alongside a raw voxel stream through
/// every pipeline stage.
///
/// Invariant: if `is_float` then `component_bits` is 32 or 64.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeMeta {
    pub component_bits: u32,
    pub component_count: u16,
    pub is_signed: bool,
    pub is_float: bool,
    pub swap_endian: bool,
    pub domain: (u32, u32, u32),
    pub aspect: (f32, f32, f32),
}

impl VolumeMeta {
    pub fn new(
        component_bits: u32,
        component_count: u16,
        is_signed: bool,
        is_float: bool,
        swap_endian: bool,
        domain: (u32, u32, u32),
        aspect: (f32, f32, f32),
    ) -> Self {
        debug_assert!(!is_float || component_bits == 32 || component_bits == 64);
        Self {
            component_bits,
            component_count,
            is_signed,
            is_float,
            swap_endian,
            domain,
            aspect,
        }
    }

    /// The scalar [`VoxelType`] of a single component, ignoring component
    /// count (component count is handled separately by callers that need
    /// per-voxel strides).
    pub fn voxel_type(&self) -> Option<VoxelType> {
        VoxelType::from_meta(self.component_bits, self.is_signed, self.is_float)
    }

    /// Bytes per single voxel (all components).
    pub fn voxel_stride(&self) -> usize {
        (self.component_bits as usize / 8) * self.component_count as usize
    }

    /// Total voxel count across the domain.
    pub fn voxel_count(&self) -> u64 {
        self.domain.0 as u64 * self.domain.1 as u64 * self.domain.2 as u64
    }

    /// Total byte length of the raw stream this metadata describes.
    pub fn raw_len(&self) -> u64 {
        self.voxel_count() * self.voxel_stride() as u64
    }
}

// =============================================================================
// StackDescriptor / StackElement
// =============================================================================

/// File-type tag distinguishing where a stack's elements came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
    Dicom,
    Image,
}

/// One slice of a [`StackDescriptor`].
#[derive(Debug, Clone)]
pub struct StackElement {
    pub path: PathBuf,
    /// Byte offset to the pixel payload, for DICOM-embedded payloads. Zero
    /// for plain image files.
    pub payload_offset: u64,
}

impl StackElement {
    pub fn new(path: impl Into<PathBuf>, payload_offset: u64) -> Self {
        Self {
            path: path.into(),
            payload_offset,
        }
    }

    /// Read this element's full file into memory.
    pub fn read_bytes(&self) -> Result<Vec<u8>, IoError> {
        fs::read(&self.path).map_err(|source| IoError::Read {
            path: self.path.clone(),
            source,
        })
    }
}

/// An ordered sequence of [`StackElement`] sharing one logical volume's
/// geometry (`spec.md` section 3).
///
/// Invariant: all elements share (width, height, allocated, stored,
/// components, endianness, encoding) -- the descriptor itself carries those
/// fields once rather than per-element.
#[derive(Debug, Clone)]
pub struct StackDescriptor {
    pub elements: Vec<StackElement>,
    pub kind: StackKind,
    pub width: u32,
    pub height: u32,
    pub bits_allocated: u32,
    pub bits_stored: u32,
    pub component_count: u16,
    pub big_endian: bool,
    pub jpeg_encoded: bool,
    pub aspect: (f32, f32, f32),
    pub description: String,
    pub modality: String,
}

impl StackDescriptor {
    pub fn slice_count(&self) -> usize {
        self.elements.len()
    }

    /// A `(nx, ny, nz)` domain for this stack, `nz` being the slice count.
    pub fn domain(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.elements.len() as u32)
    }

    /// DICOM allocated-width >= 32 is treated as signed (`spec.md` section 9
    /// -- a documented heuristic, preserved and flagged for caller override
    /// in [crate's DESIGN.md]).
    pub fn is_signed_heuristic(&self) -> bool {
        self.kind == StackKind::Dicom && self.bits_allocated >= 32
    }
}

// =============================================================================
// BrickKey / BrickStats
// =============================================================================

/// A brick's identity within a UVF: an LOD index and a flat 1D brick index
/// within that LOD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BrickKey {
    pub lod: usize,
    pub brick_index: usize,
}

impl BrickKey {
    pub fn new(lod: usize, brick_index: usize) -> Self {
        Self { lod, brick_index }
    }

    /// Map a flat 1D brick index to `(bx, by, bz)` given the per-LOD brick
    /// counts. This is the utility `spec.md` section 3 calls for.
    pub fn to_3d(self, brick_counts: (u32, u32, u32)) -> (u32, u32, u32) {
        let (bcx, bcy, _bcz) = brick_counts;
        let idx = self.brick_index as u32;
        let bx = idx % bcx;
        let by = (idx / bcx) % bcy;
        let bz = idx / (bcx * bcy);
        (bx, by, bz)
    }

    /// Inverse of [`BrickKey::to_3d`].
    pub fn from_3d(lod: usize, coords: (u32, u32, u32), brick_counts: (u32, u32, u32)) -> Self {
        let (bx, by, bz) = coords;
        let (bcx, bcy, _bcz) = brick_counts;
        let idx = bz * bcx * bcy + by * bcx + bx;
        Self::new(lod, idx as usize)
    }
}

/// Per-brick statistics. Gradient extrema are reserved and set to
/// `(-inf, +inf)` when unavailable, per `spec.md` section 3.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrickStats {
    pub min: f64,
    pub max: f64,
    pub gradient_min: f64,
    pub gradient_max: f64,
}

impl BrickStats {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            gradient_min: f64::NEG_INFINITY,
            gradient_max: f64::INFINITY,
        }
    }
}

// =============================================================================
// IntermediateFile
// =============================================================================

/// A scratch raw file created somewhere under a caller-supplied temp
/// directory. Ownership is by whoever creates it; the `delete_on_completion`
/// flag must be honored by the facade that owns cleanup, never by the
/// converter that produced the file (`spec.md` section 9).
#[derive(Debug, Clone)]
pub struct IntermediateFile {
    pub path: PathBuf,
    pub header_skip: u64,
    pub scale: f64,
    pub bias: f64,
    pub delete_on_completion: bool,
}

impl IntermediateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            header_skip: 0,
            scale: 1.0,
            bias: 0.0,
            delete_on_completion: true,
        }
    }

    /// Remove the file if `delete_on_completion` is set. Idempotent: a
    /// missing file is not an error, since cleanup runs on every exit path
    /// including ones where the file was never created.
    pub fn cleanup(&self) {
        if self.delete_on_completion {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Build the canonical intermediate path for the main pipeline:
/// `<temp_dir>/<basename(target)>~` (`spec.md` section 6).
pub fn pipeline_temp_path(temp_dir: &Path, target: &Path) -> PathBuf {
    let basename = target
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "intermediate".to_string());
    temp_dir.join(format!("{basename}~"))
}

// =============================================================================
// ExpressionContext
// =============================================================================

/// Binds a parsed expression tree to the set of UVF sources it is evaluated
/// over (`spec.md` section 3). The tree type itself lives in
/// [`crate::eval::expr`].
pub struct ExpressionContext<T> {
    pub sources: Vec<PathBuf>,
    pub tree: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_meta_raw_len() {
        let meta = VolumeMeta::new(16, 1, false, false, false, (2, 2, 2), (1.0, 1.0, 1.0));
        assert_eq!(meta.raw_len(), 2 * 2 * 2 * 2);
    }

    #[test]
    fn brick_key_3d_round_trip() {
        let counts = (4, 3, 2);
        for bz in 0..2 {
            for by in 0..3 {
                for bx in 0..4 {
                    let key = BrickKey::from_3d(0, (bx, by, bz), counts);
                    assert_eq!(key.to_3d(counts), (bx, by, bz));
                }
            }
        }
    }

    #[test]
    fn dicom_signed_heuristic() {
        let mut descriptor = StackDescriptor {
            elements: vec![],
            kind: StackKind::Dicom,
            width: 1,
            height: 1,
            bits_allocated: 32,
            bits_stored: 32,
            component_count: 1,
            big_endian: false,
            jpeg_encoded: false,
            aspect: (1.0, 1.0, 1.0),
            description: String::new(),
            modality: String::new(),
        };
        assert!(descriptor.is_signed_heuristic());
        descriptor.bits_allocated = 16;
        assert!(!descriptor.is_signed_heuristic());
        descriptor.kind = StackKind::Image;
        descriptor.bits_allocated = 32;
        assert!(!descriptor.is_signed_heuristic());
    }

    #[test]
    fn temp_path_uses_basename_with_tilde() {
        let path = pipeline_temp_path(Path::new("/tmp"), Path::new("/data/out.uvf"));
        assert_eq!(path, Path::new("/tmp/out.uvf~"));
    }
}
