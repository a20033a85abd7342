//! `Merger` (`spec.md` section 4.4): type-dispatched n-way combiner of
//! co-dimensional raw streams.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{IoError, MergeError};
use crate::model::{IntermediateFile, VolumeMeta};
use crate::voxel::{read_component_as_f64, write_component_from_f64, VoxelType};

/// Voxels processed per streaming window. Keeps memory bounded regardless of
/// volume size (`spec.md` section 4.4: "streams brick-sized windows; does
/// not require the whole volume in memory").
const WINDOW_VOXELS: usize = 4096;

pub struct Merger;

impl Merger {
    /// Combine `sources` (each an [`IntermediateFile`] with its own `scale`
    /// and `bias`) into a single raw file at `output`, voxel-wise:
    /// `max_i(scale_i * x_i + bias_i)` in max-mode, `sum_i(...)` otherwise.
    /// All sources must already share `meta`'s geometry -- the caller checks
    /// compatibility up front.
    pub fn merge(
        sources: &[IntermediateFile],
        meta: &VolumeMeta,
        output: &Path,
        use_max: bool,
    ) -> Result<(), MergeError> {
        let voxel_type = meta
            .voxel_type()
            .ok_or_else(|| MergeError::IncompatibleInputs { reason: "no scalar voxel type".into() })?;
        if matches!(voxel_type, VoxelType::I64 | VoxelType::U64) {
            return Err(MergeError::UnsupportedType(voxel_type));
        }

        let component_bytes = voxel_type.size_bytes();
        let component_count = meta.component_count as usize;
        let voxel_stride = component_bytes * component_count;
        let voxel_count = meta.voxel_count() as usize;

        let mut readers: Vec<File> = sources
            .iter()
            .map(|s| {
                File::open(&s.path).map_err(|source| MergeError::Io(IoError::Read { path: s.path.clone(), source }))
            })
            .collect::<Result<_, _>>()?;

        let mut writer = File::create(output)
            .map_err(|source| MergeError::Io(IoError::Write { path: output.to_path_buf(), source }))?;

        let mut in_buffers: Vec<Vec<u8>> = vec![vec![0u8; WINDOW_VOXELS * voxel_stride]; sources.len()];
        let mut out_buffer = vec![0u8; WINDOW_VOXELS * voxel_stride];

        let mut remaining = voxel_count;
        while remaining > 0 {
            let chunk_voxels = remaining.min(WINDOW_VOXELS);
            let chunk_bytes = chunk_voxels * voxel_stride;

            for (i, reader) in readers.iter_mut().enumerate() {
                reader
                    .read_exact(&mut in_buffers[i][..chunk_bytes])
                    .map_err(|source| MergeError::Io(IoError::Read { path: sources[i].path.clone(), source }))?;
            }

            for v in 0..chunk_voxels {
                for c in 0..component_count {
                    let off = v * voxel_stride + c * component_bytes;
                    let mut acc = if use_max { f64::NEG_INFINITY } else { 0.0 };
                    for (i, src) in sources.iter().enumerate() {
                        let raw = read_component_as_f64(&in_buffers[i][off..off + component_bytes], voxel_type);
                        let value = src.scale * raw + src.bias;
                        acc = if use_max { acc.max(value) } else { acc + value };
                    }
                    write_component_from_f64(acc, voxel_type, &mut out_buffer[off..off + component_bytes]);
                }
            }

            writer
                .write_all(&out_buffer[..chunk_bytes])
                .map_err(|source| MergeError::Io(IoError::Write { path: output.to_path_buf(), source }))?;
            remaining -= chunk_voxels;
        }

        Ok(())
    }
}
