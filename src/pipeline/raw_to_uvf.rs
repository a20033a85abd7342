//! `RawToUVFBuilder` (`spec.md` section 2/4.2 point 2): raw stream + geometry
//! metadata -> bricked, multi-LOD UVF. Brick layout itself (brick/LOD
//! geometry derivation) lives behind [`crate::uvf::SimpleUvf`]; this module
//! owns the pipeline-side steps: optional 8-bit quantization, LOD pyramid
//! downsampling, and handing every level to the container plus
//! [`crate::stats::StatsBuilder`].

use crate::error::PipelineError;
use crate::model::VolumeMeta;
use crate::progress::{ProgressSink, Severity};
use crate::stats::StatsBuilder;
use crate::uvf::SimpleUvf;
use crate::voxel::{full_range, read_component_as_f64, write_component_from_f64, VoxelType};

pub struct RawToUVFBuilder;

impl RawToUVFBuilder {
    /// Build a [`SimpleUvf`] from an in-memory raw voxel stream covering
    /// `meta.domain` at full resolution (LOD 0).
    pub fn build(
        data: &[u8],
        meta: &VolumeMeta,
        max_brick: u32,
        overlap: u32,
        quantize8: bool,
        title: String,
        value_semantic: String,
        sink: &dyn ProgressSink,
    ) -> Result<SimpleUvf, PipelineError> {
        let source_type = meta
            .voxel_type()
            .ok_or_else(|| PipelineError::UnsupportedType("no scalar voxel type for this VolumeMeta".into()))?;

        let (final_meta, lod0_data) = if quantize8 && source_type != VoxelType::U8 {
            sink.notify(Severity::Info, "quantizing to 8-bit unsigned");
            (
                VolumeMeta::new(8, meta.component_count, false, false, false, meta.domain, meta.aspect),
                quantize_to_u8(data, source_type),
            )
        } else {
            (*meta, data.to_vec())
        };

        let mut container = SimpleUvf::new(&final_meta, max_brick, overlap, title, value_semantic);
        let voxel_type = final_meta.voxel_type().expect("just constructed from a known type");
        let voxel_stride = final_meta.voxel_stride();

        container.scatter_bricks(0, &lod0_data, voxel_stride);

        let mut current_domain = final_meta.domain;
        let mut current_data = lod0_data;
        for lod in 1..container.lod_count() {
            let next_domain = container.domain(lod);
            current_data = downsample_half(
                &current_data,
                current_domain,
                next_domain,
                voxel_type,
                final_meta.component_count,
            );
            container.scatter_bricks(lod, &current_data, voxel_stride);
            current_domain = next_domain;
            sink.progress(((lod + 1) * 100 / container.lod_count()) as u8, "building LOD pyramid");
        }

        StatsBuilder::build(&mut container)?;

        Ok(container)
    }
}

/// Rescale every component from `source_type`'s full representable range
/// onto `[0, 255]`, linearly, clamped.
pub(crate) fn quantize_to_u8(data: &[u8], source_type: VoxelType) -> Vec<u8> {
    let stride = source_type.size_bytes();
    let (src_min, src_max) = full_range(source_type);
    let span = (src_max - src_min).max(f64::EPSILON);
    let mut out = Vec::with_capacity(data.len() / stride);
    for chunk in data.chunks_exact(stride) {
        let value = read_component_as_f64(chunk, source_type);
        let normalized = ((value - src_min) / span * 255.0).clamp(0.0, 255.0);
        out.push(normalized as u8);
    }
    out
}

/// Halve `src_domain` down to `dst_domain` (each axis either unchanged or
/// halved, rounding up) via box-filter averaging of up to 2x2x2 source
/// voxels per destination voxel.
fn downsample_half(
    data: &[u8],
    src_domain: (u32, u32, u32),
    dst_domain: (u32, u32, u32),
    voxel_type: VoxelType,
    component_count: u16,
) -> Vec<u8> {
    let component_bytes = voxel_type.size_bytes();
    let voxel_stride = component_bytes * component_count as usize;
    let mut out = vec![0u8; dst_domain.0 as usize * dst_domain.1 as usize * dst_domain.2 as usize * voxel_stride];

    let src_index = |x: u32, y: u32, z: u32| -> usize {
        ((z as u64 * src_domain.1 as u64 + y as u64) * src_domain.0 as u64 + x as u64) as usize * voxel_stride
    };
    let dst_index = |x: u32, y: u32, z: u32| -> usize {
        ((z as u64 * dst_domain.1 as u64 + y as u64) * dst_domain.0 as u64 + x as u64) as usize * voxel_stride
    };

    for dz in 0..dst_domain.2 {
        for dy in 0..dst_domain.1 {
            for dx in 0..dst_domain.0 {
                let out_off = dst_index(dx, dy, dz);
                for c in 0..component_count as usize {
                    let mut sum = 0.0;
                    let mut count = 0.0;
                    for oz in 0..2u32 {
                        let sz = dz * 2 + oz;
                        if sz >= src_domain.2 {
                            continue;
                        }
                        for oy in 0..2u32 {
                            let sy = dy * 2 + oy;
                            if sy >= src_domain.1 {
                                continue;
                            }
                            for ox in 0..2u32 {
                                let sx = dx * 2 + ox;
                                if sx >= src_domain.0 {
                                    continue;
                                }
                                let src_off = src_index(sx, sy, sz) + c * component_bytes;
                                sum += read_component_as_f64(&data[src_off..src_off + component_bytes], voxel_type);
                                count += 1.0;
                            }
                        }
                    }
                    let avg = if count > 0.0 { sum / count } else { 0.0 };
                    let out_comp_off = out_off + c * component_bytes;
                    write_component_from_f64(avg, voxel_type, &mut out[out_comp_off..out_comp_off + component_bytes]);
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgressSink;

    #[test]
    fn builds_single_lod_container_for_small_domain() {
        let meta = VolumeMeta::new(8, 1, false, false, false, (4, 4, 1), (1.0, 1.0, 1.0));
        let data: Vec<u8> = (0..16u8).collect();
        let container =
            RawToUVFBuilder::build(&data, &meta, 64, 0, false, "t".into(), "v".into(), &NullProgressSink).unwrap();
        assert_eq!(container.lod_count(), 1);
        assert_eq!(container.gather_domain(0, 1), data);
    }

    #[test]
    fn builds_multi_lod_pyramid_for_larger_domain() {
        let meta = VolumeMeta::new(8, 1, false, false, false, (8, 8, 1), (1.0, 1.0, 1.0));
        let data: Vec<u8> = (0..64u8).collect();
        let container =
            RawToUVFBuilder::build(&data, &meta, 4, 0, false, "t".into(), "v".into(), &NullProgressSink).unwrap();
        assert!(container.lod_count() > 1);
        assert_eq!(container.domain(container.lod_count() - 1), (1, 1, 1));
    }

    #[test]
    fn quantize8_rescales_16_bit_to_8_bit() {
        let meta = VolumeMeta::new(16, 1, false, false, false, (2, 2, 1), (1.0, 1.0, 1.0));
        let data: Vec<u8> = vec![0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00, 0xFF, 0xFF];
        let container =
            RawToUVFBuilder::build(&data, &meta, 64, 0, true, "t".into(), "v".into(), &NullProgressSink).unwrap();
        assert_eq!(container.voxel_type(), Some(VoxelType::U8));
    }
}
