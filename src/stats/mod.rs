//! Bricked min/max & histogram construction (`spec.md` section 4.3).

pub mod histogram;
pub mod minmax;

use crate::error::PipelineError;
use crate::model::BrickKey;
use crate::uvf::SimpleUvf;
use crate::voxel::VoxelType;

use self::histogram::{histogram_1d, histogram_2d_from_1d, DEFAULT_BIN_COUNT};
use self::minmax::brick_minmax;

/// Computes per-brick min/max and 1D/2D histograms over every LOD of a
/// [`SimpleUvf`] under construction and appends the resulting data blocks.
///
/// Type dispatch covers every [`VoxelType`] except 64-bit integers, which
/// `spec.md` section 9 documents as currently unsupported in stats; those
/// surface [`PipelineError::UnsupportedType`] rather than silently
/// miscomputing.
pub struct StatsBuilder;

impl StatsBuilder {
    /// Walk every `(LOD, brick)` pair, accumulate per-component min/max, and
    /// build the 1D histogram over LOD 0 (the highest-resolution, and hence
    /// most representative, raster data) before feeding its bin count into
    /// the 2D histogram's abscissa range (`spec.md` section 4.3).
    pub fn build(container: &mut SimpleUvf) -> Result<(), PipelineError> {
        let voxel_type = container
            .voxel_type()
            .ok_or_else(|| PipelineError::UnsupportedType("no voxel type for this component encoding".into()))?;

        if matches!(voxel_type, VoxelType::I64 | VoxelType::U64) {
            return Err(PipelineError::UnsupportedType(format!(
                "{voxel_type} voxels are unsupported in stats (spec section 9)"
            )));
        }

        let component_count = container.component_count();
        let mut per_lod_stats = Vec::with_capacity(container.lod_count());
        let mut global_max = f64::NEG_INFINITY;
        let mut global_min = f64::INFINITY;

        for lod in 0..container.lod_count() {
            let mut per_brick_stats = Vec::with_capacity(container.brick_count(lod));
            for brick_idx in 0..container.brick_count(lod) {
                let key = BrickKey::new(lod, brick_idx);
                let data = container.read_brick(key);
                let stats = brick_minmax(data, voxel_type, component_count);
                for s in &stats {
                    global_max = global_max.max(s.max);
                    global_min = global_min.min(s.min);
                }
                per_brick_stats.push(stats);
            }
            per_lod_stats.push(per_brick_stats);
        }

        container.set_minmax(per_lod_stats);

        let lod0_data = container.gather_domain(0, voxel_type.size_bytes() * component_count as usize);
        let hist1d = histogram_1d(&lod0_data, voxel_type, global_min, global_max, DEFAULT_BIN_COUNT);
        let hist2d = histogram_2d_from_1d(&hist1d);

        container.set_histogram_1d(hist1d);
        container.set_histogram_2d(hist2d);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VolumeMeta;

    #[test]
    fn build_populates_minmax_and_histograms() {
        let meta = VolumeMeta::new(8, 1, false, false, false, (4, 4, 1), (1.0, 1.0, 1.0));
        let mut container = SimpleUvf::new(&meta, 4, 0, "t".into(), "v".into());
        let flat: Vec<u8> = (0..16u8).collect();
        container.scatter_bricks(0, &flat, 1);

        StatsBuilder::build(&mut container).unwrap();

        let minmax = container.header().minmax.clone().unwrap();
        assert_eq!(minmax[0][0][0].min, 0.0);
        assert_eq!(minmax[0][0][0].max, 15.0);
        assert!(container.header().histogram_1d.is_some());
        assert!(container.header().histogram_2d.is_some());
    }

    #[test]
    fn rejects_64_bit_integer_voxels() {
        let meta = VolumeMeta::new(64, 1, false, false, false, (2, 2, 1), (1.0, 1.0, 1.0));
        let mut container = SimpleUvf::new(&meta, 4, 0, "t".into(), "v".into());
        container.scatter_bricks(0, &[0u8; 32], 8);
        let err = StatsBuilder::build(&mut container).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedType(_)));
    }
}
