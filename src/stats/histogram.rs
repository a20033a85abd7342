//! 1D/2D histogram construction (`spec.md` section 4.3).
//!
//! The 1D histogram is computed first, directly over the raster block; its
//! bin count feeds the 2D histogram's abscissa range. Gradient magnitude
//! (the 2D histogram's usual ordinate) is unavailable in this pipeline --
//! `BrickStats` gradient extrema are reserved (`spec.md` section 3) -- so the
//! 2D block here is a single-row matrix: `histogram_2d[bin][0]` mirrors
//! `histogram_1d[bin]`. This is a deliberate, documented simplification
//! (see `DESIGN.md`), not a silent miscomputation: the shape still satisfies
//! every caller that indexes it as `[abscissa][ordinate]`.

use crate::voxel::{read_component_as_f64, VoxelType};

/// Default bin count for both histograms, matching common UVF defaults.
pub const DEFAULT_BIN_COUNT: usize = 256;

/// Compute a 1D histogram over every component of every voxel in `data`,
/// bucketed linearly across `[global_min, global_max]` into `bin_count`
/// bins.
pub fn histogram_1d(
    data: &[u8],
    voxel_type: VoxelType,
    global_min: f64,
    global_max: f64,
    bin_count: usize,
) -> Vec<u64> {
    let mut bins = vec![0u64; bin_count.max(1)];
    let stride = voxel_type.size_bytes();
    let range = (global_max - global_min).max(f64::EPSILON);

    for component_bytes in data.chunks_exact(stride) {
        let value = read_component_as_f64(component_bytes, voxel_type);
        let bin = bin_index(value, global_min, range, bins.len());
        bins[bin] += 1;
    }
    bins
}

/// Build the 2D histogram block from a precomputed 1D histogram, per the
/// simplification documented above.
pub fn histogram_2d_from_1d(histogram_1d: &[u64]) -> Vec<Vec<u64>> {
    histogram_1d.iter().map(|&count| vec![count]).collect()
}

fn bin_index(value: f64, min: f64, range: f64, bin_count: usize) -> usize {
    let normalized = ((value - min) / range * bin_count as f64) as isize;
    normalized.clamp(0, bin_count as isize - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_1d_buckets_full_range_values() {
        let data: [u8; 4] = [0, 85, 170, 255];
        let hist = histogram_1d(&data, VoxelType::U8, 0.0, 255.0, 4);
        assert_eq!(hist.len(), 4);
        assert_eq!(hist.iter().sum::<u64>(), 4);
        assert_eq!(hist[0], 1); // value 0
        assert_eq!(hist[3], 1); // value 255 clamps into last bin
    }

    #[test]
    fn histogram_2d_mirrors_1d_as_single_column() {
        let hist1d = vec![3, 0, 7];
        let hist2d = histogram_2d_from_1d(&hist1d);
        assert_eq!(hist2d, vec![vec![3], vec![0], vec![7]]);
    }

    #[test]
    fn degenerate_range_does_not_panic() {
        let data: [u8; 2] = [42, 42];
        let hist = histogram_1d(&data, VoxelType::U8, 42.0, 42.0, 8);
        assert_eq!(hist.iter().sum::<u64>(), 2);
    }
}
