//! Per-brick min/max accumulation.
//!
//! `spec.md` section 4.3: append to an accumulating min-max data block via
//! *StartNewValue -> MergeData* so per-component grouping is preserved. Each
//! brick gets its own accumulator (`start_new_value`); every voxel component
//! read from the brick feeds `merge_data` keyed by its component index so a
//! 4-component brick ends up with four independent `(min, max)` pairs.

use crate::model::BrickStats;
use crate::voxel::{read_component_as_f64, VoxelType};

/// Accumulates per-component min/max for a single brick.
pub struct MinMaxAccumulator {
    per_component: Vec<(f64, f64)>,
}

impl MinMaxAccumulator {
    /// `StartNewValue`: begin tracking a fresh brick with `component_count`
    /// independent channels.
    pub fn start_new_value(component_count: u16) -> Self {
        Self {
            per_component: vec![(f64::INFINITY, f64::NEG_INFINITY); component_count as usize],
        }
    }

    /// `MergeData`: fold one component's value into its running extrema.
    pub fn merge_data(&mut self, component: usize, value: f64) {
        let (min, max) = &mut self.per_component[component];
        if value < *min {
            *min = value;
        }
        if value > *max {
            *max = value;
        }
    }

    pub fn finish(self) -> Vec<BrickStats> {
        self.per_component
            .into_iter()
            .map(|(min, max)| BrickStats::new(min, max))
            .collect()
    }
}

/// Compute per-component min/max over one brick's raw bytes.
///
/// `spec.md` section 8: for any raster block, every emitted `BrickStats`
/// `(mn, mx)` satisfies `mn = min(voxels in brick)`, `mx = max(voxels in
/// brick)` -- per component.
pub fn brick_minmax(data: &[u8], voxel_type: VoxelType, component_count: u16) -> Vec<BrickStats> {
    let mut acc = MinMaxAccumulator::start_new_value(component_count);
    let stride = voxel_type.size_bytes();
    let voxel_stride = stride * component_count as usize;
    for voxel in data.chunks_exact(voxel_stride) {
        for (c, component_bytes) in voxel.chunks_exact(stride).enumerate() {
            acc.merge_data(c, read_component_as_f64(component_bytes, voxel_type));
        }
    }
    acc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_component_minmax() {
        let data: [u8; 4] = [1, 5, 3, 9];
        let stats = brick_minmax(&data, VoxelType::U8, 1);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].min, 1.0);
        assert_eq!(stats[0].max, 9.0);
    }

    #[test]
    fn multi_component_minmax_is_per_channel() {
        // Two RGBA-ish voxels: (10, 200), (50, 100)
        let data: [u8; 4] = [10, 200, 50, 100];
        let stats = brick_minmax(&data, VoxelType::U8, 2);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].min, 10.0);
        assert_eq!(stats[0].max, 50.0);
        assert_eq!(stats[1].min, 100.0);
        assert_eq!(stats[1].max, 200.0);
    }

    #[test]
    fn gradient_extrema_are_reserved() {
        let stats = brick_minmax(&[1, 2], VoxelType::U8, 1);
        assert_eq!(stats[0].gradient_min, f64::NEG_INFINITY);
        assert_eq!(stats[0].gradient_max, f64::INFINITY);
    }
}
