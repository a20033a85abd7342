//! A minimal, concrete Universal Volume Format container.
//!
//! `spec.md` section 1 places the UVF container format's internals out of
//! scope ("external collaborators"); the pipeline only needs to depend on a
//! contract: open/create, query LOD/brick geometry, read/write bricks,
//! append stat blocks. [`UvfContainer`] is that contract; [`SimpleUvf`] is a
//! reference implementation concrete enough to make the rest of this crate
//! exercisable end to end, covering the round-trip and min/max invariants in
//! `spec.md` section 8. Brick layout (§4.2 "delegates brick layout to the
//! UVF library") lives entirely behind this module.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IoError;
use crate::model::{BrickKey, BrickStats, VolumeMeta};
use crate::voxel::VoxelType;

const MAGIC: &[u8; 4] = b"UVF1";

/// Per-LOD domain and brick-count geometry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LodGeometry {
    pub domain: (u32, u32, u32),
    pub brick_counts: (u32, u32, u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SerializableBrickStats {
    min: f64,
    max: f64,
    gradient_min: f64,
    gradient_max: f64,
}

impl From<BrickStats> for SerializableBrickStats {
    fn from(s: BrickStats) -> Self {
        Self {
            min: s.min,
            max: s.max,
            gradient_min: s.gradient_min,
            gradient_max: s.gradient_max,
        }
    }
}

impl From<SerializableBrickStats> for BrickStats {
    fn from(s: SerializableBrickStats) -> Self {
        BrickStats {
            min: s.min,
            max: s.max,
            gradient_min: s.gradient_min,
            gradient_max: s.gradient_max,
        }
    }
}

/// The container's metadata and table of contents. Serialized as JSON ahead
/// of a flat data section holding brick payloads back-to-back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UvfHeader {
    pub component_bits: u32,
    pub component_count: u16,
    pub is_signed: bool,
    pub is_float: bool,
    pub aspect: (f32, f32, f32),
    pub max_brick: u32,
    pub overlap: u32,
    pub title: String,
    pub value_semantic: String,
    pub levels: Vec<LodGeometry>,
    /// `[lod][brick_index] -> (offset, length)` into the data section.
    brick_offsets: Vec<Vec<(u64, u64)>>,
    /// `[lod][brick_index]` per-component stats, once [`SimpleUvf::set_minmax`] ran.
    pub minmax: Option<Vec<Vec<Vec<SerializableBrickStats>>>>,
    pub histogram_1d: Option<Vec<u64>>,
    pub histogram_2d: Option<Vec<Vec<u64>>>,
}

/// Reference [`UvfContainer`] implementation. Bricks live in memory until
/// [`SimpleUvf::save`] flattens them to disk; [`SimpleUvf::load`] does the
/// reverse.
pub struct SimpleUvf {
    header: UvfHeader,
    /// `[lod][brick_index] -> bytes`.
    bricks: Vec<Vec<Vec<u8>>>,
}

impl SimpleUvf {
    /// Create a new, empty container with brick/LOD geometry derived from
    /// `meta.domain` and `max_brick`. LODs are generated by halving the
    /// domain on every axis until it fits in a single brick, inclusive of
    /// that final single-brick level.
    pub fn new(meta: &VolumeMeta, max_brick: u32, overlap: u32, title: String, value_semantic: String) -> Self {
        let levels = compute_lod_geometry(meta.domain, max_brick);
        let bricks = levels
            .iter()
            .map(|l| vec![Vec::new(); brick_total(l.brick_counts)])
            .collect();

        Self {
            header: UvfHeader {
                component_bits: meta.component_bits,
                component_count: meta.component_count,
                is_signed: meta.is_signed,
                is_float: meta.is_float,
                aspect: meta.aspect,
                max_brick,
                overlap,
                title,
                value_semantic,
                levels,
                brick_offsets: Vec::new(),
                minmax: None,
                histogram_1d: None,
                histogram_2d: None,
            },
            bricks,
        }
    }

    pub fn header(&self) -> &UvfHeader {
        &self.header
    }

    pub fn lod_count(&self) -> usize {
        self.header.levels.len()
    }

    pub fn domain(&self, lod: usize) -> (u32, u32, u32) {
        self.header.levels[lod].domain
    }

    pub fn brick_counts(&self, lod: usize) -> (u32, u32, u32) {
        self.header.levels[lod].brick_counts
    }

    pub fn brick_count(&self, lod: usize) -> usize {
        brick_total(self.brick_counts(lod))
    }

    pub fn brick_overlap(&self) -> u32 {
        self.header.overlap
    }

    pub fn max_brick(&self) -> u32 {
        self.header.max_brick
    }

    pub fn component_count(&self) -> u16 {
        self.header.component_count
    }

    pub fn voxel_type(&self) -> Option<VoxelType> {
        VoxelType::from_meta(self.header.component_bits, self.header.is_signed, self.header.is_float)
    }

    /// Logical extents `(start, end)` (exclusive) of a brick within its
    /// LOD's full domain, on each axis. This is the non-overlapping core
    /// partition; the last brick along an axis may be smaller than
    /// `max_brick`.
    pub fn brick_extents(&self, key: BrickKey) -> ((u32, u32, u32), (u32, u32, u32)) {
        let domain = self.domain(key.lod);
        let counts = self.brick_counts(key.lod);
        let (bx, by, bz) = key.to_3d(counts);
        let mb = self.header.max_brick;
        let start = (bx * mb, by * mb, bz * mb);
        let end = (
            (start.0 + mb).min(domain.0),
            (start.1 + mb).min(domain.1),
            (start.2 + mb).min(domain.2),
        );
        (start, end)
    }

    pub fn read_brick(&self, key: BrickKey) -> &[u8] {
        &self.bricks[key.lod][key.brick_index]
    }

    pub fn write_brick(&mut self, key: BrickKey, data: Vec<u8>) {
        self.bricks[key.lod][key.brick_index] = data;
    }

    pub fn set_minmax(&mut self, stats: Vec<Vec<Vec<BrickStats>>>) {
        self.header.minmax = Some(
            stats
                .into_iter()
                .map(|lod| {
                    lod.into_iter()
                        .map(|brick| brick.into_iter().map(SerializableBrickStats::from).collect())
                        .collect()
                })
                .collect(),
        );
    }

    pub fn set_histogram_1d(&mut self, bins: Vec<u64>) {
        self.header.histogram_1d = Some(bins);
    }

    pub fn set_histogram_2d(&mut self, bins: Vec<Vec<u64>>) {
        self.header.histogram_2d = Some(bins);
    }

    /// Split a flat, slice-major buffer covering the whole domain of `lod`
    /// into per-brick byte buffers and write them all in, keyed by
    /// [`BrickKey`]. `voxel_stride` is bytes per voxel (all components).
    pub fn scatter_bricks(&mut self, lod: usize, flat: &[u8], voxel_stride: usize) {
        let domain = self.domain(lod);
        let count = self.brick_count(lod);
        for idx in 0..count {
            let key = BrickKey::new(lod, idx);
            let (start, end) = self.brick_extents(key);
            let mut brick = Vec::with_capacity(
                (end.0 - start.0) as usize * (end.1 - start.1) as usize * (end.2 - start.2) as usize * voxel_stride,
            );
            for z in start.2..end.2 {
                for y in start.1..end.1 {
                    let row_start = ((z as u64 * domain.1 as u64 + y as u64) * domain.0 as u64 + start.0 as u64)
                        as usize
                        * voxel_stride;
                    let row_len = (end.0 - start.0) as usize * voxel_stride;
                    brick.extend_from_slice(&flat[row_start..row_start + row_len]);
                }
            }
            self.write_brick(key, brick);
        }
    }

    /// Inverse of [`SimpleUvf::scatter_bricks`]: reassemble the full,
    /// slice-major domain buffer for `lod` from its stored bricks.
    pub fn gather_domain(&self, lod: usize, voxel_stride: usize) -> Vec<u8> {
        let domain = self.domain(lod);
        let mut flat = vec![0u8; domain.0 as usize * domain.1 as usize * domain.2 as usize * voxel_stride];
        let count = self.brick_count(lod);
        for idx in 0..count {
            let key = BrickKey::new(lod, idx);
            let (start, end) = self.brick_extents(key);
            let brick = self.read_brick(key);
            let brick_width = (end.0 - start.0) as usize;
            let mut cursor = 0usize;
            for z in start.2..end.2 {
                for y in start.1..end.1 {
                    let row_start = ((z as u64 * domain.1 as u64 + y as u64) * domain.0 as u64 + start.0 as u64)
                        as usize
                        * voxel_stride;
                    let row_len = brick_width * voxel_stride;
                    flat[row_start..row_start + row_len].copy_from_slice(&brick[cursor..cursor + row_len]);
                    cursor += row_len;
                }
            }
        }
        flat
    }

    /// Flatten every brick into the data section and write the container to
    /// `path`: magic, header length, JSON header, data section.
    pub fn save(&self, path: &Path) -> Result<(), IoError> {
        let mut data = Vec::new();
        let mut offsets = Vec::with_capacity(self.bricks.len());
        for lod_bricks in &self.bricks {
            let mut lod_offsets = Vec::with_capacity(lod_bricks.len());
            for brick in lod_bricks {
                lod_offsets.push((data.len() as u64, brick.len() as u64));
                data.extend_from_slice(brick);
            }
            offsets.push(lod_offsets);
        }

        let mut header = self.header.clone();
        header.brick_offsets = offsets;
        let header_json = serde_json::to_vec(&header).expect("UvfHeader is always serializable");

        let mut file = File::create(path).map_err(|source| IoError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        file.write_all(MAGIC).and_then(|_| file.write_all(&(header_json.len() as u64).to_le_bytes()))
            .and_then(|_| file.write_all(&header_json))
            .and_then(|_| file.write_all(&data))
            .map_err(|source| IoError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(())
    }

    /// Read a container back from disk, materializing all bricks into
    /// memory.
    pub fn load(path: &Path) -> Result<Self, IoError> {
        let mut file = File::open(path).map_err(|source| IoError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic).map_err(|source| IoError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if &magic != MAGIC {
            return Err(IoError::Read {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, "not a UVF container"),
            });
        }
        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes).map_err(|source| IoError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let header_len = u64::from_le_bytes(len_bytes) as usize;
        let mut header_bytes = vec![0u8; header_len];
        file.read_exact(&mut header_bytes).map_err(|source| IoError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let header: UvfHeader = serde_json::from_slice(&header_bytes).map_err(|e| IoError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|source| IoError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let bricks = header
            .brick_offsets
            .iter()
            .map(|lod_offsets| {
                lod_offsets
                    .iter()
                    .map(|&(offset, length)| data[offset as usize..(offset + length) as usize].to_vec())
                    .collect()
            })
            .collect();

        Ok(Self { header, bricks })
    }
}

fn brick_total(counts: (u32, u32, u32)) -> usize {
    (counts.0 as usize) * (counts.1 as usize) * (counts.2 as usize)
}

fn div_ceil(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

fn compute_lod_geometry(domain0: (u32, u32, u32), max_brick: u32) -> Vec<LodGeometry> {
    let mut levels = Vec::new();
    let mut domain = domain0;
    loop {
        let brick_counts = (
            div_ceil(domain.0.max(1), max_brick),
            div_ceil(domain.1.max(1), max_brick),
            div_ceil(domain.2.max(1), max_brick),
        );
        levels.push(LodGeometry { domain, brick_counts });

        if brick_counts == (1, 1, 1) {
            break;
        }

        domain = (
            div_ceil(domain.0, 2).max(1),
            div_ceil(domain.1, 2).max(1),
            div_ceil(domain.2, 2).max(1),
        );
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(domain: (u32, u32, u32)) -> VolumeMeta {
        VolumeMeta::new(8, 1, false, false, false, domain, (1.0, 1.0, 1.0))
    }

    #[test]
    fn lod_geometry_stops_at_single_brick() {
        let levels = compute_lod_geometry((130, 130, 4), 64);
        assert_eq!(levels[0].brick_counts, (3, 3, 1));
        assert_eq!(levels.last().unwrap().brick_counts, (1, 1, 1));
    }

    #[test]
    fn single_brick_domain_has_one_lod() {
        let levels = compute_lod_geometry((4, 4, 4), 64);
        assert_eq!(levels.len(), 1);
    }

    #[test]
    fn brick_extents_clamp_to_domain_edge() {
        let container = SimpleUvf::new(&meta((10, 10, 1)), 8, 0, "t".into(), "v".into());
        let key = BrickKey::new(0, container.brick_counts(0).0 as usize); // second row, first column conceptually
        let (_, end) = container.brick_extents(BrickKey::new(0, 0));
        assert_eq!(end, (8, 8, 1));
        let _ = key;
    }

    #[test]
    fn scatter_then_gather_round_trips_domain_data() {
        let mut container = SimpleUvf::new(&meta((5, 3, 1)), 4, 0, "t".into(), "v".into());
        let flat: Vec<u8> = (0..15u8).collect();
        container.scatter_bricks(0, &flat, 1);
        let gathered = container.gather_domain(0, 1);
        assert_eq!(gathered, flat);
    }

    #[test]
    fn save_and_load_round_trip_preserves_bricks_and_header() {
        let dir = std::env::temp_dir().join(format!("uvf-container-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("volume.uvf");

        let mut container = SimpleUvf::new(&meta((4, 4, 1)), 4, 0, "title".into(), "density".into());
        container.write_brick(BrickKey::new(0, 0), vec![1, 2, 3, 4]);
        container.save(&path).unwrap();

        let loaded = SimpleUvf::load(&path).unwrap();
        assert_eq!(loaded.header().title, "title");
        assert_eq!(loaded.read_brick(BrickKey::new(0, 0)), &[1, 2, 3, 4]);
    }
}
