//! `ExpressionEvaluator` (`spec.md` section 4.6): evaluate a voxel
//! expression over `N` co-registered UVF sources into a new UVF.

pub mod expr;

use std::path::{Path, PathBuf};

use crate::error::{EvalError, PipelineError};
use crate::model::VolumeMeta;
use crate::pipeline::raw_to_uvf::RawToUVFBuilder;
use crate::progress::ProgressSink;
use crate::uvf::SimpleUvf;
use crate::voxel::{full_range, read_component_as_f64, write_component_from_f64, VoxelType};

pub use expr::{Expr, SimpleExpressionParser};

pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    /// Parse `expression`, check every source is mergeable with the first,
    /// then evaluate voxel-wise into a fresh UVF at `target`.
    pub fn evaluate(
        sources: &[PathBuf],
        expression: &str,
        target: &Path,
        max_brick: u32,
        overlap: u32,
        quantize8: bool,
        sink: &dyn ProgressSink,
    ) -> Result<(), PipelineError> {
        let tree = SimpleExpressionParser::parse(expression)?;

        if let Some(max_index) = tree.max_var_index() {
            if max_index >= sources.len() {
                return Err(EvalError::VariableOutOfRange { index: max_index, available: sources.len() }.into());
            }
        }

        let containers: Vec<SimpleUvf> = sources
            .iter()
            .map(|p| SimpleUvf::load(p).map_err(|e| EvalError::OpenFailure { path: p.clone(), reason: e.to_string() }))
            .collect::<Result<_, EvalError>>()?;

        check_mergeable(&containers)?;

        let source_types: Vec<VoxelType> = containers
            .iter()
            .map(|c| {
                c.voxel_type()
                    .ok_or_else(|| EvalError::Unmergeable { reason: "a source has no scalar voxel type".into() })
            })
            .collect::<Result<_, _>>()?;

        let dest_type = VoxelType::widest(&source_types)
            .ok_or_else(|| EvalError::Unmergeable { reason: "could not determine a common voxel type".into() })?;
        if matches!(dest_type, VoxelType::I64 | VoxelType::U64) {
            return Err(EvalError::UnsupportedType(dest_type).into());
        }

        let first = &containers[0];
        let domain = first.domain(0);
        let component_count = first.component_count();
        let dest_stride = dest_type.size_bytes();
        let dest_voxel_stride = dest_stride * component_count as usize;

        let source_data: Vec<Vec<u8>> = containers
            .iter()
            .enumerate()
            .map(|(i, c)| c.gather_domain(0, source_types[i].size_bytes() * component_count as usize))
            .collect();

        let voxel_count = domain.0 as usize * domain.1 as usize * domain.2 as usize;
        let mut out = vec![0u8; voxel_count * dest_voxel_stride];
        let dest_range = full_range(dest_type);
        let mut vars = vec![0.0; sources.len()];

        for voxel in 0..voxel_count {
            for comp in 0..component_count as usize {
                for (i, data) in source_data.iter().enumerate() {
                    let src_type = source_types[i];
                    let src_stride = src_type.size_bytes();
                    let src_voxel_stride = src_stride * component_count as usize;
                    let off = voxel * src_voxel_stride + comp * src_stride;
                    let raw = read_component_as_f64(&data[off..off + src_stride], src_type);
                    vars[i] = if src_type == dest_type { raw } else { rescale(raw, full_range(src_type), dest_range) };
                }
                let result = tree.eval(&vars);
                let out_off = voxel * dest_voxel_stride + comp * dest_stride;
                write_component_from_f64(result, dest_type, &mut out[out_off..out_off + dest_stride]);
            }
            if voxel_count > 0 && voxel % 4096 == 0 {
                sink.progress(((voxel * 100) / voxel_count) as u8, "evaluating expression");
            }
        }

        let final_meta = VolumeMeta::new(dest_type.bits(), component_count, dest_type.is_signed(), dest_type.is_float(), false, domain, first.header().aspect);
        let uvf = RawToUVFBuilder::build(&out, &final_meta, max_brick, overlap, quantize8, "expression result".into(), "derived".into(), sink)?;
        uvf.save(target)?;

        Ok(())
    }
}

/// Rescale `value`, assumed to lie within `src_range`, linearly onto
/// `dest_range`.
fn rescale(value: f64, src_range: (f64, f64), dest_range: (f64, f64)) -> f64 {
    let (src_min, src_max) = src_range;
    let (dst_min, dst_max) = dest_range;
    let span = (src_max - src_min).max(f64::EPSILON);
    dst_min + (value - src_min) / span * (dst_max - dst_min)
}

/// `spec.md` section 4.6/8: sources must agree on component count, brick
/// overlap, LOD count, and every LOD's domain and brick-count geometry.
/// Timestep count is not separately checked -- `SimpleUvf` has no timestep
/// concept, so it is trivially 1 for every source.
fn check_mergeable(containers: &[SimpleUvf]) -> Result<(), EvalError> {
    let Some(first) = containers.first() else {
        return Err(EvalError::Unmergeable { reason: "no sources supplied".into() });
    };

    for other in &containers[1..] {
        if other.component_count() != first.component_count() {
            return Err(EvalError::Unmergeable { reason: "sources disagree on component count".into() });
        }
        if other.brick_overlap() != first.brick_overlap() {
            return Err(EvalError::Unmergeable { reason: "sources disagree on brick overlap".into() });
        }
        if other.lod_count() != first.lod_count() {
            return Err(EvalError::Unmergeable { reason: "sources disagree on LOD count".into() });
        }
        for lod in 0..first.lod_count() {
            if other.domain(lod) != first.domain(lod) {
                return Err(EvalError::Unmergeable { reason: format!("sources disagree on domain at LOD {lod}") });
            }
            if other.brick_counts(lod) != first.brick_counts(lod) {
                return Err(EvalError::Unmergeable { reason: format!("sources disagree on brick count at LOD {lod}") });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgressSink;

    fn make_source(dir: &Path, name: &str, bits: u32, is_signed: bool, domain: (u32, u32, u32), data: &[u8]) -> PathBuf {
        let meta = VolumeMeta::new(bits, 1, is_signed, false, false, domain, (1.0, 1.0, 1.0));
        let mut container = SimpleUvf::new(&meta, 64, 0, "t".into(), "v".into());
        container.scatter_bricks(0, data, bits as usize / 8);
        let path = dir.join(name);
        container.save(&path).unwrap();
        path
    }

    #[test]
    fn evaluates_additive_expression_over_two_sources() {
        let dir = std::env::temp_dir().join(format!("uvf-eval-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();

        let a = make_source(&dir, "a.uvf", 8, false, (2, 2, 1), &[1, 2, 3, 4]);
        let b = make_source(&dir, "b.uvf", 8, false, (2, 2, 1), &[10, 20, 30, 40]);

        let target = dir.join("out.uvf");
        ExpressionEvaluator::evaluate(&[a, b], "v0 + v1", &target, 64, 0, false, &NullProgressSink).unwrap();

        let container = SimpleUvf::load(&target).unwrap();
        let data = container.gather_domain(0, 1);
        assert_eq!(data, vec![11, 22, 33, 44]);
    }

    #[test]
    fn rejects_variable_index_beyond_source_count() {
        let dir = std::env::temp_dir().join(format!("uvf-eval-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        let a = make_source(&dir, "a.uvf", 8, false, (1, 1, 1), &[5]);

        let target = dir.join("out.uvf");
        let err = ExpressionEvaluator::evaluate(&[a], "v0 + v1", &target, 64, 0, false, &NullProgressSink).unwrap_err();
        assert!(matches!(err, PipelineError::Eval(EvalError::VariableOutOfRange { index: 1, available: 1 })));
    }

    #[test]
    fn rejects_sources_with_mismatched_domains() {
        let dir = std::env::temp_dir().join(format!("uvf-eval-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        let a = make_source(&dir, "a.uvf", 8, false, (2, 2, 1), &[1, 2, 3, 4]);
        let b = make_source(&dir, "b.uvf", 8, false, (4, 4, 1), &[0; 16]);

        let target = dir.join("out.uvf");
        let err = ExpressionEvaluator::evaluate(&[a, b], "v0 + v1", &target, 64, 0, false, &NullProgressSink).unwrap_err();
        assert!(matches!(err, PipelineError::Eval(EvalError::Unmergeable { .. })));
    }
}
