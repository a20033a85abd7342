//! The five conversion pipeline operations (`spec.md` section 4.2 points
//! 2-6): `convert_stack`, `convert_file`, `merge`, `rebrick`,
//! `export_dataset`.

use std::path::{Path, PathBuf};

use crate::dispatch::{ConvertedRaw, ConverterRegistry};
use crate::error::{DispatchError, IoError, PipelineError};
use crate::formats::nrrd;
use crate::merge::Merger;
use crate::model::{pipeline_temp_path, IntermediateFile, StackDescriptor, VolumeMeta};
use crate::progress::{ProgressSink, Severity};
use crate::uvf::SimpleUvf;

use super::assembler::assemble_stack;
use super::raw_to_uvf::RawToUVFBuilder;

fn is_uvf_extension(path: &Path) -> bool {
    path.extension().map(|e| e.eq_ignore_ascii_case("uvf")).unwrap_or(false)
}

fn extension_of(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("")
}

/// `spec.md` section 4.2 point 2: stack -> raw -> bricked UVF.
pub fn convert_stack(
    stack: &StackDescriptor,
    target_uvf: &Path,
    temp_dir: &Path,
    max_brick: u32,
    overlap: u32,
    quantize8: bool,
    sink: &dyn ProgressSink,
) -> Result<(), PipelineError> {
    let raw_path = pipeline_temp_path(temp_dir, target_uvf);
    let intermediate = IntermediateFile::new(&raw_path);

    let result = (|| -> Result<(), PipelineError> {
        let meta = assemble_stack(stack, &raw_path, sink)?;
        let data = std::fs::read(&raw_path).map_err(|source| IoError::Read {
            path: raw_path.clone(),
            source,
        })?;
        let uvf = RawToUVFBuilder::build(
            &data,
            &meta,
            max_brick,
            overlap,
            quantize8,
            stack.description.clone(),
            "intensity".to_string(),
            sink,
        )?;
        uvf.save(target_uvf)?;
        Ok(())
    })();

    intermediate.cleanup();
    result
}

/// Export one LOD of a UVF container to a fresh raw intermediate file.
fn export_uvf_lod(source_uvf: &Path, lod: usize, temp_dir: &Path) -> Result<ConvertedRaw, PipelineError> {
    let container = SimpleUvf::load(source_uvf)?;
    container
        .voxel_type()
        .ok_or_else(|| PipelineError::UnsupportedType("UVF container has no scalar voxel type".into()))?;

    let meta = VolumeMeta::new(
        container.header().component_bits,
        container.header().component_count,
        container.header().is_signed,
        container.header().is_float,
        false,
        container.domain(lod),
        container.header().aspect,
    );
    let data = container.gather_domain(lod, meta.voxel_stride());

    let raw_path = temp_dir.join(format!("export-{}.raw", rand::random::<u64>()));
    std::fs::write(&raw_path, &data).map_err(|source| IoError::Write {
        path: raw_path.clone(),
        source,
    })?;

    Ok(ConvertedRaw {
        intermediate: IntermediateFile::new(raw_path),
        meta,
        value_semantic: container.header().value_semantic.clone(),
    })
}

/// `spec.md` section 4.2 point 3: `convert_file`.
pub fn convert_file(
    registry: &ConverterRegistry,
    sources: &[PathBuf],
    target: &Path,
    temp_dir: &Path,
    max_brick: u32,
    overlap: u32,
    quantize8: bool,
    sink: &dyn ProgressSink,
) -> Result<(), PipelineError> {
    if sources.is_empty() {
        return Err(PipelineError::EmptyStack);
    }

    if is_uvf_extension(target) {
        let candidates = registry.identify(&sources[0])?;
        let mut last_err = None;
        for converter in &candidates {
            match converter.convert_to_uvf(sources, target, temp_dir, max_brick, overlap, quantize8, sink) {
                Some(Ok(_)) => return Ok(()),
                Some(Err(e)) => last_err = Some(e),
                None => {}
            }
        }
        if let Some(final_converter) = registry.final_converter() {
            match final_converter.convert_to_uvf(sources, target, temp_dir, max_brick, overlap, quantize8, sink) {
                Some(Ok(_)) => return Ok(()),
                Some(Err(e)) => last_err = Some(e),
                None => {}
            }
        }

        // No converter implements the multi-file `convert_to_uvf` shortcut.
        // For a single source, fall back to the same raw -> UVF path used
        // for a native target: read it via `convert_to_raw` and build the
        // container directly.
        if sources.len() == 1 {
            if let Some(converter) = candidates.first() {
                if let Ok(converted) = converter.convert_to_raw(&sources[0], temp_dir, sink) {
                    let result = (|| -> Result<(), PipelineError> {
                        let data = std::fs::read(&converted.intermediate.path).map_err(|source| IoError::Read {
                            path: converted.intermediate.path.clone(),
                            source,
                        })?;
                        let uvf = RawToUVFBuilder::build(
                            &data,
                            &converted.meta,
                            max_brick,
                            overlap,
                            quantize8,
                            sources[0].file_stem().and_then(|s| s.to_str()).unwrap_or("volume").to_string(),
                            converted.value_semantic.clone(),
                            sink,
                        )?;
                        uvf.save(target)?;
                        Ok(())
                    })();
                    converted.intermediate.cleanup();
                    return result;
                }
            }
        }

        return Err(last_err.unwrap_or(PipelineError::Dispatch(DispatchError::NoConverter { path: sources[0].clone() })));
    }

    if sources.len() > 1 {
        return Err(PipelineError::Dispatch(DispatchError::MultiInputToNative));
    }
    let src = &sources[0];

    let converted = if is_uvf_extension(src) {
        export_uvf_lod(src, 0, temp_dir)?
    } else {
        let candidates = registry.identify(src)?;
        let mut picked = None;
        for converter in &candidates {
            if let Ok(c) = converter.convert_to_raw(src, temp_dir, sink) {
                picked = Some(c);
                break;
            }
        }
        picked.ok_or_else(|| PipelineError::Dispatch(DispatchError::NoConverter { path: src.clone() }))?
    };

    let result = (|| -> Result<(), PipelineError> {
        let target_converter = registry
            .converter_for_extension(extension_of(target), true)
            .ok_or_else(|| DispatchError::NoConverter { path: target.to_path_buf() })?;
        target_converter.convert_to_native(&converted.intermediate, target, &converted.meta, quantize8, sink)?;
        Ok(())
    })();

    converted.intermediate.cleanup();
    result
}

/// `spec.md` section 4.2 point 4: `merge`.
pub fn merge(
    registry: &ConverterRegistry,
    sources: &[PathBuf],
    scales: &[f64],
    biases: &[f64],
    target: &Path,
    temp_dir: &Path,
    use_max: bool,
    max_brick: u32,
    overlap: u32,
    quantize8: bool,
    sink: &dyn ProgressSink,
) -> Result<(), PipelineError> {
    let mut converted: Vec<ConvertedRaw> = Vec::with_capacity(sources.len());
    let convert_result = (|| -> Result<(), PipelineError> {
        for (i, src) in sources.iter().enumerate() {
            let mut c = if is_uvf_extension(src) {
                export_uvf_lod(src, 0, temp_dir)?
            } else {
                let candidates = registry.identify(src)?;
                let converter = candidates
                    .first()
                    .ok_or_else(|| PipelineError::Dispatch(DispatchError::NoConverter { path: src.clone() }))?;
                converter.convert_to_raw(src, temp_dir, sink)?
            };
            c.intermediate.scale = scales.get(i).copied().unwrap_or(1.0);
            c.intermediate.bias = biases.get(i).copied().unwrap_or(0.0);
            converted.push(c);
        }
        Ok(())
    })();

    if let Err(e) = convert_result {
        for c in &converted {
            c.intermediate.cleanup();
        }
        return Err(e);
    }

    let result = (|| -> Result<(), PipelineError> {
        let first = &converted[0];
        for other in &converted[1..] {
            let incompatible = other.meta.component_bits != first.meta.component_bits
                || other.meta.component_count != first.meta.component_count
                || other.meta.is_signed != first.meta.is_signed
                || other.meta.is_float != first.meta.is_float
                || other.meta.domain != first.meta.domain
                || other.meta.swap_endian != first.meta.swap_endian;
            if incompatible {
                return Err(PipelineError::Merge(crate::error::MergeError::IncompatibleInputs {
                    reason: "inputs differ in bit-width, component count, signedness, float-ness, domain size, or endianness".into(),
                }));
            }
            if other.meta.aspect != first.meta.aspect {
                sink.notify(
                    Severity::Warning,
                    &format!("aspect ratio mismatch: expected {:?}, got {:?}", first.meta.aspect, other.meta.aspect),
                );
            }
        }
        let merged_meta = first.meta;

        let merged_path = temp_dir.join("merged.raw");
        let intermediates: Vec<IntermediateFile> = converted.iter().map(|c| c.intermediate.clone()).collect();
        let merge_result = Merger::merge(&intermediates, &merged_meta, &merged_path, use_max);
        if merge_result.is_err() {
            let _ = std::fs::remove_file(&merged_path);
        }
        merge_result?;

        let finalize = (|| -> Result<(), PipelineError> {
            if is_uvf_extension(target) {
                let data = std::fs::read(&merged_path).map_err(|source| IoError::Read {
                    path: merged_path.clone(),
                    source,
                })?;
                let uvf = RawToUVFBuilder::build(
                    &data,
                    &merged_meta,
                    max_brick,
                    overlap,
                    quantize8,
                    "merged".to_string(),
                    first.value_semantic.clone(),
                    sink,
                )?;
                uvf.save(target)?;
            } else {
                let target_converter = registry
                    .converter_for_extension(extension_of(target), true)
                    .ok_or_else(|| DispatchError::NoConverter { path: target.to_path_buf() })?;
                let merged_intermediate = IntermediateFile::new(&merged_path);
                target_converter.convert_to_native(&merged_intermediate, target, &merged_meta, quantize8, sink)?;
            }
            Ok(())
        })();

        let _ = std::fs::remove_file(&merged_path);
        finalize
    })();

    for c in &converted {
        c.intermediate.cleanup();
    }
    result
}

/// `spec.md` section 4.2 point 5: `rebrick`, via a detached NRRD
/// intermediate.
pub fn rebrick(
    source_uvf: &Path,
    target_uvf: &Path,
    temp_dir: &Path,
    max_brick: u32,
    overlap: u32,
    quantize8: bool,
    sink: &dyn ProgressSink,
) -> Result<(), PipelineError> {
    let container = SimpleUvf::load(source_uvf)?;
    let meta = VolumeMeta::new(
        container.header().component_bits,
        container.header().component_count,
        container.header().is_signed,
        container.header().is_float,
        false,
        container.domain(0),
        container.header().aspect,
    );
    let data = container.gather_domain(0, meta.voxel_stride());

    let nrrd_path = temp_dir.join(format!("rebrick-{}.nrrd", rand::random::<u64>()));
    nrrd::write_nrrd(&nrrd_path, &meta, &data)?;

    let result = (|| -> Result<(), PipelineError> {
        let (read_meta, read_data) = nrrd::read_nrrd(&nrrd_path)?;
        let uvf = RawToUVFBuilder::build(
            &read_data,
            &read_meta,
            max_brick,
            overlap,
            quantize8,
            container.header().title.clone(),
            container.header().value_semantic.clone(),
            sink,
        )?;
        uvf.save(target_uvf)?;
        Ok(())
    })();

    let _ = std::fs::remove_file(&nrrd_path);
    result
}

/// `spec.md` section 4.2 point 6: `export_dataset`.
pub fn export_dataset(
    registry: &ConverterRegistry,
    source_uvf: &Path,
    lod: usize,
    target: &Path,
    temp_dir: &Path,
    quantize8: bool,
    sink: &dyn ProgressSink,
) -> Result<(), PipelineError> {
    let converted = export_uvf_lod(source_uvf, lod, temp_dir)?;

    let result = (|| -> Result<(), PipelineError> {
        let target_converter = registry
            .converter_for_extension(extension_of(target), true)
            .ok_or_else(|| DispatchError::NoConverter { path: target.to_path_buf() })?;
        target_converter.convert_to_native(&converted.intermediate, target, &converted.meta, quantize8, sink)?;
        Ok(())
    })();

    converted.intermediate.cleanup();
    result
}
