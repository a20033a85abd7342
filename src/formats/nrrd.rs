//! NRRD reader/writer, used as the neutral intermediate raster format for
//! `rebrick` (`spec.md` section 4.2 point 4: rebuild a UVF from an existing
//! raw/neutral source without re-running stack assembly).
//!
//! Only the "detached header, raw encoding" flavor of NRRD is supported: a
//! short text header followed by one blank line and the raw voxel bytes in
//! the same file. That covers what this pipeline produces and consumes;
//! gzip/bzip2 encodings and NRRD's full axis-metadata grammar are out of
//! scope.

use std::io::Write;
use std::path::Path;

use crate::dispatch::{ConvertedRaw, RangeInfo, VolumeConverter};
use crate::error::{InvalidPayload, IoError, PipelineError};
use crate::model::{IntermediateFile, VolumeMeta};
use crate::pipeline::raw_to_uvf::quantize_to_u8;
use crate::progress::ProgressSink;
use crate::voxel::{read_component_as_f64, VoxelType};

const MAGIC_LINE: &str = "NRRD0004";

fn type_name(voxel_type: VoxelType) -> &'static str {
    match voxel_type {
        VoxelType::I8 => "int8",
        VoxelType::U8 => "uint8",
        VoxelType::I16 => "int16",
        VoxelType::U16 => "uint16",
        VoxelType::I32 => "int32",
        VoxelType::U32 => "uint32",
        VoxelType::I64 => "int64",
        VoxelType::U64 => "uint64",
        VoxelType::F32 => "float",
        VoxelType::F64 => "double",
    }
}

fn type_from_name(name: &str) -> Option<VoxelType> {
    Some(match name {
        "int8" | "signed char" => VoxelType::I8,
        "uint8" | "unsigned char" => VoxelType::U8,
        "int16" | "short" => VoxelType::I16,
        "uint16" | "unsigned short" => VoxelType::U16,
        "int32" | "int" => VoxelType::I32,
        "uint32" | "unsigned int" => VoxelType::U32,
        "int64" | "long" => VoxelType::I64,
        "uint64" | "unsigned long" => VoxelType::U64,
        "float" => VoxelType::F32,
        "double" => VoxelType::F64,
        _ => return None,
    })
}

/// Write `data` (raw, native-endian, voxel-major) as a detached-header-less
/// NRRD file at `path`.
pub fn write_nrrd(path: &Path, meta: &VolumeMeta, data: &[u8]) -> Result<(), IoError> {
    let voxel_type = meta.voxel_type().ok_or_else(|| IoError::Write {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, "no scalar voxel type for this VolumeMeta"),
    })?;

    let mut header = String::new();
    header.push_str(MAGIC_LINE);
    header.push('\n');
    header.push_str(&format!("type: {}\n", type_name(voxel_type)));
    if meta.component_count > 1 {
        header.push_str("dimension: 4\n");
        header.push_str(&format!(
            "sizes: {} {} {} {}\n",
            meta.component_count, meta.domain.0, meta.domain.1, meta.domain.2
        ));
    } else {
        header.push_str("dimension: 3\n");
        header.push_str(&format!("sizes: {} {} {}\n", meta.domain.0, meta.domain.1, meta.domain.2));
    }
    header.push_str("encoding: raw\n");
    header.push_str(if cfg!(target_endian = "little") { "endian: little\n" } else { "endian: big\n" });
    header.push_str(&format!("uvf-signed: {}\n", meta.is_signed));
    header.push_str(&format!("space directions: ({},0,0) (0,{},0) (0,0,{})\n", meta.aspect.0, meta.aspect.1, meta.aspect.2));
    header.push('\n');

    let mut file = std::fs::File::create(path).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    file.write_all(header.as_bytes())
        .and_then(|_| file.write_all(data))
        .map_err(|source| IoError::Write {
            path: path.to_path_buf(),
            source,
        })
}

/// Read a detached-header-less NRRD file back into `(VolumeMeta, raw bytes)`.
pub fn read_nrrd(path: &Path) -> Result<(VolumeMeta, Vec<u8>), InvalidPayload> {
    let bytes = std::fs::read(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let split_at = bytes
        .windows(2)
        .position(|w| w == b"\n\n")
        .ok_or_else(|| InvalidPayload::MissingTag { path: path.to_path_buf(), tag: "NRRD header terminator" })?;

    let header_text = std::str::from_utf8(&bytes[..split_at])
        .map_err(|_| InvalidPayload::MissingTag { path: path.to_path_buf(), tag: "NRRD header (not UTF-8)" })?;
    let data = bytes[split_at + 2..].to_vec();

    let mut type_name_value = None;
    let mut sizes: Vec<u32> = Vec::new();
    let mut is_signed = None;
    let mut aspect = (1.0f32, 1.0f32, 1.0f32);

    for line in header_text.lines().skip(1) {
        let Some((key, value)) = line.split_once(':') else { continue };
        let value = value.trim();
        match key.trim() {
            "type" => type_name_value = Some(value.to_string()),
            "sizes" => sizes = value.split_whitespace().filter_map(|s| s.parse().ok()).collect(),
            "uvf-signed" => is_signed = Some(value == "true"),
            "space directions" => {
                let nums: Vec<f32> = value
                    .split(|c: char| !c.is_ascii_digit() && c != '.' && c != '-')
                    .filter(|s| !s.is_empty())
                    .filter_map(|s| s.parse().ok())
                    .collect();
                if nums.len() >= 3 {
                    aspect = (nums[0], nums[1], nums[2]);
                }
            }
            _ => {}
        }
    }

    let type_name_value = type_name_value
        .ok_or_else(|| InvalidPayload::MissingTag { path: path.to_path_buf(), tag: "type" })?;
    let voxel_type = type_from_name(&type_name_value)
        .ok_or_else(|| InvalidPayload::MissingTag { path: path.to_path_buf(), tag: "type (unrecognized)" })?;

    let (component_count, domain) = if sizes.len() == 4 {
        (sizes[0] as u16, (sizes[1], sizes[2], sizes[3]))
    } else if sizes.len() == 3 {
        (1u16, (sizes[0], sizes[1], sizes[2]))
    } else {
        return Err(InvalidPayload::MissingTag { path: path.to_path_buf(), tag: "sizes" });
    };

    let meta = VolumeMeta::new(
        (voxel_type.size_bytes() * 8) as u32,
        component_count,
        is_signed.unwrap_or(voxel_type.is_signed()),
        voxel_type.is_float(),
        false,
        domain,
        aspect,
    );

    Ok((meta, data))
}

/// Registers NRRD as a first-class `VolumeConverter` (`spec.md` section 6):
/// the only concrete single-file raster format this pipeline round-trips
/// directly, used as the registry's default/final converter.
pub struct NrrdConverter;

impl VolumeConverter for NrrdConverter {
    fn description(&self) -> &str {
        "NRRD (detached header, raw encoding)"
    }

    fn supported_extensions(&self) -> &[&str] {
        &["nrrd"]
    }

    fn can_export(&self) -> bool {
        true
    }

    fn can_read(&self, path: &Path, first_512: &[u8]) -> bool {
        first_512.starts_with(MAGIC_LINE.as_bytes())
            || path.extension().map(|e| e.eq_ignore_ascii_case("nrrd")).unwrap_or(false)
    }

    fn convert_to_raw(
        &self,
        src: &Path,
        temp_dir: &Path,
        _sink: &dyn ProgressSink,
    ) -> Result<ConvertedRaw, PipelineError> {
        let (meta, data) = read_nrrd(src)?;
        let raw_path = temp_dir.join(format!("nrrd-import-{}.raw", rand::random::<u64>()));
        std::fs::write(&raw_path, &data).map_err(|source| IoError::Write {
            path: raw_path.clone(),
            source,
        })?;
        Ok(ConvertedRaw {
            intermediate: IntermediateFile::new(raw_path),
            meta,
            value_semantic: "intensity".to_string(),
        })
    }

    fn convert_to_native(
        &self,
        raw: &IntermediateFile,
        target: &Path,
        meta: &VolumeMeta,
        quantize8: bool,
        _sink: &dyn ProgressSink,
    ) -> Result<bool, PipelineError> {
        let data = std::fs::read(&raw.path).map_err(|source| IoError::Read {
            path: raw.path.clone(),
            source,
        })?;
        let data = &data[raw.header_skip as usize..];

        let (final_meta, out_data) = if quantize8 {
            let source_type = meta
                .voxel_type()
                .ok_or_else(|| PipelineError::UnsupportedType("no scalar voxel type for this VolumeMeta".into()))?;
            if source_type == VoxelType::U8 {
                (*meta, data.to_vec())
            } else {
                let quantized_meta =
                    VolumeMeta::new(8, meta.component_count, false, false, false, meta.domain, meta.aspect);
                (quantized_meta, quantize_to_u8(data, source_type))
            }
        } else {
            (*meta, data.to_vec())
        };

        write_nrrd(target, &final_meta, &out_data)?;
        Ok(true)
    }

    fn analyze(&self, src: &Path, _temp_dir: &Path) -> Option<Result<RangeInfo, PipelineError>> {
        Some((|| {
            let (meta, data) = read_nrrd(src)?;
            let voxel_type = meta
                .voxel_type()
                .ok_or_else(|| PipelineError::UnsupportedType("no scalar voxel type for this VolumeMeta".into()))?;
            let stride = voxel_type.size_bytes();
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for chunk in data.chunks_exact(stride) {
                let v = read_component_as_f64(chunk, voxel_type);
                min = min.min(v);
                max = max.max(v);
            }
            Ok(RangeInfo { min, max })
        })())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalar_u8_volume() {
        let dir = std::env::temp_dir().join(format!("uvf-nrrd-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("volume.nrrd");

        let meta = VolumeMeta::new(8, 1, false, false, false, (2, 2, 2), (1.0, 1.0, 1.0));
        let data: Vec<u8> = (0..8u8).collect();
        write_nrrd(&path, &meta, &data).unwrap();

        let (read_meta, read_data) = read_nrrd(&path).unwrap();
        assert_eq!(read_meta.domain, (2, 2, 2));
        assert_eq!(read_meta.component_count, 1);
        assert_eq!(read_meta.voxel_type(), Some(VoxelType::U8));
        assert_eq!(read_data, data);
    }

    #[test]
    fn round_trips_multi_component_float_volume() {
        let dir = std::env::temp_dir().join(format!("uvf-nrrd-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("volume.nrrd");

        let meta = VolumeMeta::new(32, 3, true, true, false, (2, 2, 1), (1.0, 2.0, 1.0));
        let data: Vec<u8> = (0..(2 * 2 * 1 * 3 * 4)).map(|i| i as u8).collect();
        write_nrrd(&path, &meta, &data).unwrap();

        let (read_meta, read_data) = read_nrrd(&path).unwrap();
        assert_eq!(read_meta.component_count, 3);
        assert_eq!(read_meta.domain, (2, 2, 1));
        assert_eq!(read_meta.voxel_type(), Some(VoxelType::F32));
        assert_eq!(read_meta.aspect, (1.0, 2.0, 1.0));
        assert_eq!(read_data, data);
    }

    #[test]
    fn rejects_file_without_header_terminator() {
        let dir = std::env::temp_dir().join(format!("uvf-nrrd-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.nrrd");
        std::fs::write(&path, b"NRRD0004\ntype: uint8\n").unwrap();
        assert!(read_nrrd(&path).is_err());
    }
}
