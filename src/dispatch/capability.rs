//! The converter plugin contract (`spec.md` section 6).
//!
//! `VolumeConverter` is the capability record per-format plugins implement;
//! `MeshConverter` is its polygon-format counterpart (section 4.5/6). Dispatch
//! by `(sniff-match OR extension-match)` replaces an inheritance hierarchy
//! with a plain trait object stored in a `Vec` (`spec.md` section 9).

use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::mesh::Mesh;
use crate::model::{IntermediateFile, VolumeMeta};
use crate::progress::ProgressSink;

/// Result of `analyze()`: the full-dataset value range, used by the UI
/// facade (out of scope here) but part of the converter contract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeInfo {
    pub min: f64,
    pub max: f64,
}

/// Result of `convert_to_raw`: the intermediate file plus the metadata and
/// value-semantic tag needed to interpret it.
#[derive(Debug, Clone)]
pub struct ConvertedRaw {
    pub intermediate: IntermediateFile,
    pub meta: VolumeMeta,
    pub value_semantic: String,
}

/// Per-format reader/writer capability (`spec.md` section 6).
pub trait VolumeConverter: Send + Sync {
    fn description(&self) -> &str;

    fn supported_extensions(&self) -> &[&str];

    fn can_export(&self) -> bool;

    /// `path` is offered alongside the first (up to) 512 bytes of the file so
    /// sniffers that only care about the extension don't need to touch I/O.
    fn can_read(&self, path: &Path, first_512: &[u8]) -> bool;

    fn convert_to_raw(
        &self,
        src: &Path,
        temp_dir: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<ConvertedRaw, PipelineError>;

    fn convert_to_native(
        &self,
        raw: &IntermediateFile,
        target: &Path,
        meta: &VolumeMeta,
        quantize8: bool,
        sink: &dyn ProgressSink,
    ) -> Result<bool, PipelineError>;

    /// Optional UVF-targeting shortcut (`spec.md` section 4.2 point 3).
    /// `sources` has more than one entry only for converters that accept
    /// multi-file UVF assembly (time series).
    fn convert_to_uvf(
        &self,
        _sources: &[PathBuf],
        _target: &Path,
        _temp_dir: &Path,
        _max_brick: u32,
        _overlap: u32,
        _quantize8: bool,
        _sink: &dyn ProgressSink,
    ) -> Option<Result<bool, PipelineError>> {
        None
    }

    /// Optional full-dataset range analysis.
    fn analyze(&self, _src: &Path, _temp_dir: &Path) -> Option<Result<RangeInfo, PipelineError>> {
        None
    }
}

/// Per-mesh-format reader/writer capability (`spec.md` section 6).
pub trait MeshConverter: Send + Sync {
    fn supported_extensions(&self) -> &[&str];

    fn can_read(&self, path: &Path) -> bool;

    fn convert_to_mesh(&self, path: &Path) -> Result<Mesh, PipelineError>;

    fn convert_to_native(&self, mesh: &Mesh, target: &Path) -> Result<bool, PipelineError>;
}

/// Build a dialog-style filter string for the UI collaborator (`spec.md`
/// section 6): `"All known Files (*.ext1 *.ext2 );;Format Name (*.ext);;...;;All Files (*)"`.
/// Part of the facade, not the engineering core, kept here because it reads
/// directly off the registered capabilities.
pub fn dialog_filter_string(entries: &[(&str, &[&str])]) -> String {
    let mut all_patterns = String::new();
    for (_, exts) in entries {
        for ext in *exts {
            all_patterns.push_str("*.");
            all_patterns.push_str(ext);
            all_patterns.push(' ');
        }
    }

    let mut parts = vec![format!("All known Files ({})", all_patterns.trim_end())];
    for (name, exts) in entries {
        let pattern = exts
            .iter()
            .map(|e| format!("*.{e}"))
            .collect::<Vec<_>>()
            .join(" ");
        parts.push(format!("{name} ({pattern})"));
    }
    parts.push("All Files (*)".to_string());
    parts.join(";;")
}
