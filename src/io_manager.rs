//! `IOManager` (`spec.md` section 2): the facade callers go through instead
//! of reaching into `pipeline`/`merge`/`iso`/`eval` directly. Owns the
//! converter registries and the brick-layout defaults every operation falls
//! back on.

use std::path::{Path, PathBuf};

use crate::dispatch::{ConverterRegistry, MeshConverter, MeshConverterRegistry, VolumeConverter};
use crate::error::IoManagerError;
use crate::eval::ExpressionEvaluator;
use crate::formats::NrrdConverter;
use crate::iso::IsoExtractor;
use crate::model::StackDescriptor;
use crate::pipeline;
use crate::progress::ProgressSink;

/// Default maximum brick edge length, matching common UVF defaults.
pub const DEFAULT_MAX_BRICK: u32 = 256;

pub struct IOManager {
    converters: ConverterRegistry,
    mesh_converters: MeshConverterRegistry,
    temp_dir: PathBuf,
    max_brick: u32,
    overlap: u32,
    quantize8: bool,
}

impl IOManager {
    /// A manager with the default converter set (currently just NRRD,
    /// registered as the final/fallback converter since it is the one
    /// concrete single-file round-trip format this crate ships) and
    /// default brick settings.
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        let mut converters = ConverterRegistry::new();
        converters.register_final_converter(Box::new(NrrdConverter));

        Self {
            converters,
            mesh_converters: MeshConverterRegistry::new(),
            temp_dir: temp_dir.into(),
            max_brick: DEFAULT_MAX_BRICK,
            overlap: 0,
            quantize8: false,
        }
    }

    pub fn with_brick_settings(mut self, max_brick: u32, overlap: u32, quantize8: bool) -> Self {
        self.max_brick = max_brick;
        self.overlap = overlap;
        self.quantize8 = quantize8;
        self
    }

    pub fn register_converter(&mut self, converter: Box<dyn VolumeConverter>) {
        self.converters.register_converter(converter);
    }

    pub fn register_mesh_converter(&mut self, converter: Box<dyn MeshConverter>) {
        self.mesh_converters.register(converter);
    }

    pub fn scan_directory(&self, dir: &Path, sink: &dyn ProgressSink) -> Result<Vec<StackDescriptor>, IoManagerError> {
        Ok(pipeline::scan_directory(dir, sink)?)
    }

    pub fn convert_stack(&self, stack: &StackDescriptor, target: &Path, sink: &dyn ProgressSink) -> Result<(), IoManagerError> {
        Ok(pipeline::convert_stack(stack, target, &self.temp_dir, self.max_brick, self.overlap, self.quantize8, sink)?)
    }

    pub fn convert_file(&self, sources: &[PathBuf], target: &Path, sink: &dyn ProgressSink) -> Result<(), IoManagerError> {
        Ok(pipeline::convert_file(
            &self.converters,
            sources,
            target,
            &self.temp_dir,
            self.max_brick,
            self.overlap,
            self.quantize8,
            sink,
        )?)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn merge(
        &self,
        sources: &[PathBuf],
        scales: &[f64],
        biases: &[f64],
        target: &Path,
        use_max: bool,
        sink: &dyn ProgressSink,
    ) -> Result<(), IoManagerError> {
        Ok(pipeline::merge(
            &self.converters,
            sources,
            scales,
            biases,
            target,
            &self.temp_dir,
            use_max,
            self.max_brick,
            self.overlap,
            self.quantize8,
            sink,
        )?)
    }

    pub fn rebrick(&self, source_uvf: &Path, target_uvf: &Path, sink: &dyn ProgressSink) -> Result<(), IoManagerError> {
        Ok(pipeline::rebrick(source_uvf, target_uvf, &self.temp_dir, self.max_brick, self.overlap, self.quantize8, sink)?)
    }

    pub fn export_dataset(&self, source_uvf: &Path, lod: usize, target: &Path, sink: &dyn ProgressSink) -> Result<(), IoManagerError> {
        Ok(pipeline::export_dataset(&self.converters, source_uvf, lod, target, &self.temp_dir, self.quantize8, sink)?)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn extract_isosurface(
        &self,
        source_uvf: &Path,
        lod: usize,
        isovalue: f64,
        color: [u8; 4],
        target: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<(), IoManagerError> {
        Ok(IsoExtractor::extract(source_uvf, lod, isovalue, color, &self.mesh_converters, target, sink)?)
    }

    pub fn evaluate_expression(
        &self,
        sources: &[PathBuf],
        expression: &str,
        target: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<(), IoManagerError> {
        Ok(ExpressionEvaluator::evaluate(sources, expression, target, self.max_brick, self.overlap, self.quantize8, sink)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VolumeMeta;
    use crate::progress::NullProgressSink;
    use crate::uvf::SimpleUvf;

    #[test]
    fn round_trips_a_uvf_through_rebrick() {
        let dir = std::env::temp_dir().join(format!("uvf-iomanager-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();

        let meta = VolumeMeta::new(8, 1, false, false, false, (4, 4, 1), (1.0, 1.0, 1.0));
        let mut container = SimpleUvf::new(&meta, 64, 0, "t".into(), "v".into());
        let data: Vec<u8> = (0..16u8).collect();
        container.scatter_bricks(0, &data, 1);
        let source = dir.join("source.uvf");
        container.save(&source).unwrap();

        let manager = IOManager::new(&dir);
        let target = dir.join("rebricked.uvf");
        manager.rebrick(&source, &target, &NullProgressSink).unwrap();

        let rebricked = SimpleUvf::load(&target).unwrap();
        assert_eq!(rebricked.gather_domain(0, 1), data);
    }

    #[test]
    fn exports_a_uvf_lod_to_nrrd_via_the_default_converter() {
        let dir = std::env::temp_dir().join(format!("uvf-iomanager-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();

        let meta = VolumeMeta::new(8, 1, false, false, false, (2, 2, 1), (1.0, 1.0, 1.0));
        let mut container = SimpleUvf::new(&meta, 64, 0, "t".into(), "v".into());
        let data: Vec<u8> = vec![1, 2, 3, 4];
        container.scatter_bricks(0, &data, 1);
        let source = dir.join("source.uvf");
        container.save(&source).unwrap();

        let manager = IOManager::new(&dir);
        let target = dir.join("exported.nrrd");
        manager.export_dataset(&source, 0, &target, &NullProgressSink).unwrap();

        assert!(target.exists());
    }
}
