//! Converter dispatch & identification (`spec.md` section 4.1).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{DispatchError, IoError};

use super::capability::{MeshConverter, VolumeConverter};

/// How many leading bytes `identify()` offers every sniffer.
const SNIFF_LEN: usize = 512;

/// Registry of volume converter plugins.
///
/// Converters are tried in registration order; a *final* converter (if any)
/// is only tried when no ordinary converter accepts a file: a plain
/// `Vec<Box<dyn Trait>>` walked at dispatch time, filled once at startup and
/// read thereafter.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: Vec<Box<dyn VolumeConverter>>,
    final_converter: Option<Box<dyn VolumeConverter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_converter(&mut self, converter: Box<dyn VolumeConverter>) {
        self.converters.push(converter);
    }

    pub fn register_final_converter(&mut self, converter: Box<dyn VolumeConverter>) {
        self.final_converter = Some(converter);
    }

    /// Read exactly the first 512 bytes of `path` once and offer them plus
    /// the path to every registered converter's sniffer, in registration
    /// order. Returns all that accept; an empty set with no final converter
    /// is the caller's cue to raise `DispatchError::NoConverter`.
    pub fn identify(&self, path: &Path) -> Result<Vec<&dyn VolumeConverter>, DispatchError> {
        let first_512 = read_prefix(path, SNIFF_LEN)?;

        let mut accepted: Vec<&dyn VolumeConverter> = self
            .converters
            .iter()
            .filter(|c| c.can_read(path, &first_512))
            .map(|c| c.as_ref())
            .collect();

        if accepted.is_empty() {
            if let Some(final_converter) = &self.final_converter {
                if final_converter.can_read(path, &first_512) {
                    accepted.push(final_converter.as_ref());
                }
            }
        }

        Ok(accepted)
    }

    /// Case-insensitive extension lookup. `must_export` filters to converters
    /// whose `can_export()` is true.
    pub fn converter_for_extension(&self, ext: &str, must_export: bool) -> Option<&dyn VolumeConverter> {
        let ext_lower = ext.to_ascii_lowercase();
        self.converters
            .iter()
            .chain(self.final_converter.iter())
            .find(|c| {
                (!must_export || c.can_export())
                    && c.supported_extensions()
                        .iter()
                        .any(|e| e.eq_ignore_ascii_case(&ext_lower))
            })
            .map(|c| c.as_ref())
    }

    pub fn final_converter(&self) -> Option<&dyn VolumeConverter> {
        self.final_converter.as_deref()
    }

    /// `(description, extensions)` pairs for building a dialog filter string.
    pub fn capability_summary(&self) -> Vec<(&str, &[&str])> {
        self.converters
            .iter()
            .map(|c| (c.description(), c.supported_extensions()))
            .collect()
    }
}

/// Registry of mesh converter plugins (`spec.md` section 6).
#[derive(Default)]
pub struct MeshConverterRegistry {
    converters: Vec<Box<dyn MeshConverter>>,
}

impl MeshConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, converter: Box<dyn MeshConverter>) {
        self.converters.push(converter);
    }

    pub fn converter_for_extension(&self, ext: &str) -> Option<&dyn MeshConverter> {
        let ext_lower = ext.to_ascii_lowercase();
        self.converters
            .iter()
            .find(|c| {
                c.supported_extensions()
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(&ext_lower))
            })
            .map(|c| c.as_ref())
    }
}

fn read_prefix(path: &Path, len: usize) -> Result<Vec<u8>, IoError> {
    let mut file = File::open(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut buf = vec![0u8; len];
    let mut total = 0;
    loop {
        let n = file.read(&mut buf[total..]).map_err(|source| IoError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        total += n;
        if total == buf.len() {
            break;
        }
    }
    buf.truncate(total);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::capability::{ConvertedRaw, RangeInfo};
    use crate::error::PipelineError;
    use crate::model::{IntermediateFile, VolumeMeta};
    use crate::progress::ProgressSink;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubConverter {
        name: &'static str,
        exts: Vec<&'static str>,
        accepts: bool,
        calls: Arc<AtomicUsize>,
    }

    impl VolumeConverter for StubConverter {
        fn description(&self) -> &str {
            self.name
        }
        fn supported_extensions(&self) -> &[&str] {
            &self.exts
        }
        fn can_export(&self) -> bool {
            true
        }
        fn can_read(&self, _path: &Path, _first_512: &[u8]) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.accepts
        }
        fn convert_to_raw(
            &self,
            _src: &Path,
            _temp_dir: &Path,
            _sink: &dyn ProgressSink,
        ) -> Result<ConvertedRaw, PipelineError> {
            unimplemented!()
        }
        fn convert_to_native(
            &self,
            _raw: &IntermediateFile,
            _target: &Path,
            _meta: &VolumeMeta,
            _quantize8: bool,
            _sink: &dyn ProgressSink,
        ) -> Result<bool, PipelineError> {
            unimplemented!()
        }
        fn analyze(&self, _src: &Path, _temp_dir: &Path) -> Option<Result<RangeInfo, PipelineError>> {
            None
        }
    }

    fn tmp_file(contents: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("uvf-registry-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sample.bin");
        let mut f = File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path
    }

    #[test]
    fn identify_returns_all_acceptors_in_registration_order() {
        let mut registry = ConverterRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register_converter(Box::new(StubConverter {
            name: "first",
            exts: vec!["raw"],
            accepts: true,
            calls: calls.clone(),
        }));
        registry.register_converter(Box::new(StubConverter {
            name: "second",
            exts: vec!["raw"],
            accepts: true,
            calls: calls.clone(),
        }));

        let path = tmp_file(b"hello world");
        let accepted = registry.identify(&path).unwrap();
        assert_eq!(accepted.len(), 2);
        assert_eq!(accepted[0].description(), "first");
        assert_eq!(accepted[1].description(), "second");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn identify_falls_back_to_final_converter() {
        let mut registry = ConverterRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register_converter(Box::new(StubConverter {
            name: "rejects",
            exts: vec!["raw"],
            accepts: false,
            calls: calls.clone(),
        }));
        registry.register_final_converter(Box::new(StubConverter {
            name: "fallback",
            exts: vec![],
            accepts: true,
            calls: calls.clone(),
        }));

        let path = tmp_file(b"data");
        let accepted = registry.identify(&path).unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].description(), "fallback");
    }

    #[test]
    fn identify_empty_set_when_nothing_accepts() {
        let mut registry = ConverterRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register_converter(Box::new(StubConverter {
            name: "rejects",
            exts: vec!["raw"],
            accepts: false,
            calls,
        }));
        let path = tmp_file(b"data");
        let accepted = registry.identify(&path).unwrap();
        assert!(accepted.is_empty());
    }

    #[test]
    fn converter_for_extension_is_case_insensitive() {
        let mut registry = ConverterRegistry::new();
        registry.register_converter(Box::new(StubConverter {
            name: "nrrd",
            exts: vec!["nrrd"],
            accepts: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }));

        assert!(registry.converter_for_extension("NRRD", false).is_some());
        assert!(registry.converter_for_extension("nrrd", false).is_some());
        assert!(registry.converter_for_extension("tif", false).is_none());
    }
}
