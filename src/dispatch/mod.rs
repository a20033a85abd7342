//! Converter dispatch & identification (`spec.md` section 4.1).

pub mod capability;
pub mod registry;

pub use capability::{dialog_filter_string, ConvertedRaw, MeshConverter, RangeInfo, VolumeConverter};
pub use registry::{ConverterRegistry, MeshConverterRegistry};
