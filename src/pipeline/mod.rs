//! The conversion pipeline (`spec.md` section 4.2): source -> intermediate
//! raw stream -> bricked UVF, and back.

pub mod assembler;
pub mod convert;
pub mod raw_to_uvf;
pub mod scan;

pub use convert::{convert_file, convert_stack, export_dataset, merge, rebrick};
pub use scan::scan_directory;
