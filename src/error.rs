//! Error taxonomy for the conversion pipeline.
//!
//! Each subsystem gets its own `thiserror` enum; [`PipelineError`] composes
//! them into the single error type the [`crate::io_manager::IOManager`]
//! facade returns. This mirrors the layered `IoError` -> `FormatError`
//! composition pattern used throughout the format-detection stack this
//! crate is descended from.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from reading source files or writing intermediate/target files.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected end of file reading '{path}' (wanted {wanted} bytes, got {got})")]
    UnexpectedEof {
        path: PathBuf,
        wanted: u64,
        got: u64,
    },
}

/// Errors from converter dispatch and identification.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Io(#[from] IoError),

    /// `identify()` found no taker and no final converter was registered.
    #[error("no converter accepts '{path}'")]
    NoConverter { path: PathBuf },

    /// Multiple source paths were given to a non-UVF target.
    #[error("multiple input paths are only supported when the target is UVF")]
    MultiInputToNative,
}

/// Errors surfaced while decoding an individual stack element (a DICOM
/// instance or a stacked image) into raw voxel bytes.
#[derive(Debug, Error)]
pub enum InvalidPayload {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error("JPEG payload in '{path}' failed to decode: {reason}")]
    Jpeg { path: PathBuf, reason: String },

    #[error("'{path}' is missing required tag {tag}")]
    MissingTag { path: PathBuf, tag: &'static str },

    #[error("'{path}' has an unsupported component count {count}")]
    UnsupportedComponentCount { path: PathBuf, count: u16 },
}

/// Errors from the conversion pipeline (stack -> raw -> UVF, and back).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] InvalidPayload),

    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Iso(#[from] IsoError),

    #[error("a scan or build step produced an empty stack descriptor")]
    EmptyStack,
}

/// Errors from the n-way raw-stream merger.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Io(#[from] IoError),

    /// `spec.md` section 7: `IncompatibleInputs`.
    #[error("incompatible merge inputs: {reason}")]
    IncompatibleInputs { reason: String },

    #[error("unsupported voxel type for merge: {0:?}")]
    UnsupportedType(crate::voxel::VoxelType),
}

/// Errors from isosurface extraction.
#[derive(Debug, Error)]
pub enum IsoError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error("isosurface extraction requires a scalar (single-component) source, got {components} components")]
    NonScalarSource { components: u16 },

    #[error("unsupported voxel type for marching cubes: {0:?}")]
    UnsupportedType(crate::voxel::VoxelType),

    #[error("no mesh converter registered for extension '{extension}'")]
    NoMeshConverter { extension: String },
}

/// Errors from the voxel expression evaluator.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: u32,
        column: u32,
        message: String,
    },

    #[error("failed to open '{path}': {reason}")]
    OpenFailure { path: PathBuf, reason: String },

    /// `spec.md` section 7/8: mergeability check for the evaluator's inputs.
    #[error("unmergeable inputs: {reason}")]
    Unmergeable { reason: String },

    #[error("unsupported destination type: {0:?}")]
    UnsupportedType(crate::voxel::VoxelType),

    #[error("expression references v{index} but only {available} inputs were supplied")]
    VariableOutOfRange { index: usize, available: usize },
}

/// Top-level error returned by [`crate::io_manager::IOManager`].
///
/// This is the type the CLI (`main.rs`) matches on to decide an exit code and
/// a log line; library callers match on the nested variant they care about.
#[derive(Debug, Error)]
pub enum IoManagerError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Iso(#[from] IsoError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Io(#[from] IoError),
}

/// A non-fatal finding surfaced alongside a successful result.
///
/// `spec.md` section 7: `AspectMismatch` is a warning, not a terminal error —
/// callers get it back instead of having it silently swallowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    AspectMismatch { expected: (f32, f32, f32), actual: (f32, f32, f32) },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::AspectMismatch { expected, actual } => write!(
                f,
                "aspect ratio mismatch: expected {:?}, got {:?}",
                expected, actual
            ),
        }
    }
}
