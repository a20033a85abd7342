//! The canonical bricked multi-resolution container (`spec.md` glossary:
//! UVF). Internals are an external collaborator in principle; this module
//! gives the pipeline a concrete contract to build against (section 4.2).

pub mod container;

pub use container::{LodGeometry, SimpleUvf, UvfHeader};
