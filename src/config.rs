//! Command-line configuration for the `uvf-pipeline` binary.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with the `UVF_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Environment Variables
//!
//! - `UVF_TEMP_DIR` - Scratch directory for intermediate files (default: system temp dir)
//! - `UVF_MAX_BRICK` - Maximum brick edge length (default: 256)
//! - `UVF_OVERLAP` - Brick overlap in voxels (default: 0)
//! - `UVF_QUANTIZE8` - Quantize output to 8-bit unsigned (default: false)

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::io_manager::DEFAULT_MAX_BRICK;

// =============================================================================
// CLI Arguments
// =============================================================================

/// uvf-pipeline - scan, convert, merge, and analyze bricked volumetric data.
#[derive(Parser, Debug, Clone)]
#[command(name = "uvf-pipeline")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Scratch directory for intermediate files produced during conversion.
    #[arg(long, global = true, env = "UVF_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Maximum brick edge length.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_BRICK, env = "UVF_MAX_BRICK")]
    pub max_brick: u32,

    /// Brick overlap, in voxels, shared between neighboring bricks.
    #[arg(long, global = true, default_value_t = 0, env = "UVF_OVERLAP")]
    pub overlap: u32,

    /// Quantize output voxels to 8-bit unsigned.
    #[arg(long, global = true, default_value_t = false, env = "UVF_QUANTIZE8")]
    pub quantize8: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan a directory for DICOM series and stacked image series.
    Scan {
        /// Directory to scan.
        dir: PathBuf,
    },

    /// Convert one or more source files into a target (UVF or native format).
    Convert {
        /// Source file(s). Multiple sources are only valid for a UVF target.
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Target file path; extension selects the output format.
        target: PathBuf,
    },

    /// Merge several co-registered sources into one volume.
    Merge {
        /// Source files to merge.
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Target file path.
        target: PathBuf,

        /// Per-source scale factors, applied before combining (default: 1.0 each).
        #[arg(long, value_delimiter = ',')]
        scales: Option<Vec<f64>>,

        /// Per-source bias offsets, applied before combining (default: 0.0 each).
        #[arg(long, value_delimiter = ',')]
        biases: Option<Vec<f64>>,

        /// Combine via max instead of sum.
        #[arg(long, default_value_t = false)]
        max: bool,
    },

    /// Rebuild a UVF with fresh brick/LOD geometry.
    Rebrick {
        /// Source UVF file.
        source: PathBuf,

        /// Target UVF file.
        target: PathBuf,
    },

    /// Export one LOD of a UVF to a native raster format.
    Export {
        /// Source UVF file.
        source: PathBuf,

        /// Target file path; extension selects the output format.
        target: PathBuf,

        /// Level of detail to export.
        #[arg(long, default_value_t = 0)]
        lod: usize,
    },

    /// Extract an isosurface mesh from a scalar UVF.
    Iso {
        /// Source UVF file.
        source: PathBuf,

        /// Target mesh file path; extension selects the mesh format.
        target: PathBuf,

        /// Level of detail to extract from.
        #[arg(long, default_value_t = 0)]
        lod: usize,

        /// Isovalue to triangulate at.
        #[arg(long)]
        isovalue: f64,

        /// Mesh surface color as "r,g,b,a" (0-255 each).
        #[arg(long, default_value = "200,200,200,255", value_delimiter = ',')]
        color: Vec<u8>,
    },

    /// Evaluate an expression over one or more co-registered UVF sources.
    Eval {
        /// Source UVF files, referenced in the expression as v0, v1, ...
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Expression to evaluate, e.g. "v0 + v1 * 2".
        expression: String,

        /// Target UVF file.
        target: PathBuf,
    },
}

impl Cli {
    /// Resolve the scratch directory, falling back to the system temp dir.
    pub fn resolve_temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Parse the `Iso` command's color argument into an `[r, g, b, a]` array.
    pub fn parse_color(color: &[u8]) -> Result<[u8; 4], String> {
        if color.len() != 4 {
            return Err(format!("--color must have exactly 4 components, got {}", color.len()));
        }
        Ok([color[0], color[1], color[2], color[3]])
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_brick == 0 {
            return Err("max_brick must be greater than 0".to_string());
        }

        match &self.command {
            Command::Merge { sources, scales, biases, .. } => {
                if let Some(scales) = scales {
                    if scales.len() != sources.len() {
                        return Err(format!(
                            "--scales has {} entries but {} sources were given",
                            scales.len(),
                            sources.len()
                        ));
                    }
                }
                if let Some(biases) = biases {
                    if biases.len() != sources.len() {
                        return Err(format!(
                            "--biases has {} entries but {} sources were given",
                            biases.len(),
                            sources.len()
                        ));
                    }
                }
            }
            Command::Iso { color, .. } => {
                Self::parse_color(color)?;
            }
            Command::Convert { sources, .. } | Command::Eval { sources, .. } => {
                if sources.is_empty() {
                    return Err("at least one source is required".to_string());
                }
            }
            _ => {}
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_merge_config() {
        let cli = Cli {
            temp_dir: None,
            max_brick: 256,
            overlap: 0,
            quantize8: false,
            verbose: false,
            command: Command::Merge {
                sources: vec!["a.nrrd".into(), "b.nrrd".into()],
                target: "out.uvf".into(),
                scales: Some(vec![1.0, 2.0]),
                biases: None,
                max: false,
            },
        };
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn mismatched_scale_count_is_rejected() {
        let cli = Cli {
            temp_dir: None,
            max_brick: 256,
            overlap: 0,
            quantize8: false,
            verbose: false,
            command: Command::Merge {
                sources: vec!["a.nrrd".into(), "b.nrrd".into()],
                target: "out.uvf".into(),
                scales: Some(vec![1.0]),
                biases: None,
                max: false,
            },
        };
        let result = cli.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("scales"));
    }

    #[test]
    fn zero_max_brick_is_rejected() {
        let cli = Cli {
            temp_dir: None,
            max_brick: 0,
            overlap: 0,
            quantize8: false,
            verbose: false,
            command: Command::Scan { dir: "data".into() },
        };
        assert!(cli.validate().is_err());
    }

    #[test]
    fn parse_color_requires_four_components() {
        assert!(Cli::parse_color(&[1, 2, 3]).is_err());
        assert_eq!(Cli::parse_color(&[1, 2, 3, 4]).unwrap(), [1, 2, 3, 4]);
    }
}
