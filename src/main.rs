//! uvf-pipeline - scan, convert, merge, and analyze bricked volumetric data.
//!
//! This binary parses CLI arguments, wires up an [`uvf_pipeline::IOManager`],
//! and dispatches one subcommand.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use uvf_pipeline::config::{Cli, Command};
use uvf_pipeline::progress::TracingProgressSink;
use uvf_pipeline::IOManager;

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    print_banner();

    let manager =
        IOManager::new(cli.resolve_temp_dir()).with_brick_settings(cli.max_brick, cli.overlap, cli.quantize8);
    let sink = TracingProgressSink;

    let result = match cli.command.clone() {
        Command::Scan { dir } => run_scan(&manager, &dir, &sink),
        Command::Convert { sources, target } => run_convert(&manager, &sources, &target, &sink),
        Command::Merge { sources, target, scales, biases, max } => {
            let scales = scales.unwrap_or_else(|| vec![1.0; sources.len()]);
            let biases = biases.unwrap_or_else(|| vec![0.0; sources.len()]);
            manager.merge(&sources, &scales, &biases, &target, max, &sink).map_err(|e| e.to_string())
        }
        Command::Rebrick { source, target } => manager.rebrick(&source, &target, &sink).map_err(|e| e.to_string()),
        Command::Export { source, target, lod } => {
            manager.export_dataset(&source, lod, &target, &sink).map_err(|e| e.to_string())
        }
        Command::Iso { source, target, lod, isovalue, color } => {
            let color = Cli::parse_color(&color).expect("validated in Cli::validate");
            manager.extract_isosurface(&source, lod, isovalue, color, &target, &sink).map_err(|e| e.to_string())
        }
        Command::Eval { sources, expression, target } => {
            manager.evaluate_expression(&sources, &expression, &target, &sink).map_err(|e| e.to_string())
        }
    };

    match result {
        Ok(()) => {
            info!("done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// `scan` prints a one-line summary per stack; `convert` with a single
/// directory source scans it first and converts every discovered stack,
/// suffixing the target filename when more than one stack is found.
fn run_scan(manager: &IOManager, dir: &PathBuf, sink: &TracingProgressSink) -> Result<(), String> {
    let stacks = manager.scan_directory(dir, sink).map_err(|e| e.to_string())?;
    if stacks.is_empty() {
        info!("no stacks found in {}", dir.display());
        return Ok(());
    }
    for (i, stack) in stacks.iter().enumerate() {
        info!(
            "[{i}] {} ({:?}, {} slices, domain {:?})",
            stack.description,
            stack.kind,
            stack.slice_count(),
            stack.domain()
        );
    }
    Ok(())
}

fn run_convert(manager: &IOManager, sources: &[PathBuf], target: &PathBuf, sink: &TracingProgressSink) -> Result<(), String> {
    if sources.len() == 1 && sources[0].is_dir() {
        let stacks = manager.scan_directory(&sources[0], sink).map_err(|e| e.to_string())?;
        if stacks.is_empty() {
            return Err(format!("no stacks found in {}", sources[0].display()));
        }
        for (i, stack) in stacks.iter().enumerate() {
            let stack_target = if stacks.len() == 1 { target.clone() } else { suffixed(target, i) };
            manager.convert_stack(stack, &stack_target, sink).map_err(|e| e.to_string())?;
        }
        return Ok(());
    }

    manager.convert_file(sources, target, sink).map_err(|e| e.to_string())
}

/// Insert `-{index}` before a target path's extension.
fn suffixed(target: &std::path::Path, index: usize) -> PathBuf {
    let stem = target.file_stem().and_then(|s| s.to_str()).unwrap_or("out");
    let ext = target.extension().and_then(|s| s.to_str()).unwrap_or("uvf");
    target.with_file_name(format!("{stem}-{index}.{ext}"))
}

fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("uvf-pipeline v{version}");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose { "uvf_pipeline=debug" } else { "uvf_pipeline=info" };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| env_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
