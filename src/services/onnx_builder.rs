// Shared ONNX Runtime session construction for the detector and OCR models
//
// Everything runs on the CPU execution provider.

use anyhow::{Context, Result};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::{debug, info};

/// Calculate optimal thread count for ONNX Runtime CPU inference.
///
/// On Windows, using every core tends to slow inference down through
/// synchronization overhead, so the count is capped at 6 there.
pub fn optimal_intra_op_threads(requested: usize) -> usize {
    let total_cores = num_cpus::get();

    #[cfg(target_os = "windows")]
    let optimal = requested.min(6).min(total_cores).max(1);

    #[cfg(not(target_os = "windows"))]
    let optimal = requested.min(total_cores).max(1);

    debug!(
        "CPU threads: {} total cores, {} requested, using {}",
        total_cores, requested, optimal
    );
    optimal
}

/// Load a model file into a CPU session
pub fn build_cpu_session(model_path: &Path, intra_threads: usize) -> Result<Session> {
    let threads = optimal_intra_op_threads(intra_threads);
    let size_mb = std::fs::metadata(model_path)
        .map(|m| m.len() as f64 / 1_048_576.0)
        .with_context(|| format!("Model not found at {}", model_path.display()))?;

    let session = Session::builder()?
        .with_execution_providers([CPUExecutionProvider::default().build()])?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(threads)?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model {}", model_path.display()))?;

    info!(
        "✓ Loaded {} ({:.1} MB, CPU, {} threads)",
        model_path.display(),
        size_mb,
        threads
    );
    Ok(session)
}
