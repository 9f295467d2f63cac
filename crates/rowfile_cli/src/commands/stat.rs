//! Stat command implementation.

use super::{require_file, Target};
use rowfile_driver::ChunkStats;
use serde::Serialize;
use std::sync::Arc;

/// File statistics.
#[derive(Debug, Serialize)]
pub struct StatResult {
    /// File name.
    pub name: String,
    /// Extension, empty when there is none.
    pub extension: String,
    /// Size in bytes.
    pub size: u64,
    /// Number of stored chunk rows.
    pub chunks: u64,
    /// Length of the largest stored chunk.
    pub largest_chunk: u64,
}

impl StatResult {
    fn new(name: &str, extension: &str, size: u64, stats: ChunkStats) -> Self {
        Self {
            name: name.to_string(),
            extension: extension.to_string(),
            size,
            chunks: stats.count,
            largest_chunk: stats.largest,
        }
    }
}

/// Reads the statistics of `name` from the stored rows.
pub fn collect(target: &Target, name: &str) -> Result<StatResult, Box<dyn std::error::Error>> {
    let driver = target.driver()?;
    let store = target.open_with(Arc::clone(&driver))?;
    require_file(&store, name)?;

    let file = store.create_file(name)?;
    let size = file.size()?;
    let stats = driver
        .chunk_stats(name)?
        .ok_or_else(|| format!("No such file: {name}"))?;
    let result = StatResult::new(name, file.extension(), size, stats);
    file.close()?;
    store.stop();
    Ok(result)
}

/// Runs the stat command.
pub fn run(target: &Target, name: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = collect(target, name)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            println!("File: {}", result.name);
            println!("Database: {}", target.db().display());
            println!("Extension: {}", result.extension);
            println!("Size: {} bytes", result.size);
            println!("Chunks: {} (largest {} bytes)", result.chunks, result.largest_chunk);
        }
    }
    Ok(())
}
