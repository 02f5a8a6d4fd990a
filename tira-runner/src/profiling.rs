//! Profiling telemetry
//!
//! Raw samples are written by the job into `output/profiling/`:
//! `ps.log` (`<seconds> <cpu%> <rss> <vsz>`), `gpu.log`
//! (`<seconds>, <utilization>, <memory used>`) and optional `start`/`end`
//! files holding epoch seconds. They are parsed into `parsed_profiling.jsonl`
//! and archived as `profiling.zip` next to `output/`.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tira_core::domain::diagnostics::{PARSED_PROFILING_FILE, PROFILING_ARCHIVE, PROFILING_DIR};
use tira_core::domain::profiling::{ProfilingKey, ProfilingSample};
use tracing::{debug, info};
use zip::write::FileOptions;

const PS_LOG: &str = "ps.log";
const GPU_LOG: &str = "gpu.log";
const START_MARKER: &str = "start";
const END_MARKER: &str = "end";

/// Parses the raw profiling files of a directory
///
/// Samples are ordered by timestamp, samples of equal timestamp keep their
/// file order. Lines that do not have the expected shape are skipped.
pub fn parse_profiling_logs(dir: &Path) -> Result<Vec<ProfilingSample>> {
    let mut samples = Vec::new();

    if let Some(content) = read_optional(&dir.join(PS_LOG))? {
        for line in content.lines() {
            let columns: Vec<&str> = line.split_whitespace().collect();
            let [timestamp, cpu, rss, vsz] = columns.as_slice() else {
                debug!("Skipping ps line {:?}", line);
                continue;
            };
            let parsed = (
                timestamp.parse::<f64>(),
                cpu.parse::<f64>(),
                rss.parse::<f64>(),
                vsz.parse::<f64>(),
            );
            let (Ok(timestamp), Ok(cpu), Ok(rss), Ok(vsz)) = parsed else {
                debug!("Skipping ps line {:?}", line);
                continue;
            };
            samples.push(ProfilingSample::number(timestamp, ProfilingKey::PsCpu, cpu));
            samples.push(ProfilingSample::number(timestamp, ProfilingKey::PsRss, rss));
            samples.push(ProfilingSample::number(timestamp, ProfilingKey::PsVsz, vsz));
        }
    }

    if let Some(content) = read_optional(&dir.join(GPU_LOG))? {
        for line in content.lines() {
            let columns: Vec<&str> = line.split(',').map(str::trim).collect();
            let [timestamp, utilization, memory] = columns.as_slice() else {
                debug!("Skipping gpu line {:?}", line);
                continue;
            };
            let Ok(timestamp) = timestamp.parse::<f64>() else {
                debug!("Skipping gpu line {:?}", line);
                continue;
            };
            samples.push(ProfilingSample::text(
                timestamp,
                ProfilingKey::GpuUtilization,
                *utilization,
            ));
            samples.push(ProfilingSample::text(
                timestamp,
                ProfilingKey::GpuMemoryUsed,
                *memory,
            ));
        }
    }

    let start = read_marker(&dir.join(START_MARKER))?;
    let end = read_marker(&dir.join(END_MARKER))?;
    if let (Some(start), Some(end)) = (start, end) {
        let elapsed = end - start;
        samples.push(ProfilingSample::number(
            elapsed,
            ProfilingKey::ElapsedTime,
            elapsed,
        ));
    }

    samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    Ok(samples)
}

/// Parses, persists and archives the profiling data of a job
///
/// Writes `parsed_profiling.jsonl` and `profiling.zip` into `job_dir` and
/// removes `output/profiling/`. A job without profiling data is left as is.
pub fn process_profiling(job_dir: &Path) -> Result<Vec<ProfilingSample>> {
    let raw_dir = job_dir
        .join(tira_core::domain::diagnostics::OUTPUT_DIR)
        .join(PROFILING_DIR);
    if !raw_dir.is_dir() {
        return Ok(Vec::new());
    }

    let samples = parse_profiling_logs(&raw_dir)?;

    let mut jsonl = String::new();
    for sample in &samples {
        jsonl.push_str(&serde_json::to_string(sample)?);
        jsonl.push('\n');
    }
    let parsed_path = job_dir.join(PARSED_PROFILING_FILE);
    std::fs::write(&parsed_path, jsonl)
        .with_context(|| format!("Failed to write {}", parsed_path.display()))?;

    archive(&raw_dir, &job_dir.join(PROFILING_ARCHIVE))?;
    std::fs::remove_dir_all(&raw_dir)
        .with_context(|| format!("Failed to remove {}", raw_dir.display()))?;

    info!("Processed {} profiling sample(s) in {}", samples.len(), job_dir.display());
    Ok(samples)
}

/// Zips the files of `dir` with paths relative to `dir`
fn archive(dir: &Path, target: &Path) -> Result<()> {
    let file =
        File::create(target).with_context(|| format!("Failed to create {}", target.display()))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .strip_prefix(dir)?
            .to_string_lossy()
            .replace('\\', "/");
        writer.start_file(name, options)?;
        let data = std::fs::read(entry.path())
            .with_context(|| format!("Failed to read {}", entry.path().display()))?;
        writer.write_all(&data)?;
    }

    writer.finish()?;
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    std::fs::read_to_string(path)
        .map(Some)
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn read_marker(path: &Path) -> Result<Option<f64>> {
    Ok(read_optional(path)?.and_then(|content| content.trim().parse::<f64>().ok()))
}
