//! Result files.
//!
//! One JSON-lines file of raw samples per run, plus one summary document per
//! scenario session.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use p2p_eval_core::MetricSample;
use p2p_eval_metrics::BandwidthSummary;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Aggregate of one run, as written to the session summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub scenario: String,
    pub param: usize,
    pub trial: u32,
    pub messages: usize,
    pub payload_bytes: usize,
    pub bandwidth: BandwidthSummary,
    pub net_bandwidth_mb: f64,
}

pub struct ResultsWriter {
    dir: PathBuf,
}

impl ResultsWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `<run>.jsonl`, one sample per line.
    pub fn write_samples(&self, run: &str, samples: &[MetricSample]) -> anyhow::Result<PathBuf> {
        let path = self.create(&format!("{run}.jsonl"))?;
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        for sample in samples {
            serde_json::to_writer(&mut out, sample)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        info!(path = %path.display(), samples = samples.len(), "samples written");
        Ok(path)
    }

    /// Write `<scenario>-summary.json`.
    pub fn write_summary(&self, scenario: &str, runs: &[RunSummary]) -> anyhow::Result<PathBuf> {
        let path = self.create(&format!("{scenario}-summary.json"))?;
        let json = serde_json::to_string_pretty(runs)?;
        fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), runs = runs.len(), "summary written");
        Ok(path)
    }

    fn create(&self, file_name: &str) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create results dir {}", self.dir.display()))?;
        Ok(self.dir.join(file_name))
    }
}

/// File stem of one run: `<scenario>-<param>-<trial>`.
pub fn run_label(scenario: &str, param: usize, trial: u32) -> String {
    format!("{scenario}-{param}-{trial}")
}
