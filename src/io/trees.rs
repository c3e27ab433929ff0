use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::sampler::TreeSample;
use crate::stitch::TransmissionTree;

pub fn save_samples(path: &Path, samples: &[TreeSample]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {path:?}"))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, samples)
        .with_context(|| format!("failed to write {path:?}"))?;
    Ok(())
}

pub fn save_trees(path: &Path, trees: &[TransmissionTree]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {path:?}"))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, trees)
        .with_context(|| format!("failed to write {path:?}"))?;
    Ok(())
}
