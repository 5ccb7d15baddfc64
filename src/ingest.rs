//! Bulk ingest of JSON vector lists into an index file.
//!
//! Input format: a JSON array of arrays, `[[0.1, ...], [0.2, ...]]`, one
//! inner array per embedding, in the order their ids should be assigned.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};

use engram_core::{Engine, EngineConfig, IndexHeader, MappedIndex, SaveOptions};

/// Result of an ingest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub dimension: usize,
    /// Ids assigned to the new vectors are `first_id..first_id + added`.
    pub first_id: u64,
    pub added: usize,
    pub total: usize,
}

pub fn read_vectors<R: Read>(reader: R) -> Result<Vec<Vec<f32>>> {
    let vectors: Vec<Vec<f32>> =
        serde_json::from_reader(reader).context("parsing JSON vector list")?;
    Ok(vectors)
}

/// Read `input` and write (or extend, with `append`) the index at `output`.
pub fn ingest_file(
    input: &Path,
    output: &Path,
    append: bool,
    options: SaveOptions,
) -> Result<IngestSummary> {
    let file = File::open(input).with_context(|| format!("opening {:?}", input))?;
    let vectors = read_vectors(BufReader::new(file))?;
    ingest_vectors(&vectors, output, append, options)
}

pub fn ingest_vectors(
    vectors: &[Vec<f32>],
    output: &Path,
    append: bool,
    options: SaveOptions,
) -> Result<IngestSummary> {
    let existing = if append && output.exists() {
        Some(*MappedIndex::open(output)?.header())
    } else {
        None
    };

    let dimension = match (existing, vectors.first()) {
        (Some(header), _) => header.dimensions as usize,
        (None, Some(first)) => first.len(),
        (None, None) => bail!("No vectors found in input"),
    };

    let mut engine = Engine::with_config(
        EngineConfig::new(dimension).with_reserve_vectors(reserve_for(existing, vectors.len())),
    )?;
    if existing.is_some() {
        engine
            .load(output)
            .with_context(|| format!("loading existing index {:?}", output))?;
    }

    let first_id = engine.count() as u64;
    for (i, vector) in vectors.iter().enumerate() {
        engine
            .insert(vector)
            .with_context(|| format!("vector {} of the input", i))?;
    }

    engine
        .save_with(output, options)
        .with_context(|| format!("writing {:?}", output))?;

    Ok(IngestSummary {
        dimension,
        first_id,
        added: vectors.len(),
        total: engine.count(),
    })
}

fn reserve_for(existing: Option<IndexHeader>, incoming: usize) -> usize {
    let current = existing.map(|h| h.count as usize).unwrap_or(0);
    current.saturating_add(incoming)
}
