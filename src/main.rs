//! Engram-DB CLI
//!
//! # Usage
//!
//! ```bash
//! # Build an index from a JSON list of embeddings
//! engram-db ingest --input chunks.json --output docs.engram
//!
//! # Query it
//! engram-db search --index docs.engram --query 0.1,0.2,0.3 -k 5
//!
//! # Inspect the header
//! engram-db stats --file docs.engram --verify
//!
//! # Compare scan strategies against a naive sort
//! engram-db bench --vectors 100000 --dimension 128
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use engram_db::bench::{self, BenchConfig};
use engram_db::ingest;
use engram_db::{Engine, EngineConfig, MappedIndex, SaveOptions, ScanStrategy};

#[derive(Parser)]
#[command(name = "engram-db")]
#[command(about = "An exact, brute-force vector similarity index")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create (or extend) an .engram file from a JSON list of vectors
    ///
    /// Input format: JSON array of arrays [[0.1, ...], [0.2, ...]]
    Ingest {
        /// Input JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Output .engram file
        #[arg(short, long)]
        output: PathBuf,

        /// Append to an existing output file instead of replacing it
        #[arg(long)]
        append: bool,

        /// Write a CRC-32 trailer (format version 2)
        #[arg(long)]
        checksum: bool,
    },

    /// Search an .engram file for the nearest neighbors of a query
    Search {
        /// Path to the .engram file
        #[arg(long)]
        index: PathBuf,

        /// Query vector (comma separated floats)
        // Fully qualified so clap keeps one parsed vector instead of
        // collecting repeated f32 values.
        #[arg(short, long, value_parser = parse_vector)]
        query: std::vec::Vec<f32>,

        /// Number of results
        #[arg(short = 'k', long, default_value = "10")]
        k: usize,

        /// Scan strategy: auto, scalar, simd or parallel
        #[arg(long)]
        strategy: Option<ScanStrategy>,

        /// Dedicated search threads (default: ENGRAM_SEARCH_THREADS or all cores)
        #[arg(long)]
        threads: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Display statistics about an .engram file
    Stats {
        /// Path to the .engram file
        #[arg(short, long)]
        file: PathBuf,

        /// Also check the vector data section (length and checksum)
        #[arg(long)]
        verify: bool,
    },

    /// Time the scan strategies against a naive compute-and-sort baseline
    Bench {
        #[arg(long, default_value = "100000")]
        vectors: usize,

        #[arg(long, default_value = "128")]
        dimension: usize,

        #[arg(short = 'k', long, default_value = "10")]
        k: usize,

        #[arg(long, default_value = "10")]
        queries: usize,

        #[arg(long, default_value = "42")]
        seed: u64,

        #[arg(long)]
        threads: Option<usize>,
    },
}

#[derive(Serialize)]
struct HitRow {
    rank: usize,
    id: u64,
    distance: f32,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            input,
            output,
            append,
            checksum,
        } => {
            tracing::info!("Reading vectors from {:?}", input);
            let summary = ingest::ingest_file(&input, &output, append, SaveOptions { checksum })?;
            tracing::info!(
                "Wrote {} vectors (ids {}..{}, dim {}) to {:?}; index now holds {}",
                summary.added,
                summary.first_id,
                summary.first_id + summary.added as u64,
                summary.dimension,
                output,
                summary.total
            );
        }

        Commands::Search {
            index,
            query,
            k,
            strategy,
            threads,
            json,
        } => {
            let header = *MappedIndex::open(&index)
                .with_context(|| format!("opening {:?}", index))?
                .header();

            let mut config = EngineConfig::from_env(header.dimensions as usize)?
                .with_reserve_vectors(0);
            if let Some(strategy) = strategy {
                config = config.with_strategy(strategy);
            }
            if let Some(threads) = threads {
                config = config.with_threads(threads);
            }

            let mut engine = Engine::with_config(config)?;
            engine.load(&index)?;
            tracing::info!(
                "Loaded {} vectors of dimension {} ({} bytes resident)",
                engine.count(),
                engine.dimension(),
                engine.store().memory_bytes()
            );

            let hits = engine.search(&query, k)?;
            if json {
                let rows: Vec<HitRow> = hits
                    .iter()
                    .enumerate()
                    .map(|(rank, h)| HitRow {
                        rank: rank + 1,
                        id: h.id,
                        distance: h.distance,
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{:>4}  {:>10}  {:>12}", "rank", "id", "distance");
                for (rank, hit) in hits.iter().enumerate() {
                    println!("{:>4}  {:>10}  {:>12.6}", rank + 1, hit.id, hit.distance);
                }
            }
        }

        Commands::Stats { file, verify } => {
            let mapped = MappedIndex::open(&file).with_context(|| format!("opening {:?}", file))?;
            let header = mapped.header();
            println!("Index File: {:?}", file);
            println!("  Format version: {}", header.version);
            println!("  Vectors: {}", header.count);
            println!("  Dimensions: {}", header.dimensions);
            println!(
                "  Checksum: {}",
                if header.has_checksum() { "crc32" } else { "none" }
            );
            println!("  File size: {} bytes", mapped.file_len());

            if verify {
                let data = mapped.decode_vectors()?;
                println!("  Verified: {} floats", data.len());
            }
        }

        Commands::Bench {
            vectors,
            dimension,
            k,
            queries,
            seed,
            threads,
        } => {
            let config = BenchConfig {
                vectors,
                dimension,
                k,
                queries,
                seed,
                threads,
            };
            let report = bench::run(&config)?;

            println!(
                "Naive sort:  {:>10.3?} per query",
                report.baseline_per_query
            );
            for timing in &report.strategies {
                println!(
                    "{:<10}  {:>10.3?} per query  {:>6.1}x  {}",
                    timing.strategy.as_str(),
                    timing.per_query,
                    report.speedup(timing),
                    if timing.matches_baseline {
                        "results match"
                    } else {
                        "RESULTS DIFFER"
                    }
                );
            }
            println!("Vectorized kernel: {}", engram_db::simd::vectorized_backend());
        }
    }

    Ok(())
}

fn parse_vector(s: &str) -> Result<Vec<f32>, String> {
    s.split(',')
        .map(|v| v.trim().parse::<f32>().map_err(|e| e.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_query_parses_to_one_vector() {
        let cli = Cli::try_parse_from([
            "engram-db", "search", "--index", "x.engram", "--query", "1,0,0", "-k", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Search {
                index,
                query,
                k,
                strategy,
                ..
            } => {
                assert_eq!(index, PathBuf::from("x.engram"));
                assert_eq!(query, vec![1.0, 0.0, 0.0]);
                assert_eq!(k, 2);
                assert_eq!(strategy, None);
            }
            _ => panic!("expected the search subcommand"),
        }
    }

    #[test]
    fn test_search_strategy_flag() {
        let cli = Cli::try_parse_from([
            "engram-db", "search", "--index", "x", "-q", "0.5, -1.5", "--strategy", "parallel",
        ])
        .unwrap();
        let Commands::Search {
            query, strategy, ..
        } = cli.command
        else {
            panic!("expected the search subcommand");
        };
        assert_eq!(query, vec![0.5, -1.5]);
        assert_eq!(strategy, Some(ScanStrategy::Parallel));
    }

    #[test]
    fn test_bad_query_is_a_parse_error() {
        let err = Cli::try_parse_from(["engram-db", "search", "--index", "x", "--query", "1,a"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        assert!(Cli::try_parse_from([
            "engram-db", "search", "--index", "x", "-q", "1", "--strategy", "fast",
        ])
        .is_err());
    }

    #[test]
    fn test_parse_vector() {
        assert_eq!(parse_vector("0.1,0.2, 0.3").unwrap(), vec![0.1, 0.2, 0.3]);
        assert!(parse_vector("").is_err());
    }

    #[test]
    fn test_search_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("axes.engram");
        ingest::ingest_vectors(
            &[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]],
            &path,
            false,
            SaveOptions::default(),
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "engram-db",
            "search",
            "--index",
            path.to_str().unwrap(),
            "--query",
            "0.9,0.1,0",
            "-k",
            "2",
        ])
        .unwrap();
        let Commands::Search { index, query, k, .. } = cli.command else {
            panic!("expected the search subcommand");
        };

        let mut engine = Engine::new(3).unwrap();
        engine.load(&index).unwrap();
        let hits = engine.search(&query, k).unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![0, 1]);
    }
}
