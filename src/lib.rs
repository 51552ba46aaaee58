//! # Command line interface for scemtools
//! [scemtools command line interface, subcommands, and options.](cli::Commands)
//! # README for scemtools
#![doc = include_str!("../README.md")]
/// Bismark alignment of a read directory, then merge and sort.
pub mod align;
/// Tag FASTQ reads with cell barcode and UMI.
pub mod barcode;
/// Command line interface for scemtools.
pub mod cli;
/// Per-cell deduplication and methylation-extraction command lists.
pub mod dedup;
/// Error type shared by the pipeline stages.
pub mod error;
/// Per-cell CpG coverage and consistency.
pub mod mcpg;
/// Module for automatically reading a writing compressed or uncompressed files.
pub mod myio;
/// File naming conventions linking one stage's outputs to the next stage's inputs.
pub mod naming;
/// Running external tools.
pub mod runner;
/// Split a BAM into per-cell SAM files.
pub mod split;
/// Fixed-length trimming and fastp QC.
pub mod trim;
/// Count UMI-like read name tags per cell.
pub mod umi;
