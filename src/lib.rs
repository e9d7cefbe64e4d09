//! # baix - BAM index rewriting engine
//!
//! baix reads a BAM random-access index (`.bai`) and writes it back out, either
//! as a line-oriented text rendering or as a re-serialized, optionally
//! re-sorted binary index. Rewrites are all-or-nothing: a failed run leaves
//! nothing at the output path.
//!
//! ## Architecture
//!
//! - [`index`] - Index content model, binning arithmetic, reader, writers and
//!   the reindexing pipeline
//! - [`error`] - The [`IndexError`] type shared by every operation
//! - [`utils`] - Byte codec, application config and progress reporting
//!
//! ## Quick Start
//!
//! ```no_run
//! use baix::index::{reindex, ReindexOptions};
//! use std::path::PathBuf;
//!
//! let summary = reindex(&ReindexOptions {
//!     input: PathBuf::from("sample.bam.bai"),
//!     output: PathBuf::from("sample.bai.txt"),
//!     text: true,
//!     ..Default::default()
//! })
//! .unwrap();
//! println!("{} references", summary.totals.references);
//! ```
//!
//! ## Binning
//!
//! Each reference is covered by a six-level bin tree over 512 Mbp plus a
//! linear index of 16 Kbp windows. [`index::binning::region_to_bins`] and
//! [`index::IndexReader::query_chunks`] turn a region into the chunks of the
//! alignment file worth scanning.

pub mod error;
pub mod index;
pub mod utils;

pub use error::{IndexError, Result};
