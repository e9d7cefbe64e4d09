//! Per-reference metadata pseudo-bin and index-wide statistics.
//!
//! Indexers that follow the C implementation append a bin numbered
//! [`METADATA_BIN`] to each reference, holding two chunks:
//!
//! ```text
//! chunk 0: (first_offset, last_offset)   virtual offsets spanned by the reference
//! chunk 1: (aligned, unaligned)          record counts, stored as raw u64 values
//! ```
//!
//! The bin travels through readers and writers like any other bin; this module
//! only interprets it.

use crate::error::{IndexError, Result};
use crate::index::reader::IndexSource;
use crate::index::types::*;
use serde::Serialize;

/// Decoded contents of the metadata pseudo-bin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReferenceMetadata {
    pub first_offset: VirtualOffset,
    pub last_offset: VirtualOffset,
    pub aligned_records: u64,
    pub unaligned_records: u64,
}

impl ReferenceMetadata {
    /// Encode as the pseudo-bin
    pub fn to_bin(&self) -> Bin {
        Bin::new(
            METADATA_BIN,
            vec![
                Chunk::new(self.first_offset, self.last_offset),
                Chunk::from_raw(self.aligned_records, self.unaligned_records),
            ],
        )
    }

    fn from_bin(bin: &Bin) -> Result<Self> {
        match bin.chunks.as_slice() {
            [span, counts] => Ok(ReferenceMetadata {
                first_offset: span.start,
                last_offset: span.end,
                aligned_records: counts.start.as_raw(),
                unaligned_records: counts.end.as_raw(),
            }),
            chunks => Err(IndexError::malformed(
                0,
                format!("unexpected number of metadata chunks {}", chunks.len()),
            )),
        }
    }
}

impl ReferenceContent {
    /// Metadata pseudo-bin of this reference, if present
    pub fn metadata(&self) -> Result<Option<ReferenceMetadata>> {
        self.bin(METADATA_BIN)
            .map(ReferenceMetadata::from_bin)
            .transpose()
    }
}

/// Statistics for one reference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceStats {
    pub reference: usize,
    /// Bins excluding the metadata pseudo-bin
    pub bins: usize,
    /// Chunks excluding the metadata pseudo-bin
    pub chunks: usize,
    pub linear_windows: usize,
    pub aligned_records: Option<u64>,
    pub unaligned_records: Option<u64>,
}

/// Statistics for a whole index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub references: Vec<ReferenceStats>,
    pub no_coordinate_count: Option<u64>,
}

impl IndexStats {
    pub fn collect<S: IndexSource + ?Sized>(source: &S) -> Result<Self> {
        let mut references = Vec::with_capacity(source.reference_count());
        for reference in 0..source.reference_count() {
            let content = source.content_for(reference)?;
            let metadata = content.metadata()?;
            let data_bins = content.bins.iter().filter(|b| !b.is_metadata());
            let (bins, chunks) = data_bins.fold((0usize, 0usize), |(bins, chunks), b| {
                (bins + 1, chunks + b.chunks.len())
            });
            references.push(ReferenceStats {
                reference,
                bins,
                chunks,
                linear_windows: content.linear_index.len(),
                aligned_records: metadata.map(|m| m.aligned_records),
                unaligned_records: metadata.map(|m| m.unaligned_records),
            });
        }
        Ok(IndexStats {
            references,
            no_coordinate_count: source.no_coordinate_count(),
        })
    }

    pub fn total_aligned(&self) -> u64 {
        self.references.iter().filter_map(|r| r.aligned_records).sum()
    }

    pub fn total_unaligned(&self) -> u64 {
        self.references
            .iter()
            .filter_map(|r| r.unaligned_records)
            .sum()
    }
}
