//! Hierarchical binning scheme arithmetic.
//!
//! The scheme divides a 512 Mbp reference into six levels:
//! - Level 0: bin 0 (entire sequence)
//! - Level 1: bins 1-8 (64 Mbp each)
//! - Level 2: bins 9-72 (8 Mbp each)
//! - Level 3: bins 73-584 (1 Mbp each)
//! - Level 4: bins 585-4680 (128 Kbp each)
//! - Level 5: bins 4681-37449 (16 Kbp each)

use super::types::{Chunk, MAX_BINS};
use roaring::RoaringBitmap;

/// First bin of each level
pub const LEVEL_STARTS: [u32; 6] = [0, 1, 9, 73, 585, 4681];

/// Genomic span addressed by the bin tree
pub const BIN_SPAN: u32 = 512 * 1024 * 1024;

const MAX_POSITION: i64 = 0x1FFF_FFFF;

fn num_levels() -> usize {
    LEVEL_STARTS.len()
}

/// Level of a bin, or `None` for ids outside the scheme (including the metadata bin)
pub fn level_for_bin(bin_id: u32) -> Option<usize> {
    if bin_id >= MAX_BINS {
        return None;
    }
    LEVEL_STARTS.iter().rposition(|&start| bin_id >= start)
}

fn level_size(level: usize) -> u32 {
    let next = if level == num_levels() - 1 {
        MAX_BINS - 1
    } else {
        LEVEL_STARTS[level + 1]
    };
    next - LEVEL_STARTS[level]
}

/// First 1-based locus a bin can index
pub fn first_locus_in_bin(bin_id: u32) -> Option<u32> {
    let level = level_for_bin(bin_id)?;
    Some((bin_id - LEVEL_STARTS[level]) * (BIN_SPAN / level_size(level)) + 1)
}

/// Last 1-based locus a bin can index
pub fn last_locus_in_bin(bin_id: u32) -> Option<u32> {
    let level = level_for_bin(bin_id)?;
    Some((bin_id - LEVEL_STARTS[level] + 1) * (BIN_SPAN / level_size(level)))
}

/// Candidate bins for a 1-based inclusive region.
///
/// Non-positive `start` means the beginning of the reference, non-positive
/// `end` means its end. Returns `None` when the region is empty.
pub fn region_to_bins(start: i64, end: i64) -> Option<RoaringBitmap> {
    let start = if start <= 0 { 0 } else { (start - 1) & MAX_POSITION };
    let end = if end <= 0 {
        MAX_POSITION
    } else {
        (end - 1) & MAX_POSITION
    };
    if start > end {
        return None;
    }

    let (start, end) = (start as u32, end as u32);
    let mut bins = RoaringBitmap::new();
    bins.insert(0);
    for (level_start, shift) in [(1u32, 26u32), (9, 23), (73, 20), (585, 17), (4681, 14)] {
        bins.insert_range(level_start + (start >> shift)..=level_start + (end >> shift));
    }
    Some(bins)
}

/// Linear index window containing a 0-based position
pub fn linear_window(position: u32) -> usize {
    (position >> super::types::LINEAR_WINDOW_SHIFT) as usize
}

/// Sort chunks, drop those ending at or before `min_offset`, and coalesce
/// chunks whose blocks are the same or adjacent.
pub fn optimize_chunk_list(mut chunks: Vec<Chunk>, min_offset: u64) -> Vec<Chunk> {
    chunks.sort();
    let mut result: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if chunk.end.as_raw() <= min_offset {
            continue;
        }
        match result.last_mut() {
            Some(last) if chunk.start.block_address() <= last.end.block_address() + 1 => {
                if chunk.end > last.end {
                    last.end = chunk.end;
                }
            }
            _ => result.push(chunk),
        }
    }
    result
}
