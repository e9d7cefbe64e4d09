use crate::error::{IndexError, Result};
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::fmt;

/// Magic bytes opening every binary BAM index
pub const BAI_MAGIC: [u8; 4] = *b"BAI\x01";

/// Number of real bins in the binning scheme: (8^6 - 1) / 7
pub const MAX_BINS: u32 = 37450;

/// Pseudo-bin holding per-reference metadata chunks
pub const METADATA_BIN: u32 = MAX_BINS;

/// Linear index windows are 16 KiB of reference coordinates
pub const LINEAR_WINDOW_SHIFT: u32 = 14;

/// Largest linear index a 512 Mbp reference can need
pub const MAX_LINEAR_WINDOWS: usize = 1 << (29 - LINEAR_WINDOW_SHIFT);

/// Exclusive upper bound of a block address (48 bits)
pub const MAX_BLOCK_ADDRESS: u64 = 1 << 48;

/// Virtual file offset in BGZF format.
///
/// A 64-bit value combining:
/// - Bits 63-16: address of the compressed block in the alignment file
/// - Bits 15-0: byte offset within the decompressed block
///
/// Ordering is the ordering of the raw value, which is block address first,
/// then offset in block.
///
/// ```
/// # use baix::index::VirtualOffset;
/// let offset = VirtualOffset::new(1024, 512);
/// assert_eq!(offset.block_address(), 1024);
/// assert_eq!(offset.offset_in_block(), 512);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    /// Create a virtual offset from a block address and an in-block offset.
    ///
    /// # Panics
    ///
    /// Panics if `block_address` does not fit in 48 bits. Use
    /// [`VirtualOffset::try_new`] for unchecked input.
    pub fn new(block_address: u64, offset_in_block: u16) -> Self {
        assert!(
            block_address < MAX_BLOCK_ADDRESS,
            "block address {} exceeds 48 bits",
            block_address
        );
        VirtualOffset((block_address << 16) | offset_in_block as u64)
    }

    /// Fallible form of [`VirtualOffset::new`] for untrusted components
    pub fn try_new(block_address: u64, offset_in_block: u64) -> Result<Self> {
        if block_address >= MAX_BLOCK_ADDRESS || offset_in_block > u16::MAX as u64 {
            return Err(IndexError::InvalidVirtualOffset {
                block_address,
                offset_in_block,
            });
        }
        Ok(Self::new(block_address, offset_in_block as u16))
    }

    pub const fn from_raw(value: u64) -> Self {
        VirtualOffset(value)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Compressed block address (high 48 bits)
    pub const fn block_address(self) -> u64 {
        self.0 >> 16
    }

    /// Offset within the decompressed block (low 16 bits)
    pub const fn offset_in_block(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_address(), self.offset_in_block())
    }
}

impl From<u64> for VirtualOffset {
    fn from(value: u64) -> Self {
        VirtualOffset(value)
    }
}

/// Half-open `[start, end)` interval of virtual offsets.
///
/// Ordered by `start`, ties broken by `end`. `start <= end` is expected but not
/// enforced; indexes in the wild carry whatever their writer produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Chunk {
    pub start: VirtualOffset,
    pub end: VirtualOffset,
}

impl Chunk {
    pub fn new(start: VirtualOffset, end: VirtualOffset) -> Self {
        Chunk { start, end }
    }

    pub fn from_raw(start: u64, end: u64) -> Self {
        Chunk::new(VirtualOffset::from_raw(start), VirtualOffset::from_raw(end))
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// One window of a reference's linear index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearIndexEntry {
    /// Zero-based 16 KiB window number
    pub window: u32,
    /// Offset of the first alignment overlapping the window
    pub offset: VirtualOffset,
}

impl LinearIndexEntry {
    pub fn new(window: u32, offset: VirtualOffset) -> Self {
        LinearIndexEntry { window, offset }
    }
}

/// A bin in the hierarchical binning index and its chunks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bin {
    pub bin_id: u32,
    pub chunks: Vec<Chunk>,
}

impl Bin {
    pub fn new(bin_id: u32, chunks: Vec<Chunk>) -> Self {
        Bin { bin_id, chunks }
    }

    pub fn is_metadata(&self) -> bool {
        self.bin_id == METADATA_BIN
    }
}

/// Index content for one reference sequence: bins with their chunks, in the
/// order the source stored them, plus the dense linear index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceContent {
    pub bins: Vec<Bin>,
    pub linear_index: Vec<VirtualOffset>,
}

impl ReferenceContent {
    pub fn new(bins: Vec<Bin>, linear_index: Vec<VirtualOffset>) -> Self {
        ReferenceContent { bins, linear_index }
    }

    /// Build content from a sparse set of linear index entries.
    ///
    /// The linear index is as long as the highest window seen; windows with no
    /// entry take the offset of the closest preceding populated window (or 0).
    pub fn from_linear_entries(bins: Vec<Bin>, entries: &[LinearIndexEntry]) -> Self {
        let len = entries
            .iter()
            .map(|e| e.window as usize + 1)
            .max()
            .unwrap_or(0);
        let mut slots: Vec<Option<VirtualOffset>> = vec![None; len];
        for entry in entries {
            let slot = &mut slots[entry.window as usize];
            // Keep the smallest offset per window
            *slot = Some(match *slot {
                Some(existing) => existing.min(entry.offset),
                None => entry.offset,
            });
        }

        let mut last = VirtualOffset::default();
        let linear_index = slots
            .into_iter()
            .map(|slot| {
                if let Some(offset) = slot {
                    last = offset;
                }
                last
            })
            .collect();

        ReferenceContent { bins, linear_index }
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty() && self.linear_index.is_empty()
    }

    /// Linear index as `(window, offset)` entries in window order
    pub fn linear_entries(&self) -> impl Iterator<Item = LinearIndexEntry> + '_ {
        self.linear_index
            .iter()
            .enumerate()
            .map(|(window, &offset)| LinearIndexEntry::new(window as u32, offset))
    }

    pub fn bin(&self, bin_id: u32) -> Option<&Bin> {
        self.bins.iter().find(|b| b.bin_id == bin_id)
    }

    /// Total chunk count over all bins, metadata bin included
    pub fn chunk_count(&self) -> usize {
        self.bins.iter().map(|b| b.chunks.len()).sum()
    }

    /// Reject content whose bin ids repeat
    pub fn validate(&self) -> Result<()> {
        let mut seen = FxHashSet::default();
        for bin in &self.bins {
            if !seen.insert(bin.bin_id) {
                return Err(IndexError::malformed(
                    0,
                    format!("duplicate bin {} in reference content", bin.bin_id),
                ));
            }
        }
        Ok(())
    }

    /// Bins ascending by id, each bin's chunks ascending by chunk ordering.
    ///
    /// The metadata bin moves with the others but its chunks stay in place:
    /// they are positional fields, not file spans.
    pub fn sorted(&self) -> ReferenceContent {
        let mut bins = self.bins.clone();
        bins.sort_by_key(|b| b.bin_id);
        for bin in bins.iter_mut().filter(|b| !b.is_metadata()) {
            bin.chunks.sort();
        }
        ReferenceContent {
            bins,
            linear_index: self.linear_index.clone(),
        }
    }

    /// True when every linear index offset is >= its predecessor
    pub fn linear_index_is_monotonic(&self) -> bool {
        self.linear_index.windows(2).all(|w| w[0] <= w[1])
    }
}

/// A whole index held in memory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexContents {
    pub references: Vec<ReferenceContent>,
    pub no_coordinate_count: Option<u64>,
}

impl IndexContents {
    pub fn new(references: Vec<ReferenceContent>, no_coordinate_count: Option<u64>) -> Self {
        IndexContents {
            references,
            no_coordinate_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(start: u64, end: u64) -> Chunk {
        Chunk::from_raw(start, end)
    }

    #[test]
    fn test_virtual_offset() {
        let offset = VirtualOffset::new(1024, 512);
        assert_eq!(offset.block_address(), 1024);
        assert_eq!(offset.offset_in_block(), 512);
        assert_eq!(offset.as_raw(), (1024 << 16) | 512);
    }

    #[test]
    fn test_virtual_offset_extremes() {
        for (block, within) in [
            (0u64, 0u16),
            (0, u16::MAX),
            (MAX_BLOCK_ADDRESS - 1, 0),
            (MAX_BLOCK_ADDRESS - 1, u16::MAX),
            (0x1234_5678_9ABC, 0xDEF0),
        ] {
            let offset = VirtualOffset::new(block, within);
            assert_eq!(offset.block_address(), block);
            assert_eq!(offset.offset_in_block(), within);
            assert_eq!(VirtualOffset::from_raw(offset.as_raw()), offset);
        }
    }

    #[test]
    #[should_panic(expected = "exceeds 48 bits")]
    fn test_virtual_offset_block_overflow_panics() {
        VirtualOffset::new(MAX_BLOCK_ADDRESS, 0);
    }

    #[test]
    fn test_virtual_offset_try_new() {
        assert!(VirtualOffset::try_new(MAX_BLOCK_ADDRESS - 1, 65535).is_ok());
        assert!(matches!(
            VirtualOffset::try_new(MAX_BLOCK_ADDRESS, 0),
            Err(IndexError::InvalidVirtualOffset { .. })
        ));
        assert!(matches!(
            VirtualOffset::try_new(0, 65536),
            Err(IndexError::InvalidVirtualOffset { .. })
        ));
    }

    #[test]
    fn test_virtual_offset_ordering() {
        let off1 = VirtualOffset::new(1000, 100);
        let off2 = VirtualOffset::new(1000, 200);
        let off3 = VirtualOffset::new(2000, 100);

        assert!(off1 < off2);
        assert!(off2 < off3);
        assert!(off1 < off3);
    }

    #[test]
    fn test_virtual_offset_display() {
        assert_eq!(VirtualOffset::new(7, 3).to_string(), "7:3");
    }

    #[test]
    fn test_chunk_ordering_start_then_end() {
        assert!(chunk(50, 80) < chunk(100, 200));
        assert!(chunk(100, 150) < chunk(100, 200));
        assert_eq!(chunk(100, 200).cmp(&chunk(100, 200)), std::cmp::Ordering::Equal);
    }

    #[test]
    fn test_chunk_sort_idempotent() {
        let mut chunks = vec![chunk(9, 10), chunk(1, 5), chunk(1, 2), chunk(4, 4)];
        chunks.sort();
        let once = chunks.clone();
        chunks.sort();
        assert_eq!(chunks, once);
        assert_eq!(once, vec![chunk(1, 2), chunk(1, 5), chunk(4, 4), chunk(9, 10)]);
    }

    #[test]
    fn test_sorted_content() {
        let content = ReferenceContent::new(
            vec![
                Bin::new(42, vec![chunk(100, 200), chunk(50, 80)]),
                Bin::new(7, vec![chunk(1, 2)]),
            ],
            vec![VirtualOffset::from_raw(50)],
        );
        let sorted = content.sorted();
        assert_eq!(sorted.bins[0].bin_id, 7);
        assert_eq!(sorted.bins[1].chunks, vec![chunk(50, 80), chunk(100, 200)]);
        // Source untouched
        assert_eq!(content.bins[0].chunks, vec![chunk(100, 200), chunk(50, 80)]);
    }

    #[test]
    fn test_sorted_content_keeps_metadata_chunk_order() {
        // Span first, then the record counts, which compare smaller
        let metadata = vec![chunk(10_000 << 16, 20_000 << 16), chunk(1000, 2)];
        let content = ReferenceContent::new(
            vec![
                Bin::new(METADATA_BIN, metadata.clone()),
                Bin::new(4681, vec![chunk(9, 10), chunk(3, 4)]),
            ],
            Vec::new(),
        );
        let sorted = content.sorted();
        assert_eq!(sorted.bins[0].chunks, vec![chunk(3, 4), chunk(9, 10)]);
        assert!(sorted.bins[1].is_metadata());
        assert_eq!(sorted.bins[1].chunks, metadata);
    }

    #[test]
    fn test_validate_duplicate_bins() {
        let content = ReferenceContent::new(
            vec![Bin::new(1, vec![]), Bin::new(1, vec![])],
            Vec::new(),
        );
        assert!(content.validate().is_err());
    }

    #[test]
    fn test_from_linear_entries_fills_gaps() {
        let entries = [
            LinearIndexEntry::new(1, VirtualOffset::from_raw(100)),
            LinearIndexEntry::new(4, VirtualOffset::from_raw(400)),
            LinearIndexEntry::new(1, VirtualOffset::from_raw(90)),
        ];
        let content = ReferenceContent::from_linear_entries(Vec::new(), &entries);
        let raw: Vec<u64> = content.linear_index.iter().map(|v| v.as_raw()).collect();
        assert_eq!(raw, vec![0, 90, 90, 90, 400]);
        assert!(content.linear_index_is_monotonic());

        let windows: Vec<u32> = content.linear_entries().map(|e| e.window).collect();
        assert_eq!(windows, vec![0, 1, 2, 3, 4]);
    }
}
