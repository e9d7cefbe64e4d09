use crate::error::{IndexError, Result};
use crate::index::binning::{linear_window, optimize_chunk_list, region_to_bins};
use crate::index::text::parse_text_index;
use crate::index::types::*;
use crate::utils::ByteCursor;
use memmap2::Mmap;
use rustc_hash::FxHashSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::ops::Deref;
use std::path::Path;
use tracing::debug;

/// Anything that can hand out per-reference index content in order
pub trait IndexSource {
    /// Number of references (`n_ref`)
    fn reference_count(&self) -> usize;

    /// Content of reference `reference`; `ReferenceOutOfRange` outside `[0, n_ref)`
    fn content_for(&self, reference: usize) -> Result<ReferenceContent>;

    /// Count of records without a coordinate, if the index records one
    fn no_coordinate_count(&self) -> Option<u64>;
}

impl IndexSource for IndexContents {
    fn reference_count(&self) -> usize {
        self.references.len()
    }

    fn content_for(&self, reference: usize) -> Result<ReferenceContent> {
        self.references
            .get(reference)
            .cloned()
            .ok_or(IndexError::ReferenceOutOfRange {
                reference,
                count: self.references.len(),
            })
    }

    fn no_coordinate_count(&self) -> Option<u64> {
        self.no_coordinate_count
    }
}

enum IndexData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for IndexData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            IndexData::Mapped(map) => map,
            IndexData::Owned(bytes) => bytes,
        }
    }
}

/// Memory-mapped reader for binary BAM indexes.
///
/// The whole file is validated when opened; afterwards each reference can be
/// decoded independently from its recorded byte position.
pub struct IndexReader {
    data: IndexData,
    /// Byte position of each reference's `n_bin` field
    reference_offsets: Vec<usize>,
    no_coordinate_count: Option<u64>,
}

impl IndexReader {
    /// Open and validate a binary index file
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let data = if file.metadata()?.len() == 0 {
            IndexData::Owned(Vec::new())
        } else {
            IndexData::Mapped(unsafe { Mmap::map(&file)? })
        };
        let reader = Self::from_data(data)?;
        debug!(
            path = %path.display(),
            references = reader.reference_count(),
            "opened index"
        );
        Ok(reader)
    }

    /// Validate and read an index held in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_data(IndexData::Owned(bytes))
    }

    fn from_data(data: IndexData) -> Result<Self> {
        let (reference_offsets, no_coordinate_count) = scan(&data)?;
        Ok(Self {
            data,
            reference_offsets,
            no_coordinate_count,
        })
    }

    /// Size of the underlying index in bytes
    pub fn byte_len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Decode every reference into memory
    pub fn to_contents(&self) -> Result<IndexContents> {
        let references = (0..self.reference_count())
            .map(|i| self.content_for(i))
            .collect::<Result<Vec<_>>>()?;
        Ok(IndexContents::new(references, self.no_coordinate_count))
    }

    /// Chunks to scan for alignments overlapping a 1-based inclusive region.
    ///
    /// Chunks ending before the linear-index minimum for `start` are dropped and
    /// the rest are sorted and coalesced.
    pub fn query_chunks(&self, reference: usize, start: i64, end: i64) -> Result<Vec<Chunk>> {
        let content = self.content_for(reference)?;
        let Some(region_bins) = region_to_bins(start, end) else {
            return Ok(Vec::new());
        };

        let chunks: Vec<Chunk> = content
            .bins
            .iter()
            .filter(|bin| region_bins.contains(bin.bin_id))
            .flat_map(|bin| bin.chunks.iter().copied())
            .collect();
        if chunks.is_empty() {
            return Ok(chunks);
        }

        let first = u32::try_from(start.max(1) - 1).unwrap_or(u32::MAX);
        let window = linear_window(first);
        let min_offset = content
            .linear_index
            .get(window)
            .map(|v| v.as_raw())
            .unwrap_or(0);

        Ok(optimize_chunk_list(chunks, min_offset))
    }

    /// Last linear index offset of the last reference that has one.
    ///
    /// Useful to seek close to the unplaced records at the end of a BAM file.
    pub fn start_of_last_linear_bin(&self) -> Result<Option<VirtualOffset>> {
        for reference in (0..self.reference_count()).rev() {
            let content = self.content_for(reference)?;
            if let Some(&last) = content.linear_index.last() {
                return Ok(Some(last));
            }
        }
        Ok(None)
    }
}

impl IndexSource for IndexReader {
    fn reference_count(&self) -> usize {
        self.reference_offsets.len()
    }

    fn content_for(&self, reference: usize) -> Result<ReferenceContent> {
        let &offset =
            self.reference_offsets
                .get(reference)
                .ok_or(IndexError::ReferenceOutOfRange {
                    reference,
                    count: self.reference_offsets.len(),
                })?;
        read_reference(&mut ByteCursor::at(&self.data, offset))
    }

    fn no_coordinate_count(&self) -> Option<u64> {
        self.no_coordinate_count
    }
}

/// Walk the whole index once, checking structure and recording where each
/// reference starts.
fn scan(buf: &[u8]) -> Result<(Vec<usize>, Option<u64>)> {
    let mut cursor = ByteCursor::new(buf);
    let magic = cursor.take(4, "magic")?;
    if magic != BAI_MAGIC {
        return Err(IndexError::malformed(
            0,
            format!("invalid BAI magic bytes: expected 'BAI\\x01', got {:?}", magic),
        ));
    }

    let n_ref = cursor.read_count("n_ref")?;
    // Every reference needs at least 8 bytes
    if n_ref > cursor.remaining() / 8 {
        return Err(IndexError::malformed(
            4,
            format!("n_ref {} exceeds what {} bytes can hold", n_ref, buf.len()),
        ));
    }

    let mut offsets = Vec::with_capacity(n_ref);
    let mut seen_bins = FxHashSet::default();
    for _ in 0..n_ref {
        offsets.push(cursor.position());
        seen_bins.clear();

        let n_bin_pos = cursor.position();
        let n_bin = cursor.read_count("n_bin")?;
        if n_bin > METADATA_BIN as usize + 1 {
            return Err(IndexError::malformed(
                n_bin_pos,
                format!("n_bin {} exceeds the number of possible bins", n_bin),
            ));
        }
        for _ in 0..n_bin {
            let bin_pos = cursor.position();
            let bin_id = cursor.read_u32_le("bin")?;
            if bin_id > METADATA_BIN {
                return Err(IndexError::malformed(
                    bin_pos,
                    format!("bin id {} out of range", bin_id),
                ));
            }
            if !seen_bins.insert(bin_id) {
                return Err(IndexError::malformed(
                    bin_pos,
                    format!("duplicate bin {}", bin_id),
                ));
            }
            let n_chunk = cursor.read_count("n_chunk")?;
            cursor.skip_records(n_chunk, 16, "chunks")?;
        }

        let n_intv_pos = cursor.position();
        let n_intv = cursor.read_count("n_intv")?;
        if n_intv > MAX_LINEAR_WINDOWS {
            return Err(IndexError::malformed(
                n_intv_pos,
                format!("n_intv {} exceeds {} windows", n_intv, MAX_LINEAR_WINDOWS),
            ));
        }
        cursor.skip_records(n_intv, 8, "linear index")?;
    }

    let no_coordinate_count = match cursor.remaining() {
        0 => None,
        8 => Some(cursor.read_u64_le("n_no_coor")?),
        n => {
            return Err(IndexError::malformed(
                cursor.position(),
                format!("{} unexpected trailing bytes", n),
            ));
        }
    };

    Ok((offsets, no_coordinate_count))
}

/// Decode one reference; the structure was already checked by `scan`
fn read_reference(cursor: &mut ByteCursor<'_>) -> Result<ReferenceContent> {
    let n_bin = cursor.read_count("n_bin")?;
    let mut bins = Vec::with_capacity(n_bin);
    for _ in 0..n_bin {
        let bin_id = cursor.read_u32_le("bin")?;
        let n_chunk = cursor.read_count("n_chunk")?;
        let mut chunks = Vec::with_capacity(n_chunk);
        for _ in 0..n_chunk {
            let start = cursor.read_u64_le("chunk_beg")?;
            let end = cursor.read_u64_le("chunk_end")?;
            chunks.push(Chunk::from_raw(start, end));
        }
        bins.push(Bin::new(bin_id, chunks));
    }

    let n_intv = cursor.read_count("n_intv")?;
    let mut linear_index = Vec::with_capacity(n_intv);
    for _ in 0..n_intv {
        linear_index.push(VirtualOffset::from_raw(cursor.read_u64_le("ioffset")?));
    }

    Ok(ReferenceContent::new(bins, linear_index))
}

/// True when the first bytes are the binary magic. Short reads are retried.
fn starts_with_magic<R: Read>(reader: R) -> io::Result<bool> {
    let mut head = Vec::with_capacity(BAI_MAGIC.len());
    reader.take(BAI_MAGIC.len() as u64).read_to_end(&mut head)?;
    Ok(head == BAI_MAGIC)
}

/// An index opened from either encoding
pub enum SourceIndex {
    Binary(IndexReader),
    Text(IndexContents),
}

impl SourceIndex {
    /// Open an index, choosing the decoder from the file's first bytes
    pub fn open(path: &Path) -> Result<Self> {
        let is_binary = starts_with_magic(File::open(path)?)?;

        if is_binary {
            return Ok(SourceIndex::Binary(IndexReader::open(path)?));
        }
        let text = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::InvalidData {
                IndexError::malformed(0, "neither a binary index nor UTF-8 text")
            } else {
                IndexError::Io(e)
            }
        })?;
        debug!(path = %path.display(), "reading text index");
        Ok(SourceIndex::Text(parse_text_index(&text)?))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, SourceIndex::Text(_))
    }

    pub fn to_contents(&self) -> Result<IndexContents> {
        match self {
            SourceIndex::Binary(reader) => reader.to_contents(),
            SourceIndex::Text(contents) => Ok(contents.clone()),
        }
    }
}

impl IndexSource for SourceIndex {
    fn reference_count(&self) -> usize {
        match self {
            SourceIndex::Binary(reader) => reader.reference_count(),
            SourceIndex::Text(contents) => contents.reference_count(),
        }
    }

    fn content_for(&self, reference: usize) -> Result<ReferenceContent> {
        match self {
            SourceIndex::Binary(reader) => reader.content_for(reference),
            SourceIndex::Text(contents) => contents.content_for(reference),
        }
    }

    fn no_coordinate_count(&self) -> Option<u64> {
        match self {
            SourceIndex::Binary(reader) => reader.no_coordinate_count(),
            SourceIndex::Text(contents) => contents.no_coordinate_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{write_count_le, write_u32_le, write_u64_le};

    fn encode(contents: &IndexContents) -> Vec<u8> {
        let mut buf = BAI_MAGIC.to_vec();
        write_count_le(&mut buf, contents.references.len()).unwrap();
        for reference in &contents.references {
            write_count_le(&mut buf, reference.bins.len()).unwrap();
            for bin in &reference.bins {
                write_u32_le(&mut buf, bin.bin_id).unwrap();
                write_count_le(&mut buf, bin.chunks.len()).unwrap();
                for chunk in &bin.chunks {
                    write_u64_le(&mut buf, chunk.start.as_raw()).unwrap();
                    write_u64_le(&mut buf, chunk.end.as_raw()).unwrap();
                }
            }
            write_count_le(&mut buf, reference.linear_index.len()).unwrap();
            for offset in &reference.linear_index {
                write_u64_le(&mut buf, offset.as_raw()).unwrap();
            }
        }
        if let Some(count) = contents.no_coordinate_count {
            write_u64_le(&mut buf, count).unwrap();
        }
        buf
    }

    fn sample() -> IndexContents {
        let vo = |block: u64| VirtualOffset::new(block, 0);
        IndexContents::new(
            vec![
                ReferenceContent::new(
                    vec![
                        Bin::new(4681, vec![Chunk::new(vo(1), vo(3))]),
                        Bin::new(4682, vec![Chunk::new(vo(20), vo(22))]),
                        Bin::new(0, vec![Chunk::new(vo(40), vo(41))]),
                    ],
                    vec![vo(1), vo(20)],
                ),
                ReferenceContent::default(),
            ],
            Some(57),
        )
    }

    #[test]
    fn test_reads_contents() {
        let contents = sample();
        let bytes = encode(&contents);
        let len = bytes.len() as u64;
        let reader = IndexReader::from_bytes(bytes).unwrap();
        assert_eq!(reader.byte_len(), len);
        assert_eq!(reader.reference_count(), 2);
        assert_eq!(reader.no_coordinate_count(), Some(57));
        assert_eq!(reader.to_contents().unwrap(), contents);
    }

    #[test]
    fn test_missing_no_coordinate_count() {
        let mut contents = sample();
        contents.no_coordinate_count = None;
        let reader = IndexReader::from_bytes(encode(&contents)).unwrap();
        assert_eq!(reader.no_coordinate_count(), None);
    }

    #[test]
    fn test_content_for_out_of_range() {
        let reader = IndexReader::from_bytes(encode(&sample())).unwrap();
        assert!(matches!(
            reader.content_for(2),
            Err(IndexError::ReferenceOutOfRange {
                reference: 2,
                count: 2
            })
        ));
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = encode(&sample());
        bytes[3] = 2;
        assert!(matches!(
            IndexReader::from_bytes(bytes),
            Err(IndexError::MalformedSourceIndex { position: 0, .. })
        ));
    }

    /// Reader that hands out one byte per call
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match (self.0.split_first(), buf.first_mut()) {
                (Some((&byte, rest)), Some(slot)) => {
                    *slot = byte;
                    self.0 = rest;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    #[test]
    fn test_magic_sniff_survives_short_reads() {
        assert!(starts_with_magic(Trickle(b"BAI\x01\x00\x00\x00\x00")).unwrap());
        assert!(!starts_with_magic(Trickle(b"BAI")).unwrap());
        assert!(!starts_with_magic(Trickle(b"format=bai-text/1")).unwrap());
        assert!(!starts_with_magic(Trickle(b"")).unwrap());
    }

    #[test]
    fn test_truncated_index() {
        let bytes = encode(&sample());
        for len in [0, 3, 7, 12, bytes.len() - 9] {
            assert!(
                matches!(
                    IndexReader::from_bytes(bytes[..len].to_vec()),
                    Err(IndexError::MalformedSourceIndex { .. })
                ),
                "length {} should be rejected",
                len
            );
        }
    }

    #[test]
    fn test_trailing_garbage() {
        let mut bytes = encode(&sample());
        bytes.push(0);
        assert!(IndexReader::from_bytes(bytes).is_err());
    }

    #[test]
    fn test_duplicate_bin_rejected() {
        let mut contents = sample();
        contents.references[0].bins[1].bin_id = 4681;
        assert!(matches!(
            IndexReader::from_bytes(encode(&contents)),
            Err(IndexError::MalformedSourceIndex { .. })
        ));
    }

    #[test]
    fn test_bin_id_out_of_range() {
        let mut contents = sample();
        contents.references[0].bins[0].bin_id = METADATA_BIN + 1;
        assert!(IndexReader::from_bytes(encode(&contents)).is_err());
    }

    #[test]
    fn test_query_chunks() {
        let reader = IndexReader::from_bytes(encode(&sample())).unwrap();

        // First 16 KiB window: bin 4681 plus the level-0 bin
        let chunks = reader.query_chunks(0, 1, 100).unwrap();
        assert_eq!(
            chunks,
            vec![
                Chunk::new(VirtualOffset::new(1, 0), VirtualOffset::new(3, 0)),
                Chunk::new(VirtualOffset::new(40, 0), VirtualOffset::new(41, 0)),
            ]
        );

        // Second window: linear index drops chunks ending before block 20
        let chunks = reader.query_chunks(0, 16385, 16400).unwrap();
        assert_eq!(
            chunks,
            vec![
                Chunk::new(VirtualOffset::new(20, 0), VirtualOffset::new(22, 0)),
                Chunk::new(VirtualOffset::new(40, 0), VirtualOffset::new(41, 0)),
            ]
        );

        assert!(reader.query_chunks(1, 1, 100).unwrap().is_empty());
        assert!(reader.query_chunks(0, 100, 1).unwrap().is_empty());
        assert!(reader.query_chunks(5, 1, 100).is_err());
    }

    #[test]
    fn test_start_of_last_linear_bin() {
        let reader = IndexReader::from_bytes(encode(&sample())).unwrap();
        assert_eq!(
            reader.start_of_last_linear_bin().unwrap(),
            Some(VirtualOffset::new(20, 0))
        );

        let empty = IndexContents::new(vec![ReferenceContent::default()], None);
        let reader = IndexReader::from_bytes(encode(&empty)).unwrap();
        assert_eq!(reader.start_of_last_linear_bin().unwrap(), None);
    }
}
