//! Binary (`.bai`) index writer.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! magic       "BAI\1"
//! n_ref       i32
//! per reference:
//!   n_bin     i32
//!   per bin:  bin u32, n_chunk i32, n_chunk x (chunk_beg u64, chunk_end u64)
//!   n_intv    i32
//!   ioffset   n_intv x u64
//! n_no_coor   u64
//! ```

use crate::error::Result;
use crate::index::types::{BAI_MAGIC, ReferenceContent};
use crate::index::writer::{IndexWriter, WriterCore, WriterState};
use crate::utils::{write_count_le, write_u32_le, write_u64_le};
use std::io::{self, Write};
use std::path::Path;

/// Upper bound on the output buffer
pub const MAX_BUFFER_SIZE: usize = 1_000_000;

/// Output buffer size for an index of a BAM file of `bam_file_size` bytes.
/// A size of 0 means unknown.
pub fn buffer_capacity(bam_file_size: u64) -> usize {
    if bam_file_size == 0 {
        MAX_BUFFER_SIZE
    } else {
        bam_file_size.min(MAX_BUFFER_SIZE as u64) as usize
    }
}

pub struct BinaryIndexWriter {
    core: WriterCore,
    sort_bins: bool,
    buffer_capacity: usize,
}

impl BinaryIndexWriter {
    pub fn new(output: &Path, n_ref: usize, sort_bins: bool, bam_file_size: u64) -> Self {
        Self {
            core: WriterCore::new(output, n_ref),
            sort_bins,
            buffer_capacity: buffer_capacity(bam_file_size),
        }
    }

    pub fn state(&self) -> WriterState {
        self.core.state()
    }

    pub fn target(&self) -> &Path {
        self.core.target()
    }
}

impl IndexWriter for BinaryIndexWriter {
    fn write_header(&mut self) -> Result<()> {
        let n_ref = self.core.n_ref();
        self.core
            .header(self.buffer_capacity, |out| encode_header(out, n_ref))
    }

    fn write_reference(&mut self, content: &ReferenceContent, reference: usize) -> Result<()> {
        let sort_bins = self.sort_bins;
        self.core.reference(reference, |out| {
            if sort_bins {
                encode_reference(out, &content.sorted())
            } else {
                encode_reference(out, content)
            }
        })
    }

    fn close(&mut self, no_coordinate_count: u64) -> Result<()> {
        self.core
            .close(|out| write_u64_le(out, no_coordinate_count))
    }

    fn delete_index_file(&mut self) -> Result<()> {
        self.core.delete()
    }
}

pub(crate) fn encode_header<W: Write>(out: &mut W, n_ref: usize) -> io::Result<()> {
    out.write_all(&BAI_MAGIC)?;
    write_count_le(out, n_ref)
}

pub(crate) fn encode_reference<W: Write>(out: &mut W, content: &ReferenceContent) -> io::Result<()> {
    write_count_le(out, content.bins.len())?;
    for bin in &content.bins {
        write_u32_le(out, bin.bin_id)?;
        write_count_le(out, bin.chunks.len())?;
        for chunk in &bin.chunks {
            write_u64_le(out, chunk.start.as_raw())?;
            write_u64_le(out, chunk.end.as_raw())?;
        }
    }
    write_count_le(out, content.linear_index.len())?;
    for offset in &content.linear_index {
        write_u64_le(out, offset.as_raw())?;
    }
    Ok(())
}
