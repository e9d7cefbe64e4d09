//! Human-readable index rendering and its parser.
//!
//! ```text
//! format=bai-text/1
//! n_ref=2
//! reference 0 n_bin=1
//! bin 4681 n_chunk=1    # loci 1-16384
//! chunk 65536 196608    # 1:0-3:0
//! reference 0 n_intv=1
//! intv 0 65536          # 1:0
//! reference 1 n_bin=0
//! reference 1 n_intv=0
//! n_no_coor=57
//! ```
//!
//! Offsets are written as raw 64-bit virtual offsets so the rendering is exact;
//! everything after `#` is a comment. Bins and chunks appear in the order they
//! are handed to the writer, so two renderings can be diffed line by line.

use crate::error::{IndexError, Result};
use crate::index::binning::{first_locus_in_bin, last_locus_in_bin};
use crate::index::types::*;
use crate::index::writer::{IndexWriter, WriterCore, WriterState};
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;

/// First line of every text index
pub const TEXT_FORMAT_LINE: &str = "format=bai-text/1";

const TEXT_BUFFER_SIZE: usize = 64 * 1024;

pub struct TextIndexWriter {
    core: WriterCore,
    sort_bins: bool,
}

impl TextIndexWriter {
    pub fn new(output: &Path, n_ref: usize, sort_bins: bool) -> Self {
        Self {
            core: WriterCore::new(output, n_ref),
            sort_bins,
        }
    }

    pub fn state(&self) -> WriterState {
        self.core.state()
    }

    pub fn target(&self) -> &Path {
        self.core.target()
    }
}

impl IndexWriter for TextIndexWriter {
    fn write_header(&mut self) -> Result<()> {
        let n_ref = self.core.n_ref();
        self.core.header(TEXT_BUFFER_SIZE, |out| {
            writeln!(out, "{}", TEXT_FORMAT_LINE)?;
            writeln!(out, "n_ref={}", n_ref)
        })
    }

    fn write_reference(&mut self, content: &ReferenceContent, reference: usize) -> Result<()> {
        let sort_bins = self.sort_bins;
        self.core.reference(reference, |out| {
            if sort_bins {
                render_reference(out, &content.sorted(), reference)
            } else {
                render_reference(out, content, reference)
            }
        })
    }

    fn close(&mut self, no_coordinate_count: u64) -> Result<()> {
        self.core
            .close(|out| writeln!(out, "n_no_coor={}", no_coordinate_count))
    }

    fn delete_index_file(&mut self) -> Result<()> {
        self.core.delete()
    }
}

fn render_reference<W: Write>(
    out: &mut W,
    content: &ReferenceContent,
    reference: usize,
) -> io::Result<()> {
    writeln!(out, "reference {} n_bin={}", reference, content.bins.len())?;
    for bin in &content.bins {
        match (first_locus_in_bin(bin.bin_id), last_locus_in_bin(bin.bin_id)) {
            (Some(first), Some(last)) => writeln!(
                out,
                "bin {} n_chunk={}    # loci {}-{}",
                bin.bin_id,
                bin.chunks.len(),
                first,
                last
            )?,
            _ => writeln!(out, "bin {} n_chunk={}", bin.bin_id, bin.chunks.len())?,
        }
        for (i, chunk) in bin.chunks.iter().enumerate() {
            let (start, end) = (chunk.start.as_raw(), chunk.end.as_raw());
            if bin.is_metadata() && i == 1 {
                // Record counts, not offsets
                writeln!(
                    out,
                    "chunk {} {}    # aligned={} unaligned={}",
                    start, end, start, end
                )?;
            } else {
                writeln!(out, "chunk {} {}    # {}", start, end, chunk)?;
            }
        }
    }

    writeln!(
        out,
        "reference {} n_intv={}",
        reference,
        content.linear_index.len()
    )?;
    for entry in content.linear_entries() {
        writeln!(
            out,
            "intv {} {}    # {}",
            entry.window,
            entry.offset.as_raw(),
            entry.offset
        )?;
    }
    Ok(())
}

/// Significant lines of a text index: comments stripped, blanks dropped
struct Lines<'a> {
    lines: Vec<(usize, &'a str)>,
    next: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        let lines = text
            .lines()
            .enumerate()
            .filter_map(|(i, line)| {
                let line = line.split('#').next().unwrap_or_default().trim();
                (!line.is_empty()).then_some((i + 1, line))
            })
            .collect();
        Self { lines, next: 0 }
    }

    fn last_line(&self) -> usize {
        self.lines.last().map(|&(n, _)| n).unwrap_or(0)
    }

    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.next).map(|&(_, line)| line)
    }

    /// Next line split into fields, which must start with `keyword` and have
    /// `arity` fields in total
    fn next_line(&mut self, keyword: &str, arity: usize) -> Result<(usize, Vec<&'a str>)> {
        let Some(&(line_no, line)) = self.lines.get(self.next) else {
            return Err(IndexError::malformed(
                self.last_line(),
                format!("unexpected end of input, expected '{}'", keyword),
            ));
        };
        let fields: Vec<&str> = line.split_whitespace().collect();
        let matches_keyword = fields[0] == keyword || fields[0].split('=').next() == Some(keyword);
        if !matches_keyword || fields.len() != arity {
            return Err(IndexError::malformed(
                line_no,
                format!("expected '{}' line, found '{}'", keyword, line),
            ));
        }
        self.next += 1;
        Ok((line_no, fields))
    }
}

fn number<T: FromStr>(line_no: usize, token: &str, what: &str) -> Result<T> {
    token
        .parse()
        .map_err(|_| IndexError::malformed(line_no, format!("invalid {} '{}'", what, token)))
}

/// Value of a `key=value` token
fn keyed<T: FromStr>(line_no: usize, token: &str, key: &str) -> Result<T> {
    match token.split_once('=') {
        Some((k, value)) if k == key => number(line_no, value, key),
        _ => Err(IndexError::malformed(
            line_no,
            format!("expected '{}=<n>', found '{}'", key, token),
        )),
    }
}

fn expect_reference(line_no: usize, token: &str, reference: usize) -> Result<()> {
    let found: usize = number(line_no, token, "reference")?;
    if found != reference {
        return Err(IndexError::malformed(
            line_no,
            format!("expected reference {}, found {}", reference, found),
        ));
    }
    Ok(())
}

/// Parse a text rendering back into index content
pub fn parse_text_index(text: &str) -> Result<IndexContents> {
    let mut lines = Lines::new(text);

    let (line_no, fields) = lines.next_line("format", 1)?;
    if fields[0] != TEXT_FORMAT_LINE {
        return Err(IndexError::malformed(
            line_no,
            format!("unsupported text index format '{}'", fields[0]),
        ));
    }

    let (line_no, fields) = lines.next_line("n_ref", 1)?;
    let n_ref: usize = keyed(line_no, fields[0], "n_ref")?;

    let mut references = Vec::new();
    for reference in 0..n_ref {
        references.push(parse_reference(&mut lines, reference)?);
    }

    let no_coordinate_count = match lines.peek() {
        Some(_) => {
            let (line_no, fields) = lines.next_line("n_no_coor", 1)?;
            Some(keyed(line_no, fields[0], "n_no_coor")?)
        }
        None => None,
    };

    if let Some(&(line_no, line)) = lines.lines.get(lines.next) {
        return Err(IndexError::malformed(
            line_no,
            format!("unexpected trailing line '{}'", line),
        ));
    }

    Ok(IndexContents::new(references, no_coordinate_count))
}

fn parse_reference(lines: &mut Lines<'_>, reference: usize) -> Result<ReferenceContent> {
    let (line_no, fields) = lines.next_line("reference", 3)?;
    expect_reference(line_no, fields[1], reference)?;
    let n_bin: usize = keyed(line_no, fields[2], "n_bin")?;
    if n_bin > METADATA_BIN as usize + 1 {
        return Err(IndexError::malformed(
            line_no,
            format!("n_bin {} exceeds the number of possible bins", n_bin),
        ));
    }

    let mut bins = Vec::with_capacity(n_bin);
    for _ in 0..n_bin {
        let (line_no, fields) = lines.next_line("bin", 3)?;
        let bin_id: u32 = number(line_no, fields[1], "bin id")?;
        if bin_id > METADATA_BIN {
            return Err(IndexError::malformed(
                line_no,
                format!("bin id {} out of range", bin_id),
            ));
        }
        let n_chunk: usize = keyed(line_no, fields[2], "n_chunk")?;
        let mut chunks = Vec::new();
        for _ in 0..n_chunk {
            let (line_no, fields) = lines.next_line("chunk", 3)?;
            chunks.push(Chunk::from_raw(
                number(line_no, fields[1], "chunk start")?,
                number(line_no, fields[2], "chunk end")?,
            ));
        }
        bins.push(Bin::new(bin_id, chunks));
    }

    let (line_no, fields) = lines.next_line("reference", 3)?;
    expect_reference(line_no, fields[1], reference)?;
    let n_intv: u32 = keyed(line_no, fields[2], "n_intv")?;
    if n_intv as usize > MAX_LINEAR_WINDOWS {
        return Err(IndexError::malformed(
            line_no,
            format!("n_intv {} exceeds {} windows", n_intv, MAX_LINEAR_WINDOWS),
        ));
    }

    let mut entries = Vec::new();
    for _ in 0..n_intv {
        let (line_no, fields) = lines.next_line("intv", 3)?;
        let window: u32 = number(line_no, fields[1], "window")?;
        if window >= n_intv {
            return Err(IndexError::malformed(
                line_no,
                format!("window {} outside n_intv={}", window, n_intv),
            ));
        }
        let offset: u64 = number(line_no, fields[2], "offset")?;
        entries.push(LinearIndexEntry::new(window, VirtualOffset::from_raw(offset)));
    }

    let mut content = ReferenceContent::from_linear_entries(bins, &entries);
    // Trailing windows named by n_intv but absent from the entries
    let fill = content.linear_index.last().copied().unwrap_or_default();
    content.linear_index.resize(n_intv as usize, fill);
    content.validate()?;
    Ok(content)
}
