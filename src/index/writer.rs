//! The index writer contract.
//!
//! Every encoding follows the same write-once sequence:
//!
//! ```text
//! Created --write_header--> HeaderWritten --write_reference(0..n_ref)--> WritingReferences
//!         --close--> Closed
//! any state --delete_index_file--> Failed
//! ```
//!
//! Output is staged in a temporary file next to the target and only renamed
//! onto the target path by `close`, so a reader never observes a half-written
//! index at that path.

use crate::error::{IndexError, Result};
use crate::index::binary::BinaryIndexWriter;
use crate::index::text::TextIndexWriter;
use crate::index::types::ReferenceContent;
use std::fmt;
use std::fs;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Sequential serializer for a BAM index
pub trait IndexWriter {
    /// Emit the preamble (format marker and `n_ref`). Must be called first, once.
    fn write_header(&mut self) -> Result<()>;

    /// Emit reference `reference`; callers go through `0..n_ref` in order.
    fn write_reference(&mut self, content: &ReferenceContent, reference: usize) -> Result<()>;

    /// Emit the trailing no-coordinate count and move the file into place
    fn close(&mut self, no_coordinate_count: u64) -> Result<()>;

    /// Remove any partial or finished output. Idempotent.
    fn delete_index_file(&mut self) -> Result<()>;
}

/// Where a writer is in the write sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Created,
    HeaderWritten,
    /// `next` is the reference index expected by the next `write_reference`
    WritingReferences { next: usize },
    Closed,
    Failed,
}

impl WriterState {
    fn next_reference(self) -> Option<usize> {
        match self {
            WriterState::HeaderWritten => Some(0),
            WriterState::WritingReferences { next } => Some(next),
            _ => None,
        }
    }
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriterState::Created => write!(f, "no header has been written"),
            WriterState::HeaderWritten => write!(f, "expecting reference 0"),
            WriterState::WritingReferences { next } => write!(f, "expecting reference {}", next),
            WriterState::Closed => write!(f, "closed"),
            WriterState::Failed => write!(f, "deleted"),
        }
    }
}

pub(crate) type Sink = BufWriter<NamedTempFile>;

/// Temporary file that becomes the target on commit
struct StagedOutput {
    target: PathBuf,
    out: Option<Sink>,
}

impl StagedOutput {
    fn new(target: &Path) -> Self {
        Self {
            target: target.to_path_buf(),
            out: None,
        }
    }

    fn staging_dir(&self) -> &Path {
        match self.target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Unlink whatever is at the target, then open a fresh staging file
    fn create(&mut self, capacity: usize) -> io::Result<()> {
        remove_if_exists(&self.target)?;
        let temp = tempfile::Builder::new()
            .prefix(".baix-")
            .suffix(".tmp")
            .tempfile_in(self.staging_dir())?;
        self.out = Some(BufWriter::with_capacity(capacity, temp));
        Ok(())
    }

    fn sink(&mut self) -> Option<&mut Sink> {
        self.out.as_mut()
    }

    fn commit(&mut self) -> io::Result<()> {
        let Some(out) = self.out.take() else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no staged output"));
        };
        let temp = out.into_inner().map_err(|e| e.into_error())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.target).map_err(|e| e.error)?;
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        if let Some(out) = self.out.take() {
            let (temp, _) = out.into_parts();
            let temp_path = temp.path().to_path_buf();
            temp.close().map_err(|source| IndexError::CleanupFailure {
                path: temp_path,
                source,
            })?;
        }
        remove_if_exists(&self.target).map_err(|source| IndexError::CleanupFailure {
            path: self.target.clone(),
            source,
        })
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// State machine and staged output shared by the concrete writers.
///
/// The encoders passed in only produce bytes; sequencing, error wrapping and
/// the file lifecycle live here.
pub(crate) struct WriterCore {
    n_ref: usize,
    state: WriterState,
    /// Set once an encoder fails; only deletion is allowed afterwards
    poisoned: bool,
    output: StagedOutput,
}

impl WriterCore {
    pub(crate) fn new(target: &Path, n_ref: usize) -> Self {
        Self {
            n_ref,
            state: WriterState::Created,
            poisoned: false,
            output: StagedOutput::new(target),
        }
    }

    pub(crate) fn n_ref(&self) -> usize {
        self.n_ref
    }

    pub(crate) fn state(&self) -> WriterState {
        self.state
    }

    pub(crate) fn target(&self) -> &Path {
        &self.output.target
    }

    fn violation(&self, operation: &'static str) -> IndexError {
        let state = if self.poisoned {
            format!("{} after a failed write", self.state)
        } else {
            self.state.to_string()
        };
        IndexError::ProtocolViolation { operation, state }
    }

    fn run<F>(&mut self, what: String, encode: F) -> Result<()>
    where
        F: FnOnce(&mut Sink) -> io::Result<()>,
    {
        let result = match self.output.sink() {
            Some(sink) => encode(sink),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no staged output")),
        };
        result.map_err(|source| {
            self.poisoned = true;
            IndexError::write_failure(what, source)
        })
    }

    pub(crate) fn header<F>(&mut self, capacity: usize, encode: F) -> Result<()>
    where
        F: FnOnce(&mut Sink) -> io::Result<()>,
    {
        if self.poisoned || self.state != WriterState::Created {
            return Err(self.violation("write_header"));
        }
        if let Err(source) = self.output.create(capacity) {
            self.poisoned = true;
            return Err(IndexError::write_failure(
                format!("index file {}", self.output.target.display()),
                source,
            ));
        }
        self.run("index header".to_string(), encode)?;
        self.state = WriterState::HeaderWritten;
        debug!(path = %self.output.target.display(), n_ref = self.n_ref, "wrote header");
        Ok(())
    }

    pub(crate) fn reference<F>(&mut self, reference: usize, encode: F) -> Result<()>
    where
        F: FnOnce(&mut Sink) -> io::Result<()>,
    {
        match self.state.next_reference() {
            Some(next) if !self.poisoned && next == reference && reference < self.n_ref => {}
            _ => return Err(self.violation("write_reference")),
        }
        self.run(format!("reference {}", reference), encode)?;
        self.state = WriterState::WritingReferences {
            next: reference + 1,
        };
        debug!(reference, "wrote reference");
        Ok(())
    }

    pub(crate) fn close<F>(&mut self, encode: F) -> Result<()>
    where
        F: FnOnce(&mut Sink) -> io::Result<()>,
    {
        match self.state.next_reference() {
            Some(next) if !self.poisoned && next == self.n_ref => {}
            _ => return Err(self.violation("close")),
        }
        self.run("no-coordinate count".to_string(), encode)?;
        if let Err(source) = self.output.commit() {
            self.poisoned = true;
            return Err(IndexError::write_failure(
                format!("index file {}", self.output.target.display()),
                source,
            ));
        }
        self.state = WriterState::Closed;
        info!(path = %self.output.target.display(), "index written");
        Ok(())
    }

    pub(crate) fn delete(&mut self) -> Result<()> {
        self.state = WriterState::Failed;
        self.output.discard()
    }
}

/// The closed set of index encodings
pub enum AnyIndexWriter {
    Text(TextIndexWriter),
    Binary(BinaryIndexWriter),
}

impl AnyIndexWriter {
    pub fn state(&self) -> WriterState {
        match self {
            AnyIndexWriter::Text(w) => w.state(),
            AnyIndexWriter::Binary(w) => w.state(),
        }
    }

    pub fn target(&self) -> &Path {
        match self {
            AnyIndexWriter::Text(w) => w.target(),
            AnyIndexWriter::Binary(w) => w.target(),
        }
    }
}

impl IndexWriter for AnyIndexWriter {
    fn write_header(&mut self) -> Result<()> {
        match self {
            AnyIndexWriter::Text(w) => w.write_header(),
            AnyIndexWriter::Binary(w) => w.write_header(),
        }
    }

    fn write_reference(&mut self, content: &ReferenceContent, reference: usize) -> Result<()> {
        match self {
            AnyIndexWriter::Text(w) => w.write_reference(content, reference),
            AnyIndexWriter::Binary(w) => w.write_reference(content, reference),
        }
    }

    fn close(&mut self, no_coordinate_count: u64) -> Result<()> {
        match self {
            AnyIndexWriter::Text(w) => w.close(no_coordinate_count),
            AnyIndexWriter::Binary(w) => w.close(no_coordinate_count),
        }
    }

    fn delete_index_file(&mut self) -> Result<()> {
        match self {
            AnyIndexWriter::Text(w) => w.delete_index_file(),
            AnyIndexWriter::Binary(w) => w.delete_index_file(),
        }
    }
}
