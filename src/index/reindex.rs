//! Rewriting an existing index as text or as a (re-sorted) binary index.
//!
//! A rewrite either produces a complete index at the output path or leaves
//! nothing there: every failure after the writer is created runs
//! [`IndexWriter::delete_index_file`] before the error reaches the caller.

use crate::error::{IndexError, Result};
use crate::index::binary::BinaryIndexWriter;
use crate::index::reader::{IndexSource, SourceIndex};
use crate::index::text::TextIndexWriter;
use crate::index::writer::{AnyIndexWriter, IndexWriter};
use crate::utils::progress::{ProgressBar, reference_bar};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// What to rewrite and how
#[derive(Debug, Clone, Default)]
pub struct ReindexOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Emit the text rendering instead of a binary index
    pub text: bool,
    /// Sort chunks within each bin and bins by id
    pub sort_bins: bool,
    /// Replaces the source's no-coordinate count when set
    pub no_coordinate_count: Option<u64>,
    /// Size of the BAM file the index describes; defaults to the input's size
    pub bam_file_size: Option<u64>,
    /// Draw a progress bar on stderr
    pub progress: bool,
}

/// Counts of what a rewrite emitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReindexTotals {
    pub references: usize,
    pub bins: usize,
    pub chunks: usize,
    pub no_coordinate_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexSummary {
    pub output: PathBuf,
    pub totals: ReindexTotals,
}

/// Rewrite `options.input` into `options.output`
pub fn reindex(options: &ReindexOptions) -> Result<ReindexSummary> {
    reindex_cancellable(options, None)
}

/// [`reindex`] that stops with [`IndexError::Cancelled`] once `cancel` is set
pub fn reindex_cancellable(
    options: &ReindexOptions,
    cancel: Option<&AtomicBool>,
) -> Result<ReindexSummary> {
    let source = SourceIndex::open(&options.input)?;
    let n_ref = source.reference_count();

    let mut writer = if options.text {
        AnyIndexWriter::Text(TextIndexWriter::new(
            &options.output,
            n_ref,
            options.sort_bins,
        ))
    } else {
        let bam_file_size = match options.bam_file_size {
            Some(size) => size,
            None => fs::metadata(&options.input)?.len(),
        };
        AnyIndexWriter::Binary(BinaryIndexWriter::new(
            &options.output,
            n_ref,
            options.sort_bins,
            bam_file_size,
        ))
    };

    info!(
        input = %options.input.display(),
        output = %options.output.display(),
        references = n_ref,
        text = options.text,
        sort_bins = options.sort_bins,
        "reindexing"
    );

    let bar = reference_bar(n_ref, options.progress);
    let result = run(&source, &mut writer, options.no_coordinate_count, cancel, &bar);
    match &result {
        Ok(_) => bar.finish_and_clear(),
        Err(_) => bar.abandon(),
    }
    let totals = result?;

    info!(
        references = totals.references,
        bins = totals.bins,
        chunks = totals.chunks,
        "reindex complete"
    );
    Ok(ReindexSummary {
        output: options.output.clone(),
        totals,
    })
}

/// Stream every reference of `source` through `writer`.
///
/// `no_coordinate_override` replaces the source's trailing count; without
/// either, 0 is written. On any failure the writer's output is deleted and the
/// cause is returned inside [`IndexError::Reindex`].
pub fn reindex_with<S, W>(
    source: &S,
    writer: &mut W,
    no_coordinate_override: Option<u64>,
    cancel: Option<&AtomicBool>,
) -> Result<ReindexTotals>
where
    S: IndexSource + ?Sized,
    W: IndexWriter + ?Sized,
{
    run(
        source,
        writer,
        no_coordinate_override,
        cancel,
        &ProgressBar::hidden(),
    )
}

fn run<S, W>(
    source: &S,
    writer: &mut W,
    no_coordinate_override: Option<u64>,
    cancel: Option<&AtomicBool>,
    bar: &ProgressBar,
) -> Result<ReindexTotals>
where
    S: IndexSource + ?Sized,
    W: IndexWriter + ?Sized,
{
    let mut guard = CleanupGuard::new(writer);
    match write_all(source, &mut *guard.writer, no_coordinate_override, cancel, bar) {
        Ok(totals) => {
            guard.disarm();
            Ok(totals)
        }
        Err((reference, source)) => {
            guard.cleanup();
            Err(IndexError::Reindex {
                reference,
                source: Box::new(source),
            })
        }
    }
}

/// Steps 3 to 5 of a rewrite. Errors carry the reference being processed.
fn write_all<S, W>(
    source: &S,
    writer: &mut W,
    no_coordinate_override: Option<u64>,
    cancel: Option<&AtomicBool>,
    bar: &ProgressBar,
) -> std::result::Result<ReindexTotals, (Option<usize>, IndexError)>
where
    S: IndexSource + ?Sized,
    W: IndexWriter + ?Sized,
{
    writer.write_header().map_err(|e| (None, e))?;

    let mut totals = ReindexTotals::default();
    for reference in 0..source.reference_count() {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err((Some(reference), IndexError::Cancelled));
        }
        let content = source
            .content_for(reference)
            .map_err(|e| (Some(reference), e))?;
        writer
            .write_reference(&content, reference)
            .map_err(|e| (Some(reference), e))?;

        totals.references += 1;
        totals.bins += content.bins.len();
        totals.chunks += content.chunk_count();
        bar.inc(1);
    }

    totals.no_coordinate_count = no_coordinate_override
        .or_else(|| source.no_coordinate_count())
        .unwrap_or(0);
    writer
        .close(totals.no_coordinate_count)
        .map_err(|e| (None, e))?;
    Ok(totals)
}

/// Deletes the writer's output unless disarmed, including while unwinding
struct CleanupGuard<'w, W: IndexWriter + ?Sized> {
    writer: &'w mut W,
    armed: bool,
}

impl<'w, W: IndexWriter + ?Sized> CleanupGuard<'w, W> {
    fn new(writer: &'w mut W) -> Self {
        Self {
            writer,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    fn cleanup(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        match self.writer.delete_index_file() {
            Ok(()) => debug!("removed partial index output"),
            // The original failure is what the caller needs to see
            Err(e) => warn!(error = %e, "failed to remove partial index output"),
        }
    }
}

impl<W: IndexWriter + ?Sized> Drop for CleanupGuard<'_, W> {
    fn drop(&mut self) {
        self.cleanup();
    }
}
