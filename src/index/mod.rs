pub mod binary;
pub mod binning;
pub mod metadata;
pub mod reader;
pub mod reindex;
pub mod stats;
pub mod text;
pub mod types;
pub mod writer;

pub use binary::BinaryIndexWriter;
pub use metadata::{IndexStats, ReferenceMetadata};
pub use reader::{IndexReader, IndexSource, SourceIndex};
pub use reindex::{
    ReindexOptions, ReindexSummary, ReindexTotals, reindex, reindex_cancellable, reindex_with,
};
pub use text::{TextIndexWriter, parse_text_index};
pub use types::*;
pub use writer::{AnyIndexWriter, IndexWriter, WriterState};
