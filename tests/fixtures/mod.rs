//! Shared fixtures: synthetic indexes, an independent `.bai` encoder and a
//! runner for the built binary.
#![allow(dead_code)]

use baix::index::{
    Bin, BinaryIndexWriter, Chunk, IndexContents, ReferenceContent, ReferenceMetadata,
    VirtualOffset, reindex_with,
};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Index with `n_ref` references, each holding leaf bins with deliberately
/// unsorted chunks, a metadata pseudo-bin and a short linear index.
pub fn synthetic_index(n_ref: usize, bins_per_ref: u32, chunks_per_bin: u64) -> IndexContents {
    let references = (0..n_ref)
        .map(|r| {
            let base = (r as u64 + 1) * 10_000;
            let mut bins: Vec<Bin> = (0..bins_per_ref)
                .rev()
                .map(|b| {
                    let block = base + b as u64 * 100;
                    let chunks = (0..chunks_per_bin)
                        .rev()
                        .map(|c| {
                            Chunk::new(
                                VirtualOffset::new(block + c * 2, 16),
                                VirtualOffset::new(block + c * 2 + 1, 0),
                            )
                        })
                        .collect();
                    Bin::new(4681 + b, chunks)
                })
                .collect();
            bins.push(
                ReferenceMetadata {
                    first_offset: VirtualOffset::new(base, 16),
                    last_offset: VirtualOffset::new(base + bins_per_ref as u64 * 100, 0),
                    aligned_records: 1000 + r as u64,
                    unaligned_records: r as u64,
                }
                .to_bin(),
            );
            let linear_index = (0..bins_per_ref as u64)
                .map(|w| VirtualOffset::new(base + w * 100, 16))
                .collect();
            ReferenceContent::new(bins, linear_index)
        })
        .collect();
    IndexContents::new(references, Some(57))
}

/// Encode a `.bai` without going through the crate's writers
pub fn encode_bai(contents: &IndexContents) -> Vec<u8> {
    let mut buf = b"BAI\x01".to_vec();
    buf.extend_from_slice(&(contents.references.len() as i32).to_le_bytes());
    for reference in &contents.references {
        buf.extend_from_slice(&(reference.bins.len() as i32).to_le_bytes());
        for bin in &reference.bins {
            buf.extend_from_slice(&bin.bin_id.to_le_bytes());
            buf.extend_from_slice(&(bin.chunks.len() as i32).to_le_bytes());
            for chunk in &bin.chunks {
                buf.extend_from_slice(&chunk.start.as_raw().to_le_bytes());
                buf.extend_from_slice(&chunk.end.as_raw().to_le_bytes());
            }
        }
        buf.extend_from_slice(&(reference.linear_index.len() as i32).to_le_bytes());
        for offset in &reference.linear_index {
            buf.extend_from_slice(&offset.as_raw().to_le_bytes());
        }
    }
    if let Some(count) = contents.no_coordinate_count {
        buf.extend_from_slice(&count.to_le_bytes());
    }
    buf
}

/// Write `contents` as a binary index through the crate's writer
pub fn write_index(dir: &Path, name: &str, contents: &IndexContents) -> PathBuf {
    let path = dir.join(name);
    let mut writer = BinaryIndexWriter::new(&path, contents.references.len(), false, 0);
    reindex_with(contents, &mut writer, None, None).expect("Failed to write fixture index");
    path
}

/// Run the `baix` binary with an isolated config directory
pub fn run_baix(args: &[&str], config_home: &Path) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_baix"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_home)
        .env("HOME", config_home)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run baix");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}
