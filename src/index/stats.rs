use crate::index::metadata::IndexStats;
use crate::index::reader::SourceIndex;
use anyhow::{Context, Result};
use std::path::Path;

/// Display index statistics
pub fn show_stats(path: &Path, json: bool) -> Result<()> {
    let source = SourceIndex::open(path)
        .with_context(|| format!("Failed to open index {}", path.display()))?;
    let stats = IndexStats::collect(&source)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let size = match &source {
        SourceIndex::Binary(reader) => reader.byte_len(),
        SourceIndex::Text(_) => std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
    };
    print!("{}", render_stats(path, &stats, source.is_text(), size));
    Ok(())
}

fn render_stats(path: &Path, stats: &IndexStats, text: bool, size: u64) -> String {
    let mut out = String::new();
    out.push_str("Index Statistics\n");
    out.push_str("================\n\n");
    out.push_str(&format!("Index:            {}\n", path.display()));
    out.push_str(&format!(
        "Encoding:         {}\n",
        if text { "text" } else { "binary" }
    ));
    out.push_str(&format!("Size:             {}\n", format_size(size)));
    out.push_str(&format!("References:       {}\n", stats.references.len()));
    let no_coor = stats
        .no_coordinate_count
        .map(|n| n.to_string())
        .unwrap_or_else(|| "-".to_string());
    out.push_str(&format!("No coordinate:    {}\n", no_coor));

    if stats.references.is_empty() {
        return out;
    }

    out.push_str(&format!(
        "\n  {:>6} {:>8} {:>10} {:>10} {:>12} {:>12}\n",
        "ref", "bins", "chunks", "windows", "aligned", "unaligned"
    ));
    let count = |n: Option<u64>| n.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
    for r in &stats.references {
        out.push_str(&format!(
            "  {:>6} {:>8} {:>10} {:>10} {:>12} {:>12}\n",
            r.reference,
            r.bins,
            r.chunks,
            r.linear_windows,
            count(r.aligned_records),
            count(r.unaligned_records)
        ));
    }

    let has_metadata = stats.references.iter().any(|r| r.aligned_records.is_some());
    if has_metadata {
        out.push_str(&format!(
            "\nMapped records:   {} aligned, {} unaligned\n",
            stats.total_aligned(),
            stats.total_unaligned()
        ));
    }
    out
}

/// Format byte size to human readable
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::metadata::ReferenceStats;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_render_stats_table() {
        let stats = IndexStats {
            references: vec![
                ReferenceStats {
                    reference: 0,
                    bins: 3,
                    chunks: 7,
                    linear_windows: 12,
                    aligned_records: Some(100),
                    unaligned_records: Some(2),
                },
                ReferenceStats {
                    reference: 1,
                    ..Default::default()
                },
            ],
            no_coordinate_count: Some(57),
        };
        let out = render_stats(Path::new("x.bai"), &stats, false, 100);
        assert!(out.contains("References:       2"));
        assert!(out.contains("No coordinate:    57"));
        assert!(out.contains("Encoding:         binary"));
        assert!(out.contains("100 aligned, 2 unaligned"));
        let row = out.lines().find(|l| l.trim_start().starts_with("1 ")).unwrap();
        assert!(row.ends_with("-"));
    }

    #[test]
    fn test_render_empty_index() {
        let out = render_stats(Path::new("x.bai"), &IndexStats::default(), true, 0);
        assert!(out.contains("References:       0"));
        assert!(out.contains("No coordinate:    -"));
        assert!(!out.contains("aligned"));
    }
}
