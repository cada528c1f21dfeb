//! Segment file naming and discovery for the WAL directory.

use std::path::{Path, PathBuf};

pub fn segment_path(dir: &Path, base: &str, seq: u64) -> PathBuf {
    dir.join(format!("{base}.{seq:010}"))
}

/// Lists existing segment sequence numbers for `base` under `dir`, sorted
/// ascending. Empty if the WAL has never been written.
pub fn discover_segments(dir: &Path, base: &str) -> std::io::Result<Vec<u64>> {
    let prefix = format!("{base}.");
    let mut seqs = Vec::new();
    if !dir.exists() {
        return Ok(seqs);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(seq_str) = name.strip_prefix(&prefix) {
            if let Ok(seq) = seq_str.parse::<u64>() {
                seqs.push(seq);
            }
        }
    }
    seqs.sort_unstable();
    Ok(seqs)
}
