//! Corpus fingerprint and its sidecar file.
//!
//! The fingerprint covers name, modification time and size of every top-level
//! file in the corpus directory. The sidecar is written only after the index it
//! describes is in place, so a crash mid-build leaves a mismatch and forces a
//! rebuild on the next start.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

pub const FINGERPRINT_FILE: &str = "docs_hash.txt";

/// Hex digest over the corpus listing; empty when the directory is missing.
pub fn compute_fingerprint(docs_dir: &Path) -> std::io::Result<String> {
    if !docs_dir.is_dir() {
        return Ok(String::new());
    }
    let mut entries: Vec<(String, u128, u64)> = Vec::new();
    for entry in fs::read_dir(docs_dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let mtime = meta.modified()?.duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or_default();
        entries.push((entry.file_name().to_string_lossy().into_owned(), mtime, meta.len()));
    }
    entries.sort();

    let mut hasher = blake3::Hasher::new();
    for (name, mtime, size) in &entries {
        hasher.update(format!("{name}:{mtime}:{size}\n").as_bytes());
    }
    Ok(hasher.finalize().to_hex().to_string())
}

pub fn fingerprint_path(index_dir: &Path) -> PathBuf {
    index_dir.join(FINGERPRINT_FILE)
}

pub fn read_stored(index_dir: &Path) -> Option<String> {
    fs::read_to_string(fingerprint_path(index_dir)).ok().map(|s| s.trim().to_string())
}

/// Write through a temp file and rename so readers never see a partial digest.
pub fn write_stored(index_dir: &Path, fingerprint: &str) -> std::io::Result<()> {
    let target = fingerprint_path(index_dir);
    let tmp = index_dir.join(format!("{FINGERPRINT_FILE}.tmp"));
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(fingerprint.as_bytes())?;
        f.sync_all()?;
    }
    fs::rename(tmp, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_has_empty_fingerprint() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert_eq!(compute_fingerprint(&tmp.path().join("nope")).unwrap(), "");
    }

    #[test]
    fn size_change_alters_fingerprint() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "abc").unwrap();
        let before = compute_fingerprint(tmp.path()).unwrap();
        assert_eq!(before, compute_fingerprint(tmp.path()).unwrap());
        fs::write(&file, "abcd").unwrap();
        assert_ne!(before, compute_fingerprint(tmp.path()).unwrap());
    }

    #[test]
    fn mtime_change_alters_fingerprint() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "abc").unwrap();
        let before = compute_fingerprint(tmp.path()).unwrap();

        let handle = fs::File::options().write(true).open(&file).unwrap();
        handle.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(60)).unwrap();
        drop(handle);

        assert_eq!(fs::metadata(&file).unwrap().len(), 3);
        assert_ne!(before, compute_fingerprint(tmp.path()).unwrap());
    }

    #[test]
    fn stored_fingerprint_round_trips_without_temp_leftovers() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_stored(tmp.path(), "deadbeef").unwrap();
        assert_eq!(read_stored(tmp.path()).as_deref(), Some("deadbeef"));
        assert!(!tmp.path().join("docs_hash.txt.tmp").exists());
    }
}
