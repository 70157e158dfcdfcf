//! Atomic file I/O, checksumming, path normalization, and ignore-file
//! filtering. The write path is the atomicity boundary every other
//! subsystem relies on: a rename either completes or the write never
//! happened.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::error::{Error, Result};

/// SHA-256 hex digest of the given bytes.
pub fn checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Reads a file's contents and its checksum.
pub async fn read(path: &Path) -> Result<(Vec<u8>, String)> {
    let bytes = fs::read(path).await.map_err(|source| Error::FileError {
        path: path.to_path_buf(),
        source,
    })?;
    let sum = checksum(&bytes);
    Ok((bytes, sum))
}

/// Writes `content` to `path` via a sibling `.tmp`-suffixed file followed
/// by an atomic rename. The temp file is removed if any step before the
/// rename fails. Returns the checksum of the bytes actually written.
pub async fn write_atomic(path: &Path, content: &str) -> Result<String> {
    let temp_path = sibling_temp_path(path);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|source| Error::FileError {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let write_result = fs::write(&temp_path, content.as_bytes()).await;
    if let Err(source) = write_result {
        let _ = fs::remove_file(&temp_path).await;
        return Err(Error::FileError {
            path: path.to_path_buf(),
            source,
        });
    }

    if let Err(source) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(Error::FileError {
            path: path.to_path_buf(),
            source,
        });
    }

    Ok(checksum(content.as_bytes()))
}

/// Like [`write_atomic`], but aborts with [`Error::DirtyFileError`] if the
/// file currently on disk does not match `expected_checksum`. No retry:
/// the caller re-reads and decides how to proceed.
pub async fn write_atomic_checked(
    path: &Path,
    content: &str,
    expected_checksum: &str,
) -> Result<String> {
    if path.exists() {
        let (_, current) = read(path).await?;
        if current != expected_checksum {
            return Err(Error::DirtyFileError {
                path: path.to_path_buf(),
                expected: expected_checksum.to_string(),
                found: current,
            });
        }
    }
    write_atomic(path, content).await
}

fn sibling_temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".tmp");
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Normalizes path separators: backslashes to forward slashes, a leading
/// `./` stripped, repeated slashes collapsed, trailing slashes trimmed.
///
/// This is the fix for the bug where `folder//file.md`-shaped paths
/// (e.g. from a WSL client) produced distinct entities for what should be
/// one file.
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }

    let mut normalized = path.replace('\\', "/");
    if let Some(stripped) = normalized.strip_prefix("./") {
        normalized = stripped.to_string();
    }

    let mut collapsed = String::with_capacity(normalized.len());
    let mut last_was_slash = false;
    for c in normalized.chars() {
        if c == '/' {
            if !last_was_slash {
                collapsed.push(c);
            }
            last_was_slash = true;
        } else {
            collapsed.push(c);
            last_was_slash = false;
        }
    }

    collapsed.trim_end_matches('/').to_string()
}

/// Loads `.bmignore` (or whatever `ignore_file_name` the project config
/// sets) from a project root, gitignore-syntax, for use by the sync
/// engine's directory walk.
pub fn load_ignore_file(project_root: &Path, ignore_file_name: &str) -> Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(project_root);
    let ignore_path = project_root.join(ignore_file_name);
    if ignore_path.exists() {
        if let Some(err) = builder.add(&ignore_path) {
            return Err(Error::Other(format!("failed to read {}: {}", ignore_file_name, err)));
        }
    }
    builder
        .build()
        .map_err(|err| Error::Other(format!("failed to build ignore matcher: {}", err)))
}

pub fn should_ignore(matcher: &Gitignore, path: &Path, is_dir: bool) -> bool {
    matcher.matched(path, is_dir).is_ignore()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn checksum_is_deterministic() {
        assert_eq!(checksum(b"hello"), checksum(b"hello"));
        assert_ne!(checksum(b"hello"), checksum(b"world"));
    }

    #[test]
    fn normalizes_double_slashes_and_backslashes() {
        assert_eq!(normalize_path("folder//file.md"), "folder/file.md");
        assert_eq!(normalize_path("path\\to\\file.md"), "path/to/file.md");
        assert_eq!(normalize_path("./folder/./file.md"), "folder/./file.md");
        assert_eq!(normalize_path("folder/file.md/"), "folder/file.md");
    }

    #[tokio::test]
    async fn write_atomic_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note.md");
        let sum = write_atomic(&path, "hello world").await.unwrap();
        let (bytes, read_sum) = read(&path).await.unwrap();
        assert_eq!(bytes, b"hello world");
        assert_eq!(sum, read_sum);
        assert!(!sibling_temp_path(&path).exists());
    }

    #[tokio::test]
    async fn write_atomic_checked_rejects_dirty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note.md");
        write_atomic(&path, "v1").await.unwrap();
        let result = write_atomic_checked(&path, "v2", "not-the-real-checksum").await;
        assert!(matches!(result, Err(Error::DirtyFileError { .. })));
    }
}
