use autotag_protocol::Stage;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

use crate::error::JobError;

/// Lexically normalize an archive entry name.
///
/// Collapses empty and `.` segments and resolves `..` against preceding
/// segments. Leading `..` segments that cannot be resolved are kept, so an
/// escaping name still starts with `..` afterwards. Backslashes count as
/// separators.
pub(crate) fn normalize_entry(name: &str) -> String {
    let unified = name.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Whether a normalized entry name would land outside the target directory.
fn is_unsafe(normalized: &str) -> bool {
    normalized == ".."
        || normalized.starts_with("../")
        || normalized.starts_with('/')
        || Path::new(normalized).is_absolute()
        || has_drive_prefix(normalized)
}

/// `C:` style prefixes, which are absolute on Windows.
fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Extract every entry of `zip_path` under `target_dir`.
///
/// All entry names are checked before anything is written: one unsafe name
/// (absolute, or escaping via `..`) rejects the whole archive with a
/// permanent error and leaves `target_dir` untouched. Returns the number of
/// files written.
pub fn safe_extract(zip_path: &Path, target_dir: &Path) -> Result<usize, JobError> {
    let file = File::open(zip_path).map_err(|e| io_error(zip_path, e))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| JobError::permanent(Stage::Extract, format!("Unreadable ZIP: {}", e)))?;

    let mut plan: Vec<(usize, PathBuf, bool)> = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|e| JobError::permanent(Stage::Extract, format!("Unreadable ZIP: {}", e)))?;
        let name = entry.name().to_string();
        let normalized = normalize_entry(&name);

        if is_unsafe(&normalized) {
            return Err(JobError::permanent(
                Stage::Extract,
                format!("Unsafe ZIP entry: {}", name),
            ));
        }
        if normalized.is_empty() {
            continue;
        }
        plan.push((index, target_dir.join(&normalized), entry.is_dir()));
    }

    fs::create_dir_all(target_dir).map_err(|e| io_error(target_dir, e))?;

    let mut written = 0;
    for (index, dest, is_dir) in plan {
        if is_dir {
            fs::create_dir_all(&dest).map_err(|e| io_error(&dest, e))?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let mut entry = archive
            .by_index(index)
            .map_err(|e| JobError::permanent(Stage::Extract, format!("Unreadable ZIP: {}", e)))?;
        let mut out = File::create(&dest).map_err(|e| io_error(&dest, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| io_error(&dest, e))?;
        written += 1;
    }

    debug!(files = written, target = %target_dir.display(), "Extracted archive");
    Ok(written)
}

fn io_error(path: &Path, e: io::Error) -> JobError {
    JobError::transient(Stage::Extract, format!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotag_test_utils::ZipFixture;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_entry() {
        assert_eq!(normalize_entry("a/./b//c.txt"), "a/b/c.txt");
        assert_eq!(normalize_entry("a/../b.txt"), "b.txt");
        assert_eq!(normalize_entry("a/../../b.txt"), "../b.txt");
        assert_eq!(normalize_entry("..\\evil.txt"), "../evil.txt");
        assert_eq!(normalize_entry("/etc/passwd"), "/etc/passwd");
        assert_eq!(normalize_entry("./"), "");
    }

    #[test]
    fn test_unsafe_names() {
        for name in ["../x", "a/../../x", "/etc/passwd", "C:/Windows/x", "..\\x"] {
            assert!(is_unsafe(&normalize_entry(name)), "{} should be unsafe", name);
        }
        for name in ["a/b.txt", "a/../b.txt", "..foo/bar.txt", "dir/"] {
            assert!(!is_unsafe(&normalize_entry(name)), "{} should be safe", name);
        }
    }

    #[test]
    fn test_extracts_nested_structure() {
        let scratch = TempDir::new().unwrap();
        let zip_path = scratch.path().join("course.zip");
        ZipFixture::new()
            .file("imsmanifest.xml", "<manifest/>")
            .dir("assets/")
            .file("assets/css/site.css", "body{}")
            .file("./index.html", "<html/>")
            .write_to(&zip_path)
            .unwrap();

        let target = scratch.path().join("out");
        let written = safe_extract(&zip_path, &target).unwrap();

        assert_eq!(written, 3);
        assert_eq!(fs::read_to_string(target.join("assets/css/site.css")).unwrap(), "body{}");
        assert!(target.join("index.html").is_file());
        assert!(target.join("assets").is_dir());
    }

    #[test]
    fn test_traversal_aborts_before_writing() {
        let scratch = TempDir::new().unwrap();
        let zip_path = scratch.path().join("evil.zip");
        ZipFixture::new()
            .file("ok.txt", "fine")
            .file("../escaped.txt", "pwned")
            .write_to(&zip_path)
            .unwrap();

        let target = scratch.path().join("nested").join("out");
        let err = safe_extract(&zip_path, &target).unwrap_err();

        assert!(err.is_permanent());
        assert_eq!(err.stage(), Stage::Extract);
        assert!(err.message().contains("Unsafe ZIP entry: ../escaped.txt"));
        assert!(!target.exists());
        assert!(!scratch.path().join("nested").join("escaped.txt").exists());
    }

    #[test]
    fn test_absolute_entry_is_rejected() {
        let scratch = TempDir::new().unwrap();
        let zip_path = scratch.path().join("abs.zip");
        ZipFixture::new()
            .file("/tmp/autotag-absolute.txt", "x")
            .write_to(&zip_path)
            .unwrap();

        let err = safe_extract(&zip_path, &scratch.path().join("out")).unwrap_err();
        assert!(err.is_permanent());
    }
}
