//! Directory operations used by the dependency strategies.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Lexically normalizes a path: drops `.` and folds `..` into its parent.
///
/// The filesystem is not consulted, so symlinks are not resolved.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                components.pop();
            }
            c => components.push(c),
        }
    }

    components.iter().collect()
}

/// Create a directory and all of its parents.
///
/// # Errors
///
/// Fails if the path exists but is not a directory, or creation fails.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

/// Copy a directory tree recursively, overwriting existing files.
///
/// Symlinks and special files are skipped.
///
/// # Errors
///
/// Fails if any directory cannot be read or any file cannot be copied.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;

    for entry in
        fs::read_dir(src).with_context(|| format!("Failed to read directory: {}", src.display()))?
    {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if file_type.is_dir() {
            copy_dir(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            fs::copy(&src_path, &dst_path).with_context(|| {
                format!("Failed to copy file from {} to {}", src_path.display(), dst_path.display())
            })?;
        }
    }

    Ok(())
}

/// Remove a directory tree; a missing directory is not an error.
///
/// # Errors
///
/// Fails if the directory exists but cannot be removed.
pub fn remove_dir_all(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize_path(Path::new("a/./b")), PathBuf::from("a/b"));
    }

    #[test]
    fn test_ensure_dir() {
        let temp = tempdir().unwrap();
        let test_dir = temp.path().join("a").join("b");

        ensure_dir(&test_dir).unwrap();
        assert!(test_dir.is_dir());
        // Second call is a no-op
        ensure_dir(&test_dir).unwrap();
    }

    #[test]
    fn test_ensure_dir_on_file() {
        let temp = tempdir().unwrap();
        let file_path = temp.path().join("file.txt");
        fs::write(&file_path, "content").unwrap();

        assert!(ensure_dir(&file_path).is_err());
    }

    #[test]
    fn test_copy_dir_nested() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("recipes")).unwrap();
        fs::write(src.join("metadata.rb"), "name 'x'").unwrap();
        fs::write(src.join("recipes").join("default.rb"), "package 'a'").unwrap();

        let dst = temp.path().join("dst");
        copy_dir(&src, &dst).unwrap();

        assert!(dst.join("metadata.rb").is_file());
        assert_eq!(fs::read_to_string(dst.join("recipes/default.rb")).unwrap(), "package 'a'");
    }

    #[test]
    fn test_remove_dir_all_missing_is_ok() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("missing");
        remove_dir_all(&missing).unwrap();

        fs::create_dir_all(missing.join("x")).unwrap();
        remove_dir_all(&missing).unwrap();
        assert!(!missing.exists());
        remove_dir_all(&missing).unwrap();
    }
}
