//! Small file helpers shared by the mergers. Every failure carries the path it
//! happened on so the scheduler log says which artifact could not be touched.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// An I/O failure on a specific file or directory.
#[derive(Debug)]
pub struct FileError {
    /// The file or directory the operation was working on.
    pub path: PathBuf,

    /// The underlying I/O error.
    pub err: io::Error,
}

impl FileError {
    fn new(path: &Path, err: io::Error) -> FileError {
        FileError {
            path: path.to_owned(),
            err,
        }
    }
}

impl fmt::Display for FileError {
    /// Implements [`fmt::Display`] for [`FileError`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "'{}': {}", self.path.display(), self.err)
    }
}

impl std::error::Error for FileError {
    /// Implements [`std::error::Error`] for [`FileError`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.err)
    }
}

/// Reads `path` into a string. A missing file is `Ok(None)`; any other
/// failure is an error.
pub fn read_optional(path: &Path) -> Result<Option<String>, FileError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) => match e.kind() {
            io::ErrorKind::NotFound => Ok(None),
            _ => Err(FileError::new(path, e)),
        },
    }
}

/// Writes `contents` to `path`, creating missing parent directories first.
pub fn write<C: AsRef<[u8]>>(path: &Path, contents: C) -> Result<(), FileError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }
    fs::write(path, contents).map_err(|e| FileError::new(path, e))
}

pub fn create_dir_all(path: &Path) -> Result<(), FileError> {
    fs::create_dir_all(path).map_err(|e| FileError::new(path, e))
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_optional_missing_file() -> Result<(), FileError> {
        let dir = TempDir::new().unwrap();
        assert_eq!(None, read_optional(&dir.path().join("nope.html"))?);
        Ok(())
    }

    #[test]
    fn test_write_creates_parents() -> Result<(), FileError> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c.txt");
        write(&path, "hello")?;
        assert_eq!(Some(String::from("hello")), read_optional(&path)?);
        Ok(())
    }

    #[test]
    fn test_error_names_the_path() {
        let dir = TempDir::new().unwrap();
        // a directory can't be read as a string
        let err = read_optional(dir.path()).unwrap_err();
        assert_eq!(dir.path(), err.path);
        assert!(err.to_string().contains(&dir.path().display().to_string()));
    }
}
