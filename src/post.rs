//! A read-only snapshot of the posts directory. The snapshot is taken once per
//! run; slug allocation and the homepage list both work from it rather than
//! re-reading the directory.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// The extension of rendered post files.
pub const EXTENSION: &str = "html";

/// A rendered post on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Post {
    /// The file stem, which is also the post's URL slug.
    pub slug: String,

    /// The path of the post's HTML file.
    pub path: PathBuf,

    /// The file's last-modified time.
    pub modified: SystemTime,
}

/// Lists the `*.html` files directly inside `dir`, in file-name order. A
/// missing directory has no posts.
pub fn scan(dir: &Path) -> Result<Vec<Post>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut posts = Vec::new();
    for result in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = result?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().map_or(true, |ext| ext != EXTENSION)
        {
            continue;
        }
        let slug = match path.file_stem() {
            Some(stem) => stem.to_string_lossy().into_owned(),
            None => continue,
        };
        posts.push(Post {
            slug,
            path: path.to_owned(),
            modified: entry.metadata()?.modified()?,
        });
    }
    Ok(posts)
}

/// The slugs taken by `posts`.
pub fn slugs(posts: &[Post]) -> HashSet<String> {
    posts.iter().map(|p| p.slug.clone()).collect()
}

/// Sorts `posts` most recently modified first. Ties keep their current order.
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.modified.cmp(&a.modified));
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a problem listing the posts directory.
#[derive(Debug)]
pub enum Error {
    /// Returned for WalkDir I/O errors.
    WalkDir(walkdir::Error),

    /// Returned for other I/O errors.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::WalkDir(err) => write!(f, "Listing posts: {}", err),
            Error::Io(err) => write!(f, "Reading post metadata: {}", err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::WalkDir(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<walkdir::Error> for Error {
    /// Converts a [`walkdir::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator while walking the posts directory.
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
    }
}

impl From<std::io::Error> for Error {
    /// Converts a [`std::io::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator for fallible I/O functions.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}
