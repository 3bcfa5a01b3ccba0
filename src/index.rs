//! Maintains the blog listing page. New entries are inserted directly after
//! the `<ul id="posts">` start tag, so the list reads most recent first and
//! every byte outside the inserted entry is left as it was.

use chrono::NaiveDate;
use gtmpl::Value;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::date;
use crate::markup;
use crate::render::{self, object, post_path, TITLE_SEPARATOR};
use crate::util::{self, FileError};

/// The `id` of the `<ul>` that new entries are inserted into.
pub const POSTS_LIST_ID: &str = "posts";

const LISTING_TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Blog{{ .separator }}{{ html .site_name }}</title>
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <link rel="stylesheet" href="/blog/styles.css">
</head>
<body>
  <header class="container">
    <nav><a href="/">← Home</a> · <a href="/blog/">Blog</a></nav>
    <h1>Blog</h1>
    <p>Articles auto-published daily.</p>
    <hr>
  </header>
  <main class="container">
    <ul id="{{ .id }}">
      <!-- posts will be prepended here -->
    </ul>
  </main>
</body>
</html>
"#;

const ENTRY_TEMPLATE: &str = r#"
      <li><a href="{{ .url }}">{{ html .title }}</a> <small>{{ .date }}</small></li>"#;

/// Creates a minimal listing page at `path` unless one already exists.
/// Returns whether a page was created.
pub fn ensure_exists(path: &Path, site_name: &str) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    util::write(path, empty_listing(site_name)?)?;
    Ok(true)
}

fn empty_listing(site_name: &str) -> Result<String> {
    let value = object([
        ("separator", Value::from(TITLE_SEPARATOR)),
        ("site_name", Value::from(site_name)),
        ("id", Value::from(POSTS_LIST_ID)),
    ]);
    Ok(render::execute(LISTING_TEMPLATE, value)?)
}

/// The list entry for one post.
fn entry(slug: &str, title: &str, date: NaiveDate) -> Result<String> {
    let value = object([
        ("url", Value::from(post_path(slug))),
        ("title", Value::from(title)),
        ("date", Value::from(date::iso(date))),
    ]);
    Ok(render::execute(ENTRY_TEMPLATE, value)?)
}

/// Returns `html` with an entry for the post inserted at the top of the posts
/// list.
pub fn prepend_entry(html: &str, slug: &str, title: &str, date: NaiveDate) -> Result<String> {
    let at = markup::start_tag_end(html, "ul", POSTS_LIST_ID)
        .map_err(Error::Markup)?
        .ok_or(Error::MissingMarker)?;

    let entry = entry(slug, title, date)?;
    let mut updated = String::with_capacity(html.len() + entry.len());
    updated.push_str(&html[..at]);
    updated.push_str(&entry);
    updated.push_str(&html[at..]);
    Ok(updated)
}

/// Inserts an entry for the post into the listing page at `path`. If the page
/// has no posts list, it is left untouched and [`Error::MissingMarker`] is
/// returned.
pub fn prepend(path: &Path, slug: &str, title: &str, date: NaiveDate) -> Result<()> {
    let html = util::read_optional(path)?.ok_or_else(|| Error::Missing(path.to_owned()))?;
    let updated = prepend_entry(&html, slug, title, date)?;
    util::write(path, updated)?;
    Ok(())
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a problem updating the listing page.
#[derive(Debug)]
pub enum Error {
    /// Returned when the listing page has no `<ul id="posts">` element.
    MissingMarker,

    /// Returned when the listing page couldn't be tokenized far enough to find
    /// the posts list.
    Markup(markup::Error),

    /// Returned when the listing page doesn't exist.
    Missing(PathBuf),

    /// Returned when the listing page or an entry fails to render.
    Render(render::Error),

    /// Returned for I/O problems reading or writing the listing page.
    File(FileError),
}

impl Error {
    /// Whether the run can carry on with its other artifacts after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::MissingMarker | Error::Markup(_) | Error::Missing(_))
    }
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MissingMarker => {
                write!(f, "Listing page has no <ul id=\"{}\"> element", POSTS_LIST_ID)
            }
            Error::Markup(err) => write!(f, "Reading listing page: {}", err),
            Error::Missing(path) => write!(f, "Listing page '{}' doesn't exist", path.display()),
            Error::Render(err) => write!(f, "Rendering listing page: {}", err),
            Error::File(err) => write!(f, "Updating listing page {}", err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MissingMarker => None,
            Error::Markup(err) => Some(err),
            Error::Missing(_) => None,
            Error::Render(err) => Some(err),
            Error::File(err) => Some(err),
        }
    }
}

impl From<render::Error> for Error {
    /// Converts [`render::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator when rendering the page or its entries.
    fn from(err: render::Error) -> Error {
        Error::Render(err)
    }
}

impl From<FileError> for Error {
    /// Converts [`FileError`]s into [`Error`]. This allows us to use the `?`
    /// operator for fallible file operations.
    fn from(err: FileError) -> Error {
        Error::File(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    #[test]
    fn test_ensure_exists_is_idempotent() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blog/index.html");
        assert!(ensure_exists(&path, "Site")?);
        fs::write(&path, "<ul id=\"posts\"><li>kept</li></ul>").unwrap();
        assert!(!ensure_exists(&path, "Site")?);
        assert_eq!(
            "<ul id=\"posts\"><li>kept</li></ul>",
            fs::read_to_string(&path).unwrap()
        );
        Ok(())
    }

    #[test]
    fn test_created_listing_has_insertion_point() -> Result<()> {
        let listing = empty_listing("Site & Co")?;
        assert!(listing.contains("<title>Blog • Site &amp; Co</title>"));
        assert!(markup::start_tag_end(&listing, "ul", POSTS_LIST_ID)
            .map_err(Error::Markup)?
            .is_some());
        Ok(())
    }

    #[test]
    fn test_prepend_preserves_prior_entries() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.html");
        ensure_exists(&path, "Site")?;
        prepend(&path, "y", "Post Y", day(1))?;
        prepend(&path, "x", "Post X", day(2))?;
        let before = fs::read_to_string(&path).unwrap();

        prepend(&path, "z", "Post Z", day(3))?;
        let after = fs::read_to_string(&path).unwrap();

        let z = after.find("/blog/z.html").unwrap();
        let x = after.find("/blog/x.html").unwrap();
        let y = after.find("/blog/y.html").unwrap();
        assert!(z < x && x < y);

        // removing the new entry gives back the old document byte for byte
        let inserted = entry("z", "Post Z", day(3))?;
        assert_eq!(before, after.replacen(&inserted, "", 1));
        Ok(())
    }

    #[test]
    fn test_prepend_entry_markup() -> Result<()> {
        let html = "<body><ul id=\"posts\"></ul></body>";
        let updated = prepend_entry(html, "a-b", "A & B", day(9))?;
        assert_eq!(
            "<body><ul id=\"posts\">\n      <li><a href=\"/blog/a-b.html\">A &amp; B</a> <small>2024-02-09</small></li></ul></body>",
            updated
        );
        Ok(())
    }

    #[test]
    fn test_prepend_uses_first_marker_only() -> Result<()> {
        let html = "<ul id=\"posts\"></ul><ul id=\"posts\"></ul>";
        let updated = prepend_entry(html, "a", "A", day(1))?;
        assert_eq!(1, updated.matches("<li>").count());
        assert!(updated.ends_with("</li></ul><ul id=\"posts\"></ul>"));
        Ok(())
    }

    #[test]
    fn test_missing_marker_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.html");
        let original = "<html><body><ol id=\"other\"></ol></body></html>";
        fs::write(&path, original).unwrap();

        let err = prepend(&path, "a", "A", day(1)).unwrap_err();
        assert!(matches!(err, Error::MissingMarker));
        assert!(err.is_recoverable());
        assert_eq!(original, fs::read_to_string(&path).unwrap());
    }
}
