//! Rebuilds the "latest posts" list on the homepage. The list lives between
//! two marker comments:
//!
//! ```html
//! <ul>
//!   <!-- LATEST_POSTS_START -->
//!   ...
//!   <!-- LATEST_POSTS_END -->
//! </ul>
//! ```
//!
//! Everything between the markers is regenerated from the posts directory on
//! every run, so rebuilding twice with no new posts gives the same bytes.
//! The homepage is optional: a missing page or missing markers are reported
//! as an [`Outcome`], not an error.

use gtmpl::Value;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::markup;
use crate::post::{self, Post};
use crate::render::{self, object, post_path, TITLE_SEPARATOR};
use crate::util::{self, FileError};

pub const START_MARKER: &str = "LATEST_POSTS_START";
pub const END_MARKER: &str = "LATEST_POSTS_END";

/// The default number of posts listed.
pub const DEFAULT_MAX_ITEMS: usize = 5;

const LIST_TEMPLATE: &str = "{{ range . }}
          <li><a href=\"{{ .url }}\">{{ html .title }}</a></li>{{ end }}
        ";

/// What [`Rebuilder::rebuild`] did to the homepage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The list was regenerated and written.
    Updated,

    /// The regenerated list matched what was already there.
    Unchanged,

    /// There is no homepage.
    NoHomepage,

    /// The homepage lacks one or both markers.
    NoMarkers,
}

/// Regenerates the latest-posts region of a homepage.
pub struct Rebuilder<'a> {
    /// The directory the posts are read from.
    pub posts_dir: &'a Path,

    /// The listing page, which lives among the posts but isn't one.
    pub listing_page: &'a Path,

    /// The site name stripped from post titles.
    pub site_name: &'a str,

    /// The maximum number of posts listed.
    pub max_items: usize,
}

impl Rebuilder<'_> {
    /// Replaces the region between the markers in the homepage at `home_path`
    /// with links to the most recently modified posts.
    pub fn rebuild(&self, home_path: &Path) -> Result<Outcome> {
        let html = match util::read_optional(home_path)? {
            Some(html) => html,
            None => return Ok(Outcome::NoHomepage),
        };
        let region = match markup::comment_region(&html, START_MARKER, END_MARKER)? {
            Some(region) => region,
            None => return Ok(Outcome::NoMarkers),
        };

        let list = self.list(&self.latest()?)?;
        let mut updated = String::with_capacity(html.len() + list.len());
        updated.push_str(&html[..region.start]);
        updated.push_str(&list);
        updated.push_str(&html[region.end..]);

        if updated == html {
            return Ok(Outcome::Unchanged);
        }
        util::write(home_path, updated)?;
        Ok(Outcome::Updated)
    }

    /// The newest posts, newest first, at most `max_items` of them.
    fn latest(&self) -> Result<Vec<Post>> {
        let mut posts: Vec<Post> = post::scan(self.posts_dir)?
            .into_iter()
            .filter(|p| !self.is_listing_page(p))
            .collect();
        post::sort_newest_first(&mut posts);
        posts.truncate(self.max_items);
        Ok(posts)
    }

    /// Whether `post` is the listing page rather than an article. Paths are
    /// compared after resolving `..` and symlinks.
    fn is_listing_page(&self, post: &Post) -> bool {
        match (fs::canonicalize(&post.path), fs::canonicalize(self.listing_page)) {
            (Ok(post), Ok(listing_page)) => post == listing_page,
            _ => post.path == self.listing_page,
        }
    }

    fn list(&self, posts: &[Post]) -> Result<String> {
        let items: Vec<Value> = posts
            .iter()
            .map(|post| {
                object([
                    ("url", Value::from(post_path(&post.slug))),
                    ("title", Value::from(self.display_title(post))),
                ])
            })
            .collect();
        Ok(render::execute(LIST_TEMPLATE, Value::Array(items))?)
    }

    /// The post's `<title>` without the site-name suffix, or its slug when
    /// there is no usable title.
    fn display_title(&self, post: &Post) -> String {
        let html = match fs::read_to_string(&post.path) {
            Ok(html) => html,
            Err(err) => {
                debug!(path = %post.path.display(), error = %err, "Unreadable post, using slug as title");
                return post.slug.clone();
            }
        };

        let title = match markup::element_text(&html, "title") {
            Ok(Some(title)) => title,
            _ => return post.slug.clone(),
        };
        let suffix = format!("{}{}", TITLE_SEPARATOR, self.site_name);
        let title = title.trim();
        let title = title.strip_suffix(&suffix).unwrap_or(title).trim();
        match title.is_empty() {
            true => post.slug.clone(),
            false => title.to_owned(),
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a problem rebuilding the homepage list.
#[derive(Debug)]
pub enum Error {
    /// Returned when the homepage couldn't be tokenized far enough to find
    /// the markers.
    Markup(markup::Error),

    /// Returned when the posts directory couldn't be listed.
    Posts(post::Error),

    /// Returned when the list fails to render.
    Render(render::Error),

    /// Returned for I/O problems reading or writing the homepage.
    File(FileError),
}

impl Error {
    /// Whether the run can carry on after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Markup(_))
    }
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Markup(err) => write!(f, "Reading homepage: {}", err),
            Error::Posts(err) => write!(f, "{}", err),
            Error::Render(err) => write!(f, "Rendering homepage list: {}", err),
            Error::File(err) => write!(f, "Updating homepage {}", err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Markup(err) => Some(err),
            Error::Posts(err) => Some(err),
            Error::Render(err) => Some(err),
            Error::File(err) => Some(err),
        }
    }
}

impl From<markup::Error> for Error {
    /// Converts [`markup::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: markup::Error) -> Error {
        Error::Markup(err)
    }
}

impl From<post::Error> for Error {
    /// Converts [`post::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: post::Error) -> Error {
        Error::Posts(err)
    }
}

impl From<render::Error> for Error {
    /// Converts [`render::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
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
