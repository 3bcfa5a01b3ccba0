//! One publishing run, end to end. A run picks the day's topic, asks the
//! generator for a draft (or falls back to a placeholder), writes the post and
//! then brings the listing page, sitemap, homepage and run log up to date.
//!
//! Generation failures, missing markers and malformed sitemaps never fail a
//! run. Only file-system errors do, because once a write has failed none of the
//! remaining artifacts can be trusted to agree with each other.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::date;
use crate::draft::ArticleDraft;
use crate::homepage::{self, Rebuilder};
use crate::index;
use crate::post;
use crate::provider::Generator;
use crate::render::{self, Renderer};
use crate::runlog::{self, RunLog};
use crate::sitemap;
use crate::slugs;
use crate::topic::TopicPicker;
use crate::util::{self, FileError};

/// The name of the stylesheet written next to the posts.
pub const STYLESHEET: &str = "styles.css";

/// Where the day's draft came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Generated,
    Placeholder,
}

/// A derived artifact that a run left alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Skipped {
    Index(String),
    Homepage(String),
}

impl fmt::Display for Skipped {
    /// Implements [`fmt::Display`] for [`Skipped`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Skipped::Index(reason) => write!(f, "listing page: {}", reason),
            Skipped::Homepage(reason) => write!(f, "homepage: {}", reason),
        }
    }
}

/// What a run published.
#[derive(Clone, Debug)]
pub struct Report {
    pub slug: String,
    pub title: String,

    /// The topic the generator was asked about.
    pub topic: String,

    /// The post's file.
    pub path: PathBuf,
    pub outcome: Outcome,
    pub sitemap: sitemap::Change,
    pub homepage: Option<homepage::Outcome>,
    pub skipped: Vec<Skipped>,
}

/// Runs the publishing sequence against one site.
pub struct Publisher<'a> {
    pub config: &'a Config,
    pub topics: &'a TopicPicker,
}

impl Publisher<'_> {
    /// Publishes one post as of `now`.
    pub fn run(&self, generator: &dyn Generator, now: DateTime<Utc>) -> Result<Report> {
        let config = self.config;
        let today = date::publishing_date(now);
        info!(date = %date::iso(today), "Starting publishing run");

        util::create_dir_all(&config.blog_dir)?;
        if index::ensure_exists(&config.blog_index, &config.site_name)? {
            info!(path = %config.blog_index.display(), "Created listing page");
        }
        if render::ensure_styles(&config.blog_dir.join(STYLESHEET))? {
            info!("Created stylesheet");
        }
        let taken = post::slugs(&post::scan(&config.blog_dir)?);

        let selection = self.topics.select(today);
        if selection.substituted() {
            warn!(drawn = %selection.drawn, topic = %selection.topic, "Topic is blocked, using fallback");
        }
        info!(topic = %selection.topic, "Generating article");

        let (draft, outcome) = match generator.generate(&selection.topic) {
            Ok(draft) => (draft, Outcome::Generated),
            Err(err) => {
                warn!(error = %err, "Generation failed, publishing placeholder");
                (ArticleDraft::placeholder(now), Outcome::Placeholder)
            }
        };

        let slug = slugs::allocate(draft.slug_hint(), &taken);
        let renderer = Renderer {
            site_url: &config.site_url,
            site_name: &config.site_name,
        };
        let html = renderer.render(
            &slug,
            draft.title(),
            draft.description(),
            draft.tags(),
            draft.body(),
            today,
        )?;
        let path = config.blog_dir.join(format!("{}.{}", slug, post::EXTENSION));
        util::write(&path, html)?;
        info!(slug = %slug, path = %path.display(), ?outcome, "Wrote post");

        let mut skipped = Vec::new();
        match index::prepend(&config.blog_index, &slug, draft.title(), today) {
            Ok(()) => debug!("Updated listing page"),
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "Skipping listing page");
                skipped.push(Skipped::Index(err.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        let change = sitemap::upsert(&config.sitemap, &config.site_url, &slug, today)?;
        debug!(?change, "Updated sitemap");

        let rebuilder = Rebuilder {
            posts_dir: &config.blog_dir,
            listing_page: &config.blog_index,
            site_name: &config.site_name,
            max_items: config.home_latest_count,
        };
        let homepage = match rebuilder.rebuild(&config.home_index) {
            Ok(homepage::Outcome::NoMarkers) => {
                warn!(path = %config.home_index.display(), "Homepage has no latest-posts markers");
                skipped.push(Skipped::Homepage(String::from("missing markers")));
                Some(homepage::Outcome::NoMarkers)
            }
            Ok(outcome) => {
                debug!(?outcome, "Rebuilt homepage list");
                Some(outcome)
            }
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "Skipping homepage");
                skipped.push(Skipped::Homepage(err.to_string()));
                None
            }
            Err(err) => return Err(err.into()),
        };

        let mut log = RunLog::load(&config.memory_file)?;
        log.record(today, &slug);
        log.save(&config.memory_file)?;

        Ok(Report {
            slug,
            title: draft.title().to_owned(),
            topic: selection.topic,
            path,
            outcome,
            sitemap: change,
            homepage,
            skipped,
        })
    }
}

type Result<T> = std::result::Result<T, Error>;

/// A failure that stops a run.
#[derive(Debug)]
pub enum Error {
    /// Returned when a directory, post or stylesheet can't be written.
    File(FileError),

    /// Returned when the posts directory can't be listed.
    Posts(post::Error),

    /// Returned when the post fails to render.
    Render(render::Error),

    Index(index::Error),
    Sitemap(sitemap::Error),
    Homepage(homepage::Error),
    RunLog(runlog::Error),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::File(err) => write!(f, "Writing {}", err),
            Error::Posts(err) => write!(f, "{}", err),
            Error::Render(err) => write!(f, "{}", err),
            Error::Index(err) => write!(f, "{}", err),
            Error::Sitemap(err) => write!(f, "{}", err),
            Error::Homepage(err) => write!(f, "{}", err),
            Error::RunLog(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::File(err) => Some(err),
            Error::Posts(err) => Some(err),
            Error::Render(err) => Some(err),
            Error::Index(err) => Some(err),
            Error::Sitemap(err) => Some(err),
            Error::Homepage(err) => Some(err),
            Error::RunLog(err) => Some(err),
        }
    }
}

impl From<FileError> for Error {
    /// Converts [`FileError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: FileError) -> Error {
        Error::File(err)
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

impl From<index::Error> for Error {
    /// Converts [`index::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: index::Error) -> Error {
        Error::Index(err)
    }
}

impl From<sitemap::Error> for Error {
    /// Converts [`sitemap::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: sitemap::Error) -> Error {
        Error::Sitemap(err)
    }
}

impl From<homepage::Error> for Error {
    /// Converts [`homepage::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: homepage::Error) -> Error {
        Error::Homepage(err)
    }
}

impl From<runlog::Error> for Error {
    /// Converts [`runlog::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: runlog::Error) -> Error {
        Error::RunLog(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::provider;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    struct Fixed;

    impl Generator for Fixed {
        fn generate(&self, _topic: &str) -> std::result::Result<ArticleDraft, provider::Error> {
            Ok(ArticleDraft::new(
                "Fixed title",
                None,
                "desc",
                vec!["t"],
                String::from("<p>body</p>"),
            )?)
        }
    }

    fn config(root: &std::path::Path) -> Config {
        let root = root.display().to_string();
        Config::from_vars(vec![
            ("BLOG_DIR", format!("{}/blog", root)),
            ("HOME_INDEX_PATH", format!("{}/index.html", root)),
            ("SITEMAP_PATH", format!("{}/sitemap.xml", root)),
            ("MEMORY_FILE", format!("{}/.post_memory.json", root)),
        ])
        .unwrap()
    }

    #[test]
    fn test_run_reports_missing_index_marker() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        fs::create_dir_all(&config.blog_dir).unwrap();
        fs::write(&config.blog_index, "<html><ol></ol></html>").unwrap();

        let topics = TopicPicker::default();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();
        let report = Publisher {
            config: &config,
            topics: &topics,
        }
        .run(&Fixed, now)?;

        assert_eq!("fixed-title", report.slug);
        assert_eq!(Outcome::Generated, report.outcome);
        assert_eq!(Some(homepage::Outcome::NoHomepage), report.homepage);
        assert!(matches!(report.skipped.as_slice(), [Skipped::Index(_)]));
        assert_eq!(
            "<html><ol></ol></html>",
            fs::read_to_string(&config.blog_index).unwrap()
        );
        assert!(config.sitemap.exists());
        assert!(config.blog_dir.join("styles.css").exists());
        Ok(())
    }

    #[test]
    fn test_run_reserves_listing_page_slug() -> Result<()> {
        struct Index;
        impl Generator for Index {
            fn generate(&self, _topic: &str) -> std::result::Result<ArticleDraft, provider::Error> {
                Ok(ArticleDraft::new("Index", None, "", Vec::<&str>::new(), String::new())?)
            }
        }

        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let topics = TopicPicker::default();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();
        let report = Publisher {
            config: &config,
            topics: &topics,
        }
        .run(&Index, now)?;

        assert_eq!("index-2", report.slug);
        assert!(fs::read_to_string(&config.blog_index)
            .unwrap()
            .contains("<ul id=\"posts\">"));
        Ok(())
    }

    #[test]
    fn test_run_fails_when_sitemap_cannot_be_written() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        fs::create_dir_all(&config.sitemap).unwrap();

        let topics = TopicPicker::default();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();
        let result = Publisher {
            config: &config,
            topics: &topics,
        }
        .run(&Fixed, now);

        assert!(matches!(result, Err(Error::Sitemap(sitemap::Error::File(_)))));
        assert!(config.blog_dir.join("fixed-title.html").exists());
        assert!(!config.memory_file.exists());
    }
}
