use chrono::{DateTime, TimeZone, Utc};
use daybook::config::Config;
use daybook::draft::{ArticleDraft, PLACEHOLDER_TITLE};
use daybook::provider::{self, Generator, RetryPolicy};
use daybook::publish::{self, Outcome, Publisher, Report};
use daybook::sitemap::Sitemap;
use daybook::topic::{TopicPicker, FALLBACK_TOPIC};
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const HOME: &str = r#"<!doctype html>
<html>
<body>
  <h1>Home</h1>
  <ul>
    <!-- LATEST_POSTS_START -->
    <!-- LATEST_POSTS_END -->
  </ul>
</body>
</html>
"#;

/// Fails every attempt its retry policy allows.
struct Failing {
    retry: RetryPolicy,
    calls: Cell<u32>,
}

impl Generator for Failing {
    fn generate(&self, _topic: &str) -> Result<ArticleDraft, provider::Error> {
        self.retry.retry(|_| {
            self.calls.set(self.calls.get() + 1);
            Err(provider::Error::NoJson)
        })
    }
}

/// Returns the same draft every time and remembers the topics it was given.
struct Recording {
    topics: RefCell<Vec<String>>,
}

impl Recording {
    fn new() -> Recording {
        Recording {
            topics: RefCell::new(Vec::new()),
        }
    }
}

impl Generator for Recording {
    fn generate(&self, topic: &str) -> Result<ArticleDraft, provider::Error> {
        self.topics.borrow_mut().push(topic.to_owned());
        Ok(ArticleDraft::new(
            "Redis Caching",
            Some("redis-caching"),
            "Caching with Redis.",
            vec!["redis", "caching"],
            String::from("<p><strong>TL;DR:</strong> cache it.</p>"),
        )?)
    }
}

struct Site {
    _root: TempDir,
    config: Config,
}

impl Site {
    fn new() -> Site {
        let root = TempDir::new().unwrap();
        let path = |name: &str| root.path().join(name).display().to_string();
        let config = Config::from_vars(vec![
            ("SITE_URL", String::from("https://example.com")),
            ("SITE_NAME", String::from("Example")),
            ("BLOG_DIR", path("blog")),
            ("HOME_INDEX_PATH", path("index.html")),
            ("SITEMAP_PATH", path("sitemap.xml")),
            ("MEMORY_FILE", path(".post_memory.json")),
        ])
        .unwrap();
        Site {
            _root: root,
            config,
        }
    }

    fn run(&self, generator: &dyn Generator, topics: &TopicPicker, now: DateTime<Utc>) -> Report {
        Publisher {
            config: &self.config,
            topics,
        }
        .run(generator, now)
        .unwrap()
    }

    fn read(&self, path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    fn post_files(&self) -> Vec<String> {
        let mut posts: Vec<String> = fs::read_dir(&self.config.blog_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".html") && name != "index.html")
            .collect();
        posts.sort();
        posts
    }

    fn sitemap_locs(&self) -> Vec<String> {
        Sitemap::parse(&self.read(&self.config.sitemap))
            .unwrap()
            .entries()
            .map(|url| url.child("loc").unwrap().text())
            .collect()
    }
}

fn morning(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, 3, 30, 0).unwrap()
}

#[test]
fn test_placeholder_when_generation_fails() {
    let site = Site::new();
    let generator = Failing {
        retry: RetryPolicy {
            attempts: 3,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        },
        calls: Cell::new(0),
    };

    let report = site.run(&generator, &TopicPicker::default(), morning(1));

    assert_eq!(3, generator.calls.get());
    assert_eq!(Outcome::Placeholder, report.outcome);
    assert_eq!(PLACEHOLDER_TITLE, report.title);
    assert_eq!("publishing-temporarily-unavailable", report.slug);
    assert!(report.skipped.is_empty());

    assert_eq!(vec!["publishing-temporarily-unavailable.html"], site.post_files());
    let post = site.read(&report.path);
    assert!(post.contains("<title>Publishing temporarily unavailable • Example</title>"));

    let index = site.read(&site.config.blog_index);
    assert_eq!(1, index.matches("<li>").count());
    assert!(index.contains(
        "<li><a href=\"/blog/publishing-temporarily-unavailable.html\">Publishing temporarily unavailable</a> <small>2024-06-01</small></li>"
    ));

    assert_eq!(
        vec![
            "https://example.com/",
            "https://example.com/blog/publishing-temporarily-unavailable.html",
        ],
        site.sitemap_locs()
    );

    let log: serde_json::Value =
        serde_json::from_str(&site.read(&site.config.memory_file)).unwrap();
    assert_eq!(
        serde_json::json!({"published": {"2024-06-01": ["publishing-temporarily-unavailable"]}}),
        log
    );
}

#[test]
fn test_blocked_topic_uses_fallback() {
    let site = Site::new();
    let generator = Recording::new();
    let topics = TopicPicker {
        buckets: vec![String::from("Casino growth hacks")],
        ..TopicPicker::default()
    };

    let report = site.run(&generator, &topics, morning(1));

    assert_eq!(vec![FALLBACK_TOPIC], *generator.topics.borrow());
    assert_eq!(FALLBACK_TOPIC, report.topic);
    assert_eq!(Outcome::Generated, report.outcome);
}

#[test]
fn test_same_day_reruns_get_fresh_slugs() {
    let site = Site::new();
    let generator = Recording::new();
    let topics = TopicPicker::default();

    let first = site.run(&generator, &topics, morning(2));
    let second = site.run(&generator, &topics, morning(2));

    assert_eq!("redis-caching", first.slug);
    assert_eq!("redis-caching-2", second.slug);

    // same day, same topic
    let asked = generator.topics.borrow();
    assert_eq!(asked[0], asked[1]);

    assert_eq!(vec!["redis-caching-2.html", "redis-caching.html"], site.post_files());

    let index = site.read(&site.config.blog_index);
    let newer = index.find("/blog/redis-caching-2.html").unwrap();
    let older = index.find("/blog/redis-caching.html").unwrap();
    assert!(newer < older);

    assert_eq!(
        vec![
            "https://example.com/",
            "https://example.com/blog/redis-caching.html",
            "https://example.com/blog/redis-caching-2.html",
        ],
        site.sitemap_locs()
    );

    let log: serde_json::Value =
        serde_json::from_str(&site.read(&site.config.memory_file)).unwrap();
    assert_eq!(
        serde_json::json!(["redis-caching", "redis-caching-2"]),
        log["published"]["2024-06-02"]
    );
}

#[test]
fn test_generated_post_and_homepage() {
    let site = Site::new();
    fs::write(&site.config.home_index, HOME).unwrap();
    let generator = Recording::new();

    let report = site.run(&generator, &TopicPicker::default(), morning(3));

    assert_eq!(Outcome::Generated, report.outcome);
    assert_eq!(Some(daybook::homepage::Outcome::Updated), report.homepage);

    let post = site.read(&report.path);
    assert!(post.contains(r#"<link rel="canonical" href="https://example.com/blog/redis-caching.html">"#));
    assert!(post.contains(r#"<meta name="keywords" content="redis, caching">"#));
    assert!(post.contains("<p><strong>TL;DR:</strong> cache it.</p>"));
    assert!(post.contains("<p>© 2024 Example</p>"));
    assert!(site.config.blog_dir.join(publish::STYLESHEET).exists());

    let home = site.read(&site.config.home_index);
    assert!(home.contains(
        "<!-- LATEST_POSTS_START -->\n          <li><a href=\"/blog/redis-caching.html\">Redis Caching</a></li>\n        <!-- LATEST_POSTS_END -->"
    ));
    assert!(home.starts_with("<!doctype html>\n<html>\n<body>\n  <h1>Home</h1>"));
}

#[test]
fn test_lastmod_uses_publishing_offset() {
    let site = Site::new();
    let generator = Recording::new();

    // 20:00 UTC is already the next day at UTC+05:30
    let late = Utc.with_ymd_and_hms(2024, 6, 4, 20, 0, 0).unwrap();
    site.run(&generator, &TopicPicker::default(), late);

    let sitemap = Sitemap::parse(&site.read(&site.config.sitemap)).unwrap();
    let entry = sitemap
        .find("https://example.com/blog/redis-caching.html")
        .unwrap();
    assert_eq!("2024-06-05", entry.child("lastmod").unwrap().text());
}
