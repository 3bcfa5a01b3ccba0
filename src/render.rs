//! Renders article drafts into standalone HTML documents. Pages are produced
//! from [`gtmpl`] templates with an `html` function for escaping; templates
//! pass every value through it except the body, which is trusted HTML from
//! the draft.

use chrono::{Datelike, NaiveDate};
use gtmpl::{Context, Template, Value};
use quick_xml::escape::escape;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::util::{self, FileError};

const STYLES: &str = r#".container{max-width:820px;margin:0 auto;padding:16px}
h1{margin-bottom:0}
.desc{color:#555}
.tag{display:inline-block;background:#f1f1f1;border-radius:12px;padding:2px 10px;margin-right:6px;font-size:12px}
pre{overflow:auto;padding:12px;background:#f7f7f7;border-radius:8px}
code{font-family:ui-monospace, SFMono-Regular, Menlo, Consolas, monospace}
hr{border:none;border-top:1px solid #eee;margin:24px 0}
ul#posts{list-style:disc}
"#;

const POST_TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{{ html .title }}{{ .separator }}{{ html .site_name }}</title>
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <meta name="description" content="{{ html .description }}">
  <meta name="keywords" content="{{ html .keywords }}">
  <link rel="canonical" href="{{ html .canonical }}">
  <link rel="stylesheet" href="/blog/styles.css">
  <meta property="og:title" content="{{ html .title }}">
  <meta property="og:description" content="{{ html .description }}">
  <meta property="og:type" content="article">
  <meta property="og:url" content="{{ html .canonical }}">
  <meta property="og:site_name" content="{{ html .site_name }}">
</head>
<body>
  <header class="container">
    <nav><a href="/">← Home</a> · <a href="/blog/">Blog</a></nav>
    <h1>{{ html .title }}</h1>
    <p class="desc">{{ html .description }}</p>
    {{ range .tags }}<span class="tag">{{ html . }}</span>{{ end }}
    <hr>
  </header>
  <main class="container">
    {{ .body }}
  </main>
  <footer class="container">
    <hr>
    <p>© {{ .year }} {{ html .site_name }}</p>
  </footer>
</body>
</html>
"#;

/// Separates a post's title from the site name in its `<title>` element.
pub const TITLE_SEPARATOR: &str = " • ";

/// The canonical URL of the post with `slug`.
pub fn post_url(site_url: &str, slug: &str) -> String {
    format!("{}{}", site_url.trim_end_matches('/'), post_path(slug))
}

/// The site-relative path of the post with `slug`.
pub fn post_path(slug: &str) -> String {
    format!("/blog/{}.html", slug)
}

/// The `html` template function. Escapes `&`, `<`, `>`, `"` and `'` in the
/// textual form of its argument so it is safe in both HTML text and attribute
/// values.
pub fn html(args: &[Value]) -> std::result::Result<Value, String> {
    match args {
        [Value::String(s)] => Ok(Value::String(escape(s.as_str()).into_owned())),
        [value] => Ok(Value::String(escape(value.to_string()).into_owned())),
        _ => Err(String::from("html requires exactly one argument")),
    }
}

/// Parses `text` into a [`Template`] with the `html` function available.
pub fn parse_template(text: &str) -> Result<Template> {
    let mut template = Template::default();
    template.add_func("html", html);
    template.parse(text).map_err(Error::ParseTemplate)?;
    Ok(template)
}

/// Parses `text` and executes it against `value`.
pub fn execute(text: &str, value: Value) -> Result<String> {
    let template = parse_template(text)?;
    let context = Context::from(value).map_err(Error::Template)?;
    template.render(&context).map_err(Error::Template)
}

/// Builds a template object from string fields.
pub fn object<'a>(fields: impl IntoIterator<Item = (&'a str, Value)>) -> Value {
    let m: HashMap<String, Value> = fields
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect();
    Value::Object(m)
}

/// Turns drafts into complete HTML documents for one site.
pub struct Renderer<'a> {
    /// The absolute site root, e.g. `https://example.com`.
    pub site_url: &'a str,

    /// Appended to every page title and shown in the footer.
    pub site_name: &'a str,
}

impl Renderer<'_> {
    /// Renders one post. `body_html` is embedded without escaping; `today`
    /// supplies the footer year.
    pub fn render(
        &self,
        slug: &str,
        title: &str,
        description: &str,
        tags: &[String],
        body_html: &str,
        today: NaiveDate,
    ) -> Result<String> {
        let value = object([
            ("title", Value::from(title)),
            ("description", Value::from(description)),
            ("keywords", Value::from(tags.join(", "))),
            ("tags", Value::from(tags)),
            ("canonical", Value::from(post_url(self.site_url, slug))),
            ("site_name", Value::from(self.site_name)),
            ("separator", Value::from(TITLE_SEPARATOR)),
            ("body", Value::from(body_html)),
            ("year", Value::from(today.year().to_string())),
        ]);
        execute(POST_TEMPLATE, value)
    }
}

/// Writes the shared stylesheet unless it already exists. Returns whether the
/// file was created.
pub fn ensure_styles(path: &Path) -> std::result::Result<bool, FileError> {
    if path.exists() {
        return Ok(false);
    }
    util::write(path, STYLES)?;
    Ok(true)
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a problem rendering a page from a template.
#[derive(Debug)]
pub enum Error {
    /// Returned when a page template doesn't parse.
    ParseTemplate(String),

    /// Returned when a page template fails to execute.
    Template(String),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseTemplate(err) => write!(f, "Parsing template: {}", err),
            Error::Template(err) => write!(f, "Rendering template: {}", err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
