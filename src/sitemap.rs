//! Sitemap maintenance.
//!
//! The sitemap on disk is parsed into a small element tree, one entry is
//! inserted or updated, and the tree is written back out:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url>
//!     <loc>https://example.com/</loc>
//!     <lastmod>2025-01-01</lastmod>
//!     <priority>1.0</priority>
//!   </url>
//! </urlset>
//! ```
//!
//! Entries are keyed by `<loc>`. Updating an entry only rewrites its
//! `<lastmod>`; everything else in the document survives the round trip,
//! including elements this module knows nothing about. New entries are appended
//! in insertion order. A sitemap that fails to parse is replaced by a fresh one
//! rather than blocking the publish.

use chrono::NaiveDate;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fmt;
use std::io;
use std::path::Path;
use tracing::warn;

use crate::date;
use crate::render::post_url;
use crate::util::{self, FileError};

/// XML namespace for sitemaps.
pub const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Priority of the seeded site-root entry.
pub const HOME_PRIORITY: &str = "1.0";

/// Priority of post entries.
pub const POST_PRIORITY: &str = "0.7";

/// An XML element with its attributes and children in document order.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Element(Element),

    /// Character data, unescaped. Whitespace-only runs are not kept.
    Text(String),

    /// Comment contents, verbatim.
    Comment(String),
}

/// The part of a (possibly prefixed) XML name after the colon.
fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

impl Element {
    pub fn new(name: &str) -> Element {
        Element {
            name: name.to_owned(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// A leaf element containing only `text`.
    pub fn with_text(name: &str, text: &str) -> Element {
        let mut element = Element::new(name);
        element.children.push(Node::Text(text.to_owned()));
        element
    }

    fn is(&self, local: &str) -> bool {
        local_name(&self.name) == local
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// The first child element named `local`, ignoring namespace prefixes.
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(local))
    }

    /// The concatenated text of this element's direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn set_text(&mut self, text: &str) {
        self.children = vec![Node::Text(text.to_owned())];
    }
}

/// A sitemap entry as this module creates it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlEntry {
    pub loc: String,
    pub lastmod: String,
    pub priority: String,
}

impl From<&UrlEntry> for Element {
    fn from(entry: &UrlEntry) -> Element {
        let mut url = Element::new("url");
        for (name, text) in &[
            ("loc", &entry.loc),
            ("lastmod", &entry.lastmod),
            ("priority", &entry.priority),
        ] {
            url.children.push(Node::Element(Element::with_text(name, text)));
        }
        url
    }
}

/// What [`Sitemap::upsert`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    /// A new entry was appended.
    Inserted,

    /// An existing entry's `<lastmod>` was updated.
    Updated,
}

/// A parsed sitemap document.
#[derive(Clone, Debug, PartialEq)]
pub struct Sitemap {
    root: Element,
}

impl Default for Sitemap {
    /// An empty `<urlset>` in the sitemap namespace.
    fn default() -> Sitemap {
        let mut root = Element::new("urlset");
        root.attributes.push(("xmlns".to_owned(), SITEMAP_NS.to_owned()));
        Sitemap { root }
    }
}

impl Sitemap {
    /// A new sitemap with a single entry for the site root.
    pub fn seeded(site_url: &str, lastmod: &str) -> Sitemap {
        let mut sitemap = Sitemap::default();
        sitemap.push(&UrlEntry {
            loc: format!("{}/", site_url.trim_end_matches('/')),
            lastmod: lastmod.to_owned(),
            priority: HOME_PRIORITY.to_owned(),
        });
        sitemap
    }

    /// Parses a sitemap document. The document must be well-formed XML with a
    /// single `<urlset>` root.
    pub fn parse(xml: &str) -> ParseResult<Sitemap> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader.read_event().map_err(|err| ParseError::Xml {
                position: reader.error_position(),
                err,
            })?;
            match event {
                Event::Start(start) => stack.push(element(&start)?),
                Event::Empty(start) => {
                    let element = element(&start)?;
                    attach(&mut stack, &mut root, Node::Element(element))?;
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or(ParseError::Unbalanced)?;
                    attach(&mut stack, &mut root, Node::Element(element))?;
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|err| ParseError::Xml {
                        position: reader.buffer_position(),
                        err,
                    })?;
                    if !text.trim().is_empty() {
                        attach(&mut stack, &mut root, Node::Text(text.into_owned()))?;
                    }
                }
                Event::CData(cdata) => {
                    let text = String::from_utf8_lossy(&cdata).into_owned();
                    attach(&mut stack, &mut root, Node::Text(text))?;
                }
                Event::Comment(comment) => {
                    // comments outside the root element are dropped
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&comment).into_owned();
                        parent.children.push(Node::Comment(text));
                    }
                }
                Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        if !stack.is_empty() {
            return Err(ParseError::Unbalanced);
        }
        match root {
            Some(root) if root.is("urlset") => Ok(Sitemap { root }),
            Some(root) => Err(ParseError::UnexpectedRoot(root.name)),
            None => Err(ParseError::Empty),
        }
    }

    /// The `<url>` entries in document order.
    pub fn entries(&self) -> impl Iterator<Item = &Element> {
        self.root.elements().filter(|e| e.is("url"))
    }

    /// The entry whose `<loc>` is `loc`, if any.
    pub fn find(&self, loc: &str) -> Option<&Element> {
        self.entries().find(|e| has_loc(e, loc))
    }

    fn push(&mut self, entry: &UrlEntry) {
        self.root.children.push(Node::Element(entry.into()));
    }

    /// Sets the `<lastmod>` of the entry for `loc`, or appends a new entry if
    /// there is none. Nothing else in the document changes.
    pub fn upsert(&mut self, loc: &str, lastmod: &str, priority: &str) -> Change {
        for node in self.root.children.iter_mut() {
            let url = match node {
                Node::Element(url) if url.is("url") && has_loc(url, loc) => url,
                _ => continue,
            };

            let existing = url.children.iter_mut().find_map(|node| match node {
                Node::Element(e) if e.is("lastmod") => Some(e),
                _ => None,
            });
            match existing {
                Some(element) => element.set_text(lastmod),
                None => {
                    // sitemap order is loc, lastmod, ...
                    let at = url
                        .children
                        .iter()
                        .position(|node| matches!(node, Node::Element(e) if e.is("loc")))
                        .map_or(0, |i| i + 1);
                    let name = match url.name.split_once(':') {
                        Some((prefix, _)) => format!("{}:lastmod", prefix),
                        None => String::from("lastmod"),
                    };
                    url.children
                        .insert(at, Node::Element(Element::with_text(&name, lastmod)));
                }
            }
            return Change::Updated;
        }

        self.push(&UrlEntry {
            loc: loc.to_owned(),
            lastmod: lastmod.to_owned(),
            priority: priority.to_owned(),
        });
        Change::Inserted
    }

    /// Serializes the document with two-space indentation and a trailing
    /// newline.
    pub fn to_xml(&self) -> io::Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        write_element(&mut writer, &self.root)?;
        let mut xml = String::from_utf8(writer.into_inner())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        xml.push('\n');
        Ok(xml)
    }
}

fn has_loc(url: &Element, loc: &str) -> bool {
    url.child("loc").map_or(false, |l| l.text().trim() == loc)
}

fn element(start: &BytesStart<'_>) -> ParseResult<Element> {
    let mut element = Element::new(&String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::Xml {
            position: 0,
            err: e.into(),
        })?;
        let value = attr.unescape_value().map_err(|err| ParseError::Xml { position: 0, err })?;
        element.attributes.push((
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            value.into_owned(),
        ));
    }
    Ok(element)
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, node: Node) -> ParseResult<()> {
    match (stack.last_mut(), node) {
        (Some(parent), node) => parent.children.push(node),
        (None, Node::Element(element)) => match root {
            None => *root = Some(element),
            Some(_) => return Err(ParseError::MultipleRoots),
        },
        (None, Node::Text(_)) => return Err(ParseError::TextOutsideRoot),
        (None, Node::Comment(_)) => {}
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> io::Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        return writer.write_event(Event::Empty(start));
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
            Node::Comment(text) => {
                writer.write_event(Event::Comment(BytesText::from_escaped(text.as_str())))?
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))
}

/// Inserts or refreshes the entry for the post with `slug` in the sitemap at
/// `path`. A missing sitemap is created with an entry for the site root; a
/// sitemap that can't be parsed is rebuilt the same way.
pub fn upsert(path: &Path, site_url: &str, slug: &str, today: NaiveDate) -> Result<Change> {
    let lastmod = date::iso(today);
    let mut sitemap = match util::read_optional(path)? {
        None => Sitemap::seeded(site_url, &lastmod),
        Some(xml) => match Sitemap::parse(&xml) {
            Ok(sitemap) => sitemap,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Sitemap is malformed, rebuilding it");
                Sitemap::seeded(site_url, &lastmod)
            }
        },
    };

    let change = sitemap.upsert(&post_url(site_url, slug), &lastmod, POST_PRIORITY);
    let xml = sitemap.to_xml().map_err(Error::Serialize)?;
    util::write(path, xml)?;
    Ok(change)
}

type ParseResult<T> = std::result::Result<T, ParseError>;

/// Describes why a sitemap document was rejected.
#[derive(Debug)]
pub enum ParseError {
    /// The document isn't well-formed XML.
    Xml { position: u64, err: quick_xml::Error },

    /// Start and end tags don't pair up.
    Unbalanced,

    /// There is more than one top-level element.
    MultipleRoots,

    /// There is non-whitespace text outside the root element.
    TextOutsideRoot,

    /// The root element isn't `<urlset>`.
    UnexpectedRoot(String),

    /// The document has no elements at all.
    Empty,
}

impl fmt::Display for ParseError {
    /// Implements [`fmt::Display`] for [`ParseError`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::Xml { position, err } => write!(f, "at byte {}: {}", position, err),
            ParseError::Unbalanced => write!(f, "unbalanced start and end tags"),
            ParseError::MultipleRoots => write!(f, "more than one root element"),
            ParseError::TextOutsideRoot => write!(f, "text outside the root element"),
            ParseError::UnexpectedRoot(name) => {
                write!(f, "root element is <{}>, expected <urlset>", name)
            }
            ParseError::Empty => write!(f, "no root element"),
        }
    }
}

impl std::error::Error for ParseError {
    /// Implements [`std::error::Error`] for [`ParseError`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Xml { err, .. } => Some(err),
            _ => None,
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a problem writing the sitemap. Malformed input is not an error;
/// see [`upsert`].
#[derive(Debug)]
pub enum Error {
    /// Returned when the document can't be serialized.
    Serialize(io::Error),

    /// Returned for I/O problems reading or writing the sitemap file.
    File(FileError),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Serialize(err) => write!(f, "Serializing sitemap: {}", err),
            Error::File(err) => write!(f, "Updating sitemap {}", err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Serialize(err) => Some(err),
            Error::File(err) => Some(err),
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
