//! Locates managed regions inside HTML documents. Documents are tokenized
//! with a lenient [`quick_xml`] reader and the regions are reported as byte
//! offsets into the original text, so callers can splice new markup in while
//! every byte outside the region stays exactly as it was.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt;
use std::ops::Range;

fn reader(html: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(html);
    let config = reader.config_mut();
    config.trim_text(false);
    config.enable_all_checks(false);
    config.allow_unmatched_ends = true;
    reader
}

fn position(reader: &Reader<&[u8]>) -> usize {
    reader.buffer_position() as usize
}

fn tokenize_error(reader: &Reader<&[u8]>, err: quick_xml::Error) -> Error {
    Error {
        position: reader.error_position() as usize,
        err,
    }
}

fn has_attribute(elem: &BytesStart<'_>, key: &str, value: &str) -> bool {
    elem.html_attributes().flatten().any(|attr| {
        attr.key.as_ref().eq_ignore_ascii_case(key.as_bytes()) && &*attr.value == value.as_bytes()
    })
}

/// Returns the offset just past the first `<{tag} id="{id}">` start tag, or
/// `None` if the document has no such element.
pub fn start_tag_end(html: &str, tag: &str, id: &str) -> Result<Option<usize>> {
    let mut reader = reader(html);
    loop {
        match reader.read_event() {
            Ok(Event::Start(elem)) => {
                if elem.name().as_ref().eq_ignore_ascii_case(tag.as_bytes())
                    && has_attribute(&elem, "id", id)
                {
                    return Ok(Some(position(&reader)));
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(e) => return Err(tokenize_error(&reader, e)),
        }
    }
}

/// Returns the range strictly between the comment `<!-- {start} -->` and the
/// first `<!-- {end} -->` after it. `None` unless both comments are present in
/// that order.
pub fn comment_region(html: &str, start: &str, end: &str) -> Result<Option<Range<usize>>> {
    let mut reader = reader(html);
    let mut region_start: Option<usize> = None;
    loop {
        let before = position(&reader);
        match reader.read_event() {
            Ok(Event::Comment(comment)) => {
                let text = String::from_utf8_lossy(&comment);
                let text = text.trim();
                match region_start {
                    None if text == start => region_start = Some(position(&reader)),
                    Some(from) if text == end => return Ok(Some(from..before)),
                    _ => {}
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(e) => return Err(tokenize_error(&reader, e)),
        }
    }
}

/// Returns the text content of the first `<{tag}>` element, with character
/// references resolved where possible.
pub fn element_text(html: &str, tag: &str) -> Result<Option<String>> {
    let mut reader = reader(html);
    let mut text: Option<String> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(elem)) if text.is_none() => {
                if elem.name().as_ref().eq_ignore_ascii_case(tag.as_bytes()) {
                    text = Some(String::new());
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(buf) = text.as_mut() {
                    match t.unescape() {
                        Ok(unescaped) => buf.push_str(&unescaped),
                        // HTML has named entities XML doesn't know about
                        Err(_) => buf.push_str(&String::from_utf8_lossy(&t)),
                    }
                }
            }
            Ok(Event::End(elem)) => {
                if text.is_some() && elem.name().as_ref().eq_ignore_ascii_case(tag.as_bytes()) {
                    return Ok(text);
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(e) => return Err(tokenize_error(&reader, e)),
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Returned when a document can't be tokenized far enough to find a region.
#[derive(Debug)]
pub struct Error {
    /// Byte offset of the offending markup.
    pub position: usize,

    pub err: quick_xml::Error,
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Markup error at byte {}: {}", self.position, self.err)
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.err)
    }
}
