//! Tolerant tag scanner over raw feed markup.
//!
//! Upstream feeds are semi-structured at best: unknown entities, mismatched
//! end tags and namespace prefixes that are never declared all show up in the
//! wild. [`Scanner`] walks the document with `quick_xml` and yields a flat
//! stream of [`Node`]s carrying byte spans into the original input, so callers
//! can cut out the exact bytes of a tag. Names and attribute keys are compared
//! on their local part, case-insensitively; attribute order and quoting do not
//! matter.
//!
//! A tokenizer error ends the stream. Everything seen up to that point has
//! already been yielded.

use std::borrow::Cow;
use std::ops::Range;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// An opening or self-closing tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Qualified name as written, e.g. `podcast:remoteItem`.
    pub name: String,
    /// Attributes in document order with unescaped values.
    pub attrs: Vec<(String, String)>,
    /// Byte range of the tag in the scanned input.
    pub span: Range<usize>,
}

impl Tag {
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// `true` when the local name equals `local`, ignoring ASCII case.
    pub fn is(&self, local: &str) -> bool {
        self.local_name().eq_ignore_ascii_case(local)
    }

    /// First attribute whose local key equals `key`, ignoring ASCII case.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| local_part(k).eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Like [`Tag::attr`] but treats blank values as missing.
    pub fn non_empty_attr(&self, key: &str) -> Option<&str> {
        self.attr(key).map(str::trim).filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Open(Tag),
    Empty(Tag),
    Close { name: String, span: Range<usize> },
    /// Unescaped character data or CDATA content.
    Text(String),
}

impl Node {
    /// `true` for a closing tag whose local name equals `local`.
    pub fn closes(&self, local: &str) -> bool {
        matches!(self, Node::Close { name, .. } if local_part(name).eq_ignore_ascii_case(local))
    }
}

/// Streaming scanner; see the module docs.
pub struct Scanner<'a> {
    reader: Reader<&'a [u8]>,
    done: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        let mut reader = Reader::from_str(src);
        let config = reader.config_mut();
        // Spans rely on whitespace being reported, not skipped.
        config.trim_text(false);
        config.check_end_names = false;
        config.expand_empty_elements = false;
        Self {
            reader,
            done: false,
        }
    }

    fn position(&self) -> usize {
        self.reader.buffer_position() as usize
    }
}

impl Iterator for Scanner<'_> {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        while !self.done {
            let start = Scanner::position(self);
            match self.reader.read_event() {
                Ok(Event::Start(e)) => return Some(Node::Open(to_tag(&e, start..Scanner::position(self)))),
                Ok(Event::Empty(e)) => return Some(Node::Empty(to_tag(&e, start..Scanner::position(self)))),
                Ok(Event::End(e)) => {
                    return Some(Node::Close {
                        name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                        span: start..Scanner::position(self),
                    })
                }
                Ok(Event::Text(t)) => {
                    let text = match t.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(_) => String::from_utf8_lossy(&t).into_owned(),
                    };
                    return Some(Node::Text(text));
                }
                Ok(Event::CData(c)) => {
                    return Some(Node::Text(String::from_utf8_lossy(&c).into_owned()))
                }
                Ok(Event::Eof) => self.done = true,
                Ok(_) => continue,
                Err(err) => {
                    tracing::debug!(position = start, error = %err, "markup scan stopped early");
                    self.done = true;
                }
            }
        }
        None
    }
}

fn to_tag(e: &BytesStart<'_>, span: Range<usize>) -> Tag {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let attrs = e
        .attributes()
        .with_checks(false)
        .filter_map(Result::ok)
        .map(|a| {
            let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
            let value = match a.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
            };
            (key, value)
        })
        .collect();
    Tag { name, attrs, span }
}

/// Escape `&`, `<`, `>`, `'` and `"` for use in text or attribute values.
pub fn escape(text: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(text)
}

fn local_part(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Collect the text content up to the close of the element just opened.
///
/// Nested elements contribute their text too. Returns the trimmed text, or
/// `None` when the element is empty.
pub fn element_text<'a>(scanner: &mut Scanner<'a>, local: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut text = String::new();
    for node in scanner.by_ref() {
        match node {
            Node::Text(t) => text.push_str(&t),
            Node::Open(ref tag) if tag.is(local) => depth += 1,
            ref close if close.closes(local) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
