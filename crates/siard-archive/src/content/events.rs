//! Pull-based XML event tokenizer.
//!
//! Yields typed events from the regular XML subset the archive writer
//! emits: start tags with double-quoted attributes, end tags, self-closing
//! tags, character data, declarations and comments (both skipped). Element
//! text is delivered verbatim, entities included; the escape transform's
//! inverse is applied by the consumer, not here. Attribute values get
//! their minimal entity escaping undone because the writer applied it.

use std::collections::VecDeque;
use std::io::Read;

use crate::error::{ArchiveError, Result};

/// One parse event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    StartElement {
        name: String,
        attrs: Vec<(String, String)>,
        /// Whether the tag closed itself (`<c1/>`). A matching
        /// `EndElement` is still delivered. The writer uses self-closing
        /// tags as explicit null markers, so consumers need to tell them
        /// apart from empty elements.
        self_closing: bool,
    },
    EndElement {
        name: String,
    },
    /// Character data, verbatim. Includes inter-element whitespace.
    Text(String),
    Eof,
}

/// Streaming tokenizer over any reader.
pub struct XmlTokenizer<R: Read> {
    input: std::io::Bytes<std::io::BufReader<R>>,
    peeked: Option<u8>,
    pending: VecDeque<XmlEvent>,
}

impl<R: Read> XmlTokenizer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            input: std::io::BufReader::new(reader).bytes(),
            peeked: None,
            pending: VecDeque::new(),
        }
    }

    /// Next event, or [`XmlEvent::Eof`] at end of input.
    pub fn next_event(&mut self) -> Result<XmlEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }

        let first = match self.read_byte()? {
            Some(b) => b,
            None => return Ok(XmlEvent::Eof),
        };

        if first != b'<' {
            // character data until the next tag
            let mut text = vec![first];
            loop {
                match self.read_byte()? {
                    Some(b'<') => {
                        self.peeked = Some(b'<');
                        break;
                    }
                    Some(b) => text.push(b),
                    None => break,
                }
            }
            let text = String::from_utf8(text)
                .map_err(|e| ArchiveError::malformed("<stream>", e.to_string()))?;
            return Ok(XmlEvent::Text(text));
        }

        match self.read_required()? {
            b'/' => {
                let name = self.read_until(b'>')?;
                Ok(XmlEvent::EndElement {
                    name: name.trim().to_string(),
                })
            }
            b'?' => {
                // declaration, skip past "?>"
                loop {
                    if self.read_required()? == b'?' && self.read_required()? == b'>' {
                        break;
                    }
                }
                self.next_event()
            }
            b'!' => {
                self.skip_comment_or_doctype()?;
                self.next_event()
            }
            b => self.read_start_tag(b),
        }
    }

    fn read_start_tag(&mut self, first: u8) -> Result<XmlEvent> {
        let mut name = vec![first];
        let mut attrs = Vec::new();
        let mut self_closing = false;

        // element name
        let terminator = loop {
            let b = self.read_required()?;
            match b {
                b'>' | b'/' => break b,
                b if b.is_ascii_whitespace() => break b,
                _ => name.push(b),
            }
        };
        let name = String::from_utf8(name)
            .map_err(|e| ArchiveError::malformed("<stream>", e.to_string()))?;

        let mut next = terminator;
        loop {
            match next {
                b'>' => break,
                b'/' => {
                    self_closing = true;
                    if self.read_required()? != b'>' {
                        return Err(ArchiveError::malformed(
                            "<stream>",
                            format!("malformed self-closing tag <{}>", name),
                        ));
                    }
                    break;
                }
                b if b.is_ascii_whitespace() => {
                    next = self.read_required()?;
                }
                _ => {
                    let (attr, after) = self.read_attribute(next)?;
                    attrs.push(attr);
                    next = after;
                }
            }
        }

        if self_closing {
            self.pending.push_back(XmlEvent::EndElement {
                name: name.clone(),
            });
        }
        Ok(XmlEvent::StartElement {
            name,
            attrs,
            self_closing,
        })
    }

    /// Parse `name="value"` starting at `first`; returns the attribute and
    /// the byte following the closing quote.
    fn read_attribute(&mut self, first: u8) -> Result<((String, String), u8)> {
        let mut name = vec![first];
        loop {
            let b = self.read_required()?;
            if b == b'=' {
                break;
            }
            if !b.is_ascii_whitespace() {
                name.push(b);
            }
        }
        let mut quote = self.read_required()?;
        while quote.is_ascii_whitespace() {
            quote = self.read_required()?;
        }
        if quote != b'"' {
            return Err(ArchiveError::malformed(
                "<stream>",
                "attribute value is not double-quoted".to_string(),
            ));
        }
        let value = self.read_until(b'"')?;
        let after = self.read_required()?;
        let name = String::from_utf8(name)
            .map_err(|e| ArchiveError::malformed("<stream>", e.to_string()))?;
        Ok(((name, decode_attribute(&value)), after))
    }

    fn skip_comment_or_doctype(&mut self) -> Result<()> {
        // after "<!": either "--...-->" or a doctype-like blob until '>'
        let a = self.read_required()?;
        let b = self.read_required()?;
        if a == b'-' && b == b'-' {
            let mut dashes = 0;
            loop {
                match self.read_required()? {
                    b'-' => dashes += 1,
                    b'>' if dashes >= 2 => return Ok(()),
                    _ => dashes = 0,
                }
            }
        }
        loop {
            if self.read_required()? == b'>' {
                return Ok(());
            }
        }
    }

    fn read_until(&mut self, terminator: u8) -> Result<String> {
        let mut out = Vec::new();
        loop {
            let b = self.read_required()?;
            if b == terminator {
                break;
            }
            out.push(b);
        }
        String::from_utf8(out).map_err(|e| ArchiveError::malformed("<stream>", e.to_string()))
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        if let Some(b) = self.peeked.take() {
            return Ok(Some(b));
        }
        match self.input.next() {
            Some(Ok(b)) => Ok(Some(b)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    fn read_required(&mut self) -> Result<u8> {
        self.read_byte()?.ok_or_else(|| {
            ArchiveError::malformed("<stream>", "unexpected end of document".to_string())
        })
    }
}

impl<R: Read> XmlTokenizer<R> {
    /// Skip events until the start of `name`, returning its attributes.
    pub fn expect_start(&mut self, name: &str) -> Result<Vec<(String, String)>> {
        loop {
            match self.next_event()? {
                XmlEvent::StartElement { name: n, attrs, .. } if n == name => {
                    return Ok(attrs)
                }
                XmlEvent::Eof => {
                    return Err(ArchiveError::malformed(
                        "<stream>",
                        format!("element <{}> not found", name),
                    ))
                }
                _ => {}
            }
        }
    }
}

/// Undo the minimal entity escaping the writer applies to attributes.
fn decode_attribute(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}
