//! Minimal streaming XML writer.
//!
//! The archive documents use a small, regular subset of XML, so the writer
//! is hand-rolled over any `io::Write` rather than pulled from a markup
//! crate. Element text is written as given; callers run cell text through
//! the escape transform first. Attribute values get minimal XML escaping
//! here because they never carry cell data verbatim.

use std::io::Write;

use crate::error::Result;

/// Streaming writer with optional pretty-printing (two-space indent).
pub struct XmlWriter<W: Write> {
    out: W,
    pretty: bool,
    depth: usize,
}

impl<W: Write> XmlWriter<W> {
    pub fn new(out: W, pretty: bool) -> Self {
        Self {
            out,
            pretty,
            depth: 0,
        }
    }

    /// Write the XML declaration. Call first, once.
    pub fn declaration(&mut self) -> Result<()> {
        self.out
            .write_all(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
        self.newline()?;
        Ok(())
    }

    /// Open an element that will contain child elements.
    pub fn open_tag(&mut self, name: &str) -> Result<()> {
        self.indent()?;
        write!(self.out, "<{}>", name)?;
        self.newline()?;
        self.depth += 1;
        Ok(())
    }

    /// Close an element opened with [`Self::open_tag`] or
    /// [`Self::end_open_tag`].
    pub fn close_tag(&mut self, name: &str) -> Result<()> {
        self.depth -= 1;
        self.indent()?;
        write!(self.out, "</{}>", name)?;
        self.newline()?;
        Ok(())
    }

    /// Begin an element whose attributes follow. Finish with
    /// [`Self::end_open_tag`] or [`Self::end_empty_tag`].
    pub fn begin_open_tag(&mut self, name: &str) -> Result<()> {
        self.indent()?;
        write!(self.out, "<{}", name)?;
        Ok(())
    }

    /// Write one attribute. Valid only between `begin_open_tag` and
    /// `end_open_tag`/`end_empty_tag`.
    pub fn attribute(&mut self, name: &str, value: &str) -> Result<()> {
        write!(self.out, " {}=\"{}\"", name, escape_attribute(value))?;
        Ok(())
    }

    /// Close the attribute list, leaving the element open for children.
    pub fn end_open_tag(&mut self) -> Result<()> {
        self.out.write_all(b">")?;
        self.newline()?;
        self.depth += 1;
        Ok(())
    }

    /// Close the attribute list as a self-closing element.
    pub fn end_empty_tag(&mut self) -> Result<()> {
        self.out.write_all(b"/>")?;
        self.newline()?;
        Ok(())
    }

    /// Self-closing element without attributes.
    pub fn empty_element(&mut self, name: &str) -> Result<()> {
        self.indent()?;
        write!(self.out, "<{}/>", name)?;
        self.newline()?;
        Ok(())
    }

    /// Element with text content on one line. The text is written as
    /// given; escape it first.
    pub fn text_element(&mut self, name: &str, raw_text: &str) -> Result<()> {
        self.indent()?;
        write!(self.out, "<{}>{}</{}>", name, raw_text, name)?;
        self.newline()?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Consume the writer and return the underlying output.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn indent(&mut self) -> Result<()> {
        if self.pretty {
            for _ in 0..self.depth {
                self.out.write_all(b"  ")?;
            }
        }
        Ok(())
    }

    fn newline(&mut self) -> Result<()> {
        if self.pretty {
            self.out.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Minimal escaping for attribute values in double quotes.
fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(pretty: bool, f: impl FnOnce(&mut XmlWriter<Vec<u8>>)) -> String {
        let mut w = XmlWriter::new(Vec::new(), pretty);
        f(&mut w);
        String::from_utf8(w.into_inner()).unwrap()
    }

    #[test]
    fn test_pretty_nesting() {
        let xml = render(true, |w| {
            w.declaration().unwrap();
            w.open_tag("table").unwrap();
            w.open_tag("row").unwrap();
            w.text_element("c1", "v").unwrap();
            w.empty_element("c2").unwrap();
            w.close_tag("row").unwrap();
            w.close_tag("table").unwrap();
        });
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <table>\n  <row>\n    <c1>v</c1>\n    <c2/>\n  </row>\n</table>\n"
        );
    }

    #[test]
    fn test_compact_has_no_whitespace() {
        let xml = render(false, |w| {
            w.open_tag("table").unwrap();
            w.text_element("c1", "v").unwrap();
            w.close_tag("table").unwrap();
        });
        assert_eq!(xml, "<table><c1>v</c1></table>");
    }

    #[test]
    fn test_attributes() {
        let xml = render(false, |w| {
            w.begin_open_tag("c1").unwrap();
            w.attribute("file", "a\"b&c").unwrap();
            w.attribute("length", "12").unwrap();
            w.end_empty_tag().unwrap();
        });
        assert_eq!(xml, "<c1 file=\"a&quot;b&amp;c\" length=\"12\"/>");
    }
}
