//! Reversible cell text escape transform.
//!
//! Control characters and the backslash itself become `\uXXXX` escapes;
//! the five XML metacharacters become their standard entities. A single
//! literal space is preserved, but every space inside a run of two or more
//! is escaped as ` ` so XML whitespace collapsing cannot merge them.
//! This rule is asymmetric on purpose: it is a wire-format quirk kept for
//! compatibility with existing archives.

/// Whether a character must travel as a `\uXXXX` escape.
fn needs_unicode_escape(c: char) -> bool {
    matches!(c as u32,
        0x00..=0x08 | 0x0B | 0x0C | 0x0E..=0x1F | 0x7F..=0x9F | 0xFFFE | 0xFFFF)
}

/// Escape cell text for embedding as element content.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ' ' {
            let mut run = 1;
            while chars.peek() == Some(&' ') {
                chars.next();
                run += 1;
            }
            if run == 1 {
                out.push(' ');
            } else {
                for _ in 0..run {
                    out.push_str("\\u0020");
                }
            }
            continue;
        }
        match c {
            '\\' => out.push_str("\\u005c"),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ if needs_unicode_escape(c) => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            _ => out.push(c),
        }
    }
    out
}

/// Exact inverse of [`escape`], including the single-space exception.
///
/// Unrecognized escape shapes are kept literally rather than rejected, so
/// decoding never fails.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 5 < bytes.len()
            && bytes[i + 1] == b'u'
            && bytes[i + 2..i + 6].iter().all(u8::is_ascii_hexdigit)
        {
            let hex = &text[i + 2..i + 6];
            // hex digits checked above, the parse cannot fail
            let code = u32::from_str_radix(hex, 16).unwrap_or(0);
            if let Some(c) = char::from_u32(code) {
                out.push(c);
                i += 6;
                continue;
            }
        }
        if bytes[i] == b'&' {
            if let Some(end) = text[i..].find(';').map(|p| i + p) {
                let replacement = match &text[i..=end] {
                    "&amp;" => Some('&'),
                    "&lt;" => Some('<'),
                    "&gt;" => Some('>'),
                    "&quot;" => Some('"'),
                    "&apos;" => Some('\''),
                    _ => None,
                };
                if let Some(c) = replacement {
                    out.push(c);
                    i = end + 1;
                    continue;
                }
            }
        }
        // advance one full char, not one byte
        let c = text[i..].chars().next().unwrap_or('\u{FFFD}');
        out.push(c);
        i += c.len_utf8();
    }
    out
}
