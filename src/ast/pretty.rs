//! Escaping writers used when printing terms and dumping graphs

use std::fmt::{self, Write};

/// Escapes `"`, `'` and newlines so text can sit inside a quoted literal
pub struct QuoteEscaper<W: Write> {
    inner: W,
}

impl<W: Write> QuoteEscaper<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for QuoteEscaper<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            match c {
                '"' => self.inner.write_str("\\\"")?,
                '\'' => self.inner.write_str("\\'")?,
                '\n' => self.inner.write_str("\\n")?,
                '\\' => self.inner.write_str("\\\\")?,
                _ => self.inner.write_char(c)?,
            }
        }
        Ok(())
    }
}

/// Escapes HTML metacharacters (graphviz labels)
pub struct HtmlEscaper<W: Write> {
    inner: W,
}

impl<W: Write> HtmlEscaper<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for HtmlEscaper<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            match c {
                '"' => self.inner.write_str("&quot;")?,
                '&' => self.inner.write_str("&amp;")?,
                '<' => self.inner.write_str("&lt;")?,
                '>' => self.inner.write_str("&gt;")?,
                _ => self.inner.write_char(c)?,
            }
        }
        Ok(())
    }
}

/// Quote-escape `text` into a new string
pub fn quote_escape(text: &str) -> String {
    let mut escaper = QuoteEscaper::new(String::new());
    // Writing into a String cannot fail.
    let _ = escaper.write_str(text);
    escaper.into_inner()
}

/// HTML-escape `text` into a new string
pub fn html_escape(text: &str) -> String {
    let mut escaper = HtmlEscaper::new(String::new());
    let _ = escaper.write_str(text);
    escaper.into_inner()
}
