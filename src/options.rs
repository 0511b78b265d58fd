// Parser configuration.

use crate::error::Error;

/// Per-parser configuration, immutable once the parser is constructed.
///
/// The defaults parse RFC 4180 CSV leniently: LF/CRLF/lone-CR row endings,
/// doubled quotes as escapes, empty lines skipped.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Field separator byte.
    pub delimiter: u8,
    /// Quote byte enclosing fields that may contain structure.
    pub quote: u8,
    /// Treat `""` inside a quoted field as one literal quote.
    pub double_quote_escape: bool,
    /// Trim ASCII space/tab from both ends of unquoted fields.
    pub trim_whitespace: bool,
    /// Discard rows with no content at all.
    pub ignore_empty_lines: bool,
    /// Reject tolerated malformations (stray quote, junk after a closing
    /// quote, unclosed quote at end of input) instead of absorbing them.
    pub strict_mode: bool,
    /// Upper bound on a single field's size in bytes.
    pub max_field_size: usize,
    /// Upper bound on the sum of field sizes in a row.
    pub max_row_size: usize,
    /// Soft cap on parser-owned allocations; 0 = unbounded.
    pub max_memory_bytes: usize,
    /// Stream read chunk size for `parse_file` / `parse_stream`.
    pub buffer_size: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            delimiter: b',',
            quote: b'"',
            double_quote_escape: true,
            trim_whitespace: false,
            ignore_empty_lines: true,
            strict_mode: false,
            max_field_size: 10 * 1024 * 1024,
            max_row_size: 100 * 1024 * 1024,
            max_memory_bytes: 0,
            buffer_size: 64 * 1024,
        }
    }
}

impl ParseOptions {
    /// Tab-separated preset.
    pub fn tsv() -> Self {
        ParseOptions { delimiter: b'\t', ..Self::default() }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict_mode = true;
        self
    }

    /// Check the option invariants. Called by `Parser::new`.
    pub fn validate(&self) -> Result<(), Error> {
        if self.delimiter == self.quote {
            return Err(Error::InvalidArguments(
                "delimiter and quote must differ".into(),
            ));
        }
        if self.delimiter == b'\r' || self.delimiter == b'\n' {
            return Err(Error::InvalidArguments(
                "delimiter must not be CR or LF".into(),
            ));
        }
        if self.quote == b'\r' || self.quote == b'\n' {
            return Err(Error::InvalidArguments("quote must not be CR or LF".into()));
        }
        if self.max_field_size == 0 {
            return Err(Error::InvalidArguments(
                "max_field_size must be at least 1".into(),
            ));
        }
        if self.max_row_size < self.max_field_size {
            return Err(Error::InvalidArguments(
                "max_row_size must be at least max_field_size".into(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(Error::InvalidArguments(
                "buffer_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
