// Parser façade.
//
// Owns the buffers, carries the machine state, drives the scanner, and
// invokes the row and error callbacks. All work happens on the caller's
// thread; callbacks are synchronous and the borrows they receive end when
// they return. Errors surface twice: as the return value of the parse
// entry point and as a call to the error callback.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::time::Instant;

use tracing::debug;

use crate::core::buffer::MemoryBudget;
use crate::core::machine::Machine;
use crate::core::record::Row;
use crate::core::simd_scanner::Scanner;
use crate::error::{Error, Issue};
use crate::options::ParseOptions;
use crate::stats::{Counters, Stats};

type RowCallback<'cb> = Box<dyn FnMut(&Row<'_>) + 'cb>;
type ErrorCallback<'cb> = Box<dyn FnMut(&Issue) + 'cb>;

/// Streaming parser for delimiter-separated text.
///
/// ```
/// use rapidsv::{ParseOptions, Parser};
///
/// let mut names = Vec::new();
/// let mut parser = Parser::new(ParseOptions::default())?;
/// parser.on_row(|row| {
///     if let Some(field) = row.get(0) {
///         names.push(field.data.to_vec());
///     }
/// });
/// parser.parse_string("ada,1815\ngrace,1906\n")?;
/// drop(parser);
/// assert_eq!(names, vec![b"ada".to_vec(), b"grace".to_vec()]);
/// # Ok::<(), rapidsv::Error>(())
/// ```
pub struct Parser<'cb> {
    opts: ParseOptions,
    scanner: Scanner,
    machine: Machine,
    counters: Counters,
    budget: MemoryBudget,
    since: Instant,
    /// Total bytes handed to `parse_buffer` so far.
    fed: u64,
    on_row: Option<RowCallback<'cb>>,
    on_error: Option<ErrorCallback<'cb>>,
}

impl<'cb> Parser<'cb> {
    /// Validate `opts` and allocate the initial buffers (honouring
    /// `max_memory_bytes`). The scanner variant is fixed here for the
    /// parser's lifetime.
    pub fn new(opts: ParseOptions) -> Result<Self, Error> {
        opts.validate()?;
        let mut budget = MemoryBudget::new(opts.max_memory_bytes);
        let machine = Machine::new(&mut budget)?;
        let scanner = Scanner::new(opts.delimiter, opts.quote);
        debug!(path = ?scanner.path(), "scanner selected");
        Ok(Parser {
            opts,
            scanner,
            machine,
            counters: Counters::default(),
            budget,
            since: Instant::now(),
            fed: 0,
            on_row: None,
            on_error: None,
        })
    }

    /// Install the row callback. The `Row` borrow (and every `Field` in
    /// it) is valid only until the callback returns; copy out anything
    /// that must live longer.
    pub fn on_row<F>(&mut self, f: F)
    where
        F: FnMut(&Row<'_>) + 'cb,
    {
        self.on_row = Some(Box::new(f));
    }

    /// Install the error callback. Informational: it cannot retry or skip.
    pub fn on_error<F>(&mut self, f: F)
    where
        F: FnMut(&Issue) + 'cb,
    {
        self.on_error = Some(Box::new(f));
    }

    pub fn options(&self) -> &ParseOptions {
        &self.opts
    }

    /// Statistics snapshot; derived metrics are computed on demand.
    pub fn stats(&self) -> Stats {
        self.counters
            .snapshot(self.since, self.scanner.features_used(), self.budget.peak())
    }

    /// Back to pristine parse state. Allocations are retained for reuse.
    pub fn reset(&mut self) {
        self.machine.reset();
        self.counters = Counters::default();
        self.fed = 0;
        self.since = Instant::now();
    }

    /// Feed one chunk. Pass `is_final = true` on the last chunk (an empty
    /// final chunk is fine) so trailing data is flushed.
    ///
    /// Rows emitted before an error stand; on error the in-flight row is
    /// discarded and the next feed starts at a row boundary.
    pub fn parse_buffer(&mut self, bytes: &[u8], is_final: bool) -> Result<(), Error> {
        let result = self.feed_window(bytes, is_final);
        if let Err(ref err) = result {
            if let Some(cb) = self.on_error.as_mut() {
                cb(&Issue::from_error(err));
            }
            self.machine.abort_row();
        }
        result
    }

    /// Convenience single-shot parse. Inputs longer than `max_row_size`
    /// are rejected up front.
    pub fn parse_string(&mut self, s: &str) -> Result<(), Error> {
        if s.len() > self.opts.max_row_size {
            return Err(self.report(Error::InvalidArguments(format!(
                "input of {} bytes exceeds max_row_size of {}",
                s.len(),
                self.opts.max_row_size
            ))));
        }
        self.parse_buffer(s.as_bytes(), true)
    }

    /// Parse a file in `buffer_size` chunks.
    pub fn parse_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        debug!(path = %path.display(), "parsing file");
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => return Err(self.report(Error::Io(e))),
        };
        self.parse_stream(file)
    }

    /// Parse any byte source in `buffer_size` chunks, finalising at EOF.
    pub fn parse_stream<R: Read>(&mut self, mut reader: R) -> Result<(), Error> {
        let mut buf = vec![0u8; self.opts.buffer_size];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.report(Error::Io(e))),
            };
            if n == 0 {
                return self.parse_buffer(&[], true);
            }
            self.parse_buffer(&buf[..n], false)?;
        }
    }

    /// Report `err` through the error callback and hand it back.
    fn report(&mut self, err: Error) -> Error {
        if let Some(cb) = self.on_error.as_mut() {
            cb(&Issue::from_error(&err));
        }
        err
    }

    fn feed_window(&mut self, bytes: &[u8], is_final: bool) -> Result<(), Error> {
        let fed_before = self.fed;
        self.fed += bytes.len() as u64;
        self.counters.bytes += bytes.len() as u64;

        let Parser { opts, scanner, machine, counters, budget, on_row, .. } = self;
        let mut noop = |_: &Row<'_>| {};
        let sink: &mut (dyn FnMut(&Row<'_>)) = match on_row.as_mut() {
            Some(cb) => &mut **cb,
            None => &mut noop,
        };

        if machine.unparsed.is_empty() {
            let carry_from =
                machine.run_window(bytes, fed_before, is_final, opts, scanner, counters, budget, sink)?;
            if carry_from < bytes.len() {
                machine.unparsed.push_slice(&bytes[carry_from..], budget)?;
            }
            return Ok(());
        }

        // Stitch the carried tail and the new bytes into one contiguous
        // window; it becomes the current input window for this call.
        let carried = machine.unparsed.len() as u64;
        let mut window = std::mem::take(&mut machine.unparsed);
        if let Err(e) = window.push_slice(bytes, budget) {
            window.clear();
            machine.unparsed = window;
            return Err(e);
        }
        match machine.run_window(
            window.as_slice(),
            fed_before - carried,
            is_final,
            opts,
            scanner,
            counters,
            budget,
            sink,
        ) {
            Ok(carry_from) => {
                window.drain_front(carry_from);
                machine.unparsed = window;
                Ok(())
            }
            Err(e) => {
                window.clear();
                machine.unparsed = window;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Parser<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("options", &self.opts)
            .field("scanner", &self.scanner.path())
            .field("rows_emitted", &self.machine.rows_emitted())
            .finish()
    }
}
