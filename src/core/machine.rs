// Chunked streaming state machine.
//
// Three states: at field start, inside a quoted field, and just past a
// quote seen inside a quoted field. The machine consumes one contiguous
// window per call; the façade stitches the carry-over buffer and the
// caller's bytes into that window when a previous chunk left an unfinished
// unquoted field behind.
//
// ## Carry-over
//
// At a window end mid-row:
//   - field descriptors that borrow the window are stabilised by copying
//     their bytes into the quoted arena,
//   - an in-progress unquoted field's suffix is handed back to the façade
//     (copied into `unparsed` and stitched in front of the next chunk),
//   - an in-progress quoted field already lives in `scratch`, which
//     persists across windows.
// So no descriptor ever references a window that is gone.
//
// A CR as the last byte of a window defers the CRLF decision: the row is
// emitted immediately and `pending_lf_skip` swallows a leading LF on the
// next window.

use memchr::memchr;

use crate::core::buffer::{reserve_elems, ByteArena, MemoryBudget};
use crate::core::record::{FieldDesc, FieldSrc, Row};
use crate::core::simd_scanner::{ScanHit, Scanner};
use crate::error::Error;
use crate::options::ParseOptions;
use crate::stats::Counters;

/// Where the machine stands relative to the current field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// At the beginning of a (possibly empty) field.
    FieldStart,
    /// Inside a quoted field.
    InQuotedField,
    /// Just saw a quote inside a quoted field; the next byte decides
    /// whether it closed the field or escaped a literal quote.
    QuoteInQuotedField,
}

pub(crate) type RowSink<'a> = dyn FnMut(&Row<'_>) + 'a;

pub(crate) struct Machine {
    phase: Phase,
    /// Field descriptors of the in-progress row, reused across rows.
    descs: Vec<FieldDesc>,
    /// De-escaped quoted fields and stabilised carry-overs of the current row.
    quoted_arena: ByteArena,
    /// The in-progress quoted field.
    scratch: ByteArena,
    /// Tail of a previous chunk holding an unfinished unquoted field.
    pub(crate) unparsed: ByteArena,
    /// Swallow one LF at the start of the next window (CR ended the last one).
    pending_lf_skip: bool,
    /// Running sum of field sizes in the in-progress row.
    row_bytes: usize,
    rows_emitted: u64,
    /// Absolute offset of the in-progress row's first byte.
    row_abs: u64,
}

impl Machine {
    pub fn new(budget: &mut MemoryBudget) -> Result<Self, Error> {
        let mut descs = Vec::new();
        reserve_elems(&mut descs, 512, budget)?;
        Ok(Machine {
            phase: Phase::FieldStart,
            descs,
            quoted_arena: ByteArena::with_capacity(16 * 1024, budget)?,
            scratch: ByteArena::with_capacity(32 * 1024, budget)?,
            unparsed: ByteArena::new(),
            pending_lf_skip: false,
            row_bytes: 0,
            rows_emitted: 0,
            row_abs: 0,
        })
    }

    pub fn rows_emitted(&self) -> u64 {
        self.rows_emitted
    }

    /// Row number errors attach to: the row currently being assembled.
    pub fn next_row_number(&self) -> u64 {
        self.rows_emitted + 1
    }

    /// Back to pristine parse state; allocations are retained.
    pub fn reset(&mut self) {
        self.abort_row();
        self.rows_emitted = 0;
        self.row_abs = 0;
    }

    /// Drop the in-flight row so the next feed starts at a row boundary.
    pub fn abort_row(&mut self) {
        self.phase = Phase::FieldStart;
        self.descs.clear();
        self.quoted_arena.clear();
        self.scratch.clear();
        self.unparsed.clear();
        self.pending_lf_skip = false;
        self.row_bytes = 0;
    }

    /// Parse one contiguous window whose first byte sits at absolute
    /// stream offset `base`. Completed rows go to `sink`; the return value
    /// is the window position from which the façade must retain the tail
    /// (`w.len()` when there is nothing to retain).
    #[allow(clippy::too_many_arguments)]
    pub fn run_window(
        &mut self,
        w: &[u8],
        base: u64,
        is_final: bool,
        opts: &ParseOptions,
        scanner: &Scanner,
        counters: &mut Counters,
        budget: &mut MemoryBudget,
        sink: &mut RowSink<'_>,
    ) -> Result<usize, Error> {
        let delimiter = opts.delimiter;
        let quote = opts.quote;
        let mut pos = 0usize;

        if self.pending_lf_skip {
            if !w.is_empty() {
                if w[0] == b'\n' {
                    pos = 1;
                }
                self.pending_lf_skip = false;
                self.row_abs = base + pos as u64;
            } else if is_final {
                self.pending_lf_skip = false;
            } else {
                return Ok(0);
            }
        }

        // Start of the current field within this window. After a carry the
        // stitched window begins mid-field at 0.
        let mut field_start = pos;

        while pos < w.len() {
            match self.phase {
                Phase::FieldStart => {
                    let b = w[pos];
                    if b == quote && pos == field_start {
                        self.phase = Phase::InQuotedField;
                        self.scratch.clear();
                        pos += 1;
                    } else if b == delimiter {
                        self.push_unquoted(w, field_start, pos, opts, budget)?;
                        pos += 1;
                        field_start = pos;
                    } else if b == b'\n' {
                        self.finish_line(w, field_start, pos, opts, counters, budget, sink)?;
                        pos += 1;
                        field_start = pos;
                        self.row_abs = base + pos as u64;
                    } else if b == b'\r' {
                        self.finish_line(w, field_start, pos, opts, counters, budget, sink)?;
                        pos += 1;
                        if pos < w.len() {
                            if w[pos] == b'\n' {
                                pos += 1;
                            }
                        } else if !is_final {
                            self.pending_lf_skip = true;
                        }
                        field_start = pos;
                        self.row_abs = base + pos as u64;
                    } else {
                        let (off, hit) = scanner.find_next(&w[pos..], &mut counters.scan);
                        pos += off;
                        match hit {
                            Some(ScanHit::Quote) => {
                                if opts.strict_mode {
                                    return Err(Error::Parse {
                                        message: "quote in unquoted field",
                                        row: self.next_row_number(),
                                    });
                                }
                                // Lenient: the quote byte is field data.
                                pos += 1;
                            }
                            // Delimiter/CR/LF re-dispatch at the top of the
                            // loop; None leaves pos at the window end.
                            _ => {}
                        }
                    }
                }
                Phase::InQuotedField => match memchr(quote, &w[pos..]) {
                    None => {
                        self.append_scratch(&w[pos..], opts, budget)?;
                        pos = w.len();
                    }
                    Some(off) => {
                        self.append_scratch(&w[pos..pos + off], opts, budget)?;
                        pos += off + 1;
                        self.phase = Phase::QuoteInQuotedField;
                    }
                },
                Phase::QuoteInQuotedField => {
                    let b = w[pos];
                    if b == quote && opts.double_quote_escape {
                        // The pending quote escaped a literal quote.
                        self.append_scratch(&[quote], opts, budget)?;
                        pos += 1;
                        self.phase = Phase::InQuotedField;
                    } else if b == delimiter {
                        self.push_quoted(opts, budget)?;
                        pos += 1;
                        field_start = pos;
                        self.phase = Phase::FieldStart;
                    } else if b == b'\n' {
                        self.push_quoted(opts, budget)?;
                        self.emit_row(w, counters, sink);
                        pos += 1;
                        field_start = pos;
                        self.phase = Phase::FieldStart;
                        self.row_abs = base + pos as u64;
                    } else if b == b'\r' {
                        self.push_quoted(opts, budget)?;
                        self.emit_row(w, counters, sink);
                        pos += 1;
                        if pos < w.len() {
                            if w[pos] == b'\n' {
                                pos += 1;
                            }
                        } else if !is_final {
                            self.pending_lf_skip = true;
                        }
                        field_start = pos;
                        self.phase = Phase::FieldStart;
                        self.row_abs = base + pos as u64;
                    } else if b == b' ' || b == b'\t' {
                        // Whitespace between closing quote and delimiter.
                        pos += 1;
                    } else if opts.strict_mode {
                        return Err(Error::Parse {
                            message: "unexpected character after closing quote",
                            row: self.next_row_number(),
                        });
                    } else {
                        // Lenient: the quote did not close anything after
                        // all; reopen the field keeping both bytes.
                        self.append_scratch(&[quote, b], opts, budget)?;
                        pos += 1;
                        self.phase = Phase::InQuotedField;
                    }
                }
            }
        }

        if is_final {
            match self.phase {
                Phase::FieldStart => {
                    if field_start < w.len() || !self.descs.is_empty() {
                        self.push_unquoted(w, field_start, w.len(), opts, budget)?;
                        self.emit_row(w, counters, sink);
                    }
                }
                Phase::InQuotedField => {
                    if opts.strict_mode {
                        return Err(Error::Parse {
                            message: "unclosed quote at end of input",
                            row: self.next_row_number(),
                        });
                    }
                    self.push_quoted(opts, budget)?;
                    self.emit_row(w, counters, sink);
                    self.phase = Phase::FieldStart;
                }
                Phase::QuoteInQuotedField => {
                    self.push_quoted(opts, budget)?;
                    self.emit_row(w, counters, sink);
                    self.phase = Phase::FieldStart;
                }
            }
            self.row_abs = base + w.len() as u64;
            return Ok(w.len());
        }

        // Window exhausted mid-stream: stabilise and report the carry.
        match self.phase {
            Phase::FieldStart => {
                if field_start < w.len() || !self.descs.is_empty() {
                    self.stabilise_descs(w, budget)?;
                    let carry = w.len() - field_start;
                    if carry > opts.max_field_size {
                        return Err(Error::FieldTooLarge {
                            size: carry,
                            limit: opts.max_field_size,
                            row: self.next_row_number(),
                        });
                    }
                    return Ok(field_start);
                }
                Ok(w.len())
            }
            Phase::InQuotedField | Phase::QuoteInQuotedField => {
                self.stabilise_descs(w, budget)?;
                Ok(w.len())
            }
        }
    }

    /// Emit the pending unquoted span and terminate the row. A line with
    /// no content at all is either skipped or becomes a single empty field.
    #[allow(clippy::too_many_arguments)]
    fn finish_line(
        &mut self,
        w: &[u8],
        field_start: usize,
        term_pos: usize,
        opts: &ParseOptions,
        counters: &mut Counters,
        budget: &mut MemoryBudget,
        sink: &mut RowSink<'_>,
    ) -> Result<(), Error> {
        let empty_line = self.descs.is_empty() && field_start == term_pos;
        if empty_line && opts.ignore_empty_lines {
            return Ok(());
        }
        self.push_unquoted(w, field_start, term_pos, opts, budget)?;
        self.emit_row(w, counters, sink);
        Ok(())
    }

    fn push_unquoted(
        &mut self,
        w: &[u8],
        start: usize,
        end: usize,
        opts: &ParseOptions,
        budget: &mut MemoryBudget,
    ) -> Result<(), Error> {
        let (mut s, mut e) = (start, end);
        if opts.trim_whitespace {
            while s < e && (w[s] == b' ' || w[s] == b'\t') {
                s += 1;
            }
            while e > s && (w[e - 1] == b' ' || w[e - 1] == b'\t') {
                e -= 1;
            }
        }
        let len = e - s;
        if len > opts.max_field_size {
            return Err(Error::FieldTooLarge {
                size: len,
                limit: opts.max_field_size,
                row: self.next_row_number(),
            });
        }
        self.grow_row(len, opts)?;
        reserve_elems(&mut self.descs, 1, budget)?;
        self.descs.push(FieldDesc { src: FieldSrc::Window, start: s, len, quoted: false });
        Ok(())
    }

    /// Move `scratch` into the quoted arena and record the field.
    fn push_quoted(&mut self, opts: &ParseOptions, budget: &mut MemoryBudget) -> Result<(), Error> {
        let len = self.scratch.len();
        self.grow_row(len, opts)?;
        let offset = self.quoted_arena.len();
        self.quoted_arena.push_slice(self.scratch.as_slice(), budget)?;
        reserve_elems(&mut self.descs, 1, budget)?;
        self.descs.push(FieldDesc { src: FieldSrc::Arena, start: offset, len, quoted: true });
        self.scratch.clear();
        Ok(())
    }

    fn append_scratch(
        &mut self,
        bytes: &[u8],
        opts: &ParseOptions,
        budget: &mut MemoryBudget,
    ) -> Result<(), Error> {
        let size = self.scratch.len() + bytes.len();
        if size > opts.max_field_size {
            return Err(Error::FieldTooLarge {
                size,
                limit: opts.max_field_size,
                row: self.next_row_number(),
            });
        }
        self.scratch.push_slice(bytes, budget)
    }

    /// Account one more field into the row, enforcing `max_row_size` as
    /// soon as the sum exceeds it.
    fn grow_row(&mut self, field_len: usize, opts: &ParseOptions) -> Result<(), Error> {
        let total = self.row_bytes + field_len;
        if total > opts.max_row_size {
            return Err(Error::RowTooLarge {
                size: total,
                limit: opts.max_row_size,
                row: self.next_row_number(),
            });
        }
        self.row_bytes = total;
        Ok(())
    }

    fn emit_row(&mut self, w: &[u8], counters: &mut Counters, sink: &mut RowSink<'_>) {
        self.rows_emitted += 1;
        counters.rows += 1;
        counters.fields += self.descs.len() as u64;
        counters.field_bytes += self.row_bytes as u64;
        let row = Row::new(
            w,
            self.quoted_arena.as_slice(),
            &self.descs,
            self.rows_emitted,
            self.row_abs,
        );
        sink(&row);
        self.descs.clear();
        self.quoted_arena.clear();
        self.row_bytes = 0;
    }

    /// Copy window-borrowed descriptors into the quoted arena so they stay
    /// valid once this window is gone. Quoted flags are preserved.
    fn stabilise_descs(&mut self, w: &[u8], budget: &mut MemoryBudget) -> Result<(), Error> {
        for i in 0..self.descs.len() {
            let desc = self.descs[i];
            if desc.src == FieldSrc::Window {
                let offset = self.quoted_arena.len();
                self.quoted_arena
                    .push_slice(&w[desc.start..desc.start + desc.len], budget)?;
                self.descs[i] = FieldDesc {
                    src: FieldSrc::Arena,
                    start: offset,
                    len: desc.len,
                    quoted: desc.quoted,
                };
            }
        }
        Ok(())
    }
}
