// Partitioned parsing driver.
//
// The core parser is single-threaded; this layer splits an in-memory
// input on row boundaries and runs one parser per partition on the rayon
// pool. Split points land on an LF that is not inside a quoted field,
// which takes one sequential pass mirroring the machine's quote-state
// transitions before the parallel phase. Row and field order of the
// concatenated output equals input order.

use rayon::prelude::*;

use crate::error::Error;
use crate::options::ParseOptions;
use crate::parser::Parser;

/// Environment variable consulted when no partition count is given. The
/// core parser itself reads no environment variables.
pub const PARTITIONS_ENV: &str = "RAPIDSV_PARTITIONS";

/// One owned row produced by the partitioned driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedRow {
    /// Field bytes in input order (de-escaped for quoted fields).
    pub fields: Vec<Vec<u8>>,
    /// Offset of the row's first byte in the whole input.
    pub byte_offset: u64,
}

/// Parse `input` across `partitions` parsers (default: the
/// `RAPIDSV_PARTITIONS` environment variable, then the rayon thread
/// count), returning owned rows in input order.
pub fn parse_partitioned(
    input: &[u8],
    opts: &ParseOptions,
    partitions: Option<usize>,
) -> Result<Vec<OwnedRow>, Error> {
    opts.validate()?;
    if input.is_empty() {
        return Ok(Vec::new());
    }
    let parts = partitions
        .or_else(env_partitions)
        .unwrap_or_else(rayon::current_num_threads)
        .max(1);

    let points = split_points(input, opts, parts);
    let ranges: Vec<(usize, usize)> = points.windows(2).map(|w| (w[0], w[1])).collect();

    let results: Vec<Result<Vec<OwnedRow>, Error>> = ranges
        .into_par_iter()
        .map(|(start, end)| parse_slice(&input[start..end], start as u64, opts))
        .collect();

    let mut rows = Vec::new();
    for partition in results {
        rows.extend(partition?);
    }
    Ok(rows)
}

fn env_partitions() -> Option<usize> {
    std::env::var(PARTITIONS_ENV)
        .ok()?
        .parse()
        .ok()
        .filter(|&n: &usize| n > 0)
}

/// Quote state of the split scan. Mirrors the machine's lenient
/// transitions: a quote is structural only at a field start, a stray quote
/// inside an unquoted field is plain data, and a quote after a closing
/// quote returns to the quoted state whether it escapes or reopens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitScan {
    FieldStart,
    Unquoted,
    InQuoted,
    QuoteInQuoted,
}

/// Sorted split offsets including 0 and `input.len()`. Interior points sit
/// just past a row-terminating LF at or after each stride target; whether
/// an LF terminates a row is decided by replaying the machine's quote
/// transitions, so an LF inside a quoted field is never a split point.
fn split_points(input: &[u8], opts: &ParseOptions, parts: usize) -> Vec<usize> {
    let delimiter = opts.delimiter;
    let quote = opts.quote;
    let mut points = vec![0];
    if parts > 1 {
        let stride = (input.len() / parts).max(1);
        let mut next_target = stride;
        let mut state = SplitScan::FieldStart;
        for (i, &b) in input.iter().enumerate() {
            let mut row_end = false;
            state = match state {
                SplitScan::FieldStart | SplitScan::Unquoted => {
                    if b == quote && state == SplitScan::FieldStart {
                        SplitScan::InQuoted
                    } else if b == delimiter {
                        SplitScan::FieldStart
                    } else if b == b'\n' || b == b'\r' {
                        row_end = b == b'\n';
                        SplitScan::FieldStart
                    } else {
                        SplitScan::Unquoted
                    }
                }
                SplitScan::InQuoted => {
                    if b == quote {
                        SplitScan::QuoteInQuoted
                    } else {
                        SplitScan::InQuoted
                    }
                }
                SplitScan::QuoteInQuoted => {
                    if b == quote {
                        // Escaped pair, or a lenient reopen; quoted either way.
                        SplitScan::InQuoted
                    } else if b == delimiter {
                        SplitScan::FieldStart
                    } else if b == b'\n' || b == b'\r' {
                        row_end = b == b'\n';
                        SplitScan::FieldStart
                    } else if b == b' ' || b == b'\t' {
                        SplitScan::QuoteInQuoted
                    } else {
                        SplitScan::InQuoted
                    }
                }
            };
            if row_end && i + 1 >= next_target {
                if i + 1 < input.len() {
                    points.push(i + 1);
                    next_target = i + 1 + stride;
                }
                if points.len() == parts {
                    break;
                }
            }
        }
    }
    points.push(input.len());
    points.dedup();
    points
}

fn parse_slice(slice: &[u8], base: u64, opts: &ParseOptions) -> Result<Vec<OwnedRow>, Error> {
    let mut rows = Vec::new();
    {
        let mut parser = Parser::new(opts.clone())?;
        parser.on_row(|row| {
            rows.push(OwnedRow {
                fields: row.iter().map(|f| f.data.to_vec()).collect(),
                byte_offset: base + row.byte_offset,
            });
        });
        parser.parse_buffer(slice, true)?;
    }
    Ok(rows)
}
