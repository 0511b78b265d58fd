// Feeding-mode conformance tests
//
// Each scenario parses the literal input through three feeding modes —
// one-shot, byte-at-a-time chunks, and 3-byte chunks — and asserts they
// all produce the expected rows. Failures pinpoint which mode diverges.

use rapidsv::{Issue, ParseOptions, Parser};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type Rows = Vec<Vec<(String, bool)>>;

/// Parse `input` fed in `chunk` byte pieces (0 = one shot), collecting
/// (text, quoted) per field.
fn run(opts: &ParseOptions, input: &[u8], chunk: usize) -> Result<Rows, i32> {
    let mut rows: Rows = Vec::new();
    let mut status = Ok(());
    {
        let mut parser = Parser::new(opts.clone()).map_err(|e| e.code())?;
        parser.on_row(|row| {
            rows.push(
                row.iter()
                    .map(|f| (String::from_utf8_lossy(f.data).into_owned(), f.quoted))
                    .collect(),
            );
        });
        if chunk == 0 {
            status = parser.parse_buffer(input, true);
        } else {
            for piece in input.chunks(chunk) {
                if status.is_ok() {
                    status = parser.parse_buffer(piece, false);
                }
            }
            if status.is_ok() {
                status = parser.parse_buffer(&[], true);
            }
        }
    }
    match status {
        Ok(()) => Ok(rows),
        Err(e) => Err(e.code()),
    }
}

fn texts(rows: &Rows) -> Vec<Vec<&str>> {
    rows.iter()
        .map(|r| r.iter().map(|(s, _)| s.as_str()).collect())
        .collect()
}

// ---------------------------------------------------------------------------
// Conformance macro: every scenario runs through all feeding modes
// ---------------------------------------------------------------------------

macro_rules! conformance {
    ($name:ident, opts: $opts:expr, input: $input:expr, expected: $expected:expr) => {
        #[test]
        fn $name() {
            let opts: ParseOptions = $opts;
            let input: &[u8] = $input;
            let expected: Vec<Vec<&str>> = $expected;

            for chunk in [0usize, 1, 3] {
                let rows = run(&opts, input, chunk).unwrap_or_else(|code| {
                    panic!("chunk size {chunk}: failed with status {code}")
                });
                assert_eq!(texts(&rows), expected, "FAILED at chunk size {chunk}");
            }
        }
    };
    ($name:ident, input: $input:expr, expected: $expected:expr) => {
        conformance!($name, opts: ParseOptions::default(), input: $input, expected: $expected);
    };
}

macro_rules! conformance_error {
    ($name:ident, opts: $opts:expr, input: $input:expr, status: $status:expr) => {
        #[test]
        fn $name() {
            let opts: ParseOptions = $opts;
            let input: &[u8] = $input;
            for chunk in [0usize, 1, 3] {
                let result = run(&opts, input, chunk);
                assert_eq!(result, Err($status), "FAILED at chunk size {chunk}");
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Scenario: basic rows
// ---------------------------------------------------------------------------

conformance!(
    basic_rows,
    input: b"name,age,city\nJohn,25,Paris\nJane,30,London\n",
    expected: vec![
        vec!["name", "age", "city"],
        vec!["John", "25", "Paris"],
        vec!["Jane", "30", "London"],
    ]
);

// ---------------------------------------------------------------------------
// Scenario: quoted fields containing the delimiter
// ---------------------------------------------------------------------------

#[test]
fn quoted_fields_keep_commas_and_flags() {
    let input: &[u8] = b"\"name\",\"age\",\"city\"\n\"John Doe\",\"25\",\"Paris, France\"\n";
    for chunk in [0usize, 1, 3] {
        let rows = run(&ParseOptions::default(), input, chunk).unwrap();
        assert_eq!(
            texts(&rows),
            vec![vec!["name", "age", "city"], vec!["John Doe", "25", "Paris, France"]],
            "FAILED at chunk size {chunk}"
        );
        assert!(
            rows.iter().flatten().all(|(_, quoted)| *quoted),
            "every field came from quotes (chunk size {chunk})"
        );
    }
}

// ---------------------------------------------------------------------------
// Scenario: doubled quotes de-escape to one literal quote
// ---------------------------------------------------------------------------

conformance!(
    escaped_doubled_quotes,
    input: b"name,description,value\nTest,\"Value with \"\"quotes\"\"\",123\n",
    expected: vec![
        vec!["name", "description", "value"],
        vec!["Test", "Value with \"quotes\"", "123"],
    ]
);

// ---------------------------------------------------------------------------
// Scenario: CRLF endings with an empty middle field
// ---------------------------------------------------------------------------

conformance!(
    crlf_with_empty_middle_field,
    input: b"a,,c\r\n1,2,3\r\n",
    expected: vec![vec!["a", "", "c"], vec!["1", "2", "3"]]
);

// ---------------------------------------------------------------------------
// Scenario: quoted field spanning a line break
// ---------------------------------------------------------------------------

conformance!(
    multiline_quoted_field,
    input: b"k,v\n1,\"line1\nline2\"\n",
    expected: vec![vec!["k", "v"], vec!["1", "line1\nline2"]]
);

// ---------------------------------------------------------------------------
// Scenario: explicit chunk boundary mid-field (the literal three-feed case)
// ---------------------------------------------------------------------------

#[test]
fn explicit_three_feed_boundary() {
    use std::cell::RefCell;

    let rows: RefCell<Vec<Vec<String>>> = RefCell::new(Vec::new());
    {
        let mut parser = Parser::new(ParseOptions::default()).unwrap();
        parser.on_row(|row| {
            rows.borrow_mut().push(
                row.iter()
                    .map(|f| String::from_utf8_lossy(f.data).into_owned())
                    .collect(),
            );
        });
        parser.parse_buffer(b"name,a", false).unwrap();
        assert!(rows.borrow().is_empty(), "nothing complete after the first feed");
        parser.parse_buffer(b"ge\nJohn,25\n", false).unwrap();
        parser.parse_buffer(b"", true).unwrap();
    }
    assert_eq!(
        rows.into_inner(),
        vec![vec!["name", "age"], vec!["John", "25"]]
    );
}

// ---------------------------------------------------------------------------
// Boundary behaviours
// ---------------------------------------------------------------------------

conformance!(
    empty_input,
    input: b"",
    expected: vec![]
);

conformance!(
    lone_newline_is_skipped_by_default,
    input: b"\n",
    expected: vec![]
);

conformance!(
    lone_newline_kept_when_not_ignoring,
    opts: ParseOptions { ignore_empty_lines: false, ..Default::default() },
    input: b"\n",
    expected: vec![vec![""]]
);

conformance!(
    crlf_only_input_kept_when_not_ignoring,
    opts: ParseOptions { ignore_empty_lines: false, ..Default::default() },
    input: b"\r\n\r\n\r\n",
    expected: vec![vec![""], vec![""], vec![""]]
);

conformance!(
    empty_lines_between_rows_are_skipped,
    input: b"a\n\n\nb\n",
    expected: vec![vec!["a"], vec!["b"]]
);

conformance!(
    no_trailing_newline,
    input: b"a,b\nc,d",
    expected: vec![vec!["a", "b"], vec!["c", "d"]]
);

conformance!(
    lone_cr_terminates_a_row,
    input: b"a,b\rc,d\r",
    expected: vec![vec!["a", "b"], vec!["c", "d"]]
);

conformance!(
    trailing_delimiter_makes_trailing_empty_field,
    input: b"a,b,\n",
    expected: vec![vec!["a", "b", ""]]
);

conformance!(
    delimiters_only,
    input: b",,\n",
    expected: vec![vec!["", "", ""]]
);

// ---------------------------------------------------------------------------
// Option behaviours
// ---------------------------------------------------------------------------

conformance!(
    trim_whitespace_on_unquoted_fields,
    opts: ParseOptions { trim_whitespace: true, ..Default::default() },
    input: b"  a  ,\tb\t, c\n",
    expected: vec![vec!["a", "b", "c"]]
);

#[test]
fn trim_does_not_touch_quoted_fields() {
    let opts = ParseOptions { trim_whitespace: true, ..Default::default() };
    let rows = run(&opts, b"\"  padded  \",x\n", 0).unwrap();
    assert_eq!(rows[0][0].0, "  padded  ");
    assert_eq!(rows[0][1].0, "x");
}

conformance!(
    whitespace_between_closing_quote_and_delimiter,
    input: b"\"a\"  ,\"b\"\t\n",
    expected: vec![vec!["a", "b"]]
);

conformance!(
    whitespace_after_closing_quote_tolerated_in_strict_mode,
    opts: ParseOptions::default().strict(),
    input: b"\"a\" ,b\n",
    expected: vec![vec!["a", "b"]]
);

conformance!(
    stray_quote_kept_in_lenient_mode,
    input: b"a\"b,c\n",
    expected: vec![vec!["a\"b", "c"]]
);

conformance!(
    junk_after_closing_quote_reopens_in_lenient_mode,
    input: b"\"a\"x\"b\",c\n",
    expected: vec![vec!["a\"x\"b", "c"]]
);

conformance!(
    unclosed_quote_absorbed_in_lenient_mode,
    input: b"\"a,b\n",
    expected: vec![vec!["a,b\n"]]
);

conformance!(
    custom_delimiter_and_quote,
    opts: ParseOptions::default().with_delimiter(b';').with_quote(b'\''),
    input: b"x;'a;b';z\n",
    expected: vec![vec!["x", "a;b", "z"]]
);

conformance!(
    tsv_preset,
    opts: ParseOptions::tsv(),
    input: b"a\tb\tc\n1\t2\t3\n",
    expected: vec![vec!["a", "b", "c"], vec!["1", "2", "3"]]
);

conformance!(
    double_quote_escape_disabled,
    opts: ParseOptions { double_quote_escape: false, ..Default::default() },
    input: b"\"ab\",c\n",
    expected: vec![vec!["ab", "c"]]
);

#[test]
fn empty_quoted_field_is_distinct_from_empty_unquoted() {
    let rows = run(&ParseOptions::default(), b"\"\",,x\n", 0).unwrap();
    assert_eq!(rows[0][0], ("".to_string(), true));
    assert_eq!(rows[0][1], ("".to_string(), false));
    assert_eq!(rows[0][2], ("x".to_string(), false));
}

// ---------------------------------------------------------------------------
// Error scenarios
// ---------------------------------------------------------------------------

conformance_error!(
    strict_rejects_stray_quote,
    opts: ParseOptions::default().strict(),
    input: b"a\"b,c\n",
    status: -6
);

conformance_error!(
    strict_rejects_unclosed_quote,
    opts: ParseOptions::default().strict(),
    input: b"\"a,b\n",
    status: -6
);

conformance_error!(
    strict_rejects_junk_after_closing_quote,
    opts: ParseOptions::default().strict(),
    input: b"\"a\"x,b\n",
    status: -6
);

conformance_error!(
    field_size_cap,
    opts: ParseOptions { max_field_size: 4, max_row_size: 100, ..Default::default() },
    input: b"12345,x\n",
    status: -7
);

conformance_error!(
    row_size_cap,
    opts: ParseOptions { max_field_size: 8, max_row_size: 10, ..Default::default() },
    input: b"abcdefg,hijklmn\n",
    status: -8
);

#[test]
fn error_callback_reports_row_and_code() {
    let mut seen: Vec<Issue> = Vec::new();
    let result;
    {
        let mut parser = Parser::new(ParseOptions::default().strict()).unwrap();
        parser.on_error(|issue| seen.push(issue.clone()));
        result = parser.parse_buffer(b"good,row\nbad\"row,x\n", true);
    }
    assert!(result.is_err());
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].code, -6);
    assert_eq!(seen[0].row_number, 2);
    assert!(!seen[0].message.is_empty());
}

// ---------------------------------------------------------------------------
// Row metadata: numbers and byte offsets
// ---------------------------------------------------------------------------

#[test]
fn row_numbers_skip_ignored_empty_lines() {
    let mut meta: Vec<(u64, u64)> = Vec::new();
    {
        let mut parser = Parser::new(ParseOptions::default()).unwrap();
        parser.on_row(|row| meta.push((row.row_number, row.byte_offset)));
        parser.parse_buffer(b"aa\n\nbb\r\ncc", true).unwrap();
    }
    // offsets: "aa" at 0, "bb" at 4 (after "aa\n\n"), "cc" at 8.
    assert_eq!(meta, vec![(1, 0), (2, 4), (3, 8)]);
}

#[test]
fn byte_offsets_stable_across_any_chunking() {
    let input = b"first,row\nsecond,\"quoted\nvalue\"\r\nthird,row\n";
    let mut reference: Vec<(u64, u64)> = Vec::new();
    {
        let mut parser = Parser::new(ParseOptions::default()).unwrap();
        parser.on_row(|row| reference.push((row.row_number, row.byte_offset)));
        parser.parse_buffer(input, true).unwrap();
    }
    for chunk in [1usize, 2, 5, 7] {
        let mut meta: Vec<(u64, u64)> = Vec::new();
        {
            let mut parser = Parser::new(ParseOptions::default()).unwrap();
            parser.on_row(|row| meta.push((row.row_number, row.byte_offset)));
            for piece in input.chunks(chunk) {
                parser.parse_buffer(piece, false).unwrap();
            }
            parser.parse_buffer(&[], true).unwrap();
        }
        assert_eq!(meta, reference, "offsets diverged at chunk size {chunk}");
    }
}

// ---------------------------------------------------------------------------
// File and stream entry points
// ---------------------------------------------------------------------------

#[test]
fn parse_file_roundtrip() {
    let path = std::env::temp_dir().join(format!("rapidsv-test-{}.csv", std::process::id()));
    std::fs::write(&path, b"x,y\n1,2\n").unwrap();

    let mut rows: Vec<Vec<String>> = Vec::new();
    {
        let mut parser = Parser::new(ParseOptions::default()).unwrap();
        parser.on_row(|row| {
            rows.push(
                row.iter()
                    .map(|f| String::from_utf8_lossy(f.data).into_owned())
                    .collect(),
            );
        });
        parser.parse_file(&path).unwrap();
    }
    std::fs::remove_file(&path).ok();
    assert_eq!(rows, vec![vec!["x", "y"], vec!["1", "2"]]);
}

#[test]
fn parse_file_missing_is_io_error() {
    let mut parser = Parser::new(ParseOptions::default()).unwrap();
    let err = parser
        .parse_file("/definitely/not/a/real/path.csv")
        .unwrap_err();
    assert_eq!(err.code(), -9);
}

#[test]
fn parse_stream_chunks_through_small_buffer() {
    let opts = ParseOptions { buffer_size: 3, ..Default::default() };
    let mut rows = 0u64;
    {
        let mut parser = Parser::new(opts).unwrap();
        parser.on_row(|_| rows += 1);
        let data: &[u8] = b"a,b,c\n1,2,3\nx,\"y\ny\",z\n";
        parser.parse_stream(data).unwrap();
    }
    assert_eq!(rows, 3);
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[test]
fn stats_account_bytes_rows_fields() {
    let mut parser = Parser::new(ParseOptions::default()).unwrap();
    parser.parse_buffer(b"aa,bb\ncc,dd\n", true).unwrap();
    let stats = parser.stats();
    assert_eq!(stats.total_bytes_processed, 12);
    assert_eq!(stats.total_rows_parsed, 2);
    assert_eq!(stats.total_fields_parsed, 4);
    assert_eq!(stats.avg_field_size, 2.0);
    assert_eq!(stats.avg_row_size, 4.0);
    assert!(stats.parse_time_ns > 0);
    assert!(stats.peak_memory_bytes > 0);
}
