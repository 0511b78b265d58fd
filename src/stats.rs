// Hot-path counters and the derived statistics snapshot.
//
// The machine and scanner bump plain integers while parsing; derived
// metrics (throughput, averages) are computed only when a snapshot is
// requested.

use std::time::Instant;

use crate::core::simd_scanner::ScanCounters;

/// Raw counters updated on the parse path.
#[derive(Debug, Default, Clone)]
pub(crate) struct Counters {
    pub bytes: u64,
    pub rows: u64,
    pub fields: u64,
    /// Sum of emitted field sizes (post de-escape / trim).
    pub field_bytes: u64,
    pub scan: ScanCounters,
}

impl Counters {
    pub fn snapshot(&self, since: Instant, simd_features: u32, peak_memory: usize) -> Stats {
        let parse_time_ns = since.elapsed().as_nanos() as u64;
        let secs = parse_time_ns as f64 / 1e9;
        let throughput_mbps = if secs > 0.0 {
            (self.bytes as f64 / (1024.0 * 1024.0)) / secs
        } else {
            0.0
        };
        Stats {
            total_bytes_processed: self.bytes,
            total_rows_parsed: self.rows,
            total_fields_parsed: self.fields,
            parse_time_ns,
            throughput_mbps,
            simd_features_used: simd_features,
            peak_memory_bytes: peak_memory,
            simd_ops: self.scan.simd_ops,
            scalar_fallbacks: self.scan.scalar_fallbacks,
            avg_field_size: if self.fields > 0 {
                self.field_bytes as f64 / self.fields as f64
            } else {
                0.0
            },
            avg_row_size: if self.rows > 0 {
                self.field_bytes as f64 / self.rows as f64
            } else {
                0.0
            },
        }
    }
}

/// Point-in-time parser statistics; see [`crate::Parser::stats`].
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub total_bytes_processed: u64,
    pub total_rows_parsed: u64,
    pub total_fields_parsed: u64,
    /// Monotonic clock delta since construction or the last reset.
    pub parse_time_ns: u64,
    pub throughput_mbps: f64,
    /// Capability bit of the scanner path in use (see `core::simd_scanner`).
    pub simd_features_used: u32,
    /// Peak of parser-owned allocation bytes.
    pub peak_memory_bytes: usize,
    pub simd_ops: u64,
    pub scalar_fallbacks: u64,
    pub avg_field_size: f64,
    pub avg_row_size: f64,
}
