// rapidsv - High-throughput parsing for delimiter-separated text
//
// No unwrap/expect in production code. Fallible paths return errors as values.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//
// Layout:
//   core::simd_scanner  bulk scan for structural bytes (SIMD + scalar)
//   core::buffer        aligned growable arenas, bounded-memory policy
//   core::machine       chunked streaming state machine
//   parser              façade: options, callbacks, buffer/file/stream/string
//   pool                interning side-structure for callback consumers
//   partition           driver running one parser per input partition
//
// A parser is strictly single-threaded: all work happens on the caller's
// thread during parse_* calls, and callbacks are synchronous. Separate
// parser instances are independent; the only process-wide state is the
// once-initialised SIMD capability snapshot.

pub mod core;
pub mod error;
pub mod options;
pub mod parser;
pub mod partition;
pub mod pool;
pub mod stats;

pub use crate::core::record::{Field, Fields, Row};
pub use crate::core::simd_scanner::{simd_caps, ScanCounters, ScanHit, ScanPath, Scanner};
pub use crate::error::{Error, Issue, STATUS_OK};
pub use crate::options::ParseOptions;
pub use crate::parser::Parser;
pub use crate::partition::{parse_partitioned, OwnedRow};
pub use crate::pool::{StringPool, Sym};
pub use crate::stats::Stats;
