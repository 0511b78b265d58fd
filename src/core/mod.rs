// Core parsing primitives

pub(crate) mod buffer;
pub(crate) mod machine;
pub mod record;
pub mod simd_scanner;

pub use record::{Field, Fields, Row};
pub use simd_scanner::{
    simd_caps, ScanCounters, ScanHit, ScanPath, Scanner, SIMD_AVX2, SIMD_AVX512, SIMD_NEON,
    SIMD_SSE2,
};
