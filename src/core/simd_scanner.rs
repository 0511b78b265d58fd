// Bulk scanner for the four structural bytes: delimiter, quote, CR, LF.
//
// One variant is picked per parser at construction from a process-wide
// capability snapshot and never changes for the parser's lifetime:
//
//   x86_64:  64-byte AVX-512BW, 32-byte AVX2, 16-byte SSE2 (baseline)
//   aarch64: 16-byte NEON (baseline, little-endian only)
//   other:   scalar byte loop
//
// Each vector step broadcasts the four targets, loads an unaligned window,
// compare-equals against each target, ORs the result masks, and takes the
// trailing-zero count of the first non-zero mask as the hit offset. The
// lowest byte offset always wins within a window. Loads stay unaligned;
// arena alignment only helps cache behaviour.
//
// ## Dispatch
//
// The variants form a closed set represented as an enum stored in the
// parser (`ScanPath`), dispatched per window rather than per byte.
//
// ## Capability snapshot
//
// Detection runs once per process: a seq-cst CAS publishes the bitmask,
// later readers see the published word with a plain acquire load. Both
// sides of a lost race compute the same value.

use std::sync::atomic::{AtomicU32, Ordering};

/// Capability bit: snapshot has been taken (always set once published).
const SNAPSHOT_TAKEN: u32 = 1;
/// 16-byte SSE2 lanes (x86_64 baseline).
pub const SIMD_SSE2: u32 = 1 << 1;
/// 32-byte AVX2 lanes.
pub const SIMD_AVX2: u32 = 1 << 2;
/// 64-byte AVX-512BW lanes.
pub const SIMD_AVX512: u32 = 1 << 3;
/// 16-byte NEON lanes (aarch64 baseline).
pub const SIMD_NEON: u32 = 1 << 4;

static SIMD_CAPS: AtomicU32 = AtomicU32::new(0);

/// Process-wide snapshot of available vector widths.
pub fn simd_caps() -> u32 {
    let cached = SIMD_CAPS.load(Ordering::Acquire);
    if cached != 0 {
        return cached;
    }
    let detected = detect() | SNAPSHOT_TAKEN;
    match SIMD_CAPS.compare_exchange(0, detected, Ordering::SeqCst, Ordering::Acquire) {
        Ok(_) => detected,
        Err(published) => published,
    }
}

fn detect() -> u32 {
    #[allow(unused_mut)]
    let mut caps = 0u32;
    #[cfg(target_arch = "x86_64")]
    {
        caps |= SIMD_SSE2;
        if is_x86_feature_detected!("avx2") {
            caps |= SIMD_AVX2;
        }
        if is_x86_feature_detected!("avx512bw") {
            caps |= SIMD_AVX512;
        }
    }
    #[cfg(all(target_arch = "aarch64", target_endian = "little"))]
    {
        caps |= SIMD_NEON;
    }
    caps
}

/// Window counters bumped by the scanner: vector windows processed and
/// scalar-scanned regions (including SIMD tails).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanCounters {
    pub simd_ops: u64,
    pub scalar_fallbacks: u64,
}

/// What `find_next` stopped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanHit {
    Delimiter,
    Quote,
    Cr,
    Lf,
}

/// Selected scan implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPath {
    #[cfg(target_arch = "x86_64")]
    Avx512,
    #[cfg(target_arch = "x86_64")]
    Avx2,
    #[cfg(target_arch = "x86_64")]
    Sse2,
    #[cfg(target_arch = "aarch64")]
    Neon,
    Scalar,
}

/// Four-needle scanner bound to a delimiter/quote pair.
#[derive(Debug, Clone, Copy)]
pub struct Scanner {
    path: ScanPath,
    delimiter: u8,
    quote: u8,
}

impl Scanner {
    /// Pick the widest path available in this process.
    pub fn new(delimiter: u8, quote: u8) -> Self {
        let caps = simd_caps();
        Scanner { path: Self::select(caps), delimiter, quote }
    }

    fn select(caps: u32) -> ScanPath {
        #[cfg(target_arch = "x86_64")]
        {
            if caps & SIMD_AVX512 != 0 {
                return ScanPath::Avx512;
            }
            if caps & SIMD_AVX2 != 0 {
                return ScanPath::Avx2;
            }
            return ScanPath::Sse2;
        }
        #[cfg(target_arch = "aarch64")]
        {
            if caps & SIMD_NEON != 0 {
                return ScanPath::Neon;
            }
        }
        #[allow(unreachable_code)]
        {
            let _ = caps;
            ScanPath::Scalar
        }
    }

    pub fn path(&self) -> ScanPath {
        self.path
    }

    /// Capability bit of the selected path, for the stats bitmask.
    pub(crate) fn features_used(&self) -> u32 {
        match self.path {
            #[cfg(target_arch = "x86_64")]
            ScanPath::Avx512 => SIMD_AVX512,
            #[cfg(target_arch = "x86_64")]
            ScanPath::Avx2 => SIMD_AVX2,
            #[cfg(target_arch = "x86_64")]
            ScanPath::Sse2 => SIMD_SSE2,
            #[cfg(target_arch = "aarch64")]
            ScanPath::Neon => SIMD_NEON,
            ScanPath::Scalar => 0,
        }
    }

    /// Offset and classification of the first delimiter/quote/CR/LF in
    /// `haystack`; `(haystack.len(), None)` when none is present.
    #[inline]
    pub fn find_next(&self, haystack: &[u8], counters: &mut ScanCounters) -> (usize, Option<ScanHit>) {
        let found = match self.path {
            #[cfg(target_arch = "x86_64")]
            // SAFETY: vector paths are only selected when the capability
            // snapshot reported the feature.
            ScanPath::Avx512 => unsafe {
                x86::find_avx512(haystack, self.delimiter, self.quote, counters)
            },
            #[cfg(target_arch = "x86_64")]
            ScanPath::Avx2 => unsafe {
                x86::find_avx2(haystack, self.delimiter, self.quote, counters)
            },
            #[cfg(target_arch = "x86_64")]
            ScanPath::Sse2 => unsafe {
                x86::find_sse2(haystack, self.delimiter, self.quote, counters)
            },
            #[cfg(target_arch = "aarch64")]
            ScanPath::Neon => unsafe {
                neon::find_neon(haystack, self.delimiter, self.quote, counters)
            },
            ScanPath::Scalar => find_scalar(haystack, 0, self.delimiter, self.quote, counters),
        };
        match found {
            Some(off) => (off, Some(self.classify(haystack[off]))),
            None => (haystack.len(), None),
        }
    }

    #[inline]
    fn classify(&self, byte: u8) -> ScanHit {
        if byte == self.delimiter {
            ScanHit::Delimiter
        } else if byte == self.quote {
            ScanHit::Quote
        } else if byte == b'\r' {
            ScanHit::Cr
        } else {
            ScanHit::Lf
        }
    }
}

/// Scalar fallback; also the tail of every vector path.
#[inline]
fn find_scalar(
    hay: &[u8],
    start: usize,
    delimiter: u8,
    quote: u8,
    counters: &mut ScanCounters,
) -> Option<usize> {
    if start >= hay.len() {
        return None;
    }
    counters.scalar_fallbacks += 1;
    hay[start..]
        .iter()
        .position(|&b| b == delimiter || b == quote || b == b'\r' || b == b'\n')
        .map(|p| start + p)
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use super::{find_scalar, ScanCounters};
    use std::arch::x86_64::*;

    /// Windows of lookahead prefetched on the wide paths.
    const PREFETCH_WINDOWS: usize = 8;

    #[target_feature(enable = "avx512f,avx512bw")]
    pub(super) unsafe fn find_avx512(
        hay: &[u8],
        delimiter: u8,
        quote: u8,
        counters: &mut ScanCounters,
    ) -> Option<usize> {
        const W: usize = 64;
        let vd = _mm512_set1_epi8(delimiter as i8);
        let vq = _mm512_set1_epi8(quote as i8);
        let vcr = _mm512_set1_epi8(b'\r' as i8);
        let vlf = _mm512_set1_epi8(b'\n' as i8);
        let mut i = 0;
        while i + W <= hay.len() {
            let w = std::ptr::read_unaligned(hay.as_ptr().add(i) as *const __m512i);
            let mask: u64 = _mm512_cmpeq_epi8_mask(w, vd)
                | _mm512_cmpeq_epi8_mask(w, vq)
                | _mm512_cmpeq_epi8_mask(w, vcr)
                | _mm512_cmpeq_epi8_mask(w, vlf);
            counters.simd_ops += 1;
            if mask != 0 {
                return Some(i + mask.trailing_zeros() as usize);
            }
            if i + W * PREFETCH_WINDOWS < hay.len() {
                _mm_prefetch::<{ _MM_HINT_T0 }>(hay.as_ptr().add(i + W * PREFETCH_WINDOWS) as *const i8);
            }
            i += W;
        }
        find_scalar(hay, i, delimiter, quote, counters)
    }

    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn find_avx2(
        hay: &[u8],
        delimiter: u8,
        quote: u8,
        counters: &mut ScanCounters,
    ) -> Option<usize> {
        const W: usize = 32;
        let vd = _mm256_set1_epi8(delimiter as i8);
        let vq = _mm256_set1_epi8(quote as i8);
        let vcr = _mm256_set1_epi8(b'\r' as i8);
        let vlf = _mm256_set1_epi8(b'\n' as i8);
        let mut i = 0;
        while i + W <= hay.len() {
            let w = _mm256_loadu_si256(hay.as_ptr().add(i) as *const __m256i);
            let eq = _mm256_or_si256(
                _mm256_or_si256(_mm256_cmpeq_epi8(w, vd), _mm256_cmpeq_epi8(w, vq)),
                _mm256_or_si256(_mm256_cmpeq_epi8(w, vcr), _mm256_cmpeq_epi8(w, vlf)),
            );
            let mask = _mm256_movemask_epi8(eq) as u32;
            counters.simd_ops += 1;
            if mask != 0 {
                return Some(i + mask.trailing_zeros() as usize);
            }
            if i + W * PREFETCH_WINDOWS < hay.len() {
                _mm_prefetch::<{ _MM_HINT_T0 }>(hay.as_ptr().add(i + W * PREFETCH_WINDOWS) as *const i8);
            }
            i += W;
        }
        find_scalar(hay, i, delimiter, quote, counters)
    }

    #[target_feature(enable = "sse2")]
    pub(super) unsafe fn find_sse2(
        hay: &[u8],
        delimiter: u8,
        quote: u8,
        counters: &mut ScanCounters,
    ) -> Option<usize> {
        const W: usize = 16;
        let vd = _mm_set1_epi8(delimiter as i8);
        let vq = _mm_set1_epi8(quote as i8);
        let vcr = _mm_set1_epi8(b'\r' as i8);
        let vlf = _mm_set1_epi8(b'\n' as i8);
        let mut i = 0;
        while i + W <= hay.len() {
            let w = _mm_loadu_si128(hay.as_ptr().add(i) as *const __m128i);
            let eq = _mm_or_si128(
                _mm_or_si128(_mm_cmpeq_epi8(w, vd), _mm_cmpeq_epi8(w, vq)),
                _mm_or_si128(_mm_cmpeq_epi8(w, vcr), _mm_cmpeq_epi8(w, vlf)),
            );
            let mask = _mm_movemask_epi8(eq) as u32;
            counters.simd_ops += 1;
            if mask != 0 {
                return Some(i + mask.trailing_zeros() as usize);
            }
            i += W;
        }
        find_scalar(hay, i, delimiter, quote, counters)
    }
}

#[cfg(target_arch = "aarch64")]
mod neon {
    use super::{find_scalar, ScanCounters};
    use std::arch::aarch64::*;

    #[target_feature(enable = "neon")]
    pub(super) unsafe fn find_neon(
        hay: &[u8],
        delimiter: u8,
        quote: u8,
        counters: &mut ScanCounters,
    ) -> Option<usize> {
        const W: usize = 16;
        let vd = vdupq_n_u8(delimiter);
        let vq = vdupq_n_u8(quote);
        let vcr = vdupq_n_u8(b'\r');
        let vlf = vdupq_n_u8(b'\n');
        let mut i = 0;
        while i + W <= hay.len() {
            let w = vld1q_u8(hay.as_ptr().add(i));
            let eq = vorrq_u8(
                vorrq_u8(vceqq_u8(w, vd), vceqq_u8(w, vq)),
                vorrq_u8(vceqq_u8(w, vcr), vceqq_u8(w, vlf)),
            );
            // Narrow each 16-bit pair to a nibble: bits 4i..4i+3 of the
            // extracted u64 correspond to byte i of the window. Lane order
            // assumes little-endian; big-endian would need a byte swap
            // before the trailing-zero count (those targets take the
            // scalar path instead).
            let nibbles = vshrn_n_u16::<4>(vreinterpretq_u16_u8(eq));
            let mask = vget_lane_u64::<0>(vreinterpret_u64_u8(nibbles));
            counters.simd_ops += 1;
            if mask != 0 {
                return Some(i + (mask.trailing_zeros() >> 2) as usize);
            }
            i += W;
        }
        find_scalar(hay, i, delimiter, quote, counters)
    }
}
