// Interning pool for callback consumers.
//
// Row callbacks often see the same byte strings over and over (enum-like
// columns, repeated keys). The pool deduplicates them into an append-only
// arena: open-addressed table, FNV-1a hash, linear probing, power-of-two
// bucket count, resize at 3/4 load. Interned bytes go into fixed-size
// chunks that never move, so resolved slices stay valid for the pool's
// lifetime. Not on the parse hot path.

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const CHUNK_SIZE: usize = 64 * 1024;
const MIN_BUCKETS: usize = 16;
const EMPTY: u32 = u32::MAX;

#[inline]
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Stable handle for an interned byte string. Equal inputs intern to the
/// same `Sym` within one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sym(u32);

#[derive(Debug, Clone, Copy)]
struct Entry {
    hash: u64,
    chunk: u32,
    offset: u32,
    len: u32,
}

pub struct StringPool {
    /// Entry index per bucket, `EMPTY` when vacant.
    buckets: Vec<u32>,
    entries: Vec<Entry>,
    chunks: Vec<Vec<u8>>,
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StringPool {
    pub fn new() -> Self {
        Self::with_bucket_capacity(MIN_BUCKETS)
    }

    pub fn with_bucket_capacity(buckets: usize) -> Self {
        let size = buckets.next_power_of_two().max(MIN_BUCKETS);
        StringPool { buckets: vec![EMPTY; size], entries: Vec::new(), chunks: Vec::new() }
    }

    /// Intern `bytes`, returning the existing handle when an equal string
    /// was interned before.
    pub fn intern(&mut self, bytes: &[u8]) -> Sym {
        let hash = fnv1a(bytes);
        let mask = self.buckets.len() - 1;
        let mut i = (hash as usize) & mask;
        loop {
            let slot = self.buckets[i];
            if slot == EMPTY {
                break;
            }
            let entry = self.entries[slot as usize];
            if entry.hash == hash && self.entry_bytes(&entry) == bytes {
                return Sym(slot);
            }
            i = (i + 1) & mask;
        }

        let sym = self.push_entry(hash, bytes);
        self.buckets[i] = sym.0;
        if self.entries.len() * 4 >= self.buckets.len() * 3 {
            self.grow();
        }
        sym
    }

    /// The interned bytes behind a handle. Stable for the pool's lifetime.
    pub fn resolve(&self, sym: Sym) -> &[u8] {
        self.entry_bytes(&self.entries[sym.0 as usize])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total interned bytes held by the arena chunks.
    pub fn arena_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    fn push_entry(&mut self, hash: u64, bytes: &[u8]) -> Sym {
        let fits_last = self
            .chunks
            .last()
            .map(|c| c.capacity() - c.len() >= bytes.len())
            .unwrap_or(false);
        if !fits_last {
            self.chunks.push(Vec::with_capacity(CHUNK_SIZE.max(bytes.len())));
        }
        let chunk = self.chunks.len() - 1;
        let offset = self.chunks[chunk].len();
        self.chunks[chunk].extend_from_slice(bytes);
        self.entries.push(Entry {
            hash,
            chunk: chunk as u32,
            offset: offset as u32,
            len: bytes.len() as u32,
        });
        Sym((self.entries.len() - 1) as u32)
    }

    fn grow(&mut self) {
        let size = self.buckets.len() * 2;
        let mask = size - 1;
        let mut buckets = vec![EMPTY; size];
        for (index, entry) in self.entries.iter().enumerate() {
            let mut i = (entry.hash as usize) & mask;
            while buckets[i] != EMPTY {
                i = (i + 1) & mask;
            }
            buckets[i] = index as u32;
        }
        self.buckets = buckets;
    }

    fn entry_bytes(&self, entry: &Entry) -> &[u8] {
        let chunk = &self.chunks[entry.chunk as usize];
        &chunk[entry.offset as usize..(entry.offset + entry.len) as usize]
    }
}

impl std::fmt::Debug for StringPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringPool")
            .field("entries", &self.entries.len())
            .field("buckets", &self.buckets.len())
            .field("arena_bytes", &self.arena_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_inputs_share_a_handle() {
        let mut pool = StringPool::new();
        let a = pool.intern(b"hello");
        let b = pool.intern(b"world");
        let c = pool.intern(b"hello");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.resolve(a), b"hello");
        assert_eq!(pool.resolve(b), b"world");
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_empty_string_interns() {
        let mut pool = StringPool::new();
        let a = pool.intern(b"");
        let b = pool.intern(b"");
        assert_eq!(a, b);
        assert_eq!(pool.resolve(a), b"");
    }

    #[test]
    fn test_growth_preserves_handles() {
        let mut pool = StringPool::new();
        let mut syms = Vec::new();
        for i in 0..1000u32 {
            syms.push(pool.intern(format!("value-{i}").as_bytes()));
        }
        // Far past the initial 16 buckets: several resizes happened.
        for (i, &sym) in syms.iter().enumerate() {
            assert_eq!(pool.resolve(sym), format!("value-{i}").as_bytes());
            assert_eq!(pool.intern(format!("value-{i}").as_bytes()), sym);
        }
        assert_eq!(pool.len(), 1000);
    }

    #[test]
    fn test_oversized_value_gets_its_own_chunk() {
        let mut pool = StringPool::new();
        let big = vec![b'x'; CHUNK_SIZE + 100];
        let sym = pool.intern(&big);
        assert_eq!(pool.resolve(sym), big.as_slice());
        let small = pool.intern(b"tiny");
        assert_eq!(pool.resolve(small), b"tiny");
        assert_eq!(pool.arena_bytes(), big.len() + 4);
    }

    #[test]
    fn test_colliding_probe_chain() {
        // Force dense occupancy at the minimum bucket count; linear
        // probing must still find each string.
        let mut pool = StringPool::with_bucket_capacity(MIN_BUCKETS);
        let words: Vec<String> = (0..12).map(|i| format!("w{i}")).collect();
        let syms: Vec<Sym> = words.iter().map(|w| pool.intern(w.as_bytes())).collect();
        for (w, &s) in words.iter().zip(&syms) {
            assert_eq!(pool.resolve(s), w.as_bytes());
        }
    }
}
