//! Hash-consing arena with chained buckets.
//!
//! Values live in a growable vector and are addressed by index. Index 0 is a sentry and is never
//! handed out. Each bucket holds the index of the first value of its chain, `0` for an empty bucket.

use std::ops::Index;

/// Cheap structural hash for arena values and operation keys.
pub trait FastHash {
    fn hash(&self) -> u64;
}

/// [Szudzik pairing function][szudzik-pairing], wrapping on overflow.
///
/// ```text
/// (a, b) -> if (a<b) then (b^2 + a) else (a^2 + a + b)
/// ```
///
/// [szudzik-pairing]: http://szudzik.com/ElegantPairing.pdf
fn pairing2(a: u64, b: u64) -> u64 {
    if a < b {
        b.wrapping_mul(b).wrapping_add(a)
    } else {
        a.wrapping_mul(a).wrapping_add(a).wrapping_add(b)
    }
}

pub fn pairing3(a: u64, b: u64, c: u64) -> u64 {
    pairing2(pairing2(a, b), c)
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    next: usize,
}

#[derive(Debug, Clone)]
pub struct Table<T> {
    data: Vec<Entry<T>>,
    buckets: Vec<usize>,
    bitmask: u64,
}

impl<T> Table<T>
where
    T: Default,
{
    /// Create a new table with `2^bits` buckets.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Table bits should be in the range 0..=31");

        let size = 1 << bits;
        Self {
            data: vec![Entry {
                value: T::default(),
                next: 0,
            }],
            buckets: vec![0; size],
            bitmask: (size - 1) as u64,
        }
    }
}

impl<T> Table<T> {
    /// Number of stored values (the sentry is not counted).
    pub fn len(&self) -> usize {
        self.data.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value(&self, index: usize) -> &T {
        assert_ne!(index, 0, "Index is 0");
        &self.data[index].value
    }

    /// Append a value outside of any bucket and return its index.
    pub fn add(&mut self, value: T) -> usize {
        let index = self.data.len();
        self.data.push(Entry { value, next: 0 });
        index
    }
}

impl<T> Table<T>
where
    T: FastHash + Eq,
{
    fn bucket_index(&self, value: &T) -> usize {
        (value.hash() & self.bitmask) as usize
    }

    /// Return the index of `value`, inserting it if it is not present yet.
    pub fn put(&mut self, value: T) -> usize {
        let bucket = self.bucket_index(&value);
        let mut index = self.buckets[bucket];
        while index != 0 {
            if self.data[index].value == value {
                return index;
            }
            index = self.data[index].next;
        }

        // Not found: prepend to the bucket chain.
        let index = self.add(value);
        self.data[index].next = self.buckets[bucket];
        self.buckets[bucket] = index;

        if self.len() > 2 * self.buckets.len() {
            self.grow();
        }
        index
    }

    fn grow(&mut self) {
        let size = self.buckets.len() * 2;
        self.buckets = vec![0; size];
        self.bitmask = (size - 1) as u64;
        for index in 1..self.data.len() {
            let bucket = self.bucket_index(&self.data[index].value);
            self.data[index].next = self.buckets[bucket];
            self.buckets[bucket] = index;
        }
    }
}

impl<T> Index<usize> for Table<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        self.value(index)
    }
}
