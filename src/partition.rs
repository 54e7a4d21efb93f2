//! Partition policies: how a cached hash maps to a bucket index and how the
//! bucket count grows.
//!
//! Policies are plain values owned by each table instance. They hold no
//! state beyond configuration, so both operations are pure.

use crate::error::CapacityError;

/// Strategy mapping hashes to buckets and choosing growth targets.
pub trait Partition {
    /// Bucket count of a freshly constructed (or cleared) table.
    const INITIAL_SIZE: usize;

    /// Bucket for `hash` in a table of `bucket_count` buckets.
    /// `bucket_count` is always a value previously produced by this policy.
    fn bucket_index(&self, hash: u64, bucket_count: usize) -> usize;

    /// Smallest supported bucket count that is at least `minimum`, starting
    /// from `current`.
    fn grow(&self, current: usize, minimum: usize) -> Result<usize, CapacityError>;
}

/// Power-of-two bucket counts; indexing masks the low bits of the hash.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PowerOfTwo;

impl PowerOfTwo {
    /// Largest bucket count this policy hands out (half the address range).
    pub const MAX_BUCKETS: usize = 1 << (usize::BITS - 1);
}

impl Partition for PowerOfTwo {
    const INITIAL_SIZE: usize = 8;

    #[inline]
    fn bucket_index(&self, hash: u64, bucket_count: usize) -> usize {
        debug_assert!(bucket_count.is_power_of_two());
        (hash as usize) & (bucket_count - 1)
    }

    fn grow(&self, current: usize, minimum: usize) -> Result<usize, CapacityError> {
        let mut n = current.max(Self::INITIAL_SIZE);
        while n < minimum {
            if n >= Self::MAX_BUCKETS {
                return Err(CapacityError::Exhausted {
                    requested: minimum,
                    largest: Self::MAX_BUCKETS,
                });
            }
            n <<= 1;
        }
        Ok(n)
    }
}

/// What `PrimeSequence::grow` does when asked for more buckets than its
/// largest tabulated prime.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Exhaustion {
    /// Report `CapacityError::Exhausted`.
    #[default]
    Refuse,
    /// Hand out the largest prime; the table stops growing and chains
    /// lengthen instead.
    Saturate,
}

/// Bucket counts drawn from a fixed ascending table of primes; indexing
/// takes the hash modulo the count.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PrimeSequence {
    on_exhausted: Exhaustion,
}

// Each entry is roughly double the previous one.
const PRIMES: [usize; 31] = [
    7,
    13,
    29,
    53,
    97,
    193,
    389,
    769,
    1_543,
    3_079,
    6_151,
    12_289,
    24_593,
    49_157,
    98_317,
    196_613,
    393_241,
    786_433,
    1_572_869,
    3_145_739,
    6_291_469,
    12_582_917,
    25_165_843,
    50_331_653,
    100_663_319,
    201_326_611,
    402_653_189,
    805_306_457,
    1_610_612_741,
    3_221_225_473,
    4_294_967_291,
];

impl PrimeSequence {
    pub const fn new(on_exhausted: Exhaustion) -> Self {
        Self { on_exhausted }
    }

    pub fn exhaustion(&self) -> Exhaustion {
        self.on_exhausted
    }

    /// Largest bucket count the table can reach.
    pub fn largest() -> usize {
        PRIMES[PRIMES.len() - 1]
    }
}

impl Partition for PrimeSequence {
    const INITIAL_SIZE: usize = PRIMES[0];

    #[inline]
    fn bucket_index(&self, hash: u64, bucket_count: usize) -> usize {
        (hash % bucket_count as u64) as usize
    }

    fn grow(&self, current: usize, minimum: usize) -> Result<usize, CapacityError> {
        let wanted = minimum.max(current);
        match PRIMES.iter().find(|&&p| p >= wanted) {
            Some(&p) => Ok(p),
            None => match self.on_exhausted {
                Exhaustion::Saturate => Ok(Self::largest()),
                Exhaustion::Refuse => Err(CapacityError::Exhausted {
                    requested: minimum,
                    largest: Self::largest(),
                }),
            },
        }
    }
}
