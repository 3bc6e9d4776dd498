//! Bit-packed Bloom filter over blinded point encodings.
//!
//! The filter never sees raw identifiers: every item is an encoded,
//! blinded curve point and therefore close to uniformly distributed. That
//! lets the `hash_count` index functions be plain bit slices of the item
//! instead of cryptographic hashes.
//!
//! Sizing follows the usual Bloom trade-off for a target false-positive
//! probability of `2^-k` with `k = security_parameter`:
//!
//! - `bits_per_item = ceil(k / ln 2) + 1`
//! - `total_bits = item_count * bits_per_item`
//! - `hash_count = k`
//! - `index_bits = ceil(log2(total_bits)) + 8`, at most 64
//!
//! The window is wider than the array so that the final reduction modulo
//! `total_bits` reaches every bit with close to equal probability.
//!
//! Bit `i` is stored in byte `i / 8` at MSB-first position `i % 8`, which is
//! also the wire layout returned by [`BitFilter::to_bytes`].

use crate::context::MAX_SEC_PARAM;
use crate::error::{ConfigError, PsiError, Result};
use bitvec::prelude::*;
use rayon::prelude::*;
use std::f64::consts::LN_2;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

const BYTE_LENGTH: usize = 8;
/// Extra window bits read beyond `ceil(log2(total_bits))`.
const FOLD_BITS: usize = 8;

/// Sizing of a [`BitFilter`], derived from the item count and the security
/// parameter. Not carried on the wire; both sides recompute it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterParams {
    pub item_count: usize,
    pub bits_per_item: usize,
    pub total_bits: usize,
    pub hash_count: usize,
    pub index_bits: usize,
}

impl FilterParams {
    pub fn new(item_count: usize, security_parameter: u32) -> Result<Self> {
        if item_count == 0 {
            return Err(PsiError::EmptyInput);
        }
        if security_parameter == 0 || security_parameter > MAX_SEC_PARAM {
            return Err(ConfigError::InvalidSecurityParameter(security_parameter).into());
        }

        let bits_per_item = (f64::from(security_parameter) / LN_2).ceil() as usize + 1;
        let total_bits = item_count.checked_mul(bits_per_item).ok_or_else(|| {
            PsiError::ProtocolViolation(format!(
                "filter for {item_count} items does not fit in memory"
            ))
        })?;

        Ok(Self {
            item_count,
            bits_per_item,
            total_bits,
            hash_count: security_parameter as usize,
            index_bits: window_bits(total_bits),
        })
    }

    /// Length of the packed bit array in bytes.
    pub fn byte_len(&self) -> usize {
        self.total_bits.div_ceil(BYTE_LENGTH)
    }

    /// Bit position selected by index function `j` for `item`.
    ///
    /// The item is read as a cyclic MSB-first bit stream of `8 * len` bits.
    /// Window `j` starts at bit `8 * j + j / len` (taken modulo the stream
    /// length): byte offset `j`, moved one extra bit for every full wrap
    /// around the item, so index functions past the item length still start
    /// at fresh offsets. `index_bits` bits are read from there, wrapping as
    /// needed, and the value is reduced modulo `total_bits`.
    ///
    /// `item` must not be empty.
    pub fn derived_hash(&self, item: &[u8], j: usize) -> usize {
        let bits = item.view_bits::<Msb0>();
        let bit_len = bits.len();
        let start = (BYTE_LENGTH * j + j / item.len()) % bit_len;

        let mut window = 0u64;
        for i in 0..self.index_bits {
            window = (window << 1) | u64::from(bits[(start + i) % bit_len]);
        }
        (window % self.total_bits as u64) as usize
    }
}

fn window_bits(total_bits: usize) -> usize {
    let ceil_log2 = (usize::BITS - total_bits.saturating_sub(1).leading_zeros()) as usize;
    (ceil_log2 + FOLD_BITS).min(u64::BITS as usize)
}

/// Immutable Bloom filter, built once per run by the filter owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitFilter {
    params: FilterParams,
    bits: BitVec<u8, Msb0>,
}

impl BitFilter {
    /// Build a filter over `items`.
    ///
    /// All items must share one non-zero length. Insertion runs in parallel
    /// on the current rayon pool, in ranges of at least `chunk_size` items:
    /// each item only sets flags in a one-flag-per-bit scratch array, which
    /// is then packed into bytes with every output byte owned by a single
    /// worker.
    ///
    /// # Errors
    /// - `PsiError::EmptyInput` if `items` is empty
    /// - `PsiError::Config` if `security_parameter` is out of range
    /// - `PsiError::InvalidItemLength` if items differ in length
    pub fn build<T>(items: &[T], security_parameter: u32, chunk_size: usize) -> Result<Self>
    where
        T: AsRef<[u8]> + Sync,
    {
        check_item_lengths(items)?;
        let params = FilterParams::new(items.len(), security_parameter)?;

        let start = Instant::now();
        let flags: Vec<AtomicBool> = (0..params.byte_len() * BYTE_LENGTH)
            .map(|_| AtomicBool::new(false))
            .collect();
        let chunk_size = chunk_size.max(1);
        items.par_iter().with_min_len(chunk_size).for_each(|item| {
            let item = item.as_ref();
            for j in 0..params.hash_count {
                flags[params.derived_hash(item, j)].store(true, Ordering::Relaxed);
            }
        });
        debug!(elapsed = ?start.elapsed(), items = items.len(), "hash and insert");

        let start = Instant::now();
        let mut packed = vec![0u8; params.byte_len()];
        packed
            .par_iter_mut()
            .zip(flags.par_chunks(BYTE_LENGTH))
            .with_min_len(chunk_size)
            .for_each(|(byte, chunk)| {
                *byte = chunk
                    .iter()
                    .fold(0u8, |acc, flag| (acc << 1) | u8::from(flag.load(Ordering::Relaxed)));
            });
        debug!(elapsed = ?start.elapsed(), "compress filter");
        info!(bytes = params.byte_len(), "Bloom filter bit array built");

        Ok(Self {
            params,
            bits: BitVec::from_vec(packed),
        })
    }

    /// Rebuild a filter from its packed bytes. `item_count` and
    /// `security_parameter` come from the message envelope.
    ///
    /// A filter over `item_count` items has at most `item_count * hash_count`
    /// bits set; a denser one would turn arbitrary probes into candidates
    /// and is rejected.
    ///
    /// # Errors
    /// - `PsiError::EmptyInput` if `item_count` is 0
    /// - `PsiError::ProtocolViolation` if `bytes` has the wrong length or
    ///   too many bits set
    pub fn from_bytes(bytes: &[u8], item_count: usize, security_parameter: u32) -> Result<Self> {
        let params = FilterParams::new(item_count, security_parameter)?;
        if bytes.len() != params.byte_len() {
            return Err(PsiError::ProtocolViolation(format!(
                "filter for {} items should be {} bytes, got {}",
                item_count,
                params.byte_len(),
                bytes.len()
            )));
        }

        let bits = BitVec::from_slice(bytes);
        let set_bits = bits.count_ones();
        let capacity = item_count.saturating_mul(params.hash_count);
        if set_bits > capacity {
            warn!(set_bits, capacity, "rejecting oversaturated filter");
            return Err(PsiError::ProtocolViolation(format!(
                "filter for {item_count} items has {set_bits} bits set, at most {capacity} allowed"
            )));
        }
        Ok(Self { params, bits })
    }

    /// The packed bit array, MSB-first within each byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits.as_raw_slice().to_vec()
    }

    /// Membership test. Never false for an inserted item; false for an
    /// empty one.
    pub fn contains(&self, item: &[u8]) -> bool {
        if item.is_empty() {
            return false;
        }
        (0..self.params.hash_count).fold(true, |hit, j| {
            hit & self.bits[self.params.derived_hash(item, j)]
        })
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    pub fn item_count(&self) -> usize {
        self.params.item_count
    }

    #[cfg(test)]
    pub(crate) fn force_insert(&mut self, item: &[u8]) {
        for j in 0..self.params.hash_count {
            let pos = self.params.derived_hash(item, j);
            self.bits.set(pos, true);
        }
    }
}

fn check_item_lengths<T: AsRef<[u8]>>(items: &[T]) -> Result<()> {
    let first = items.first().ok_or(PsiError::EmptyInput)?.as_ref().len();
    if first == 0 {
        return Err(PsiError::InvalidItemLength {
            expected: 1,
            actual: 0,
        });
    }
    match items.iter().map(|item| item.as_ref().len()).find(|&len| len != first) {
        Some(actual) => Err(PsiError::InvalidItemLength {
            expected: first,
            actual,
        }),
        None => Ok(()),
    }
}
