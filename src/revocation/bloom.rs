//! Lock-free bloom filter used as the negative-membership accelerator
//!
//! Bits are stored in atomics so inserts and lookups can run concurrently
//! through a shared reference. Indexes come from double hashing over a
//! SHA-256 digest of the key.

use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

pub struct BloomFilter {
    bits: Vec<AtomicU64>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Size a filter for `expected_insertions` keys at the given false-positive rate
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn with_capacity(expected_insertions: usize, false_positive_rate: f64) -> Self {
        let n = expected_insertions.max(1) as f64;
        let p = false_positive_rate.clamp(1e-9, 0.5);
        let ln2 = std::f64::consts::LN_2;

        let num_bits = (-n * p.ln() / (ln2 * ln2)).ceil().max(64.0) as u64;
        let num_hashes = ((num_bits as f64 / n) * ln2).round().clamp(1.0, 30.0) as u32;
        let words = num_bits.div_ceil(64) as usize;

        Self {
            bits: (0..words).map(|_| AtomicU64::new(0)).collect(),
            num_bits,
            num_hashes,
        }
    }

    pub fn insert(&self, key: &str) {
        for index in self.indexes(key) {
            let (word, mask) = Self::locate(index);
            self.bits[word].fetch_or(mask, Ordering::Release);
        }
    }

    /// `false` means the key was definitely never inserted
    #[must_use]
    pub fn might_contain(&self, key: &str) -> bool {
        self.indexes(key).all(|index| {
            let (word, mask) = Self::locate(index);
            self.bits[word].load(Ordering::Acquire) & mask != 0
        })
    }

    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    #[allow(clippy::cast_possible_truncation)]
    fn locate(index: u64) -> (usize, u64) {
        ((index / 64) as usize, 1u64 << (index % 64))
    }

    fn indexes(&self, key: &str) -> impl Iterator<Item = u64> {
        let digest = Sha256::digest(key.as_bytes());
        let mut first = [0u8; 8];
        let mut second = [0u8; 8];
        first.copy_from_slice(&digest[..8]);
        second.copy_from_slice(&digest[8..16]);

        let h1 = u64::from_le_bytes(first);
        let h2 = u64::from_le_bytes(second) | 1;
        let num_bits = self.num_bits;

        (0..u64::from(self.num_hashes)).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % num_bits)
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizing_matches_expected_parameters() {
        let filter = BloomFilter::with_capacity(100_000, 0.001);
        // m = -n ln p / ln2^2 ~ 1.44M bits, k ~ 10
        assert!(filter.num_bits() > 1_400_000 && filter.num_bits() < 1_500_000);
        assert_eq!(filter.num_hashes(), 10);
    }

    #[test]
    fn test_never_reports_inserted_keys_absent() {
        let filter = BloomFilter::with_capacity(10_000, 0.001);
        let ids: Vec<String> = (0..10_000).map(|i| format!("session-{i}")).collect();
        for id in &ids {
            filter.insert(id);
        }

        assert!(ids.iter().all(|id| filter.might_contain(id)));
    }

    #[test]
    fn test_false_positive_rate_stays_near_target() {
        let filter = BloomFilter::with_capacity(10_000, 0.001);
        for i in 0..10_000 {
            filter.insert(&format!("revoked-{i}"));
        }

        let false_positives = (0..10_000)
            .filter(|i| filter.might_contain(&format!("never-revoked-{i}")))
            .count();
        assert!(
            false_positives < 100,
            "false positive count too high: {false_positives}"
        );
    }

    #[test]
    fn test_empty_filter_contains_nothing() {
        let filter = BloomFilter::with_capacity(0, 0.001);
        assert!(!filter.might_contain("anything"));
    }
}
