//! Splitting key sets into buckets.
//!
//! Both parties partition with the same unkeyed hash, so a shared key
//! always lands in the same bucket on both sides and buckets can be
//! aligned independently. Bucket `i` is aligned with `batch_id = i + 1`.

use crate::error::{ConfigError, Result};
use sha2::{Digest, Sha256};

/// Largest accepted bucket count.
pub const MAX_BUCKET_NUM: usize = 1_000_000;

/// Bucket of `key` among `bucket_num` buckets.
pub fn bucket_id(key: &[u8], bucket_num: usize) -> usize {
    let digest = Sha256::digest(key);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % bucket_num as u64) as usize
}

/// Split `keys` into `bucket_num` buckets, keeping input order inside each.
///
/// # Errors
/// Returns `ConfigError::InvalidBucketNum` unless `1 <= bucket_num <= MAX_BUCKET_NUM`.
pub fn partition(keys: &[Vec<u8>], bucket_num: usize) -> Result<Vec<Vec<Vec<u8>>>> {
    if !(1..=MAX_BUCKET_NUM).contains(&bucket_num) {
        return Err(ConfigError::InvalidBucketNum(bucket_num).into());
    }
    let mut buckets = vec![Vec::new(); bucket_num];
    for key in keys {
        buckets[bucket_id(key, bucket_num)].push(key.clone());
    }
    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PsiError;

    fn keys(count: usize) -> Vec<Vec<u8>> {
        (0..count).map(|i| i.to_string().into_bytes()).collect()
    }

    #[test]
    fn test_single_bucket_keeps_everything() {
        let keys = keys(10);
        let buckets = partition(&keys, 1).unwrap();
        assert_eq!(buckets, vec![keys]);
    }

    #[test]
    fn test_partition_is_deterministic() {
        let keys = keys(500);
        let first = partition(&keys, 8).unwrap();
        let second = partition(&keys, 8).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.iter().map(Vec::len).sum::<usize>(), 500);
        assert!(first.iter().all(|bucket| !bucket.is_empty()));
    }

    #[test]
    fn test_shared_keys_share_buckets() {
        let mine = keys(100);
        let theirs: Vec<Vec<u8>> = keys(200).into_iter().rev().collect();
        let mine = partition(&mine, 4).unwrap();
        let theirs = partition(&theirs, 4).unwrap();
        for (bucket, keys) in mine.iter().enumerate() {
            for key in keys {
                assert!(theirs[bucket].contains(key));
            }
        }
    }

    #[test]
    fn test_order_preserved_within_bucket() {
        let keys = keys(100);
        for bucket in partition(&keys, 3).unwrap() {
            let positions: Vec<usize> = bucket
                .iter()
                .map(|key| keys.iter().position(|k| k == key).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_invalid_bucket_num() {
        assert_eq!(
            partition(&keys(1), 0),
            Err(PsiError::Config(ConfigError::InvalidBucketNum(0)))
        );
        assert!(partition(&keys(1), MAX_BUCKET_NUM + 1).is_err());
    }
}
