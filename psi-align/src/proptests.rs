//! Property-based tests for the filter, role negotiation and full runs
//!
//! Tests for:
//! - Filter: no false negatives, byte round trip, stable probes
//! - Context: exactly one alice, bob holds the smaller set
//! - Alignment: result equals the plain intersection
//! - Bucketing: partition is a permutation of the input

use crate::bucket::partition;
use crate::config::PsiConfig;
use crate::context::{ProtocolContext, Role};
use crate::filter::BitFilter;
use crate::runner::{plain_intersection, run_local};
use proptest::prelude::*;
use std::collections::HashSet;

fn item_set(max: usize) -> impl Strategy<Value = Vec<[u8; 32]>> {
    prop::collection::hash_set(any::<[u8; 32]>(), 1..max)
        .prop_map(|set| set.into_iter().collect())
}

fn id_set(max: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::hash_set(0u16..400, 1..max).prop_map(|set| {
        set.into_iter()
            .map(|id| format!("id-{id}").into_bytes())
            .collect()
    })
}

// ============================================================================
// FILTER PROPERTY TESTS
// ============================================================================

proptest! {
    /// Property: every inserted item tests positive
    #[test]
    fn filter_has_no_false_negatives(
        items in item_set(300),
        security_parameter in 1u32..=64,
    ) {
        let filter = BitFilter::build(&items, security_parameter, 1).unwrap();
        for item in &items {
            prop_assert!(filter.contains(item));
        }
    }

    /// Property: a filter rebuilt from its bytes answers every probe the same
    #[test]
    fn filter_bytes_round_trip(
        items in item_set(100),
        probes in prop::collection::vec(any::<[u8; 32]>(), 0..100),
    ) {
        let filter = BitFilter::build(&items, 20, 1).unwrap();
        let bytes = filter.to_bytes();
        prop_assert_eq!(bytes.len(), filter.params().byte_len());

        let rebuilt = BitFilter::from_bytes(&bytes, items.len(), 20).unwrap();
        for probe in items.iter().chain(probes.iter()) {
            prop_assert_eq!(rebuilt.contains(probe), filter.contains(probe));
            prop_assert_eq!(rebuilt.contains(probe), rebuilt.contains(probe));
        }
    }
}

// ============================================================================
// CONTEXT PROPERTY TESTS
// ============================================================================

proptest! {
    /// Property: negotiation yields one alice and one bob, bob's set not larger
    #[test]
    fn negotiation_is_asymmetric(
        left in 1usize..10_000,
        right in 1usize..10_000,
    ) {
        let mut server = ProtocolContext::new(left);
        server.negotiate_role(right).unwrap();
        let mut client = ProtocolContext::new(right);
        client.assign_peer_role(server.role, left);

        prop_assert_ne!(server.role, client.role);
        prop_assert_eq!(server.role.complement(), client.role);
        prop_assert!(server.validate().is_ok());
        prop_assert!(client.validate().is_ok());

        let bob_count = if server.role == Role::Bob { left } else { right };
        prop_assert_eq!(bob_count, left.min(right));
    }
}

// ============================================================================
// ALIGNMENT PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: both parties end with the plain intersection, in bob's order
    #[test]
    fn alignment_matches_plain_intersection(
        mine in id_set(40),
        theirs in id_set(40),
    ) {
        let (own, peer) = run_local(&mine, &theirs, &PsiConfig::default()).unwrap();
        // The server takes bob on a tie.
        let expected = if theirs.len() <= mine.len() {
            plain_intersection(&theirs, &mine)
        } else {
            plain_intersection(&mine, &theirs)
        };
        prop_assert_eq!(&own.intersection, &expected);
        prop_assert_eq!(&peer.intersection, &expected);
    }
}

// ============================================================================
// BUCKETING PROPERTY TESTS
// ============================================================================

proptest! {
    /// Property: buckets hold exactly the input keys
    #[test]
    fn partition_is_a_permutation(
        keys in id_set(200),
        bucket_num in 1usize..32,
    ) {
        let buckets = partition(&keys, bucket_num).unwrap();
        prop_assert_eq!(buckets.len(), bucket_num);

        let flattened: HashSet<Vec<u8>> = buckets.into_iter().flatten().collect();
        let input: HashSet<Vec<u8>> = keys.into_iter().collect();
        prop_assert_eq!(flattened, input);
    }
}
