//! # Private Set Intersection for Sample Alignment
//!
//! This library aligns sample identifiers between two parties with a
//! filter-assisted Private Set Intersection (PSI) protocol built on
//! commutative elliptic-curve blinding. Each party ends with the exact
//! intersection; neither learns anything about the other's remaining
//! identifiers.
//!
//! ## Features
//!
//! - **Asymmetric roles**: The party with the larger set ("alice") ships a
//!   compact Bloom filter over her blinded set instead of the set itself.
//!   The other party ("bob") probes it locally.
//! - **Exact results**: A correction round removes the filter's false
//!   positives, so the result is the true intersection.
//! - **Pluggable curves**: Ristretto255 (curve25519-dalek) and secp256k1
//!   (k256) behind the [`Curve`] trait.
//! - **Transport Agnostic**: Sessions consume and produce plain serde
//!   messages; [`run_psi`] drives them over any [`Transport`].
//! - **Type-State Pattern**: Every round consumes its state, so rounds
//!   cannot be skipped or replayed.
//! - **Parallel**: Blinding, filter construction and probing run on a
//!   per-run rayon pool.
//!
//! ## Protocol Overview
//!
//! 1. **Init**: The client sends its parameters and set size; the server
//!    checks them and picks roles. The smaller set belongs to bob.
//! 2. **Blind**: Bob sends `b·H(x)` for each of his ids. Alice returns
//!    `a·b·H(x)` in the same order, plus a filter over her own `a·H(y)`.
//! 3. **Probe**: Bob strips his key to get `a·H(x)` and tests each value
//!    against the filter, collecting candidates.
//! 4. **Correct**: Bob sends his candidates; alice answers with the ones
//!    not in her set and bob drops them.
//!
//! ## Example Usage
//!
//! ```ignore
//! use psi_align::{run_local, PsiConfig, PsiError};
//!
//! let alice_items = vec![b"apple".to_vec(), b"banana".to_vec(), b"cherry".to_vec()];
//! let bob_items = vec![b"banana".to_vec(), b"date".to_vec()];
//!
//! let (alice_result, bob_result) = run_local(&alice_items, &bob_items, &PsiConfig::default())?;
//! assert_eq!(alice_result.intersection, vec![b"banana".to_vec()]);
//! assert_eq!(alice_result.intersection, bob_result.intersection);
//! # Ok::<(), PsiError>(())
//! ```
//!
//! ## Security Considerations
//!
//! - Both parties learn the intersection. Bob additionally learns
//!   alice's set size.
//! - The transport MUST be authenticated and encrypted in production.
//! - Secret scalars are zeroized when a session moves past its blinding
//!   round.

pub mod bucket;
mod config;
mod context;
mod crypto;
mod error;
mod filter;
mod messages;
mod protocol;
mod runner;
mod state;
mod transport;

#[cfg(test)]
mod proptests;

pub use config::{LoggingConfig, PsiConfig};
pub use context::{
    CurveName, ProtocolContext, PsiVariant, Role, LENGTH_12, LENGTH_32, LENGTH_33, MAX_SEC_PARAM,
    STAT_SEC_PARAM,
};
pub use crypto::{BlindingKey, Curve, Ristretto255, Secp256k1};
pub use error::{ConfigError, PsiError, Result};
pub use filter::{BitFilter, FilterParams};
pub use messages::{
    AliceCheck, AliceDoublePointsAndFilter, BobAlignResult, BobPoints, ClientInit, Message,
    MessageKind, ServerInit,
};
pub use runner::{plain_intersection, run_bucketed, run_local, run_psi, CommRole};
pub use state::{AliceFilteredState, AliceState, AlignmentResult, BobAlignedState, BobState};
pub use transport::{InMemoryTransport, Transport};
